use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use qshield_entropy::{EntropyPool, EntropySource, HostEntropySource};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    base::{BaseCipherLayer, SealedBlock},
    chaos::{ChaosEngine, ClassicChaos},
    config::{CipherConfig, EncryptOptions},
    dimensional::DimensionalTransformStack,
    envelope::{Envelope, EnvelopeMetadata, TemporalSignature, ALGORITHM_ID},
    error::{QshieldError, QshieldResult},
    keys::SessionKeys,
    matrix::{DimensionCoordinates, KeyMatrix},
    post::PostProcessingStack,
    scheduler::TemporalKeyScheduler,
};

const RESERVED_METADATA: [&str; 3] = ["algorithm", "dimensions", "chaosLevel"];

/// Active lattice plus the instant it took over.
#[derive(Clone)]
struct KeyEpoch {
    matrix: Arc<KeyMatrix>,
    /// Set by [`QuantumShieldCipher::rekey`]; earlier timestamps are lost.
    rekeyed_at_ms: Option<u64>,
    /// Lattice replaced by the last rekey. Only ever used to authenticate,
    /// never to open.
    retired: Option<Arc<KeyMatrix>>,
}

/// Time-indexed envelope cipher.
///
/// One instance owns one [`KeyMatrix`]. Envelopes decrypt only against the
/// same lattice, so moving them across processes needs
/// [`export_key_material`](Self::export_key_material) on one side and
/// [`import_key_material`](Self::import_key_material) on the other.
///
/// ```no_run
/// use qshield_cipher::{CipherConfig, EncryptOptions, QuantumShieldCipher};
///
/// let cipher = QuantumShieldCipher::new(CipherConfig::default()).unwrap();
/// let envelope = cipher.encrypt(b"hello world", &EncryptOptions::default()).unwrap();
/// assert_eq!(cipher.decrypt(&envelope).unwrap(), b"hello world");
/// ```
pub struct QuantumShieldCipher<S = HostEntropySource, C = ClassicChaos> {
    config: CipherConfig,
    pool: EntropyPool<S>,
    scheduler: TemporalKeyScheduler<C>,
    stack: DimensionalTransformStack<C>,
    post: PostProcessingStack,
    epoch: RwLock<KeyEpoch>,
}

impl QuantumShieldCipher<HostEntropySource, ClassicChaos> {
    pub fn new(config: CipherConfig) -> QshieldResult<Self> {
        Self::with_entropy(config, HostEntropySource::new())
    }
}

impl<S: EntropySource> QuantumShieldCipher<S, ClassicChaos> {
    pub fn with_entropy(config: CipherConfig, source: S) -> QshieldResult<Self> {
        let chaos = Arc::new(ClassicChaos::new(config.chaos.clone()));
        Self::with_parts(config, EntropyPool::new(source), chaos)
    }
}

impl<S: EntropySource, C: ChaosEngine> QuantumShieldCipher<S, C> {
    /// Build an engine from explicit collaborators and generate its lattice.
    pub fn with_parts(
        config: CipherConfig,
        pool: EntropyPool<S>,
        chaos: Arc<C>,
    ) -> QshieldResult<Self> {
        config.validate()?;
        let matrix = KeyMatrix::generate(
            &pool,
            config.dimensions,
            config.hardening_rounds,
            config.cache_capacity,
            now_ms(),
        )?;
        let scheduler = TemporalKeyScheduler::new(Arc::clone(&chaos), config.rotation_interval_ms)?;
        let stack = DimensionalTransformStack::new(chaos, config.chaos_level);
        let post = PostProcessingStack::new(config.post_passes);
        info!(
            "quantumshield engine ready dimensions={} rounds={} interval_ms={} chaos_level={} post_passes={}",
            config.dimensions,
            config.hardening_rounds,
            config.rotation_interval_ms,
            config.chaos_level,
            config.post_passes
        );
        Ok(Self {
            config,
            pool,
            scheduler,
            stack,
            post,
            epoch: RwLock::new(KeyEpoch {
                matrix: Arc::new(matrix),
                rekeyed_at_ms: None,
                retired: None,
            }),
        })
    }

    pub fn config(&self) -> &CipherConfig {
        &self.config
    }

    /// Handle to the active lattice.
    pub fn matrix(&self) -> Arc<KeyMatrix> {
        Arc::clone(&self.epoch.read().matrix)
    }

    pub fn scheduler(&self) -> &TemporalKeyScheduler<C> {
        &self.scheduler
    }

    pub fn entropy_pool(&self) -> &EntropyPool<S> {
        &self.pool
    }

    pub fn encrypt(&self, plaintext: &[u8], options: &EncryptOptions) -> QshieldResult<Envelope> {
        self.encrypt_at(plaintext, now_ms(), options)
    }

    pub fn encrypt_at(
        &self,
        plaintext: &[u8],
        timestamp_ms: u64,
        options: &EncryptOptions,
    ) -> QshieldResult<Envelope> {
        let epoch = self.epoch.read().clone();
        let dimensions = options.dimension_count.unwrap_or(self.config.dimensions);
        self.check_lattice(dimensions, &epoch.matrix)?;
        check_epoch(timestamp_ms, &epoch)?;

        let scheduled = self.scheduler.schedule(
            timestamp_ms,
            options.rotation_interval_ms,
            &self.pool,
            &epoch.matrix,
        )?;
        let keys = SessionKeys::derive(&scheduled.key)?;

        let mut staged = Zeroizing::new(plaintext.to_vec());
        self.stack.forward(&scheduled.key, &mut staged);
        let mut sealed = BaseCipherLayer::seal(&self.pool, &keys.cipher, &staged)?;
        self.post.forward(&keys.post, &mut sealed.body);

        let encrypted = hex::encode(sealed.to_bytes());
        let timestamp = timestamp_ms.to_string();
        let signature = TemporalSignature::sign(&keys.mac, &encrypted, &timestamp)?;

        let mut extra = options.metadata.clone();
        for reserved in RESERVED_METADATA {
            if extra.remove(reserved).is_some() {
                warn!("caller metadata key dropped key={reserved}");
            }
        }
        debug!(
            "envelope sealed timestamp_ms={timestamp_ms} coordinates={} bytes={}",
            scheduled.coordinates,
            plaintext.len()
        );
        Ok(Envelope {
            encrypted,
            signature,
            timestamp,
            key_coordinates: *scheduled.coordinates.as_array(),
            metadata: EnvelopeMetadata {
                algorithm: ALGORITHM_ID.to_string(),
                dimensions,
                chaos_level: self.config.chaos_level.to_string(),
                extra,
            },
        })
    }

    pub fn decrypt(&self, envelope: &Envelope) -> QshieldResult<Vec<u8>> {
        self.decrypt_at(envelope, now_ms())
    }

    /// Verify and open `envelope` as seen at `now_ms`.
    ///
    /// Nothing is decoded or inverted before the signature has been checked.
    pub fn decrypt_at(&self, envelope: &Envelope, now_ms: u64) -> QshieldResult<Vec<u8>> {
        let result = self.open(envelope, now_ms);
        if let Err(err) = &result {
            warn!(
                "envelope rejected timestamp={} err={err}",
                envelope.timestamp
            );
        }
        result
    }

    fn open(&self, envelope: &Envelope, now_ms: u64) -> QshieldResult<Vec<u8>> {
        let epoch = self.epoch.read().clone();
        let metadata = &envelope.metadata;
        if metadata.algorithm != ALGORITHM_ID {
            return Err(QshieldError::InvalidEnvelope(format!(
                "unknown algorithm {:?}",
                metadata.algorithm
            )));
        }
        if metadata.chaos_level != self.config.chaos_level.as_str() {
            return Err(QshieldError::InvalidEnvelope(format!(
                "chaos level {:?} does not match engine level {}",
                metadata.chaos_level, self.config.chaos_level
            )));
        }
        self.check_lattice(metadata.dimensions, &epoch.matrix)?;
        let coordinates =
            DimensionCoordinates::new(envelope.key_coordinates, epoch.matrix.dimensions())?;

        let key = self.scheduler.reconstruct(&coordinates, &epoch.matrix)?;
        let keys = SessionKeys::derive(&key)?;
        if let Err(err) = verify_envelope(&keys, envelope) {
            return match self.lost_to_rekey(envelope, &coordinates, &epoch) {
                Some(timestamp_ms) => Err(QshieldError::RotationWindowLost {
                    timestamp_ms,
                    reason: "key matrix regenerated since",
                }),
                None => Err(err),
            };
        }

        let timestamp_ms = envelope.timestamp_ms()?;
        check_epoch(timestamp_ms, &epoch)?;
        self.check_retention(timestamp_ms, now_ms)?;
        let mut sealed = SealedBlock::from_bytes(&envelope.ciphertext()?)?;
        self.post.inverse(&keys.post, &mut sealed.body);
        let mut plaintext = BaseCipherLayer::open(&keys.cipher, &sealed)?;
        self.stack.inverse(&key, &mut plaintext);
        debug!(
            "envelope opened timestamp_ms={timestamp_ms} coordinates={coordinates} bytes={}",
            plaintext.len()
        );
        Ok(plaintext)
    }

    /// Serialized lattice seed for [`import_key_material`](Self::import_key_material).
    pub fn export_key_material(&self) -> QshieldResult<Vec<u8>> {
        let matrix = self.matrix();
        let material = matrix.export()?;
        info!(
            "key material exported fingerprint={}",
            matrix.fingerprint_hex()
        );
        Ok(material)
    }

    /// Replace the active lattice with one exported by another engine.
    pub fn import_key_material(&self, serialized: &[u8]) -> QshieldResult<()> {
        let matrix = KeyMatrix::import(serialized, self.config.cache_capacity)?;
        if matrix.dimensions() != self.config.dimensions {
            return Err(QshieldError::UnsupportedDimensionality {
                requested: matrix.dimensions(),
                min: self.config.dimensions,
                max: self.config.dimensions,
            });
        }
        *self.epoch.write() = KeyEpoch {
            matrix: Arc::new(matrix),
            rekeyed_at_ms: None,
            retired: None,
        };
        Ok(())
    }

    /// Regenerate the lattice. Envelopes stamped before `now_ms` are lost.
    pub fn rekey(&self, now_ms: u64) -> QshieldResult<()> {
        let matrix = KeyMatrix::generate(
            &self.pool,
            self.config.dimensions,
            self.config.hardening_rounds,
            self.config.cache_capacity,
            now_ms,
        )?;
        let mut epoch = self.epoch.write();
        let retired = Arc::clone(&epoch.matrix);
        *epoch = KeyEpoch {
            matrix: Arc::new(matrix),
            rekeyed_at_ms: Some(now_ms),
            retired: Some(retired),
        };
        drop(epoch);
        info!("key matrix regenerated rekeyed_at_ms={now_ms}");
        Ok(())
    }

    fn check_lattice(&self, dimensions: u8, matrix: &KeyMatrix) -> QshieldResult<()> {
        self.config.check_dimensions(dimensions)?;
        if dimensions != matrix.dimensions() {
            return Err(QshieldError::UnsupportedDimensionality {
                requested: dimensions,
                min: matrix.dimensions(),
                max: matrix.dimensions(),
            });
        }
        Ok(())
    }

    /// Timestamp of an envelope that fails under the active lattice but
    /// authenticates under the one the last rekey retired.
    fn lost_to_rekey(
        &self,
        envelope: &Envelope,
        coordinates: &DimensionCoordinates,
        epoch: &KeyEpoch,
    ) -> Option<u64> {
        let retired = epoch.retired.as_ref()?;
        let rekeyed_at = epoch.rekeyed_at_ms?;
        let timestamp_ms = envelope.timestamp_ms().ok()?;
        if timestamp_ms >= rekeyed_at {
            return None;
        }
        let key = self.scheduler.reconstruct(coordinates, retired).ok()?;
        let keys = SessionKeys::derive(&key).ok()?;
        verify_envelope(&keys, envelope).ok()?;
        Some(timestamp_ms)
    }

    fn check_retention(&self, timestamp_ms: u64, now_ms: u64) -> QshieldResult<()> {
        match self.config.key_retention_ms {
            Some(retention) if now_ms.saturating_sub(timestamp_ms) > retention => {
                Err(QshieldError::RotationWindowLost {
                    timestamp_ms,
                    reason: "older than key retention",
                })
            }
            _ => Ok(()),
        }
    }
}

fn verify_envelope(keys: &SessionKeys, envelope: &Envelope) -> QshieldResult<()> {
    TemporalSignature::verify(
        &keys.mac,
        &envelope.encrypted,
        &envelope.timestamp,
        &envelope.signature,
    )
}

fn check_epoch(timestamp_ms: u64, epoch: &KeyEpoch) -> QshieldResult<()> {
    match epoch.rekeyed_at_ms {
        Some(rekeyed_at) if timestamp_ms < rekeyed_at => Err(QshieldError::RotationWindowLost {
            timestamp_ms,
            reason: "key matrix regenerated since",
        }),
        _ => Ok(()),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
