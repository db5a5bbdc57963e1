//! Seven-axis key lattice with lazily hardened leaves.
//!
//! The matrix owns one 64-byte genesis seed drawn at construction. A leaf is
//! never stored up front: `derive` hardens `seed ‖ H(coordinates)` on first
//! use and memoizes the result in a bounded LRU cache. Evicted leaves are
//! re-derived bit-for-bit, so the cache size never affects decryptability.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use blake2::Blake2b512;
use lru::LruCache;
use parking_lot::Mutex;
use qshield_entropy::{EntropyPool, EntropySource};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use sha3::Sha3_512;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{QshieldError, QshieldResult};

/// Number of lattice axes.
pub const AXES: usize = 7;
/// Size of a hardened leaf.
pub const KEY_BLOCK_LEN: usize = 64;
/// Version tag of exported key material.
pub const KEY_MATERIAL_VERSION: u8 = 1;

const SEED_LEN: usize = 64;
const DOMAIN_GENESIS: &[u8] = b"QSHIELD:MATRIX:GENESIS";
const DOMAIN_LEAF: &[u8] = b"QSHIELD:MATRIX:LEAF";
const DOMAIN_FINGERPRINT: &str = "QuantumShield 2024-01 key material fingerprint";

/// A 7-tuple selecting one lattice leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionCoordinates([u8; AXES]);

impl DimensionCoordinates {
    /// Build coordinates, rejecting any component outside `[0, dimensions)`.
    pub fn new(coords: [u8; AXES], dimensions: u8) -> QshieldResult<Self> {
        let coordinates = Self(coords);
        coordinates.ensure_within(dimensions)?;
        Ok(coordinates)
    }

    /// Caller guarantees every component was already reduced mod `D`.
    pub(crate) fn from_reduced(coords: [u8; AXES]) -> Self {
        Self(coords)
    }

    pub fn as_array(&self) -> &[u8; AXES] {
        &self.0
    }

    pub fn ensure_within(&self, dimensions: u8) -> QshieldResult<()> {
        if let Some(bad) = self.0.iter().find(|c| **c >= dimensions) {
            return Err(QshieldError::KeyDerivationFailure(format!(
                "coordinate {bad} outside lattice extent {dimensions}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for DimensionCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u8::to_string).collect();
        write!(f, "[{}]", parts.join(","))
    }
}

/// One hardened lattice leaf. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyBlock([u8; KEY_BLOCK_LEN]);

impl KeyBlock {
    pub fn from_bytes(bytes: [u8; KEY_BLOCK_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BLOCK_LEN] {
        &self.0
    }
}

impl fmt::Debug for KeyBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyBlock(<redacted>)")
    }
}

/// Serialized form produced by [`KeyMatrix::export`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct KeyMaterial {
    pub version: u8,
    pub dimensions: u8,
    pub hardening_rounds: u32,
    pub genesis_ms: u64,
    pub seed: String,
    pub fingerprint: String,
}

pub struct KeyMatrix {
    dimensions: u8,
    hardening_rounds: u32,
    genesis_ms: u64,
    seed: Zeroizing<[u8; SEED_LEN]>,
    fingerprint: [u8; 32],
    cache: Mutex<LruCache<DimensionCoordinates, Arc<KeyBlock>>>,
}

impl KeyMatrix {
    /// Draw fresh genesis material from `pool` and open an empty lattice.
    pub fn generate<S: EntropySource>(
        pool: &EntropyPool<S>,
        dimensions: u8,
        hardening_rounds: u32,
        cache_capacity: usize,
        now_ms: u64,
    ) -> QshieldResult<Self> {
        let sample = pool.sample(now_ms)?;
        let counter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut hasher = Sha3_512::new();
        hasher.update(DOMAIN_GENESIS);
        hasher.update(sample.as_bytes());
        hasher.update(now_ms.to_be_bytes());
        hasher.update(counter.to_be_bytes());
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        seed.copy_from_slice(&hasher.finalize());
        let matrix = Self::from_parts(seed, dimensions, hardening_rounds, now_ms, cache_capacity)?;
        info!(
            "key matrix generated dimensions={dimensions} rounds={hardening_rounds} fingerprint={}",
            matrix.fingerprint_hex()
        );
        Ok(matrix)
    }

    fn from_parts(
        seed: Zeroizing<[u8; SEED_LEN]>,
        dimensions: u8,
        hardening_rounds: u32,
        genesis_ms: u64,
        cache_capacity: usize,
    ) -> QshieldResult<Self> {
        if dimensions == 0 {
            return Err(QshieldError::KeyDerivationFailure(
                "lattice extent must be > 0".into(),
            ));
        }
        if hardening_rounds == 0 {
            return Err(QshieldError::KeyDerivationFailure(
                "hardening rounds must be > 0".into(),
            ));
        }
        let capacity = NonZeroUsize::new(cache_capacity)
            .ok_or_else(|| QshieldError::InvalidConfig("cache capacity must be > 0".into()))?;
        let fingerprint = fingerprint(&seed, dimensions, hardening_rounds, genesis_ms);
        Ok(Self {
            dimensions,
            hardening_rounds,
            genesis_ms,
            seed,
            fingerprint,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn dimensions(&self) -> u8 {
        self.dimensions
    }

    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    pub fn fingerprint_hex(&self) -> String {
        hex::encode(&self.fingerprint[..8])
    }

    /// Number of leaves currently memoized.
    pub fn cached_leaves(&self) -> usize {
        self.cache.lock().len()
    }

    /// Fetch the leaf at `coordinates`, hardening it on a cache miss.
    pub fn derive(&self, coordinates: &DimensionCoordinates) -> QshieldResult<Arc<KeyBlock>> {
        coordinates.ensure_within(self.dimensions)?;
        if let Some(block) = self.cache.lock().get(coordinates) {
            debug!("key matrix cache hit coordinates={coordinates}");
            return Ok(Arc::clone(block));
        }
        // Hardening runs outside the lock; racing threads compute equal leaves.
        let block = Arc::new(self.harden(coordinates));
        self.cache.lock().put(*coordinates, Arc::clone(&block));
        debug!("key matrix cache miss coordinates={coordinates}");
        Ok(block)
    }

    fn harden(&self, coordinates: &DimensionCoordinates) -> KeyBlock {
        let coordinate_hash = Sha3_512::digest(coordinates.as_array());
        let mut state = Zeroizing::new(Vec::with_capacity(SEED_LEN * 2 + 32));
        state.extend_from_slice(DOMAIN_LEAF);
        state.extend_from_slice(self.seed.as_slice());
        state.extend_from_slice(&coordinate_hash);
        state.push(self.dimensions);

        let mut key = Zeroizing::new([0u8; KEY_BLOCK_LEN]);
        key.copy_from_slice(&Sha3_512::digest(state.as_slice()));
        for round in 1..self.hardening_rounds {
            let next = match round % 3 {
                0 => Sha3_512::digest(key.as_slice()),
                1 => Blake2b512::digest(key.as_slice()),
                _ => Sha512::digest(key.as_slice()),
            };
            key.copy_from_slice(&next);
        }
        KeyBlock::from_bytes(*key)
    }

    pub fn export(&self) -> QshieldResult<Vec<u8>> {
        let material = KeyMaterial {
            version: KEY_MATERIAL_VERSION,
            dimensions: self.dimensions,
            hardening_rounds: self.hardening_rounds,
            genesis_ms: self.genesis_ms,
            seed: hex::encode(self.seed.as_slice()),
            fingerprint: hex::encode(self.fingerprint),
        };
        serde_json::to_vec(&material).map_err(|err| {
            QshieldError::KeyDerivationFailure(format!("key material serialization failed: {err}"))
        })
    }

    /// Rebuild a matrix from [`KeyMatrix::export`] output.
    pub fn import(serialized: &[u8], cache_capacity: usize) -> QshieldResult<Self> {
        let material: KeyMaterial = serde_json::from_slice(serialized).map_err(|err| {
            QshieldError::KeyDerivationFailure(format!("key material unreadable: {err}"))
        })?;
        if material.version != KEY_MATERIAL_VERSION {
            return Err(QshieldError::KeyDerivationFailure(format!(
                "unsupported key material version {}",
                material.version
            )));
        }
        let raw = Zeroizing::new(hex::decode(&material.seed).map_err(|_| corrupted())?);
        if raw.len() != SEED_LEN {
            return Err(corrupted());
        }
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        seed.copy_from_slice(&raw);
        let matrix = Self::from_parts(
            seed,
            material.dimensions,
            material.hardening_rounds,
            material.genesis_ms,
            cache_capacity,
        )?;
        if hex::encode(matrix.fingerprint) != material.fingerprint {
            return Err(corrupted());
        }
        info!(
            "key matrix imported dimensions={} fingerprint={}",
            matrix.dimensions,
            matrix.fingerprint_hex()
        );
        Ok(matrix)
    }
}

impl fmt::Debug for KeyMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMatrix")
            .field("dimensions", &self.dimensions)
            .field("hardening_rounds", &self.hardening_rounds)
            .field("genesis_ms", &self.genesis_ms)
            .field("fingerprint", &self.fingerprint_hex())
            .finish_non_exhaustive()
    }
}

fn corrupted() -> QshieldError {
    QshieldError::KeyDerivationFailure("matrix corrupted: key material fingerprint mismatch".into())
}

fn fingerprint(seed: &[u8; SEED_LEN], dimensions: u8, rounds: u32, genesis_ms: u64) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(DOMAIN_FINGERPRINT);
    hasher.update(seed);
    hasher.update(&[dimensions]);
    hasher.update(&rounds.to_be_bytes());
    hasher.update(&genesis_ms.to_be_bytes());
    *hasher.finalize().as_bytes()
}
