use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{EntropyError, EntropySource, HostEntropySource};

/// Length of every pool sample in bytes.
pub const POOL_SAMPLE_LEN: usize = 64;

const SOURCE_BYTES: usize = 24;
const TIMESTAMP_BYTES: usize = 8;

/// One aggregated draw from the pool.
///
/// Layout: `[0, 24)` source entropy, `[24, 32)` big-endian timestamp,
/// `[32, 64)` SHA-256 digest of runtime counters.
#[derive(Clone, PartialEq, Eq)]
pub struct EntropySample([u8; POOL_SAMPLE_LEN]);

impl EntropySample {
    pub fn as_bytes(&self) -> &[u8; POOL_SAMPLE_LEN] {
        &self.0
    }

    pub fn len(&self) -> usize {
        POOL_SAMPLE_LEN
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Byte at `index`, wrapping around the sample length.
    pub fn byte_at(&self, index: usize) -> u8 {
        self.0[index % POOL_SAMPLE_LEN]
    }
}

impl core::fmt::Debug for EntropySample {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("EntropySample(..)")
    }
}

/// Aggregates a random source, the caller's timestamp and process counters.
///
/// The pool keeps no history: two samples for the same timestamp differ.
/// Callers needing reproducibility must keep the sample they drew.
pub struct EntropyPool<S = HostEntropySource> {
    source: Mutex<S>,
    started: Instant,
    draws: AtomicU64,
}

impl EntropyPool<HostEntropySource> {
    /// Pool backed by the OS RNG.
    pub fn host() -> Self {
        Self::new(HostEntropySource::new())
    }
}

impl Default for EntropyPool<HostEntropySource> {
    fn default() -> Self {
        Self::host()
    }
}

impl<S: EntropySource> EntropyPool<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Mutex::new(source),
            started: Instant::now(),
            draws: AtomicU64::new(0),
        }
    }

    /// Number of samples drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Relaxed)
    }

    /// Draw a fresh sample bound to `timestamp_ms`.
    pub fn sample(&self, timestamp_ms: u64) -> Result<EntropySample, EntropyError> {
        let mut out = [0u8; POOL_SAMPLE_LEN];
        self.source
            .lock()
            .try_fill_bytes(&mut out[..SOURCE_BYTES])?;
        out[SOURCE_BYTES..SOURCE_BYTES + TIMESTAMP_BYTES]
            .copy_from_slice(&timestamp_ms.to_be_bytes());
        let draw = self.draws.fetch_add(1, Ordering::Relaxed);
        out[SOURCE_BYTES + TIMESTAMP_BYTES..].copy_from_slice(&self.runtime_digest(draw));
        debug!("entropy pool sample draw={draw} timestamp_ms={timestamp_ms}");
        Ok(EntropySample(out))
    }

    /// Fill `dest` straight from the underlying source.
    pub fn fill(&self, dest: &mut [u8]) -> Result<(), EntropyError> {
        self.source.lock().try_fill_bytes(dest)
    }

    fn runtime_digest(&self, draw: u64) -> [u8; 32] {
        let wall_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(b"QSHIELD:POOL:RUNTIME");
        hasher.update(process::id().to_be_bytes());
        hasher.update(format!("{:?}", thread::current().id()).as_bytes());
        hasher.update(self.started.elapsed().as_nanos().to_be_bytes());
        hasher.update(wall_nanos.to_be_bytes());
        hasher.update(draw.to_be_bytes());
        hasher.finalize().into()
    }
}
