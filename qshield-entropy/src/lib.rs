//! Entropy plumbing for the QuantumShield cipher engine.
//!
//! [`EntropySource`] is the single seam through which randomness enters the
//! engine. [`HostEntropySource`] reads the OS RNG; the `sim` feature adds a
//! seeded [`SimEntropySource`] for reproducible tests. [`EntropyPool`] mixes a
//! source with the timestamp and runtime counters into fixed-size samples.

use core::fmt;

use getrandom::getrandom;

mod pool;

pub use pool::{EntropyPool, EntropySample, POOL_SAMPLE_LEN};

/// Errors returned by entropy backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyError {
    /// The platform could not fulfill the request.
    Platform(&'static str),
}

impl fmt::Display for EntropyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntropyError::Platform(msg) => write!(f, "entropy platform failure: {msg}"),
        }
    }
}

impl std::error::Error for EntropyError {}

/// Minimal trait implemented by all entropy sources.
pub trait EntropySource {
    /// Try to fill `dest` with fresh entropy.
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError>;
}

/// Production source backed by the operating system RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostEntropySource;

impl HostEntropySource {
    pub const fn new() -> Self {
        Self
    }
}

impl EntropySource for HostEntropySource {
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        if dest.is_empty() {
            return Ok(());
        }
        getrandom(dest).map_err(|_| EntropyError::Platform("os rng unavailable"))
    }
}

/// Seeded splitmix64 stream. Never use outside tests and simulations.
#[cfg(feature = "sim")]
#[derive(Clone, Debug)]
pub struct SimEntropySource {
    state: u64,
}

#[cfg(feature = "sim")]
impl SimEntropySource {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9E37_79B9_7F4A_7C15),
        }
    }

    #[inline(always)]
    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

#[cfg(feature = "sim")]
impl EntropySource for SimEntropySource {
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
        Ok(())
    }
}
