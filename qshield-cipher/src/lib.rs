//! QuantumShield: a time-indexed envelope cipher.
//!
//! `encrypt` picks a leaf of a seven-axis [`KeyMatrix`] from the timestamp
//! and a fresh entropy sample, runs attractor whitening and the seven
//! [`DimensionStage`]s over the plaintext, seals the result with
//! AES-256-CBC, mixes the ciphertext through the [`PostProcessingStack`] and
//! signs `{encrypted, timestamp}` with HMAC-SHA256. `decrypt` checks the
//! signature before touching the ciphertext, then runs every layer backwards.
//!
//! Only the base cipher layer provides confidentiality. The lattice, chaos
//! and geometric stages are keyed, invertible mixing and carry no security
//! claim of their own.

pub mod base;
pub mod chaos;
pub mod config;
pub mod dimensional;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod matrix;
pub mod post;
pub mod scheduler;

pub use base::{BaseCipherLayer, SealedBlock};
pub use chaos::{Attractor, ChaosEngine, ChaosState, ClassicChaos};
pub use config::{load_config, ChaosConfig, ChaosLevel, CipherConfig, ConfigFormat, EncryptOptions};
pub use dimensional::{DimensionStage, DimensionalTransformStack};
pub use engine::QuantumShieldCipher;
pub use envelope::{Envelope, EnvelopeMetadata, TemporalSignature, ALGORITHM_ID};
pub use error::{QshieldError, QshieldResult};
pub use matrix::{DimensionCoordinates, KeyBlock, KeyMatrix, KeyMaterial};
pub use post::{PostPass, PostProcessingStack};
pub use qshield_entropy::{EntropyError, EntropyPool, EntropySample, EntropySource, HostEntropySource};
pub use scheduler::{ScheduledKey, TemporalKeyScheduler};
