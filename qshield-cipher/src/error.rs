use qshield_entropy::EntropyError;
use thiserror::Error;

pub type QshieldResult<T> = Result<T, QshieldError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QshieldError {
    #[error("key derivation failed: {0}")]
    KeyDerivationFailure(String),
    #[error("temporal signature mismatch")]
    SignatureMismatch,
    #[error("unsupported dimensionality {requested}; supported range is {min}..={max}")]
    UnsupportedDimensionality { requested: u8, min: u8, max: u8 },
    #[error("rotation window lost for timestamp {timestamp_ms}: {reason}")]
    RotationWindowLost {
        timestamp_ms: u64,
        reason: &'static str,
    },
    #[error("base cipher failure: {0}")]
    BaseCipher(&'static str),
    #[error("malformed envelope: {0}")]
    InvalidEnvelope(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<EntropyError> for QshieldError {
    fn from(err: EntropyError) -> Self {
        QshieldError::KeyDerivationFailure(format!("entropy source unavailable: {err}"))
    }
}
