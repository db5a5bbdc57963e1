//! Envelope wire format and the temporal signature.
//!
//! ```json
//! {
//!   "encrypted": "<hex iv ‖ body>",
//!   "signature": "<hex hmac-sha256>",
//!   "timestamp": "1700000000000",
//!   "keyCoordinates": [0, 2, 1, 1, 0, 2, 2],
//!   "metadata": { "algorithm": "QuantumShield-v1.0", "dimensions": 3, "chaosLevel": "maximum" }
//! }
//! ```

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    error::{QshieldError, QshieldResult},
    matrix::AXES,
};

pub const ALGORITHM_ID: &str = "QuantumShield-v1.0";
pub const SIGNATURE_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub encrypted: String,
    pub signature: String,
    /// Milliseconds since the Unix epoch, as a decimal string.
    pub timestamp: String,
    pub key_coordinates: [u8; AXES],
    pub metadata: EnvelopeMetadata,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub algorithm: String,
    pub dimensions: u8,
    pub chaos_level: String,
    /// Caller-supplied pairs. Carried verbatim and not signed.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Envelope {
    pub fn to_json(&self) -> QshieldResult<String> {
        serde_json::to_string(self)
            .map_err(|err| QshieldError::InvalidEnvelope(format!("serialization failed: {err}")))
    }

    pub fn from_json(json: &str) -> QshieldResult<Self> {
        serde_json::from_str(json).map_err(|err| QshieldError::InvalidEnvelope(err.to_string()))
    }

    pub fn timestamp_ms(&self) -> QshieldResult<u64> {
        self.timestamp.parse().map_err(|_| {
            QshieldError::InvalidEnvelope(format!("timestamp {:?} is not a decimal u64", self.timestamp))
        })
    }

    pub fn ciphertext(&self) -> QshieldResult<Vec<u8>> {
        hex::decode(&self.encrypted)
            .map_err(|err| QshieldError::InvalidEnvelope(format!("encrypted field: {err}")))
    }
}

/// HMAC-SHA256 over the envelope's wire text.
pub struct TemporalSignature;

impl TemporalSignature {
    fn mac(key: &[u8; 32], encrypted: &str, timestamp: &str) -> QshieldResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|_| QshieldError::KeyDerivationFailure("hmac key rejected".into()))?;
        mac.update(&(encrypted.len() as u64).to_be_bytes());
        mac.update(encrypted.as_bytes());
        mac.update(timestamp.as_bytes());
        Ok(mac)
    }

    pub fn sign(key: &[u8; 32], encrypted: &str, timestamp: &str) -> QshieldResult<String> {
        let tag = Self::mac(key, encrypted, timestamp)?.finalize().into_bytes();
        Ok(hex::encode(tag))
    }

    /// Constant-time check. Undecodable tags count as a mismatch.
    pub fn verify(
        key: &[u8; 32],
        encrypted: &str,
        timestamp: &str,
        signature: &str,
    ) -> QshieldResult<()> {
        let tag = hex::decode(signature).map_err(|_| QshieldError::SignatureMismatch)?;
        if tag.len() != SIGNATURE_LEN {
            return Err(QshieldError::SignatureMismatch);
        }
        Self::mac(key, encrypted, timestamp)?
            .verify_slice(&tag)
            .map_err(|_| QshieldError::SignatureMismatch)
    }
}
