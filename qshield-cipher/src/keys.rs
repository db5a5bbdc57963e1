use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::{QshieldError, QshieldResult},
    matrix::KeyBlock,
};

const SUBKEY_SALT: &[u8] = b"QSHIELD:SUBKEYS:v1";
const LABEL_CIPHER: &[u8] = b"qshield/base-cipher/aes-256-cbc";
const LABEL_MAC: &[u8] = b"qshield/temporal-signature/hmac-sha256";
const LABEL_POST: &[u8] = b"qshield/post-processing";

/// Per-envelope sub-keys expanded from one temporal key block.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub cipher: [u8; 32],
    pub mac: [u8; 32],
    pub post: [u8; 32],
}

impl SessionKeys {
    pub fn derive(key: &KeyBlock) -> QshieldResult<Self> {
        let hkdf = Hkdf::<Sha256>::new(Some(SUBKEY_SALT), key.as_bytes());
        let mut keys = Self {
            cipher: [0u8; 32],
            mac: [0u8; 32],
            post: [0u8; 32],
        };
        for (label, out) in [
            (LABEL_CIPHER, &mut keys.cipher),
            (LABEL_MAC, &mut keys.mac),
            (LABEL_POST, &mut keys.post),
        ] {
            hkdf.expand(label, out)
                .map_err(|_| QshieldError::KeyDerivationFailure("hkdf expand failed".into()))?;
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_keys_are_distinct_and_stable() {
        let block = KeyBlock::from_bytes([42u8; 64]);
        let first = SessionKeys::derive(&block).unwrap();
        let second = SessionKeys::derive(&block).unwrap();
        assert_eq!(first.cipher, second.cipher);
        assert_ne!(first.cipher, first.mac);
        assert_ne!(first.mac, first.post);
    }

    #[test]
    fn sub_keys_follow_the_block() {
        let a = SessionKeys::derive(&KeyBlock::from_bytes([1u8; 64])).unwrap();
        let b = SessionKeys::derive(&KeyBlock::from_bytes([2u8; 64])).unwrap();
        assert_ne!(a.mac, b.mac);
    }
}
