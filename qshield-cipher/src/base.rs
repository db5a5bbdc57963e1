//! AES-256-CBC with PKCS#7 padding and a fresh IV per call.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use qshield_entropy::{EntropyPool, EntropySource};

use crate::error::{QshieldError, QshieldResult};

pub const IV_LEN: usize = 16;
pub const BLOCK_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Output of [`BaseCipherLayer::seal`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedBlock {
    pub iv: [u8; IV_LEN],
    pub body: Vec<u8>,
}

impl SealedBlock {
    /// `iv ‖ body`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_LEN + self.body.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.body);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> QshieldResult<Self> {
        if bytes.len() < IV_LEN + BLOCK_LEN || (bytes.len() - IV_LEN) % BLOCK_LEN != 0 {
            return Err(QshieldError::BaseCipher("ciphertext is not whole blocks"));
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[..IV_LEN]);
        Ok(Self {
            iv,
            body: bytes[IV_LEN..].to_vec(),
        })
    }
}

pub struct BaseCipherLayer;

impl BaseCipherLayer {
    pub fn seal<S: EntropySource>(
        pool: &EntropyPool<S>,
        key: &[u8; 32],
        plaintext: &[u8],
    ) -> QshieldResult<SealedBlock> {
        let mut iv = [0u8; IV_LEN];
        pool.fill(&mut iv)?;
        Ok(Self::seal_with_iv(key, iv, plaintext))
    }

    pub fn seal_with_iv(key: &[u8; 32], iv: [u8; IV_LEN], plaintext: &[u8]) -> SealedBlock {
        let body =
            Aes256CbcEnc::new(key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        SealedBlock { iv, body }
    }

    pub fn open(key: &[u8; 32], sealed: &SealedBlock) -> QshieldResult<Vec<u8>> {
        Aes256CbcDec::new(key.into(), &sealed.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&sealed.body)
            .map_err(|_| QshieldError::BaseCipher("padding check failed"))
    }
}
