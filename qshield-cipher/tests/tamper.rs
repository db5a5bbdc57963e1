use qshield_cipher::{CipherConfig, EncryptOptions, Envelope, QshieldError, QuantumShieldCipher};
use qshield_entropy::SimEntropySource;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

const TRIALS: usize = 1_000;

fn engine() -> QuantumShieldCipher<SimEntropySource> {
    let config = CipherConfig::default()
        .with_dimensions(3)
        .with_rotation_interval_ms(1_000);
    QuantumShieldCipher::with_entropy(config, SimEntropySource::with_seed(0x7A)).expect("engine")
}

fn flip_text_bit(text: &str, rng: &mut ChaCha20Rng) -> String {
    let mut bytes = text.as_bytes().to_vec();
    let index = rng.gen_range(0..bytes.len());
    // Bits 0..=6 keep the byte ASCII, so the result stays valid UTF-8.
    bytes[index] ^= 1u8 << rng.gen_range(0..7u32);
    String::from_utf8(bytes).expect("ascii stays utf-8")
}

#[derive(Clone, Copy, Debug)]
enum Tamper {
    CiphertextBit,
    TimestampBit,
    EncryptedText,
    TimestampText,
}

fn tamper(envelope: &Envelope, kind: Tamper, rng: &mut ChaCha20Rng) -> Envelope {
    let mut forged = envelope.clone();
    match kind {
        Tamper::CiphertextBit => {
            let mut bytes = envelope.ciphertext().expect("hex");
            let index = rng.gen_range(0..bytes.len());
            bytes[index] ^= 1u8 << rng.gen_range(0..8u32);
            forged.encrypted = hex::encode(bytes);
        }
        Tamper::TimestampBit => {
            let ts = envelope.timestamp_ms().expect("decimal");
            forged.timestamp = (ts ^ (1u64 << rng.gen_range(0..64u32))).to_string();
        }
        Tamper::EncryptedText => forged.encrypted = flip_text_bit(&envelope.encrypted, rng),
        Tamper::TimestampText => forged.timestamp = flip_text_bit(&envelope.timestamp, rng),
    }
    forged
}

const KINDS: [Tamper; 4] = [
    Tamper::CiphertextBit,
    Tamper::TimestampBit,
    Tamper::EncryptedText,
    Tamper::TimestampText,
];

fn sealed_batch(cipher: &QuantumShieldCipher<SimEntropySource>, base_ms: u64) -> Vec<Envelope> {
    (0..8u64)
        .map(|i| {
            let message = format!("tamper target {i}");
            cipher
                .encrypt_at(message.as_bytes(), base_ms + i * 137, &EncryptOptions::default())
                .expect("encrypt")
        })
        .collect()
}

/// Runs the seeded bit-flip trials and checks every forgery is a signature
/// mismatch while the untouched envelopes still open.
fn assert_flips_rejected(
    cipher: &QuantumShieldCipher<SimEntropySource>,
    envelopes: &[Envelope],
    seed: u64,
) {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    for trial in 0..TRIALS {
        let envelope = &envelopes[trial % envelopes.len()];
        let kind = KINDS[trial % KINDS.len()];
        let forged = tamper(envelope, kind, &mut rng);
        assert_ne!(&forged, envelope, "trial {trial} produced no change");
        let now = envelope.timestamp_ms().expect("decimal");
        assert_eq!(
            cipher.decrypt_at(&forged, now),
            Err(QshieldError::SignatureMismatch),
            "trial {trial} ({kind:?}) was not rejected"
        );
    }

    for envelope in envelopes {
        let now = envelope.timestamp_ms().expect("decimal");
        cipher.decrypt_at(envelope, now).expect("untouched envelope still opens");
    }
}

#[test]
fn every_single_bit_flip_is_a_signature_mismatch() {
    let cipher = engine();
    let envelopes = sealed_batch(&cipher, 1_700_000_000_000);
    assert_flips_rejected(&cipher, &envelopes, 0x5EED);
}

#[test]
fn bit_flips_under_key_retention_are_signature_mismatches() {
    let config = CipherConfig::default()
        .with_dimensions(3)
        .with_rotation_interval_ms(1_000)
        .with_key_retention_ms(Some(10_000));
    let cipher =
        QuantumShieldCipher::with_entropy(config, SimEntropySource::with_seed(0x7B)).expect("engine");
    let envelopes = sealed_batch(&cipher, 1_700_000_000_000);
    assert_flips_rejected(&cipher, &envelopes, 0x5EEE);

    let mut forged = cipher
        .encrypt_at(b"retained", 100_000, &EncryptOptions::default())
        .expect("encrypt");
    forged.timestamp = "000000".into();
    assert_eq!(
        cipher.decrypt_at(&forged, 100_000),
        Err(QshieldError::SignatureMismatch)
    );
}

#[test]
fn bit_flips_after_rekey_are_signature_mismatches() {
    let cipher = engine();
    cipher.rekey(1_700_000_000_000).expect("rekey");
    let envelopes = sealed_batch(&cipher, 1_700_000_000_000);
    assert_flips_rejected(&cipher, &envelopes, 0x5EEF);

    cipher.rekey(5_000).expect("rekey");
    let mut forged = cipher
        .encrypt_at(b"fresh", 5_500, &EncryptOptions::default())
        .expect("encrypt");
    forged.timestamp = "4500".into();
    assert_eq!(
        cipher.decrypt_at(&forged, 5_500),
        Err(QshieldError::SignatureMismatch)
    );
}

#[test]
fn random_signatures_of_equal_length_never_verify() {
    let cipher = engine();
    let mut rng = ChaCha20Rng::seed_from_u64(0xB0B);
    let envelope = cipher
        .encrypt_at(b"hello world", 0, &EncryptOptions::default())
        .expect("encrypt");
    for _ in 0..64 {
        let mut forged = envelope.clone();
        let tag: [u8; 32] = rng.gen();
        forged.signature = hex::encode(tag);
        assert_eq!(
            cipher.decrypt_at(&forged, 500),
            Err(QshieldError::SignatureMismatch)
        );
        let text: String = (0..envelope.signature.len())
            .map(|_| rng.gen_range(b'!'..=b'~') as char)
            .collect();
        forged.signature = text;
        assert_eq!(
            cipher.decrypt_at(&forged, 500),
            Err(QshieldError::SignatureMismatch)
        );
    }
}
