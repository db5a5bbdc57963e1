use std::sync::Arc;
use std::thread;

use qshield_cipher::{
    CipherConfig, EncryptOptions, EntropyError, EntropySource, QshieldError, QuantumShieldCipher,
};
use qshield_entropy::SimEntropySource;

fn small_config() -> CipherConfig {
    CipherConfig::default()
        .with_dimensions(3)
        .with_rotation_interval_ms(1_000)
}

fn sim_engine(seed: u64) -> QuantumShieldCipher<SimEntropySource> {
    QuantumShieldCipher::with_entropy(small_config(), SimEntropySource::with_seed(seed))
        .expect("engine")
}

#[test]
fn round_trip_across_payload_sizes() {
    let cipher = sim_engine(100);
    let mebibyte: Vec<u8> = (0..1 << 20).map(|i: u32| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
    let payloads: [&[u8]; 4] = [b"", b"q", b"sixteen byte msg", &mebibyte];
    for payload in payloads {
        let envelope = cipher
            .encrypt_at(payload, 42_000, &EncryptOptions::default())
            .expect("encrypt");
        let recovered = cipher.decrypt_at(&envelope, 42_100).expect("decrypt");
        assert_eq!(recovered.len(), payload.len());
        assert!(recovered == payload, "payload of {} bytes changed", payload.len());
    }
}

#[test]
fn hello_world_decrypts_later_in_the_same_window() {
    let cipher = sim_engine(1);
    let envelope = cipher
        .encrypt_at(b"hello world", 0, &EncryptOptions::default())
        .expect("encrypt");
    assert_eq!(envelope.timestamp, "0");
    assert_eq!(envelope.metadata.dimensions, 3);
    assert!(envelope.key_coordinates.iter().all(|c| *c < 3));
    let plaintext = cipher.decrypt_at(&envelope, 500).expect("decrypt");
    assert_eq!(plaintext, b"hello world");
}

#[test]
fn overwritten_signature_is_rejected() {
    let cipher = sim_engine(2);
    let mut envelope = cipher
        .encrypt_at(b"hello world", 0, &EncryptOptions::default())
        .expect("encrypt");
    let forged = hex::encode([0x5Au8; 32]);
    assert_eq!(forged.len(), envelope.signature.len());
    envelope.signature = forged;
    assert_eq!(
        cipher.decrypt_at(&envelope, 500),
        Err(QshieldError::SignatureMismatch)
    );
}

#[test]
fn exported_material_decrypts_in_a_fresh_engine() {
    let sender = sim_engine(3);
    let receiver = sim_engine(4);
    let envelope = sender
        .encrypt_at(b"hello world", 0, &EncryptOptions::default())
        .expect("encrypt");
    assert_eq!(
        receiver.decrypt_at(&envelope, 500),
        Err(QshieldError::SignatureMismatch)
    );

    let material = sender.export_key_material().expect("export");
    receiver.import_key_material(&material).expect("import");
    assert_eq!(receiver.matrix().fingerprint(), sender.matrix().fingerprint());
    assert_eq!(receiver.decrypt_at(&envelope, 500).expect("decrypt"), b"hello world");
}

#[test]
fn envelope_survives_json_transport() {
    let cipher = sim_engine(5);
    let options = EncryptOptions::default().with_metadata("language", "rust");
    let envelope = cipher.encrypt_at(b"over the wire", 7, &options).expect("encrypt");
    let json = envelope.to_json().expect("json");
    let parsed = qshield_cipher::Envelope::from_json(&json).expect("parse");
    assert_eq!(parsed.metadata.extra["language"], "rust");
    assert_eq!(cipher.decrypt_at(&parsed, 7).expect("decrypt"), b"over the wire");
}

#[test]
fn per_call_interval_override_round_trips() {
    let cipher = sim_engine(6);
    let options = EncryptOptions::default().with_rotation_interval_ms(60_000);
    let envelope = cipher.encrypt_at(b"slow rotation", 59_999, &options).expect("encrypt");
    assert_eq!(cipher.decrypt_at(&envelope, 60_000).expect("decrypt"), b"slow rotation");
}

#[test]
fn dimensionality_is_enforced() {
    let cipher = sim_engine(7);
    let too_many = EncryptOptions::default().with_dimension_count(40);
    assert!(matches!(
        cipher.encrypt_at(b"x", 0, &too_many),
        Err(QshieldError::UnsupportedDimensionality { requested: 40, min: 2, max: 16 })
    ));
    let foreign = EncryptOptions::default().with_dimension_count(5);
    assert!(matches!(
        cipher.encrypt_at(b"x", 0, &foreign),
        Err(QshieldError::UnsupportedDimensionality { requested: 5, .. })
    ));

    let mut envelope = cipher
        .encrypt_at(b"x", 0, &EncryptOptions::default().with_dimension_count(3))
        .expect("encrypt");
    envelope.metadata.dimensions = 1;
    assert!(matches!(
        cipher.decrypt_at(&envelope, 0),
        Err(QshieldError::UnsupportedDimensionality { requested: 1, .. })
    ));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let config = small_config().with_dimensions(20);
    assert!(matches!(
        QuantumShieldCipher::with_entropy(config, SimEntropySource::with_seed(0)),
        Err(QshieldError::UnsupportedDimensionality { requested: 20, .. })
    ));
}

#[test]
fn rekey_loses_earlier_windows() {
    let cipher = sim_engine(8);
    let envelope = cipher
        .encrypt_at(b"before", 1_000, &EncryptOptions::default())
        .expect("encrypt");
    cipher.rekey(5_000).expect("rekey");
    assert!(matches!(
        cipher.decrypt_at(&envelope, 5_001),
        Err(QshieldError::RotationWindowLost { timestamp_ms: 1_000, .. })
    ));
    let fresh = cipher
        .encrypt_at(b"after", 5_500, &EncryptOptions::default())
        .expect("encrypt");
    assert_eq!(cipher.decrypt_at(&fresh, 5_600).expect("decrypt"), b"after");
}

#[test]
fn retention_span_bounds_decryptability() {
    let config = small_config().with_key_retention_ms(Some(10_000));
    let cipher = QuantumShieldCipher::with_entropy(config, SimEntropySource::with_seed(9))
        .expect("engine");
    let envelope = cipher
        .encrypt_at(b"short lived", 100_000, &EncryptOptions::default())
        .expect("encrypt");
    assert_eq!(
        cipher.decrypt_at(&envelope, 110_000).expect("decrypt"),
        b"short lived"
    );
    assert!(matches!(
        cipher.decrypt_at(&envelope, 110_001),
        Err(QshieldError::RotationWindowLost { .. })
    ));
}

#[test]
fn corrupted_key_material_is_refused() {
    let cipher = sim_engine(10);
    let mut material = cipher.export_key_material().expect("export");
    let last_quote = material.iter().rposition(|b| *b == b'"').expect("json");
    let target = last_quote - 1;
    material[target] = if material[target] == b'0' { b'1' } else { b'0' };
    assert!(matches!(
        cipher.import_key_material(&material),
        Err(QshieldError::KeyDerivationFailure(_))
    ));
}

#[test]
fn material_with_foreign_dimensions_is_refused() {
    let wide = QuantumShieldCipher::with_entropy(
        small_config().with_dimensions(4),
        SimEntropySource::with_seed(11),
    )
    .expect("engine");
    let narrow = sim_engine(12);
    let material = wide.export_key_material().expect("export");
    assert!(matches!(
        narrow.import_key_material(&material),
        Err(QshieldError::UnsupportedDimensionality { requested: 4, .. })
    ));
}

/// Succeeds for the first `budget` fills, then reports a platform failure.
struct FailingSource {
    budget: usize,
}

impl EntropySource for FailingSource {
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        if self.budget == 0 {
            return Err(EntropyError::Platform("rng offline"));
        }
        self.budget -= 1;
        dest.fill(0xA5);
        Ok(())
    }
}

#[test]
fn missing_entropy_is_a_key_derivation_failure() {
    assert!(matches!(
        QuantumShieldCipher::with_entropy(small_config(), FailingSource { budget: 0 }),
        Err(QshieldError::KeyDerivationFailure(_))
    ));

    let cipher = QuantumShieldCipher::with_entropy(small_config(), FailingSource { budget: 1 })
        .expect("genesis draw succeeds");
    assert!(matches!(
        cipher.encrypt_at(b"x", 0, &EncryptOptions::default()),
        Err(QshieldError::KeyDerivationFailure(ref msg)) if msg.contains("rng offline")
    ));
}

#[test]
fn concurrent_callers_share_one_engine() {
    let cipher = Arc::new(sim_engine(13));
    let handles: Vec<_> = (0..4u64)
        .map(|worker| {
            let cipher = Arc::clone(&cipher);
            thread::spawn(move || {
                for round in 0..8u64 {
                    let message = format!("worker {worker} round {round}");
                    let ts = worker * 1_000 + round;
                    let envelope = cipher
                        .encrypt_at(message.as_bytes(), ts, &EncryptOptions::default())
                        .expect("encrypt");
                    let plain = cipher.decrypt_at(&envelope, ts).expect("decrypt");
                    assert_eq!(plain, message.as_bytes());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }
}

#[test]
fn wall_clock_helpers_round_trip() {
    let cipher = sim_engine(14);
    let envelope = cipher
        .encrypt(b"now", &EncryptOptions::default())
        .expect("encrypt");
    assert!(envelope.timestamp.parse::<u64>().expect("decimal") > 0);
    assert_eq!(cipher.decrypt(&envelope).expect("decrypt"), b"now");
}
