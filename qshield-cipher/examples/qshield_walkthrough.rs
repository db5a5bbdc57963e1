//! End-to-end tour: seal a message, ship the envelope as JSON, and open it in
//! a second engine that imported the first engine's key material.
//!
//! ```text
//! RUST_LOG=qshield_cipher=debug cargo run -p qshield-cipher --example qshield_walkthrough
//! ```

use qshield_cipher::{CipherConfig, EncryptOptions, Envelope, QshieldResult, QuantumShieldCipher};

fn main() -> QshieldResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = CipherConfig::default().with_dimensions(3);
    let sender = QuantumShieldCipher::new(config.clone())?;
    let options = EncryptOptions::default().with_metadata("origin", "walkthrough");
    let envelope = sender.encrypt(b"hello world", &options)?;
    let wire = envelope.to_json()?;
    println!("envelope: {wire}");

    let receiver = QuantumShieldCipher::new(config)?;
    receiver.import_key_material(&sender.export_key_material()?)?;
    let plaintext = receiver.decrypt(&Envelope::from_json(&wire)?)?;
    println!("recovered: {}", String::from_utf8_lossy(&plaintext));

    let mut forged = envelope;
    forged.signature = "00".repeat(32);
    match receiver.decrypt(&forged) {
        Err(err) => println!("forged signature rejected: {err}"),
        Ok(_) => println!("forged signature accepted"),
    }
    Ok(())
}
