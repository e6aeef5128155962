//! Encrypt/decrypt a peer authenticator for storage in the `librarians`
//! table. Grounded on `original_source/librarian_server/encryption.py`'s
//! `encrypt_string`/`decrypt_string` pair (originally Fernet); the AEAD
//! primitive is taken from `spacedriveapp-spacedrive`'s crypto crate, which
//! settles on AES-256-GCM-SIV for at-rest secrets.

use aes_gcm_siv::aead::{Aead, KeyInit};
use aes_gcm_siv::{Aes256GcmSiv, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{LibrarianError, Result};

const NONCE_LEN: usize = 12;

fn derive_key(encryption_key: &str) -> Key<Aes256GcmSiv> {
    let digest = Sha256::digest(encryption_key.as_bytes());
    *Key::<Aes256GcmSiv>::from_slice(&digest)
}

/// Encrypt `plaintext` (a `"username:password"` authenticator) with
/// `encryption_key`, returning a base64 string safe to store in a text
/// column. The nonce is generated from the plaintext's own hash so encryption
/// is deterministic, matching the original's "one authenticator, one stored
/// value" expectation without needing a CSPRNG dependency on this path.
pub fn encrypt_authenticator(plaintext: &str, encryption_key: &str) -> Result<String> {
    if encryption_key.is_empty() {
        return Err(LibrarianError::Configuration(
            "no authenticator encryption key is configured".to_string(),
        ));
    }

    let cipher = Aes256GcmSiv::new(&derive_key(encryption_key));
    let nonce_source = Sha256::digest(plaintext.as_bytes());
    let nonce = Nonce::from_slice(&nonce_source[..NONCE_LEN]);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| LibrarianError::Other(anyhow::anyhow!("encryption failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_source[..NONCE_LEN]);
    out.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(out))
}

pub fn decrypt_authenticator(encoded: &str, encryption_key: &str) -> Result<String> {
    if encryption_key.is_empty() {
        return Err(LibrarianError::Configuration(
            "no authenticator encryption key is configured".to_string(),
        ));
    }

    let raw = BASE64
        .decode(encoded)
        .map_err(|e| LibrarianError::Configuration(format!("invalid authenticator encoding: {e}")))?;
    if raw.len() < NONCE_LEN {
        return Err(LibrarianError::Configuration(
            "authenticator ciphertext too short".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let cipher = Aes256GcmSiv::new(&derive_key(encryption_key));
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| LibrarianError::Other(anyhow::anyhow!("decryption failed: {e}")))?;

    String::from_utf8(plaintext)
        .map_err(|e| LibrarianError::Other(anyhow::anyhow!("decrypted authenticator not utf-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_authenticator() {
        let key = "a-very-secret-key";
        let encrypted = encrypt_authenticator("alice:hunter2", key).unwrap();
        let decrypted = decrypt_authenticator(&encrypted, key).unwrap();
        assert_eq!(decrypted, "alice:hunter2");
    }

    #[test]
    fn rejects_wrong_key() {
        let encrypted = encrypt_authenticator("alice:hunter2", "key-one").unwrap();
        assert!(decrypt_authenticator(&encrypted, "key-two").is_err());
    }

    #[test]
    fn rejects_empty_key() {
        assert!(encrypt_authenticator("alice:hunter2", "").is_err());
    }
}
