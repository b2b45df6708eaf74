//! PIN-derived encryption of wallet secrets.
//!
//! The PIN is never stored. A per-record random salt feeds Argon2id to derive
//! a 256-bit key, and AES-256-GCM encrypts the secret seed under a fresh
//! random nonce. Salt and nonce are non-secret and stored alongside the
//! ciphertext; a wrong PIN surfaces as an authentication failure on decrypt.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::BotError;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Ciphertext plus the non-secret parameters needed to decrypt it.
/// Serialized into the registry snapshot; never contains plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// Derive a 256-bit AES key from the PIN and salt with Argon2id.
fn derive_key(pin: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, BotError> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(pin.as_bytes(), salt, key.as_mut())
        .map_err(|e| BotError::InvalidKey(e.to_string()))?;
    Ok(key)
}

/// Encrypt a plaintext secret under a PIN. Generates a fresh random salt and
/// nonce per call; identical inputs never produce identical ciphertext.
pub fn encrypt(secret: &[u8], pin: &str) -> Result<EncryptedSecret, BotError> {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(pin, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|e| BotError::InvalidKey(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), secret)
        .map_err(|_| BotError::Security)?;

    Ok(EncryptedSecret {
        salt: hex::encode(salt),
        nonce: hex::encode(nonce_bytes),
        ciphertext: hex::encode(ciphertext),
    })
}

/// Decrypt an [`EncryptedSecret`] with a PIN.
///
/// A wrong PIN, a tampered record, or malformed stored parameters all return
/// [`BotError::Security`] with no further detail. The plaintext comes back in
/// a [`Zeroizing`] buffer and is wiped when dropped.
pub fn decrypt(encrypted: &EncryptedSecret, pin: &str) -> Result<Zeroizing<Vec<u8>>, BotError> {
    let salt = hex::decode(&encrypted.salt).map_err(|_| BotError::Security)?;
    let nonce_bytes = hex::decode(&encrypted.nonce).map_err(|_| BotError::Security)?;
    let ciphertext = hex::decode(&encrypted.ciphertext).map_err(|_| BotError::Security)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(BotError::Security);
    }

    let key = derive_key(pin, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|e| BotError::InvalidKey(e.to_string()))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|_| BotError::Security)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let secret = b"SB3KDVGJXL7PJBBF7KDGYXS4KK75NWPQXYNBR2DYWMEY5XCBAJZLSEED";
        let encrypted = encrypt(secret, "1234").unwrap();
        let decrypted = decrypt(&encrypted, "1234").unwrap();
        assert_eq!(decrypted.as_slice(), secret);
    }

    #[test]
    fn test_wrong_pin_fails() {
        let encrypted = encrypt(b"secret", "1234").unwrap();
        match decrypt(&encrypted, "4321") {
            Err(BotError::Security) => {}
            other => panic!("expected Security error, got {:?}", other),
        }
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_call() {
        let a = encrypt(b"secret", "1234").unwrap();
        let b = encrypt(b"secret", "1234").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut encrypted = encrypt(b"secret", "1234").unwrap();
        let mut raw = hex::decode(&encrypted.ciphertext).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        encrypted.ciphertext = hex::encode(raw);
        assert!(matches!(decrypt(&encrypted, "1234"), Err(BotError::Security)));
    }

    #[test]
    fn test_tampered_salt_fails() {
        let mut encrypted = encrypt(b"secret", "1234").unwrap();
        let mut raw = hex::decode(&encrypted.salt).unwrap();
        raw[0] ^= 0xff;
        encrypted.salt = hex::encode(raw);
        assert!(matches!(decrypt(&encrypted, "1234"), Err(BotError::Security)));
    }

    #[test]
    fn test_malformed_stored_fields_fail_cleanly() {
        let mut encrypted = encrypt(b"secret", "1234").unwrap();
        encrypted.nonce = "zzzz".to_string();
        assert!(matches!(decrypt(&encrypted, "1234"), Err(BotError::Security)));
    }

    #[test]
    fn test_serde_roundtrip() {
        let encrypted = encrypt(b"secret", "1234").unwrap();
        let json = serde_json::to_string(&encrypted).unwrap();
        let restored: EncryptedSecret = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, encrypted);
        assert_eq!(decrypt(&restored, "1234").unwrap().as_slice(), b"secret");
    }
}
