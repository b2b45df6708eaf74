//! Ed25519 account keys and strkey encoding.
//!
//! Stellar addresses wrap the raw 32-byte key in "strkey": a version byte,
//! the payload, and a CRC16-XModem checksum, base32-encoded. Public keys
//! render as `G…`, secret seeds as `S…`, both 56 characters.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::BotError;

/// strkey version byte for an ed25519 public key (`G…`).
pub const VERSION_ACCOUNT: u8 = 6 << 3;
/// strkey version byte for an ed25519 secret seed (`S…`).
pub const VERSION_SEED: u8 = 18 << 3;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// An ed25519 keypair for one ledger account.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a keypair from an `S…` secret seed string.
    pub fn from_seed(seed: &str) -> Result<Self, BotError> {
        let bytes = Zeroizing::new(strkey_decode(VERSION_SEED, seed)?);
        Ok(Self {
            signing: SigningKey::from_bytes(&bytes),
        })
    }

    /// The `G…` public key string.
    pub fn public_key(&self) -> String {
        strkey_encode(VERSION_ACCOUNT, &self.signing.verifying_key().to_bytes())
    }

    /// The `S…` secret seed string. Caller must not persist this in plaintext.
    pub fn secret_seed(&self) -> Zeroizing<String> {
        Zeroizing::new(strkey_encode(VERSION_SEED, &self.signing.to_bytes()))
    }

    /// Raw public key bytes.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Last four bytes of the public key, used as the signature hint.
    pub fn signature_hint(&self) -> [u8; 4] {
        let pk = self.public_key_bytes();
        [pk[28], pk[29], pk[30], pk[31]]
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        self.signing.verifying_key().verify(message, &sig).is_ok()
    }
}

/// Decode a `G…` public key string to its raw 32 bytes.
pub fn decode_public_key(address: &str) -> Result<[u8; 32], BotError> {
    strkey_decode(VERSION_ACCOUNT, address)
}

/// Check whether a string is a well-formed `G…` public key.
pub fn is_valid_public_key(address: &str) -> bool {
    decode_public_key(address).is_ok()
}

pub fn strkey_encode(version: u8, payload: &[u8; 32]) -> String {
    let mut data = Vec::with_capacity(35);
    data.push(version);
    data.extend_from_slice(payload);
    let crc = crc16_xmodem(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    base32_encode(&data)
}

pub fn strkey_decode(expected_version: u8, encoded: &str) -> Result<[u8; 32], BotError> {
    let data = base32_decode(encoded)?;
    if data.len() != 35 {
        return Err(BotError::InvalidKey(format!(
            "strkey has {} bytes, expected 35",
            data.len()
        )));
    }
    if data[0] != expected_version {
        return Err(BotError::InvalidKey("wrong strkey version byte".into()));
    }
    let crc = u16::from_le_bytes([data[33], data[34]]);
    if crc != crc16_xmodem(&data[..33]) {
        return Err(BotError::InvalidKey("strkey checksum mismatch".into()));
    }
    let mut payload = [0u8; 32];
    payload.copy_from_slice(&data[1..33]);
    Ok(payload)
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(encoded: &str) -> Result<Vec<u8>, BotError> {
    let mut out = Vec::with_capacity(encoded.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for c in encoded.bytes() {
        let value = BASE32_ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or_else(|| BotError::InvalidKey(format!("invalid base32 character {:?}", c as char)))?;
        buffer = (buffer << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    Ok(out)
}

/// CRC16-XModem (poly 0x1021, init 0), as used by strkey checksums.
fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
