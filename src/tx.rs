//! Payment transaction construction and signing.
//!
//! Builds the XDR for a single-operation native-asset payment by hand — the
//! envelope only ever contains one payment op, so a full XDR library isn't
//! warranted. Signing follows the network rules: the signature covers
//! `SHA-256(network_id || ENVELOPE_TYPE_TX || tx)` where `network_id` is the
//! SHA-256 of the network passphrase.

use base64::Engine;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::error::BotError;
use crate::keys::Keypair;

/// One stroop is 1e-7 of the native asset.
pub const STROOPS_PER_UNIT: i64 = 10_000_000;

const ENVELOPE_TYPE_TX: u32 = 2;
const KEY_TYPE_ED25519: u32 = 0;
const PRECOND_TIME: u32 = 1;
const MEMO_NONE: u32 = 0;
const OP_PAYMENT: u32 = 1;
const ASSET_NATIVE: u32 = 0;

/// A native-asset payment, ready to encode and sign.
pub struct PaymentTransaction {
    pub source: [u8; 32],
    pub destination: [u8; 32],
    pub amount_stroops: i64,
    pub sequence: i64,
    pub fee: u32,
    /// (min_time, max_time) validity window, unix seconds. 0 = unbounded.
    pub time_bounds: (u64, u64),
}

impl PaymentTransaction {
    /// XDR of the unsigned transaction body.
    fn tx_xdr(&self) -> Vec<u8> {
        let mut w = XdrWriter::new();
        // source account (MuxedAccount, ed25519)
        w.u32(KEY_TYPE_ED25519);
        w.fixed(&self.source);
        w.u32(self.fee);
        w.i64(self.sequence);
        // preconditions: time bounds only
        w.u32(PRECOND_TIME);
        w.u64(self.time_bounds.0);
        w.u64(self.time_bounds.1);
        w.u32(MEMO_NONE);
        // operations: exactly one payment, no per-op source override
        w.u32(1);
        w.u32(0); // no operation source account
        w.u32(OP_PAYMENT);
        w.u32(KEY_TYPE_ED25519);
        w.fixed(&self.destination);
        w.u32(ASSET_NATIVE);
        w.i64(self.amount_stroops);
        // ext
        w.u32(0);
        w.into_bytes()
    }

    /// The hash that gets signed for the given network.
    pub fn signing_hash(&self, network_passphrase: &str) -> [u8; 32] {
        let network_id: [u8; 32] = Sha256::digest(network_passphrase.as_bytes()).into();
        let mut payload = Vec::new();
        payload.extend_from_slice(&network_id);
        payload.extend_from_slice(&ENVELOPE_TYPE_TX.to_be_bytes());
        payload.extend_from_slice(&self.tx_xdr());
        Sha256::digest(&payload).into()
    }

    /// Sign and produce the base64-encoded `TransactionEnvelope` XDR that
    /// Horizon accepts for submission.
    pub fn sign(&self, network_passphrase: &str, keypair: &Keypair) -> String {
        let signature = keypair.sign(&self.signing_hash(network_passphrase));

        let mut w = XdrWriter::new();
        w.u32(ENVELOPE_TYPE_TX);
        w.raw(&self.tx_xdr());
        // decorated signatures
        w.u32(1);
        w.fixed(&keypair.signature_hint());
        w.var_opaque(&signature);

        base64::engine::general_purpose::STANDARD.encode(w.into_bytes())
    }
}

/// Convert a decimal native-asset amount to stroops. Rejects non-positive
/// amounts and anything finer than 7 decimal places.
pub fn to_stroops(amount: Decimal) -> Result<i64, BotError> {
    if amount <= Decimal::ZERO {
        return Err(BotError::UserInput("amount must be positive".into()));
    }
    let scaled = amount
        .checked_mul(Decimal::from(STROOPS_PER_UNIT))
        .ok_or_else(|| BotError::UserInput("amount too large".into()))?;
    if !scaled.fract().is_zero() {
        return Err(BotError::UserInput(
            "amount has more than 7 decimal places".into(),
        ));
    }
    scaled
        .to_i64()
        .ok_or_else(|| BotError::UserInput("amount too large".into()))
}

/// Minimal big-endian XDR writer (RFC 4506): everything we emit is u32/u64/
/// i64, fixed opaque, or variable opaque padded to 4 bytes.
struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn var_opaque(&mut self, bytes: &[u8]) {
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        let pad = (4 - bytes.len() % 4) % 4;
        self.buf.extend_from_slice(&[0u8; 3][..pad]);
    }

    fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn sample_tx(kp: &Keypair, dest: &Keypair) -> PaymentTransaction {
        PaymentTransaction {
            source: kp.public_key_bytes(),
            destination: dest.public_key_bytes(),
            amount_stroops: 25 * STROOPS_PER_UNIT,
            sequence: 1234567890,
            fee: 100,
            time_bounds: (0, 1_800_000_000),
        }
    }

    #[test]
    fn test_to_stroops() {
        assert_eq!(
            to_stroops(Decimal::from_str("25").unwrap()).unwrap(),
            250_000_000
        );
        assert_eq!(
            to_stroops(Decimal::from_str("0.0000001").unwrap()).unwrap(),
            1
        );
        assert_eq!(
            to_stroops(Decimal::from_str("2.5").unwrap()).unwrap(),
            25_000_000
        );
    }

    #[test]
    fn test_to_stroops_rejects_bad_amounts() {
        assert!(to_stroops(Decimal::ZERO).is_err());
        assert!(to_stroops(Decimal::from_str("-1").unwrap()).is_err());
        assert!(to_stroops(Decimal::from_str("0.00000001").unwrap()).is_err());
    }

    #[test]
    fn test_tx_xdr_is_deterministic() {
        let kp = Keypair::generate();
        let dest = Keypair::generate();
        let tx = sample_tx(&kp, &dest);
        assert_eq!(tx.tx_xdr(), tx.tx_xdr());
    }

    #[test]
    fn test_tx_xdr_layout() {
        let kp = Keypair::generate();
        let dest = Keypair::generate();
        let tx = sample_tx(&kp, &dest);
        let xdr = tx.tx_xdr();

        // key type discriminant, then the raw source key
        assert_eq!(&xdr[0..4], &0u32.to_be_bytes());
        assert_eq!(&xdr[4..36], &kp.public_key_bytes());
        // fee
        assert_eq!(&xdr[36..40], &100u32.to_be_bytes());
        // sequence
        assert_eq!(&xdr[40..48], &1234567890i64.to_be_bytes());
        // fixed-size body: source(36) + fee(4) + seq(8) + precond(4+16) +
        // memo(4) + ops count(4) + op source(4) + op type(4) + dest(36) +
        // asset(4) + amount(8) + ext(4)
        assert_eq!(xdr.len(), 36 + 4 + 8 + 20 + 4 + 4 + 4 + 4 + 36 + 4 + 8 + 4);
    }

    #[test]
    fn test_signing_hash_differs_by_sequence_and_network() {
        let kp = Keypair::generate();
        let dest = Keypair::generate();
        let a = sample_tx(&kp, &dest);
        let mut b = sample_tx(&kp, &dest);
        b.sequence += 1;

        let passphrase = "Test SDF Network ; September 2015";
        assert_ne!(a.signing_hash(passphrase), b.signing_hash(passphrase));
        assert_ne!(
            a.signing_hash(passphrase),
            a.signing_hash("Public Global Stellar Network ; September 2015")
        );
    }

    #[test]
    fn test_signature_verifies_over_signing_hash() {
        let kp = Keypair::generate();
        let dest = Keypair::generate();
        let tx = sample_tx(&kp, &dest);
        let passphrase = "Test SDF Network ; September 2015";

        let envelope = tx.sign(passphrase, &kp);
        let raw = base64::engine::general_purpose::STANDARD
            .decode(envelope)
            .unwrap();

        // envelope = type(4) + tx + sig count(4) + hint(4) + sig len(4) + sig(64)
        let tx_len = tx.tx_xdr().len();
        assert_eq!(&raw[0..4], &2u32.to_be_bytes());
        assert_eq!(&raw[4..4 + tx_len], tx.tx_xdr().as_slice());
        assert_eq!(&raw[4 + tx_len..8 + tx_len], &1u32.to_be_bytes());
        assert_eq!(&raw[8 + tx_len..12 + tx_len], &kp.signature_hint());
        assert_eq!(&raw[12 + tx_len..16 + tx_len], &64u32.to_be_bytes());

        let mut sig = [0u8; 64];
        sig.copy_from_slice(&raw[16 + tx_len..80 + tx_len]);
        assert!(kp.verify(&tx.signing_hash(passphrase), &sig));
    }

    #[test]
    fn test_var_opaque_padding() {
        let mut w = XdrWriter::new();
        w.var_opaque(&[1, 2, 3, 4, 5]);
        // 4 length bytes + 5 data bytes + 3 padding
        assert_eq!(w.into_bytes().len(), 12);
    }
}
