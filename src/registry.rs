//! Wallet registry: owner identity → wallet record, snapshot-persisted.
//!
//! The whole registry is loaded at startup and rewritten as one JSON file on
//! every wallet creation (write to a temp file, then rename, so a crash never
//! leaves a half-written snapshot). Write volume is one record per new user,
//! so snapshot persistence is fine here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::AddressingConfig;
use crate::error::BotError;
use crate::vault::EncryptedSecret;

/// One custodial wallet. `public_key` is immutable once set and the secret
/// seed only ever exists here in encrypted form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub owner_id: String,
    pub public_key: String,
    pub encrypted_secret: EncryptedSecret,
}

pub struct WalletRegistry {
    path: PathBuf,
    records: HashMap<String, WalletRecord>,
}

impl WalletRegistry {
    /// Load the snapshot from disk, or start empty if the file doesn't exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BotError> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let data = fs::read_to_string(&path)?;
            serde_json::from_str(&data).map_err(|e| BotError::Storage(e.to_string()))?
        } else {
            HashMap::new()
        };
        info!(wallets = records.len(), path = %path.display(), "wallet registry loaded");
        Ok(Self { path, records })
    }

    /// Insert a new record and rewrite the snapshot. Fails without touching
    /// disk if the owner already has a wallet.
    pub fn create_record(
        &mut self,
        owner_id: &str,
        public_key: String,
        encrypted_secret: EncryptedSecret,
    ) -> Result<(), BotError> {
        if self.records.contains_key(owner_id) {
            return Err(BotError::AlreadyExists(owner_id.to_string()));
        }
        self.records.insert(
            owner_id.to_string(),
            WalletRecord {
                owner_id: owner_id.to_string(),
                public_key,
                encrypted_secret,
            },
        );
        // A record that never made it to disk must not stay in memory: it
        // would block a retried create and vanish on restart anyway.
        if let Err(e) = self.persist() {
            self.records.remove(owner_id);
            return Err(e);
        }
        Ok(())
    }

    pub fn lookup(&self, owner_id: &str) -> Option<&WalletRecord> {
        self.records.get(owner_id)
    }

    pub fn contains(&self, owner_id: &str) -> bool {
        self.records.contains_key(owner_id)
    }

    /// Resolve a raw user-typed handle to the recipient's public key.
    pub fn resolve_counterparty(
        &self,
        raw_handle: &str,
        addressing: &AddressingConfig,
    ) -> Result<String, BotError> {
        let canonical = canonical_handle(raw_handle, addressing);
        self.records
            .get(&canonical)
            .map(|r| r.public_key.clone())
            .ok_or_else(|| BotError::NotFound(format!("no wallet registered for {}", canonical)))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rewrite the full snapshot atomically: temp file in the same directory,
    /// then rename over the old snapshot.
    fn persist(&self) -> Result<(), BotError> {
        let data = serde_json::to_string_pretty(&self.records)
            .map_err(|e| BotError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Canonicalize a user-typed handle into the transport's chat identity.
/// A handle that already carries the transport suffix is taken as-is;
/// a bare number gets the configured country code and suffix prepended
/// and appended, matching how the transport itself forms chat ids.
pub fn canonical_handle(raw: &str, addressing: &AddressingConfig) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('@') {
        trimmed.to_string()
    } else {
        format!("{}{}{}", addressing.country_code, trimmed, addressing.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault;
    use tempfile::tempdir;

    fn dummy_secret() -> EncryptedSecret {
        vault::encrypt(b"SEED", "0000").unwrap()
    }

    fn addressing() -> AddressingConfig {
        AddressingConfig {
            country_code: "91".to_string(),
            suffix: "@chat.local".to_string(),
        }
    }

    #[test]
    fn test_load_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let registry = WalletRegistry::load(dir.path().join("wallets.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.json");

        let mut registry = WalletRegistry::load(&path).unwrap();
        registry
            .create_record("915551234@chat.local", "GABC".to_string(), dummy_secret())
            .unwrap();

        let reloaded = WalletRegistry::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.lookup("915551234@chat.local").unwrap().public_key,
            "GABC"
        );
    }

    #[test]
    fn test_duplicate_owner_rejected_and_record_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.json");

        let mut registry = WalletRegistry::load(&path).unwrap();
        registry
            .create_record("owner", "G_FIRST".to_string(), dummy_secret())
            .unwrap();

        let err = registry
            .create_record("owner", "G_SECOND".to_string(), dummy_secret())
            .unwrap_err();
        assert!(matches!(err, BotError::AlreadyExists(_)));
        assert_eq!(registry.lookup("owner").unwrap().public_key, "G_FIRST");
    }

    #[test]
    fn test_resolve_counterparty_normalizes_bare_number() {
        let dir = tempdir().unwrap();
        let mut registry = WalletRegistry::load(dir.path().join("w.json")).unwrap();
        registry
            .create_record("915551234@chat.local", "GDEF".to_string(), dummy_secret())
            .unwrap();

        let pk = registry
            .resolve_counterparty("5551234", &addressing())
            .unwrap();
        assert_eq!(pk, "GDEF");
    }

    #[test]
    fn test_resolve_counterparty_unknown() {
        let dir = tempdir().unwrap();
        let registry = WalletRegistry::load(dir.path().join("w.json")).unwrap();
        let err = registry
            .resolve_counterparty("5550000", &addressing())
            .unwrap_err();
        assert!(matches!(err, BotError::NotFound(_)));
    }

    #[test]
    fn test_canonical_handle() {
        let a = addressing();
        assert_eq!(canonical_handle("5551234", &a), "915551234@chat.local");
        assert_eq!(canonical_handle(" 5551234 ", &a), "915551234@chat.local");
        assert_eq!(
            canonical_handle("915551234@chat.local", &a),
            "915551234@chat.local"
        );
    }

    #[test]
    fn test_failed_persist_rolls_back_insert() {
        let dir = tempdir().unwrap();
        // Parent directory doesn't exist, so the snapshot write fails.
        let path = dir.path().join("missing").join("wallets.json");
        let mut registry = WalletRegistry::load(&path).unwrap();

        let err = registry
            .create_record("owner", "G".to_string(), dummy_secret())
            .unwrap_err();
        assert!(matches!(err, BotError::Storage(_)));
        assert!(!registry.contains("owner"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.json");
        let mut registry = WalletRegistry::load(&path).unwrap();
        registry
            .create_record("owner", "G".to_string(), dummy_secret())
            .unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
