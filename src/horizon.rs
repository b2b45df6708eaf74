//! Ledger gateway: account lookup, friendbot funding, transaction submission.
//!
//! The engine talks to the ledger through the [`LedgerGateway`] trait so tests
//! can swap in a mock; [`HorizonGateway`] is the real client against a Horizon
//! server and its companion friendbot.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HorizonConfig;
use crate::error::BotError;

/// Funded-account state as the engine needs it.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    /// Current sequence number of the account (next tx uses sequence + 1).
    pub sequence: i64,
    /// Native-asset balance, as Horizon reports it.
    pub native_balance: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Look up an account. `NotFound` means the account isn't funded yet.
    async fn account_info(&self, public_key: &str) -> Result<AccountInfo, BotError>;

    /// Ask the network's friendbot to create and fund a new account.
    async fn fund_new_account(&self, public_key: &str) -> Result<(), BotError>;

    /// Submit a signed, base64-encoded transaction envelope.
    async fn submit(&self, envelope_xdr: &str) -> Result<(), BotError>;
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    sequence: String,
    balances: Vec<Balance>,
}

#[derive(Debug, Deserialize)]
struct Balance {
    balance: String,
    asset_type: String,
}

pub struct HorizonGateway {
    config: HorizonConfig,
    client: Client,
}

impl HorizonGateway {
    pub fn new(config: HorizonConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    async fn get_account(&self, public_key: &str) -> Result<AccountResponse, BotError> {
        let url = format!("{}/accounts/{}", self.config.url, public_key);
        // Transient transport failures on reads are retried once before
        // surfacing. Submission is never retried: a resend could double-pay.
        for attempt in 0..2u32 {
            match self.client.get(&url).send().await {
                Ok(resp) => {
                    if resp.status().as_u16() == 404 {
                        return Err(BotError::NotFound(format!(
                            "account {} not funded on network",
                            public_key
                        )));
                    }
                    if !resp.status().is_success() {
                        return Err(BotError::External(format!(
                            "horizon returned {}",
                            resp.status()
                        )));
                    }
                    return Ok(resp.json().await?);
                }
                Err(e) if attempt == 0 => {
                    warn!(error = %e, "account lookup failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("loop either returns or errors on the second attempt")
    }
}

#[async_trait]
impl LedgerGateway for HorizonGateway {
    async fn account_info(&self, public_key: &str) -> Result<AccountInfo, BotError> {
        let account = self.get_account(public_key).await?;
        let sequence = account
            .sequence
            .parse::<i64>()
            .map_err(|e| BotError::External(format!("bad sequence from horizon: {}", e)))?;
        let native_balance = account
            .balances
            .iter()
            .find(|b| b.asset_type == "native")
            .map(|b| b.balance.clone())
            .ok_or_else(|| BotError::External("no native balance in account".into()))?;
        Ok(AccountInfo {
            sequence,
            native_balance,
        })
    }

    async fn fund_new_account(&self, public_key: &str) -> Result<(), BotError> {
        let url = format!("{}?addr={}", self.config.friendbot_url, public_key);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(BotError::External(format!(
                "friendbot returned {}",
                resp.status()
            )));
        }
        debug!(public_key = %public_key, "account funded via friendbot");
        Ok(())
    }

    async fn submit(&self, envelope_xdr: &str) -> Result<(), BotError> {
        let url = format!("{}/transactions", self.config.url);
        let resp = self
            .client
            .post(&url)
            .form(&[("tx", envelope_xdr)])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(BotError::External(format!(
                "transaction submission failed ({}): {}",
                status, snippet
            )));
        }
        debug!("transaction accepted by horizon");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_response_parses_horizon_json() {
        let json = r#"{
            "sequence": "103420918407103888",
            "balances": [
                {"balance": "9999.9999900", "asset_type": "native"},
                {"balance": "10.0000000", "asset_type": "credit_alphanum4", "asset_code": "USD"}
            ]
        }"#;
        let account: AccountResponse = serde_json::from_str(json).unwrap();
        assert_eq!(account.sequence, "103420918407103888");
        assert_eq!(account.balances.len(), 2);
        assert_eq!(account.balances[0].asset_type, "native");
    }

    #[test]
    fn test_mock_gateway_account_info() {
        let mut mock = MockLedgerGateway::new();
        mock.expect_account_info().returning(|_| {
            Ok(AccountInfo {
                sequence: 7,
                native_balance: "100.0000000".to_string(),
            })
        });

        let info = tokio_test::block_on(mock.account_info("GABC")).unwrap();
        assert_eq!(info.sequence, 7);
        assert_eq!(info.native_balance, "100.0000000");
    }

    #[test]
    fn test_mock_gateway_not_funded() {
        let mut mock = MockLedgerGateway::new();
        mock.expect_account_info()
            .returning(|pk| Err(BotError::NotFound(format!("account {} not funded", pk))));

        let err = tokio_test::block_on(mock.account_info("GABC")).unwrap_err();
        assert!(matches!(err, BotError::NotFound(_)));
    }
}
