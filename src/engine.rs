//! Conversation engine: command dispatch and the multi-step dialog flows.
//!
//! Every inbound message resolves to a list of reply texts. The engine holds
//! the per-owner lock for the whole exchange, so two messages from the same
//! chat can never interleave their registry or dialog updates. PINs and seeds
//! only ever cross this module inside `Zeroizing` buffers and are wiped on
//! every exit path, success or not.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::agent::WalletAgent;
use crate::dialog::{CreationStep, PaymentStep, PendingOperation};
use crate::error::BotError;
use crate::keys::{decode_public_key, Keypair};
use crate::tx::{to_stroops, PaymentTransaction};
use crate::vault;

const REPLY_PIN_PROMPT: &str = "Please create a PIN for your wallet:";
const REPLY_PIN_CONFIRM_PROMPT: &str = "Please re-enter your PIN to confirm:";
const REPLY_WALLET_CREATED: &str = "Wallet created successfully!";
const REPLY_PIN_MISMATCH: &str = "PINs do not match. Please start over with /create.";
const REPLY_WALLET_EXISTS: &str = "You already have a wallet.";
const REPLY_NO_WALLET: &str = "You don't have a wallet yet. Create one using /create.";
const REPLY_RECIPIENT_PROMPT: &str = "Please enter the recipient's phone number:";
const REPLY_AMOUNT_PROMPT: &str = "Please enter the amount to send:";
const REPLY_AMOUNT_RETRY: &str =
    "That doesn't look like a valid amount. Please enter a number like 10 or 2.5:";
const REPLY_TX_PIN_PROMPT: &str = "Please enter your PIN to confirm the transaction:";
const REPLY_TX_FAILED: &str = "Transaction failed. Please try again later.";
const REPLY_NO_PENDING_TX: &str = "No pending transaction. Use /send to start a new transaction.";
const REPLY_RECIPIENT_UNKNOWN: &str =
    "Recipient not found. They need to create a wallet with /create first.";
const REPLY_NOT_FUNDED: &str = "Your account is not funded on the network yet.";
const REPLY_BALANCE_ERROR: &str = "Error checking balance. Please try again later.";
const REPLY_CREATE_FAILED: &str = "Could not save your wallet. Please try again with /create.";
const REPLY_FUNDING_FAILED: &str =
    "Wallet created, but funding it failed. Please try again later.";
const REPLY_SENDER_MISSING: &str =
    "Sender wallet not found. Make sure you have created a wallet using /create.";
const REPLY_FREE_TEXT_HINT: &str = "Type /help to see what I can do.";
const REPLY_UNKNOWN_COMMAND: &str = "Unknown command. Type /help for available commands.";

const REPLY_HELP: &str = "Available commands:\n\
/create - Create a new wallet\n\
/balance - Check your XLM balance\n\
/getKey - Show your public key\n\
/send - Send XLM to another user\n\
/confirm - Confirm a pending transaction\n\
/help - Show this message";

impl WalletAgent {
    /// Handle one inbound message from one owner and return the replies to
    /// send back, in order.
    pub async fn handle_message(&self, owner_id: &str, text: &str) -> Vec<String> {
        let _guard = self.locks.acquire(owner_id).await;

        let trimmed = text.trim();
        if trimmed.starts_with('/') {
            self.handle_command(owner_id, trimmed).await
        } else if let Some(op) = self.dialogs.take(owner_id).await {
            self.advance_flow(owner_id, op, trimmed).await
        } else {
            vec![REPLY_FREE_TEXT_HINT.to_string()]
        }
    }

    async fn handle_command(&self, owner_id: &str, command: &str) -> Vec<String> {
        info!(owner_id = %owner_id, command = %command, "handling command");
        match command {
            "/create" => self.cmd_create(owner_id).await,
            "/balance" => self.cmd_balance(owner_id).await,
            "/getKey" => self.cmd_get_key(owner_id).await,
            "/send" => self.cmd_send(owner_id).await,
            "/confirm" => self.cmd_confirm(owner_id).await,
            "/help" => vec![REPLY_HELP.to_string()],
            _ => vec![REPLY_UNKNOWN_COMMAND.to_string()],
        }
    }

    async fn cmd_create(&self, owner_id: &str) -> Vec<String> {
        if self.registry.lock().await.contains(owner_id) {
            return vec![REPLY_WALLET_EXISTS.to_string()];
        }
        // Keys are generated up front; nothing is persisted until the PIN is
        // confirmed, so an abandoned flow leaves no trace.
        let keypair = Keypair::generate();
        self.dialogs
            .begin(
                owner_id,
                PendingOperation::new_wallet_creation(keypair.public_key(), keypair.secret_seed()),
            )
            .await;
        vec![REPLY_PIN_PROMPT.to_string()]
    }

    async fn cmd_balance(&self, owner_id: &str) -> Vec<String> {
        let public_key = {
            let registry = self.registry.lock().await;
            match registry.lookup(owner_id) {
                Some(record) => record.public_key.clone(),
                None => return vec![REPLY_NO_WALLET.to_string()],
            }
        };
        match self.ledger.account_info(&public_key).await {
            Ok(info) => vec![format!("Your XLM balance is: {}", info.native_balance)],
            Err(BotError::NotFound(_)) => vec![REPLY_NOT_FUNDED.to_string()],
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "balance lookup failed");
                vec![REPLY_BALANCE_ERROR.to_string()]
            }
        }
    }

    async fn cmd_get_key(&self, owner_id: &str) -> Vec<String> {
        let registry = self.registry.lock().await;
        match registry.lookup(owner_id) {
            Some(record) => vec![format!("Your public key is: {}", record.public_key)],
            None => vec![REPLY_NO_WALLET.to_string()],
        }
    }

    async fn cmd_send(&self, owner_id: &str) -> Vec<String> {
        if !self.registry.lock().await.contains(owner_id) {
            return vec![REPLY_NO_WALLET.to_string()];
        }
        // Replaces any pending operation, wiping its secrets.
        self.dialogs
            .begin(owner_id, PendingOperation::new_payment())
            .await;
        vec![REPLY_RECIPIENT_PROMPT.to_string()]
    }

    /// `/confirm` only re-prompts for the PIN; the PIN itself must arrive as
    /// free text so it stays inside the dialog flow.
    async fn cmd_confirm(&self, owner_id: &str) -> Vec<String> {
        match self.dialogs.take(owner_id).await {
            Some(op) => {
                let awaiting_pin = matches!(
                    op,
                    PendingOperation::Payment {
                        step: PaymentStep::AwaitingPinForConfirmation,
                        ..
                    }
                );
                self.dialogs.restore(owner_id, op).await;
                if awaiting_pin {
                    vec![REPLY_TX_PIN_PROMPT.to_string()]
                } else {
                    vec![REPLY_NO_PENDING_TX.to_string()]
                }
            }
            None => vec![REPLY_NO_PENDING_TX.to_string()],
        }
    }

    /// Feed one free-text message into the owner's pending operation. The
    /// operation has already been taken out of the store; terminal paths
    /// simply drop it, intermediate ones restore the advanced state.
    async fn advance_flow(&self, owner_id: &str, op: PendingOperation, text: &str) -> Vec<String> {
        match op {
            PendingOperation::WalletCreation {
                step: CreationStep::AwaitingPin,
                public_key,
                secret_seed,
                ..
            } => {
                self.dialogs
                    .restore(
                        owner_id,
                        PendingOperation::WalletCreation {
                            step: CreationStep::AwaitingPinConfirmation,
                            public_key,
                            secret_seed,
                            pin: Some(Zeroizing::new(text.to_string())),
                        },
                    )
                    .await;
                vec![REPLY_PIN_CONFIRM_PROMPT.to_string()]
            }
            PendingOperation::WalletCreation {
                step: CreationStep::AwaitingPinConfirmation,
                public_key,
                secret_seed,
                pin,
            } => {
                if pin.as_ref().map(|p| p.as_str()) == Some(text) {
                    self.finish_wallet_creation(owner_id, public_key, secret_seed, text)
                        .await
                } else {
                    // Seed and first PIN are dropped (and zeroized) here.
                    vec![REPLY_PIN_MISMATCH.to_string()]
                }
            }
            PendingOperation::Payment {
                step: PaymentStep::AwaitingRecipient,
                ..
            } => {
                self.dialogs
                    .restore(
                        owner_id,
                        PendingOperation::Payment {
                            step: PaymentStep::AwaitingAmount,
                            recipient: Some(text.to_string()),
                            amount: None,
                        },
                    )
                    .await;
                vec![REPLY_AMOUNT_PROMPT.to_string()]
            }
            PendingOperation::Payment {
                step: PaymentStep::AwaitingAmount,
                recipient,
                ..
            } => match Decimal::from_str(text).ok().filter(|a| to_stroops(*a).is_ok()) {
                Some(amount) => {
                    self.dialogs
                        .restore(
                            owner_id,
                            PendingOperation::Payment {
                                step: PaymentStep::AwaitingPinForConfirmation,
                                recipient,
                                amount: Some(amount),
                            },
                        )
                        .await;
                    vec![REPLY_TX_PIN_PROMPT.to_string()]
                }
                None => {
                    // Stay on the same step and let the user try again.
                    self.dialogs
                        .restore(
                            owner_id,
                            PendingOperation::Payment {
                                step: PaymentStep::AwaitingAmount,
                                recipient,
                                amount: None,
                            },
                        )
                        .await;
                    vec![REPLY_AMOUNT_RETRY.to_string()]
                }
            },
            PendingOperation::Payment {
                step: PaymentStep::AwaitingPinForConfirmation,
                recipient,
                amount,
            } => {
                // Terminal either way: the slot stays empty after this.
                let pin = Zeroizing::new(text.to_string());
                match (recipient, amount) {
                    (Some(recipient), Some(amount)) => {
                        self.attempt_payment(owner_id, &recipient, amount, &pin).await
                    }
                    _ => vec![REPLY_TX_FAILED.to_string()],
                }
            }
        }
    }

    async fn finish_wallet_creation(
        &self,
        owner_id: &str,
        public_key: String,
        secret_seed: Zeroizing<String>,
        pin: &str,
    ) -> Vec<String> {
        let encrypted = match vault::encrypt(secret_seed.as_bytes(), pin) {
            Ok(encrypted) => encrypted,
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "seed encryption failed");
                return vec![REPLY_CREATE_FAILED.to_string()];
            }
        };
        {
            let mut registry = self.registry.lock().await;
            match registry.create_record(owner_id, public_key.clone(), encrypted) {
                Ok(()) => {}
                Err(BotError::AlreadyExists(_)) => return vec![REPLY_WALLET_EXISTS.to_string()],
                Err(e) => {
                    warn!(owner_id = %owner_id, error = %e, "failed to persist wallet");
                    return vec![REPLY_CREATE_FAILED.to_string()];
                }
            }
        }
        info!(owner_id = %owner_id, public_key = %public_key, "wallet created");

        // The record is already persisted; a funding failure is reported but
        // the wallet stays.
        match self.ledger.fund_new_account(&public_key).await {
            Ok(()) => vec![REPLY_WALLET_CREATED.to_string()],
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "friendbot funding failed");
                vec![REPLY_FUNDING_FAILED.to_string()]
            }
        }
    }

    /// Decrypt, build, sign, submit. Any failure collapses to the same
    /// generic reply so a wrong PIN is indistinguishable from a network
    /// error to anyone watching the chat.
    async fn attempt_payment(
        &self,
        owner_id: &str,
        recipient_raw: &str,
        amount: Decimal,
        pin: &Zeroizing<String>,
    ) -> Vec<String> {
        let (record, recipient_key) = {
            let registry = self.registry.lock().await;
            let record = match registry.lookup(owner_id) {
                Some(record) => record.clone(),
                None => return vec![REPLY_SENDER_MISSING.to_string()],
            };
            let recipient_key =
                match registry.resolve_counterparty(recipient_raw, &self.config.addressing) {
                    Ok(key) => key,
                    Err(BotError::NotFound(_)) => {
                        return vec![REPLY_RECIPIENT_UNKNOWN.to_string()]
                    }
                    Err(e) => {
                        warn!(owner_id = %owner_id, error = %e, "recipient resolution failed");
                        return vec![REPLY_TX_FAILED.to_string()];
                    }
                };
            (record, recipient_key)
        };

        let seed = match vault::decrypt(&record.encrypted_secret, pin) {
            Ok(seed) => seed,
            Err(_) => {
                // Wrong PIN or corrupt record; never sign, never say which.
                warn!(owner_id = %owner_id, "seed decryption failed");
                return vec![REPLY_TX_FAILED.to_string()];
            }
        };
        let keypair = {
            let seed_str = match std::str::from_utf8(&seed) {
                Ok(s) => s,
                Err(_) => {
                    warn!(owner_id = %owner_id, "decrypted seed is not valid UTF-8");
                    return vec![REPLY_TX_FAILED.to_string()];
                }
            };
            match Keypair::from_seed(seed_str) {
                Ok(kp) => kp,
                Err(e) => {
                    warn!(owner_id = %owner_id, error = %e, "decrypted seed is not a valid key");
                    return vec![REPLY_TX_FAILED.to_string()];
                }
            }
        };
        drop(seed);

        let amount_stroops = match to_stroops(amount) {
            Ok(stroops) => stroops,
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "amount rejected at signing time");
                return vec![REPLY_TX_FAILED.to_string()];
            }
        };
        let destination = match decode_public_key(&recipient_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "recipient record holds a bad key");
                return vec![REPLY_TX_FAILED.to_string()];
            }
        };
        let info = match self.ledger.account_info(&record.public_key).await {
            Ok(info) => info,
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "sender account lookup failed");
                return vec![REPLY_TX_FAILED.to_string()];
            }
        };

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let tx = PaymentTransaction {
            source: keypair.public_key_bytes(),
            destination,
            amount_stroops,
            sequence: info.sequence + 1,
            fee: self.config.horizon.base_fee,
            time_bounds: (0, now + self.config.horizon.tx_timeout_secs),
        };
        let envelope = tx.sign(&self.config.horizon.network_passphrase, &keypair);

        match self.ledger.submit(&envelope).await {
            Ok(()) => {
                info!(owner_id = %owner_id, amount = %amount, "payment submitted");
                vec![format!("Payment of {} XLM sent to recipient.", amount.normalize())]
            }
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "transaction submission failed");
                vec![REPLY_TX_FAILED.to_string()]
            }
        }
    }
}
