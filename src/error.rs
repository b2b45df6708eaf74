use thiserror::Error;

/// Error taxonomy for the wallet bot.
///
/// `UserInput` and `NotFound` are always answered with a corrective message;
/// `Security` aborts the current flow without revealing what was wrong;
/// `External` is reported generically ("try again later") and never crashes
/// the engine.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("{0}")]
    UserInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Wrong PIN or corrupted ciphertext. Deliberately carries no detail.
    #[error("decryption failed")]
    Security,

    #[error("external service error: {0}")]
    External(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::External(err.to_string())
    }
}

impl From<rumqttc::ClientError> for BotError {
    fn from(err: rumqttc::ClientError) -> Self {
        BotError::External(err.to_string())
    }
}
