pub mod agent;
pub mod config;
pub mod dialog;
pub mod engine;
pub mod error;
pub mod horizon;
pub mod keys;
pub mod registry;
pub mod transport;
pub mod tx;
pub mod vault;
