use std::time::Duration;

use crate::chain::address::Address;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub rpc_url: String,
    pub chain_id: i64,
    /// Confidential payout token contract.
    pub token: Address,
    /// PayrollVault contract runs settle against.
    pub vault: Address,
    pub scheduler_interval: Duration,
    pub reconciler_interval: Duration,
}

fn required(name: &str) -> AppResult<String> {
    std::env::var(name).map_err(|_| AppError::Config(format!("{} must be set", name)))
}

fn address(name: &str) -> AppResult<Address> {
    required(name)?
        .parse()
        .map_err(|_| AppError::Config(format!("{} is not a valid address", name)))
}

fn seconds(name: &str, default: u64) -> AppResult<Duration> {
    match std::env::var(name) {
        Err(_) => Ok(Duration::from_secs(default)),
        Ok(raw) => raw
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| AppError::Config(format!("{} must be a number of seconds", name))),
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            rpc_url: required("RPC_URL")?,
            chain_id: std::env::var("CHAIN_ID")
                .unwrap_or_else(|_| "11155111".to_string())
                .parse()
                .map_err(|_| AppError::Config("CHAIN_ID must be an integer".to_string()))?,
            token: address("CUSDC_ADDRESS")?,
            vault: address("PAYROLL_VAULT_ADDRESS")?,
            scheduler_interval: seconds("SCHEDULER_INTERVAL_SECS", 60)?,
            reconciler_interval: seconds("RECONCILER_INTERVAL_SECS", 15)?,
        })
    }
}
