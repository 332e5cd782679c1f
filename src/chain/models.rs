use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::Type;
use std::fmt;
use uuid::Uuid;

use crate::chain::address::Address;

/// What an externally-submitted transaction claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "tx_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    CreatePayroll,
    FundVault,
    Claim,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::CreatePayroll => "create_payroll",
            TxKind::FundVault => "fund_vault",
            TxKind::Claim => "claim",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "tx_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An externally-submitted transaction the reconciler is tracking. The
/// run/claim links are weak references used only for routing once the
/// receipt lands; the record itself is never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChainTx {
    pub id: Uuid,
    pub employer_id: Uuid,
    pub chain_id: i64,
    pub tx_hash: String,
    pub kind: TxKind,
    pub status: TxStatus,
    pub run_id: Option<Uuid>,
    pub payroll_id: Option<i64>,
    pub employee_wallet: String,
    pub block_number: Option<i64>,
    pub success: Option<bool>,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One log entry from a transaction receipt: emitting contract, indexed
/// topics (topic 0 is the event signature hash) and the ABI-encoded data
/// segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

/// The ledger's record of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub success: bool,
    pub block_number: u64,
    pub logs: Vec<LogEntry>,
}

/// Validate a `0x`-prefixed 32-byte transaction hash string.
pub fn is_tx_hash(s: &str) -> bool {
    s.len() == 66
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}
