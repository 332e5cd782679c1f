use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::Type;
use std::fmt;
use uuid::Uuid;

/// Recurrence kind of a payroll schedule. `Instant` schedules never tick;
/// they exist for runs created directly through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "schedule_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Instant,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl ScheduleKind {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, ScheduleKind::Instant)
    }
}

/// Lifecycle of a payout batch. Transitions are validated in
/// `payroll::lifecycle` and are strictly forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Draft,
    Committed,
    OnchainCreated,
    Open,
    Closed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Draft => "draft",
            RunStatus::Committed => "committed",
            RunStatus::OnchainCreated => "onchain_created",
            RunStatus::Open => "open",
            RunStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "claim_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Unclaimed,
    Claimed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Unclaimed => "unclaimed",
            ClaimStatus::Claimed => "claimed",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One payee on an employer's roster. Wallets are stored checksummed and
/// are unique per employer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub id: Uuid,
    pub employer_id: Uuid,
    pub wallet: String,
    /// Token units; the payout token has 6 decimals.
    pub salary_units: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A recurrence rule plus the optimistic-lock pair `(run_nonce,
/// next_run_at)` that RunScheduler uses to claim each due occurrence
/// exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayrollSchedule {
    pub id: Uuid,
    pub employer_id: Uuid,
    pub name: String,
    pub kind: ScheduleKind,
    pub time_of_day: Option<NaiveTime>,
    /// 0 = Monday .. 6 = Sunday
    pub weekday: Option<i32>,
    pub day_of_month: Option<i32>,
    pub month_of_year: Option<i32>,
    pub day_of_year: Option<i32>,
    pub enabled: bool,
    /// Always strictly in the future relative to the instant it was
    /// computed from; null for instant schedules.
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub run_nonce: i32,
    pub created_at: DateTime<Utc>,
}

/// One payout batch: a commitment root plus the two gating on-chain
/// transactions (create + fund).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayrollRun {
    pub id: Uuid,
    pub employer_id: Uuid,
    pub schedule_id: Option<Uuid>,
    /// Schedule nonce captured at creation; `(schedule_id, run_nonce)` is
    /// unique and makes scheduled materialization idempotent.
    pub run_nonce: Option<i32>,
    /// Random 63-bit identifier, globally unique, referenced on-chain.
    pub payroll_id: i64,
    pub token: String,
    pub vault: String,
    /// Empty until the run is committed.
    pub merkle_root: String,
    pub total: i32,
    pub total_amount_units: i64,
    pub status: RunStatus,
    pub create_tx_hash: String,
    pub fund_tx_hash: String,
    pub claim_window_days: i32,
    pub close_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One recipient's entry within a run. `index` is dense 0..total-1,
/// assigned once in wallet order and never renumbered.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayrollClaim {
    pub id: Uuid,
    pub run_id: Uuid,
    pub employee_wallet: String,
    pub index: i32,
    pub leaf: String,
    #[sqlx(json)]
    pub proof: Vec<String>,
    pub net_ciphertext_b64: String,
    pub encrypted_ref: String,
    pub status: ClaimStatus,
    pub claim_tx_hash: String,
    pub claimed_at: Option<DateTime<Utc>>,
}

pub const ZERO_REF: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

pub const DEFAULT_CLAIM_WINDOW_DAYS: i32 = 14;
