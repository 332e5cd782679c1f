use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::chain::models::{ChainTx, TxKind};
use crate::payroll::commit::CommitItem;
use crate::payroll::models::{PayrollClaim, PayrollRun, ScheduleKind};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEmployeeRequest {
    pub employer_id: Uuid,
    #[validate(length(min = 42, max = 42, message = "wallet must be a 0x-prefixed address"))]
    pub wallet: String,
    #[validate(range(min = 1, message = "salary_units must be positive"))]
    pub salary_units: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateScheduleRequest {
    pub employer_id: Uuid,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub kind: ScheduleKind,
    /// "HH:MM:SS"; required for recurring kinds.
    pub time_of_day: Option<chrono::NaiveTime>,
    pub weekday: Option<i32>,
    pub day_of_month: Option<i32>,
    pub month_of_year: Option<i32>,
    pub day_of_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub employer_id: Uuid,
    pub claim_window_days: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CommitRunRequest {
    pub items: Vec<CommitItem>,
}

/// Records the employer's create or fund transaction hash on a run so the
/// open gate can look up its receipt.
#[derive(Debug, Deserialize)]
pub struct RecordRunTxRequest {
    pub kind: TxKind,
    pub tx_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct EmployerQuery {
    pub employer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RunDetailResponse {
    #[serde(flatten)]
    pub run: PayrollRun,
    pub claims: Vec<PayrollClaim>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitTxRequest {
    pub employer_id: Uuid,
    #[validate(length(min = 66, max = 66, message = "tx_hash must be a 0x-prefixed 32-byte hash"))]
    pub tx_hash: String,
    pub kind: TxKind,
    pub run_id: Option<Uuid>,
    pub payroll_id: Option<i64>,
    pub employee_wallet: Option<String>,
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SubmitTxResponse {
    /// False when the hash was already being tracked.
    pub created: bool,
    #[serde(flatten)]
    pub tx: ChainTx,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
