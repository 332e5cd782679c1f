//! Persistence traits plus the Postgres and in-memory implementations.
//!
//! Workers and handlers only see the traits; `PgStore` backs production
//! and `MemoryStore` backs tests and local development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chain::models::{ChainTx, TxStatus};
use crate::error::AppResult;
use crate::payroll::models::{Employee, PayrollClaim, PayrollRun, PayrollSchedule, RunStatus};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which of a run's two gating transaction slots to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTxSlot {
    Create,
    Fund,
}

/// Per-claim payload produced by the commitment builder and applied in one
/// transaction together with the run's root.
#[derive(Debug, Clone)]
pub struct ClaimCommitment {
    pub claim_id: Uuid,
    pub net_ciphertext_b64: String,
    pub encrypted_ref: String,
    pub leaf: String,
    pub proof: Vec<String>,
}

#[async_trait]
pub trait PayrollStore: Send + Sync {
    async fn insert_employee(&self, employee: Employee) -> AppResult<Employee>;
    async fn employees(&self, employer_id: Uuid) -> AppResult<Vec<Employee>>;
    async fn active_employees(&self, employer_id: Uuid) -> AppResult<Vec<Employee>>;
    async fn set_employee_active(&self, id: Uuid, active: bool) -> AppResult<bool>;

    async fn insert_schedule(&self, schedule: PayrollSchedule) -> AppResult<PayrollSchedule>;
    async fn schedule(&self, id: Uuid) -> AppResult<Option<PayrollSchedule>>;
    async fn schedules(&self, employer_id: Uuid) -> AppResult<Vec<PayrollSchedule>>;

    /// Flip a schedule on or off, installing the given next occurrence.
    /// Returns the updated schedule, or None when it does not exist.
    async fn set_schedule_enabled(
        &self,
        id: Uuid,
        enabled: bool,
        next_run_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<PayrollSchedule>>;

    /// Enabled recurring schedules whose `next_run_at` is at or before `now`.
    async fn due_schedules(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<PayrollSchedule>>;

    /// Compare-and-swap claim of one schedule occurrence: succeeds only when
    /// the stored `(run_nonce, next_run_at)` still equal the observed pair,
    /// in which case the nonce is bumped and the next occurrence installed.
    /// Returns false when another worker won the tick.
    async fn claim_schedule_tick(
        &self,
        id: Uuid,
        observed_nonce: i32,
        observed_next_run_at: DateTime<Utc>,
        new_next_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn payroll_id_exists(&self, payroll_id: i64) -> AppResult<bool>;

    /// Insert a run and its claim rows atomically.
    async fn insert_run(
        &self,
        run: PayrollRun,
        claims: Vec<PayrollClaim>,
    ) -> AppResult<PayrollRun>;
    async fn run(&self, id: Uuid) -> AppResult<Option<PayrollRun>>;
    async fn run_by_payroll_id(&self, payroll_id: i64) -> AppResult<Option<PayrollRun>>;
    async fn runs(&self, employer_id: Uuid) -> AppResult<Vec<PayrollRun>>;

    /// Atomically store the root, per-claim leaves/proofs/ciphertexts and
    /// flip the run Draft -> Committed. Fails if the run left Draft in the
    /// meantime.
    async fn apply_commitment(
        &self,
        run_id: Uuid,
        merkle_root: &str,
        total_amount_units: i64,
        items: Vec<ClaimCommitment>,
    ) -> AppResult<PayrollRun>;

    async fn set_run_tx_hash(
        &self,
        run_id: Uuid,
        slot: RunTxSlot,
        tx_hash: &str,
    ) -> AppResult<()>;

    /// Guarded status bump: updates only rows currently in `from`. Returns
    /// false when the run had already moved on.
    async fn advance_run_status(
        &self,
        run_id: Uuid,
        from: RunStatus,
        to: RunStatus,
        close_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool>;

    /// Close every Open run whose claim window has elapsed; returns the
    /// number of runs closed.
    async fn close_expired_runs(&self, now: DateTime<Utc>) -> AppResult<u64>;

    async fn claims_for_run(&self, run_id: Uuid) -> AppResult<Vec<PayrollClaim>>;
    async fn claim_by_wallet(
        &self,
        run_id: Uuid,
        wallet: &str,
    ) -> AppResult<Option<PayrollClaim>>;

    /// Flip a claim Unclaimed -> Claimed; false when it was already claimed.
    async fn mark_claim_claimed(
        &self,
        claim_id: Uuid,
        tx_hash: &str,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;
}

#[async_trait]
pub trait ChainTxStore: Send + Sync {
    /// Idempotent on `tx_hash`: re-submitting an already-tracked hash
    /// returns the existing row with `created = false`.
    async fn submit_tx(&self, tx: ChainTx) -> AppResult<(ChainTx, bool)>;

    /// Pending transactions, oldest first.
    async fn pending_txs(&self, limit: i64) -> AppResult<Vec<ChainTx>>;

    async fn resolve_tx(
        &self,
        id: Uuid,
        status: TxStatus,
        block_number: i64,
        success: bool,
    ) -> AppResult<()>;

    /// Most recent first.
    async fn txs_for_employer(&self, employer_id: Uuid, limit: i64) -> AppResult<Vec<ChainTx>>;
}
