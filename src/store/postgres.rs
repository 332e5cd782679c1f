//! Postgres-backed store. All multi-row mutations run inside a transaction
//! and every guarded update is a conditional UPDATE checked through
//! `rows_affected`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::chain::models::{ChainTx, TxStatus};
use crate::error::{AppError, AppResult, CommitError};
use crate::payroll::lifecycle;
use crate::payroll::models::{
    Employee, PayrollClaim, PayrollRun, PayrollSchedule, RunStatus,
};
use crate::store::{ChainTxStore, ClaimCommitment, PayrollStore, RunTxSlot};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PayrollStore for PgStore {
    async fn insert_employee(&self, employee: Employee) -> AppResult<Employee> {
        let row = sqlx::query_as::<_, Employee>(
            r#"
            INSERT INTO employees (id, employer_id, wallet, salary_units, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(employee.id)
        .bind(employee.employer_id)
        .bind(&employee.wallet)
        .bind(employee.salary_units)
        .bind(employee.active)
        .bind(employee.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::InvalidInput(format!("Wallet already on the roster: {}", employee.wallet))
            }
            _ => e.into(),
        })?;
        Ok(row)
    }

    async fn employees(&self, employer_id: Uuid) -> AppResult<Vec<Employee>> {
        let rows = sqlx::query_as::<_, Employee>(
            "SELECT * FROM employees WHERE employer_id = $1 ORDER BY created_at",
        )
        .bind(employer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn active_employees(&self, employer_id: Uuid) -> AppResult<Vec<Employee>> {
        let rows = sqlx::query_as::<_, Employee>(
            "SELECT * FROM employees WHERE employer_id = $1 AND active ORDER BY created_at",
        )
        .bind(employer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn set_employee_active(&self, id: Uuid, active: bool) -> AppResult<bool> {
        let result = sqlx::query("UPDATE employees SET active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_schedule(&self, schedule: PayrollSchedule) -> AppResult<PayrollSchedule> {
        let row = sqlx::query_as::<_, PayrollSchedule>(
            r#"
            INSERT INTO payroll_schedules
                (id, employer_id, name, kind, time_of_day, weekday, day_of_month,
                 month_of_year, day_of_year, enabled, next_run_at, last_run_at,
                 run_nonce, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.employer_id)
        .bind(&schedule.name)
        .bind(schedule.kind)
        .bind(schedule.time_of_day)
        .bind(schedule.weekday)
        .bind(schedule.day_of_month)
        .bind(schedule.month_of_year)
        .bind(schedule.day_of_year)
        .bind(schedule.enabled)
        .bind(schedule.next_run_at)
        .bind(schedule.last_run_at)
        .bind(schedule.run_nonce)
        .bind(schedule.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn schedule(&self, id: Uuid) -> AppResult<Option<PayrollSchedule>> {
        let row = sqlx::query_as::<_, PayrollSchedule>(
            "SELECT * FROM payroll_schedules WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn schedules(&self, employer_id: Uuid) -> AppResult<Vec<PayrollSchedule>> {
        let rows = sqlx::query_as::<_, PayrollSchedule>(
            "SELECT * FROM payroll_schedules WHERE employer_id = $1 ORDER BY created_at",
        )
        .bind(employer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn set_schedule_enabled(
        &self,
        id: Uuid,
        enabled: bool,
        next_run_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<PayrollSchedule>> {
        let row = sqlx::query_as::<_, PayrollSchedule>(
            r#"
            UPDATE payroll_schedules
            SET enabled = $2, next_run_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(enabled)
        .bind(next_run_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn due_schedules(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<PayrollSchedule>> {
        let rows = sqlx::query_as::<_, PayrollSchedule>(
            r#"
            SELECT * FROM payroll_schedules
            WHERE enabled AND kind <> 'instant' AND next_run_at IS NOT NULL AND next_run_at <= $1
            ORDER BY next_run_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn claim_schedule_tick(
        &self,
        id: Uuid,
        observed_nonce: i32,
        observed_next_run_at: DateTime<Utc>,
        new_next_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        // CAS on (run_nonce, next_run_at): only one worker advances the pair.
        let result = sqlx::query(
            r#"
            UPDATE payroll_schedules
            SET run_nonce = run_nonce + 1, next_run_at = $4, last_run_at = $5
            WHERE id = $1 AND run_nonce = $2 AND next_run_at = $3
            "#,
        )
        .bind(id)
        .bind(observed_nonce)
        .bind(observed_next_run_at)
        .bind(new_next_run_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn payroll_id_exists(&self, payroll_id: i64) -> AppResult<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM payroll_runs WHERE payroll_id = $1)")
                .bind(payroll_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists.0)
    }

    async fn insert_run(
        &self,
        run: PayrollRun,
        claims: Vec<PayrollClaim>,
    ) -> AppResult<PayrollRun> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, PayrollRun>(
            r#"
            INSERT INTO payroll_runs
                (id, employer_id, schedule_id, run_nonce, payroll_id, token, vault,
                 merkle_root, total, total_amount_units, status, create_tx_hash,
                 fund_tx_hash, claim_window_days, close_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(run.id)
        .bind(run.employer_id)
        .bind(run.schedule_id)
        .bind(run.run_nonce)
        .bind(run.payroll_id)
        .bind(&run.token)
        .bind(&run.vault)
        .bind(&run.merkle_root)
        .bind(run.total)
        .bind(run.total_amount_units)
        .bind(run.status)
        .bind(&run.create_tx_hash)
        .bind(&run.fund_tx_hash)
        .bind(run.claim_window_days)
        .bind(run.close_at)
        .bind(run.created_at)
        .fetch_one(&mut *tx)
        .await?;

        for claim in &claims {
            sqlx::query(
                r#"
                INSERT INTO payroll_claims
                    (id, run_id, employee_wallet, "index", leaf, proof,
                     net_ciphertext_b64, encrypted_ref, status, claim_tx_hash, claimed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(claim.id)
            .bind(claim.run_id)
            .bind(&claim.employee_wallet)
            .bind(claim.index)
            .bind(&claim.leaf)
            .bind(Json(&claim.proof))
            .bind(&claim.net_ciphertext_b64)
            .bind(&claim.encrypted_ref)
            .bind(claim.status)
            .bind(&claim.claim_tx_hash)
            .bind(claim.claimed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn run(&self, id: Uuid) -> AppResult<Option<PayrollRun>> {
        let row = sqlx::query_as::<_, PayrollRun>("SELECT * FROM payroll_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn run_by_payroll_id(&self, payroll_id: i64) -> AppResult<Option<PayrollRun>> {
        let row = sqlx::query_as::<_, PayrollRun>(
            "SELECT * FROM payroll_runs WHERE payroll_id = $1",
        )
        .bind(payroll_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn runs(&self, employer_id: Uuid) -> AppResult<Vec<PayrollRun>> {
        let rows = sqlx::query_as::<_, PayrollRun>(
            "SELECT * FROM payroll_runs WHERE employer_id = $1 ORDER BY created_at DESC",
        )
        .bind(employer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn apply_commitment(
        &self,
        run_id: Uuid,
        merkle_root: &str,
        total_amount_units: i64,
        items: Vec<ClaimCommitment>,
    ) -> AppResult<PayrollRun> {
        let mut tx = self.pool.begin().await?;

        // Guarded flip out of draft; losing the race leaves nothing applied.
        let updated = sqlx::query_as::<_, PayrollRun>(
            r#"
            UPDATE payroll_runs
            SET merkle_root = $2, total_amount_units = $3, status = 'committed'
            WHERE id = $1 AND status = 'draft'
            RETURNING *
            "#,
        )
        .bind(run_id)
        .bind(merkle_root)
        .bind(total_amount_units)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(run) = updated else {
            tx.rollback().await?;
            let current = self
                .run(run_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Run {}", run_id)))?;
            return Err(CommitError::InvalidRunState {
                current: current.status.to_string(),
                expected: RunStatus::Draft.to_string(),
            }
            .into());
        };

        for item in &items {
            sqlx::query(
                r#"
                UPDATE payroll_claims
                SET net_ciphertext_b64 = $2, encrypted_ref = $3, leaf = $4, proof = $5
                WHERE id = $1
                "#,
            )
            .bind(item.claim_id)
            .bind(&item.net_ciphertext_b64)
            .bind(&item.encrypted_ref)
            .bind(&item.leaf)
            .bind(Json(&item.proof))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(run)
    }

    async fn set_run_tx_hash(
        &self,
        run_id: Uuid,
        slot: RunTxSlot,
        tx_hash: &str,
    ) -> AppResult<()> {
        let query = match slot {
            RunTxSlot::Create => "UPDATE payroll_runs SET create_tx_hash = $2 WHERE id = $1",
            RunTxSlot::Fund => "UPDATE payroll_runs SET fund_tx_hash = $2 WHERE id = $1",
        };
        let result = sqlx::query(query)
            .bind(run_id)
            .bind(tx_hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Run {}", run_id)));
        }
        Ok(())
    }

    async fn advance_run_status(
        &self,
        run_id: Uuid,
        from: RunStatus,
        to: RunStatus,
        close_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        lifecycle::validate_run_transition(from, to)?;
        let result = sqlx::query(
            r#"
            UPDATE payroll_runs
            SET status = $3, close_at = COALESCE($4, close_at)
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(run_id)
        .bind(from)
        .bind(to)
        .bind(close_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn close_expired_runs(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payroll_runs
            SET status = 'closed'
            WHERE status = 'open' AND close_at IS NOT NULL AND close_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn claims_for_run(&self, run_id: Uuid) -> AppResult<Vec<PayrollClaim>> {
        let rows = sqlx::query_as::<_, PayrollClaim>(
            r#"SELECT * FROM payroll_claims WHERE run_id = $1 ORDER BY "index""#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn claim_by_wallet(
        &self,
        run_id: Uuid,
        wallet: &str,
    ) -> AppResult<Option<PayrollClaim>> {
        let row = sqlx::query_as::<_, PayrollClaim>(
            "SELECT * FROM payroll_claims WHERE run_id = $1 AND LOWER(employee_wallet) = LOWER($2)",
        )
        .bind(run_id)
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mark_claim_claimed(
        &self,
        claim_id: Uuid,
        tx_hash: &str,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payroll_claims
            SET status = 'claimed', claim_tx_hash = $2, claimed_at = $3
            WHERE id = $1 AND status = 'unclaimed'
            "#,
        )
        .bind(claim_id)
        .bind(tx_hash)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ChainTxStore for PgStore {
    async fn submit_tx(&self, tx: ChainTx) -> AppResult<(ChainTx, bool)> {
        let inserted = sqlx::query_as::<_, ChainTx>(
            r#"
            INSERT INTO chain_txs
                (id, employer_id, chain_id, tx_hash, kind, status, run_id, payroll_id,
                 employee_wallet, block_number, success, meta, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (tx_hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(tx.id)
        .bind(tx.employer_id)
        .bind(tx.chain_id)
        .bind(&tx.tx_hash)
        .bind(tx.kind)
        .bind(tx.status)
        .bind(tx.run_id)
        .bind(tx.payroll_id)
        .bind(&tx.employee_wallet)
        .bind(tx.block_number)
        .bind(tx.success)
        .bind(&tx.meta)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok((row, true)),
            None => {
                let existing = sqlx::query_as::<_, ChainTx>(
                    "SELECT * FROM chain_txs WHERE tx_hash = $1",
                )
                .bind(&tx.tx_hash)
                .fetch_one(&self.pool)
                .await?;
                Ok((existing, false))
            }
        }
    }

    async fn pending_txs(&self, limit: i64) -> AppResult<Vec<ChainTx>> {
        let rows = sqlx::query_as::<_, ChainTx>(
            "SELECT * FROM chain_txs WHERE status = 'pending' ORDER BY created_at LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn resolve_tx(
        &self,
        id: Uuid,
        status: TxStatus,
        block_number: i64,
        success: bool,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE chain_txs
            SET status = $2, block_number = $3, success = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(block_number)
        .bind(success)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn txs_for_employer(&self, employer_id: Uuid, limit: i64) -> AppResult<Vec<ChainTx>> {
        let rows = sqlx::query_as::<_, ChainTx>(
            "SELECT * FROM chain_txs WHERE employer_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(employer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
