//! In-memory store used by tests and local development. Mirrors the
//! Postgres semantics including the CAS guards, just without durability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::chain::models::{ChainTx, TxStatus};
use crate::error::{AppError, AppResult, CommitError};
use crate::payroll::lifecycle;
use crate::payroll::models::{
    ClaimStatus, Employee, PayrollClaim, PayrollRun, PayrollSchedule, RunStatus,
};
use crate::store::{ChainTxStore, ClaimCommitment, PayrollStore, RunTxSlot};

#[derive(Default)]
pub struct MemoryStore {
    employees: RwLock<HashMap<Uuid, Employee>>,
    schedules: RwLock<HashMap<Uuid, PayrollSchedule>>,
    runs: RwLock<HashMap<Uuid, PayrollRun>>,
    claims: RwLock<HashMap<Uuid, PayrollClaim>>,
    txs: RwLock<HashMap<Uuid, ChainTx>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayrollStore for MemoryStore {
    async fn insert_employee(&self, employee: Employee) -> AppResult<Employee> {
        let mut employees = self.employees.write().await;
        let duplicate = employees.values().any(|e| {
            e.employer_id == employee.employer_id
                && e.wallet.eq_ignore_ascii_case(&employee.wallet)
        });
        if duplicate {
            return Err(AppError::InvalidInput(format!(
                "Wallet already on the roster: {}",
                employee.wallet
            )));
        }
        employees.insert(employee.id, employee.clone());
        Ok(employee)
    }

    async fn employees(&self, employer_id: Uuid) -> AppResult<Vec<Employee>> {
        let employees = self.employees.read().await;
        let mut out: Vec<_> = employees
            .values()
            .filter(|e| e.employer_id == employer_id)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        Ok(out)
    }

    async fn active_employees(&self, employer_id: Uuid) -> AppResult<Vec<Employee>> {
        Ok(self
            .employees(employer_id)
            .await?
            .into_iter()
            .filter(|e| e.active)
            .collect())
    }

    async fn set_employee_active(&self, id: Uuid, active: bool) -> AppResult<bool> {
        let mut employees = self.employees.write().await;
        match employees.get_mut(&id) {
            Some(e) => {
                e.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_schedule(&self, schedule: PayrollSchedule) -> AppResult<PayrollSchedule> {
        self.schedules
            .write()
            .await
            .insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn schedule(&self, id: Uuid) -> AppResult<Option<PayrollSchedule>> {
        Ok(self.schedules.read().await.get(&id).cloned())
    }

    async fn schedules(&self, employer_id: Uuid) -> AppResult<Vec<PayrollSchedule>> {
        let schedules = self.schedules.read().await;
        let mut out: Vec<_> = schedules
            .values()
            .filter(|s| s.employer_id == employer_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.created_at);
        Ok(out)
    }

    async fn set_schedule_enabled(
        &self,
        id: Uuid,
        enabled: bool,
        next_run_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<PayrollSchedule>> {
        let mut schedules = self.schedules.write().await;
        Ok(schedules.get_mut(&id).map(|s| {
            s.enabled = enabled;
            s.next_run_at = next_run_at;
            s.clone()
        }))
    }

    async fn due_schedules(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<PayrollSchedule>> {
        let schedules = self.schedules.read().await;
        let mut due: Vec<_> = schedules
            .values()
            .filter(|s| s.enabled && s.kind.is_recurring())
            .filter(|s| s.next_run_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claim_schedule_tick(
        &self,
        id: Uuid,
        observed_nonce: i32,
        observed_next_run_at: DateTime<Utc>,
        new_next_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut schedules = self.schedules.write().await;
        let Some(schedule) = schedules.get_mut(&id) else {
            return Ok(false);
        };
        if schedule.run_nonce != observed_nonce
            || schedule.next_run_at != Some(observed_next_run_at)
        {
            return Ok(false);
        }
        schedule.run_nonce += 1;
        schedule.next_run_at = new_next_run_at;
        schedule.last_run_at = Some(now);
        Ok(true)
    }

    async fn payroll_id_exists(&self, payroll_id: i64) -> AppResult<bool> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .any(|r| r.payroll_id == payroll_id))
    }

    async fn insert_run(
        &self,
        run: PayrollRun,
        claims: Vec<PayrollClaim>,
    ) -> AppResult<PayrollRun> {
        let mut runs = self.runs.write().await;
        let mut claim_map = self.claims.write().await;
        runs.insert(run.id, run.clone());
        for claim in claims {
            claim_map.insert(claim.id, claim);
        }
        Ok(run)
    }

    async fn run(&self, id: Uuid) -> AppResult<Option<PayrollRun>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn run_by_payroll_id(&self, payroll_id: i64) -> AppResult<Option<PayrollRun>> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .find(|r| r.payroll_id == payroll_id)
            .cloned())
    }

    async fn runs(&self, employer_id: Uuid) -> AppResult<Vec<PayrollRun>> {
        let runs = self.runs.read().await;
        let mut out: Vec<_> = runs
            .values()
            .filter(|r| r.employer_id == employer_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn apply_commitment(
        &self,
        run_id: Uuid,
        merkle_root: &str,
        total_amount_units: i64,
        items: Vec<ClaimCommitment>,
    ) -> AppResult<PayrollRun> {
        let mut runs = self.runs.write().await;
        let mut claims = self.claims.write().await;

        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| AppError::NotFound(format!("Run {}", run_id)))?;
        if run.status != RunStatus::Draft {
            return Err(CommitError::InvalidRunState {
                current: run.status.to_string(),
                expected: RunStatus::Draft.to_string(),
            }
            .into());
        }

        for item in &items {
            let claim = claims
                .get_mut(&item.claim_id)
                .ok_or_else(|| AppError::NotFound(format!("Claim {}", item.claim_id)))?;
            claim.net_ciphertext_b64 = item.net_ciphertext_b64.clone();
            claim.encrypted_ref = item.encrypted_ref.clone();
            claim.leaf = item.leaf.clone();
            claim.proof = item.proof.clone();
        }

        run.merkle_root = merkle_root.to_string();
        run.total_amount_units = total_amount_units;
        run.status = RunStatus::Committed;
        Ok(run.clone())
    }

    async fn set_run_tx_hash(
        &self,
        run_id: Uuid,
        slot: RunTxSlot,
        tx_hash: &str,
    ) -> AppResult<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| AppError::NotFound(format!("Run {}", run_id)))?;
        match slot {
            RunTxSlot::Create => run.create_tx_hash = tx_hash.to_string(),
            RunTxSlot::Fund => run.fund_tx_hash = tx_hash.to_string(),
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
        let mut runs = self.runs.write().await;
        let Some(run) = runs.get_mut(&run_id) else {
            return Ok(false);
        };
        if run.status != from {
            return Ok(false);
        }
        run.status = to;
        if close_at.is_some() {
            run.close_at = close_at;
        }
        Ok(true)
    }

    async fn close_expired_runs(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut runs = self.runs.write().await;
        let mut closed = 0;
        for run in runs.values_mut() {
            if run.status == RunStatus::Open && run.close_at.is_some_and(|at| at <= now) {
                run.status = RunStatus::Closed;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn claims_for_run(&self, run_id: Uuid) -> AppResult<Vec<PayrollClaim>> {
        let claims = self.claims.read().await;
        let mut out: Vec<_> = claims
            .values()
            .filter(|c| c.run_id == run_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.index);
        Ok(out)
    }

    async fn claim_by_wallet(
        &self,
        run_id: Uuid,
        wallet: &str,
    ) -> AppResult<Option<PayrollClaim>> {
        Ok(self
            .claims
            .read()
            .await
            .values()
            .find(|c| c.run_id == run_id && c.employee_wallet.eq_ignore_ascii_case(wallet))
            .cloned())
    }

    async fn mark_claim_claimed(
        &self,
        claim_id: Uuid,
        tx_hash: &str,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut claims = self.claims.write().await;
        let Some(claim) = claims.get_mut(&claim_id) else {
            return Ok(false);
        };
        if claim.status != ClaimStatus::Unclaimed {
            return Ok(false);
        }
        claim.status = ClaimStatus::Claimed;
        claim.claim_tx_hash = tx_hash.to_string();
        claim.claimed_at = Some(at);
        Ok(true)
    }
}

#[async_trait]
impl ChainTxStore for MemoryStore {
    async fn submit_tx(&self, tx: ChainTx) -> AppResult<(ChainTx, bool)> {
        let mut txs = self.txs.write().await;
        if let Some(existing) = txs
            .values()
            .find(|t| t.tx_hash.eq_ignore_ascii_case(&tx.tx_hash))
        {
            return Ok((existing.clone(), false));
        }
        txs.insert(tx.id, tx.clone());
        Ok((tx, true))
    }

    async fn pending_txs(&self, limit: i64) -> AppResult<Vec<ChainTx>> {
        let txs = self.txs.read().await;
        let mut pending: Vec<_> = txs
            .values()
            .filter(|t| t.status == TxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn resolve_tx(
        &self,
        id: Uuid,
        status: TxStatus,
        block_number: i64,
        success: bool,
    ) -> AppResult<()> {
        let mut txs = self.txs.write().await;
        let tx = txs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Chain tx {}", id)))?;
        tx.status = status;
        tx.block_number = Some(block_number);
        tx.success = Some(success);
        tx.updated_at = Utc::now();
        Ok(())
    }

    async fn txs_for_employer(&self, employer_id: Uuid, limit: i64) -> AppResult<Vec<ChainTx>> {
        let txs = self.txs.read().await;
        let mut out: Vec<_> = txs
            .values()
            .filter(|t| t.employer_id == employer_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit as usize);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::models::TxKind;

    fn tx(hash: &str, created_at: DateTime<Utc>) -> ChainTx {
        ChainTx {
            id: Uuid::new_v4(),
            employer_id: Uuid::new_v4(),
            chain_id: 31337,
            tx_hash: hash.to_string(),
            kind: TxKind::CreatePayroll,
            status: TxStatus::Pending,
            run_id: None,
            payroll_id: Some(1),
            employee_wallet: String::new(),
            block_number: None,
            success: None,
            meta: serde_json::json!({}),
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn submit_tx_is_idempotent_on_hash() {
        let store = MemoryStore::new();
        let hash = format!("0x{}", "ab".repeat(32));

        let (first, created) = store.submit_tx(tx(&hash, Utc::now())).await.unwrap();
        assert!(created);

        let (second, created) = store.submit_tx(tx(&hash, Utc::now())).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn pending_txs_come_back_oldest_first_and_bounded() {
        let store = MemoryStore::new();
        let base = Utc::now();
        for i in 0..5i64 {
            let hash = format!("0x{:064x}", i + 1);
            store
                .submit_tx(tx(&hash, base + chrono::Duration::seconds(i)))
                .await
                .unwrap();
        }

        let pending = store.pending_txs(3).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert!(pending.windows(2).all(|w| w[0].created_at <= w[1].created_at));

        // resolved txs drop out
        store
            .resolve_tx(pending[0].id, TxStatus::Confirmed, 10, true)
            .await
            .unwrap();
        let pending = store.pending_txs(10).await.unwrap();
        assert_eq!(pending.len(), 4);
    }
}
