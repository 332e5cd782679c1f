//! Background materialization of scheduled payroll runs.
//!
//! Each due occurrence is claimed with a compare-and-swap on the schedule's
//! `(run_nonce, next_run_at)` pair, so any number of scheduler instances
//! can poll the same database and exactly one materializes each run.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chain::address::Address;
use crate::error::{AppResult, ScheduleError};
use crate::payroll::clock;
use crate::payroll::models::{
    ClaimStatus, Employee, PayrollClaim, PayrollRun, PayrollSchedule, RunStatus,
    DEFAULT_CLAIM_WINDOW_DAYS, ZERO_REF,
};
use crate::store::PayrollStore;

const ID_GENERATION_ATTEMPTS: usize = 20;
const DUE_BATCH_SIZE: i64 = 20;

/// Random 63-bit payroll identifier, retried against the store until
/// unused. Fits both the chain's uint256 and a Postgres BIGINT.
pub async fn generate_payroll_id(store: &dyn PayrollStore) -> AppResult<i64> {
    for _ in 0..ID_GENERATION_ATTEMPTS {
        let candidate = rand::rng().random_range(1..=i64::MAX);
        if !store.payroll_id_exists(candidate).await? {
            return Ok(candidate);
        }
    }
    Err(ScheduleError::IdGenerationExhausted.into())
}

/// Draft claim rows for a roster. Indices are dense 0..n-1 assigned in
/// wallet order and never renumbered afterwards.
pub fn build_draft_claims(run_id: Uuid, employees: &[Employee]) -> Vec<PayrollClaim> {
    let mut roster: Vec<&Employee> = employees.iter().collect();
    roster.sort_by(|a, b| a.wallet.to_lowercase().cmp(&b.wallet.to_lowercase()));

    roster
        .iter()
        .enumerate()
        .map(|(i, e)| PayrollClaim {
            id: Uuid::new_v4(),
            run_id,
            employee_wallet: e.wallet.clone(),
            index: i as i32,
            leaf: String::new(),
            proof: Vec::new(),
            net_ciphertext_b64: String::new(),
            encrypted_ref: ZERO_REF.to_string(),
            status: ClaimStatus::Unclaimed,
            claim_tx_hash: String::new(),
            claimed_at: None,
        })
        .collect()
}

/// Polls for due schedules and materializes one draft run per claimed
/// occurrence.
#[derive(Clone)]
pub struct RunScheduler {
    store: Arc<dyn PayrollStore>,
    token: Address,
    vault: Address,
    poll_interval: Duration,
}

impl RunScheduler {
    pub fn new(
        store: Arc<dyn PayrollStore>,
        token: Address,
        vault: Address,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            token,
            vault,
            poll_interval,
        }
    }

    pub fn start(&self) -> JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            info!(
                "🗓️ Run scheduler started (poll every {:?})",
                scheduler.poll_interval
            );
            let mut ticker = interval(scheduler.poll_interval);

            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.tick(Utc::now()).await {
                    error!("Scheduler tick failed: {:?}", e);
                }
            }
        })
    }

    /// One polling pass: claim and materialize every due occurrence.
    /// Takes the reference instant explicitly so tests control time.
    pub async fn tick(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let due = self.store.due_schedules(now, DUE_BATCH_SIZE).await?;
        let mut materialized = 0;

        for schedule in due {
            match self.tick_one(&schedule, now).await {
                Ok(true) => materialized += 1,
                Ok(false) => {}
                Err(e) => {
                    // one bad schedule must not starve the rest
                    error!(
                        schedule_id = %schedule.id,
                        "Failed to materialize scheduled run: {:?}", e
                    );
                }
            }
        }
        Ok(materialized)
    }

    async fn tick_one(&self, schedule: &PayrollSchedule, now: DateTime<Utc>) -> AppResult<bool> {
        let Some(observed_next) = schedule.next_run_at else {
            return Ok(false);
        };

        let new_next = match clock::next_occurrence(schedule, now) {
            Ok(next) => next,
            Err(e) => {
                warn!(schedule_id = %schedule.id, "Schedule has invalid recurrence, skipping: {}", e);
                return Ok(false);
            }
        };

        let claimed = self
            .store
            .claim_schedule_tick(schedule.id, schedule.run_nonce, observed_next, new_next, now)
            .await?;
        if !claimed {
            // another instance won this occurrence
            return Ok(false);
        }
        let run_nonce = schedule.run_nonce + 1;

        let employees = self.store.active_employees(schedule.employer_id).await?;
        if employees.is_empty() {
            // the occurrence is consumed either way
            info!(schedule_id = %schedule.id, "Schedule ticked with an empty roster, no run created");
            return Ok(false);
        }

        let payroll_id = generate_payroll_id(self.store.as_ref()).await?;
        let run_id = Uuid::new_v4();
        let claims = build_draft_claims(run_id, &employees);
        let total_amount_units = employees.iter().map(|e| e.salary_units).sum();

        let run = PayrollRun {
            id: run_id,
            employer_id: schedule.employer_id,
            schedule_id: Some(schedule.id),
            run_nonce: Some(run_nonce),
            payroll_id,
            token: self.token.to_checksum(),
            vault: self.vault.to_checksum(),
            merkle_root: String::new(),
            total: claims.len() as i32,
            total_amount_units,
            status: RunStatus::Draft,
            create_tx_hash: String::new(),
            fund_tx_hash: String::new(),
            claim_window_days: DEFAULT_CLAIM_WINDOW_DAYS,
            close_at: None,
            created_at: now,
        };

        self.store.insert_run(run, claims).await?;
        info!(
            schedule_id = %schedule.id,
            payroll_id,
            run_nonce,
            "✓ Materialized scheduled draft run"
        );
        Ok(true)
    }
}
