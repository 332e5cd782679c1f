//! Handlers for rosters, schedules, runs and claims.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::api::models::{
    CommitRunRequest, CreateEmployeeRequest, CreateRunRequest, CreateScheduleRequest,
    EmployerQuery, HealthResponse, RecordRunTxRequest, RunDetailResponse,
};
use crate::api::AppState;
use crate::chain::address::Address;
use crate::chain::models::{is_tx_hash, TxKind};
use crate::error::{AppError, AppResult, CommitError, LifecycleError};
use crate::payroll::clock;
use crate::payroll::lifecycle;
use crate::payroll::models::{
    Employee, PayrollClaim, PayrollRun, PayrollSchedule, RunStatus, DEFAULT_CLAIM_WINDOW_DAYS,
};
use crate::payroll::scheduler::{build_draft_claims, generate_payroll_id};
use crate::store::RunTxSlot;

fn validated<T: Validate>(value: &T) -> AppResult<()> {
    value
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /api/v1/payroll/employees
pub async fn create_employee(
    State(state): State<AppState>,
    Json(request): Json<CreateEmployeeRequest>,
) -> AppResult<Json<Employee>> {
    validated(&request)?;
    let wallet: Address = request.wallet.parse()?;

    let employee = state
        .payroll
        .insert_employee(Employee {
            id: Uuid::new_v4(),
            employer_id: request.employer_id,
            wallet: wallet.to_checksum(),
            salary_units: request.salary_units,
            active: true,
            created_at: Utc::now(),
        })
        .await?;
    info!(employer_id = %employee.employer_id, wallet = %employee.wallet, "Employee added to roster");
    Ok(Json(employee))
}

/// GET /api/v1/payroll/employees?employer_id=
pub async fn list_employees(
    State(state): State<AppState>,
    Query(query): Query<EmployerQuery>,
) -> AppResult<Json<Vec<Employee>>> {
    Ok(Json(state.payroll.employees(query.employer_id).await?))
}

/// POST /api/v1/payroll/employees/:id/deactivate
pub async fn deactivate_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let found = state.payroll.set_employee_active(id, false).await?;
    if !found {
        return Err(AppError::NotFound(format!("Employee {}", id)));
    }
    Ok(Json(serde_json::json!({ "id": id, "active": false })))
}

/// POST /api/v1/payroll/schedules
pub async fn create_schedule(
    State(state): State<AppState>,
    Json(request): Json<CreateScheduleRequest>,
) -> AppResult<Json<PayrollSchedule>> {
    validated(&request)?;

    let mut schedule = PayrollSchedule {
        id: Uuid::new_v4(),
        employer_id: request.employer_id,
        name: request.name,
        kind: request.kind,
        time_of_day: request.time_of_day,
        weekday: request.weekday,
        day_of_month: request.day_of_month,
        month_of_year: request.month_of_year,
        day_of_year: request.day_of_year,
        enabled: true,
        next_run_at: None,
        last_run_at: None,
        run_nonce: 0,
        created_at: Utc::now(),
    };
    // rejects malformed recurrence parameters up front
    schedule.next_run_at = clock::next_occurrence(&schedule, Utc::now())?;

    let schedule = state.payroll.insert_schedule(schedule).await?;
    info!(schedule_id = %schedule.id, kind = ?schedule.kind, "Schedule created");
    Ok(Json(schedule))
}

/// GET /api/v1/payroll/schedules?employer_id=
pub async fn list_schedules(
    State(state): State<AppState>,
    Query(query): Query<EmployerQuery>,
) -> AppResult<Json<Vec<PayrollSchedule>>> {
    Ok(Json(state.payroll.schedules(query.employer_id).await?))
}

/// POST /api/v1/payroll/runs
///
/// Materializes an instant draft run from the employer's active roster.
pub async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> AppResult<Json<PayrollRun>> {
    let claim_window_days = request.claim_window_days.unwrap_or(DEFAULT_CLAIM_WINDOW_DAYS);
    if !(1..=365).contains(&claim_window_days) {
        return Err(AppError::InvalidInput(
            "claim_window_days must be between 1 and 365".to_string(),
        ));
    }

    let employees = state.payroll.active_employees(request.employer_id).await?;
    if employees.is_empty() {
        return Err(AppError::InvalidInput(
            "No active employees on the roster".to_string(),
        ));
    }

    let payroll_id = generate_payroll_id(state.payroll.as_ref()).await?;
    let run_id = Uuid::new_v4();
    let claims = build_draft_claims(run_id, &employees);
    let run = PayrollRun {
        id: run_id,
        employer_id: request.employer_id,
        schedule_id: None,
        run_nonce: None,
        payroll_id,
        token: state.chain.token.to_checksum(),
        vault: state.chain.vault.to_checksum(),
        merkle_root: String::new(),
        total: claims.len() as i32,
        total_amount_units: employees.iter().map(|e| e.salary_units).sum(),
        status: RunStatus::Draft,
        create_tx_hash: String::new(),
        fund_tx_hash: String::new(),
        claim_window_days,
        close_at: None,
        created_at: Utc::now(),
    };

    let run = state.payroll.insert_run(run, claims).await?;
    info!(run_id = %run.id, payroll_id = run.payroll_id, total = run.total, "Draft run created");
    Ok(Json(run))
}

/// GET /api/v1/payroll/runs?employer_id=
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<EmployerQuery>,
) -> AppResult<Json<Vec<PayrollRun>>> {
    Ok(Json(state.payroll.runs(query.employer_id).await?))
}

/// GET /api/v1/payroll/runs/:id
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RunDetailResponse>> {
    let run = state
        .payroll
        .run(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {}", id)))?;
    let claims = state.payroll.claims_for_run(id).await?;
    Ok(Json(RunDetailResponse { run, claims }))
}

/// POST /api/v1/payroll/runs/:id/commit
pub async fn commit_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CommitRunRequest>,
) -> AppResult<Json<PayrollRun>> {
    let run = state.commitment.commit(id, request.items).await?;
    Ok(Json(run))
}

/// GET /api/v1/payroll/runs/:id/claims
pub async fn list_claims(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<PayrollClaim>>> {
    if state.payroll.run(id).await?.is_none() {
        return Err(AppError::NotFound(format!("Run {}", id)));
    }
    Ok(Json(state.payroll.claims_for_run(id).await?))
}

/// POST /api/v1/payroll/schedules/:id/toggle
///
/// Re-enabling recomputes the next occurrence from now; disabling clears it
/// so the scheduler never picks the schedule up mid-flight.
pub async fn toggle_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PayrollSchedule>> {
    let schedule = state
        .payroll
        .schedule(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Schedule {}", id)))?;

    let enabled = !schedule.enabled;
    let next_run_at = if enabled {
        clock::next_occurrence(&schedule, Utc::now())?
    } else {
        None
    };

    let updated = state
        .payroll
        .set_schedule_enabled(id, enabled, next_run_at)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Schedule {}", id)))?;
    info!(schedule_id = %id, enabled, "Schedule toggled");
    Ok(Json(updated))
}

/// POST /api/v1/payroll/runs/:id/txs
///
/// Records the create or fund transaction hash on the run itself. The hash
/// slot must match the run's current stage.
pub async fn record_run_tx(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RecordRunTxRequest>,
) -> AppResult<Json<PayrollRun>> {
    if !is_tx_hash(&request.tx_hash) {
        return Err(AppError::InvalidInput(format!(
            "Malformed transaction hash: {}",
            request.tx_hash
        )));
    }
    let run = state
        .payroll
        .run(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {}", id)))?;

    let (slot, required) = match request.kind {
        TxKind::CreatePayroll => (RunTxSlot::Create, RunStatus::Committed),
        TxKind::FundVault => (RunTxSlot::Fund, RunStatus::OnchainCreated),
        TxKind::Claim => {
            return Err(AppError::InvalidInput(
                "Claim transactions are tracked through /chain/txs".to_string(),
            ))
        }
    };
    if run.status != required {
        return Err(CommitError::InvalidRunState {
            current: run.status.to_string(),
            expected: required.to_string(),
        }
        .into());
    }

    state
        .payroll
        .set_run_tx_hash(id, slot, &request.tx_hash.to_lowercase())
        .await?;
    let run = state
        .payroll
        .run(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {}", id)))?;
    Ok(Json(run))
}

/// POST /api/v1/payroll/runs/:id/open
///
/// Synchronous gate check: fetches the receipt for each recorded stage and
/// walks the run as far as the evidence allows, so one call takes a
/// committed run all the way to open. Conflicts when a hash is missing or
/// its receipt is not mined yet.
pub async fn open_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PayrollRun>> {
    loop {
        let run = state
            .payroll
            .run(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Run {}", id)))?;

        match run.status {
            RunStatus::Committed => {
                if run.create_tx_hash.is_empty() {
                    return Err(LifecycleError::MissingTxReference("create").into());
                }
                let receipt = state
                    .provider
                    .transaction_receipt(&run.create_tx_hash)
                    .await?
                    .ok_or(LifecycleError::ReceiptPending)?;
                lifecycle::check_creation(&run, &receipt)?;
                state
                    .payroll
                    .advance_run_status(id, RunStatus::Committed, RunStatus::OnchainCreated, None)
                    .await?;
            }
            RunStatus::OnchainCreated => {
                if run.fund_tx_hash.is_empty() {
                    return Err(LifecycleError::MissingTxReference("fund").into());
                }
                let receipt = state
                    .provider
                    .transaction_receipt(&run.fund_tx_hash)
                    .await?
                    .ok_or(LifecycleError::ReceiptPending)?;
                lifecycle::check_funding(&run, &receipt)?;
                let close_at = Utc::now() + chrono::Duration::days(run.claim_window_days as i64);
                state
                    .payroll
                    .advance_run_status(id, RunStatus::OnchainCreated, RunStatus::Open, Some(close_at))
                    .await?;
            }
            // already open: idempotent
            RunStatus::Open => break,
            other => {
                return Err(LifecycleError::InvalidTransition {
                    from: other.to_string(),
                    to: RunStatus::Open.to_string(),
                }
                .into())
            }
        }
    }

    let run = state
        .payroll
        .run(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {}", id)))?;
    info!(run_id = %id, status = %run.status, "Open gate check passed");
    Ok(Json(run))
}

/// GET /api/v1/payroll/claims/:payroll_id/:wallet
///
/// The package an employee needs to claim on-chain: ciphertext, reference
/// and Merkle proof. Only served once the run is open.
pub async fn get_claim_package(
    State(state): State<AppState>,
    Path((payroll_id, wallet)): Path<(i64, String)>,
) -> AppResult<Json<PayrollClaim>> {
    let wallet: Address = wallet.parse()?;
    let run = state
        .payroll
        .run_by_payroll_id(payroll_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Payroll {}", payroll_id)))?;
    if run.status != RunStatus::Open {
        return Err(CommitError::InvalidRunState {
            current: run.status.to_string(),
            expected: RunStatus::Open.to_string(),
        }
        .into());
    }

    state
        .payroll
        .claim_by_wallet(run.id, &wallet.to_checksum())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Claim for {} in payroll {}", wallet, payroll_id)))
}
