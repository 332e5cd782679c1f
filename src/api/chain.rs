//! Handlers for externally-submitted transaction tracking.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::api::models::{EmployerQuery, SubmitTxRequest, SubmitTxResponse};
use crate::api::AppState;
use crate::chain::address::Address;
use crate::chain::models::{is_tx_hash, ChainTx, TxKind, TxStatus};
use crate::error::{AppError, AppResult};

const LIST_LIMIT: i64 = 100;

/// POST /api/v1/chain/txs
///
/// Registers a wallet-submitted transaction for reconciliation. Idempotent
/// on the hash: replays return the tracked row with `created = false`.
pub async fn submit_tx(
    State(state): State<AppState>,
    Json(request): Json<SubmitTxRequest>,
) -> AppResult<Json<SubmitTxResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    if !is_tx_hash(&request.tx_hash) {
        return Err(AppError::InvalidInput(format!(
            "Malformed transaction hash: {}",
            request.tx_hash
        )));
    }

    if request.run_id.is_none() && request.payroll_id.is_none() {
        return Err(AppError::InvalidInput(
            "Either run_id or payroll_id is required".to_string(),
        ));
    }
    let employee_wallet = match (&request.kind, &request.employee_wallet) {
        (TxKind::Claim, Some(wallet)) => {
            let wallet: Address = wallet.parse()?;
            wallet.to_checksum()
        }
        (TxKind::Claim, None) => {
            return Err(AppError::InvalidInput(
                "employee_wallet is required for claim transactions".to_string(),
            ))
        }
        _ => String::new(),
    };

    let now = Utc::now();
    let (tx, created) = state
        .chain_txs
        .submit_tx(ChainTx {
            id: Uuid::new_v4(),
            employer_id: request.employer_id,
            chain_id: state.chain.chain_id,
            tx_hash: request.tx_hash.to_lowercase(),
            kind: request.kind,
            status: TxStatus::Pending,
            run_id: request.run_id,
            payroll_id: request.payroll_id,
            employee_wallet,
            block_number: None,
            success: None,
            meta: request.meta.unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
        })
        .await?;

    if created {
        info!(tx_hash = %tx.tx_hash, kind = %tx.kind, "Tracking submitted transaction");
    }
    Ok(Json(SubmitTxResponse { created, tx }))
}

/// GET /api/v1/chain/txs?employer_id=
pub async fn list_txs(
    State(state): State<AppState>,
    Query(query): Query<EmployerQuery>,
) -> AppResult<Json<Vec<ChainTx>>> {
    Ok(Json(
        state
            .chain_txs
            .txs_for_employer(query.employer_id, LIST_LIMIT)
            .await?,
    ))
}
