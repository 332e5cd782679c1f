use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::{
    chain::{list_txs, submit_tx},
    payroll::{
        commit_run, create_employee, create_run, create_schedule, deactivate_employee,
        get_claim_package, get_run, health_check, list_claims, list_employees, list_runs,
        list_schedules, open_run, record_run_tx, toggle_schedule,
    },
    AppState,
};

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // roster
                .route("/payroll/employees", post(create_employee).get(list_employees))
                .route("/payroll/employees/:id/deactivate", post(deactivate_employee))
                // schedules
                .route("/payroll/schedules", post(create_schedule).get(list_schedules))
                .route("/payroll/schedules/:id/toggle", post(toggle_schedule))
                // runs and claims
                .route("/payroll/runs", post(create_run).get(list_runs))
                .route("/payroll/runs/:id", get(get_run))
                .route("/payroll/runs/:id/commit", post(commit_run))
                .route("/payroll/runs/:id/txs", post(record_run_tx))
                .route("/payroll/runs/:id/open", post(open_run))
                .route("/payroll/runs/:id/claims", get(list_claims))
                .route("/payroll/claims/:payroll_id/:wallet", get(get_claim_package))
                // submitted transaction tracking
                .route("/chain/txs", post(submit_tx).get(list_txs)),
        )
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
