mod api;
mod bootstrap;
mod chain;
mod config;
mod error;
mod payroll;
mod server;
mod store;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,payroll_backend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("🚀 Starting payroll settlement backend");

    dotenv::dotenv().ok();
    let config = config::Config::from_env()?;

    // workers keep running for the lifetime of the server
    let bootstrap::App { state, workers: _workers } = bootstrap::initialize_app(&config).await?;
    let router = server::create_app(state);

    server::run_server(router, &config.bind_address).await?;

    Ok(())
}
