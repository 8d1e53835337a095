use commission_engine::engine::{Clock, SystemClock};
use commission_engine::orchestration::spawn_sweep_schedule;
use commission_engine::{api, config::Config, db::init_db, Repository, Services};
use commission_engine::{HttpSettlementClient, SettlementClient};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let client: Arc<dyn SettlementClient> =
        Arc::new(HttpSettlementClient::new(config.settlement_api_url.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (services, _worker) = Services::build(&config, repo, client, clock);

    if let Some(interval) = config.payout_sweep_interval {
        spawn_sweep_schedule(
            services.queue.clone(),
            interval,
            config.auto_payout_batch_size,
            config.auto_payout_min_amount,
        );
        tracing::info!(interval_secs = interval.as_secs(), "Payout sweep scheduled");
    }

    // Create router
    let app = api::create_router(api::AppState::new(&services, config));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
