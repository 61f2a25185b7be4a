use holdreward::orchestration::Shutdown;
use holdreward::{api, config::Config, db::init_db, Ledger, Repository, RewardService, RpcLedger};
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
    let ledger: Arc<dyn Ledger> = Arc::new(RpcLedger::new(
        config.ledger_rpc_url.clone(),
        config.ledger_poll_interval,
    ));

    let (trigger, shutdown) = Shutdown::new();
    let service = Arc::new(RewardService::new(
        ledger.clone(),
        repo,
        &config,
        shutdown.clone(),
    ));

    tracing::info!(
        base_instrument = %config.base_instrument,
        instruments = config.instruments.len(),
        token_decimals = config.token_units.decimals(),
        reward_instrument = %config.reward_instrument,
        reward_decimals = config.reward_units.decimals(),
        signer = %config.signer_address,
        "Reward service configured"
    );

    let app = api::create_router(api::AppState::new(service, ledger));

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

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            trigger.trigger();
        }
    });

    // Run server; in-flight settlements finish their current transfer first.
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.triggered().await })
        .await;
    if let Err(e) = result {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
