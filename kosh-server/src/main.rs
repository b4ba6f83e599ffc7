use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use kosh_server::config::Config;
use kosh_server::moderation::{
    AdminGateway, ChangeNotifier, CorrectionApplier, EntityStore, InMemoryStore,
    ModerationService, SqliteStore, ThresholdPolicy,
};
use kosh_server::{api_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kosh_server=info,tower_http=info".into()),
        )
        .init();

    info!("Starting kosh moderation server");

    let config = Config::from_env().context("failed to load configuration")?;

    let store: Arc<dyn EntityStore> = if config.ephemeral {
        info!("Using in-memory store (EPHEMERAL_STORE=true)");
        Arc::new(InMemoryStore::new())
    } else {
        let db_path = config.database_path();
        info!("Using state database: {}", db_path.display());
        Arc::new(SqliteStore::new(&db_path).context("failed to initialize SQLite database")?)
    };

    let policy = ThresholdPolicy::default();
    let notifier = ChangeNotifier::default();

    let state = Arc::new(AppState {
        service: ModerationService::new(store.clone(), policy, notifier.clone()),
        gateway: AdminGateway::new(store.clone(), policy, notifier.clone()),
        applier: CorrectionApplier::new(store, policy, notifier),
        admin_users: config.admin_users.iter().cloned().map(Into::into).collect(),
    });

    let app = api_router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
