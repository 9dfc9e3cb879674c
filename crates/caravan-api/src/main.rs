mod config;
mod error;
mod routes;

use std::sync::Arc;

use caravan_core::services::DatabaseService;

use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("caravan_api=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting caravan-api with config: {:?}", config);

    let service = DatabaseService::open_path(&config.db_path).await?;
    spawn_backup_task(service.clone(), config.clone());

    let bind_addr = config.bind_addr.clone();
    let state = AppState { config, service };
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("caravan-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}

/// Run a full-database backup on a fixed interval. An interval of zero
/// disables the task.
fn spawn_backup_task(service: DatabaseService, config: Arc<AppConfig>) {
    if config.backup_interval.is_zero() {
        tracing::info!("Periodic backups disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.backup_interval);
        // The first tick fires immediately; consume it so the task waits a
        // full interval before its first backup
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match service.backup_to(&config.backup_dir).await {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "periodic backup complete");
                }
                Err(error) => tracing::error!(%error, "periodic backup failed"),
            }
        }
    });
}
