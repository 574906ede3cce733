mod auth;
mod problem;
mod router;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use credvault_core::{CredentialService, PasswordHasher};
use credvault_storage::Database;
use credvault_util::{load_env_file, AppConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database =
        Database::connect_with_timeout(&config.database_url, config.storage_timeout).await?;
    database.run_migrations().await?;
    info!(stage = "storage", database_url = %config.database_url, "credential store ready");

    let hasher = PasswordHasher::new(config.bcrypt_cost, config.pepper.clone())?;
    let credentials = CredentialService::new(Arc::new(database.credentials()), hasher)
        .with_storage_timeout(config.storage_timeout);
    let state = router::AppState::new(metrics, credentials);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, router::app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    database.close().await;
    info!(stage = "storage", "credential store closed");

    served.map_err(|err| err.into())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(stage = "app", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(stage = "app", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(stage = "app", "shutdown signal received");
}
