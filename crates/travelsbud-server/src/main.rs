mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use travelsbud_api::auth::{AppState, AppStateInner};
use travelsbud_core::{BlobStore, FcmPushGateway, NullPushGateway, PushGateway, Services};
use travelsbud_db::Database;
use travelsbud_gateway::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "travelsbud=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let blobs = Arc::new(BlobStore::new(config.blob_dir.clone(), config.public_url.clone()).await?);

    let push: Arc<dyn PushGateway> = match config.fcm {
        Some(fcm) => Arc::new(FcmPushGateway::new(fcm.server_key, fcm.endpoint)?),
        None => {
            warn!("TRAVELSBUD_FCM_SERVER_KEY not set, push notifications are disabled");
            Arc::new(NullPushGateway)
        }
    };

    let state: AppState = Arc::new(AppStateInner {
        services: Services::new(db, push, blobs),
        jwt_secret: config.jwt_secret,
        dispatcher: Dispatcher::new(),
    });

    let app = travelsbud_api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("TravelsBud server listening on {}", addr);
    info!("Blob storage: {}", config.blob_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
