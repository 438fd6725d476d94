//! Sitepulse - business-hours uptime and downtime reports for monitored sites.
//!
//! # API Endpoints
//!
//! - `GET /trigger_report` - Start a report job
//! - `POST /get_report` - Poll a report job
//! - `GET /reports/:job_id/download` - Download a finished report via signed link
//! - `GET /health` - Health check

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sitepulse::api::{AppState, router};
use sitepulse::artifacts::{LinkSigner, SqliteArtifactStore};
use sitepulse::config::Config;
use sitepulse::jobs::ReportJobs;
use sitepulse::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("sitepulse=info".parse()?))
        .init();

    let config = Config::from_env();

    info!(port = config.port, db_url = %config.database_url, "Starting Sitepulse server");

    let storage = Storage::new(&config.database_url).await?;
    let artifacts = SqliteArtifactStore::new(storage.pool().clone()).await?;
    info!("Database initialized");

    let signer = LinkSigner::new(
        config.signing_secret.clone(),
        &config.public_url,
        config.link_ttl,
    );
    let jobs = ReportJobs::new(storage, Arc::new(artifacts), signer);

    let app = router(AppState { jobs });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, public_url = %config.public_url, "Sitepulse is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
