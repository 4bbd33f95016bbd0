//! cert-expiry - inactivity-based expiration dates for on-chain certificates.
//!
//! # API Endpoints
//!
//! - `POST /activity` - Record an activity event in the local index
//! - `GET /expiration` - Compute an expiration date
//! - `POST /certificates` - Record a certificate issuance
//! - `GET /certificates/:token_id` - Certificate view with expiration
//! - `GET /health` - Health check
//!
//! # Configuration
//!
//! See [`cert_expiry::config::Config`]; everything is read from `CERT_EXPIRY_*`
//! environment variables.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cert_expiry::api::{AppState, router};
use cert_expiry::config::Config;
use cert_expiry::data_sources::{ActivityDataSource, IndexerClient};
use cert_expiry::expiration::ExpirationCalculator;
use cert_expiry::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("cert_expiry=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(
        port = config.port,
        db_url = %config.database_url,
        threshold_days = config.policy.threshold_days,
        inclusive = config.policy.inclusive,
        "Starting cert-expiry server"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let source: Arc<dyn ActivityDataSource> = match &config.indexer_url {
        Some(url) => {
            info!(indexer_url = %url, "Using remote activity indexer");
            Arc::new(IndexerClient::new(url))
        }
        None => {
            info!("Using local activity index");
            Arc::new(storage.clone())
        }
    };

    let calculator = ExpirationCalculator::new(source, config.policy, config.source_timeout);

    let state = AppState {
        storage,
        calculator,
        cache_seconds: config.cache_seconds,
    };

    let app = router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "cert-expiry is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
