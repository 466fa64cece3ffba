//! Patrol dashboard sync service.
//!
//! Polls the patrol backend, holds the push channel open, and serves the
//! derived map state to the dashboard front end.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use patrol_sync::feeds::HttpDashboardApi;
use patrol_sync::geo::{Geocoder, NominatimGeocoder};
use patrol_sync::push::SseTransport;
use patrol_sync::server::{run_server, ServerState};
use patrol_sync::{telemetry, Dashboard, DashboardConfig, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let config = DashboardConfig::load().await.context("loading dashboard config")?;
    let _log_guard = telemetry::init_tracing(config.log_dir.as_deref())?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting patrol sync");

    if config.token.is_none() {
        warn!("No PATROL_TOKEN set; push channel stays idle until a session is issued");
    }
    let session = Arc::new(SessionStore::new(config.token.clone()));

    let api = Arc::new(
        HttpDashboardApi::new(&config.api_url, session.clone(), config.fetch_timeout())?
            .with_limits(config.check_in_limit, config.incident_feed_limit),
    );
    let transport = Arc::new(SseTransport::new(&config.push_url, &config.push_namespace)?);

    let mut geocoder = NominatimGeocoder::new(
        &config.geocoder_url,
        std::time::Duration::from_millis(config.geocoder_interval_ms),
        config.fetch_timeout(),
    )?;
    if let Some(codes) = &config.geocoder_country_codes {
        geocoder = geocoder.with_country_codes(codes.clone());
    }
    let geocoder: Arc<dyn Geocoder> = Arc::new(geocoder);

    let dashboard = Dashboard::mount(&config, api, transport, session);
    let state = ServerState::new(&dashboard, &config, Some(geocoder));

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for shutdown signal");
        }
        info!("Shutdown requested");
    };
    let served = run_server(state, &config.bind_addr, shutdown).await;

    dashboard.unmount().await;
    served
}
