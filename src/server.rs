//! Local HTTP surface for the map and summary displays.
//!
//! Serves the derived view state, accepts filter and focus commands, and
//! streams `flyToLocation` camera moves over Server-Sent Events.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::DashboardConfig;
use crate::dashboard::Dashboard;
use crate::geo::{GeocodeHit, Geocoder};
use crate::model::{FilterState, FocusCommand, GeoPoint, SourceKind, Stats};
use crate::push::ChannelState;
use crate::state::{FocusRouter, ViewStateStore, VisibleSet};
use crate::style::{
    check_in_marker, cluster_markers, incident_marker, patrol_marker, risk_zone_marker, Cluster,
    EntityKind, Marker,
};

struct ServerError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ServerError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, error: anyhow::anyhow!(message.into()) }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.error.to_string() }))).into_response()
    }
}

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, error: err.into() }
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<ViewStateStore>,
    pub focus: Arc<FocusRouter>,
    pub push_state: watch::Receiver<ChannelState>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
    pub patrol_silence: chrono::Duration,
}

impl ServerState {
    pub fn new(dashboard: &Dashboard, config: &DashboardConfig, geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        Self {
            store: dashboard.store(),
            focus: dashboard.focus(),
            push_state: dashboard.push_state_updates(),
            geocoder,
            patrol_silence: chrono::Duration::milliseconds(
                i64::try_from(config.patrol_silence_ms).unwrap_or(i64::MAX),
            ),
        }
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/visible", get(visible))
        .route("/api/filter", get(get_filter).post(set_filter))
        .route("/api/focus", axum::routing::post(focus))
        .route("/api/focus/stream", get(focus_stream))
        .route("/api/geocode", get(geocode))
        .route("/api/geocode/reverse", get(reverse_geocode))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(
    state: ServerState,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Dashboard API listening");
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    version: u64,
    fetched_at: DateTime<Utc>,
    partial: Vec<SourceKind>,
    degraded: bool,
    push: ChannelState,
}

async fn health(State(state): State<ServerState>) -> Json<Health> {
    let snapshot = state.store.snapshot().await;
    let push = *state.push_state.borrow();
    Json(Health {
        version: snapshot.version,
        fetched_at: snapshot.fetched_at,
        partial: snapshot.partial.iter().copied().collect(),
        degraded: snapshot.is_degraded(),
        push,
    })
}

async fn stats(State(state): State<ServerState>) -> Json<Stats> {
    Json(state.store.stats().await)
}

#[derive(Deserialize)]
struct ZoomQuery {
    zoom: Option<u8>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VisibleResponse {
    version: u64,
    partial: Vec<SourceKind>,
    zoom: u8,
    entities: Arc<VisibleSet>,
    markers: Vec<Marker>,
    clusters: Vec<Cluster>,
}

fn markers_for(visible: &VisibleSet, now: DateTime<Utc>, silence: chrono::Duration) -> Vec<Marker> {
    let patrols = visible.patrols.iter().map(|p| Marker {
        id: p.id.clone(),
        kind: EntityKind::Patrol,
        position: p.position,
        style: patrol_marker(p.effective_status(now, silence)),
    });
    let zones = visible.risk_zones.iter().filter_map(|z| {
        Some(Marker {
            id: z.id.clone(),
            kind: EntityKind::RiskZone,
            position: z.geometry.centroid()?,
            style: risk_zone_marker(z),
        })
    });
    let incidents = visible.incidents.iter().map(|i| Marker {
        id: i.id.clone(),
        kind: EntityKind::Incident,
        position: i.position,
        style: incident_marker(i),
    });
    let check_ins = visible.check_ins.iter().filter_map(|c| {
        Some(Marker {
            id: c.id.clone(),
            kind: EntityKind::CheckIn,
            position: c.position?,
            style: check_in_marker(),
        })
    });
    patrols.chain(zones).chain(incidents).chain(check_ins).collect()
}

async fn visible(State(state): State<ServerState>, Query(query): Query<ZoomQuery>) -> Json<VisibleResponse> {
    let zoom = query.zoom.unwrap_or(FocusCommand::DEFAULT_ZOOM);
    let (snapshot, entities) = state.store.view().await;
    let markers = markers_for(&entities, Utc::now(), state.patrol_silence);
    let clusters = cluster_markers(&markers, zoom);
    Json(VisibleResponse {
        version: snapshot.version,
        partial: snapshot.partial.iter().copied().collect(),
        zoom,
        entities,
        markers,
        clusters,
    })
}

async fn get_filter(State(state): State<ServerState>) -> Json<FilterState> {
    Json(state.store.filter().await)
}

async fn set_filter(State(state): State<ServerState>, Json(filter): Json<FilterState>) -> impl IntoResponse {
    let changed = state.store.set_filter(filter).await;
    Json(serde_json::json!({ "changed": changed }))
}

async fn focus(
    State(state): State<ServerState>,
    Json(cmd): Json<FocusCommand>,
) -> Result<impl IntoResponse, ServerError> {
    if !GeoPoint::new(cmd.lat, cmd.lon).is_valid() {
        return Err(ServerError::new(StatusCode::BAD_REQUEST, "coordinates out of range"));
    }
    let delivered = state.focus.emit(cmd);
    Ok(Json(serde_json::json!({ "delivered": delivered })))
}

async fn focus_stream(State(state): State<ServerState>) -> impl IntoResponse {
    let (sse_tx, sse_rx) = tokio::sync::mpsc::unbounded_channel::<Result<Event, Infallible>>();
    let mut commands = state.focus.stream();

    tokio::spawn(async move {
        loop {
            let cmd = tokio::select! {
                _ = sse_tx.closed() => break,
                received = commands.recv() => match received {
                    Ok(cmd) => cmd,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            let Ok(event) = Event::default().event("flyToLocation").json_data(cmd) else {
                continue;
            };
            if sse_tx.send(Ok(event)).is_err() {
                break;
            }
        }
    });

    Sse::new(UnboundedReceiverStream::new(sse_rx)).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct GeocodeQuery {
    q: String,
}

#[derive(Deserialize)]
struct ReverseQuery {
    lat: f64,
    #[serde(alias = "lon")]
    lng: f64,
}

fn geocoder(state: &ServerState) -> Result<Arc<dyn Geocoder>, ServerError> {
    state
        .geocoder
        .clone()
        .ok_or_else(|| ServerError::new(StatusCode::SERVICE_UNAVAILABLE, "geocoding is not configured"))
}

async fn geocode(
    State(state): State<ServerState>,
    Query(query): Query<GeocodeQuery>,
) -> Result<Json<Vec<GeocodeHit>>, ServerError> {
    Ok(Json(geocoder(&state)?.forward(&query.q).await))
}

async fn reverse_geocode(
    State(state): State<ServerState>,
    Query(query): Query<ReverseQuery>,
) -> Result<Json<Vec<GeocodeHit>>, ServerError> {
    Ok(Json(geocoder(&state)?.reverse(GeoPoint::new(query.lat, query.lng)).await))
}
