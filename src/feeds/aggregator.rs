//! Feed Aggregator
//!
//! Fetches independent sources concurrently, each under its own timeout, and
//! merges the results into a new [`MapSnapshot`] at a single merge point.
//! A failing source keeps its previous slice and is named in `partial`; it
//! never blocks the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::normalize::{self, SourceData};
use super::DashboardApi;
use crate::backoff::ExponentialBackoff;
use crate::error::{SyncError, SyncResult};
use crate::model::{Incident, MapSnapshot, SourceKind};
use crate::state::ViewStateStore;

#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    /// Upper bound for a single source fetch; a hung source fails the cycle.
    pub fetch_timeout: Duration,
    /// Cap for a failing source's degraded polling interval.
    pub max_backoff: Duration,
    /// Incidents kept in the snapshot when push events are merged in.
    pub incident_feed_limit: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(8),
            max_backoff: Duration::from_secs(300),
            incident_feed_limit: 50,
        }
    }
}

struct MergeState {
    snapshot: Arc<MapSnapshot>,
    failures: HashMap<SourceKind, u32>,
}

pub struct FeedAggregator {
    api: Arc<dyn DashboardApi>,
    store: Arc<ViewStateStore>,
    config: AggregatorConfig,
    merge: Mutex<MergeState>,
}

impl FeedAggregator {
    pub fn new(api: Arc<dyn DashboardApi>, store: Arc<ViewStateStore>, config: AggregatorConfig) -> Self {
        Self {
            api,
            store,
            config,
            merge: Mutex::new(MergeState {
                snapshot: Arc::new(MapSnapshot::empty()),
                failures: HashMap::new(),
            }),
        }
    }

    /// Refresh every source.
    pub async fn refresh(&self) -> Arc<MapSnapshot> {
        self.refresh_sources(&SourceKind::ALL).await
    }

    /// Refresh a subset of sources; the others carry over untouched.
    pub async fn refresh_sources(&self, sources: &[SourceKind]) -> Arc<MapSnapshot> {
        let results = join_all(sources.iter().map(|source| self.fetch_one(*source))).await;
        self.merge(results).await
    }

    async fn fetch_one(&self, source: SourceKind) -> (SourceKind, SyncResult<SourceData>) {
        let limit = self.config.fetch_timeout;
        let result = match timeout(limit, self.api.fetch(source)).await {
            Ok(Ok(payload)) => normalize::decode(source, &payload),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(SyncError::timeout(format!("fetch {source}"), limit)),
        };
        (source, result)
    }

    async fn merge(&self, results: Vec<(SourceKind, SyncResult<SourceData>)>) -> Arc<MapSnapshot> {
        let mut merge = self.merge.lock().await;
        let mut next = (*merge.snapshot).clone();
        let now = Utc::now();

        for (source, result) in results {
            match result {
                Ok(data) => {
                    write_slice(&mut next, data);
                    next.partial.remove(&source);
                    next.source_fetched_at.insert(source, now);
                    if let Some(failures) = merge.failures.remove(&source) {
                        info!(source = %source, failures, "Source recovered");
                    }
                }
                Err(err) => {
                    next.partial.insert(source);
                    let failures = merge.failures.entry(source).or_insert(0);
                    *failures += 1;
                    warn!(source = %source, failures = *failures, error = %err, "Source refresh failed; keeping previous data");
                }
            }
        }

        next.version += 1;
        next.fetched_at = now;
        if next.is_degraded() {
            warn!("Every source is failing; dashboard is running on last-known state");
        }
        self.publish(&mut merge, next).await
    }

    /// Merge a pushed incident through the same point as polling.
    pub async fn ingest_push(&self, incident: Incident) -> Arc<MapSnapshot> {
        let mut merge = self.merge.lock().await;
        let mut next = (*merge.snapshot).clone();

        next.incidents.retain(|existing| existing.id != incident.id);
        debug!(id = %incident.id, "Merging pushed incident");
        next.incidents.push(incident);
        next.incidents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        next.incidents.truncate(self.config.incident_feed_limit);
        next.version += 1;

        self.publish(&mut merge, next).await
    }

    /// Swap in the merged snapshot and hand it to the store while the merge
    /// lock is held, so handoffs happen in merge order.
    async fn publish(&self, merge: &mut MergeState, next: MapSnapshot) -> Arc<MapSnapshot> {
        let snapshot = Arc::new(next);
        merge.snapshot = snapshot.clone();
        self.store.apply(snapshot.clone()).await;
        snapshot
    }

    pub async fn snapshot(&self) -> Arc<MapSnapshot> {
        self.merge.lock().await.snapshot.clone()
    }

    pub async fn consecutive_failures(&self, source: SourceKind) -> u32 {
        self.merge.lock().await.failures.get(&source).copied().unwrap_or(0)
    }

    /// Polling interval for one source: `base` doubled per consecutive
    /// failure, capped at `max_backoff`.
    pub async fn next_interval(&self, source: SourceKind, base: Duration) -> Duration {
        let failures = self.consecutive_failures(source).await;
        ExponentialBackoff::new(base, self.config.max_backoff).delay_for(failures)
    }
}

fn write_slice(snapshot: &mut MapSnapshot, data: SourceData) {
    match data {
        SourceData::Patrols(patrols) => snapshot.patrols = patrols,
        SourceData::RiskZones(zones) => snapshot.risk_zones = zones,
        SourceData::Incidents(incidents) => snapshot.incidents = incidents,
        SourceData::CheckIns(check_ins) => snapshot.check_ins = check_ins,
        SourceData::IncidentTotal(total) => snapshot.incident_total = Some(total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;

    /// Serves canned payloads; sources listed in `failing` error out and
    /// sources in `hanging` never answer.
    #[derive(Default)]
    struct StubApi {
        payloads: StdMutex<HashMap<SourceKind, Value>>,
        failing: StdMutex<Vec<SourceKind>>,
        hanging: Vec<SourceKind>,
    }

    impl StubApi {
        fn with(payloads: Vec<(SourceKind, Value)>) -> Self {
            Self { payloads: StdMutex::new(payloads.into_iter().collect()), ..Default::default() }
        }

        fn set(&self, source: SourceKind, payload: Value) {
            self.payloads.lock().unwrap().insert(source, payload);
        }

        fn fail(&self, sources: &[SourceKind]) {
            *self.failing.lock().unwrap() = sources.to_vec();
        }
    }

    #[async_trait]
    impl DashboardApi for StubApi {
        async fn fetch(&self, source: SourceKind) -> SyncResult<Value> {
            if self.hanging.contains(&source) {
                std::future::pending::<()>().await;
            }
            if self.failing.lock().unwrap().contains(&source) {
                return Err(SyncError::Status { endpoint: source.to_string(), status: 503 });
            }
            Ok(self.payloads.lock().unwrap().get(&source).cloned().unwrap_or_else(|| json!([])))
        }
    }

    fn patrols(ids: &[&str]) -> Value {
        Value::Array(
            ids.iter()
                .map(|id| json!({ "id": id, "lat": 13.75, "lng": 100.5, "status": "active",
                                  "updatedAt": Utc::now().to_rfc3339() }))
                .collect(),
        )
    }

    fn zones(ids: &[&str]) -> Value {
        Value::Array(
            ids.iter()
                .map(|id| json!({ "id": id, "lat": 13.7, "lng": 100.4, "radius": 300,
                                  "severity": "high", "category": "theft" }))
                .collect(),
        )
    }

    fn aggregator(api: Arc<StubApi>) -> (FeedAggregator, Arc<ViewStateStore>) {
        let store = Arc::new(ViewStateStore::default());
        let config = AggregatorConfig { fetch_timeout: Duration::from_millis(200), ..Default::default() };
        (FeedAggregator::new(api, store.clone(), config), store)
    }

    #[tokio::test]
    async fn failed_source_keeps_previous_slice() {
        let api = Arc::new(StubApi::with(vec![
            (SourceKind::Patrols, patrols(&["p1"])),
            (SourceKind::RiskZones, zones(&["z1"])),
            (SourceKind::IncidentStats, json!({ "total": 3 })),
        ]));
        let (aggregator, store) = aggregator(api.clone());

        let first = aggregator.refresh().await;
        assert!(first.partial.is_empty());
        assert_eq!(first.risk_zones.len(), 1);

        api.set(SourceKind::Patrols, patrols(&["p1", "p2"]));
        api.set(SourceKind::RiskZones, zones(&["z1", "z2", "z3"]));
        api.fail(&[SourceKind::RiskZones]);

        let second = aggregator.refresh().await;
        assert_eq!(second.patrols.len(), 2, "healthy slice is fresh");
        assert_eq!(second.risk_zones, first.risk_zones, "failed slice is the previous one");
        assert!(second.partial.contains(&SourceKind::RiskZones));
        assert_eq!(second.partial.len(), 1);
        assert_eq!(second.incident_total, Some(3));
        assert_eq!(second.version, first.version + 1);
        assert_eq!(store.snapshot().await.version, second.version);

        api.fail(&[]);
        let third = aggregator.refresh().await;
        assert!(third.partial.is_empty());
        assert_eq!(third.risk_zones.len(), 3);
    }

    #[tokio::test]
    async fn hung_source_times_out_without_stalling_others() {
        let api = Arc::new(StubApi {
            payloads: StdMutex::new([(SourceKind::Patrols, patrols(&["p1"]))].into_iter().collect()),
            hanging: vec![SourceKind::Incidents],
            ..Default::default()
        });
        let (aggregator, _store) = aggregator(api);

        let snapshot = aggregator.refresh().await;
        assert_eq!(snapshot.patrols.len(), 1);
        assert!(snapshot.partial.contains(&SourceKind::Incidents));
        assert_eq!(aggregator.consecutive_failures(SourceKind::Incidents).await, 1);
    }

    #[tokio::test]
    async fn malformed_payload_marks_source_partial() {
        let api = Arc::new(StubApi::with(vec![(SourceKind::Patrols, json!({ "error": "boom" }))]));
        let (aggregator, _store) = aggregator(api);

        let snapshot = aggregator.refresh_sources(&[SourceKind::Patrols]).await;
        assert!(snapshot.is_stale(SourceKind::Patrols));
        assert!(snapshot.patrols.is_empty());
    }

    #[tokio::test]
    async fn failing_source_backs_off_alone() {
        let api = Arc::new(StubApi::default());
        api.fail(&[SourceKind::RiskZones]);
        let (aggregator, _store) = aggregator(api.clone());
        let base = Duration::from_secs(30);

        for _ in 0..3 {
            aggregator.refresh().await;
        }
        assert_eq!(aggregator.next_interval(SourceKind::RiskZones, base).await, Duration::from_secs(240));
        assert_eq!(aggregator.next_interval(SourceKind::Incidents, base).await, base);

        for _ in 0..5 {
            aggregator.refresh().await;
        }
        assert_eq!(
            aggregator.next_interval(SourceKind::RiskZones, base).await,
            Duration::from_secs(300),
            "capped"
        );

        api.fail(&[]);
        aggregator.refresh().await;
        assert_eq!(aggregator.next_interval(SourceKind::RiskZones, base).await, base);
    }

    #[tokio::test]
    async fn total_failure_is_degraded_but_keeps_data() {
        let api = Arc::new(StubApi::with(vec![(SourceKind::Patrols, patrols(&["p1"]))]));
        let (aggregator, _store) = aggregator(api.clone());
        aggregator.refresh().await;

        api.fail(&SourceKind::ALL);
        let snapshot = aggregator.refresh().await;
        assert!(snapshot.is_degraded());
        assert_eq!(snapshot.patrols.len(), 1);
    }

    #[tokio::test]
    async fn pushed_incident_merges_newest_first() {
        let api = Arc::new(StubApi::with(vec![(
            SourceKind::Incidents,
            json!([{ "id": "i1", "lat": 1.0, "lng": 1.0, "createdAt": "2026-03-10T08:00:00Z" }]),
        )]));
        let (aggregator, store) = aggregator(api);
        aggregator.refresh().await;

        let pushed = Incident {
            id: "i2".into(),
            kind: crate::model::IncidentType::Suppression,
            description: "checkpoint".into(),
            position: crate::model::GeoPoint::new(1.0, 1.0),
            created_at: Utc::now(),
            resolved: false,
            officer_id: None,
            province: None,
        };
        aggregator.ingest_push(pushed.clone()).await;
        let snapshot = aggregator.ingest_push(pushed).await;

        assert_eq!(snapshot.incidents.len(), 2, "same id is replaced, not duplicated");
        assert_eq!(snapshot.incidents[0].id, "i2");
        assert_eq!(store.visible().await.incidents.len(), 2);
    }
}
