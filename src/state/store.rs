//! View State Store
//!
//! Single writer of the dashboard's map state. Holds the last snapshot and
//! the current filter, derives the visible entity set, and notifies render
//! subscribers only when that set actually changes by content.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::listeners::{ListenerSet, Subscription};
use super::stats::StatsProjector;
use crate::model::{CheckIn, FilterState, Incident, MapSnapshot, PatrolUnit, RiskZone, Stats};

/// Entities that pass the current filter. Compared by content; snapshot
/// metadata (version, fetch times) is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleSet {
    pub patrols: Vec<PatrolUnit>,
    pub risk_zones: Vec<RiskZone>,
    pub incidents: Vec<Incident>,
    pub check_ins: Vec<CheckIn>,
}

impl VisibleSet {
    pub fn is_empty(&self) -> bool {
        self.patrols.is_empty()
            && self.risk_zones.is_empty()
            && self.incidents.is_empty()
            && self.check_ins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patrols.len() + self.risk_zones.len() + self.incidents.len() + self.check_ins.len()
    }
}

/// Filter predicate applied to a snapshot.
pub fn derive_visible(snapshot: &MapSnapshot, filter: &FilterState) -> VisibleSet {
    let layers = filter.layers;
    let in_province = |p: &Option<String>| filter.matches_province(p.as_deref());

    VisibleSet {
        patrols: if layers.patrols {
            snapshot.patrols.iter().filter(|p| in_province(&p.province)).cloned().collect()
        } else {
            Vec::new()
        },
        risk_zones: if layers.risk_zones {
            snapshot
                .risk_zones
                .iter()
                .filter(|z| z.active && in_province(&z.province) && filter.matches_category(z.category))
                .cloned()
                .collect()
        } else {
            Vec::new()
        },
        incidents: if layers.incidents {
            snapshot.incidents.iter().filter(|i| in_province(&i.province)).cloned().collect()
        } else {
            Vec::new()
        },
        check_ins: if layers.check_ins {
            snapshot.check_ins.iter().filter(|c| in_province(&c.province)).cloned().collect()
        } else {
            Vec::new()
        },
    }
}

struct StoreState {
    snapshot: Arc<MapSnapshot>,
    filter: FilterState,
    visible: Arc<VisibleSet>,
    stats: Stats,
}

pub struct ViewStateStore {
    state: Mutex<StoreState>,
    projector: StatsProjector,
    visible_listeners: Arc<ListenerSet<Arc<VisibleSet>>>,
    stats_listeners: Arc<ListenerSet<Stats>>,
}

impl ViewStateStore {
    pub fn new(projector: StatsProjector) -> Self {
        Self {
            state: Mutex::new(StoreState {
                snapshot: Arc::new(MapSnapshot::empty()),
                filter: FilterState::default(),
                visible: Arc::new(VisibleSet::default()),
                stats: Stats::default(),
            }),
            projector,
            visible_listeners: ListenerSet::new(),
            stats_listeners: ListenerSet::new(),
        }
    }

    /// Replace the snapshot. Returns true when the visible set changed and
    /// subscribers were notified. A snapshot older than the current one is
    /// ignored.
    pub async fn apply(&self, snapshot: impl Into<Arc<MapSnapshot>>) -> bool {
        let snapshot = snapshot.into();
        let mut state = self.state.lock().await;

        if snapshot.version < state.snapshot.version {
            debug!(
                incoming = snapshot.version,
                current = state.snapshot.version,
                "Ignoring out-of-order snapshot"
            );
            return false;
        }

        let stats = self.projector.project(&snapshot);
        let visible = derive_visible(&snapshot, &state.filter);
        state.snapshot = snapshot;

        if stats != state.stats {
            state.stats = stats;
            self.stats_listeners.notify(&stats);
        }
        self.publish_if_changed(&mut state, visible)
    }

    /// Replace the filter. Returns true when the visible set changed.
    pub async fn set_filter(&self, filter: FilterState) -> bool {
        let mut state = self.state.lock().await;
        if state.filter == filter {
            return false;
        }
        let visible = derive_visible(&state.snapshot, &filter);
        state.filter = filter;
        self.publish_if_changed(&mut state, visible)
    }

    fn publish_if_changed(&self, state: &mut StoreState, visible: VisibleSet) -> bool {
        if *state.visible == visible {
            return false;
        }
        let visible = Arc::new(visible);
        state.visible = visible.clone();
        let notified = self.visible_listeners.notify(&visible);
        debug!(entities = visible.len(), subscribers = notified, "Visible set changed");
        true
    }

    /// Register a render subscriber. It is called with every new visible set,
    /// under the store's update order.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<VisibleSet>) + Send + Sync + 'static,
    {
        self.visible_listeners.subscribe(callback)
    }

    /// Register a summary-display subscriber, called when [`Stats`] change.
    pub fn subscribe_stats<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Stats) + Send + Sync + 'static,
    {
        self.stats_listeners.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.visible_listeners.len()
    }

    pub async fn snapshot(&self) -> Arc<MapSnapshot> {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn filter(&self) -> FilterState {
        self.state.lock().await.filter.clone()
    }

    pub async fn visible(&self) -> Arc<VisibleSet> {
        self.state.lock().await.visible.clone()
    }

    /// The snapshot and the visible set derived from it, read under one lock.
    pub async fn view(&self) -> (Arc<MapSnapshot>, Arc<VisibleSet>) {
        let state = self.state.lock().await;
        (state.snapshot.clone(), state.visible.clone())
    }

    pub async fn stats(&self) -> Stats {
        self.state.lock().await.stats
    }
}

impl Default for ViewStateStore {
    fn default() -> Self {
        Self::new(StatsProjector::default())
    }
}
