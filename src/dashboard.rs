//! Dashboard lifecycle.
//!
//! Wires the store, aggregator, focus bus, poll scheduler and push channel
//! for one mounted dashboard view. Everything started by [`Dashboard::mount`]
//! is torn down by [`Dashboard::unmount`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::config::DashboardConfig;
use crate::feeds::{DashboardApi, FeedAggregator, SchedulerHandle};
use crate::push::{ChannelState, Notification, PushChannel, PushEnvelope, PushEvent, PushHandle, PushSink, PushTransport};
use crate::session::CredentialProvider;
use crate::state::{FocusRouter, ViewStateStore};

/// Routes push events into the pipeline: incidents through the aggregator's
/// merge point, notifications to the notification bus.
struct PipelineSink {
    aggregator: Arc<FeedAggregator>,
    notifications: broadcast::Sender<Notification>,
    latest_session: AtomicU64,
}

#[async_trait]
impl PushSink for PipelineSink {
    async fn deliver(&self, envelope: PushEnvelope) {
        let latest = self.latest_session.fetch_max(envelope.session, Ordering::SeqCst);
        if envelope.session < latest {
            debug!(session = envelope.session, latest, "Discarding event from a superseded session");
            return;
        }
        match envelope.event {
            PushEvent::NewIncident { incident } => {
                self.aggregator.ingest_push(incident).await;
            }
            PushEvent::Notification(notification) => {
                info!(title = %notification.title, "Operator notification");
                let _ = self.notifications.send(notification);
            }
        }
    }
}

pub struct Dashboard {
    store: Arc<ViewStateStore>,
    aggregator: Arc<FeedAggregator>,
    focus: Arc<FocusRouter>,
    notifications: broadcast::Sender<Notification>,
    scheduler: SchedulerHandle,
    push: PushHandle,
}

impl Dashboard {
    /// Start polling and the push channel. Must be called inside a tokio
    /// runtime.
    pub fn mount(
        config: &DashboardConfig,
        api: Arc<dyn DashboardApi>,
        transport: Arc<dyn PushTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let store = Arc::new(ViewStateStore::new(config.stats_projector()));
        let aggregator = Arc::new(FeedAggregator::new(api, store.clone(), config.aggregator()));
        let focus = Arc::new(FocusRouter::new());
        let (notifications, _) = broadcast::channel(64);

        let scheduler = config.scheduler().start(aggregator.clone());
        let sink = Arc::new(PipelineSink {
            aggregator: aggregator.clone(),
            notifications: notifications.clone(),
            latest_session: AtomicU64::new(0),
        });
        let push = PushChannel::new(transport, credentials, sink)
            .with_backoff(config.reconnect_backoff())
            .start();

        info!(api = %config.api_url, push = %config.push_url, "Dashboard mounted");
        Self { store, aggregator, focus, notifications, scheduler, push }
    }

    pub fn store(&self) -> Arc<ViewStateStore> {
        self.store.clone()
    }

    pub fn aggregator(&self) -> Arc<FeedAggregator> {
        self.aggregator.clone()
    }

    pub fn focus(&self) -> Arc<FocusRouter> {
        self.focus.clone()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn push_state(&self) -> ChannelState {
        self.push.state()
    }

    pub fn push_state_updates(&self) -> watch::Receiver<ChannelState> {
        self.push.state_updates()
    }

    /// Stop polling and close the push channel. No timer survives this call.
    pub async fn unmount(self) {
        self.scheduler.stop().await;
        self.push.stop().await;
        info!("Dashboard unmounted");
    }
}
