//! Concurrency contracts of the public surface.

use std::sync::Arc;

use patrol_sync::feeds::{FeedAggregator, HttpDashboardApi, PollScheduler, SchedulerHandle};
use patrol_sync::geo::{Geocoder, NominatimGeocoder};
use patrol_sync::model::MapSnapshot;
use patrol_sync::push::{PushHandle, PushSink, PushTransport, SseTransport};
use patrol_sync::server::ServerState;
use patrol_sync::state::{FocusRouter, Subscription, ViewStateStore, VisibleSet};
use patrol_sync::{CredentialProvider, Dashboard, DashboardApi, SessionStore};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn shared_components_are_thread_safe() {
    assert_send_sync::<ViewStateStore>();
    assert_send_sync::<FocusRouter>();
    assert_send_sync::<FeedAggregator>();
    assert_send_sync::<PollScheduler>();
    assert_send_sync::<SessionStore>();
    assert_send_sync::<Dashboard>();
    assert_send_sync::<ServerState>();
    assert_send_sync::<Subscription>();
}

#[test]
fn snapshots_are_shareable_across_tasks() {
    assert_send_sync::<Arc<MapSnapshot>>();
    assert_send_sync::<Arc<VisibleSet>>();
}

#[test]
fn handles_can_move_between_tasks() {
    fn assert_send<T: Send>() {}
    assert_send::<SchedulerHandle>();
    assert_send::<PushHandle>();
}

#[test]
fn seams_are_object_safe() {
    assert_send_sync::<HttpDashboardApi>();
    assert_send_sync::<SseTransport>();
    assert_send_sync::<NominatimGeocoder>();
    let _: Option<Arc<dyn DashboardApi>> = None;
    let _: Option<Arc<dyn PushTransport>> = None;
    let _: Option<Arc<dyn PushSink>> = None;
    let _: Option<Arc<dyn CredentialProvider>> = None;
    let _: Option<Arc<dyn Geocoder>> = None;
}
