//! Focus Router
//!
//! Decouples "fly to this coordinate" requests raised by feed and alert
//! components from the map surface that moves the camera. Nothing is queued:
//! a command emitted while nobody listens is gone.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::listeners::{ListenerSet, Subscription};
use crate::model::{FocusCommand, GeoPoint};

pub struct FocusRouter {
    listeners: Arc<ListenerSet<FocusCommand>>,
    stream_tx: broadcast::Sender<FocusCommand>,
}

impl FocusRouter {
    pub fn new() -> Self {
        let (stream_tx, _) = broadcast::channel(16);
        Self { listeners: ListenerSet::new(), stream_tx }
    }

    /// Deliver `cmd` to every current subscriber and stream. Returns how many
    /// received it; zero is not an error.
    pub fn emit(&self, cmd: FocusCommand) -> usize {
        if !GeoPoint::new(cmd.lat, cmd.lon).is_valid() {
            warn!(lat = cmd.lat, lng = cmd.lon, "Dropping focus command with invalid coordinates");
            return 0;
        }
        let callbacks = self.listeners.notify(&cmd);
        let streams = self.stream_tx.send(cmd).unwrap_or(0);
        debug!(lat = cmd.lat, lng = cmd.lon, zoom = cmd.zoom, receivers = callbacks + streams, "flyToLocation");
        callbacks + streams
    }

    pub fn fly_to(&self, point: GeoPoint, zoom: u8) -> usize {
        self.emit(FocusCommand::new(point.lat, point.lon, zoom))
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&FocusCommand) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// Async receiver for surfaces living in another task (the SSE route).
    /// Only sees commands emitted after this call.
    pub fn stream(&self) -> broadcast::Receiver<FocusCommand> {
        self.stream_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len() + self.stream_tx.receiver_count()
    }
}

impl Default for FocusRouter {
    fn default() -> Self {
        Self::new()
    }
}
