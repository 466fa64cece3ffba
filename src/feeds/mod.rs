//! Feeds
//!
//! Upstream data acquisition: the API seam, payload coercion, the
//! concurrent aggregator and the poll cadence that drives it.

mod aggregator;
mod http;
pub mod normalize;
mod scheduler;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncResult;
use crate::model::SourceKind;

pub use aggregator::{AggregatorConfig, FeedAggregator};
pub use http::HttpDashboardApi;
pub use normalize::SourceData;
pub use scheduler::{PollScheduler, PollTask, SchedulerHandle};

/// Backend API client. Payloads cross this seam loosely typed and are
/// coerced by [`normalize`].
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn fetch(&self, source: SourceKind) -> SyncResult<Value>;
}
