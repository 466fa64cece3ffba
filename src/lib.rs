//! Patrol Sync
//!
//! Real-time geospatial synchronization for the patrol operations dashboard:
//! - Concurrent multi-source polling with per-source failure isolation
//! - Authenticated push channel bound to the current session credential
//! - Single-writer view state with content-based change notification
//! - Pure style resolution, marker clustering and summary counters

pub mod backoff;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod feeds;
pub mod geo;
pub mod model;
pub mod push;
pub mod server;
pub mod session;
pub mod state;
pub mod style;
pub mod telemetry;

// Re-exports for convenience
pub use config::DashboardConfig;
pub use dashboard::Dashboard;
pub use error::{SyncError, SyncResult};
pub use feeds::{DashboardApi, FeedAggregator};
pub use session::{CredentialProvider, SessionStore};
pub use state::{FocusRouter, StatsProjector, ViewStateStore};
