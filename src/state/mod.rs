//! View State
//!
//! The single-writer store of map state, the stats projection it drives, and
//! the focus bus consumed by the map surface.

mod focus;
mod listeners;
mod stats;
mod store;

pub use focus::FocusRouter;
pub use listeners::Subscription;
pub use stats::StatsProjector;
pub use store::{derive_visible, ViewStateStore, VisibleSet};
