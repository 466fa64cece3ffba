//! Data Model
//!
//! Strict domain types shared by every component of the sync engine.

mod entities;
mod snapshot;
mod view;

pub use entities::{
    CheckIn, GeoPoint, Incident, IncidentType, PatrolStatus, PatrolUnit, RiskZone, Severity,
    ThreatCategory, ZoneGeometry,
};
pub use snapshot::{MapSnapshot, SourceKind};
pub use view::{FilterState, FocusCommand, LayerVisibility, Stats};
