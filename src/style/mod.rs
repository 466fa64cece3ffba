//! Geo Style Resolver
//!
//! Pure mapping from domain state to map-ready visual attributes: marker
//! icon, color and clustering.

mod cluster;
mod resolver;

pub use cluster::{cluster_markers, Cluster, Marker, NO_CLUSTER_ZOOM};
pub use resolver::{
    category_color, check_in_marker, incident_icon, incident_marker, patrol_icon, patrol_marker,
    resolve_color, resolve_color_label, resolve_icon, risk_zone_marker, severity_color, ColorKey,
    ColorToken, EntityKind, IconToken, MarkerStyle,
};
