//! Grid clustering of map markers.
//!
//! Markers are bucketed into square cells whose edge halves with every zoom
//! level (a quarter of a web-mercator tile width). Only markers sharing a
//! cluster group merge. Output order is deterministic.

use std::collections::BTreeMap;

use serde::Serialize;

use super::resolver::{EntityKind, MarkerStyle};
use crate::model::GeoPoint;

/// Zoom at and beyond which every marker stands alone.
pub const NO_CLUSTER_ZOOM: u8 = 17;

const CELLS_PER_TILE: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: String,
    pub kind: EntityKind,
    pub position: GeoPoint,
    pub style: MarkerStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub group: &'static str,
    pub center: GeoPoint,
    pub count: usize,
    pub ids: Vec<String>,
}

fn cell_size(zoom: u8) -> f64 {
    360.0 / 2f64.powi(i32::from(zoom.min(NO_CLUSTER_ZOOM))) / CELLS_PER_TILE
}

pub fn cluster_markers(markers: &[Marker], zoom: u8) -> Vec<Cluster> {
    if zoom >= NO_CLUSTER_ZOOM {
        let mut singles: Vec<Cluster> = markers
            .iter()
            .map(|m| Cluster {
                group: m.style.cluster_group,
                center: m.position,
                count: 1,
                ids: vec![m.id.clone()],
            })
            .collect();
        singles.sort_by(|a, b| a.group.cmp(b.group).then_with(|| a.ids.cmp(&b.ids)));
        return singles;
    }

    let size = cell_size(zoom);
    let mut cells: BTreeMap<(&'static str, i64, i64), Vec<&Marker>> = BTreeMap::new();
    for marker in markers.iter().filter(|m| m.position.is_valid()) {
        let row = (marker.position.lat / size).floor() as i64;
        let col = (marker.position.lon / size).floor() as i64;
        cells.entry((marker.style.cluster_group, row, col)).or_default().push(marker);
    }

    cells
        .into_iter()
        .map(|((group, _, _), members)| {
            let n = members.len() as f64;
            let (lat, lon) = members
                .iter()
                .fold((0.0, 0.0), |(lat, lon), m| (lat + m.position.lat, lon + m.position.lon));
            let mut ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
            ids.sort();
            Cluster { group, center: GeoPoint::new(lat / n, lon / n), count: members.len(), ids }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PatrolStatus;
    use crate::style::resolver::{check_in_marker, patrol_marker};

    fn patrol(id: &str, lat: f64, lon: f64) -> Marker {
        Marker {
            id: id.into(),
            kind: EntityKind::Patrol,
            position: GeoPoint::new(lat, lon),
            style: patrol_marker(PatrolStatus::Active),
        }
    }

    #[test]
    fn nearby_markers_merge_at_low_zoom() {
        let markers = vec![patrol("a", 13.7501, 100.5001), patrol("b", 13.7502, 100.5002)];
        let clusters = cluster_markers(&markers, 8);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 2);
        assert_eq!(clusters[0].ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn distant_markers_stay_apart() {
        let markers = vec![patrol("a", 13.75, 100.5), patrol("b", 18.79, 98.98)];
        assert_eq!(cluster_markers(&markers, 10).len(), 2);
    }

    #[test]
    fn groups_never_mix() {
        let mut check_in = patrol("c", 13.7501, 100.5001);
        check_in.kind = EntityKind::CheckIn;
        check_in.style = check_in_marker();
        let markers = vec![patrol("a", 13.7501, 100.5001), check_in];
        let clusters = cluster_markers(&markers, 5);
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.count == 1));
    }

    #[test]
    fn high_zoom_disables_clustering() {
        let markers = vec![patrol("b", 13.75, 100.5), patrol("a", 13.75, 100.5)];
        let clusters = cluster_markers(&markers, 18);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].ids, vec!["a".to_string()]);
    }
}
