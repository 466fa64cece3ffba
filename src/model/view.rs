use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::entities::ThreatCategory;

/// Per-layer visibility toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerVisibility {
    pub patrols: bool,
    pub risk_zones: bool,
    pub incidents: bool,
    pub check_ins: bool,
}

impl Default for LayerVisibility {
    fn default() -> Self {
        Self {
            patrols: true,
            risk_zones: true,
            incidents: true,
            check_ins: true,
        }
    }
}

/// User-selected map filter. An empty category set means every category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState {
    pub province: Option<String>,
    pub categories: BTreeSet<ThreatCategory>,
    pub layers: LayerVisibility,
}

impl FilterState {
    pub fn with_province(mut self, province: impl Into<String>) -> Self {
        self.province = Some(province.into());
        self
    }

    pub fn with_category(mut self, category: ThreatCategory) -> Self {
        self.categories.insert(category);
        self
    }

    pub fn matches_province(&self, province: Option<&str>) -> bool {
        match (&self.province, province) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        }
    }

    pub fn matches_category(&self, category: ThreatCategory) -> bool {
        self.categories.is_empty() || self.categories.contains(&category)
    }
}

/// Camera move request for the map surface. Ephemeral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusCommand {
    pub lat: f64,
    #[serde(rename = "lng", alias = "lon")]
    pub lon: f64,
    pub zoom: u8,
}

impl FocusCommand {
    pub const DEFAULT_ZOOM: u8 = 16;

    pub fn new(lat: f64, lon: f64, zoom: u8) -> Self {
        Self { lat, lon, zoom }
    }
}

/// Summary counters shown above the map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub active_patrols: usize,
    pub checkins_today: usize,
    pub incidents_today: usize,
    pub risk_zones: usize,
}
