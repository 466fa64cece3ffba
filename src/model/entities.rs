//! Domain entities rendered on the operations map.
//!
//! Every type here is strict: upstream payloads are coerced into these shapes
//! by `feeds::normalize` and nothing optional leaks past that boundary except
//! where the field is genuinely optional in the domain (province, officer).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and inside the WGS84 envelope.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Reported state of a patrol unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatrolStatus {
    Active,
    Idle,
    Offline,
    #[serde(other)]
    Unknown,
}

impl PatrolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatrolStatus::Active => "active",
            PatrolStatus::Idle => "idle",
            PatrolStatus::Offline => "offline",
            PatrolStatus::Unknown => "unknown",
        }
    }
}

impl From<&str> for PatrolStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "on_duty" | "patrolling" => PatrolStatus::Active,
            "idle" | "paused" | "break" => PatrolStatus::Idle,
            "offline" | "inactive" | "off_duty" | "ended" => PatrolStatus::Offline,
            _ => PatrolStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatrolUnit {
    pub id: String,
    pub position: GeoPoint,
    /// Accuracy radius of the last fix, in meters.
    pub accuracy_m: f64,
    pub status: PatrolStatus,
    pub last_report_at: DateTime<Utc>,
    pub officer_id: Option<String>,
    pub province: Option<String>,
}

impl PatrolUnit {
    /// Status after applying the silence window. A unit that has not reported
    /// for longer than `silence` is offline whatever it last claimed.
    pub fn effective_status(&self, now: DateTime<Utc>, silence: Duration) -> PatrolStatus {
        if now.signed_duration_since(self.last_report_at) > silence {
            PatrolStatus::Offline
        } else {
            self.status
        }
    }
}

/// Ordered risk level. `Unknown` sorts below `Low`; any unrecognised label
/// deserializes to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl From<&str> for Severity {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "1" => Severity::Low,
            "medium" | "moderate" | "2" => Severity::Medium,
            "high" | "3" => Severity::High,
            "critical" | "severe" | "4" => Severity::Critical,
            _ => Severity::Unknown,
        }
    }
}

impl From<String> for Severity {
    fn from(s: String) -> Self {
        Severity::from(s.as_str())
    }
}

impl From<Severity> for &'static str {
    fn from(severity: Severity) -> Self {
        severity.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Violence,
    Theft,
    Narcotics,
    Smuggling,
    PublicDisorder,
    #[serde(other)]
    Unknown,
}

impl ThreatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::Violence => "violence",
            ThreatCategory::Theft => "theft",
            ThreatCategory::Narcotics => "narcotics",
            ThreatCategory::Smuggling => "smuggling",
            ThreatCategory::PublicDisorder => "public_disorder",
            ThreatCategory::Unknown => "unknown",
        }
    }
}

impl From<&str> for ThreatCategory {
    fn from(s: &str) -> Self {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "violence" | "violent_crime" | "assault" => ThreatCategory::Violence,
            "theft" | "robbery" | "burglary" => ThreatCategory::Theft,
            "narcotics" | "drugs" | "drug" => ThreatCategory::Narcotics,
            "smuggling" | "trafficking" | "contraband" => ThreatCategory::Smuggling,
            "public_disorder" | "disorder" | "unrest" => ThreatCategory::PublicDisorder,
            _ => ThreatCategory::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ZoneGeometry {
    Circle { center: GeoPoint, radius_m: f64 },
    Polygon { ring: Vec<GeoPoint> },
}

impl ZoneGeometry {
    /// Marker anchor for the zone: circle center or vertex average.
    pub fn centroid(&self) -> Option<GeoPoint> {
        match self {
            ZoneGeometry::Circle { center, .. } => Some(*center),
            ZoneGeometry::Polygon { ring } if ring.is_empty() => None,
            ZoneGeometry::Polygon { ring } => {
                let n = ring.len() as f64;
                let (lat, lon) = ring
                    .iter()
                    .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
                Some(GeoPoint::new(lat / n, lon / n))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskZone {
    pub id: String,
    pub name: String,
    pub geometry: ZoneGeometry,
    pub severity: Severity,
    pub category: ThreatCategory,
    pub active: bool,
    pub province: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
    Suppression,
    Prevention,
    #[serde(other)]
    Other,
}

impl IncidentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Suppression => "SUPPRESSION",
            IncidentType::Prevention => "PREVENTION",
            IncidentType::Other => "OTHER",
        }
    }
}

impl From<&str> for IncidentType {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUPPRESSION" => IncidentType::Suppression,
            "PREVENTION" => IncidentType::Prevention,
            _ => IncidentType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub kind: IncidentType,
    pub description: String,
    pub position: GeoPoint,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub officer_id: Option<String>,
    pub province: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub id: String,
    pub officer_id: Option<String>,
    pub position: Option<GeoPoint>,
    pub timestamp: DateTime<Utc>,
    pub province: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(status: PatrolStatus, last_report_at: DateTime<Utc>) -> PatrolUnit {
        PatrolUnit {
            id: "p1".into(),
            position: GeoPoint::new(13.75, 100.5),
            accuracy_m: 5.0,
            status,
            last_report_at,
            officer_id: None,
            province: None,
        }
    }

    #[test]
    fn silent_unit_is_offline() {
        let now = Utc::now();
        let stale = unit(PatrolStatus::Active, now - Duration::minutes(20));
        let fresh = unit(PatrolStatus::Active, now - Duration::minutes(1));

        assert_eq!(stale.effective_status(now, Duration::minutes(10)), PatrolStatus::Offline);
        assert_eq!(fresh.effective_status(now, Duration::minutes(10)), PatrolStatus::Active);
    }

    #[test]
    fn unknown_labels_fall_back() {
        assert_eq!(PatrolStatus::from("warp-speed"), PatrolStatus::Unknown);
        assert_eq!(Severity::from("apocalyptic"), Severity::Unknown);
        assert_eq!(ThreatCategory::from("Public Disorder"), ThreatCategory::PublicDisorder);
        assert_eq!(IncidentType::from("prevention"), IncidentType::Prevention);
        assert_eq!(IncidentType::from("arson"), IncidentType::Other);
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert!(Severity::Unknown < Severity::Low);
    }

    #[test]
    fn serde_other_absorbs_unknown_variants() {
        let status: PatrolStatus = serde_json::from_str("\"teleporting\"").unwrap();
        assert_eq!(status, PatrolStatus::Unknown);
        let kind: IncidentType = serde_json::from_str("\"ARSON\"").unwrap();
        assert_eq!(kind, IncidentType::Other);
    }

    #[test]
    fn severity_reads_loose_labels_and_writes_canonical_ones() {
        let parsed: Vec<Severity> = serde_json::from_str(r#"["Severe", "moderate", "3", "purple"]"#).unwrap();
        assert_eq!(parsed, [Severity::Critical, Severity::Medium, Severity::High, Severity::Unknown]);
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        assert_eq!(serde_json::to_string(&Severity::Unknown).unwrap(), "\"unknown\"");
    }

    #[test]
    fn polygon_centroid_is_vertex_mean() {
        let geometry = ZoneGeometry::Polygon {
            ring: vec![
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(0.0, 2.0),
                GeoPoint::new(2.0, 2.0),
                GeoPoint::new(2.0, 0.0),
            ],
        };
        assert_eq!(geometry.centroid(), Some(GeoPoint::new(1.0, 1.0)));
        assert_eq!(ZoneGeometry::Polygon { ring: vec![] }.centroid(), None);
    }
}
