//! Domain attribute → visual token mapping.
//!
//! Every function here is pure and total. Unrecognized inputs resolve to
//! [`IconToken::Default`] / [`ColorToken::DEFAULT`], never to an error.

use serde::{Serialize, Serializer};

use crate::model::{
    Incident, IncidentType, PatrolStatus, RiskZone, Severity, ThreatCategory,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Patrol,
    RiskZone,
    Incident,
    CheckIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconToken {
    PatrolActive,
    PatrolIdle,
    PatrolOffline,
    RiskZone,
    IncidentSuppression,
    IncidentPrevention,
    IncidentOther,
    CheckIn,
    Default,
}

impl IconToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            IconToken::PatrolActive => "patrol-active",
            IconToken::PatrolIdle => "patrol-idle",
            IconToken::PatrolOffline => "patrol-offline",
            IconToken::RiskZone => "risk-zone",
            IconToken::IncidentSuppression => "incident-suppression",
            IconToken::IncidentPrevention => "incident-prevention",
            IconToken::IncidentOther => "incident-other",
            IconToken::CheckIn => "check-in",
            IconToken::Default => "marker-default",
        }
    }
}

impl Serialize for IconToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Hex color token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorToken(&'static str);

impl ColorToken {
    pub const DEFAULT: ColorToken = ColorToken("#6b7280");

    pub const GREEN: ColorToken = ColorToken("#16a34a");
    pub const AMBER: ColorToken = ColorToken("#f59e0b");
    pub const ORANGE: ColorToken = ColorToken("#ea580c");
    pub const RED: ColorToken = ColorToken("#dc2626");
    pub const BLUE: ColorToken = ColorToken("#2563eb");
    pub const SLATE: ColorToken = ColorToken("#94a3b8");
    pub const PURPLE: ColorToken = ColorToken("#7c3aed");
    pub const TEAL: ColorToken = ColorToken("#0d9488");
    pub const PINK: ColorToken = ColorToken("#db2777");

    pub fn hex(&self) -> &'static str {
        self.0
    }
}

impl Serialize for ColorToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorKey {
    Severity(Severity),
    Category(ThreatCategory),
}

pub fn patrol_icon(status: PatrolStatus) -> IconToken {
    match status {
        PatrolStatus::Active => IconToken::PatrolActive,
        PatrolStatus::Idle => IconToken::PatrolIdle,
        PatrolStatus::Offline => IconToken::PatrolOffline,
        PatrolStatus::Unknown => IconToken::Default,
    }
}

pub fn incident_icon(kind: IncidentType) -> IconToken {
    match kind {
        IncidentType::Suppression => IconToken::IncidentSuppression,
        IncidentType::Prevention => IconToken::IncidentPrevention,
        IncidentType::Other => IconToken::IncidentOther,
    }
}

/// Icon for a raw upstream status label.
pub fn resolve_icon(kind: EntityKind, status: &str) -> IconToken {
    match kind {
        EntityKind::Patrol => patrol_icon(PatrolStatus::from(status)),
        EntityKind::Incident => incident_icon(IncidentType::from(status)),
        EntityKind::RiskZone => IconToken::RiskZone,
        EntityKind::CheckIn => IconToken::CheckIn,
    }
}

pub fn severity_color(severity: Severity) -> ColorToken {
    match severity {
        Severity::Low => ColorToken::GREEN,
        Severity::Medium => ColorToken::AMBER,
        Severity::High => ColorToken::ORANGE,
        Severity::Critical => ColorToken::RED,
        Severity::Unknown => ColorToken::DEFAULT,
    }
}

pub fn category_color(category: ThreatCategory) -> ColorToken {
    match category {
        ThreatCategory::Violence => ColorToken::RED,
        ThreatCategory::Theft => ColorToken::AMBER,
        ThreatCategory::Narcotics => ColorToken::PURPLE,
        ThreatCategory::Smuggling => ColorToken::TEAL,
        ThreatCategory::PublicDisorder => ColorToken::PINK,
        ThreatCategory::Unknown => ColorToken::DEFAULT,
    }
}

pub fn resolve_color(key: ColorKey) -> ColorToken {
    match key {
        ColorKey::Severity(severity) => severity_color(severity),
        ColorKey::Category(category) => category_color(category),
    }
}

/// Color for a raw label: severities first, then threat categories.
pub fn resolve_color_label(label: &str) -> ColorToken {
    match Severity::from(label) {
        Severity::Unknown => category_color(ThreatCategory::from(label)),
        severity => severity_color(severity),
    }
}

/// Fully resolved marker attributes for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerStyle {
    pub icon: IconToken,
    pub color: ColorToken,
    /// Markers only cluster with others of the same group.
    pub cluster_group: &'static str,
}

/// `status` is the effective status, after the silence window.
pub fn patrol_marker(status: PatrolStatus) -> MarkerStyle {
    let color = match status {
        PatrolStatus::Active => ColorToken::BLUE,
        PatrolStatus::Idle => ColorToken::AMBER,
        PatrolStatus::Offline => ColorToken::SLATE,
        PatrolStatus::Unknown => ColorToken::DEFAULT,
    };
    MarkerStyle { icon: patrol_icon(status), color, cluster_group: "patrols" }
}

pub fn risk_zone_marker(zone: &RiskZone) -> MarkerStyle {
    MarkerStyle {
        icon: IconToken::RiskZone,
        color: severity_color(zone.severity),
        cluster_group: "risk_zones",
    }
}

pub fn incident_marker(incident: &Incident) -> MarkerStyle {
    let color = if incident.resolved {
        ColorToken::SLATE
    } else {
        match incident.kind {
            IncidentType::Suppression => ColorToken::RED,
            IncidentType::Prevention => ColorToken::GREEN,
            IncidentType::Other => ColorToken::DEFAULT,
        }
    };
    MarkerStyle { icon: incident_icon(incident.kind), color, cluster_group: "incidents" }
}

pub fn check_in_marker() -> MarkerStyle {
    MarkerStyle { icon: IconToken::CheckIn, color: ColorToken::TEAL, cluster_group: "check_ins" }
}
