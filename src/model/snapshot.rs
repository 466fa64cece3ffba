use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entities::{CheckIn, Incident, PatrolUnit, RiskZone};

/// Independent upstream feeds reconciled into a [`MapSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Patrols,
    RiskZones,
    Incidents,
    CheckIns,
    IncidentStats,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Patrols,
        SourceKind::RiskZones,
        SourceKind::Incidents,
        SourceKind::CheckIns,
        SourceKind::IncidentStats,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Patrols => "patrols",
            SourceKind::RiskZones => "risk_zones",
            SourceKind::Incidents => "incidents",
            SourceKind::CheckIns => "check_ins",
            SourceKind::IncidentStats => "incident_stats",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable aggregate of the latest known state of every feed.
///
/// Sources listed in `partial` failed on their most recent cycle; their
/// slices hold the last successful values and must be read as stale, not
/// absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSnapshot {
    pub version: u64,
    pub patrols: Vec<PatrolUnit>,
    pub risk_zones: Vec<RiskZone>,
    /// Most recent first.
    pub incidents: Vec<Incident>,
    pub check_ins: Vec<CheckIn>,
    /// Upstream incident total from the stats endpoint, if ever fetched.
    pub incident_total: Option<u64>,
    pub fetched_at: DateTime<Utc>,
    pub source_fetched_at: BTreeMap<SourceKind, DateTime<Utc>>,
    pub partial: BTreeSet<SourceKind>,
}

impl MapSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            patrols: Vec::new(),
            risk_zones: Vec::new(),
            incidents: Vec::new(),
            check_ins: Vec::new(),
            incident_total: None,
            fetched_at: DateTime::<Utc>::default(),
            source_fetched_at: BTreeMap::new(),
            partial: BTreeSet::new(),
        }
    }

    pub fn is_stale(&self, source: SourceKind) -> bool {
        self.partial.contains(&source)
    }

    /// Every source failed on its last cycle. Drives the "degraded" banner
    /// instead of an error dialog.
    pub fn is_degraded(&self) -> bool {
        SourceKind::ALL.iter().all(|s| self.partial.contains(s))
    }
}

impl Default for MapSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
