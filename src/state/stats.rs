//! Dashboard summary counters derived from a snapshot.

use chrono::{DateTime, Duration, Local, TimeZone, Utc};

use crate::model::{MapSnapshot, PatrolStatus, Stats};

/// Projects [`Stats`] from a [`MapSnapshot`]. Holds configuration only; the
/// result depends on the snapshot and the supplied "now" alone.
#[derive(Debug, Clone, Copy)]
pub struct StatsProjector {
    patrol_silence: Duration,
}

impl StatsProjector {
    pub fn new(patrol_silence: Duration) -> Self {
        Self { patrol_silence }
    }

    pub fn project(&self, snapshot: &MapSnapshot) -> Stats {
        self.project_at(snapshot, &Local::now())
    }

    /// "Today" is the calendar date of `now` in its own time zone, year
    /// included. The counters reset at local midnight.
    pub fn project_at<Tz: TimeZone>(&self, snapshot: &MapSnapshot, now: &DateTime<Tz>) -> Stats {
        let zone = now.timezone();
        let today = now.date_naive();
        let now_utc = now.with_timezone(&Utc);
        let is_today = |ts: &DateTime<Utc>| ts.with_timezone(&zone).date_naive() == today;

        Stats {
            active_patrols: snapshot
                .patrols
                .iter()
                .filter(|p| p.effective_status(now_utc, self.patrol_silence) != PatrolStatus::Offline)
                .count(),
            checkins_today: snapshot.check_ins.iter().filter(|c| is_today(&c.timestamp)).count(),
            incidents_today: snapshot.incidents.iter().filter(|i| is_today(&i.created_at)).count(),
            risk_zones: snapshot.risk_zones.iter().filter(|z| z.active).count(),
        }
    }
}

impl Default for StatsProjector {
    fn default() -> Self {
        Self::new(Duration::minutes(15))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CheckIn, GeoPoint, Incident, IncidentType, PatrolUnit, RiskZone, Severity, ThreatCategory,
        ZoneGeometry,
    };
    use chrono::FixedOffset;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn patrol(id: &str, status: PatrolStatus, at: DateTime<Utc>) -> PatrolUnit {
        PatrolUnit {
            id: id.into(),
            position: GeoPoint::new(13.75, 100.5),
            accuracy_m: 10.0,
            status,
            last_report_at: at,
            officer_id: None,
            province: None,
        }
    }

    fn incident(id: &str, at: DateTime<FixedOffset>) -> Incident {
        Incident {
            id: id.into(),
            kind: IncidentType::Prevention,
            description: String::new(),
            position: GeoPoint::new(13.75, 100.5),
            created_at: at.with_timezone(&Utc),
            resolved: false,
            officer_id: None,
            province: None,
        }
    }

    #[test]
    fn counts_non_offline_patrols() {
        let now = local(2026, 3, 10, 12, 0);
        let fresh = now.with_timezone(&Utc);
        let mut snapshot = MapSnapshot::empty();
        snapshot.patrols = vec![
            patrol("a", PatrolStatus::Active, fresh),
            patrol("b", PatrolStatus::Active, fresh),
            patrol("c", PatrolStatus::Offline, fresh),
        ];

        let stats = StatsProjector::default().project_at(&snapshot, &now);
        assert_eq!(stats.active_patrols, 2);
    }

    #[test]
    fn silent_patrol_is_not_active() {
        let now = local(2026, 3, 10, 12, 0);
        let mut snapshot = MapSnapshot::empty();
        snapshot.patrols = vec![patrol(
            "a",
            PatrolStatus::Active,
            (now - Duration::hours(2)).with_timezone(&Utc),
        )];

        let stats = StatsProjector::new(Duration::minutes(15)).project_at(&snapshot, &now);
        assert_eq!(stats.active_patrols, 0);
    }

    #[test]
    fn today_is_a_calendar_day_not_a_rolling_window() {
        let now = local(2026, 3, 10, 23, 59);
        let mut snapshot = MapSnapshot::empty();
        snapshot.incidents = vec![
            incident("today-late", local(2026, 3, 10, 23, 59)),
            incident("yesterday-late", local(2026, 3, 9, 23, 59)),
        ];

        let stats = StatsProjector::default().project_at(&snapshot, &now);
        assert_eq!(stats.incidents_today, 1);

        // Early next morning the 23:59 entry is less than 24h old but no
        // longer today.
        let next_morning = local(2026, 3, 11, 0, 5);
        let stats = StatsProjector::default().project_at(&snapshot, &next_morning);
        assert_eq!(stats.incidents_today, 0);
    }

    #[test]
    fn same_day_of_previous_year_is_not_today() {
        let now = local(2026, 3, 10, 9, 0);
        let mut snapshot = MapSnapshot::empty();
        snapshot.check_ins = vec![
            CheckIn {
                id: "now".into(),
                officer_id: None,
                position: None,
                timestamp: local(2026, 3, 10, 8, 0).with_timezone(&Utc),
                province: None,
            },
            CheckIn {
                id: "last-year".into(),
                officer_id: None,
                position: None,
                timestamp: local(2025, 3, 10, 8, 0).with_timezone(&Utc),
                province: None,
            },
        ];

        let stats = StatsProjector::default().project_at(&snapshot, &now);
        assert_eq!(stats.checkins_today, 1);
    }

    #[test]
    fn counts_only_active_zones() {
        let zone = |id: &str, active| RiskZone {
            id: id.into(),
            name: id.into(),
            geometry: ZoneGeometry::Circle { center: GeoPoint::new(0.0, 0.0), radius_m: 100.0 },
            severity: Severity::High,
            category: ThreatCategory::Theft,
            active,
            province: None,
        };
        let mut snapshot = MapSnapshot::empty();
        snapshot.risk_zones = vec![zone("a", true), zone("b", false), zone("c", true)];

        let stats = StatsProjector::default().project_at(&snapshot, &local(2026, 1, 1, 0, 0));
        assert_eq!(stats.risk_zones, 2);
    }
}
