//! Boundary coercion of loosely-typed upstream payloads.
//!
//! Upstream endpoints disagree on envelopes, field names and number encodings.
//! Everything is coerced here into the strict model; entries that cannot be
//! coerced are dropped with a warning, and a payload that is not a list at
//! all fails the whole source for the cycle.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::model::{
    CheckIn, GeoPoint, Incident, IncidentType, PatrolStatus, PatrolUnit, RiskZone, Severity,
    SourceKind, ThreatCategory, ZoneGeometry,
};

type Object = Map<String, Value>;

/// Decoded slice of one source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    Patrols(Vec<PatrolUnit>),
    RiskZones(Vec<RiskZone>),
    Incidents(Vec<Incident>),
    CheckIns(Vec<CheckIn>),
    IncidentTotal(u64),
}

pub fn decode(source: SourceKind, payload: &Value) -> SyncResult<SourceData> {
    Ok(match source {
        SourceKind::Patrols => SourceData::Patrols(collect(source, payload, patrol)?),
        SourceKind::RiskZones => SourceData::RiskZones(collect(source, payload, risk_zone)?),
        SourceKind::Incidents => {
            let mut incidents = collect(source, payload, incident)?;
            incidents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            SourceData::Incidents(incidents)
        }
        SourceKind::CheckIns => SourceData::CheckIns(collect(source, payload, check_in)?),
        SourceKind::IncidentStats => SourceData::IncidentTotal(incident_total(payload)?),
    })
}

/// Coerce a single incident, as carried by a push event.
pub fn incident_from(value: &Value) -> Option<Incident> {
    value.as_object().and_then(incident)
}

fn collect<T>(
    source: SourceKind,
    payload: &Value,
    parse: fn(&Object) -> Option<T>,
) -> SyncResult<Vec<T>> {
    let items = list(payload)
        .ok_or_else(|| SyncError::malformed(format!("{source}: expected a list payload")))?;
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match item.as_object().and_then(parse) {
            Some(entity) => out.push(entity),
            None => warn!(source = %source, index, "Dropping malformed entry"),
        }
    }
    Ok(out)
}

/// Bare array, or an object wrapping one under a common envelope key.
fn list(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(obj) => ["data", "items", "results", "rows"]
            .iter()
            .find_map(|key| obj.get(*key))
            .and_then(list),
        _ => None,
    }
}

fn field<'a>(obj: &'a Object, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn text(obj: &Object, keys: &[&str]) -> Option<String> {
    match field(obj, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    let n: f64 = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn num(obj: &Object, keys: &[&str]) -> Option<f64> {
    field(obj, keys).and_then(number)
}

fn flag(obj: &Object, keys: &[&str]) -> Option<bool> {
    match field(obj, keys)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// RFC 3339 string, or epoch milliseconds as number or numeric string.
fn timestamp(obj: &Object, keys: &[&str]) -> Option<DateTime<Utc>> {
    let value = field(obj, keys)?;
    if let Value::String(s) = value {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(s.trim()) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    let millis = number(value)? as i64;
    Utc.timestamp_millis_opt(millis).single()
}

fn point_from(value: &Value) -> Option<GeoPoint> {
    let point = match value {
        Value::Object(obj) => {
            if let Some(coords) = obj.get("coordinates") {
                // GeoJSON point: [lon, lat]
                return lon_lat_pair(coords);
            }
            GeoPoint::new(
                num(obj, &["lat", "latitude"])?,
                num(obj, &["lon", "lng", "long", "longitude"])?,
            )
        }
        Value::Array(pair) if pair.len() == 2 => {
            GeoPoint::new(number(&pair[0])?, number(&pair[1])?)
        }
        _ => return None,
    };
    point.is_valid().then_some(point)
}

fn lon_lat_pair(value: &Value) -> Option<GeoPoint> {
    let pair = value.as_array().filter(|p| p.len() >= 2)?;
    let point = GeoPoint::new(number(&pair[1])?, number(&pair[0])?);
    point.is_valid().then_some(point)
}

fn position(obj: &Object) -> Option<GeoPoint> {
    if let Some(nested) = field(obj, &["position", "location", "coords", "geometry"]) {
        if let Some(point) = point_from(nested) {
            return Some(point);
        }
    }
    point_from(&Value::Object(obj.clone()))
}

fn id(obj: &Object) -> Option<String> {
    text(obj, &["id", "_id", "uuid"])
}

fn province(obj: &Object) -> Option<String> {
    text(obj, &["province", "provinceName", "province_name", "region"])
}

fn officer(obj: &Object) -> Option<String> {
    if let Some(Value::Object(nested)) = field(obj, &["officer", "user", "reportedBy"]) {
        if let Some(id) = id(nested) {
            return Some(id);
        }
    }
    text(obj, &["officerId", "officer_id", "userId", "user_id", "reportedBy"])
}

fn patrol(obj: &Object) -> Option<PatrolUnit> {
    Some(PatrolUnit {
        id: id(obj)?,
        position: position(obj)?,
        accuracy_m: num(obj, &["accuracy", "accuracyM", "accuracy_m"]).unwrap_or(0.0).max(0.0),
        status: text(obj, &["status", "state"])
            .map(|s| PatrolStatus::from(s.as_str()))
            .unwrap_or(PatrolStatus::Active),
        last_report_at: timestamp(
            obj,
            &["lastReportAt", "last_report_at", "updatedAt", "updated_at", "timestamp"],
        )?,
        officer_id: officer(obj),
        province: province(obj),
    })
}

fn geometry(obj: &Object) -> Option<ZoneGeometry> {
    if let Some(Value::Object(geo)) = field(obj, &["geometry", "geojson"]) {
        let kind = geo.get("type").and_then(Value::as_str).unwrap_or_default();
        if kind.eq_ignore_ascii_case("polygon") {
            let outer = geo.get("coordinates")?.as_array()?.first()?.as_array()?;
            let ring: Option<Vec<_>> = outer.iter().map(lon_lat_pair).collect();
            return ring.filter(|r| r.len() >= 3).map(|ring| ZoneGeometry::Polygon { ring });
        }
        if kind.eq_ignore_ascii_case("point") {
            let center = lon_lat_pair(geo.get("coordinates")?)?;
            let radius_m = num(obj, &["radius", "radiusM", "radius_m"])?;
            return Some(ZoneGeometry::Circle { center, radius_m });
        }
    }
    if let Some(Value::Array(points)) = field(obj, &["polygon", "coordinates", "points"]) {
        let ring: Option<Vec<_>> = points.iter().map(point_from).collect();
        return ring.filter(|r| r.len() >= 3).map(|ring| ZoneGeometry::Polygon { ring });
    }
    let radius_m = num(obj, &["radius", "radiusM", "radius_m"])?;
    let center = field(obj, &["center"]).and_then(point_from).or_else(|| position(obj))?;
    (radius_m > 0.0).then_some(ZoneGeometry::Circle { center, radius_m })
}

fn risk_zone(obj: &Object) -> Option<RiskZone> {
    let id = id(obj)?;
    Some(RiskZone {
        name: text(obj, &["name", "title"]).unwrap_or_else(|| id.clone()),
        id,
        geometry: geometry(obj)?,
        severity: text(obj, &["severity", "riskLevel", "risk_level", "level"])
            .map(|s| Severity::from(s.as_str()))
            .unwrap_or(Severity::Unknown),
        category: text(obj, &["category", "threatCategory", "threat_category", "threatType"])
            .map(|s| ThreatCategory::from(s.as_str()))
            .unwrap_or(ThreatCategory::Unknown),
        active: flag(obj, &["active", "isActive", "is_active"]).unwrap_or(true),
        province: province(obj),
    })
}

fn incident(obj: &Object) -> Option<Incident> {
    Some(Incident {
        id: id(obj)?,
        kind: text(obj, &["type", "kind", "incidentType"])
            .map(|s| IncidentType::from(s.as_str()))
            .unwrap_or(IncidentType::Other),
        description: text(obj, &["description", "details", "title"]).unwrap_or_default(),
        position: position(obj)?,
        created_at: timestamp(obj, &["createdAt", "created_at", "timestamp", "reportedAt"])?,
        resolved: flag(obj, &["resolved", "isResolved", "is_resolved"]).unwrap_or(false),
        officer_id: officer(obj),
        province: province(obj),
    })
}

fn check_in(obj: &Object) -> Option<CheckIn> {
    Some(CheckIn {
        id: id(obj)?,
        officer_id: officer(obj),
        position: position(obj),
        timestamp: timestamp(obj, &["timestamp", "checkedInAt", "createdAt", "created_at"])?,
        province: province(obj),
    })
}

fn incident_total(payload: &Value) -> SyncResult<u64> {
    let obj = payload
        .as_object()
        .ok_or_else(|| SyncError::malformed("incident_stats: expected an object"))?;
    let total = match field(obj, &["data"]) {
        Some(Value::Object(inner)) => num(inner, &["total", "count"]),
        _ => num(obj, &["total", "count"]),
    };
    total
        .filter(|t| *t >= 0.0)
        .map(|t| t as u64)
        .ok_or_else(|| SyncError::malformed("incident_stats: missing total"))
}
