//! Push event vocabulary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transport::PushFrame;
use crate::error::{SyncError, SyncResult};
use crate::feeds::normalize;
use crate::model::{Incident, Severity};

/// Operator-facing notification pushed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    #[serde(default, alias = "message")]
    pub body: String,
    #[serde(default)]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PushEvent {
    NewIncident { incident: Incident },
    Notification(Notification),
}

impl PushEvent {
    /// Parse a frame. The event name comes from the SSE `event:` field when
    /// present, otherwise from a `type` field in the payload.
    pub fn parse(frame: &PushFrame) -> SyncResult<Self> {
        let payload: Value = serde_json::from_str(&frame.data)?;
        let name = match &frame.event {
            Some(name) => name.as_str(),
            None => payload
                .get("type")
                .or_else(|| payload.get("event"))
                .and_then(Value::as_str)
                .ok_or_else(|| SyncError::malformed("push frame has no event type"))?,
        };
        let body = payload.get("data").unwrap_or(&payload);

        match name {
            "newIncident" | "new_incident" | "incident" => {
                let incident = body.get("incident").unwrap_or(body);
                normalize::incident_from(incident)
                    .map(|incident| PushEvent::NewIncident { incident })
                    .ok_or_else(|| SyncError::malformed("newIncident payload is not an incident"))
            }
            "notification" => Ok(PushEvent::Notification(serde_json::from_value(body.clone())?)),
            other => Err(SyncError::malformed(format!("unknown push event '{other}'"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::NewIncident { .. } => "newIncident",
            PushEvent::Notification(_) => "notification",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: Option<&str>, data: &str) -> PushFrame {
        PushFrame { event: event.map(str::to_string), data: data.to_string() }
    }

    #[test]
    fn named_sse_event_with_incident_payload() {
        let parsed = PushEvent::parse(&frame(
            Some("newIncident"),
            r#"{"id":"i9","type":"SUPPRESSION","lat":13.7,"lng":100.5,"createdAt":"2026-03-10T08:00:00Z"}"#,
        ))
        .unwrap();

        let PushEvent::NewIncident { incident } = parsed else { panic!("wrong variant") };
        assert_eq!(incident.id, "i9");
    }

    #[test]
    fn typed_payload_without_event_name() {
        let parsed = PushEvent::parse(&frame(
            None,
            r#"{"type":"notification","data":{"title":"Shift change","message":"Sector 4","severity":"high"}}"#,
        ))
        .unwrap();

        assert_eq!(
            parsed,
            PushEvent::Notification(Notification {
                title: "Shift change".into(),
                body: "Sector 4".into(),
                severity: Some(Severity::High),
            })
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(PushEvent::parse(&frame(None, "not json")), Err(SyncError::Malformed(_))));
        assert!(matches!(
            PushEvent::parse(&frame(Some("newIncident"), r#"{"id":"x"}"#)),
            Err(SyncError::Malformed(_))
        ));
        assert!(PushEvent::parse(&frame(Some("mystery"), "{}")).is_err());
    }
}
