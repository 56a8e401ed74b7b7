//! Wire-format messages exchanged over the notification socket.
//!
//! Every frame is a JSON object `{"event": <name>, "data": {...}}`.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use marketplace_common::time::now_wire;

use super::payload::NotificationPayload;

/// Event names exchanged with clients.
pub struct EventName;

impl EventName {
    // Server → client
    pub const CONNECTION_CONFIRMED: &'static str = "connection-confirmed";
    pub const NOTIFICATION_NEW: &'static str = "notification:new";
    pub const PONG: &'static str = "pong";
    pub const MARKED_READ: &'static str = "notification:marked-read";
    pub const SYNC_RESPONSE: &'static str = "notification:sync-response";

    // Client → server
    pub const PING: &'static str = "ping";
    pub const MARK_READ: &'static str = "notification:mark-read";
    pub const SYNC_REQUEST: &'static str = "notification:sync-request";
    pub const LOGOUT: &'static str = "logout";
}

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    pub event: String,
    pub data: Value,
}

impl ServerEvent {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    pub fn connection_confirmed(
        user_id: &str,
        socket_id: &str,
        heartbeat_interval_ms: u64,
    ) -> Self {
        Self::new(
            EventName::CONNECTION_CONFIRMED,
            serde_json::json!({
                "status": "connected",
                "userId": user_id,
                "socketId": socket_id,
                "timestamp": now_wire(),
                "heartbeatInterval": heartbeat_interval_ms,
            }),
        )
    }

    pub fn notification(payload: &NotificationPayload) -> Self {
        Self::new(
            payload.event_type(),
            serde_json::json!({
                "notification": payload.body(),
                "receivedAt": payload.dispatched_at_wire(),
            }),
        )
    }

    pub fn pong() -> Self {
        Self::new(EventName::PONG, serde_json::json!({ "timestamp": now_wire() }))
    }

    /// Acknowledges a mark-read request. The REST API performs the write.
    pub fn marked_read(notification_id: &str) -> Self {
        Self::new(
            EventName::MARKED_READ,
            serde_json::json!({
                "notificationId": notification_id,
                "status": "acknowledged",
                "timestamp": now_wire(),
            }),
        )
    }

    /// Acknowledges a sync request. The client fetches the delta over REST.
    pub fn sync_response(user_id: &str, last_sync_time: Option<&str>) -> Self {
        let mut data = serde_json::json!({
            "status": "acknowledged",
            "userId": user_id,
            "requestedAt": now_wire(),
        });
        if let Some(since) = last_sync_time {
            data["lastSyncTime"] = Value::String(since.to_string());
        }
        Self::new(EventName::SYNC_RESPONSE, data)
    }

    pub fn encode(&self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// Raw frame received from the client, before the payload is interpreted.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadPayload {
    pub notification_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestPayload {
    #[serde(default)]
    pub last_sync_time: Option<String>,
}

/// A client event with its payload decoded.
#[derive(Debug, PartialEq, Eq)]
pub enum ClientEvent {
    Ping,
    MarkRead { notification_id: String },
    SyncRequest { last_sync_time: Option<String> },
    Logout,
    Unknown(String),
}

impl ClientMessage {
    /// Decode the payload for the named event. Unknown names are passed
    /// through as [`ClientEvent::Unknown`].
    pub fn into_event(self) -> Result<ClientEvent, serde_json::Error> {
        let data = if self.data.is_null() {
            Value::Object(Default::default())
        } else {
            self.data
        };

        let event = match self.event.as_str() {
            EventName::PING => ClientEvent::Ping,
            EventName::MARK_READ => {
                let payload: MarkReadPayload = serde_json::from_value(data)?;
                ClientEvent::MarkRead {
                    notification_id: payload.notification_id,
                }
            }
            EventName::SYNC_REQUEST => {
                let payload: SyncRequestPayload = serde_json::from_value(data)?;
                ClientEvent::SyncRequest {
                    last_sync_time: payload.last_sync_time,
                }
            }
            EventName::LOGOUT => ClientEvent::Logout,
            _ => ClientEvent::Unknown(self.event),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<ClientEvent, serde_json::Error> {
        serde_json::from_str::<ClientMessage>(raw)?.into_event()
    }

    #[test]
    fn parses_client_events() {
        assert_eq!(parse(r#"{"event":"ping","data":{}}"#).unwrap(), ClientEvent::Ping);
        assert_eq!(parse(r#"{"event":"ping"}"#).unwrap(), ClientEvent::Ping);
        assert_eq!(
            parse(r#"{"event":"notification:mark-read","data":{"notificationId":"n1"}}"#).unwrap(),
            ClientEvent::MarkRead {
                notification_id: "n1".to_string()
            }
        );
        assert_eq!(
            parse(r#"{"event":"notification:sync-request"}"#).unwrap(),
            ClientEvent::SyncRequest { last_sync_time: None }
        );
        let raw = concat!(
            r#"{"event":"notification:sync-request","#,
            r#""data":{"lastSyncTime":"2026-01-01T00:00:00Z"}}"#,
        );
        assert_eq!(
            parse(raw).unwrap(),
            ClientEvent::SyncRequest {
                last_sync_time: Some("2026-01-01T00:00:00Z".to_string())
            }
        );
        assert_eq!(
            parse(r#"{"event":"typing"}"#).unwrap(),
            ClientEvent::Unknown("typing".to_string())
        );
    }

    #[test]
    fn mark_read_without_id_is_an_error() {
        assert!(parse(r#"{"event":"notification:mark-read","data":{}}"#).is_err());
    }

    #[test]
    fn confirmation_uses_camel_case_fields() {
        let event = ServerEvent::connection_confirmed("u1", "conn_1", 25_000);
        let json: Value = serde_json::from_str(event.encode().unwrap().as_str()).unwrap();
        assert_eq!(json["event"], "connection-confirmed");
        assert_eq!(json["data"]["status"], "connected");
        assert_eq!(json["data"]["userId"], "u1");
        assert_eq!(json["data"]["socketId"], "conn_1");
        assert_eq!(json["data"]["heartbeatInterval"], 25_000);
        assert!(json["data"]["timestamp"].is_string());
    }

    #[test]
    fn sync_response_echoes_last_sync_time() {
        let event = ServerEvent::sync_response("u1", Some("2026-01-01T00:00:00Z"));
        assert_eq!(event.event, EventName::SYNC_RESPONSE);
        assert_eq!(event.data["userId"], "u1");
        assert_eq!(event.data["lastSyncTime"], "2026-01-01T00:00:00Z");

        let bare = ServerEvent::sync_response("u1", None);
        assert!(bare.data.get("lastSyncTime").is_none());
    }

    #[test]
    fn marked_read_is_acknowledgment_only() {
        let event = ServerEvent::marked_read("n1");
        assert_eq!(event.event, "notification:marked-read");
        assert_eq!(event.data["notificationId"], "n1");
        assert_eq!(event.data["status"], "acknowledged");
    }
}
