//! The notification event pushed to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use marketplace_common::time::to_wire;

use super::events::EventName;

/// The notification resource as the REST API returns it. The notification
/// service owns this schema; the gateway forwards it untouched.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Immutable event handed to the dispatcher. Never stored or retried.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    event_type: String,
    body: Value,
    dispatched_at: DateTime<Utc>,
}

impl NotificationPayload {
    /// A `notification:new` event carrying an already-persisted record.
    pub fn new(body: Value) -> Self {
        Self::with_event_type(EventName::NOTIFICATION_NEW, body)
    }

    pub fn with_event_type(event_type: &str, body: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            body,
            dispatched_at: Utc::now(),
        }
    }

    pub fn from_record(record: &NotificationRecord) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_value(record)?))
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn dispatched_at(&self) -> DateTime<Utc> {
        self.dispatched_at
    }

    pub fn dispatched_at_wire(&self) -> String {
        to_wire(self.dispatched_at)
    }
}
