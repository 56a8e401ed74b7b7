//! Best-effort fan-out of notification events to a user's live connections.
//!
//! Delivery is at-most-once. The persisted notification row is the source of
//! truth and clients poll for anything they miss, so nothing in here ever
//! fails the caller.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::events::ServerEvent;
use super::handle::PushError;
use super::payload::NotificationPayload;
use super::registry::ConnectionRegistry;

/// Outcome of a single `emit`. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeliveryReport {
    /// Connections found for the user at lookup time.
    pub attempted: usize,
    /// Frames queued successfully.
    pub delivered: usize,
    /// Pushes that failed after lookup.
    pub failed: usize,
}

impl DeliveryReport {
    /// Nothing reached the user in real time.
    pub fn is_miss(&self) -> bool {
        self.delivered == 0
    }
}

/// Aggregate outcome of a `broadcast`. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReport {
    /// Distinct users targeted.
    pub users: usize,
    /// Users with at least one successful push.
    pub reached_users: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Stateless façade over the registry, exposed to the notification service.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Push `payload` to every live connection of `user_id`.
    ///
    /// Never blocks and never fails. A failed push is not a reason to
    /// unregister the connection: only the socket's own close does that.
    pub fn emit(&self, user_id: &str, payload: &NotificationPayload) -> DeliveryReport {
        let handles = self.registry.connections(user_id);
        if handles.is_empty() {
            tracing::debug!(user_id, event = payload.event_type(), "no live connections, dropping");
            return DeliveryReport::default();
        }

        let frame = match ServerEvent::notification(payload).encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(?e, user_id, "failed to encode notification frame");
                return DeliveryReport {
                    attempted: handles.len(),
                    delivered: 0,
                    failed: handles.len(),
                };
            }
        };

        let mut report = DeliveryReport {
            attempted: handles.len(),
            ..Default::default()
        };
        for handle in &handles {
            match handle.push(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(PushError::QueueFull) => {
                    report.failed += 1;
                    tracing::warn!(
                        user_id,
                        socket_id = %handle.id(),
                        "outbound queue full, dropping notification"
                    );
                }
                Err(PushError::Closed) => {
                    report.failed += 1;
                    tracing::debug!(
                        user_id,
                        socket_id = %handle.id(),
                        "connection closed between lookup and push"
                    );
                }
            }
        }

        tracing::debug!(
            user_id,
            event = payload.event_type(),
            delivered = report.delivered,
            failed = report.failed,
            "notification dispatched"
        );
        report
    }

    /// `emit` to each distinct user id. Duplicate ids are delivered once.
    pub fn broadcast<I, S>(&self, user_ids: I, payload: &NotificationPayload) -> BroadcastReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut report = BroadcastReport::default();
        for user_id in user_ids {
            let user_id = user_id.as_ref();
            if !seen.insert(user_id.to_string()) {
                continue;
            }
            let delivery = self.emit(user_id, payload);
            report.users += 1;
            report.delivered += delivery.delivered;
            report.failed += delivery.failed;
            if !delivery.is_miss() {
                report.reached_users += 1;
            }
        }
        report
    }
}
