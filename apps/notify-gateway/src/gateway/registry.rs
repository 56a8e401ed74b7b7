//! Bidirectional user ↔ connection index.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use utoipa::ToSchema;

use super::handle::ConnectionHandle;

/// Aggregate counts for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RegistryStats {
    /// Distinct users with at least one live connection.
    pub users: usize,
    /// Total live connections across all users.
    pub connections: usize,
}

#[derive(Default)]
struct Inner {
    /// user id → (handle id → handle). A user with no handles has no entry.
    by_user: HashMap<String, HashMap<String, Arc<ConnectionHandle>>>,
    /// handle id → user id.
    by_handle: HashMap<String, String>,
}

/// Shared registry of live connections, injected into the lifecycle manager
/// and the dispatcher.
///
/// Both maps sit behind one `parking_lot::RwLock`, so every add/remove updates
/// them together and readers never see one without the other. Reads hand out
/// copies; the lock is never held past the call.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `user_id`.
    ///
    /// Returns `false` without touching state if the handle id is already
    /// registered or if the handle belongs to a different user.
    pub fn add(&self, user_id: &str, handle: Arc<ConnectionHandle>) -> bool {
        if handle.user_id() != user_id {
            tracing::warn!(
                user_id,
                socket_id = %handle.id(),
                owner = %handle.user_id(),
                "refusing to register handle under a different user"
            );
            return false;
        }

        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_handle.get(handle.id()) {
            tracing::warn!(
                user_id,
                socket_id = %handle.id(),
                registered_to = %existing,
                "handle already registered"
            );
            return false;
        }

        inner
            .by_handle
            .insert(handle.id().to_string(), user_id.to_string());
        inner
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(handle.id().to_string(), handle);
        true
    }

    /// Unregister a handle. Returns the owning user id if it was present.
    ///
    /// Removing an unknown handle is a no-op.
    pub fn remove(&self, handle_id: &str) -> Option<String> {
        let mut inner = self.inner.write();
        let user_id = inner.by_handle.remove(handle_id)?;

        match inner.by_user.get_mut(&user_id) {
            Some(set) => {
                if set.remove(handle_id).is_none() {
                    tracing::error!(
                        user_id = %user_id,
                        socket_id = handle_id,
                        "registry corruption: handle missing from its user's set"
                    );
                }
                if set.is_empty() {
                    inner.by_user.remove(&user_id);
                }
            }
            None => {
                tracing::error!(
                    user_id = %user_id,
                    socket_id = handle_id,
                    "registry corruption: handle points at a user with no entry"
                );
            }
        }

        Some(user_id)
    }

    /// Snapshot of the live handle ids for a user. Corrupt entries are
    /// evicted the same way [`connections`](Self::connections) does.
    pub fn get(&self, user_id: &str) -> Vec<String> {
        self.connections(user_id)
            .iter()
            .map(|handle| handle.id().to_string())
            .collect()
    }

    /// Snapshot of the live handles for a user, for delivery.
    ///
    /// Entries whose reverse mapping disagrees are dropped from the snapshot
    /// and evicted.
    pub fn connections(&self, user_id: &str) -> Vec<Arc<ConnectionHandle>> {
        let mut live = Vec::new();
        let mut corrupt = Vec::new();
        {
            let inner = self.inner.read();
            let Some(set) = inner.by_user.get(user_id) else {
                return live;
            };
            for (id, handle) in set {
                if inner.by_handle.get(id).map(String::as_str) == Some(user_id) {
                    live.push(handle.clone());
                } else {
                    corrupt.push(id.clone());
                }
            }
        }

        if !corrupt.is_empty() {
            self.evict_from_user(user_id, &corrupt);
        }
        live
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        !self.connections(user_id).is_empty()
    }

    pub fn count(&self) -> RegistryStats {
        let inner = self.inner.read();
        RegistryStats {
            users: inner.by_user.len(),
            connections: inner.by_handle.len(),
        }
    }

    /// Scan both maps and repair any asymmetry. Returns the number of entries
    /// removed.
    pub fn audit(&self) -> usize {
        let mut inner = self.inner.write();
        let Inner { by_user, by_handle } = &mut *inner;
        let mut repaired = 0;

        by_handle.retain(|handle_id, user_id| {
            let present = by_user
                .get(user_id.as_str())
                .is_some_and(|set| set.contains_key(handle_id));
            if !present {
                tracing::error!(
                    user_id = %user_id,
                    socket_id = %handle_id,
                    "registry corruption: reverse entry without forward entry"
                );
                repaired += 1;
            }
            present
        });

        by_user.retain(|user_id, set| {
            set.retain(|handle_id, _| {
                let consistent = by_handle.get(handle_id) == Some(user_id);
                if !consistent {
                    tracing::error!(
                        user_id = %user_id,
                        socket_id = %handle_id,
                        "registry corruption: forward entry without reverse entry"
                    );
                    repaired += 1;
                }
                consistent
            });
            !set.is_empty()
        });

        repaired
    }

    fn evict_from_user(&self, user_id: &str, handle_ids: &[String]) {
        let mut inner = self.inner.write();
        for handle_id in handle_ids {
            tracing::error!(
                user_id,
                socket_id = %handle_id,
                "registry corruption: evicting handle on access"
            );
            if let Some(set) = inner.by_user.get_mut(user_id) {
                set.remove(handle_id);
            }
            if inner.by_handle.get(handle_id).map(String::as_str) == Some(user_id) {
                inner.by_handle.remove(handle_id);
            }
        }
        if inner.by_user.get(user_id).is_some_and(|set| set.is_empty()) {
            inner.by_user.remove(user_id);
        }
    }
}
