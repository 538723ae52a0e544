//! In-process presence registry.

use async_trait::async_trait;
use dashmap::DashMap;
use mm_common::{PresenceEntry, UserStatus};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ConnectionHandle, PresenceRegistry};

struct Slot {
    handle: ConnectionHandle,
    status: UserStatus,
}

/// `DashMap`-backed [`PresenceRegistry`] for a single server process.
#[derive(Default)]
pub struct LocalPresence {
    slots: DashMap<Uuid, Slot>,
}

impl LocalPresence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceRegistry for LocalPresence {
    async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let user_id = handle.user_id();
        let connection_id = handle.id();
        let previous = self
            .slots
            .insert(
                user_id,
                Slot {
                    handle,
                    status: UserStatus::Online,
                },
            )
            .map(|slot| slot.handle);

        if let Some(old) = &previous {
            info!(
                user_id = %user_id,
                old_connection = %old.id(),
                new_connection = %connection_id,
                "Connection replaced"
            );
        }
        previous
    }

    async fn unregister(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let removed = self
            .slots
            .remove_if(&user_id, |_, slot| slot.handle.id() == connection_id)
            .is_some();

        if !removed {
            debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Stale unregister ignored"
            );
        }
        removed
    }

    async fn set_status(&self, user_id: Uuid, status: UserStatus) -> bool {
        match self.slots.get_mut(&user_id) {
            Some(mut slot) => {
                slot.status = status;
                true
            }
            None => false,
        }
    }

    async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.slots.get(&user_id).map(|slot| slot.handle.clone())
    }

    async fn list_online(&self) -> Vec<PresenceEntry> {
        let mut online: Vec<PresenceEntry> = self
            .slots
            .iter()
            .map(|entry| PresenceEntry {
                user_id: *entry.key(),
                status: entry.status,
            })
            .collect();
        online.sort_by_key(|entry| entry.user_id);
        online
    }

    async fn connections(&self) -> Vec<ConnectionHandle> {
        self.slots.iter().map(|slot| slot.handle.clone()).collect()
    }
}
