//! Presence Registry
//!
//! Maps user ids to their live connection and status. The registry only
//! holds process memory: every "online" entry is lost on restart and is
//! rebuilt as clients reconnect.
//!
//! [`PresenceRegistry`] is the seam for a shared implementation when more
//! than one server process is deployed; the relay never touches the
//! backing map directly.

mod local;
mod types;

use async_trait::async_trait;
use mm_common::{PresenceEntry, UserStatus};
use uuid::Uuid;

pub use local::LocalPresence;
pub use types::ConnectionHandle;

/// Registry of connected users.
///
/// One connection per user: registering again replaces the previous binding
/// (last write wins).
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// Bind `handle` to its user with status `online`.
    ///
    /// Returns the connection it replaced, if any.
    async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle>;

    /// Remove the binding for `user_id` if it still belongs to
    /// `connection_id`.
    ///
    /// Returns `false` when a newer connection has taken over, so a stale
    /// disconnect cannot knock the user offline.
    async fn unregister(&self, user_id: Uuid, connection_id: Uuid) -> bool;

    /// Update the status of a connected user. Returns `false` if the user
    /// is not connected.
    async fn set_status(&self, user_id: Uuid, status: UserStatus) -> bool;

    /// Current connection for `user_id`.
    async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle>;

    /// Every connected user with its status, ordered by user id.
    async fn list_online(&self) -> Vec<PresenceEntry>;

    /// Every live connection.
    async fn connections(&self) -> Vec<ConnectionHandle>;
}
