//! Presence Types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserStatus;

/// One row of the online-user list broadcast to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: Uuid,
    pub status: UserStatus,
}
