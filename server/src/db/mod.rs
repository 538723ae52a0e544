//! Database Layer
//!
//! The [`Store`] trait is the persistence collaborator used by the message
//! and group services. Two backends implement it:
//!
//! - [`PgStore`]: `PostgreSQL` via sqlx (production)
//! - [`MemoryStore`]: process-local maps (development and tests)

mod memory;
mod models;
mod postgres;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;

use crate::config::Config;

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A unique constraint was violated.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    /// A stored row breaks a record invariant.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Key-indexed persistence with simple field queries.
///
/// Listing methods return records ordered by `created_at` ascending, ties
/// broken by id.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for health output and logs.
    fn backend(&self) -> &'static str;

    // Users
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn list_users_except(&self, id: Uuid) -> StoreResult<Vec<User>>;

    // Messages
    async fn insert_message(&self, message: &Message) -> StoreResult<()>;
    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>>;
    /// Write the edited text of `message`: `content`, `has_profanity`,
    /// `is_image_only` and `updated_at`, and mark it edited. Every other
    /// column is left as stored. Returns the stored record, `None` if absent.
    async fn update_message_content(&self, message: &Message) -> StoreResult<Option<Message>>;
    /// Append `reaction` unless an equal one is present.
    async fn add_reaction(
        &self,
        message_id: Uuid,
        reaction: &Reaction,
    ) -> StoreResult<Option<AppendOutcome>>;
    /// Append `receipt` unless its user already has one.
    async fn add_read_receipt(
        &self,
        message_id: Uuid,
        receipt: &ReadReceipt,
    ) -> StoreResult<Option<AppendOutcome>>;
    /// Replies to the deleted message lose their `reply_to`.
    async fn delete_message(&self, id: Uuid) -> StoreResult<bool>;
    async fn list_group_messages(&self, group_id: Uuid) -> StoreResult<Vec<Message>>;
    /// Direct messages between `a` and `b`, in either direction.
    async fn list_direct_messages(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<Message>>;

    // Groups
    /// Fails with [`StoreError::Duplicate`] on an invite code collision.
    async fn insert_group(&self, group: &Group) -> StoreResult<()>;
    async fn find_group(&self, id: Uuid) -> StoreResult<Option<Group>>;
    async fn find_group_by_invite_code(&self, code: &str) -> StoreResult<Option<Group>>;
    async fn invite_code_exists(&self, code: &str) -> StoreResult<bool>;
    /// Write name, description, picture and settings. Members and the
    /// invite code are left as stored.
    async fn update_group_info(&self, group: &Group) -> StoreResult<bool>;
    /// Fails with [`StoreError::Duplicate`] on an invite code collision.
    async fn set_invite_code(&self, group_id: Uuid, code: &str) -> StoreResult<bool>;

    // Group members. Each call is a single atomic change against the
    // stored member list; `None` means the group is absent or the change
    // does not apply.
    /// `None` also when `member.user_id` is already a member.
    async fn add_group_member(&self, group_id: Uuid, member: &GroupMember)
        -> StoreResult<Option<Group>>;
    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid)
        -> StoreResult<Option<Group>>;
    async fn set_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role: GroupRole,
    ) -> StoreResult<Option<Group>>;

    /// Deletes the group together with its messages.
    async fn delete_group(&self, id: Uuid) -> StoreResult<bool>;
    async fn list_groups_for_member(&self, user_id: Uuid) -> StoreResult<Vec<Group>>;
}

/// Connect the configured store backend.
pub async fn create_store(config: &Config) -> Result<Arc<dyn Store>> {
    if let Some(url) = &config.database_url {
        let store = PgStore::connect(url).await?;
        store.run_migrations().await?;
        Ok(Arc::new(store))
    } else {
        warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
        info!("In-memory store ready");
        Ok(Arc::new(MemoryStore::new()))
    }
}
