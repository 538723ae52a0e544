//! Database Models
//!
//! Persisted record shapes shared by every [`super::Store`] backend.

use chrono::{DateTime, Utc};
use mm_common::UserStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Placeholder stored as the text of an image-only message.
pub const IMAGE_PLACEHOLDER: &str = "[Image]";

/// User model.
///
/// Owned by the account subsystem; messaging only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a fresh user record.
    #[must_use]
    pub fn new(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            username: username.into(),
            display_name: display_name.into(),
            avatar_url: None,
            status: UserStatus::Offline,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Who a message is addressed to: exactly one user or exactly one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RecipientParts", into = "RecipientParts")]
pub enum Recipient {
    User(Uuid),
    Group(Uuid),
}

/// Flat wire/storage representation of [`Recipient`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientParts {
    pub receiver_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
}

impl Recipient {
    /// Build a recipient from the optional receiver/group pair.
    ///
    /// Fails with a validation error when both or neither are set.
    pub fn from_parts(receiver_id: Option<Uuid>, group_id: Option<Uuid>) -> AppResult<Self> {
        match (receiver_id, group_id) {
            (Some(user), None) => Ok(Self::User(user)),
            (None, Some(group)) => Ok(Self::Group(group)),
            (Some(_), Some(_)) => Err(AppError::validation(
                "Message cannot have both receiver and group",
            )),
            (None, None) => Err(AppError::validation(
                "Either receiver or group must be specified",
            )),
        }
    }

    #[must_use]
    pub const fn receiver_id(self) -> Option<Uuid> {
        match self {
            Self::User(id) => Some(id),
            Self::Group(_) => None,
        }
    }

    #[must_use]
    pub const fn group_id(self) -> Option<Uuid> {
        match self {
            Self::Group(id) => Some(id),
            Self::User(_) => None,
        }
    }
}

impl TryFrom<RecipientParts> for Recipient {
    type Error = String;

    fn try_from(parts: RecipientParts) -> Result<Self, Self::Error> {
        Self::from_parts(parts.receiver_id, parts.group_id).map_err(|e| e.to_string())
    }
}

impl From<Recipient> for RecipientParts {
    fn from(recipient: Recipient) -> Self {
        Self {
            receiver_id: recipient.receiver_id(),
            group_id: recipient.group_id(),
        }
    }
}

/// Kind of a message attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
    Audio,
}

/// Externally hosted attachment. `url` follows the message encryption rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub name: Option<String>,
    pub size: Option<i64>,
}

/// Emoji reaction left by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub user_id: Uuid,
}

/// Read receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// Message model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    #[serde(flatten)]
    pub recipient: Recipient,
    /// Filtered text, or ciphertext when `is_encrypted`.
    pub content: String,
    pub image: Option<String>,
    pub attachments: Vec<Attachment>,
    pub is_encrypted: bool,
    /// Sent without text; `content` holds [`IMAGE_PLACEHOLDER`] in the clear.
    pub is_image_only: bool,
    /// Only populated in legacy password-persistence mode. Never serialized.
    #[serde(skip)]
    pub password: Option<String>,
    pub has_profanity: bool,
    pub is_edited: bool,
    pub is_pinned: bool,
    pub reactions: Vec<Reaction>,
    pub read_by: Vec<ReadReceipt>,
    pub reply_to: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Build an unsaved message with empty reactions and receipts.
    #[must_use]
    pub fn new(sender_id: Uuid, recipient: Recipient, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            sender_id,
            recipient,
            content: content.into(),
            image: None,
            attachments: Vec::new(),
            is_encrypted: false,
            is_image_only: false,
            password: None,
            has_profanity: false,
            is_edited: false,
            is_pinned: false,
            reactions: Vec::new(),
            read_by: Vec::new(),
            reply_to: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Image-only message carrying the readable placeholder text.
    #[must_use]
    pub fn image_only(sender_id: Uuid, recipient: Recipient) -> Self {
        Self {
            is_image_only: true,
            ..Self::new(sender_id, recipient, IMAGE_PLACEHOLDER)
        }
    }

    /// Whether `user_id` is one side of this direct message.
    #[must_use]
    pub fn is_direct_between(&self, a: Uuid, b: Uuid) -> bool {
        match self.recipient {
            Recipient::User(receiver) => {
                (self.sender_id == a && receiver == b) || (self.sender_id == b && receiver == a)
            }
            Recipient::Group(_) => false,
        }
    }
}

/// Result of an idempotent append to a message list.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// Stored record after the append.
    pub message: Message,
    /// `false` when an equal entry was already present.
    pub added: bool,
}

// ============================================================================
// Groups
// ============================================================================

/// Role of a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Admin,
    Moderator,
    #[default]
    Member,
}

/// Group membership entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub user_id: Uuid,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

/// Group behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupSettings {
    pub only_admins_can_message: bool,
    pub only_admins_can_edit_info: bool,
    pub only_admins_can_add_members: bool,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            only_admins_can_message: false,
            only_admins_can_edit_info: true,
            only_admins_can_add_members: true,
        }
    }
}

/// Group model.
///
/// `creator_id` is immutable and grants admin-equivalent rights regardless
/// of the creator's entry in `members`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub creator_id: Uuid,
    pub members: Vec<GroupMember>,
    pub picture_url: Option<String>,
    pub settings: GroupSettings,
    pub invite_code: Option<String>,
    pub pinned_messages: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
