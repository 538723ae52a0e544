//! Message Lifecycle
//!
//! Validation, authorization, filtering, optional encryption and
//! persistence of messages. Every successful mutation is followed by a
//! best-effort real-time event; delivery failures never change the result.

use chrono::{DateTime, Utc};
use mm_crypto::CryptoError;
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::uploads::UploadError;
use crate::api::AppState;
use crate::db::{Attachment, Message, Reaction, ReadReceipt, Recipient, User};
use crate::error::{AppError, AppResult};
use crate::ws::ServerEvent;

/// Input for [`send`].
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub recipient: Recipient,
    pub content: Option<String>,
    /// Inline image (base64 or data URL) to host before storing.
    pub image: Option<String>,
    pub attachments: Vec<Attachment>,
    pub password: Option<String>,
    pub reply_to: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    /// Plain text message.
    #[must_use]
    pub fn text(recipient: Recipient, content: impl Into<String>) -> Self {
        Self {
            recipient,
            content: Some(content.into()),
            image: None,
            attachments: Vec::new(),
            password: None,
            reply_to: None,
            expires_at: None,
        }
    }

    /// Encrypt the message with `password`.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Plaintext view of an encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedMessage {
    pub message_id: Uuid,
    pub content: String,
    pub image: Option<String>,
    pub attachments: Vec<Attachment>,
}

// ============================================================================
// Operations
// ============================================================================

/// Users other than `viewer`.
pub async fn list_users(state: &AppState, viewer: Uuid) -> AppResult<Vec<User>> {
    Ok(state.store.list_users_except(viewer).await?)
}

/// Create a message from `sender`.
#[instrument(skip(state, input), fields(recipient = ?input.recipient))]
pub async fn send(state: &AppState, sender: Uuid, input: NewMessage) -> AppResult<Message> {
    let content = non_empty(input.content);
    let image = non_empty(input.image);
    let password = non_empty(input.password);

    if content.is_none() && image.is_none() {
        return Err(AppError::validation("Content or image is required"));
    }

    // Authorization before any side effect
    match input.recipient {
        Recipient::User(receiver) => {
            if state.store.find_user(receiver).await?.is_none() {
                return Err(AppError::NotFound("Receiver"));
            }
        }
        Recipient::Group(group_id) => {
            let group = state
                .store
                .find_group(group_id)
                .await?
                .ok_or(AppError::NotFound("Group"))?;
            if !group.is_member(sender) {
                return Err(AppError::forbidden("You are not a member of this group"));
            }
            if !group.can_send(sender) {
                return Err(AppError::forbidden("Only admins can send messages in this group"));
            }
        }
    }

    if let Some(reply_to) = input.reply_to {
        let target = state.store.find_message(reply_to).await?;
        let same_conversation = target.is_some_and(|t| match input.recipient {
            Recipient::User(receiver) => t.is_direct_between(sender, receiver),
            Recipient::Group(group_id) => t.recipient.group_id() == Some(group_id),
        });
        if !same_conversation {
            return Err(AppError::validation("Reply target not found in this conversation"));
        }
    }

    let image_url = match image {
        Some(image) => {
            let uploader = state.uploader.as_ref().ok_or(UploadError::NotConfigured)?;
            Some(uploader.upload(&image).await?)
        }
        None => None,
    };

    let mut message = match content {
        Some(text) => {
            let filtered = state.filter.clean(&text);
            let mut m = Message::new(sender, input.recipient, filtered);
            m.has_profanity = state.filter.is_profane(&text);
            m
        }
        None => Message::image_only(sender, input.recipient),
    };
    message.image = image_url;
    message.attachments = input.attachments;
    message.reply_to = input.reply_to;
    message.expires_at = input.expires_at;

    if let Some(password) = password {
        message = seal_blocking(message, password.clone()).await?;
        if state.config.persist_message_passwords {
            message.password = Some(password);
        }
    }

    state.store.insert_message(&message).await?;
    info!(
        message_id = %message.id,
        sender_id = %sender,
        encrypted = message.is_encrypted,
        "Message sent"
    );

    let event = match message.recipient {
        Recipient::User(_) => ServerEvent::NewMessage(Box::new(message.clone())),
        Recipient::Group(_) => ServerEvent::NewGroupMessage(Box::new(message.clone())),
    };
    emit(state, &message, sender, event).await;

    Ok(message)
}

/// Replace the text of `message_id`. Only the sender may edit.
///
/// Encrypted messages are re-encrypted. The password comes from the
/// request; in legacy persistence mode the stored one is the fallback.
#[instrument(skip(state, new_content, password))]
pub async fn edit(
    state: &AppState,
    editor: Uuid,
    message_id: Uuid,
    new_content: &str,
    password: Option<String>,
) -> AppResult<Message> {
    let mut message = state
        .store
        .find_message(message_id)
        .await?
        .ok_or(AppError::NotFound("Message"))?;

    if message.sender_id != editor {
        return Err(AppError::forbidden("You can only edit your own messages"));
    }
    if new_content.trim().is_empty() {
        return Err(AppError::validation("Content is required"));
    }

    let filtered = state.filter.clean(new_content);
    message.has_profanity = state.filter.is_profane(new_content);

    if message.is_encrypted {
        let password = match non_empty(password) {
            Some(supplied) => {
                // Never re-encrypt under a password that does not open the message
                let check = message.clone();
                let supplied_clone = supplied.clone();
                run_cipher(move || open(&check, &supplied_clone))
                    .await?
                    .map_err(|_| AppError::InvalidPassword)?;
                supplied
            }
            None => message
                .password
                .clone()
                .ok_or_else(|| AppError::validation("Password is required to edit an encrypted message"))?,
        };

        let sealed = run_cipher(move || mm_crypto::encrypt(&filtered, &password)).await?;
        message.content = sealed.map_err(|e| AppError::Internal(e.to_string()))?;
    } else {
        message.content = filtered;
    }
    message.is_image_only = false;
    message.updated_at = Utc::now();

    // Reactions and receipts that landed during key derivation are kept
    let message = state
        .store
        .update_message_content(&message)
        .await?
        .ok_or(AppError::NotFound("Message"))?;
    info!(message_id = %message.id, "Message edited");

    emit(
        state,
        &message,
        editor,
        ServerEvent::MessageEdited(Box::new(message.clone())),
    )
    .await;

    Ok(message)
}

/// Hard-delete `message_id`. Only the sender may delete.
#[instrument(skip(state))]
pub async fn delete(state: &AppState, requester: Uuid, message_id: Uuid) -> AppResult<()> {
    let message = state
        .store
        .find_message(message_id)
        .await?
        .ok_or(AppError::NotFound("Message"))?;

    if message.sender_id != requester {
        return Err(AppError::forbidden("You can only delete your own messages"));
    }

    if !state.store.delete_message(message_id).await? {
        return Err(AppError::NotFound("Message"));
    }
    info!(message_id = %message_id, "Message deleted");

    emit(
        state,
        &message,
        requester,
        ServerEvent::MessageDeleted {
            message_id,
            group_id: message.recipient.group_id(),
        },
    )
    .await;

    Ok(())
}

/// Decrypt `message_id` for its receiver or a member of its group.
///
/// All encrypted fields are opened or none are: any failure yields
/// [`AppError::InvalidPassword`].
#[instrument(skip(state, password))]
pub async fn decrypt(
    state: &AppState,
    requester: Uuid,
    message_id: Uuid,
    password: &str,
) -> AppResult<DecryptedMessage> {
    let message = state
        .store
        .find_message(message_id)
        .await?
        .ok_or(AppError::NotFound("Message"))?;

    let authorized = match message.recipient {
        Recipient::User(receiver) => receiver == requester,
        Recipient::Group(group_id) => state
            .store
            .find_group(group_id)
            .await?
            .is_some_and(|g| g.is_member(requester)),
    };
    if !authorized {
        return Err(AppError::forbidden("You are not authorized to decrypt this message"));
    }

    if !message.is_encrypted {
        return Err(AppError::validation("Message is not encrypted"));
    }

    let password = password.to_string();
    run_cipher(move || open(&message, &password))
        .await?
        .map_err(|e| {
            debug!(message_id = %message_id, error = %e, "Decryption failed");
            AppError::InvalidPassword
        })
}

/// Full ordered history of a group (for members) or of the direct
/// conversation between `viewer` and `peer_or_group`.
#[instrument(skip(state))]
pub async fn list_for_conversation(
    state: &AppState,
    viewer: Uuid,
    peer_or_group: Uuid,
) -> AppResult<Vec<Message>> {
    if let Some(group) = state.store.find_group(peer_or_group).await? {
        if !group.is_member(viewer) {
            return Err(AppError::forbidden("You are not a member of this group"));
        }
        return Ok(state.store.list_group_messages(group.id).await?);
    }

    Ok(state.store.list_direct_messages(viewer, peer_or_group).await?)
}

/// Record a reaction. The same emoji from the same user is kept once.
#[instrument(skip(state))]
pub async fn add_reaction(
    state: &AppState,
    user_id: Uuid,
    message_id: Uuid,
    emoji: &str,
) -> AppResult<Message> {
    ensure_visible(state, user_id, message_id).await?;

    let reaction = Reaction {
        emoji: emoji.to_string(),
        user_id,
    };
    let outcome = state
        .store
        .add_reaction(message_id, &reaction)
        .await?
        .ok_or(AppError::NotFound("Message"))?;

    if outcome.added {
        emit(
            state,
            &outcome.message,
            user_id,
            ServerEvent::NewReaction {
                message_id,
                reaction: reaction.emoji,
                user_id,
            },
        )
        .await;
    }

    Ok(outcome.message)
}

/// Record that `user_id` read the message. One receipt per user.
#[instrument(skip(state))]
pub async fn mark_read(state: &AppState, user_id: Uuid, message_id: Uuid) -> AppResult<Message> {
    ensure_visible(state, user_id, message_id).await?;

    let receipt = ReadReceipt {
        user_id,
        read_at: Utc::now(),
    };
    let outcome = state
        .store
        .add_read_receipt(message_id, &receipt)
        .await?
        .ok_or(AppError::NotFound("Message"))?;

    if outcome.added {
        emit(
            state,
            &outcome.message,
            user_id,
            ServerEvent::MessageReadBy {
                message_id,
                user_id,
            },
        )
        .await;
    }

    Ok(outcome.message)
}

// ============================================================================
// Helpers
// ============================================================================

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Fail unless `user_id` takes part in the conversation of `message_id`.
async fn ensure_visible(state: &AppState, user_id: Uuid, message_id: Uuid) -> AppResult<()> {
    let message = state
        .store
        .find_message(message_id)
        .await?
        .ok_or(AppError::NotFound("Message"))?;

    let visible = match message.recipient {
        Recipient::User(receiver) => user_id == receiver || user_id == message.sender_id,
        Recipient::Group(group_id) => state
            .store
            .find_group(group_id)
            .await?
            .is_some_and(|g| g.is_member(user_id)),
    };
    if !visible {
        return Err(AppError::forbidden("You are not part of this conversation"));
    }
    Ok(())
}

/// Send `event` to the other side of the conversation: the DM counterpart
/// of `actor`, or the group channel.
async fn emit(state: &AppState, message: &Message, actor: Uuid, event: ServerEvent) {
    match message.recipient {
        Recipient::User(receiver) => {
            let target = if actor == message.sender_id {
                receiver
            } else {
                message.sender_id
            };
            state.fanout.send_to_user(target, event).await;
        }
        Recipient::Group(group_id) => {
            state.fanout.send_to_channel(&group_id.to_string(), &event);
        }
    }
}

/// Run CPU-bound key derivation on the blocking pool.
async fn run_cipher<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Cipher task failed: {e}")))
}

async fn seal_blocking(message: Message, password: String) -> AppResult<Message> {
    run_cipher(move || {
        let mut message = message;
        seal(&mut message, &password).map(|()| message)
    })
    .await?
    .map_err(|e| AppError::Internal(e.to_string()))
}

/// The placeholder text of an image-only message stays readable.
const fn content_is_sealed(message: &Message) -> bool {
    !message.is_image_only
}

/// Encrypt text, image URL and attachment URLs in place.
fn seal(message: &mut Message, password: &str) -> Result<(), CryptoError> {
    if content_is_sealed(message) {
        message.content = mm_crypto::encrypt(&message.content, password)?;
    }
    if let Some(image) = &message.image {
        message.image = Some(mm_crypto::encrypt(image, password)?);
    }
    for attachment in &mut message.attachments {
        attachment.url = mm_crypto::encrypt(&attachment.url, password)?;
    }
    message.is_encrypted = true;
    Ok(())
}

/// Decrypt every sealed field. Content goes first and acts as the password
/// check, so a wrong password fails before any URL is opened.
fn open(message: &Message, password: &str) -> Result<DecryptedMessage, CryptoError> {
    let content = if content_is_sealed(message) {
        mm_crypto::decrypt(&message.content, password)?
    } else {
        message.content.clone()
    };

    let image = message
        .image
        .as_deref()
        .map(|image| mm_crypto::decrypt(image, password))
        .transpose()?;

    let attachments = message
        .attachments
        .iter()
        .map(|a| {
            Ok(Attachment {
                url: mm_crypto::decrypt(&a.url, password)?,
                ..a.clone()
            })
        })
        .collect::<Result<Vec<_>, CryptoError>>()?;

    Ok(DecryptedMessage {
        message_id: message.id,
        content,
        image,
        attachments,
    })
}
