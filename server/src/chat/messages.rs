//! Message Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::service::{self, DecryptedMessage, NewMessage};
use crate::{
    api::AppState,
    auth::AuthUser,
    db::{Attachment, Message, Recipient, User},
    error::{AppError, AppResult},
};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: Option<Uuid>,
    #[validate(length(max = 4000, message = "Content must be at most 4000 characters"))]
    pub content: Option<String>,
    /// Base64 or data-URL image
    pub image: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub password: Option<String>,
    pub reply_to: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendGroupMessageRequest {
    #[validate(length(max = 4000, message = "Content must be at most 4000 characters"))]
    pub content: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub password: Option<String>,
    pub reply_to: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageRequest {
    pub message_id: Uuid,
    #[validate(length(min = 1, max = 4000, message = "Content must be 1-4000 characters"))]
    pub content: String,
    /// Required for encrypted messages unless passwords are persisted
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    pub message_id: Uuid,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    #[validate(length(min = 1, max = 32, message = "Emoji must be 1-32 characters"))]
    pub emoji: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub id: Uuid,
    pub deleted: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// List users for the conversation sidebar.
/// GET /api/messages/users
#[tracing::instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(service::list_users(&state, auth.id).await?))
}

/// Full history with a user or of a group.
/// GET /api/messages/{id}
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(service::list_for_conversation(&state, auth.id, id).await?))
}

/// Send a direct message.
/// POST /api/messages/send
#[tracing::instrument(skip(state, body))]
pub async fn send(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    body.validate()?;
    let receiver = body
        .receiver_id
        .ok_or_else(|| AppError::validation("Receiver is required"))?;

    let message = service::send(
        &state,
        auth.id,
        NewMessage {
            recipient: Recipient::User(receiver),
            content: body.content,
            image: body.image,
            attachments: body.attachments,
            password: body.password,
            reply_to: body.reply_to,
            expires_at: body.expires_at,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Send a message to a group.
/// POST /api/messages/group/{group_id}
#[tracing::instrument(skip(state, body))]
pub async fn send_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    Json(body): Json<SendGroupMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    body.validate()?;

    let message = service::send(
        &state,
        auth.id,
        NewMessage {
            recipient: Recipient::Group(group_id),
            content: body.content,
            image: body.image,
            attachments: body.attachments,
            password: body.password,
            reply_to: body.reply_to,
            expires_at: body.expires_at,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Edit own message.
/// PUT /api/messages/edit
#[tracing::instrument(skip(state, body))]
pub async fn edit(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<EditMessageRequest>,
) -> AppResult<Json<Message>> {
    body.validate()?;
    let message =
        service::edit(&state, auth.id, body.message_id, &body.content, body.password).await?;
    Ok(Json(message))
}

/// Delete own message.
/// DELETE /api/messages/{message_id}
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
) -> AppResult<Json<DeleteResponse>> {
    service::delete(&state, auth.id, message_id).await?;
    Ok(Json(DeleteResponse {
        id: message_id,
        deleted: true,
    }))
}

/// Decrypt a password-protected message.
/// POST /api/messages/decrypt
#[tracing::instrument(skip(state, body))]
pub async fn decrypt(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<DecryptRequest>,
) -> AppResult<Json<DecryptedMessage>> {
    Ok(Json(
        service::decrypt(&state, auth.id, body.message_id, &body.password).await?,
    ))
}

/// React to a message.
/// POST /api/messages/{message_id}/reactions
#[tracing::instrument(skip(state, body))]
pub async fn add_reaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
    Json(body): Json<ReactionRequest>,
) -> AppResult<Json<Message>> {
    body.validate()?;
    Ok(Json(
        service::add_reaction(&state, auth.id, message_id, &body.emoji).await?,
    ))
}

/// Mark a message as read.
/// POST /api/messages/{message_id}/read
#[tracing::instrument(skip(state))]
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    Ok(Json(service::mark_read(&state, auth.id, message_id).await?))
}
