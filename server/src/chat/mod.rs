//! Chat Service
//!
//! Direct and group messages: lifecycle, encryption, moderation and image
//! hosting.

mod messages;
pub mod s3;
pub mod service;
pub mod uploads;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::api::AppState;

pub use s3::S3Client;
pub use uploads::{MediaUploader, UploadError};

/// Create messages router (protected routes).
pub fn messages_router() -> Router<AppState> {
    Router::new()
        .route("/users", get(messages::list_users))
        .route("/send", post(messages::send))
        .route("/group/{group_id}", post(messages::send_group))
        .route("/edit", put(messages::edit))
        .route("/decrypt", post(messages::decrypt))
        .route("/{id}", get(messages::list).delete(messages::delete))
        .route("/{id}/reactions", post(messages::add_reaction))
        .route("/{id}/read", post(messages::mark_read))
}
