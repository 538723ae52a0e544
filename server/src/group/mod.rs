//! Group Membership Service
//!
//! Group CRUD, role-gated membership transitions and invite codes.

mod handlers;
mod invites;
mod membership;
mod types;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::api::AppState;

/// Create groups router (protected routes).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list))
        .route("/create", post(handlers::create))
        .route("/join/{code}", post(invites::join_by_code))
        .route(
            "/{id}",
            get(handlers::get).put(handlers::update).delete(handlers::delete),
        )
        .route("/{id}/members", post(handlers::add_member))
        .route("/{id}/members/{user_id}", delete(handlers::remove_member))
        .route("/{id}/members/{user_id}/role", put(handlers::change_role))
        .route("/{id}/leave", post(handlers::leave))
        .route("/{id}/invite-link", post(invites::generate_invite_link))
}
