//! Group Invite Handlers

use axum::extract::{Path, State};
use axum::Json;
use tracing::{info, warn};
use uuid::Uuid;

use super::handlers::{insert_member, load};
use super::types::InviteLinkResponse;
use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{Group, Store, StoreError};
use crate::error::{AppError, AppResult};

const MAX_CODE_ATTEMPTS: usize = 5;

/// Random 8-character uppercase hex code.
fn generate_invite_code() -> String {
    hex::encode_upper(rand::random::<[u8; 4]>())
}

/// Find a code no other group holds.
async fn unique_invite_code(store: &dyn Store) -> AppResult<String> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_invite_code();
        if !store.invite_code_exists(&code).await? {
            return Ok(code);
        }
        warn!(code = %code, "Invite code collision, retrying");
    }
    Err(AppError::conflict("Could not allocate a unique invite code"))
}

/// Mint a fresh invite code, replacing any previous one. Admins only.
/// POST /api/groups/{id}/invite-link
#[tracing::instrument(skip(state))]
pub async fn generate_invite_link(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> AppResult<Json<InviteLinkResponse>> {
    let group = load(&state, group_id).await?;
    if !group.is_admin(auth.id) {
        return Err(AppError::forbidden("Only admins can create invite links"));
    }

    let code = unique_invite_code(state.store.as_ref()).await?;
    match state.store.set_invite_code(group_id, &code).await {
        Ok(true) => {}
        Ok(false) => return Err(AppError::NotFound("Group")),
        Err(StoreError::Duplicate(_)) => {
            return Err(AppError::conflict("Invite code already in use"));
        }
        Err(e) => return Err(e.into()),
    }

    info!(group_id = %group_id, "Invite link generated");
    Ok(Json(InviteLinkResponse { invite_code: code }))
}

/// Join the group holding `code`.
/// POST /api/groups/join/{code}
#[tracing::instrument(skip(state))]
pub async fn join_by_code(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(code): Path<String>,
) -> AppResult<Json<Group>> {
    let mut group = state
        .store
        .find_group_by_invite_code(&code.to_uppercase())
        .await?
        .ok_or(AppError::NotFound("Invite code"))?;

    let member = group.admit_by_invite(auth.id)?;
    let group = insert_member(
        &state,
        group.id,
        &member,
        "You are already a member of this group",
    )
    .await?;

    info!(group_id = %group.id, user_id = %auth.id, "Joined group by invite");
    Ok(Json(group))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[test]
    fn test_invite_code_shape() {
        for _ in 0..32 {
            let code = generate_invite_code();
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[tokio::test]
    async fn test_unique_code_checks_store() {
        let store = MemoryStore::new();
        let code = unique_invite_code(&store).await.unwrap();
        assert!(!store.invite_code_exists(&code).await.unwrap());
    }
}
