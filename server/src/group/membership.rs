//! Group Membership Rules
//!
//! Role checks and membership transitions on a loaded [`Group`]. Nothing
//! here touches the store; callers apply the same change to the stored
//! member list afterwards.
//!
//! The creator is not a role. It is an immutable attribute that grants
//! admin-equivalent rights and can never be removed.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::db::{Group, GroupMember, GroupRole, GroupSettings};
use crate::error::{AppError, AppResult};

impl Group {
    /// New group with the creator as its first admin.
    ///
    /// `members` are added with role `member`; duplicates and the creator
    /// are skipped.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        creator_id: Uuid,
        members: &[Uuid],
        settings: GroupSettings,
    ) -> Self {
        let now = Utc::now();
        let mut group = Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: description.into(),
            creator_id,
            members: vec![GroupMember {
                user_id: creator_id,
                role: GroupRole::Admin,
                joined_at: now,
            }],
            picture_url: None,
            settings,
            invite_code: None,
            pinned_messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        for &user_id in members {
            if !group.is_member(user_id) {
                group.push_member(user_id, GroupRole::Member);
            }
        }
        group
    }

    #[must_use]
    pub fn member(&self, user_id: Uuid) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    #[must_use]
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.member(user_id).is_some()
    }

    /// Creator, or a member holding the admin role.
    #[must_use]
    pub fn is_admin(&self, user_id: Uuid) -> bool {
        user_id == self.creator_id
            || self
                .member(user_id)
                .is_some_and(|m| m.role == GroupRole::Admin)
    }

    #[must_use]
    pub fn can_send(&self, user_id: Uuid) -> bool {
        self.is_member(user_id) && (!self.settings.only_admins_can_message || self.is_admin(user_id))
    }

    #[must_use]
    pub fn can_edit_info(&self, user_id: Uuid) -> bool {
        self.is_member(user_id)
            && (!self.settings.only_admins_can_edit_info || self.is_admin(user_id))
    }

    #[must_use]
    pub fn can_add_members(&self, user_id: Uuid) -> bool {
        self.is_member(user_id)
            && (!self.settings.only_admins_can_add_members || self.is_admin(user_id))
    }

    #[must_use]
    pub fn can_delete(&self, user_id: Uuid) -> bool {
        self.is_admin(user_id)
    }

    /// Add `user_id` as a member on behalf of `requester`.
    pub fn add_member(&mut self, requester: Uuid, user_id: Uuid) -> AppResult<GroupMember> {
        if !self.can_add_members(requester) {
            return Err(AppError::forbidden("Only admins can add members"));
        }
        if self.is_member(user_id) {
            return Err(AppError::conflict("User is already a member"));
        }
        Ok(self.push_member(user_id, GroupRole::Member))
    }

    /// Remove `user_id` on behalf of an admin `requester`.
    pub fn remove_member(&mut self, requester: Uuid, user_id: Uuid) -> AppResult<()> {
        if !self.is_admin(requester) {
            return Err(AppError::forbidden("Only admins can remove members"));
        }
        if user_id == self.creator_id {
            return Err(AppError::forbidden("The group creator cannot be removed"));
        }
        self.drop_member(user_id)
    }

    /// Set the role of `user_id` on behalf of an admin `requester`.
    ///
    /// Demoting the last admin is allowed; the creator keeps admin rights
    /// regardless.
    pub fn change_role(&mut self, requester: Uuid, user_id: Uuid, role: GroupRole) -> AppResult<()> {
        if !self.is_admin(requester) {
            return Err(AppError::forbidden("Only admins can change roles"));
        }
        let member = self
            .members
            .iter_mut()
            .find(|m| m.user_id == user_id)
            .ok_or(AppError::NotFound("Member"))?;
        member.role = role;
        self.updated_at = Utc::now();

        if !self.members.iter().any(|m| m.role == GroupRole::Admin) {
            warn!(
                group_id = %self.id,
                user_id = %user_id,
                "Last admin role removed; only the creator keeps admin rights"
            );
        }
        Ok(())
    }

    /// Leave the group. The creator cannot leave.
    pub fn leave(&mut self, user_id: Uuid) -> AppResult<()> {
        if user_id == self.creator_id {
            return Err(AppError::forbidden(
                "The group creator cannot leave; delete the group instead",
            ));
        }
        self.drop_member(user_id)
    }

    /// Admit `user_id` through an invite code.
    pub fn admit_by_invite(&mut self, user_id: Uuid) -> AppResult<GroupMember> {
        if self.is_member(user_id) {
            return Err(AppError::conflict("You are already a member of this group"));
        }
        Ok(self.push_member(user_id, GroupRole::Member))
    }

    fn push_member(&mut self, user_id: Uuid, role: GroupRole) -> GroupMember {
        let now = Utc::now();
        let member = GroupMember {
            user_id,
            role,
            joined_at: now,
        };
        self.members.push(member.clone());
        self.updated_at = now;
        member
    }

    fn drop_member(&mut self, user_id: Uuid) -> AppResult<()> {
        let before = self.members.len();
        self.members.retain(|m| m.user_id != user_id);
        if self.members.len() == before {
            return Err(AppError::NotFound("Member"));
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}
