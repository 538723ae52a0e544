//! In-Memory Store
//!
//! `DashMap`-backed [`Store`] for development and tests. Nothing survives a
//! restart.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    AppendOutcome, Group, GroupMember, GroupRole, Message, ReadReceipt, Reaction, Store,
    StoreError, StoreResult, User,
};

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    messages: DashMap<Uuid, Message>,
    groups: DashMap<Uuid, Group>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_messages(&self, keep: impl Fn(&Message) -> bool) -> Vec<Message> {
        let mut out: Vec<Message> = self
            .messages
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        out
    }

    /// Whether another group already holds `code`.
    fn invite_code_taken(&self, code: &str, except: Uuid) -> bool {
        self.groups
            .iter()
            .any(|g| g.id != except && g.invite_code.as_deref() == Some(code))
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        if self.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate("username"));
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn list_users_except(&self, id: Uuid) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.id != id)
            .map(|u| u.clone())
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn insert_message(&self, message: &Message) -> StoreResult<()> {
        self.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        Ok(self.messages.get(&id).map(|m| m.clone()))
    }

    async fn update_message_content(&self, message: &Message) -> StoreResult<Option<Message>> {
        Ok(self.messages.get_mut(&message.id).map(|mut stored| {
            stored.content.clone_from(&message.content);
            stored.has_profanity = message.has_profanity;
            stored.is_image_only = message.is_image_only;
            stored.is_edited = true;
            stored.updated_at = message.updated_at;
            stored.clone()
        }))
    }

    async fn add_reaction(
        &self,
        message_id: Uuid,
        reaction: &Reaction,
    ) -> StoreResult<Option<AppendOutcome>> {
        Ok(self.messages.get_mut(&message_id).map(|mut stored| {
            let added = !stored.reactions.contains(reaction);
            if added {
                stored.reactions.push(reaction.clone());
                stored.updated_at = Utc::now();
            }
            AppendOutcome {
                message: stored.clone(),
                added,
            }
        }))
    }

    async fn add_read_receipt(
        &self,
        message_id: Uuid,
        receipt: &ReadReceipt,
    ) -> StoreResult<Option<AppendOutcome>> {
        Ok(self.messages.get_mut(&message_id).map(|mut stored| {
            let added = !stored.read_by.iter().any(|r| r.user_id == receipt.user_id);
            if added {
                stored.read_by.push(receipt.clone());
                stored.updated_at = receipt.read_at;
            }
            AppendOutcome {
                message: stored.clone(),
                added,
            }
        }))
    }

    async fn delete_message(&self, id: Uuid) -> StoreResult<bool> {
        if self.messages.remove(&id).is_none() {
            return Ok(false);
        }
        for mut reply in self.messages.iter_mut() {
            if reply.reply_to == Some(id) {
                reply.reply_to = None;
            }
        }
        Ok(true)
    }

    async fn list_group_messages(&self, group_id: Uuid) -> StoreResult<Vec<Message>> {
        Ok(self.collect_messages(|m| m.recipient.group_id() == Some(group_id)))
    }

    async fn list_direct_messages(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<Message>> {
        Ok(self.collect_messages(|m| m.is_direct_between(a, b)))
    }

    async fn insert_group(&self, group: &Group) -> StoreResult<()> {
        if let Some(code) = &group.invite_code {
            if self.invite_code_taken(code, group.id) {
                return Err(StoreError::Duplicate("invite code"));
            }
        }
        self.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn find_group(&self, id: Uuid) -> StoreResult<Option<Group>> {
        Ok(self.groups.get(&id).map(|g| g.clone()))
    }

    async fn find_group_by_invite_code(&self, code: &str) -> StoreResult<Option<Group>> {
        Ok(self
            .groups
            .iter()
            .find(|g| g.invite_code.as_deref() == Some(code))
            .map(|g| g.clone()))
    }

    async fn invite_code_exists(&self, code: &str) -> StoreResult<bool> {
        Ok(self.invite_code_taken(code, Uuid::nil()))
    }

    async fn update_group_info(&self, group: &Group) -> StoreResult<bool> {
        Ok(match self.groups.get_mut(&group.id) {
            Some(mut stored) => {
                stored.name.clone_from(&group.name);
                stored.description.clone_from(&group.description);
                stored.picture_url.clone_from(&group.picture_url);
                stored.settings = group.settings;
                stored.updated_at = group.updated_at;
                true
            }
            None => false,
        })
    }

    async fn set_invite_code(&self, group_id: Uuid, code: &str) -> StoreResult<bool> {
        if self.invite_code_taken(code, group_id) {
            return Err(StoreError::Duplicate("invite code"));
        }
        Ok(match self.groups.get_mut(&group_id) {
            Some(mut stored) => {
                stored.invite_code = Some(code.to_string());
                stored.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn add_group_member(
        &self,
        group_id: Uuid,
        member: &GroupMember,
    ) -> StoreResult<Option<Group>> {
        let Some(mut stored) = self.groups.get_mut(&group_id) else {
            return Ok(None);
        };
        if stored.members.iter().any(|m| m.user_id == member.user_id) {
            return Ok(None);
        }
        stored.members.push(member.clone());
        stored.updated_at = member.joined_at;
        Ok(Some(stored.clone()))
    }

    async fn remove_group_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Group>> {
        let Some(mut stored) = self.groups.get_mut(&group_id) else {
            return Ok(None);
        };
        let before = stored.members.len();
        stored.members.retain(|m| m.user_id != user_id);
        if stored.members.len() == before {
            return Ok(None);
        }
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn set_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role: GroupRole,
    ) -> StoreResult<Option<Group>> {
        let Some(mut stored) = self.groups.get_mut(&group_id) else {
            return Ok(None);
        };
        let Some(member) = stored.members.iter_mut().find(|m| m.user_id == user_id) else {
            return Ok(None);
        };
        member.role = role;
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn delete_group(&self, id: Uuid) -> StoreResult<bool> {
        let removed = self.groups.remove(&id).is_some();
        if removed {
            self.messages
                .retain(|_, m| m.recipient.group_id() != Some(id));
        }
        Ok(removed)
    }

    async fn list_groups_for_member(&self, user_id: Uuid) -> StoreResult<Vec<Group>> {
        let mut groups: Vec<Group> = self
            .groups
            .iter()
            .filter(|g| g.members.iter().any(|m| m.user_id == user_id))
            .map(|g| g.clone())
            .collect();
        groups.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::db::{GroupSettings, Recipient};

    fn group(creator: Uuid, code: Option<&str>) -> Group {
        let now = Utc::now();
        Group {
            id: Uuid::now_v7(),
            name: "g".into(),
            description: String::new(),
            creator_id: creator,
            members: Vec::new(),
            picture_url: None,
            settings: GroupSettings::default(),
            invite_code: code.map(str::to_string),
            pinned_messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_direct_messages_both_directions_in_order() {
        let store = MemoryStore::new();
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

        let mut first = Message::new(a, Recipient::User(b), "first");
        let mut second = Message::new(b, Recipient::User(a), "second");
        let other = Message::new(a, Recipient::User(c), "elsewhere");
        first.created_at = Utc::now() - Duration::seconds(10);
        second.created_at = Utc::now();

        // Insert out of order
        store.insert_message(&second).await.unwrap();
        store.insert_message(&other).await.unwrap();
        store.insert_message(&first).await.unwrap();

        let history = store.list_direct_messages(a, b).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_invite_code_uniqueness() {
        let store = MemoryStore::new();
        let creator = Uuid::now_v7();

        store.insert_group(&group(creator, Some("ABCD1234"))).await.unwrap();
        let err = store
            .insert_group(&group(creator, Some("ABCD1234")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("invite code")));

        let other = group(creator, None);
        store.insert_group(&other).await.unwrap();
        let err = store.set_invite_code(other.id, "ABCD1234").await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("invite code")));
        assert!(store.set_invite_code(other.id, "0000FFFF").await.unwrap());

        assert!(store.invite_code_exists("ABCD1234").await.unwrap());
        assert!(!store.invite_code_exists("FFFFFFFF").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_group_removes_its_messages() {
        let store = MemoryStore::new();
        let creator = Uuid::now_v7();
        let g = group(creator, None);
        store.insert_group(&g).await.unwrap();

        let msg = Message::new(creator, Recipient::Group(g.id), "hi");
        store.insert_message(&msg).await.unwrap();

        assert!(store.delete_group(g.id).await.unwrap());
        assert!(store.find_message(msg.id).await.unwrap().is_none());
        assert!(!store.delete_group(g.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_message_returns_none() {
        let store = MemoryStore::new();
        let msg = Message::new(Uuid::now_v7(), Recipient::User(Uuid::now_v7()), "x");
        assert!(store.update_message_content(&msg).await.unwrap().is_none());
        let receipt = ReadReceipt {
            user_id: Uuid::now_v7(),
            read_at: Utc::now(),
        };
        assert!(store.add_read_receipt(msg.id, &receipt).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_content_update_keeps_appended_lists() {
        let store = MemoryStore::new();
        let (sender, receiver) = (Uuid::now_v7(), Uuid::now_v7());
        let msg = Message::new(sender, Recipient::User(receiver), "before");
        store.insert_message(&msg).await.unwrap();

        // Edit works from a copy loaded before the receipt landed
        let mut stale = store.find_message(msg.id).await.unwrap().unwrap();
        let receipt = ReadReceipt {
            user_id: receiver,
            read_at: Utc::now(),
        };
        assert!(store.add_read_receipt(msg.id, &receipt).await.unwrap().unwrap().added);

        stale.content = "after".into();
        let stored = store.update_message_content(&stale).await.unwrap().unwrap();
        assert_eq!(stored.content, "after");
        assert!(stored.is_edited);
        assert_eq!(stored.read_by, vec![receipt]);
    }

    #[tokio::test]
    async fn test_appends_are_idempotent() {
        let store = MemoryStore::new();
        let (sender, receiver) = (Uuid::now_v7(), Uuid::now_v7());
        let msg = Message::new(sender, Recipient::User(receiver), "hi");
        store.insert_message(&msg).await.unwrap();

        let thumbs = Reaction {
            emoji: "👍".into(),
            user_id: receiver,
        };
        assert!(store.add_reaction(msg.id, &thumbs).await.unwrap().unwrap().added);
        let again = store.add_reaction(msg.id, &thumbs).await.unwrap().unwrap();
        assert!(!again.added);
        assert_eq!(again.message.reactions.len(), 1);

        let heart = Reaction {
            emoji: "❤️".into(),
            user_id: receiver,
        };
        let outcome = store.add_reaction(msg.id, &heart).await.unwrap().unwrap();
        assert!(outcome.added);
        assert_eq!(outcome.message.reactions.len(), 2);

        let first = ReadReceipt {
            user_id: receiver,
            read_at: Utc::now(),
        };
        let second = ReadReceipt {
            user_id: receiver,
            read_at: Utc::now() + Duration::seconds(5),
        };
        assert!(store.add_read_receipt(msg.id, &first).await.unwrap().unwrap().added);
        let outcome = store.add_read_receipt(msg.id, &second).await.unwrap().unwrap();
        assert!(!outcome.added);
        assert_eq!(outcome.message.read_by, vec![first]);
    }

    #[tokio::test]
    async fn test_delete_message_clears_replies() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let original = Message::new(a, Recipient::User(b), "question");
        let mut reply = Message::new(b, Recipient::User(a), "answer");
        reply.reply_to = Some(original.id);
        store.insert_message(&original).await.unwrap();
        store.insert_message(&reply).await.unwrap();

        assert!(store.delete_message(original.id).await.unwrap());
        let reply = store.find_message(reply.id).await.unwrap().unwrap();
        assert_eq!(reply.reply_to, None);
        assert!(!store.delete_message(original.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_member_changes_apply_to_stored_list() {
        let store = MemoryStore::new();
        let creator = Uuid::now_v7();
        let g = group(creator, None);
        store.insert_group(&g).await.unwrap();

        // Two callers holding the same stale copy each add a member
        let (first, second) = (Uuid::now_v7(), Uuid::now_v7());
        for user_id in [first, second] {
            let member = GroupMember {
                user_id,
                role: GroupRole::Member,
                joined_at: Utc::now(),
            };
            assert!(store.add_group_member(g.id, &member).await.unwrap().is_some());
        }
        let stored = store.find_group(g.id).await.unwrap().unwrap();
        assert_eq!(stored.members.len(), 2);

        let duplicate = stored.members[0].clone();
        assert!(store.add_group_member(g.id, &duplicate).await.unwrap().is_none());

        let promoted = store
            .set_member_role(g.id, second, GroupRole::Admin)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(promoted.members[1].role, GroupRole::Admin);

        let remaining = store.remove_group_member(g.id, first).await.unwrap().unwrap();
        assert_eq!(remaining.members.len(), 1);
        assert_eq!(remaining.members[0].user_id, second);
        assert!(store.remove_group_member(g.id, first).await.unwrap().is_none());
        assert!(store
            .set_member_role(Uuid::now_v7(), second, GroupRole::Member)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_info_update_leaves_members() {
        let store = MemoryStore::new();
        let creator = Uuid::now_v7();
        let mut stale = group(creator, None);
        store.insert_group(&stale).await.unwrap();

        let member = GroupMember {
            user_id: Uuid::now_v7(),
            role: GroupRole::Member,
            joined_at: Utc::now(),
        };
        store.add_group_member(stale.id, &member).await.unwrap();

        stale.name = "renamed".into();
        assert!(store.update_group_info(&stale).await.unwrap());
        let stored = store.find_group(stale.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "renamed");
        assert_eq!(stored.members, vec![member]);
    }
}
