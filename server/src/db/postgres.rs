//! `PostgreSQL` Store
//!
//! Runtime queries (no compile-time `DATABASE_URL` required).
//!
//! Nested lists (members, reactions, read receipts, attachments) live in
//! JSONB columns. All query functions log failures with context before
//! propagating them.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{error, info};
use uuid::Uuid;

use super::{
    AppendOutcome, Attachment, Group, GroupMember, GroupRole, GroupSettings, Message,
    ReadReceipt, Reaction, Recipient, Store, StoreError, StoreResult, User,
};

/// Log and return a database error with context.
macro_rules! db_error {
    ($query:expr, $($field:tt)*) => {
        |e| {
            error!(query = $query, $($field)*, error = %e, "Database query failed");
            e
        }
    };
}

const UNIQUE_VIOLATION: &str = "23505";

/// Map a unique-constraint violation to [`StoreError::Duplicate`].
fn map_unique(err: sqlx::Error, what: &'static str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Duplicate(what)
        }
        _ => StoreError::Database(err),
    }
}

/// `PostgreSQL`-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create the connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(20)
            // Prevent hanging requests on pool exhaustion
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    display_name: String,
    avatar_url: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Option<Uuid>,
    group_id: Option<Uuid>,
    content: String,
    image: Option<String>,
    attachments: Json<Vec<Attachment>>,
    is_encrypted: bool,
    is_image_only: bool,
    password: Option<String>,
    has_profanity: bool,
    is_edited: bool,
    is_pinned: bool,
    reactions: Json<Vec<Reaction>>,
    read_by: Json<Vec<ReadReceipt>>,
    reply_to: Option<Uuid>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> StoreResult<Self> {
        let recipient = Recipient::from_parts(row.receiver_id, row.group_id)
            .map_err(|e| StoreError::Corrupt(format!("message {}: {e}", row.id)))?;

        Ok(Self {
            id: row.id,
            sender_id: row.sender_id,
            recipient,
            content: row.content,
            image: row.image,
            attachments: row.attachments.0,
            is_encrypted: row.is_encrypted,
            is_image_only: row.is_image_only,
            password: row.password,
            has_profanity: row.has_profanity,
            is_edited: row.is_edited,
            is_pinned: row.is_pinned,
            reactions: row.reactions.0,
            read_by: row.read_by.0,
            reply_to: row.reply_to,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct GroupRow {
    id: Uuid,
    name: String,
    description: String,
    creator_id: Uuid,
    members: Json<Vec<GroupMember>>,
    picture_url: Option<String>,
    settings: Json<GroupSettings>,
    invite_code: Option<String>,
    pinned_messages: Json<Vec<Uuid>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            creator_id: row.creator_id,
            members: row.members.0,
            picture_url: row.picture_url,
            settings: row.settings.0,
            invite_code: row.invite_code,
            pinned_messages: row.pinned_messages.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn into_messages(rows: Vec<MessageRow>) -> StoreResult<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

/// Containment needle matching any list entry for `user_id`.
fn user_needle(user_id: Uuid) -> Json<serde_json::Value> {
    Json(serde_json::json!([{ "userId": user_id }]))
}

impl PgStore {
    /// Finish a conditional append: a row back means the entry was added,
    /// otherwise report the current record unchanged.
    async fn append_outcome(
        &self,
        message_id: Uuid,
        appended: Option<MessageRow>,
    ) -> StoreResult<Option<AppendOutcome>> {
        if let Some(row) = appended {
            return Ok(Some(AppendOutcome {
                message: row.try_into()?,
                added: true,
            }));
        }
        Ok(self
            .find_message(message_id)
            .await?
            .map(|message| AppendOutcome {
                message,
                added: false,
            }))
    }
}

// ============================================================================
// Store implementation
// ============================================================================

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO users (id, username, display_name, avatar_url, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(user.status.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "username"))?;
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error!("find_user", user_id = %id))?
            .map(User::try_from)
            .transpose()
    }

    async fn list_users_except(&self, id: Uuid) -> StoreResult<Vec<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id <> $1 ORDER BY username")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error!("list_users_except", user_id = %id))?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    async fn insert_message(&self, m: &Message) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO messages (
                id, sender_id, receiver_id, group_id, content, image, attachments,
                is_encrypted, is_image_only, password, has_profanity, is_edited, is_pinned,
                reactions, read_by, reply_to, expires_at, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            ",
        )
        .bind(m.id)
        .bind(m.sender_id)
        .bind(m.recipient.receiver_id())
        .bind(m.recipient.group_id())
        .bind(&m.content)
        .bind(&m.image)
        .bind(Json(&m.attachments))
        .bind(m.is_encrypted)
        .bind(m.is_image_only)
        .bind(&m.password)
        .bind(m.has_profanity)
        .bind(m.is_edited)
        .bind(m.is_pinned)
        .bind(Json(&m.reactions))
        .bind(Json(&m.read_by))
        .bind(m.reply_to)
        .bind(m.expires_at)
        .bind(m.created_at)
        .bind(m.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error!("insert_message", message_id = %m.id))?;
        Ok(())
    }

    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error!("find_message", message_id = %id))?
            .map(Message::try_from)
            .transpose()
    }

    async fn update_message_content(&self, m: &Message) -> StoreResult<Option<Message>> {
        sqlx::query_as::<_, MessageRow>(
            r"
            UPDATE messages SET
                content = $2, has_profanity = $3, is_image_only = $4,
                is_edited = TRUE, updated_at = $5
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(m.id)
        .bind(&m.content)
        .bind(m.has_profanity)
        .bind(m.is_image_only)
        .bind(m.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error!("update_message_content", message_id = %m.id))?
        .map(Message::try_from)
        .transpose()
    }

    async fn add_reaction(
        &self,
        message_id: Uuid,
        reaction: &Reaction,
    ) -> StoreResult<Option<AppendOutcome>> {
        // The row lock makes the containment check and the append one step
        let appended = sqlx::query_as::<_, MessageRow>(
            r"
            UPDATE messages SET reactions = reactions || $2, updated_at = $3
            WHERE id = $1 AND NOT reactions @> $2
            RETURNING *
            ",
        )
        .bind(message_id)
        .bind(Json([reaction]))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error!("add_reaction", message_id = %message_id))?;
        self.append_outcome(message_id, appended).await
    }

    async fn add_read_receipt(
        &self,
        message_id: Uuid,
        receipt: &ReadReceipt,
    ) -> StoreResult<Option<AppendOutcome>> {
        let appended = sqlx::query_as::<_, MessageRow>(
            r"
            UPDATE messages SET read_by = read_by || $2, updated_at = $3
            WHERE id = $1 AND NOT read_by @> $4
            RETURNING *
            ",
        )
        .bind(message_id)
        .bind(Json([receipt]))
        .bind(receipt.read_at)
        .bind(user_needle(receipt.user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error!("add_read_receipt", message_id = %message_id))?;
        self.append_outcome(message_id, appended).await
    }

    async fn delete_message(&self, id: Uuid) -> StoreResult<bool> {
        // messages.reply_to is ON DELETE SET NULL
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error!("delete_message", message_id = %id))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_group_messages(&self, group_id: Uuid) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE group_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error!("list_group_messages", group_id = %group_id))?;
        into_messages(rows)
    }

    async fn list_direct_messages(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r"
            SELECT * FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(a)
        .bind(b)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error!("list_direct_messages", user_a = %a, user_b = %b))?;
        into_messages(rows)
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    async fn insert_group(&self, g: &Group) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO groups (
                id, name, description, creator_id, members, picture_url, settings,
                invite_code, pinned_messages, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(g.id)
        .bind(&g.name)
        .bind(&g.description)
        .bind(g.creator_id)
        .bind(Json(&g.members))
        .bind(&g.picture_url)
        .bind(Json(&g.settings))
        .bind(&g.invite_code)
        .bind(Json(&g.pinned_messages))
        .bind(g.created_at)
        .bind(g.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "invite code"))?;
        Ok(())
    }

    async fn find_group(&self, id: Uuid) -> StoreResult<Option<Group>> {
        Ok(sqlx::query_as::<_, GroupRow>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error!("find_group", group_id = %id))?
            .map(Group::from))
    }

    async fn find_group_by_invite_code(&self, code: &str) -> StoreResult<Option<Group>> {
        Ok(
            sqlx::query_as::<_, GroupRow>("SELECT * FROM groups WHERE invite_code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error!("find_group_by_invite_code", code = %code))?
                .map(Group::from),
        )
    }

    async fn invite_code_exists(&self, code: &str) -> StoreResult<bool> {
        let result: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM groups WHERE invite_code = $1)")
                .bind(code)
                .fetch_one(&self.pool)
                .await?;
        Ok(result.0)
    }

    async fn update_group_info(&self, g: &Group) -> StoreResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE groups SET
                name = $2, description = $3, picture_url = $4, settings = $5, updated_at = $6
            WHERE id = $1
            ",
        )
        .bind(g.id)
        .bind(&g.name)
        .bind(&g.description)
        .bind(&g.picture_url)
        .bind(Json(&g.settings))
        .bind(g.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error!("update_group_info", group_id = %g.id))?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_invite_code(&self, group_id: Uuid, code: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE groups SET invite_code = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(group_id)
        .bind(code)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "invite code"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_group_member(
        &self,
        group_id: Uuid,
        member: &GroupMember,
    ) -> StoreResult<Option<Group>> {
        Ok(sqlx::query_as::<_, GroupRow>(
            r"
            UPDATE groups SET members = members || $2, updated_at = $3
            WHERE id = $1 AND NOT members @> $4
            RETURNING *
            ",
        )
        .bind(group_id)
        .bind(Json([member]))
        .bind(member.joined_at)
        .bind(user_needle(member.user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error!("add_group_member", group_id = %group_id, user_id = %member.user_id))?
        .map(Group::from))
    }

    async fn remove_group_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Group>> {
        Ok(sqlx::query_as::<_, GroupRow>(
            r"
            UPDATE groups SET
                members = COALESCE(
                    (
                        SELECT jsonb_agg(e.m ORDER BY e.ord)
                        FROM jsonb_array_elements(members) WITH ORDINALITY AS e(m, ord)
                        WHERE e.m->>'userId' <> $2
                    ),
                    '[]'::jsonb
                ),
                updated_at = $3
            WHERE id = $1 AND members @> $4
            RETURNING *
            ",
        )
        .bind(group_id)
        .bind(user_id.to_string())
        .bind(Utc::now())
        .bind(user_needle(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error!("remove_group_member", group_id = %group_id, user_id = %user_id))?
        .map(Group::from))
    }

    async fn set_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role: GroupRole,
    ) -> StoreResult<Option<Group>> {
        Ok(sqlx::query_as::<_, GroupRow>(
            r"
            UPDATE groups SET
                members = (
                    SELECT jsonb_agg(
                        CASE WHEN e.m->>'userId' = $2 THEN jsonb_set(e.m, '{role}', $3) ELSE e.m END
                        ORDER BY e.ord
                    )
                    FROM jsonb_array_elements(members) WITH ORDINALITY AS e(m, ord)
                ),
                updated_at = $4
            WHERE id = $1 AND members @> $5
            RETURNING *
            ",
        )
        .bind(group_id)
        .bind(user_id.to_string())
        .bind(Json(role))
        .bind(Utc::now())
        .bind(user_needle(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error!("set_member_role", group_id = %group_id, user_id = %user_id))?
        .map(Group::from))
    }

    async fn delete_group(&self, id: Uuid) -> StoreResult<bool> {
        // messages.group_id cascades
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error!("delete_group", group_id = %id))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_groups_for_member(&self, user_id: Uuid) -> StoreResult<Vec<Group>> {
        Ok(sqlx::query_as::<_, GroupRow>(
            "SELECT * FROM groups WHERE members @> $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(user_needle(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error!("list_groups_for_member", user_id = %user_id))?
        .into_iter()
        .map(Group::from)
        .collect())
    }
}
