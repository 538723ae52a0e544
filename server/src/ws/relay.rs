//! Socket Event Relay
//!
//! Per-connection session state and the pure mapping
//! `(session, client event) -> effects`. Nothing here touches the network;
//! [`super::Fanout`] carries effects out.

use std::collections::HashSet;

use mm_common::{PresenceEntry, UserStatus};
use uuid::Uuid;

use super::{ClientEvent, ServerEvent};

/// Who an outbound event is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// The connection the client event arrived on.
    Origin,
    /// The user's current connection, if any.
    User(Uuid),
    /// Every connection subscribed to the named channel.
    Channel(String),
    /// Every connected client.
    Everyone,
}

/// One event bound for an audience.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub audience: Audience,
    pub event: ServerEvent,
}

impl Delivery {
    #[must_use]
    pub const fn new(audience: Audience, event: ServerEvent) -> Self {
        Self { audience, event }
    }
}

/// Side effect requested by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Deliver(Delivery),
    /// Join the origin connection to a channel.
    Subscribe(String),
    /// Remove the origin connection from a channel.
    Unsubscribe(String),
    /// Record a new status for the session's user and broadcast presence.
    SetStatus(UserStatus),
}

/// State of one authenticated connection.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: Uuid,
    connection_id: Uuid,
    channels: HashSet<String>,
    typing_to: HashSet<Uuid>,
}

impl Session {
    #[must_use]
    pub fn new(user_id: Uuid, connection_id: Uuid) -> Self {
        Self {
            user_id,
            connection_id,
            channels: HashSet::new(),
            typing_to: HashSet::new(),
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> Uuid {
        self.user_id
    }

    #[must_use]
    pub const fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Channels this connection has joined.
    #[must_use]
    pub const fn channels(&self) -> &HashSet<String> {
        &self.channels
    }

    /// Users this connection is currently typing to.
    #[must_use]
    pub const fn typing_to(&self) -> &HashSet<Uuid> {
        &self.typing_to
    }

    /// Apply one client event.
    ///
    /// Channel membership is not checked here: any connection may join any
    /// channel name. Group authorization happens when a message is sent.
    pub fn handle(&mut self, event: ClientEvent) -> Vec<Effect> {
        let user_id = self.user_id;
        match event {
            ClientEvent::Ping => vec![deliver(Audience::Origin, ServerEvent::Pong)],

            ClientEvent::UpdateStatus { status } => vec![Effect::SetStatus(status)],

            ClientEvent::Typing { receiver_id } => {
                self.typing_to.insert(receiver_id);
                vec![deliver(
                    Audience::User(receiver_id),
                    ServerEvent::UserTyping { user_id },
                )]
            }

            ClientEvent::StopTyping { receiver_id } => {
                self.typing_to.remove(&receiver_id);
                vec![deliver(
                    Audience::User(receiver_id),
                    ServerEvent::UserStoppedTyping { user_id },
                )]
            }

            ClientEvent::MessageReaction {
                message_id,
                reaction,
                receiver_id,
            } => vec![deliver(
                Audience::User(receiver_id),
                ServerEvent::NewReaction {
                    message_id,
                    reaction,
                    user_id,
                },
            )],

            ClientEvent::MessageRead {
                message_id,
                receiver_id,
            } => vec![deliver(
                Audience::User(receiver_id),
                ServerEvent::MessageReadBy {
                    message_id,
                    user_id,
                },
            )],

            ClientEvent::JoinGroup(channel) => {
                if self.channels.insert(channel.clone()) {
                    vec![Effect::Subscribe(channel)]
                } else {
                    Vec::new()
                }
            }

            ClientEvent::LeaveGroup(channel) => {
                if self.channels.remove(&channel) {
                    vec![Effect::Unsubscribe(channel)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Tear the session down: stop every typing indicator and leave every
    /// channel.
    pub fn close(&mut self) -> Vec<Effect> {
        let user_id = self.user_id;
        let mut typing: Vec<Uuid> = self.typing_to.drain().collect();
        typing.sort_unstable();
        let mut channels: Vec<String> = self.channels.drain().collect();
        channels.sort_unstable();

        typing
            .into_iter()
            .map(|receiver| {
                deliver(
                    Audience::User(receiver),
                    ServerEvent::UserStoppedTyping { user_id },
                )
            })
            .chain(channels.into_iter().map(Effect::Unsubscribe))
            .collect()
    }
}

fn deliver(audience: Audience, event: ServerEvent) -> Effect {
    Effect::Deliver(Delivery::new(audience, event))
}

/// Deliveries announcing a presence change to every client.
///
/// Status-only changes (including going offline) also carry the individual
/// `userStatusChanged` event ahead of the snapshot.
#[must_use]
pub fn presence_broadcast(
    snapshot: Vec<PresenceEntry>,
    changed: Option<(Uuid, UserStatus)>,
) -> Vec<Delivery> {
    let mut out = Vec::with_capacity(2);
    if let Some((user_id, status)) = changed {
        out.push(Delivery::new(
            Audience::Everyone,
            ServerEvent::UserStatusChanged { user_id, status },
        ));
    }
    out.push(Delivery::new(
        Audience::Everyone,
        ServerEvent::GetOnlineUsers(snapshot),
    ));
    out
}
