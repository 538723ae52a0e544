//! Event Fanout
//!
//! Executes relay effects: resolves audiences through the presence registry
//! and the channel directory, then enqueues events on connection handles.
//! Delivery is best-effort. A missing or closed recipient is logged and the
//! event is dropped; callers never see an error.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use mm_common::UserStatus;
use tracing::{debug, info};
use uuid::Uuid;

use super::relay::{presence_broadcast, Audience, Delivery, Effect, Session};
use super::{ClientEvent, ServerEvent};
use crate::presence::{ConnectionHandle, PresenceRegistry};

/// Routes events to connections and group channels.
pub struct Fanout {
    presence: Arc<dyn PresenceRegistry>,
    /// Channel name -> subscribed connections keyed by connection id.
    channels: DashMap<String, HashMap<Uuid, ConnectionHandle>>,
}

impl Fanout {
    #[must_use]
    pub fn new(presence: Arc<dyn PresenceRegistry>) -> Self {
        Self {
            presence,
            channels: DashMap::new(),
        }
    }

    /// The presence registry backing user lookups.
    #[must_use]
    pub fn presence(&self) -> &Arc<dyn PresenceRegistry> {
        &self.presence
    }

    /// Register a new connection and announce it.
    ///
    /// The connection receives `ready` before the presence snapshot.
    pub async fn connect(&self, handle: ConnectionHandle) -> Session {
        let session = Session::new(handle.user_id(), handle.id());
        handle.send(ServerEvent::Ready {
            user_id: handle.user_id(),
        });
        self.presence.register(handle).await;

        info!(
            user_id = %session.user_id(),
            connection_id = %session.connection_id(),
            "WebSocket connected"
        );
        self.broadcast_presence(None).await;
        session
    }

    /// Close a session: stop typing indicators, leave channels, unregister.
    ///
    /// If a newer connection already replaced this one the user stays
    /// online and no presence change is broadcast.
    pub async fn disconnect(&self, session: &mut Session) {
        let connection_id = session.connection_id();
        let channels = session.channels().len();
        let typing = session.typing_to().len();
        for effect in session.close() {
            self.apply(None, connection_id, effect).await;
        }

        let user_id = session.user_id();
        if self.presence.unregister(user_id, connection_id).await {
            self.broadcast_presence(Some((user_id, UserStatus::Offline)))
                .await;
        }

        info!(
            user_id = %user_id,
            connection_id = %connection_id,
            channels,
            typing,
            "WebSocket disconnected"
        );
    }

    /// Handle one client event arriving on `origin`.
    pub async fn dispatch(
        &self,
        origin: &ConnectionHandle,
        session: &mut Session,
        event: ClientEvent,
    ) {
        let effects = session.handle(event);
        self.execute(origin, effects).await;
    }

    /// Carry out effects produced for the `origin` connection, in order.
    pub async fn execute(&self, origin: &ConnectionHandle, effects: Vec<Effect>) {
        for effect in effects {
            self.apply(Some(origin), origin.id(), effect).await;
        }
    }

    async fn apply(&self, origin: Option<&ConnectionHandle>, connection_id: Uuid, effect: Effect) {
        match effect {
            Effect::Deliver(delivery) => {
                self.deliver(origin, delivery).await;
            }
            Effect::Subscribe(channel) => {
                if let Some(origin) = origin {
                    self.subscribe(&channel, origin.clone());
                }
            }
            Effect::Unsubscribe(channel) => self.unsubscribe(&channel, connection_id),
            Effect::SetStatus(status) => {
                let Some(user_id) = origin.map(ConnectionHandle::user_id) else {
                    return;
                };
                if self.presence.set_status(user_id, status).await {
                    self.broadcast_presence(Some((user_id, status))).await;
                }
            }
        }
    }

    /// Deliver one event. Returns the number of connections it was queued on.
    pub async fn deliver(&self, origin: Option<&ConnectionHandle>, delivery: Delivery) -> usize {
        match delivery.audience {
            Audience::Origin => origin.map_or(0, |h| usize::from(h.send(delivery.event))),
            Audience::User(user_id) => usize::from(self.send_to_user(user_id, delivery.event).await),
            Audience::Channel(channel) => self.send_to_channel(&channel, &delivery.event),
            Audience::Everyone => self.broadcast(&delivery.event).await,
        }
    }

    /// Send to the user's current connection.
    ///
    /// Returns `false` if the user is offline or the event was dropped.
    pub async fn send_to_user(&self, user_id: Uuid, event: ServerEvent) -> bool {
        match self.presence.lookup(user_id).await {
            Some(handle) => handle.send(event),
            None => {
                debug!(user_id = %user_id, event = event.name(), "Recipient offline, dropping event");
                false
            }
        }
    }

    /// Send to every connection subscribed to `channel`.
    pub fn send_to_channel(&self, channel: &str, event: &ServerEvent) -> usize {
        // Snapshot the subscribers so no map guard is held while sending
        let subscribers: Vec<ConnectionHandle> = match self.channels.get(channel) {
            Some(members) => members.values().cloned().collect(),
            None => {
                debug!(channel = %channel, event = event.name(), "No subscribers");
                return 0;
            }
        };

        subscribers
            .iter()
            .filter(|handle| handle.send(event.clone()))
            .count()
    }

    /// Send to every connected client.
    pub async fn broadcast(&self, event: &ServerEvent) -> usize {
        self.presence
            .connections()
            .await
            .iter()
            .filter(|handle| handle.send(event.clone()))
            .count()
    }

    /// Number of connections subscribed to `channel`.
    #[must_use]
    pub fn channel_size(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |members| members.len())
    }

    async fn broadcast_presence(&self, changed: Option<(Uuid, UserStatus)>) {
        let snapshot = self.presence.list_online().await;
        for delivery in presence_broadcast(snapshot, changed) {
            self.deliver(None, delivery).await;
        }
    }

    fn subscribe(&self, channel: &str, handle: ConnectionHandle) {
        debug!(channel = %channel, user_id = %handle.user_id(), "Joined channel");
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(handle.id(), handle);
    }

    fn unsubscribe(&self, channel: &str, connection_id: Uuid) {
        if let Some(mut members) = self.channels.get_mut(channel) {
            members.remove(&connection_id);
        }
        self.channels.remove_if(channel, |_, members| members.is_empty());
        debug!(channel = %channel, connection_id = %connection_id, "Left channel");
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::presence::LocalPresence;

    fn fanout() -> Fanout {
        Fanout::new(Arc::new(LocalPresence::new()))
    }

    fn conn(user_id: Uuid) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (ConnectionHandle::new(user_id, tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_connect_sends_ready_then_snapshot() {
        let fanout = fanout();
        let user = Uuid::now_v7();
        let (handle, mut rx) = conn(user);

        fanout.connect(handle).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ServerEvent::Ready { user_id: user });
        assert!(matches!(&events[1], ServerEvent::GetOnlineUsers(list) if list.len() == 1));
    }

    #[tokio::test]
    async fn test_typing_reaches_only_target() {
        let fanout = fanout();
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let (ha, mut rxa) = conn(a);
        let (hb, mut rxb) = conn(b);
        let (hc, mut rxc) = conn(c);
        let mut sa = fanout.connect(ha.clone()).await;
        fanout.connect(hb).await;
        fanout.connect(hc).await;
        drain(&mut rxa);
        drain(&mut rxb);
        drain(&mut rxc);

        fanout
            .dispatch(&ha, &mut sa, ClientEvent::Typing { receiver_id: b })
            .await;

        assert_eq!(drain(&mut rxb), vec![ServerEvent::UserTyping { user_id: a }]);
        assert!(drain(&mut rxa).is_empty());
        assert!(drain(&mut rxc).is_empty());
    }

    #[tokio::test]
    async fn test_offline_recipient_is_dropped_silently() {
        let fanout = fanout();
        assert!(!fanout.send_to_user(Uuid::now_v7(), ServerEvent::Pong).await);
        assert_eq!(fanout.send_to_channel("nobody", &ServerEvent::Pong), 0);
    }

    #[tokio::test]
    async fn test_status_change_broadcasts_event_and_snapshot() {
        let fanout = fanout();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let (ha, mut rxa) = conn(a);
        let (hb, mut rxb) = conn(b);
        let mut sa = fanout.connect(ha.clone()).await;
        fanout.connect(hb).await;
        drain(&mut rxa);
        drain(&mut rxb);

        fanout
            .dispatch(
                &ha,
                &mut sa,
                ClientEvent::UpdateStatus {
                    status: UserStatus::Away,
                },
            )
            .await;

        let events = drain(&mut rxb);
        assert_eq!(
            events[0],
            ServerEvent::UserStatusChanged {
                user_id: a,
                status: UserStatus::Away
            }
        );
        match &events[1] {
            ServerEvent::GetOnlineUsers(list) => {
                let entry = list.iter().find(|e| e.user_id == a).unwrap();
                assert_eq!(entry.status, UserStatus::Away);
                assert_eq!(list.len(), 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(drain(&mut rxa).len(), 2);
    }

    #[tokio::test]
    async fn test_channel_join_receive_leave() {
        let fanout = fanout();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let (ha, mut rxa) = conn(a);
        let (hb, mut rxb) = conn(b);
        let mut sa = fanout.connect(ha.clone()).await;
        let mut sb = fanout.connect(hb.clone()).await;

        fanout
            .dispatch(&ha, &mut sa, ClientEvent::JoinGroup("g1".into()))
            .await;
        fanout
            .dispatch(&hb, &mut sb, ClientEvent::JoinGroup("g1".into()))
            .await;
        assert_eq!(fanout.channel_size("g1"), 2);
        drain(&mut rxa);
        drain(&mut rxb);

        assert_eq!(fanout.send_to_channel("g1", &ServerEvent::Pong), 2);

        fanout
            .dispatch(&hb, &mut sb, ClientEvent::LeaveGroup("g1".into()))
            .await;
        assert_eq!(fanout.send_to_channel("g1", &ServerEvent::Pong), 1);
        assert_eq!(drain(&mut rxa).len(), 2);
        assert_eq!(drain(&mut rxb).len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up_and_announces_offline() {
        let fanout = fanout();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let (ha, _rxa) = conn(a);
        let (hb, mut rxb) = conn(b);
        let mut sa = fanout.connect(ha.clone()).await;
        fanout.connect(hb).await;

        fanout
            .dispatch(&ha, &mut sa, ClientEvent::Typing { receiver_id: b })
            .await;
        fanout
            .dispatch(&ha, &mut sa, ClientEvent::JoinGroup("g1".into()))
            .await;
        drain(&mut rxb);

        fanout.disconnect(&mut sa).await;

        assert_eq!(fanout.channel_size("g1"), 0);
        assert!(fanout.presence().lookup(a).await.is_none());
        let events = drain(&mut rxb);
        assert_eq!(events[0], ServerEvent::UserStoppedTyping { user_id: a });
        assert_eq!(
            events[1],
            ServerEvent::UserStatusChanged {
                user_id: a,
                status: UserStatus::Offline
            }
        );
        assert!(matches!(&events[2], ServerEvent::GetOnlineUsers(list) if list.len() == 1));
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_newer_connection() {
        let fanout = fanout();
        let user = Uuid::now_v7();
        let (old, _rx_old) = conn(user);
        let (new, mut rx_new) = conn(user);

        let mut old_session = fanout.connect(old).await;
        fanout.connect(new.clone()).await;
        drain(&mut rx_new);

        fanout.disconnect(&mut old_session).await;

        assert_eq!(
            fanout.presence().lookup(user).await.map(|h| h.id()),
            Some(new.id())
        );
        assert!(drain(&mut rx_new).is_empty());
    }
}
