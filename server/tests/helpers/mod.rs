//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for building and sending requests through the full axum
//! router over the in-memory store, plus utilities for seeding users, issuing
//! tokens and observing real-time events without a socket.
//!
//! ## Test Servers
//!
//! Use [`spawn_test_server()`] when a test needs a real listener (WebSocket
//! upgrades) instead of `tower::ServiceExt::oneshot`.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{self, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use mm_server::api::{create_router, AppState};
use mm_server::auth::jwt;
use mm_server::config::Config;
use mm_server::db::{MemoryStore, Store, User};
use mm_server::moderation::ProfanityFilter;
use mm_server::presence::{ConnectionHandle, LocalPresence};
use mm_server::ws::{relay::Session, ClientEvent, Fanout, ServerEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;

/// Token lifetime for test users.
const TOKEN_EXPIRY_SECONDS: i64 = 3600;

// ============================================================================
// TestApp
// ============================================================================

/// Full application wired to an in-memory store.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub config: Config,
}

impl TestApp {
    /// Build an app with the default test configuration.
    pub async fn new() -> Self {
        Self::with_config(Config::default_for_test()).await
    }

    /// Build an app with a custom configuration.
    pub async fn with_config(config: Config) -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let fanout = Arc::new(Fanout::new(Arc::new(LocalPresence::new())));
        let filter = ProfanityFilter::new(&config.profanity_extra_words)
            .expect("Failed to build profanity filter");
        let state = AppState::new(store, fanout, filter, None, config.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            config,
        }
    }

    /// Seed a user and return its id with a valid access token.
    pub async fn create_user(&self, username: &str) -> (Uuid, String) {
        let user = User::new(username, username.to_uppercase());
        self.state
            .store
            .insert_user(&user)
            .await
            .expect("Failed to insert test user");
        let token = generate_access_token(&self.config, user.id);
        (user.id, token)
    }

    /// Create a request builder for the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// Authenticated request without a body.
    pub async fn call(&self, method: Method, uri: &str, token: &str) -> Response<Body> {
        let req = Self::request(method, uri)
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.oneshot(req).await
    }

    /// Authenticated request with a JSON body.
    pub async fn call_json(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        body: serde_json::Value,
    ) -> Response<Body> {
        let req = Self::request(method, uri)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();
        self.oneshot(req).await
    }

    /// Attach an in-process connection for `user_id`, already drained of
    /// the connect handshake.
    pub async fn connect(&self, user_id: Uuid) -> TestConnection {
        let (tx, mut rx) = mpsc::channel(64);
        let handle = ConnectionHandle::new(user_id, tx);
        let session = self.state.fanout.connect(handle.clone()).await;
        drain(&mut rx);
        TestConnection {
            handle,
            session,
            rx,
        }
    }

    /// Run a client event on `conn` as the socket loop would.
    pub async fn dispatch(&self, conn: &mut TestConnection, event: ClientEvent) {
        self.state
            .fanout
            .dispatch(&conn.handle, &mut conn.session, event)
            .await;
    }

    /// Subscribe `conn` to a group's channel.
    pub async fn join_group(&self, conn: &mut TestConnection, group_id: Uuid) {
        self.dispatch(conn, ClientEvent::JoinGroup(group_id.to_string()))
            .await;
    }
}

/// A socket-less connection: its handle, relay session and event queue.
pub struct TestConnection {
    pub handle: ConnectionHandle,
    pub session: Session,
    pub rx: mpsc::Receiver<ServerEvent>,
}

/// Issue an access token signed with the app's secret.
pub fn generate_access_token(config: &Config, user_id: Uuid) -> String {
    jwt::generate_access_token(user_id, &config.jwt_secret, TOKEN_EXPIRY_SECONDS)
        .expect("Failed to generate access token")
}

/// Everything currently queued on `rx`.
pub fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Parse a response body as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}

// ============================================================================
// Test server
// ============================================================================

/// A router served on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve `router` on `127.0.0.1:0`.
pub async fn spawn_test_server(router: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Test server failed");
    });
    TestServer { addr, handle }
}
