//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::{Context, Result};
use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    /// `PostgreSQL` connection URL. When unset the server runs on the
    /// in-memory store and loses everything on restart.
    pub database_url: Option<String>,

    /// Secret used to verify HS256 access tokens
    pub jwt_secret: String,

    /// S3-compatible storage endpoint
    pub s3_endpoint: Option<String>,

    /// S3 bucket name
    pub s3_bucket: String,

    /// Public base URL under which uploaded objects are reachable.
    /// Falls back to presigned URLs when unset.
    pub s3_public_url: Option<String>,

    /// S3 presigned URL expiry in seconds (default: 3600 = 1 hour)
    pub s3_presign_expiry: i64,

    /// Maximum decoded image size in bytes (default: 10MB)
    pub max_upload_size: usize,

    /// Outbound event queue depth per WebSocket connection
    pub ws_outbound_buffer: usize,

    /// Extra words appended to the built-in profanity list
    pub profanity_extra_words: Vec<String>,

    /// Legacy mode: keep the encryption password on the message record
    pub persist_message_passwords: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            s3_bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "murmur".into()),
            s3_public_url: env::var("S3_PUBLIC_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string()),
            s3_presign_expiry: env::var("S3_PRESIGN_EXPIRY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
            ws_outbound_buffer: env::var("WS_OUTBOUND_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(100),
            profanity_extra_words: env::var("PROFANITY_EXTRA_WORDS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|w| w.trim().to_lowercase())
                        .filter(|w| !w.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            persist_message_passwords: env::var("PERSIST_MESSAGE_PASSWORDS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    /// Create a default configuration for testing.
    ///
    /// No database, no object storage; everything runs in memory.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            database_url: None,
            jwt_secret: "test-secret".into(),
            s3_endpoint: None,
            s3_bucket: "test-bucket".into(),
            s3_public_url: None,
            s3_presign_expiry: 3600,
            max_upload_size: 10 * 1024 * 1024,
            ws_outbound_buffer: 100,
            profanity_extra_words: Vec::new(),
            persist_message_passwords: false,
        }
    }
}
