//! Murmur Server
//!
//! Real-time direct and group messaging: presence, event fanout, optionally
//! encrypted message storage and role-based group membership.

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod group;
pub mod moderation;
pub mod presence;
pub mod ws;
