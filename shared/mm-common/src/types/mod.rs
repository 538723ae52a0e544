//! Shared types.

mod presence;
mod user;

pub use presence::PresenceEntry;
pub use user::UserStatus;
