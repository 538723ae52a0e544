//! Authentication Boundary
//!
//! Verifies caller identity for HTTP routes and the WebSocket upgrade.
//! Signup and login belong to the account service.

mod error;
pub mod jwt;
mod middleware;

pub use error::{AuthError, AuthResult};
pub use middleware::{require_auth, AuthUser};
