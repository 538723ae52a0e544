//! Content Moderation
//!
//! Word-list profanity detection and redaction applied to every message
//! before it is stored or encrypted.

mod profanity;

pub use profanity::ProfanityFilter;
