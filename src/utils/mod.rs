pub mod auth;
pub mod content_type;
pub mod range;
