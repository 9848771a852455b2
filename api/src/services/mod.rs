pub mod copy;
pub mod error;
pub mod gcp_auth;
pub mod gemini;
pub mod identity;
pub mod image;
pub mod provider;
pub mod pubsub;
pub mod video;
