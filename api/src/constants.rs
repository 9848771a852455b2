//! Application constants

/// Default GCS bucket for generated assets
pub const DEFAULT_BUCKET_NAME: &str = "promote-autonomy-assets";

/// Bucket name used by the in-memory storage backend
pub const MOCK_BUCKET_NAME: &str = "mock-bucket";

/// Public host generated asset URLs must point at
pub const STORAGE_HOST: &str = "storage.googleapis.com";

/// Default Pub/Sub topic for approved tasks
pub const DEFAULT_TOPIC: &str = "autonomy-tasks";

/// Maximum reference image upload (10 MB)
pub const MAX_REFERENCE_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Request body limit for /strategize (reference image plus form fields)
pub const MAX_STRATEGIZE_BODY_SIZE: usize = MAX_REFERENCE_IMAGE_SIZE + 1024 * 1024;

/// Goal length bounds for /strategize
pub const MIN_GOAL_CHARS: usize = 10;
pub const MAX_GOAL_CHARS: usize = 500;

/// Default timeouts, in seconds
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_VEO_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_VEO_POLL_INTERVAL_SECS: u64 = 10;

/// Gemini REST endpoint
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
