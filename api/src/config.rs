//! Process configuration read once from the environment.

use std::time::Duration;

use crate::constants::{
    DEFAULT_BUCKET_NAME, DEFAULT_PROVIDER_TIMEOUT_SECS, DEFAULT_TOPIC, DEFAULT_VEO_POLL_INTERVAL_SECS,
    DEFAULT_VEO_TIMEOUT_SECS,
};

/// Which capability variants to build at start-up.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MockFlags {
    pub gemini: bool,
    pub imagen: bool,
    pub veo: bool,
    pub storage: bool,
    pub pubsub: bool,
    pub auth: bool,
}

impl Default for MockFlags {
    fn default() -> Self {
        MockFlags {
            gemini: true,
            imagen: true,
            veo: true,
            storage: true,
            pubsub: true,
            auth: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub project_id: String,
    pub storage_bucket: String,
    pub pubsub_topic: String,
    pub pubsub_service_account: Option<String>,
    pub consume_audience: Option<String>,
    pub frontend_url: Option<String>,
    pub database_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub imagen_model: String,
    pub veo_model: String,
    pub mock: MockFlags,
    pub use_orchestration: bool,
    pub orchestration_rollout_percentage: u8,
    pub provider_timeout: Duration,
    pub veo_timeout: Duration,
    pub veo_poll_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            project_id: "promote-autonomy".to_string(),
            storage_bucket: DEFAULT_BUCKET_NAME.to_string(),
            pubsub_topic: DEFAULT_TOPIC.to_string(),
            pubsub_service_account: None,
            consume_audience: None,
            frontend_url: None,
            database_url: None,
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            imagen_model: "imagen-3.0-generate-002".to_string(),
            veo_model: "veo-3.0-generate-001".to_string(),
            mock: MockFlags::default(),
            use_orchestration: false,
            orchestration_rollout_percentage: 0,
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            veo_timeout: Duration::from_secs(DEFAULT_VEO_TIMEOUT_SECS),
            veo_poll_interval: Duration::from_secs(DEFAULT_VEO_POLL_INTERVAL_SECS),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Settings {
            project_id: env_string("PROJECT_ID").unwrap_or(defaults.project_id),
            storage_bucket: env_string("STORAGE_BUCKET").unwrap_or(defaults.storage_bucket),
            pubsub_topic: env_string("PUBSUB_TOPIC").unwrap_or(defaults.pubsub_topic),
            pubsub_service_account: env_string("PUBSUB_SERVICE_ACCOUNT"),
            consume_audience: env_string("CONSUME_AUDIENCE"),
            frontend_url: env_string("FRONTEND_URL"),
            database_url: env_string("DATABASE_URL"),
            gemini_api_key: env_string("GOOGLE_GEMINI_API_KEY"),
            gemini_model: env_string("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            imagen_model: env_string("IMAGEN_MODEL").unwrap_or(defaults.imagen_model),
            veo_model: env_string("VEO_MODEL").unwrap_or(defaults.veo_model),
            mock: MockFlags {
                gemini: env_flag("USE_MOCK_GEMINI", true),
                imagen: env_flag("USE_MOCK_IMAGEN", true),
                veo: env_flag("USE_MOCK_VEO", true),
                storage: env_flag("USE_MOCK_STORAGE", true),
                pubsub: env_flag("USE_MOCK_PUBSUB", true),
                auth: env_flag("USE_MOCK_AUTH", true),
            },
            use_orchestration: env_flag("USE_ORCHESTRATION", false),
            orchestration_rollout_percentage: std::env::var("ORCHESTRATION_ROLLOUT_PERCENTAGE")
                .ok()
                .and_then(|v| v.trim().parse::<u32>().ok())
                .map(|v| v.min(100) as u8)
                .unwrap_or(0),
            provider_timeout: env_secs("PROVIDER_TIMEOUT_SEC", DEFAULT_PROVIDER_TIMEOUT_SECS),
            veo_timeout: env_secs("VEO_TIMEOUT_SEC", DEFAULT_VEO_TIMEOUT_SECS),
            veo_poll_interval: env_secs("VEO_POLLING_INTERVAL_SEC", DEFAULT_VEO_POLL_INTERVAL_SECS),
        }
    }

    /// Gemini API key, required whenever a real Google model is used.
    pub fn require_gemini_key(&self) -> Result<String, String> {
        self.gemini_api_key
            .clone()
            .ok_or_else(|| "GOOGLE_GEMINI_API_KEY must be set when mocks are disabled".to_string())
    }

    /// Service account push tokens must be issued for. Only mock auth may
    /// run without one.
    pub fn require_push_identity(&self) -> Result<Option<&str>, String> {
        match (&self.pubsub_service_account, self.mock.auth) {
            (Some(account), _) => Ok(Some(account.as_str())),
            (None, true) => Ok(None),
            (None, false) => Err(
                "PUBSUB_SERVICE_ACCOUNT must be set when USE_MOCK_AUTH is disabled".to_string(),
            ),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| parse_flag(&v, default))
        .unwrap_or(default)
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn env_secs(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}
