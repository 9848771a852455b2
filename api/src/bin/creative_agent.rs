//! Creative service: /consume, /health
//!
//! Receives approved jobs by push delivery and generates their assets.

use std::sync::Arc;

use promote_api::config::Settings;
use promote_api::state::CreativeState;
use promote_api::{logging, routes};

const DEFAULT_PORT: u16 = 8001;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let settings = Settings::from_env();
    tracing::info!(
        mock = ?settings.mock,
        use_orchestration = settings.use_orchestration,
        rollout = settings.orchestration_rollout_percentage,
        "[startup] Creative service configuration loaded"
    );
    if settings.consume_audience.is_none() && !settings.mock.auth {
        tracing::warn!("[startup] CONSUME_AUDIENCE not set, accepting the request URL as audience");
    }

    let state = Arc::new(CreativeState::from_settings(settings).await?);
    let app = routes::build_creative_routes().with_state(state);

    promote_api::serve(app, DEFAULT_PORT, "creative-agent").await?;
    Ok(())
}
