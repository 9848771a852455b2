//! Strategy service: /strategize, /approve, /health

use std::sync::Arc;

use promote_api::config::Settings;
use promote_api::state::StrategyState;
use promote_api::{cors_layer, logging, routes};

const DEFAULT_PORT: u16 = 8000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let settings = Settings::from_env();
    tracing::info!(mock = ?settings.mock, "[startup] Strategy service configuration loaded");

    let cors = cors_layer(settings.frontend_url.as_deref());
    let state = Arc::new(StrategyState::from_settings(settings).await?);

    let app = routes::build_strategy_routes()
        .layer(cors)
        .with_state(state);

    promote_api::serve(app, DEFAULT_PORT, "strategy-agent").await?;
    Ok(())
}
