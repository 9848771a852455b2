//! Liveness and mode report (/health)

use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::config::MockFlags;
use crate::state::{CreativeState, StrategyState};

pub trait ServiceInfo: Send + Sync + 'static {
    const NAME: &'static str;

    fn mock_flags(&self) -> &MockFlags;
}

impl ServiceInfo for StrategyState {
    const NAME: &'static str = "strategy-agent";

    fn mock_flags(&self) -> &MockFlags {
        &self.settings.mock
    }
}

impl ServiceInfo for CreativeState {
    const NAME: &'static str = "creative-agent";

    fn mock_flags(&self) -> &MockFlags {
        &self.settings.mock
    }
}

pub fn routes<S: ServiceInfo>() -> Router<Arc<S>> {
    Router::new().route("/health", get(health::<S>))
}

async fn health<S: ServiceInfo>(State(state): State<Arc<S>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": S::NAME,
        "mock": state.mock_flags(),
    }))
}
