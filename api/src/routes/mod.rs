pub mod approve;
pub mod auth;
pub mod consume;
pub mod health;
pub mod strategize;

use axum::Router;
use std::sync::Arc;

use crate::state::{CreativeState, StrategyState};

/// Routes served by the strategy service
pub fn build_strategy_routes() -> Router<Arc<StrategyState>> {
    Router::new()
        .merge(strategize::routes())
        .merge(approve::routes())
        .merge(health::routes::<StrategyState>())
}

/// Routes served by the creative service
pub fn build_creative_routes() -> Router<Arc<CreativeState>> {
    Router::new()
        .merge(consume::routes())
        .merge(health::routes::<CreativeState>())
}
