use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use shared::dispatch::Dispatcher;

mod health;
mod webhook;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub channel_secret: String,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/webhook", post(webhook::callback))
        .with_state(app_state)
}
