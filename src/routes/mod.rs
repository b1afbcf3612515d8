mod detect;
mod health;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(health::healthcheck))
        .route("/healthz", get(health::healthcheck))
        .route("/detect", post(detect::detect))
}
