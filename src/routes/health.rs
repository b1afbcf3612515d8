use axum::{response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub ready: bool,
    pub model_loaded: bool,
}

/// Routes are only registered once the detection service has finished
/// construction, so a reachable endpoint implies a loaded model.
pub async fn healthcheck() -> impl IntoResponse {
    Json(HealthStatus {
        ready: true,
        model_loaded: true,
    })
}
