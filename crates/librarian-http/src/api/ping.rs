use axum::extract::State;
use axum::Json;
use librarian_client::{PingRequest, PingResponse};
use tracing::debug;

use crate::error::ApiResult;
use crate::AppState;

pub async fn ping(
    State(state): State<AppState>,
    Json(_req): Json<PingRequest>,
) -> ApiResult<Json<PingResponse>> {
    debug!("ping");
    Ok(Json(PingResponse {
        name: state.config.site_name.clone(),
        description: state.config.site_description.clone(),
    }))
}
