//! Status Handler

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::application::GetGenerationStatus;
use crate::infrastructure::http::dto::{ApiResponse, GenerationStatusResponse};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn get_generation_status(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> Result<Json<ApiResponse<GenerationStatusResponse>>, ApiError> {
    let snapshot = state
        .get_status_handler
        .handle(GetGenerationStatus { request_id })?;

    Ok(Json(ApiResponse::success(snapshot.into())))
}
