use axum::Json;
use axum::extract::{Path, State};

use crate::dto::{ClearHistoryResponse, HistoryResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_history_handler(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> ApiResult<Json<HistoryResponse>> {
    let hits = state.throttle_service.history(&identifier).await?;
    Ok(Json(HistoryResponse { identifier, hits }))
}

pub async fn clear_identifier_history_handler(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> ApiResult<Json<ClearHistoryResponse>> {
    let removed = state
        .throttle_service
        .clear_history(Some(identifier.as_str()))
        .await?;

    Ok(Json(ClearHistoryResponse {
        identifier: Some(identifier),
        removed,
    }))
}

pub async fn clear_all_history_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<ClearHistoryResponse>> {
    let removed = state.throttle_service.clear_history(None).await?;

    Ok(Json(ClearHistoryResponse {
        identifier: None,
        removed,
    }))
}
