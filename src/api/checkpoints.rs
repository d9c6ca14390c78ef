use axum::{
  Json,
  http::{StatusCode, header::LOCATION},
  response::{IntoResponse, Response},
};

use crate::{api::error::ApiError, path, state::AppState};

pub(crate) async fn create(state: &AppState, api_path: &str) -> Result<Response, ApiError> {
  let checkpoint = state.manager.create_checkpoint(api_path).await?;
  let location = format!(
    "/api/contents/{}/checkpoints/{}",
    path::url_escape(api_path),
    checkpoint.id
  );
  Ok((StatusCode::CREATED, [(LOCATION, location)], Json(checkpoint)).into_response())
}

pub(crate) async fn list(state: &AppState, api_path: &str) -> Result<Response, ApiError> {
  let checkpoints = state.manager.list_checkpoints(api_path).await?;
  Ok(Json(checkpoints).into_response())
}

pub(crate) async fn restore(state: &AppState, api_path: &str, id: &str) -> Result<Response, ApiError> {
  state.manager.restore_checkpoint(api_path, id).await?;
  Ok(StatusCode::NO_CONTENT.into_response())
}

pub(crate) async fn delete(state: &AppState, api_path: &str, id: &str) -> Result<Response, ApiError> {
  state.manager.delete_checkpoint(api_path, id).await?;
  Ok(StatusCode::NO_CONTENT.into_response())
}
