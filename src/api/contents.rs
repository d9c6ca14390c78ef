use axum::{
  Json,
  body::Bytes,
  extract::{Path as UrlPath, Query, State},
  http::{StatusCode, header::LOCATION},
  response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use crate::{
  api::{checkpoints, error::ApiError},
  contents::{ContentsOps, GetOptions},
  model::{CreateModel, GetParams, RenameModel, SaveModel},
  path,
  state::AppState,
};

/// Sub-routing beneath `/api/contents/`: an entry path, its checkpoint
/// collection, or one checkpoint. The *last* `/checkpoints` suffix wins, so
/// entries may themselves be named `checkpoints`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Route<'a> {
  Contents(&'a str),
  Checkpoints(&'a str),
  Checkpoint { path: &'a str, id: &'a str },
}

pub(crate) fn classify(raw: &str) -> Route<'_> {
  if let Some(path) = raw.strip_suffix("/checkpoints") {
    return Route::Checkpoints(path);
  }
  if let Some(idx) = raw.rfind("/checkpoints/") {
    let id = &raw[idx + "/checkpoints/".len()..];
    if !id.is_empty() && !id.contains('/') {
      return Route::Checkpoint {
        path: &raw[..idx],
        id,
      };
    }
  }
  Route::Contents(raw)
}

fn get_options(params: &GetParams) -> GetOptions {
  GetOptions {
    content: params.content.unwrap_or(true),
    entry_type: params.entry_type,
    format: params.format,
    hash: params.hash.unwrap_or(false),
  }
}

pub(crate) fn location_for(api_path: &str) -> String {
  format!("/api/contents/{}", path::url_escape(api_path))
}

fn parse_body_or_default<T>(body: &[u8]) -> Result<T, ApiError>
where
  T: DeserializeOwned + Default,
{
  if body.is_empty() {
    return Ok(T::default());
  }
  serde_json::from_slice(body)
    .map_err(|err| ApiError::bad_request(format!("malformed JSON body: {err}")))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
  serde_json::from_slice(body)
    .map_err(|err| ApiError::bad_request(format!("malformed JSON body: {err}")))
}

async fn create_in(state: &AppState, parent: &str, body: &[u8]) -> Result<Response, ApiError> {
  let model: CreateModel = parse_body_or_default(body)?;
  let entry = if let Some(copy_from) = model.copy_from.as_deref() {
    state.manager.copy(copy_from, parent).await?
  } else {
    state.manager.new_untitled(parent, &model).await?
  };
  let location = location_for(&entry.path);
  Ok((StatusCode::CREATED, [(LOCATION, location)], Json(entry)).into_response())
}

pub async fn get_root(
  State(state): State<AppState>,
  Query(params): Query<GetParams>,
) -> Result<Response, ApiError> {
  let entry = state.manager.get("", get_options(&params)).await?;
  Ok(Json(entry).into_response())
}

pub async fn post_root(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
  create_in(&state, "", &body).await
}

pub async fn dispatch_get(
  State(state): State<AppState>,
  UrlPath(raw): UrlPath<String>,
  Query(params): Query<GetParams>,
) -> Result<Response, ApiError> {
  match classify(&raw) {
    Route::Contents(path) => {
      let entry = state.manager.get(path, get_options(&params)).await?;
      Ok(Json(entry).into_response())
    }
    Route::Checkpoints(path) => checkpoints::list(&state, path).await,
    Route::Checkpoint { .. } => Err(ApiError::method_not_allowed()),
  }
}

pub async fn dispatch_post(
  State(state): State<AppState>,
  UrlPath(raw): UrlPath<String>,
  body: Bytes,
) -> Result<Response, ApiError> {
  match classify(&raw) {
    Route::Contents(path) => create_in(&state, path, &body).await,
    Route::Checkpoints(path) => checkpoints::create(&state, path).await,
    Route::Checkpoint { path, id } => checkpoints::restore(&state, path, id).await,
  }
}

async fn save_at(state: &AppState, path: &str, body: &[u8]) -> Result<Response, ApiError> {
  let model: SaveModel = parse_body_or_default(body)?;
  let saved = state.manager.save(path, &model).await?;
  let status = if saved.created {
    StatusCode::CREATED
  } else {
    StatusCode::OK
  };
  let location = location_for(&saved.entry.path);
  Ok((status, [(LOCATION, location)], Json(saved.entry)).into_response())
}

async fn rename_at(state: &AppState, path: &str, body: &[u8]) -> Result<Response, ApiError> {
  let model: RenameModel = parse_body(body)?;
  let entry = state.manager.rename(path, &model.path).await?;
  let location = location_for(&entry.path);
  Ok((StatusCode::OK, [(LOCATION, location)], Json(entry)).into_response())
}

async fn delete_at(state: &AppState, path: &str) -> Result<Response, ApiError> {
  state.manager.delete(path).await?;
  Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn put_root(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
  save_at(&state, "", &body).await
}

pub async fn patch_root(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
  rename_at(&state, "", &body).await
}

pub async fn delete_root(State(state): State<AppState>) -> Result<Response, ApiError> {
  delete_at(&state, "").await
}

pub async fn put_entry(
  State(state): State<AppState>,
  UrlPath(raw): UrlPath<String>,
  body: Bytes,
) -> Result<Response, ApiError> {
  let Route::Contents(path) = classify(&raw) else {
    return Err(ApiError::method_not_allowed());
  };
  save_at(&state, path, &body).await
}

pub async fn patch_entry(
  State(state): State<AppState>,
  UrlPath(raw): UrlPath<String>,
  body: Bytes,
) -> Result<Response, ApiError> {
  let Route::Contents(path) = classify(&raw) else {
    return Err(ApiError::method_not_allowed());
  };
  rename_at(&state, path, &body).await
}

pub async fn dispatch_delete(
  State(state): State<AppState>,
  UrlPath(raw): UrlPath<String>,
) -> Result<Response, ApiError> {
  match classify(&raw) {
    Route::Contents(path) => delete_at(&state, path).await,
    Route::Checkpoints(_) => Err(ApiError::method_not_allowed()),
    Route::Checkpoint { path, id } => checkpoints::delete(&state, path, id).await,
  }
}
