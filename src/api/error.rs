use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;

use crate::contents::ContentsError;

/// The single translation point from manager errors to wire responses.
/// Bodies are `{"message": ..., "reason": ...}`.
#[derive(Debug)]
pub struct ApiError {
  pub status: StatusCode,
  pub message: String,
  pub reason: &'static str,
}

impl ApiError {
  pub fn bad_request(message: impl Into<String>) -> Self {
    Self {
      status: StatusCode::BAD_REQUEST,
      message: message.into(),
      reason: "bad_request",
    }
  }

  pub fn method_not_allowed() -> Self {
    Self {
      status: StatusCode::METHOD_NOT_ALLOWED,
      message: "method not allowed on this resource".into(),
      reason: "method_not_allowed",
    }
  }
}

impl From<ContentsError> for ApiError {
  fn from(err: ContentsError) -> Self {
    let (status, reason) = match &err {
      ContentsError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
      ContentsError::TypeMismatch(..) | ContentsError::NotADirectory(_) => {
        (StatusCode::BAD_REQUEST, "bad_type")
      }
      ContentsError::BadFormat(_) => (StatusCode::BAD_REQUEST, "bad_format"),
      ContentsError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
      ContentsError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
      ContentsError::Io(inner) => {
        // Clients get a generic 500; the OS detail stays in the log.
        error!(error = %inner, "filesystem failure while serving a contents request");
        return Self {
          status: StatusCode::INTERNAL_SERVER_ERROR,
          message: "internal server error".into(),
          reason: "internal",
        };
      }
    };
    Self {
      status,
      message: err.to_string(),
      reason,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = json!({
      "message": self.message,
      "reason": self.reason,
    });
    (self.status, Json(body)).into_response()
  }
}
