//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use drivebook_api::ApiError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid credentials")]
  Unauthorized,
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("password hashing failed: {0}")]
  Hash(String),
  #[error(transparent)]
  Api(#[from] ApiError),
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let body = json!({ "error": "invalid credentials", "code": "unauthenticated" });
        let mut res = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"drivebook\""),
        );
        res
      }
      Error::BadRequest(msg) => ApiError::BadRequest(msg).into_response(),
      Error::Hash(msg) => {
        tracing::error!(error = %msg, "password hashing failed");
        let body = json!({ "error": "internal error", "code": "internal" });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
      }
      Error::Api(e) => e.into_response(),
    }
  }
}
