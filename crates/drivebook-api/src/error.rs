//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use drivebook_core::Error;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] Error),

  #[error("bad request: {0}")]
  BadRequest(String),
}

/// HTTP status for a service error.
pub fn status_of(err: &Error) -> StatusCode {
  match err {
    Error::NotFound(_) => StatusCode::NOT_FOUND,
    Error::Forbidden(_) => StatusCode::FORBIDDEN,
    Error::Unauthenticated => StatusCode::UNAUTHORIZED,
    Error::SlotTaken
    | Error::Conflict(_)
    | Error::InvalidTransition { .. }
    | Error::StaleStatus(_) => StatusCode::CONFLICT,
    Error::PastBooking | Error::ClosedDay(_) => StatusCode::UNPROCESSABLE_ENTITY,
    Error::Validation(_) => StatusCode::BAD_REQUEST,
    Error::PaymentIncomplete => StatusCode::PAYMENT_REQUIRED,
    Error::Payment(_) => StatusCode::BAD_GATEWAY,
    Error::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
    Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, code, message) = match &self {
      ApiError::Core(e) => (status_of(e), e.code(), e.to_string()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m.clone()),
    };

    if status.is_server_error() {
      tracing::error!(code, error = %message, "request failed");
    }

    let mut res = (status, Json(json!({ "error": message, "code": code }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"drivebook\""),
      );
    }
    res
  }
}
