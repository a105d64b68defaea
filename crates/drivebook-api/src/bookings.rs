//! Handlers for `/bookings` endpoints. Every route needs a caller.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/bookings` | The caller's bookings, soonest first |
//! | `POST` | `/bookings` | Body: [`BookingRequest`]; 201 + confirmation |
//! | `GET`  | `/bookings/{id}` | Owner or admin |
//! | `POST` | `/bookings/{id}/cancel` | Owner or admin |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use drivebook_core::{
  booking::BookingView, coordinator::BookingRequest, payment::PaymentProcessor,
  store::BookingStore,
};
use uuid::Uuid;

use crate::{ApiState, CurrentUser, error::ApiError};

/// `GET /bookings`
pub async fn list<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
) -> Result<Json<Vec<BookingView>>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.bookings.my_bookings(&who).await?))
}

/// `POST /bookings`: body: `{"instructor_id":"…","lesson_date":"2025-06-10","lesson_time":"10:00:00"}`
pub async fn create<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Json(request): Json<BookingRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  let confirmation = state.bookings.book(&who, request).await?;
  Ok((StatusCode::CREATED, Json(confirmation)))
}

/// `GET /bookings/{id}`
pub async fn get_one<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<BookingView>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.bookings.booking(&who, id).await?))
}

/// `POST /bookings/{id}/cancel`
pub async fn cancel<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<BookingView>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.bookings.cancel(&who, id).await?))
}
