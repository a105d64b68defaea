//! Handlers for `/instructors` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/instructors` | Public listing |
//! | `GET`  | `/instructors/{id}` | 404 if not found |
//! | `GET`  | `/instructors/{id}/slots?date=YYYY-MM-DD` | Free local start times |
//! | `GET`  | `/instructors/{id}/reviews` | Newest first |
//! | `POST` | `/instructors/{id}/reviews` | Body: `{"rating":4,"review_text":"..."}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{NaiveDate, NaiveTime};
use drivebook_core::{
  instructor::InstructorProfile, payment::PaymentProcessor, review::Review,
  store::BookingStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, CurrentUser, error::ApiError};

/// `GET /instructors`
pub async fn list<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
) -> Result<Json<Vec<InstructorProfile>>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.directory.instructors().await?))
}

/// `GET /instructors/{id}`
pub async fn get_one<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<InstructorProfile>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.directory.instructor(id).await?))
}

// ─── Availability ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SlotParams {
  pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct SlotList {
  pub instructor_id: Uuid,
  pub date:          NaiveDate,
  pub available:     Vec<NaiveTime>,
}

/// `GET /instructors/{id}/slots?date=<date>`
pub async fn slots<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  Path(id): Path<Uuid>,
  Query(params): Query<SlotParams>,
) -> Result<Json<SlotList>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  let available = state.bookings.available_slots(id, params.date).await?;
  Ok(Json(SlotList { instructor_id: id, date: params.date, available }))
}

// ─── Reviews ─────────────────────────────────────────────────────────────────

/// `GET /instructors/{id}/reviews`
pub async fn reviews<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Review>>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  // Reviews of an unknown instructor are a 404, not an empty list.
  state.directory.instructor(id).await?;
  Ok(Json(state.ratings.reviews(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
  pub rating:      u8,
  pub review_text: Option<String>,
}

/// `POST /instructors/{id}/reviews`: 201 with the review and the outcome of
/// the rating refresh.
pub async fn submit_review<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<ReviewBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  let receipt = state
    .ratings
    .submit_review(&who, id, body.rating, body.review_text)
    .await?;
  Ok((StatusCode::CREATED, Json(receipt)))
}
