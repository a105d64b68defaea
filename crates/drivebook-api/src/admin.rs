//! Handlers for `/admin` endpoints. Authorisation is the services' job:
//! every call passes the caller to an `AdminService` method, which rejects
//! non-administrators with 403 before touching storage.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/admin/stats` | Row counts |
//! | `GET`    | `/admin/users` | All profiles |
//! | `PUT`    | `/admin/users/{id}/role` | Body: `{"role":"instructor"}` |
//! | `DELETE` | `/admin/users/{id}` | Cascades; 204 |
//! | `POST`   | `/admin/instructors` | Body: [`NewInstructorBody`]; 201 |
//! | `PUT`    | `/admin/instructors/{id}` | Body: `InstructorPatch` |
//! | `DELETE` | `/admin/instructors/{id}` | Cascades and demotes; 204 |
//! | `GET`    | `/admin/bookings` | Optional `user_id`, `instructor_id`, `status` |
//! | `PUT`    | `/admin/bookings/{id}/status` | Body: `{"status":"confirmed"}` |
//! | `DELETE` | `/admin/bookings/{id}` | Hard delete; 204 |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use drivebook_core::{
  booking::{Booking, BookingStatus, BookingView},
  identity::Role,
  instructor::{InstructorPatch, InstructorProfile},
  payment::PaymentProcessor,
  profile::Profile,
  store::{BookingQuery, BookingStore, DashboardStats},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, CurrentUser, error::ApiError};

// ─── Dashboard ───────────────────────────────────────────────────────────────

/// `GET /admin/stats`
pub async fn stats<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
) -> Result<Json<DashboardStats>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.admin.stats(&who).await?))
}

// ─── Users ───────────────────────────────────────────────────────────────────

/// `GET /admin/users`
pub async fn users<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
) -> Result<Json<Vec<Profile>>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.admin.users(&who).await?))
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
  pub role: Role,
}

/// `PUT /admin/users/{id}/role`
pub async fn set_role<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<RoleBody>,
) -> Result<Json<Profile>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.admin.set_role(&who, id, body.role).await?))
}

/// `DELETE /admin/users/{id}`
pub async fn delete_user<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  state.admin.delete_user(&who, id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Instructors ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewInstructorBody {
  /// Email of an existing profile that already has the instructor role.
  pub email:        String,
  pub bio:          String,
  pub lesson_price: Decimal,
}

/// `POST /admin/instructors`
pub async fn create_instructor<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Json(body): Json<NewInstructorBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  let instructor = state
    .admin
    .create_instructor(&who, &body.email, &body.bio, body.lesson_price)
    .await?;
  Ok((StatusCode::CREATED, Json(instructor)))
}

/// `PUT /admin/instructors/{id}`
pub async fn update_instructor<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Path(id): Path<Uuid>,
  Json(patch): Json<InstructorPatch>,
) -> Result<Json<InstructorProfile>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.admin.update_instructor(&who, id, patch).await?))
}

/// `DELETE /admin/instructors/{id}`
pub async fn remove_instructor<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  state.admin.remove_instructor(&who, id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Bookings ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BookingParams {
  pub user_id:       Option<Uuid>,
  pub instructor_id: Option<Uuid>,
  pub status:        Option<BookingStatus>,
}

/// `GET /admin/bookings[?user_id=…][&instructor_id=…][&status=…]`
pub async fn bookings<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Query(params): Query<BookingParams>,
) -> Result<Json<Vec<BookingView>>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  let query = BookingQuery {
    user_id:       params.user_id,
    instructor_id: params.instructor_id,
    status:        params.status,
  };
  Ok(Json(state.admin.bookings(&who, query).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: BookingStatus,
}

/// `PUT /admin/bookings/{id}/status`
pub async fn set_booking_status<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<StatusBody>,
) -> Result<Json<Booking>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.admin.set_booking_status(&who, id, body.status).await?))
}

/// `DELETE /admin/bookings/{id}`
pub async fn delete_booking<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  state.admin.delete_booking(&who, id).await?;
  Ok(StatusCode::NO_CONTENT)
}
