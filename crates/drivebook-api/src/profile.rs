//! `/profile`: the caller's own account.

use std::sync::Arc;

use axum::{Json, extract::State};
use drivebook_core::{payment::PaymentProcessor, profile::Profile, store::BookingStore};
use serde::Deserialize;

use crate::{ApiState, CurrentUser, error::ApiError};

/// `GET /profile`
pub async fn get_own<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
) -> Result<Json<Profile>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.directory.profile(&who).await?))
}

#[derive(Debug, Deserialize)]
pub struct NamesBody {
  pub first_name: String,
  pub last_name:  String,
}

/// `PUT /profile`: body: `{"first_name":"…","last_name":"…"}`
pub async fn update<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Json(body): Json<NamesBody>,
) -> Result<Json<Profile>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  let profile = state
    .directory
    .update_names(&who, &body.first_name, &body.last_name)
    .await?;
  Ok(Json(profile))
}
