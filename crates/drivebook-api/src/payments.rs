//! Payment endpoints.
//!
//! The browser completes the card step with the processor using the client
//! secret from `POST /bookings/{id}/payment`, then reports back through
//! `POST /payments/confirm`; the booking is confirmed only after the
//! processor itself says the intent succeeded.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use drivebook_core::{
  booking::BookingView, checkout::PaymentSession, payment::PaymentProcessor,
  store::BookingStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, CurrentUser, error::ApiError};

/// `POST /bookings/{id}/payment`
pub async fn start<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<PaymentSession>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Ok(Json(state.checkout.start_payment(&who, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
  pub confirmation_reference: String,
  pub payment_intent_id:      String,
}

/// `POST /payments/confirm`
pub async fn confirm<S, P>(
  State(state): State<Arc<ApiState<S, P>>>,
  CurrentUser(who): CurrentUser,
  Json(body): Json<ConfirmBody>,
) -> Result<Json<BookingView>, ApiError>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  if body.payment_intent_id.trim().is_empty() {
    return Err(ApiError::BadRequest("payment_intent_id is required".into()));
  }
  let view = state
    .checkout
    .confirm_payment(&who, &body.confirmation_reference, &body.payment_intent_id)
    .await?;
  Ok(Json(view))
}
