//! Checkout: turn a pending booking into a payment intent, and confirm the
//! booking once the processor reports the payment as succeeded.

use std::sync::Arc;

use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  booking::{Booking, BookingStatus, BookingView},
  context::ServiceContext,
  identity::{Identity, require_owner_or_admin},
  ledger::SlotLedger,
  payment::{PaymentProcessor, PaymentRequest, PaymentStatus},
  store::BookingStore,
  upstream,
};

/// What the customer's browser needs to complete a payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
  pub booking_id:             Uuid,
  pub confirmation_reference: String,
  pub payment_intent_id:      String,
  pub client_secret:          Option<String>,
  /// Amount in minor currency units.
  pub amount:                 i64,
  pub currency:               String,
}

pub struct Checkout<S, P> {
  ctx:       ServiceContext<S>,
  ledger:    SlotLedger<S>,
  processor: Arc<P>,
  currency:  String,
}

impl<S, P> Clone for Checkout<S, P> {
  fn clone(&self) -> Self {
    Self {
      ctx:       self.ctx.clone(),
      ledger:    self.ledger.clone(),
      processor: Arc::clone(&self.processor),
      currency:  self.currency.clone(),
    }
  }
}

/// Convert a price to minor units (cents), rejecting non-positive amounts.
pub fn minor_units(price: Decimal) -> Result<i64> {
  let cents = (price * Decimal::ONE_HUNDRED).round();
  match cents.to_i64() {
    Some(c) if c > 0 => Ok(c),
    _ => Err(Error::Validation(format!("cannot charge {price}"))),
  }
}

impl<S: BookingStore, P: PaymentProcessor> Checkout<S, P> {
  pub fn new(ctx: ServiceContext<S>, processor: Arc<P>, currency: impl Into<String>) -> Self {
    Self {
      ledger: SlotLedger::new(ctx.clone()),
      ctx,
      processor,
      currency: currency.into(),
    }
  }

  /// Create a payment intent for a pending booking at the instructor's
  /// lesson price.
  pub async fn start_payment(
    &self,
    requester: &Identity,
    booking_id: Uuid,
  ) -> Result<PaymentSession> {
    let booking = self.ledger.fetch(booking_id).await?;
    require_owner_or_admin(requester, booking.user_id)?;
    self.ensure_pending(&booking)?;

    let instructor_id = booking.instructor_id;
    let instructor = self
      .ctx
      .call(|s| s.get_instructor(instructor_id))
      .await?
      .ok_or_else(|| Error::not_found(format!("instructor {instructor_id}")))?;

    let request = PaymentRequest {
      amount:    minor_units(instructor.instructor.lesson_price)?,
      currency:  self.currency.clone(),
      reference: booking.confirmation_ref.clone(),
    };
    let intent = upstream::bounded(
      self.ctx.timeout,
      Error::Payment,
      self.processor.create_payment_intent(request),
    )
    .await?;

    tracing::info!(
      booking_id = %booking.id,
      payment_intent = %intent.id,
      amount = intent.amount,
      "payment intent created"
    );

    Ok(PaymentSession {
      booking_id:             booking.id,
      confirmation_reference: booking.confirmation_ref,
      payment_intent_id:      intent.id,
      client_secret:          intent.client_secret,
      amount:                 intent.amount,
      currency:               intent.currency,
    })
  }

  /// Confirm the booking identified by `reference` once the processor
  /// reports `intent_id` as succeeded for that same reference.
  pub async fn confirm_payment(
    &self,
    requester: &Identity,
    reference: &str,
    intent_id: &str,
  ) -> Result<BookingView> {
    let booking = self
      .ctx
      .call(|s| s.find_booking_by_reference(reference))
      .await?
      .ok_or_else(|| Error::not_found(format!("booking with reference {reference}")))?;
    require_owner_or_admin(requester, booking.user_id)?;
    self.ensure_pending(&booking)?;

    let intent = upstream::bounded(
      self.ctx.timeout,
      Error::Payment,
      self.processor.retrieve_payment_intent(intent_id),
    )
    .await?;
    if intent.status != PaymentStatus::Succeeded
      || intent.reference.as_deref() != Some(reference)
    {
      tracing::warn!(
        booking_id = %booking.id,
        payment_intent = %intent.id,
        status = ?intent.status,
        "payment not usable for confirmation"
      );
      return Err(Error::PaymentIncomplete);
    }

    let confirmed = self
      .ledger
      .transition(&booking, BookingStatus::Confirmed)
      .await?;
    tracing::info!(booking_id = %confirmed.id, "booking confirmed by payment");
    Ok(confirmed.view(self.ctx.now()))
  }

  fn ensure_pending(&self, booking: &Booking) -> Result<()> {
    let current = booking.effective_status(self.ctx.now());
    if current.can_transition_to(BookingStatus::Confirmed) {
      Ok(())
    } else {
      Err(Error::InvalidTransition { from: current, to: BookingStatus::Confirmed })
    }
  }
}
