//! Slot reservation ledger: the authoritative record of which
//! (instructor, instant) pairs are taken.
//!
//! `reserve` is a single conditional insert. The storage layer's uniqueness
//! rule on non-cancelled (instructor, start) pairs linearises concurrent
//! callers, so there is no separate availability read that could race.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  booking::{Booking, BookingStatus, NewBooking},
  context::ServiceContext,
  identity::{Identity, require_owner_or_admin},
  store::{BookingStore, Insert},
};

pub struct SlotLedger<S> {
  ctx: ServiceContext<S>,
}

impl<S> Clone for SlotLedger<S> {
  fn clone(&self) -> Self { Self { ctx: self.ctx.clone() } }
}

impl<S: BookingStore> SlotLedger<S> {
  pub fn new(ctx: ServiceContext<S>) -> Self { Self { ctx } }

  /// True iff a non-cancelled booking holds exactly this instant.
  pub async fn is_taken(
    &self,
    instructor_id: Uuid,
    instant: DateTime<Utc>,
  ) -> Result<bool> {
    self.ctx.call(|s| s.is_taken(instructor_id, instant)).await
  }

  /// Atomically claim a slot for `customer_id`. Exactly one of any number
  /// of concurrent callers for the same slot succeeds; the rest get
  /// [`Error::SlotTaken`].
  pub async fn reserve(
    &self,
    instructor_id: Uuid,
    customer_id: Uuid,
    instant: DateTime<Utc>,
  ) -> Result<Booking> {
    let input = NewBooking::new(customer_id, instructor_id, instant, self.ctx.now());
    match self.ctx.call(|s| s.reserve(input)).await? {
      Insert::Created(booking) => Ok(booking),
      Insert::Conflict => Err(Error::SlotTaken),
    }
  }

  /// Cancel a booking on behalf of its owner or an administrator, freeing
  /// the slot. Authorisation is checked before anything is written.
  pub async fn cancel(&self, booking_id: Uuid, requester: &Identity) -> Result<Booking> {
    let booking = self.fetch(booking_id).await?;
    require_owner_or_admin(requester, booking.user_id)?;

    let current = booking.effective_status(self.ctx.now());
    if !current.can_transition_to(BookingStatus::Cancelled) {
      return Err(Error::InvalidTransition {
        from: current,
        to:   BookingStatus::Cancelled,
      });
    }

    let cancelled = self.transition(&booking, BookingStatus::Cancelled).await?;
    tracing::info!(
      booking_id = %booking_id,
      by = %requester.user_id,
      "booking cancelled"
    );
    Ok(cancelled)
  }

  /// Start instants held for an instructor in `[from, until)`.
  pub async fn taken_starts(
    &self,
    instructor_id: Uuid,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> Result<Vec<DateTime<Utc>>> {
    self.ctx.call(|s| s.taken_starts(instructor_id, from, until)).await
  }

  pub(crate) async fn fetch(&self, booking_id: Uuid) -> Result<Booking> {
    self
      .ctx
      .call(|s| s.get_booking(booking_id))
      .await?
      .ok_or_else(|| Error::not_found(format!("booking {booking_id}")))
  }

  /// Conditional status write keyed on the status we read. Losing a race
  /// yields [`Error::StaleStatus`] instead of overwriting the winner.
  pub(crate) async fn transition(
    &self,
    booking: &Booking,
    to: BookingStatus,
  ) -> Result<Booking> {
    let id = booking.id;
    let from = booking.status;
    self
      .ctx
      .call(|s| s.transition_booking(id, from, to))
      .await?
      .ok_or(Error::StaleStatus(id))
  }
}
