//! Booking coordinator: validates a lesson request end-to-end and reserves
//! it against the ledger.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  booking::{Booking, BookingView},
  context::ServiceContext,
  identity::{Identity, require_owner_or_admin},
  ledger::SlotLedger,
  schedule::LessonSchedule,
  store::{BookingQuery, BookingStore},
};

/// A customer's request for a lesson, in the school's local time.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
  pub instructor_id: Uuid,
  pub lesson_date:   NaiveDate,
  pub lesson_time:   NaiveTime,
}

/// A freshly reserved booking and the reference the payment step uses.
#[derive(Debug, Clone, Serialize)]
pub struct BookingConfirmation {
  pub booking:                Booking,
  pub confirmation_reference: String,
}

pub struct BookingCoordinator<S> {
  ctx:      ServiceContext<S>,
  ledger:   SlotLedger<S>,
  schedule: LessonSchedule,
}

impl<S> Clone for BookingCoordinator<S> {
  fn clone(&self) -> Self {
    Self {
      ctx:      self.ctx.clone(),
      ledger:   self.ledger.clone(),
      schedule: self.schedule,
    }
  }
}

impl<S: BookingStore> BookingCoordinator<S> {
  pub fn new(ctx: ServiceContext<S>, schedule: LessonSchedule) -> Self {
    Self { ledger: SlotLedger::new(ctx.clone()), ctx, schedule }
  }

  pub fn ledger(&self) -> &SlotLedger<S> { &self.ledger }

  pub fn schedule(&self) -> &LessonSchedule { &self.schedule }

  /// Reserve a lesson. Checks run in a fixed order: past instant, closed
  /// day, lesson grid, instructor existence, then the ledger insert.
  pub async fn book(
    &self,
    customer: &Identity,
    request: BookingRequest,
  ) -> Result<BookingConfirmation> {
    let start = self.schedule.resolve(request.lesson_date, request.lesson_time)?;
    if start <= self.ctx.now() {
      return Err(Error::PastBooking);
    }
    if self.schedule.is_closed(request.lesson_date) {
      return Err(Error::ClosedDay(self.schedule.closed_day));
    }
    if !self.schedule.is_on_grid(request.lesson_time) {
      return Err(Error::Validation(format!(
        "{} is not a bookable lesson time",
        request.lesson_time.format("%H:%M")
      )));
    }

    let instructor_id = request.instructor_id;
    self
      .ctx
      .call(|s| s.get_instructor(instructor_id))
      .await?
      .ok_or_else(|| Error::not_found(format!("instructor {instructor_id}")))?;

    let booking = self
      .ledger
      .reserve(instructor_id, customer.user_id, start)
      .await?;

    tracing::info!(
      booking_id = %booking.id,
      instructor_id = %instructor_id,
      customer_id = %customer.user_id,
      start = %booking.start_time,
      "booking reserved"
    );

    Ok(BookingConfirmation {
      confirmation_reference: booking.confirmation_ref.clone(),
      booking,
    })
  }

  /// Cancel on behalf of the owner or an administrator.
  pub async fn cancel(&self, requester: &Identity, booking_id: Uuid) -> Result<BookingView> {
    let booking = self.ledger.cancel(booking_id, requester).await?;
    Ok(booking.view(self.ctx.now()))
  }

  /// The caller's bookings, soonest first.
  pub async fn my_bookings(&self, customer: &Identity) -> Result<Vec<BookingView>> {
    let query = BookingQuery {
      user_id: Some(customer.user_id),
      ..BookingQuery::default()
    };
    let now = self.ctx.now();
    let bookings = self.ctx.call(|s| s.list_bookings(&query)).await?;
    Ok(bookings.into_iter().map(|b| b.view(now)).collect())
  }

  /// One booking, visible to its owner and to administrators.
  pub async fn booking(&self, requester: &Identity, booking_id: Uuid) -> Result<BookingView> {
    let booking = self.ledger.fetch(booking_id).await?;
    require_owner_or_admin(requester, booking.user_id)?;
    Ok(booking.view(self.ctx.now()))
  }

  /// Grid times on `date` that are still in the future and not held by a
  /// live booking. A closed day has no slots.
  pub async fn available_slots(
    &self,
    instructor_id: Uuid,
    date: NaiveDate,
  ) -> Result<Vec<NaiveTime>> {
    self
      .ctx
      .call(|s| s.get_instructor(instructor_id))
      .await?
      .ok_or_else(|| Error::not_found(format!("instructor {instructor_id}")))?;

    if self.schedule.is_closed(date) {
      return Ok(Vec::new());
    }

    let day_start = self.schedule.resolve(date, NaiveTime::MIN)?;
    let day_end = day_start + Duration::days(1);
    let taken = self
      .ledger
      .taken_starts(instructor_id, day_start, day_end)
      .await?;
    let now = self.ctx.now();

    let mut free = Vec::new();
    for time in self.schedule.slots() {
      let instant = self.schedule.resolve(date, time)?;
      if instant > now && !taken.contains(&instant) {
        free.push(time);
      }
    }
    Ok(free)
  }
}
