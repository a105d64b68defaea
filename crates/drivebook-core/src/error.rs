//! Error types for `drivebook-core`.
//!
//! Every service operation returns [`Result`]; callers (the HTTP layer) map
//! the variants onto responses. Nothing in this crate panics on bad input.

use thiserror::Error;
use uuid::Uuid;

use crate::booking::BookingStatus;

/// Boxed backend error, as produced by a store or a payment processor.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("booking must be in the future")]
  PastBooking,

  #[error("bookings are not available on {0}")]
  ClosedDay(chrono::Weekday),

  #[error("this time slot is already booked")]
  SlotTaken,

  #[error("{0} not found")]
  NotFound(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("authentication required")]
  Unauthenticated,

  #[error("upstream call timed out")]
  UpstreamTimeout,

  #[error("invalid input: {0}")]
  Validation(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("cannot move booking from {from} to {to}")]
  InvalidTransition {
    from: BookingStatus,
    to:   BookingStatus,
  },

  /// A conditional status update matched no row: someone else changed the
  /// booking between our read and our write.
  #[error("booking {0} was modified concurrently")]
  StaleStatus(Uuid),

  #[error("payment has not completed")]
  PaymentIncomplete,

  #[error("payment processor error: {0}")]
  Payment(#[source] BoxError),

  #[error("storage error: {0}")]
  Storage(#[source] BoxError),
}

impl Error {
  pub fn not_found(what: impl std::fmt::Display) -> Self {
    Self::NotFound(what.to_string())
  }

  /// Stable machine-readable name for the variant.
  pub fn code(&self) -> &'static str {
    match self {
      Self::PastBooking => "past_booking",
      Self::ClosedDay(_) => "closed_day",
      Self::SlotTaken => "slot_taken",
      Self::NotFound(_) => "not_found",
      Self::Forbidden(_) => "forbidden",
      Self::Unauthenticated => "unauthenticated",
      Self::UpstreamTimeout => "upstream_timeout",
      Self::Validation(_) => "validation",
      Self::Conflict(_) => "conflict",
      Self::InvalidTransition { .. } => "invalid_transition",
      Self::StaleStatus(_) => "stale_status",
      Self::PaymentIncomplete => "payment_incomplete",
      Self::Payment(_) => "payment",
      Self::Storage(_) => "storage",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
