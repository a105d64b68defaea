//! Bookings: the entries of the slot reservation ledger.
//!
//! A booking occupies one slot: an (instructor, start instant) pair. Status
//! moves along a small state machine; `completed` is usually derived from the
//! clock rather than written.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status of a booking.
///
/// ```text
/// pending ──(payment / admin)──▶ confirmed ──(start passes)──▶ completed
///    │                              │
///    └──────(owner / admin)─────────┴──────────▶ cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
  Pending,
  Confirmed,
  Cancelled,
  Completed,
}

impl BookingStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Confirmed => "confirmed",
      Self::Cancelled => "cancelled",
      Self::Completed => "completed",
    }
  }

  /// `cancelled` and `completed` admit no further transitions.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Cancelled | Self::Completed)
  }

  /// Whether the slot is held. Only cancelled bookings release it.
  pub fn holds_slot(self) -> bool { self != Self::Cancelled }

  /// Edges of the state machine available to customers and the payment
  /// flow.
  pub fn can_transition_to(self, next: Self) -> bool {
    matches!(
      (self, next),
      (Self::Pending, Self::Confirmed)
        | (Self::Pending, Self::Cancelled)
        | (Self::Confirmed, Self::Cancelled)
        | (Self::Confirmed, Self::Completed)
    )
  }

  /// Administrators may move a live booking to any other status, but a
  /// terminal booking is never revived.
  pub fn admin_can_transition_to(self, next: Self) -> bool {
    !self.is_terminal() && self != next
  }
}

impl fmt::Display for BookingStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BookingStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(Self::Pending),
      "confirmed" => Ok(Self::Confirmed),
      "cancelled" => Ok(Self::Cancelled),
      "completed" => Ok(Self::Completed),
      other => Err(Error::Validation(format!("unknown booking status: {other:?}"))),
    }
  }
}

// ─── Booking ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
  pub id:               Uuid,
  /// The customer who owns the booking.
  pub user_id:          Uuid,
  pub instructor_id:    Uuid,
  pub start_time:       DateTime<Utc>,
  pub status:           BookingStatus,
  pub confirmation_ref: String,
  pub created_at:       DateTime<Utc>,
}

impl Booking {
  /// Status as seen at `now`: a confirmed lesson whose start has passed is
  /// `completed` even if that was never written.
  pub fn effective_status(&self, now: DateTime<Utc>) -> BookingStatus {
    match self.status {
      BookingStatus::Confirmed if self.start_time <= now => {
        BookingStatus::Completed
      }
      status => status,
    }
  }

  pub fn view(self, now: DateTime<Utc>) -> BookingView {
    let status = self.effective_status(now);
    BookingView { booking: self, effective_status: status }
  }
}

/// A booking bundled with its status as of read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingView {
  #[serde(flatten)]
  pub booking:          Booking,
  pub effective_status: BookingStatus,
}

/// Input to [`crate::store::BookingStore::reserve`]. Every field is decided
/// by the caller so the insert is a single statement.
#[derive(Debug, Clone)]
pub struct NewBooking {
  pub id:               Uuid,
  pub user_id:          Uuid,
  pub instructor_id:    Uuid,
  pub start_time:       DateTime<Utc>,
  pub confirmation_ref: String,
  pub created_at:       DateTime<Utc>,
}

impl NewBooking {
  /// A fresh `pending` booking request with a derived confirmation
  /// reference.
  pub fn new(
    user_id: Uuid,
    instructor_id: Uuid,
    start_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
  ) -> Self {
    let id = Uuid::new_v4();
    Self {
      id,
      user_id,
      instructor_id,
      start_time,
      confirmation_ref: confirmation_reference(id, user_id, created_at),
      created_at,
    }
  }

  pub fn into_booking(self) -> Booking {
    Booking {
      id:               self.id,
      user_id:          self.user_id,
      instructor_id:    self.instructor_id,
      start_time:       self.start_time,
      status:           BookingStatus::Pending,
      confirmation_ref: self.confirmation_ref,
      created_at:       self.created_at,
    }
  }
}

/// Opaque 32-hex-char token identifying a booking to the payment step.
///
/// SHA-256 over the booking id, the owner and the creation instant,
/// truncated to 128 bits.
pub fn confirmation_reference(
  booking_id: Uuid,
  user_id: Uuid,
  created_at: DateTime<Utc>,
) -> String {
  let mut hasher = Sha256::new();
  hasher.update(booking_id.as_bytes());
  hasher.update(user_id.as_bytes());
  hasher.update(created_at.timestamp_micros().to_le_bytes());
  let hash = hasher.finalize();
  hex::encode(&hash[..16])
}
