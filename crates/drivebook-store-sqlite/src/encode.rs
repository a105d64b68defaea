//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings in UTC, except booking start instants, which are
//! unix seconds so that slot equality is exact. Decimals are stored as their
//! canonical string form. UUIDs are hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use drivebook_core::{
  booking::{Booking, BookingStatus},
  identity::Role,
  instructor::{Instructor, InstructorProfile},
  profile::Profile,
  review::Review,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width so that lexical order matches chronological order.
pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Slot instants are compared for equality, so sub-second precision is
/// dropped on the way in.
pub fn encode_start(dt: DateTime<Utc>) -> i64 { dt.timestamp() }

pub fn decode_start(secs: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp(secs, 0)
    .ok_or_else(|| Error::DateParse(format!("start_time out of range: {secs}")))
}

// ─── Decimal ─────────────────────────────────────────────────────────────────

pub fn encode_decimal(d: Decimal) -> String { d.to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_role(s: &str) -> Result<Role> { Ok(s.parse()?) }

pub fn decode_status(s: &str) -> Result<BookingStatus> { Ok(s.parse()?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PROFILE_COLUMNS: &str = "id, email, first_name, last_name, role, created_at";

/// Raw strings read directly from a `profiles` row.
pub struct RawProfile {
  pub id:         String,
  pub email:      String,
  pub first_name: String,
  pub last_name:  String,
  pub role:       String,
  pub created_at: String,
}

impl RawProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      email:      row.get(1)?,
      first_name: row.get(2)?,
      last_name:  row.get(3)?,
      role:       row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      id:         decode_uuid(&self.id)?,
      email:      self.email,
      first_name: self.first_name,
      last_name:  self.last_name,
      role:       decode_role(&self.role)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const INSTRUCTOR_SELECT: &str = "
  SELECT i.id, i.bio, i.lesson_price, i.rating, p.first_name, p.last_name, p.email
  FROM instructors i
  JOIN profiles p ON p.id = i.id";

/// Raw strings from an `instructors` row joined with its profile.
pub struct RawInstructor {
  pub id:           String,
  pub bio:          String,
  pub lesson_price: String,
  pub rating:       Option<String>,
  pub first_name:   String,
  pub last_name:    String,
  pub email:        String,
}

impl RawInstructor {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      bio:          row.get(1)?,
      lesson_price: row.get(2)?,
      rating:       row.get(3)?,
      first_name:   row.get(4)?,
      last_name:    row.get(5)?,
      email:        row.get(6)?,
    })
  }

  pub fn into_instructor(self) -> Result<InstructorProfile> {
    Ok(InstructorProfile {
      instructor: Instructor {
        id:           decode_uuid(&self.id)?,
        bio:          self.bio,
        lesson_price: decode_decimal(&self.lesson_price)?,
        rating:       self.rating.as_deref().map(decode_decimal).transpose()?,
      },
      first_name: self.first_name,
      last_name:  self.last_name,
      email:      self.email,
    })
  }
}

pub const BOOKING_COLUMNS: &str =
  "id, user_id, instructor_id, start_time, status, confirmation_ref, created_at";

/// Raw values read directly from a `bookings` row.
pub struct RawBooking {
  pub id:               String,
  pub user_id:          String,
  pub instructor_id:    String,
  pub start_time:       i64,
  pub status:           String,
  pub confirmation_ref: String,
  pub created_at:       String,
}

impl RawBooking {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      user_id:          row.get(1)?,
      instructor_id:    row.get(2)?,
      start_time:       row.get(3)?,
      status:           row.get(4)?,
      confirmation_ref: row.get(5)?,
      created_at:       row.get(6)?,
    })
  }

  pub fn into_booking(self) -> Result<Booking> {
    Ok(Booking {
      id:               decode_uuid(&self.id)?,
      user_id:          decode_uuid(&self.user_id)?,
      instructor_id:    decode_uuid(&self.instructor_id)?,
      start_time:       decode_start(self.start_time)?,
      status:           decode_status(&self.status)?,
      confirmation_ref: self.confirmation_ref,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

pub const REVIEW_COLUMNS: &str =
  "id, instructor_id, client_id, rating, review_text, created_at";

/// Raw values read directly from an `instructor_reviews` row.
pub struct RawReview {
  pub id:            String,
  pub instructor_id: String,
  pub client_id:     String,
  pub rating:        i64,
  pub review_text:   Option<String>,
  pub created_at:    String,
}

impl RawReview {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      instructor_id: row.get(1)?,
      client_id:     row.get(2)?,
      rating:        row.get(3)?,
      review_text:   row.get(4)?,
      created_at:    row.get(5)?,
    })
  }

  pub fn into_review(self) -> Result<Review> {
    Ok(Review {
      id:            decode_uuid(&self.id)?,
      instructor_id: decode_uuid(&self.instructor_id)?,
      client_id:     decode_uuid(&self.client_id)?,
      rating:        decode_rating(self.rating)?,
      review_text:   self.review_text,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub fn decode_rating(raw: i64) -> Result<u8> {
  u8::try_from(raw)
    .ok()
    .filter(|r| (1..=5).contains(r))
    .ok_or(Error::RatingRange(raw))
}
