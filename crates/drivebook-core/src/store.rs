//! The `BookingStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `drivebook-store-sqlite`). The services in this crate depend on this
//! abstraction, not on any concrete backend.
//!
//! Conditions that the services must react to (a taken slot, a duplicate
//! email, a status that changed under us) come back as values, not as
//! `Self::Error`; the error type is reserved for genuine backend failures.

use std::future::Future;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
  booking::{Booking, BookingStatus, NewBooking},
  identity::Role,
  instructor::{Instructor, InstructorPatch, InstructorProfile, NewInstructor},
  profile::{Credentials, NewProfile, Profile},
  review::{NewReview, Review},
};

// ─── Outcome and query types ─────────────────────────────────────────────────

/// Outcome of an insert guarded by a uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insert<T> {
  Created(T),
  /// The storage layer rejected the row because it would violate a unique
  /// key.
  Conflict,
}

/// Filter for [`BookingStore::list_bookings`]. Empty means all bookings.
#[derive(Debug, Clone, Default)]
pub struct BookingQuery {
  pub user_id:       Option<Uuid>,
  pub instructor_id: Option<Uuid>,
  pub status:        Option<BookingStatus>,
}

/// Row counts for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
  pub users:            u64,
  pub instructors:      u64,
  pub bookings:         u64,
  pub pending_bookings: u64,
  pub reviews:          u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the relational storage behind the booking service.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait BookingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Profiles ──────────────────────────────────────────────────────────

  /// Insert a profile; [`Insert::Conflict`] if the email is taken.
  fn create_profile(
    &self,
    input: NewProfile,
  ) -> impl Future<Output = Result<Insert<Profile>, Self::Error>> + Send + '_;

  fn get_profile(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  fn find_profile_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + 'a;

  /// The profile and stored password hash for `email`.
  fn credentials<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Credentials>, Self::Error>> + Send + 'a;

  fn list_profiles(
    &self,
  ) -> impl Future<Output = Result<Vec<Profile>, Self::Error>> + Send + '_;

  /// Returns the updated profile, or `None` if it does not exist.
  fn update_profile_names(
    &self,
    id: Uuid,
    first_name: String,
    last_name: String,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  /// Replace the stored password hash. Returns `false` if the profile does
  /// not exist.
  fn set_password_hash(
    &self,
    id: Uuid,
    password_hash: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Returns the updated profile, or `None` if it does not exist.
  fn set_role(
    &self,
    id: Uuid,
    role: Role,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  /// Delete a profile and every row that references it (bookings as
  /// customer or instructor, reviews given or received, the instructor
  /// record) as one transaction.
  ///
  /// Returns `None` if the profile does not exist, otherwise the
  /// instructors whose review sets lost a review and whose ratings are now
  /// stale.
  fn delete_user(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Vec<Uuid>>, Self::Error>> + Send + '_;

  // ── Instructors ───────────────────────────────────────────────────────

  /// Insert an instructor record with an absent rating; [`Insert::Conflict`]
  /// if one already exists for that profile.
  fn create_instructor(
    &self,
    input: NewInstructor,
  ) -> impl Future<Output = Result<Insert<Instructor>, Self::Error>> + Send + '_;

  fn get_instructor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<InstructorProfile>, Self::Error>> + Send + '_;

  fn list_instructors(
    &self,
  ) -> impl Future<Output = Result<Vec<InstructorProfile>, Self::Error>> + Send + '_;

  /// Update bio, price and profile names in one transaction.
  fn update_instructor(
    &self,
    id: Uuid,
    patch: InstructorPatch,
  ) -> impl Future<Output = Result<Option<InstructorProfile>, Self::Error>> + Send + '_;

  /// Delete the instructor's bookings, reviews and record and demote the
  /// profile to [`Role::User`], as one transaction. Returns `false` if no
  /// instructor record exists.
  fn remove_instructor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Overwrite the materialised rating. Returns `false` if the instructor
  /// does not exist.
  fn set_instructor_rating(
    &self,
    id: Uuid,
    rating: Option<Decimal>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Slot ledger ───────────────────────────────────────────────────────

  /// Insert a `pending` booking as a single conditional write.
  /// [`Insert::Conflict`] if a non-cancelled booking already holds the slot.
  fn reserve(
    &self,
    input: NewBooking,
  ) -> impl Future<Output = Result<Insert<Booking>, Self::Error>> + Send + '_;

  /// True iff a non-cancelled booking exists at exactly `start_time`.
  fn is_taken(
    &self,
    instructor_id: Uuid,
    start_time: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Start instants of non-cancelled bookings in `[from, until)`.
  fn taken_starts(
    &self,
    instructor_id: Uuid,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DateTime<Utc>>, Self::Error>> + Send + '_;

  fn get_booking(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Booking>, Self::Error>> + Send + '_;

  fn find_booking_by_reference<'a>(
    &'a self,
    reference: &'a str,
  ) -> impl Future<Output = Result<Option<Booking>, Self::Error>> + Send + 'a;

  /// Bookings matching `query`, soonest start first.
  fn list_bookings<'a>(
    &'a self,
    query: &'a BookingQuery,
  ) -> impl Future<Output = Result<Vec<Booking>, Self::Error>> + Send + 'a;

  /// Set `to` only if the booking's current status is still `from`.
  /// Returns the updated booking, or `None` when no row matched.
  fn transition_booking(
    &self,
    id: Uuid,
    from: BookingStatus,
    to: BookingStatus,
  ) -> impl Future<Output = Result<Option<Booking>, Self::Error>> + Send + '_;

  /// Hard delete. Returns `false` if the booking did not exist.
  fn delete_booking(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Reviews ───────────────────────────────────────────────────────────

  /// Append a review; the store assigns id and timestamp.
  fn insert_review(
    &self,
    input: NewReview,
  ) -> impl Future<Output = Result<Review, Self::Error>> + Send + '_;

  /// Reviews of an instructor, newest first.
  fn list_reviews(
    &self,
    instructor_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Review>, Self::Error>> + Send + '_;

  /// Just the integer ratings of an instructor's reviews.
  fn review_ratings(
    &self,
    instructor_id: Uuid,
  ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send + '_;

  // ── Counts ────────────────────────────────────────────────────────────

  fn stats(
    &self,
  ) -> impl Future<Output = Result<DashboardStats, Self::Error>> + Send + '_;
}
