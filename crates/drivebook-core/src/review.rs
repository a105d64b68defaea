//! Reviews: the append-only event stream the rating is derived from.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable review of an instructor by a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
  pub id:            Uuid,
  pub instructor_id: Uuid,
  pub client_id:     Uuid,
  /// Always in `1..=5`.
  pub rating:        u8,
  pub review_text:   Option<String>,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`crate::store::BookingStore::insert_review`].
#[derive(Debug, Clone)]
pub struct NewReview {
  pub instructor_id: Uuid,
  pub client_id:     Uuid,
  pub rating:        u8,
  pub review_text:   Option<String>,
}

/// What happened to the instructor's rating after a review was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RatingRefresh {
  /// The new rating (absent only if the review set was somehow empty).
  Updated { rating: Option<Decimal> },
  /// Recomputation failed; the review itself is kept.
  Failed { error: String },
}

/// Result of [`crate::aggregator::RatingAggregator::submit_review`]. The
/// review write and the rating refresh are reported separately.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewReceipt {
  pub review: Review,
  pub rating: RatingRefresh,
}
