//! Instructors and their public read model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The instructor record. Shares its id with the instructor's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
  pub id:           Uuid,
  pub bio:          String,
  /// Hourly lesson price in the configured currency; always positive.
  pub lesson_price: Decimal,
  /// Mean review rating with one fraction digit; `None` until the first
  /// review. Written only by the rating aggregator.
  pub rating:       Option<Decimal>,
}

/// An instructor joined with the names from their profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructorProfile {
  #[serde(flatten)]
  pub instructor: Instructor,
  pub first_name: String,
  pub last_name:  String,
  pub email:      String,
}

/// Input to [`crate::store::BookingStore::create_instructor`].
#[derive(Debug, Clone)]
pub struct NewInstructor {
  pub id:           Uuid,
  pub bio:          String,
  pub lesson_price: Decimal,
}

/// Administrative edit of an instructor and their profile names.
#[derive(Debug, Clone, Deserialize)]
pub struct InstructorPatch {
  pub first_name:   String,
  pub last_name:    String,
  pub bio:          String,
  pub lesson_price: Decimal,
}
