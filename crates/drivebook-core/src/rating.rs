//! Pure rating arithmetic.

use rust_decimal::{Decimal, RoundingStrategy};

/// Mean of `ratings` rounded half-up to one fraction digit, or `None` for an
/// empty slice. Uses exact decimal arithmetic, so `[5, 5, 4]` is `4.7` and a
/// true midpoint such as `4.65` never falls the wrong way.
pub fn average_rating(ratings: &[u8]) -> Option<Decimal> {
  if ratings.is_empty() {
    return None;
  }
  let total: u64 = ratings.iter().map(|&r| u64::from(r)).sum();
  let mean = Decimal::from(total) / Decimal::from(ratings.len() as u64);
  let mut rounded =
    mean.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
  rounded.rescale(1);
  Some(rounded)
}
