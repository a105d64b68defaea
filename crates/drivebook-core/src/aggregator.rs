//! Rating aggregator: keeps `Instructor::rating` in step with the review set.
//!
//! The rating is a materialised value recomputed on every review write.
//! Recomputation reads the whole review set, so it is idempotent and a
//! concurrent review at worst leaves a briefly stale value.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
  Error, Result,
  context::ServiceContext,
  identity::Identity,
  rating::average_rating,
  review::{NewReview, RatingRefresh, Review, ReviewReceipt},
  store::BookingStore,
};

/// Longest review text accepted.
pub const MAX_REVIEW_LEN: usize = 2000;

pub struct RatingAggregator<S> {
  ctx: ServiceContext<S>,
}

impl<S> Clone for RatingAggregator<S> {
  fn clone(&self) -> Self { Self { ctx: self.ctx.clone() } }
}

impl<S: BookingStore> RatingAggregator<S> {
  pub fn new(ctx: ServiceContext<S>) -> Self { Self { ctx } }

  /// Recompute and store an instructor's rating from all of their reviews.
  /// No reviews means an absent rating, never zero.
  pub async fn recompute(&self, instructor_id: Uuid) -> Result<Option<Decimal>> {
    let ratings = self.ctx.call(|s| s.review_ratings(instructor_id)).await?;
    let rating = average_rating(&ratings);

    let found = self
      .ctx
      .call(|s| s.set_instructor_rating(instructor_id, rating))
      .await?;
    if !found {
      return Err(Error::not_found(format!("instructor {instructor_id}")));
    }

    tracing::debug!(
      instructor_id = %instructor_id,
      reviews = ratings.len(),
      rating = ?rating,
      "instructor rating recomputed"
    );
    Ok(rating)
  }

  /// Store a review, then refresh the rating. A failed refresh is reported
  /// in the receipt and does not undo the review.
  pub async fn submit_review(
    &self,
    client: &Identity,
    instructor_id: Uuid,
    rating: u8,
    review_text: Option<String>,
  ) -> Result<ReviewReceipt> {
    if !(1..=5).contains(&rating) {
      return Err(Error::Validation(format!(
        "rating must be between 1 and 5, got {rating}"
      )));
    }
    if client.user_id == instructor_id {
      return Err(Error::Validation("instructors cannot review themselves".into()));
    }
    let review_text = review_text
      .map(|t| t.trim().to_owned())
      .filter(|t| !t.is_empty());
    if review_text.as_ref().is_some_and(|t| t.chars().count() > MAX_REVIEW_LEN) {
      return Err(Error::Validation(format!(
        "review text exceeds {MAX_REVIEW_LEN} characters"
      )));
    }

    self
      .ctx
      .call(|s| s.get_instructor(instructor_id))
      .await?
      .ok_or_else(|| Error::not_found(format!("instructor {instructor_id}")))?;

    let input = NewReview {
      instructor_id,
      client_id: client.user_id,
      rating,
      review_text,
    };
    let review = self.ctx.call(|s| s.insert_review(input)).await?;
    tracing::info!(
      review_id = %review.id,
      instructor_id = %instructor_id,
      rating,
      "review stored"
    );

    let refresh = match self.recompute(instructor_id).await {
      Ok(rating) => RatingRefresh::Updated { rating },
      Err(e) => {
        tracing::warn!(
          instructor_id = %instructor_id,
          error = %e,
          "rating recomputation failed after review insert"
        );
        RatingRefresh::Failed { error: e.to_string() }
      }
    };

    Ok(ReviewReceipt { review, rating: refresh })
  }

  /// An instructor's reviews, newest first.
  pub async fn reviews(&self, instructor_id: Uuid) -> Result<Vec<Review>> {
    self.ctx.call(|s| s.list_reviews(instructor_id)).await
  }
}
