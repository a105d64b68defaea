//! JSON REST API for drivebook.
//!
//! Exposes an axum [`Router`] over the booking services. Authentication is
//! the caller's responsibility: whatever sits in front of this router puts an
//! [`Identity`] into the request extensions, and handlers that need a caller
//! extract it with [`CurrentUser`].
//!
//! # Mounting
//!
//! ```rust,ignore
//! .merge(drivebook_api::api_router(Arc::new(api_state)))
//! ```

pub mod admin;
pub mod bookings;
pub mod error;
pub mod instructors;
pub mod payments;
pub mod profile;

use std::sync::Arc;

use axum::{
  Router,
  extract::FromRequestParts,
  http::request::Parts,
  routing::{get, post, put},
};
use drivebook_core::{
  Error,
  admin::AdminService,
  aggregator::RatingAggregator,
  checkout::Checkout,
  context::ServiceContext,
  coordinator::BookingCoordinator,
  directory::Directory,
  identity::Identity,
  payment::PaymentProcessor,
  schedule::LessonSchedule,
  store::BookingStore,
};

pub use error::ApiError;

// ─── State ───────────────────────────────────────────────────────────────────

/// The services the handlers call, all sharing one [`ServiceContext`].
pub struct ApiState<S, P> {
  pub bookings:  BookingCoordinator<S>,
  pub ratings:   RatingAggregator<S>,
  pub checkout:  Checkout<S, P>,
  pub directory: Directory<S>,
  pub admin:     AdminService<S>,
}

impl<S: BookingStore, P: PaymentProcessor> ApiState<S, P> {
  pub fn new(
    ctx:       ServiceContext<S>,
    schedule:  LessonSchedule,
    processor: Arc<P>,
    currency:  impl Into<String>,
  ) -> Self {
    Self {
      bookings:  BookingCoordinator::new(ctx.clone(), schedule),
      ratings:   RatingAggregator::new(ctx.clone()),
      checkout:  Checkout::new(ctx.clone(), processor, currency),
      directory: Directory::new(ctx.clone()),
      admin:     AdminService::new(ctx),
    }
  }
}

// ─── Caller identity ─────────────────────────────────────────────────────────

/// The authenticated caller. Rejects with 401 when no identity was attached
/// upstream.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl<St: Send + Sync> FromRequestParts<St> for CurrentUser {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<Identity>()
      .cloned()
      .map(CurrentUser)
      .ok_or(ApiError::Core(Error::Unauthenticated))
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be merged into any parent router regardless
/// of its own state type.
pub fn api_router<S, P>(state: Arc<ApiState<S, P>>) -> Router<()>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Router::new()
    // Public catalogue
    .route("/instructors", get(instructors::list::<S, P>))
    .route("/instructors/{id}", get(instructors::get_one::<S, P>))
    .route("/instructors/{id}/slots", get(instructors::slots::<S, P>))
    .route(
      "/instructors/{id}/reviews",
      get(instructors::reviews::<S, P>).post(instructors::submit_review::<S, P>),
    )
    // Customer
    .route("/bookings", get(bookings::list::<S, P>).post(bookings::create::<S, P>))
    .route("/bookings/{id}", get(bookings::get_one::<S, P>))
    .route("/bookings/{id}/cancel", post(bookings::cancel::<S, P>))
    .route("/bookings/{id}/payment", post(payments::start::<S, P>))
    .route("/payments/confirm", post(payments::confirm::<S, P>))
    .route("/profile", get(profile::get_own::<S, P>).put(profile::update::<S, P>))
    // Administration
    .route("/admin/stats", get(admin::stats::<S, P>))
    .route("/admin/users", get(admin::users::<S, P>))
    .route("/admin/users/{id}", axum::routing::delete(admin::delete_user::<S, P>))
    .route("/admin/users/{id}/role", put(admin::set_role::<S, P>))
    .route("/admin/instructors", post(admin::create_instructor::<S, P>))
    .route(
      "/admin/instructors/{id}",
      put(admin::update_instructor::<S, P>).delete(admin::remove_instructor::<S, P>),
    )
    .route("/admin/bookings", get(admin::bookings::<S, P>))
    .route("/admin/bookings/{id}", axum::routing::delete(admin::delete_booking::<S, P>))
    .route("/admin/bookings/{id}/status", put(admin::set_booking_status::<S, P>))
    .with_state(state)
}
