//! HTTP server for drivebook.
//!
//! Wraps the [`drivebook_api`] router with an HTTP Basic identity layer,
//! account registration and request tracing, and provides the Stripe
//! implementation of [`PaymentProcessor`].

pub mod auth;
pub mod error;
pub mod stripe;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Json, Router,
  extract::State,
  http::StatusCode,
  middleware,
  response::IntoResponse,
  routing::{get, post, put},
};
use drivebook_api::{ApiState, CurrentUser, api_router};
use drivebook_core::{
  payment::PaymentProcessor, profile::Profile, schedule::LessonSchedule, store::BookingStore,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use stripe::StripeConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `DRIVEBOOK_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  #[serde(default)]
  pub schedule:            LessonSchedule,
  /// Deadline for each storage or payment call, in milliseconds.
  #[serde(default = "default_upstream_timeout_ms")]
  pub upstream_timeout_ms: u64,
  /// ISO currency code lessons are charged in.
  #[serde(default = "default_currency")]
  pub currency:            String,
  pub stripe:              StripeConfig,
  /// Administrator account created at startup if its email is unused.
  #[serde(default)]
  pub bootstrap_admin:     Option<BootstrapAdmin>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapAdmin {
  pub email:         String,
  pub first_name:    String,
  pub last_name:     String,
  /// argon2 PHC string, as printed by `--hash-password`.
  pub password_hash: String,
}

fn default_host() -> String { "127.0.0.1".into() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("drivebook.db") }

fn default_upstream_timeout_ms() -> u64 { 10_000 }

fn default_currency() -> String { "zar".into() }

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the server's own handlers.
pub struct AppState<S, P> {
  pub api: Arc<ApiState<S, P>>,
}

impl<S, P> Clone for AppState<S, P> {
  fn clone(&self) -> Self { Self { api: Arc::clone(&self.api) } }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router: account routes, the JSON API, the
/// identity layer and request tracing.
pub fn router<S, P>(state: AppState<S, P>) -> Router
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  Router::new()
    .route("/auth/register", post(register::<S, P>))
    .route("/auth/session",  get(session::<S, P>))
    .route("/profile/password", put(change_password::<S, P>))
    .with_state(state.clone())
    .merge(api_router(Arc::clone(&state.api)))
    .layer(middleware::from_fn_with_state(state, auth::identify::<S, P>))
    .layer(TraceLayer::new_for_http())
}

// ─── Account handlers ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub email:      String,
  pub password:   String,
  pub first_name: String,
  pub last_name:  String,
}

/// `POST /auth/register`: create a customer account; 201 + profile.
async fn register<S, P>(
  State(state): State<AppState<S, P>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, Error>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  let hash = auth::hash_password(&body.password)?;
  let profile = state
    .api
    .directory
    .register(&body.email, &body.first_name, &body.last_name, hash)
    .await
    .map_err(drivebook_api::ApiError::from)?;
  Ok((StatusCode::CREATED, Json(profile)))
}

/// `GET /auth/session`: the authenticated caller's profile.
async fn session<S, P>(
  State(state): State<AppState<S, P>>,
  CurrentUser(who): CurrentUser,
) -> Result<Json<Profile>, Error>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  let profile = state
    .api
    .directory
    .profile(&who)
    .await
    .map_err(drivebook_api::ApiError::from)?;
  Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct PasswordBody {
  pub password:         String,
  pub confirm_password: String,
}

/// `PUT /profile/password`: replace the caller's password; 204.
async fn change_password<S, P>(
  State(state): State<AppState<S, P>>,
  CurrentUser(who): CurrentUser,
  Json(body): Json<PasswordBody>,
) -> Result<StatusCode, Error>
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  let hash = auth::hash_confirmed_password(&body.password, &body.confirm_password)?;
  state
    .api
    .directory
    .change_password(&who, hash)
    .await
    .map_err(drivebook_api::ApiError::from)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Integration tests ────────────────────────────────────────────────────────
