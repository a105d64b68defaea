//! HTTP Basic identity provider.
//!
//! Credentials are `email:password`, checked against the argon2 hash stored
//! on the profile. A request without an `Authorization` header passes through
//! anonymously (public routes still work, protected ones answer 401); a
//! request with bad credentials is rejected outright.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  extract::{Request, State},
  http::{HeaderMap, header},
  middleware::Next,
  response::{IntoResponse, Response},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use drivebook_core::{
  directory::Directory, identity::Identity, payment::PaymentProcessor, store::BookingStore,
};
use rand_core::OsRng;

use crate::{AppState, error::Error};

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash a new password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, Error> {
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(Error::BadRequest(format!(
      "password must be at least {MIN_PASSWORD_LEN} characters"
    )));
  }
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| Error::Hash(e.to_string()))
}

/// Check that `password` and its confirmation agree, then hash it.
pub fn hash_confirmed_password(password: &str, confirm_password: &str) -> Result<String, Error> {
  if password != confirm_password {
    return Err(Error::BadRequest("passwords do not match".into()));
  }
  hash_password(password)
}

/// Split a Basic `Authorization` header into `(email, password)`.
///
/// Returns `Ok(None)` when the header is absent.
pub fn basic_credentials(headers: &HeaderMap) -> Result<Option<(String, String)>, Error> {
  let Some(value) = headers.get(header::AUTHORIZATION) else {
    return Ok(None);
  };
  let value   = value.to_str().map_err(|_| Error::Unauthorized)?;
  let encoded = value.strip_prefix("Basic ").ok_or(Error::Unauthorized)?;
  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds   = String::from_utf8(decoded).map_err(|_| Error::Unauthorized)?;

  let (email, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;
  Ok(Some((email.to_owned(), password.to_owned())))
}

/// Check `email`/`password` against the directory.
pub async fn verify<S: BookingStore>(
  directory: &Directory<S>,
  email:     &str,
  password:  &str,
) -> Result<Identity, Error> {
  let creds = directory
    .credentials(email)
    .await
    .map_err(drivebook_api::ApiError::from)?
    .ok_or(Error::Unauthorized)?;

  let parsed_hash = PasswordHash::new(&creds.password_hash).map_err(|_| Error::Unauthorized)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthorized)?;

  Ok(creds.profile.identity())
}

/// Middleware: attach the caller's [`Identity`] to the request extensions.
pub async fn identify<S, P>(
  State(state): State<AppState<S, P>>,
  mut req: Request,
  next: Next,
) -> Response
where
  S: BookingStore + 'static,
  P: PaymentProcessor + 'static,
{
  let creds = match basic_credentials(req.headers()) {
    Ok(c) => c,
    Err(e) => return e.into_response(),
  };
  if let Some((email, password)) = creds {
    match verify(&state.api.directory, &email, &password).await {
      Ok(identity) => {
        tracing::debug!(user_id = %identity.user_id, role = %identity.role, "authenticated");
        req.extensions_mut().insert(identity);
      }
      Err(e) => {
        tracing::info!(email = %email, "rejected credentials");
        return e.into_response();
      }
    }
  }
  next.run(req).await
}
