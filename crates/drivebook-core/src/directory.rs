//! Directory: account registration, the caller's own profile, and the public
//! instructor listing.

use uuid::Uuid;

use crate::{
  Error, Result,
  context::ServiceContext,
  identity::{Identity, Role},
  instructor::InstructorProfile,
  profile::{Credentials, NewProfile, Profile},
  store::{BookingStore, Insert},
};

pub struct Directory<S> {
  ctx: ServiceContext<S>,
}

impl<S> Clone for Directory<S> {
  fn clone(&self) -> Self { Self { ctx: self.ctx.clone() } }
}

/// Trim and require a non-empty name.
pub(crate) fn clean_name(field: &str, value: &str) -> Result<String> {
  let value = value.trim();
  if value.is_empty() {
    return Err(Error::Validation(format!("{field} is required")));
  }
  Ok(value.to_owned())
}

/// Lower-case an email and check it has the shape `local@domain`.
pub fn normalize_email(email: &str) -> Result<String> {
  let email = email.trim().to_lowercase();
  match email.split_once('@') {
    Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
    _ => Err(Error::Validation(format!("not an email address: {email:?}"))),
  }
}

impl<S: BookingStore> Directory<S> {
  pub fn new(ctx: ServiceContext<S>) -> Self { Self { ctx } }

  /// Create a customer account. `password_hash` is already hashed by the
  /// identity provider.
  pub async fn register(
    &self,
    email: &str,
    first_name: &str,
    last_name: &str,
    password_hash: String,
  ) -> Result<Profile> {
    self.register_with_role(email, first_name, last_name, password_hash, Role::User).await
  }

  /// Create an account with an explicit role; used to seed the first
  /// administrator.
  pub async fn register_with_role(
    &self,
    email: &str,
    first_name: &str,
    last_name: &str,
    password_hash: String,
    role: Role,
  ) -> Result<Profile> {
    let input = NewProfile {
      email: normalize_email(email)?,
      first_name: clean_name("first name", first_name)?,
      last_name: clean_name("last name", last_name)?,
      role,
      password_hash,
    };
    let email = input.email.clone();
    match self.ctx.call(|s| s.create_profile(input)).await? {
      Insert::Created(profile) => {
        tracing::info!(user_id = %profile.id, role = %profile.role, "profile registered");
        Ok(profile)
      }
      Insert::Conflict => Err(Error::Conflict(format!("{email} is already registered"))),
    }
  }

  /// Stored credentials for an email, for the identity provider.
  pub async fn credentials(&self, email: &str) -> Result<Option<Credentials>> {
    let email = email.trim().to_lowercase();
    self.ctx.call(|s| s.credentials(&email)).await
  }

  pub async fn profile(&self, identity: &Identity) -> Result<Profile> {
    let id = identity.user_id;
    self
      .ctx
      .call(|s| s.get_profile(id))
      .await?
      .ok_or_else(|| Error::not_found(format!("profile {id}")))
  }

  pub async fn update_names(
    &self,
    identity: &Identity,
    first_name: &str,
    last_name: &str,
  ) -> Result<Profile> {
    let first = clean_name("first name", first_name)?;
    let last = clean_name("last name", last_name)?;
    let id = identity.user_id;
    self
      .ctx
      .call(|s| s.update_profile_names(id, first, last))
      .await?
      .ok_or_else(|| Error::not_found(format!("profile {id}")))
  }

  /// Store a new password hash for the caller. Hashing and the
  /// confirmation check belong to the identity provider.
  pub async fn change_password(&self, identity: &Identity, password_hash: String) -> Result<()> {
    let id = identity.user_id;
    if !self.ctx.call(|s| s.set_password_hash(id, password_hash)).await? {
      return Err(Error::not_found(format!("profile {id}")));
    }
    tracing::info!(user_id = %id, "password changed");
    Ok(())
  }

  pub async fn instructors(&self) -> Result<Vec<InstructorProfile>> {
    self.ctx.call(|s| s.list_instructors()).await
  }

  pub async fn instructor(&self, id: Uuid) -> Result<InstructorProfile> {
    self
      .ctx
      .call(|s| s.get_instructor(id))
      .await?
      .ok_or_else(|| Error::not_found(format!("instructor {id}")))
  }
}
