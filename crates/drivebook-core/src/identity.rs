//! Authenticated identities and the single capability-check boundary.
//!
//! Services never read ambient session state: every operation takes the
//! caller's [`Identity`] as a parameter, supplied by whatever identity
//! provider fronts the service.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Role carried by a profile.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  #[default]
  User,
  Instructor,
  Admin,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::User => "user",
      Self::Instructor => "instructor",
      Self::Admin => "admin",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "user" => Ok(Self::User),
      "instructor" => Ok(Self::Instructor),
      "admin" => Ok(Self::Admin),
      other => Err(Error::Validation(format!("unknown role: {other:?}"))),
    }
  }
}

/// The caller of a service operation, as vouched for by the identity
/// provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub user_id: Uuid,
  pub email:   String,
  pub role:    Role,
}

impl Identity {
  pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

/// Succeeds only when `identity` holds exactly `role`. Called once at the
/// entry of every privileged operation, before any read or write.
pub fn require_role(identity: &Identity, role: Role) -> Result<()> {
  if identity.role == role {
    Ok(())
  } else {
    Err(Error::Forbidden(format!("{role} role required")))
  }
}

/// Succeeds when `identity` owns the resource or is an administrator.
pub fn require_owner_or_admin(identity: &Identity, owner: Uuid) -> Result<()> {
  if identity.user_id == owner || identity.is_admin() {
    Ok(())
  } else {
    Err(Error::Forbidden("not the owner of this resource".into()))
  }
}
