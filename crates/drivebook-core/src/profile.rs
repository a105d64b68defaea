//! Profiles, one per registered account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{Identity, Role};

/// A registered account. Instructors and administrators are profiles with the
/// corresponding role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub id:         Uuid,
  pub email:      String,
  pub first_name: String,
  pub last_name:  String,
  pub role:       Role,
  pub created_at: DateTime<Utc>,
}

impl Profile {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }

  pub fn identity(&self) -> Identity {
    Identity {
      user_id: self.id,
      email:   self.email.clone(),
      role:    self.role,
    }
  }
}

/// Input to [`crate::store::BookingStore::create_profile`].
#[derive(Debug, Clone)]
pub struct NewProfile {
  pub email:         String,
  pub first_name:    String,
  pub last_name:     String,
  pub role:          Role,
  /// argon2 PHC string; hashing is the identity provider's job.
  pub password_hash: String,
}

/// A profile with its stored password hash, for credential checks.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub profile:       Profile,
  pub password_hash: String,
}
