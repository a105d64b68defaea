//! Administrative operations. Each one calls [`require_role`] with
//! [`Role::Admin`] before touching storage.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
  Error, Result,
  aggregator::RatingAggregator,
  booking::{Booking, BookingStatus, BookingView},
  context::ServiceContext,
  directory::{clean_name, normalize_email},
  identity::{Identity, Role, require_role},
  instructor::{Instructor, InstructorPatch, InstructorProfile, NewInstructor},
  ledger::SlotLedger,
  profile::Profile,
  store::{BookingQuery, BookingStore, DashboardStats, Insert},
};

pub struct AdminService<S> {
  ctx:     ServiceContext<S>,
  ledger:  SlotLedger<S>,
  ratings: RatingAggregator<S>,
}

impl<S> Clone for AdminService<S> {
  fn clone(&self) -> Self {
    Self {
      ctx:     self.ctx.clone(),
      ledger:  self.ledger.clone(),
      ratings: self.ratings.clone(),
    }
  }
}

fn positive_price(price: Decimal) -> Result<Decimal> {
  if price > Decimal::ZERO {
    Ok(price)
  } else {
    Err(Error::Validation(format!("lesson price must be positive, got {price}")))
  }
}

impl<S: BookingStore> AdminService<S> {
  pub fn new(ctx: ServiceContext<S>) -> Self {
    Self {
      ledger: SlotLedger::new(ctx.clone()),
      ratings: RatingAggregator::new(ctx.clone()),
      ctx,
    }
  }

  // ── Dashboard ─────────────────────────────────────────────────────────────

  pub async fn stats(&self, admin: &Identity) -> Result<DashboardStats> {
    require_role(admin, Role::Admin)?;
    self.ctx.call(|s| s.stats()).await
  }

  // ── Users ─────────────────────────────────────────────────────────────────

  pub async fn users(&self, admin: &Identity) -> Result<Vec<Profile>> {
    require_role(admin, Role::Admin)?;
    self.ctx.call(|s| s.list_profiles()).await
  }

  /// Change a user's role. An instructor with a live instructor record
  /// keeps the role until [`Self::remove_instructor`] takes the record away.
  pub async fn set_role(&self, admin: &Identity, user_id: Uuid, role: Role) -> Result<Profile> {
    require_role(admin, Role::Admin)?;
    if role != Role::Instructor
      && self.ctx.call(|s| s.get_instructor(user_id)).await?.is_some()
    {
      return Err(Error::Conflict(format!(
        "user {user_id} still has an instructor record; remove the instructor instead"
      )));
    }
    let profile = self
      .ctx
      .call(|s| s.set_role(user_id, role))
      .await?
      .ok_or_else(|| Error::not_found(format!("user {user_id}")))?;
    tracing::info!(user_id = %user_id, role = %role, by = %admin.user_id, "role changed");
    Ok(profile)
  }

  /// Remove a user together with their bookings (as customer or
  /// instructor), reviews (given or received) and instructor record. The
  /// store does this in one transaction, so a failure leaves nothing half
  /// deleted. Ratings of instructors the user had reviewed are refreshed
  /// afterwards.
  pub async fn delete_user(&self, admin: &Identity, user_id: Uuid) -> Result<()> {
    require_role(admin, Role::Admin)?;
    if user_id == admin.user_id {
      return Err(Error::Validation("administrators cannot delete themselves".into()));
    }
    let stale = self
      .ctx
      .call(|s| s.delete_user(user_id))
      .await?
      .ok_or_else(|| Error::not_found(format!("user {user_id}")))?;
    tracing::info!(user_id = %user_id, by = %admin.user_id, "user deleted");

    for instructor_id in stale {
      if let Err(e) = self.ratings.recompute(instructor_id).await {
        tracing::warn!(
          instructor_id = %instructor_id,
          error = %e,
          "rating recomputation failed after user deletion"
        );
      }
    }
    Ok(())
  }

  // ── Instructors ───────────────────────────────────────────────────────────

  /// Attach an instructor record to the profile registered under `email`.
  /// The profile must already carry the instructor role.
  pub async fn create_instructor(
    &self,
    admin: &Identity,
    email: &str,
    bio: &str,
    lesson_price: Decimal,
  ) -> Result<Instructor> {
    require_role(admin, Role::Admin)?;
    let email = normalize_email(email)?;
    let bio = clean_name("bio", bio)?;
    let lesson_price = positive_price(lesson_price)?;

    let profile = self
      .ctx
      .call(|s| s.find_profile_by_email(&email))
      .await?
      .ok_or_else(|| Error::not_found(format!("user with email {email}")))?;
    if profile.role != Role::Instructor {
      return Err(Error::Validation(format!(
        "user with email {email} does not have instructor role (current role: {})",
        profile.role
      )));
    }

    let input = NewInstructor { id: profile.id, bio, lesson_price };
    match self.ctx.call(|s| s.create_instructor(input)).await? {
      Insert::Created(instructor) => {
        tracing::info!(instructor_id = %instructor.id, by = %admin.user_id, "instructor created");
        Ok(instructor)
      }
      Insert::Conflict => Err(Error::Conflict(format!(
        "instructor record already exists for {}",
        profile.full_name()
      ))),
    }
  }

  pub async fn update_instructor(
    &self,
    admin: &Identity,
    instructor_id: Uuid,
    patch: InstructorPatch,
  ) -> Result<InstructorProfile> {
    require_role(admin, Role::Admin)?;
    let patch = InstructorPatch {
      first_name:   clean_name("first name", &patch.first_name)?,
      last_name:    clean_name("last name", &patch.last_name)?,
      bio:          clean_name("bio", &patch.bio)?,
      lesson_price: positive_price(patch.lesson_price)?,
    };
    self
      .ctx
      .call(|s| s.update_instructor(instructor_id, patch))
      .await?
      .ok_or_else(|| Error::not_found(format!("instructor {instructor_id}")))
  }

  /// Delete the instructor's bookings, reviews and record, and demote the
  /// profile back to a plain user.
  pub async fn remove_instructor(&self, admin: &Identity, instructor_id: Uuid) -> Result<()> {
    require_role(admin, Role::Admin)?;
    if !self.ctx.call(|s| s.remove_instructor(instructor_id)).await? {
      return Err(Error::not_found(format!("instructor {instructor_id}")));
    }
    tracing::info!(instructor_id = %instructor_id, by = %admin.user_id, "instructor removed");
    Ok(())
  }

  // ── Bookings ──────────────────────────────────────────────────────────────

  pub async fn bookings(&self, admin: &Identity, query: BookingQuery) -> Result<Vec<BookingView>> {
    require_role(admin, Role::Admin)?;
    let now = self.ctx.now();
    let bookings = self.ctx.call(|s| s.list_bookings(&query)).await?;
    Ok(bookings.into_iter().map(|b| b.view(now)).collect())
  }

  /// Move a live booking to any other status. Liveness is judged on the
  /// effective status, so a confirmed lesson that has already started is
  /// completed and frozen. The write is conditional on the stored status
  /// read, so a concurrent cancellation is never overwritten.
  pub async fn set_booking_status(
    &self,
    admin: &Identity,
    booking_id: Uuid,
    status: BookingStatus,
  ) -> Result<Booking> {
    require_role(admin, Role::Admin)?;
    let booking = self.ledger.fetch(booking_id).await?;
    let current = booking.effective_status(self.ctx.now());
    if !current.admin_can_transition_to(status) {
      return Err(Error::InvalidTransition { from: current, to: status });
    }
    let updated = self.ledger.transition(&booking, status).await?;
    tracing::info!(
      booking_id = %booking_id,
      from = %current,
      to = %status,
      by = %admin.user_id,
      "booking status changed"
    );
    Ok(updated)
  }

  pub async fn delete_booking(&self, admin: &Identity, booking_id: Uuid) -> Result<()> {
    require_role(admin, Role::Admin)?;
    if !self.ctx.call(|s| s.delete_booking(booking_id)).await? {
      return Err(Error::not_found(format!("booking {booking_id}")));
    }
    tracing::info!(booking_id = %booking_id, by = %admin.user_id, "booking deleted");
    Ok(())
  }
}
