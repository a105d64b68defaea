//! [`SqliteStore`], the SQLite implementation of [`BookingStore`].

use std::path::Path;

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::OptionalExtension as _;
use rust_decimal::Decimal;
use uuid::Uuid;

use drivebook_core::{
  booking::{Booking, BookingStatus, NewBooking},
  identity::Role,
  instructor::{Instructor, InstructorPatch, InstructorProfile, NewInstructor},
  profile::{Credentials, NewProfile, Profile},
  review::{NewReview, Review},
  store::{BookingQuery, BookingStore, DashboardStats, Insert},
};

use crate::{
  encode::{
    BOOKING_COLUMNS, INSTRUCTOR_SELECT, PROFILE_COLUMNS, REVIEW_COLUMNS, RawBooking,
    RawInstructor, RawProfile, RawReview, decode_rating, decode_start, decode_uuid,
    encode_decimal, encode_dt, encode_start, encode_uuid,
  },
  schema::SCHEMA,
  Result,
};

/// True for the constraint failures that mean "a row with this key is
/// already there", as opposed to a foreign key or check failure.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
  match err {
    rusqlite::Error::SqliteFailure(e, _) => {
      e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    }
    _ => false,
  }
}

/// Current time at the precision timestamps are stored with, so a returned
/// row compares equal to the same row read back later.
fn stored_now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

// ─── Store ───────────────────────────────────────────────────────────────────

/// A drivebook store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Several
/// stores may open the same file; the slot index keeps them consistent.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let conn = tokio_rusqlite::Connection::open(&path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "sqlite store opened");
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Run raw SQL against the connection, for tests that need to break the
  /// database in a controlled way.
  #[cfg(test)]
  pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_profile(&self, id_str: String) -> Result<Option<Profile>> {
    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
            rusqlite::params![id_str],
            RawProfile::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }
}

// ─── BookingStore impl ───────────────────────────────────────────────────────

impl BookingStore for SqliteStore {
  type Error = crate::Error;

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn create_profile(&self, input: NewProfile) -> Result<Insert<Profile>> {
    let profile = Profile {
      id:         Uuid::new_v4(),
      email:      input.email,
      first_name: input.first_name,
      last_name:  input.last_name,
      role:       input.role,
      created_at: stored_now(),
    };

    let id_str    = encode_uuid(profile.id);
    let email     = profile.email.clone();
    let first     = profile.first_name.clone();
    let last      = profile.last_name.clone();
    let role_str  = profile.role.as_str();
    let at_str    = encode_dt(profile.created_at);
    let hash      = input.password_hash;

    let inserted = self
      .conn
      .call(move |conn| {
        let res = conn.execute(
          "INSERT INTO profiles (id, email, first_name, last_name, role, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, email, first, last, role_str, hash, at_str],
        );
        match res {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    Ok(if inserted { Insert::Created(profile) } else { Insert::Conflict })
  }

  async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
    self.fetch_profile(encode_uuid(id)).await
  }

  async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
    let email = email.to_owned();

    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = ?1"),
            rusqlite::params![email],
            RawProfile::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }

  async fn credentials(&self, email: &str) -> Result<Option<Credentials>> {
    let email = email.to_owned();

    let raw: Option<(RawProfile, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {PROFILE_COLUMNS}, password_hash FROM profiles WHERE email = ?1"),
            rusqlite::params![email],
            |row| Ok((RawProfile::from_row(row)?, row.get(6)?)),
          )
          .optional()?)
      })
      .await?;

    raw
      .map(|(raw, password_hash)| -> Result<Credentials> {
        Ok(Credentials { profile: raw.into_profile()?, password_hash })
      })
      .transpose()
  }

  async fn list_profiles(&self) -> Result<Vec<Profile>> {
    let raws: Vec<RawProfile> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at, email"
        ))?;
        let rows = stmt
          .query_map([], RawProfile::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProfile::into_profile).collect()
  }

  async fn update_profile_names(
    &self,
    id:         Uuid,
    first_name: String,
    last_name:  String,
  ) -> Result<Option<Profile>> {
    let id_str = encode_uuid(id);
    let key    = id_str.clone();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE profiles SET first_name = ?2, last_name = ?3 WHERE id = ?1",
          rusqlite::params![key, first_name, last_name],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.fetch_profile(id_str).await
  }

  async fn set_password_hash(&self, id: Uuid, password_hash: String) -> Result<bool> {
    let id_str = encode_uuid(id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE profiles SET password_hash = ?2 WHERE id = ?1",
          rusqlite::params![id_str, password_hash],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<Profile>> {
    let id_str   = encode_uuid(id);
    let key      = id_str.clone();
    let role_str = role.as_str();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE profiles SET role = ?2 WHERE id = ?1",
          rusqlite::params![key, role_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.fetch_profile(id_str).await
  }

  async fn delete_user(&self, id: Uuid) -> Result<Option<Vec<Uuid>>> {
    let id_str = encode_uuid(id);

    let stale: Option<Vec<String>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists = tx
          .query_row(
            "SELECT 1 FROM profiles WHERE id = ?1",
            rusqlite::params![id_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(None);
        }

        // Instructors this user reviewed lose a review and need a new rating.
        let stale = {
          let mut stmt = tx.prepare(
            "SELECT DISTINCT instructor_id FROM instructor_reviews
             WHERE client_id = ?1 AND instructor_id != ?1",
          )?;
          stmt
            .query_map(rusqlite::params![id_str], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.execute(
          "DELETE FROM bookings WHERE user_id = ?1 OR instructor_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM instructor_reviews WHERE client_id = ?1 OR instructor_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute("DELETE FROM instructors WHERE id = ?1", rusqlite::params![id_str])?;
        tx.execute("DELETE FROM profiles WHERE id = ?1", rusqlite::params![id_str])?;

        tx.commit()?;
        Ok(Some(stale))
      })
      .await?;

    stale
      .map(|ids| ids.iter().map(|s| decode_uuid(s)).collect::<Result<Vec<_>>>())
      .transpose()
  }

  // ── Instructors ───────────────────────────────────────────────────────────

  async fn create_instructor(&self, input: NewInstructor) -> Result<Insert<Instructor>> {
    let instructor = Instructor {
      id:           input.id,
      bio:          input.bio,
      lesson_price: input.lesson_price,
      rating:       None,
    };

    let id_str    = encode_uuid(instructor.id);
    let bio       = instructor.bio.clone();
    let price_str = encode_decimal(instructor.lesson_price);

    let inserted = self
      .conn
      .call(move |conn| {
        let res = conn.execute(
          "INSERT INTO instructors (id, bio, lesson_price, rating) VALUES (?1, ?2, ?3, NULL)",
          rusqlite::params![id_str, bio, price_str],
        );
        match res {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    Ok(if inserted { Insert::Created(instructor) } else { Insert::Conflict })
  }

  async fn get_instructor(&self, id: Uuid) -> Result<Option<InstructorProfile>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawInstructor> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("{INSTRUCTOR_SELECT} WHERE i.id = ?1"),
            rusqlite::params![id_str],
            RawInstructor::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawInstructor::into_instructor).transpose()
  }

  async fn list_instructors(&self) -> Result<Vec<InstructorProfile>> {
    let raws: Vec<RawInstructor> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "{INSTRUCTOR_SELECT} ORDER BY p.last_name, p.first_name"
        ))?;
        let rows = stmt
          .query_map([], RawInstructor::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawInstructor::into_instructor).collect()
  }

  async fn update_instructor(
    &self,
    id:    Uuid,
    patch: InstructorPatch,
  ) -> Result<Option<InstructorProfile>> {
    let id_str    = encode_uuid(id);
    let price_str = encode_decimal(patch.lesson_price);

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE instructors SET bio = ?2, lesson_price = ?3 WHERE id = ?1",
          rusqlite::params![id_str, patch.bio, price_str],
        )?;
        if changed == 0 {
          return Ok(false);
        }
        tx.execute(
          "UPDATE profiles SET first_name = ?2, last_name = ?3 WHERE id = ?1",
          rusqlite::params![id_str, patch.first_name, patch.last_name],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Ok(None);
    }
    self.get_instructor(id).await
  }

  async fn remove_instructor(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM bookings WHERE instructor_id = ?1", rusqlite::params![id_str])?;
        tx.execute(
          "DELETE FROM instructor_reviews WHERE instructor_id = ?1",
          rusqlite::params![id_str],
        )?;
        let removed =
          tx.execute("DELETE FROM instructors WHERE id = ?1", rusqlite::params![id_str])?;
        if removed == 0 {
          // Nothing else can have matched either; dropping `tx` rolls back.
          return Ok(false);
        }
        tx.execute(
          "UPDATE profiles SET role = ?2 WHERE id = ?1",
          rusqlite::params![id_str, Role::User.as_str()],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(removed)
  }

  async fn set_instructor_rating(&self, id: Uuid, rating: Option<Decimal>) -> Result<bool> {
    let id_str     = encode_uuid(id);
    let rating_str = rating.map(encode_decimal);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE instructors SET rating = ?2 WHERE id = ?1",
          rusqlite::params![id_str, rating_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  // ── Slot ledger ───────────────────────────────────────────────────────────

  async fn reserve(&self, input: NewBooking) -> Result<Insert<Booking>> {
    let booking = input.into_booking();

    let id_str         = encode_uuid(booking.id);
    let user_str       = encode_uuid(booking.user_id);
    let instructor_str = encode_uuid(booking.instructor_id);
    let start          = encode_start(booking.start_time);
    let status_str     = booking.status.as_str();
    let reference      = booking.confirmation_ref.clone();
    let at_str         = encode_dt(booking.created_at);

    // One statement: the partial unique index decides who gets the slot.
    let inserted = self
      .conn
      .call(move |conn| {
        let res = conn.execute(
          "INSERT INTO bookings (
             id, user_id, instructor_id, start_time, status, confirmation_ref, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            user_str,
            instructor_str,
            start,
            status_str,
            reference,
            at_str,
          ],
        );
        match res {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if inserted {
      // Round-trip through storage precision so callers see what later
      // reads will return.
      let stored = Booking {
        start_time: decode_start(start)?,
        created_at: booking.created_at.trunc_subsecs(6),
        ..booking
      };
      Ok(Insert::Created(stored))
    } else {
      tracing::debug!(instructor_id = %booking.instructor_id, start = %booking.start_time, "slot already held");
      Ok(Insert::Conflict)
    }
  }

  async fn is_taken(&self, instructor_id: Uuid, start_time: DateTime<Utc>) -> Result<bool> {
    let instructor_str = encode_uuid(instructor_id);
    let start          = encode_start(start_time);

    let taken = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT 1 FROM bookings
             WHERE instructor_id = ?1 AND start_time = ?2 AND status != 'cancelled'",
            rusqlite::params![instructor_str, start],
            |_| Ok(()),
          )
          .optional()?
          .is_some())
      })
      .await?;

    Ok(taken)
  }

  async fn taken_starts(
    &self,
    instructor_id: Uuid,
    from:          DateTime<Utc>,
    until:         DateTime<Utc>,
  ) -> Result<Vec<DateTime<Utc>>> {
    let instructor_str = encode_uuid(instructor_id);
    let from_secs      = encode_start(from);
    let until_secs     = encode_start(until);

    let starts: Vec<i64> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT start_time FROM bookings
           WHERE instructor_id = ?1
             AND status != 'cancelled'
             AND start_time >= ?2 AND start_time < ?3
           ORDER BY start_time",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![instructor_str, from_secs, until_secs], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    starts.into_iter().map(decode_start).collect()
  }

  async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawBooking> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            rusqlite::params![id_str],
            RawBooking::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawBooking::into_booking).transpose()
  }

  async fn find_booking_by_reference(&self, reference: &str) -> Result<Option<Booking>> {
    let reference = reference.to_owned();

    let raw: Option<RawBooking> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE confirmation_ref = ?1"),
            rusqlite::params![reference],
            RawBooking::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawBooking::into_booking).transpose()
  }

  async fn list_bookings(&self, query: &BookingQuery) -> Result<Vec<Booking>> {
    let mut conds:  Vec<&'static str> = vec![];
    let mut params: Vec<String>       = vec![];
    if let Some(user_id) = query.user_id {
      conds.push("user_id = ?");
      params.push(encode_uuid(user_id));
    }
    if let Some(instructor_id) = query.instructor_id {
      conds.push("instructor_id = ?");
      params.push(encode_uuid(instructor_id));
    }
    if let Some(status) = query.status {
      conds.push("status = ?");
      params.push(status.as_str().to_owned());
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let sql = format!(
      "SELECT {BOOKING_COLUMNS} FROM bookings {where_clause} ORDER BY start_time, created_at"
    );

    let raws: Vec<RawBooking> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawBooking::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBooking::into_booking).collect()
  }

  async fn transition_booking(
    &self,
    id:   Uuid,
    from: BookingStatus,
    to:   BookingStatus,
  ) -> Result<Option<Booking>> {
    let id_str   = encode_uuid(id);
    let from_str = from.as_str();
    let to_str   = to.as_str();

    let raw: Option<RawBooking> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE bookings SET status = ?3 WHERE id = ?1 AND status = ?2",
          rusqlite::params![id_str, from_str, to_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(conn
          .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            rusqlite::params![id_str],
            RawBooking::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawBooking::into_booking).transpose()
  }

  async fn delete_booking(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM bookings WHERE id = ?1", rusqlite::params![id_str])?)
      })
      .await?;

    Ok(removed > 0)
  }

  // ── Reviews ───────────────────────────────────────────────────────────────

  async fn insert_review(&self, input: NewReview) -> Result<Review> {
    let review = Review {
      id:            Uuid::new_v4(),
      instructor_id: input.instructor_id,
      client_id:     input.client_id,
      rating:        input.rating,
      review_text:   input.review_text,
      created_at:    stored_now(),
    };

    let id_str         = encode_uuid(review.id);
    let instructor_str = encode_uuid(review.instructor_id);
    let client_str     = encode_uuid(review.client_id);
    let rating         = i64::from(review.rating);
    let text           = review.review_text.clone();
    let at_str         = encode_dt(review.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO instructor_reviews (
             id, instructor_id, client_id, rating, review_text, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, instructor_str, client_str, rating, text, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(review)
  }

  async fn list_reviews(&self, instructor_id: Uuid) -> Result<Vec<Review>> {
    let instructor_str = encode_uuid(instructor_id);

    let raws: Vec<RawReview> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REVIEW_COLUMNS} FROM instructor_reviews
           WHERE instructor_id = ?1
           ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![instructor_str], RawReview::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReview::into_review).collect()
  }

  async fn review_ratings(&self, instructor_id: Uuid) -> Result<Vec<u8>> {
    let instructor_str = encode_uuid(instructor_id);

    let raws: Vec<i64> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT rating FROM instructor_reviews WHERE instructor_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![instructor_str], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(decode_rating).collect()
  }

  // ── Counts ────────────────────────────────────────────────────────────────

  async fn stats(&self) -> Result<DashboardStats> {
    let counts: [i64; 5] = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM profiles),
             (SELECT COUNT(*) FROM instructors),
             (SELECT COUNT(*) FROM bookings),
             (SELECT COUNT(*) FROM bookings WHERE status = 'pending'),
             (SELECT COUNT(*) FROM instructor_reviews)",
          [],
          |r| Ok([r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?]),
        )?)
      })
      .await?;

    let [users, instructors, bookings, pending_bookings, reviews] = counts.map(|n| n as u64);
    Ok(DashboardStats { users, instructors, bookings, pending_bookings, reviews })
  }
}
