//! Integration tests for `SqliteStore` and the services running on top of
//! it, against in-memory (and, for cross-connection races, temporary file)
//! databases.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use drivebook_core::{
  Error as CoreError,
  admin::AdminService,
  aggregator::RatingAggregator,
  booking::{Booking, BookingStatus, NewBooking},
  checkout::Checkout,
  clock::FixedClock,
  context::ServiceContext,
  coordinator::{BookingCoordinator, BookingRequest},
  directory::Directory,
  identity::{Identity, Role},
  instructor::{InstructorPatch, NewInstructor},
  payment::{PaymentIntent, PaymentProcessor, PaymentRequest, PaymentStatus},
  profile::{NewProfile, Profile},
  review::{NewReview, RatingRefresh},
  schedule::LessonSchedule,
  store::{BookingQuery, BookingStore, Insert},
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn new_profile(email: &str, role: Role) -> NewProfile {
  NewProfile {
    email:         email.into(),
    first_name:    "Thandi".into(),
    last_name:     "Mokoena".into(),
    role,
    password_hash: "$argon2id$stub".into(),
  }
}

async fn add_profile(s: &SqliteStore, email: &str, role: Role) -> Profile {
  match s.create_profile(new_profile(email, role)).await.unwrap() {
    Insert::Created(p) => p,
    Insert::Conflict => panic!("unexpected conflict for {email}"),
  }
}

async fn add_instructor(s: &SqliteStore, email: &str) -> Profile {
  let profile = add_profile(s, email, Role::Instructor).await;
  let created = s
    .create_instructor(NewInstructor {
      id:           profile.id,
      bio:          "Patient, manual and automatic".into(),
      lesson_price: Decimal::new(35000, 2),
    })
    .await
    .unwrap();
  assert!(matches!(created, Insert::Created(_)));
  profile
}

/// 2025-06-10 is a Tuesday; the schedule's local zone is UTC+2.
fn lesson_day() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 6, 10).unwrap() }

fn at(h: u32, m: u32) -> NaiveTime { NaiveTime::from_hms_opt(h, m, 0).unwrap() }

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn early_june() -> FixedClock { FixedClock(utc(2025, 6, 1, 0, 0)) }

fn context(s: &Arc<SqliteStore>, clock: FixedClock) -> ServiceContext<SqliteStore> {
  ServiceContext::new(Arc::clone(s)).with_clock(clock)
}

fn pending_booking(user: Uuid, instructor: Uuid, start: DateTime<Utc>) -> NewBooking {
  NewBooking::new(user, instructor, start, utc(2025, 6, 1, 0, 0))
}

// ─── Profiles ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
  let s = store().await;
  add_profile(&s, "lerato@example.com", Role::User).await;

  let again = s
    .create_profile(new_profile("lerato@example.com", Role::User))
    .await
    .unwrap();
  assert_eq!(again, Insert::Conflict);
}

#[tokio::test]
async fn credentials_carry_the_stored_hash() {
  let s = store().await;
  let p = add_profile(&s, "sipho@example.com", Role::Admin).await;

  let creds = s.credentials("sipho@example.com").await.unwrap().unwrap();
  assert_eq!(creds.profile, p);
  assert_eq!(creds.password_hash, "$argon2id$stub");

  assert!(s.credentials("nobody@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn set_role_on_missing_profile_returns_none() {
  let s = store().await;
  assert!(s.set_role(Uuid::new_v4(), Role::Admin).await.unwrap().is_none());
}

// ─── Instructors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn instructor_starts_without_rating() {
  let s = store().await;
  let p = add_instructor(&s, "naledi@example.com").await;

  let i = s.get_instructor(p.id).await.unwrap().unwrap();
  assert_eq!(i.instructor.rating, None);
  assert_eq!(i.instructor.lesson_price, Decimal::new(35000, 2));
  assert_eq!(i.email, "naledi@example.com");

  let again = s
    .create_instructor(NewInstructor {
      id:           p.id,
      bio:          "again".into(),
      lesson_price: Decimal::ONE,
    })
    .await
    .unwrap();
  assert_eq!(again, Insert::Conflict);
}

#[tokio::test]
async fn update_instructor_touches_both_tables() {
  let s = store().await;
  let p = add_instructor(&s, "naledi@example.com").await;

  let patch = InstructorPatch {
    first_name:   "Naledi".into(),
    last_name:    "Dlamini".into(),
    bio:          "Heavy vehicles too".into(),
    lesson_price: Decimal::new(400, 0),
  };
  let updated = s.update_instructor(p.id, patch.clone()).await.unwrap().unwrap();
  assert_eq!(updated.first_name, "Naledi");
  assert_eq!(updated.instructor.bio, "Heavy vehicles too");
  assert_eq!(updated.instructor.lesson_price, Decimal::new(400, 0));

  assert!(s.update_instructor(Uuid::new_v4(), patch).await.unwrap().is_none());
}

#[tokio::test]
async fn remove_instructor_cascades_and_demotes() {
  let s = store().await;
  let customer = add_profile(&s, "c@example.com", Role::User).await;
  let p = add_instructor(&s, "i@example.com").await;
  s.reserve(pending_booking(customer.id, p.id, utc(2025, 6, 10, 8, 0))).await.unwrap();
  s.insert_review(NewReview {
    instructor_id: p.id,
    client_id:     customer.id,
    rating:        4,
    review_text:   None,
  })
  .await
  .unwrap();

  assert!(s.remove_instructor(p.id).await.unwrap());
  assert!(s.get_instructor(p.id).await.unwrap().is_none());
  assert!(s.list_bookings(&BookingQuery::default()).await.unwrap().is_empty());
  assert!(s.list_reviews(p.id).await.unwrap().is_empty());
  assert_eq!(s.get_profile(p.id).await.unwrap().unwrap().role, Role::User);

  assert!(!s.remove_instructor(p.id).await.unwrap());
}

// ─── Slot ledger ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_reservation_of_a_live_slot_conflicts() {
  let s = store().await;
  let a = add_profile(&s, "a@example.com", Role::User).await;
  let b = add_profile(&s, "b@example.com", Role::User).await;
  let i = add_instructor(&s, "i@example.com").await;
  let start = utc(2025, 6, 10, 8, 0);

  let first = s.reserve(pending_booking(a.id, i.id, start)).await.unwrap();
  let Insert::Created(first) = first else { panic!("first reservation must win") };
  assert_eq!(first.status, BookingStatus::Pending);
  assert!(s.is_taken(i.id, start).await.unwrap());

  let second = s.reserve(pending_booking(b.id, i.id, start)).await.unwrap();
  assert_eq!(second, Insert::Conflict);

  // A different instructor at the same instant is unaffected.
  let other = add_instructor(&s, "j@example.com").await;
  let third = s.reserve(pending_booking(b.id, other.id, start)).await.unwrap();
  assert!(matches!(third, Insert::Created(_)));
}

#[tokio::test]
async fn cancelled_slot_can_be_reserved_again() {
  let s = store().await;
  let a = add_profile(&s, "a@example.com", Role::User).await;
  let i = add_instructor(&s, "i@example.com").await;
  let start = utc(2025, 6, 10, 8, 0);

  let Insert::Created(b) = s.reserve(pending_booking(a.id, i.id, start)).await.unwrap() else {
    panic!("expected a reservation");
  };
  s.transition_booking(b.id, BookingStatus::Pending, BookingStatus::Cancelled)
    .await
    .unwrap()
    .unwrap();
  assert!(!s.is_taken(i.id, start).await.unwrap());

  let again = s.reserve(pending_booking(a.id, i.id, start)).await.unwrap();
  assert!(matches!(again, Insert::Created(_)));
}

#[tokio::test]
async fn transition_is_conditional_on_current_status() {
  let s = store().await;
  let a = add_profile(&s, "a@example.com", Role::User).await;
  let i = add_instructor(&s, "i@example.com").await;
  let Insert::Created(b) = s
    .reserve(pending_booking(a.id, i.id, utc(2025, 6, 10, 8, 0)))
    .await
    .unwrap()
  else {
    panic!("expected a reservation");
  };

  let confirmed = s
    .transition_booking(b.id, BookingStatus::Pending, BookingStatus::Confirmed)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(confirmed.status, BookingStatus::Confirmed);

  // A writer still believing the booking is pending loses.
  let stale = s
    .transition_booking(b.id, BookingStatus::Pending, BookingStatus::Cancelled)
    .await
    .unwrap();
  assert!(stale.is_none());
}

#[tokio::test]
async fn taken_starts_respects_window_and_cancellations() {
  let s = store().await;
  let a = add_profile(&s, "a@example.com", Role::User).await;
  let i = add_instructor(&s, "i@example.com").await;

  for (h, m) in [(6, 0), (8, 30), (14, 0)] {
    s.reserve(pending_booking(a.id, i.id, utc(2025, 6, 10, h, m))).await.unwrap();
  }
  s.reserve(pending_booking(a.id, i.id, utc(2025, 6, 11, 8, 0))).await.unwrap();
  let Insert::Created(cancel_me) = s
    .reserve(pending_booking(a.id, i.id, utc(2025, 6, 10, 9, 0)))
    .await
    .unwrap()
  else {
    panic!("expected a reservation");
  };
  s.transition_booking(cancel_me.id, BookingStatus::Pending, BookingStatus::Cancelled)
    .await
    .unwrap();

  let taken = s
    .taken_starts(i.id, utc(2025, 6, 9, 22, 0), utc(2025, 6, 10, 22, 0))
    .await
    .unwrap();
  assert_eq!(
    taken,
    vec![utc(2025, 6, 10, 6, 0), utc(2025, 6, 10, 8, 30), utc(2025, 6, 10, 14, 0)]
  );
}

#[tokio::test]
async fn list_bookings_filters_and_orders_by_start() {
  let s = store().await;
  let a = add_profile(&s, "a@example.com", Role::User).await;
  let b = add_profile(&s, "b@example.com", Role::User).await;
  let i = add_instructor(&s, "i@example.com").await;

  s.reserve(pending_booking(a.id, i.id, utc(2025, 6, 12, 8, 0))).await.unwrap();
  s.reserve(pending_booking(a.id, i.id, utc(2025, 6, 10, 8, 0))).await.unwrap();
  s.reserve(pending_booking(b.id, i.id, utc(2025, 6, 11, 8, 0))).await.unwrap();

  let mine = s
    .list_bookings(&BookingQuery { user_id: Some(a.id), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(mine.len(), 2);
  assert!(mine[0].start_time < mine[1].start_time);

  let all = s.list_bookings(&BookingQuery::default()).await.unwrap();
  assert_eq!(all.len(), 3);

  let confirmed = s
    .list_bookings(&BookingQuery {
      status: Some(BookingStatus::Confirmed),
      ..Default::default()
    })
    .await
    .unwrap();
  assert!(confirmed.is_empty());
}

#[tokio::test]
async fn booking_is_found_by_reference() {
  let s = store().await;
  let a = add_profile(&s, "a@example.com", Role::User).await;
  let i = add_instructor(&s, "i@example.com").await;
  let Insert::Created(b) = s
    .reserve(pending_booking(a.id, i.id, utc(2025, 6, 10, 8, 0)))
    .await
    .unwrap()
  else {
    panic!("expected a reservation");
  };

  let found = s.find_booking_by_reference(&b.confirmation_ref).await.unwrap();
  assert_eq!(found, Some(b));
  assert!(s.find_booking_by_reference("nope").await.unwrap().is_none());
}

// ─── Reviews and cascades ────────────────────────────────────────────────────

#[tokio::test]
async fn reviews_are_listed_newest_first() {
  let s = store().await;
  let a = add_profile(&s, "a@example.com", Role::User).await;
  let i = add_instructor(&s, "i@example.com").await;

  for rating in [2, 5] {
    s.insert_review(NewReview {
      instructor_id: i.id,
      client_id:     a.id,
      rating,
      review_text:   Some(format!("{rating} stars")),
    })
    .await
    .unwrap();
  }

  let reviews = s.list_reviews(i.id).await.unwrap();
  assert_eq!(reviews.iter().map(|r| r.rating).collect::<Vec<_>>(), vec![5, 2]);
  let mut ratings = s.review_ratings(i.id).await.unwrap();
  ratings.sort_unstable();
  assert_eq!(ratings, vec![2, 5]);
}

#[tokio::test]
async fn delete_user_removes_everything_and_reports_stale_ratings() {
  let s = store().await;
  let a = add_profile(&s, "a@example.com", Role::User).await;
  let i = add_instructor(&s, "i@example.com").await;
  s.reserve(pending_booking(a.id, i.id, utc(2025, 6, 10, 8, 0))).await.unwrap();
  s.insert_review(NewReview {
    instructor_id: i.id,
    client_id:     a.id,
    rating:        5,
    review_text:   None,
  })
  .await
  .unwrap();

  let stale = s.delete_user(a.id).await.unwrap();
  assert_eq!(stale, Some(vec![i.id]));
  assert!(s.get_profile(a.id).await.unwrap().is_none());
  assert!(s.list_bookings(&BookingQuery::default()).await.unwrap().is_empty());
  assert!(s.review_ratings(i.id).await.unwrap().is_empty());

  assert_eq!(s.delete_user(a.id).await.unwrap(), None);
}

#[tokio::test]
async fn stats_count_rows() {
  let s = store().await;
  let a = add_profile(&s, "a@example.com", Role::User).await;
  let i = add_instructor(&s, "i@example.com").await;
  s.reserve(pending_booking(a.id, i.id, utc(2025, 6, 10, 8, 0))).await.unwrap();
  let Insert::Created(b) = s
    .reserve(pending_booking(a.id, i.id, utc(2025, 6, 10, 9, 0)))
    .await
    .unwrap()
  else {
    panic!("expected a reservation");
  };
  s.transition_booking(b.id, BookingStatus::Pending, BookingStatus::Confirmed)
    .await
    .unwrap();

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.users, 2);
  assert_eq!(stats.instructors, 1);
  assert_eq!(stats.bookings, 2);
  assert_eq!(stats.pending_bookings, 1);
  assert_eq!(stats.reviews, 0);
}

// ─── Booking coordinator ─────────────────────────────────────────────────────

struct World {
  store:      Arc<SqliteStore>,
  customer:   Identity,
  instructor: Uuid,
}

async fn world() -> World {
  let s = store().await;
  let customer = add_profile(&s, "customer@example.com", Role::User).await;
  let instructor = add_instructor(&s, "instructor@example.com").await;
  World {
    store:      Arc::new(s),
    customer:   customer.identity(),
    instructor: instructor.id,
  }
}

fn coordinator(w: &World, clock: FixedClock) -> BookingCoordinator<SqliteStore> {
  BookingCoordinator::new(context(&w.store, clock), LessonSchedule::default())
}

fn request(instructor_id: Uuid, date: NaiveDate, time: NaiveTime) -> BookingRequest {
  BookingRequest { instructor_id, lesson_date: date, lesson_time: time }
}

#[tokio::test]
async fn booking_a_free_slot_converts_local_time_to_utc() {
  let w = world().await;
  let c = coordinator(&w, early_june());

  let confirmation = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(10, 0)))
    .await
    .unwrap();
  assert_eq!(confirmation.booking.start_time, utc(2025, 6, 10, 8, 0));
  assert_eq!(confirmation.booking.status, BookingStatus::Pending);
  assert_eq!(confirmation.confirmation_reference, confirmation.booking.confirmation_ref);

  let slots = c.available_slots(w.instructor, lesson_day()).await.unwrap();
  assert_eq!(slots.len(), 18);
  assert!(!slots.contains(&at(10, 0)));
  assert_eq!(slots.first(), Some(&at(8, 0)));
  assert_eq!(slots.last(), Some(&at(17, 0)));
}

#[tokio::test]
async fn ledger_reports_a_slot_taken_until_it_is_cancelled() {
  let w = world().await;
  let c = coordinator(&w, early_june());
  let start = utc(2025, 6, 10, 8, 0);

  assert!(!c.ledger().is_taken(w.instructor, start).await.unwrap());

  let booked = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(10, 0)))
    .await
    .unwrap();
  assert!(c.ledger().is_taken(w.instructor, start).await.unwrap());
  assert!(!c.ledger().is_taken(w.instructor, utc(2025, 6, 10, 8, 30)).await.unwrap());

  c.cancel(&w.customer, booked.booking.id).await.unwrap();
  assert!(!c.ledger().is_taken(w.instructor, start).await.unwrap());
}

#[tokio::test]
async fn booking_the_same_slot_twice_is_rejected() {
  let w = world().await;
  let c = coordinator(&w, early_june());
  c.book(&w.customer, request(w.instructor, lesson_day(), at(10, 0))).await.unwrap();

  let err = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(10, 0)))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::SlotTaken));
}

#[tokio::test]
async fn past_instants_are_rejected_before_anything_else() {
  let w = world().await;
  let c = coordinator(&w, early_june());

  // Also a Sunday and off the grid: the past check still wins.
  let sunday_in_may = NaiveDate::from_ymd_opt(2025, 5, 25).unwrap();
  let err = c
    .book(&w.customer, request(Uuid::new_v4(), sunday_in_may, at(7, 15)))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::PastBooking));
}

#[tokio::test]
async fn sundays_are_closed() {
  let w = world().await;
  let c = coordinator(&w, early_june());
  let sunday = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();

  let err = c
    .book(&w.customer, request(w.instructor, sunday, at(10, 0)))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::ClosedDay(chrono::Weekday::Sun)));
  assert!(c.available_slots(w.instructor, sunday).await.unwrap().is_empty());
  assert!(w.store.list_bookings(&BookingQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn off_grid_times_are_rejected() {
  let w = world().await;
  let c = coordinator(&w, early_june());

  for time in [at(10, 15), at(7, 30), at(17, 30)] {
    let err = c
      .book(&w.customer, request(w.instructor, lesson_day(), time))
      .await
      .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)), "{time} should be off grid");
  }
}

#[tokio::test]
async fn unknown_instructor_is_not_found() {
  let w = world().await;
  let c = coordinator(&w, early_june());

  let err = c
    .book(&w.customer, request(Uuid::new_v4(), lesson_day(), at(10, 0)))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::NotFound(_)));
  assert!(matches!(
    c.available_slots(Uuid::new_v4(), lesson_day()).await,
    Err(CoreError::NotFound(_))
  ));
}

#[tokio::test]
async fn concurrent_bookings_for_one_slot_have_one_winner() {
  let w = world().await;
  let c = coordinator(&w, early_june());

  let mut customers = Vec::new();
  for n in 0..10 {
    let p = add_profile(&w.store, &format!("racer{n}@example.com"), Role::User).await;
    customers.push(p.identity());
  }

  let handles: Vec<_> = customers
    .into_iter()
    .map(|who| {
      let c = c.clone();
      let req = request(w.instructor, lesson_day(), at(11, 30));
      tokio::spawn(async move { c.book(&who, req).await })
    })
    .collect();

  let mut won = 0;
  let mut lost = 0;
  for h in handles {
    match h.await.unwrap() {
      Ok(_) => won += 1,
      Err(CoreError::SlotTaken) => lost += 1,
      Err(e) => panic!("unexpected error: {e}"),
    }
  }
  assert_eq!((won, lost), (1, 9));
}

#[tokio::test]
async fn separate_connections_to_one_file_still_have_one_winner() {
  let path = std::env::temp_dir().join(format!("drivebook-{}.db", Uuid::new_v4()));
  let first = Arc::new(SqliteStore::open(&path).await.unwrap());
  let second = Arc::new(SqliteStore::open(&path).await.unwrap());

  let customer = add_profile(&first, "a@example.com", Role::User).await.identity();
  let other = add_profile(&first, "b@example.com", Role::User).await.identity();
  let instructor = add_instructor(&first, "i@example.com").await.id;

  let a = BookingCoordinator::new(context(&first, early_june()), LessonSchedule::default());
  let b = BookingCoordinator::new(context(&second, early_june()), LessonSchedule::default());
  let req = request(instructor, lesson_day(), at(9, 0));

  let (ra, rb) = tokio::join!(a.book(&customer, req.clone()), b.book(&other, req));
  let outcomes = [ra.is_ok(), rb.is_ok()];
  assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
  assert!(matches!(ra.err().or(rb.err()), Some(CoreError::SlotTaken)));

  drop((a, b, first, second));
  let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn only_the_owner_or_an_admin_may_cancel() {
  let w = world().await;
  let c = coordinator(&w, early_june());
  let booked = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(10, 0)))
    .await
    .unwrap();
  let stranger = add_profile(&w.store, "stranger@example.com", Role::User).await.identity();

  let err = c.cancel(&stranger, booked.booking.id).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden(_)));
  assert!(matches!(c.booking(&stranger, booked.booking.id).await, Err(CoreError::Forbidden(_))));

  let cancelled = c.cancel(&w.customer, booked.booking.id).await.unwrap();
  assert_eq!(cancelled.effective_status, BookingStatus::Cancelled);
  assert!(c.available_slots(w.instructor, lesson_day()).await.unwrap().contains(&at(10, 0)));

  let again = c.cancel(&w.customer, booked.booking.id).await.unwrap_err();
  assert!(matches!(
    again,
    CoreError::InvalidTransition { from: BookingStatus::Cancelled, to: BookingStatus::Cancelled }
  ));
}

#[tokio::test]
async fn confirmed_lessons_read_as_completed_once_started() {
  let w = world().await;
  let c = coordinator(&w, early_june());
  let booked = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(10, 0)))
    .await
    .unwrap();
  w.store
    .transition_booking(booked.booking.id, BookingStatus::Pending, BookingStatus::Confirmed)
    .await
    .unwrap();

  let later = coordinator(&w, FixedClock(utc(2025, 6, 10, 9, 0)));
  let mine = later.my_bookings(&w.customer).await.unwrap();
  assert_eq!(mine.len(), 1);
  assert_eq!(mine[0].booking.status, BookingStatus::Confirmed);
  assert_eq!(mine[0].effective_status, BookingStatus::Completed);

  // A completed lesson can no longer be cancelled.
  let err = later.cancel(&w.customer, booked.booking.id).await.unwrap_err();
  assert!(matches!(err, CoreError::InvalidTransition { from: BookingStatus::Completed, .. }));
}

#[tokio::test]
async fn slots_already_in_the_past_are_not_offered() {
  let w = world().await;
  // 11:10 local on the lesson day.
  let c = coordinator(&w, FixedClock(utc(2025, 6, 10, 9, 10)));

  let slots = c.available_slots(w.instructor, lesson_day()).await.unwrap();
  assert_eq!(slots.first(), Some(&at(11, 30)));
  assert_eq!(slots.len(), 12);
}

// ─── Rating aggregator ───────────────────────────────────────────────────────

#[tokio::test]
async fn rating_is_the_rounded_mean_of_all_reviews() {
  let w = world().await;
  let ratings = RatingAggregator::new(context(&w.store, early_june()));

  let mut last = None;
  for score in [5, 4, 4, 4] {
    let receipt = ratings
      .submit_review(&w.customer, w.instructor, score, Some("  good  ".into()))
      .await
      .unwrap();
    assert_eq!(receipt.review.review_text.as_deref(), Some("good"));
    last = Some(receipt.rating);
  }
  let expected: Decimal = "4.3".parse().unwrap();
  assert_eq!(last, Some(RatingRefresh::Updated { rating: Some(expected) }));

  let stored = w.store.get_instructor(w.instructor).await.unwrap().unwrap();
  assert_eq!(stored.instructor.rating, Some(expected));
  assert_eq!(ratings.reviews(w.instructor).await.unwrap().len(), 4);
}

#[tokio::test]
async fn invalid_reviews_are_rejected_without_writing() {
  let w = world().await;
  let ratings = RatingAggregator::new(context(&w.store, early_june()));
  let instructor_identity = Identity {
    user_id: w.instructor,
    email:   "instructor@example.com".into(),
    role:    Role::Instructor,
  };

  for (who, score) in [(&w.customer, 0), (&w.customer, 6), (&instructor_identity, 5)] {
    let err = ratings.submit_review(who, w.instructor, score, None).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
  }
  let err = ratings
    .submit_review(&w.customer, Uuid::new_v4(), 5, None)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::NotFound(_)));

  assert!(w.store.review_ratings(w.instructor).await.unwrap().is_empty());
  let stored = w.store.get_instructor(w.instructor).await.unwrap().unwrap();
  assert_eq!(stored.instructor.rating, None);
}

#[tokio::test]
async fn recomputing_without_new_reviews_changes_nothing() {
  let w = world().await;
  let ratings = RatingAggregator::new(context(&w.store, early_june()));
  let other = add_profile(&w.store, "other@example.com", Role::User).await.identity();

  assert_eq!(ratings.recompute(w.instructor).await.unwrap(), None);

  for (who, score) in [(&w.customer, 5), (&other, 4), (&w.customer, 3)] {
    ratings.submit_review(who, w.instructor, score, None).await.unwrap();
  }
  let first = ratings.recompute(w.instructor).await.unwrap();
  let second = ratings.recompute(w.instructor).await.unwrap();
  assert_eq!(first, Some(Decimal::new(40, 1)));
  assert_eq!(first, second);

  let stored = w.store.get_instructor(w.instructor).await.unwrap().unwrap();
  assert_eq!(stored.instructor.rating, second);

  assert!(matches!(ratings.recompute(Uuid::new_v4()).await, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn a_failed_rating_refresh_keeps_the_review() {
  let w = world().await;
  let ratings = RatingAggregator::new(context(&w.store, early_june()));
  w.store
    .execute_batch(
      "CREATE TRIGGER freeze_rating BEFORE UPDATE OF rating ON instructors
       BEGIN SELECT RAISE(ABORT, 'rating is frozen'); END;",
    )
    .await
    .unwrap();

  let receipt = ratings
    .submit_review(&w.customer, w.instructor, 5, Some("Great".into()))
    .await
    .unwrap();
  let RatingRefresh::Failed { error } = &receipt.rating else {
    panic!("expected a failed refresh, got {:?}", receipt.rating);
  };
  assert!(error.contains("rating is frozen"), "{error}");

  let kept = ratings.reviews(w.instructor).await.unwrap();
  assert_eq!(kept.len(), 1);
  assert_eq!(kept[0].id, receipt.review.id);
  let stored = w.store.get_instructor(w.instructor).await.unwrap().unwrap();
  assert_eq!(stored.instructor.rating, None);
}

// ─── Checkout ────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("processor unavailable")]
struct ProcessorDown;

/// In-memory processor: intents are created in `requires_payment_method`
/// and switched by the test.
#[derive(Default)]
struct FakeProcessor {
  intents: Mutex<HashMap<String, PaymentIntent>>,
}

impl FakeProcessor {
  fn settle(&self, id: &str, status: PaymentStatus) {
    if let Some(intent) = self.intents.lock().unwrap().get_mut(id) {
      intent.status = status;
    }
  }
}

impl PaymentProcessor for FakeProcessor {
  type Error = ProcessorDown;

  async fn create_payment_intent(
    &self,
    request: PaymentRequest,
  ) -> Result<PaymentIntent, ProcessorDown> {
    let id = format!("pi_{}", Uuid::new_v4().simple());
    let intent = PaymentIntent {
      client_secret: Some(format!("{id}_secret")),
      id:            id.clone(),
      status:        PaymentStatus::RequiresPaymentMethod,
      amount:        request.amount,
      currency:      request.currency,
      reference:     Some(request.reference),
    };
    self.intents.lock().unwrap().insert(id, intent.clone());
    Ok(intent)
  }

  async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, ProcessorDown> {
    self.intents.lock().unwrap().get(intent_id).cloned().ok_or(ProcessorDown)
  }
}

#[tokio::test]
async fn paying_for_a_booking_confirms_it() {
  let w = world().await;
  let c = coordinator(&w, early_june());
  let processor = Arc::new(FakeProcessor::default());
  let checkout = Checkout::new(context(&w.store, early_june()), Arc::clone(&processor), "zar");

  let booked = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(10, 0)))
    .await
    .unwrap();
  let session = checkout.start_payment(&w.customer, booked.booking.id).await.unwrap();
  assert_eq!(session.amount, 35000);
  assert_eq!(session.currency, "zar");
  assert_eq!(session.confirmation_reference, booked.confirmation_reference);

  // Not paid yet.
  let err = checkout
    .confirm_payment(&w.customer, &session.confirmation_reference, &session.payment_intent_id)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::PaymentIncomplete));

  processor.settle(&session.payment_intent_id, PaymentStatus::Succeeded);
  let confirmed = checkout
    .confirm_payment(&w.customer, &session.confirmation_reference, &session.payment_intent_id)
    .await
    .unwrap();
  assert_eq!(confirmed.booking.status, BookingStatus::Confirmed);

  let err = checkout.start_payment(&w.customer, booked.booking.id).await.unwrap_err();
  assert!(matches!(err, CoreError::InvalidTransition { from: BookingStatus::Confirmed, .. }));
}

#[tokio::test]
async fn an_intent_for_another_booking_does_not_confirm() {
  let w = world().await;
  let c = coordinator(&w, early_june());
  let processor = Arc::new(FakeProcessor::default());
  let checkout = Checkout::new(context(&w.store, early_june()), Arc::clone(&processor), "zar");

  let first = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(10, 0)))
    .await
    .unwrap();
  let second = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(11, 0)))
    .await
    .unwrap();
  let paid = checkout.start_payment(&w.customer, first.booking.id).await.unwrap();
  processor.settle(&paid.payment_intent_id, PaymentStatus::Succeeded);

  let err = checkout
    .confirm_payment(&w.customer, &second.confirmation_reference, &paid.payment_intent_id)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::PaymentIncomplete));

  let err = checkout
    .confirm_payment(&w.customer, &second.confirmation_reference, "pi_missing")
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Payment(_)));
}

/// Reports every intent as paid for `booking`, but the customer cancels the
/// booking while the processor is being asked.
struct CancelledWhilePaying {
  store:   Arc<SqliteStore>,
  booking: Booking,
}

impl PaymentProcessor for CancelledWhilePaying {
  type Error = ProcessorDown;

  async fn create_payment_intent(&self, _: PaymentRequest) -> Result<PaymentIntent, ProcessorDown> {
    Err(ProcessorDown)
  }

  async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, ProcessorDown> {
    self
      .store
      .transition_booking(self.booking.id, BookingStatus::Pending, BookingStatus::Cancelled)
      .await
      .map_err(|_| ProcessorDown)?;
    Ok(PaymentIntent {
      id:            intent_id.to_owned(),
      client_secret: None,
      status:        PaymentStatus::Succeeded,
      amount:        35000,
      currency:      "zar".into(),
      reference:     Some(self.booking.confirmation_ref.clone()),
    })
  }
}

#[tokio::test]
async fn confirmation_losing_a_race_to_cancellation_is_stale() {
  let w = world().await;
  let c = coordinator(&w, early_june());
  let booked = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(10, 0)))
    .await
    .unwrap();

  let processor = CancelledWhilePaying {
    store:   Arc::clone(&w.store),
    booking: booked.booking.clone(),
  };
  let checkout = Checkout::new(context(&w.store, early_june()), Arc::new(processor), "zar");

  let err = checkout
    .confirm_payment(&w.customer, &booked.confirmation_reference, "pi_race")
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::StaleStatus(id) if id == booked.booking.id));

  let stored = w.store.get_booking(booked.booking.id).await.unwrap().unwrap();
  assert_eq!(stored.status, BookingStatus::Cancelled);
}

// ─── Directory ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn registration_normalises_email_and_rejects_duplicates() {
  let s = Arc::new(store().await);
  let dir = Directory::new(context(&s, early_june()));

  let p = dir
    .register("  Zanele@Example.COM ", "Zanele", "Khumalo", "hash".into())
    .await
    .unwrap();
  assert_eq!(p.email, "zanele@example.com");
  assert_eq!(p.role, Role::User);

  let err = dir
    .register("zanele@example.com", "Z", "K", "hash".into())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Conflict(_)));

  let creds = dir.credentials("ZANELE@example.com").await.unwrap().unwrap();
  assert_eq!(creds.profile.id, p.id);

  let renamed = dir.update_names(&p.identity(), "Zee", "Khumalo").await.unwrap();
  assert_eq!(renamed.first_name, "Zee");
}

// ─── Admin ───────────────────────────────────────────────────────────────────

async fn admin_of(w: &World) -> Identity {
  add_profile(&w.store, "admin@example.com", Role::Admin).await.identity()
}

#[tokio::test]
async fn admin_operations_require_the_admin_role() {
  let w = world().await;
  let admin = AdminService::new(context(&w.store, early_june()));

  assert!(matches!(admin.stats(&w.customer).await, Err(CoreError::Forbidden(_))));
  assert!(matches!(admin.users(&w.customer).await, Err(CoreError::Forbidden(_))));
  assert!(matches!(
    admin.delete_user(&w.customer, w.instructor).await,
    Err(CoreError::Forbidden(_))
  ));
  // Nothing was deleted.
  assert!(w.store.get_instructor(w.instructor).await.unwrap().is_some());
}

#[tokio::test]
async fn admin_can_move_live_bookings_but_not_terminal_ones() {
  let w = world().await;
  let root = admin_of(&w).await;
  let admin = AdminService::new(context(&w.store, early_june()));
  let c = coordinator(&w, early_june());
  let booked = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(10, 0)))
    .await
    .unwrap();

  let done = admin
    .set_booking_status(&root, booked.booking.id, BookingStatus::Completed)
    .await
    .unwrap();
  assert_eq!(done.status, BookingStatus::Completed);

  let err = admin
    .set_booking_status(&root, booked.booking.id, BookingStatus::Pending)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidTransition { .. }));

  let pending = admin
    .bookings(&root, BookingQuery {
      status: Some(BookingStatus::Pending),
      ..Default::default()
    })
    .await
    .unwrap();
  assert!(pending.is_empty());

  admin.delete_booking(&root, booked.booking.id).await.unwrap();
  assert!(matches!(
    admin.delete_booking(&root, booked.booking.id).await,
    Err(CoreError::NotFound(_))
  ));
}

#[tokio::test]
async fn admin_cannot_revive_a_lesson_that_has_already_happened() {
  let w = world().await;
  let root = admin_of(&w).await;
  let c = coordinator(&w, early_june());
  let booked = c
    .book(&w.customer, request(w.instructor, lesson_day(), at(10, 0)))
    .await
    .unwrap();
  w.store
    .transition_booking(booked.booking.id, BookingStatus::Pending, BookingStatus::Confirmed)
    .await
    .unwrap();

  let next_day = AdminService::new(context(&w.store, FixedClock(utc(2025, 6, 11, 0, 0))));
  for target in [BookingStatus::Pending, BookingStatus::Cancelled, BookingStatus::Confirmed] {
    let err = next_day
      .set_booking_status(&root, booked.booking.id, target)
      .await
      .unwrap_err();
    assert!(
      matches!(err, CoreError::InvalidTransition { from: BookingStatus::Completed, .. }),
      "{target}: {err}"
    );
  }

  let stored = w.store.get_booking(booked.booking.id).await.unwrap().unwrap();
  assert_eq!(stored.status, BookingStatus::Confirmed);
  let views = next_day.bookings(&root, BookingQuery::default()).await.unwrap();
  assert_eq!(views[0].effective_status, BookingStatus::Completed);
}

#[tokio::test]
async fn instructors_keep_their_role_while_their_record_exists() {
  let w = world().await;
  let root = admin_of(&w).await;
  let admin = AdminService::new(context(&w.store, early_june()));

  for role in [Role::User, Role::Admin] {
    let err = admin.set_role(&root, w.instructor, role).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)), "{role}: {err}");
  }
  let profile = w.store.get_profile(w.instructor).await.unwrap().unwrap();
  assert_eq!(profile.role, Role::Instructor);
  assert!(w.store.get_instructor(w.instructor).await.unwrap().is_some());

  admin.remove_instructor(&root, w.instructor).await.unwrap();
  let promoted = admin.set_role(&root, w.instructor, Role::Admin).await.unwrap();
  assert_eq!(promoted.role, Role::Admin);
}

#[tokio::test]
async fn deleting_a_reviewer_refreshes_the_instructor_rating() {
  let w = world().await;
  let root = admin_of(&w).await;
  let ctx = context(&w.store, early_june());
  let admin = AdminService::new(ctx.clone());
  let ratings = RatingAggregator::new(ctx);
  let other = add_profile(&w.store, "other@example.com", Role::User).await.identity();

  ratings.submit_review(&w.customer, w.instructor, 5, None).await.unwrap();
  ratings.submit_review(&other, w.instructor, 3, None).await.unwrap();

  admin.delete_user(&root, w.customer.user_id).await.unwrap();

  let stored = w.store.get_instructor(w.instructor).await.unwrap().unwrap();
  assert_eq!(stored.instructor.rating, Some(Decimal::new(30, 1)));

  let err = admin.delete_user(&root, root.user_id).await.unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn promoting_a_profile_to_instructor() {
  let w = world().await;
  let root = admin_of(&w).await;
  let admin = AdminService::new(context(&w.store, early_june()));
  let hopeful = add_profile(&w.store, "hopeful@example.com", Role::User).await;

  let err = admin
    .create_instructor(&root, "hopeful@example.com", "New", Decimal::new(300, 0))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));

  admin.set_role(&root, hopeful.id, Role::Instructor).await.unwrap();
  let created = admin
    .create_instructor(&root, "hopeful@example.com", "New", Decimal::new(300, 0))
    .await
    .unwrap();
  assert_eq!(created.id, hopeful.id);
  assert_eq!(created.rating, None);

  let err = admin
    .create_instructor(&root, "hopeful@example.com", "New", Decimal::new(300, 0))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Conflict(_)));

  admin.remove_instructor(&root, hopeful.id).await.unwrap();
  let demoted = w.store.get_profile(hopeful.id).await.unwrap().unwrap();
  assert_eq!(demoted.role, Role::User);
}
