//! SQL schema for the drivebook SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS profiles (
    id            TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'user',  -- 'user' | 'instructor' | 'admin'
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS instructors (
    id           TEXT PRIMARY KEY REFERENCES profiles(id),
    bio          TEXT NOT NULL,
    lesson_price TEXT NOT NULL,   -- decimal string
    rating       TEXT             -- decimal string, one fraction digit; NULL without reviews
);

CREATE TABLE IF NOT EXISTS bookings (
    id               TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL REFERENCES profiles(id),
    instructor_id    TEXT NOT NULL REFERENCES instructors(id),
    start_time       INTEGER NOT NULL,  -- unix seconds, UTC
    status           TEXT NOT NULL DEFAULT 'pending',
    confirmation_ref TEXT NOT NULL UNIQUE,
    created_at       TEXT NOT NULL
);

-- The slot ledger's one rule: a live booking per (instructor, start).
-- Enforced here so concurrent inserts from any process are linearised.
CREATE UNIQUE INDEX IF NOT EXISTS bookings_live_slot_idx
    ON bookings(instructor_id, start_time)
    WHERE status != 'cancelled';

-- Reviews are append-only; rows go away only when a user or instructor is
-- removed.
CREATE TABLE IF NOT EXISTS instructor_reviews (
    id            TEXT PRIMARY KEY,
    instructor_id TEXT NOT NULL REFERENCES instructors(id),
    client_id     TEXT NOT NULL REFERENCES profiles(id),
    rating        INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    review_text   TEXT,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS bookings_user_idx        ON bookings(user_id);
CREATE INDEX IF NOT EXISTS bookings_instructor_idx  ON bookings(instructor_id, start_time);
CREATE INDEX IF NOT EXISTS reviews_instructor_idx   ON instructor_reviews(instructor_id);

PRAGMA user_version = 1;
";
