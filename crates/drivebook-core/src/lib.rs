//! Core types, trait definitions and services for the drivebook lesson
//! booking service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage and payment processing are reached through the
//! [`store::BookingStore`] and [`payment::PaymentProcessor`] traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod admin;
pub mod aggregator;
pub mod booking;
pub mod checkout;
pub mod clock;
pub mod context;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod identity;
pub mod instructor;
pub mod ledger;
pub mod payment;
pub mod profile;
pub mod rating;
pub mod review;
pub mod schedule;
pub mod store;
pub mod upstream;

pub use error::{Error, Result};
