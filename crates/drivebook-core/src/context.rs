//! Shared handles threaded through every service.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
  Result,
  clock::{Clock, SystemClock},
  store::BookingStore,
  upstream::{self, DEFAULT_TIMEOUT},
};

/// Store, clock and upstream deadline. Cloning is cheap.
pub struct ServiceContext<S> {
  pub store:   Arc<S>,
  pub clock:   Arc<dyn Clock>,
  pub timeout: Duration,
}

impl<S> Clone for ServiceContext<S> {
  fn clone(&self) -> Self {
    Self {
      store:   Arc::clone(&self.store),
      clock:   Arc::clone(&self.clock),
      timeout: self.timeout,
    }
  }
}

impl<S: BookingStore> ServiceContext<S> {
  /// Wall clock and the default deadline.
  pub fn new(store: Arc<S>) -> Self {
    Self { store, clock: Arc::new(SystemClock), timeout: DEFAULT_TIMEOUT }
  }

  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

  /// Run a store call under the upstream deadline.
  pub async fn call<'a, T, F>(&'a self, f: impl FnOnce(&'a S) -> F) -> Result<T>
  where
    F: Future<Output = Result<T, S::Error>>,
  {
    upstream::storage(self.timeout, f(&self.store)).await
  }
}
