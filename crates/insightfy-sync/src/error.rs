//! Error types for `insightfy-sync`.
//!
//! Only failures that make a whole run meaningless surface here. Per-account
//! and per-chunk problems are collected into the run's report instead.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] insightfy_core::Error),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error(transparent)]
  Graph(#[from] insightfy_meta::Error),

  #[error("no Meta access token configured")]
  NoToken,
}

impl Error {
  /// Wrap a backend error. The two store traits each carry their own error
  /// type, so both are boxed into the same variant.
  pub(crate) fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
