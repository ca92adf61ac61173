//! Error types for `insightfy-core`.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid date window: since {since} is after until {until}")]
  InvertedWindow { since: NaiveDate, until: NaiveDate },

  #[error("invalid date {0:?}, expected YYYY-MM-DD")]
  InvalidDate(String),

  #[error("missing required parameter: {0}")]
  MissingParameter(&'static str),

  #[error("no leads selected")]
  EmptySelection,

  #[error("goal target must be positive, got {0}")]
  InvalidTarget(f64),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
