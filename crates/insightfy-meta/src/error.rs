//! Error types for `insightfy-meta`.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Graph API error codes that mean "slow down" even when the HTTP status is
/// a plain 400: 4 (app request limit), 17 (user request limit) and 613
/// (calls within one hour exceeded).
pub const RATE_LIMIT_CODES: &[i64] = &[4, 17, 613];

#[derive(Debug, Error)]
pub enum Error {
  #[error("request to {url} failed: {source}")]
  Http {
    url:    String,
    #[source]
    source: reqwest::Error,
  },

  #[error("Meta API returned {status} for {url}: {body}")]
  Api {
    status: StatusCode,
    /// `error.code` from the response body, when it parsed.
    code:   Option<i64>,
    url:    String,
    body:   String,
  },

  #[error("could not decode response from {url}: {source}")]
  Decode {
    url:    String,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid URL: {0}")]
  Url(#[from] url::ParseError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// HTTP 429 or one of the Graph rate-limit codes.
  pub fn is_rate_limited(&self) -> bool {
    match self {
      Error::Api { status, code, .. } => {
        *status == StatusCode::TOO_MANY_REQUESTS || code.is_some_and(|c| RATE_LIMIT_CODES.contains(&c))
      }
      _ => false,
    }
  }

  pub fn status(&self) -> Option<StatusCode> {
    match self {
      Error::Api { status, .. } => Some(*status),
      Error::Http { source, .. } => source.status(),
      _ => None,
    }
  }
}

pub trait IsRetryable {
  fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
  fn is_retryable(&self) -> bool {
    match self {
      Error::Http { source, .. } => source.is_timeout() || source.is_connect(),
      Error::Api { status, .. } => status.is_server_error() || self.is_rate_limited(),
      Error::Decode { .. } | Error::Url(_) => false,
    }
  }
}

/// `{"error": {"message", "type", "code"}}` as sent by the Graph API.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
  pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
  #[serde(default)]
  pub code: Option<i64>,
}

/// Extract `error.code` from a Graph error body, if any.
pub(crate) fn graph_error_code(body: &str) -> Option<i64> {
  serde_json::from_str::<ErrorEnvelope>(body).ok()?.error.code
}
