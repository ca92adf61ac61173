//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::signature::SignatureError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("forbidden")]
  Forbidden,
  #[error("invalid signature: {0}")]
  Signature(#[from] SignatureError),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("bad request: {0}")]
  BadRequest(String),
  /// The payload is well formed but cannot be routed anywhere; senders
  /// should not retry it.
  #[error("not acceptable: {0}")]
  NotAcceptable(String),
  #[error(transparent)]
  Sync(#[from] insightfy_sync::Error),
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self { Error::Store(Box::new(err)) }

  fn status(&self) -> StatusCode {
    match self {
      Error::Unauthorized | Error::Signature(_) => StatusCode::UNAUTHORIZED,
      Error::Forbidden => StatusCode::FORBIDDEN,
      Error::NotFound(_) => StatusCode::NOT_FOUND,
      Error::BadRequest(_) => StatusCode::BAD_REQUEST,
      Error::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
      Error::Sync(insightfy_sync::Error::Core(_)) => StatusCode::BAD_REQUEST,
      Error::Sync(insightfy_sync::Error::NoToken) => StatusCode::SERVICE_UNAVAILABLE,
      Error::Sync(insightfy_sync::Error::Graph(e)) if e.is_rate_limited() => StatusCode::TOO_MANY_REQUESTS,
      Error::Sync(insightfy_sync::Error::Graph(_)) => StatusCode::BAD_GATEWAY,
      Error::Sync(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    } else {
      tracing::debug!(error = %self, %status, "request rejected");
    }

    let mut res = (status, Json(json!({ "error": self.to_string() }))).into_response();
    if matches!(self, Error::Unauthorized) {
      res
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"insightfy\""));
    }
    res
  }
}
