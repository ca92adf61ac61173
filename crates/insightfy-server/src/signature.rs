//! Webhook signature checks for Meta, Mailgun and Stripe.
//!
//! All three are HMACs over the raw request (or parts of it) compared in
//! constant time against a hex digest supplied by the sender.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// How far a Mailgun timestamp may drift from the server clock.
pub const MAILGUN_MAX_SKEW_SECS: i64 = 15 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
  #[error("signature missing")]
  Missing,
  #[error("signature header is malformed")]
  Malformed,
  #[error("signature does not match")]
  Mismatch,
  #[error("timestamp outside the accepted window")]
  Stale,
  #[error("signing key rejected")]
  Key,
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, SignatureError> {
  let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| SignatureError::Key)?;
  for part in parts {
    mac.update(part);
  }
  Ok(mac.finalize().into_bytes().to_vec())
}

fn hmac_sha1(key: &[u8], body: &[u8]) -> Result<Vec<u8>, SignatureError> {
  let mut mac = <HmacSha1 as Mac>::new_from_slice(key).map_err(|_| SignatureError::Key)?;
  mac.update(body);
  Ok(mac.finalize().into_bytes().to_vec())
}

fn matches_hex(expected: &[u8], received: &str) -> bool {
  match hex::decode(received.trim()) {
    Ok(bytes) => expected.ct_eq(&bytes).into(),
    Err(_) => false,
  }
}

/// `X-Hub-Signature-256: sha256=<hex>` over the raw body, falling back to
/// the legacy `X-Hub-Signature: sha1=<hex>` when only that is present.
pub fn verify_meta(
  app_secret: &str,
  sha256_header: Option<&str>,
  sha1_header: Option<&str>,
  body: &[u8],
) -> Result<(), SignatureError> {
  let (expected, received) = match (sha256_header, sha1_header) {
    (Some(h), _) => {
      let hex = h.trim().strip_prefix("sha256=").ok_or(SignatureError::Malformed)?;
      (hmac_sha256(app_secret.as_bytes(), &[body])?, hex)
    }
    (None, Some(h)) => {
      let hex = h.trim().strip_prefix("sha1=").ok_or(SignatureError::Malformed)?;
      (hmac_sha1(app_secret.as_bytes(), body)?, hex)
    }
    (None, None) => return Err(SignatureError::Missing),
  };
  if matches_hex(&expected, received) { Ok(()) } else { Err(SignatureError::Mismatch) }
}

/// `HMAC-SHA256(signing_key, timestamp ‖ token) == signature`, with the
/// timestamp (unix seconds) no more than [`MAILGUN_MAX_SKEW_SECS`] from
/// `now`.
pub fn verify_mailgun(
  signing_key: &str,
  timestamp: &str,
  token: &str,
  signature: &str,
  now: DateTime<Utc>,
) -> Result<(), SignatureError> {
  let ts: i64 = timestamp.trim().parse().map_err(|_| SignatureError::Malformed)?;
  if (now.timestamp() - ts).abs() > MAILGUN_MAX_SKEW_SECS {
    return Err(SignatureError::Stale);
  }
  let expected = hmac_sha256(signing_key.as_bytes(), &[timestamp.trim().as_bytes(), token.as_bytes()])?;
  if matches_hex(&expected, signature) { Ok(()) } else { Err(SignatureError::Mismatch) }
}

/// `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>…]`, each `v1` an
/// HMAC-SHA256 of `"<t>.<payload>"`. Any matching `v1` is accepted.
pub fn verify_stripe(secret: &str, header: &str, payload: &[u8]) -> Result<(), SignatureError> {
  let mut timestamp = None;
  let mut candidates = Vec::new();
  for part in header.split(',') {
    match part.trim().split_once('=') {
      Some(("t", v)) => timestamp = Some(v),
      Some(("v1", v)) if !v.is_empty() => candidates.push(v),
      _ => {}
    }
  }
  let Some(timestamp) = timestamp else {
    return Err(SignatureError::Malformed);
  };
  if candidates.is_empty() {
    return Err(SignatureError::Malformed);
  }

  let expected = hmac_sha256(secret.as_bytes(), &[timestamp.as_bytes(), b".", payload])?;
  if candidates.iter().any(|c| matches_hex(&expected, c)) {
    Ok(())
  } else {
    Err(SignatureError::Mismatch)
  }
}
