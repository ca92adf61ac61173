//! HTTP Basic-auth extractor and standalone verifier.
//!
//! The operator's password is stored only as an argon2 PHC string. The
//! extractor is layered onto the `/api` and `/sync` routers with
//! [`axum::middleware::from_extractor_with_state`].

use std::sync::Arc;

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::{self, SaltString},
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rand_core::OsRng;
use subtle::ConstantTimeEq;

use crate::error::Error;

/// Credentials accepted as valid for this server instance.
#[derive(Debug, Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// Zero-size marker: present in the handler means the request was authenticated.
pub struct Authenticated;

/// Hash `password` into a PHC string with a fresh salt.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Verify credentials directly from headers.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), Error> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val.strip_prefix("Basic ").ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded.trim()).map_err(|_| Error::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;

  if !bool::from(username.as_bytes().ct_eq(config.username.as_bytes())) {
    return Err(Error::Unauthorized);
  }

  let parsed_hash = PasswordHash::new(&config.password_hash).map_err(|_| Error::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthorized)?;

  Ok(())
}

impl FromRequestParts<Arc<AuthConfig>> for Authenticated {
  type Rejection = Error;

  async fn from_request_parts(parts: &mut Parts, config: &Arc<AuthConfig>) -> Result<Self, Self::Rejection> {
    verify_auth(&parts.headers, config)?;
    Ok(Authenticated)
  }
}

#[cfg(test)]
mod tests {
  use axum::http::Request;

  use super::*;

  fn config(password: &str) -> Arc<AuthConfig> {
    Arc::new(AuthConfig {
      username:      "admin".to_owned(),
      password_hash: hash_password(password).unwrap(),
    })
  }

  async fn extract(req: Request<axum::body::Body>, config: &Arc<AuthConfig>) -> Result<Authenticated, Error> {
    let (mut parts, _) = req.into_parts();
    Authenticated::from_request_parts(&mut parts, config).await
  }

  fn basic(user: &str, pass: &str) -> String {
    let encoded = B64.encode(format!("{user}:{pass}"));
    format!("Basic {encoded}")
  }

  fn with_auth(value: &str) -> Request<axum::body::Body> {
    Request::builder()
      .header(header::AUTHORIZATION, value)
      .body(axum::body::Body::empty())
      .unwrap()
  }

  #[tokio::test]
  async fn correct_credentials() {
    let config = config("secret");
    assert!(extract(with_auth(&basic("admin", "secret")), &config).await.is_ok());
  }

  #[tokio::test]
  async fn wrong_password() {
    let config = config("secret");
    let result = extract(with_auth(&basic("admin", "wrong")), &config).await;
    assert!(matches!(result, Err(Error::Unauthorized)));
  }

  #[tokio::test]
  async fn wrong_username() {
    let config = config("secret");
    let result = extract(with_auth(&basic("root", "secret")), &config).await;
    assert!(matches!(result, Err(Error::Unauthorized)));
  }

  #[tokio::test]
  async fn missing_header() {
    let config = config("secret");
    let req = Request::builder().body(axum::body::Body::empty()).unwrap();
    assert!(matches!(extract(req, &config).await, Err(Error::Unauthorized)));
  }

  #[tokio::test]
  async fn invalid_base64() {
    let config = config("secret");
    let result = extract(with_auth("Basic !!!not-base64!!!"), &config).await;
    assert!(matches!(result, Err(Error::Unauthorized)));
  }

  #[tokio::test]
  async fn unconfigured_hash_rejects_everyone() {
    let config = Arc::new(AuthConfig { username: "admin".into(), password_hash: String::new() });
    let result = extract(with_auth(&basic("admin", "")), &config).await;
    assert!(matches!(result, Err(Error::Unauthorized)));
  }
}
