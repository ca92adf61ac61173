//! Server configuration, layered from `config.toml` and `INSIGHTFY_*`
//! environment variables.
//!
//! Nested tables use a double underscore in the environment, e.g.
//! `INSIGHTFY_META__API_VERSION=v24.0` sets `meta.api_version`.

use std::path::{Path, PathBuf};

use insightfy_meta::GraphConfig;
use insightfy_sync::{DEFAULT_BATCH_SIZE, SyncConfig};
use serde::Deserialize;

use crate::auth::AuthConfig;

/// Runtime server configuration. Every secret is optional; a missing webhook
/// secret turns its signature check off.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                  String,
  pub port:                  u16,
  pub store_path:            PathBuf,
  pub auth_username:         String,
  /// Argon2 PHC string, see `insightfy hash-password`.
  pub auth_password_hash:    String,
  /// Graph API client settings (`[meta]`).
  pub meta:                  GraphConfig,
  /// Token for accounts without a usable connection, and for webhook lead
  /// fetches.
  pub meta_fallback_token:   Option<String>,
  pub meta_app_secret:       Option<String>,
  pub meta_verify_token:     Option<String>,
  pub mailgun_signing_key:   Option<String>,
  pub stripe_webhook_secret: Option<String>,
  pub sync_batch_size:       usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                  "127.0.0.1".to_owned(),
      port:                  8080,
      store_path:            PathBuf::from("insightfy.db"),
      auth_username:         "admin".to_owned(),
      auth_password_hash:    String::new(),
      meta:                  GraphConfig::default(),
      meta_fallback_token:   None,
      meta_app_secret:       None,
      meta_verify_token:     None,
      mailgun_signing_key:   None,
      stripe_webhook_secret: None,
      sync_batch_size:       DEFAULT_BATCH_SIZE,
    }
  }
}

/// Treat `""` from an empty environment variable as unset.
fn non_empty(v: &Option<String>) -> Option<&str> { v.as_deref().filter(|s| !s.trim().is_empty()) }

impl ServerConfig {
  /// Read `path` (optional) and then the environment on top of it.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("INSIGHTFY").separator("__"))
      .build()?
      .try_deserialize()
  }

  pub fn auth(&self) -> AuthConfig {
    AuthConfig {
      username:      self.auth_username.clone(),
      password_hash: self.auth_password_hash.clone(),
    }
  }

  pub fn sync_config(&self) -> SyncConfig {
    SyncConfig {
      fallback_token: non_empty(&self.meta_fallback_token).map(str::to_owned),
      batch_size:     self.sync_batch_size,
    }
  }

  pub fn meta_app_secret(&self) -> Option<&str> { non_empty(&self.meta_app_secret) }

  pub fn meta_verify_token(&self) -> Option<&str> { non_empty(&self.meta_verify_token) }

  pub fn mailgun_signing_key(&self) -> Option<&str> { non_empty(&self.mailgun_signing_key) }

  pub fn stripe_webhook_secret(&self) -> Option<&str> { non_empty(&self.stripe_webhook_secret) }
}
