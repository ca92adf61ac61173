//! Tenants, ad accounts, and the Meta business connections that hold the
//! access tokens used to read them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant. Every CRM and analytics row is scoped to exactly one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
  pub organization_id: Uuid,
  pub name:            String,
  /// Lowercase, unique. Also used as the inbound email local-part.
  pub slug:            String,
  pub created_at:      DateTime<Utc>,
}

/// Normalise a user-supplied slug: lowercase, ASCII alphanumerics and `-`.
pub fn slugify(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  let mut last_dash = true;
  for c in input.trim().chars() {
    if c.is_ascii_alphanumeric() {
      out.push(c.to_ascii_lowercase());
      last_dash = false;
    } else if !last_dash {
      out.push('-');
      last_dash = true;
    }
  }
  while out.ends_with('-') {
    out.pop();
  }
  out
}

/// The ads platform an account belongs to. Only Meta is synced.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
  Meta,
  Google,
}

/// A Meta ad account mirrored for an organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdAccount {
  pub ad_account_id:   Uuid,
  pub organization_id: Uuid,
  /// Numeric Meta id, stored without the `act_` prefix.
  pub external_id:     String,
  pub provider:        Provider,
  pub business_name:   Option<String>,
  pub is_active:       bool,
  /// The user whose Meta connection should be used to read this account.
  pub connected_by:    Option<Uuid>,
  pub created_at:      DateTime<Utc>,
}

impl AdAccount {
  /// The Graph API node for this account, e.g. `act_1234`.
  pub fn graph_node(&self) -> String { format!("act_{}", strip_act_prefix(&self.external_id)) }

  /// Human label used in reports.
  pub fn label(&self) -> &str { self.business_name.as_deref().unwrap_or(&self.external_id) }
}

/// Strip a leading `act_` if present.
pub fn strip_act_prefix(id: &str) -> &str { id.strip_prefix("act_").unwrap_or(id) }

/// Input for registering an ad account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAdAccount {
  pub organization_id: Uuid,
  pub external_id:     String,
  pub business_name:   Option<String>,
  pub connected_by:    Option<Uuid>,
}

/// An OAuth connection between a user and Meta Business.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetaConnection {
  pub connection_id:    Uuid,
  pub user_id:          Uuid,
  /// Never serialised back to API clients.
  #[serde(skip_serializing)]
  pub access_token:     String,
  pub token_expires_at: Option<DateTime<Utc>>,
  pub is_active:        bool,
  pub connected_at:     DateTime<Utc>,
}

impl MetaConnection {
  /// Active and not past its expiry. A connection without an expiry is a
  /// long-lived token and stays usable.
  pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
    self.is_active && self.token_expires_at.is_none_or(|exp| now < exp)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  fn connection(expires: Option<DateTime<Utc>>, active: bool) -> MetaConnection {
    MetaConnection {
      connection_id:    Uuid::new_v4(),
      user_id:          Uuid::new_v4(),
      access_token:     "tok".into(),
      token_expires_at: expires,
      is_active:        active,
      connected_at:     Utc::now(),
    }
  }

  #[test]
  fn expired_connection_is_not_usable() {
    let now = Utc::now();
    assert!(!connection(Some(now - Duration::hours(1)), true).is_usable(now));
    assert!(connection(Some(now + Duration::hours(1)), true).is_usable(now));
    assert!(connection(None, true).is_usable(now));
    assert!(!connection(None, false).is_usable(now));
  }

  #[test]
  fn graph_node_never_doubles_prefix() {
    let mut account = AdAccount {
      ad_account_id:   Uuid::new_v4(),
      organization_id: Uuid::new_v4(),
      external_id:     "123".into(),
      provider:        Provider::Meta,
      business_name:   None,
      is_active:       true,
      connected_by:    None,
      created_at:      Utc::now(),
    };
    assert_eq!(account.graph_node(), "act_123");
    account.external_id = "act_123".into();
    assert_eq!(account.graph_node(), "act_123");
  }

  #[test]
  fn slugify_collapses_separators() {
    assert_eq!(slugify("  Acme  Corp!! "), "acme-corp");
    assert_eq!(slugify("Loja_da-Ana"), "loja-da-ana");
  }
}
