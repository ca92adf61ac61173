//! Access-token resolution for one run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use insightfy_core::{org::AdAccount, store::AdsStore};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Resolves the token to use for each ad account: the newest usable
/// connection of the user who connected it, else the fallback token.
/// Lookups are cached per user for the lifetime of the run.
pub(crate) struct TokenCache<'a> {
  fallback: Option<&'a str>,
  now:      DateTime<Utc>,
  by_user:  HashMap<Uuid, Option<String>>,
}

impl<'a> TokenCache<'a> {
  pub fn new(fallback: Option<&'a str>, now: DateTime<Utc>) -> Self {
    Self { fallback: fallback.filter(|t| !t.is_empty()), now, by_user: HashMap::new() }
  }

  pub async fn resolve<S: AdsStore>(&mut self, store: &S, account: &AdAccount) -> Result<Option<String>> {
    if let Some(user) = account.connected_by {
      let token = match self.by_user.get(&user) {
        Some(cached) => cached.clone(),
        None => {
          let token = store
            .usable_connection(user, self.now)
            .await
            .map_err(Error::store)?
            .map(|c| c.access_token);
          self.by_user.insert(user, token.clone());
          token
        }
      };
      if token.is_some() {
        return Ok(token);
      }
      debug!(%user, account = %account.external_id, "no usable connection, trying fallback token");
    }
    Ok(self.fallback.map(str::to_owned))
  }
}
