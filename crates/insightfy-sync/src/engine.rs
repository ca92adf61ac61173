//! The engine type and the plumbing shared by every sync job.

use std::{fmt::Display, future::Future};

use chrono::Utc;
use insightfy_core::{
  org::AdAccount,
  store::{AccountFilter, AdsStore, CrmStore},
};
use insightfy_meta::GraphApi;
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  report::SyncReport,
  tokens::TokenCache,
};

/// Rows per store upsert call.
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct SyncConfig {
  /// Used for accounts whose connecting user has no usable token, and for
  /// webhook lead fetches.
  pub fallback_token: Option<String>,
  pub batch_size:     usize,
}

impl Default for SyncConfig {
  fn default() -> Self { Self { fallback_token: None, batch_size: DEFAULT_BATCH_SIZE } }
}

/// Drives a [`GraphApi`] into a store. Cheap to share behind an `Arc`; every
/// method takes `&self` and keeps its state on the stack.
pub struct SyncEngine<S, G> {
  pub(crate) store:  S,
  pub(crate) graph:  G,
  pub(crate) config: SyncConfig,
}

impl<S, G> SyncEngine<S, G>
where
  S: AdsStore + CrmStore,
  G: GraphApi,
{
  pub fn new(store: S, graph: G, config: SyncConfig) -> Self { Self { store, graph, config } }

  pub fn store(&self) -> &S { &self.store }

  pub fn graph(&self) -> &G { &self.graph }

  pub(crate) fn tokens(&self) -> TokenCache<'_> {
    TokenCache::new(self.config.fallback_token.as_deref(), Utc::now())
  }

  /// Accounts selected by id, or every account when `ids` is empty. Inactive
  /// accounts are included so the caller can report them as skipped.
  pub(crate) async fn accounts(&self, ids: &[Uuid]) -> Result<Vec<AdAccount>> {
    self
      .store
      .ad_accounts(AccountFilter { ad_account_ids: ids.to_vec(), ..AccountFilter::default() })
      .await
      .map_err(Error::store)
  }

  /// The token for `account`, or `None` after recording the skip.
  pub(crate) async fn token_for(
    &self,
    tokens: &mut TokenCache<'_>,
    account: &AdAccount,
    report: &mut SyncReport,
  ) -> Result<Option<String>> {
    if !account.is_active {
      report.skip(format!("account {} inactive", account.external_id));
      return Ok(None);
    }
    let token = tokens.resolve(&self.store, account).await?;
    if token.is_none() {
      report.skip(format!("no valid token for account {}", account.external_id));
    }
    Ok(token)
  }

  pub(crate) fn batch_size(&self) -> usize { self.config.batch_size.max(1) }
}

/// Feed `rows` to `upsert` in batches. A failed batch is recorded and the
/// remaining batches still run.
pub(crate) async fn upsert_in_batches<T, F, Fut, E>(
  rows: Vec<T>,
  batch_size: usize,
  account: &str,
  report: &mut SyncReport,
  mut upsert: F,
) where
  F: FnMut(Vec<T>) -> Fut,
  Fut: Future<Output = Result<usize, E>>,
  E: Display,
{
  let mut rows = rows.into_iter().peekable();
  while rows.peek().is_some() {
    let batch: Vec<T> = rows.by_ref().take(batch_size).collect();
    let len = batch.len();
    match upsert(batch).await {
      Ok(written) => report.total_upserts += written,
      Err(e) => report.error(format!("upserting {len} rows for account {account}: {e}")),
    }
  }
}
