//! Daily insight syncs at campaign, ad set and ad level.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use insightfy_core::{
  ads::{AdRef, AdSetRef},
  insight::{AdDailyInsight, AdSetDailyInsight, CampaignDailyInsight, InsightLevel},
  org::AdAccount,
  store::{AdsStore, CrmStore},
};
use insightfy_meta::{GraphApi, InsightRequest, types::InsightRow};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  engine::{SyncEngine, upsert_in_batches},
  error::{Error, Result},
  report::{ChunkReport, SyncReport},
  request::SyncRequest,
};

/// External id → local ids for the level being synced.
enum Mapping {
  Campaign(HashMap<String, Uuid>),
  AdSet(HashMap<String, AdSetRef>),
  Ad(HashMap<String, AdRef>),
}

impl Mapping {
  fn len(&self) -> usize {
    match self {
      Mapping::Campaign(m) => m.len(),
      Mapping::AdSet(m) => m.len(),
      Mapping::Ad(m) => m.len(),
    }
  }

  fn is_empty(&self) -> bool { self.len() == 0 }
}

/// What one account's insight requests are filtered to, and how the rows
/// that come back are attached locally.
struct Targets {
  mapping:      Mapping,
  campaign_ids: Vec<String>,
  ad_set_ids:   Vec<String>,
  ad_ids:       Vec<String>,
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
  let mut keys: Vec<String> = map.keys().cloned().collect();
  keys.sort();
  keys
}

impl<S, G> SyncEngine<S, G>
where
  S: AdsStore + CrmStore,
  G: GraphApi,
{
  pub async fn sync_campaign_insights(&self, req: SyncRequest) -> Result<SyncReport> {
    self.sync_insights(req, InsightLevel::Campaign).await
  }

  pub async fn sync_ad_set_insights(&self, req: SyncRequest) -> Result<SyncReport> {
    self.sync_insights(req, InsightLevel::AdSet).await
  }

  pub async fn sync_ad_insights(&self, req: SyncRequest) -> Result<SyncReport> {
    self.sync_insights(req, InsightLevel::Ad).await
  }

  async fn sync_insights(&self, req: SyncRequest, level: InsightLevel) -> Result<SyncReport> {
    let window = req.window(Utc::now().date_naive())?;
    let chunk_days = req.chunk_days();
    let mut report = SyncReport::for_window(window, req.dry_run);
    let mut tokens = self.tokens();
    info!(
      %level,
      since = %window.since,
      until = %window.until,
      chunk_days,
      dry_run = req.dry_run,
      "insight sync started"
    );

    for account in self.accounts(&req.ad_account_ids).await? {
      let Some(token) = self.token_for(&mut tokens, &account, &mut report).await? else {
        continue;
      };
      let node = account.graph_node();

      if let Err(e) = self.graph.account(&token, &node).await {
        report.skip(format!("connectivity failed for account {}: {e}", account.external_id));
        if e.is_rate_limited() {
          report.rate_limited = true;
        }
        continue;
      }

      let targets = match self.insight_targets(&account, &req, level).await {
        Ok(t) => t,
        Err(e) => {
          report.error(format!("loading {level} ids for account {}: {e}", account.external_id));
          continue;
        }
      };
      if targets.mapping.is_empty() {
        report.note(format!("no {level} rows to sync for account {}", account.external_id));
        continue;
      }
      report.accounts_processed += 1;

      for chunk in window.chunks(chunk_days) {
        let request = InsightRequest {
          account: node.clone(),
          level,
          campaign_ids: targets.campaign_ids.clone(),
          ad_set_ids: targets.ad_set_ids.clone(),
          ad_ids: targets.ad_ids.clone(),
          chunk,
        };
        let fetched = self.graph.insights(&token, &request).await;
        let context = || format!("{level} insights for account {} ({} to {})", account.external_id, chunk.start, chunk.end);
        let Some(rows) = report.collected(context, fetched) else {
          continue;
        };

        info!(
          account = %account.external_id,
          since = %chunk.start,
          until = %chunk.end,
          rows = rows.len(),
          "insights fetched"
        );
        report.total_rows += rows.len();
        report.chunks.push(ChunkReport {
          account:  account.external_id.clone(),
          since:    chunk.start,
          until:    chunk.end,
          entities: targets.mapping.len(),
          rows:     rows.len(),
        });
        if req.dry_run {
          continue;
        }

        let batch_size = self.batch_size();
        let label = account.external_id.as_str();
        match &targets.mapping {
          Mapping::Campaign(map) => {
            let rows = campaign_rows(rows, map, &mut report);
            upsert_in_batches(rows, batch_size, label, &mut report, |b| self.store.upsert_campaign_insights(b)).await;
          }
          Mapping::AdSet(map) => {
            let rows = ad_set_rows(rows, map, &mut report);
            upsert_in_batches(rows, batch_size, label, &mut report, |b| self.store.upsert_ad_set_insights(b)).await;
          }
          Mapping::Ad(map) => {
            let rows = ad_rows(rows, map, &mut report);
            upsert_in_batches(rows, batch_size, label, &mut report, |b| self.store.upsert_ad_insights(b)).await;
          }
        }
      }
    }

    info!(
      %level,
      accounts = report.accounts_processed,
      skipped = report.accounts_skipped,
      rows = report.total_rows,
      upserts = report.total_upserts,
      unmapped = report.unmapped_rows,
      errors = report.errors.len(),
      "insight sync finished"
    );
    Ok(report)
  }

  /// Campaign ids always narrow the request; ad set and ad ids only when the
  /// caller selected some.
  async fn insight_targets(&self, account: &AdAccount, req: &SyncRequest, level: InsightLevel) -> Result<Targets> {
    let campaigns: HashMap<String, Uuid> = self
      .store
      .campaign_map(account.ad_account_id)
      .await
      .map_err(Error::store)?
      .into_iter()
      .filter(|(ext, id)| req.wants_campaign(*id, ext))
      .collect();
    let campaign_ids = sorted_keys(&campaigns);
    let selected: HashSet<Uuid> = campaigns.values().copied().collect();

    let targets = match level {
      InsightLevel::Campaign => Targets {
        mapping: Mapping::Campaign(campaigns),
        campaign_ids,
        ad_set_ids: Vec::new(),
        ad_ids: Vec::new(),
      },
      InsightLevel::AdSet => {
        let sets: HashMap<String, AdSetRef> = self
          .store
          .ad_set_map(account.ad_account_id)
          .await
          .map_err(Error::store)?
          .into_iter()
          .filter(|(_, r)| selected.contains(&r.campaign_id) && req.wants_ad_set(r.ad_set_id))
          .collect();
        let ad_set_ids = if req.ad_set_ids.is_empty() { Vec::new() } else { sorted_keys(&sets) };
        Targets { mapping: Mapping::AdSet(sets), campaign_ids, ad_set_ids, ad_ids: Vec::new() }
      }
      InsightLevel::Ad => {
        let ads: HashMap<String, AdRef> = self
          .store
          .ad_map(account.ad_account_id)
          .await
          .map_err(Error::store)?
          .into_iter()
          .filter(|(_, r)| {
            selected.contains(&r.campaign_id) && req.wants_ad_set(r.ad_set_id) && req.wants_ad(r.ad_id)
          })
          .collect();
        // Narrowing by ad set is expressed as the ads inside those sets.
        let narrowed = !req.ad_set_ids.is_empty() || !req.ad_ids.is_empty();
        let ad_ids = if narrowed { sorted_keys(&ads) } else { Vec::new() };
        Targets { mapping: Mapping::Ad(ads), campaign_ids, ad_set_ids: Vec::new(), ad_ids }
      }
    };
    Ok(targets)
  }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

/// The local parent and date of a row. Rows with no mapping, or whose date
/// does not parse, are counted as unmapped and dropped.
fn locate<V: Copy>(
  map: &HashMap<String, V>,
  id: Option<&str>,
  row: &InsightRow,
  report: &mut SyncReport,
) -> Option<(V, NaiveDate)> {
  match (id.and_then(|id| map.get(id)).copied(), row.date()) {
    (Some(found), Ok(date)) => Some((found, date)),
    _ => {
      debug!(id = ?id, date = %row.date_start, "insight row without local mapping");
      report.unmapped_rows += 1;
      None
    }
  }
}

fn campaign_rows(rows: Vec<InsightRow>, map: &HashMap<String, Uuid>, report: &mut SyncReport) -> Vec<CampaignDailyInsight> {
  rows
    .into_iter()
    .filter_map(|r| {
      let (campaign_id, date) = locate(map, r.campaign_id.as_deref(), &r, report)?;
      Some(CampaignDailyInsight { campaign_id, date, metrics: r.metrics(), actions: r.actions_json() })
    })
    .collect()
}

fn ad_set_rows(rows: Vec<InsightRow>, map: &HashMap<String, AdSetRef>, report: &mut SyncReport) -> Vec<AdSetDailyInsight> {
  rows
    .into_iter()
    .filter_map(|r| {
      let (parent, date) = locate(map, r.adset_id.as_deref(), &r, report)?;
      Some(AdSetDailyInsight {
        ad_set_id: parent.ad_set_id,
        campaign_id: parent.campaign_id,
        date,
        metrics: r.metrics(),
        actions: r.actions_json(),
      })
    })
    .collect()
}

fn ad_rows(rows: Vec<InsightRow>, map: &HashMap<String, AdRef>, report: &mut SyncReport) -> Vec<AdDailyInsight> {
  rows
    .into_iter()
    .filter_map(|r| {
      let (parent, date) = locate(map, r.ad_id.as_deref(), &r, report)?;
      let metrics = r.metrics();
      Some(AdDailyInsight {
        ad_id: parent.ad_id,
        ad_set_id: parent.ad_set_id,
        campaign_id: parent.campaign_id,
        date,
        derived: metrics.derived(),
        metrics,
        actions: r.actions_json(),
        video_views: r.video_views(),
        video_avg_time_watched: r.video_avg_time_watched(),
        quality_ranking: r.quality_ranking.clone(),
        engagement_ranking: r.engagement_rate_ranking.clone(),
        conversion_ranking: r.conversion_rate_ranking.clone(),
      })
    })
    .collect()
}
