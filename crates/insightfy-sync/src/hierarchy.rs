//! Campaign, ad set and ad mirroring.

use insightfy_core::{
  ads::{AdSetRef, AdSetUpsert, AdUpsert, CampaignUpsert},
  store::{AdsStore, CrmStore},
};
use insightfy_meta::GraphApi;
use tracing::info;

use crate::{
  engine::{SyncEngine, upsert_in_batches},
  error::Result,
  report::SyncReport,
  request::SyncRequest,
};

impl<S, G> SyncEngine<S, G>
where
  S: AdsStore + CrmStore,
  G: GraphApi,
{
  /// Mirror every campaign of the selected accounts.
  pub async fn sync_campaigns(&self, req: SyncRequest) -> Result<SyncReport> {
    let mut report = SyncReport::new(req.dry_run);
    let mut tokens = self.tokens();

    for account in self.accounts(&req.ad_account_ids).await? {
      let Some(token) = self.token_for(&mut tokens, &account, &mut report).await? else {
        continue;
      };
      let node = account.graph_node();
      let fetched = self.graph.campaigns(&token, &node).await;
      let Some(campaigns) = report.collected(|| format!("campaigns for account {}", account.external_id), fetched)
      else {
        continue;
      };

      report.accounts_processed += 1;
      report.total_rows += campaigns.len();
      if req.dry_run {
        continue;
      }
      let rows: Vec<CampaignUpsert> = campaigns
        .into_iter()
        .map(|c| c.into_upsert(account.ad_account_id))
        .collect();
      upsert_in_batches(rows, self.batch_size(), &account.external_id, &mut report, |batch| {
        self.store.upsert_campaigns(batch)
      })
      .await;
    }

    info!(
      accounts = report.accounts_processed,
      rows = report.total_rows,
      upserts = report.total_upserts,
      "campaign sync finished"
    );
    Ok(report)
  }

  /// Mirror the ad sets of the selected campaigns (all campaigns of the
  /// selected accounts when none are named).
  pub async fn sync_ad_sets(&self, req: SyncRequest) -> Result<SyncReport> {
    let mut report = SyncReport::new(req.dry_run);
    let mut tokens = self.tokens();

    for account in self.accounts(&req.ad_account_ids).await? {
      let campaigns: Vec<_> = match self.store.campaigns(account.ad_account_id).await {
        Ok(campaigns) => campaigns
          .into_iter()
          .filter(|c| req.wants_campaign(c.campaign_id, &c.external_id))
          .collect(),
        Err(e) => {
          report.error(format!("loading campaigns for account {}: {e}", account.external_id));
          continue;
        }
      };
      if campaigns.is_empty() {
        report.note(format!("no campaigns for account {}", account.external_id));
        continue;
      }
      let Some(token) = self.token_for(&mut tokens, &account, &mut report).await? else {
        continue;
      };

      report.accounts_processed += 1;
      let mut rows: Vec<AdSetUpsert> = Vec::new();
      for campaign in &campaigns {
        let fetched = self.graph.ad_sets(&token, &campaign.external_id).await;
        if let Some(sets) = report.collected(|| format!("ad sets for campaign {}", campaign.external_id), fetched) {
          report.total_rows += sets.len();
          rows.extend(sets.into_iter().map(|s| s.into_upsert(campaign.campaign_id)));
        }
      }

      if !req.dry_run {
        upsert_in_batches(rows, self.batch_size(), &account.external_id, &mut report, |batch| {
          self.store.upsert_ad_sets(batch)
        })
        .await;
      }
    }

    info!(
      accounts = report.accounts_processed,
      rows = report.total_rows,
      upserts = report.total_upserts,
      "ad set sync finished"
    );
    Ok(report)
  }

  /// Mirror the ads, with their creative summaries, of the selected ad sets.
  pub async fn sync_ads(&self, req: SyncRequest) -> Result<SyncReport> {
    let mut report = SyncReport::new(req.dry_run);
    let mut tokens = self.tokens();

    for account in self.accounts(&req.ad_account_ids).await? {
      let loaded = match self.store.campaigns(account.ad_account_id).await {
        Ok(campaigns) => self.store.ad_sets(account.ad_account_id).await.map(|sets| (campaigns, sets)),
        Err(e) => Err(e),
      };
      let (campaigns, ad_sets) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
          report.error(format!("loading ad sets for account {}: {e}", account.external_id));
          continue;
        }
      };
      let ad_sets: Vec<_> = ad_sets
        .into_iter()
        .filter(|s| req.wants_ad_set(s.ad_set_id))
        .filter(|s| {
          campaigns
            .iter()
            .any(|c| c.campaign_id == s.campaign_id && req.wants_campaign(c.campaign_id, &c.external_id))
        })
        .collect();
      if ad_sets.is_empty() {
        report.note(format!("no ad sets for account {}", account.external_id));
        continue;
      }
      let Some(token) = self.token_for(&mut tokens, &account, &mut report).await? else {
        continue;
      };

      report.accounts_processed += 1;
      let mut rows: Vec<AdUpsert> = Vec::new();
      for set in &ad_sets {
        let parent = AdSetRef { ad_set_id: set.ad_set_id, campaign_id: set.campaign_id };
        let fetched = self.graph.ads(&token, &set.external_id).await;
        if let Some(ads) = report.collected(|| format!("ads for ad set {}", set.external_id), fetched) {
          report.total_rows += ads.len();
          rows.extend(ads.into_iter().map(|a| a.into_upsert(parent)));
        }
      }

      if !req.dry_run {
        upsert_in_batches(rows, self.batch_size(), &account.external_id, &mut report, |batch| {
          self.store.upsert_ads(batch)
        })
        .await;
      }
    }

    info!(
      accounts = report.accounts_processed,
      rows = report.total_rows,
      upserts = report.total_upserts,
      "ad sync finished"
    );
    Ok(report)
  }
}
