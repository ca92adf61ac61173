//! Lead-ads submissions into the CRM.

use std::collections::HashMap;

use chrono::Utc;
use insightfy_core::{
  org::AdAccount,
  store::{AccountFilter, AdsStore, CrmStore},
};
use insightfy_meta::{GraphApi, LeadRequest, types::LeadNode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  engine::SyncEngine,
  error::{Error, Result},
  report::{LeadFetchReport, LeadgenOutcome},
  request::{LeadFetchRequest, LeadgenNotification},
};

impl<S, G> SyncEngine<S, G>
where
  S: AdsStore + CrmStore,
  G: GraphApi,
{
  /// Pull recent submissions for each active account and create a CRM lead
  /// for every one not seen before.
  pub async fn fetch_leads(&self, req: LeadFetchRequest) -> Result<LeadFetchReport> {
    let window = req.window(Utc::now().date_naive())?;
    let mut report = LeadFetchReport {
      since: Some(window.since),
      until: Some(window.until),
      dry_run: req.dry_run,
      ..LeadFetchReport::default()
    };
    let mut tokens = self.tokens();

    let accounts = self
      .store
      .ad_accounts(AccountFilter {
        ad_account_ids: req.ad_account_ids.clone(),
        active_only: true,
        ..AccountFilter::default()
      })
      .await
      .map_err(Error::store)?;
    info!(accounts = accounts.len(), since = %window.since, until = %window.until, "lead fetch started");

    for account in accounts {
      let Some(token) = tokens.resolve(&self.store, &account).await? else {
        report.error(format!("no access token for account {}", account.label()));
        continue;
      };
      let request = LeadRequest {
        account: account.graph_node(),
        since:   window.since,
        until:   window.until,
        limit:   req.limit,
      };
      let leads = match self.graph.leads(&token, &request).await {
        Ok(leads) => leads,
        Err(e) => {
          report.error(format!("fetching leads for account {}: {e}", account.label()));
          continue;
        }
      };

      report.accounts_processed += 1;
      report.total_fetched += leads.len();
      report.leads_by_account.insert(account.label().to_owned(), leads.len());
      if req.dry_run || leads.is_empty() {
        continue;
      }
      if let Err(e) = self.store_leads(&account, leads, &mut report).await {
        report.error(format!("storing leads for account {}: {e}", account.label()));
      }
    }

    info!(
      fetched = report.total_fetched,
      new = report.new_leads,
      duplicates = report.duplicate_leads,
      errors = report.errors.len(),
      "lead fetch finished"
    );
    Ok(report)
  }

  async fn store_leads(&self, account: &AdAccount, leads: Vec<LeadNode>, report: &mut LeadFetchReport) -> Result<()> {
    let campaigns: HashMap<String, Uuid> = self
      .store
      .campaign_map(account.ad_account_id)
      .await
      .map_err(Error::store)?;
    let known = self
      .store
      .existing_external_leads(account.organization_id, leads.iter().map(|l| l.id.clone()).collect())
      .await
      .map_err(Error::store)?;

    for lead in leads {
      if known.contains(&lead.id) {
        report.duplicate_leads += 1;
        continue;
      }
      let campaign_id = lead.campaign_id.as_deref().and_then(|c| campaigns.get(c)).copied();
      match self
        .store
        .create_lead_if_new(account.organization_id, lead.to_new_lead(campaign_id))
        .await
      {
        Ok(Some(created)) => {
          debug!(leadgen_id = %lead.id, lead_id = %created.lead_id, "lead created");
          report.new_leads += 1;
        }
        Ok(None) => report.duplicate_leads += 1,
        Err(e) => report.error(format!("inserting lead {}: {e}", lead.id)),
      }
    }
    Ok(())
  }

  /// Webhook path for one leadgen id: fetch the submission with the fallback
  /// token, find the organization through the campaign it came from, and
  /// create the lead.
  pub async fn ingest_leadgen(&self, leadgen_id: &str) -> Result<LeadgenOutcome> {
    let token = self.config.fallback_token.as_deref().ok_or(Error::NoToken)?;
    let lead = self.graph.lead(token, leadgen_id).await?;
    let skipped = |reason: String| {
      info!(%leadgen_id, %reason, "leadgen skipped");
      LeadgenOutcome::Skipped { leadgen_id: leadgen_id.to_owned(), reason }
    };

    let Some(external_campaign) = lead.campaign_id.clone() else {
      return Ok(skipped("submission carries no campaign".into()));
    };
    let Some(campaign) = self
      .store
      .find_campaign(external_campaign.clone())
      .await
      .map_err(Error::store)?
    else {
      return Ok(skipped(format!("unknown campaign {external_campaign}")));
    };
    let Some(account) = self
      .store
      .get_ad_account(campaign.ad_account_id)
      .await
      .map_err(Error::store)?
    else {
      return Ok(skipped(format!("campaign {external_campaign} has no ad account")));
    };

    let created = self
      .store
      .create_lead_if_new(account.organization_id, lead.to_new_lead(Some(campaign.campaign_id)))
      .await
      .map_err(Error::store)?;
    Ok(match created {
      Some(created) => {
        info!(%leadgen_id, lead_id = %created.lead_id, organization_id = %account.organization_id, "leadgen ingested");
        LeadgenOutcome::Created {
          leadgen_id:      leadgen_id.to_owned(),
          lead_id:         created.lead_id,
          organization_id: account.organization_id,
        }
      }
      None => LeadgenOutcome::Duplicate { leadgen_id: leadgen_id.to_owned() },
    })
  }

  /// Every `leadgen` change in a webhook delivery. Failures are reported per
  /// id; one bad submission does not stop the rest.
  pub async fn ingest_notification(&self, notification: &LeadgenNotification) -> Vec<LeadgenOutcome> {
    let mut outcomes = Vec::new();
    for leadgen_id in notification.leadgen_ids() {
      let outcome = match self.ingest_leadgen(&leadgen_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
          warn!(%leadgen_id, error = %e, "leadgen ingest failed");
          LeadgenOutcome::Failed { leadgen_id, error: e.to_string() }
        }
      };
      outcomes.push(outcome);
    }
    outcomes
  }
}
