//! `/sync/{kind}` endpoints and the one-shot `insightfy sync` command.
//!
//! | Method | Path                       | Engine operation         |
//! |--------|----------------------------|--------------------------|
//! | POST   | `/sync/campaigns`          | `sync_campaigns`         |
//! | POST   | `/sync/ad-sets`            | `sync_ad_sets`           |
//! | POST   | `/sync/ads`                | `sync_ads`               |
//! | POST   | `/sync/campaign-insights`  | `sync_campaign_insights` |
//! | POST   | `/sync/ad-set-insights`    | `sync_ad_set_insights`   |
//! | POST   | `/sync/ad-insights`        | `sync_ad_insights`       |
//! | POST   | `/sync/leads`              | `fetch_leads`            |
//!
//! The body is a JSON `SyncRequest` (or `LeadFetchRequest` for leads); an
//! empty body runs with defaults. Graph failures, rate limits included, do
//! not fail the request: they are listed in the report's `errors` and a
//! rate limit sets `rate_limited`.

use axum::{
  Json,
  extract::{Path, State},
  response::IntoResponse,
};
use bytes::Bytes;
use chrono::NaiveDate;
use insightfy_core::store::{AdsStore, CrmStore};
use insightfy_meta::GraphApi;
use insightfy_sync::{LeadFetchReport, LeadFetchRequest, SyncEngine, SyncReport, SyncRequest};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{AppState, error::Error};

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
  clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SyncKind {
  Campaigns,
  AdSets,
  Ads,
  CampaignInsights,
  AdSetInsights,
  AdInsights,
  Leads,
}

/// A sync kind together with its parsed request.
#[derive(Debug, Clone)]
pub enum SyncJob {
  Sync(SyncKind, SyncRequest),
  Leads(LeadFetchRequest),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SyncOutcome {
  Sync(SyncReport),
  Leads(LeadFetchReport),
}

impl SyncOutcome {
  pub fn rate_limited(&self) -> bool {
    match self {
      SyncOutcome::Sync(report) => report.rate_limited,
      SyncOutcome::Leads(_) => false,
    }
  }
}

fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, Error> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(T::default());
  }
  serde_json::from_slice(body).map_err(|e| Error::BadRequest(format!("invalid sync request: {e}")))
}

impl SyncJob {
  pub fn from_body(kind: SyncKind, body: &[u8]) -> Result<Self, Error> {
    Ok(match kind {
      SyncKind::Leads => SyncJob::Leads(parse_body(body)?),
      kind => SyncJob::Sync(kind, parse_body(body)?),
    })
  }

  /// The request the CLI builds from its flags.
  pub fn from_cli(
    kind: SyncKind,
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
    accounts: Vec<Uuid>,
    dry_run: bool,
  ) -> Self {
    match kind {
      SyncKind::Leads => SyncJob::Leads(LeadFetchRequest {
        ad_account_ids: accounts,
        since,
        until,
        dry_run,
        ..LeadFetchRequest::default()
      }),
      kind => SyncJob::Sync(kind, SyncRequest {
        since,
        until,
        ad_account_ids: accounts,
        dry_run,
        ..SyncRequest::default()
      }),
    }
  }

  pub async fn run<S, G>(self, engine: &SyncEngine<S, G>) -> Result<SyncOutcome, Error>
  where
    S: AdsStore + CrmStore,
    G: GraphApi,
  {
    let report = match self {
      SyncJob::Leads(req) => return Ok(SyncOutcome::Leads(engine.fetch_leads(req).await?)),
      SyncJob::Sync(SyncKind::Campaigns, req) => engine.sync_campaigns(req).await?,
      SyncJob::Sync(SyncKind::AdSets, req) => engine.sync_ad_sets(req).await?,
      SyncJob::Sync(SyncKind::Ads, req) => engine.sync_ads(req).await?,
      SyncJob::Sync(SyncKind::CampaignInsights, req) => engine.sync_campaign_insights(req).await?,
      SyncJob::Sync(SyncKind::AdSetInsights, req) => engine.sync_ad_set_insights(req).await?,
      SyncJob::Sync(SyncKind::AdInsights, req) => engine.sync_ad_insights(req).await?,
      SyncJob::Sync(SyncKind::Leads, req) => {
        let req = LeadFetchRequest {
          ad_account_ids: req.ad_account_ids,
          since: req.since,
          until: req.until,
          dry_run: req.dry_run,
          ..LeadFetchRequest::default()
        };
        return Ok(SyncOutcome::Leads(engine.fetch_leads(req).await?));
      }
    };
    Ok(SyncOutcome::Sync(report))
  }
}

pub async fn handler<S, G>(
  State(state): State<AppState<S, G>>,
  Path(kind): Path<String>,
  body: Bytes,
) -> Result<impl IntoResponse, Error>
where
  S: AdsStore + CrmStore + 'static,
  G: GraphApi + 'static,
{
  let kind: SyncKind = kind.parse().map_err(|_| Error::NotFound(format!("sync kind {kind}")))?;
  let job = SyncJob::from_body(kind, &body)?;

  tracing::info!(%kind, "sync requested");
  let outcome = job.run(&state.engine).await?;
  if outcome.rate_limited() {
    tracing::warn!(%kind, "sync finished with rate-limited requests");
  }
  Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kinds_use_kebab_case() {
    assert_eq!("ad-set-insights".parse::<SyncKind>().unwrap(), SyncKind::AdSetInsights);
    assert_eq!(SyncKind::CampaignInsights.to_string(), "campaign-insights");
    assert!("adsets".parse::<SyncKind>().is_err());
  }

  #[test]
  fn empty_body_means_defaults() {
    let SyncJob::Leads(req) = SyncJob::from_body(SyncKind::Leads, b"").unwrap() else {
      panic!("expected a lead fetch");
    };
    assert_eq!(req.limit, insightfy_sync::request::DEFAULT_LEAD_LIMIT);

    let SyncJob::Sync(kind, req) = SyncJob::from_body(SyncKind::Ads, b" {\"dry_run\": true} ").unwrap() else {
      panic!("expected a hierarchy sync");
    };
    assert_eq!(kind, SyncKind::Ads);
    assert!(req.dry_run);

    assert!(matches!(
      SyncJob::from_body(SyncKind::Campaigns, b"{"),
      Err(Error::BadRequest(_))
    ));
  }
}
