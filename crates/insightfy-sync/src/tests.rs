//! Engine tests: a scripted `GraphApi` over an in-memory SQLite store.

use std::{collections::HashMap, sync::Mutex};

use chrono::NaiveDate;
use insightfy_core::{
  insight::InsightLevel,
  lead::LeadQuery,
  metrics::MetricsQuery,
  org::{AdAccount, NewAdAccount, Organization},
  store::{AdsStore, CrmStore, InsightScope},
};
use insightfy_meta::{
  Collected, GraphApi, InsightRequest, LeadRequest,
  types::{AccountNode, AdNode, AdSetNode, CampaignNode, InsightRow, LeadNode},
};
use insightfy_store_sqlite::SqliteStore;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{Error, LeadFetchRequest, LeadgenNotification, LeadgenOutcome, SyncConfig, SyncEngine, SyncRequest};

// ─── Fake Graph API ──────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeGraph {
  campaigns:    Vec<Value>,
  ad_sets:      HashMap<String, Vec<Value>>,
  insights:     Vec<Value>,
  leads:        Vec<Value>,
  /// Calls answered with a 429, keyed like `insights 2024-03-01` or
  /// `ad_sets 900`.
  rate_limited: Vec<String>,
  /// Insight calls return their first row, then fail on the next page.
  cut_short:    bool,
  calls:        Mutex<Vec<String>>,
}

fn decode<T: DeserializeOwned>(values: &[Value]) -> Vec<T> {
  values
    .iter()
    .map(|v| serde_json::from_value(v.clone()).expect("fixture node"))
    .collect()
}

fn api_error(status: StatusCode, code: Option<i64>) -> insightfy_meta::Error {
  insightfy_meta::Error::Api { status, code, url: "https://graph.test".into(), body: String::new() }
}

impl FakeGraph {
  fn record(&self, call: String) { self.calls.lock().unwrap().push(call); }

  fn calls(&self) -> Vec<String> { self.calls.lock().unwrap().clone() }

  fn calls_to(&self, prefix: &str) -> usize { self.calls().iter().filter(|c| c.starts_with(prefix)).count() }

  fn limit(&self, key: String) -> insightfy_meta::Result<()> {
    if self.rate_limited.contains(&key) {
      return Err(api_error(StatusCode::TOO_MANY_REQUESTS, Some(17)));
    }
    Ok(())
  }
}

impl GraphApi for FakeGraph {
  async fn account<'a>(&'a self, token: &'a str, account: &'a str) -> insightfy_meta::Result<AccountNode> {
    self.record(format!("account {account} {token}"));
    Ok(AccountNode { id: account.to_owned(), name: None })
  }

  async fn campaigns<'a>(
    &'a self,
    token: &'a str,
    account: &'a str,
  ) -> insightfy_meta::Result<Collected<CampaignNode>> {
    self.record(format!("campaigns {account} {token}"));
    self.limit(format!("campaigns {account}"))?;
    Ok(Collected::complete(decode(&self.campaigns)))
  }

  async fn ad_sets<'a>(&'a self, token: &'a str, campaign: &'a str) -> insightfy_meta::Result<Collected<AdSetNode>> {
    self.record(format!("ad_sets {campaign} {token}"));
    self.limit(format!("ad_sets {campaign}"))?;
    Ok(Collected::complete(self.ad_sets.get(campaign).map(|v| decode(v)).unwrap_or_default()))
  }

  async fn ads<'a>(&'a self, token: &'a str, ad_set: &'a str) -> insightfy_meta::Result<Collected<AdNode>> {
    self.record(format!("ads {ad_set} {token}"));
    self.limit(format!("ads {ad_set}"))?;
    Ok(Collected::complete(Vec::new()))
  }

  async fn insights<'a>(
    &'a self,
    _token: &'a str,
    request: &'a InsightRequest,
  ) -> insightfy_meta::Result<Collected<InsightRow>> {
    self.record(format!(
      "insights {} {}..{} [{}]",
      request.account,
      request.chunk.start,
      request.chunk.end,
      request.campaign_ids.join(",")
    ));
    self.limit(format!("insights {}", request.chunk.start))?;
    let rows: Vec<InsightRow> = decode::<InsightRow>(&self.insights)
      .into_iter()
      .filter(|r| {
        let date = r.date().expect("fixture date");
        date >= request.chunk.start && date <= request.chunk.end
      })
      .collect();
    if self.cut_short {
      let first = rows.into_iter().take(1).collect();
      return Ok(Collected::partial(first, api_error(StatusCode::BAD_REQUEST, Some(100))));
    }
    Ok(Collected::complete(rows))
  }

  async fn leads<'a>(&'a self, _token: &'a str, request: &'a LeadRequest) -> insightfy_meta::Result<Vec<LeadNode>> {
    self.record(format!("leads {}", request.account));
    Ok(decode::<LeadNode>(&self.leads).into_iter().take(request.limit).collect())
  }

  async fn lead<'a>(&'a self, token: &'a str, leadgen_id: &'a str) -> insightfy_meta::Result<LeadNode> {
    self.record(format!("lead {leadgen_id} {token}"));
    decode::<LeadNode>(&self.leads)
      .into_iter()
      .find(|l| l.id == leadgen_id)
      .ok_or_else(|| api_error(StatusCode::NOT_FOUND, Some(100)))
  }
}

fn graph() -> FakeGraph {
  let insight = |campaign: &str, ad_set: &str, date: &str, spend: &str| {
    json!({
      "campaign_id": campaign,
      "adset_id": ad_set,
      "date_start": date,
      "date_stop": date,
      "spend": spend,
      "impressions": "1000",
      "clicks": "20",
      "actions": [{ "action_type": "lead", "value": "2" }],
    })
  };
  FakeGraph {
    campaigns: vec![
      json!({ "id": "900", "name": "Leads BR", "status": "ACTIVE", "daily_budget": "5000" }),
      json!({ "id": "901", "name": "Remarketing", "status": "PAUSED" }),
    ],
    ad_sets: HashMap::from([(
      "900".to_owned(),
      vec![json!({ "id": "71", "name": "BR 25-34", "campaign_id": "900", "daily_budget": "2000" })],
    )]),
    insights: vec![
      insight("900", "71", "2024-03-01", "10.00"),
      insight("900", "71", "2024-03-02", "12.50"),
      insight("999", "79", "2024-03-01", "99.00"),
      insight("900", "71", "2024-03-06", "7.50"),
    ],
    leads: vec![
      json!({
        "id": "lg1",
        "campaign_id": "900",
        "ad_name": "Video 1",
        "field_data": [
          { "name": "full_name", "values": ["Ana Souza"] },
          { "name": "email", "values": ["ana@acme.test"] },
        ],
      }),
      json!({ "id": "lg2", "field_data": [{ "name": "phone_number", "values": ["+55 11 90000-0000"] }] }),
    ],
    ..FakeGraph::default()
  }
}

// ─── Fixture ─────────────────────────────────────────────────────────────────

struct Fixture {
  engine:  SyncEngine<SqliteStore, FakeGraph>,
  org:     Organization,
  account: AdAccount,
}

/// One organization with one ad account. When `connected`, the account was
/// connected by a user holding a usable token.
async fn fixture(graph: FakeGraph, fallback: Option<&str>, connected: bool) -> Fixture {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  let org = store.create_organization("Acme".into(), "acme".into()).await.unwrap();

  let connected_by = if connected {
    let user = Uuid::new_v4();
    store.add_meta_connection(user, "user-token".into(), None).await.unwrap();
    Some(user)
  } else {
    None
  };
  let account = store
    .add_ad_account(NewAdAccount {
      organization_id: org.organization_id,
      external_id: "act_1".into(),
      business_name: Some("Acme Ads".into()),
      connected_by,
    })
    .await
    .unwrap();

  let config = SyncConfig { fallback_token: fallback.map(str::to_owned), batch_size: 2 };
  Fixture { engine: SyncEngine::new(store, graph, config), org, account }
}

fn d(s: &str) -> NaiveDate { insightfy_core::dates::parse_iso_date(s).unwrap() }

fn march(max_days: u32) -> SyncRequest {
  SyncRequest {
    since: Some(d("2024-03-01")),
    until: Some(d("2024-03-10")),
    max_days_per_chunk: Some(max_days),
    ..SyncRequest::default()
  }
}

// ─── Hierarchy ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn campaigns_use_the_connecting_users_token() {
  let f = fixture(graph(), Some("app-token"), true).await;

  let report = f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();
  assert_eq!(report.accounts_processed, 1);
  assert_eq!(report.total_rows, 2);
  assert_eq!(report.total_upserts, 2);
  assert!(report.is_clean());
  assert!(f.engine.graph().calls().contains(&"campaigns act_1 user-token".to_owned()));

  // A second run updates in place.
  f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();
  let campaigns = f.engine.store().campaigns(f.account.ad_account_id).await.unwrap();
  assert_eq!(campaigns.len(), 2);
}

#[tokio::test]
async fn accounts_without_a_token_are_skipped() {
  let f = fixture(graph(), None, false).await;

  let report = f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();
  assert_eq!(report.accounts_processed, 0);
  assert_eq!(report.accounts_skipped, 1);
  assert!(report.notes[0].contains("no valid token"));
  assert!(f.engine.graph().calls().is_empty());
}

#[tokio::test]
async fn ad_sets_follow_their_campaigns() {
  let f = fixture(graph(), Some("app-token"), false).await;
  f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();

  let report = f.engine.sync_ad_sets(SyncRequest::default()).await.unwrap();
  assert_eq!(report.total_rows, 1);
  assert_eq!(report.total_upserts, 1);
  assert_eq!(f.engine.graph().calls_to("ad_sets"), 2);

  let sets = f.engine.store().ad_set_map(f.account.ad_account_id).await.unwrap();
  let campaigns = f.engine.store().campaign_map(f.account.ad_account_id).await.unwrap();
  assert_eq!(sets["71"].campaign_id, campaigns["900"]);
}

// ─── Insights ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn campaign_insights_are_chunked_and_mapped() {
  let f = fixture(graph(), Some("app-token"), false).await;
  f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();

  let report = f.engine.sync_campaign_insights(march(5)).await.unwrap();
  assert_eq!(report.since, Some(d("2024-03-01")));
  assert_eq!(report.chunks.len(), 2);
  assert_eq!(report.chunks[0].rows, 3);
  assert_eq!(report.chunks[1].rows, 1);
  assert_eq!(report.total_rows, 4);
  assert_eq!(report.unmapped_rows, 1);
  assert_eq!(report.total_upserts, 3);
  assert!(report.is_clean());

  let calls = f.engine.graph().calls();
  assert!(calls.contains(&"account act_1 app-token".to_owned()));
  assert!(calls.contains(&"insights act_1 2024-03-01..2024-03-05 [900,901]".to_owned()));

  let (totals, days) = f
    .engine
    .store()
    .insight_totals(InsightScope {
      organization_id: f.org.organization_id,
      since:           d("2024-03-01"),
      until:           d("2024-03-10"),
      ad_account_id:   Some(f.account.ad_account_id),
      campaign_id:     None,
    })
    .await
    .unwrap();
  assert_eq!(days, 3);
  assert_eq!(totals.spend, 30.0);
  assert_eq!(totals.leads_count, 6);
}

#[tokio::test]
async fn dry_run_counts_without_writing() {
  let f = fixture(graph(), Some("app-token"), false).await;
  f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();

  let req = SyncRequest { dry_run: true, ..march(30) };
  let report = f.engine.sync_campaign_insights(req).await.unwrap();
  assert!(report.dry_run);
  assert_eq!(report.total_rows, 4);
  assert_eq!(report.total_upserts, 0);

  let series = f
    .engine
    .store()
    .daily_series(f.org.organization_id, d("2024-03-01"), d("2024-03-10"))
    .await
    .unwrap();
  assert!(series.is_empty());
}

#[tokio::test]
async fn rate_limited_chunk_does_not_stop_the_run() {
  let graph = FakeGraph { rate_limited: vec!["insights 2024-03-01".into()], ..graph() };
  let f = fixture(graph, Some("app-token"), false).await;
  f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();

  let report = f.engine.sync_campaign_insights(march(5)).await.unwrap();
  assert!(report.rate_limited);
  assert!(!report.is_clean());
  assert_eq!(report.errors.len(), 1);
  assert!(report.errors[0].contains("2024-03-01 to 2024-03-05"));

  // The second chunk is still fetched and written.
  assert_eq!(f.engine.graph().calls_to("insights"), 2);
  assert_eq!(report.chunks.len(), 1);
  assert_eq!(report.chunks[0].since, d("2024-03-06"));
  assert_eq!(report.total_upserts, 1);

  let (totals, days) = f
    .engine
    .store()
    .insight_totals(InsightScope {
      organization_id: f.org.organization_id,
      since:           d("2024-03-01"),
      until:           d("2024-03-10"),
      ad_account_id:   None,
      campaign_id:     None,
    })
    .await
    .unwrap();
  assert_eq!(days, 1);
  assert_eq!(totals.spend, 7.5);
}

#[tokio::test]
async fn rows_before_a_failed_page_are_kept() {
  let f = fixture(FakeGraph { cut_short: true, ..graph() }, Some("app-token"), false).await;
  f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();

  let report = f.engine.sync_campaign_insights(march(30)).await.unwrap();
  assert!(!report.rate_limited);
  assert_eq!(report.errors.len(), 1);
  assert!(report.errors[0].contains("kept 1 rows"));
  assert_eq!(report.chunks.len(), 1);
  assert_eq!(report.chunks[0].rows, 1);
  assert_eq!(report.total_upserts, 1);

  let series = f
    .engine
    .store()
    .daily_series(f.org.organization_id, d("2024-03-01"), d("2024-03-10"))
    .await
    .unwrap();
  assert_eq!(series.len(), 1);
}

#[tokio::test]
async fn rate_limited_campaign_still_writes_sibling_ad_sets() {
  let mut graph = graph();
  graph.ad_sets.insert(
    "901".to_owned(),
    vec![json!({ "id": "72", "name": "Remarketing 30d", "campaign_id": "901" })],
  );
  graph.rate_limited = vec!["ad_sets 900".into()];
  let f = fixture(graph, Some("app-token"), false).await;
  f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();

  let report = f.engine.sync_ad_sets(SyncRequest::default()).await.unwrap();
  assert!(report.rate_limited);
  assert_eq!(report.errors.len(), 1);
  assert_eq!(f.engine.graph().calls_to("ad_sets"), 2);
  assert_eq!(report.total_upserts, 1);

  let sets = f.engine.store().ad_set_map(f.account.ad_account_id).await.unwrap();
  assert!(sets.contains_key("72"));
  assert!(!sets.contains_key("71"));
}

#[tokio::test]
async fn ad_set_insights_attach_to_ad_sets() {
  let f = fixture(graph(), Some("app-token"), false).await;
  f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();
  f.engine.sync_ad_sets(SyncRequest::default()).await.unwrap();

  let report = f.engine.sync_ad_set_insights(march(30)).await.unwrap();
  assert_eq!(report.total_rows, 4);
  assert_eq!(report.unmapped_rows, 1);
  assert_eq!(report.total_upserts, 3);

  let rows = f
    .engine
    .store()
    .metrics(f.org.organization_id, MetricsQuery {
      since:          d("2024-03-01"),
      until:          d("2024-03-10"),
      ad_account_ids: vec![f.account.ad_account_id],
      campaign_ids:   vec![],
      ad_set_ids:     vec![],
      ad_ids:         vec![],
      level:          InsightLevel::AdSet,
    })
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].name, "BR 25-34");
  assert_eq!(rows[0].spend, 30.0);
}

#[tokio::test]
async fn accounts_without_campaigns_are_noted() {
  let f = fixture(graph(), Some("app-token"), false).await;

  let report = f.engine.sync_campaign_insights(march(30)).await.unwrap();
  assert_eq!(report.accounts_processed, 0);
  assert!(report.notes.iter().any(|n| n.contains("no campaign rows")));
  assert_eq!(f.engine.graph().calls_to("insights"), 0);
}

// ─── Leads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetched_leads_are_created_once() {
  let f = fixture(graph(), Some("app-token"), false).await;
  f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();

  let first = f.engine.fetch_leads(LeadFetchRequest::default()).await.unwrap();
  assert_eq!(first.total_fetched, 2);
  assert_eq!(first.new_leads, 2);
  assert_eq!(first.leads_by_account["Acme Ads"], 2);
  assert!(first.errors.is_empty());

  let second = f.engine.fetch_leads(LeadFetchRequest::default()).await.unwrap();
  assert_eq!(second.new_leads, 0);
  assert_eq!(second.duplicate_leads, 2);

  let campaign_id = f.engine.store().campaign_map(f.account.ad_account_id).await.unwrap()["900"];
  let attributed = f
    .engine
    .store()
    .list_leads(f.org.organization_id, LeadQuery { campaign_id: Some(campaign_id), ..LeadQuery::default() })
    .await
    .unwrap();
  assert_eq!(attributed.len(), 1);
  assert_eq!(attributed[0].email.as_deref(), Some("ana@acme.test"));
  assert_eq!(attributed[0].lead_source_detail.as_deref(), Some("Video 1"));
}

#[tokio::test]
async fn dry_run_lead_fetch_creates_nothing() {
  let f = fixture(graph(), Some("app-token"), false).await;

  let req = LeadFetchRequest { dry_run: true, ..LeadFetchRequest::default() };
  let report = f.engine.fetch_leads(req).await.unwrap();
  assert_eq!(report.total_fetched, 2);
  assert_eq!(report.new_leads, 0);
  let leads = f.engine.store().list_leads(f.org.organization_id, LeadQuery::default()).await.unwrap();
  assert!(leads.is_empty());
}

#[tokio::test]
async fn webhook_leads_land_in_the_campaigns_organization() {
  let f = fixture(graph(), Some("app-token"), false).await;
  f.engine.sync_campaigns(SyncRequest::default()).await.unwrap();

  let notification: LeadgenNotification = serde_json::from_value(json!({
    "object": "page",
    "entry": [{
      "id": "p1",
      "changes": [
        { "field": "leadgen", "value": { "leadgen_id": "lg1" } },
        { "field": "leadgen", "value": { "leadgen_id": "lg2" } },
        { "field": "leadgen", "value": { "leadgen_id": "missing" } },
        { "field": "leadgen", "value": { "leadgen_id": "lg1" } },
      ],
    }],
  }))
  .unwrap();

  let outcomes = f.engine.ingest_notification(&notification).await;
  assert_eq!(outcomes.len(), 4);
  match &outcomes[0] {
    LeadgenOutcome::Created { organization_id, .. } => assert_eq!(*organization_id, f.org.organization_id),
    other => panic!("expected a created lead, got {other:?}"),
  }
  assert!(matches!(&outcomes[1], LeadgenOutcome::Skipped { .. }));
  assert!(matches!(&outcomes[2], LeadgenOutcome::Failed { .. }));
  assert!(matches!(&outcomes[3], LeadgenOutcome::Duplicate { .. }));
  assert!(f.engine.graph().calls().contains(&"lead lg1 app-token".to_owned()));
}

#[tokio::test]
async fn webhook_ingest_needs_a_fallback_token() {
  let f = fixture(graph(), None, true).await;
  let err = f.engine.ingest_leadgen("lg1").await;
  assert!(matches!(err, Err(Error::NoToken)));
}
