//! [`AdsStore`] for [`SqliteStore`]: accounts, the campaign hierarchy, daily
//! insights and the reporting aggregates over them.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use insightfy_core::{
  ads::{AdRef, AdSet, AdSetRef, AdSetUpsert, AdUpsert, Campaign, CampaignUpsert},
  insight::{AdDailyInsight, AdSetDailyInsight, CampaignDailyInsight, InsightLevel},
  metrics::{DailyPoint, MetricsQuery, MetricsRow, Totals},
  org::{AdAccount, MetaConnection, NewAdAccount, Provider, strip_act_prefix},
  store::{AccountFilter, AdsStore, InsightScope},
};
use rusqlite::{OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawAdAccount, RawAdSet, RawCampaign, RawConnection, decode_date, decode_uuid, encode_date,
    encode_dt, encode_json, encode_uuid, now,
  },
  filter::Filter,
  store::SqliteStore,
};

/// Joins from a campaign (aliased `c`) up to its account (aliased `a`).
const ACCOUNT_JOIN: &str = "JOIN ad_accounts a ON a.ad_account_id = c.ad_account_id";

impl SqliteStore {
  async fn load_accounts(&self, filter: Filter) -> Result<Vec<AdAccount>> {
    let raws: Vec<RawAdAccount> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM ad_accounts a {} ORDER BY a.created_at",
          RawAdAccount::COLUMNS,
          filter.clause()
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(filter.query(&mut stmt, RawAdAccount::from_row)?)
      })
      .await?;

    raws.into_iter().map(RawAdAccount::into_account).collect()
  }
}

// ─── AdsStore impl ───────────────────────────────────────────────────────────

impl AdsStore for SqliteStore {
  type Error = Error;

  // ── Accounts and connections ──────────────────────────────────────────────

  async fn add_ad_account(&self, input: NewAdAccount) -> Result<AdAccount> {
    let id_str       = encode_uuid(Uuid::new_v4());
    let org_str      = encode_uuid(input.organization_id);
    let external_id  = strip_act_prefix(input.external_id.trim()).to_owned();
    let provider     = Provider::Meta.to_string();
    let by_str       = input.connected_by.map(encode_uuid);
    let at_str       = encode_dt(now());
    let business     = input.business_name;

    let raw: RawAdAccount = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO ad_accounts (
             ad_account_id, organization_id, external_id, provider,
             business_name, is_active, connected_by, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)
           ON CONFLICT (organization_id, external_id) DO UPDATE SET
             business_name = COALESCE(excluded.business_name, ad_accounts.business_name),
             connected_by  = COALESCE(excluded.connected_by, ad_accounts.connected_by)",
          params![id_str, org_str, external_id, provider, business, by_str, at_str],
        )?;
        let sql = format!(
          "SELECT {} FROM ad_accounts a WHERE a.organization_id = ?1 AND a.external_id = ?2",
          RawAdAccount::COLUMNS
        );
        Ok(conn.query_row(&sql, params![org_str, external_id], RawAdAccount::from_row)?)
      })
      .await?;

    raw.into_account()
  }

  async fn get_ad_account(&self, ad_account_id: Uuid) -> Result<Option<AdAccount>> {
    let mut filter = Filter::new();
    filter.eq("a.ad_account_id", encode_uuid(ad_account_id));
    Ok(self.load_accounts(filter).await?.into_iter().next())
  }

  async fn ad_accounts(&self, f: AccountFilter) -> Result<Vec<AdAccount>> {
    let mut filter = Filter::new();
    filter
      .eq_opt("a.organization_id", f.organization_id.map(encode_uuid))
      .any_of("a.ad_account_id", f.ad_account_ids.into_iter().map(encode_uuid))
      .any_of(
        "a.external_id",
        f.external_ids.iter().map(|id| strip_act_prefix(id.trim()).to_owned()),
      );
    if f.active_only {
      filter.raw("a.is_active = 1");
    }
    self.load_accounts(filter).await
  }

  async fn add_meta_connection(
    &self,
    user_id: Uuid,
    access_token: String,
    token_expires_at: Option<DateTime<Utc>>,
  ) -> Result<MetaConnection> {
    let connection = MetaConnection {
      connection_id: Uuid::new_v4(),
      user_id,
      access_token,
      token_expires_at,
      is_active: true,
      connected_at: now(),
    };

    let id_str      = encode_uuid(connection.connection_id);
    let user_str    = encode_uuid(user_id);
    let token       = connection.access_token.clone();
    let expires_str = token_expires_at.map(encode_dt);
    let at_str      = encode_dt(connection.connected_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO meta_connections (
             connection_id, user_id, access_token, token_expires_at, is_active, connected_at
           ) VALUES (?1, ?2, ?3, ?4, 1, ?5)",
          params![id_str, user_str, token, expires_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(connection)
  }

  async fn usable_connection(
    &self,
    user_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Option<MetaConnection>> {
    let user_str = encode_uuid(user_id);

    let raws: Vec<RawConnection> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM meta_connections
           WHERE user_id = ?1 AND is_active = 1
           ORDER BY connected_at DESC, rowid DESC",
          RawConnection::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![user_str], RawConnection::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    for raw in raws {
      let connection = raw.into_connection()?;
      if connection.is_usable(now) {
        return Ok(Some(connection));
      }
    }
    Ok(None)
  }

  // ── Hierarchy ─────────────────────────────────────────────────────────────

  async fn upsert_campaigns(&self, rows: Vec<CampaignUpsert>) -> Result<usize> {
    let at_str = encode_dt(now());

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO ad_campaigns (
               campaign_id, ad_account_id, external_id, name, status, objective,
               daily_budget, start_time, stop_time, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (external_id) DO UPDATE SET
               ad_account_id = excluded.ad_account_id,
               name          = excluded.name,
               status        = excluded.status,
               objective     = excluded.objective,
               daily_budget  = excluded.daily_budget,
               start_time    = excluded.start_time,
               stop_time     = excluded.stop_time,
               updated_at    = excluded.updated_at",
          )?;
          for r in &rows {
            written += stmt.execute(params![
              encode_uuid(Uuid::new_v4()),
              encode_uuid(r.ad_account_id),
              r.external_id,
              r.name,
              r.status,
              r.objective,
              r.daily_budget,
              r.start_time.map(encode_dt),
              r.stop_time.map(encode_dt),
              at_str,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(written)
  }

  async fn upsert_ad_sets(&self, rows: Vec<AdSetUpsert>) -> Result<usize> {
    let at_str = encode_dt(now());

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO ad_sets (
               ad_set_id, campaign_id, external_id, name, status, optimization_goal,
               billing_event, bid_strategy, targeting, daily_budget, lifetime_budget,
               start_time, end_time, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT (external_id) DO UPDATE SET
               campaign_id       = excluded.campaign_id,
               name              = excluded.name,
               status            = excluded.status,
               optimization_goal = excluded.optimization_goal,
               billing_event     = excluded.billing_event,
               bid_strategy      = excluded.bid_strategy,
               targeting         = excluded.targeting,
               daily_budget      = excluded.daily_budget,
               lifetime_budget   = excluded.lifetime_budget,
               start_time        = excluded.start_time,
               end_time          = excluded.end_time,
               updated_at        = excluded.updated_at",
          )?;
          for r in &rows {
            written += stmt.execute(params![
              encode_uuid(Uuid::new_v4()),
              encode_uuid(r.campaign_id),
              r.external_id,
              r.name,
              r.status,
              r.optimization_goal,
              r.billing_event,
              r.bid_strategy,
              encode_json(r.targeting.as_ref()),
              r.daily_budget,
              r.lifetime_budget,
              r.start_time.map(encode_dt),
              r.end_time.map(encode_dt),
              at_str,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(written)
  }

  async fn upsert_ads(&self, rows: Vec<AdUpsert>) -> Result<usize> {
    let at_str = encode_dt(now());

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO ads (
               ad_id, ad_set_id, campaign_id, external_id, name, status,
               creative_id, creative_type, title, body, call_to_action, link_url,
               image_url, video_url, thumbnail_url, creative_data, asset_feed_spec,
               created_time, updated_time, updated_at
             ) VALUES (
               ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
               ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
             )
             ON CONFLICT (external_id) DO UPDATE SET
               ad_set_id       = excluded.ad_set_id,
               campaign_id     = excluded.campaign_id,
               name            = excluded.name,
               status          = excluded.status,
               creative_id     = excluded.creative_id,
               creative_type   = excluded.creative_type,
               title           = excluded.title,
               body            = excluded.body,
               call_to_action  = excluded.call_to_action,
               link_url        = excluded.link_url,
               image_url       = excluded.image_url,
               video_url       = excluded.video_url,
               thumbnail_url   = excluded.thumbnail_url,
               creative_data   = excluded.creative_data,
               asset_feed_spec = excluded.asset_feed_spec,
               created_time    = excluded.created_time,
               updated_time    = excluded.updated_time,
               updated_at      = excluded.updated_at",
          )?;
          for r in &rows {
            let c = &r.creative;
            written += stmt.execute(params![
              encode_uuid(Uuid::new_v4()),
              encode_uuid(r.ad_set_id),
              encode_uuid(r.campaign_id),
              r.external_id,
              r.name,
              r.status,
              c.creative_id,
              c.creative_type.map(|t| t.to_string()),
              c.title,
              c.body,
              c.call_to_action,
              c.link_url,
              c.image_url,
              c.video_url,
              c.thumbnail_url,
              encode_json(r.creative_data.as_ref()),
              encode_json(r.asset_feed_spec.as_ref()),
              r.created_time.map(encode_dt),
              r.updated_time.map(encode_dt),
              at_str,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(written)
  }

  async fn campaigns(&self, ad_account_id: Uuid) -> Result<Vec<Campaign>> {
    let account_str = encode_uuid(ad_account_id);

    let raws: Vec<RawCampaign> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM ad_campaigns c WHERE c.ad_account_id = ?1 ORDER BY c.name",
          RawCampaign::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![account_str], RawCampaign::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCampaign::into_campaign).collect()
  }

  async fn ad_sets(&self, ad_account_id: Uuid) -> Result<Vec<AdSet>> {
    let account_str = encode_uuid(ad_account_id);

    let raws: Vec<RawAdSet> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM ad_sets s
           JOIN ad_campaigns c ON c.campaign_id = s.campaign_id
           WHERE c.ad_account_id = ?1
           ORDER BY s.name",
          RawAdSet::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![account_str], RawAdSet::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAdSet::into_ad_set).collect()
  }

  async fn find_campaign(&self, external_id: String) -> Result<Option<Campaign>> {
    let raw: Option<RawCampaign> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {} FROM ad_campaigns c WHERE c.external_id = ?1", RawCampaign::COLUMNS);
        Ok(conn.query_row(&sql, params![external_id], RawCampaign::from_row).optional()?)
      })
      .await?;

    raw.map(RawCampaign::into_campaign).transpose()
  }

  // ── ID maps ───────────────────────────────────────────────────────────────

  async fn campaign_map(&self, ad_account_id: Uuid) -> Result<HashMap<String, Uuid>> {
    let account_str = encode_uuid(ad_account_id);

    let pairs: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT external_id, campaign_id FROM ad_campaigns WHERE ad_account_id = ?1")?;
        let rows = stmt
          .query_map(params![account_str], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    pairs
      .into_iter()
      .map(|(ext, id)| Ok((ext, decode_uuid(&id)?)))
      .collect()
  }

  async fn ad_set_map(&self, ad_account_id: Uuid) -> Result<HashMap<String, AdSetRef>> {
    let account_str = encode_uuid(ad_account_id);

    let rows: Vec<(String, String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT s.external_id, s.ad_set_id, s.campaign_id
           FROM ad_sets s
           JOIN ad_campaigns c ON c.campaign_id = s.campaign_id
           WHERE c.ad_account_id = ?1",
        )?;
        let rows = stmt
          .query_map(params![account_str], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(ext, ad_set, campaign)| {
        let r = AdSetRef { ad_set_id: decode_uuid(&ad_set)?, campaign_id: decode_uuid(&campaign)? };
        Ok((ext, r))
      })
      .collect()
  }

  async fn ad_map(&self, ad_account_id: Uuid) -> Result<HashMap<String, AdRef>> {
    let account_str = encode_uuid(ad_account_id);

    let rows: Vec<(String, String, String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT d.external_id, d.ad_id, d.ad_set_id, d.campaign_id
           FROM ads d
           JOIN ad_campaigns c ON c.campaign_id = d.campaign_id
           WHERE c.ad_account_id = ?1",
        )?;
        let rows = stmt
          .query_map(params![account_str], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(ext, ad, ad_set, campaign)| {
        let r = AdRef {
          ad_id:       decode_uuid(&ad)?,
          ad_set_id:   decode_uuid(&ad_set)?,
          campaign_id: decode_uuid(&campaign)?,
        };
        Ok((ext, r))
      })
      .collect()
  }

  // ── Insights ──────────────────────────────────────────────────────────────

  async fn upsert_campaign_insights(&self, rows: Vec<CampaignDailyInsight>) -> Result<usize> {
    let at_str = encode_dt(now());

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO campaign_daily_insights (
               campaign_id, date, spend, impressions, clicks, leads_count, reach,
               frequency, link_clicks, post_engagement, cpc, cpm, cpl, ctr, actions, synced_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT (campaign_id, date) DO UPDATE SET
               spend           = excluded.spend,
               impressions     = excluded.impressions,
               clicks          = excluded.clicks,
               leads_count     = excluded.leads_count,
               reach           = excluded.reach,
               frequency       = excluded.frequency,
               link_clicks     = excluded.link_clicks,
               post_engagement = excluded.post_engagement,
               cpc             = excluded.cpc,
               cpm             = excluded.cpm,
               cpl             = excluded.cpl,
               ctr             = excluded.ctr,
               actions         = excluded.actions,
               synced_at       = excluded.synced_at",
          )?;
          for r in &rows {
            let m = &r.metrics;
            let d = m.derived();
            written += stmt.execute(params![
              encode_uuid(r.campaign_id),
              encode_date(r.date),
              m.spend,
              m.impressions,
              m.clicks,
              m.leads_count,
              m.reach,
              m.frequency,
              m.link_clicks,
              m.post_engagement,
              d.cpc,
              d.cpm,
              d.cpl,
              d.ctr,
              encode_json(r.actions.as_ref()),
              at_str,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(written)
  }

  async fn upsert_ad_set_insights(&self, rows: Vec<AdSetDailyInsight>) -> Result<usize> {
    let at_str = encode_dt(now());

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO ad_set_daily_insights (
               ad_set_id, campaign_id, date, spend, impressions, clicks, leads_count, reach,
               frequency, link_clicks, post_engagement, cpc, cpm, cpl, ctr, actions, synced_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT (ad_set_id, date) DO UPDATE SET
               campaign_id     = excluded.campaign_id,
               spend           = excluded.spend,
               impressions     = excluded.impressions,
               clicks          = excluded.clicks,
               leads_count     = excluded.leads_count,
               reach           = excluded.reach,
               frequency       = excluded.frequency,
               link_clicks     = excluded.link_clicks,
               post_engagement = excluded.post_engagement,
               cpc             = excluded.cpc,
               cpm             = excluded.cpm,
               cpl             = excluded.cpl,
               ctr             = excluded.ctr,
               actions         = excluded.actions,
               synced_at       = excluded.synced_at",
          )?;
          for r in &rows {
            let m = &r.metrics;
            let d = m.derived();
            written += stmt.execute(params![
              encode_uuid(r.ad_set_id),
              encode_uuid(r.campaign_id),
              encode_date(r.date),
              m.spend,
              m.impressions,
              m.clicks,
              m.leads_count,
              m.reach,
              m.frequency,
              m.link_clicks,
              m.post_engagement,
              d.cpc,
              d.cpm,
              d.cpl,
              d.ctr,
              encode_json(r.actions.as_ref()),
              at_str,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(written)
  }

  async fn upsert_ad_insights(&self, rows: Vec<AdDailyInsight>) -> Result<usize> {
    let at_str = encode_dt(now());

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO ad_daily_insights (
               ad_id, ad_set_id, campaign_id, date, spend, impressions, clicks, leads_count,
               reach, frequency, link_clicks, post_engagement, cpc, cpm, cpl, ctr, actions,
               video_views, video_avg_time_watched, quality_ranking, engagement_ranking,
               conversion_ranking, synced_at
             ) VALUES (
               ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
               ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23
             )
             ON CONFLICT (ad_id, date) DO UPDATE SET
               ad_set_id              = excluded.ad_set_id,
               campaign_id            = excluded.campaign_id,
               spend                  = excluded.spend,
               impressions            = excluded.impressions,
               clicks                 = excluded.clicks,
               leads_count            = excluded.leads_count,
               reach                  = excluded.reach,
               frequency              = excluded.frequency,
               link_clicks            = excluded.link_clicks,
               post_engagement        = excluded.post_engagement,
               cpc                    = excluded.cpc,
               cpm                    = excluded.cpm,
               cpl                    = excluded.cpl,
               ctr                    = excluded.ctr,
               actions                = excluded.actions,
               video_views            = excluded.video_views,
               video_avg_time_watched = excluded.video_avg_time_watched,
               quality_ranking        = excluded.quality_ranking,
               engagement_ranking     = excluded.engagement_ranking,
               conversion_ranking     = excluded.conversion_ranking,
               synced_at              = excluded.synced_at",
          )?;
          for r in &rows {
            let m = &r.metrics;
            let d = &r.derived;
            written += stmt.execute(params![
              encode_uuid(r.ad_id),
              encode_uuid(r.ad_set_id),
              encode_uuid(r.campaign_id),
              encode_date(r.date),
              m.spend,
              m.impressions,
              m.clicks,
              m.leads_count,
              m.reach,
              m.frequency,
              m.link_clicks,
              m.post_engagement,
              d.cpc,
              d.cpm,
              d.cpl,
              d.ctr,
              encode_json(r.actions.as_ref()),
              r.video_views,
              r.video_avg_time_watched,
              r.quality_ranking,
              r.engagement_ranking,
              r.conversion_ranking,
              at_str,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(written)
  }

  // ── Reporting ─────────────────────────────────────────────────────────────

  async fn metrics(&self, organization_id: Uuid, q: MetricsQuery) -> Result<Vec<MetricsRow>> {
    let mut filter = Filter::new();
    filter
      .eq("a.organization_id", encode_uuid(organization_id))
      .any_of("a.ad_account_id", q.ad_account_ids.iter().copied().map(encode_uuid))
      .cmp("i.date", ">=", encode_date(q.since))
      .cmp("i.date", "<=", encode_date(q.until));

    // Campaign and ad-set rows both read the ad-set table, which carries
    // link clicks and post engagement; the campaign table does not.
    let (id_col, name_col, from) = match q.level {
      InsightLevel::Campaign => {
        filter.any_of("c.campaign_id", q.campaign_ids.iter().copied().map(encode_uuid));
        (
          "c.campaign_id",
          "c.name",
          "ad_set_daily_insights i JOIN ad_campaigns c ON c.campaign_id = i.campaign_id",
        )
      }
      InsightLevel::AdSet => {
        filter
          .any_of("s.campaign_id", q.campaign_ids.iter().copied().map(encode_uuid))
          .any_of("s.ad_set_id", q.ad_set_ids.iter().copied().map(encode_uuid));
        (
          "s.ad_set_id",
          "s.name",
          "ad_set_daily_insights i
           JOIN ad_sets s ON s.ad_set_id = i.ad_set_id
           JOIN ad_campaigns c ON c.campaign_id = s.campaign_id",
        )
      }
      InsightLevel::Ad => {
        filter
          .any_of("d.campaign_id", q.campaign_ids.iter().copied().map(encode_uuid))
          .any_of("d.ad_set_id", q.ad_set_ids.iter().copied().map(encode_uuid))
          .any_of("d.ad_id", q.ad_ids.iter().copied().map(encode_uuid));
        (
          "d.ad_id",
          "d.name",
          "ad_daily_insights i
           JOIN ads d ON d.ad_id = i.ad_id
           JOIN ad_campaigns c ON c.campaign_id = d.campaign_id",
        )
      }
    };

    let sql = format!(
      "SELECT {id_col}, {name_col},
              SUM(i.spend), SUM(i.impressions), SUM(i.clicks), SUM(i.leads_count),
              SUM(i.link_clicks), SUM(i.post_engagement)
       FROM {from}
       {ACCOUNT_JOIN}
       {}
       GROUP BY {id_col}, {name_col}
       ORDER BY SUM(i.spend) DESC, {name_col}",
      filter.clause()
    );

    type Raw = (String, String, f64, i64, i64, i64, i64, i64);
    let raws: Vec<Raw> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        Ok(filter.query(&mut stmt, |r| {
          Ok((
            r.get(0)?,
            r.get(1)?,
            r.get(2)?,
            r.get(3)?,
            r.get(4)?,
            r.get(5)?,
            r.get(6)?,
            r.get(7)?,
          ))
        })?)
      })
      .await?;

    raws
      .into_iter()
      .map(|(id, name, spend, impressions, clicks, leads_count, link_clicks, post_engagement)| {
        Ok(
          MetricsRow {
            id: decode_uuid(&id)?,
            name,
            spend,
            impressions,
            clicks,
            leads_count,
            link_clicks,
            post_engagement,
            derived: Default::default(),
          }
          .with_derived(),
        )
      })
      .collect()
  }

  async fn daily_series(
    &self,
    organization_id: Uuid,
    since: NaiveDate,
    until: NaiveDate,
  ) -> Result<Vec<DailyPoint>> {
    let mut filter = Filter::new();
    filter
      .eq("a.organization_id", encode_uuid(organization_id))
      .cmp("i.date", ">=", encode_date(since))
      .cmp("i.date", "<=", encode_date(until));

    let raws: Vec<(String, Totals)> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT i.date, SUM(i.spend), SUM(i.impressions), SUM(i.clicks),
                  SUM(i.leads_count), SUM(i.reach)
           FROM campaign_daily_insights i
           JOIN ad_campaigns c ON c.campaign_id = i.campaign_id
           {ACCOUNT_JOIN}
           {}
           GROUP BY i.date
           ORDER BY i.date",
          filter.clause()
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(filter.query(&mut stmt, |r| {
          Ok((r.get(0)?, Totals {
            spend:       r.get(1)?,
            impressions: r.get(2)?,
            clicks:      r.get(3)?,
            leads_count: r.get(4)?,
            reach:       r.get(5)?,
          }))
        })?)
      })
      .await?;

    raws
      .into_iter()
      .map(|(date, totals)| Ok(DailyPoint { date: decode_date(&date)?, totals }))
      .collect()
  }

  async fn insight_totals(&self, scope: InsightScope) -> Result<(Totals, i64)> {
    let mut filter = Filter::new();
    filter
      .eq("a.organization_id", encode_uuid(scope.organization_id))
      .cmp("i.date", ">=", encode_date(scope.since))
      .cmp("i.date", "<=", encode_date(scope.until))
      .eq_opt("a.ad_account_id", scope.ad_account_id.map(encode_uuid))
      .eq_opt("c.campaign_id", scope.campaign_id.map(encode_uuid));

    let totals = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT COALESCE(SUM(i.spend), 0), COALESCE(SUM(i.impressions), 0),
                  COALESCE(SUM(i.clicks), 0), COALESCE(SUM(i.leads_count), 0),
                  COALESCE(SUM(i.reach), 0), COUNT(*)
           FROM campaign_daily_insights i
           JOIN ad_campaigns c ON c.campaign_id = i.campaign_id
           {ACCOUNT_JOIN}
           {}",
          filter.clause()
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = filter.query(&mut stmt, |r| {
          let totals = Totals {
            spend:       r.get(0)?,
            impressions: r.get(1)?,
            clicks:      r.get(2)?,
            leads_count: r.get(3)?,
            reach:       r.get(4)?,
          };
          Ok((totals, r.get::<_, i64>(5)?))
        })?;
        Ok(rows.pop().unwrap_or_default())
      })
      .await?;

    Ok(totals)
  }
}
