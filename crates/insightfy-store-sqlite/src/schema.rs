//! SQL schema for the Insightfy SQLite store.
//!
//! Executed once at connection startup. Timestamps are RFC 3339 UTC strings
//! with fixed microsecond precision, dates are `YYYY-MM-DD`, so both sort
//! and compare correctly as text.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS organizations (
    organization_id TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    slug            TEXT NOT NULL UNIQUE,
    created_at      TEXT NOT NULL
);

-- ─── Ads mirror ──────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS ad_accounts (
    ad_account_id   TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL REFERENCES organizations(organization_id),
    external_id     TEXT NOT NULL,   -- without the act_ prefix
    provider        TEXT NOT NULL DEFAULT 'meta',
    business_name   TEXT,
    is_active       INTEGER NOT NULL DEFAULT 1,
    connected_by    TEXT,
    created_at      TEXT NOT NULL,
    UNIQUE (organization_id, external_id)
);

CREATE TABLE IF NOT EXISTS meta_connections (
    connection_id    TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL,
    access_token     TEXT NOT NULL,
    token_expires_at TEXT,
    is_active        INTEGER NOT NULL DEFAULT 1,
    connected_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ad_campaigns (
    campaign_id   TEXT PRIMARY KEY,
    ad_account_id TEXT NOT NULL REFERENCES ad_accounts(ad_account_id),
    external_id   TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    status        TEXT,
    objective     TEXT,
    daily_budget  REAL,
    start_time    TEXT,
    stop_time     TEXT,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ad_sets (
    ad_set_id         TEXT PRIMARY KEY,
    campaign_id       TEXT NOT NULL REFERENCES ad_campaigns(campaign_id),
    external_id       TEXT NOT NULL UNIQUE,
    name              TEXT NOT NULL,
    status            TEXT,
    optimization_goal TEXT,
    billing_event     TEXT,
    bid_strategy      TEXT,
    targeting         TEXT,          -- JSON
    daily_budget      REAL,          -- currency units
    lifetime_budget   REAL,
    start_time        TEXT,
    end_time          TEXT,
    updated_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ads (
    ad_id           TEXT PRIMARY KEY,
    ad_set_id       TEXT NOT NULL REFERENCES ad_sets(ad_set_id),
    campaign_id     TEXT NOT NULL REFERENCES ad_campaigns(campaign_id),
    external_id     TEXT NOT NULL UNIQUE,
    name            TEXT NOT NULL,
    status          TEXT,
    creative_id     TEXT,
    creative_type   TEXT,
    title           TEXT,
    body            TEXT,
    call_to_action  TEXT,
    link_url        TEXT,
    image_url       TEXT,
    video_url       TEXT,
    thumbnail_url   TEXT,
    creative_data   TEXT,            -- JSON
    asset_feed_spec TEXT,            -- JSON
    created_time    TEXT,
    updated_time    TEXT,
    updated_at      TEXT NOT NULL
);

-- One row per entity per day; re-syncing a day overwrites it.
CREATE TABLE IF NOT EXISTS campaign_daily_insights (
    campaign_id     TEXT NOT NULL REFERENCES ad_campaigns(campaign_id),
    date            TEXT NOT NULL,
    spend           REAL NOT NULL DEFAULT 0,
    impressions     INTEGER NOT NULL DEFAULT 0,
    clicks          INTEGER NOT NULL DEFAULT 0,
    leads_count     INTEGER NOT NULL DEFAULT 0,
    reach           INTEGER NOT NULL DEFAULT 0,
    frequency       REAL NOT NULL DEFAULT 0,
    link_clicks     INTEGER NOT NULL DEFAULT 0,
    post_engagement INTEGER NOT NULL DEFAULT 0,
    cpc             REAL NOT NULL DEFAULT 0,
    cpm             REAL NOT NULL DEFAULT 0,
    cpl             REAL NOT NULL DEFAULT 0,
    ctr             REAL NOT NULL DEFAULT 0,
    actions         TEXT,
    synced_at       TEXT NOT NULL,
    UNIQUE (campaign_id, date)
);

CREATE TABLE IF NOT EXISTS ad_set_daily_insights (
    ad_set_id       TEXT NOT NULL REFERENCES ad_sets(ad_set_id),
    campaign_id     TEXT NOT NULL REFERENCES ad_campaigns(campaign_id),
    date            TEXT NOT NULL,
    spend           REAL NOT NULL DEFAULT 0,
    impressions     INTEGER NOT NULL DEFAULT 0,
    clicks          INTEGER NOT NULL DEFAULT 0,
    leads_count     INTEGER NOT NULL DEFAULT 0,
    reach           INTEGER NOT NULL DEFAULT 0,
    frequency       REAL NOT NULL DEFAULT 0,
    link_clicks     INTEGER NOT NULL DEFAULT 0,
    post_engagement INTEGER NOT NULL DEFAULT 0,
    cpc             REAL NOT NULL DEFAULT 0,
    cpm             REAL NOT NULL DEFAULT 0,
    cpl             REAL NOT NULL DEFAULT 0,
    ctr             REAL NOT NULL DEFAULT 0,
    actions         TEXT,
    synced_at       TEXT NOT NULL,
    UNIQUE (ad_set_id, date)
);

CREATE TABLE IF NOT EXISTS ad_daily_insights (
    ad_id                  TEXT NOT NULL REFERENCES ads(ad_id),
    ad_set_id              TEXT NOT NULL REFERENCES ad_sets(ad_set_id),
    campaign_id            TEXT NOT NULL REFERENCES ad_campaigns(campaign_id),
    date                   TEXT NOT NULL,
    spend                  REAL NOT NULL DEFAULT 0,
    impressions            INTEGER NOT NULL DEFAULT 0,
    clicks                 INTEGER NOT NULL DEFAULT 0,
    leads_count            INTEGER NOT NULL DEFAULT 0,
    reach                  INTEGER NOT NULL DEFAULT 0,
    frequency              REAL NOT NULL DEFAULT 0,
    link_clicks            INTEGER NOT NULL DEFAULT 0,
    post_engagement        INTEGER NOT NULL DEFAULT 0,
    cpc                    REAL NOT NULL DEFAULT 0,
    cpm                    REAL NOT NULL DEFAULT 0,
    cpl                    REAL NOT NULL DEFAULT 0,
    ctr                    REAL NOT NULL DEFAULT 0,
    actions                TEXT,
    video_views            INTEGER NOT NULL DEFAULT 0,
    video_avg_time_watched REAL NOT NULL DEFAULT 0,
    quality_ranking        TEXT,
    engagement_ranking     TEXT,
    conversion_ranking     TEXT,
    synced_at              TEXT NOT NULL,
    UNIQUE (ad_id, date)
);

-- ─── CRM ─────────────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS leads (
    lead_id            TEXT PRIMARY KEY,
    organization_id    TEXT NOT NULL REFERENCES organizations(organization_id),
    title              TEXT NOT NULL,
    name               TEXT,
    email              TEXT,
    phone              TEXT,
    company            TEXT,
    description        TEXT,
    status             TEXT NOT NULL,
    source             TEXT NOT NULL,
    priority           TEXT NOT NULL,
    value              REAL NOT NULL DEFAULT 0,
    external_lead_id   TEXT,
    campaign_id        TEXT,
    ad_external_id     TEXT,
    adset_external_id  TEXT,
    lead_source_detail TEXT,
    assignee_id        TEXT,
    assignee_name      TEXT,
    lead_score         INTEGER NOT NULL DEFAULT 50,
    closed_won_at      TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL,
    deleted_at         TEXT,
    -- NULL external ids never collide.
    UNIQUE (organization_id, external_lead_id)
);

CREATE TABLE IF NOT EXISTS interactions (
    interaction_id  TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL REFERENCES organizations(organization_id),
    lead_id         TEXT NOT NULL REFERENCES leads(lead_id),
    kind            TEXT NOT NULL,
    direction       TEXT NOT NULL,
    subject         TEXT,
    content         TEXT,
    user_name       TEXT,
    occurred_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    task_id         TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL REFERENCES organizations(organization_id),
    lead_id         TEXT REFERENCES leads(lead_id),
    title           TEXT NOT NULL,
    description     TEXT,
    due_at          TEXT,
    completed_at    TEXT,
    created_at      TEXT NOT NULL
);

-- Append-only audit trail.
CREATE TABLE IF NOT EXISTS lead_activity (
    activity_id TEXT PRIMARY KEY,
    lead_id     TEXT NOT NULL REFERENCES leads(lead_id),
    action      TEXT NOT NULL,
    from_status TEXT,
    to_status   TEXT,
    actor       TEXT,
    description TEXT,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS goals (
    goal_id          TEXT PRIMARY KEY,
    organization_id  TEXT NOT NULL REFERENCES organizations(organization_id),
    title            TEXT NOT NULL,
    description      TEXT,
    goal_type        TEXT NOT NULL,
    target_value     REAL NOT NULL,
    current_value    REAL NOT NULL DEFAULT 0,
    start_value      REAL NOT NULL DEFAULT 0,
    period_start     TEXT NOT NULL,
    period_end       TEXT NOT NULL,
    meta_account_id  TEXT,
    meta_campaign_id TEXT,
    status           TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- ─── Billing ─────────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id        TEXT PRIMARY KEY,
    organization_id        TEXT NOT NULL REFERENCES organizations(organization_id),
    plan_id                TEXT NOT NULL,
    status                 TEXT NOT NULL,
    stripe_subscription_id TEXT,
    stripe_customer_id     TEXT,
    current_period_start   TEXT,
    current_period_end     TEXT,
    last_payment_date      TEXT,
    last_payment_amount    REAL,
    canceled_at            TEXT,
    updated_at             TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscription_payments (
    payment_id          TEXT PRIMARY KEY,
    subscription_id     TEXT NOT NULL REFERENCES subscriptions(subscription_id),
    external_invoice_id TEXT NOT NULL UNIQUE,
    amount              REAL NOT NULL,
    status              TEXT NOT NULL,
    paid_at             TEXT
);

CREATE INDEX IF NOT EXISTS ad_accounts_org_idx     ON ad_accounts(organization_id);
CREATE INDEX IF NOT EXISTS campaigns_account_idx   ON ad_campaigns(ad_account_id);
CREATE INDEX IF NOT EXISTS ad_sets_campaign_idx    ON ad_sets(campaign_id);
CREATE INDEX IF NOT EXISTS ads_ad_set_idx          ON ads(ad_set_id);
CREATE INDEX IF NOT EXISTS campaign_insights_date  ON campaign_daily_insights(date);
CREATE INDEX IF NOT EXISTS ad_set_insights_date    ON ad_set_daily_insights(date);
CREATE INDEX IF NOT EXISTS ad_insights_date        ON ad_daily_insights(date);
CREATE INDEX IF NOT EXISTS leads_org_created_idx   ON leads(organization_id, created_at);
CREATE INDEX IF NOT EXISTS interactions_lead_idx   ON interactions(lead_id);
CREATE INDEX IF NOT EXISTS tasks_org_idx           ON tasks(organization_id);
CREATE INDEX IF NOT EXISTS activity_lead_idx       ON lead_activity(lead_id);
CREATE INDEX IF NOT EXISTS goals_org_idx           ON goals(organization_id);
CREATE INDEX IF NOT EXISTS subscriptions_org_idx   ON subscriptions(organization_id);
CREATE INDEX IF NOT EXISTS subscriptions_stripe    ON subscriptions(stripe_subscription_id);

PRAGMA user_version = 1;
";
