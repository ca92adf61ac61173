//! HTTP surface of Insightfy: the authenticated REST API and sync
//! endpoints, plus the signed webhooks Meta, Mailgun and Stripe call.
//!
//! | Path            | Auth       | Handler                    |
//! |-----------------|------------|----------------------------|
//! | `/health`       | none       | liveness probe             |
//! | `/api/…`        | Basic      | [`insightfy_api`]          |
//! | `/sync/{kind}`  | Basic      | [`sync::handler`]          |
//! | `/webhooks/…`   | signatures | [`webhooks`]               |

pub mod auth;
pub mod error;
pub mod settings;
pub mod signature;
pub mod sync;
pub mod webhooks;

pub use error::Error;
pub use settings::ServerConfig;

use std::sync::Arc;

use axum::{
  Json, Router, middleware,
  response::IntoResponse,
  routing::{get, post},
};
use insightfy_core::store::{AdsStore, CrmStore};
use insightfy_meta::GraphApi;
use insightfy_sync::SyncEngine;
use serde_json::json;
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, Authenticated};

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the server's own handlers. The API router
/// gets only the store.
pub struct AppState<S, G> {
  pub store:  Arc<S>,
  pub engine: Arc<SyncEngine<S, G>>,
  pub config: Arc<ServerConfig>,
  pub auth:   Arc<AuthConfig>,
}

impl<S, G> Clone for AppState<S, G> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      engine: Arc::clone(&self.engine),
      config: Arc::clone(&self.config),
      auth:   Arc::clone(&self.auth),
    }
  }
}

impl<S, G> AppState<S, G>
where
  S: AdsStore + CrmStore + Clone,
  G: GraphApi,
{
  /// The engine gets its own handle on `store`; both share the same
  /// underlying connection.
  pub fn new(store: S, graph: G, config: ServerConfig) -> Self {
    let engine = SyncEngine::new(store.clone(), graph, config.sync_config());
    Self {
      store:  Arc::new(store),
      engine: Arc::new(engine),
      auth:   Arc::new(config.auth()),
      config: Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse { Json(json!({ "status": "ok" })) }

/// Build the full application router.
pub fn router<S, G>(state: AppState<S, G>) -> Router
where
  S: AdsStore + CrmStore + 'static,
  G: GraphApi + 'static,
{
  let sync_routes = Router::new()
    .route("/sync/{kind}", post(sync::handler::<S, G>))
    .route_layer(middleware::from_extractor_with_state::<Authenticated, _>(state.auth.clone()));

  let api = insightfy_api::api_router(state.store.clone())
    .layer(middleware::from_extractor_with_state::<Authenticated, _>(state.auth.clone()));

  Router::new()
    .route("/health",              get(health))
    .route("/webhooks/meta-leads", get(webhooks::meta_verify::<S, G>).post(webhooks::meta_leads::<S, G>))
    .route("/webhooks/mailgun",    post(webhooks::mailgun::<S, G>))
    .route("/webhooks/stripe",     post(webhooks::stripe::<S, G>))
    .merge(sync_routes)
    .with_state(state)
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests;
