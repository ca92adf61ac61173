//! Meta Ads sync engine.
//!
//! [`SyncEngine`] pulls the ad hierarchy, daily insights and lead-ads
//! submissions from a [`GraphApi`] into a store implementing both
//! [`AdsStore`] and [`CrmStore`]. Each call handles one request: accounts are
//! walked in order, the requested window is split into date chunks, and a
//! failure in one account or chunk is recorded in the returned report rather
//! than ending the run. Rows read before a failing page are still written. A
//! Graph rate limit also sets the report's `rate_limited` flag.
//!
//! [`GraphApi`]: insightfy_meta::GraphApi
//! [`AdsStore`]: insightfy_core::store::AdsStore
//! [`CrmStore`]: insightfy_core::store::CrmStore

mod engine;
mod hierarchy;
mod insights;
mod leads;
mod tokens;

pub mod error;
pub mod report;
pub mod request;

pub use engine::{DEFAULT_BATCH_SIZE, SyncConfig, SyncEngine};
pub use error::{Error, Result};
pub use report::{ChunkReport, LeadFetchReport, LeadgenOutcome, SyncReport};
pub use request::{LeadFetchRequest, LeadgenNotification, SyncRequest};

#[cfg(test)]
mod tests;
