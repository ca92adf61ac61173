//! SQLite backend for the Insightfy ads mirror and CRM.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One [`SqliteStore`] implements both
//! [`AdsStore`](insightfy_core::store::AdsStore) and
//! [`CrmStore`](insightfy_core::store::CrmStore).

mod ads;
mod crm;
mod encode;
mod filter;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
