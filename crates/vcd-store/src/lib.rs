//! Relational store for the vCD orchestrator
//!
//! Holds the logical identity of every tenant-visible resource: organizations, users,
//! virtual datacenters, catalogs, vApps and VMs. Catalog items are never stored; they
//! are derived from cluster templates at read time.
//!
//! Two backends implement [`StoreTrait`]:
//!
//! - [`PgStore`]: PostgreSQL through sqlx, schema applied on connect
//! - [`MemoryStore`]: in-process maps, used in tests and when no database is configured
//!
//! Both enforce the same uniqueness rules. Concurrent creates that collide on a unique
//! key race to the constraint check and the loser gets [`StoreError::Conflict`].
//!
//! # Example
//!
//! ```no_run
//! use vcd_store::{PgStore, StoreTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PgStore::connect("postgres://vcd@localhost/vcd", 8).await?;
//! let orgs = store.list_orgs().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod schema;
#[path = "trait.rs"]
pub mod store_trait;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;
pub use store_trait::StoreTrait;
