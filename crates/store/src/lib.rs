//! Draw Store - PostgreSQL implementations of the draw collaborators
//!
//! - `PgStore`: `PersistenceGateway` over `draws` / `winners`
//! - `PgEligibility`: daily recharge aggregation into weighted entries
//! - `PgPrizeStructures`: ordered prize tiers
//! - `PgAuditSink`: append-only `audit_events`

pub mod db;
pub mod gateway;
pub mod providers;
pub mod schema;

pub use db::{connect, get_base_url, init_db, DbPool, DEFAULT_DB_NAME};
pub use gateway::PgStore;
pub use providers::{PgAuditSink, PgEligibility, PgPrizeStructures, DEFAULT_RECHARGE_PER_ENTRY};
