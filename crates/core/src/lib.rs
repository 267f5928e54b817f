//! Draw Core - shared model for the recharge draw engine
//!
//! Holds everything the engine, the storage layer and the operator CLI agree on:
//! - Draw / Winner records and their status enums
//! - Eligibility and prize-structure shapes supplied by collaborators
//! - The `DrawError` taxonomy
//! - Capability traits for the collaborators (eligibility, prizes, audit, persistence)
//!
//! Key invariants:
//! - At most one Draw per calendar date
//! - Draw status only moves Pending -> Completed or Pending -> Failed
//! - An msisdn appears in at most one Winner row per draw
//! - Runner-up ranks are unique and contiguous from 1 per (draw, tier)

pub mod error;
pub mod traits;
pub mod transitions;
pub mod types;

pub use error::{DrawError, DrawResult, ErrorKind};
pub use traits::{AuditSink, EligibilityProvider, PersistenceGateway, PrizeStructureProvider};
pub use types::*;
