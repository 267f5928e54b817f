//! Draw Engine
//!
//! Turns a weighted pool of recharge entries into prize winners and ranked
//! runner-ups, and manages what happens to those rows afterwards:
//! - `pool`: canonical entry pool and weighted orderings
//! - `selector`: per-tier winner and runner-up selection from a seeded ChaCha20 stream
//! - `orchestrator`: Pending -> Completed | Failed draw lifecycle
//! - `runner_up`: winner replacement
//! - `payment`: payment status transitions
//! - `verify`: replay of completed draws
//! - `store`: in-memory `PersistenceGateway`

pub mod audit;
pub mod config;
pub mod orchestrator;
pub mod payment;
pub mod pool;
pub mod runner_up;
pub mod selector;
pub mod service;
pub mod store;
pub mod verify;

pub use audit::{AuditEntry, AuditRecorder, OperationTimer};
pub use config::{ConfigError, EngineConfig};
pub use orchestrator::{DrawOrchestrator, PreparedDraw};
pub use pool::EntryPool;
pub use selector::{select_winners, DrawSeed, Selection, TierSelection};
pub use service::DrawService;
pub use store::MemoryStore;
pub use verify::{TierVerification, VerificationReport};
