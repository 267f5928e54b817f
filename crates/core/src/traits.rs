//! Capability traits for the draw engine's collaborators
//!
//! Eligibility, prize structures and audit are external systems and report
//! failures as `anyhow::Error`. The persistence gateway speaks `DrawError`
//! directly because its uniqueness and compare-and-set failures are part of
//! the business contract.

use crate::error::DrawResult;
use crate::types::{
    AuditRecord, Draw, EligibilitySnapshot, NewDraw, PaymentChange, PrizeStructure, Replacement,
    ReplacementRequest, Winner,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

/// Supplies the weighted participant list for a date
#[async_trait]
pub trait EligibilityProvider: Send + Sync {
    async fn eligible_entries(&self, date: NaiveDate) -> anyhow::Result<EligibilitySnapshot>;
}

/// Supplies ordered prize tiers
#[async_trait]
pub trait PrizeStructureProvider: Send + Sync {
    async fn prize_structure(&self, id: Uuid) -> anyhow::Result<Option<PrizeStructure>>;
}

/// Append-only audit trail
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> anyhow::Result<()>;
}

/// Atomic storage of Draw and Winner state
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Insert a Pending draw. Fails with `DrawAlreadyExists` when the date is
    /// taken; the check and insert are one storage-level operation.
    async fn create_draw(&self, draw: NewDraw) -> DrawResult<Draw>;

    /// Move a Pending draw to Completed and insert its winner rows in one unit
    async fn complete_draw_with_winners(
        &self,
        draw_id: Uuid,
        winners: &[Winner],
    ) -> DrawResult<Draw>;

    /// Move a Pending draw to Failed with a reason
    async fn mark_draw_failed(&self, draw_id: Uuid, reason: &str) -> DrawResult<Draw>;

    async fn get_draw(&self, draw_id: Uuid) -> DrawResult<Option<Draw>>;

    async fn get_draw_by_date(&self, date: NaiveDate) -> DrawResult<Option<Draw>>;

    /// All winner rows of a draw, winners before runner-ups, runner-ups by rank
    async fn list_winners(&self, draw_id: Uuid) -> DrawResult<Vec<Winner>>;

    async fn get_winner(&self, winner_id: Uuid) -> DrawResult<Option<Winner>>;

    /// Rows ever drawn as runner-ups for a tier, ordered by rank ascending
    async fn list_runner_ups(&self, draw_id: Uuid, prize_tier_id: Uuid)
        -> DrawResult<Vec<Winner>>;

    /// Replace the original with the promoted runner-up in one unit.
    ///
    /// Re-checks both rows under lock: the original must still be a
    /// replaceable non-runner-up (else `WinnerAlreadyReplaced` /
    /// `InvalidReplacementTarget`), the promoted row must still be an
    /// unpromoted runner-up in PendingNotification (else `RunnerUpUnavailable`).
    async fn replace_winner_atomic(&self, request: &ReplacementRequest) -> DrawResult<Replacement>;

    /// Compare-and-set the payment status; `StaleState` if `expected` no longer holds
    async fn set_payment_status(&self, change: &PaymentChange) -> DrawResult<Winner>;
}
