//! Data model for draws, winners and their inputs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when a stored status string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a snake_case status enum with `as_str`, `Display` and `FromStr`.
macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseStatusError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

// ============================================================================
// STATUSES
// ============================================================================

status_enum!(
    /// Draw lifecycle. Completed and Failed are terminal.
    DrawStatus, "draw" {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
    }
);

status_enum!(
    /// Notification lifecycle of a winner row
    WinnerStatus, "winner" {
        PendingNotification => "pending_notification",
        Notified => "notified",
        Confirmed => "confirmed",
        Replaced => "replaced",
    }
);

status_enum!(
    /// Prize payment lifecycle of a winner row
    PaymentStatus, "payment" {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
    }
);

status_enum!(
    /// Sampling strategy recorded on a draw so it can be replayed
    SelectionStrategy, "selection strategy" {
        TicketShuffle => "ticket_shuffle",
        WeightedKeys => "weighted_keys",
    }
);

impl DrawStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DrawStatus::Completed | DrawStatus::Failed)
    }
}

impl WinnerStatus {
    /// Statuses from which a winner may still be replaced by a runner-up
    pub fn is_replaceable(&self) -> bool {
        matches!(self, WinnerStatus::PendingNotification | WinnerStatus::Notified)
    }
}

// ============================================================================
// ELIGIBILITY
// ============================================================================

/// One participant's weighted chance for a draw date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibleEntry {
    pub msisdn: String,
    /// Number of entries, derived from accumulated recharge
    pub weight: u64,
}

impl EligibleEntry {
    pub fn new(msisdn: impl Into<String>, weight: u64) -> Self {
        Self {
            msisdn: msisdn.into(),
            weight,
        }
    }
}

/// Aggregated eligibility for a single date
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EligibilitySnapshot {
    pub entries: Vec<EligibleEntry>,
    pub total_entries: u64,
    pub total_participants: u64,
}

impl EligibilitySnapshot {
    /// Build a snapshot whose totals are computed from the entries
    pub fn from_entries(entries: Vec<EligibleEntry>) -> Self {
        let total_entries = entries.iter().map(|e| e.weight).sum();
        let total_participants = entries.iter().filter(|e| e.weight > 0).count() as u64;
        Self {
            entries,
            total_entries,
            total_participants,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.weight == 0)
    }
}

// ============================================================================
// PRIZE STRUCTURE
// ============================================================================

/// A prize level with its own winner quantity and runner-up count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeTier {
    pub id: Uuid,
    pub name: String,
    /// Prize value in minor currency units
    pub value: i64,
    pub quantity: u32,
    /// Overrides the default of max(1, quantity / 2) when set
    pub runner_up_count: Option<u32>,
}

impl PrizeTier {
    pub fn effective_runner_up_count(&self) -> u32 {
        self.runner_up_count
            .unwrap_or_else(|| (self.quantity / 2).max(1))
    }
}

/// Ordered prize tiers; tier order is draw order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeStructure {
    pub id: Uuid,
    pub name: String,
    pub tiers: Vec<PrizeTier>,
}

impl PrizeStructure {
    pub fn total_winners(&self) -> u64 {
        self.tiers.iter().map(|t| t.quantity as u64).sum()
    }

    pub fn tier(&self, tier_id: Uuid) -> Option<&PrizeTier> {
        self.tiers.iter().find(|t| t.id == tier_id)
    }
}

// ============================================================================
// DRAW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub id: Uuid,
    pub draw_date: NaiveDate,
    pub prize_structure_id: Uuid,
    pub status: DrawStatus,
    pub total_eligible_participants: u64,
    pub total_entries: u64,
    pub executed_by: String,
    /// Hex-encoded 32-byte PRNG seed
    pub seed: Option<String>,
    /// Hex SHA-256 of the canonical entry pool
    pub entries_digest: Option<String>,
    pub strategy: Option<SelectionStrategy>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to open a Pending draw
#[derive(Debug, Clone)]
pub struct NewDraw {
    pub draw_date: NaiveDate,
    pub prize_structure_id: Uuid,
    pub total_eligible_participants: u64,
    pub total_entries: u64,
    pub executed_by: String,
    pub seed: String,
    pub entries_digest: String,
    pub strategy: SelectionStrategy,
}

impl NewDraw {
    pub fn into_draw(self, id: Uuid, now: DateTime<Utc>) -> Draw {
        Draw {
            id,
            draw_date: self.draw_date,
            prize_structure_id: self.prize_structure_id,
            status: DrawStatus::Pending,
            total_eligible_participants: self.total_eligible_participants,
            total_entries: self.total_entries,
            executed_by: self.executed_by,
            seed: Some(self.seed),
            entries_digest: Some(self.entries_digest),
            strategy: Some(self.strategy),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// WINNER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub id: Uuid,
    pub draw_id: Uuid,
    pub msisdn: String,
    pub prize_tier_id: Uuid,
    pub status: WinnerStatus,
    pub payment_status: PaymentStatus,
    /// Set iff payment_status is Paid
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_note: Option<String>,
    pub is_runner_up: bool,
    /// 1-based; kept after promotion for audit trace
    pub runner_up_rank: Option<u32>,
    pub replaced_by: Option<Uuid>,
    pub replacement_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Winner {
    /// A freshly drawn primary winner
    pub fn primary(draw_id: Uuid, prize_tier_id: Uuid, msisdn: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            draw_id,
            msisdn: msisdn.to_string(),
            prize_tier_id,
            status: WinnerStatus::PendingNotification,
            payment_status: PaymentStatus::Pending,
            paid_at: None,
            payment_note: None,
            is_runner_up: false,
            runner_up_rank: None,
            replaced_by: None,
            replacement_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A ranked alternate for a tier
    pub fn runner_up(
        draw_id: Uuid,
        prize_tier_id: Uuid,
        msisdn: &str,
        rank: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            is_runner_up: true,
            runner_up_rank: Some(rank),
            ..Self::primary(draw_id, prize_tier_id, msisdn, now)
        }
    }

    /// Whether this row was drawn as a primary winner (promotion keeps the rank)
    pub fn drawn_as_winner(&self) -> bool {
        self.runner_up_rank.is_none()
    }
}

/// Result of a successful draw execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawOutcome {
    pub draw: Draw,
    pub winners: Vec<Winner>,
}

impl DrawOutcome {
    pub fn primary_winners(&self) -> impl Iterator<Item = &Winner> {
        self.winners.iter().filter(|w| !w.is_runner_up)
    }

    pub fn runner_ups(&self) -> impl Iterator<Item = &Winner> {
        self.winners.iter().filter(|w| w.is_runner_up)
    }
}

/// Paired rows written by a runner-up invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replacement {
    pub original: Winner,
    pub promoted: Winner,
}

/// Inputs to the atomic replacement write
#[derive(Debug, Clone)]
pub struct ReplacementRequest {
    pub original_id: Uuid,
    pub promoted_id: Uuid,
    pub reason: String,
    pub actor: String,
}

/// Requested payment transition for a winner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentUpdate {
    /// Requires an explicit confirmation reference (transfer id, receipt no.)
    Paid { confirmation: String },
    Failed { note: String },
}

impl PaymentUpdate {
    pub fn target(&self) -> PaymentStatus {
        match self {
            PaymentUpdate::Paid { .. } => PaymentStatus::Paid,
            PaymentUpdate::Failed { .. } => PaymentStatus::Failed,
        }
    }
}

/// Compare-and-set payment write
#[derive(Debug, Clone)]
pub struct PaymentChange {
    pub winner_id: Uuid,
    pub expected: PaymentStatus,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

// ============================================================================
// AUDIT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    DrawCompleted,
    DrawFailed,
    RunnerUpInvoked,
    PaymentMarkedPaid,
    PaymentMarkedFailed,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditAction::DrawCompleted => "draw_completed",
            AuditAction::DrawFailed => "draw_failed",
            AuditAction::RunnerUpInvoked => "runner_up_invoked",
            AuditAction::PaymentMarkedPaid => "payment_marked_paid",
            AuditAction::PaymentMarkedFailed => "payment_marked_failed",
        };
        f.write_str(s)
    }
}

/// Append-only audit record handed to the sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub actor: String,
    pub summary: String,
    pub detail: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(quantity: u32, runner_up_count: Option<u32>) -> PrizeTier {
        PrizeTier {
            id: Uuid::new_v4(),
            name: "tier".into(),
            value: 100_000,
            quantity,
            runner_up_count,
        }
    }

    #[test]
    fn test_default_runner_up_count() {
        assert_eq!(tier(1, None).effective_runner_up_count(), 1);
        assert_eq!(tier(2, None).effective_runner_up_count(), 1);
        assert_eq!(tier(5, None).effective_runner_up_count(), 2);
        assert_eq!(tier(10, None).effective_runner_up_count(), 5);
    }

    #[test]
    fn test_runner_up_override() {
        assert_eq!(tier(2, Some(3)).effective_runner_up_count(), 3);
        assert_eq!(tier(4, Some(0)).effective_runner_up_count(), 0);
    }

    #[test]
    fn test_status_text_matches_storage_values() {
        assert_eq!(WinnerStatus::PendingNotification.to_string(), "pending_notification");
        assert_eq!("replaced".parse::<WinnerStatus>(), Ok(WinnerStatus::Replaced));
        assert_eq!("paid".parse::<PaymentStatus>(), Ok(PaymentStatus::Paid));
        assert_eq!(
            "weighted_keys".parse::<SelectionStrategy>(),
            Ok(SelectionStrategy::WeightedKeys)
        );

        let err = "archived".parse::<DrawStatus>().unwrap_err();
        assert_eq!(err.kind, "draw");
        assert_eq!(err.value, "archived");
    }

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&WinnerStatus::PendingNotification).unwrap();
        assert_eq!(json, "\"pending_notification\"");
        assert_eq!(AuditAction::RunnerUpInvoked.to_string(), "runner_up_invoked");
    }

    #[test]
    fn test_runner_up_row_keeps_rank() {
        let now = Utc::now();
        let row = Winner::runner_up(Uuid::new_v4(), Uuid::new_v4(), "2348000000001", 2, now);
        assert!(row.is_runner_up);
        assert_eq!(row.runner_up_rank, Some(2));
        assert!(!row.drawn_as_winner());
        assert_eq!(row.status, WinnerStatus::PendingNotification);
        assert_eq!(row.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn test_snapshot_totals() {
        let snapshot = EligibilitySnapshot::from_entries(vec![
            EligibleEntry::new("a", 3),
            EligibleEntry::new("b", 0),
            EligibleEntry::new("c", 2),
        ]);
        assert_eq!(snapshot.total_entries, 5);
        assert_eq!(snapshot.total_participants, 2);
        assert!(!snapshot.is_empty());
        assert!(EligibilitySnapshot::default().is_empty());
    }

    #[test]
    fn test_payment_update_serde() {
        let update: PaymentUpdate =
            serde_json::from_str(r#"{"status":"paid","confirmation":"TRX-991"}"#).unwrap();
        assert_eq!(update.target(), PaymentStatus::Paid);
    }
}
