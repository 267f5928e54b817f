//! Audit trail
//!
//! Every terminal draw outcome, runner-up invocation and payment transition is
//! logged through tracing and handed to the configured `AuditSink`. A sink
//! failure is logged and reported to Sentry; it never fails the operation that
//! produced the event.

use draw_core::{
    AuditAction, AuditRecord, AuditSink, Draw, PaymentStatus, Replacement, Winner,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, span, Instrument, Level};
use uuid::Uuid;

/// Structured audit entry
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub actor: String,
    pub summary: String,
    pub detail: serde_json::Map<String, serde_json::Value>,
    pub duration_ms: Option<u64>,
}

impl AuditEntry {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            entity_type: String::new(),
            entity_id: String::new(),
            actor: String::new(),
            summary: String::new(),
            detail: serde_json::Map::new(),
            duration_ms: None,
        }
    }

    pub fn entity(mut self, entity_type: &str, entity_id: impl ToString) -> Self {
        self.entity_type = entity_type.to_string();
        self.entity_id = entity_id.to_string();
        self
    }

    pub fn actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Merge the fields of a JSON object into the detail payload
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = detail {
            self.detail.extend(map);
        }
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn into_record(self) -> AuditRecord {
        let mut detail = self.detail;
        if let Some(ms) = self.duration_ms {
            detail.insert("duration_ms".to_string(), json!(ms));
        }
        AuditRecord {
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            actor: self.actor,
            summary: self.summary,
            detail: serde_json::Value::Object(detail),
        }
    }
}

/// Writes audit entries to tracing and the audit sink
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn log(&self, entry: AuditEntry) {
        let span = span!(
            Level::INFO,
            "audit",
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            actor = %entry.actor,
        );
        self.write(entry).instrument(span).await;
    }

    async fn write(&self, entry: AuditEntry) {
        info!(
            action = %entry.action,
            entity = %entry.entity_id,
            actor = %entry.actor,
            duration_ms = ?entry.duration_ms,
            "{}",
            entry.summary
        );

        let action = entry.action;
        let entity_id = entry.entity_id.clone();
        if let Err(e) = self.sink.record(&entry.into_record()).await {
            error!(error = %e, action = %action, entity = %entity_id, "Failed to persist audit event");
            sentry::capture_message(
                &format!("audit write failed for {} {}: {}", action, entity_id, e),
                sentry::Level::Warning,
            );
        }
    }

    /// Draw reached Completed
    pub async fn draw_completed(&self, draw: &Draw, winners: &[Winner], duration_ms: u64) {
        let mut per_tier: BTreeMap<Uuid, (usize, usize)> = BTreeMap::new();
        for w in winners {
            let counts = per_tier.entry(w.prize_tier_id).or_default();
            if w.is_runner_up {
                counts.1 += 1;
            } else {
                counts.0 += 1;
            }
        }
        let tiers: Vec<serde_json::Value> = per_tier
            .into_iter()
            .map(|(tier_id, (winners, runner_ups))| {
                json!({ "tier_id": tier_id, "winners": winners, "runner_ups": runner_ups })
            })
            .collect();
        let primary = winners.iter().filter(|w| !w.is_runner_up).count();

        let entry = AuditEntry::new(AuditAction::DrawCompleted)
            .entity("draw", draw.id)
            .actor(&draw.executed_by)
            .summary(format!(
                "Draw for {} completed with {} winners and {} runner-ups",
                draw.draw_date,
                primary,
                winners.len() - primary
            ))
            .with_detail(json!({
                "draw_date": draw.draw_date,
                "prize_structure_id": draw.prize_structure_id,
                "total_eligible_participants": draw.total_eligible_participants,
                "total_entries": draw.total_entries,
                "strategy": draw.strategy,
                "entries_digest": draw.entries_digest,
                "tiers": tiers,
            }))
            .with_duration(duration_ms);

        self.log(entry).await;
    }

    /// Draw reached Failed
    pub async fn draw_failed(&self, draw: &Draw, reason: &str, duration_ms: u64) {
        let entry = AuditEntry::new(AuditAction::DrawFailed)
            .entity("draw", draw.id)
            .actor(&draw.executed_by)
            .summary(format!("Draw for {} failed: {}", draw.draw_date, reason))
            .with_detail(json!({
                "draw_date": draw.draw_date,
                "prize_structure_id": draw.prize_structure_id,
                "total_eligible_participants": draw.total_eligible_participants,
                "total_entries": draw.total_entries,
                "reason": reason,
            }))
            .with_duration(duration_ms);

        self.log(entry).await;
    }

    pub async fn runner_up_invoked(&self, replacement: &Replacement, reason: &str, actor: &str) {
        let original = &replacement.original;
        let promoted = &replacement.promoted;
        let entry = AuditEntry::new(AuditAction::RunnerUpInvoked)
            .entity("winner", original.id)
            .actor(actor)
            .summary(format!(
                "Winner {} replaced by runner-up {} (rank {})",
                original.msisdn,
                promoted.msisdn,
                promoted.runner_up_rank.unwrap_or_default()
            ))
            .with_detail(json!({
                "draw_id": original.draw_id,
                "prize_tier_id": original.prize_tier_id,
                "original_winner_id": original.id,
                "original_msisdn": original.msisdn,
                "promoted_winner_id": promoted.id,
                "promoted_msisdn": promoted.msisdn,
                "runner_up_rank": promoted.runner_up_rank,
                "reason": reason,
            }));

        self.log(entry).await;
    }

    pub async fn payment_changed(&self, previous: PaymentStatus, winner: &Winner, actor: &str) {
        let action = match winner.payment_status {
            PaymentStatus::Paid => AuditAction::PaymentMarkedPaid,
            _ => AuditAction::PaymentMarkedFailed,
        };
        let entry = AuditEntry::new(action)
            .entity("winner", winner.id)
            .actor(actor)
            .summary(format!(
                "Payment for {} moved {} -> {}",
                winner.msisdn, previous, winner.payment_status
            ))
            .with_detail(json!({
                "draw_id": winner.draw_id,
                "prize_tier_id": winner.prize_tier_id,
                "msisdn": winner.msisdn,
                "previous_status": previous,
                "status": winner.payment_status,
                "paid_at": winner.paid_at,
                "note": winner.payment_note,
            }));

        self.log(entry).await;
    }
}

/// Timer for measuring operation duration
pub struct OperationTimer {
    start: Instant,
}

impl OperationTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct CollectingSink(Mutex<Vec<AuditRecord>>);

    #[async_trait]
    impl AuditSink for CollectingSink {
        async fn record(&self, record: &AuditRecord) -> anyhow::Result<()> {
            self.0.lock().push(record.clone());
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn record(&self, _record: &AuditRecord) -> anyhow::Result<()> {
            anyhow::bail!("audit table unavailable")
        }
    }

    #[test]
    fn test_audit_entry_builder() {
        let record = AuditEntry::new(AuditAction::DrawFailed)
            .entity("draw", "draw-1")
            .actor("ops@example.com")
            .summary("failed")
            .with_detail(json!({"reason": "not enough entries"}))
            .with_duration(42)
            .into_record();

        assert_eq!(record.entity_type, "draw");
        assert_eq!(record.entity_id, "draw-1");
        assert_eq!(record.actor, "ops@example.com");
        assert_eq!(record.detail["reason"], "not enough entries");
        assert_eq!(record.detail["duration_ms"], 42);
    }

    #[test]
    fn test_non_object_detail_is_ignored() {
        let record = AuditEntry::new(AuditAction::RunnerUpInvoked)
            .with_detail(json!([1, 2, 3]))
            .into_record();
        assert_eq!(record.detail, json!({}));
    }

    #[tokio::test]
    async fn test_recorder_forwards_to_sink() {
        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));
        let recorder = AuditRecorder::new(sink.clone());

        recorder
            .log(AuditEntry::new(AuditAction::PaymentMarkedPaid).entity("winner", "w-1"))
            .await;

        let records = sink.0.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, AuditAction::PaymentMarkedPaid);
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let recorder = AuditRecorder::new(Arc::new(BrokenSink));
        recorder
            .log(AuditEntry::new(AuditAction::DrawCompleted).entity("draw", "d-1"))
            .await;
    }
}
