//! Payment status workflow
//!
//! Pending -> Paid | Failed, Failed -> Paid | Failed. Paid is final; repeating
//! Paid returns the row unchanged.

use crate::audit::AuditRecorder;
use chrono::{DateTime, Utc};
use draw_core::transitions::check_payable;
use draw_core::{
    DrawError, DrawResult, PaymentChange, PaymentStatus, PaymentUpdate, PersistenceGateway,
    Winner,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct PaymentWorkflow {
    store: Arc<dyn PersistenceGateway>,
    audit: AuditRecorder,
}

impl PaymentWorkflow {
    pub fn new(store: Arc<dyn PersistenceGateway>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    pub async fn update(
        &self,
        winner_id: Uuid,
        update: PaymentUpdate,
        actor: &str,
    ) -> DrawResult<Winner> {
        let actor = actor.trim();
        if actor.is_empty() {
            return Err(DrawError::InvalidInput("actor must not be empty".into()));
        }

        let winner = self
            .store
            .get_winner(winner_id)
            .await?
            .ok_or(DrawError::WinnerNotFound(winner_id))?;

        let change = match plan_transition(&winner, &update, Utc::now())? {
            Some(change) => change,
            None => {
                debug!(winner_id = %winner_id, "Payment already recorded as paid");
                return Ok(winner);
            }
        };

        let previous = winner.payment_status;
        let updated = self.store.set_payment_status(&change).await?;
        info!(
            winner_id = %winner_id,
            from = %previous,
            to = %updated.payment_status,
            "Payment status updated"
        );
        self.audit.payment_changed(previous, &updated, actor).await;
        Ok(updated)
    }
}

/// Decide the compare-and-set write for an update, `None` for a no-op
pub fn plan_transition(
    winner: &Winner,
    update: &PaymentUpdate,
    now: DateTime<Utc>,
) -> DrawResult<Option<PaymentChange>> {
    check_payable(winner)?;

    let expected = winner.payment_status;
    let change = match (expected, update) {
        (PaymentStatus::Paid, PaymentUpdate::Paid { .. }) => return Ok(None),
        (PaymentStatus::Paid, PaymentUpdate::Failed { .. }) => {
            return Err(DrawError::PaymentAlreadySettled {
                winner_id: winner.id,
            })
        }
        (_, PaymentUpdate::Paid { confirmation }) => {
            let confirmation = confirmation.trim();
            if confirmation.is_empty() {
                return Err(DrawError::InvalidInput(
                    "payment confirmation reference must not be empty".into(),
                ));
            }
            PaymentChange {
                winner_id: winner.id,
                expected,
                status: PaymentStatus::Paid,
                paid_at: Some(now),
                note: Some(confirmation.to_string()),
            }
        }
        (_, PaymentUpdate::Failed { note }) => {
            let note = note.trim();
            if note.is_empty() {
                return Err(DrawError::InvalidInput(
                    "payment failure note must not be empty".into(),
                ));
            }
            PaymentChange {
                winner_id: winner.id,
                expected,
                status: PaymentStatus::Failed,
                paid_at: None,
                note: Some(note.to_string()),
            }
        }
    };
    Ok(Some(change))
}
