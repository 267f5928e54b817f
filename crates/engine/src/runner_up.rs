//! Runner-up invocation
//!
//! Replaces a winner with the lowest-ranked runner-up of the same tier that is
//! still waiting. The gateway re-checks both rows under lock; if another
//! invocation took the chosen runner-up first, the next one is tried.

use crate::audit::AuditRecorder;
use draw_core::transitions::check_replaceable;
use draw_core::{
    DrawError, DrawResult, PersistenceGateway, Replacement, ReplacementRequest, WinnerStatus,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct RunnerUpInvoker {
    store: Arc<dyn PersistenceGateway>,
    audit: AuditRecorder,
    retry_limit: u32,
}

impl RunnerUpInvoker {
    pub fn new(store: Arc<dyn PersistenceGateway>, audit: AuditRecorder, retry_limit: u32) -> Self {
        Self {
            store,
            audit,
            retry_limit: retry_limit.max(1),
        }
    }

    pub async fn invoke(&self, winner_id: Uuid, reason: &str, actor: &str) -> DrawResult<Replacement> {
        let reason = reason.trim();
        let actor = actor.trim();
        if reason.is_empty() {
            return Err(DrawError::InvalidInput("replacement reason must not be empty".into()));
        }
        if actor.is_empty() {
            return Err(DrawError::InvalidInput("actor must not be empty".into()));
        }

        let mut last_err = None;
        for attempt in 1..=self.retry_limit {
            let original = self
                .store
                .get_winner(winner_id)
                .await?
                .ok_or(DrawError::WinnerNotFound(winner_id))?;
            check_replaceable(&original)?;

            let candidate = self
                .store
                .list_runner_ups(original.draw_id, original.prize_tier_id)
                .await?
                .into_iter()
                .find(|w| w.is_runner_up && w.status == WinnerStatus::PendingNotification)
                .ok_or(DrawError::NoRunnerUpsAvailable { winner_id })?;

            let request = ReplacementRequest {
                original_id: original.id,
                promoted_id: candidate.id,
                reason: reason.to_string(),
                actor: actor.to_string(),
            };

            match self.store.replace_winner_atomic(&request).await {
                Ok(replacement) => {
                    info!(
                        winner_id = %winner_id,
                        promoted = %replacement.promoted.id,
                        rank = ?replacement.promoted.runner_up_rank,
                        "Runner-up promoted"
                    );
                    self.audit
                        .runner_up_invoked(&replacement, reason, actor)
                        .await;
                    return Ok(replacement);
                }
                Err(e @ DrawError::RunnerUpUnavailable { .. }) => {
                    warn!(
                        winner_id = %winner_id,
                        runner_up = %candidate.id,
                        attempt,
                        "Runner-up taken concurrently, retrying"
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or(DrawError::NoRunnerUpsAvailable { winner_id }))
    }
}
