//! Draw verification
//!
//! Replays a completed draw from its recorded seed and strategy against a
//! fresh eligibility read and compares the result with the stored rows.
//! Replacement never erases the original assignment: replaced winners keep
//! their row and promoted runner-ups keep their rank.

use crate::pool::EntryPool;
use crate::selector::{select_winners, DrawSeed};
use chrono::NaiveDate;
use draw_core::{
    DrawError, DrawResult, DrawStatus, EligibilityProvider, PersistenceGateway,
    PrizeStructureProvider, SelectionStrategy, Winner,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct TierVerification {
    pub tier_id: Uuid,
    pub tier_name: String,
    /// Sorted msisdns
    pub expected_winners: Vec<String>,
    pub recorded_winners: Vec<String>,
    /// Rank order
    pub expected_runner_ups: Vec<String>,
    pub recorded_runner_ups: Vec<String>,
}

impl TierVerification {
    pub fn matches(&self) -> bool {
        self.expected_winners == self.recorded_winners
            && self.expected_runner_ups == self.recorded_runner_ups
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub draw_id: Uuid,
    pub draw_date: NaiveDate,
    pub strategy: Option<SelectionStrategy>,
    pub recorded_digest: Option<String>,
    pub computed_digest: Option<String>,
    pub tiers: Vec<TierVerification>,
    pub mismatches: Vec<String>,
}

impl VerificationReport {
    pub fn is_match(&self) -> bool {
        self.mismatches.is_empty()
    }
}

pub struct DrawVerifier {
    eligibility: Arc<dyn EligibilityProvider>,
    prizes: Arc<dyn PrizeStructureProvider>,
    store: Arc<dyn PersistenceGateway>,
}

impl DrawVerifier {
    pub fn new(
        eligibility: Arc<dyn EligibilityProvider>,
        prizes: Arc<dyn PrizeStructureProvider>,
        store: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            eligibility,
            prizes,
            store,
        }
    }

    pub async fn verify(&self, draw_id: Uuid) -> DrawResult<VerificationReport> {
        let draw = self
            .store
            .get_draw(draw_id)
            .await?
            .ok_or(DrawError::DrawNotFound(draw_id))?;
        if draw.status != DrawStatus::Completed {
            return Err(DrawError::InvalidDrawState {
                draw_id,
                status: draw.status.to_string(),
                expected: DrawStatus::Completed.to_string(),
            });
        }

        let mut report = VerificationReport {
            draw_id,
            draw_date: draw.draw_date,
            strategy: draw.strategy,
            recorded_digest: draw.entries_digest.clone(),
            computed_digest: None,
            tiers: Vec::new(),
            mismatches: Vec::new(),
        };

        let (seed, strategy) = match (&draw.seed, draw.strategy) {
            (Some(seed), Some(strategy)) => (DrawSeed::from_hex(seed)?, strategy),
            _ => {
                report
                    .mismatches
                    .push("draw has no recorded seed or strategy".into());
                return Ok(report);
            }
        };

        let structure = self
            .prizes
            .prize_structure(draw.prize_structure_id)
            .await
            .map_err(DrawError::provider)?
            .ok_or(DrawError::PrizeStructureNotFound(draw.prize_structure_id))?;

        let snapshot = self
            .eligibility
            .eligible_entries(draw.draw_date)
            .await
            .map_err(DrawError::provider)?;
        let pool = match EntryPool::build(draw.draw_date, snapshot.entries) {
            Ok(pool) => pool,
            Err(e) => {
                report
                    .mismatches
                    .push(format!("eligibility no longer builds a pool: {}", e));
                return Ok(report);
            }
        };

        let digest = pool.digest();
        if draw.entries_digest.as_deref() != Some(digest.as_str()) {
            report
                .mismatches
                .push("entry pool digest differs from the recorded one".into());
        }
        report.computed_digest = Some(digest);

        let selection = match select_winners(&pool, &structure.tiers, strategy, &mut seed.rng()) {
            Ok(selection) => selection,
            Err(e) => {
                report.mismatches.push(format!("replay failed: {}", e));
                return Ok(report);
            }
        };

        let rows = self.store.list_winners(draw_id).await?;
        for tier in selection.tiers {
            let mut expected_winners = tier.winners;
            expected_winners.sort();
            let verification = TierVerification {
                tier_id: tier.tier_id,
                tier_name: tier.tier_name,
                expected_winners,
                recorded_winners: recorded_winners(&rows, tier.tier_id),
                expected_runner_ups: tier.runner_ups,
                recorded_runner_ups: recorded_runner_ups(&rows, tier.tier_id),
            };
            if !verification.matches() {
                report.mismatches.push(format!(
                    "tier '{}' assignment differs from replay",
                    verification.tier_name
                ));
            }
            report.tiers.push(verification);
        }

        let known: Vec<Uuid> = report.tiers.iter().map(|t| t.tier_id).collect();
        if rows.iter().any(|w| !known.contains(&w.prize_tier_id)) {
            report
                .mismatches
                .push("winner rows reference tiers outside the prize structure".into());
        }

        if report.is_match() {
            info!(draw_id = %draw_id, "Draw verified");
        } else {
            warn!(draw_id = %draw_id, mismatches = report.mismatches.len(), "Draw verification mismatch");
        }
        Ok(report)
    }
}

fn recorded_winners(rows: &[Winner], tier_id: Uuid) -> Vec<String> {
    let mut msisdns: Vec<String> = rows
        .iter()
        .filter(|w| w.prize_tier_id == tier_id && w.drawn_as_winner())
        .map(|w| w.msisdn.clone())
        .collect();
    msisdns.sort();
    msisdns
}

fn recorded_runner_ups(rows: &[Winner], tier_id: Uuid) -> Vec<String> {
    let mut ranked: Vec<(u32, &str)> = rows
        .iter()
        .filter(|w| w.prize_tier_id == tier_id)
        .filter_map(|w| w.runner_up_rank.map(|rank| (rank, w.msisdn.as_str())))
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);
    ranked.into_iter().map(|(_, m)| m.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use draw_core::WinnerStatus;

    #[test]
    fn test_recorded_assignment_survives_replacement() {
        let draw_id = Uuid::new_v4();
        let tier = Uuid::new_v4();
        let now = Utc::now();

        let mut original = Winner::primary(draw_id, tier, "b", now);
        original.status = WinnerStatus::Replaced;
        let mut promoted = Winner::runner_up(draw_id, tier, "d", 1, now);
        promoted.is_runner_up = false;
        let rows = vec![
            Winner::primary(draw_id, tier, "a", now),
            original,
            Winner::runner_up(draw_id, tier, "c", 2, now),
            promoted,
        ];

        assert_eq!(recorded_winners(&rows, tier), vec!["a", "b"]);
        assert_eq!(recorded_runner_ups(&rows, tier), vec!["d", "c"]);
    }
}
