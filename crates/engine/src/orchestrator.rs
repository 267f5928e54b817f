//! Draw orchestration
//!
//! `create` validates inputs and opens a Pending draw, `run` selects and
//! commits winners (or marks the draw Failed), `execute` is both in sequence.

use crate::audit::{AuditRecorder, OperationTimer};
use crate::config::EngineConfig;
use crate::pool::EntryPool;
use crate::selector::{select_winners, DrawSeed};
use chrono::{NaiveDate, Utc};
use draw_core::{
    Draw, DrawError, DrawOutcome, DrawResult, EligibilityProvider, NewDraw,
    PersistenceGateway, PrizeStructure, PrizeStructureProvider,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A Pending draw together with the inputs it was opened with
#[derive(Debug)]
pub struct PreparedDraw {
    pub draw: Draw,
    pub pool: EntryPool,
    pub structure: PrizeStructure,
    pub seed: DrawSeed,
}

pub struct DrawOrchestrator {
    eligibility: Arc<dyn EligibilityProvider>,
    prizes: Arc<dyn PrizeStructureProvider>,
    store: Arc<dyn PersistenceGateway>,
    audit: AuditRecorder,
    config: EngineConfig,
}

impl DrawOrchestrator {
    pub fn new(
        eligibility: Arc<dyn EligibilityProvider>,
        prizes: Arc<dyn PrizeStructureProvider>,
        store: Arc<dyn PersistenceGateway>,
        audit: AuditRecorder,
        config: EngineConfig,
    ) -> Self {
        Self {
            eligibility,
            prizes,
            store,
            audit,
            config,
        }
    }

    /// Validate, aggregate eligibility and insert the Pending draw
    pub async fn create(
        &self,
        date: NaiveDate,
        prize_structure_id: Uuid,
        executed_by: &str,
    ) -> DrawResult<PreparedDraw> {
        let executed_by = executed_by.trim();
        if executed_by.is_empty() {
            return Err(DrawError::InvalidInput("executed_by must not be empty".into()));
        }

        let today = Utc::now().date_naive();
        if !self.config.allow_future_dates && date > today {
            return Err(DrawError::InvalidDate {
                date,
                reason: format!("date is after today ({})", today),
            });
        }

        // early answer only; the unique insert below is what enforces it
        if self.store.get_draw_by_date(date).await?.is_some() {
            return Err(DrawError::DrawAlreadyExists { date });
        }

        let structure = self
            .prizes
            .prize_structure(prize_structure_id)
            .await
            .map_err(DrawError::provider)?
            .ok_or(DrawError::PrizeStructureNotFound(prize_structure_id))?;
        validate_structure(&structure)?;

        let snapshot = self
            .eligibility
            .eligible_entries(date)
            .await
            .map_err(DrawError::provider)?;
        let pool = EntryPool::build(date, snapshot.entries)?;

        let seed = match &self.config.fixed_seed {
            Some(hex) => DrawSeed::from_hex(hex)?,
            None => DrawSeed::generate(),
        };
        let strategy = pool.strategy_for(self.config.max_materialized_entries);

        let draw = self
            .store
            .create_draw(NewDraw {
                draw_date: date,
                prize_structure_id,
                total_eligible_participants: pool.participants() as u64,
                total_entries: pool.total_weight(),
                executed_by: executed_by.to_string(),
                seed: seed.to_hex(),
                entries_digest: pool.digest(),
                strategy,
            })
            .await?;

        info!(
            draw_id = %draw.id,
            date = %date,
            participants = draw.total_eligible_participants,
            entries = draw.total_entries,
            strategy = %strategy,
            "Draw created"
        );

        Ok(PreparedDraw {
            draw,
            pool,
            structure,
            seed,
        })
    }

    /// Select winners and move the draw to a terminal status
    pub async fn run(&self, prepared: PreparedDraw) -> DrawResult<DrawOutcome> {
        let timer = OperationTimer::start();
        let PreparedDraw {
            draw,
            pool,
            structure,
            seed,
        } = prepared;

        let strategy = draw
            .strategy
            .unwrap_or_else(|| pool.strategy_for(self.config.max_materialized_entries));
        let mut rng = seed.rng();

        let selection = match select_winners(&pool, &structure.tiers, strategy, &mut rng) {
            Ok(selection) => selection,
            Err(e) => {
                warn!(draw_id = %draw.id, error = %e, "Winner selection failed");
                self.fail(&draw, &e.to_string(), &timer).await;
                return Err(e);
            }
        };
        debug!(
            draw_id = %draw.id,
            winners = selection.winner_count(),
            runner_ups = selection.runner_up_count(),
            "Selection complete"
        );

        let winners = selection.into_winners(draw.id, Utc::now());
        match self.store.complete_draw_with_winners(draw.id, &winners).await {
            Ok(completed) => {
                info!(
                    draw_id = %completed.id,
                    date = %completed.draw_date,
                    winners = winners.iter().filter(|w| !w.is_runner_up).count(),
                    "Draw completed"
                );
                self.audit
                    .draw_completed(&completed, &winners, timer.elapsed_ms())
                    .await;
                Ok(DrawOutcome {
                    draw: completed,
                    winners,
                })
            }
            Err(e) => {
                error!(draw_id = %draw.id, error = %e, "Failed to commit draw winners");
                self.fail(&draw, &format!("completion write failed: {}", e), &timer)
                    .await;
                Err(e)
            }
        }
    }

    pub async fn execute(
        &self,
        date: NaiveDate,
        prize_structure_id: Uuid,
        executed_by: &str,
    ) -> DrawResult<DrawOutcome> {
        let prepared = self.create(date, prize_structure_id, executed_by).await?;
        self.run(prepared).await
    }

    // Best effort: the caller returns the original error either way
    async fn fail(&self, draw: &Draw, reason: &str, timer: &OperationTimer) {
        match self.store.mark_draw_failed(draw.id, reason).await {
            Ok(failed) => {
                info!(draw_id = %failed.id, reason, "Draw marked failed");
                self.audit
                    .draw_failed(&failed, reason, timer.elapsed_ms())
                    .await;
            }
            Err(e) => {
                error!(draw_id = %draw.id, error = %e, "Could not mark draw failed");
            }
        }
    }
}

/// Non-empty tier list, distinct tier ids, quantity >= 1, named tiers
pub fn validate_structure(structure: &PrizeStructure) -> DrawResult<()> {
    let invalid = |reason: String| DrawError::InvalidPrizeStructure {
        id: structure.id,
        reason,
    };

    if structure.tiers.is_empty() {
        return Err(invalid("no prize tiers".into()));
    }

    let mut ids = HashSet::new();
    for tier in &structure.tiers {
        if !ids.insert(tier.id) {
            return Err(invalid(format!("tier {} listed twice", tier.id)));
        }
        if tier.name.trim().is_empty() {
            return Err(invalid(format!("tier {} has no name", tier.id)));
        }
        if tier.quantity == 0 {
            return Err(invalid(format!("tier '{}' has quantity 0", tier.name)));
        }
        if tier.value < 0 {
            return Err(invalid(format!("tier '{}' has a negative value", tier.name)));
        }
    }
    Ok(())
}
