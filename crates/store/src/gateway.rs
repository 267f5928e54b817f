//! PostgreSQL `PersistenceGateway`
//!
//! Date uniqueness comes from `UNIQUE(draw_date)` with `ON CONFLICT DO NOTHING`.
//! Draw completion and winner replacement run in one transaction each, with
//! the affected rows locked `FOR UPDATE`.

use crate::db::DbPool;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use deadpool_postgres::Object;
use draw_core::transitions::{apply_replacement, check_payable};
use draw_core::{
    Draw, DrawError, DrawResult, DrawStatus, NewDraw, PaymentChange, PersistenceGateway,
    Replacement, ReplacementRequest, SelectionStrategy, Winner,
};
use tokio_postgres::Row;
use tracing::debug;
use uuid::Uuid;

const DRAW_COLUMNS: &str = "id, draw_date, prize_structure_id, status, \
    total_eligible_participants, total_entries, executed_by, seed, entries_digest, \
    strategy, failure_reason, created_at, updated_at";

const WINNER_COLUMNS: &str = "w.id, w.draw_id, w.msisdn, w.prize_tier_id, w.status, \
    w.payment_status, w.paid_at, w.payment_note, w.is_runner_up, w.runner_up_rank, \
    w.replaced_by, w.replacement_reason, w.created_at, w.updated_at";

const INSERT_WINNER: &str = "INSERT INTO winners (id, draw_id, msisdn, prize_tier_id, status, \
    payment_status, is_runner_up, runner_up_rank, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)";

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> DrawResult<Object> {
        self.pool.get().await.map_err(DrawError::storage)
    }
}

fn draw_from_row(row: &Row) -> DrawResult<Draw> {
    let status: String = row.get(3);
    let strategy: Option<String> = row.get(9);
    Ok(Draw {
        id: row.get(0),
        draw_date: row.get(1),
        prize_structure_id: row.get(2),
        status: status.parse().map_err(DrawError::storage)?,
        total_eligible_participants: row.get::<_, i64>(4) as u64,
        total_entries: row.get::<_, i64>(5) as u64,
        executed_by: row.get(6),
        seed: row.get(7),
        entries_digest: row.get(8),
        strategy: strategy
            .map(|s| s.parse::<SelectionStrategy>())
            .transpose()
            .map_err(DrawError::storage)?,
        failure_reason: row.get(10),
        created_at: row.get(11),
        updated_at: row.get(12),
    })
}

fn winner_from_row(row: &Row) -> DrawResult<Winner> {
    let status: String = row.get(4);
    let payment_status: String = row.get(5);
    Ok(Winner {
        id: row.get(0),
        draw_id: row.get(1),
        msisdn: row.get(2),
        prize_tier_id: row.get(3),
        status: status.parse().map_err(DrawError::storage)?,
        payment_status: payment_status.parse().map_err(DrawError::storage)?,
        paid_at: row.get(6),
        payment_note: row.get(7),
        is_runner_up: row.get(8),
        runner_up_rank: row.get::<_, Option<i32>>(9).map(|r| r as u32),
        replaced_by: row.get(10),
        replacement_reason: row.get(11),
        created_at: row.get(12),
        updated_at: row.get(13),
    })
}

fn winners_from_rows(rows: &[Row]) -> DrawResult<Vec<Winner>> {
    rows.iter().map(winner_from_row).collect()
}

/// Map the locked status of a draw to the error for a non-pending draw
fn ensure_pending(draw_id: Uuid, status: Option<String>) -> DrawResult<()> {
    match status {
        None => Err(DrawError::DrawNotFound(draw_id)),
        Some(s) if s == DrawStatus::Pending.as_str() => Ok(()),
        Some(s) => Err(DrawError::InvalidDrawState {
            draw_id,
            status: s,
            expected: DrawStatus::Pending.to_string(),
        }),
    }
}

/// Why a payment update matched no row, given the row as it is now
fn payment_miss(current: &Winner) -> DrawError {
    match check_payable(current) {
        Err(e) => e,
        Ok(()) => DrawError::StaleState {
            winner_id: current.id,
        },
    }
}

#[async_trait]
impl PersistenceGateway for PgStore {
    async fn create_draw(&self, draw: NewDraw) -> DrawResult<Draw> {
        let draw = draw.into_draw(Uuid::new_v4(), Utc::now());
        let client = self.client().await?;

        let inserted = client
            .query_opt(
                "INSERT INTO draws (id, draw_date, prize_structure_id, status,
                    total_eligible_participants, total_entries, executed_by,
                    seed, entries_digest, strategy, created_at, updated_at)
                 VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8, $9, $10, $10)
                 ON CONFLICT (draw_date) DO NOTHING
                 RETURNING id",
                &[
                    &draw.id,
                    &draw.draw_date,
                    &draw.prize_structure_id,
                    &(draw.total_eligible_participants as i64),
                    &(draw.total_entries as i64),
                    &draw.executed_by,
                    &draw.seed,
                    &draw.entries_digest,
                    &draw.strategy.map(|s| s.as_str()),
                    &draw.created_at,
                ],
            )
            .await
            .map_err(DrawError::storage)?;

        match inserted {
            Some(_) => Ok(draw),
            None => Err(DrawError::DrawAlreadyExists {
                date: draw.draw_date,
            }),
        }
    }

    async fn complete_draw_with_winners(
        &self,
        draw_id: Uuid,
        winners: &[Winner],
    ) -> DrawResult<Draw> {
        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(DrawError::storage)?;

        let locked = tx
            .query_opt("SELECT status FROM draws WHERE id = $1 FOR UPDATE", &[&draw_id])
            .await
            .map_err(DrawError::storage)?;
        ensure_pending(draw_id, locked.map(|r| r.get(0)))?;

        let stmt = tx.prepare(INSERT_WINNER).await.map_err(DrawError::storage)?;
        for w in winners {
            tx.execute(
                &stmt,
                &[
                    &w.id,
                    &draw_id,
                    &w.msisdn,
                    &w.prize_tier_id,
                    &w.status.as_str(),
                    &w.payment_status.as_str(),
                    &w.is_runner_up,
                    &w.runner_up_rank.map(|r| r as i32),
                    &w.created_at,
                ],
            )
            .await
            .map_err(DrawError::storage)?;
        }

        let row = tx
            .query_one(
                &format!(
                    "UPDATE draws SET status = 'completed', updated_at = NOW()
                     WHERE id = $1 RETURNING {}",
                    DRAW_COLUMNS
                ),
                &[&draw_id],
            )
            .await
            .map_err(DrawError::storage)?;
        let draw = draw_from_row(&row)?;

        tx.commit().await.map_err(DrawError::storage)?;
        debug!(draw_id = %draw_id, rows = winners.len(), "Draw winners committed");
        Ok(draw)
    }

    async fn mark_draw_failed(&self, draw_id: Uuid, reason: &str) -> DrawResult<Draw> {
        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(DrawError::storage)?;

        let locked = tx
            .query_opt("SELECT status FROM draws WHERE id = $1 FOR UPDATE", &[&draw_id])
            .await
            .map_err(DrawError::storage)?;
        ensure_pending(draw_id, locked.map(|r| r.get(0)))?;

        let row = tx
            .query_one(
                &format!(
                    "UPDATE draws SET status = 'failed', failure_reason = $2, updated_at = NOW()
                     WHERE id = $1 RETURNING {}",
                    DRAW_COLUMNS
                ),
                &[&draw_id, &reason],
            )
            .await
            .map_err(DrawError::storage)?;
        let draw = draw_from_row(&row)?;

        tx.commit().await.map_err(DrawError::storage)?;
        Ok(draw)
    }

    async fn get_draw(&self, draw_id: Uuid) -> DrawResult<Option<Draw>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM draws WHERE id = $1", DRAW_COLUMNS),
                &[&draw_id],
            )
            .await
            .map_err(DrawError::storage)?;
        row.as_ref().map(draw_from_row).transpose()
    }

    async fn get_draw_by_date(&self, date: NaiveDate) -> DrawResult<Option<Draw>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM draws WHERE draw_date = $1", DRAW_COLUMNS),
                &[&date],
            )
            .await
            .map_err(DrawError::storage)?;
        row.as_ref().map(draw_from_row).transpose()
    }

    async fn list_winners(&self, draw_id: Uuid) -> DrawResult<Vec<Winner>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM winners w
                     JOIN prize_tiers t ON t.id = w.prize_tier_id
                     WHERE w.draw_id = $1
                     ORDER BY t.position, w.runner_up_rank NULLS FIRST, w.msisdn",
                    WINNER_COLUMNS
                ),
                &[&draw_id],
            )
            .await
            .map_err(DrawError::storage)?;
        winners_from_rows(&rows)
    }

    async fn get_winner(&self, winner_id: Uuid) -> DrawResult<Option<Winner>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM winners w WHERE w.id = $1", WINNER_COLUMNS),
                &[&winner_id],
            )
            .await
            .map_err(DrawError::storage)?;
        row.as_ref().map(winner_from_row).transpose()
    }

    async fn list_runner_ups(
        &self,
        draw_id: Uuid,
        prize_tier_id: Uuid,
    ) -> DrawResult<Vec<Winner>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM winners w
                     WHERE w.draw_id = $1 AND w.prize_tier_id = $2
                       AND w.runner_up_rank IS NOT NULL
                     ORDER BY w.runner_up_rank",
                    WINNER_COLUMNS
                ),
                &[&draw_id, &prize_tier_id],
            )
            .await
            .map_err(DrawError::storage)?;
        winners_from_rows(&rows)
    }

    async fn replace_winner_atomic(&self, request: &ReplacementRequest) -> DrawResult<Replacement> {
        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(DrawError::storage)?;

        // Lock both rows in id order so concurrent invocations serialise
        let ids = vec![request.original_id, request.promoted_id];
        let rows = tx
            .query(
                &format!(
                    "SELECT {} FROM winners w WHERE w.id = ANY($1) ORDER BY w.id FOR UPDATE",
                    WINNER_COLUMNS
                ),
                &[&ids],
            )
            .await
            .map_err(DrawError::storage)?;
        let locked = winners_from_rows(&rows)?;

        let original = locked
            .iter()
            .find(|w| w.id == request.original_id)
            .ok_or(DrawError::WinnerNotFound(request.original_id))?;
        let promoted = locked
            .iter()
            .find(|w| w.id == request.promoted_id)
            .ok_or(DrawError::WinnerNotFound(request.promoted_id))?;

        let replacement = apply_replacement(original, promoted, &request.reason, Utc::now())?;

        tx.execute(
            "UPDATE winners SET status = $2, replaced_by = $3, replacement_reason = $4,
                updated_at = $5
             WHERE id = $1",
            &[
                &replacement.original.id,
                &replacement.original.status.as_str(),
                &replacement.original.replaced_by,
                &replacement.original.replacement_reason,
                &replacement.original.updated_at,
            ],
        )
        .await
        .map_err(DrawError::storage)?;

        tx.execute(
            "UPDATE winners SET is_runner_up = FALSE, status = $2, updated_at = $3
             WHERE id = $1",
            &[
                &replacement.promoted.id,
                &replacement.promoted.status.as_str(),
                &replacement.promoted.updated_at,
            ],
        )
        .await
        .map_err(DrawError::storage)?;

        tx.commit().await.map_err(DrawError::storage)?;
        Ok(replacement)
    }

    async fn set_payment_status(&self, change: &PaymentChange) -> DrawResult<Winner> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE winners w SET payment_status = $2, paid_at = $3, payment_note = $4,
                        updated_at = NOW()
                     WHERE w.id = $1 AND w.payment_status = $5
                       AND w.status <> 'replaced' AND NOT w.is_runner_up
                     RETURNING {}",
                    WINNER_COLUMNS
                ),
                &[
                    &change.winner_id,
                    &change.status.as_str(),
                    &change.paid_at,
                    &change.note,
                    &change.expected.as_str(),
                ],
            )
            .await
            .map_err(DrawError::storage)?;

        if let Some(row) = row {
            return winner_from_row(&row);
        }

        let current = client
            .query_opt(
                &format!("SELECT {} FROM winners w WHERE w.id = $1", WINNER_COLUMNS),
                &[&change.winner_id],
            )
            .await
            .map_err(DrawError::storage)?;
        match current {
            Some(row) => Err(payment_miss(&winner_from_row(&row)?)),
            None => Err(DrawError::WinnerNotFound(change.winner_id)),
        }
    }
}
