//! In-memory persistence gateway
//!
//! Each gateway call runs under a single lock, which gives the same
//! atomicity the PostgreSQL store gets from its transactions. Used by tests
//! and by embedders that do not need durable storage.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use draw_core::transitions::{apply_replacement, check_payable};
use draw_core::{
    Draw, DrawError, DrawResult, DrawStatus, NewDraw, PaymentChange, PersistenceGateway,
    Replacement, ReplacementRequest, Winner,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    draws: HashMap<Uuid, Draw>,
    by_date: HashMap<NaiveDate, Uuid>,
    winners: HashMap<Uuid, Winner>,
    // insertion order per draw
    by_draw: HashMap<Uuid, Vec<Uuid>>,
}

impl Inner {
    fn pending_draw_mut(&mut self, draw_id: Uuid) -> DrawResult<&mut Draw> {
        let draw = self
            .draws
            .get_mut(&draw_id)
            .ok_or(DrawError::DrawNotFound(draw_id))?;
        if draw.status != DrawStatus::Pending {
            return Err(DrawError::InvalidDrawState {
                draw_id,
                status: draw.status.to_string(),
                expected: DrawStatus::Pending.to_string(),
            });
        }
        Ok(draw)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw_count(&self) -> usize {
        self.inner.lock().draws.len()
    }

    pub fn winner_count(&self) -> usize {
        self.inner.lock().winners.len()
    }
}

fn check_winner_set(draw_id: Uuid, winners: &[Winner]) -> DrawResult<()> {
    let mut msisdns = HashSet::new();
    let mut ranks = HashSet::new();
    for w in winners {
        if w.draw_id != draw_id {
            return Err(DrawError::storage(format!(
                "winner {} belongs to draw {}, not {}",
                w.id, w.draw_id, draw_id
            )));
        }
        if !msisdns.insert(w.msisdn.as_str()) {
            return Err(DrawError::storage(format!(
                "duplicate msisdn {} in draw {}",
                w.msisdn, draw_id
            )));
        }
        if let Some(rank) = w.runner_up_rank {
            if !ranks.insert((w.prize_tier_id, rank)) {
                return Err(DrawError::storage(format!(
                    "duplicate runner-up rank {} for tier {}",
                    rank, w.prize_tier_id
                )));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn create_draw(&self, draw: NewDraw) -> DrawResult<Draw> {
        let mut inner = self.inner.lock();
        if inner.by_date.contains_key(&draw.draw_date) {
            return Err(DrawError::DrawAlreadyExists {
                date: draw.draw_date,
            });
        }
        let draw = draw.into_draw(Uuid::new_v4(), Utc::now());
        inner.by_date.insert(draw.draw_date, draw.id);
        inner.draws.insert(draw.id, draw.clone());
        Ok(draw)
    }

    async fn complete_draw_with_winners(
        &self,
        draw_id: Uuid,
        winners: &[Winner],
    ) -> DrawResult<Draw> {
        let mut inner = self.inner.lock();
        inner.pending_draw_mut(draw_id)?;
        check_winner_set(draw_id, winners)?;

        let ids: Vec<Uuid> = winners.iter().map(|w| w.id).collect();
        for w in winners {
            inner.winners.insert(w.id, w.clone());
        }
        inner.by_draw.insert(draw_id, ids);

        let draw = inner.pending_draw_mut(draw_id)?;
        draw.status = DrawStatus::Completed;
        draw.updated_at = Utc::now();
        Ok(draw.clone())
    }

    async fn mark_draw_failed(&self, draw_id: Uuid, reason: &str) -> DrawResult<Draw> {
        let mut inner = self.inner.lock();
        let draw = inner.pending_draw_mut(draw_id)?;
        draw.status = DrawStatus::Failed;
        draw.failure_reason = Some(reason.to_string());
        draw.updated_at = Utc::now();
        Ok(draw.clone())
    }

    async fn get_draw(&self, draw_id: Uuid) -> DrawResult<Option<Draw>> {
        Ok(self.inner.lock().draws.get(&draw_id).cloned())
    }

    async fn get_draw_by_date(&self, date: NaiveDate) -> DrawResult<Option<Draw>> {
        let inner = self.inner.lock();
        Ok(inner
            .by_date
            .get(&date)
            .and_then(|id| inner.draws.get(id))
            .cloned())
    }

    async fn list_winners(&self, draw_id: Uuid) -> DrawResult<Vec<Winner>> {
        let inner = self.inner.lock();
        let rows = inner
            .by_draw
            .get(&draw_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.winners.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn get_winner(&self, winner_id: Uuid) -> DrawResult<Option<Winner>> {
        Ok(self.inner.lock().winners.get(&winner_id).cloned())
    }

    async fn list_runner_ups(
        &self,
        draw_id: Uuid,
        prize_tier_id: Uuid,
    ) -> DrawResult<Vec<Winner>> {
        let mut rows: Vec<Winner> = self
            .list_winners(draw_id)
            .await?
            .into_iter()
            .filter(|w| w.prize_tier_id == prize_tier_id && w.runner_up_rank.is_some())
            .collect();
        rows.sort_by_key(|w| w.runner_up_rank);
        Ok(rows)
    }

    async fn replace_winner_atomic(&self, request: &ReplacementRequest) -> DrawResult<Replacement> {
        let mut inner = self.inner.lock();

        let original = inner
            .winners
            .get(&request.original_id)
            .cloned()
            .ok_or(DrawError::WinnerNotFound(request.original_id))?;
        let promoted = inner
            .winners
            .get(&request.promoted_id)
            .cloned()
            .ok_or(DrawError::WinnerNotFound(request.promoted_id))?;

        let Replacement { original, promoted } =
            apply_replacement(&original, &promoted, &request.reason, Utc::now())?;

        inner.winners.insert(original.id, original.clone());
        inner.winners.insert(promoted.id, promoted.clone());

        Ok(Replacement { original, promoted })
    }

    async fn set_payment_status(&self, change: &PaymentChange) -> DrawResult<Winner> {
        let mut inner = self.inner.lock();
        let winner = inner
            .winners
            .get_mut(&change.winner_id)
            .ok_or(DrawError::WinnerNotFound(change.winner_id))?;

        // a replacement may have landed since the change was planned
        check_payable(winner)?;
        if winner.payment_status != change.expected {
            return Err(DrawError::StaleState {
                winner_id: change.winner_id,
            });
        }

        winner.payment_status = change.status;
        winner.paid_at = change.paid_at;
        winner.payment_note = change.note.clone();
        winner.updated_at = Utc::now();
        Ok(winner.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draw_core::{PaymentStatus, SelectionStrategy};

    fn new_draw(date: NaiveDate) -> NewDraw {
        NewDraw {
            draw_date: date,
            prize_structure_id: Uuid::new_v4(),
            total_eligible_participants: 4,
            total_entries: 4,
            executed_by: "ops".into(),
            seed: "00".repeat(32),
            entries_digest: "ff".repeat(32),
            strategy: SelectionStrategy::TicketShuffle,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn test_create_draw_rejects_taken_date() {
        let store = MemoryStore::new();
        store.create_draw(new_draw(date())).await.unwrap();
        let err = store.create_draw(new_draw(date())).await.unwrap_err();
        assert!(matches!(err, DrawError::DrawAlreadyExists { .. }));
        assert_eq!(store.draw_count(), 1);
    }

    #[tokio::test]
    async fn test_complete_rejects_duplicate_msisdn() {
        let store = MemoryStore::new();
        let draw = store.create_draw(new_draw(date())).await.unwrap();
        let tier = Uuid::new_v4();
        let now = Utc::now();
        let rows = vec![
            Winner::primary(draw.id, tier, "a", now),
            Winner::runner_up(draw.id, tier, "a", 1, now),
        ];

        assert!(store.complete_draw_with_winners(draw.id, &rows).await.is_err());
        assert_eq!(store.winner_count(), 0);
        let draw = store.get_draw(draw.id).await.unwrap().unwrap();
        assert_eq!(draw.status, DrawStatus::Pending);
    }

    #[tokio::test]
    async fn test_terminal_draw_cannot_move() {
        let store = MemoryStore::new();
        let draw = store.create_draw(new_draw(date())).await.unwrap();
        store.mark_draw_failed(draw.id, "boom").await.unwrap();

        let err = store.complete_draw_with_winners(draw.id, &[]).await.unwrap_err();
        assert!(matches!(err, DrawError::InvalidDrawState { .. }));
        let err = store.mark_draw_failed(draw.id, "again").await.unwrap_err();
        assert!(matches!(err, DrawError::InvalidDrawState { .. }));
    }

    #[tokio::test]
    async fn test_payment_compare_and_set() {
        let store = MemoryStore::new();
        let draw = store.create_draw(new_draw(date())).await.unwrap();
        let row = Winner::primary(draw.id, Uuid::new_v4(), "a", Utc::now());
        store
            .complete_draw_with_winners(draw.id, std::slice::from_ref(&row))
            .await
            .unwrap();

        let change = PaymentChange {
            winner_id: row.id,
            expected: PaymentStatus::Failed,
            status: PaymentStatus::Paid,
            paid_at: Some(Utc::now()),
            note: None,
        };
        let err = store.set_payment_status(&change).await.unwrap_err();
        assert!(matches!(err, DrawError::StaleState { .. }));
    }
}
