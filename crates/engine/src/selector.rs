//! Winner selection
//!
//! Walks prize tiers in order over one weighted ordering of the pool, so no
//! msisdn can appear twice in a draw.

use crate::pool::EntryPool;
use chrono::{DateTime, Utc};
use draw_core::{DrawError, DrawResult, PrizeTier, SelectionStrategy, Winner};
use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, warn};
use uuid::Uuid;

/// 32-byte per-draw seed
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DrawSeed([u8; 32]);

impl DrawSeed {
    /// Fresh seed from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> DrawResult<Self> {
        let decoded = hex::decode(value.trim())
            .map_err(|e| DrawError::InvalidInput(format!("seed is not hex: {}", e)))?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|v: Vec<u8>| {
            DrawError::InvalidInput(format!("seed must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn rng(&self) -> ChaCha20Rng {
        ChaCha20Rng::from_seed(self.0)
    }
}

// Keep seeds out of logs by accident
impl std::fmt::Debug for DrawSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DrawSeed({}..)", &self.to_hex()[..8])
    }
}

/// Msisdns picked for one tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSelection {
    pub tier_id: Uuid,
    pub tier_name: String,
    pub winners: Vec<String>,
    /// Index 0 holds rank 1
    pub runner_ups: Vec<String>,
    /// Alternates the tier asked for
    pub runner_ups_requested: u32,
}

impl TierSelection {
    pub fn runner_up_shortfall(&self) -> u32 {
        self.runner_ups_requested
            .saturating_sub(self.runner_ups.len() as u32)
    }
}

/// Complete assignment of a draw, in tier order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub tiers: Vec<TierSelection>,
}

impl Selection {
    pub fn winner_count(&self) -> usize {
        self.tiers.iter().map(|t| t.winners.len()).sum()
    }

    pub fn runner_up_count(&self) -> usize {
        self.tiers.iter().map(|t| t.runner_ups.len()).sum()
    }

    /// Materialise Winner rows: per tier, winners first, then runner-ups by rank
    pub fn into_winners(self, draw_id: Uuid, now: DateTime<Utc>) -> Vec<Winner> {
        let mut rows = Vec::with_capacity(self.winner_count() + self.runner_up_count());
        for tier in self.tiers {
            for msisdn in &tier.winners {
                rows.push(Winner::primary(draw_id, tier.tier_id, msisdn, now));
            }
            for (i, msisdn) in tier.runner_ups.iter().enumerate() {
                rows.push(Winner::runner_up(
                    draw_id,
                    tier.tier_id,
                    msisdn,
                    i as u32 + 1,
                    now,
                ));
            }
        }
        rows
    }
}

/// Select winners and runner-ups for every tier.
///
/// Runner-ups are collected until the tier's count is met or the ordering runs
/// out, so a generous runner-up count can leave a later tier short. A tier that
/// cannot reach its quantity fails the whole selection; a runner-up shortfall
/// is only logged.
pub fn select_winners(
    pool: &EntryPool,
    tiers: &[PrizeTier],
    strategy: SelectionStrategy,
    rng: &mut ChaCha20Rng,
) -> DrawResult<Selection> {
    let order = pool.weighted_order(strategy, rng);
    let mut cursor = 0usize;
    let mut selected = Vec::with_capacity(tiers.len());

    for tier in tiers {
        let quantity = tier.quantity as usize;
        let remaining = order.len() - cursor;
        if remaining < quantity {
            return Err(DrawError::InsufficientEntriesForTier {
                tier_id: tier.id,
                tier_name: tier.name.clone(),
                required: tier.quantity,
                available: remaining,
            });
        }

        let winners: Vec<String> = order[cursor..cursor + quantity]
            .iter()
            .map(|&i| pool.msisdn(i).to_string())
            .collect();
        cursor += quantity;

        let requested = tier.effective_runner_up_count();
        let take = (requested as usize).min(order.len() - cursor);

        let runner_ups: Vec<String> = order[cursor..cursor + take]
            .iter()
            .map(|&i| pool.msisdn(i).to_string())
            .collect();
        cursor += take;

        let selection = TierSelection {
            tier_id: tier.id,
            tier_name: tier.name.clone(),
            winners,
            runner_ups,
            runner_ups_requested: requested,
        };

        if selection.runner_up_shortfall() > 0 {
            warn!(
                tier = %tier.name,
                requested,
                selected = selection.runner_ups.len(),
                "Runner-up shortfall"
            );
        }
        debug!(
            tier = %tier.name,
            winners = selection.winners.len(),
            runner_ups = selection.runner_ups.len(),
            "Tier selected"
        );

        selected.push(selection);
    }

    Ok(Selection { tiers: selected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use draw_core::EligibleEntry;
    use std::collections::HashSet;

    fn pool(n: u64) -> EntryPool {
        EntryPool::build(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            (0..n)
                .map(|i| EligibleEntry::new(format!("23480{:08}", i), 1 + i % 3))
                .collect(),
        )
        .unwrap()
    }

    fn tier(name: &str, quantity: u32, runner_up_count: Option<u32>) -> PrizeTier {
        PrizeTier {
            id: Uuid::new_v4(),
            name: name.into(),
            value: 1_000_000,
            quantity,
            runner_up_count,
        }
    }

    #[test]
    fn test_seed_hex_roundtrip() {
        let seed = DrawSeed::generate();
        assert_eq!(DrawSeed::from_hex(&seed.to_hex()).unwrap(), seed);
        assert!(DrawSeed::from_hex("abcd").is_err());
        assert!(DrawSeed::from_hex("not hex").is_err());
    }

    #[test]
    fn test_tiers_filled_without_repeats() {
        let pool = pool(40);
        let tiers = vec![
            tier("Jackpot", 1, None),
            tier("Second", 3, None),
            tier("Third", 10, Some(4)),
        ];
        let mut rng = DrawSeed::from_bytes([7u8; 32]).rng();
        let selection =
            select_winners(&pool, &tiers, SelectionStrategy::TicketShuffle, &mut rng).unwrap();

        assert_eq!(selection.winner_count(), 14);
        assert_eq!(selection.tiers[0].runner_ups.len(), 1);
        assert_eq!(selection.tiers[1].runner_ups.len(), 1);
        assert_eq!(selection.tiers[2].runner_ups.len(), 4);

        let mut seen = HashSet::new();
        for t in &selection.tiers {
            for m in t.winners.iter().chain(t.runner_ups.iter()) {
                assert!(seen.insert(m.clone()), "{} selected twice", m);
            }
        }
    }

    #[test]
    fn test_insufficient_entries_for_tier() {
        let pool = pool(3);
        let tiers = vec![tier("Big", 1, Some(0)), tier("Small", 5, None)];
        let mut rng = DrawSeed::from_bytes([1u8; 32]).rng();
        let err = select_winners(&pool, &tiers, SelectionStrategy::WeightedKeys, &mut rng)
            .unwrap_err();
        match err {
            DrawError::InsufficientEntriesForTier {
                tier_name,
                required,
                available,
                ..
            } => {
                assert_eq!(tier_name, "Small");
                assert_eq!(required, 5);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_runner_ups_consume_before_later_tiers() {
        // 4 participants: First takes 1 winner and 3 alternates, Second gets nobody
        let pool = pool(4);
        let tiers = vec![tier("First", 1, Some(3)), tier("Second", 2, Some(0))];
        let mut rng = DrawSeed::from_bytes([2u8; 32]).rng();
        let err = select_winners(&pool, &tiers, SelectionStrategy::TicketShuffle, &mut rng)
            .unwrap_err();
        match err {
            DrawError::InsufficientEntriesForTier {
                tier_name,
                required,
                available,
                ..
            } => {
                assert_eq!(tier_name, "Second");
                assert_eq!(required, 2);
                assert_eq!(available, 0);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_runner_up_shortfall_at_pool_end() {
        let pool = pool(4);
        let tiers = vec![tier("First", 2, Some(0)), tier("Second", 1, Some(3))];
        let mut rng = DrawSeed::from_bytes([3u8; 32]).rng();
        let selection =
            select_winners(&pool, &tiers, SelectionStrategy::WeightedKeys, &mut rng).unwrap();

        assert_eq!(selection.tiers[1].winners.len(), 1);
        assert_eq!(selection.tiers[1].runner_ups.len(), 1);
        assert_eq!(selection.tiers[1].runner_up_shortfall(), 2);
    }

    #[test]
    fn test_into_winners_ranks_in_collection_order() {
        let pool = pool(10);
        let tiers = vec![tier("Only", 2, Some(3))];
        let mut rng = DrawSeed::from_bytes([5u8; 32]).rng();
        let selection =
            select_winners(&pool, &tiers, SelectionStrategy::WeightedKeys, &mut rng).unwrap();
        let expected_runner_ups = selection.tiers[0].runner_ups.clone();

        let draw_id = Uuid::new_v4();
        let rows = selection.into_winners(draw_id, Utc::now());
        assert_eq!(rows.len(), 5);
        assert!(rows[..2].iter().all(|w| !w.is_runner_up));

        let ranked: Vec<(u32, String)> = rows[2..]
            .iter()
            .map(|w| (w.runner_up_rank.unwrap(), w.msisdn.clone()))
            .collect();
        assert_eq!(
            ranked,
            expected_runner_ups
                .into_iter()
                .enumerate()
                .map(|(i, m)| (i as u32 + 1, m))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_replay_is_deterministic() {
        let pool = pool(25);
        let tiers = vec![tier("A", 2, None), tier("B", 5, None)];
        let seed = DrawSeed::generate();

        for strategy in [SelectionStrategy::TicketShuffle, SelectionStrategy::WeightedKeys] {
            let first = select_winners(&pool, &tiers, strategy, &mut seed.rng()).unwrap();
            let second = select_winners(&pool, &tiers, strategy, &mut seed.rng()).unwrap();
            assert_eq!(first, second);
        }
    }
}
