//! Entry pool
//!
//! Canonical, msisdn-sorted view of the eligible entries for one draw date,
//! plus the two weighted orderings the selector draws from.

use chrono::NaiveDate;
use draw_core::{DrawError, DrawResult, EligibleEntry, SelectionStrategy};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Canonical weighted participant pool
#[derive(Debug, Clone)]
pub struct EntryPool {
    entries: Vec<EligibleEntry>,
    total_weight: u64,
}

impl EntryPool {
    /// Trim msisdns, merge duplicates, drop zero weights and sort.
    ///
    /// Fails with `NoEligibleParticipants` when nothing with a positive weight
    /// is left.
    pub fn build(date: NaiveDate, entries: Vec<EligibleEntry>) -> DrawResult<Self> {
        let mut merged: BTreeMap<String, u64> = BTreeMap::new();

        for entry in entries {
            let msisdn = entry.msisdn.trim();
            if msisdn.is_empty() {
                return Err(DrawError::InvalidInput(
                    "eligible entry with blank msisdn".to_string(),
                ));
            }
            if entry.weight == 0 {
                continue;
            }
            let slot = merged.entry(msisdn.to_string()).or_insert(0);
            *slot = slot.checked_add(entry.weight).ok_or_else(|| {
                DrawError::InvalidInput(format!("entry weight overflow for {}", msisdn))
            })?;
        }

        let entries: Vec<EligibleEntry> = merged
            .into_iter()
            .map(|(msisdn, weight)| EligibleEntry { msisdn, weight })
            .collect();

        if entries.is_empty() {
            return Err(DrawError::NoEligibleParticipants { date });
        }

        let mut total_weight: u64 = 0;
        for entry in &entries {
            total_weight = total_weight.checked_add(entry.weight).ok_or_else(|| {
                DrawError::InvalidInput("total entry weight overflows".to_string())
            })?;
        }

        Ok(Self {
            entries,
            total_weight,
        })
    }

    pub fn entries(&self) -> &[EligibleEntry] {
        &self.entries
    }

    pub fn participants(&self) -> usize {
        self.entries.len()
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn msisdn(&self, index: usize) -> &str {
        &self.entries[index].msisdn
    }

    /// Shuffle tickets while the pool fits in memory, weighted keys above
    pub fn strategy_for(&self, max_materialized_entries: u64) -> SelectionStrategy {
        if self.total_weight <= max_materialized_entries
            && self.entries.len() <= u32::MAX as usize
        {
            SelectionStrategy::TicketShuffle
        } else {
            SelectionStrategy::WeightedKeys
        }
    }

    /// SHA-256 over the canonical pool, hex encoded
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.msisdn.as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.weight.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Weighted random ordering of distinct participant indices.
    ///
    /// Every participant appears exactly once; the first position is taken
    /// by participant i with probability weight_i / total_weight.
    pub fn weighted_order(
        &self,
        strategy: SelectionStrategy,
        rng: &mut ChaCha20Rng,
    ) -> Vec<usize> {
        match strategy {
            SelectionStrategy::TicketShuffle => self.shuffle_tickets(rng),
            SelectionStrategy::WeightedKeys => self.weighted_keys(rng),
        }
    }

    fn shuffle_tickets(&self, rng: &mut ChaCha20Rng) -> Vec<usize> {
        let mut tickets: Vec<u32> = Vec::with_capacity(self.total_weight as usize);
        for (index, entry) in self.entries.iter().enumerate() {
            let owner = index as u32;
            tickets.extend(std::iter::repeat(owner).take(entry.weight as usize));
        }
        tickets.shuffle(rng);

        let mut seen = vec![false; self.entries.len()];
        let mut order = Vec::with_capacity(self.entries.len());
        for ticket in tickets {
            let owner = ticket as usize;
            if !seen[owner] {
                seen[owner] = true;
                order.push(owner);
                if order.len() == self.entries.len() {
                    break;
                }
            }
        }
        order
    }

    // Efraimidis-Spirakis: key = ln(u) / w, largest key first
    fn weighted_keys(&self, rng: &mut ChaCha20Rng) -> Vec<usize> {
        let mut keyed: Vec<(f64, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                // 1 - [0, 1) keeps ln() finite
                let u: f64 = 1.0 - rng.gen::<f64>();
                (u.ln() / entry.weight as f64, index)
            })
            .collect();

        keyed.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        keyed.into_iter().map(|(_, index)| index).collect()
    }
}
