//! PostgreSQL-backed collaborators: eligibility, prize structures, audit sink

use crate::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use draw_core::{
    AuditRecord, AuditSink, EligibilityProvider, EligibilitySnapshot, EligibleEntry,
    PrizeStructure, PrizeStructureProvider, PrizeTier,
};
use tracing::debug;
use uuid::Uuid;

/// Minor currency units per draw entry when not configured
pub const DEFAULT_RECHARGE_PER_ENTRY: i64 = 10_000;

// ============================================================================
// ELIGIBILITY
// ============================================================================

/// Sums a day's recharges per msisdn and converts them to entries
pub struct PgEligibility {
    pool: DbPool,
    recharge_per_entry: i64,
}

impl PgEligibility {
    pub fn new(pool: DbPool, recharge_per_entry: i64) -> anyhow::Result<Self> {
        if recharge_per_entry <= 0 {
            anyhow::bail!("recharge_per_entry must be > 0");
        }
        Ok(Self {
            pool,
            recharge_per_entry,
        })
    }
}

/// [start, end) of a UTC calendar day
pub fn utc_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// entries = floor(total / recharge_per_entry); zero-entry msisdns are dropped
pub fn entries_from_totals(totals: Vec<(String, i64)>, recharge_per_entry: i64) -> Vec<EligibleEntry> {
    totals
        .into_iter()
        .filter(|(_, total)| *total > 0)
        .map(|(msisdn, total)| EligibleEntry::new(msisdn, (total / recharge_per_entry) as u64))
        .filter(|e| e.weight > 0)
        .collect()
}

#[async_trait]
impl EligibilityProvider for PgEligibility {
    async fn eligible_entries(&self, date: NaiveDate) -> anyhow::Result<EligibilitySnapshot> {
        let (start, end) = utc_day_bounds(date);
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT msisdn, SUM(amount)::BIGINT
                 FROM recharges
                 WHERE recharged_at >= $1 AND recharged_at < $2
                 GROUP BY msisdn",
                &[&start, &end],
            )
            .await?;

        let totals: Vec<(String, i64)> = rows
            .iter()
            .map(|row| (row.get(0), row.get(1)))
            .collect();
        let recharging = totals.len();
        let entries = entries_from_totals(totals, self.recharge_per_entry);

        debug!(
            date = %date,
            recharging,
            eligible = entries.len(),
            "Eligibility aggregated"
        );
        Ok(EligibilitySnapshot::from_entries(entries))
    }
}

// ============================================================================
// PRIZE STRUCTURES
// ============================================================================

pub struct PgPrizeStructures {
    pool: DbPool,
}

impl PgPrizeStructures {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrizeStructureProvider for PgPrizeStructures {
    async fn prize_structure(&self, id: Uuid) -> anyhow::Result<Option<PrizeStructure>> {
        let client = self.pool.get().await?;
        let Some(header) = client
            .query_opt(
                "SELECT name FROM prize_structures WHERE id = $1",
                &[&id],
            )
            .await?
        else {
            return Ok(None);
        };

        let rows = client
            .query(
                "SELECT id, name, value, quantity, runner_up_count
                 FROM prize_tiers WHERE prize_structure_id = $1
                 ORDER BY position",
                &[&id],
            )
            .await?;

        let tiers = rows
            .iter()
            .map(|row| PrizeTier {
                id: row.get(0),
                name: row.get(1),
                value: row.get(2),
                quantity: row.get::<_, i32>(3) as u32,
                runner_up_count: row.get::<_, Option<i32>>(4).map(|c| c as u32),
            })
            .collect();

        Ok(Some(PrizeStructure {
            id,
            name: header.get(0),
            tiers,
        }))
    }
}

// ============================================================================
// AUDIT
// ============================================================================

pub struct PgAuditSink {
    pool: DbPool,
}

impl PgAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO audit_events (action, entity_type, entity_id, actor, summary, detail)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &record.action.to_string(),
                    &record.entity_type,
                    &record.entity_id,
                    &record.actor,
                    &record.summary,
                    &record.detail,
                ],
            )
            .await?;
        Ok(())
    }
}
