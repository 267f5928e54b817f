//! Shared doubles for engine integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use draw_core::{
    AuditAction, AuditRecord, AuditSink, Draw, DrawError, DrawResult, EligibilityProvider,
    EligibilitySnapshot, EligibleEntry, NewDraw, PaymentChange, PersistenceGateway,
    PrizeStructure, PrizeStructureProvider, PrizeTier, Replacement, ReplacementRequest, Winner,
};
use draw_engine::{DrawService, EngineConfig, MemoryStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

pub fn entries(pairs: &[(&str, u64)]) -> Vec<EligibleEntry> {
    pairs
        .iter()
        .map(|(m, w)| EligibleEntry::new(*m, *w))
        .collect()
}

/// `n` participants with weights cycling 1..=3
pub fn many_entries(n: usize) -> Vec<EligibleEntry> {
    (0..n)
        .map(|i| EligibleEntry::new(format!("23480{:08}", i), 1 + (i as u64 % 3)))
        .collect()
}

pub fn tier(name: &str, quantity: u32, runner_up_count: Option<u32>) -> PrizeTier {
    PrizeTier {
        id: Uuid::new_v4(),
        name: name.to_string(),
        value: 10_000_000,
        quantity,
        runner_up_count,
    }
}

pub fn structure(tiers: Vec<PrizeTier>) -> PrizeStructure {
    PrizeStructure {
        id: Uuid::new_v4(),
        name: "Daily draw".to_string(),
        tiers,
    }
}

/// Eligibility by date
#[derive(Default)]
pub struct StaticEligibility {
    by_date: Mutex<HashMap<NaiveDate, Vec<EligibleEntry>>>,
}

impl StaticEligibility {
    pub fn set(&self, date: NaiveDate, entries: Vec<EligibleEntry>) {
        self.by_date.lock().insert(date, entries);
    }
}

#[async_trait]
impl EligibilityProvider for StaticEligibility {
    async fn eligible_entries(&self, date: NaiveDate) -> anyhow::Result<EligibilitySnapshot> {
        let entries = self.by_date.lock().get(&date).cloned().unwrap_or_default();
        Ok(EligibilitySnapshot::from_entries(entries))
    }
}

#[derive(Default)]
pub struct StaticPrizes {
    structures: Mutex<HashMap<Uuid, PrizeStructure>>,
}

impl StaticPrizes {
    pub fn add(&self, structure: PrizeStructure) -> Uuid {
        let id = structure.id;
        self.structures.lock().insert(id, structure);
        id
    }
}

#[async_trait]
impl PrizeStructureProvider for StaticPrizes {
    async fn prize_structure(&self, id: Uuid) -> anyhow::Result<Option<PrizeStructure>> {
        Ok(self.structures.lock().get(&id).cloned())
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.action == action)
            .count()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: &AuditRecord) -> anyhow::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _record: &AuditRecord) -> anyhow::Result<()> {
        anyhow::bail!("audit store offline")
    }
}

/// Delegates to a MemoryStore, with switchable faults
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_completion: AtomicBool,
    /// Before the next replacement, hand its runner-up to `steal_for`
    pub steal_for: Mutex<Option<Uuid>>,
}

#[async_trait]
impl PersistenceGateway for FaultyStore {
    async fn create_draw(&self, draw: NewDraw) -> DrawResult<Draw> {
        self.inner.create_draw(draw).await
    }

    async fn complete_draw_with_winners(
        &self,
        draw_id: Uuid,
        winners: &[Winner],
    ) -> DrawResult<Draw> {
        if self.fail_completion.load(Ordering::SeqCst) {
            return Err(DrawError::storage("connection reset during commit"));
        }
        self.inner.complete_draw_with_winners(draw_id, winners).await
    }

    async fn mark_draw_failed(&self, draw_id: Uuid, reason: &str) -> DrawResult<Draw> {
        self.inner.mark_draw_failed(draw_id, reason).await
    }

    async fn get_draw(&self, draw_id: Uuid) -> DrawResult<Option<Draw>> {
        self.inner.get_draw(draw_id).await
    }

    async fn get_draw_by_date(&self, date: NaiveDate) -> DrawResult<Option<Draw>> {
        self.inner.get_draw_by_date(date).await
    }

    async fn list_winners(&self, draw_id: Uuid) -> DrawResult<Vec<Winner>> {
        self.inner.list_winners(draw_id).await
    }

    async fn get_winner(&self, winner_id: Uuid) -> DrawResult<Option<Winner>> {
        self.inner.get_winner(winner_id).await
    }

    async fn list_runner_ups(
        &self,
        draw_id: Uuid,
        prize_tier_id: Uuid,
    ) -> DrawResult<Vec<Winner>> {
        self.inner.list_runner_ups(draw_id, prize_tier_id).await
    }

    async fn replace_winner_atomic(&self, request: &ReplacementRequest) -> DrawResult<Replacement> {
        let thief = self.steal_for.lock().take();
        if let Some(other) = thief {
            let stolen = ReplacementRequest {
                original_id: other,
                promoted_id: request.promoted_id,
                reason: "concurrent invocation".to_string(),
                actor: "someone-else".to_string(),
            };
            self.inner.replace_winner_atomic(&stolen).await?;
        }
        self.inner.replace_winner_atomic(request).await
    }

    async fn set_payment_status(&self, change: &PaymentChange) -> DrawResult<Winner> {
        self.inner.set_payment_status(change).await
    }
}

/// Service over in-memory collaborators, with handles to each
pub struct Harness {
    pub service: DrawService,
    pub eligibility: Arc<StaticEligibility>,
    pub prizes: Arc<StaticPrizes>,
    pub store: Arc<FaultyStore>,
    pub audit: Arc<RecordingAuditSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let eligibility = Arc::new(StaticEligibility::default());
        let prizes = Arc::new(StaticPrizes::default());
        let store = Arc::new(FaultyStore::default());
        let audit = Arc::new(RecordingAuditSink::default());
        let service = DrawService::new(
            config,
            eligibility.clone(),
            prizes.clone(),
            store.clone(),
            audit.clone(),
        )
        .unwrap();
        Self {
            service,
            eligibility,
            prizes,
            store,
            audit,
        }
    }
}
