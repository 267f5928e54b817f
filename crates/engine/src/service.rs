//! DrawService - the operations exposed to callers

use crate::audit::AuditRecorder;
use crate::config::{ConfigError, EngineConfig};
use crate::orchestrator::DrawOrchestrator;
use crate::payment::PaymentWorkflow;
use crate::runner_up::RunnerUpInvoker;
use crate::verify::{DrawVerifier, VerificationReport};
use chrono::NaiveDate;
use draw_core::{
    AuditSink, Draw, DrawOutcome, DrawResult, EligibilityProvider, PaymentUpdate,
    PersistenceGateway, PrizeStructureProvider, Replacement, Winner,
};
use std::sync::Arc;
use uuid::Uuid;

pub struct DrawService {
    orchestrator: DrawOrchestrator,
    runner_up: RunnerUpInvoker,
    payment: PaymentWorkflow,
    verifier: DrawVerifier,
    store: Arc<dyn PersistenceGateway>,
}

impl DrawService {
    pub fn new(
        config: EngineConfig,
        eligibility: Arc<dyn EligibilityProvider>,
        prizes: Arc<dyn PrizeStructureProvider>,
        store: Arc<dyn PersistenceGateway>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let audit = AuditRecorder::new(audit_sink);
        let runner_up = RunnerUpInvoker::new(
            store.clone(),
            audit.clone(),
            config.replacement_retry_limit,
        );
        let payment = PaymentWorkflow::new(store.clone(), audit.clone());
        let verifier = DrawVerifier::new(eligibility.clone(), prizes.clone(), store.clone());
        let orchestrator =
            DrawOrchestrator::new(eligibility, prizes, store.clone(), audit, config);

        Ok(Self {
            orchestrator,
            runner_up,
            payment,
            verifier,
            store,
        })
    }

    /// Create and run the draw for a date
    pub async fn execute_draw(
        &self,
        date: NaiveDate,
        prize_structure_id: Uuid,
        executed_by: &str,
    ) -> DrawResult<DrawOutcome> {
        self.orchestrator
            .execute(date, prize_structure_id, executed_by)
            .await
    }

    /// Replace a winner with the next runner-up of its tier
    pub async fn invoke_runner_up(
        &self,
        winner_id: Uuid,
        reason: &str,
        actor: &str,
    ) -> DrawResult<Replacement> {
        self.runner_up.invoke(winner_id, reason, actor).await
    }

    pub async fn update_winner_payment_status(
        &self,
        winner_id: Uuid,
        update: PaymentUpdate,
        actor: &str,
    ) -> DrawResult<Winner> {
        self.payment.update(winner_id, update, actor).await
    }

    /// Replay a completed draw and compare it with the stored winners
    pub async fn verify_draw(&self, draw_id: Uuid) -> DrawResult<VerificationReport> {
        self.verifier.verify(draw_id).await
    }

    pub async fn get_draw(&self, draw_id: Uuid) -> DrawResult<Option<Draw>> {
        self.store.get_draw(draw_id).await
    }

    pub async fn get_draw_by_date(&self, date: NaiveDate) -> DrawResult<Option<Draw>> {
        self.store.get_draw_by_date(date).await
    }

    pub async fn list_winners(&self, draw_id: Uuid) -> DrawResult<Vec<Winner>> {
        self.store.list_winners(draw_id).await
    }
}
