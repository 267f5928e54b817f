//! Replaying completed draws

mod common;

use common::*;
use draw_core::{DrawError, SelectionStrategy};
use draw_engine::EngineConfig;

/// A completed draw replays to the same assignment, even after a replacement
#[tokio::test]
async fn test_verify_matches_after_replacement() {
    let h = Harness::new();
    h.eligibility.set(date(14), many_entries(40));
    let structure_id = h.prizes.add(structure(vec![
        tier("Jackpot", 1, Some(2)),
        tier("Airtime", 6, None),
    ]));

    let outcome = h
        .service
        .execute_draw(date(14), structure_id, "ops")
        .await
        .unwrap();
    let winner = outcome.primary_winners().next().unwrap().id;
    h.service
        .invoke_runner_up(winner, "duplicate account", "ops")
        .await
        .unwrap();

    let report = h.service.verify_draw(outcome.draw.id).await.unwrap();
    assert!(report.is_match(), "mismatches: {:?}", report.mismatches);
    assert_eq!(report.tiers.len(), 2);
    assert_eq!(report.recorded_digest, report.computed_digest);
}

/// Changed eligibility shows up as a digest mismatch
#[tokio::test]
async fn test_verify_reports_changed_pool() {
    let h = Harness::new();
    h.eligibility.set(date(15), many_entries(20));
    let structure_id = h.prizes.add(structure(vec![tier("Cash", 3, None)]));

    let outcome = h
        .service
        .execute_draw(date(15), structure_id, "ops")
        .await
        .unwrap();

    let mut changed = many_entries(20);
    changed[0].weight += 7;
    h.eligibility.set(date(15), changed);

    let report = h.service.verify_draw(outcome.draw.id).await.unwrap();
    assert!(!report.is_match());
    assert!(report.mismatches.iter().any(|m| m.contains("digest")));
}

/// Only completed draws can be verified
#[tokio::test]
async fn test_verify_requires_completed_draw() {
    let h = Harness::new();
    h.eligibility.set(date(16), many_entries(2));
    let structure_id = h.prizes.add(structure(vec![tier("Cash", 5, None)]));

    assert!(h
        .service
        .execute_draw(date(16), structure_id, "ops")
        .await
        .is_err());
    let draw = h.service.get_draw_by_date(date(16)).await.unwrap().unwrap();

    let err = h.service.verify_draw(draw.id).await.unwrap_err();
    assert!(matches!(err, DrawError::InvalidDrawState { .. }));

    let err = h
        .service
        .verify_draw(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, DrawError::DrawNotFound(_)));
}

/// A pinned seed reproduces the same winners on the same pool
#[tokio::test]
async fn test_fixed_seed_reproduces_assignment() {
    let seed = "3c".repeat(32);
    let config = EngineConfig {
        fixed_seed: Some(seed.clone()),
        ..Default::default()
    };

    let mut assignments = Vec::new();
    for day in [17, 18] {
        let h = Harness::with_config(config.clone());
        h.eligibility.set(date(day), many_entries(25));
        let structure_id = h.prizes.add(structure(vec![tier("Cash", 4, Some(2))]));
        let outcome = h
            .service
            .execute_draw(date(day), structure_id, "ops")
            .await
            .unwrap();
        assert_eq!(outcome.draw.seed.as_deref(), Some(seed.as_str()));
        assignments.push(
            outcome
                .winners
                .iter()
                .map(|w| (w.msisdn.clone(), w.runner_up_rank))
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(assignments[0], assignments[1]);
}

/// Pools above the materialisation limit use weighted keys and still verify
#[tokio::test]
async fn test_weighted_keys_strategy_recorded() {
    let config = EngineConfig {
        max_materialized_entries: 10,
        ..Default::default()
    };
    let h = Harness::with_config(config);
    h.eligibility.set(date(19), many_entries(30));
    let structure_id = h.prizes.add(structure(vec![tier("Cash", 3, None)]));

    let outcome = h
        .service
        .execute_draw(date(19), structure_id, "ops")
        .await
        .unwrap();
    assert_eq!(outcome.draw.strategy, Some(SelectionStrategy::WeightedKeys));

    let report = h.service.verify_draw(outcome.draw.id).await.unwrap();
    assert!(report.is_match());
}
