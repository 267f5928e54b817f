//! Winner row transitions shared by every `PersistenceGateway`
//!
//! Gateways call these while holding their lock (or row locks), so the checks
//! and the write observe the same state.

use crate::error::{DrawError, DrawResult};
use crate::types::{PaymentStatus, Replacement, Winner, WinnerStatus};
use chrono::{DateTime, Utc};

/// Primary winners not yet confirmed, replaced or paid
pub fn check_replaceable(winner: &Winner) -> DrawResult<()> {
    if winner.is_runner_up {
        return Err(DrawError::InvalidReplacementTarget {
            winner_id: winner.id,
            reason: "runner-up rows cannot be replaced".into(),
        });
    }
    if winner.status == WinnerStatus::Replaced {
        return Err(DrawError::WinnerAlreadyReplaced {
            winner_id: winner.id,
        });
    }
    if !winner.status.is_replaceable() {
        return Err(DrawError::InvalidReplacementTarget {
            winner_id: winner.id,
            reason: format!("winner is {}", winner.status),
        });
    }
    if winner.payment_status == PaymentStatus::Paid {
        return Err(DrawError::InvalidReplacementTarget {
            winner_id: winner.id,
            reason: "prize already paid".into(),
        });
    }
    Ok(())
}

/// The runner-up must still be waiting, in the same draw and tier
pub fn check_promotable(original: &Winner, promoted: &Winner) -> DrawResult<()> {
    if !promoted.is_runner_up
        || promoted.status != WinnerStatus::PendingNotification
        || promoted.draw_id != original.draw_id
        || promoted.prize_tier_id != original.prize_tier_id
    {
        return Err(DrawError::RunnerUpUnavailable {
            runner_up_id: promoted.id,
        });
    }
    Ok(())
}

/// Only primary winners that still hold their prize take payment updates
pub fn check_payable(winner: &Winner) -> DrawResult<()> {
    if winner.is_runner_up {
        return Err(DrawError::InvalidPaymentTarget {
            winner_id: winner.id,
            reason: "runner-ups are not paid until promoted".into(),
        });
    }
    if winner.status == WinnerStatus::Replaced {
        return Err(DrawError::WinnerAlreadyReplaced {
            winner_id: winner.id,
        });
    }
    Ok(())
}

/// Check both rows and produce their replaced / promoted versions
pub fn apply_replacement(
    original: &Winner,
    promoted: &Winner,
    reason: &str,
    now: DateTime<Utc>,
) -> DrawResult<Replacement> {
    check_replaceable(original)?;
    check_promotable(original, promoted)?;

    let mut original = original.clone();
    original.status = WinnerStatus::Replaced;
    original.replaced_by = Some(promoted.id);
    original.replacement_reason = Some(reason.to_string());
    original.updated_at = now;

    let mut promoted = promoted.clone();
    promoted.is_runner_up = false;
    promoted.status = WinnerStatus::PendingNotification;
    promoted.updated_at = now;

    Ok(Replacement { original, promoted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn winner() -> Winner {
        Winner::primary(Uuid::new_v4(), Uuid::new_v4(), "2348031111111", Utc::now())
    }

    #[test]
    fn test_check_replaceable() {
        assert!(check_replaceable(&winner()).is_ok());

        let mut notified = winner();
        notified.status = WinnerStatus::Notified;
        assert!(check_replaceable(&notified).is_ok());

        let mut failed_payment = winner();
        failed_payment.payment_status = PaymentStatus::Failed;
        assert!(check_replaceable(&failed_payment).is_ok());

        let mut replaced = winner();
        replaced.status = WinnerStatus::Replaced;
        assert!(matches!(
            check_replaceable(&replaced),
            Err(DrawError::WinnerAlreadyReplaced { .. })
        ));

        let mut confirmed = winner();
        confirmed.status = WinnerStatus::Confirmed;
        assert!(matches!(
            check_replaceable(&confirmed),
            Err(DrawError::InvalidReplacementTarget { .. })
        ));

        let mut paid = winner();
        paid.payment_status = PaymentStatus::Paid;
        assert!(matches!(
            check_replaceable(&paid),
            Err(DrawError::InvalidReplacementTarget { .. })
        ));

        let runner_up =
            Winner::runner_up(Uuid::new_v4(), Uuid::new_v4(), "2348032222222", 1, Utc::now());
        assert!(matches!(
            check_replaceable(&runner_up),
            Err(DrawError::InvalidReplacementTarget { .. })
        ));
    }

    #[test]
    fn test_apply_replacement() {
        let original = winner();
        let runner_up = Winner::runner_up(
            original.draw_id,
            original.prize_tier_id,
            "2348033333333",
            1,
            Utc::now(),
        );

        let replacement =
            apply_replacement(&original, &runner_up, "unreachable", Utc::now()).unwrap();
        assert_eq!(replacement.original.status, WinnerStatus::Replaced);
        assert_eq!(replacement.original.replaced_by, Some(runner_up.id));
        assert_eq!(
            replacement.original.replacement_reason.as_deref(),
            Some("unreachable")
        );
        assert!(!replacement.promoted.is_runner_up);
        assert_eq!(replacement.promoted.runner_up_rank, Some(1));

        // already promoted
        let err = apply_replacement(&winner(), &replacement.promoted, "again", Utc::now())
            .unwrap_err();
        assert!(matches!(err, DrawError::RunnerUpUnavailable { .. }));
    }

    #[test]
    fn test_promotion_stays_within_tier() {
        let original = winner();
        let other_tier =
            Winner::runner_up(original.draw_id, Uuid::new_v4(), "2348034444444", 1, Utc::now());
        assert!(matches!(
            check_promotable(&original, &other_tier),
            Err(DrawError::RunnerUpUnavailable { .. })
        ));
    }

    #[test]
    fn test_check_payable() {
        assert!(check_payable(&winner()).is_ok());

        let mut promoted =
            Winner::runner_up(Uuid::new_v4(), Uuid::new_v4(), "2348035555555", 2, Utc::now());
        assert!(matches!(
            check_payable(&promoted),
            Err(DrawError::InvalidPaymentTarget { .. })
        ));
        promoted.is_runner_up = false;
        assert!(check_payable(&promoted).is_ok());

        let mut replaced = winner();
        replaced.status = WinnerStatus::Replaced;
        assert!(matches!(
            check_payable(&replaced),
            Err(DrawError::WinnerAlreadyReplaced { .. })
        ));
    }
}
