//! Error taxonomy for draw operations

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// Result type for draw operations
pub type DrawResult<T> = std::result::Result<T, DrawError>;

/// Coarse error classes a caller layer maps to responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    ResourceExhaustion,
    State,
    NotFound,
    Infrastructure,
}

/// Draw errors
#[derive(Error, Debug)]
pub enum DrawError {
    // ========== Validation ==========
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid draw date {date}: {reason}")]
    InvalidDate { date: NaiveDate, reason: String },

    #[error("prize structure {0} not found")]
    PrizeStructureNotFound(Uuid),

    #[error("prize structure {id} is invalid: {reason}")]
    InvalidPrizeStructure { id: Uuid, reason: String },

    // ========== Conflict ==========
    #[error("a draw already exists for {date}")]
    DrawAlreadyExists { date: NaiveDate },

    // ========== Resource exhaustion ==========
    #[error("no eligible participants for {date}")]
    NoEligibleParticipants { date: NaiveDate },

    #[error("tier '{tier_name}' needs {required} winners but only {available} eligible participants remain")]
    InsufficientEntriesForTier {
        tier_id: Uuid,
        tier_name: String,
        required: u32,
        available: usize,
    },

    // ========== State ==========
    #[error("winner {winner_id} cannot be replaced: {reason}")]
    InvalidReplacementTarget { winner_id: Uuid, reason: String },

    #[error("no runner-ups available to replace winner {winner_id}")]
    NoRunnerUpsAvailable { winner_id: Uuid },

    #[error("winner {winner_id} has already been replaced")]
    WinnerAlreadyReplaced { winner_id: Uuid },

    #[error("runner-up {runner_up_id} is no longer available for promotion")]
    RunnerUpUnavailable { runner_up_id: Uuid },

    #[error("draw {draw_id} is {status}, expected {expected}")]
    InvalidDrawState {
        draw_id: Uuid,
        status: String,
        expected: String,
    },

    #[error("winner {winner_id} cannot receive a payment update: {reason}")]
    InvalidPaymentTarget { winner_id: Uuid, reason: String },

    #[error("payment for winner {winner_id} is already settled")]
    PaymentAlreadySettled { winner_id: Uuid },

    #[error("winner {winner_id} was modified concurrently")]
    StaleState { winner_id: Uuid },

    // ========== Not found ==========
    #[error("draw {0} not found")]
    DrawNotFound(Uuid),

    #[error("winner {0} not found")]
    WinnerNotFound(Uuid),

    // ========== Infrastructure ==========
    #[error("storage error: {0}")]
    Storage(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl DrawError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DrawError::InvalidInput(_)
            | DrawError::InvalidDate { .. }
            | DrawError::PrizeStructureNotFound(_)
            | DrawError::InvalidPrizeStructure { .. } => ErrorKind::Validation,
            DrawError::DrawAlreadyExists { .. } => ErrorKind::Conflict,
            DrawError::NoEligibleParticipants { .. }
            | DrawError::InsufficientEntriesForTier { .. } => ErrorKind::ResourceExhaustion,
            DrawError::InvalidReplacementTarget { .. }
            | DrawError::NoRunnerUpsAvailable { .. }
            | DrawError::WinnerAlreadyReplaced { .. }
            | DrawError::RunnerUpUnavailable { .. }
            | DrawError::InvalidDrawState { .. }
            | DrawError::InvalidPaymentTarget { .. }
            | DrawError::PaymentAlreadySettled { .. }
            | DrawError::StaleState { .. } => ErrorKind::State,
            DrawError::DrawNotFound(_) | DrawError::WinnerNotFound(_) => ErrorKind::NotFound,
            DrawError::Storage(_) | DrawError::Provider(_) => ErrorKind::Infrastructure,
        }
    }

    /// Wrap a storage-layer failure
    pub fn storage(err: impl std::fmt::Display) -> Self {
        DrawError::Storage(err.to_string())
    }

    /// Wrap a collaborator failure (eligibility, prize structures)
    pub fn provider(err: impl std::fmt::Display) -> Self {
        DrawError::Provider(err.to_string())
    }
}
