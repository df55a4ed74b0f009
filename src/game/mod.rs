//! Board game rules: marking, win detection, phase unlocks and settlement

pub mod engine;
pub mod phase;
pub mod types;

pub use engine::Game;
pub use types::{
    Board, Cell, Color, GameStatus, Line, PhaseConfig, PhaseConfigPatch, Position, Rule,
    WinReason, Winner, BOARD_SIZE, CELL_COUNT, LAST_ROW,
};

use crate::error::ErrorKind;

/// Rule engine errors. A failed operation leaves the game unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("invalid cell position ({row}, {col})")]
    InvalidPosition { row: i64, col: i64 },

    #[error("color must be red or blue")]
    InvalidColor,

    #[error("game has not started")]
    NotStarted,

    #[error("game already finished")]
    AlreadyFinished,

    #[error("game already in progress")]
    AlreadyInProgress,

    #[error("cell already marked")]
    AlreadyMarked,

    #[error("color already marked this cell")]
    AlreadyClaimed,

    #[error("row is locked")]
    RowLocked,

    #[error("row mark limit exceeded")]
    RowLimitExceeded,

    #[error("player already settled")]
    AlreadySettled,

    #[error("need at least 2 cells in the last row to settle")]
    CannotSettleYet,

    #[error("settlement only exists under the phase rule")]
    SettlementUnavailable,

    #[error("forced marks are not allowed under the phase rule")]
    ForceNotAllowed,

    #[error("expected exactly {expected} cell texts, got {got}")]
    InvalidTextCount { expected: usize, got: usize },
}

impl GameError {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidPosition { .. } => "invalid_position",
            GameError::InvalidColor => "invalid_color",
            GameError::NotStarted => "game_not_started",
            GameError::AlreadyFinished => "game_finished",
            GameError::AlreadyInProgress => "game_in_progress",
            GameError::AlreadyMarked => "cell_already_marked",
            GameError::AlreadyClaimed => "cell_already_claimed",
            GameError::RowLocked => "row_locked",
            GameError::RowLimitExceeded => "row_limit_exceeded",
            GameError::AlreadySettled => "already_settled",
            GameError::CannotSettleYet => "cannot_settle_yet",
            GameError::SettlementUnavailable => "settlement_unavailable",
            GameError::ForceNotAllowed => "force_not_allowed",
            GameError::InvalidTextCount { .. } => "invalid_text_count",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::InvalidPosition { .. }
            | GameError::InvalidColor
            | GameError::InvalidTextCount { .. } => ErrorKind::Validation,
            _ => ErrorKind::State,
        }
    }
}
