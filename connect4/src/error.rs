use thiserror::Error;

use crate::{GameStatus, Player};

/// Recoverable outcomes of board, lifecycle and search calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("column {column} is out of bounds (board has {columns} columns)")]
    InvalidColumn { column: usize, columns: usize },
    #[error("column {column} is full")]
    ColumnFull { column: usize },
    #[error("invalid move at column {column}, row {row}: {reason}")]
    InvalidMove {
        column: usize,
        row: usize,
        reason: &'static str,
    },
    #[error("it is {expected}'s turn")]
    NotYourTurn { expected: Player },
    #[error("game is not in progress (status: {status})")]
    GameNotInProgress { status: GameStatus },
    #[error("no moves to undo")]
    NoMovesToUndo,
    #[error("move at column {column}, row {row} cannot be undone")]
    CannotUndoMove { column: usize, row: usize },
    #[error("depth {0} is out of range (1-15)")]
    DepthOutOfRange(u8),
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl GameError {
    /// Stable name reported to callers alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            GameError::InvalidColumn { .. } => "InvalidColumn",
            GameError::ColumnFull { .. } => "ColumnFull",
            GameError::InvalidMove { .. } => "InvalidMove",
            GameError::NotYourTurn { .. } => "NotYourTurn",
            GameError::GameNotInProgress { .. } => "GameNotInProgress",
            GameError::NoMovesToUndo => "NoMovesToUndo",
            GameError::CannotUndoMove { .. } => "CannotUndoMove",
            GameError::DepthOutOfRange(_) => "DepthOutOfRange",
            GameError::CorruptSnapshot(_) => "CorruptSnapshot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("config validation error: {0}")]
    Validation(String),
}
