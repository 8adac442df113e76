//! Connect 4 engine with Minimax and alpha-beta search.
//!
//! A [`Game`] owns one [`GridBoard`] and drives it through validated moves and
//! undos, reporting follow-up work (AI replies, finished results) back to the
//! caller instead of performing it. Search walks hypothetical futures on that
//! same board through drop/undo, so positions are never cloned per node.
use std::fmt;

use serde::{Deserialize, Serialize};

mod board;
pub mod config;
mod error;
pub mod eval;
mod game;
pub mod search;
pub mod win;

pub use board::{GridBoard, PlayedMove, Position, WireGrid};
pub use config::{Difficulty, EngineConfig};
pub use error::{ConfigError, GameError};
pub use game::{
    FirstTurn, FollowUp, Game, GameSnapshot, GameStatus, MoveOutcome, MoveRecord, Participant,
    UndoOutcome,
};
pub use search::{Algorithm, CancelToken, Score, SearchEngine, SearchLimits, SearchOutcome};

/// Run length needed to win on a standard board.
pub const CONNECT: usize = 4;
pub const DEFAULT_ROWS: usize = 6;
pub const DEFAULT_COLUMNS: usize = 7;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    One,
    Two,
}

impl Player {
    pub(crate) fn idx(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }

    pub fn opponent(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Token value used in the wire grid.
    pub fn token(self) -> u8 {
        match self {
            Player::One => 1,
            Player::Two => 2,
        }
    }

    pub fn from_token(token: u8) -> Option<Player> {
        match token {
            1 => Some(Player::One),
            2 => Some(Player::Two),
            _ => None,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::One => f.write_str("player one"),
            Player::Two => f.write_str("player two"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip() {
        for player in [Player::One, Player::Two] {
            assert_eq!(Player::from_token(player.token()), Some(player));
            assert_eq!(player.opponent().opponent(), player);
        }
        assert_eq!(Player::from_token(0), None);
        assert_eq!(Player::from_token(3), None);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Player::Two).unwrap(), "\"two\"");
    }
}
