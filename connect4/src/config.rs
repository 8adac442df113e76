//! Engine configuration: board geometry, per-algorithm depths and search
//! policies. Deserialises with every field optional.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::eval::EvalWeights;
use crate::search::{Algorithm, MoveOrder, SearchEngine, SearchLimits, TieBreak};
use crate::{ConfigError, GridBoard, CONNECT, DEFAULT_COLUMNS, DEFAULT_ROWS};

pub const MAX_DEPTH: u8 = 15;
pub const MAX_DIMENSION: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rows: usize,
    pub columns: usize,
    pub connect: usize,
    pub minimax_depth: u8,
    pub alpha_beta_depth: u8,
    pub tie_break: TieBreak,
    pub move_order: MoveOrder,
    pub time_limit_ms: Option<u64>,
    pub node_budget: Option<u64>,
    pub weights: EvalWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            columns: DEFAULT_COLUMNS,
            connect: CONNECT,
            minimax_depth: 4,
            alpha_beta_depth: 6,
            tie_break: TieBreak::default(),
            move_order: MoveOrder::default(),
            time_limit_ms: None,
            node_budget: None,
            weights: EvalWeights::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("rows", self.rows), ("columns", self.columns)] {
            if !(1..=MAX_DIMENSION).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be in [1, {MAX_DIMENSION}]"
                )));
            }
        }
        if self.connect < 3 {
            return Err(ConfigError::Validation("connect must be >= 3".into()));
        }
        for (name, depth) in [
            ("minimax_depth", self.minimax_depth),
            ("alpha_beta_depth", self.alpha_beta_depth),
        ] {
            if !(1..=MAX_DEPTH).contains(&depth) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be in [1, {MAX_DEPTH}]"
                )));
            }
        }
        if self.time_limit_ms == Some(0) {
            return Err(ConfigError::Validation("time_limit_ms must be > 0".into()));
        }
        if self.node_budget == Some(0) {
            return Err(ConfigError::Validation("node_budget must be > 0".into()));
        }
        Ok(())
    }

    pub fn depth_for(&self, algorithm: Algorithm) -> u8 {
        match algorithm {
            Algorithm::Minimax => self.minimax_depth,
            Algorithm::AlphaBeta => self.alpha_beta_depth,
        }
    }

    /// Limits for one search, starting the clock now.
    pub fn limits_for(&self, algorithm: Algorithm, depth: Option<u8>) -> SearchLimits {
        let mut limits = SearchLimits::depth(depth.unwrap_or_else(|| self.depth_for(algorithm)));
        if let Some(ms) = self.time_limit_ms {
            limits = limits.with_time_limit(Duration::from_millis(ms));
        }
        if let Some(nodes) = self.node_budget {
            limits = limits.with_node_budget(nodes);
        }
        limits
    }

    pub fn engine(&self, algorithm: Algorithm) -> SearchEngine {
        SearchEngine::new(algorithm, self)
    }

    pub fn new_board(&self) -> GridBoard {
        GridBoard::new(self.rows, self.columns)
    }
}

/// Named difficulty levels offered when playing against the computer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Difficulty {
    Rookie = 1,
    Scout = 2,
    Explorer = 3,
    Champion = 4,
    Legend = 5,
}

impl Difficulty {
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Search depth this level plays at with `algorithm`. Alpha-beta affords
    /// roughly twice the plies for the same effort.
    pub fn depth(self, algorithm: Algorithm) -> u8 {
        let level = self.level();
        match algorithm {
            Algorithm::Minimax => level,
            Algorithm::AlphaBeta => level * 2 - 1,
        }
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Difficulty::Rookie),
            2 => Ok(Difficulty::Scout),
            3 => Ok(Difficulty::Explorer),
            4 => Ok(Difficulty::Champion),
            5 => Ok(Difficulty::Legend),
            _ => Err(ConfigError::Validation(format!(
                "difficulty level {level} must be in [1, 5]"
            ))),
        }
    }
}

impl From<Difficulty> for u8 {
    fn from(difficulty: Difficulty) -> u8 {
        difficulty.level()
    }
}
