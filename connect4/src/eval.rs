//! Heuristic scoring of non-terminal positions.
use serde::{Deserialize, Serialize};

use crate::{GridBoard, Player, Position};

/// Window directions: right, down, down-right, up-right.
const WINDOW_STEPS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (-1, 1)];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalWeights {
    /// Per own token in the centre column.
    pub center: i32,
    /// Window with all but one cell own and the last empty.
    pub three: i32,
    /// Window with all but two cells own and the rest empty.
    pub two: i32,
    /// Window with all but one cell held by the opponent and the last empty.
    pub opponent_three: i32,
}

impl Default for EvalWeights {
    fn default() -> Self {
        Self {
            center: 3,
            three: 5,
            two: 2,
            opponent_three: -4,
        }
    }
}

/// Sums a centre-column bonus and the score of every `connect`-cell window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluator {
    connect: usize,
    weights: EvalWeights,
}

impl Evaluator {
    pub fn new(connect: usize, weights: EvalWeights) -> Self {
        Self { connect, weights }
    }

    pub fn connect(&self) -> usize {
        self.connect
    }

    pub fn evaluate(&self, board: &GridBoard, player: Player) -> i32 {
        let mut score = self.center_score(board, player);
        for row in 0..board.rows() {
            for column in 0..board.columns() {
                let start = Position { column, row };
                for step in WINDOW_STEPS {
                    if let Some(counts) = self.window_counts(board, start, step, player) {
                        score += self.score_window(counts);
                    }
                }
            }
        }
        score
    }

    fn center_score(&self, board: &GridBoard, player: Player) -> i32 {
        let centre = board.columns() / 2;
        let own = (0..board.rows())
            .filter(|&row| board.get(row, centre) == Some(player))
            .count() as i32;
        own * self.weights.center
    }

    /// `(own, opponent, empty)` counts for the window starting at `start`, or
    /// `None` when it runs off the board.
    fn window_counts(
        &self,
        board: &GridBoard,
        start: Position,
        (dr, dc): (isize, isize),
        player: Player,
    ) -> Option<(usize, usize, usize)> {
        let mut counts = (0, 0, 0);
        for offset in 0..self.connect as isize {
            let row = start.row.checked_add_signed(dr * offset)?;
            let column = start.column.checked_add_signed(dc * offset)?;
            if row >= board.rows() || column >= board.columns() {
                return None;
            }
            match board.get(row, column) {
                Some(token) if token == player => counts.0 += 1,
                Some(_) => counts.1 += 1,
                None => counts.2 += 1,
            }
        }
        Some(counts)
    }

    fn score_window(&self, (own, opponent, empty): (usize, usize, usize)) -> i32 {
        let n = self.connect;
        let mut score = 0;
        // A full own window is a win and never reaches the heuristic.
        if own + 1 == n && empty == 1 {
            score += self.weights.three;
        } else if own + 2 == n && empty == 2 {
            score += self.weights.two;
        }
        if opponent + 1 == n && empty == 1 {
            score += self.weights.opponent_three;
        }
        score
    }
}
