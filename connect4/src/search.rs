//! Minimax and alpha-beta search over a shared, mutable board.
//!
//! Both algorithms walk the tree by dropping a token through
//! [`GridBoard::play`] and recursing into the guard; the guard's `Drop` undoes
//! the token on every exit path, including cut-offs and interruptions.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{EngineConfig, MAX_DEPTH};
use crate::eval::Evaluator;
use crate::win::{find_winner, has_win_at};
use crate::{GameError, GameStatus, GridBoard, Player, Position};

/// How often, in nodes, the wall clock is consulted.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

/// Backed-up value of a position from the searching player's side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(i32);

impl Score {
    /// Searching player has won.
    pub const INFINITY: Score = Score(i32::MAX);
    /// Opponent has won.
    pub const NEG_INFINITY: Score = Score(-i32::MAX);
    pub const DRAW: Score = Score(0);

    /// Heuristic values stay strictly inside the win/loss bounds.
    pub fn heuristic(value: i32) -> Score {
        Score(value.clamp(-i32::MAX + 1, i32::MAX - 1))
    }

    pub fn value(self) -> i32 {
        self.0
    }

    pub fn is_win(self) -> bool {
        self == Score::INFINITY
    }

    pub fn is_loss(self) -> bool {
        self == Score::NEG_INFINITY
    }

    fn just_below(self) -> Score {
        Score(self.0.saturating_sub(1))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Score::INFINITY => f.write_str("+inf"),
            Score::NEG_INFINITY => f.write_str("-inf"),
            Score(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    Minimax,
    AlphaBeta,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Minimax => f.write_str("Minimax"),
            Algorithm::AlphaBeta => f.write_str("Alpha Beta Pruning"),
        }
    }
}

/// Which root column wins when several share the best score.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum TieBreak {
    /// First best column in enumeration order.
    #[default]
    FirstEncountered,
    /// Running best starts at a random open column and is replaced only on
    /// strict improvement.
    RandomSeed { seed: Option<u64> },
    /// Every root column with the exact best score is collected and one is
    /// picked uniformly.
    AllTied { seed: Option<u64> },
}

impl TieBreak {
    fn rng(self) -> StdRng {
        match self {
            TieBreak::RandomSeed { seed: Some(seed) } | TieBreak::AllTied { seed: Some(seed) } => {
                StdRng::seed_from_u64(seed)
            }
            _ => StdRng::from_entropy(),
        }
    }
}

/// Column enumeration order during search.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoveOrder {
    Ascending,
    /// Centre column first, then alternating outward, left before right.
    #[default]
    CenterFirst,
}

/// Shared stop flag; clones observe the same cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Bounds on a single search. Depth always applies; the rest are optional.
#[derive(Clone, Debug)]
pub struct SearchLimits {
    pub depth: u8,
    pub deadline: Option<Instant>,
    pub node_budget: Option<u64>,
    pub cancel: CancelToken,
}

impl SearchLimits {
    pub fn depth(depth: u8) -> Self {
        Self {
            depth,
            deadline: None,
            node_budget: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.deadline = Some(Instant::now() + limit);
        self
    }

    pub fn with_node_budget(mut self, nodes: u64) -> Self {
        self.node_budget = Some(nodes);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    pub column: usize,
    /// Landing row of `column` on the searched board.
    pub row: usize,
    pub score: Score,
    pub nodes: u64,
    /// Root columns known to share `score`; just `column` unless the tie-break
    /// policy collects ties.
    pub candidates: Vec<usize>,
    /// A limit or the cancel token stopped the search before it finished.
    pub interrupted: bool,
}

/// One search strategy bound to an evaluator and root policies.
#[derive(Clone, Debug)]
pub struct SearchEngine {
    algorithm: Algorithm,
    evaluator: Evaluator,
    tie_break: TieBreak,
    move_order: MoveOrder,
}

impl SearchEngine {
    pub fn new(algorithm: Algorithm, config: &EngineConfig) -> Self {
        Self {
            algorithm,
            evaluator: Evaluator::new(config.connect, config.weights),
            tie_break: config.tie_break,
            move_order: config.move_order,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_move_order(mut self, move_order: MoveOrder) -> Self {
        self.move_order = move_order;
        self
    }

    /// Picks a column for `player`. The board is restored before returning.
    pub fn choose_move(
        &self,
        board: &mut GridBoard,
        player: Player,
        limits: &SearchLimits,
    ) -> Result<SearchOutcome, GameError> {
        if !(1..=MAX_DEPTH).contains(&limits.depth) {
            return Err(GameError::DepthOutOfRange(limits.depth));
        }
        // Imported grids carry no real move order, so the root check scans
        // the whole board rather than trusting the last drop.
        if let Some(winner) = find_winner(board, self.evaluator.connect()) {
            return Err(GameError::GameNotInProgress {
                status: GameStatus::win_for(winner),
            });
        }
        if board.is_full() {
            return Err(GameError::GameNotInProgress {
                status: GameStatus::Draw,
            });
        }

        let mut search = Search {
            engine: self,
            player,
            limits,
            nodes: 0,
            next_clock_check: 0,
        };
        let root = search.root(board, limits.depth);
        let row = board.open_row(root.column)?;
        debug!(
            algorithm = %self.algorithm,
            depth = limits.depth,
            nodes = search.nodes,
            column = root.column,
            score = %root.score,
            interrupted = root.interrupted,
            "search finished"
        );
        Ok(SearchOutcome {
            column: root.column,
            row,
            score: root.score,
            nodes: search.nodes,
            candidates: root.candidates,
            interrupted: root.interrupted,
        })
    }

    fn ordered_columns(&self, board: &GridBoard) -> Vec<usize> {
        let mut columns = board.open_columns();
        if self.move_order == MoveOrder::CenterFirst {
            let centre = board.columns() / 2;
            columns.sort_by_key(|&column| column.abs_diff(centre));
        }
        columns
    }
}

struct RootResult {
    column: usize,
    score: Score,
    candidates: Vec<usize>,
    interrupted: bool,
}

/// A limit was hit; unwinds the recursion through `?`.
struct Interrupted;

struct Search<'a> {
    engine: &'a SearchEngine,
    player: Player,
    limits: &'a SearchLimits,
    nodes: u64,
    /// Node count at which the wall clock is next read.
    next_clock_check: u64,
}

impl Search<'_> {
    fn root(&mut self, board: &mut GridBoard, depth: u8) -> RootResult {
        let tie_break = self.engine.tie_break;
        let collect_ties = matches!(tie_break, TieBreak::AllTied { .. });
        let mut rng = tie_break.rng();
        let columns = self.engine.ordered_columns(board);

        let seed_column = match tie_break {
            TieBreak::RandomSeed { .. } => columns.choose(&mut rng).copied(),
            _ => columns.first().copied(),
        }
        .unwrap_or_default();
        let mut best_column = seed_column;
        let mut best = Score::NEG_INFINITY;
        let mut alpha = Score::NEG_INFINITY;
        let beta = Score::INFINITY;
        let mut scored = Vec::with_capacity(columns.len());
        let mut interrupted = false;

        for column in columns {
            // Collecting ties needs exact values for columns equal to the
            // best, so the window opens one below it.
            let window = if collect_ties { alpha.just_below() } else { alpha };
            let result = {
                let Ok(mut child) = board.play(column, self.player) else {
                    continue;
                };
                let last = child.position();
                match self.engine.algorithm {
                    Algorithm::Minimax => self.minimax(&mut child, last, depth - 1, false),
                    Algorithm::AlphaBeta => {
                        self.alpha_beta(&mut child, last, depth - 1, window, beta, false)
                    }
                }
            };
            let Ok(score) = result else {
                interrupted = true;
                break;
            };
            trace!(column, score = %score, "root column scored");
            scored.push((column, score));

            if score > best {
                best = score;
                best_column = column;
            }
            alpha = alpha.max(best);
            if self.engine.algorithm == Algorithm::AlphaBeta && !collect_ties && alpha >= beta {
                break;
            }
        }

        let candidates = if collect_ties {
            let tied: Vec<usize> = scored
                .iter()
                .filter(|&&(_, score)| score == best)
                .map(|&(column, _)| column)
                .collect();
            if let Some(&pick) = tied.choose(&mut rng) {
                best_column = pick;
            }
            tied
        } else {
            Vec::new()
        };

        RootResult {
            column: best_column,
            score: best,
            candidates: if candidates.is_empty() {
                vec![best_column]
            } else {
                candidates
            },
            interrupted,
        }
    }

    fn minimax(
        &mut self,
        board: &mut GridBoard,
        last: Position,
        depth: u8,
        maximizing: bool,
    ) -> Result<Score, Interrupted> {
        self.nodes += 1;
        if let Some(score) = self.leaf_value(board, last, depth) {
            return Ok(score);
        }
        self.check_limits()?;

        let mover = self.mover(maximizing);
        let mut best = initial_best(maximizing);
        for column in self.engine.ordered_columns(board) {
            let Ok(mut child) = board.play(column, mover) else {
                continue;
            };
            let last = child.position();
            let score = self.minimax(&mut child, last, depth - 1, !maximizing)?;
            if improves(maximizing, score, best) {
                best = score;
            }
        }
        Ok(best)
    }

    fn alpha_beta(
        &mut self,
        board: &mut GridBoard,
        last: Position,
        depth: u8,
        mut alpha: Score,
        mut beta: Score,
        maximizing: bool,
    ) -> Result<Score, Interrupted> {
        self.nodes += 1;
        if let Some(score) = self.leaf_value(board, last, depth) {
            return Ok(score);
        }
        self.check_limits()?;

        let mover = self.mover(maximizing);
        let mut best = initial_best(maximizing);
        for column in self.engine.ordered_columns(board) {
            let score = {
                let Ok(mut child) = board.play(column, mover) else {
                    continue;
                };
                let last = child.position();
                self.alpha_beta(&mut child, last, depth - 1, alpha, beta, !maximizing)?
            };
            if improves(maximizing, score, best) {
                best = score;
            }
            if maximizing {
                alpha = alpha.max(best);
            } else {
                beta = beta.min(best);
            }
            if alpha >= beta {
                break;
            }
        }
        Ok(best)
    }

    /// Terminal or horizon value of the position reached by the drop at `last`.
    fn leaf_value(&self, board: &GridBoard, last: Position, depth: u8) -> Option<Score> {
        if has_win_at(board, last, self.engine.evaluator.connect()) {
            return Some(if board.at(last) == Some(self.player) {
                Score::INFINITY
            } else {
                Score::NEG_INFINITY
            });
        }
        if board.is_full() {
            return Some(Score::DRAW);
        }
        if depth == 0 {
            return Some(Score::heuristic(
                self.engine.evaluator.evaluate(board, self.player),
            ));
        }
        None
    }

    fn check_limits(&mut self) -> Result<(), Interrupted> {
        if self.limits.cancel.is_cancelled() {
            return Err(Interrupted);
        }
        if self.limits.node_budget.is_some_and(|budget| self.nodes >= budget) {
            return Err(Interrupted);
        }
        if let Some(deadline) = self.limits.deadline {
            if self.nodes >= self.next_clock_check {
                self.next_clock_check = self.nodes + CLOCK_CHECK_INTERVAL;
                if Instant::now() >= deadline {
                    return Err(Interrupted);
                }
            }
        }
        Ok(())
    }

    fn mover(&self, maximizing: bool) -> Player {
        if maximizing {
            self.player
        } else {
            self.player.opponent()
        }
    }
}

fn initial_best(maximizing: bool) -> Score {
    if maximizing {
        Score::NEG_INFINITY
    } else {
        Score::INFINITY
    }
}

fn improves(maximizing: bool, score: Score, best: Score) -> bool {
    if maximizing {
        score > best
    } else {
        score < best
    }
}
