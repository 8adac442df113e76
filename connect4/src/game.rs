use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MAX_DEPTH;
use crate::search::SearchOutcome;
use crate::win::has_win_at;
use crate::{
    Algorithm, ConfigError, EngineConfig, GameError, GridBoard, Player, Position, WireGrid,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    Created,
    InProgress,
    PlayerOneWin,
    PlayerTwoWin,
    Draw,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GameStatus::PlayerOneWin | GameStatus::PlayerTwoWin | GameStatus::Draw
        )
    }

    pub fn win_for(player: Player) -> GameStatus {
        match player {
            Player::One => GameStatus::PlayerOneWin,
            Player::Two => GameStatus::PlayerTwoWin,
        }
    }

    pub fn winner(self) -> Option<Player> {
        match self {
            GameStatus::PlayerOneWin => Some(Player::One),
            GameStatus::PlayerTwoWin => Some(Player::Two),
            _ => None,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GameStatus::Created => "Created",
            GameStatus::InProgress => "In Progress",
            GameStatus::PlayerOneWin => "Player 1 Wins",
            GameStatus::PlayerTwoWin => "Player 2 Wins",
            GameStatus::Draw => "Draw",
        })
    }
}

/// Which seat moves first in a new game.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirstTurn {
    #[default]
    One,
    Two,
    /// Either seat, drawn when the game is created.
    Random,
}

impl FirstTurn {
    pub fn resolve(self) -> Player {
        match self {
            FirstTurn::One => Player::One,
            FirstTurn::Two => Player::Two,
            FirstTurn::Random => {
                if rand::random() {
                    Player::One
                } else {
                    Player::Two
                }
            }
        }
    }
}

/// Who sits in a seat. Computer seats are moved by search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Participant {
    Human {
        id: String,
    },
    Computer {
        id: String,
        algorithm: Algorithm,
        /// Overrides the configured depth for `algorithm`.
        #[serde(default)]
        depth: Option<u8>,
    },
}

impl Participant {
    pub fn human(id: impl Into<String>) -> Self {
        Participant::Human { id: id.into() }
    }

    pub fn computer(id: impl Into<String>, algorithm: Algorithm) -> Self {
        Participant::Computer {
            id: id.into(),
            algorithm,
            depth: None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Participant::Human { id } | Participant::Computer { id, .. } => id,
        }
    }

    pub fn is_automated(&self) -> bool {
        matches!(self, Participant::Computer { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub sequence: usize,
    pub player: Player,
    pub column: usize,
    pub row: usize,
    pub undone: bool,
}

impl MoveRecord {
    pub fn position(&self) -> Position {
        Position {
            column: self.column,
            row: self.row,
        }
    }
}

/// Work the caller must carry out after a lifecycle call returns.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FollowUp {
    /// The seat now to move is a computer.
    ScheduleAiMove { player: Player },
    /// The game just reached a terminal status; emitted once per game.
    RecordResult { status: GameStatus },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    #[serde(rename = "appliedPosition")]
    pub applied: Position,
    pub player: Player,
    #[serde(rename = "newStatus")]
    pub status: GameStatus,
    pub next_turn: Player,
    #[serde(skip)]
    pub follow_ups: Vec<FollowUp>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoOutcome {
    #[serde(rename = "revertedPosition")]
    pub reverted: Position,
    #[serde(rename = "newStatus")]
    pub status: GameStatus,
    pub next_turn: Player,
    #[serde(skip)]
    pub follow_ups: Vec<FollowUp>,
}

/// Persistable state of a game; [`Game::restore`] checks it for consistency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub config: EngineConfig,
    pub board: WireGrid,
    pub moves: Vec<MoveRecord>,
    pub status: GameStatus,
    pub first_turn: Player,
    pub current_turn: Player,
    pub participants: [Participant; 2],
}

/// The move lifecycle of one game: validation, application, result detection,
/// turn hand-over and undo.
#[derive(Clone, Debug)]
pub struct Game {
    config: EngineConfig,
    board: GridBoard,
    participants: [Participant; 2],
    status: GameStatus,
    first_turn: Player,
    turn: Player,
    history: Vec<MoveRecord>,
}

impl Game {
    pub fn new(
        config: EngineConfig,
        player_one: Participant,
        player_two: Participant,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        for seat in [&player_one, &player_two] {
            if let Participant::Computer {
                id,
                depth: Some(depth),
                ..
            } = seat
            {
                if !(1..=MAX_DEPTH).contains(depth) {
                    return Err(ConfigError::Validation(format!(
                        "depth {depth} for computer '{id}' must be in [1, {MAX_DEPTH}]"
                    )));
                }
            }
        }
        Ok(Self {
            board: config.new_board(),
            config,
            participants: [player_one, player_two],
            status: GameStatus::Created,
            first_turn: Player::One,
            turn: Player::One,
            history: Vec::new(),
        })
    }

    /// Picks the opening seat. Has no effect once a move has been made.
    pub fn with_first_turn(mut self, first: FirstTurn) -> Self {
        if self.history.is_empty() {
            self.first_turn = first.resolve();
            self.turn = self.first_turn;
        }
        self
    }

    pub fn first_turn(&self) -> Player {
        self.first_turn
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn board(&self) -> &GridBoard {
        &self.board
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn turn(&self) -> Player {
        self.turn
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    pub fn participant(&self, player: Player) -> &Participant {
        &self.participants[player.idx()]
    }

    /// Seats held by `player_id`. Hot-seat games list the same id twice.
    pub fn seats_of(&self, player_id: &str) -> Vec<Player> {
        [Player::One, Player::Two]
            .into_iter()
            .filter(|&player| self.participant(player).id() == player_id)
            .collect()
    }

    /// Follow-ups owed before anyone has moved: a computer opening the game.
    pub fn opening_follow_ups(&self) -> Vec<FollowUp> {
        if self.status == GameStatus::Created
            && self.history.is_empty()
            && self.participant(self.turn).is_automated()
        {
            vec![FollowUp::ScheduleAiMove { player: self.turn }]
        } else {
            Vec::new()
        }
    }

    /// Applies `player`'s token at `(column, row)`. The row must be the one
    /// gravity gives for `column`; nothing changes when validation fails.
    pub fn apply_move(
        &mut self,
        player: Player,
        column: usize,
        row: usize,
    ) -> Result<MoveOutcome, GameError> {
        if self.status.is_terminal() {
            return Err(GameError::GameNotInProgress {
                status: self.status,
            });
        }
        if player != self.turn {
            return Err(GameError::NotYourTurn {
                expected: self.turn,
            });
        }
        if column >= self.board.columns() {
            return Err(GameError::InvalidColumn {
                column,
                columns: self.board.columns(),
            });
        }
        if row >= self.board.rows() {
            return Err(GameError::InvalidMove {
                column,
                row,
                reason: "row is outside the board",
            });
        }
        let landing = self.board.open_row(column).map_err(|err| match err {
            GameError::ColumnFull { .. } => GameError::InvalidMove {
                column,
                row,
                reason: "column is full",
            },
            other => other,
        })?;
        if row != landing {
            let reason = if self.board.get(row, column).is_some() {
                "cell is already occupied"
            } else {
                "row does not match the landing row"
            };
            return Err(GameError::InvalidMove {
                column,
                row,
                reason,
            });
        }

        let row = self.board.drop_token(column, player)?;
        self.history.push(MoveRecord {
            sequence: self.history.len(),
            player,
            column,
            row,
            undone: false,
        });
        let applied = Position { column, row };

        let mut follow_ups = Vec::new();
        if has_win_at(&self.board, applied, self.config.connect) {
            self.finish(GameStatus::win_for(player), &mut follow_ups);
        } else if self.board.is_full() {
            self.finish(GameStatus::Draw, &mut follow_ups);
        } else {
            self.turn = player.opponent();
            if self.status == GameStatus::Created {
                self.status = GameStatus::InProgress;
            }
            if self.participant(self.turn).is_automated() {
                follow_ups.push(FollowUp::ScheduleAiMove { player: self.turn });
            }
        }
        debug!(
            %player,
            column,
            row,
            status = %self.status,
            next_turn = %self.turn,
            "move applied"
        );

        Ok(MoveOutcome {
            applied,
            player,
            status: self.status,
            next_turn: self.turn,
            follow_ups,
        })
    }

    /// Drops into `column` at whatever row gravity gives.
    pub fn play_column(&mut self, player: Player, column: usize) -> Result<MoveOutcome, GameError> {
        // Unplayable columns fall through to apply_move for ordered errors.
        let row = self.board.open_row(column).unwrap_or(0);
        self.apply_move(player, column, row)
    }

    /// Reverts `player`'s latest move, which must also be the latest move of
    /// the game, and hands the turn back to them.
    pub fn undo_move(&mut self, player: Player) -> Result<UndoOutcome, GameError> {
        if self.status.is_terminal() {
            return Err(GameError::GameNotInProgress {
                status: self.status,
            });
        }
        let own = self
            .history
            .iter()
            .rposition(|record| !record.undone && record.player == player)
            .ok_or(GameError::NoMovesToUndo)?;
        let latest = self.history.iter().rposition(|record| !record.undone);
        if latest != Some(own) {
            let position = self.history[own].position();
            return Err(GameError::CannotUndoMove {
                column: position.column,
                row: position.row,
            });
        }

        let reverted = self.board.undo()?;
        debug_assert_eq!(reverted, self.history[own].position());
        self.history[own].undone = true;
        self.turn = player;
        if self.board.moves_played() == 0 {
            self.status = GameStatus::Created;
        }
        debug!(%player, column = reverted.column, row = reverted.row, status = %self.status, "move undone");

        let mut follow_ups = Vec::new();
        if self.participant(self.turn).is_automated() {
            follow_ups.push(FollowUp::ScheduleAiMove { player: self.turn });
        }
        Ok(UndoOutcome {
            reverted,
            status: self.status,
            next_turn: self.turn,
            follow_ups,
        })
    }

    /// Searches a move for the seat to play without applying it. Human seats
    /// get an alpha-beta hint at the configured depth.
    pub fn request_ai_move(&mut self) -> Result<SearchOutcome, GameError> {
        if self.status.is_terminal() {
            return Err(GameError::GameNotInProgress {
                status: self.status,
            });
        }
        let (algorithm, depth) = match self.participant(self.turn) {
            Participant::Computer {
                algorithm, depth, ..
            } => (*algorithm, *depth),
            Participant::Human { .. } => (Algorithm::AlphaBeta, None),
        };
        let limits = self.config.limits_for(algorithm, depth);
        self.config
            .engine(algorithm)
            .choose_move(&mut self.board, self.turn, &limits)
    }

    /// Searches and applies a move for the computer seat to play.
    pub fn play_ai_turn(&mut self) -> Result<MoveOutcome, GameError> {
        if self.status.is_terminal() {
            return Err(GameError::GameNotInProgress {
                status: self.status,
            });
        }
        if !self.participant(self.turn).is_automated() {
            return Err(GameError::NotYourTurn {
                expected: self.turn,
            });
        }
        let choice = self.request_ai_move()?;
        self.apply_move(self.turn, choice.column, choice.row)
    }

    /// Plays computer turns until a human is to move or the game ends.
    pub fn auto_play(&mut self) -> Result<Vec<MoveOutcome>, GameError> {
        let mut outcomes = Vec::new();
        while !self.status.is_terminal() && self.participant(self.turn).is_automated() {
            outcomes.push(self.play_ai_turn()?);
        }
        Ok(outcomes)
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            config: self.config.clone(),
            board: self.board.to_wire(),
            moves: self.history.clone(),
            status: self.status,
            first_turn: self.first_turn,
            current_turn: self.turn,
            participants: self.participants.clone(),
        }
    }

    /// Rebuilds a game by replaying the snapshot's live moves through the
    /// lifecycle and checking the result against the stored board, status
    /// and turn.
    pub fn restore(snapshot: GameSnapshot) -> Result<Self, GameError> {
        let [player_one, player_two] = snapshot.participants;
        let first = match snapshot.first_turn {
            Player::One => FirstTurn::One,
            Player::Two => FirstTurn::Two,
        };
        let mut game = Game::new(snapshot.config, player_one, player_two)
            .map_err(|err| GameError::CorruptSnapshot(err.to_string()))?
            .with_first_turn(first);

        for (index, record) in snapshot.moves.iter().enumerate() {
            if record.sequence != index {
                return Err(GameError::CorruptSnapshot(format!(
                    "move {index} has sequence {}",
                    record.sequence
                )));
            }
            if record.undone {
                continue;
            }
            game.apply_move(record.player, record.column, record.row)
                .map_err(|err| {
                    GameError::CorruptSnapshot(format!("move {index} does not replay: {err}"))
                })?;
        }
        game.history = snapshot.moves;

        if game.board.to_wire() != snapshot.board {
            return Err(GameError::CorruptSnapshot(
                "board does not match move history".into(),
            ));
        }
        if game.status != snapshot.status || game.turn != snapshot.current_turn {
            return Err(GameError::CorruptSnapshot(format!(
                "stored status {} / turn {} disagree with replay ({} / {})",
                snapshot.status, snapshot.current_turn, game.status, game.turn
            )));
        }
        Ok(game)
    }

    fn finish(&mut self, status: GameStatus, follow_ups: &mut Vec<FollowUp>) {
        self.status = status;
        follow_ups.push(FollowUp::RecordResult { status });
    }
}
