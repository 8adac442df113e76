//! Live games, each behind its own async mutex, plus the worker that carries
//! out follow-ups (computer replies, recorded results) off the request path.
use std::sync::Arc;

use connect4::{
    Algorithm, ConfigError, Difficulty, EngineConfig, FirstTurn, FollowUp, Game, GameError,
    GameSnapshot, GameStatus, GridBoard, MoveOutcome, Participant, Player, SearchOutcome,
    UndoOutcome, WireGrid,
};
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type SharedGame = Arc<Mutex<Game>>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("game {0} not found")]
    GameNotFound(Uuid),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("search worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// Choices made when a game is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameOptions {
    /// Depth for computer seats that do not set one.
    pub difficulty: Option<Difficulty>,
    pub first_turn: FirstTurn,
}

/// Follow-up work queued for the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AiMove { game_id: Uuid },
    RecordResult { game_id: Uuid, status: GameStatus },
}

pub struct Registry {
    games: DashMap<Uuid, SharedGame>,
    results: DashMap<GameStatus, u64>,
    config: EngineConfig,
    commands: mpsc::UnboundedSender<Command>,
}

impl Registry {
    /// Returns the registry and the receiving end to hand to [`Registry::spawn_worker`].
    pub fn new(config: EngineConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<Command>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            games: DashMap::new(),
            results: DashMap::new(),
            config,
            commands,
        });
        (registry, rx)
    }

    /// Finished games per terminal status.
    pub fn results(&self, status: GameStatus) -> u64 {
        self.results.get(&status).map(|count| *count).unwrap_or(0)
    }

    pub fn create_game(
        &self,
        players: [Participant; 2],
        options: GameOptions,
    ) -> Result<(Uuid, GameSnapshot), ServiceError> {
        let [one, two] = players.map(|seat| with_difficulty(seat, options.difficulty));
        let game = Game::new(self.config.clone(), one, two)?.with_first_turn(options.first_turn);
        let snapshot = game.snapshot();
        let follow_ups = game.opening_follow_ups();

        let game_id = Uuid::new_v4();
        self.games.insert(game_id, Arc::new(Mutex::new(game)));
        info!(
            %game_id,
            player_one = snapshot.participants[0].id(),
            player_two = snapshot.participants[1].id(),
            first_turn = %snapshot.first_turn,
            "game created"
        );
        self.dispatch(game_id, &follow_ups);
        Ok((game_id, snapshot))
    }

    pub fn game(&self, game_id: Uuid) -> Result<SharedGame, ServiceError> {
        self.games
            .get(&game_id)
            .map(|entry| entry.value().clone())
            .ok_or(ServiceError::GameNotFound(game_id))
    }

    pub async fn snapshot(&self, game_id: Uuid) -> Result<GameSnapshot, ServiceError> {
        let game = self.game(game_id)?;
        let game = game.lock().await;
        Ok(game.snapshot())
    }

    pub async fn submit_move(
        &self,
        game_id: Uuid,
        player_id: &str,
        column: usize,
        row: usize,
    ) -> Result<MoveOutcome, ServiceError> {
        let game = self.game(game_id)?;
        let outcome = {
            let mut game = game.lock().await;
            let seat = resolve_mover(&game, player_id)?;
            game.apply_move(seat, column, row)?
        };
        self.dispatch(game_id, &outcome.follow_ups);
        Ok(outcome)
    }

    pub async fn undo_move(
        &self,
        game_id: Uuid,
        player_id: &str,
    ) -> Result<UndoOutcome, ServiceError> {
        let game = self.game(game_id)?;
        let outcome = {
            let mut game = game.lock().await;
            let seat = resolve_undoer(&game, player_id)?;
            game.undo_move(seat)?
        };
        self.dispatch(game_id, &outcome.follow_ups);
        Ok(outcome)
    }

    /// Best move for the side to play, without applying it.
    pub async fn request_ai_move(&self, game_id: Uuid) -> Result<SearchOutcome, ServiceError> {
        let game = self.game(game_id)?;
        let outcome = tokio::task::spawn_blocking(move || {
            let mut game = game.blocking_lock();
            game.request_ai_move()
        })
        .await??;
        Ok(outcome)
    }

    /// Plays the computer's turn. Returns `None` when the request went stale:
    /// the game ended or a human is to move by the time the lock is taken.
    pub async fn play_ai_turn(&self, game_id: Uuid) -> Result<Option<MoveOutcome>, ServiceError> {
        let game = self.game(game_id)?;
        let outcome = tokio::task::spawn_blocking(move || {
            let mut game = game.blocking_lock();
            if game.status().is_terminal() || !game.participant(game.turn()).is_automated() {
                return Ok(None);
            }
            game.play_ai_turn().map(Some)
        })
        .await??;

        match &outcome {
            Some(outcome) => self.dispatch(game_id, &outcome.follow_ups),
            None => warn!(%game_id, "scheduled ai move dropped, game moved on"),
        }
        Ok(outcome)
    }

    /// Searches a bare wire grid.
    pub async fn analyze(
        &self,
        board: WireGrid,
        player: Player,
        algorithm: Algorithm,
        depth: Option<u8>,
    ) -> Result<SearchOutcome, ServiceError> {
        let config = EngineConfig {
            rows: board.len(),
            columns: board.first().map_or(0, Vec::len),
            ..self.config.clone()
        };
        config.validate()?;
        let outcome = tokio::task::spawn_blocking(move || {
            let mut board = GridBoard::from_wire(&board)?;
            let limits = config.limits_for(algorithm, depth);
            config.engine(algorithm).choose_move(&mut board, player, &limits)
        })
        .await??;
        Ok(outcome)
    }

    fn dispatch(&self, game_id: Uuid, follow_ups: &[FollowUp]) {
        for follow_up in follow_ups {
            let command = match *follow_up {
                FollowUp::ScheduleAiMove { .. } => Command::AiMove { game_id },
                FollowUp::RecordResult { status } => Command::RecordResult { game_id, status },
            };
            if self.commands.send(command).is_err() {
                warn!(%game_id, ?follow_up, "worker stopped, follow-up dropped");
            }
        }
    }

    /// Runs queued commands until every sender is gone. Computer moves run as
    /// separate tasks so one long search does not hold up other games.
    pub fn spawn_worker(
        self: &Arc<Self>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                match command {
                    Command::AiMove { game_id } => {
                        tokio::spawn(async move {
                            if let Err(err) = registry.play_ai_turn(game_id).await {
                                warn!(%game_id, error = %err, "ai move failed");
                            }
                        });
                    }
                    Command::RecordResult { game_id, status } => {
                        *registry.results.entry(status).or_insert(0) += 1;
                        info!(%game_id, %status, total = registry.results(status), "game finished");
                    }
                }
            }
            debug!("worker stopped");
        })
    }
}

fn with_difficulty(seat: Participant, difficulty: Option<Difficulty>) -> Participant {
    match (seat, difficulty) {
        (
            Participant::Computer {
                id,
                algorithm,
                depth: None,
            },
            Some(level),
        ) => Participant::Computer {
            id,
            algorithm,
            depth: Some(level.depth(algorithm)),
        },
        (seat, _) => seat,
    }
}

/// Human seats held by `player_id`; computer seats only move through the worker.
fn human_seats(game: &Game, player_id: &str) -> Vec<Player> {
    let mut seats = game.seats_of(player_id);
    seats.retain(|&seat| !game.participant(seat).is_automated());
    seats
}

/// Seat `player_id` moves for. A hot-seat id takes whichever seat is to move.
fn resolve_mover(game: &Game, player_id: &str) -> Result<Player, GameError> {
    let seats = human_seats(game, player_id);
    if seats.contains(&game.turn()) {
        return Ok(game.turn());
    }
    seats.first().copied().ok_or(GameError::NotYourTurn {
        expected: game.turn(),
    })
}

/// Seat `player_id` undoes for. A hot-seat id takes the seat that moved last.
fn resolve_undoer(game: &Game, player_id: &str) -> Result<Player, GameError> {
    let seats = human_seats(game, player_id);
    let last_mover = game
        .history()
        .iter()
        .rev()
        .find(|record| !record.undone)
        .map(|record| record.player);
    match last_mover {
        Some(player) if seats.contains(&player) => Ok(player),
        _ => seats.first().copied().ok_or(GameError::NotYourTurn {
            expected: game.turn(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn quick_config() -> EngineConfig {
        EngineConfig {
            minimax_depth: 2,
            alpha_beta_depth: 3,
            ..EngineConfig::default()
        }
    }

    fn humans() -> [Participant; 2] {
        [Participant::human("alice"), Participant::human("bob")]
    }

    #[tokio::test]
    async fn moves_resolve_player_ids_to_seats() {
        let (registry, _rx) = Registry::new(quick_config());
        let (id, snapshot) = registry
            .create_game(humans(), GameOptions::default())
            .unwrap();
        assert_eq!(snapshot.status, GameStatus::Created);

        let outcome = registry.submit_move(id, "alice", 3, 5).await.unwrap();
        assert_eq!(outcome.next_turn, Player::Two);
        let err = registry.submit_move(id, "alice", 3, 4).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Game(GameError::NotYourTurn {
                expected: Player::Two
            })
        ));
        let err = registry.submit_move(id, "mallory", 3, 4).await.unwrap_err();
        assert!(matches!(err, ServiceError::Game(GameError::NotYourTurn { .. })));
        registry.submit_move(id, "bob", 3, 4).await.unwrap();

        let err = registry.undo_move(id, "alice").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Game(GameError::CannotUndoMove { column: 3, row: 5 })
        ));
        let undone = registry.undo_move(id, "bob").await.unwrap();
        assert_eq!(undone.next_turn, Player::Two);
    }

    #[tokio::test]
    async fn hot_seat_ids_follow_the_turn() {
        let (registry, _rx) = Registry::new(quick_config());
        let players = [Participant::human("sam"), Participant::human("sam")];
        let (id, _) = registry
            .create_game(players, GameOptions::default())
            .unwrap();
        registry.submit_move(id, "sam", 0, 5).await.unwrap();
        let second = registry.submit_move(id, "sam", 1, 5).await.unwrap();
        assert_eq!(second.player, Player::Two);

        let undone = registry.undo_move(id, "sam").await.unwrap();
        assert_eq!(undone.reverted.column, 1);
        assert_eq!(undone.next_turn, Player::Two);
    }

    #[tokio::test]
    async fn unknown_game_is_reported() {
        let (registry, _rx) = Registry::new(quick_config());
        let missing = Uuid::new_v4();
        assert!(matches!(
            registry.snapshot(missing).await,
            Err(ServiceError::GameNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn difficulty_sets_computer_depth() {
        let (registry, _rx) = Registry::new(quick_config());
        let players = [
            Participant::human("alice"),
            Participant::computer("cpu", Algorithm::AlphaBeta),
        ];
        let (_, snapshot) = registry
            .create_game(
                players,
                GameOptions {
                    difficulty: Some(Difficulty::Explorer),
                    ..GameOptions::default()
                },
            )
            .unwrap();
        assert_eq!(
            snapshot.participants[1],
            Participant::Computer {
                id: "cpu".into(),
                algorithm: Algorithm::AlphaBeta,
                depth: Some(5),
            }
        );
        assert_eq!(snapshot.participants[0], Participant::human("alice"));
    }

    #[tokio::test]
    async fn human_move_queues_a_computer_reply() {
        let (registry, mut rx) = Registry::new(quick_config());
        let players = [
            Participant::human("alice"),
            Participant::computer("cpu", Algorithm::Minimax),
        ];
        let (id, _) = registry
            .create_game(players, GameOptions::default())
            .unwrap();
        registry.submit_move(id, "alice", 3, 5).await.unwrap();
        assert_eq!(rx.recv().await, Some(Command::AiMove { game_id: id }));

        let reply = registry.play_ai_turn(id).await.unwrap().unwrap();
        assert_eq!(reply.player, Player::Two);
        assert_eq!(reply.next_turn, Player::One);

        // A duplicate request finds a human to move and is dropped.
        assert_eq!(registry.play_ai_turn(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn computer_seats_refuse_requests_by_id() {
        let (registry, mut rx) = Registry::new(quick_config());
        let players = [
            Participant::human("alice"),
            Participant::computer("cpu", Algorithm::Minimax),
        ];
        let (id, _) = registry
            .create_game(players, GameOptions::default())
            .unwrap();
        registry.submit_move(id, "alice", 3, 5).await.unwrap();
        assert_eq!(rx.recv().await, Some(Command::AiMove { game_id: id }));

        let err = registry.submit_move(id, "cpu", 3, 4).await.unwrap_err();
        assert!(matches!(err, ServiceError::Game(GameError::NotYourTurn { .. })));
        registry.play_ai_turn(id).await.unwrap().unwrap();

        let err = registry.undo_move(id, "cpu").await.unwrap_err();
        assert!(matches!(err, ServiceError::Game(GameError::NotYourTurn { .. })));
        let snapshot = registry.snapshot(id).await.unwrap();
        assert_eq!(snapshot.current_turn, Player::One);
        assert_eq!(snapshot.moves.len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn undo_handing_the_turn_to_a_computer_queues_its_move() {
        let (registry, mut rx) = Registry::new(quick_config());
        let players = [
            Participant::computer("cpu", Algorithm::Minimax),
            Participant::human("bob"),
        ];
        let (id, _) = registry
            .create_game(players, GameOptions::default())
            .unwrap();
        assert_eq!(rx.recv().await, Some(Command::AiMove { game_id: id }));
        let opening = registry.play_ai_turn(id).await.unwrap().unwrap();
        let reply = (opening.applied.column + 1) % 7;
        registry.submit_move(id, "bob", reply, 5).await.unwrap();
        assert_eq!(rx.recv().await, Some(Command::AiMove { game_id: id }));

        // Take back both moves through the lifecycle; the computer's opening
        // is rewound too, so the computer is to move again.
        let undone = {
            let game = registry.game(id).unwrap();
            let mut game = game.lock().await;
            game.undo_move(Player::Two).unwrap();
            game.undo_move(Player::One).unwrap()
        };
        assert_eq!(undone.next_turn, Player::One);
        registry.dispatch(id, &undone.follow_ups);
        assert_eq!(rx.recv().await, Some(Command::AiMove { game_id: id }));
    }

    #[tokio::test]
    async fn human_undo_queues_nothing() {
        let (registry, mut rx) = Registry::new(quick_config());
        let (id, _) = registry
            .create_game(humans(), GameOptions::default())
            .unwrap();
        registry.submit_move(id, "alice", 3, 5).await.unwrap();
        let undone = registry.undo_move(id, "alice").await.unwrap();
        assert!(undone.follow_ups.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn out_of_range_depth_overrides_are_rejected_at_creation() {
        let (registry, _rx) = Registry::new(quick_config());
        let players = [
            Participant::human("alice"),
            Participant::Computer {
                id: "cpu".into(),
                algorithm: Algorithm::AlphaBeta,
                depth: Some(40),
            },
        ];
        let err = registry
            .create_game(players, GameOptions::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[tokio::test]
    async fn second_seat_computer_opens_the_game() {
        let (registry, mut rx) = Registry::new(quick_config());
        let players = [
            Participant::human("alice"),
            Participant::computer("cpu", Algorithm::AlphaBeta),
        ];
        let options = GameOptions {
            first_turn: FirstTurn::Two,
            ..GameOptions::default()
        };
        let (id, snapshot) = registry.create_game(players, options).unwrap();
        assert_eq!(snapshot.first_turn, Player::Two);
        assert_eq!(snapshot.current_turn, Player::Two);
        assert_eq!(rx.recv().await, Some(Command::AiMove { game_id: id }));

        let opening = registry.play_ai_turn(id).await.unwrap().unwrap();
        assert_eq!(opening.player, Player::Two);
        assert_eq!(opening.next_turn, Player::One);
    }

    #[tokio::test]
    async fn worker_plays_computer_games_and_records_one_result() {
        let (registry, rx) = Registry::new(quick_config());
        let worker = registry.spawn_worker(rx);
        let players = [
            Participant::computer("mm", Algorithm::Minimax),
            Participant::computer("ab", Algorithm::AlphaBeta),
        ];
        let (id, _) = registry
            .create_game(players, GameOptions::default())
            .unwrap();

        let mut finished = None;
        for _ in 0..600 {
            let snapshot = registry.snapshot(id).await.unwrap();
            if snapshot.status.is_terminal() {
                finished = Some(snapshot.status);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let status = finished.expect("computer game should finish");

        // The result command is queued after the final move commits.
        for _ in 0..100 {
            if registry.results(status) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.results(status), 1);
        worker.abort();
    }

    #[tokio::test]
    async fn analyze_reads_bare_grids() {
        let (registry, _rx) = Registry::new(quick_config());
        let mut board = vec![vec![0u8; 7]; 6];
        board[5][0] = 1;
        board[5][1] = 1;
        board[5][2] = 1;
        board[4][0] = 2;
        board[4][1] = 2;
        board[4][2] = 2;
        let outcome = registry
            .analyze(board, Player::Two, Algorithm::AlphaBeta, Some(2))
            .await
            .unwrap();
        assert_eq!(outcome.column, 3);

        let floating = {
            let mut grid = vec![vec![0u8; 7]; 6];
            grid[0][0] = 1;
            grid
        };
        assert!(matches!(
            registry
                .analyze(floating, Player::One, Algorithm::Minimax, None)
                .await,
            Err(ServiceError::Game(GameError::CorruptSnapshot(_)))
        ));
    }

    #[tokio::test]
    async fn analyze_rejects_oversized_grids() {
        let (registry, _rx) = Registry::new(quick_config());
        let board = vec![vec![0u8; 40]; 40];
        let err = registry
            .analyze(board, Player::One, Algorithm::AlphaBeta, Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
