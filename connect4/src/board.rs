use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::{GameError, Player};

/// Row-major grid of tokens, row 0 on top: 0 empty, 1 player one, 2 player two.
pub type WireGrid = Vec<Vec<u8>>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub column: usize,
    pub row: usize,
}

/// Mutable board with gravity drops and an undo stack.
///
/// `heights[c]` caches how many tokens sit in column `c`; the landing row of a
/// drop is read from it rather than scanned. `stack` holds every live drop in
/// order, so `undo` always reverts the most recent one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridBoard {
    rows: usize,
    columns: usize,
    cells: Vec<Option<Player>>,
    heights: Vec<usize>,
    stack: Vec<Position>,
}

impl GridBoard {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            cells: vec![None; rows * columns],
            heights: vec![0; columns],
            stack: Vec::with_capacity(rows * columns),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Token at `(row, column)`; `None` for empty or out-of-bounds cells.
    pub fn get(&self, row: usize, column: usize) -> Option<Player> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        self.cells[self.idx(row, column)]
    }

    pub fn at(&self, position: Position) -> Option<Player> {
        self.get(position.row, position.column)
    }

    pub fn fill_level(&self, column: usize) -> Option<usize> {
        self.heights.get(column).copied()
    }

    /// Row a token dropped into `column` would land in.
    pub fn open_row(&self, column: usize) -> Result<usize, GameError> {
        let height = self.fill_level(column).ok_or(GameError::InvalidColumn {
            column,
            columns: self.columns,
        })?;
        if height >= self.rows {
            return Err(GameError::ColumnFull { column });
        }
        Ok(self.rows - 1 - height)
    }

    pub fn drop_token(&mut self, column: usize, player: Player) -> Result<usize, GameError> {
        let row = self.open_row(column)?;
        let idx = self.idx(row, column);
        self.cells[idx] = Some(player);
        self.heights[column] += 1;
        self.stack.push(Position { column, row });
        Ok(row)
    }

    /// Reverts the most recent drop.
    pub fn undo(&mut self) -> Result<Position, GameError> {
        let position = self.stack.pop().ok_or(GameError::NoMovesToUndo)?;
        let idx = self.idx(position.row, position.column);
        self.cells[idx] = None;
        self.heights[position.column] -= 1;
        Ok(position)
    }

    /// Drops a token for the lifetime of the returned guard, which undoes the
    /// drop when it goes out of scope.
    pub fn play(&mut self, column: usize, player: Player) -> Result<PlayedMove<'_>, GameError> {
        let row = self.drop_token(column, player)?;
        Ok(PlayedMove {
            board: self,
            position: Position { column, row },
        })
    }

    /// Columns that can still take a token, in ascending order.
    pub fn open_columns(&self) -> Vec<usize> {
        (0..self.columns)
            .filter(|&column| self.heights[column] < self.rows)
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.stack.len() >= self.rows * self.columns
    }

    pub fn last_move(&self) -> Option<Position> {
        self.stack.last().copied()
    }

    pub fn moves_played(&self) -> usize {
        self.stack.len()
    }

    pub fn history(&self) -> &[Position] {
        &self.stack
    }

    pub fn to_wire(&self) -> WireGrid {
        (0..self.rows)
            .map(|row| {
                (0..self.columns)
                    .map(|column| self.get(row, column).map_or(0, Player::token))
                    .collect()
            })
            .collect()
    }

    /// Imports a bare grid. The order the tokens were played in is unknown, so
    /// the undo stack is rebuilt column by column from the bottom up.
    pub fn from_wire(grid: &WireGrid) -> Result<Self, GameError> {
        let rows = grid.len();
        let columns = grid.first().map_or(0, Vec::len);
        if rows == 0 || columns == 0 {
            return Err(GameError::CorruptSnapshot("board has no cells".to_string()));
        }
        if let Some(row) = grid.iter().position(|cells| cells.len() != columns) {
            return Err(GameError::CorruptSnapshot(format!(
                "row {row} has {} cells, expected {columns}",
                grid[row].len()
            )));
        }

        let mut board = Self::new(rows, columns);
        for column in 0..columns {
            let mut gap_seen = false;
            for row in (0..rows).rev() {
                let token = grid[row][column];
                if token == 0 {
                    gap_seen = true;
                    continue;
                }
                let player = Player::from_token(token).ok_or_else(|| {
                    GameError::CorruptSnapshot(format!(
                        "unknown token {token} at column {column}, row {row}"
                    ))
                })?;
                if gap_seen {
                    return Err(GameError::CorruptSnapshot(format!(
                        "token at column {column}, row {row} is floating"
                    )));
                }
                board.drop_token(column, player)?;
            }
        }
        Ok(board)
    }

    fn idx(&self, row: usize, column: usize) -> usize {
        row * self.columns + column
    }
}

impl fmt::Display for GridBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            let line: Vec<&str> = (0..self.columns)
                .map(|column| match self.get(row, column) {
                    None => ".",
                    Some(Player::One) => "X",
                    Some(Player::Two) => "O",
                })
                .collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

/// A drop held for the guard's lifetime. Dereferences to the board so search
/// can recurse into the child position; undone on drop.
pub struct PlayedMove<'a> {
    board: &'a mut GridBoard,
    position: Position,
}

impl PlayedMove<'_> {
    pub fn position(&self) -> Position {
        self.position
    }
}

impl Deref for PlayedMove<'_> {
    type Target = GridBoard;

    fn deref(&self) -> &GridBoard {
        self.board
    }
}

impl DerefMut for PlayedMove<'_> {
    fn deref_mut(&mut self) -> &mut GridBoard {
        self.board
    }
}

impl Drop for PlayedMove<'_> {
    fn drop(&mut self) {
        let undone = self.board.undo();
        debug_assert_eq!(undone, Ok(self.position), "unbalanced drop/undo under guard");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_is_contiguous(board: &GridBoard, column: usize) -> bool {
        let mut seen_empty = false;
        for row in (0..board.rows()).rev() {
            match board.get(row, column) {
                None => seen_empty = true,
                Some(_) if seen_empty => return false,
                Some(_) => {}
            }
        }
        true
    }

    #[test]
    fn drops_land_bottom_up() {
        let mut board = GridBoard::new(6, 7);
        assert_eq!(board.drop_token(3, Player::One), Ok(5));
        assert_eq!(board.drop_token(3, Player::Two), Ok(4));
        assert_eq!(board.get(5, 3), Some(Player::One));
        assert_eq!(board.get(4, 3), Some(Player::Two));
        assert_eq!(board.fill_level(3), Some(2));
        assert_eq!(board.last_move(), Some(Position { column: 3, row: 4 }));
    }

    #[test]
    fn rejects_out_of_bounds_and_full_columns() {
        let mut board = GridBoard::new(2, 3);
        assert_eq!(
            board.drop_token(3, Player::One),
            Err(GameError::InvalidColumn {
                column: 3,
                columns: 3
            })
        );
        board.drop_token(0, Player::One).unwrap();
        board.drop_token(0, Player::Two).unwrap();
        assert_eq!(
            board.drop_token(0, Player::One),
            Err(GameError::ColumnFull { column: 0 })
        );
        assert_eq!(board.open_columns(), vec![1, 2]);
    }

    #[test]
    fn undo_restores_identical_board() {
        let mut board = GridBoard::new(6, 7);
        board.drop_token(2, Player::One).unwrap();
        board.drop_token(4, Player::Two).unwrap();
        let before = board.clone();

        board.drop_token(2, Player::Two).unwrap();
        assert_eq!(board.undo(), Ok(Position { column: 2, row: 4 }));
        assert_eq!(board, before);
        assert_eq!(board.fill_level(2), Some(1));
    }

    #[test]
    fn undo_on_empty_board_fails() {
        let mut board = GridBoard::new(6, 7);
        assert_eq!(board.undo(), Err(GameError::NoMovesToUndo));
    }

    #[test]
    fn guard_undoes_on_scope_exit() {
        let mut board = GridBoard::new(6, 7);
        board.drop_token(0, Player::One).unwrap();
        let before = board.clone();
        {
            let mut played = board.play(0, Player::Two).unwrap();
            assert_eq!(played.position(), Position { column: 0, row: 4 });
            let nested = played.play(1, Player::One).unwrap();
            assert_eq!(nested.moves_played(), 3);
        }
        assert_eq!(board, before);
    }

    #[test]
    fn full_board_has_no_open_columns() {
        let mut board = GridBoard::new(2, 2);
        for column in 0..2 {
            board.drop_token(column, Player::One).unwrap();
            board.drop_token(column, Player::Two).unwrap();
        }
        assert!(board.is_full());
        assert!(board.open_columns().is_empty());
        assert!((0..2).all(|column| column_is_contiguous(&board, column)));
    }

    #[test]
    fn wire_grid_round_trips() {
        let mut board = GridBoard::new(6, 7);
        for (column, player) in [(3, Player::One), (3, Player::Two), (0, Player::One)] {
            board.drop_token(column, player).unwrap();
        }
        let wire = board.to_wire();
        assert_eq!(wire[5], vec![1, 0, 0, 1, 0, 0, 0]);
        assert_eq!(wire[4], vec![0, 0, 0, 2, 0, 0, 0]);

        let imported = GridBoard::from_wire(&wire).unwrap();
        assert_eq!(imported.to_wire(), wire);
        assert_eq!(imported.fill_level(3), Some(2));
        assert_eq!(imported.moves_played(), 3);
    }

    #[test]
    fn wire_import_rejects_floating_tokens() {
        let mut wire = vec![vec![0u8; 7]; 6];
        wire[3][2] = 1;
        assert!(matches!(
            GridBoard::from_wire(&wire),
            Err(GameError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn wire_import_rejects_unknown_tokens_and_ragged_rows() {
        let mut wire = vec![vec![0u8; 7]; 6];
        wire[5][0] = 7;
        assert!(GridBoard::from_wire(&wire).is_err());

        let ragged = vec![vec![0u8; 7], vec![0u8; 6]];
        assert!(GridBoard::from_wire(&ragged).is_err());
        assert!(GridBoard::from_wire(&Vec::new()).is_err());
    }

    #[test]
    fn renders_ascii() {
        let mut board = GridBoard::new(2, 3);
        board.drop_token(1, Player::One).unwrap();
        board.drop_token(1, Player::Two).unwrap();
        assert_eq!(board.to_string(), ". O .\n. X .\n");
    }
}
