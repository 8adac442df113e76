//! Win and draw detection around the most recent drop.
//!
//! Only the last token placed can complete a new line, so each check walks
//! outward from that cell along the four axes instead of scanning the grid.
use crate::{GridBoard, Player, Position};

/// Row/column steps for horizontal, vertical and both diagonals.
pub(crate) const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// True when the token at `last` sits in a run of at least `connect` along any axis.
pub fn has_win_at(board: &GridBoard, last: Position, connect: usize) -> bool {
    let Some(player) = board.at(last) else {
        return false;
    };
    AXES.iter()
        .any(|&step| run_length(board, last, player, step) >= connect)
}

/// Board is full and the drop that filled it did not win.
pub fn is_draw(board: &GridBoard, last: Option<Position>, connect: usize) -> bool {
    board.is_full() && !last.is_some_and(|position| has_win_at(board, position, connect))
}

/// Cells of the completed run through `last`, ordered from one end to the other.
pub fn winning_line(board: &GridBoard, last: Position, connect: usize) -> Option<Vec<Position>> {
    let player = board.at(last)?;
    AXES.iter().find_map(|&(dr, dc)| {
        if run_length(board, last, player, (dr, dc)) < connect {
            return None;
        }
        let back = count_direction(board, last, player, (-dr, -dc));
        let forward = count_direction(board, last, player, (dr, dc));
        let line = (-(back as isize)..=forward as isize)
            .filter_map(|offset| offset_position(last, dr * offset, dc * offset))
            .collect();
        Some(line)
    })
}

/// Holder of the token at the last drop if that drop won, used by callers that
/// need the winner rather than a yes/no answer.
pub fn winner_at(board: &GridBoard, last: Position, connect: usize) -> Option<Player> {
    has_win_at(board, last, connect)
        .then(|| board.at(last))
        .flatten()
}

/// Scans every occupied cell. Only needed for boards whose move order is
/// unknown, such as grids imported from the wire format.
pub fn find_winner(board: &GridBoard, connect: usize) -> Option<Player> {
    (0..board.rows())
        .flat_map(|row| (0..board.columns()).map(move |column| Position { column, row }))
        .find_map(|position| winner_at(board, position, connect))
}

fn run_length(board: &GridBoard, from: Position, player: Player, (dr, dc): (isize, isize)) -> usize {
    1 + count_direction(board, from, player, (dr, dc)) + count_direction(board, from, player, (-dr, -dc))
}

fn count_direction(board: &GridBoard, from: Position, player: Player, (dr, dc): (isize, isize)) -> usize {
    let mut count = 0;
    let mut offset = 1;
    while let Some(position) = offset_position(from, dr * offset, dc * offset) {
        if board.at(position) != Some(player) {
            break;
        }
        count += 1;
        offset += 1;
    }
    count
}

fn offset_position(from: Position, dr: isize, dc: isize) -> Option<Position> {
    Some(Position {
        row: from.row.checked_add_signed(dr)?,
        column: from.column.checked_add_signed(dc)?,
    })
}
