use super::board::{Board, Color, Position, COLS, ROWS};

/// Length of a winning run.
pub const CONNECT: usize = 4;

/// Row/column steps scanned from every piece: horizontal, vertical and both
/// diagonals.
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Four aligned cells of the same color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinningLine {
    pub color: Color,
    pub cells: [Position; CONNECT],
}

/// Scans a board for a completed run.
pub struct WinnerChecker;

impl WinnerChecker {
    /// First winning run found scanning occupied cells in row-major order.
    pub fn find(board: &Board) -> Option<WinningLine> {
        board.pieces().find_map(|piece| {
            DIRECTIONS
                .iter()
                .find_map(|&dir| Self::run_from(board, piece.position, piece.color, dir))
        })
    }

    pub fn has_winner(board: &Board) -> bool {
        Self::find(board).is_some()
    }

    pub fn winner(board: &Board) -> Option<Color> {
        Self::find(board).map(|line| line.color)
    }

    fn run_from(
        board: &Board,
        start: Position,
        color: Color,
        (d_row, d_col): (isize, isize),
    ) -> Option<WinningLine> {
        let mut cells = [start; CONNECT];
        for (i, cell) in cells.iter_mut().enumerate() {
            let row = start.row as isize + d_row * i as isize;
            let col = start.col as isize + d_col * i as isize;
            if row < 0 || col < 0 || row >= ROWS as isize || col >= COLS as isize {
                return None;
            }
            let (row, col) = (row as usize, col as usize);
            if board.color_at(row, col) != Some(color) {
                return None;
            }
            *cell = Position { row, col };
        }
        Some(WinningLine { color, cells })
    }
}
