use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BoardError;

pub const ROWS: usize = 6;
pub const COLS: usize = 7;

/// Color of a seat and of the pieces it drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Color {
    Red,
    Yellow,
}

impl Color {
    /// Get the other color
    pub fn other(self) -> Color {
        match self {
            Color::Red => Color::Yellow,
            Color::Yellow => Color::Red,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Color::Red => "RED",
            Color::Yellow => "YELLOW",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

/// A dropped piece. Never moves once placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Piece {
    pub position: Position,
    pub color: Color,
}

/// Fixed `ROWS`x`COLS` grid. Row 0 is the bottom row.
///
/// `heights[col]` is the fill pointer of a column: the row the next piece
/// dropped there lands on. Cells below it are occupied, cells at or above it
/// are empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board {
    cells: [[Option<Piece>; COLS]; ROWS],
    heights: [usize; COLS],
}

impl Board {
    /// Create a new empty board
    pub fn new() -> Self {
        Board {
            cells: [[None; COLS]; ROWS],
            heights: [0; COLS],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Piece> {
        self.cells.get(row)?.get(col).copied().flatten()
    }

    /// Color occupying a cell, `None` if empty or outside the grid.
    pub fn color_at(&self, row: usize, col: usize) -> Option<Color> {
        self.get(row, col).map(|piece| piece.color)
    }

    /// Pieces stacked in `col`, `None` for a column off the board.
    pub fn height(&self, col: usize) -> Option<usize> {
        self.heights.get(col).copied()
    }

    pub fn is_column_full(&self, col: usize) -> bool {
        col >= COLS || self.heights[col] == ROWS
    }

    /// Drop a piece in `col`. Returns the landed piece.
    ///
    /// On error the board is left untouched.
    pub fn add_piece(&mut self, col: usize, color: Color) -> Result<Piece, BoardError> {
        if col >= COLS {
            return Err(BoardError::InvalidColumn(col));
        }
        let row = self.heights[col];
        if row == ROWS {
            return Err(BoardError::FullColumn(col));
        }

        let piece = Piece {
            position: Position { row, col },
            color,
        };
        self.cells[row][col] = Some(piece);
        self.heights[col] += 1;
        Ok(piece)
    }

    pub fn is_full(&self) -> bool {
        self.heights.iter().all(|&h| h == ROWS)
    }

    /// Columns that can still take a piece, left to right.
    pub fn open_columns(&self) -> impl Iterator<Item = usize> + '_ {
        (0..COLS).filter(|&col| !self.is_column_full(col))
    }

    pub fn piece_count(&self) -> usize {
        self.heights.iter().sum()
    }

    /// Occupied cells in row-major order, bottom row first.
    pub fn pieces(&self) -> impl Iterator<Item = Piece> + '_ {
        self.cells.iter().flat_map(|row| row.iter().flatten().copied())
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in (0..ROWS).rev() {
            for col in 0..COLS {
                let c = match self.color_at(row, col) {
                    Some(Color::Red) => 'R',
                    Some(Color::Yellow) => 'Y',
                    None => '.',
                };
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new();
        for row in 0..ROWS {
            for col in 0..COLS {
                assert_eq!(board.get(row, col), None);
            }
        }
        assert_eq!(board.piece_count(), 0);
        assert!(!board.is_full());
    }

    #[test]
    fn test_add_piece_stacks_from_bottom() {
        let mut board = Board::new();

        let first = board.add_piece(3, Color::Red).unwrap();
        assert_eq!(first.position, Position { row: 0, col: 3 });

        let second = board.add_piece(3, Color::Yellow).unwrap();
        assert_eq!(second.position, Position { row: 1, col: 3 });
        assert_eq!(board.height(3), Some(2));
        assert_eq!(board.height(COLS), None);
        assert_eq!(board.color_at(1, 3), Some(Color::Yellow));
    }

    #[test]
    fn test_full_column_leaves_board_unchanged() {
        let mut board = Board::new();
        for _ in 0..ROWS {
            board.add_piece(0, Color::Red).unwrap();
        }
        let before = board;

        assert_eq!(board.add_piece(0, Color::Yellow), Err(BoardError::FullColumn(0)));
        assert_eq!(board, before);
    }

    #[test]
    fn test_invalid_column() {
        let mut board = Board::new();
        assert_eq!(board.add_piece(7, Color::Red), Err(BoardError::InvalidColumn(7)));
        assert_eq!(board, Board::new());
    }

    #[test]
    fn test_full_board() {
        let mut board = Board::new();
        for col in 0..COLS {
            for _ in 0..ROWS {
                board.add_piece(col, Color::Red).unwrap();
            }
        }
        assert!(board.is_full());
        assert_eq!(board.open_columns().count(), 0);
    }

    #[test]
    fn test_display_puts_bottom_row_last() {
        let mut board = Board::new();
        board.add_piece(0, Color::Red).unwrap();
        let rendered = board.to_string();
        assert_eq!(rendered.lines().last(), Some("R......"));
    }

    proptest! {
        #[test]
        fn full_iff_every_fill_pointer_at_top(cols in proptest::collection::vec(0usize..COLS, 0..80)) {
            let mut board = Board::new();
            let mut color = Color::Red;
            for col in cols {
                let before = board;
                let full_before = board.is_column_full(col);
                match board.add_piece(col, color) {
                    Ok(_) => prop_assert!(!full_before),
                    Err(BoardError::FullColumn(_)) => prop_assert_eq!(board, before),
                    Err(e) => prop_assert!(false, "unexpected error {e}"),
                }
                color = color.other();
                prop_assert_eq!(board.is_full(), (0..COLS).all(|c| board.height(c) == Some(ROWS)));
            }
        }

        #[test]
        fn fill_pointers_never_decrease(cols in proptest::collection::vec(0usize..COLS, 0..60)) {
            let mut board = Board::new();
            for col in cols {
                let heights: Vec<_> = (0..COLS).map(|c| board.height(c).unwrap()).collect();
                let _ = board.add_piece(col, Color::Yellow);
                for c in 0..COLS {
                    let height = board.height(c).unwrap();
                    prop_assert!(height >= heights[c]);
                    prop_assert!(height <= ROWS);
                }
            }
        }
    }
}
