use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::game::{Board, Move, COLS};

/// Plays a uniformly random open column.
#[derive(Debug)]
pub struct RandomChoice {
    rng: StdRng,
}

impl RandomChoice {
    pub fn new() -> Self {
        RandomChoice {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        RandomChoice {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Samples columns until one is open. `None` on a full board.
    pub fn choose(&mut self, board: &Board) -> Option<Move> {
        if board.is_full() {
            return None;
        }
        loop {
            let col = self.rng.random_range(0..COLS);
            if !board.is_column_full(col) {
                return Some(Move::new(col));
            }
        }
    }
}

impl Default for RandomChoice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Color, ROWS};

    #[test]
    fn test_random_choice_selects_open_column() {
        let mut board = Board::new();
        // leave only column 5 open
        for col in (0..COLS).filter(|&c| c != 5) {
            for _ in 0..ROWS {
                board.add_piece(col, Color::Red).unwrap();
            }
        }
        let mut random = RandomChoice::with_seed(3);
        for _ in 0..50 {
            assert_eq!(random.choose(&board), Some(Move::new(5)));
        }
    }

    #[test]
    fn test_random_choice_on_full_board() {
        let mut board = Board::new();
        for col in 0..COLS {
            for _ in 0..ROWS {
                board.add_piece(col, Color::Yellow).unwrap();
            }
        }
        assert_eq!(RandomChoice::new().choose(&board), None);
    }

    #[test]
    fn test_random_choice_covers_columns() {
        let board = Board::new();
        let mut random = RandomChoice::with_seed(11);
        let mut seen = [false; COLS];
        for _ in 0..500 {
            if let Some(mv) = random.choose(&board) {
                seen[mv.column] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }
}
