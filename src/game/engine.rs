use super::board::{Board, Color, Piece, COLS};
use super::winner::WinnerChecker;
use crate::error::MoveError;

/// A column to drop into. Validity is checked against a board when applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub column: usize,
}

impl Move {
    pub fn new(column: usize) -> Self {
        Move { column }
    }

    /// Range-check a column received from the wire.
    pub fn from_wire(column: i64) -> Result<Move, MoveError> {
        match usize::try_from(column) {
            Ok(col) if col < COLS => Ok(Move::new(col)),
            _ => Err(MoveError::OutOfRange(column)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Winner(Color),
    Draw,
}

impl GameOutcome {
    pub fn winner(self) -> Option<Color> {
        match self {
            GameOutcome::Winner(color) => Some(color),
            GameOutcome::Draw => None,
        }
    }
}

/// Board plus turn: the rules of one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameEngine {
    board: Board,
    turn: Color,
    outcome: Option<GameOutcome>,
}

impl GameEngine {
    /// Red moves first.
    pub fn new() -> Self {
        GameEngine {
            board: Board::new(),
            turn: Color::Red,
            outcome: None,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn outcome(&self) -> Option<GameOutcome> {
        self.outcome
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Drop a piece for the color on turn, then evaluate the terminal condition.
    pub fn apply(&mut self, mv: Move) -> Result<Piece, MoveError> {
        if self.is_terminal() {
            return Err(MoveError::GameOver);
        }
        let piece = self.board.add_piece(mv.column, self.turn)?;

        self.outcome = if let Some(winner) = WinnerChecker::winner(&self.board) {
            Some(GameOutcome::Winner(winner))
        } else if self.board.is_full() {
            Some(GameOutcome::Draw)
        } else {
            None
        };
        self.turn = self.turn.other();
        Ok(piece)
    }

    pub fn reset(&mut self) {
        *self = GameEngine::new();
    }
}

impl Default for GameEngine {
    fn default() -> Self {
        Self::new()
    }
}
