//! Error taxonomies of the server core.
//!
//! None of these is process-fatal: a [`TransportError`] kills one connection
//! (and forfeits its session), a [`MoveError`] is discarded by the session loop
//! and a [`ProtocolError`] drops a single frame.

use std::io;

/// Placement rejected by the board. The board is never partially mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("column {0} is full")]
    FullColumn(usize),

    #[error("column {0} is outside the board")]
    InvalidColumn(usize),
}

/// A move that cannot be applied to the current game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("game is already over")]
    GameOver,

    #[error("column {0} is outside the board")]
    OutOfRange(i64),

    #[error(transparent)]
    Board(#[from] BoardError),
}

/// Failure of the byte stream under a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connection is closed")]
    Closed,

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
}

/// A frame that was read intact but does not decode to a known envelope.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),
}

/// Errors surfaced by [`crate::connection::MessageReader::receive`].
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_error_display() {
        assert_eq!(BoardError::FullColumn(3).to_string(), "column 3 is full");
        assert_eq!(
            BoardError::InvalidColumn(9).to_string(),
            "column 9 is outside the board"
        );
    }

    #[test]
    fn test_move_error_wraps_board_error() {
        let err: MoveError = BoardError::FullColumn(2).into();
        assert_eq!(err, MoveError::Board(BoardError::FullColumn(2)));
        assert_eq!(err.to_string(), "column 2 is full");
    }

    #[test]
    fn test_frame_too_large_display() {
        let err = TransportError::FrameTooLarge { len: 70_000, max: 65_536 };
        assert_eq!(
            err.to_string(),
            "frame of 70000 bytes exceeds the 65536 byte limit"
        );
    }
}
