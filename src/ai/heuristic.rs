use crate::game::{Board, Color, COLS, CONNECT, ROWS};

const CENTER_COL: usize = COLS / 2;
const CENTER_BONUS: i32 = 50;

/// Static evaluation of a board from `own`'s point of view.
///
/// Every 4-cell window (rows, columns, both diagonals) is scored by how many
/// of its cells each side holds; a window both sides share is dead and scores
/// nothing. Each own piece in the center column adds a flat bonus.
pub fn evaluate(board: &Board, own: Color) -> i32 {
    let mut score = 0;

    for row in 0..ROWS {
        if board.color_at(row, CENTER_COL) == Some(own) {
            score += CENTER_BONUS;
        }
    }

    // Horizontal
    for row in 0..ROWS {
        for col in 0..=COLS - CONNECT {
            score += score_window(board, own, |i| (row, col + i));
        }
    }

    // Vertical
    for col in 0..COLS {
        for row in 0..=ROWS - CONNECT {
            score += score_window(board, own, |i| (row + i, col));
        }
    }

    // Diagonal, rising to the right
    for row in 0..=ROWS - CONNECT {
        for col in 0..=COLS - CONNECT {
            score += score_window(board, own, |i| (row + i, col + i));
        }
    }

    // Diagonal, rising to the left
    for row in 0..=ROWS - CONNECT {
        for col in CONNECT - 1..COLS {
            score += score_window(board, own, |i| (row + i, col - i));
        }
    }

    score
}

fn score_window(board: &Board, own: Color, cell: impl Fn(usize) -> (usize, usize)) -> i32 {
    let mut mine = 0;
    let mut theirs = 0;
    for i in 0..CONNECT {
        let (row, col) = cell(i);
        match board.color_at(row, col) {
            Some(color) if color == own => mine += 1,
            Some(_) => theirs += 1,
            None => {}
        }
    }
    window_value(mine, theirs)
}

/// Score of a window holding `mine` own pieces and `theirs` opponent pieces;
/// the remaining cells are empty.
fn window_value(mine: usize, theirs: usize) -> i32 {
    match (mine, theirs) {
        (4, 0) => 1000,
        (3, 0) => 100,
        (2, 0) => 10,
        (1, 0) => 1,
        (0, 4) => -1000,
        (0, 3) => -100,
        (0, 2) => -10,
        (0, 1) => -1,
        _ => 0,
    }
}
