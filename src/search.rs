//! Two-ply placement search.
//!
//! Every rotation of the current piece is tried at every anchor column, hard
//! dropped onto a private copy of the board, and scored; the resulting board
//! is then searched again for the best placement of the next piece. The live
//! game is never touched, so the search can run on any board snapshot.

use crate::evaluator;
use crate::game::{Board, Game, Tetromino, TetrominoType};

const CURRENT_PLY_WEIGHT: f64 = 0.6;
const NEXT_PLY_WEIGHT: f64 = 0.4;

// Anchor columns tried are -2 ..= width + 1.
const COLUMN_MARGIN: i16 = 2;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Move {
    pub rotation: usize,
    pub column: i16,
}

struct Placement {
    mv: Move,
    board: Board,
}

/// Hard-drops `kind` at `rotation`/`column` from row 0. `None` when the piece
/// does not fit at the top of that column.
fn drop_piece(board: &Board, kind: TetrominoType, rotation: usize, column: i16) -> Option<Tetromino> {
    let mut piece = Tetromino::new_at(kind, column, 0).with_rotation(rotation);
    if !board.is_legal(&piece, 0, 0) {
        return None;
    }
    while board.is_legal(&piece, 0, 1) {
        piece = piece.moved(0, 1);
    }
    board.is_legal(&piece, 0, 0).then_some(piece)
}

/// Every resting placement of `kind`, rotation-major then left to right,
/// paired with the board it leaves after line clears.
fn placements(board: &Board, kind: TetrominoType) -> impl Iterator<Item = Placement> + '_ {
    let width = i16::try_from(board.width()).unwrap_or(i16::MAX);
    let columns = -COLUMN_MARGIN..=width.saturating_add(COLUMN_MARGIN - 1);
    (0..kind.rotation_count()).flat_map(move |rotation| {
        columns.clone().filter_map(move |column| {
            let piece = drop_piece(board, kind, rotation, column)?;
            let mut settled = board.clone();
            settled.commit(&piece);
            settled.clear_full_rows();
            Some(Placement {
                mv: Move { rotation, column },
                board: settled,
            })
        })
    })
}

fn best_reply(board: &Board, next: TetrominoType) -> Option<f64> {
    placements(board, next)
        .map(|placement| evaluator::score(&placement.board, next))
        .fold(None, |best, score| Some(best.map_or(score, |b: f64| b.max(score))))
}

/// Best placement for the game's current piece, looking one piece ahead.
pub fn best_move(game: &Game) -> Option<Move> {
    best_move_on(
        &game.board,
        game.current_piece.tetromino_type,
        game.next_piece.tetromino_type,
    )
}

/// Two-ply search over an arbitrary board. Ties keep the first candidate in
/// rotation-then-column order.
pub fn best_move_on(board: &Board, current: TetrominoType, next: TetrominoType) -> Option<Move> {
    let mut best: Option<(f64, Move)> = None;

    for placement in placements(board, current) {
        let immediate = evaluator::score(&placement.board, current);
        let combined = match best_reply(&placement.board, next) {
            Some(reply) => CURRENT_PLY_WEIGHT * immediate + NEXT_PLY_WEIGHT * reply,
            None => immediate,
        };

        if best.map_or(true, |(score, _)| combined > score) {
            best = Some((combined, placement.mv));
        }
    }

    best.map(|(_, mv)| mv)
}

/// Single-ply variant: ignores the next piece.
pub fn best_move_greedy(game: &Game) -> Option<Move> {
    let current = game.current_piece.tetromino_type;
    let mut best: Option<(f64, Move)> = None;

    for placement in placements(&game.board, current) {
        let score = evaluator::score(&placement.board, current);
        if best.map_or(true, |(b, _)| score > b) {
            best = Some((score, placement.mv));
        }
    }

    best.map(|(_, mv)| mv)
}

/// Steers the current piece toward `mv`: clockwise rotations first, then one
/// column at a time, stopping at the first rejected step. Does not drop.
///
/// Returns whether the piece ended at the requested rotation and column.
pub fn execute_move(game: &mut Game, mv: Move) -> bool {
    let rotation_count = game.current_piece.tetromino_type.rotation_count();
    if mv.rotation >= rotation_count {
        return false;
    }

    for _ in 1..rotation_count {
        if game.current_piece.rotation == mv.rotation || !game.rotate_cw() {
            break;
        }
    }

    while game.current_piece.position.x < mv.column && game.move_piece(1) {}
    while game.current_piece.position.x > mv.column && game.move_piece(-1) {}

    game.current_piece.rotation == mv.rotation && game.current_piece.position.x == mv.column
}
