//! Property tests for the board model and game transitions.
//!
//! Invariants covered:
//! - Clearing rows keeps the board size, removes exactly the full rows and
//!   keeps the surviving rows in their original order.
//! - A placement is legal exactly when every cell is inside the columns,
//!   above the floor and not on a filled cell; committing it fills exactly
//!   its on-board cells.
//! - Arbitrary input sequences keep the live piece legal, the score
//!   monotonic and the level in step with cleared lines.

use proptest::prelude::*;

use blockfall::game::{
    Board, CellState, Game, Tetromino, TetrominoType, LINES_PER_LEVEL,
};

fn arb_kind() -> impl Strategy<Value = TetrominoType> {
    prop::sample::select(TetrominoType::ALL.to_vec())
}

/// Random boards where roughly a third of the rows are forced full.
fn arb_board() -> impl Strategy<Value = Board> {
    (4usize..12, 4usize..22).prop_flat_map(|(width, height)| {
        (
            prop::collection::vec(any::<bool>(), width * height),
            prop::collection::vec(prop::bool::weighted(0.3), height),
        )
            .prop_map(move |(cells, full_rows)| {
                let mut board = Board::new(width, height).unwrap();
                for y in 0..height {
                    for x in 0..width {
                        if full_rows[y] || cells[y * width + x] {
                            board.set(x, y, CellState::Filled(TetrominoType::J));
                        }
                    }
                }
                board
            })
    })
}

#[derive(Clone, Copy, Debug)]
enum Input {
    Left,
    Right,
    RotateCw,
    RotateCcw,
    SoftDrop,
    HardDrop,
}

fn arb_input() -> impl Strategy<Value = Input> {
    prop_oneof![
        Just(Input::Left),
        Just(Input::Right),
        Just(Input::RotateCw),
        Just(Input::RotateCcw),
        Just(Input::SoftDrop),
        Just(Input::HardDrop),
    ]
}

proptest! {
    #[test]
    fn clearing_rows_keeps_survivors_in_order(board in arb_board()) {
        let full: Vec<bool> = (0..board.height()).map(|y| board.is_row_complete(y)).collect();
        let survivors: Vec<Vec<CellState>> = board
            .rows()
            .iter()
            .zip(&full)
            .filter(|(_, is_full)| !**is_full)
            .map(|(row, _)| row.clone())
            .collect();
        let expected_cleared = full.iter().filter(|&&f| f).count();

        let mut cleared_board = board.clone();
        let cleared = cleared_board.clear_full_rows();

        prop_assert_eq!(cleared as usize, expected_cleared);
        prop_assert_eq!(cleared_board.width(), board.width());
        prop_assert_eq!(cleared_board.height(), board.height());

        let rows = cleared_board.rows();
        prop_assert_eq!(rows.len(), board.height());
        prop_assert!(rows[..expected_cleared]
            .iter()
            .all(|row| row.iter().all(|cell| *cell == CellState::Empty)));
        prop_assert_eq!(&rows[expected_cleared..], &survivors[..]);
        prop_assert!((0..cleared_board.height()).all(|y| !cleared_board.is_row_complete(y)));
    }

    #[test]
    fn legality_matches_cell_checks(
        board in arb_board(),
        kind in arb_kind(),
        rotation in 0usize..4,
        x in -4i16..16,
        y in -4i16..24,
    ) {
        let piece = Tetromino::new_at(kind, x, y).with_rotation(rotation);
        let fits = piece.blocks().iter().all(|block| {
            block.x >= 0
                && (block.x as usize) < board.width()
                && (block.y as i64) < board.height() as i64
                && (block.y < 0 || !board.is_filled(block.x as usize, block.y as usize))
        });
        prop_assert_eq!(board.is_legal(&piece, 0, 0), fits);
        if !fits {
            return Ok(());
        }

        let on_board = piece.blocks().iter().filter(|b| b.y >= 0).count();
        let mut committed = board.clone();
        committed.commit(&piece);
        prop_assert_eq!(
            committed.total_filled_cells(),
            board.total_filled_cells() + on_board
        );
    }

    #[test]
    fn input_sequences_keep_game_consistent(
        seed in any::<u64>(),
        inputs in prop::collection::vec(arb_input(), 1..300),
    ) {
        let mut game = Game::with_seed(10, 20, seed).unwrap();

        for input in inputs {
            if game.is_game_over() {
                break;
            }
            let score = game.score;
            let lines = game.lines_cleared;

            match input {
                Input::Left => { game.move_piece(-1); }
                Input::Right => { game.move_piece(1); }
                Input::RotateCw => { game.rotate_piece(true); }
                Input::RotateCcw => { game.rotate_piece(false); }
                Input::SoftDrop => { game.soft_drop(); }
                Input::HardDrop => game.hard_drop(),
            }

            prop_assert!(game.score >= score);
            prop_assert!(game.lines_cleared >= lines);
            prop_assert_eq!(game.level, game.lines_cleared / LINES_PER_LEVEL + 1);
            prop_assert_eq!(game.board.width(), 10);
            prop_assert_eq!(game.board.height(), 20);
            if !game.is_game_over() {
                prop_assert!(game.board.is_legal(&game.current_piece, 0, 0));
            }
        }
    }
}
