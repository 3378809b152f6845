//! Tests for the placement search and move execution
//!
//! Test categories:
//! - Search results on hand-built boards
//! - Search purity (the live game is never touched)
//! - Steering the current piece with execute_move
//! - Full autoplay runs

use blockfall::game::{
    test_helpers::*, CellState, Game, Position, SequencePieceProvider, Tetromino, TetrominoType,
    DEFAULT_HEIGHT, DEFAULT_WIDTH,
};
use blockfall::search::{best_move, best_move_greedy, best_move_on, execute_move, Move};

fn sequence_game(pieces: Vec<TetrominoType>) -> Game {
    Game::with_provider(
        DEFAULT_WIDTH,
        DEFAULT_HEIGHT,
        Box::new(SequencePieceProvider::new(pieces)),
    )
    .unwrap()
}

/// Four nearly full rows with the rightmost column open.
fn tetris_ready_board() -> blockfall::game::Board {
    let mut board = empty_board();
    for y in (DEFAULT_HEIGHT - 4)..DEFAULT_HEIGHT {
        fill_row_with_gap(&mut board, y, DEFAULT_WIDTH - 1);
    }
    board
}

fn autoplay(game: &mut Game, pieces: usize) {
    for _ in 0..pieces {
        if game.is_game_over() {
            break;
        }
        if let Some(mv) = best_move(game) {
            execute_move(game, mv);
        }
        game.hard_drop();
    }
}

// ============================================================================
// Search Tests
// ============================================================================

mod search {
    use super::*;

    #[test]
    fn o_piece_hugs_left_wall_on_empty_board() {
        let game = sequence_game(vec![TetrominoType::O]);
        assert_eq!(best_move(&game), Some(Move { rotation: 0, column: 0 }));
    }

    #[test]
    fn greedy_search_agrees_on_empty_board() {
        let game = sequence_game(vec![TetrominoType::O]);
        assert_eq!(best_move_greedy(&game), Some(Move { rotation: 0, column: 0 }));
    }

    #[test]
    fn vertical_i_takes_the_tetris() {
        let board = tetris_ready_board();
        let mv = best_move_on(&board, TetrominoType::I, TetrominoType::O);
        assert_eq!(mv, Some(Move { rotation: 1, column: 9 }));
    }

    #[test]
    fn search_result_is_a_reachable_placement() {
        let board = tetris_ready_board();
        for kind in TetrominoType::ALL {
            let mv = best_move_on(&board, kind, TetrominoType::T).unwrap();
            let piece = Tetromino::new_at(kind, mv.column, 0).with_rotation(mv.rotation);

            assert!(mv.rotation < kind.rotation_count());
            assert!(board.is_legal(&piece, 0, 0), "{kind:?} -> {mv:?}");
        }
    }

    #[test]
    fn no_move_when_board_is_full() {
        let mut board = empty_board();
        for y in 0..DEFAULT_HEIGHT {
            fill_row(&mut board, y);
        }
        assert_eq!(best_move_on(&board, TetrominoType::T, TetrominoType::I), None);
    }

    #[test]
    fn search_leaves_game_untouched() {
        let mut game = Game::with_seed(DEFAULT_WIDTH, DEFAULT_HEIGHT, 11).unwrap();
        game.board.set(3, DEFAULT_HEIGHT - 1, CellState::Filled(TetrominoType::Z));
        let board = game.board.clone();
        let current = game.current_piece;
        let next = game.next_piece;
        game.take_events();

        best_move(&game);
        best_move_greedy(&game);

        assert_eq!(game.board, board);
        assert_eq!(game.current_piece, current);
        assert_eq!(game.next_piece, next);
        assert!(game.take_events().is_empty());
    }
}

// ============================================================================
// Move Execution Tests
// ============================================================================

mod execution {
    use super::*;

    #[test]
    fn rotates_then_slides_to_target() {
        let mut game = sequence_game(vec![TetrominoType::T]);

        assert!(execute_move(&mut game, Move { rotation: 1, column: 0 }));
        assert_eq!(game.current_piece.rotation, 1);
        assert_eq!(game.current_piece.position.x, 0);
    }

    #[test]
    fn does_not_drop_the_piece() {
        let mut game = sequence_game(vec![TetrominoType::L]);
        let start_y = game.current_piece.position.y;

        execute_move(&mut game, Move { rotation: 2, column: 7 });

        assert_eq!(game.current_piece.position.y, start_y);
        assert_eq!(game.board.total_filled_cells(), 0);
    }

    #[test]
    fn stops_at_right_wall() {
        let mut game = sequence_game(vec![TetrominoType::O]);

        assert!(!execute_move(&mut game, Move { rotation: 0, column: 20 }));
        assert_eq!(game.current_piece.position.x, DEFAULT_WIDTH as i16 - 2);
    }

    #[test]
    fn stops_at_left_wall() {
        let mut game = sequence_game(vec![TetrominoType::O]);

        assert!(!execute_move(&mut game, Move { rotation: 0, column: -5 }));
        assert_eq!(game.current_piece.position.x, 0);
    }

    #[test]
    fn unknown_rotation_is_rejected() {
        let mut game = sequence_game(vec![TetrominoType::O]);
        let before = game.current_piece;

        assert!(!execute_move(&mut game, Move { rotation: 1, column: 0 }));
        assert_eq!(game.current_piece, before);
    }

    #[test]
    fn slide_stops_at_obstacle() {
        let mut board = empty_board();
        for y in 0..DEFAULT_HEIGHT {
            board.set(7, y, CellState::Filled(TetrominoType::I));
        }
        let piece = Tetromino::new_at(TetrominoType::O, 2, 5);
        let mut game = Game::with_board(board, piece);

        assert!(!execute_move(&mut game, Move { rotation: 0, column: 8 }));
        assert_eq!(game.current_piece.position, Position { x: 5, y: 5 });
    }

    #[test]
    fn executed_tetris_clears_four_lines() {
        let mut game = sequence_game(vec![TetrominoType::I, TetrominoType::O]);
        game.board = tetris_ready_board();

        let mv = best_move(&game).unwrap();
        assert!(execute_move(&mut game, mv));
        game.hard_drop();

        assert_eq!(game.lines_cleared, 4);
        assert_eq!(game.board.total_filled_cells(), 0);
    }
}

// ============================================================================
// Autoplay Tests
// ============================================================================

mod autoplay {
    use super::*;

    #[test]
    fn seeded_runs_are_identical() {
        let mut a = Game::with_seed(DEFAULT_WIDTH, DEFAULT_HEIGHT, 2024).unwrap();
        let mut b = Game::with_seed(DEFAULT_WIDTH, DEFAULT_HEIGHT, 2024).unwrap();

        autoplay(&mut a, 25);
        autoplay(&mut b, 25);

        assert_eq!(a.board, b.board);
        assert_eq!(a.score, b.score);
        assert_eq!(a.current_piece, b.current_piece);
    }

    #[test]
    fn autoplayer_survives_and_clears_lines() {
        let mut game = Game::with_seed(DEFAULT_WIDTH, DEFAULT_HEIGHT, 7).unwrap();

        autoplay(&mut game, 60);

        // 60 pieces do not fit on a 10x20 board without clearing rows.
        assert!(!game.is_game_over());
        assert!(game.lines_cleared > 0);
        assert!(game.score > 0);
    }
}
