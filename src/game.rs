use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_WIDTH: usize = 10;
pub const DEFAULT_HEIGHT: usize = 20;
pub const MIN_DIMENSION: usize = 4;
// Piece coordinates are i16.
pub const MAX_DIMENSION: usize = i16::MAX as usize;

// Timing (in milliseconds)
const BASE_FALL_MS: u64 = 800;
const MIN_FALL_MS: u64 = 100;
const SPEED_INCREASE_PER_LEVEL: u64 = 50;
pub const LINES_PER_LEVEL: u32 = 10;

// Scoring
pub const SCORE_SINGLE: u32 = 100;
pub const SCORE_DOUBLE: u32 = 300;
pub const SCORE_TRIPLE: u32 = 500;
pub const SCORE_TETRIS: u32 = 800;

// Nudges tried, in order, when a rotation lands on an illegal position.
const WALL_KICKS: [(i16, i16); 5] = [(-1, 0), (1, 0), (0, -1), (-2, 0), (2, 0)];

// ============================================================================
// Errors
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum GameError {
    #[error("board dimensions must be between 4x4 and 32767x32767, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
}

// ============================================================================
// Piece Catalog
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Position {
    pub x: i16,
    pub y: i16,
}

/// One rotation state: bounding box size plus the `(dx, dy)` offsets of the
/// four occupied cells inside it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Shape {
    pub width: i16,
    pub height: i16,
    pub cells: [(i16, i16); 4],
}

const fn shape(width: i16, height: i16, cells: [(i16, i16); 4]) -> Shape {
    Shape {
        width,
        height,
        cells,
    }
}

const I_SHAPES: [Shape; 2] = [
    shape(4, 1, [(0, 0), (1, 0), (2, 0), (3, 0)]),
    shape(1, 4, [(0, 0), (0, 1), (0, 2), (0, 3)]),
];

const O_SHAPES: [Shape; 1] = [shape(2, 2, [(0, 0), (1, 0), (0, 1), (1, 1)])];

const T_SHAPES: [Shape; 4] = [
    shape(3, 2, [(1, 0), (0, 1), (1, 1), (2, 1)]),
    shape(2, 3, [(0, 0), (0, 1), (1, 1), (0, 2)]),
    shape(3, 2, [(0, 0), (1, 0), (2, 0), (1, 1)]),
    shape(2, 3, [(1, 0), (0, 1), (1, 1), (1, 2)]),
];

const S_SHAPES: [Shape; 2] = [
    shape(3, 2, [(1, 0), (2, 0), (0, 1), (1, 1)]),
    shape(2, 3, [(0, 0), (0, 1), (1, 1), (1, 2)]),
];

const Z_SHAPES: [Shape; 2] = [
    shape(3, 2, [(0, 0), (1, 0), (1, 1), (2, 1)]),
    shape(2, 3, [(1, 0), (0, 1), (1, 1), (0, 2)]),
];

const J_SHAPES: [Shape; 4] = [
    shape(3, 2, [(0, 0), (0, 1), (1, 1), (2, 1)]),
    shape(2, 3, [(0, 0), (1, 0), (0, 1), (0, 2)]),
    shape(3, 2, [(0, 0), (1, 0), (2, 0), (2, 1)]),
    shape(2, 3, [(1, 0), (1, 1), (0, 2), (1, 2)]),
];

const L_SHAPES: [Shape; 4] = [
    shape(3, 2, [(2, 0), (0, 1), (1, 1), (2, 1)]),
    shape(2, 3, [(0, 0), (0, 1), (0, 2), (1, 2)]),
    shape(3, 2, [(0, 0), (1, 0), (2, 0), (0, 1)]),
    shape(2, 3, [(0, 0), (1, 0), (1, 1), (1, 2)]),
];

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TetrominoType {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl TetrominoType {
    pub const ALL: [TetrominoType; 7] = [
        TetrominoType::I,
        TetrominoType::O,
        TetrominoType::T,
        TetrominoType::S,
        TetrominoType::Z,
        TetrominoType::J,
        TetrominoType::L,
    ];

    /// Rotation states in clockwise order.
    pub fn shapes(self) -> &'static [Shape] {
        match self {
            TetrominoType::I => &I_SHAPES,
            TetrominoType::O => &O_SHAPES,
            TetrominoType::T => &T_SHAPES,
            TetrominoType::S => &S_SHAPES,
            TetrominoType::Z => &Z_SHAPES,
            TetrominoType::J => &J_SHAPES,
            TetrominoType::L => &L_SHAPES,
        }
    }

    pub fn rotation_count(self) -> usize {
        self.shapes().len()
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

/// A piece instance. Plain value: moving or rotating yields a new piece.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Tetromino {
    pub tetromino_type: TetrominoType,
    pub position: Position,
    pub rotation: usize,
}

impl Tetromino {
    /// Centered horizontally on a board of `board_width` columns. The bottom
    /// row of the spawn state sits on board row 0; anything above it is in the
    /// spawn zone (negative rows).
    pub fn spawn(tetromino_type: TetrominoType, board_width: usize) -> Self {
        let shape = &tetromino_type.shapes()[0];
        let board_width = i16::try_from(board_width).unwrap_or(i16::MAX);
        let x = (board_width - shape.width) / 2;
        Self::new_at(tetromino_type, x, 1 - shape.height)
    }

    pub fn new_at(tetromino_type: TetrominoType, x: i16, y: i16) -> Self {
        Self {
            tetromino_type,
            position: Position { x, y },
            rotation: 0,
        }
    }

    pub fn with_rotation(self, rotation: usize) -> Self {
        Self {
            rotation: rotation % self.tetromino_type.rotation_count(),
            ..self
        }
    }

    pub fn shape(&self) -> &'static Shape {
        let shapes = self.tetromino_type.shapes();
        &shapes[self.rotation % shapes.len()]
    }

    pub fn blocks(&self) -> [Position; 4] {
        let shape = self.shape();
        shape.cells.map(|(dx, dy)| Position {
            x: self.position.x.saturating_add(dx),
            y: self.position.y.saturating_add(dy),
        })
    }

    pub fn rotated(&self, clockwise: bool) -> Self {
        let count = self.tetromino_type.rotation_count();
        let rotation = if clockwise {
            (self.rotation + 1) % count
        } else {
            (self.rotation + count - 1) % count
        };
        Self { rotation, ..*self }
    }

    pub fn moved(&self, dx: i16, dy: i16) -> Self {
        Self {
            position: Position {
                x: self.position.x.saturating_add(dx),
                y: self.position.y.saturating_add(dy),
            },
            ..*self
        }
    }
}

// ============================================================================
// Board Model
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CellState {
    Empty,
    Filled(TetrominoType),
}

impl CellState {
    pub fn is_filled(self) -> bool {
        self != CellState::Empty
    }
}

/// Fixed-size grid, row 0 at the top. Dimensions never change after
/// construction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Board {
    width: usize,
    height: usize,
    rows: Vec<Vec<CellState>>,
}

impl Board {
    pub fn new(width: usize, height: usize) -> Result<Self, GameError> {
        let valid = MIN_DIMENSION..=MAX_DIMENSION;
        if !valid.contains(&width) || !valid.contains(&height) {
            return Err(GameError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            rows: vec![vec![CellState::Empty; width]; height],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn rows(&self) -> &[Vec<CellState>] {
        &self.rows
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<CellState> {
        self.rows.get(y).and_then(|row| row.get(x)).copied()
    }

    pub fn is_filled(&self, x: usize, y: usize) -> bool {
        self.cell(x, y).is_some_and(CellState::is_filled)
    }

    /// Out-of-range coordinates are ignored.
    pub fn set(&mut self, x: usize, y: usize, cell: CellState) {
        if let Some(slot) = self.rows.get_mut(y).and_then(|row| row.get_mut(x)) {
            *slot = cell;
        }
    }

    /// Rows above the board (`y < 0`) only have their column checked. An
    /// offset that overflows the coordinate range is illegal.
    pub fn is_legal(&self, piece: &Tetromino, offset_x: i16, offset_y: i16) -> bool {
        piece.blocks().iter().all(|block| {
            let (Some(x), Some(y)) = (
                block.x.checked_add(offset_x),
                block.y.checked_add(offset_y),
            ) else {
                return false;
            };
            let Ok(column) = usize::try_from(x) else {
                return false;
            };
            if column >= self.width || (y >= 0 && y as usize >= self.height) {
                return false;
            }
            y < 0 || !self.is_filled(column, y as usize)
        })
    }

    /// Writes the piece into the grid without a legality check; cells above
    /// the board are dropped.
    pub fn commit(&mut self, piece: &Tetromino) {
        let cell = CellState::Filled(piece.tetromino_type);
        for block in piece.blocks() {
            if block.y >= 0 && block.x >= 0 {
                self.set(block.x as usize, block.y as usize, cell);
            }
        }
    }

    /// Removes every full row, keeping the survivors in order, and refills
    /// the top with empty rows.
    pub fn clear_full_rows(&mut self) -> u32 {
        let before = self.rows.len();
        self.rows.retain(|row| !row.iter().all(|cell| cell.is_filled()));
        let cleared = before - self.rows.len();

        let mut rows = vec![vec![CellState::Empty; self.width]; cleared];
        rows.append(&mut self.rows);
        self.rows = rows;

        cleared as u32
    }

    pub fn is_row_complete(&self, y: usize) -> bool {
        self.rows
            .get(y)
            .is_some_and(|row| row.iter().all(|cell| cell.is_filled()))
    }

    pub fn filled_count_in_row(&self, y: usize) -> usize {
        self.rows
            .get(y)
            .map_or(0, |row| row.iter().filter(|cell| cell.is_filled()).count())
    }

    pub fn total_filled_cells(&self) -> usize {
        self.rows.iter().flatten().filter(|cell| cell.is_filled()).count()
    }

    /// Distance from the board floor to the top filled cell, per column.
    pub fn column_heights(&self) -> Vec<usize> {
        (0..self.width)
            .map(|x| {
                (0..self.height)
                    .find(|&y| self.rows[y][x].is_filled())
                    .map_or(0, |y| self.height - y)
            })
            .collect()
    }
}

// ============================================================================
// Game State
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GameState {
    Playing,
    Paused,
    GameOver,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum GameEvent {
    PieceMoved,
    PieceRotated,
    PieceLocked,
    LinesCleared(u32),
    LevelUp(u32),
    Paused,
    Unpaused,
    GameOver,
}

// ============================================================================
// Piece Provider Trait
// ============================================================================

pub trait PieceProvider {
    fn next_piece(&mut self) -> TetrominoType;
}

/// Uniform choice over the seven kinds.
pub struct RandomPieceProvider {
    rng: StdRng,
}

impl RandomPieceProvider {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PieceProvider for RandomPieceProvider {
    fn next_piece(&mut self) -> TetrominoType {
        TetrominoType::random(&mut self.rng)
    }
}

pub struct SequencePieceProvider {
    pieces: Vec<TetrominoType>,
    index: usize,
}

impl SequencePieceProvider {
    pub fn new(pieces: Vec<TetrominoType>) -> Self {
        Self { pieces, index: 0 }
    }
}

impl PieceProvider for SequencePieceProvider {
    fn next_piece(&mut self) -> TetrominoType {
        if self.pieces.is_empty() {
            return TetrominoType::O;
        }
        let piece = self.pieces[self.index % self.pieces.len()];
        self.index += 1;
        piece
    }
}

// ============================================================================
// Game
// ============================================================================

pub struct Game {
    pub board: Board,
    pub current_piece: Tetromino,
    pub next_piece: Tetromino,
    pub score: u32,
    pub lines_cleared: u32,
    pub level: u32,
    pub state: GameState,
    last_fall: Instant,
    fall_override: Option<Duration>,
    piece_provider: Box<dyn PieceProvider>,
    events: Vec<GameEvent>,
}

/// Automatic descent interval for a level, before any override.
pub fn level_fall_interval(level: u32) -> Duration {
    let speed_reduction = u64::from(level.saturating_sub(1)) * SPEED_INCREASE_PER_LEVEL;
    Duration::from_millis(BASE_FALL_MS.saturating_sub(speed_reduction).max(MIN_FALL_MS))
}

impl Game {
    pub fn new(width: usize, height: usize) -> Result<Self, GameError> {
        Self::with_provider(width, height, Box::new(RandomPieceProvider::from_entropy()))
    }

    pub fn with_seed(width: usize, height: usize, seed: u64) -> Result<Self, GameError> {
        Self::with_provider(width, height, Box::new(RandomPieceProvider::seeded(seed)))
    }

    pub fn with_provider(
        width: usize,
        height: usize,
        mut provider: Box<dyn PieceProvider>,
    ) -> Result<Self, GameError> {
        let board = Board::new(width, height)?;
        let current_piece = Tetromino::spawn(provider.next_piece(), width);
        let next_piece = Tetromino::spawn(provider.next_piece(), width);

        Ok(Self {
            board,
            current_piece,
            next_piece,
            score: 0,
            lines_cleared: 0,
            level: 1,
            state: GameState::Playing,
            last_fall: Instant::now(),
            fall_override: None,
            piece_provider: provider,
            events: Vec::new(),
        })
    }

    /// A game over a prepared board. Upcoming pieces come from a fixed seed.
    pub fn with_board(board: Board, current_piece: Tetromino) -> Self {
        let mut provider = RandomPieceProvider::seeded(0);
        let next_piece = Tetromino::spawn(provider.next_piece(), board.width());

        Self {
            board,
            current_piece,
            next_piece,
            score: 0,
            lines_cleared: 0,
            level: 1,
            state: GameState::Playing,
            last_fall: Instant::now(),
            fall_override: None,
            piece_provider: Box::new(provider),
            events: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.board.width()
    }

    pub fn height(&self) -> usize {
        self.board.height()
    }

    fn shift(&mut self, dx: i16, dy: i16) -> bool {
        if self.state != GameState::Playing {
            return false;
        }
        if self.board.is_legal(&self.current_piece, dx, dy) {
            self.current_piece = self.current_piece.moved(dx, dy);
            self.events.push(GameEvent::PieceMoved);
            true
        } else {
            false
        }
    }

    /// One column left (`-1`) or right (`1`). Any other `dx` and any blocked
    /// move leave the piece where it is.
    pub fn move_piece(&mut self, dx: i16) -> bool {
        if dx != -1 && dx != 1 {
            return false;
        }
        self.shift(dx, 0)
    }

    /// One row down if legal. Never locks.
    pub fn soft_drop(&mut self) -> bool {
        self.shift(0, 1)
    }

    pub fn hard_drop(&mut self) {
        if self.state != GameState::Playing {
            return;
        }
        // The drop's own steps are not reported as moves.
        let pending = self.events.len();
        while self.soft_drop() {}
        self.events.truncate(pending);
        self.lock_and_advance();
    }

    pub fn rotate_cw(&mut self) -> bool {
        self.rotate_piece(true)
    }

    pub fn rotate_piece(&mut self, clockwise: bool) -> bool {
        if self.state != GameState::Playing {
            return false;
        }
        let rotated = self.current_piece.rotated(clockwise);
        let nudges = std::iter::once((0, 0)).chain(WALL_KICKS);
        for (dx, dy) in nudges {
            if self.board.is_legal(&rotated, dx, dy) {
                self.current_piece = rotated.moved(dx, dy);
                self.events.push(GameEvent::PieceRotated);
                return true;
            }
        }
        false
    }

    pub fn lock_and_advance(&mut self) {
        if self.state != GameState::Playing {
            return;
        }
        self.board.commit(&self.current_piece);
        self.events.push(GameEvent::PieceLocked);

        let lines = self.board.clear_full_rows();
        if lines > 0 {
            self.events.push(GameEvent::LinesCleared(lines));
            self.add_score(lines);
        }

        self.spawn_next_piece();
        self.last_fall = Instant::now();
    }

    pub fn add_score(&mut self, lines: u32) {
        let base_score = match lines {
            1 => SCORE_SINGLE,
            2 => SCORE_DOUBLE,
            3 => SCORE_TRIPLE,
            4 => SCORE_TETRIS,
            _ => 0,
        };
        self.score = self.score.saturating_add(base_score * self.level);
        self.lines_cleared += lines;

        let new_level = (self.lines_cleared / LINES_PER_LEVEL) + 1;
        if new_level > self.level {
            self.level = new_level;
            self.events.push(GameEvent::LevelUp(self.level));
        }
    }

    /// Promotes the preview piece and draws a fresh one. A promoted piece that
    /// does not fit ends the game; the board is left untouched.
    pub fn spawn_next_piece(&mut self) {
        let fresh = Tetromino::spawn(self.piece_provider.next_piece(), self.board.width());
        self.current_piece = std::mem::replace(&mut self.next_piece, fresh);

        if !self.board.is_legal(&self.current_piece, 0, 0) {
            self.state = GameState::GameOver;
            self.events.push(GameEvent::GameOver);
        }
    }

    /// Automatic descent. Locks the piece when it can no longer fall.
    pub fn tick(&mut self, now: Instant) {
        if self.state != GameState::Playing {
            return;
        }
        if now.saturating_duration_since(self.last_fall) < self.fall_interval() {
            return;
        }
        if !self.soft_drop() {
            self.lock_and_advance();
        }
        self.last_fall = now;
    }

    pub fn reset_fall_timer(&mut self, now: Instant) {
        self.last_fall = now;
    }

    pub fn fall_interval(&self) -> Duration {
        self.fall_override
            .unwrap_or_else(|| level_fall_interval(self.level))
    }

    /// Replaces the level-based fall interval until cleared with `None`.
    pub fn set_fall_override(&mut self, interval: Option<Duration>) {
        self.fall_override = interval;
    }

    pub fn toggle_pause(&mut self) {
        match self.state {
            GameState::Playing => {
                self.state = GameState::Paused;
                self.events.push(GameEvent::Paused);
            }
            GameState::Paused => {
                self.state = GameState::Playing;
                self.events.push(GameEvent::Unpaused);
            }
            GameState::GameOver => {}
        }
    }

    /// Board with the current piece overlaid (visible rows only).
    pub fn render_grid(&self) -> Vec<Vec<CellState>> {
        let mut visual_grid = self.board.rows().to_vec();
        let cell = CellState::Filled(self.current_piece.tetromino_type);

        for block in self.current_piece.blocks() {
            if block.y >= 0 && block.x >= 0 {
                if let Some(slot) = visual_grid
                    .get_mut(block.y as usize)
                    .and_then(|row| row.get_mut(block.x as usize))
                {
                    *slot = cell;
                }
            }
        }

        visual_grid
    }

    /// Takes and clears all pending events
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_game_over(&self) -> bool {
        self.state == GameState::GameOver
    }

    pub fn is_paused(&self) -> bool {
        self.state == GameState::Paused
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

pub mod test_helpers {
    use super::*;

    pub fn empty_board() -> Board {
        Board::new(DEFAULT_WIDTH, DEFAULT_HEIGHT).expect("default dimensions are valid")
    }

    pub fn fill_row(board: &mut Board, y: usize) {
        for x in 0..board.width() {
            board.set(x, y, CellState::Filled(TetrominoType::T));
        }
    }

    pub fn fill_row_with_gap(board: &mut Board, y: usize, gap_x: usize) {
        for x in 0..board.width() {
            if x != gap_x {
                board.set(x, y, CellState::Filled(TetrominoType::T));
            }
        }
    }

    /// Builds a board from text rows, top row first: `#` is filled, anything
    /// else is empty. All rows must have the same length.
    pub fn board_from_ascii(rows: &[&str]) -> Board {
        let width = rows.first().map_or(0, |row| row.chars().count());
        let mut board = Board::new(width, rows.len()).expect("ascii board too small");
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                if ch == '#' {
                    board.set(x, y, CellState::Filled(TetrominoType::T));
                }
            }
        }
        board
    }
}
