//! Board evaluation for the autoplayer.
//!
//! A finished board is reduced to a handful of shape features (heights,
//! holes, transitions, wells, pits) and scored with one of two fixed weight
//! sets. Once the tallest column passes 60% of the board height the panic
//! set takes over: holes, height and pits are punished much harder and the
//! I-piece well bonuses are switched off.

use crate::game::{Board, TetrominoType};

/// Fraction of the board height the tallest column must exceed to trigger
/// panic weights.
pub const DANGER_FRACTION: f64 = 0.6;

// ============================================================================
// Weights
// ============================================================================

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Weights {
    pub aggregate_height: f64,
    pub complete_lines: f64,
    pub holes: f64,
    pub bumpiness: f64,
    pub max_height: f64,
    pub wells: f64,
    pub row_transitions: f64,
    pub col_transitions: f64,
    pub pits: f64,
    pub well_quality: f64,
    pub tetris_readiness: f64,
}

impl Weights {
    pub const NORMAL: Weights = Weights {
        aggregate_height: -0.8,
        complete_lines: 1.2,
        holes: -5.0,
        bumpiness: -0.3,
        max_height: -1.5,
        wells: -0.5,
        row_transitions: -0.15,
        col_transitions: -0.1,
        pits: -8.0,
        well_quality: 0.3,
        tetris_readiness: 0.8,
    };

    pub const PANIC: Weights = Weights {
        aggregate_height: -2.0,
        complete_lines: 1.5,
        holes: -10.0,
        bumpiness: -1.0,
        max_height: -5.0,
        wells: -2.0,
        row_transitions: -0.5,
        col_transitions: -0.3,
        pits: -15.0,
        well_quality: 0.0,
        tetris_readiness: 0.0,
    };
}

// ============================================================================
// Features
// ============================================================================

/// Raw heuristic terms for one board.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct BoardFeatures {
    pub aggregate_height: f64,
    pub max_height: f64,
    pub holes: f64,
    pub bumpiness: f64,
    pub complete_lines: f64,
    pub wells: f64,
    pub row_transitions: f64,
    pub col_transitions: f64,
    pub pits: f64,
    pub well_quality: f64,
    pub tetris_readiness: f64,
    pub dangerous: bool,
}

impl BoardFeatures {
    pub fn weights(&self) -> &'static Weights {
        if self.dangerous {
            &Weights::PANIC
        } else {
            &Weights::NORMAL
        }
    }

    pub fn score(&self) -> f64 {
        let w = self.weights();
        w.aggregate_height * self.aggregate_height
            + w.complete_lines * self.complete_lines
            + w.holes * self.holes
            + w.bumpiness * self.bumpiness
            + w.max_height * self.max_height
            + w.wells * self.wells
            + w.row_transitions * self.row_transitions
            + w.col_transitions * self.col_transitions
            + w.pits * self.pits
            + w.well_quality * self.well_quality
            + w.tetris_readiness * self.tetris_readiness
    }
}

/// Extracts every feature of `board`. `placed` is the kind of the piece that
/// produced this board; only an `I` can earn tetris readiness.
pub fn analyze(board: &Board, placed: TetrominoType) -> BoardFeatures {
    let heights = board.column_heights();
    let max_height = heights.iter().copied().max().unwrap_or(0);
    let dangerous = max_height as f64 > board.height() as f64 * DANGER_FRACTION;

    let (well_quality, tetris_readiness) = if dangerous {
        (0.0, 0.0)
    } else {
        let readiness = if placed == TetrominoType::I {
            tetris_readiness(board, &heights)
        } else {
            0.0
        };
        (well_quality(board, &heights), readiness)
    };

    BoardFeatures {
        aggregate_height: heights.iter().sum::<usize>() as f64,
        max_height: max_height as f64,
        holes: count_holes(board) as f64,
        bumpiness: bumpiness(&heights) as f64,
        complete_lines: complete_lines(board) as f64,
        wells: wells(&heights) as f64,
        row_transitions: row_transitions(board) as f64,
        col_transitions: col_transitions(board) as f64,
        pits: pits(board, &heights) as f64,
        well_quality,
        tetris_readiness,
        dangerous,
    }
}

/// Higher is better.
pub fn score(board: &Board, placed: TetrominoType) -> f64 {
    analyze(board, placed).score()
}

// ---------------- internal helpers ----------------

fn count_holes(board: &Board) -> usize {
    let mut holes = 0;
    for x in 0..board.width() {
        let mut covered = false;
        for y in 0..board.height() {
            if board.is_filled(x, y) {
                covered = true;
            } else if covered {
                holes += 1;
            }
        }
    }
    holes
}

fn bumpiness(heights: &[usize]) -> usize {
    heights.windows(2).map(|pair| pair[0].abs_diff(pair[1])).sum()
}

fn complete_lines(board: &Board) -> usize {
    (0..board.height())
        .filter(|&y| board.is_row_complete(y))
        .count()
}

/// Squared depth of every column lower than both neighbours. The board edge
/// counts as an infinitely tall neighbour.
fn wells(heights: &[usize]) -> usize {
    let mut total = 0;
    for (i, &h) in heights.iter().enumerate() {
        let left = i.checked_sub(1).map(|j| heights[j]);
        let right = heights.get(i + 1).copied();
        let below = |neighbour: Option<usize>| neighbour.map_or(true, |n| h < n);
        if below(left) && below(right) {
            let depth = [left, right]
                .into_iter()
                .flatten()
                .map(|n| n - h)
                .min()
                .unwrap_or(0);
            total += depth * depth;
        }
    }
    total
}

fn row_transitions(board: &Board) -> usize {
    board
        .rows()
        .iter()
        .map(|row| {
            row.windows(2)
                .filter(|pair| pair[0].is_filled() != pair[1].is_filled())
                .count()
        })
        .sum()
}

fn col_transitions(board: &Board) -> usize {
    let mut transitions = 0;
    for x in 0..board.width() {
        for y in 0..board.height() - 1 {
            if board.is_filled(x, y) != board.is_filled(x, y + 1) {
                transitions += 1;
            }
        }
    }
    transitions
}

/// Holes walled in on both sides (or by the board edge), weighted by how many
/// filled cells sit above them.
fn pits(board: &Board, heights: &[usize]) -> usize {
    let width = board.width();
    let height = board.height();
    let mut pits = 0;

    for x in 0..width {
        for y in (height - heights[x])..height {
            if board.is_filled(x, y) {
                continue;
            }
            let left_blocked = x == 0 || board.is_filled(x - 1, y);
            let right_blocked = x == width - 1 || board.is_filled(x + 1, y);
            if !(left_blocked && right_blocked) {
                continue;
            }
            let above = (0..y).filter(|&r| board.is_filled(x, r)).count();
            if above > 0 {
                pits += 1 + above;
            }
        }
    }
    pits
}

/// Rewards an edge column sitting 3-4 rows below its inward neighbour.
fn well_quality(board: &Board, heights: &[usize]) -> f64 {
    let width = heights.len();
    let height = board.height();
    let mut best = 0.0_f64;

    for (col, neighbour) in [(0, 1), (width - 1, width - 2)] {
        let depth = heights[neighbour] as i64 - heights[col] as i64;
        if depth < 3 {
            continue;
        }
        let mut quality = if depth <= 4 {
            10.0
        } else {
            5.0 - (depth - 4) as f64 * 0.5
        };

        let clean = (height - heights[col]..height).all(|y| !board.is_filled(col, y));
        if clean {
            quality *= 1.5;
        }
        best = best.max(quality);
    }
    best
}

/// Looks for four stacked rows that a vertical I in a single column would
/// complete at once.
fn tetris_readiness(board: &Board, heights: &[usize]) -> f64 {
    let width = board.width();
    let mut best = 0.0_f64;

    for (col, &col_height) in heights.iter().enumerate() {
        let Some(start) = board.height().checked_sub(col_height + 4) else {
            continue;
        };

        let clears = (start..start + 4)
            .filter(|&y| {
                !board.is_filled(col, y)
                    && (0..width)
                        .filter(|&x| x != col && board.is_filled(x, y))
                        .count()
                        == width - 1
            })
            .count();

        let reward = match clears {
            4 => 50.0,
            3 => 15.0,
            2 => 5.0,
            _ => 0.0,
        };
        best = best.max(reward);
    }
    best
}
