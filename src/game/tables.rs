//! Precomputed per-row move and scoring tables.
//!
//! A row is 16 bits, so every slide, game-score and heuristic evaluation over
//! the full 65,536-row space is computed once up front. Moves then reduce to
//! four table lookups XORed into the board: the tables store `row ^ result`
//! deltas rather than results, which works for columns too once the delta is
//! spread across the column's nibbles.
use super::board::{Board, MAX_RANK};

pub(crate) const TABLE_LEN: usize = 1 << 16;

// Heuristic weights, tuned over the 16-bit row space.
pub(crate) const SCORE_LOST_PENALTY: f64 = 200_000.0;
const SCORE_MONOTONICITY_POWER: f64 = 4.0;
const SCORE_MONOTONICITY_WEIGHT: f64 = 47.0;
const SCORE_SUM_POWER: f64 = 3.5;
const SCORE_SUM_WEIGHT: f64 = 11.0;
const SCORE_MERGES_WEIGHT: f64 = 700.0;
const SCORE_EMPTY_WEIGHT: f64 = 270.0;

/// One row as four ranks, leftmost first. Only used to seed the tables; the
/// hot path never unpacks a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Line([u8; 4]);

impl Line {
    fn from_bits(row: u16) -> Self {
        Line([
            (row & 0xf) as u8,
            ((row >> 4) & 0xf) as u8,
            ((row >> 8) & 0xf) as u8,
            ((row >> 12) & 0xf) as u8,
        ])
    }

    fn to_bits(self) -> u16 {
        let r = self.0;
        (r[0] as u16) | (r[1] as u16) << 4 | (r[2] as u16) << 8 | (r[3] as u16) << 12
    }

    /// Slide the row's tiles to the left, merging equal neighbors.
    ///
    /// A merge of two rank-k tiles yields one rank k+1 tile, except that
    /// rank-15 tiles never merge. A tile produced by a merge does not merge
    /// again in the same slide.
    fn slide_left(self) -> Self {
        let mut line = self.0;
        let mut i = 0;
        while i < 3 {
            // next occupied cell to the right of i
            let mut j = i + 1;
            while j < 4 && line[j] == 0 {
                j += 1;
            }
            if j == 4 {
                break;
            }
            if line[i] == 0 {
                line[i] = line[j];
                line[j] = 0;
                // recheck the slot we just filled, it may still merge
                continue;
            } else if line[i] == line[j] && line[i] < MAX_RANK {
                line[i] += 1;
                line[j] = 0;
            }
            i += 1;
        }
        Line(line)
    }

    /// Closed-form cumulative reward for the tiles on this row: building a
    /// rank-k tile out of 2s earns (k-1)*2^k along the way. Differencing this
    /// across a move yields exactly the move's merge reward.
    fn merge_score(self) -> f64 {
        self.0
            .iter()
            .filter(|&&rank| rank >= 2)
            .map(|&rank| (rank as f64 - 1.0) * (1u32 << rank) as f64)
            .sum()
    }

    /// Single-row heuristic: reward empties and merge potential, punish
    /// non-monotone layouts and large sums of high ranks.
    fn heur_score(self) -> f64 {
        let mut sum = 0.0;
        let mut empty = 0;
        let mut merges = 0;
        let mut prev = 0;
        let mut counter = 0;
        for &rank in self.0.iter() {
            sum += (rank as f64).powf(SCORE_SUM_POWER);
            if rank == 0 {
                empty += 1;
            } else {
                if prev == rank {
                    counter += 1;
                } else if counter > 0 {
                    merges += 1 + counter;
                    counter = 0;
                }
                prev = rank;
            }
        }
        if counter > 0 {
            merges += 1 + counter;
        }

        let mut monotonicity_left = 0.0;
        let mut monotonicity_right = 0.0;
        for i in 1..4 {
            let prev = self.0[i - 1] as f64;
            let curr = self.0[i] as f64;
            if prev > curr {
                monotonicity_left +=
                    prev.powf(SCORE_MONOTONICITY_POWER) - curr.powf(SCORE_MONOTONICITY_POWER);
            } else {
                monotonicity_right +=
                    curr.powf(SCORE_MONOTONICITY_POWER) - prev.powf(SCORE_MONOTONICITY_POWER);
            }
        }

        SCORE_LOST_PENALTY
            + SCORE_EMPTY_WEIGHT * empty as f64
            + SCORE_MERGES_WEIGHT * merges as f64
            - SCORE_MONOTONICITY_WEIGHT * monotonicity_left.min(monotonicity_right)
            - SCORE_SUM_WEIGHT * sum
    }
}

/// Swap nibbles 0<->3 and 1<->2.
fn reverse_row(row: u16) -> u16 {
    (row >> 12) | ((row >> 4) & 0x00F0) | ((row << 4) & 0x0F00) | (row << 12)
}

/// Spread a row's four nibbles across a column: bits 0, 16, 32, 48.
fn unpack_col(row: u16) -> u64 {
    let row = row as u64;
    (row & 0xF) | ((row & 0xF0) << 12) | ((row & 0xF00) << 24) | ((row & 0xF000) << 36)
}

pub(crate) struct Tables {
    /// XOR delta turning a row into its left-slid form.
    pub(crate) row_left: Box<[u16; TABLE_LEN]>,
    pub(crate) row_right: Box<[u16; TABLE_LEN]>,
    /// The left-slide delta unpacked across a column, for UP on a transposed
    /// board.
    pub(crate) col_up: Box<[u64; TABLE_LEN]>,
    pub(crate) col_down: Box<[u64; TABLE_LEN]>,
    /// Cumulative merge reward per row (see [`Line::merge_score`]).
    pub(crate) score: Box<[f64; TABLE_LEN]>,
    /// AI heuristic per row.
    pub(crate) heur: Box<[f64; TABLE_LEN]>,
}

lazy_static! {
    pub(crate) static ref TABLES: Tables = Tables::new();
}

/// Force construction of the lookup tables.
///
/// Idempotent; every table consumer also triggers construction on first use,
/// so this only exists to front-load the cost at startup.
pub fn init_tables() {
    lazy_static::initialize(&TABLES);
}

impl Tables {
    fn vec_to_table<T: std::fmt::Debug>(v: Vec<T>) -> Box<[T; TABLE_LEN]> {
        assert_eq!(TABLE_LEN, v.len(), "vector is not of table length");
        v.into_boxed_slice().try_into().unwrap()
    }

    fn new() -> Self {
        let mut row_left = vec![0u16; TABLE_LEN];
        let mut row_right = vec![0u16; TABLE_LEN];
        let mut col_up = vec![0u64; TABLE_LEN];
        let mut col_down = vec![0u64; TABLE_LEN];
        let mut score = vec![0f64; TABLE_LEN];
        let mut heur = vec![0f64; TABLE_LEN];
        for bits in 0..TABLE_LEN {
            let row = bits as u16;
            let line = Line::from_bits(row);
            let result = line.slide_left().to_bits();
            let rev_row = reverse_row(row);
            let rev_result = reverse_row(result);

            row_left[row as usize] = row ^ result;
            row_right[rev_row as usize] = rev_row ^ rev_result;
            col_up[row as usize] = unpack_col(row) ^ unpack_col(result);
            col_down[rev_row as usize] = unpack_col(rev_row) ^ unpack_col(rev_result);
            score[row as usize] = line.merge_score();
            heur[row as usize] = line.heur_score();
        }
        Tables {
            row_left: Self::vec_to_table(row_left),
            row_right: Self::vec_to_table(row_right),
            col_up: Self::vec_to_table(col_up),
            col_down: Self::vec_to_table(col_down),
            score: Self::vec_to_table(score),
            heur: Self::vec_to_table(heur),
        }
    }
}

/// Sum a per-row table over the four rows of a board.
pub(crate) fn table_score(board: Board, table: &[f64; TABLE_LEN]) -> f64 {
    (0..4).map(|i| table[board.row(i) as usize]).sum()
}
