//! AI to automatically play 2048.
//!
//! Expectimax over the bitboard: move nodes take the best of the four
//! directions, chance nodes take the expectation over the spawner's
//! distribution. Branches are cut off by a depth limit and by the cumulative
//! probability of ever reaching them, and chance-node values are memoized in
//! a per-search transposition table. The terminal evaluation is the per-row
//! heuristic table built at startup.
use crate::game::tables::{table_score, SCORE_LOST_PENALTY, TABLES};
use crate::game::{execute_move, Board, GameState, Move};
use rand::seq::SliceRandom;
use rand::Rng;

/// Chance branches whose cumulative probability falls below this are scored
/// by the heuristic instead of being expanded.
pub const CPROB_THRESH_BASE: f64 = 0.0001;

/// Depth beyond which chance nodes stop consulting the transposition table.
pub const CACHE_DEPTH_LIMIT: i32 = 20;

/// Transposition table capacity, in entries.
pub const TRANSTABLE_SIZE: usize = 10_485_760;

/// Heuristic evaluation of a board: the per-row feature table summed over the
/// rows of the board and of its transpose, so columns count too.
pub fn score_heur_board(board: Board) -> f64 {
    table_score(board, &TABLES.heur) + table_score(board.transpose(), &TABLES.heur)
}

/// Pick a uniformly random legal move.
pub fn rand_move<R: Rng>(board: Board, rng: &mut R) -> Option<Move> {
    let legal: Vec<Move> = Move::SEARCH_ORDER
        .iter()
        .copied()
        .filter(|&m| execute_move(m, board) != board)
        .collect();
    legal.choose(rng).copied()
}

#[derive(Debug, Clone, Copy, Default)]
struct TransEntry {
    key: u64,
    depth: i32,
    score: f64,
    occupied: bool,
}

/// Give up a probe run after this many slots rather than walking the table.
const PROBE_LIMIT: usize = 32;

/// Per-search memo of chance-node evaluations, keyed by the board bits.
///
/// Fixed-capacity open addressing with linear probing. A fresh table is built
/// for every top-level search, so nothing is ever evicted; a probe run that
/// finds neither the key nor a free slot just skips caching that node.
struct TransTable {
    entries: Vec<TransEntry>,
}

impl TransTable {
    /// Allocate a table, or None when the allocation fails; the search then
    /// runs uncached with identical results.
    fn with_capacity(capacity: usize) -> Option<TransTable> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(capacity).ok()?;
        entries.resize(capacity, TransEntry::default());
        Some(TransTable { entries })
    }

    fn lookup(&self, key: u64) -> Option<(i32, f64)> {
        let len = self.entries.len();
        let mut idx = (key % len as u64) as usize;
        for _ in 0..PROBE_LIMIT {
            let entry = &self.entries[idx];
            if !entry.occupied {
                return None;
            }
            if entry.key == key {
                return Some((entry.depth, entry.score));
            }
            idx = (idx + 1) % len;
        }
        None
    }

    fn insert(&mut self, key: u64, depth: i32, score: f64) {
        let len = self.entries.len();
        let mut idx = (key % len as u64) as usize;
        for _ in 0..PROBE_LIMIT {
            let entry = &mut self.entries[idx];
            if !entry.occupied || entry.key == key {
                *entry = TransEntry {
                    key,
                    depth,
                    score,
                    occupied: true,
                };
                return;
            }
            idx = (idx + 1) % len;
        }
    }
}

/// Counters reported by [`find_best_move_with_stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    /// Deepest chance-node level actually reached.
    pub maxdepth: i32,
    /// Transposition-table hits.
    pub cachehits: u32,
    /// Move-node expansions, including no-ops.
    pub moves_evaled: u32,
    /// Effective depth limit after clamping.
    pub depth_limit: i32,
}

struct EvalState {
    table: Option<TransTable>,
    curdepth: i32,
    maxdepth: i32,
    cachehits: u32,
    moves_evaled: u32,
    depth_limit: i32,
}

impl EvalState {
    fn new(depth_limit: i32) -> Self {
        EvalState {
            table: TransTable::with_capacity(TRANSTABLE_SIZE),
            curdepth: 0,
            maxdepth: 0,
            cachehits: 0,
            moves_evaled: 0,
            depth_limit,
        }
    }

    fn stats(&self) -> SearchStats {
        SearchStats {
            maxdepth: self.maxdepth,
            cachehits: self.cachehits,
            moves_evaled: self.moves_evaled,
            depth_limit: self.depth_limit,
        }
    }
}

/// Expectation over the spawner's randomness at `board`.
fn score_chance_node(st: &mut EvalState, board: Board, cprob: f64) -> f64 {
    if cprob < CPROB_THRESH_BASE || st.curdepth >= st.depth_limit {
        st.maxdepth = st.maxdepth.max(st.curdepth);
        return score_heur_board(board);
    }

    let num_empty = board.count_empty();
    if num_empty == 0 {
        return SCORE_LOST_PENALTY;
    }

    if st.curdepth < CACHE_DEPTH_LIMIT {
        if let Some(table) = &st.table {
            if let Some((depth, score)) = table.lookup(board.raw()) {
                // only trust entries computed at least this shallow
                if depth <= st.curdepth {
                    st.cachehits += 1;
                    return score;
                }
            }
        }
    }

    let cprob = cprob / num_empty as f64;
    let maxrank = board.max_rank();
    let (prob_2, prob_4) = if maxrank >= 10 {
        (0.54, 0.3)
    } else if maxrank >= 9 {
        (0.57, 0.3)
    } else {
        (0.6, 0.3)
    };

    // past six empties, thin the cells we expand
    let max_samples = if num_empty <= 6 {
        num_empty
    } else {
        (6 + if num_empty > 10 { 2 } else { 1 }).min(10)
    };

    let mut res = 0.0;
    let mut empty_idx = 0u32;
    let mut sample_count = 0u32;
    for pos in 0..16 {
        if board.rank(pos) != 0 {
            continue;
        }
        // spread the samples evenly across the empty cells in scan order
        let k = empty_idx;
        empty_idx += 1;
        if num_empty > 6
            && (k * max_samples) / num_empty == ((k + 1) * max_samples) / num_empty
        {
            continue;
        }

        let score2 = score_move_node(st, board.with_tile(pos, 1), cprob * prob_2);
        let score4 = score_move_node(st, board.with_tile(pos, 2), cprob * prob_4);
        let mut total_prob = prob_2 + prob_4;
        let mut weighted = score2 * prob_2 + score4 * prob_4;
        if maxrank >= 9 && st.curdepth < 2 {
            // big boards spawn 8s often enough to model near the root
            let prob_8 = 0.1;
            let score8 = score_move_node(st, board.with_tile(pos, 3), cprob * prob_8);
            total_prob += prob_8;
            weighted += score8 * prob_8;
        }
        res += weighted / total_prob;
        sample_count += 1;
    }
    if sample_count > 0 {
        res /= sample_count as f64;
    }

    if st.curdepth < CACHE_DEPTH_LIMIT {
        if let Some(table) = &mut st.table {
            table.insert(board.raw(), st.curdepth, res);
        }
    }
    res
}

/// Best over the four directions at `board`, 0 when nothing is legal.
fn score_move_node(st: &mut EvalState, board: Board, cprob: f64) -> f64 {
    if st.curdepth >= st.depth_limit {
        st.maxdepth = st.maxdepth.max(st.curdepth);
        return score_heur_board(board);
    }

    st.curdepth += 1;
    let mut best = 0.0f64;
    for &m in Move::SEARCH_ORDER.iter() {
        let after = execute_move(m, board);
        st.moves_evaled += 1;
        if after != board {
            best = best.max(score_chance_node(st, after, cprob));
        }
    }
    st.curdepth -= 1;
    best
}

fn score_toplevel_move(st: &mut EvalState, board: Board, m: Move) -> f64 {
    let after = execute_move(m, board);
    if after == board {
        return 0.0;
    }
    // tiny tie-breaker so a legal move always beats "no move"
    score_chance_node(st, after, 1.0) + 1e-6
}

/// Pick the effective depth limit: the caller's request clamped to 15, then
/// bounded by how crowded the board is, with one extra ply while the board is
/// pushing from 512 toward 1024.
fn search_depth(board: Board, requested: i32) -> i32 {
    let mut limit = requested.min(15);
    let empty = board.count_empty();
    let maxrank = board.max_rank();
    let bound = if empty < 4 {
        if maxrank >= 10 {
            7
        } else {
            6
        }
    } else if empty < 7 {
        if maxrank >= 9 {
            6
        } else {
            5
        }
    } else if empty < 10 {
        if maxrank >= 9 {
            5
        } else {
            4
        }
    } else {
        4
    };
    limit = limit.min(bound);
    if maxrank == 9 {
        limit = (limit + 1).min(7);
    }
    limit
}

/// Best direction for the state, or -1 when no move is legal. Directions are
/// indexed UP=0, DOWN=1, LEFT=2, RIGHT=3.
pub fn find_best_move(state: &GameState, depth_limit: i32) -> i32 {
    find_best_move_with_stats(state, depth_limit).0
}

/// Like [`find_best_move`], also reporting search statistics.
pub fn find_best_move_with_stats(state: &GameState, depth_limit: i32) -> (i32, SearchStats) {
    best_move_for_board(state.board(), depth_limit)
}

fn best_move_for_board(board: Board, requested_depth: i32) -> (i32, SearchStats) {
    let mut st = EvalState::new(search_depth(board, requested_depth));
    let mut best_score = 0.0;
    let mut best_move = -1;
    for &m in Move::SEARCH_ORDER.iter() {
        let score = score_toplevel_move(&mut st, board, m);
        if score > best_score {
            best_score = score;
            best_move = m.index();
        }
    }
    (best_move, st.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{add_random_tile, GameState};
    use rand::prelude::StdRng;
    use rand::SeedableRng;

    #[test]
    fn trans_table_inserts_and_probes() {
        let mut table = TransTable::with_capacity(8).unwrap();
        assert!(table.lookup(3).is_none());
        table.insert(3, 1, 10.0);
        assert_eq!(Some((1, 10.0)), table.lookup(3));
        // 11 and 19 collide with 3 mod 8 and probe to the next slots
        table.insert(11, 2, 20.0);
        table.insert(19, 0, 30.0);
        assert_eq!(Some((1, 10.0)), table.lookup(3));
        assert_eq!(Some((2, 20.0)), table.lookup(11));
        assert_eq!(Some((0, 30.0)), table.lookup(19));
        // re-inserting a key overwrites in place
        table.insert(11, 5, 25.0);
        assert_eq!(Some((5, 25.0)), table.lookup(11));
    }

    #[test]
    fn heuristic_counts_columns_too() {
        let by_rows = Board::from_ranks([[5, 4, 3, 2], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        assert!(
            (score_heur_board(by_rows) - score_heur_board(by_rows.transpose())).abs() < 1e-9,
            "row and column layouts must score alike"
        );
    }

    #[test]
    fn search_depth_tracks_crowding() {
        let sparse = Board::default().with_tile(0, 1).with_tile(5, 2);
        assert_eq!(4, search_depth(sparse, 15));

        let mut ranks = [[1u8; 4]; 4];
        ranks[0][1] = 0;
        ranks[2][2] = 0;
        let crowded = Board::from_ranks(ranks);
        assert_eq!(6, search_depth(crowded, 15));
        // the request still caps the search
        assert_eq!(2, search_depth(crowded, 2));

        // a 512 on the board buys one extra ply
        ranks[0][0] = 9;
        let endgame = Board::from_ranks(ranks);
        assert_eq!(7, search_depth(endgame, 15));
    }

    #[test]
    fn best_move_is_legal() {
        let b = Board::from_ranks([[1, 2, 3, 4], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        let state = GameState::with_board(b);
        let best = find_best_move(&state, 3);
        let m = Move::from_index(best).expect("no move found");
        assert_ne!(b, execute_move(m, b), "AI picked an illegal move");
    }

    #[test]
    fn best_move_stays_legal_through_a_game() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = GameState::default();
        state.init_game(&mut rng);
        for _ in 0..40 {
            if state.is_game_over() {
                break;
            }
            let best = find_best_move(&state, 2);
            let m = Move::from_index(best).expect("AI found no move on a live board");
            let before = state.board();
            assert!(state.try_move(m, &mut rng), "AI move was illegal");
            assert_ne!(before, state.board());
        }
    }

    #[test]
    fn no_move_on_a_dead_board() {
        let b = Board::from_ranks([[1, 2, 1, 2], [2, 1, 2, 1], [1, 2, 1, 2], [2, 1, 2, 1]]);
        let state = GameState::with_board(b);
        assert_eq!(-1, find_best_move(&state, 3));
    }

    #[test]
    fn search_is_deterministic_across_invocations() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut board = Board::default();
        for _ in 0..8 {
            board = add_random_tile(board, &mut rng);
        }
        let state = GameState::with_board(board);
        let (first, _) = find_best_move_with_stats(&state, 4);
        let (second, _) = find_best_move_with_stats(&state, 4);
        assert_eq!(first, second);
    }

    #[test]
    fn deep_search_hits_the_cache() {
        // a crowded board revisits positions across move orderings
        let b = Board::from_ranks([[1, 2, 3, 4], [5, 6, 7, 8], [1, 2, 3, 4], [0, 0, 1, 1]]);
        let state = GameState::with_board(b);
        let (best, stats) = find_best_move_with_stats(&state, 8);
        assert_ne!(-1, best);
        assert!(stats.cachehits > 0, "expected transposition hits");
        assert!(stats.moves_evaled > 0);
        assert!(stats.maxdepth <= stats.depth_limit);
    }

    #[test]
    fn values_stay_finite_and_bounded() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut state = GameState::default();
        state.init_game(&mut rng);
        for _ in 0..30 {
            if state.is_game_over() {
                break;
            }
            let value = score_heur_board(state.board());
            assert!(value.is_finite());
            assert!((0.0..1e9).contains(&value), "value {} out of range", value);
            let best = find_best_move(&state, 3);
            if best < 0 {
                break;
            }
            state.try_move_index(best, &mut rng);
        }
    }

    #[test]
    fn rand_move_is_legal() {
        let mut rng = StdRng::seed_from_u64(4);
        let b = Board::from_ranks([[1, 2, 3, 4], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        for _ in 0..20 {
            let m = rand_move(b, &mut rng).expect("board has a legal move");
            assert_ne!(b, execute_move(m, b));
        }
        let dead = Board::from_ranks([[1, 2, 1, 2], [2, 1, 2, 1], [1, 2, 1, 2], [2, 1, 2, 1]]);
        assert!(rand_move(dead, &mut rng).is_none());
    }
}
