//! Represent 2048 game states and transitions.
//!
//! The board is a packed u64 bitboard (see [`board`]) and every move is four
//! XOR-delta lookups into tables precomputed over the 16-bit row space (see
//! [`tables`]).
mod board;
pub(crate) mod tables;

use rand::prelude::ThreadRng;
use rand::Rng;
use std::collections::VecDeque;

pub use board::{Board, BOARD_SIZE, MAX_RANK};
pub use tables::init_tables;

use tables::{table_score, TABLES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Move {
    /// All moves, in the order the search tries them.
    pub const SEARCH_ORDER: [Move; 4] = [Move::Left, Move::Up, Move::Right, Move::Down];

    /// Direction index on the public surface: UP=0, DOWN=1, LEFT=2, RIGHT=3.
    #[inline]
    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn from_index(index: i32) -> Option<Move> {
        match index {
            0 => Some(Move::Up),
            1 => Some(Move::Down),
            2 => Some(Move::Left),
            3 => Some(Move::Right),
            _ => None,
        }
    }
}

/// Apply a move to a board.
///
/// Pure table application; score, spawning and game-over tracking live on
/// [`GameState`]. The result equals the input iff the move is illegal.
pub fn execute_move(m: Move, board: Board) -> Board {
    let t = &*TABLES;
    let mut ret = board.raw();
    match m {
        Move::Left => {
            for i in 0..4 {
                ret ^= (t.row_left[board.row(i) as usize] as u64) << (16 * i);
            }
        }
        Move::Right => {
            for i in 0..4 {
                ret ^= (t.row_right[board.row(i) as usize] as u64) << (16 * i);
            }
        }
        Move::Up => {
            let tr = board.transpose();
            for i in 0..4 {
                ret ^= t.col_up[tr.row(i) as usize] << (4 * i);
            }
        }
        Move::Down => {
            let tr = board.transpose();
            for i in 0..4 {
                ret ^= t.col_down[tr.row(i) as usize] << (4 * i);
            }
        }
    }
    Board::from_raw(ret)
}

/// Cumulative merge reward of the tiles on a board.
///
/// Per-tile closed form (rank-1)*2^rank; its difference across a move is
/// exactly the reward of that move's merges, for any direction.
pub fn score_board(board: Board) -> f64 {
    table_score(board, &TABLES.score)
}

/// Reward earned by the move that took `before` to `after`.
fn move_score(before: Board, after: Board) -> i32 {
    (score_board(after) - score_board(before)) as i32
}

/// True when the board is full and every direction is a no-op.
pub fn no_moves_left(board: Board) -> bool {
    board.count_empty() == 0
        && Move::SEARCH_ORDER
            .iter()
            .all(|&m| execute_move(m, board) == board)
}

/// Rank of a freshly spawned tile, from one uniform draw in [0,1).
///
/// The distribution hardens as the board grows: past a 512 the spawner also
/// produces 16s, and past a 1024 it produces 32s.
fn spawn_rank(max_rank: u8, draw: f64) -> u8 {
    if max_rank >= 10 {
        // 2: 54%, 4: 30%, 8: 10%, 16: 3%, 32: 3%
        if draw < 0.54 {
            1
        } else if draw < 0.54 + 0.3 {
            2
        } else if draw < 0.54 + 0.3 + 0.1 {
            3
        } else if draw < 0.54 + 0.3 + 0.1 + 0.03 {
            4
        } else {
            5
        }
    } else if max_rank >= 9 {
        // 2: 57%, 4: 30%, 8: 10%, 16: 3%
        if draw < 0.57 {
            1
        } else if draw < 0.57 + 0.3 {
            2
        } else if draw < 0.57 + 0.3 + 0.1 {
            3
        } else {
            4
        }
    } else {
        // 2: 60%, 4: 30%, 8: 10%
        if draw < 0.6 {
            1
        } else if draw < 0.6 + 0.3 {
            2
        } else {
            3
        }
    }
}

/// Deterministic core of the spawner: put a tile on the `index`-th empty cell
/// in scan order, with the rank picked by `draw`.
pub fn place_tile(board: Board, index: u32, draw: f64) -> Board {
    let rank = spawn_rank(board.max_rank(), draw);
    let mut remaining = index;
    for cell in 0..16 {
        if board.rank(cell) != 0 {
            continue;
        }
        if remaining == 0 {
            return board.with_tile(cell, rank);
        }
        remaining -= 1;
    }
    board
}

/// Add one random tile to the board; a full board comes back unchanged.
pub fn add_random_tile<R: Rng>(board: Board, rng: &mut R) -> Board {
    let empty = board.count_empty();
    if empty == 0 {
        return board;
    }
    let index = rng.gen_range(0..empty);
    place_tile(board, index, rng.gen())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameState {
    board: Board,
    score: i32,
    best_score: i32,
    game_over: bool,
}

impl GameState {
    /// Build a state around an existing board, as the custom-board editor
    /// does. Score starts at zero.
    pub fn with_board(board: Board) -> Self {
        GameState {
            board,
            score: 0,
            best_score: 0,
            game_over: no_moves_left(board),
        }
    }

    #[inline]
    pub fn board(&self) -> Board {
        self.board
    }

    #[inline]
    pub fn score(&self) -> i32 {
        self.score
    }

    #[inline]
    pub fn best_score(&self) -> i32 {
        self.best_score
    }

    #[inline]
    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Tile values as the player sees them: 0 or a power of two.
    pub fn grid(&self) -> [[i32; BOARD_SIZE]; BOARD_SIZE] {
        self.board.to_grid()
    }

    /// The highest tile's displayed value.
    pub fn highest_tile(&self) -> i32 {
        match self.board.max_rank() {
            0 => 0,
            rank => 1 << rank,
        }
    }

    /// Start over: empty board, zero score, two spawned tiles. The best
    /// score survives the reset.
    pub fn init_game<R: Rng>(&mut self, rng: &mut R) {
        self.board = Board::default();
        self.score = 0;
        self.game_over = false;
        self.board = add_random_tile(self.board, rng);
        self.board = add_random_tile(self.board, rng);
    }

    /// Try a directional move. A legal move updates the board and score,
    /// spawns one tile and rechecks for game over before returning true; an
    /// illegal move changes nothing.
    pub fn try_move<R: Rng>(&mut self, m: Move, rng: &mut R) -> bool {
        let after = execute_move(m, self.board);
        if after == self.board {
            return false;
        }
        self.score += move_score(self.board, after);
        self.best_score = self.best_score.max(self.score);
        self.board = add_random_tile(after, rng);
        self.game_over = no_moves_left(self.board);
        true
    }

    /// Like [`GameState::try_move`], keyed by direction index. Out-of-range
    /// indices are no-ops.
    pub fn try_move_index<R: Rng>(&mut self, index: i32, rng: &mut R) -> bool {
        match Move::from_index(index) {
            Some(m) => self.try_move(m, rng),
            None => false,
        }
    }

    pub fn move_up<R: Rng>(&mut self, rng: &mut R) -> bool {
        self.try_move(Move::Up, rng)
    }

    pub fn move_down<R: Rng>(&mut self, rng: &mut R) -> bool {
        self.try_move(Move::Down, rng)
    }

    pub fn move_left<R: Rng>(&mut self, rng: &mut R) -> bool {
        self.try_move(Move::Left, rng)
    }

    pub fn move_right<R: Rng>(&mut self, rng: &mut R) -> bool {
        self.try_move(Move::Right, rng)
    }

    /// Replace the whole state with a prior snapshot. `GameState` is `Copy`,
    /// so taking a snapshot is just copying `*self`.
    pub fn restore(&mut self, snapshot: GameState) {
        *self = snapshot;
    }
}

/// How many snapshots [`History`] keeps.
pub const UNDO_LIMIT: usize = 10;

/// Bounded ring of prior snapshots backing one-level-per-call undo.
#[derive(Debug, Default)]
pub struct History {
    snaps: VecDeque<GameState>,
}

impl History {
    pub fn new() -> Self {
        History {
            snaps: VecDeque::with_capacity(UNDO_LIMIT),
        }
    }

    /// Record a snapshot, dropping the oldest one past the limit.
    pub fn push(&mut self, snap: GameState) {
        if self.snaps.len() == UNDO_LIMIT {
            self.snaps.pop_front();
        }
        self.snaps.push_back(snap);
    }

    /// Take back the most recent snapshot.
    pub fn pop(&mut self) -> Option<GameState> {
        self.snaps.pop_back()
    }

    pub fn len(&self) -> usize {
        self.snaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snaps.is_empty()
    }
}

/// A running game session: owns the RNG, the state, the undo history and the
/// move counter.
pub struct Game<R: Rng> {
    rng: R,
    state: GameState,
    history: History,
    moves: u32,
}

impl Game<ThreadRng> {
    pub fn new() -> Self {
        Self::from_rng(ThreadRng::default())
    }
}

impl Default for Game<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Game<R> {
    pub fn from_rng(rng: R) -> Self {
        let mut rng = rng;
        let mut state = GameState::default();
        state.init_game(&mut rng);
        Game {
            rng,
            state,
            history: History::new(),
            moves: 0,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Get the number of moves made so far.
    pub fn moves(&self) -> u32 {
        self.moves
    }

    /// Make a move, snapshotting the prior state first so it can be undone.
    pub fn try_move(&mut self, m: Move) -> bool {
        let snap = self.state;
        if self.state.try_move(m, &mut self.rng) {
            self.history.push(snap);
            self.moves += 1;
            true
        } else {
            false
        }
    }

    /// Undo one move, if there is anything to undo.
    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(snap) => {
                self.state.restore(snap);
                true
            }
            None => false,
        }
    }
}
