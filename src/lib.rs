#![allow(clippy::needless_return)]
use std::{io, time::Instant};

use ai::{find_best_move_with_stats, rand_move, SearchStats};
use game::{Game, GameState, Move};
use rand::prelude::ThreadRng;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[macro_use]
extern crate static_assertions;

#[macro_use]
extern crate lazy_static;

pub mod ai;
pub mod game;

fn gray_write<S: AsRef<str>>(stream: &mut StandardStream, s: S) -> io::Result<()> {
    _ = stream.set_color(ColorSpec::new().set_fg(Some(Color::Rgb(200, 200, 200))));
    write!(stream, "{}", s.as_ref())?;
    stream.reset()?;
    Ok(())
}

// convenience that cleans up the code
fn gray_writeln<S: AsRef<str>>(stream: &mut StandardStream, s: S) -> io::Result<()> {
    gray_write(stream, s)?;
    writeln!(stream)?;
    Ok(())
}

fn write_state(s: &GameState, stream: &mut StandardStream) -> io::Result<()> {
    writeln!(stream, "  score {:>6}   best {:>6}", s.score(), s.best_score())?;
    let sep = format!("+{bar}+{bar}+{bar}+{bar}+", bar = "------");
    gray_writeln(stream, &sep)?;
    for row in s.grid().iter() {
        gray_write(stream, "|")?;
        for &tile in row.iter() {
            if tile == 0 {
                write!(stream, "      ")?;
                stream.reset()?;
            } else {
                write!(stream, "{:>5} ", tile)?;
            }
            gray_write(stream, "|")?;
        }
        writeln!(stream)?;
        gray_writeln(stream, &sep)?;
    }
    Ok(())
}

fn print_state(s: &GameState) {
    write_state(s, &mut StandardStream::stdout(ColorChoice::Always))
        .expect("could not print colored state");
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depth {
    /// Let the search pick its own limit from the board's crowding.
    Adaptive,
    Fixed(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Expectimax(Depth),
    Random,
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub algorithm: Algorithm,
    pub target_tile: Option<i32>,
}

impl Config {
    fn next_move(&self, s: &GameState, stats: &mut Option<SearchStats>) -> Option<Move> {
        match self.algorithm {
            Algorithm::Expectimax(depth) => {
                let requested = match depth {
                    Depth::Adaptive => 15,
                    Depth::Fixed(d) => d,
                };
                let (best, search) = find_best_move_with_stats(s, requested);
                *stats = Some(search);
                Move::from_index(best)
            }
            Algorithm::Random => rand_move(s.board(), &mut ThreadRng::default()),
        }
    }

    /// Run the game to completion and return whether this counts as a win.
    pub fn run(&self) -> bool {
        game::init_tables();
        let mut game = Game::new();
        print_state(game.state());
        let start = Instant::now();
        // current estimate
        let mut moves_per_s = 0.0;
        let mut stats = None;
        while let Some(m) = self.next_move(game.state(), &mut stats) {
            if !game.try_move(m) {
                break;
            }

            _ = clearscreen::clear();
            let moves = game.moves();
            // generate an estimate early on, and then periodically
            if moves == 10 || moves % 50 == 0 {
                let elapsed_s = start.elapsed().as_secs_f64();
                moves_per_s = moves as f64 / elapsed_s;
            }
            println!("  {:>4} {:0.0} moves/s", moves, moves_per_s);
            if let Some(st) = stats {
                println!(
                    "  depth {}  evaled {}  cache hits {}",
                    st.depth_limit, st.moves_evaled, st.cachehits
                );
            }
            print_state(game.state());
            if let Some(target) = self.target_tile {
                if game.state().highest_tile() >= target {
                    break;
                }
            }
        }
        println!(
            "score: {score}  highest: {tile}  moves: {moves}",
            score = game.state().score(),
            tile = game.state().highest_tile(),
            moves = game.moves(),
        );
        return self.won(game.state());
    }

    pub fn won(&self, s: &GameState) -> bool {
        match self.target_tile {
            Some(target) => s.highest_tile() >= target,
            None => true,
        }
    }
}
