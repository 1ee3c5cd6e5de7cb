use clap::Parser;
use std::process;

use em2048::{Algorithm, Config, Depth};

#[derive(Parser, Debug)]
struct Args {
    #[clap(long, default_value = "expectimax")]
    algorithm: String,

    #[clap(short, long)]
    depth: Option<i32>,

    #[clap(short, long, default_value_t = 2048)]
    target: i32,

    #[clap(short, long)]
    unbounded: bool,
}

fn main() {
    let args = Args::parse();
    let depth = match args.depth {
        Option::Some(d) => Depth::Fixed(d),
        Option::None => Depth::Adaptive,
    };
    let algorithm = if args.algorithm == "expectimax" {
        Algorithm::Expectimax(depth)
    } else if args.algorithm == "random" {
        Algorithm::Random
    } else {
        eprintln!("unknown algorithm {}", args.algorithm);
        process::exit(1);
    };
    let target_tile = if args.unbounded {
        None
    } else {
        Some(args.target)
    };

    let config = Config {
        algorithm,
        target_tile,
    };
    let win = config.run();
    if !win {
        eprintln!("failed to get to {}", config.target_tile.unwrap());
        process::exit(1);
    }
}
