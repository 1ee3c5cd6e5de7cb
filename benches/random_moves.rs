use criterion::{criterion_group, criterion_main, Criterion};
use em2048::ai::rand_move;
use em2048::game::{init_tables, Game};
use rand::{prelude::StdRng, SeedableRng};

// Caps each playout; the seeds are fixed, so every iteration replays the
// same game and the timing stays comparable.
const MOVE_BUDGET: u32 = 150;

fn random_playout() -> i32 {
    let mut game = Game::from_rng(StdRng::seed_from_u64(0xE5));
    let mut policy_rng = StdRng::seed_from_u64(0x2048);
    while game.moves() < MOVE_BUDGET {
        match rand_move(game.state().board(), &mut policy_rng) {
            Some(m) => {
                game.try_move(m);
            }
            None => break,
        }
    }
    game.state().score()
}

fn criterion_benchmark(c: &mut Criterion) {
    init_tables();
    c.bench_function("random playout", |b| b.iter(random_playout));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
