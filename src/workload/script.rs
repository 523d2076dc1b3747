//! Deterministic operation scripts replayed against a scoreboard.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::scoreboard::{Score, Scoreboard, ScoreboardError};

/// Share of scripted operations that are writes.
const UPDATE_RATIO: f64 = 0.6;

/// Single scripted scoreboard call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Update { name: String, value: Score },
    Read { name: String },
}

/// Apply `ops` in order and collect one result per `Read`.
pub async fn replay(
    board: &dyn Scoreboard,
    ops: &[Op],
) -> Result<Vec<Option<Score>>, ScoreboardError> {
    let mut reads = Vec::new();
    for op in ops {
        match op {
            Op::Update { name, value } => board.update(name, *value).await?,
            Op::Read { name } => reads.push(board.read(name).await?),
        }
    }
    Ok(reads)
}

/// Pseudo-random script over `keys` names, reproducible from `seed`.
///
/// Reads may target names that were never written, so replays also cover
/// the not-found path.
pub fn scripted_ops(len: usize, keys: usize, seed: u64) -> Vec<Op> {
    let mut rng = StdRng::seed_from_u64(seed);
    let keys = keys.max(1);
    (0..len)
        .map(|_| {
            let name = format!("player{}", rng.gen_range(0..keys));
            if rng.gen_bool(UPDATE_RATIO) {
                Op::Update {
                    name,
                    value: rng.gen_range(-1_000..=1_000),
                }
            } else {
                Op::Read { name }
            }
        })
        .collect()
}
