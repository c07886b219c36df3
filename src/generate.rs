//! Synthetic corpus generator. Writes a fresh text log of N distinct
//! random lowercase words, all active, ready to be opened by the
//! engine. Mostly useful to measure index build and query times at a
//! chosen scale.

use std::collections::HashSet;
use std::path::Path;

use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::textlog;

const MIN_LENGTH: usize = 3;
const MAX_LENGTH: usize = 12;

/// One random word, lowercase a-z.
fn random_word(rng: &mut SmallRng) -> Vec<u8> {
    let length = rng.gen_range(MIN_LENGTH..=MAX_LENGTH);
    (0..length).map(|_| rng.gen_range(b'a'..=b'z')).collect()
}

/// Write a fresh log of `count` distinct synthetic words to `path`,
/// replacing whatever was there.
pub fn generate(path: &Path, count: usize) -> Result<()> {
    generate_seeded(path, count, rand::random())
}

/// Same, with a caller-chosen seed so tests get stable corpora.
pub fn generate_seeded(path: &Path, count: usize, seed: u64) -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(seed);

    let mut words: HashSet<Vec<u8>> = HashSet::with_capacity(count);
    let mut ordered: Vec<Vec<u8>> = Vec::with_capacity(count);

    while ordered.len() < count {
        let word = random_word(&mut rng);
        if words.insert(word.clone()) {
            ordered.push(word);
        }
    }

    textlog::write_all(
        path,
        ordered
            .iter()
            .enumerate()
            .map(|(id, word)| (id as u32, word.as_slice(), false)),
    )?;

    info!("generated {} words into {}", count, path.display());
    Ok(())
}
