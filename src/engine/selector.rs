//! Candidate selection strategy shared by the entry scanner and the rotation
//! optimizer.  The default draws a uniform random sample; a ranked selector
//! can be dropped in without touching either caller.

use rand::seq::SliceRandom;

pub trait CandidateSelector: Send + Sync {
    /// Pick at most `count` distinct entries from `candidates`.
    fn select(&self, candidates: &[String], count: usize) -> Vec<String>;
}

/// Uniform sampling without replacement.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl CandidateSelector for RandomSelector {
    fn select(&self, candidates: &[String], count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        candidates.choose_multiple(&mut rng, count).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_sample_is_distinct_and_bounded() {
        let pool: Vec<String> = (0..30).map(|i| format!("S{i}")).collect();
        let picked = RandomSelector.select(&pool, 20);
        assert_eq!(picked.len(), 20);
        assert_eq!(picked.iter().collect::<HashSet<_>>().len(), 20);
        assert!(picked.iter().all(|s| pool.contains(s)));

        assert_eq!(RandomSelector.select(&pool[..2], 5).len(), 2);
        assert!(RandomSelector.select(&[], 3).is_empty());
    }
}
