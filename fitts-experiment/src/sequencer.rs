use crate::config::SessionConfig;
use fitts_core::{Condition, condition_universe};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::VecDeque;

/// Supplies the (amplitude, width) condition for every target.
///
/// The main sequence is every condition repeated `repetitions` times,
/// shuffled once from the seed and handed out front to back. Practice
/// conditions are drawn without replacement from the distinct conditions,
/// fresh on every practice start.
#[derive(Debug, Clone)]
pub struct TrialSequencer {
    universe: Vec<Condition>,
    experiment_order: Vec<Condition>,
    pending: VecDeque<Condition>,
    practice: Vec<Condition>,
    practice_len: usize,
    practice_cursor: usize,
    rng: StdRng,
}

impl TrialSequencer {
    pub fn new(
        distances: &[u32],
        widths: &[u32],
        repetitions: usize,
        practice_len: usize,
        seed: u64,
    ) -> Self {
        let universe = condition_universe(distances, widths);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut experiment_order: Vec<Condition> = universe
            .iter()
            .flat_map(|c| std::iter::repeat_n(*c, repetitions))
            .collect();
        experiment_order.shuffle(&mut rng);

        Self {
            pending: experiment_order.iter().copied().collect(),
            universe,
            experiment_order,
            practice: Vec::new(),
            practice_len,
            practice_cursor: 0,
            rng,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            &config.distances,
            &config.widths,
            config.repetitions,
            config.practice_targets,
            config.seed,
        )
    }

    /// Draws a new practice sample and rewinds to its first condition.
    pub fn restart_practice(&mut self) {
        self.practice = self
            .universe
            .choose_multiple(&mut self.rng, self.practice_len)
            .copied()
            .collect();
        self.practice_cursor = 0;
    }

    /// Next practice condition. Wraps around when more practice targets are
    /// requested than there are distinct conditions.
    pub fn next_practice(&mut self) -> Option<Condition> {
        if self.practice.is_empty() {
            return None;
        }
        let condition = self.practice[self.practice_cursor % self.practice.len()];
        self.practice_cursor += 1;
        Some(condition)
    }

    /// Refills the main queue with the seeded order.
    pub fn restart_experiment(&mut self) {
        self.pending = self.experiment_order.iter().copied().collect();
    }

    pub fn next_experiment(&mut self) -> Option<Condition> {
        self.pending.pop_front()
    }

    pub fn remaining_experiment(&self) -> usize {
        self.pending.len()
    }

    pub fn experiment_order(&self) -> &[Condition] {
        &self.experiment_order
    }

    pub fn practice_order(&self) -> &[Condition] {
        &self.practice
    }

    pub fn universe(&self) -> &[Condition] {
        &self.universe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn standard(seed: u64) -> TrialSequencer {
        TrialSequencer::new(&[200, 400, 600, 800], &[30, 50, 70], 10, 3, seed)
    }

    #[test]
    fn same_seed_same_order() {
        assert_eq!(standard(42).experiment_order(), standard(42).experiment_order());
        assert_ne!(standard(42).experiment_order(), standard(43).experiment_order());
    }

    #[test]
    fn main_sequence_consumes_each_pair_exactly_once() {
        let mut seq = standard(42);
        assert_eq!(seq.experiment_order().len(), 120);

        let mut counts: HashMap<Condition, usize> = HashMap::new();
        while let Some(c) = seq.next_experiment() {
            *counts.entry(c).or_default() += 1;
        }
        assert_eq!(counts.len(), 12);
        assert!(counts.values().all(|&n| n == 10));
        assert_eq!(seq.next_experiment(), None);
        assert_eq!(seq.remaining_experiment(), 0);
    }

    #[test]
    fn restart_replays_the_same_order() {
        let mut seq = standard(42);
        let first: Vec<_> = std::iter::from_fn(|| seq.next_experiment()).take(5).collect();
        seq.restart_experiment();
        assert_eq!(seq.remaining_experiment(), 120);
        assert_eq!(&first[..], &seq.experiment_order()[..5]);
    }

    #[test]
    fn practice_sample_has_no_repeats() {
        let mut seq = standard(42);
        seq.restart_practice();
        let sample = seq.practice_order().to_vec();
        assert_eq!(sample.len(), 3);
        for (i, a) in sample.iter().enumerate() {
            assert!(seq.universe().contains(a));
            assert!(sample[i + 1..].iter().all(|b| b != a));
        }
        assert_eq!(seq.next_practice(), Some(sample[0]));
        assert_eq!(seq.next_practice(), Some(sample[1]));
    }

    #[test]
    fn practice_wraps_when_longer_than_universe() {
        let mut seq = TrialSequencer::new(&[200], &[30, 50], 1, 5, 1);
        seq.restart_practice();
        assert_eq!(seq.practice_order().len(), 2);
        let drawn: Vec<_> = (0..5).filter_map(|_| seq.next_practice()).collect();
        assert_eq!(drawn.len(), 5);
        assert_eq!(drawn[0], drawn[2]);
    }
}
