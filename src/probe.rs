//! Periodic signal samplers
//!
//! A probe watches one signal and copies its value into an append-only
//! sample sequence every `period` steps. Samples are deep copies, so later
//! in-place mutation of the signal never changes what was recorded. Probes
//! are created during configuration, drained once at gather time, and
//! discarded with their owning chunk.

use crate::model::signal::{SignalStore, SlotIndex};
use crate::model::{ProbeKey, Tensor};

#[derive(Debug, Clone)]
pub struct Probe {
    key: ProbeKey,
    slot: SlotIndex,
    period: u64,
    samples: Vec<Tensor>,
}

impl Probe {
    pub fn new(key: ProbeKey, slot: SlotIndex, period: u64) -> Self {
        Self {
            key,
            slot,
            period: period.max(1),
            samples: Vec::new(),
        }
    }

    pub fn key(&self) -> ProbeKey {
        self.key
    }

    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    /// Record the target signal if due. `step` is the 1-based count of
    /// completed steps, so `n` steps yield exactly `floor(n / period)`
    /// samples.
    pub fn record(&mut self, step: u64, store: &SignalStore) {
        if step % self.period == 0 {
            self.samples.push(store.snapshot(self.slot));
        }
    }

    /// The accumulated samples, without resetting them.
    pub fn data(&self) -> &[Tensor] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_one() -> SignalStore {
        let mut store = SignalStore::new();
        store.add(1, "sig", Tensor::vector(vec![0.0]));
        store
    }

    #[test]
    fn test_period_one_records_every_step() {
        let store = store_one();
        let mut probe = Probe::new(10, 0, 1);
        for step in 1..=5 {
            probe.record(step, &store);
        }
        assert_eq!(probe.data().len(), 5);
    }

    #[test]
    fn test_sample_count_is_floor_n_over_period() {
        let store = store_one();
        let mut probe = Probe::new(10, 0, 3);
        for step in 1..=10 {
            probe.record(step, &store);
        }
        assert_eq!(probe.data().len(), 3);
    }

    #[test]
    fn test_samples_immune_to_later_mutation() {
        let store = store_one();
        let mut probe = Probe::new(10, 0, 1);
        store.write(0).fill(1.0);
        probe.record(1, &store);
        store.write(0).fill(2.0);
        probe.record(2, &store);

        assert_eq!(probe.data()[0].data, vec![1.0]);
        assert_eq!(probe.data()[1].data, vec![2.0]);
    }

    #[test]
    fn test_data_does_not_reset() {
        let store = store_one();
        let mut probe = Probe::new(10, 0, 1);
        probe.record(1, &store);
        assert_eq!(probe.data().len(), 1);
        assert_eq!(probe.data().len(), 1);
    }

    #[test]
    fn test_zero_period_clamped() {
        let probe = Probe::new(1, 0, 0);
        assert_eq!(probe.period(), 1);
    }
}
