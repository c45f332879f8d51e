//! Probe sampling properties

use lockstep::Probe;
use lockstep::model::Tensor;
use lockstep::model::signal::SignalStore;
use proptest::prelude::*;

proptest! {
    /// Running `n` steps with period `p` always yields floor(n / p)
    /// samples, regardless of the values flowing through the signal.
    #[test]
    fn prop_sample_count_is_floor_n_over_period(steps in 0u64..500, period in 1u64..32) {
        let mut store = SignalStore::new();
        store.add(1, "sig", Tensor::scalar(0.0));

        let mut probe = Probe::new(1, 0, period);
        for step in 1..=steps {
            store.write(0).fill(step as f64);
            probe.record(step, &store);
        }

        prop_assert_eq!(probe.data().len() as u64, steps / period);
    }

    /// Every recorded sample equals the signal's value at its recording
    /// step, not its final value.
    #[test]
    fn prop_samples_snapshot_recording_step(steps in 1u64..100, period in 1u64..16) {
        let mut store = SignalStore::new();
        store.add(1, "sig", Tensor::scalar(0.0));

        let mut probe = Probe::new(1, 0, period);
        for step in 1..=steps {
            store.write(0).fill(step as f64);
            probe.record(step, &store);
        }

        for (i, sample) in probe.data().iter().enumerate() {
            let recorded_at = (i as u64 + 1) * period;
            prop_assert_eq!(&sample.data, &vec![recorded_at as f64]);
        }
    }
}
