//! Leaky integrate-and-fire neuron kernels
//!
//! Both kernels advance a population of neurons from an input current
//! signal J and write their output signal in place. [`LifState`] owns the
//! per-neuron internal state (membrane voltage and refractory countdown);
//! it belongs to the operator instance, persists across steps, and is never
//! visible to any other operator — it is not a signal.

use serde::{Deserialize, Serialize};

/// Population parameters shared by the spiking and rate kernels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifParams {
    #[serde(rename = "n-neurons")]
    pub n_neurons: usize,
    #[serde(rename = "tau-rc")]
    pub tau_rc: f64,
    #[serde(rename = "tau-ref")]
    pub tau_ref: f64,
}

/// Per-neuron internal state for the spiking kernel.
#[derive(Debug, Clone)]
pub struct LifState {
    pub params: LifParams,
    voltage: Vec<f64>,
    refractory: Vec<f64>,
}

impl LifState {
    pub fn new(params: LifParams) -> Self {
        Self {
            params,
            voltage: vec![0.0; params.n_neurons],
            refractory: vec![0.0; params.n_neurons],
        }
    }

    /// Advance every neuron by one Euler step of size `dt`. A neuron whose
    /// voltage crosses threshold emits a spike (1.0 in `output`), resets to
    /// zero and enters its refractory period; all others output 0.0.
    pub fn step(&mut self, dt: f64, j: &[f64], output: &mut [f64]) {
        let tau_rc = self.params.tau_rc;
        let tau_ref = self.params.tau_ref;

        for i in 0..self.params.n_neurons {
            let dv = (dt / tau_rc) * (j[i] - self.voltage[i]);
            let mut v = self.voltage[i] + dv;
            if v < 0.0 {
                v = 0.0;
            }

            self.refractory[i] -= dt;
            let post_ref = (1.0 - self.refractory[i] / dt).clamp(0.0, 1.0);
            v *= post_ref;

            if v > 1.0 {
                output[i] = 1.0;
                // Spread the refractory window back over the overshoot so
                // spike timing does not quantize to whole steps.
                let overshoot = if dv > 0.0 { (v - 1.0) / dv } else { 0.0 };
                self.refractory[i] = tau_ref + dt * (1.0 - overshoot);
                v = 0.0;
            } else {
                output[i] = 0.0;
            }

            self.voltage[i] = v;
        }
    }
}

/// Steady-state firing rate approximation, scaled by `dt` so probe sums
/// integrate like spike counts. Stateless.
pub fn lif_rate_step(params: &LifParams, dt: f64, j: &[f64], output: &mut [f64]) {
    for i in 0..params.n_neurons {
        let x = j[i] - 1.0;
        output[i] = if x > 0.0 {
            dt / (params.tau_ref + params.tau_rc * (1.0 + 1.0 / x).ln())
        } else {
            0.0
        };
    }
}
