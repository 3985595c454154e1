//! Single-photoelectron pulse template.
//!
//! The rendered waveform is a superposition of one template pulse per cell
//! firing, so the template is computed once per configuration change and
//! reused for every hit of every event.

use ndarray::Array1;

use crate::properties::SensorConfig;

/// Compute the peak-normalized single-photoelectron template.
///
/// In normalized sample units `tau' = tau / sampling` the two-exponential
/// model is `s[i] = exp(-i/tau'_ff) - exp(-i/tau'_r)`; with the slow
/// component enabled the fast term splits into fast and slow falling
/// exponentials weighted by the slow fraction. The result is divided by
/// its maximum so the peak is exactly 1.
pub fn pulse_template(config: &SensorConfig) -> Array1<f64> {
    let n = config.n_signal_points();
    let sampling = config.sampling();
    let tr = config.rising_time() / sampling;
    let tff = config.falling_time_fast() / sampling;

    let mut shape = if config.has_slow_component() {
        let tfs = config.falling_time_slow() / sampling;
        let slf = config.slow_component_fraction();
        Array1::from_shape_fn(n, |i| {
            let t = i as f64;
            (1.0 - slf) * (-t / tff).exp() + slf * (-t / tfs).exp() - (-t / tr).exp()
        })
    } else {
        Array1::from_shape_fn(n, |i| {
            let t = i as f64;
            (-t / tff).exp() - (-t / tr).exp()
        })
    };

    let peak = shape.fold(f64::MIN, |acc, &s| acc.max(s));
    if peak > 0.0 {
        shape.mapv_inplace(|s| s / peak);
    }
    shape
}

/// Index of the template maximum.
pub fn peak_index(template: &Array1<f64>) -> usize {
    let mut best = 0;
    for (i, &value) in template.iter().enumerate() {
        if value > template[best] {
            best = i;
        }
    }
    best
}
