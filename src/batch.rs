//! Batch simulation of many independent events.
//!
//! Events are embarrassingly parallel: the driver hands each one to a
//! rayon worker holding its own [`Sensor`] with its own random stream, so
//! no mutable state is shared beyond the result list, which is appended
//! under a mutex in completion order. Every result carries its input index
//! so callers can re-sort. Per-event seeds are derived from a master seed
//! plus the event index, which makes a batch reproducible regardless of
//! the worker count.

use std::sync::Mutex;

use log::warn;
use rand::{thread_rng, RngCore};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::SipmError;
use crate::pde::PdeType;
use crate::properties::SensorConfig;
use crate::sensor::{DebugInfo, Sensor};

/// Outcome of one simulated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResult {
    /// Index of the event in the input collection.
    pub idx: usize,
    /// Photon arrival times the event was run with.
    pub times: Vec<f64>,
    /// Photon wavelengths, when the event supplied them.
    pub wavelengths: Option<Vec<f64>>,
    /// Raw rendered waveform samples.
    pub signal: Vec<f64>,
    /// Charge integral over the gate window.
    pub integral: f64,
    /// Peak amplitude over the gate window.
    pub peak: f64,
    /// Time over threshold within the gate window.
    pub tot: f64,
    /// Time of arrival relative to the gate start.
    pub toa: f64,
    /// Time of peak relative to the gate start.
    pub top: f64,
    /// Hit counters of the event.
    pub debug: DebugInfo,
}

/// Runs batches of independent events across a pool of sensors.
#[derive(Debug)]
pub struct BatchSimulator {
    config: SensorConfig,
    times: Vec<Vec<f64>>,
    wavelengths: Vec<Vec<f64>>,
    results: Vec<EventResult>,
    gate_start_ns: f64,
    gate_ns: f64,
    threshold: f64,
    master_seed: u64,
}

impl BatchSimulator {
    /// Create a driver for the given sensor configuration with an
    /// entropy-drawn master seed.
    ///
    /// The analysis gate defaults to the whole signal window with a
    /// threshold of half the single-photoelectron peak.
    pub fn new(config: SensorConfig) -> Result<Self, SipmError> {
        Self::with_seed(config, thread_rng().next_u64())
    }

    /// Create a driver with a fixed master seed. Two drivers with the same
    /// configuration, events and master seed produce identical results,
    /// independent of how many workers run them.
    pub fn with_seed(config: SensorConfig, master_seed: u64) -> Result<Self, SipmError> {
        config.validate()?;
        let gate_ns = config.signal_length();
        Ok(Self {
            config,
            times: Vec::new(),
            wavelengths: Vec::new(),
            results: Vec::new(),
            gate_start_ns: 0.0,
            gate_ns,
            threshold: 0.5,
            master_seed,
        })
    }

    /// Set the analysis gate window and threshold used for the per-event
    /// summaries.
    pub fn set_gate(&mut self, start_ns: f64, gate_ns: f64, threshold: f64) {
        self.gate_start_ns = start_ns;
        self.gate_ns = gate_ns;
        self.threshold = threshold;
    }

    /// Replace the event collection with per-event photon times.
    pub fn add_events(&mut self, times: Vec<Vec<f64>>) {
        self.times = times;
        self.wavelengths.clear();
    }

    /// Replace the event collection with per-event photon times and
    /// wavelengths.
    ///
    /// # Errors
    ///
    /// The outer collections must have the same length.
    pub fn add_events_with_wavelengths(
        &mut self,
        times: Vec<Vec<f64>>,
        wavelengths: Vec<Vec<f64>>,
    ) -> Result<(), SipmError> {
        if times.len() != wavelengths.len() {
            return Err(SipmError::WavelengthCountMismatch);
        }
        self.times = times;
        self.wavelengths = wavelengths;
        Ok(())
    }

    /// Append one event given its photon times.
    pub fn push_event(&mut self, times: Vec<f64>) {
        self.times.push(times);
    }

    /// Append one event with photon times and wavelengths.
    ///
    /// # Errors
    ///
    /// The two lists must have the same length.
    pub fn push_event_with_wavelengths(
        &mut self,
        times: Vec<f64>,
        wavelengths: Vec<f64>,
    ) -> Result<(), SipmError> {
        if times.len() != wavelengths.len() {
            return Err(SipmError::WavelengthCountMismatch);
        }
        self.times.push(times);
        self.wavelengths.push(wavelengths);
        Ok(())
    }

    /// Number of queued events.
    pub fn n_events(&self) -> usize {
        self.times.len()
    }

    /// Drop all queued events and results.
    pub fn clear(&mut self) {
        self.times.clear();
        self.wavelengths.clear();
        self.results.clear();
    }

    /// Run every queued event in parallel.
    ///
    /// When spectrum PDE is configured but an event carries no usable
    /// wavelengths, that event is downgraded to run without PDE and a
    /// warning is logged; the batch itself does not fail.
    pub fn run(&mut self) -> Result<(), SipmError> {
        self.config.validate()?;
        let needs_wavelengths = self.config.pde_type() == PdeType::Spectrum;
        let gate_start = self.gate_start_ns;
        let gate = self.gate_ns;
        let threshold = self.threshold;
        let master_seed = self.master_seed;
        let config = &self.config;
        let times = &self.times;
        let wavelengths = &self.wavelengths;

        let results = Mutex::new(Vec::with_capacity(times.len()));
        times.par_iter().enumerate().try_for_each_init(
            || Sensor::new(config.clone()).expect("configuration validated before dispatch"),
            |sensor, (idx, event_times)| -> Result<(), SipmError> {
                sensor.seed(master_seed.wrapping_add(idx as u64));
                sensor.reset_state();

                let event_wavelengths = wavelengths
                    .get(idx)
                    .filter(|w| w.len() == event_times.len());
                if needs_wavelengths {
                    match event_wavelengths {
                        Some(w) => {
                            sensor.set_pde_type(PdeType::Spectrum)?;
                            sensor.add_photons_with_wavelengths(event_times, w)?;
                        }
                        None => {
                            warn!("event {idx} has no usable wavelengths, running without pde");
                            sensor.set_pde_type(PdeType::None)?;
                            sensor.add_photons(event_times);
                        }
                    }
                } else {
                    sensor.add_photons(event_times);
                }
                sensor.run_event()?;

                let signal = sensor.signal();
                let result = EventResult {
                    idx,
                    times: event_times.clone(),
                    wavelengths: event_wavelengths.cloned(),
                    signal: signal.samples().to_vec(),
                    integral: signal.integral(gate_start, gate, threshold),
                    peak: signal.peak(gate_start, gate, threshold),
                    tot: signal.tot(gate_start, gate, threshold),
                    toa: signal.toa(gate_start, gate, threshold),
                    top: signal.top(gate_start, gate, threshold),
                    debug: sensor.debug_info(),
                };
                results.lock().unwrap().push(result);
                Ok(())
            },
        )?;

        self.results = results.into_inner().unwrap();
        Ok(())
    }

    /// Results of the last run, in completion order. Sort by
    /// [`EventResult::idx`] to recover the input order.
    pub fn results(&self) -> &[EventResult] {
        &self.results
    }

    /// Consume the driver and take the results.
    pub fn into_results(self) -> Vec<EventResult> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pde::PdeSpectrum;

    fn quiet_config() -> SensorConfig {
        let mut config = SensorConfig::default();
        config.set_property("Pitch", 100.0).unwrap();
        config.set_property("Dcr", 0.0).unwrap();
        config.set_property("Xt", 0.0).unwrap();
        config.set_property("Ap", 0.0).unwrap();
        config.set_property("Ccgv", 0.0).unwrap();
        config.set_property("Snr", 0.0).unwrap();
        config
    }

    fn sorted(mut results: Vec<EventResult>) -> Vec<EventResult> {
        results.sort_by_key(|r| r.idx);
        results
    }

    #[test]
    fn test_runs_all_events() {
        let mut batch = BatchSimulator::with_seed(quiet_config(), 42).unwrap();
        batch.add_events((0..8).map(|i| vec![50.0 + i as f64]).collect());
        batch.run().unwrap();

        assert_eq!(batch.results().len(), 8);
        let results = sorted(batch.into_results());
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.idx, i);
            assert_eq!(result.debug.n_pe, 1);
            assert_eq!(result.signal.len(), 500);
            assert!(result.integral > 0.0);
            assert!((result.peak - 1.0).abs() < 1e-9);
            assert!(result.wavelengths.is_none());
        }
    }

    #[test]
    fn test_master_seed_makes_runs_reproducible() {
        let mut config = quiet_config();
        config.set_property("Dcr", 1e6).unwrap();
        config.set_property("Xt", 0.1).unwrap();
        config.set_property("Ap", 0.05).unwrap();
        config.set_property("Snr", 0.03).unwrap();
        config.set_property("Ccgv", 0.05).unwrap();

        let events: Vec<Vec<f64>> = (0..16).map(|i| vec![10.0 * i as f64]).collect();
        let mut first = BatchSimulator::with_seed(config.clone(), 7).unwrap();
        first.add_events(events.clone());
        first.run().unwrap();
        let mut second = BatchSimulator::with_seed(config, 7).unwrap();
        second.add_events(events);
        second.run().unwrap();

        let first = sorted(first.into_results());
        let second = sorted(second.into_results());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.idx, b.idx);
            assert_eq!(a.signal, b.signal);
            assert_eq!(a.debug, b.debug);
        }
    }

    #[test]
    fn test_spectrum_without_wavelengths_downgrades() {
        let mut config = quiet_config();
        config.set_pde_spectrum(
            PdeSpectrum::from_table(vec![300.0, 500.0], vec![0.0, 0.0]).unwrap(),
        );

        let mut batch = BatchSimulator::with_seed(config, 42).unwrap();
        batch.add_events(vec![vec![10.0, 20.0], vec![30.0]]);
        batch.run().unwrap();

        // Without wavelengths the events run in no-pde mode, so every
        // photon converts despite the all-zero spectrum.
        let results = sorted(batch.into_results());
        assert_eq!(results[0].debug.n_pe, 2);
        assert_eq!(results[1].debug.n_pe, 1);
    }

    #[test]
    fn test_spectrum_with_wavelengths_applies_table() {
        let mut config = quiet_config();
        config.set_pde_spectrum(
            PdeSpectrum::from_table(vec![300.0, 400.0, 500.0], vec![0.0, 1.0, 0.0]).unwrap(),
        );

        let mut batch = BatchSimulator::with_seed(config, 42).unwrap();
        batch
            .add_events_with_wavelengths(
                vec![vec![10.0, 20.0]],
                vec![vec![300.0, 400.0]],
            )
            .unwrap();
        batch.run().unwrap();

        let results = batch.into_results();
        assert_eq!(results[0].debug.n_pe, 1);
        assert_eq!(results[0].wavelengths.as_deref(), Some(&[300.0, 400.0][..]));
    }

    #[test]
    fn test_push_and_clear() {
        let mut batch = BatchSimulator::with_seed(quiet_config(), 42).unwrap();
        batch.push_event(vec![10.0]);
        batch
            .push_event_with_wavelengths(vec![20.0], vec![450.0])
            .unwrap();
        assert_eq!(batch.n_events(), 2);
        assert!(matches!(
            batch.push_event_with_wavelengths(vec![1.0, 2.0], vec![450.0]),
            Err(SipmError::WavelengthCountMismatch)
        ));

        batch.run().unwrap();
        assert_eq!(batch.results().len(), 2);

        batch.clear();
        assert_eq!(batch.n_events(), 0);
        assert!(batch.results().is_empty());
    }

    #[test]
    fn test_mismatched_outer_collections_rejected() {
        let mut batch = BatchSimulator::with_seed(quiet_config(), 42).unwrap();
        assert!(matches!(
            batch.add_events_with_wavelengths(vec![vec![1.0]], vec![]),
            Err(SipmError::WavelengthCountMismatch)
        ));
    }

    #[test]
    fn test_gate_window_summaries() {
        let mut batch = BatchSimulator::with_seed(quiet_config(), 42).unwrap();
        batch.set_gate(90.0, 200.0, 0.5);
        batch.add_events(vec![vec![100.0]]);
        batch.run().unwrap();

        let result = &batch.results()[0];
        // The pulse starts 10 ns into the gate.
        assert!(result.toa >= 10.0 && result.toa < 20.0);
        assert!(result.top > result.toa);
        assert!(result.tot > 0.0);
    }
}
