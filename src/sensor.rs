//! The SiPM event engine.
//!
//! A [`Sensor`] turns a list of incident photons into the analog waveform a
//! real device would deliver. One event runs the staged pipeline of
//! [`Sensor::run_event`]: dark counts and detected photons seed the hit
//! buffer, optical cross-talk and after-pulses expand it through
//! self-appending generation passes, the recharge resolver reconciles
//! repeated firings of the same cell, and the renderer superposes one
//! template pulse per hit with gain and noise stochastics.
//!
//! A sensor is single threaded and owns everything it touches: its
//! configuration snapshot, pulse template, random stream, hit buffer and
//! last signal. Run many sensors in parallel rather than sharing one.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use log::debug;
use ndarray::{s, Array1, Zip};
use serde::{Deserialize, Serialize};

use crate::error::SipmError;
use crate::hit::{Hit, HitBuffer, HitOrigin};
use crate::pde::{PdeSpectrum, PdeType};
use crate::properties::{HitDistribution, SensorConfig};
use crate::pulse::pulse_template;
use crate::rng::EventRng;
use crate::signal::AnalogSignal;

/// Hit counters of the last event, split by origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Photons loaded for the event.
    pub n_photons: usize,
    /// Photoelectron hits.
    pub n_pe: u32,
    /// Dark-count hits.
    pub n_dcr: u32,
    /// Optical cross-talk hits.
    pub n_xt: u32,
    /// After-pulse hits.
    pub n_ap: u32,
}

impl DebugInfo {
    /// Total hits of the event, equal to the hit-buffer length.
    pub fn n_total_hits(&self) -> u32 {
        self.n_pe + self.n_dcr + self.n_xt + self.n_ap
    }
}

impl fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "photons={} pe={} dcr={} xt={} ap={}",
            self.n_photons, self.n_pe, self.n_dcr, self.n_xt, self.n_ap
        )
    }
}

/// A simulated SiPM sensor.
#[derive(Debug, Clone)]
pub struct Sensor {
    config: SensorConfig,
    template: Array1<f64>,
    rng: EventRng,
    photon_times: Vec<f64>,
    photon_wavelengths: Vec<f64>,
    hits: HitBuffer,
    signal: AnalogSignal,
    n_pe: u32,
    n_dcr: u32,
    n_xt: u32,
    n_ap: u32,
}

impl Sensor {
    /// Create a sensor with an entropy-seeded random stream.
    ///
    /// # Errors
    ///
    /// Rejects configurations that fail [`SensorConfig::validate`].
    pub fn new(config: SensorConfig) -> Result<Self, SipmError> {
        Self::build(config, EventRng::from_entropy())
    }

    /// Create a sensor with a fixed seed. Two sensors with identical
    /// configuration and seed produce bit-identical events.
    pub fn with_seed(config: SensorConfig, seed: u64) -> Result<Self, SipmError> {
        Self::build(config, EventRng::seeded(seed))
    }

    fn build(config: SensorConfig, rng: EventRng) -> Result<Self, SipmError> {
        config.validate()?;
        let template = pulse_template(&config);
        let sampling = config.sampling();
        Ok(Self {
            config,
            template,
            rng,
            photon_times: Vec::new(),
            photon_wavelengths: Vec::new(),
            hits: HitBuffer::new(),
            signal: AnalogSignal::empty(sampling),
            n_pe: 0,
            n_dcr: 0,
            n_xt: 0,
            n_ap: 0,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Replace the whole configuration and rebuild the pulse template.
    pub fn set_config(&mut self, config: SensorConfig) -> Result<(), SipmError> {
        config.validate()?;
        self.config = config;
        self.rebuild_template();
        Ok(())
    }

    /// Set a named parameter, see [`SensorConfig::set_property`]. The
    /// cached pulse template is rebuilt on success.
    pub fn set_property(&mut self, name: &str, value: f64) -> Result<(), SipmError> {
        self.config.set_property(name, value)?;
        self.rebuild_template();
        Ok(())
    }

    /// Select the photo-detection efficiency mode.
    pub fn set_pde_type(&mut self, pde_type: PdeType) -> Result<(), SipmError> {
        self.config.set_pde_type(pde_type)
    }

    /// Install a detection-probability spectrum and switch to spectrum
    /// mode.
    pub fn set_pde_spectrum(&mut self, spectrum: PdeSpectrum) {
        self.config.set_pde_spectrum(spectrum);
    }

    /// Select the spatial distribution of photoelectron hits.
    pub fn set_hit_distribution(&mut self, distribution: HitDistribution) {
        self.config.set_hit_distribution(distribution);
    }

    fn rebuild_template(&mut self) {
        self.template = pulse_template(&self.config);
        self.signal = AnalogSignal::empty(self.config.sampling());
    }

    /// Restart the random stream from `seed`.
    pub fn seed(&mut self, seed: u64) {
        self.rng.reseed(seed);
    }

    /// The peak-normalized single-photoelectron template.
    pub fn pulse_shape(&self) -> &Array1<f64> {
        &self.template
    }

    /// Queue a photon arriving at `time` (ns).
    pub fn add_photon(&mut self, time: f64) {
        self.photon_times.push(time);
    }

    /// Queue a photon with its wavelength (nm), required for spectrum PDE.
    pub fn add_photon_with_wavelength(&mut self, time: f64, wavelength: f64) {
        self.photon_times.push(time);
        self.photon_wavelengths.push(wavelength);
    }

    /// Queue a batch of photons.
    pub fn add_photons(&mut self, times: &[f64]) {
        self.photon_times.extend_from_slice(times);
    }

    /// Queue a batch of photons with wavelengths.
    ///
    /// # Errors
    ///
    /// The two slices must have the same length.
    pub fn add_photons_with_wavelengths(
        &mut self,
        times: &[f64],
        wavelengths: &[f64],
    ) -> Result<(), SipmError> {
        if times.len() != wavelengths.len() {
            return Err(SipmError::WavelengthCountMismatch);
        }
        self.photon_times.extend_from_slice(times);
        self.photon_wavelengths.extend_from_slice(wavelengths);
        Ok(())
    }

    /// Run one complete event over the queued photons.
    ///
    /// Clears the previous event's hits, counters and signal, then runs
    /// dark-count generation, photoelectron generation, cross-talk
    /// expansion, recharge resolution, after-pulse expansion and the
    /// waveform render, in that order. Passes whose parameter is zero are
    /// skipped. The queued photons stay loaded; call [`Sensor::reset_state`]
    /// to drop them.
    ///
    /// # Errors
    ///
    /// Spectrum PDE mode requires one wavelength per queued photon.
    pub fn run_event(&mut self) -> Result<(), SipmError> {
        if self.config.pde_type() == PdeType::Spectrum
            && self.photon_wavelengths.len() != self.photon_times.len()
        {
            return Err(SipmError::MissingWavelengths);
        }

        self.clear_event_state();
        if self.config.has_dcr() {
            self.add_dark_counts();
        }
        self.add_photoelectrons();
        if self.config.has_xt() {
            self.add_crosstalk();
        }
        self.resolve_recharge();
        if self.config.has_ap() {
            self.add_afterpulses();
        }
        self.render_signal();

        debug!("event complete: {}", self.debug_info());
        Ok(())
    }

    /// The waveform rendered by the last event.
    pub fn signal(&self) -> &AnalogSignal {
        &self.signal
    }

    /// All hits of the last event: time-sorted by the recharge resolver,
    /// with after-pulses appended behind in generation order.
    pub fn hits(&self) -> &[Hit] {
        self.hits.hits()
    }

    /// Parent index per hit of the last event, `-1` for photoelectrons and
    /// dark counts.
    pub fn hits_graph(&self) -> &[i32] {
        self.hits.parents()
    }

    /// Counters of the last event.
    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            n_photons: self.photon_times.len(),
            n_pe: self.n_pe,
            n_dcr: self.n_dcr,
            n_xt: self.n_xt,
            n_ap: self.n_ap,
        }
    }

    /// Clear queued photons, hits, counters and the signal.
    pub fn reset_state(&mut self) {
        self.photon_times.clear();
        self.photon_wavelengths.clear();
        self.clear_event_state();
    }

    fn clear_event_state(&mut self) {
        self.hits.clear();
        self.n_pe = 0;
        self.n_dcr = 0;
        self.n_xt = 0;
        self.n_ap = 0;
        self.signal = AnalogSignal::empty(self.config.sampling());

        // The generation passes grow the buffer, so reserve for the
        // expected primaries plus the mean correlated-noise expansion.
        let expected_dark = (self.config.dcr() * self.config.signal_length() * 1e-9).ceil();
        let primaries = self.photon_times.len() as f64 + expected_dark;
        let expansion = 1.0 + self.config.xt() + self.config.ap();
        self.hits.reserve((primaries * expansion) as usize + 8);
    }

    /// Draw a cell under the configured spatial distribution.
    fn hit_cell(&mut self) -> (u32, u32) {
        let m = self.config.n_side_cells();
        match self.config.hit_distribution() {
            HitDistribution::Uniform => (self.rng.integer(m - 1), self.rng.integer(m - 1)),
            HitDistribution::Circle => {
                let inside = self.rng.uniform() < 0.95;
                let (x, y) = loop {
                    let x = self.rng.uniform() * 2.0 - 1.0;
                    let y = self.rng.uniform() * 2.0 - 1.0;
                    let r2 = x * x + y * y;
                    if (inside && r2 <= 1.0) || (!inside && r2 >= 1.0) {
                        break (x, y);
                    }
                };
                (map_unit(x, m), map_unit(y, m))
            }
            HitDistribution::Gaussian => {
                let x = self.rng.gaussian(0.0, 1.0);
                let y = self.rng.gaussian(0.0, 1.0);
                if x.abs() < 3.0 && y.abs() < 3.0 {
                    (map_sigma(x, m), map_sigma(y, m))
                } else {
                    (self.rng.integer(m - 1), self.rng.integer(m - 1))
                }
            }
        }
    }

    /// Homogeneous Poisson process of thermal firings over the window.
    fn add_dark_counts(&mut self) {
        let signal_length = self.config.signal_length();
        let mean_wait = 1e9 / self.config.dcr();
        let m = self.config.n_side_cells();

        // Start the cursor well before the window so the first
        // inter-arrival gap is not biased toward zero.
        let mut last = -100.0;
        while last < signal_length {
            last += self.rng.exponential(mean_wait);
            if (0.0..signal_length).contains(&last) {
                let row = self.rng.integer(m - 1);
                let col = self.rng.integer(m - 1);
                self.hits
                    .push(Hit::new(last, 1.0, row, col, HitOrigin::DarkCount), -1);
                self.n_dcr += 1;
            }
        }
    }

    /// One photoelectron hit per queued photon that lands in the window
    /// and passes the PDE filter.
    fn add_photoelectrons(&mut self) {
        let n_photons = self.photon_times.len();
        let signal_length = self.config.signal_length();

        for i in 0..n_photons {
            let time = self.photon_times[i];
            if !(0.0..signal_length).contains(&time) {
                continue;
            }
            let detected = match self.config.pde_type() {
                PdeType::None => true,
                PdeType::Scalar => self.rng.uniform() < self.config.pde(),
                PdeType::Spectrum => {
                    let pde = self
                        .config
                        .pde_spectrum()
                        .expect("spectrum mode always carries a table after validation")
                        .at(self.photon_wavelengths[i]);
                    self.rng.uniform() < pde
                }
            };
            if detected {
                let (row, col) = self.hit_cell();
                self.hits.push(
                    Hit::new(time, 1.0, row, col, HitOrigin::Photoelectron),
                    -1,
                );
                self.n_pe += 1;
            }
        }
    }

    /// Cross-talk expansion pass.
    ///
    /// Walks the buffer by index and appends children as it goes, so a
    /// child reached by the advancing cursor seeds further cross-talk in
    /// the same pass. Each hit triggers a Poisson number of neighbours;
    /// children landing outside the grid are discarded.
    fn add_crosstalk(&mut self) {
        let xt = self.config.xt();
        let m = self.config.n_side_cells() as i64;

        let mut cursor = 0;
        while cursor < self.hits.len() {
            let parent = *self.hits.get(cursor);
            let children = self.rng.poisson(xt);
            for _ in 0..children {
                let (dr, dc) = loop {
                    let dr = self.rng.integer(2) as i64 - 1;
                    let dc = self.rng.integer(2) as i64 - 1;
                    if dr != 0 || dc != 0 {
                        break (dr, dc);
                    }
                };
                let row = parent.row as i64 + dr;
                let col = parent.col as i64 + dc;
                if (0..m).contains(&row) && (0..m).contains(&col) {
                    self.hits.push(
                        Hit::new(
                            parent.time,
                            1.0,
                            row as u32,
                            col as u32,
                            HitOrigin::OpticalCrosstalk,
                        ),
                        cursor as i32,
                    );
                    self.n_xt += 1;
                }
            }
            cursor += 1;
        }
    }

    /// Reconcile repeated firings of the same cell.
    ///
    /// Sorts the buffer by time, then walks each cell's firings in order:
    /// the first keeps amplitude 1, every later one recovers
    /// `1 - exp(-gap / tau_recovery)` of the full amplitude.
    fn resolve_recharge(&mut self) {
        self.hits.sort_by_time();
        let n_side = self.config.n_side_cells();
        let tau = self.config.cell_recovery();

        let mut last_fired: HashMap<u32, f64> = HashMap::new();
        for hit in self.hits.hits_mut() {
            match last_fired.entry(hit.row * n_side + hit.col) {
                Entry::Occupied(mut slot) => {
                    let gap = hit.time - *slot.get();
                    hit.amplitude = 1.0 - (-gap / tau).exp();
                    slot.insert(hit.time);
                }
                Entry::Vacant(slot) => {
                    slot.insert(hit.time);
                }
            }
        }
    }

    /// After-pulse expansion pass, same cursor-walk discipline as
    /// cross-talk. Delays are exponential with the fast or slow time
    /// constant; pulses past the window are dropped. The amplitude scales
    /// with the parent's and the partial recharge over the delay.
    fn add_afterpulses(&mut self) {
        let ap = self.config.ap();
        let tau_fast = self.config.tau_ap_fast();
        let tau_slow = self.config.tau_ap_slow();
        let slow_fraction = self.config.ap_slow_fraction();
        let signal_length = self.config.signal_length();
        let tau_recovery = self.config.cell_recovery();

        let mut cursor = 0;
        while cursor < self.hits.len() {
            let parent = *self.hits.get(cursor);
            let pulses = self.rng.poisson(ap);
            for _ in 0..pulses {
                let tau = if self.rng.uniform() < slow_fraction {
                    tau_slow
                } else {
                    tau_fast
                };
                let delay = self.rng.exponential(tau);
                if parent.time + delay < signal_length {
                    let amplitude = parent.amplitude * (1.0 - (-delay / tau_recovery).exp());
                    self.hits.push(
                        Hit::new(
                            parent.time + delay,
                            amplitude,
                            parent.row,
                            parent.col,
                            HitOrigin::AfterPulse,
                        ),
                        cursor as i32,
                    );
                    self.n_ap += 1;
                }
            }
            cursor += 1;
        }
    }

    /// Superpose one scaled template per hit onto a Gaussian noise
    /// baseline. This is the hot kernel of the whole event.
    fn render_signal(&mut self) {
        let n = self.config.n_signal_points();
        let sampling = self.config.sampling();
        let ccgv = self.config.ccgv();

        let mut samples = self.rng.gaussian_vec(0.0, self.config.snr(), n);

        for hit in self.hits.hits() {
            let start = (hit.time / sampling) as usize;
            if start >= n {
                continue;
            }
            let gain = hit.amplitude * self.rng.gaussian(1.0, ccgv);
            let span = n - start;
            Zip::from(samples.slice_mut(s![start..]))
                .and(self.template.slice(s![..span]))
                .for_each(|sample, &shape| *sample += gain * shape);
        }

        self.signal = AnalogSignal::new(samples, sampling);
    }
}

/// Map a coordinate in `[-1, 1]` to a cell index; the closed upper
/// boundary maps onto the last cell.
fn map_unit(x: f64, m: u32) -> u32 {
    (((x + 1.0) * m as f64 / 2.0) as u32).min(m - 1)
}

/// Map a coordinate in `(-3, 3)` sigmas to a cell index.
fn map_sigma(x: f64, m: u32) -> u32 {
    (((x + 3.0) * m as f64 / 6.0) as u32).min(m - 1)
}
