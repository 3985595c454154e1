//! Sensor configuration for simulating SiPM characteristics.
//!
//! [`SensorConfig`] is the read/write parameter store consumed by the event
//! engine. Every mutation is validated when it happens, so a config that
//! reaches a sensor is always physics-legal and the per-event passes never
//! have to re-check it. Besides the typed accessors it exposes the
//! named-double [`SensorConfig::set_property`] surface used by scripting
//! front ends.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SipmError;
use crate::pde::{PdeSpectrum, PdeType};

/// Spatial distribution used to assign photoelectrons to cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitDistribution {
    /// Independent uniform draw per coordinate.
    Uniform,
    /// 95% of hits inside the inscribed unit circle, 5% outside.
    Circle,
    /// Central 3-sigma Gaussian spot with uniform fallback on the tails.
    Gaussian,
}

/// Configuration for a SiPM sensor.
///
/// Geometry is given as side length and cell pitch; the cell grid is the
/// derived `n_side_cells x n_side_cells` square. Time-like parameters are
/// in nanoseconds, the dark-count rate in hertz, probabilities and
/// fractions dimensionless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Sensor side length in millimeters.
    size_mm: f64,
    /// Cell pitch in micrometers.
    pitch_um: f64,
    /// Sampling period of the output waveform in nanoseconds.
    sampling_ns: f64,
    /// Signal window length in nanoseconds.
    signal_length_ns: f64,
    /// Pulse rising time constant in nanoseconds.
    rising_time_ns: f64,
    /// Fast falling time constant in nanoseconds.
    falling_time_fast_ns: f64,
    /// Slow falling time constant in nanoseconds.
    falling_time_slow_ns: f64,
    /// Weight of the slow falling component, zero disables it.
    slow_component_fraction: f64,
    /// Dark-count rate in hertz.
    dcr_hz: f64,
    /// Mean optical cross-talk events per firing cell.
    xt_probability: f64,
    /// Mean after-pulse events per firing cell.
    ap_probability: f64,
    /// Fast after-pulse delay time constant in nanoseconds.
    tau_ap_fast_ns: f64,
    /// Slow after-pulse delay time constant in nanoseconds.
    tau_ap_slow_ns: f64,
    /// Fraction of after-pulses following the slow time constant.
    ap_slow_fraction: f64,
    /// Cell recharge time constant in nanoseconds.
    cell_recovery_ns: f64,
    /// Cell-to-cell gain variation, relative RMS per firing.
    ccgv: f64,
    /// Electronic noise RMS in units of the single-photoelectron peak.
    snr: f64,
    /// How photo-detection efficiency is applied.
    pde_type: PdeType,
    /// Scalar detection probability, used in `PdeType::Scalar` mode.
    pde: f64,
    /// Tabulated spectrum, used in `PdeType::Spectrum` mode.
    pde_spectrum: Option<PdeSpectrum>,
    /// Spatial distribution of photoelectron hits.
    hit_distribution: HitDistribution,
}

impl Default for SensorConfig {
    /// A 1 mm sensor with 25 um cells and typical noise figures.
    fn default() -> Self {
        Self {
            size_mm: 1.0,
            pitch_um: 25.0,
            sampling_ns: 1.0,
            signal_length_ns: 500.0,
            rising_time_ns: 1.0,
            falling_time_fast_ns: 50.0,
            falling_time_slow_ns: 100.0,
            slow_component_fraction: 0.0,
            dcr_hz: 200e3,
            xt_probability: 0.05,
            ap_probability: 0.03,
            tau_ap_fast_ns: 10.0,
            tau_ap_slow_ns: 80.0,
            ap_slow_fraction: 0.8,
            cell_recovery_ns: 50.0,
            ccgv: 0.05,
            snr: 0.03,
            pde_type: PdeType::None,
            pde: 1.0,
            pde_spectrum: None,
            hit_distribution: HitDistribution::Uniform,
        }
    }
}

fn check_finite(name: &'static str, value: f64) -> Result<f64, SipmError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SipmError::PropertyNotFinite { name })
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<f64, SipmError> {
    if check_finite(name, value)? > 0.0 {
        Ok(value)
    } else {
        Err(SipmError::PropertyOutOfRange { name, value })
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<f64, SipmError> {
    if check_finite(name, value)? >= 0.0 {
        Ok(value)
    } else {
        Err(SipmError::PropertyOutOfRange { name, value })
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<f64, SipmError> {
    if (0.0..=1.0).contains(&check_finite(name, value)?) {
        Ok(value)
    } else {
        Err(SipmError::PropertyOutOfRange { name, value })
    }
}

impl SensorConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cells along one side of the grid.
    pub fn n_side_cells(&self) -> u32 {
        (1000.0 * self.size_mm / self.pitch_um) as u32
    }

    /// Total number of cells.
    pub fn n_cells(&self) -> u32 {
        self.n_side_cells() * self.n_side_cells()
    }

    /// Sampling period in nanoseconds.
    pub fn sampling(&self) -> f64 {
        self.sampling_ns
    }

    /// Signal window length in nanoseconds.
    pub fn signal_length(&self) -> f64 {
        self.signal_length_ns
    }

    /// Number of samples in the output waveform.
    pub fn n_signal_points(&self) -> usize {
        (self.signal_length_ns / self.sampling_ns) as usize
    }

    /// Pulse rising time constant in nanoseconds.
    pub fn rising_time(&self) -> f64 {
        self.rising_time_ns
    }

    /// Fast falling time constant in nanoseconds.
    pub fn falling_time_fast(&self) -> f64 {
        self.falling_time_fast_ns
    }

    /// Slow falling time constant in nanoseconds.
    pub fn falling_time_slow(&self) -> f64 {
        self.falling_time_slow_ns
    }

    /// Weight of the slow falling component.
    pub fn slow_component_fraction(&self) -> f64 {
        self.slow_component_fraction
    }

    /// True when the pulse shape carries a slow component.
    pub fn has_slow_component(&self) -> bool {
        self.slow_component_fraction > 0.0
    }

    /// Dark-count rate in hertz.
    pub fn dcr(&self) -> f64 {
        self.dcr_hz
    }

    /// True when dark counts are generated.
    pub fn has_dcr(&self) -> bool {
        self.dcr_hz > 0.0
    }

    /// Mean optical cross-talk events per firing cell.
    pub fn xt(&self) -> f64 {
        self.xt_probability
    }

    /// True when optical cross-talk is generated.
    pub fn has_xt(&self) -> bool {
        self.xt_probability > 0.0
    }

    /// Mean after-pulse events per firing cell.
    pub fn ap(&self) -> f64 {
        self.ap_probability
    }

    /// True when after-pulses are generated.
    pub fn has_ap(&self) -> bool {
        self.ap_probability > 0.0
    }

    /// Fast after-pulse delay time constant in nanoseconds.
    pub fn tau_ap_fast(&self) -> f64 {
        self.tau_ap_fast_ns
    }

    /// Slow after-pulse delay time constant in nanoseconds.
    pub fn tau_ap_slow(&self) -> f64 {
        self.tau_ap_slow_ns
    }

    /// Fraction of after-pulses following the slow time constant.
    pub fn ap_slow_fraction(&self) -> f64 {
        self.ap_slow_fraction
    }

    /// Cell recharge time constant in nanoseconds.
    pub fn cell_recovery(&self) -> f64 {
        self.cell_recovery_ns
    }

    /// Cell-to-cell gain variation, relative RMS per firing.
    pub fn ccgv(&self) -> f64 {
        self.ccgv
    }

    /// Electronic noise RMS in units of the single-photoelectron peak.
    pub fn snr(&self) -> f64 {
        self.snr
    }

    /// Photo-detection efficiency mode.
    pub fn pde_type(&self) -> PdeType {
        self.pde_type
    }

    /// Scalar detection probability.
    pub fn pde(&self) -> f64 {
        self.pde
    }

    /// Tabulated detection-probability spectrum, if one has been set.
    pub fn pde_spectrum(&self) -> Option<&PdeSpectrum> {
        self.pde_spectrum.as_ref()
    }

    /// Spatial distribution of photoelectron hits.
    pub fn hit_distribution(&self) -> HitDistribution {
        self.hit_distribution
    }

    /// Select the spatial distribution of photoelectron hits.
    pub fn set_hit_distribution(&mut self, distribution: HitDistribution) {
        self.hit_distribution = distribution;
    }

    /// Select the photo-detection efficiency mode.
    ///
    /// # Errors
    ///
    /// Selecting [`PdeType::Spectrum`] before a spectrum table has been
    /// supplied is rejected.
    pub fn set_pde_type(&mut self, pde_type: PdeType) -> Result<(), SipmError> {
        if pde_type == PdeType::Spectrum && self.pde_spectrum.is_none() {
            return Err(SipmError::SpectrumMissing);
        }
        self.pde_type = pde_type;
        Ok(())
    }

    /// Install a detection-probability spectrum and switch to
    /// [`PdeType::Spectrum`] mode.
    pub fn set_pde_spectrum(&mut self, spectrum: PdeSpectrum) {
        self.pde_spectrum = Some(spectrum);
        self.pde_type = PdeType::Spectrum;
    }

    /// Set a parameter from its name.
    ///
    /// Double-valued keys: `Size`, `Pitch`, `SamplingTime`, `SignalLength`,
    /// `RisingTime`, `FallingTimeFast`, `FallingTimeSlow`,
    /// `SlowComponentFraction`, `Dcr`, `Xt`, `Ap`, `TauApFast`, `TauApSlow`,
    /// `ApSlowFraction`, `CellRecovery`, `Ccgv`, `Snr`, `SnrDb`, `Pde`.
    /// `Pde` stores the scalar probability and switches to scalar mode;
    /// `SnrDb` converts decibels to the linear noise RMS.
    ///
    /// Selector keys take the variant index: `HitDistribution`
    /// (0 = Uniform, 1 = Circle, 2 = Gaussian) and `PdeType`
    /// (0 = None, 1 = Scalar, 2 = Spectrum).
    ///
    /// # Errors
    ///
    /// Rejects unknown keys, non-finite values, values outside the legal
    /// range of the key, and geometry that would leave the sensor without
    /// at least one cell and one waveform sample.
    pub fn set_property(&mut self, name: &str, value: f64) -> Result<(), SipmError> {
        match name {
            "Size" => {
                check_positive("Size", value)?;
                self.check_grid(value, self.pitch_um, "Size")?;
                self.size_mm = value;
            }
            "Pitch" => {
                check_positive("Pitch", value)?;
                self.check_grid(self.size_mm, value, "Pitch")?;
                self.pitch_um = value;
            }
            "SamplingTime" => {
                check_positive("SamplingTime", value)?;
                self.check_window(value, self.signal_length_ns, "SamplingTime")?;
                self.sampling_ns = value;
            }
            "SignalLength" => {
                check_positive("SignalLength", value)?;
                self.check_window(self.sampling_ns, value, "SignalLength")?;
                self.signal_length_ns = value;
            }
            "RisingTime" => self.rising_time_ns = check_positive("RisingTime", value)?,
            "FallingTimeFast" => {
                self.falling_time_fast_ns = check_positive("FallingTimeFast", value)?
            }
            "FallingTimeSlow" => {
                self.falling_time_slow_ns = check_positive("FallingTimeSlow", value)?
            }
            "SlowComponentFraction" => {
                self.slow_component_fraction = check_fraction("SlowComponentFraction", value)?
            }
            "Dcr" => self.dcr_hz = check_non_negative("Dcr", value)?,
            "Xt" => self.xt_probability = check_non_negative("Xt", value)?,
            "Ap" => self.ap_probability = check_non_negative("Ap", value)?,
            "TauApFast" => self.tau_ap_fast_ns = check_positive("TauApFast", value)?,
            "TauApSlow" => self.tau_ap_slow_ns = check_positive("TauApSlow", value)?,
            "ApSlowFraction" => {
                self.ap_slow_fraction = check_fraction("ApSlowFraction", value)?
            }
            "CellRecovery" => self.cell_recovery_ns = check_positive("CellRecovery", value)?,
            "Ccgv" => self.ccgv = check_fraction("Ccgv", value)?,
            "Snr" => self.snr = check_non_negative("Snr", value)?,
            "SnrDb" => {
                check_finite("SnrDb", value)?;
                self.snr = 10f64.powf(-value / 20.0);
            }
            "Pde" => {
                self.pde = check_fraction("Pde", value)?;
                self.pde_type = PdeType::Scalar;
            }
            "HitDistribution" => {
                self.hit_distribution = match value as i64 {
                    0 => HitDistribution::Uniform,
                    1 => HitDistribution::Circle,
                    2 => HitDistribution::Gaussian,
                    _ => {
                        return Err(SipmError::UnknownSelectorValue {
                            name: "HitDistribution",
                            value,
                        })
                    }
                };
            }
            "PdeType" => {
                let pde_type = match value as i64 {
                    0 => PdeType::None,
                    1 => PdeType::Scalar,
                    2 => PdeType::Spectrum,
                    _ => {
                        return Err(SipmError::UnknownSelectorValue {
                            name: "PdeType",
                            value,
                        })
                    }
                };
                self.set_pde_type(pde_type)?;
            }
            _ => return Err(SipmError::UnknownProperty(name.to_string())),
        }
        Ok(())
    }

    /// Check the whole configuration, used when a config arrives through a
    /// path that bypasses the validating setters (deserialization).
    pub fn validate(&self) -> Result<(), SipmError> {
        check_positive("Size", self.size_mm)?;
        check_positive("Pitch", self.pitch_um)?;
        self.check_grid(self.size_mm, self.pitch_um, "Pitch")?;
        check_positive("SamplingTime", self.sampling_ns)?;
        check_positive("SignalLength", self.signal_length_ns)?;
        self.check_window(self.sampling_ns, self.signal_length_ns, "SignalLength")?;
        check_positive("RisingTime", self.rising_time_ns)?;
        check_positive("FallingTimeFast", self.falling_time_fast_ns)?;
        check_positive("FallingTimeSlow", self.falling_time_slow_ns)?;
        check_fraction("SlowComponentFraction", self.slow_component_fraction)?;
        check_non_negative("Dcr", self.dcr_hz)?;
        check_non_negative("Xt", self.xt_probability)?;
        check_non_negative("Ap", self.ap_probability)?;
        check_positive("TauApFast", self.tau_ap_fast_ns)?;
        check_positive("TauApSlow", self.tau_ap_slow_ns)?;
        check_fraction("ApSlowFraction", self.ap_slow_fraction)?;
        check_positive("CellRecovery", self.cell_recovery_ns)?;
        check_fraction("Ccgv", self.ccgv)?;
        check_non_negative("Snr", self.snr)?;
        check_fraction("Pde", self.pde)?;
        if self.pde_type == PdeType::Spectrum && self.pde_spectrum.is_none() {
            return Err(SipmError::SpectrumMissing);
        }
        Ok(())
    }

    fn check_grid(&self, size_mm: f64, pitch_um: f64, name: &'static str) -> Result<(), SipmError> {
        if (1000.0 * size_mm / pitch_um) as u32 >= 1 {
            Ok(())
        } else {
            Err(SipmError::PropertyOutOfRange {
                name,
                value: if name == "Size" { size_mm } else { pitch_um },
            })
        }
    }

    fn check_window(
        &self,
        sampling_ns: f64,
        signal_length_ns: f64,
        name: &'static str,
    ) -> Result<(), SipmError> {
        if (signal_length_ns / sampling_ns) as usize >= 1 {
            Ok(())
        } else {
            Err(SipmError::PropertyOutOfRange {
                name,
                value: if name == "SamplingTime" {
                    sampling_ns
                } else {
                    signal_length_ns
                },
            })
        }
    }
}

impl fmt::Display for SensorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SiPM sensor configuration")?;
        writeln!(f, "  Size:            {:>10.3} mm", self.size_mm)?;
        writeln!(f, "  Pitch:           {:>10.3} um", self.pitch_um)?;
        writeln!(f, "  Cells:           {:>10}", self.n_cells())?;
        writeln!(f, "  SamplingTime:    {:>10.3} ns", self.sampling_ns)?;
        writeln!(f, "  SignalLength:    {:>10.3} ns", self.signal_length_ns)?;
        writeln!(f, "  RisingTime:      {:>10.3} ns", self.rising_time_ns)?;
        writeln!(f, "  FallingTimeFast: {:>10.3} ns", self.falling_time_fast_ns)?;
        if self.has_slow_component() {
            writeln!(f, "  FallingTimeSlow: {:>10.3} ns", self.falling_time_slow_ns)?;
            writeln!(f, "  SlowFraction:    {:>10.3}", self.slow_component_fraction)?;
        }
        writeln!(f, "  Dcr:             {:>10.3e} Hz", self.dcr_hz)?;
        writeln!(f, "  Xt:              {:>10.3}", self.xt_probability)?;
        writeln!(f, "  Ap:              {:>10.3}", self.ap_probability)?;
        writeln!(f, "  CellRecovery:    {:>10.3} ns", self.cell_recovery_ns)?;
        writeln!(f, "  Ccgv:            {:>10.3}", self.ccgv)?;
        writeln!(f, "  Snr:             {:>10.3}", self.snr)?;
        writeln!(f, "  PdeType:         {:>10}", match self.pde_type {
            PdeType::None => "None",
            PdeType::Scalar => "Scalar",
            PdeType::Spectrum => "Spectrum",
        })?;
        write!(f, "  HitDistribution: {:>10}", match self.hit_distribution {
            HitDistribution::Uniform => "Uniform",
            HitDistribution::Circle => "Circle",
            HitDistribution::Gaussian => "Gaussian",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pde::PdeSpectrum;

    #[test]
    fn test_default_is_valid() {
        let config = SensorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.n_side_cells(), 40);
        assert_eq!(config.n_cells(), 1600);
        assert_eq!(config.n_signal_points(), 500);
    }

    #[test]
    fn test_grid_derived_from_size_and_pitch() {
        let mut config = SensorConfig::default();
        config.set_property("Size", 3.0).unwrap();
        config.set_property("Pitch", 50.0).unwrap();
        assert_eq!(config.n_side_cells(), 60);
    }

    #[test]
    fn test_rejects_illegal_values() {
        let mut config = SensorConfig::default();
        assert!(matches!(
            config.set_property("Dcr", -1.0),
            Err(SipmError::PropertyOutOfRange { .. })
        ));
        assert!(matches!(
            config.set_property("SamplingTime", 0.0),
            Err(SipmError::PropertyOutOfRange { .. })
        ));
        assert!(matches!(
            config.set_property("Xt", f64::NAN),
            Err(SipmError::PropertyNotFinite { .. })
        ));
        assert!(matches!(
            config.set_property("Ccgv", 1.5),
            Err(SipmError::PropertyOutOfRange { .. })
        ));
        assert!(matches!(
            config.set_property("Voltage", 30.0),
            Err(SipmError::UnknownProperty(_))
        ));
        // A failed mutation leaves the config untouched.
        config.validate().unwrap();
        assert_eq!(config.dcr(), 200e3);
    }

    #[test]
    fn test_rejects_empty_grid_and_window() {
        let mut config = SensorConfig::default();
        // Pitch larger than the sensor side leaves zero cells.
        assert!(config.set_property("Pitch", 2000.0).is_err());
        // Window shorter than one sample.
        assert!(config.set_property("SignalLength", 0.5).is_err());
    }

    #[test]
    fn test_snr_db_conversion() {
        let mut config = SensorConfig::default();
        config.set_property("SnrDb", 30.0).unwrap();
        assert!((config.snr() - 10f64.powf(-1.5)).abs() < 1e-12);
    }

    #[test]
    fn test_pde_key_switches_to_scalar() {
        let mut config = SensorConfig::default();
        assert_eq!(config.pde_type(), PdeType::None);
        config.set_property("Pde", 0.35).unwrap();
        assert_eq!(config.pde_type(), PdeType::Scalar);
        assert_eq!(config.pde(), 0.35);
    }

    #[test]
    fn test_spectrum_mode_requires_table() {
        let mut config = SensorConfig::default();
        assert!(matches!(
            config.set_pde_type(PdeType::Spectrum),
            Err(SipmError::SpectrumMissing)
        ));
        assert!(config.set_property("PdeType", 2.0).is_err());

        let spectrum =
            PdeSpectrum::from_table(vec![300.0, 500.0, 900.0], vec![0.1, 0.4, 0.05]).unwrap();
        config.set_pde_spectrum(spectrum);
        assert_eq!(config.pde_type(), PdeType::Spectrum);
        // Toggling away and back is now allowed.
        config.set_pde_type(PdeType::None).unwrap();
        config.set_pde_type(PdeType::Spectrum).unwrap();
    }

    #[test]
    fn test_selector_keys() {
        let mut config = SensorConfig::default();
        config.set_property("HitDistribution", 1.0).unwrap();
        assert_eq!(config.hit_distribution(), HitDistribution::Circle);
        assert!(matches!(
            config.set_property("HitDistribution", 5.0),
            Err(SipmError::UnknownSelectorValue { .. })
        ));
    }

    #[test]
    fn test_display_lists_parameters() {
        let config = SensorConfig::default();
        let text = config.to_string();
        assert!(text.contains("Dcr"));
        assert!(text.contains("HitDistribution"));
        assert!(text.contains("1600"));
    }
}
