//! Preset configurations for commercial SiPM devices.
//!
//! Parameters and spectral responses follow the manufacturer datasheets;
//! the PDE curves are coarse samplings that keep the tables small while
//! preserving the shape of the published response.

use once_cell::sync::Lazy;

use crate::pde::PdeSpectrum;
use crate::properties::SensorConfig;

/// Hamamatsu S13360-3050CS, a 3 mm device with 50 um cells.
pub static S13360_3050CS: Lazy<SensorConfig> = Lazy::new(|| {
    let mut config = SensorConfig::default();
    for (name, value) in [
        ("Size", 3.0),
        ("Pitch", 50.0),
        ("SamplingTime", 1.0),
        ("SignalLength", 500.0),
        ("RisingTime", 1.0),
        ("FallingTimeFast", 50.0),
        ("Dcr", 500e3),
        ("Xt", 0.03),
        ("Ap", 0.02),
        ("TauApFast", 15.0),
        ("TauApSlow", 85.0),
        ("ApSlowFraction", 0.8),
        ("CellRecovery", 55.0),
        ("Ccgv", 0.05),
        ("SnrDb", 30.0),
    ] {
        config
            .set_property(name, value)
            .expect("S13360-3050CS preset values must be legal");
    }

    let wavelengths = vec![
        280.0, 300.0, 320.0, 340.0, 360.0, 380.0, 400.0, 420.0, 440.0, 450.0, 460.0, 480.0,
        500.0, 550.0, 600.0, 650.0, 700.0, 750.0, 800.0, 850.0, 900.0,
    ];
    let efficiencies = vec![
        0.00, 0.06, 0.12, 0.20, 0.26, 0.32, 0.36, 0.39, 0.40, 0.40, 0.40, 0.39, 0.37, 0.31,
        0.25, 0.20, 0.15, 0.11, 0.07, 0.04, 0.02,
    ];
    let spectrum = PdeSpectrum::from_table(wavelengths, efficiencies)
        .expect("S13360-3050CS pde spectrum must be valid");
    config.set_pde_spectrum(spectrum);
    config
});

/// FBK NUV-HD style 1 mm device with 25 um cells, blue-peaked response.
pub static NUV_HD_1MM: Lazy<SensorConfig> = Lazy::new(|| {
    let mut config = SensorConfig::default();
    for (name, value) in [
        ("Size", 1.0),
        ("Pitch", 25.0),
        ("SamplingTime", 1.0),
        ("SignalLength", 500.0),
        ("RisingTime", 1.0),
        ("FallingTimeFast", 40.0),
        ("FallingTimeSlow", 120.0),
        ("SlowComponentFraction", 0.2),
        ("Dcr", 100e3),
        ("Xt", 0.05),
        ("Ap", 0.05),
        ("TauApFast", 10.0),
        ("TauApSlow", 80.0),
        ("ApSlowFraction", 0.7),
        ("CellRecovery", 35.0),
        ("Ccgv", 0.04),
        ("SnrDb", 32.0),
    ] {
        config
            .set_property(name, value)
            .expect("NUV-HD preset values must be legal");
    }

    let wavelengths = vec![
        250.0, 280.0, 300.0, 320.0, 350.0, 380.0, 400.0, 420.0, 440.0, 470.0, 500.0, 550.0,
        600.0, 650.0, 700.0, 800.0, 900.0,
    ];
    let efficiencies = vec![
        0.05, 0.15, 0.24, 0.33, 0.40, 0.43, 0.43, 0.42, 0.40, 0.36, 0.32, 0.25, 0.19, 0.14,
        0.10, 0.05, 0.02,
    ];
    let spectrum = PdeSpectrum::from_table(wavelengths, efficiencies)
        .expect("NUV-HD pde spectrum must be valid");
    config.set_pde_spectrum(spectrum);
    config
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pde::PdeType;

    #[test]
    fn test_presets_are_valid() {
        S13360_3050CS.validate().unwrap();
        NUV_HD_1MM.validate().unwrap();
    }

    #[test]
    fn test_s13360_geometry_and_response() {
        assert_eq!(S13360_3050CS.n_side_cells(), 60);
        assert_eq!(S13360_3050CS.n_cells(), 3600);
        assert_eq!(S13360_3050CS.pde_type(), PdeType::Spectrum);
        let spectrum = S13360_3050CS.pde_spectrum().unwrap();
        // Response peaks in the blue around 450 nm.
        assert!(spectrum.at(450.0) > spectrum.at(650.0));
        assert!(spectrum.at(450.0) >= 0.39);
    }

    #[test]
    fn test_nuv_hd_slow_component() {
        assert_eq!(NUV_HD_1MM.n_side_cells(), 40);
        assert!(NUV_HD_1MM.has_slow_component());
        let spectrum = NUV_HD_1MM.pde_spectrum().unwrap();
        assert!(spectrum.at(400.0) > spectrum.at(600.0));
    }
}
