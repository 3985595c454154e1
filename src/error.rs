//! Error types for sensor configuration and event simulation.

use thiserror::Error;

/// Errors reported by configuration mutations and event setup.
///
/// Configuration errors surface synchronously from the mutating call;
/// running an event never fails for a physics-legal configuration.
#[derive(Debug, Error)]
pub enum SipmError {
    #[error("property `{name}` value {value} is out of range")]
    PropertyOutOfRange { name: &'static str, value: f64 },

    #[error("property `{name}` must be finite")]
    PropertyNotFinite { name: &'static str },

    #[error("unknown property `{0}`")]
    UnknownProperty(String),

    #[error("selector `{name}` has no variant numbered {value}")]
    UnknownSelectorValue { name: &'static str, value: f64 },

    #[error("wavelength and efficiency tables must have the same length")]
    SpectrumLengthMismatch,

    #[error("pde spectrum needs at least two points")]
    SpectrumTooShort,

    #[error("pde spectrum wavelengths must be strictly ascending")]
    SpectrumNotAscending,

    #[error("pde spectrum efficiencies must lie in [0, 1]")]
    SpectrumOutOfRange,

    #[error("spectrum pde selected but no spectrum table has been set")]
    SpectrumMissing,

    #[error("spectrum pde selected but photon wavelengths are missing")]
    MissingWavelengths,

    #[error("photon times and wavelengths must have the same length")]
    WavelengthCountMismatch,
}
