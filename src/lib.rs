//! Monte Carlo simulation of silicon photomultiplier sensors.
//!
//! Given a list of incident photons, a [`Sensor`] produces the sampled
//! analog waveform a real SiPM would deliver, including the dominant
//! stochastic detector effects: photo-detection efficiency, dark counts,
//! optical cross-talk, after-pulsing, cell recharge and gain/electronic
//! noise. The [`BatchSimulator`] runs many independent events in parallel
//! across a pool of sensors and summarizes each rendered waveform over a
//! configurable gate window.
//!
//! ```
//! use sipm_sim::{Sensor, SensorConfig};
//!
//! let mut config = SensorConfig::default();
//! config.set_property("Dcr", 250e3)?;
//! let mut sensor = Sensor::with_seed(config, 42)?;
//!
//! sensor.add_photons(&[25.0, 25.5, 60.0]);
//! sensor.run_event()?;
//!
//! let waveform = sensor.signal();
//! println!("peak {:.2} pe", waveform.peak(0.0, 500.0, 0.5));
//! # Ok::<(), sipm_sim::SipmError>(())
//! ```

pub mod batch;
pub mod error;
pub mod hit;
pub mod models;
pub mod pde;
pub mod properties;
pub mod pulse;
pub mod rng;
pub mod sensor;
pub mod signal;

// Re-exports for easier access
pub use batch::{BatchSimulator, EventResult};
pub use error::SipmError;
pub use hit::{Hit, HitOrigin};
pub use pde::{PdeSpectrum, PdeType};
pub use properties::{HitDistribution, SensorConfig};
pub use rng::EventRng;
pub use sensor::{DebugInfo, Sensor};
pub use signal::AnalogSignal;
