//! Random draws for event generation.
//!
//! Every sensor owns one [`EventRng`] and all stochastic decisions of an
//! event flow through it, so a sensor reseeded with the same value replays
//! an identical event. Streams are never shared between workers; the batch
//! driver derives one seed per event from its master seed.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{thread_rng, Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, Exp, Normal, Poisson};

/// Pseudo-random source with the distribution surface the event engine
/// consumes: uniform, Gaussian, exponential, Poisson and bounded-integer
/// draws.
#[derive(Debug, Clone)]
pub struct EventRng {
    rng: StdRng,
}

impl EventRng {
    /// Create a generator seeded from system entropy.
    pub fn from_entropy() -> Self {
        Self::seeded(thread_rng().next_u64())
    }

    /// Create a generator with a fixed seed for reproducible events.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Restart the stream from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Uniform draw in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Gaussian draw with the given mean and standard deviation.
    ///
    /// A standard deviation of zero returns the mean exactly.
    pub fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        let normal = Normal::new(mean, std_dev)
            .expect("Normal distribution parameters must be valid (std_dev >= 0)");
        normal.sample(&mut self.rng)
    }

    /// Vector of `n` independent Gaussian draws.
    pub fn gaussian_vec(&mut self, mean: f64, std_dev: f64, n: usize) -> Array1<f64> {
        let normal = Normal::new(mean, std_dev)
            .expect("Normal distribution parameters must be valid (std_dev >= 0)");
        Array1::from_shape_fn(n, |_| normal.sample(&mut self.rng))
    }

    /// Exponential draw with the given mean (not rate). `mean` must be
    /// strictly positive.
    pub fn exponential(&mut self, mean: f64) -> f64 {
        let exp = Exp::new(1.0 / mean)
            .expect("Exponential distribution parameters must be valid (mean > 0)");
        exp.sample(&mut self.rng)
    }

    /// Poisson draw with the given mean. A non-positive mean yields zero,
    /// matching the degenerate-pass policy of the event engine.
    pub fn poisson(&mut self, mean: f64) -> u32 {
        if mean <= 0.0 {
            return 0;
        }
        let poisson =
            Poisson::new(mean).expect("Poisson distribution parameters must be valid (mean > 0)");
        let draw: f64 = poisson.sample(&mut self.rng);
        draw as u32
    }

    /// Uniform integer draw in `[0, max]`, both bounds inclusive.
    pub fn integer(&mut self, max: u32) -> u32 {
        self.rng.gen_range(0..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = EventRng::seeded(42);
        let mut b = EventRng::seeded(42);
        for _ in 0..100 {
            assert_eq!(a.uniform(), b.uniform());
        }
    }

    #[test]
    fn test_reseed_restarts_stream() {
        let mut rng = EventRng::seeded(7);
        let first: Vec<f64> = (0..10).map(|_| rng.uniform()).collect();
        rng.reseed(7);
        let second: Vec<f64> = (0..10).map(|_| rng.uniform()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = EventRng::seeded(1);
        for _ in 0..10_000 {
            let u = rng.uniform();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn test_gaussian_zero_sigma_is_mean() {
        let mut rng = EventRng::seeded(3);
        for _ in 0..100 {
            assert_eq!(rng.gaussian(2.5, 0.0), 2.5);
        }
    }

    #[test]
    fn test_gaussian_vec_statistics() {
        let mut rng = EventRng::seeded(11);
        let draws = rng.gaussian_vec(5.0, 2.0, 100_000);
        assert_eq!(draws.len(), 100_000);
        let mean = draws.mean().unwrap();
        let std = draws.std(0.0);
        assert_relative_eq!(mean, 5.0, epsilon = 0.05);
        assert_relative_eq!(std, 2.0, epsilon = 0.05);
    }

    #[test]
    fn test_exponential_mean() {
        let mut rng = EventRng::seeded(13);
        let n = 100_000;
        let sum: f64 = (0..n).map(|_| rng.exponential(50.0)).sum();
        assert_relative_eq!(sum / n as f64, 50.0, epsilon = 1.0);
    }

    #[test]
    fn test_poisson_mean_and_degenerate() {
        let mut rng = EventRng::seeded(17);
        let n = 100_000;
        let sum: u64 = (0..n).map(|_| rng.poisson(0.3) as u64).sum();
        assert_relative_eq!(sum as f64 / n as f64, 0.3, epsilon = 0.02);
        assert_eq!(rng.poisson(0.0), 0);
        assert_eq!(rng.poisson(-1.0), 0);
    }

    #[test]
    fn test_integer_bounds_inclusive() {
        let mut rng = EventRng::seeded(19);
        let mut seen = [false; 3];
        for _ in 0..1000 {
            let v = rng.integer(2);
            assert!(v <= 2);
            seen[v as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
