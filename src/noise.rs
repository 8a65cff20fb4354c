//! An ordered chain of configurable noise transformations applied to a
//! simulated count trajectory, modelling generic process noise on top of the
//! measurement corrections of [`crate::sampling`].
//!
//! Filters compose left to right over the same series and intermediate
//! values stay continuous: only the final observable is a count, so the
//! result is rounded once, after the full chain.
use crate::error::{Error, Result};
use crate::poisson_draw;
use enum_dispatch::enum_dispatch;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

/// One step of the noise chain transforming the full series in place.
#[enum_dispatch]
pub trait Perturb {
    fn perturb(&self, series: &mut Vec<f64>, rng: &mut dyn RngCore);
}

/// The noise filter vocabulary. Deserialized from configuration entries of
/// the form `{ name = "poisson", sample = 0.1 }`: an unknown `name` fails at
/// parse time instead of silently passing through.
#[enum_dispatch(Perturb)]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum NoiseFilter {
    /// Does nothing.
    Copy(CopyFilter),
    /// Simulates perfect sampling.
    Perfect(PerfectFilter),
    /// Simulates random sampling (in any number of steps).
    Poisson(PoissonFilter),
    /// Gaussian noise with constant coefficient of variation.
    GaussMultiplicative(GaussMultiplicative),
    /// Gaussian noise with constant standard deviation.
    GaussAdditive(GaussAdditive),
}

impl NoiseFilter {
    pub fn validate(&self) -> Result<()> {
        //! Reject filter parameters the random draws cannot work with.
        let negative = |name: &str, value: f64| {
            Err(Error::Config(format!(
                "noise filter `{}` cannot be negative, found {}",
                name, value
            )))
        };
        match self {
            NoiseFilter::Perfect(filter) if filter.sample < 0. => {
                negative("perfect.sample", filter.sample)
            }
            NoiseFilter::Poisson(filter) if filter.sample < 0. => {
                negative("poisson.sample", filter.sample)
            }
            NoiseFilter::GaussMultiplicative(filter) if filter.sigma < 0. => {
                negative("gauss-multiplicative.sigma", filter.sigma)
            }
            NoiseFilter::GaussAdditive(filter) if filter.sigma < 0. => {
                negative("gauss-additive.sigma", filter.sigma)
            }
            _ => Ok(()),
        }
    }
}

/// No-op passthrough.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CopyFilter {}

impl Perturb for CopyFilter {
    fn perturb(&self, _series: &mut Vec<f64>, _rng: &mut dyn RngCore) {}
}

/// Element-wise multiplication by a noiseless sample factor.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PerfectFilter {
    pub sample: f64,
}

impl Perturb for PerfectFilter {
    fn perturb(&self, series: &mut Vec<f64>, _rng: &mut dyn RngCore) {
        for value in series.iter_mut() {
            *value *= self.sample;
        }
    }
}

/// Replace each element by a Poisson variate whose mean is the element
/// scaled by the sample factor. Stochastic, not idempotent.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PoissonFilter {
    pub sample: f64,
}

impl Perturb for PoissonFilter {
    fn perturb(&self, series: &mut Vec<f64>, rng: &mut dyn RngCore) {
        for value in series.iter_mut() {
            *value = poisson_draw(*value * self.sample, rng);
        }
    }
}

/// Multiply each element by an independent Gaussian draw.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GaussMultiplicative {
    pub mean: f64,
    pub sigma: f64,
}

impl Perturb for GaussMultiplicative {
    fn perturb(&self, series: &mut Vec<f64>, rng: &mut dyn RngCore) {
        let gauss = Normal::new(self.mean, self.sigma)
            .expect("sigma must be finite and non-negative");
        for value in series.iter_mut() {
            *value *= gauss.sample(&mut *rng);
        }
    }
}

/// Add an independent Gaussian draw to each element.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GaussAdditive {
    pub mean: f64,
    pub sigma: f64,
}

impl Perturb for GaussAdditive {
    fn perturb(&self, series: &mut Vec<f64>, rng: &mut dyn RngCore) {
        let gauss = Normal::new(self.mean, self.sigma)
            .expect("sigma must be finite and non-negative");
        for value in series.iter_mut() {
            *value += gauss.sample(&mut *rng);
        }
    }
}

pub fn apply_noise<R: Rng>(
    size: &[f64],
    filters: &[NoiseFilter],
    rng: &mut R,
) -> Vec<f64> {
    //! Apply the list of noise `filters` in order, then round to the nearest
    //! integer once.
    let mut series = size.to_vec();
    for filter in filters {
        filter.perturb(&mut series, rng);
    }
    for value in series.iter_mut() {
        *value = value.round();
    }
    series
}
