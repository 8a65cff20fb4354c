//! Support code for the approximate Bayesian computation (ABC) inference of
//! birth/death growth-process parameters from observed cell-count time
//! series.
//!
//! There are three pieces glued together by this library:
//!
//! 1. drive the external stochastic simulator and parse its trajectory, see
//! [`simulator`]
//!
//! 2. convert simulated true population counts into the measurement space of
//! the experiment, applying process noise ([`noise`]) and the
//! sampling/dilution corrections ([`sampling`])
//!
//! 3. group the observed counts by dataset and resolve the data-dependent
//! simulation parameters, see [`observations`] and [`params`]
//!
//! The ABC engine itself is not part of this crate: it repeatedly selects
//! candidate rates, asks [`simulator::Simulate`] for a trajectory, projects
//! it into measurement space and compares against the observations.
//!
//! # Example
//! Reconcile an observed, diluted count with the measurement pipeline:
//! ```no_run
//! use lb_abc::observations::Observations;
//! use lb_abc::params::Parameters;
//! use lb_abc::sampling::{apply_sampling, samplings_dilutions};
//! use rand::SeedableRng;
//! use rand_pcg::Pcg64Mcg;
//! use std::path::Path;
//!
//! let mut rng = Pcg64Mcg::seed_from_u64(26);
//! let observations =
//!     Observations::from_path(Path::new("observed.csv")).unwrap();
//! let params = Parameters::load(
//!     Path::new("params.toml"),
//!     Some(&observations),
//!     &mut rng,
//! )
//! .unwrap();
//! for (id, record) in observations.iter() {
//!     let (samplings, dilutions) = samplings_dilutions(record, 0);
//!     let measured = apply_sampling(
//!         &[1000.],
//!         &samplings,
//!         &dilutions,
//!         params.modes,
//!         &mut rng,
//!     )
//!     .unwrap();
//!     println!("{}: {:?}", id, measured);
//! }
//! ```
pub mod error;
pub mod noise;
pub mod observations;
pub mod params;
pub mod sampling;
pub mod simulator;

#[doc(inline)]
pub use crate::error::Error;
#[doc(inline)]
pub use crate::observations::{DatasetId, ObservationRecord, Observations};
#[doc(inline)]
pub use crate::params::Parameters;
#[doc(inline)]
pub use crate::simulator::{Simulate, SimulationRequest, Trajectory};

use rand::RngCore;
use rand_distr::{Distribution, Poisson};

/// Number of individual cells present in the system.
pub type NbIndividuals = u64;

pub(crate) fn poisson_draw(mean: f64, rng: &mut dyn RngCore) -> f64 {
    //! Draw a Poisson variate with the given `mean`. A mean of zero (or
    //! below, which additive noise can produce) always draws zero.
    if mean > 0. {
        Poisson::new(mean)
            .expect("Poisson mean must be finite")
            .sample(&mut *rng)
    } else {
        0.
    }
}

#[macro_use]
extern crate derive_builder;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    #[test]
    fn poisson_draw_zero_mean_draws_zero() {
        let mut rng = Pcg64Mcg::seed_from_u64(26);
        assert_eq!(poisson_draw(0., &mut rng), 0.);
        assert_eq!(poisson_draw(-10., &mut rng), 0.);
    }

    #[test]
    fn poisson_draw_is_seedable() {
        let first = poisson_draw(100., &mut Pcg64Mcg::seed_from_u64(26));
        let second = poisson_draw(100., &mut Pcg64Mcg::seed_from_u64(26));
        assert_eq!(first, second);
    }

    #[quickcheck]
    fn poisson_draw_is_non_negative(mean: u32) -> bool {
        let mut rng = Pcg64Mcg::seed_from_u64(mean as u64);
        poisson_draw(mean as f64, &mut rng) >= 0.
    }
}
