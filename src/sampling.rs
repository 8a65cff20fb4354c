//! Reconciliation between true population counts and diluted/sampled
//! experimental measurements.
//!
//! Forward means true to observed (sampling loss), backward means observed
//! to true (dilution correction). Each direction has its own estimation
//! mode: a deterministic maximum-likelihood point estimate, or an explicit
//! random variate reflecting the sampling noise.
use crate::error::{Error, Result};
use crate::observations::ObservationRecord;
use crate::poisson_draw;
use rand::Rng;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Estimation mode for one direction of the sampling correction.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum SamplingMode {
    /// Deterministic point-estimate correction (simple arithmetic).
    #[serde(rename = "MLE")]
    Mle,
    /// Stochastic correction drawing a Poisson variate per factor.
    #[serde(rename = "RV")]
    Rv,
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingMode::Mle => write!(f, "MLE"),
            SamplingMode::Rv => write!(f, "RV"),
        }
    }
}

impl FromStr for SamplingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MLE" => Ok(SamplingMode::Mle),
            "RV" => Ok(SamplingMode::Rv),
            unknown => Err(Error::Config(format!(
                "unsupported sampling mode `{}`, expected MLE or RV",
                unknown
            ))),
        }
    }
}

/// The forward and backward modes of one run, configured independently.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SamplingModes {
    pub forward: SamplingMode,
    pub backward: SamplingMode,
}

/// Sampling noise is modelled explicitly by default, dilution is always a
/// point estimate.
impl Default for SamplingModes {
    fn default() -> Self {
        SamplingModes {
            forward: SamplingMode::Rv,
            backward: SamplingMode::Mle,
        }
    }
}

pub fn samplings_dilutions(
    record: &ObservationRecord,
    observation: usize,
) -> (Vec<f64>, Vec<f64>) {
    //! The ordered sampling and dilution factors applied to one particular
    //! observation of a dataset.
    //!
    //! Scans the fields `sample1, sample2, ...` and `dilute1, dilute2, ...`
    //! independently, each scan stopping at the first missing integer
    //! suffix: numbering must be contiguous from 1, fields after a gap are
    //! never picked up.
    assert!(
        observation < record.len(),
        "observation {} out of range for a record with {} timepoints",
        observation,
        record.len()
    );
    let scan = |prefix: &str| {
        let mut factors = Vec::new();
        let mut suffix = 1usize;
        while let Some(series) = record.factor(&format!("{}{}", prefix, suffix))
        {
            factors.push(series[observation]);
            suffix += 1;
        }
        factors
    };
    (scan("sample"), scan("dilute"))
}

pub fn apply_sampling<R: Rng>(
    size: &[f64],
    samplings: &[f64],
    dilutions: &[f64],
    modes: SamplingModes,
    rng: &mut R,
) -> Result<Vec<f64>> {
    //! Apply the sampling corrections to simulated data to make it
    //! comparable to the observations: divide out each dilution factor
    //! (backward), then apply each sampling factor (forward), and round to
    //! the nearest integer once after all corrections.
    //!
    //! Backward only supports [`SamplingMode::Mle`]; forward multiplies
    //! deterministically under [`SamplingMode::Mle`] and draws
    //! `Poisson(size * factor)` under [`SamplingMode::Rv`].
    let mut series = size.to_vec();

    match modes.backward {
        SamplingMode::Mle => {
            for dilution in dilutions {
                for value in series.iter_mut() {
                    *value /= dilution;
                }
            }
        }
        unsupported => {
            return Err(Error::Config(format!(
                "unsupported backward sampling mode `{}`",
                unsupported
            )))
        }
    }

    match modes.forward {
        SamplingMode::Mle => {
            for sampling in samplings {
                for value in series.iter_mut() {
                    *value *= sampling;
                }
            }
        }
        SamplingMode::Rv => {
            for sampling in samplings {
                for value in series.iter_mut() {
                    *value = poisson_draw(*value * sampling, rng);
                }
            }
        }
    }

    for value in series.iter_mut() {
        *value = value.round();
    }
    Ok(series)
}
