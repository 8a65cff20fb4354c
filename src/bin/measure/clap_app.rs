use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use lb_abc::observations::Observations;
use lb_abc::params::Parameters;
use lb_abc::simulator::{Birthrates, CommandSimulator, SimulatorKind};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use std::path::PathBuf;

use crate::MeasureOptions;

#[derive(Debug, Parser)]
#[command(name = "Measure")]
#[command(
    about = "Simulate growth for each observed dataset and project it into \
             the measurement space of the experiment"
)]
pub struct Cli {
    /// csv of observed cell counts, one row per timepoint per dataset
    #[arg(value_name = "OBSERVATIONS")]
    observations: PathBuf,
    /// toml parameter file
    #[arg(value_name = "PARAMS")]
    params: PathBuf,
    /// directory holding the simulator binaries
    #[arg(long, value_name = "DIR", default_value = "code/bin")]
    bin_dir: PathBuf,
    /// which simulator binary to drive
    #[arg(long, value_enum, default_value_t = SimulatorOptions::RarEngine)]
    simulator: SimulatorOptions,
    /// birth rate, spread evenly over the timeline when more than one
    #[arg(short, long, required = true, num_args = 1.., value_name = "RATE")]
    birthrates: Vec<f64>,
    /// death rate
    #[arg(short, long, default_value_t = 0., value_name = "RATE")]
    deathrate: f64,
    /// where to save the measurement-space trajectories
    #[arg(long, value_name = "FILE", default_value = "measured.csv")]
    output: PathBuf,
    /// seed for reproducibility
    #[arg(long, default_value_t = 26)]
    seed: u64,
    #[arg(short, long, action = ArgAction::Count, default_value_t = 0)]
    verbose: u8,
}

impl Cli {
    pub fn build() -> anyhow::Result<MeasureOptions> {
        let cli = Cli::parse();

        let observations = Observations::from_path(&cli.observations)?;
        // one seeded generator for the whole run: the derived parameters
        // consume their draws first, then the measurement pipeline
        let mut rng = Pcg64Mcg::seed_from_u64(cli.seed);
        let parameters =
            Parameters::load(&cli.params, Some(&observations), &mut rng)
                .with_context(|| {
                    format!("cannot load the parameters {:#?}", cli.params)
                })?;

        let birthrates = match cli.birthrates.as_slice() {
            [rate] => Birthrates::Constant(*rate),
            rates => Birthrates::Timeline(rates.to_vec()),
        };

        Ok(MeasureOptions {
            observations,
            parameters,
            simulator: CommandSimulator::new(cli.bin_dir),
            kind: cli.simulator.into(),
            birthrates,
            deathrate: cli.deathrate,
            output: cli.output,
            rng,
            verbosity: cli.verbose,
        })
    }
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum SimulatorOptions {
    RarEngine,
    Bernoulli,
}

impl From<SimulatorOptions> for SimulatorKind {
    fn from(simulator: SimulatorOptions) -> Self {
        match simulator {
            SimulatorOptions::RarEngine => SimulatorKind::RarEngine,
            SimulatorOptions::Bernoulli => SimulatorKind::Bernoulli,
        }
    }
}

impl std::fmt::Display for SimulatorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_possible_value()
            .expect("no values are skipped")
            .get_name()
            .fmt(f)
    }
}
