use chrono::Utc;
use lb_abc::observations::Observations;
use lb_abc::params::Parameters;
use lb_abc::simulator::{Birthrates, CommandSimulator, SimulatorKind};
use rand_pcg::Pcg64Mcg;
use std::path::PathBuf;

use crate::clap_app::Cli;

/// Simulate growth for each observed dataset and project the trajectory
/// into measurement space.
mod app;
mod clap_app;

pub struct MeasureOptions {
    observations: Observations,
    parameters: Parameters,
    simulator: CommandSimulator,
    kind: SimulatorKind,
    birthrates: Birthrates,
    deathrate: f64,
    output: PathBuf,
    rng: Pcg64Mcg,
    verbosity: u8,
}

fn main() {
    match Cli::build() {
        Ok(options) => {
            println!("{} Starting the measurement pipeline", Utc::now());
            if let Err(err) = app::run(options) {
                eprintln!("{} Error: {:?}", Utc::now(), err);
                std::process::exit(1);
            }
            println!("{} End measuring", Utc::now());
        }
        Err(err) => {
            eprintln!("{} Error while building the cli: {:?}", Utc::now(), err);
            std::process::exit(1);
        }
    }
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;

    Cli::command().debug_assert()
}
