use anyhow::Context;
use chrono::Utc;
use lb_abc::noise::apply_noise;
use lb_abc::sampling::{apply_sampling, samplings_dilutions};
use lb_abc::simulator::{Simulate, SimulationRequestBuilder};
use lb_abc::NbIndividuals;
use serde::Serialize;

use crate::MeasureOptions;

/// One row of the measurement-space output table.
#[derive(Debug, Serialize)]
struct MeasuredPoint {
    dataset: String,
    time: f64,
    size: NbIndividuals,
    rate: f64,
    measured: f64,
}

pub fn run(mut options: MeasureOptions) -> anyhow::Result<()> {
    //! Simulate each observed dataset once with its resolved starting
    //! population and end time, push the trajectory through the noise chain
    //! and the sampling/dilution corrections of its first observation, and
    //! append everything to one csv.
    let mut wtr = csv::Writer::from_path(&options.output).with_context(
        || format!("cannot create the output {:#?}", options.output),
    )?;

    for id in options.observations.sorted_ids() {
        let record = options
            .observations
            .get(id)
            .expect("sorted_ids only yields present ids");
        let request = SimulationRequestBuilder::default()
            .starting_population(options.parameters.starting_population(id)?)
            .end_time(options.parameters.end_time(id)?)
            .birthrates(options.birthrates.clone())
            .deathrate(options.deathrate)
            .death_interaction(options.parameters.deathrate_interaction)
            .simulator(options.kind)
            .verbosity(options.verbosity)
            .build()?;
        let trajectory = options
            .simulator
            .simulate(&request)
            .with_context(|| format!("cannot simulate dataset {}", id))?;

        let noised = apply_noise(
            &trajectory.size_as_f64(),
            &options.parameters.filters,
            &mut options.rng,
        );
        let (samplings, dilutions) = samplings_dilutions(record, 0);
        let measured = apply_sampling(
            &noised,
            &samplings,
            &dilutions,
            options.parameters.modes,
            &mut options.rng,
        )?;

        for (idx, measured) in measured.iter().enumerate() {
            wtr.serialize(MeasuredPoint {
                dataset: id.to_string(),
                time: trajectory.time[idx],
                size: trajectory.size[idx],
                rate: trajectory.rate[idx],
                measured: *measured,
            })?;
        }
        wtr.flush()?;
        if options.verbosity > 0 {
            println!(
                "{} Measured dataset {} over {} timepoints",
                Utc::now(),
                id,
                trajectory.len()
            );
        }
    }
    Ok(())
}
