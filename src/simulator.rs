//! Drive the external stochastic simulator of the growth process.
//!
//! The simulator is a command-line executable consumed as a black box: it
//! takes the growth parameters as flags, simulates one realization of the
//! birth/death process (next-reaction method) and prints a tab-separated
//! table with columns `time`, `size` and `rate` on stdout.
//!
//! The boundary is typed on both sides: a validated [`SimulationRequest`]
//! goes in, a parsed [`Trajectory`] comes out. The process-spawning
//! mechanics live behind the [`Simulate`] trait so the reconciliation and
//! noise layers can be tested against a fake simulator.
use crate::error::{Error, Result};
use crate::NbIndividuals;
use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

/// Which external simulator binary to drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulatorKind {
    /// The next-reaction-method engine.
    RarEngine,
    /// The discrete-generation engine. Unlike the others it handles negative
    /// birthrates without issues.
    Bernoulli,
}

impl SimulatorKind {
    pub fn binary_name(self) -> &'static str {
        match self {
            SimulatorKind::RarEngine => "rar-engine",
            SimulatorKind::Bernoulli => "bernoulli",
        }
    }

    /// Callers must know which simulator they target: only the `bernoulli`
    /// variant accepts birthrates below zero.
    pub fn tolerates_negative_birthrates(self) -> bool {
        matches!(self, SimulatorKind::Bernoulli)
    }
}

impl fmt::Display for SimulatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary_name())
    }
}

/// Birthrate over the simulated timeline: either constant, or a sequence
/// that the simulator spreads evenly over the timeline and interpolates
/// between points.
#[derive(Clone, Debug, PartialEq)]
pub enum Birthrates {
    Constant(f64),
    Timeline(Vec<f64>),
}

impl Birthrates {
    pub fn any_negative(&self) -> bool {
        match self {
            Birthrates::Constant(rate) => *rate < 0.,
            Birthrates::Timeline(rates) => rates.iter().any(|rate| *rate < 0.),
        }
    }
}

impl From<f64> for Birthrates {
    fn from(rate: f64) -> Self {
        Birthrates::Constant(rate)
    }
}

impl From<Vec<f64>> for Birthrates {
    fn from(rates: Vec<f64>) -> Self {
        Birthrates::Timeline(rates)
    }
}

/// Serialize into the literal format the simulators parse from the `-b`
/// flag: a bare number, or a bracketed list for a timeline.
impl fmt::Display for Birthrates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Birthrates::Constant(rate) => write!(f, "{}", rate),
            Birthrates::Timeline(rates) => {
                write!(f, "[")?;
                let mut rates = rates.iter();
                if let Some(rate) = rates.next() {
                    write!(f, "{}", rate)?;
                }
                for rate in rates {
                    write!(f, ", {}", rate)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// One validated invocation of the external simulator.
///
/// Build it through [`SimulationRequestBuilder`]; construction fails with
/// [`Error::Validation`] when a precondition on the growth parameters is
/// violated, so an invalid request never reaches the external process.
#[derive(Builder, Clone, Debug, PartialEq)]
#[builder(build_fn(validate = "Self::validate", error = "crate::error::Error"))]
pub struct SimulationRequest {
    /// Number of cells at the start of the simulation, must be positive.
    pub starting_population: NbIndividuals,
    /// When to end the simulation (time starts at 0), so simulation length.
    pub end_time: f64,
    /// Birth rate, constant or spread over the timeline with interpolation.
    #[builder(setter(into))]
    pub birthrates: Birthrates,
    pub deathrate: f64,
    /// Interaction reduction of the birth rate: part of the quadratic term of
    /// the logistic equation applied to reducing the birth rate first.
    /// Overflow goes to increasing the death rate.
    #[builder(default)]
    pub birth_interaction: f64,
    /// Complementary part of the quadratic term that just works by
    /// increasing the death rate.
    #[builder(default)]
    pub death_interaction: f64,
    pub simulator: SimulatorKind,
    #[builder(default)]
    pub verbosity: u8,
}

impl SimulationRequestBuilder {
    fn validate(&self) -> Result<()> {
        if let Some(population) = self.starting_population {
            if population == 0 {
                return Err(Error::Validation(
                    "starting_population must be positive".to_string(),
                ));
            }
        }
        if let Some(end_time) = self.end_time {
            if !(end_time >= 0.) {
                return Err(Error::Validation(format!(
                    "end_time cannot be negative, found {}",
                    end_time
                )));
            }
        }
        if let (Some(birthrates), Some(simulator)) =
            (&self.birthrates, self.simulator)
        {
            if !simulator.tolerates_negative_birthrates()
                && birthrates.any_negative()
            {
                return Err(Error::Validation(format!(
                    "negative birthrate found but simulator `{}` requires \
                     non-negative birthrates",
                    simulator
                )));
            }
        }
        for (value, name) in [
            (self.deathrate, "deathrate"),
            (self.birth_interaction, "birth_interaction"),
            (self.death_interaction, "death_interaction"),
        ] {
            if let Some(value) = value {
                if !(value >= 0.) {
                    return Err(Error::Validation(format!(
                        "{} cannot be negative, found {}",
                        name, value
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A simulated timeline of the growth process: three aligned series, one
/// entry per simulated datapoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trajectory {
    /// Time point for this datapoint.
    pub time: Vec<f64>,
    /// Population size at that timepoint.
    pub size: Vec<NbIndividuals>,
    /// Growth rate at that timepoint (nice for visualizing interpolation).
    pub rate: Vec<f64>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// The population sizes as continuous estimates, ready for the noise and
    /// sampling chains.
    pub fn size_as_f64(&self) -> Vec<f64> {
        self.size.iter().map(|&size| size as f64).collect()
    }
}

/// The seam between the measurement pipeline and the external simulator.
/// Tests inject a fake implementation to exercise the pipeline without
/// spawning processes.
pub trait Simulate {
    /// Produce one trajectory of the growth process for a validated request.
    /// Blocks until the simulation ends.
    fn simulate(&self, request: &SimulationRequest) -> Result<Trajectory>;
}

/// Runs a simulator binary from `bin_dir` as a child process and scrapes its
/// stdout. Invocation is synchronous and no timeout is imposed: callers that
/// need one must wrap it themselves.
#[derive(Clone, Debug)]
pub struct CommandSimulator {
    bin_dir: PathBuf,
}

impl CommandSimulator {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        CommandSimulator { bin_dir: bin_dir.into() }
    }
}

impl Simulate for CommandSimulator {
    fn simulate(&self, request: &SimulationRequest) -> Result<Trajectory> {
        let binary = self.bin_dir.join(request.simulator.binary_name());
        let mut command = Command::new(&binary);
        command
            .arg("-n")
            .arg(request.starting_population.to_string())
            .arg("-t")
            .arg(request.end_time.to_string())
            .arg("-b")
            .arg(request.birthrates.to_string())
            .arg("-d")
            .arg(request.deathrate.to_string())
            .arg("-p")
            .arg(request.birth_interaction.to_string())
            .arg("-q")
            .arg(request.death_interaction.to_string());
        if request.verbosity > 0 {
            println!("{} {:?}", Utc::now(), command);
        }

        let output = command.output().map_err(|err| Error::SimulatorOutput {
            reason: format!("cannot run {:#?}: {}", binary, err),
            output: String::new(),
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            // a parseable table from a failing process is still rejected
            return Err(Error::SimulatorOutput {
                reason: format!(
                    "simulator exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                output: stdout,
            });
        }
        if request.verbosity > 1 {
            println!("{}", stdout);
        }

        let trajectory = parse_trajectory(&stdout)?;
        if request.verbosity > 2 {
            for ((time, size), rate) in trajectory
                .time
                .iter()
                .zip(trajectory.size.iter())
                .zip(trajectory.rate.iter())
            {
                println!("{}\t{}\t{}", time, size, rate);
            }
        }
        Ok(trajectory)
    }
}

pub fn parse_trajectory(output: &str) -> Result<Trajectory> {
    //! Parse the simulator stdout, a tab-separated table whose header must
    //! contain at least the columns `time`, `size` and `rate` (additional
    //! columns are ignored). A row that cannot be converted to the expected
    //! types is fatal and surfaces the full captured output: no partial
    //! trajectory is ever fabricated.
    let malformed = |reason: String| Error::SimulatorOutput {
        reason,
        output: output.to_owned(),
    };

    let mut rdr =
        csv::ReaderBuilder::new().delimiter(b'\t').from_reader(output.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|err| malformed(format!("cannot read the header row: {}", err)))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| malformed(format!("missing column `{}`", name)))
    };
    let (time_idx, size_idx, rate_idx) =
        (column("time")?, column("size")?, column("rate")?);

    let mut trajectory = Trajectory::default();
    for (row_idx, row) in rdr.records().enumerate() {
        let row = row.map_err(|err| {
            malformed(format!("cannot read row {}: {}", row_idx + 1, err))
        })?;
        let number = |column_idx: usize, name: &str| -> Result<f64> {
            let field = row.get(column_idx).ok_or_else(|| {
                malformed(format!(
                    "row {} has no `{}` field",
                    row_idx + 1,
                    name
                ))
            })?;
            field.trim().parse::<f64>().map_err(|err| {
                malformed(format!(
                    "row {}: cannot parse `{}` from `{}`: {}",
                    row_idx + 1,
                    name,
                    field,
                    err
                ))
            })
        };
        trajectory.time.push(number(time_idx, "time")?);
        // sizes can come in scientific notation, so go through a float and
        // truncate instead of parsing the integer directly
        trajectory
            .size
            .push(number(size_idx, "size")? as NbIndividuals);
        trajectory.rate.push(number(rate_idx, "rate")?);
    }
    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_birthrates(
        birthrates: Birthrates,
        simulator: SimulatorKind,
    ) -> Result<SimulationRequest> {
        SimulationRequestBuilder::default()
            .starting_population(100)
            .end_time(7.)
            .birthrates(birthrates)
            .deathrate(0.1)
            .simulator(simulator)
            .build()
    }

    #[quickcheck]
    fn valid_requests_pass_validation(
        population: u64,
        end_time: u32,
        birthrate: u32,
        deathrate: u32,
    ) -> bool {
        let request = SimulationRequestBuilder::default()
            .starting_population(population.max(1))
            .end_time(end_time as f64)
            .birthrates(birthrate as f64 / 1000.)
            .deathrate(deathrate as f64 / 1000.)
            .birth_interaction(0.3333e-7)
            .death_interaction(0.)
            .simulator(SimulatorKind::RarEngine)
            .build();
        request.is_ok()
    }

    #[test]
    fn request_rejects_empty_starting_population() {
        let request = SimulationRequestBuilder::default()
            .starting_population(0)
            .end_time(7.)
            .birthrates(0.3)
            .deathrate(0.)
            .simulator(SimulatorKind::RarEngine)
            .build();
        assert!(matches!(request, Err(Error::Validation(_))));
    }

    #[test]
    fn request_rejects_negative_end_time() {
        let request = SimulationRequestBuilder::default()
            .starting_population(100)
            .end_time(-1.)
            .birthrates(0.3)
            .deathrate(0.)
            .simulator(SimulatorKind::RarEngine)
            .build();
        assert!(matches!(request, Err(Error::Validation(_))));
    }

    #[test]
    fn request_rejects_missing_fields() {
        let request = SimulationRequestBuilder::default().build();
        assert!(matches!(request, Err(Error::Validation(_))));
    }

    #[test]
    fn request_rejects_negative_birthrate() {
        let request = request_with_birthrates(
            Birthrates::Timeline(vec![0.3, -0.1]),
            SimulatorKind::RarEngine,
        );
        assert!(matches!(request, Err(Error::Validation(_))));
    }

    #[test]
    fn bernoulli_tolerates_negative_birthrate() {
        let request = request_with_birthrates(
            Birthrates::Timeline(vec![0.3, -0.1]),
            SimulatorKind::Bernoulli,
        );
        assert!(request.is_ok());
    }

    #[test]
    fn request_rejects_negative_interactions() {
        let request = SimulationRequestBuilder::default()
            .starting_population(100)
            .end_time(7.)
            .birthrates(0.3)
            .deathrate(0.)
            .birth_interaction(-0.1)
            .simulator(SimulatorKind::RarEngine)
            .build();
        assert!(matches!(request, Err(Error::Validation(_))));
    }

    #[test]
    fn birthrates_format_as_literal() {
        assert_eq!(Birthrates::Constant(0.3).to_string(), "0.3");
        assert_eq!(
            Birthrates::Timeline(vec![0.3, 0.4, 0.5]).to_string(),
            "[0.3, 0.4, 0.5]"
        );
    }

    #[test]
    fn parse_trajectory_roundtrip() {
        let output = "time\tsize\trate\n0\t100\t0.3\n0.5\t121\t0.31\n";
        let trajectory = parse_trajectory(output).unwrap();
        assert_eq!(trajectory.time, vec![0., 0.5]);
        assert_eq!(trajectory.size, vec![100, 121]);
        assert_eq!(trajectory.rate, vec![0.3, 0.31]);
    }

    #[test]
    fn parse_trajectory_truncates_scientific_notation_sizes() {
        let output = "time\tsize\trate\n1\t1.5e3\t0.3\n";
        let trajectory = parse_trajectory(output).unwrap();
        assert_eq!(trajectory.size, vec![1500]);
    }

    #[test]
    fn parse_trajectory_ignores_extra_columns() {
        let output = "time\tsize\trate\textra\n1\t10\t0.3\t42\n";
        let trajectory = parse_trajectory(output).unwrap();
        assert_eq!(trajectory.len(), 1);
        assert_eq!(trajectory.size, vec![10]);
    }

    #[test]
    fn parse_trajectory_missing_column_carries_full_output() {
        let output = "time\tpopulation\trate\n1\t10\t0.3\n";
        match parse_trajectory(output) {
            Err(Error::SimulatorOutput { reason, output: captured }) => {
                assert!(reason.contains("size"));
                assert_eq!(captured, output);
            }
            other => panic!("expected SimulatorOutput, found {:?}", other),
        }
    }

    #[test]
    fn parse_trajectory_unparseable_row_is_fatal() {
        let output = "time\tsize\trate\n1\tmany\t0.3\n";
        assert!(matches!(
            parse_trajectory(output),
            Err(Error::SimulatorOutput { .. })
        ));
    }

    #[test]
    fn parse_trajectory_empty_output_is_fatal() {
        assert!(matches!(
            parse_trajectory(""),
            Err(Error::SimulatorOutput { .. })
        ));
    }

    pub struct FakeSimulator(pub Trajectory);

    impl Simulate for FakeSimulator {
        fn simulate(
            &self,
            _request: &SimulationRequest,
        ) -> Result<Trajectory> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn fake_simulator_exercises_the_seam() {
        let expected = Trajectory {
            time: vec![0., 1.],
            size: vec![100, 200],
            rate: vec![0.3, 0.3],
        };
        let simulator = FakeSimulator(expected.clone());
        let request = request_with_birthrates(
            Birthrates::Constant(0.3),
            SimulatorKind::RarEngine,
        )
        .unwrap();
        assert_eq!(simulator.simulate(&request).unwrap(), expected);
    }
}
