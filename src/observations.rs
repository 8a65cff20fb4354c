//! Observed cell-count time series, one record per experimental dataset.
//!
//! The raw table has one row per timepoint; rows sharing the same
//! `(name, generation, well)` identity belong to the same biological
//! replicate and are grouped into a single [`ObservationRecord`] whose
//! per-field series stay aligned by index.
use anyhow::{ensure, Context};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

/// The identity of one dataset: a single well/colony followed over its full
/// time series.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DatasetId {
    pub name: String,
    pub generation: i64,
    pub well: String,
}

/// The dotted string used to refer to the dataset in files and logs.
impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.name, self.generation, self.well)
    }
}

/// All observed values for one dataset, one entry per timepoint in original
/// row order.
///
/// Type coercion follows the role of the column: `name`/`well` are strings,
/// `generation` and `*_group` columns are integers, everything else is a
/// float. An empty `count` or `dead` cell means the quantity was not
/// measured and maps to `None`; any other empty numeric cell defaults to
/// `1.0`, a deliberate modelling choice: an absent sampling or dilution
/// factor is a no-op multiplier, not a missing measurement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObservationRecord {
    pub time: Vec<f64>,
    pub count: Vec<Option<f64>>,
    pub dead: Vec<Option<f64>>,
    pub generation: Vec<i64>,
    strings: HashMap<String, Vec<String>>,
    groups: HashMap<String, Vec<i64>>,
    factors: HashMap<String, Vec<f64>>,
}

impl ObservationRecord {
    /// Number of timepoints. All per-field series have this length.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// A numeric factor series such as `sample1` or `dilute2`.
    pub fn factor(&self, column: &str) -> Option<&[f64]> {
        self.factors.get(column).map(|series| series.as_slice())
    }

    /// An integer `*_group` series such as `birthrate_group`.
    pub fn group(&self, column: &str) -> Option<&[i64]> {
        self.groups.get(column).map(|series| series.as_slice())
    }

    /// A string series such as `name` or `well`.
    pub fn string_field(&self, column: &str) -> Option<&[String]> {
        self.strings.get(column).map(|series| series.as_slice())
    }

    /// The largest observed time value, if any observation exists.
    pub fn max_time(&self) -> Option<f64> {
        self.time.iter().copied().reduce(f64::max)
    }

    fn push(&mut self, column: &str, value: &str) -> anyhow::Result<()> {
        let value = value.trim();
        match column {
            "name" | "well" => self
                .strings
                .entry(column.to_owned())
                .or_default()
                .push(value.to_owned()),
            "count" => self.count.push(parse_nullable(value)?),
            "dead" => self.dead.push(parse_nullable(value)?),
            "generation" => self.generation.push(parse_int(value)?),
            "time" => self.time.push(parse_float(value)?),
            group if group.ends_with("_group") => self
                .groups
                .entry(column.to_owned())
                .or_default()
                .push(parse_int(value)?),
            _ => self
                .factors
                .entry(column.to_owned())
                .or_default()
                .push(parse_float(value)?),
        }
        Ok(())
    }
}

fn parse_float(value: &str) -> anyhow::Result<f64> {
    if value.is_empty() {
        // absence means no correction
        return Ok(1.);
    }
    value
        .parse::<f64>()
        .with_context(|| format!("cannot parse `{}` as a float", value))
}

fn parse_int(value: &str) -> anyhow::Result<i64> {
    if value.is_empty() {
        return Ok(1);
    }
    value
        .parse::<i64>()
        .with_context(|| format!("cannot parse `{}` as an integer", value))
}

fn parse_nullable(value: &str) -> anyhow::Result<Option<f64>> {
    //! `count` and `dead` are measurements: an empty cell is a missing
    //! value, not a default.
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .with_context(|| format!("cannot parse `{}` as a float", value))
}

/// The observed datasets of one experiment, grouped by identity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observations(HashMap<DatasetId, ObservationRecord>);

impl Observations {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        //! Parse the csv of observations at `path`.
        let file = fs::File::open(path).with_context(|| {
            format!("cannot open the observations {:#?}", path)
        })?;
        Observations::from_reader(file).with_context(|| {
            format!("cannot parse the observations {:#?}", path)
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> anyhow::Result<Self> {
        //! Parse a csv of observations: a header with at least `name`,
        //! `generation`, `well`, `time` and `count`, then one row per
        //! timepoint per dataset. Rows are grouped by identity keeping the
        //! original row order within each dataset.
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr
            .headers()
            .context("cannot read the observation header")?
            .clone();
        let column = |name: &str| headers.iter().position(|h| h == name);
        for required in ["name", "generation", "well", "time", "count"] {
            ensure!(
                column(required).is_some(),
                "the observation table is missing the required column `{}`",
                required
            );
        }
        let (name_idx, generation_idx, well_idx) = (
            column("name").unwrap(),
            column("generation").unwrap(),
            column("well").unwrap(),
        );

        let mut observations: HashMap<DatasetId, ObservationRecord> =
            HashMap::new();
        for (row_idx, row) in rdr.records().enumerate() {
            let row = row.with_context(|| {
                format!("cannot read observation row {}", row_idx + 1)
            })?;
            let id = DatasetId {
                name: row[name_idx].trim().to_owned(),
                generation: row[generation_idx]
                    .trim()
                    .parse()
                    .with_context(|| {
                        format!(
                            "row {}: cannot parse generation `{}`",
                            row_idx + 1,
                            &row[generation_idx]
                        )
                    })?,
                well: row[well_idx].trim().to_owned(),
            };
            let record = observations.entry(id).or_default();
            for (column, value) in headers.iter().zip(row.iter()) {
                record.push(column, value).with_context(|| {
                    format!(
                        "row {}: cannot parse column `{}`",
                        row_idx + 1,
                        column
                    )
                })?;
            }
        }
        Ok(Observations(observations))
    }

    pub fn get(&self, id: &DatasetId) -> Option<&ObservationRecord> {
        self.0.get(id)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&DatasetId, &ObservationRecord)> {
        self.0.iter()
    }

    /// The dataset identities in sorted order, so that iteration over the
    /// observations can be made reproducible.
    pub fn sorted_ids(&self) -> Vec<&DatasetId> {
        let mut ids: Vec<&DatasetId> = self.0.keys().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_DATASETS: &str = "\
name,generation,well,time,count,dead,sample1,dilute1
c1,1,a2,0,1000,,0.1,0.5
c1,1,a2,1,2400,12,0.1,0.5
c1,1,b3,0,900,,0.2,
";

    fn parse(csv: &str) -> Observations {
        Observations::from_reader(csv.as_bytes()).unwrap()
    }

    fn id(name: &str, generation: i64, well: &str) -> DatasetId {
        DatasetId {
            name: name.to_owned(),
            generation,
            well: well.to_owned(),
        }
    }

    #[test]
    fn rows_with_the_same_identity_are_grouped_in_order() {
        let observations = parse(TWO_DATASETS);
        assert_eq!(observations.len(), 2);
        let record = observations.get(&id("c1", 1, "a2")).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.time, vec![0., 1.]);
        assert_eq!(record.count, vec![Some(1000.), Some(2400.)]);
    }

    #[test]
    fn identity_displays_as_dotted_string() {
        assert_eq!(id("c1", 1, "a2").to_string(), "c1.1.a2");
    }

    #[test]
    fn empty_count_and_dead_are_null_not_zero() {
        let observations = parse(
            "name,generation,well,time,count,dead\nc1,1,a2,0,,\n",
        );
        let record = observations.get(&id("c1", 1, "a2")).unwrap();
        assert_eq!(record.count, vec![None]);
        assert_eq!(record.dead, vec![None]);
    }

    #[test]
    fn empty_factors_default_to_noop_multiplier() {
        let observations = parse(TWO_DATASETS);
        let record = observations.get(&id("c1", 1, "b3")).unwrap();
        assert_eq!(record.factor("dilute1").unwrap(), &[1.]);
        assert_eq!(record.factor("sample1").unwrap(), &[0.2]);
    }

    #[test]
    fn group_columns_are_integers() {
        let observations = parse(
            "name,generation,well,time,count,birthrate_group\nc1,2,a2,0,10,3\n",
        );
        let record = observations.get(&id("c1", 2, "a2")).unwrap();
        assert_eq!(record.group("birthrate_group").unwrap(), &[3]);
        assert_eq!(record.generation, vec![2]);
        assert_eq!(record.string_field("well").unwrap(), &["a2".to_owned()]);
    }

    #[test]
    fn series_stay_aligned_per_timepoint() {
        let observations = parse(TWO_DATASETS);
        for (_, record) in observations.iter() {
            assert_eq!(record.count.len(), record.len());
            assert_eq!(record.dead.len(), record.len());
            assert_eq!(record.generation.len(), record.len());
            for factor in ["sample1", "dilute1"] {
                assert_eq!(record.factor(factor).unwrap().len(), record.len());
            }
        }
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let observations = Observations::from_reader(
            "name,generation,well,time\nc1,1,a2,0\n".as_bytes(),
        );
        assert!(observations.is_err());
    }

    #[test]
    fn unparseable_generation_is_rejected() {
        let observations = Observations::from_reader(
            "name,generation,well,time,count\nc1,one,a2,0,10\n".as_bytes(),
        );
        assert!(observations.is_err());
    }

    #[test]
    fn sorted_ids_are_deterministic() {
        let observations = parse(TWO_DATASETS);
        let ids = observations.sorted_ids();
        assert_eq!(ids, vec![&id("c1", 1, "a2"), &id("c1", 1, "b3")]);
    }
}
