//! Run configuration.
//!
//! Everything a run needs is collected in [`RunConfig`]: input workbooks,
//! the region filter, the constant location columns, the aggregate table
//! and the reconciliation code list. The defaults are the deployed Goiás
//! export; a YAML file can override any subset of fields, so deployment
//! variants differ in configuration only.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{Sex, YearRange};

/// One spreadsheet input: the file, the sheet inside it, and how many
/// leading rows to skip before the header row.
#[derive(Debug, Clone, Deserialize)]
pub struct InputSheet {
    pub path: PathBuf,
    pub sheet: String,
    #[serde(default)]
    pub skip_rows: usize,
}

/// What to do when an aggregate selects no rows or a projection row finds
/// no catalogue code. `Silent` is the historical behavior: drop, count,
/// keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    #[default]
    Silent,
    Warn,
    Fail,
}

/// One synthetic-row definition. The aggregate table is plain data so the
/// deployed variants stay expressible without code changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateDef {
    /// Sum the year columns of every row of `sex` whose standardized age
    /// label is one of `members`; emit a single row labeled `label`.
    Composite {
        label: String,
        members: Vec<String>,
        sex: Sex,
    },
    /// Copy every row of `sex` whose trimmed age label equals `age_group`,
    /// without summing.
    PassThrough { age_group: String, sex: Sex },
    /// Sum the year columns of every row of `sex` regardless of age label.
    SexTotal { label: String, sex: Sex },
}

impl fmt::Display for AggregateDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateDef::Composite { label, sex, .. } => {
                write!(f, "composite '{}' ({})", label, sex.key_token())
            }
            AggregateDef::PassThrough { age_group, sex } => {
                write!(f, "pass-through '{}' ({})", age_group, sex.key_token())
            }
            AggregateDef::SexTotal { label, sex } => {
                write!(f, "sex total '{}' ({})", label, sex.key_token())
            }
        }
    }
}

/// All parameters of one export run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Projection workbook: region × sex × age band rows, one column per year.
    pub projections: InputSheet,
    /// Variable catalogue workbook: free-text label → numeric code.
    pub variables: InputSheet,
    /// Region identifier the projection rows are filtered to.
    pub region: String,
    /// Constant location columns stamped on every output record.
    pub location_name: String,
    pub location_code: u32,
    /// Years to emit, intersected with the year columns actually loaded.
    pub years: YearRange,
    pub output_dir: PathBuf,
    /// Synthetic-row definitions, applied to source rows in order.
    pub aggregates: Vec<AggregateDef>,
    /// Codes the post-join reconciliation report checks for.
    pub verify_codes: Vec<u32>,
    pub missing_policy: MissingPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            projections: InputSheet {
                path: PathBuf::from("projecoes_2024.xlsx"),
                sheet: "2) POP_GRUPO QUINQUENAL".to_string(),
                skip_rows: 5,
            },
            variables: InputSheet {
                path: PathBuf::from("Variáveis Projeção.xlsx"),
                sheet: "Planilha1".to_string(),
                skip_rows: 0,
            },
            region: "GO".to_string(),
            location_name: "Estado de Goiás".to_string(),
            location_code: 1000,
            years: YearRange::default(),
            output_dir: PathBuf::from("projecoes"),
            aggregates: full_aggregates(),
            verify_codes: vec![939, 940, 941, 942, 943, 944, 979, 980, 981, 982, 983],
            missing_policy: MissingPolicy::Silent,
        }
    }
}

impl RunConfig {
    /// Load a YAML config file; absent fields keep their defaults.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: RunConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }
}

/// The smaller deployed aggregate table: the four composite bands over both
/// sexes plus the women-90+ extract.
pub fn minimal_aggregates() -> Vec<AggregateDef> {
    let bands: &[(&str, &[&str])] = &[
        ("0-14", &["0-4", "5-9", "10-14"]),
        ("15-29", &["15-19", "20-24", "25-29"]),
        (
            "30-64",
            &["30-34", "35-39", "40-44", "45-49", "50-54", "55-59", "60-64"],
        ),
        (
            "65 ou mais",
            &["65-69", "70-74", "75-79", "80-84", "85-89", "90 ou mais"],
        ),
    ];

    let mut defs: Vec<AggregateDef> = bands
        .iter()
        .map(|(label, members)| AggregateDef::Composite {
            label: (*label).to_string(),
            members: members.iter().map(|m| (*m).to_string()).collect(),
            sex: Sex::Both,
        })
        .collect();

    defs.push(AggregateDef::PassThrough {
        age_group: "90 ou mais".to_string(),
        sex: Sex::Female,
    });

    defs
}

/// The full deployed table: the minimal set plus per-sex grand totals and
/// the male child bands.
pub fn full_aggregates() -> Vec<AggregateDef> {
    let mut defs = minimal_aggregates();

    for sex in [Sex::Both, Sex::Male, Sex::Female] {
        defs.push(AggregateDef::SexTotal {
            label: "Total".to_string(),
            sex,
        });
    }

    // Single-member composites: copies today, sums if the source ever
    // carries duplicate member rows.
    for band in ["0-4", "5-9", "10-14"] {
        defs.push(AggregateDef::Composite {
            label: band.to_string(),
            members: vec![band.to_string()],
            sex: Sex::Male,
        });
    }

    defs
}
