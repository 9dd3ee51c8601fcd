//! Per-year CSV emission.
//!
//! One `<region>_<year>.csv` per year, semicolon-delimited and encoded as
//! windows-1252. Downstream loaders expect exactly this delimiter and
//! encoding, so neither is configurable.

use anyhow::{anyhow, Context, Result};
use encoding_rs::WINDOWS_1252;
use std::fs;
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::types::MappedRow;

/// Counters for the emission stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmitOutcome {
    pub files_written: usize,
    pub bytes_written: u64,
}

/// Format a population count with `.` as thousands separator and no
/// decimal digits. Rounds half to even: `0.5` → `"0"`, `1.5` → `"2"`.
/// Persisted values depend on this mode.
pub fn format_grouped(value: f64) -> String {
    let rounded = value.round_ties_even();
    let magnitude = rounded.abs() as i64;
    let digits = magnitude.to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    if rounded < 0.0 && magnitude != 0 {
        grouped.insert(0, '-');
    }
    grouped
}

/// Write one output file per configured year.
///
/// `loaded_years` is the year axis of the mapped rows' value vectors; a
/// configured year absent from it is skipped without producing a file.
/// The output directory is created here, so nothing touches the disk
/// before the pipeline reaches this stage.
pub fn write_year_files(
    mapped: &[MappedRow],
    loaded_years: &[u16],
    config: &RunConfig,
) -> Result<EmitOutcome> {
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output directory {}", config.output_dir.display()))?;

    let location_code = config.location_code.to_string();
    let mut outcome = EmitOutcome::default();

    for year in config.years.iter() {
        let column = match loaded_years.iter().position(|y| *y == year) {
            Some(idx) => idx,
            None => {
                debug!(year, "no loaded column; skipped");
                continue;
            }
        };

        let value_header = format!("d_{}", year);
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(Vec::new());
        writer.write_record(["LOC_NOME", "LOC_COD", "VAR_COD", value_header.as_str()])?;

        for m in mapped {
            let code = m.code.to_string();
            let value = format_grouped(m.row.values[column]);
            writer.write_record([
                config.location_name.as_str(),
                location_code.as_str(),
                code.as_str(),
                value.as_str(),
            ])?;
        }

        let buffer = writer
            .into_inner()
            .map_err(|e| anyhow!("flushing CSV buffer for {}: {}", year, e))?;
        let utf8 = String::from_utf8(buffer).context("building CSV buffer")?;
        let (encoded, _, had_errors) = WINDOWS_1252.encode(&utf8);
        if had_errors {
            warn!(year, "output contains characters outside windows-1252");
        }

        let path = config.output_dir.join(format!("{}_{}.csv", config.region, year));
        fs::write(&path, &encoded).with_context(|| format!("writing {}", path.display()))?;

        outcome.files_written += 1;
        outcome.bytes_written += encoded.len() as u64;
    }

    Ok(outcome)
}
