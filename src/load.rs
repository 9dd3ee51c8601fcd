//! Spreadsheet loading.
//!
//! Reads the two input workbooks into string tables and parses the domain
//! tables out of them. Only this stage touches the input files; everything
//! downstream works over memory.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::InputSheet;
use crate::types::{ProjectionRow, RowOrigin, Sex, VariableEntry, YearRange};

/// Fatal input failures. Everything else the loader tolerates row by row.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input file not found: {}", path.display())]
    FileNotFound { path: PathBuf },
    #[error("sheet '{sheet}' not found in {file}")]
    SheetNotFound { file: String, sheet: String },
    #[error("sheet '{sheet}' in {file} has no rows")]
    EmptySheet { file: String, sheet: String },
    #[error("required column '{column}' missing from {file}")]
    MissingColumn { file: String, column: String },
    #[error("no year columns between {first} and {last} in {file}")]
    NoYearColumns { file: String, first: u16, last: u16 },
}

/// A sheet reduced to strings: one normalized header row plus data rows.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub file: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Index of a normalized header, if present.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn require_column(&self, name: &str) -> Result<usize, LoadError> {
        self.column(name).ok_or_else(|| LoadError::MissingColumn {
            file: self.file.clone(),
            column: name.to_string(),
        })
    }
}

/// Normalize a header cell. The sheets vary in accents and punctuation, so
/// dots are dropped and the known accented forms fold to their canonical
/// column names.
fn normalize_header(cell: &str) -> String {
    cell.trim()
        .replace('.', "")
        .replace("CÓD", "COD")
        .replace("GRUPO ETÁRIO", "GRUPO_ETARIO")
        .replace("GRUPO ETARIO", "GRUPO_ETARIO")
}

/// Render one cell as a string. Whole-number cells print without a decimal
/// part, so year headers arrive as "2000" rather than "2000.0".
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => format!("{}", n),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => format!("{}", dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Read one sheet into a [`RawTable`].
///
/// Skips `skip_rows` leading rows of the sheet's used range (which opens at
/// its first non-empty row) and takes the next row as the header. Rows that
/// are entirely empty are dropped.
pub fn load_sheet(input: &InputSheet) -> Result<RawTable> {
    if !input.path.exists() {
        return Err(LoadError::FileNotFound {
            path: input.path.clone(),
        }
        .into());
    }
    let file = input.path.display().to_string();

    let mut workbook =
        open_workbook_auto(&input.path).with_context(|| format!("opening workbook {}", file))?;

    if !workbook.sheet_names().iter().any(|s| s == &input.sheet) {
        return Err(LoadError::SheetNotFound {
            file,
            sheet: input.sheet.clone(),
        }
        .into());
    }

    let range = workbook
        .worksheet_range(&input.sheet)
        .with_context(|| format!("reading sheet '{}' from {}", input.sheet, file))?;

    let mut rows_iter = range.rows().skip(input.skip_rows);
    let headers: Vec<String> = match rows_iter.next() {
        Some(row) => row
            .iter()
            .map(|c| normalize_header(&cell_to_string(c)))
            .collect(),
        None => {
            return Err(LoadError::EmptySheet {
                file,
                sheet: input.sheet.clone(),
            }
            .into());
        }
    };

    let rows: Vec<Vec<String>> = rows_iter
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<String>>())
        .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .collect();

    debug!(file = %file, sheet = %input.sheet, rows = rows.len(), "sheet loaded");

    Ok(RawTable {
        file,
        headers,
        rows,
    })
}

/// Parsed projection sheet: domain rows plus the ascending list of year
/// columns that were actually present.
#[derive(Debug)]
pub struct ProjectionTable {
    pub rows: Vec<ProjectionRow>,
    pub years: Vec<u16>,
}

/// Parse projection rows out of a raw table.
///
/// Requires the region, sex and age-group columns plus at least one year
/// column inside `years`. Rows with an unknown sex label are skipped and
/// counted; empty or non-numeric value cells load as 0.
pub fn projection_rows(table: &RawTable, years: YearRange) -> Result<ProjectionTable> {
    let region_col = table.require_column("SIGLA")?;
    let sex_col = table.require_column("SEXO")?;
    let age_col = table.require_column("GRUPO_ETARIO")?;

    let year_cols: Vec<(u16, usize)> = years
        .iter()
        .filter_map(|year| table.column(&year.to_string()).map(|idx| (year, idx)))
        .collect();
    if year_cols.is_empty() {
        return Err(LoadError::NoYearColumns {
            file: table.file.clone(),
            first: years.first,
            last: years.last,
        }
        .into());
    }

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut skipped_sex = 0usize;
    let mut unparseable = 0usize;

    for cells in &table.rows {
        let sex_label = cells.get(sex_col).map(String::as_str).unwrap_or("");
        let sex = match Sex::from_source_label(sex_label) {
            Some(sex) => sex,
            None => {
                skipped_sex += 1;
                continue;
            }
        };

        let values: Vec<f64> = year_cols
            .iter()
            .map(|(_, idx)| {
                let cell = cells.get(*idx).map(String::as_str).unwrap_or("");
                match parse_count(cell) {
                    Some(v) => v,
                    None => {
                        unparseable += 1;
                        0.0
                    }
                }
            })
            .collect();

        rows.push(ProjectionRow {
            region: cells
                .get(region_col)
                .map(|c| c.trim().to_string())
                .unwrap_or_default(),
            age_group: cells.get(age_col).cloned().unwrap_or_default(),
            sex,
            origin: RowOrigin::Source,
            values,
        });
    }

    if skipped_sex > 0 {
        warn!(rows = skipped_sex, "rows with unknown sex labels skipped");
    }
    if unparseable > 0 {
        debug!(cells = unparseable, "empty or non-numeric value cells loaded as 0");
    }

    Ok(ProjectionTable {
        rows,
        years: year_cols.iter().map(|(year, _)| *year).collect(),
    })
}

/// Parse catalogue entries out of a raw table. Entries whose code cell is
/// missing or not an integer are skipped and counted.
pub fn variable_entries(table: &RawTable) -> Result<Vec<VariableEntry>> {
    let label_col = table.require_column("VAR")?;
    let code_col = table.require_column("VAR_COD")?;

    let mut entries = Vec::with_capacity(table.rows.len());
    let mut skipped = 0usize;

    for cells in &table.rows {
        let code_cell = cells.get(code_col).map(String::as_str).unwrap_or("");
        let code = match code_cell.trim().parse::<u32>() {
            Ok(code) => code,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        let label = cells
            .get(label_col)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        entries.push(VariableEntry { code, label });
    }

    if skipped > 0 {
        warn!(rows = skipped, "catalogue rows without an integer code skipped");
    }

    Ok(entries)
}

fn parse_count(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}
