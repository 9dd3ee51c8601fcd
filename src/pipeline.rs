//! End-to-end run orchestration.

use anyhow::Result;
use tracing::info;

use crate::aggregate;
use crate::config::RunConfig;
use crate::emit;
use crate::load;
use crate::mapping;
use crate::types::ProjectionRow;

/// Counters surfaced to the caller after a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub source_rows: usize,
    pub derived_rows: usize,
    pub mapped_rows: usize,
    pub unmatched_rows: usize,
    pub missing_codes: Vec<u32>,
    pub files_written: usize,
}

/// Run one export: load, filter, derive, map, reconcile, emit.
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    // ─── 1) load both workbooks ──────────────────────────────────────
    info!(file = %config.projections.path.display(), "loading projections");
    let projection_table = load::load_sheet(&config.projections)?;
    let parsed = load::projection_rows(&projection_table, config.years)?;

    info!(file = %config.variables.path.display(), "loading variable catalogue");
    let catalogue_table = load::load_sheet(&config.variables)?;
    let entries = load::variable_entries(&catalogue_table)?;
    info!(
        rows = parsed.rows.len(),
        codes = entries.len(),
        years = parsed.years.len(),
        "inputs loaded"
    );

    // ─── 2) filter to the configured region ──────────────────────────
    let mut rows: Vec<ProjectionRow> = parsed
        .rows
        .into_iter()
        .filter(|r| r.region == config.region)
        .collect();
    let source_rows = rows.len();
    info!(region = %config.region, rows = source_rows, "region filtered");

    // ─── 3) derive synthetic rows ────────────────────────────────────
    let (derived, derive_outcome) =
        aggregate::derive(&rows, &config.aggregates, config.missing_policy)?;
    rows.extend(derived);
    info!(
        derived = derive_outcome.derived_rows,
        empty = derive_outcome.empty_selections,
        "aggregates derived"
    );

    // ─── 4) join rows to catalogue codes ─────────────────────────────
    let (mapped, map_outcome) = mapping::map_rows(rows, &entries, config.missing_policy)?;
    info!(
        mapped = map_outcome.mapped_rows,
        unmatched = map_outcome.unmatched_rows,
        duplicated = map_outcome.duplicated_rows,
        "rows mapped"
    );

    // ─── 5) reconcile expected codes ─────────────────────────────────
    let missing_codes = mapping::verify_expected_codes(&mapped, &config.verify_codes);

    // ─── 6) emit one file per year ───────────────────────────────────
    let emit_outcome = emit::write_year_files(&mapped, &parsed.years, config)?;
    info!(
        files = emit_outcome.files_written,
        bytes = emit_outcome.bytes_written,
        dir = %config.output_dir.display(),
        "year files written"
    );

    Ok(RunSummary {
        source_rows,
        derived_rows: derive_outcome.derived_rows,
        mapped_rows: map_outcome.mapped_rows,
        unmatched_rows: map_outcome.unmatched_rows,
        missing_codes,
        files_written: emit_outcome.files_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{full_aggregates, InputSheet};
    use crate::load::LoadError;
    use crate::types::YearRange;
    use anyhow::Result;
    use encoding_rs::WINDOWS_1252;
    use rust_xlsxwriter::Workbook;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn projection_fixture(path: &Path, rows: &[(&str, &str, &str, f64)]) -> Result<()> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet().set_name("Projeções")?;
        sheet.write_string(0, 0, "SIGLA")?;
        sheet.write_string(0, 1, "SEXO")?;
        sheet.write_string(0, 2, "GRUPO ETÁRIO")?;
        sheet.write_number(0, 3, 2000.0)?;
        for (i, (region, sex, age, value)) in rows.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, *region)?;
            sheet.write_string(r, 1, *sex)?;
            sheet.write_string(r, 2, *age)?;
            sheet.write_number(r, 3, *value)?;
        }
        workbook.save(path)?;
        Ok(())
    }

    fn catalogue_fixture(path: &Path, entries: &[(&str, f64)]) -> Result<()> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet().set_name("Planilha1")?;
        sheet.write_string(0, 0, "VAR")?;
        sheet.write_string(0, 1, "VAR_COD")?;
        for (i, (label, code)) in entries.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, *label)?;
            sheet.write_number(r, 1, *code)?;
        }
        workbook.save(path)?;
        Ok(())
    }

    fn config_for(dir: &Path, aggregates: Vec<crate::config::AggregateDef>) -> RunConfig {
        RunConfig {
            projections: InputSheet {
                path: dir.join("projecoes.xlsx"),
                sheet: "Projeções".to_string(),
                skip_rows: 0,
            },
            variables: InputSheet {
                path: dir.join("variaveis.xlsx"),
                sheet: "Planilha1".to_string(),
                skip_rows: 0,
            },
            region: "GO".to_string(),
            years: YearRange::new(2000, 2000),
            output_dir: dir.join("projecoes"),
            aggregates,
            ..RunConfig::default()
        }
    }

    fn read_year_file(path: &Path) -> String {
        let bytes = fs::read(path).unwrap();
        let (text, _, _) = WINDOWS_1252.decode(&bytes);
        text.into_owned()
    }

    #[test]
    fn quinquennial_round_trip_emits_one_row_per_matched_code() -> Result<()> {
        let dir = tempdir()?;
        let mut rows = Vec::new();
        for region in ["GO", "SP", "MG"] {
            for sex in ["Ambos", "Mulheres"] {
                rows.push((region, sex, "15-19", 111.0));
                rows.push((region, sex, "20-24", 222.0));
                rows.push((region, sex, "25-29", 333.0));
            }
        }
        projection_fixture(&dir.path().join("projecoes.xlsx"), &rows)?;
        catalogue_fixture(
            &dir.path().join("variaveis.xlsx"),
            &[
                ("População de 15 a 19 anos", 901.0),
                ("População de 20 a 24 anos", 902.0),
                ("População de 25 a 29 anos", 903.0),
            ],
        )?;
        let mut config = config_for(dir.path(), Vec::new());
        config.verify_codes = vec![901, 902, 903];

        let summary = run(&config)?;
        assert_eq!(summary.source_rows, 6);
        assert_eq!(summary.derived_rows, 0);
        assert_eq!(summary.mapped_rows, 3);
        assert_eq!(summary.unmatched_rows, 3);
        assert!(summary.missing_codes.is_empty());
        assert_eq!(summary.files_written, 1);

        let text = read_year_file(&config.output_dir.join("GO_2000.csv"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "LOC_NOME;LOC_COD;VAR_COD;d_2000");
        assert_eq!(lines[1], "Estado de Goiás;1000;901;111");
        assert_eq!(lines[2], "Estado de Goiás;1000;902;222");
        assert_eq!(lines[3], "Estado de Goiás;1000;903;333");
        Ok(())
    }

    #[test]
    fn derived_rows_feed_the_aggregate_codes() -> Result<()> {
        let dir = tempdir()?;
        projection_fixture(
            &dir.path().join("projecoes.xlsx"),
            &[
                ("GO", "Ambos", "00-04", 10_000.0),
                ("GO", "Ambos", "05-09", 20_000.0),
                ("GO", "Ambos", "10-14", 30_000.0),
                ("GO", "Homens", "00-04", 1_234.0),
                ("GO", "Mulheres", "00-04", 7.0),
            ],
        )?;
        catalogue_fixture(
            &dir.path().join("variaveis.xlsx"),
            &[
                ("População de 0 a 14 anos", 980.0),
                ("População Total", 939.0),
                ("População Masculina de 0 a 4 anos", 942.0),
            ],
        )?;
        let mut config = config_for(dir.path(), full_aggregates());
        config.verify_codes = vec![939, 942, 979, 980];

        let summary = run(&config)?;
        assert_eq!(summary.source_rows, 5);
        assert_eq!(summary.derived_rows, 5);
        assert_eq!(summary.mapped_rows, 3);
        assert_eq!(summary.unmatched_rows, 7);
        assert_eq!(summary.missing_codes, vec![979]);

        let text = read_year_file(&config.output_dir.join("GO_2000.csv"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "Estado de Goiás;1000;980;60.000");
        assert_eq!(lines[2], "Estado de Goiás;1000;939;60.000");
        assert_eq!(lines[3], "Estado de Goiás;1000;942;1.234");
        Ok(())
    }

    #[test]
    fn missing_input_aborts_before_any_output() -> Result<()> {
        let dir = tempdir()?;
        catalogue_fixture(
            &dir.path().join("variaveis.xlsx"),
            &[("População Total", 939.0)],
        )?;
        let config = config_for(dir.path(), Vec::new());

        let err = run(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::FileNotFound { .. })
        ));
        assert!(!config.output_dir.exists());
        Ok(())
    }
}
