//! Row-to-code mapping.
//!
//! Left-joins the derived projection set to the variable catalogue on the
//! canonical key. Unmatched rows are dropped, matched rows fan out one
//! mapped row per matching code.

use anyhow::{bail, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::config::MissingPolicy;
use crate::key::{catalogue_key, projection_key};
use crate::types::{MappedRow, ProjectionRow, VariableEntry};

/// Counters for the join stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MapOutcome {
    pub mapped_rows: usize,
    pub unmatched_rows: usize,
    /// Rows whose key matched more than one catalogue code.
    pub duplicated_rows: usize,
}

/// Join projection rows to catalogue codes on the canonical key.
///
/// A row with no matching code is dropped and counted; `policy` decides
/// whether the drop is also logged or fatal. A key held by several codes
/// yields one mapped row per code, kept in catalogue order.
pub fn map_rows(
    rows: Vec<ProjectionRow>,
    entries: &[VariableEntry],
    policy: MissingPolicy,
) -> Result<(Vec<MappedRow>, MapOutcome)> {
    let mut codes_by_key: HashMap<String, Vec<u32>> = HashMap::new();
    for entry in entries {
        codes_by_key
            .entry(catalogue_key(&entry.label))
            .or_default()
            .push(entry.code);
    }

    let mut mapped: Vec<MappedRow> = Vec::with_capacity(rows.len());
    let mut outcome = MapOutcome::default();

    for row in rows {
        let key = projection_key(&row.age_group, row.sex);
        match codes_by_key.get(&key) {
            Some(codes) => {
                if codes.len() > 1 {
                    outcome.duplicated_rows += 1;
                    warn!(key = %key, codes = ?codes, "key matches several catalogue codes");
                }
                for code in codes {
                    mapped.push(MappedRow {
                        code: *code,
                        row: row.clone(),
                    });
                }
            }
            None => {
                outcome.unmatched_rows += 1;
                match policy {
                    MissingPolicy::Silent => debug!(key = %key, "no catalogue code; row dropped"),
                    MissingPolicy::Warn => warn!(key = %key, "no catalogue code; row dropped"),
                    MissingPolicy::Fail => bail!("no catalogue code for key '{}'", key),
                }
            }
        }
    }

    outcome.mapped_rows = mapped.len();
    Ok((mapped, outcome))
}

/// Post-join reconciliation: report row counts for the expected codes and
/// return the ones missing from the mapped set. Advisory only.
pub fn verify_expected_codes(mapped: &[MappedRow], expected: &[u32]) -> Vec<u32> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for m in mapped {
        *counts.entry(m.code).or_default() += 1;
    }

    let mut missing = Vec::new();
    for code in expected {
        match counts.get(code) {
            Some(count) => debug!(code = *code, rows = *count, "expected code mapped"),
            None => {
                warn!(code = *code, "expected code missing from the mapped set");
                missing.push(*code);
            }
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RowOrigin, Sex};
    use anyhow::Result;

    fn row(age: &str, sex: Sex, values: &[f64]) -> ProjectionRow {
        ProjectionRow {
            region: "GO".to_string(),
            age_group: age.to_string(),
            sex,
            origin: RowOrigin::Source,
            values: values.to_vec(),
        }
    }

    fn entry(code: u32, label: &str) -> VariableEntry {
        VariableEntry {
            code,
            label: label.to_string(),
        }
    }

    #[test]
    fn rows_join_codes_on_the_canonical_key() -> Result<()> {
        let rows = vec![
            row("0-14", Sex::Both, &[111.0]),
            row("90 ou mais", Sex::Female, &[5.0]),
        ];
        let entries = vec![
            entry(980, "População de 0 a 14 anos"),
            entry(979, "População Feminina de 90 anos ou mais"),
        ];

        let (mapped, outcome) = map_rows(rows, &entries, MissingPolicy::Silent)?;
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].code, 980);
        assert_eq!(mapped[0].row.values, vec![111.0]);
        assert_eq!(mapped[1].code, 979);
        assert_eq!(outcome.unmatched_rows, 0);
        Ok(())
    }

    #[test]
    fn unmatched_rows_are_dropped_and_counted() -> Result<()> {
        let rows = vec![
            row("0-14", Sex::Both, &[1.0]),
            row("15-19", Sex::Both, &[2.0]),
            row("20-24", Sex::Both, &[3.0]),
        ];
        let entries = vec![entry(980, "População de 0 a 14 anos")];

        let (mapped, outcome) = map_rows(rows, &entries, MissingPolicy::Silent)?;
        assert_eq!(mapped.len(), 1);
        assert_eq!(outcome.unmatched_rows, 2);
        assert_eq!(outcome.mapped_rows, 1);
        Ok(())
    }

    #[test]
    fn sentinel_catalogue_entries_never_receive_rows() -> Result<()> {
        let rows = vec![
            row("0-14", Sex::Both, &[1.0]),
            row("Total", Sex::Both, &[2.0]),
            row("90 ou mais", Sex::Female, &[3.0]),
        ];
        let entries = vec![
            entry(980, "População de 0 a 14 anos"),
            entry(999, "Densidade demográfica"),
        ];

        let (mapped, _) = map_rows(rows, &entries, MissingPolicy::Silent)?;
        assert!(mapped.iter().all(|m| m.code != 999));
        Ok(())
    }

    #[test]
    fn one_key_held_by_two_codes_duplicates_the_row() -> Result<()> {
        let rows = vec![row("0-14", Sex::Both, &[7.0])];
        let entries = vec![
            entry(980, "População de 0 a 14 anos"),
            entry(985, "Residentes de 0 a 14 anos"),
        ];

        let (mapped, outcome) = map_rows(rows, &entries, MissingPolicy::Silent)?;
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].code, 980);
        assert_eq!(mapped[1].code, 985);
        assert_eq!(outcome.duplicated_rows, 1);
        Ok(())
    }

    #[test]
    fn zero_padded_labels_do_not_reach_child_band_codes() -> Result<()> {
        // "00-04" keys to 0-04, not 0-4; the child-band codes are fed by
        // derived rows carrying the standardized label instead.
        let rows = vec![row("00-04", Sex::Both, &[9.0])];
        let entries = vec![entry(942, "População Masculina de 0 a 4 anos")];

        let (mapped, outcome) = map_rows(rows, &entries, MissingPolicy::Silent)?;
        assert!(mapped.is_empty());
        assert_eq!(outcome.unmatched_rows, 1);
        Ok(())
    }

    #[test]
    fn fail_policy_aborts_on_the_first_unmatched_row() {
        let rows = vec![row("15-19", Sex::Both, &[2.0])];
        let entries = vec![entry(980, "População de 0 a 14 anos")];

        let err = map_rows(rows, &entries, MissingPolicy::Fail).unwrap_err();
        assert!(err.to_string().contains("15-19|total"));
    }

    #[test]
    fn verify_reports_codes_missing_from_the_mapped_set() {
        let mapped = vec![
            MappedRow {
                code: 980,
                row: row("0-14", Sex::Both, &[1.0]),
            },
            MappedRow {
                code: 980,
                row: row("0-14", Sex::Both, &[1.0]),
            },
            MappedRow {
                code: 979,
                row: row("90 ou mais", Sex::Female, &[2.0]),
            },
        ];

        let missing = verify_expected_codes(&mapped, &[979, 980, 939, 940]);
        assert_eq!(missing, vec![939, 940]);
    }
}
