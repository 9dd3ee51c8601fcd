//! Synthetic-row derivation.
//!
//! The projection sheet carries quinquennial bands only; the catalogue also
//! codes composite bands ("0-14"), per-sex grand totals and a couple of
//! special extracts. This stage derives those rows from the source table
//! according to the configured [`AggregateDef`] list.

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::config::{AggregateDef, MissingPolicy};
use crate::types::{ProjectionRow, RowOrigin, Sex};

/// Literal rewrites applied before membership checks. The source sheet
/// zero-pads the child bands; member lists do not.
const AGE_LABEL_REWRITES: &[(&str, &str)] = &[("00-04", "0-4"), ("05-09", "5-9")];

/// Standardized form of an age label, used only to detect aggregate
/// membership. Never written back onto rows: keying sees the raw label.
pub fn standardize_age_label(label: &str) -> String {
    let mut standardized = label.trim().to_string();
    for (from, to) in AGE_LABEL_REWRITES {
        standardized = standardized.replace(from, to);
    }
    standardized
}

/// Counters for the derivation stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeriveOutcome {
    pub derived_rows: usize,
    pub empty_selections: usize,
}

/// Derive synthetic rows from `rows` per the configured definitions.
///
/// Returns only the new rows; the caller appends them to the source set.
/// Every definition selects over `rows` alone, so earlier synthetic rows
/// never feed later definitions. An empty selection produces no row;
/// `policy` decides whether that is also logged or fatal.
pub fn derive(
    rows: &[ProjectionRow],
    defs: &[AggregateDef],
    policy: MissingPolicy,
) -> Result<(Vec<ProjectionRow>, DeriveOutcome)> {
    let mut derived: Vec<ProjectionRow> = Vec::new();
    let mut outcome = DeriveOutcome::default();

    for def in defs {
        let before = derived.len();

        match def {
            AggregateDef::Composite { label, members, sex } => {
                let selected: Vec<&ProjectionRow> = rows
                    .iter()
                    .filter(|r| {
                        r.sex == *sex && members.contains(&standardize_age_label(&r.age_group))
                    })
                    .collect();
                if let Some(row) = summed_row(&selected, label, *sex) {
                    derived.push(row);
                }
            }
            AggregateDef::PassThrough { age_group, sex } => {
                for row in rows
                    .iter()
                    .filter(|r| r.sex == *sex && r.age_group.trim() == age_group.as_str())
                {
                    let mut copy = row.clone();
                    copy.origin = RowOrigin::Derived;
                    derived.push(copy);
                }
            }
            AggregateDef::SexTotal { label, sex } => {
                let selected: Vec<&ProjectionRow> =
                    rows.iter().filter(|r| r.sex == *sex).collect();
                if let Some(row) = summed_row(&selected, label, *sex) {
                    derived.push(row);
                }
            }
        }

        if derived.len() == before {
            outcome.empty_selections += 1;
            match policy {
                MissingPolicy::Silent => debug!("{} selected no rows", def),
                MissingPolicy::Warn => warn!("{} selected no rows", def),
                MissingPolicy::Fail => bail!("{} selected no rows", def),
            }
        } else {
            debug!(rows = derived.len() - before, "derived {}", def);
        }
    }

    outcome.derived_rows = derived.len();
    Ok((derived, outcome))
}

/// Sum a selection elementwise into one derived row. Returns `None` for an
/// empty selection. Selected rows share the loader's year axis, so the
/// value vectors line up.
fn summed_row(selected: &[&ProjectionRow], label: &str, sex: Sex) -> Option<ProjectionRow> {
    let first = selected.first()?;
    let mut values = vec![0.0; first.values.len()];
    for row in selected {
        for (total, v) in values.iter_mut().zip(&row.values) {
            *total += *v;
        }
    }
    Some(ProjectionRow {
        region: first.region.clone(),
        age_group: label.to_string(),
        sex,
        origin: RowOrigin::Derived,
        values,
    })
}
