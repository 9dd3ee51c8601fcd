use serde::Deserialize;

/// Sex facet of a projection row or a catalogue label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Both,
    Male,
    Female,
}

impl Sex {
    /// Parse the projection sheet's pt-BR sex labels. Anything else is an
    /// unusable row, not an error.
    pub fn from_source_label(label: &str) -> Option<Sex> {
        match label.trim() {
            "Ambos" => Some(Sex::Both),
            "Homens" => Some(Sex::Male),
            "Mulheres" => Some(Sex::Female),
            _ => None,
        }
    }

    /// Token this sex contributes to the canonical join key.
    pub fn key_token(self) -> &'static str {
        match self {
            Sex::Both => "total",
            Sex::Male => "masculina",
            Sex::Female => "feminina",
        }
    }
}

/// Inclusive range of projection years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct YearRange {
    pub first: u16,
    pub last: u16,
}

impl YearRange {
    pub fn new(first: u16, last: u16) -> Self {
        YearRange { first, last }
    }

    pub fn iter(self) -> std::ops::RangeInclusive<u16> {
        self.first..=self.last
    }

    pub fn contains(self, year: u16) -> bool {
        self.first <= year && year <= self.last
    }
}

impl Default for YearRange {
    fn default() -> Self {
        YearRange::new(2000, 2070)
    }
}

/// Where a projection row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    /// Read directly from the projection sheet.
    Source,
    /// Synthesized by the aggregator.
    Derived,
}

/// One projection row: a region / age-group / sex combination with one
/// population count per loaded year column.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionRow {
    /// Fixed-format region identifier, e.g. `GO`.
    pub region: String,
    /// Free-text age-group label as the sheet carries it, e.g. `00-04`,
    /// `90 ou mais`. Never rewritten; normalization happens at key time.
    pub age_group: String,
    pub sex: Sex,
    pub origin: RowOrigin,
    /// Counts aligned to the loaded year list, ascending.
    pub values: Vec<f64>,
}

/// One catalogue entry tying a free-text variable label to its code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableEntry {
    pub code: u32,
    pub label: String,
}

/// A projection row joined to its variable code.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    pub code: u32,
    pub row: ProjectionRow,
}
