//! Canonical join keys.
//!
//! The projection sheet and the variable catalogue describe the same
//! age-band/sex combinations with labels that never agree textually. Both
//! sides reduce to an `age-token|sex-token` string here so the mapper can
//! join on plain equality. The projection side is a fixed rewrite; the
//! catalogue side is pattern matching over human-authored text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Sex;

/// Separator between the age token and the sex token.
pub const KEY_SEPARATOR: char = '|';

/// Sentinel age token for catalogue labels no rule recognizes. Projection
/// keys never produce it, so such entries can never join.
pub const UNKNOWN_AGE_TOKEN: &str = "desconhecido";

/// Explicit age-band phrases, checked top-to-bottom against the lowercased
/// label. Order is load-bearing: quinquennial phrases sit above the
/// composite bands they are substrings of, and everything here sits above
/// the generic range fallback. A new catalogue label format needs its rule
/// inserted at the right position, not appended.
const AGE_BAND_RULES: &[(&[&str], &str)] = &[
    (&["0 a 4 anos", "0-4", "0 a 4"], "0-4"),
    (&["5 a 9 anos", "5-9", "5 a 9"], "5-9"),
    (&["10 a 14 anos", "10-14", "10 a 14"], "10-14"),
    (&["0 a 14 anos"], "0-14"),
    (&["15 a 29 anos"], "15-29"),
    (&["30 a 64 anos"], "30-64"),
    (&["65 anos ou mais"], "65+"),
    (&["90 anos ou mais", "90+"], "90+"),
];

/// Fallback for quinquennial phrases the explicit table does not list,
/// e.g. "população de 25 a 29 anos" → `25-29`.
static AGE_SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s?a\s?(\d{1,2})\sanos").unwrap());

/// Canonical key for a projection row.
///
/// Lowercases and trims the age label, drops internal spaces, rewrites a
/// leading zero-padded `00-` to `0-`, and collapses the spelled-out open
/// bands ("90 ou mais", "65 ou mais") to `90+`/`65+`.
pub fn projection_key(age_group: &str, sex: Sex) -> String {
    let mut age = age_group.trim().to_lowercase();
    age.retain(|c| c != ' ');
    if let Some(rest) = age.strip_prefix("00-") {
        age = format!("0-{}", rest);
    }
    let age = age.replace("90oumais", "90+").replace("65oumais", "65+");
    format!("{}{}{}", age, KEY_SEPARATOR, sex.key_token())
}

/// Split a catalogue label into its (age token, sex token) pair.
///
/// The sex facet is a case-sensitive check on the raw label: "Feminina" and
/// "Masculina" name the facet, while the lowercase words only participate in
/// the total-row disambiguation below.
pub fn catalogue_tokens(label: &str) -> (String, String) {
    let mut sex = if label.contains("Feminina") {
        "feminina"
    } else if label.contains("Masculina") {
        "masculina"
    } else {
        "total"
    };

    let lower = label.to_lowercase();

    for (patterns, token) in AGE_BAND_RULES {
        if patterns.iter().any(|p| lower.contains(p)) {
            return ((*token).to_string(), sex.to_string());
        }
    }

    if lower.contains("total") {
        // Total rows tend to spell the sex out in words rather than carry
        // the facet marker, e.g. "Mulheres - Total da População Feminina".
        if lower.contains("mulheres") && lower.contains("feminina") {
            sex = "feminina";
        } else if lower.contains("homens") || lower.contains("masculina") {
            sex = "masculina";
        }
        return ("total".to_string(), sex.to_string());
    }

    if let Some(caps) = AGE_SPAN_RE.captures(&lower) {
        return (format!("{}-{}", &caps[1], &caps[2]), sex.to_string());
    }

    (UNKNOWN_AGE_TOKEN.to_string(), sex.to_string())
}

/// Canonical key for a catalogue label.
pub fn catalogue_key(label: &str) -> String {
    let (age, sex) = catalogue_tokens(label);
    format!("{}{}{}", age, KEY_SEPARATOR, sex)
}
