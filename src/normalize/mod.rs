//! Field normalisation: [`RawRecord`] → [`NormalizedRecord`] plus issues.
//!
//! The grammar lives in [`rules`] as an ordered table; this module only
//! drives it. Normalisation is pure and a fixed point: feeding a normalised
//! record back through (via `RawRecord::from(&normalized)`) reproduces it.
//!
//! Issues never stop processing. A value that fails its format pattern is
//! kept as extracted and the mismatch is reported next to it.

pub mod rules;

use crate::record::{Issue, NormalizedRecord, RawRecord};
use rules::RULES;

pub use rules::{normalize_voter_id, squash};

/// Normalise one record.
pub fn normalize(raw: &RawRecord) -> (NormalizedRecord, Vec<Issue>) {
    let record_id = raw.id.trim();
    let mut record = NormalizedRecord {
        house_number_raw: raw.house_number.clone(),
        ..Default::default()
    };
    let mut issues = Vec::new();

    for rule in RULES {
        let (value, messages) = rule.apply(raw);
        issues.extend(
            messages
                .into_iter()
                .map(|m| Issue::new(record_id, rule.field, m)),
        );
        record.set(rule.field, value);
    }

    (record, issues)
}

/// Normalise a whole run's records, collecting every issue in record order.
pub fn normalize_all(raws: &[RawRecord]) -> (Vec<NormalizedRecord>, Vec<Issue>) {
    let mut records = Vec::with_capacity(raws.len());
    let mut issues = Vec::new();
    for raw in raws {
        let (record, mut found) = normalize(raw);
        records.push(record);
        issues.append(&mut found);
    }
    (records, issues)
}
