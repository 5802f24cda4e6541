//! Final de-duplication of the normalised record set.
//!
//! The strong key is the normalised voter id (EPIC). With the default
//! [`DedupPolicy::StrongKeyOnly`] a record with an empty strong key is always
//! kept, even when it is otherwise identical to another one; the live
//! preview in [`crate::aggregate`] is deliberately looser than this.

use crate::config::DedupPolicy;
use crate::normalize::{normalize_voter_id, squash};
use crate::record::{NormalizedRecord, RawRecord};
use std::collections::HashSet;
use tracing::debug;

/// Strong de-duplication key: uppercase alphanumeric voter id.
pub fn strong_key(voter_id: &str) -> String {
    normalize_voter_id(voter_id)
}

/// Weak key used when no voter id was read: `name|parent|age|gender`.
pub fn composite_key(name: &str, parent: &str, age: &str, gender: &str) -> String {
    format!(
        "{}|{}|{}|{}",
        squash(name),
        squash(parent),
        squash(age),
        squash(gender)
    )
}

/// Key for the live preview: strong key when present, composite otherwise.
pub fn preview_key(r: &RawRecord) -> String {
    let strong = strong_key(&r.voter_id);
    if strong.is_empty() {
        composite_key(&r.name, &r.father_or_husband_name, &r.age, &r.gender)
    } else {
        strong
    }
}

/// Keep the first record per strong key, in input order.
pub fn dedupe(records: Vec<NormalizedRecord>) -> Vec<NormalizedRecord> {
    dedupe_with(records, DedupPolicy::StrongKeyOnly)
}

/// [`dedupe`] with an explicit policy for records lacking a voter id.
pub fn dedupe_with(records: Vec<NormalizedRecord>, policy: DedupPolicy) -> Vec<NormalizedRecord> {
    let before = records.len();
    let mut seen_strong: HashSet<String> = HashSet::new();
    let mut seen_composite: HashSet<String> = HashSet::new();

    let kept: Vec<NormalizedRecord> = records
        .into_iter()
        .filter(|r| {
            let key = strong_key(&r.voter_id);
            if !key.is_empty() {
                return seen_strong.insert(key);
            }
            match policy {
                DedupPolicy::StrongKeyOnly => true,
                DedupPolicy::CompositeFallback => seen_composite.insert(composite_key(
                    &r.name,
                    &r.father_or_husband_name,
                    &r.age,
                    &r.gender,
                )),
            }
        })
        .collect();

    debug!(
        before,
        after = kept.len(),
        policy = ?policy,
        "Final de-duplication"
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(voter_id: &str, name: &str) -> NormalizedRecord {
        NormalizedRecord {
            voter_id: normalize_voter_id(voter_id),
            name: name.into(),
            age: "40".into(),
            gender: "M".into(),
            ..Default::default()
        }
    }

    #[test]
    fn first_record_per_voter_id_wins() {
        let out = dedupe(vec![
            rec("ABC123", "first"),
            rec("XYZ999", "other"),
            rec("ABC123", "second"),
        ]);
        let names: Vec<&str> = out.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "other"]);
    }

    #[test]
    fn differently_formatted_ids_collapse() {
        let a = NormalizedRecord {
            voter_id: "abc 123".into(),
            name: "page one".into(),
            ..Default::default()
        };
        let b = NormalizedRecord {
            voter_id: "ABC-123".into(),
            name: "page two".into(),
            ..Default::default()
        };
        let out = dedupe(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "page one");
    }

    #[test]
    fn empty_voter_ids_are_all_kept() {
        let out = dedupe(vec![rec("", "same"), rec("", "same"), rec("--", "same")]);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn composite_fallback_merges_identical_empty_key_records() {
        let out = dedupe_with(
            vec![rec("", "same"), rec("", "same"), rec("", "different")],
            DedupPolicy::CompositeFallback,
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn preview_key_prefers_voter_id() {
        let r = RawRecord {
            voter_id: "abc-1".into(),
            name: "N".into(),
            ..Default::default()
        };
        assert_eq!(preview_key(&r), "ABC1");

        let r = RawRecord {
            name: " Asha  Rao ".into(),
            father_or_husband_name: "Vijay".into(),
            age: "31".into(),
            gender: "F".into(),
            ..Default::default()
        };
        assert_eq!(preview_key(&r), "Asha Rao|Vijay|31|F");
    }
}
