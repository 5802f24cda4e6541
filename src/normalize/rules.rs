//! The field grammar: one [`FieldRule`] per record field.
//!
//! A rule pairs an extraction function with an optional format pattern and
//! the issue text used when the extracted value does not match it. Rules
//! are independent of each other's *output*; the two cross-field rules
//! (`acPartInfo`, `wardPartName`) read other fields from the raw record, so
//! the table can be evaluated in any order.
//!
//! Digit classes: `[0-9]` where only ASCII digits are meaningful (constituency
//! and section numbers, dates), Unicode `\d` where the roll may print
//! script-native digits (house numbers, AC/Part/Serial, ward part numbers).

use crate::record::{Field, RawRecord};
use once_cell::sync::Lazy;
use regex::Regex;

/// Result of running a rule's extraction function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub value: String,
    /// Set when extraction itself failed; the value is then usually empty.
    pub issue: Option<&'static str>,
}

impl Extraction {
    fn ok(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            issue: None,
        }
    }

    fn failed(value: impl Into<String>, issue: &'static str) -> Self {
        Self {
            value: value.into(),
            issue: Some(issue),
        }
    }
}

/// One row of the normalisation table.
pub struct FieldRule {
    pub field: Field,
    pub extract: fn(&RawRecord) -> Extraction,
    /// Format a non-empty value must satisfy. The value is kept either way.
    pub pattern: Option<&'static Lazy<Regex>>,
    /// Issue text recorded when `pattern` does not match.
    pub invalid: &'static str,
}

impl FieldRule {
    /// Run extraction and validation; returns the value and any issue texts.
    pub fn apply(&self, raw: &RawRecord) -> (String, Vec<&'static str>) {
        let Extraction { value, issue } = (self.extract)(raw);
        let mut issues: Vec<&'static str> = issue.into_iter().collect();
        if let Some(pattern) = self.pattern {
            if !value.is_empty() && !pattern.is_match(&value) {
                issues.push(self.invalid);
            }
        }
        (value, issues)
    }
}

// ── Issue texts ──────────────────────────────────────────────────────────────

pub const HOUSE_NOT_EXTRACTED: &str = "not extracted (no colon)";
pub const HOUSE_EMPTY_AFTER_DELIMITER: &str = "empty after delimiter";
pub const HOUSE_BAD_CHARS: &str = "contains unexpected characters";
pub const AC_PART_NOT_FOUND: &str = "no AC/Part/SNo pattern found.";
pub const FAILED_VALIDATION: &str = "failed validation";
pub const WARD_PART_NO_INVALID: &str = "failed validation (expected 'n : n')";
pub const WARD_PART_NAME_MISSING: &str = "missing.";

// ── Patterns ─────────────────────────────────────────────────────────────────

/// Printed labels for "house number" on Marathi / Hindi / English rolls.
/// Longer spellings come first so alternation prefers them.
const HOUSE_LABEL: &str =
    r"घर\s*क्रमांक|घर\s*क्र\.?|मकान\s*(?:क्रमांक|संख्या|नंबर|नं\.?)|house\s*(?:number|no\.?)";

static RE_ASCII_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

static RE_HYPHEN_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*").unwrap());

static RE_ALL_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

static RE_HOUSE_LABELLED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?is)(?:{HOUSE_LABEL})\s*[:：]\s*(.*)$")).unwrap()
});

static RE_HOUSE_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?is)(?:{HOUSE_LABEL})\s*(.*)$")).unwrap());

static RE_FIRST_COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)[:：](.*)$").unwrap());

/// Latin letters, any decimal digit, hyphen variants, underscore, slash, space.
pub static RE_HOUSE_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9\d\-\x{2010}-\x{2015}\x{2212}_/ ]+$").unwrap()
});

static RE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{2}-[0-9]{2}-[0-9]{4}").unwrap());

static RE_AC_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+/\d+/\d+").unwrap());

pub static RE_AC_PART_EXACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+/\d+/\d+$").unwrap());

pub static RE_WARD_PART_NO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+ : \d+$").unwrap());

// ── The table ────────────────────────────────────────────────────────────────

pub static RULES: &[FieldRule] = &[
    FieldRule { field: Field::Id, extract: id, pattern: None, invalid: "" },
    FieldRule { field: Field::VoterId, extract: voter_id, pattern: None, invalid: "" },
    FieldRule { field: Field::Name, extract: name, pattern: None, invalid: "" },
    FieldRule {
        field: Field::FatherOrHusbandName,
        extract: father_or_husband_name,
        pattern: None,
        invalid: "",
    },
    FieldRule { field: Field::Gender, extract: gender, pattern: None, invalid: "" },
    FieldRule { field: Field::Age, extract: age, pattern: None, invalid: "" },
    FieldRule {
        field: Field::AssemblyConstituencyNumber,
        extract: constituency_number,
        pattern: None,
        invalid: "",
    },
    FieldRule {
        field: Field::AssemblyConstituencyName,
        extract: constituency_name,
        pattern: None,
        invalid: "",
    },
    FieldRule { field: Field::SectionNumber, extract: section_number, pattern: None, invalid: "" },
    FieldRule {
        field: Field::HouseNumber,
        extract: house_number,
        pattern: Some(&RE_HOUSE_VALUE),
        invalid: HOUSE_BAD_CHARS,
    },
    FieldRule { field: Field::AgeAsOn, extract: age_as_on, pattern: None, invalid: "" },
    FieldRule {
        field: Field::PublicationDate,
        extract: publication_date,
        pattern: None,
        invalid: "",
    },
    FieldRule {
        field: Field::AcPartInfo,
        extract: ac_part_info,
        pattern: Some(&RE_AC_PART_EXACT),
        invalid: FAILED_VALIDATION,
    },
    FieldRule {
        field: Field::WardPartNo,
        extract: ward_part_no,
        pattern: Some(&RE_WARD_PART_NO),
        invalid: WARD_PART_NO_INVALID,
    },
    FieldRule {
        field: Field::WardPartName,
        extract: ward_part_name,
        pattern: None,
        invalid: "",
    },
];

// ── Extraction functions ─────────────────────────────────────────────────────

/// Trim and collapse internal whitespace runs to one space.
pub fn squash(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uppercase, then keep only `[A-Z0-9]`.
pub fn normalize_voter_id(s: &str) -> String {
    s.to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

fn first_ascii_digit_run(s: &str) -> String {
    RE_ASCII_DIGITS
        .find(s)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn first_date(s: &str) -> String {
    RE_DATE
        .find(s)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn id(r: &RawRecord) -> Extraction {
    Extraction::ok(r.id.trim())
}

fn voter_id(r: &RawRecord) -> Extraction {
    Extraction::ok(normalize_voter_id(&r.voter_id))
}

fn name(r: &RawRecord) -> Extraction {
    Extraction::ok(squash(&r.name))
}

fn father_or_husband_name(r: &RawRecord) -> Extraction {
    Extraction::ok(squash(&r.father_or_husband_name))
}

fn gender(r: &RawRecord) -> Extraction {
    Extraction::ok(squash(&r.gender))
}

fn age(r: &RawRecord) -> Extraction {
    Extraction::ok(squash(&r.age))
}

fn constituency_number(r: &RawRecord) -> Extraction {
    Extraction::ok(first_ascii_digit_run(&r.assembly_constituency_number))
}

/// "172 - Nagpur South" → "Nagpur South". Leading numeric segments are the
/// constituency code; everything after them is the name, re-joined with `-`.
///
/// Only numeric segments are dropped. Splitting any hyphenated value and
/// keeping the tail would turn "Nagpur-South" into "South", so normalising
/// "172 - Nagpur - South" twice would lose "Nagpur". Keeping non-numeric
/// heads makes the rule idempotent.
fn constituency_name(r: &RawRecord) -> Extraction {
    let s = squash(&r.assembly_constituency_name);
    let parts: Vec<&str> = RE_HYPHEN_SPLIT.split(&s).collect();
    let mut start = 0;
    while parts.len() - start >= 2 && RE_ALL_DIGITS.is_match(parts[start]) {
        start += 1;
    }
    if start == 0 {
        return Extraction::ok(s);
    }
    Extraction::ok(parts[start..].join("-").trim())
}

fn section_number(r: &RawRecord) -> Extraction {
    Extraction::ok(first_ascii_digit_run(&r.section_number))
}

/// Labelled-with-delimiter, then first colon, then bare label.
fn house_number(r: &RawRecord) -> Extraction {
    let raw = r.house_number.as_str();
    let remainder = RE_HOUSE_LABELLED
        .captures(raw)
        .or_else(|| RE_FIRST_COLON.captures(raw))
        .or_else(|| RE_HOUSE_BARE.captures(raw))
        .map(|c| c[1].trim().to_string());

    match remainder {
        None => Extraction::failed("", HOUSE_NOT_EXTRACTED),
        Some(v) if v.is_empty() => Extraction::failed("", HOUSE_EMPTY_AFTER_DELIMITER),
        Some(v) => Extraction::ok(v),
    }
}

fn age_as_on(r: &RawRecord) -> Extraction {
    Extraction::ok(first_date(&r.age_as_on))
}

fn publication_date(r: &RawRecord) -> Extraction {
    Extraction::ok(first_date(&r.publication_date))
}

/// Use the supplied AC/Part/Serial triple when it contains one; otherwise
/// look for a triple in the other text fields; otherwise keep what was
/// supplied so validation can flag it.
fn ac_part_info(r: &RawRecord) -> Extraction {
    let supplied = squash(&r.ac_part_info);
    if let Some(m) = RE_AC_PART.find(&supplied) {
        return Extraction::ok(m.as_str());
    }

    let haystack = [
        r.assembly_constituency_number.as_str(),
        r.assembly_constituency_name.as_str(),
        r.section_number.as_str(),
        r.house_number.as_str(),
        r.age_as_on.as_str(),
        r.publication_date.as_str(),
        r.id.as_str(),
        r.name.as_str(),
        r.father_or_husband_name.as_str(),
    ]
    .join(" ");

    if let Some(m) = RE_AC_PART.find(&haystack) {
        return Extraction::ok(m.as_str());
    }
    if supplied.is_empty() {
        Extraction::failed("", AC_PART_NOT_FOUND)
    } else {
        Extraction::ok(supplied)
    }
}

fn ward_part_no(r: &RawRecord) -> Extraction {
    Extraction::ok(r.ward_part_no.trim())
}

fn ward_part_name(r: &RawRecord) -> Extraction {
    let value = squash(&r.ward_part_name);
    if value.is_empty() && !r.ward_part_no.trim().is_empty() {
        Extraction::failed(value, WARD_PART_NAME_MISSING)
    } else {
        Extraction::ok(value)
    }
}
