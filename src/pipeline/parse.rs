//! Response parsing: vision-model text → `Vec<RawRecord>`.
//!
//! Models are asked for a bare JSON array but do not always comply. Each
//! quirk gets one small, independently tested step:
//!
//! 1. strip invisible characters that break `serde_json`
//! 2. strip an outer ```` ```json ```` fence
//! 3. parse the whole text, or failing that the outermost `[...]` / `{...}`
//! 4. accept a bare array or a `{"records": [...]}` wrapper
//! 5. drop entries that carry no text at all
//!
//! Anything that still is not a record list is
//! [`RecognitionError::MalformedResponse`].

use crate::error::RecognitionError;
use crate::record::{Field, RawRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Keys under which models wrap the array when they return an object.
const WRAPPER_KEYS: &[&str] = &["records", "voters", "data", "items"];

/// Parse one page's response text.
///
/// An empty array is a valid answer (a blank or cover page).
pub fn parse_records(text: &str) -> Result<Vec<RawRecord>, RecognitionError> {
    let cleaned = remove_invisible_chars(text);
    let body = strip_fences(cleaned.trim());

    let value = parse_lenient(body).ok_or_else(|| {
        RecognitionError::MalformedResponse(format!("no JSON found in: {}", preview(body)))
    })?;

    let items = record_array(value).ok_or_else(|| {
        RecognitionError::MalformedResponse(format!("no record list in: {}", preview(body)))
    })?;

    let total = items.len();
    let records: Vec<RawRecord> = items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value::<RawRecord>(item).ok())
        .filter(|r| Field::ALL.iter().any(|f| !r.get(*f).trim().is_empty()))
        .collect();

    if records.len() != total {
        debug!(kept = records.len(), total, "Dropped unusable entries from response");
    }
    Ok(records)
}

// BOM, zero-width space, soft hyphen, word joiner. ZWJ/ZWNJ are kept: they
// shape Devanagari conjuncts inside names.
fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{FEFF}', '\u{200B}', '\u{00AD}', '\u{2060}'], "")
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_fences(input: &str) -> &str {
    RE_OUTER_FENCES
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map_or(input, |m| m.as_str())
}

fn parse_lenient(body: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        return Some(v);
    }
    [('[', ']'), ('{', '}')].iter().find_map(|&(open, close)| {
        let start = body.find(open)?;
        let end = body.rfind(close)?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<Value>(&body[start..=end]).ok()
    })
}

fn record_array(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => WRAPPER_KEYS.iter().find_map(|k| match map.remove(*k) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        }),
        _ => None,
    }
}

fn preview(s: &str) -> String {
    let mut out: String = s.chars().take(80).collect();
    if s.chars().count() > 80 {
        out.push('…');
    }
    out
}
