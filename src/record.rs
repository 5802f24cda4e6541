//! Record types: what the recognition backend returns and what the
//! normaliser produces.
//!
//! [`RawRecord`] is untrusted backend output: every field is free text and
//! may be empty, mislabelled, or carry stray prefixes. [`NormalizedRecord`]
//! has the same shape with each field rewritten by the rule table in
//! [`crate::normalize`], plus the untouched house-number text for audit.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One person as read off a page by the recognition backend.
///
/// Deserialisation is lenient: keys may be camelCase or snake_case, and
/// numbers, booleans or `null` are coerced to strings (vision models do not
/// reliably quote ages and serial numbers).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(default, deserialize_with = "lenient_string", alias = "serial", alias = "serialNo")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "voter_id", alias = "epic", alias = "epicNo")]
    pub voter_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        alias = "father_or_husband_name",
        alias = "relativeName"
    )]
    pub father_or_husband_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gender: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub age: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "assembly_constituency_number")]
    pub assembly_constituency_number: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "assembly_constituency_name")]
    pub assembly_constituency_name: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "section_number")]
    pub section_number: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "house_number")]
    pub house_number: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "age_as_on")]
    pub age_as_on: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "publication_date")]
    pub publication_date: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "ac_part_info")]
    pub ac_part_info: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "ward_part_no")]
    pub ward_part_no: String,
    #[serde(default, deserialize_with = "lenient_string", alias = "ward_part_name")]
    pub ward_part_name: String,
}

/// A [`RawRecord`] after field normalisation.
///
/// Immutable once built: the normaliser is the only producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub id: String,
    pub voter_id: String,
    pub name: String,
    pub father_or_husband_name: String,
    pub gender: String,
    pub age: String,
    pub assembly_constituency_number: String,
    pub assembly_constituency_name: String,
    pub section_number: String,
    pub house_number: String,
    /// House-number text exactly as recognised, before label stripping.
    pub house_number_raw: String,
    pub age_as_on: String,
    pub publication_date: String,
    pub ac_part_info: String,
    pub ward_part_no: String,
    pub ward_part_name: String,
}

impl NormalizedRecord {
    pub(crate) fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Id => &mut self.id,
            Field::VoterId => &mut self.voter_id,
            Field::Name => &mut self.name,
            Field::FatherOrHusbandName => &mut self.father_or_husband_name,
            Field::Gender => &mut self.gender,
            Field::Age => &mut self.age,
            Field::AssemblyConstituencyNumber => &mut self.assembly_constituency_number,
            Field::AssemblyConstituencyName => &mut self.assembly_constituency_name,
            Field::SectionNumber => &mut self.section_number,
            Field::HouseNumber => &mut self.house_number,
            Field::AgeAsOn => &mut self.age_as_on,
            Field::PublicationDate => &mut self.publication_date,
            Field::AcPartInfo => &mut self.ac_part_info,
            Field::WardPartNo => &mut self.ward_part_no,
            Field::WardPartName => &mut self.ward_part_name,
        };
        *slot = value;
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Id => &self.id,
            Field::VoterId => &self.voter_id,
            Field::Name => &self.name,
            Field::FatherOrHusbandName => &self.father_or_husband_name,
            Field::Gender => &self.gender,
            Field::Age => &self.age,
            Field::AssemblyConstituencyNumber => &self.assembly_constituency_number,
            Field::AssemblyConstituencyName => &self.assembly_constituency_name,
            Field::SectionNumber => &self.section_number,
            Field::HouseNumber => &self.house_number,
            Field::AgeAsOn => &self.age_as_on,
            Field::PublicationDate => &self.publication_date,
            Field::AcPartInfo => &self.ac_part_info,
            Field::WardPartNo => &self.ward_part_no,
            Field::WardPartName => &self.ward_part_name,
        }
    }
}

/// Turning a normalised record back into raw input feeds the preserved
/// house-number text, not the extracted value, so that normalising twice
/// yields the same record.
impl From<&NormalizedRecord> for RawRecord {
    fn from(r: &NormalizedRecord) -> Self {
        RawRecord {
            id: r.id.clone(),
            voter_id: r.voter_id.clone(),
            name: r.name.clone(),
            father_or_husband_name: r.father_or_husband_name.clone(),
            gender: r.gender.clone(),
            age: r.age.clone(),
            assembly_constituency_number: r.assembly_constituency_number.clone(),
            assembly_constituency_name: r.assembly_constituency_name.clone(),
            section_number: r.section_number.clone(),
            house_number: r.house_number_raw.clone(),
            age_as_on: r.age_as_on.clone(),
            publication_date: r.publication_date.clone(),
            ac_part_info: r.ac_part_info.clone(),
            ward_part_no: r.ward_part_no.clone(),
            ward_part_name: r.ward_part_name.clone(),
        }
    }
}

impl RawRecord {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Id => &self.id,
            Field::VoterId => &self.voter_id,
            Field::Name => &self.name,
            Field::FatherOrHusbandName => &self.father_or_husband_name,
            Field::Gender => &self.gender,
            Field::Age => &self.age,
            Field::AssemblyConstituencyNumber => &self.assembly_constituency_number,
            Field::AssemblyConstituencyName => &self.assembly_constituency_name,
            Field::SectionNumber => &self.section_number,
            Field::HouseNumber => &self.house_number,
            Field::AgeAsOn => &self.age_as_on,
            Field::PublicationDate => &self.publication_date,
            Field::AcPartInfo => &self.ac_part_info,
            Field::WardPartNo => &self.ward_part_no,
            Field::WardPartName => &self.ward_part_name,
        }
    }
}

/// Record fields, named as they appear in exports and issue messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Id,
    VoterId,
    Name,
    FatherOrHusbandName,
    Gender,
    Age,
    AssemblyConstituencyNumber,
    AssemblyConstituencyName,
    SectionNumber,
    HouseNumber,
    AgeAsOn,
    PublicationDate,
    AcPartInfo,
    WardPartNo,
    WardPartName,
}

impl Field {
    /// Every field, in record order.
    pub const ALL: [Field; 15] = [
        Field::Id,
        Field::VoterId,
        Field::Name,
        Field::FatherOrHusbandName,
        Field::Gender,
        Field::Age,
        Field::AssemblyConstituencyNumber,
        Field::AssemblyConstituencyName,
        Field::SectionNumber,
        Field::HouseNumber,
        Field::AgeAsOn,
        Field::PublicationDate,
        Field::AcPartInfo,
        Field::WardPartNo,
        Field::WardPartName,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::VoterId => "voterId",
            Field::Name => "name",
            Field::FatherOrHusbandName => "fatherOrHusbandName",
            Field::Gender => "gender",
            Field::Age => "age",
            Field::AssemblyConstituencyNumber => "assemblyConstituencyNumber",
            Field::AssemblyConstituencyName => "assemblyConstituencyName",
            Field::SectionNumber => "sectionNumber",
            Field::HouseNumber => "houseNumber",
            Field::AgeAsOn => "ageAsOn",
            Field::PublicationDate => "publicationDate",
            Field::AcPartInfo => "acPartInfo",
            Field::WardPartNo => "wardPartNo",
            Field::WardPartName => "wardPartName",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal diagnostic attached to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Local sequence number of the record (its `id` field).
    pub record_id: String,
    pub field: Field,
    pub message: String,
}

impl Issue {
    pub fn new(record_id: impl Into<String>, field: Field, message: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}: {} {}", self.record_id, self.field, self.message)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}
