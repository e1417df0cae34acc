//! Source tables and the derived cohort dataset.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A row of the patients table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: String,
    pub gender: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub deathdate: Option<NaiveDate>,
}

impl Patient {
    /// Patients without a recorded death are flagged as surviving.
    pub fn survived(&self) -> bool {
        self.deathdate.is_none()
    }
}

/// A diagnosis with its onset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub patient_id: String,
    pub code: String,
    pub onset: DateTime<Utc>,
}

/// A lab result, vital sign or test result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub patient_id: String,
    /// Visit the observation was recorded in. Not used for cohort selection.
    pub encounter_id: Option<String>,
    pub code: String,
    pub description: Option<String>,
    pub recorded_at: DateTime<Utc>,
    /// Raw value as recorded; numeric or qualitative.
    pub value: Option<String>,
    pub unit: Option<String>,
    /// Measurement type (`numeric`, `text`).
    pub kind: Option<String>,
}

/// A visit. Only the type and reason codes decide inpatient status; the id
/// and start/stop are kept for inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Encounter {
    pub id: String,
    pub patient_id: String,
    pub start: DateTime<Utc>,
    pub stop: Option<DateTime<Utc>>,
    /// Encounter type code.
    pub code: String,
    pub reason_code: Option<String>,
}

/// A care plan; a stop date marks it completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarePlan {
    pub patient_id: String,
    pub code: String,
    pub stop: Option<NaiveDate>,
    pub reason_code: Option<String>,
}

/// A prescribed medication. An open course has no stop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationCourse {
    pub patient_id: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub stop: Option<DateTime<Utc>>,
}

/// One tracked lab observation anchored to the patient's COVID-19 onset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabRecord {
    pub patient_id: String,
    pub survivor: bool,
    pub onset: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub code: String,
    pub description: Option<String>,
    /// Value coerced to a number; qualitative values become `None`.
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub kind: Option<String>,
    /// Whole days since onset, never negative.
    pub day: i64,
}

/// Wide record holding every tracked lab value for one (patient, day).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub sample_id: String,
    pub patient_id: String,
    pub day: i64,
    /// Keyed by lab display name. A `None` entry means the lab was reported
    /// with a non-numeric value.
    pub values: BTreeMap<String, Option<f64>>,
}

impl Sample {
    pub fn new(patient_id: &str, day: i64, index: usize) -> Self {
        Self {
            sample_id: sample_id(index),
            patient_id: patient_id.to_string(),
            day,
            values: BTreeMap::new(),
        }
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }
}

/// Synthetic identifier shared by samples and specimen events.
pub fn sample_id(index: usize) -> String {
    format!("sample_{index}")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Specimen,
    Medication,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Specimen => "SPECIMEN",
            EventType::Medication => "MEDICATION",
        }
    }
}

/// Timeline marker for a lab sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecimenEvent {
    pub patient_id: String,
    pub start_day: i64,
    pub sample_id: String,
}

/// Timeline span for a medication course during the admission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MedicationEvent {
    pub patient_id: String,
    pub start_day: i64,
    pub stop_day: i64,
    pub medication: String,
}

/// Exported per-patient attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientSummary {
    pub patient_id: String,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub survive: bool,
}

/// Column type tags understood by the visualisation tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    String,
    Number,
}

impl ColumnType {
    /// Map an observation measurement type to a column type. Unknown or empty
    /// types are treated as numeric.
    pub fn from_measurement(kind: Option<&str>) -> Self {
        match kind.map(str::trim) {
            None | Some("") | Some("numeric") => ColumnType::Number,
            Some(_) => ColumnType::String,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            ColumnType::String => "STRING",
            ColumnType::Number => "NUMBER",
        }
    }
}

/// Sizes of the intermediate patient sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CohortReport {
    pub covid_positive: usize,
    pub negative_test: usize,
    pub deceased: usize,
    pub completed_isolation: usize,
    pub survivors: usize,
    pub inpatients: usize,
    pub sampled: usize,
    pub sampled_survivors: usize,
    pub sampled_deceased: usize,
}

/// Everything the exporter writes for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohortDataset {
    pub report: CohortReport,
    pub patients: Vec<PatientSummary>,
    pub labs: Vec<LabRecord>,
    /// Lab code to measurement type, taken from the first row carrying one.
    pub lab_types: BTreeMap<String, String>,
    pub samples: Vec<Sample>,
    pub specimens: Vec<SpecimenEvent>,
    pub medications: Vec<MedicationEvent>,
}

impl CohortDataset {
    pub fn lab_type(&self, code: &str) -> Option<&str> {
        self.lab_types.get(code).map(String::as_str)
    }
}
