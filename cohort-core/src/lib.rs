//! Core types for building a COVID-19 inpatient cohort from EHR tables.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

mod model;

pub use model::{
    CarePlan, CohortDataset, CohortReport, ColumnType, Condition, Encounter, EventType, LabRecord,
    MedicationCourse, MedicationEvent, Observation, Patient, PatientSummary, Sample,
    SpecimenEvent, sample_id,
};

/// Default number of inpatients drawn into the cohort.
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Length of a year used for age computation, in days.
const DAYS_PER_YEAR: f64 = 365.2425;

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CohortConfig {
    /// Number of inpatients sampled without replacement.
    pub sample_size: usize,
    /// Date at which patient ages are computed.
    pub reference_date: NaiveDate,
    /// RNG seed for cohort sampling. `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub codes: DomainCodes,
    pub labs: LabPanel,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            reference_date: default_reference_date(),
            seed: None,
            codes: DomainCodes::default(),
            labs: LabPanel::default(),
        }
    }
}

impl CohortConfig {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CohortError> {
        if self.sample_size == 0 {
            return Err(CohortError::Configuration(
                "sample size must be at least 1".to_string(),
            ));
        }
        if self.labs.is_empty() {
            return Err(CohortError::Configuration(
                "lab panel must contain at least one code".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 10, 10).unwrap_or_default()
}

/// Clinical codes that identify the cohort in the Synthea COVID-19 module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DomainCodes {
    /// SNOMED CT "COVID-19" condition code. Also the reason code on admissions
    /// and isolation care plans.
    pub covid_condition: String,
    /// LOINC SARS-CoV-2 RNA qualitative test.
    pub sars_cov2_test: String,
    /// Observation value reported for a negative SARS-CoV-2 test.
    pub negative_test_value: String,
    /// SNOMED CT "Infectious disease care plan" used for home isolation.
    pub home_isolation_plan: String,
    /// SNOMED CT "Hospital admission" encounter code.
    pub inpatient_admission: String,
}

impl Default for DomainCodes {
    fn default() -> Self {
        Self {
            covid_condition: "840539006".to_string(),
            sars_cov2_test: "94531-1".to_string(),
            negative_test_value: "Not detected (qualifier value)".to_string(),
            home_isolation_plan: "736376001".to_string(),
            inpatient_admission: "1505002".to_string(),
        }
    }
}

/// A tracked lab code and the column name it is exported under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabCode {
    pub code: String,
    pub name: String,
}

impl LabCode {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

/// Ordered allow-list of lab codes kept on the timeline.
///
/// Order matters: it fixes the column order of the exported sample table and
/// the facet order of the diagnostic plot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LabPanel(Vec<LabCode>);

impl Default for LabPanel {
    fn default() -> Self {
        Self(
            DEFAULT_LABS
                .iter()
                .map(|(code, name)| LabCode::new(code, name))
                .collect(),
        )
    }
}

impl LabPanel {
    pub fn new(labs: Vec<LabCode>) -> Self {
        Self(labs)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.iter().any(|lab| lab.code == code)
    }

    /// Display name for a lab code, if it is tracked.
    pub fn name_of(&self, code: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|lab| lab.code == code)
            .map(|lab| lab.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabCode> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|lab| lab.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

const DEFAULT_LABS: [(&str, &str); 11] = [
    ("48065-7", "D-dimer"),
    ("2276-4", "Serum Ferritin"),
    ("89579-7", "High Sensitivity Cardiac Troponin I"),
    ("14804-9", "Lactate dehydrogenase"),
    ("9279-1", "Respiratory rate"),
    ("38483-4", "Creatinine"),
    ("26464-8", "white blood cell"),
    ("1988-5", "C reactive protein"),
    ("42719-5", "Total Bilirubin"),
    ("8867-4", "heart rate"),
    ("8310-5", "body temperature"),
];

/// Whole days elapsed from `anchor` to `at`, rounded towards negative infinity.
pub fn day_offset(anchor: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    at.signed_duration_since(anchor)
        .num_seconds()
        .div_euclid(86_400)
}

/// Age in whole years at `reference`, or `None` for a birthdate after it.
pub fn age_at(birthdate: NaiveDate, reference: NaiveDate) -> Option<i64> {
    let days = reference.signed_duration_since(birthdate).num_days();
    if days < 0 {
        return None;
    }
    Some((days as f64 / DAYS_PER_YEAR).floor() as i64)
}

/// Errors raised while building or exporting a cohort.
#[derive(Debug, thiserror::Error)]
pub enum CohortError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("cannot sample {requested} patients from {available} inpatients")]
    InsufficientPopulation { requested: usize, available: usize },
    #[error("data integrity: {0}")]
    DataIntegrity(String),
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CohortError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
