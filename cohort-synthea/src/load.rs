//! Synthea CSV export loading.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use cohort_core::{
    CarePlan, CohortError, Condition, Encounter, MedicationCourse, Observation, Patient,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

pub const PATIENTS_FILE: &str = "patients.csv";
pub const CONDITIONS_FILE: &str = "conditions.csv";
pub const OBSERVATIONS_FILE: &str = "observations.csv";
pub const CARE_PLANS_FILE: &str = "careplans.csv";
pub const ENCOUNTERS_FILE: &str = "encounters.csv";
pub const MEDICATIONS_FILE: &str = "medications.csv";

/// The raw tables the cohort pipeline consumes, fully loaded in memory.
#[derive(Debug, Clone, Default)]
pub struct SyntheaTables {
    pub patients: Vec<Patient>,
    pub conditions: Vec<Condition>,
    pub observations: Vec<Observation>,
    pub care_plans: Vec<CarePlan>,
    pub encounters: Vec<Encounter>,
    pub medications: Vec<MedicationCourse>,
}

impl SyntheaTables {
    /// Load every table from a Synthea CSV export directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, CohortError> {
        let dir = dir.as_ref();
        let tables = Self {
            patients: load_table::<PatientRow, _>(dir, PATIENTS_FILE)?,
            conditions: load_table::<ConditionRow, _>(dir, CONDITIONS_FILE)?,
            observations: load_table::<ObservationRow, _>(dir, OBSERVATIONS_FILE)?,
            care_plans: load_table::<CarePlanRow, _>(dir, CARE_PLANS_FILE)?,
            encounters: load_table::<EncounterRow, _>(dir, ENCOUNTERS_FILE)?,
            medications: load_table::<MedicationRow, _>(dir, MEDICATIONS_FILE)?,
        };

        info!(
            patients = tables.patients.len(),
            conditions = tables.conditions.len(),
            observations = tables.observations.len(),
            care_plans = tables.care_plans.len(),
            encounters = tables.encounters.len(),
            medications = tables.medications.len(),
            "loaded synthea tables from {}",
            dir.display()
        );
        Ok(tables)
    }
}

/// Conversion from a raw CSV row into a model type.
trait FromRow: DeserializeOwned {
    type Output;

    fn convert(self) -> Result<Self::Output, String>;
}

fn load_table<R, T>(dir: &Path, file: &str) -> Result<Vec<T>, CohortError>
where
    R: FromRow<Output = T>,
{
    let path = dir.join(file);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(&path)
        .map_err(|err| csv_error(&path, err))?;

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<R>().enumerate() {
        // Line 1 is the header.
        let line = index + 2;
        let raw = record.map_err(|err| csv_error(&path, err))?;
        let row = raw.convert().map_err(|reason| {
            CohortError::DataIntegrity(format!("{} line {line}: {reason}", path.display()))
        })?;
        rows.push(row);
    }

    debug!(rows = rows.len(), "read {}", path.display());
    Ok(rows)
}

fn csv_error(path: &Path, err: csv::Error) -> CohortError {
    if err.is_io_error() {
        if let csv::ErrorKind::Io(source) = err.into_kind() {
            return CohortError::io(path, source);
        }
        return CohortError::DataIntegrity(format!("{}: unreadable", path.display()));
    }
    CohortError::DataIntegrity(format!("{}: {err}", path.display()))
}

#[derive(Debug, Deserialize)]
struct PatientRow {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "BIRTHDATE")]
    birthdate: Option<String>,
    #[serde(rename = "DEATHDATE")]
    deathdate: Option<String>,
    #[serde(rename = "GENDER")]
    gender: Option<String>,
}

impl FromRow for PatientRow {
    type Output = Patient;

    fn convert(self) -> Result<Patient, String> {
        Ok(Patient {
            id: self.id,
            gender: self.gender,
            birthdate: optional_date(self.birthdate.as_deref(), "BIRTHDATE")?,
            deathdate: optional_date(self.deathdate.as_deref(), "DEATHDATE")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ConditionRow {
    #[serde(rename = "START")]
    start: String,
    #[serde(rename = "PATIENT")]
    patient: String,
    #[serde(rename = "CODE")]
    code: String,
}

impl FromRow for ConditionRow {
    type Output = Condition;

    fn convert(self) -> Result<Condition, String> {
        Ok(Condition {
            onset: required_timestamp(&self.start, "START")?,
            patient_id: self.patient,
            code: self.code,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ObservationRow {
    #[serde(rename = "DATE")]
    date: String,
    #[serde(rename = "PATIENT")]
    patient: String,
    #[serde(rename = "ENCOUNTER")]
    encounter: Option<String>,
    #[serde(rename = "CODE")]
    code: String,
    #[serde(rename = "DESCRIPTION")]
    description: Option<String>,
    #[serde(rename = "VALUE")]
    value: Option<String>,
    #[serde(rename = "UNITS")]
    units: Option<String>,
    #[serde(rename = "TYPE")]
    kind: Option<String>,
}

impl FromRow for ObservationRow {
    type Output = Observation;

    fn convert(self) -> Result<Observation, String> {
        Ok(Observation {
            recorded_at: required_timestamp(&self.date, "DATE")?,
            patient_id: self.patient,
            encounter_id: self.encounter,
            code: self.code,
            description: self.description,
            value: self.value,
            unit: self.units,
            kind: self.kind,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CarePlanRow {
    #[serde(rename = "STOP")]
    stop: Option<String>,
    #[serde(rename = "PATIENT")]
    patient: String,
    #[serde(rename = "CODE")]
    code: String,
    #[serde(rename = "REASONCODE")]
    reason_code: Option<String>,
}

impl FromRow for CarePlanRow {
    type Output = CarePlan;

    fn convert(self) -> Result<CarePlan, String> {
        Ok(CarePlan {
            stop: optional_date(self.stop.as_deref(), "STOP")?,
            patient_id: self.patient,
            code: self.code,
            reason_code: self.reason_code,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EncounterRow {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "START")]
    start: String,
    #[serde(rename = "STOP")]
    stop: Option<String>,
    #[serde(rename = "PATIENT")]
    patient: String,
    #[serde(rename = "CODE")]
    code: String,
    #[serde(rename = "REASONCODE")]
    reason_code: Option<String>,
}

impl FromRow for EncounterRow {
    type Output = Encounter;

    fn convert(self) -> Result<Encounter, String> {
        Ok(Encounter {
            start: required_timestamp(&self.start, "START")?,
            stop: optional_timestamp(self.stop.as_deref(), "STOP")?,
            id: self.id,
            patient_id: self.patient,
            code: self.code,
            reason_code: self.reason_code,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MedicationRow {
    #[serde(rename = "START")]
    start: String,
    #[serde(rename = "STOP")]
    stop: Option<String>,
    #[serde(rename = "PATIENT")]
    patient: String,
    #[serde(rename = "DESCRIPTION")]
    description: String,
}

impl FromRow for MedicationRow {
    type Output = MedicationCourse;

    fn convert(self) -> Result<MedicationCourse, String> {
        Ok(MedicationCourse {
            start: required_timestamp(&self.start, "START")?,
            stop: optional_timestamp(self.stop.as_deref(), "STOP")?,
            patient_id: self.patient,
            description: self.description,
        })
    }
}

fn required_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(value).ok_or_else(|| format!("invalid {column} timestamp {value:?}"))
}

fn optional_timestamp(value: Option<&str>, column: &str) -> Result<Option<DateTime<Utc>>, String> {
    match value.filter(|text| !text.is_empty()) {
        Some(text) => required_timestamp(text, column).map(Some),
        None => Ok(None),
    }
}

fn optional_date(value: Option<&str>, column: &str) -> Result<Option<NaiveDate>, String> {
    match value.filter(|text| !text.is_empty()) {
        Some(text) => parse_timestamp(text)
            .map(|dt| Some(dt.date_naive()))
            .ok_or_else(|| format!("invalid {column} date {text:?}")),
        None => Ok(None),
    }
}

/// Parse the timestamp shapes found in Synthea exports. Bare dates resolve to
/// midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
