//! Row builders shared by unit tests.

use std::collections::BTreeSet;

use cohort_core::{CarePlan, Condition, Encounter, MedicationCourse, Observation, Patient};

use crate::load::parse_timestamp;

pub const COVID: &str = "840539006";

pub fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn patient(id: &str, deathdate: Option<&str>) -> Patient {
    Patient {
        id: id.to_string(),
        gender: Some("F".to_string()),
        birthdate: parse_timestamp("1960-06-15").map(|dt| dt.date_naive()),
        deathdate: deathdate.and_then(parse_timestamp).map(|dt| dt.date_naive()),
    }
}

pub fn condition(patient_id: &str, code: &str, onset: &str) -> Condition {
    Condition {
        patient_id: patient_id.to_string(),
        code: code.to_string(),
        onset: parse_timestamp(onset).unwrap(),
    }
}

pub fn observation(patient_id: &str, code: &str, at: &str, value: &str) -> Observation {
    Observation {
        patient_id: patient_id.to_string(),
        encounter_id: None,
        code: code.to_string(),
        description: None,
        recorded_at: parse_timestamp(at).unwrap(),
        value: Some(value.to_string()),
        unit: None,
        kind: Some("numeric".to_string()),
    }
}

pub fn care_plan(
    patient_id: &str,
    code: &str,
    stop: Option<&str>,
    reason: Option<&str>,
) -> CarePlan {
    CarePlan {
        patient_id: patient_id.to_string(),
        code: code.to_string(),
        stop: stop.and_then(parse_timestamp).map(|dt| dt.date_naive()),
        reason_code: reason.map(str::to_string),
    }
}

pub fn encounter(patient_id: &str, code: &str, reason: Option<&str>) -> Encounter {
    Encounter {
        id: format!("enc-{patient_id}-{code}"),
        patient_id: patient_id.to_string(),
        start: parse_timestamp("2020-03-05T08:00:00Z").unwrap(),
        stop: None,
        code: code.to_string(),
        reason_code: reason.map(str::to_string),
    }
}

pub fn medication(
    patient_id: &str,
    description: &str,
    start: &str,
    stop: Option<&str>,
) -> MedicationCourse {
    MedicationCourse {
        patient_id: patient_id.to_string(),
        description: description.to_string(),
        start: parse_timestamp(start).unwrap(),
        stop: stop.and_then(parse_timestamp),
    }
}
