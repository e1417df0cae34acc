//! Alignment of lab observations and medication courses to patient timelines.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use cohort_core::{
    day_offset, CohortConfig, Condition, LabRecord, MedicationCourse, MedicationEvent,
    Observation,
};
use tracing::debug;

use crate::cohort::CohortSelection;

/// Inpatient stay bounds, approximated by the first and last tracked lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AdmissionWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// COVID-19 onset per sampled patient, in order of each patient's first
/// diagnosis record. Repeated diagnoses keep the earliest onset.
pub fn covid_onsets(
    conditions: &[Condition],
    selection: &CohortSelection,
    covid_code: &str,
) -> Vec<(String, DateTime<Utc>)> {
    let mut order: Vec<(String, DateTime<Utc>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for condition in conditions {
        if condition.code != covid_code || !selection.is_sampled(&condition.patient_id) {
            continue;
        }
        match positions.get(condition.patient_id.as_str()) {
            Some(&idx) => {
                if condition.onset < order[idx].1 {
                    order[idx].1 = condition.onset;
                }
            }
            None => {
                positions.insert(condition.patient_id.as_str(), order.len());
                order.push((condition.patient_id.clone(), condition.onset));
            }
        }
    }

    order
}

/// Build the long lab table: tracked observations of sampled patients with
/// day offsets from COVID-19 onset. Rows before onset are dropped. Rows are
/// grouped by patient and ordered by timestamp within each patient.
pub fn align_labs(
    observations: &[Observation],
    conditions: &[Condition],
    selection: &CohortSelection,
    config: &CohortConfig,
) -> Vec<LabRecord> {
    let mut by_patient: HashMap<&str, Vec<&Observation>> = HashMap::new();
    for obs in observations {
        if config.labs.contains(&obs.code) && selection.is_sampled(&obs.patient_id) {
            by_patient.entry(obs.patient_id.as_str()).or_default().push(obs);
        }
    }

    let mut records = Vec::new();
    for (patient_id, onset) in covid_onsets(conditions, selection, &config.codes.covid_condition) {
        let Some(mut rows) = by_patient.remove(patient_id.as_str()) else {
            continue;
        };
        rows.sort_by_key(|obs| obs.recorded_at);

        let survivor = selection.is_survivor(&patient_id);
        let before = records.len();
        records.extend(rows.into_iter().filter_map(|obs| {
            let day = day_offset(onset, obs.recorded_at);
            if day < 0 {
                return None;
            }
            Some(LabRecord {
                patient_id: patient_id.clone(),
                survivor,
                onset,
                recorded_at: obs.recorded_at,
                code: obs.code.clone(),
                description: obs.description.clone(),
                value: coerce_numeric(obs.value.as_deref()),
                unit: obs.unit.clone(),
                kind: obs.kind.clone(),
                day,
            })
        }));
        debug!(patient = %patient_id, rows = records.len() - before, "aligned labs");
    }

    records
}

/// Numeric view of an observation value; qualitative values are missing.
pub fn coerce_numeric(value: Option<&str>) -> Option<f64> {
    value?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

/// Admission window per patient from the extrema of their lab timestamps.
pub fn admission_windows(labs: &[LabRecord]) -> BTreeMap<String, AdmissionWindow> {
    let mut windows: BTreeMap<String, AdmissionWindow> = BTreeMap::new();
    for record in labs {
        windows
            .entry(record.patient_id.clone())
            .and_modify(|window| {
                window.start = window.start.min(record.recorded_at);
                window.end = window.end.max(record.recorded_at);
            })
            .or_insert(AdmissionWindow {
                start: record.recorded_at,
                end: record.recorded_at,
            });
    }
    windows
}

/// Medication courses started during the admission window, as day offsets
/// from the window start. A course never ends before the window does; a
/// missing stop date is read as the window end.
pub fn align_medications(
    medications: &[MedicationCourse],
    selection: &CohortSelection,
    windows: &BTreeMap<String, AdmissionWindow>,
) -> Vec<MedicationEvent> {
    medications
        .iter()
        .filter(|course| selection.is_sampled(&course.patient_id))
        .filter_map(|course| {
            let window = windows.get(&course.patient_id)?;
            if !window.contains(course.start) {
                return None;
            }
            let stop = course.stop.unwrap_or(window.end).max(window.end);
            Some(MedicationEvent {
                patient_id: course.patient_id.clone(),
                start_day: day_offset(window.start, course.start),
                stop_day: day_offset(window.start, stop),
                medication: course.description.clone(),
            })
        })
        .collect()
}
