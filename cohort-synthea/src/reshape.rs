//! Long lab table to wide samples.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use cohort_core::{sample_id, LabPanel, LabRecord, Sample, SpecimenEvent};

/// Measurement type per lab code, taken from the first row that reports one.
pub fn measurement_types(labs: &[LabRecord]) -> BTreeMap<String, String> {
    let mut types = BTreeMap::new();
    for record in labs {
        let Some(kind) = record.kind.as_deref().filter(|kind| !kind.is_empty()) else {
            continue;
        };
        types
            .entry(record.code.clone())
            .or_insert_with(|| kind.to_string());
    }
    types
}

/// Collapse consecutive rows sharing (patient, day) into one sample each.
///
/// Samples are numbered in the order they close. A (patient, day) pair that
/// reappears after a different pair starts a new sample.
pub fn reshape_samples(labs: &[LabRecord], panel: &LabPanel) -> Vec<Sample> {
    let mut samples: Vec<Sample> = Vec::new();

    let open = labs.iter().fold(None::<Sample>, |open, record| {
        let mut sample = match open {
            Some(sample) if sample.patient_id == record.patient_id && sample.day == record.day => {
                sample
            }
            Some(finished) => {
                samples.push(finished);
                Sample::new(&record.patient_id, record.day, samples.len())
            }
            None => Sample::new(&record.patient_id, record.day, samples.len()),
        };
        if let Some(name) = panel.name_of(&record.code) {
            sample.values.insert(name.to_string(), record.value);
        }
        Some(sample)
    });

    samples.extend(open);
    samples
}

/// One specimen event per distinct (patient, day), numbered by first
/// appearance.
pub fn specimen_events(labs: &[LabRecord]) -> Vec<SpecimenEvent> {
    let mut seen: HashSet<(&str, i64)> = HashSet::new();
    labs.iter()
        .filter(|record| seen.insert((record.patient_id.as_str(), record.day)))
        .enumerate()
        .map(|(index, record)| SpecimenEvent {
            patient_id: record.patient_id.clone(),
            start_day: record.day,
            sample_id: sample_id(index),
        })
        .collect()
}

/// Drop specimen events whose id has no matching sample.
pub fn retain_known_samples(specimens: &mut Vec<SpecimenEvent>, samples: &[Sample]) {
    let known: BTreeSet<&str> = samples
        .iter()
        .map(|sample| sample.sample_id.as_str())
        .collect();
    specimens.retain(|event| known.contains(event.sample_id.as_str()));
}
