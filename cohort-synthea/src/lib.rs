//! Synthea CSV export to COVID-19 inpatient cohort tables.
//!
//! The pipeline runs in four stages: cohort selection, timeline alignment,
//! sample reshaping and export.

use std::path::{Path, PathBuf};

use cohort_core::{age_at, CohortConfig, CohortDataset, CohortError, Patient, PatientSummary};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{info, warn};

pub mod align;
pub mod cohort;
pub mod export;
pub mod load;
pub mod plot;
pub mod reshape;

#[cfg(test)]
mod testing;

pub use cohort::{select_cohort, CohortSelection};
pub use export::{export_dataset, ExportOptions};
pub use load::SyntheaTables;

/// Build the cohort dataset with an RNG seeded from `config.seed`.
pub fn build_dataset(
    tables: &SyntheaTables,
    config: &CohortConfig,
) -> Result<CohortDataset, CohortError> {
    let mut rng = match config.seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed),
        None => ChaCha20Rng::from_entropy(),
    };
    build_dataset_with_rng(tables, config, &mut rng)
}

/// Build the cohort dataset, drawing the inpatient sample from `rng`.
pub fn build_dataset_with_rng<R: Rng + ?Sized>(
    tables: &SyntheaTables,
    config: &CohortConfig,
    rng: &mut R,
) -> Result<CohortDataset, CohortError> {
    config.validate()?;

    let selection = select_cohort(tables, &config.codes, config.sample_size, rng)?;

    let labs = align::align_labs(&tables.observations, &tables.conditions, &selection, config);
    if labs.is_empty() {
        return Err(CohortError::DataIntegrity(
            "no tracked lab observations after COVID-19 onset for the sampled cohort".to_string(),
        ));
    }

    let windows = align::admission_windows(&labs);
    let medications = align::align_medications(&tables.medications, &selection, &windows);

    let lab_types = reshape::measurement_types(&labs);
    let samples = reshape::reshape_samples(&labs, &config.labs);
    let mut specimens = reshape::specimen_events(&labs);
    let distinct = specimens.len();
    reshape::retain_known_samples(&mut specimens, &samples);
    if specimens.len() != distinct {
        warn!(
            dropped = distinct - specimens.len(),
            "specimen events without a matching sample"
        );
    }

    let patients = summarize_patients(&tables.patients, &selection, config);

    info!(
        labs = labs.len(),
        samples = samples.len(),
        specimens = specimens.len(),
        medications = medications.len(),
        "dataset assembled"
    );

    Ok(CohortDataset {
        report: selection.report(),
        patients,
        labs,
        lab_types,
        samples,
        specimens,
        medications,
    })
}

/// Sampled patients in source table order.
pub fn summarize_patients(
    patients: &[Patient],
    selection: &CohortSelection,
    config: &CohortConfig,
) -> Vec<PatientSummary> {
    patients
        .iter()
        .filter(|patient| selection.is_sampled(&patient.id))
        .map(|patient| PatientSummary {
            patient_id: patient.id.clone(),
            gender: patient.gender.clone(),
            age: patient
                .birthdate
                .and_then(|birth| age_at(birth, config.reference_date)),
            survive: patient.survived(),
        })
        .collect()
}

/// Load, build and export in one go. Returns the dataset and written paths.
pub fn run(
    input_dir: &Path,
    output_dir: &Path,
    config: &CohortConfig,
    options: ExportOptions,
) -> Result<(CohortDataset, Vec<PathBuf>), CohortError> {
    let tables = SyntheaTables::load(input_dir)?;
    let dataset = build_dataset(&tables, config)?;
    let written = export_dataset(
        &dataset,
        &config.labs,
        config.sample_size,
        output_dir,
        options,
    )?;
    Ok((dataset, written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn patient_summaries_follow_table_order() {
        let patients = vec![
            patient("z", None),
            patient("a", Some("2020-04-01")),
            patient("m", None),
        ];
        let selection = CohortSelection {
            sampled: ids(&["a", "z"]),
            ..CohortSelection::default()
        };

        let summaries = summarize_patients(&patients, &selection, &CohortConfig::default());
        let rows: Vec<(&str, bool)> = summaries
            .iter()
            .map(|s| (s.patient_id.as_str(), s.survive))
            .collect();
        assert_eq!(rows, [("z", true), ("a", false)]);
        // Born 1960-06-15, aged at 2020-10-10.
        assert_eq!(summaries[0].age, Some(60));
    }

    #[test]
    fn empty_lab_table_is_a_data_integrity_error() {
        let tables = SyntheaTables {
            patients: vec![patient("a", None)],
            conditions: vec![condition("a", COVID, "2020-03-01")],
            encounters: vec![encounter("a", "1505002", Some(COVID))],
            ..SyntheaTables::default()
        };
        let config = CohortConfig {
            sample_size: 1,
            seed: Some(3),
            ..CohortConfig::default()
        };

        let err = build_dataset(&tables, &config).unwrap_err();
        assert!(matches!(err, CohortError::DataIntegrity(_)));
    }

    #[test]
    fn invalid_config_is_rejected_before_sampling() {
        let config = CohortConfig {
            sample_size: 0,
            ..CohortConfig::default()
        };
        let err = build_dataset(&SyntheaTables::default(), &config).unwrap_err();
        assert!(matches!(err, CohortError::Configuration(_)));
    }
}
