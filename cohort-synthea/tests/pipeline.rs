use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::PathBuf;

use cohort_core::{CohortConfig, CohortError};
use cohort_synthea::{build_dataset, export_dataset, run, ExportOptions, SyntheaTables};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR")))
}

fn tables() -> SyntheaTables {
    SyntheaTables::load(fixture_path("synthea")).expect("fixture tables should load")
}

fn config(sample_size: usize, seed: u64) -> CohortConfig {
    CohortConfig {
        sample_size,
        seed: Some(seed),
        ..CohortConfig::default()
    }
}

#[test]
fn samples_file_matches_golden() {
    let out = tempfile::tempdir().unwrap();
    let options = ExportOptions {
        plot: true,
        long_table: true,
    };

    let (_, written) = run(&fixture_path("synthea"), out.path(), &config(3, 11), options)
        .expect("pipeline should succeed");

    let names: Vec<String> = written
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        [
            "covid_3_patients.txt",
            "covid_3_samples.txt",
            "covid_3_timeline_samples.txt",
            "covid_3_timeline_med.txt",
            "covid_3_all.txt",
            "covid_3_labs.svg",
        ]
    );

    let actual = fs::read_to_string(out.path().join("covid_3_samples.txt")).unwrap();
    let expected = fs::read_to_string(fixture_path("expected/covid_3_samples.txt")).unwrap();
    assert_eq!(actual, expected);

    let patients = fs::read_to_string(out.path().join("covid_3_patients.txt")).unwrap();
    let rows: Vec<&str> = patients.lines().skip(5).collect();
    assert_eq!(rows, ["p1\tM\t70\tFalse", "p2\tF\t34\tTrue", "p3\tM\t48\tTrue"]);

    let meds = fs::read_to_string(out.path().join("covid_3_timeline_med.txt")).unwrap();
    let rows: Vec<&str> = meds.lines().skip(5).collect();
    assert_eq!(
        rows,
        [
            "p1\t0\t1\tMEDICATION\tHeparin sodium porcine 100 UNT/ML Injectable Solution",
            "p1\t0\t1\tMEDICATION\tAcetaminophen 325 MG Oral Tablet",
            "p2\t0\t4\tMEDICATION\tRemdesivir 100 MG Injection",
        ]
    );

    let svg = fs::read_to_string(out.path().join("covid_3_labs.svg")).unwrap();
    assert!(svg.contains("D-dimer"));
    assert!(svg.contains("body temperature"));
}

#[test]
fn cohort_sets_follow_code_criteria() {
    let dataset = build_dataset(&tables(), &config(3, 5)).unwrap();
    let report = dataset.report;

    assert_eq!(report.covid_positive, 4);
    assert_eq!(report.negative_test, 2);
    assert_eq!(report.deceased, 1);
    assert_eq!(report.completed_isolation, 2);
    // p2, p5 tested negative; p3, p4 finished isolation.
    assert_eq!(report.survivors, 4);
    assert_eq!(report.inpatients, 3);
    assert_eq!(report.sampled, 3);
    assert_eq!(report.sampled_survivors, 2);
    assert_eq!(report.sampled_deceased, 1);
}

#[test]
fn exported_tables_keep_timelines_consistent() {
    let dataset = build_dataset(&tables(), &config(3, 5)).unwrap();

    assert!(dataset.labs.iter().all(|record| record.day >= 0));

    let distinct: HashSet<(&str, i64)> = dataset
        .labs
        .iter()
        .map(|record| (record.patient_id.as_str(), record.day))
        .collect();
    assert_eq!(dataset.samples.len(), distinct.len());

    let sample_ids: HashSet<&str> = dataset
        .samples
        .iter()
        .map(|sample| sample.sample_id.as_str())
        .collect();
    assert!(dataset
        .specimens
        .iter()
        .all(|event| sample_ids.contains(event.sample_id.as_str())));

    assert!(dataset
        .medications
        .iter()
        .all(|event| event.start_day <= event.stop_day));

    // p3 has no tracked labs, so no admission window and no medications.
    assert!(dataset.medications.iter().all(|event| event.patient_id != "p3"));
    assert!(dataset.samples.iter().all(|sample| sample.patient_id != "p3"));
}

#[test]
fn same_seed_draws_same_cohort() {
    let tables = tables();
    let draw = |seed| -> BTreeSet<String> {
        build_dataset(&tables, &config(2, seed))
            .unwrap()
            .patients
            .into_iter()
            .map(|patient| patient.patient_id)
            .collect()
    };

    for seed in [1, 7, 2024] {
        assert_eq!(draw(seed), draw(seed));
    }
}

#[test]
fn oversized_sample_is_rejected() {
    let err = build_dataset(&tables(), &config(4, 1)).unwrap_err();
    assert!(matches!(
        err,
        CohortError::InsufficientPopulation {
            requested: 4,
            available: 3
        }
    ));
}

#[test]
fn export_requires_existing_directory() {
    let dataset = build_dataset(&tables(), &config(3, 1)).unwrap();
    let out = tempfile::tempdir().unwrap();
    let missing = out.path().join("absent");
    let err = export_dataset(
        &dataset,
        &CohortConfig::default().labs,
        3,
        &missing,
        ExportOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CohortError::Io { .. }));
}
