//! Patient set derivation and inpatient sampling.

use std::collections::BTreeSet;

use cohort_core::{CohortError, CohortReport, DomainCodes};
use rand::seq::index;
use rand::Rng;
use tracing::info;

use crate::load::SyntheaTables;

/// Patient id sets derived from the raw tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CohortSelection {
    pub covid_positive: BTreeSet<String>,
    pub negative_test: BTreeSet<String>,
    pub deceased: BTreeSet<String>,
    pub completed_isolation: BTreeSet<String>,
    /// Union of completed isolation and negative test.
    pub survivors: BTreeSet<String>,
    pub inpatients: BTreeSet<String>,
    pub sampled: BTreeSet<String>,
}

impl CohortSelection {
    pub fn is_survivor(&self, patient_id: &str) -> bool {
        self.survivors.contains(patient_id)
    }

    pub fn is_sampled(&self, patient_id: &str) -> bool {
        self.sampled.contains(patient_id)
    }

    pub fn report(&self) -> CohortReport {
        CohortReport {
            covid_positive: self.covid_positive.len(),
            negative_test: self.negative_test.len(),
            deceased: self.deceased.len(),
            completed_isolation: self.completed_isolation.len(),
            survivors: self.survivors.len(),
            inpatients: self.inpatients.len(),
            sampled: self.sampled.len(),
            sampled_survivors: self.sampled.intersection(&self.survivors).count(),
            sampled_deceased: self.sampled.intersection(&self.deceased).count(),
        }
    }
}

/// Derive every patient set and draw `sample_size` inpatients.
pub fn select_cohort<R: Rng + ?Sized>(
    tables: &SyntheaTables,
    codes: &DomainCodes,
    sample_size: usize,
    rng: &mut R,
) -> Result<CohortSelection, CohortError> {
    let covid_positive = covid_positive(tables, codes);
    let negative_test = negative_test(tables, codes);
    let deceased = deceased(tables);
    let completed_isolation = completed_isolation(tables, codes);
    let survivors = survivors(&completed_isolation, &negative_test);
    let inpatients = inpatients(tables, codes);
    let sampled = sample_inpatients(&inpatients, sample_size, rng)?;

    let selection = CohortSelection {
        covid_positive,
        negative_test,
        deceased,
        completed_isolation,
        survivors,
        inpatients,
        sampled,
    };

    let report = selection.report();
    info!(
        covid_positive = report.covid_positive,
        survivors = report.survivors,
        inpatients = report.inpatients,
        sampled = report.sampled,
        sampled_survivors = report.sampled_survivors,
        sampled_deceased = report.sampled_deceased,
        "cohort selected"
    );
    Ok(selection)
}

/// Patients with a COVID-19 diagnosis.
pub fn covid_positive(tables: &SyntheaTables, codes: &DomainCodes) -> BTreeSet<String> {
    tables
        .conditions
        .iter()
        .filter(|condition| condition.code == codes.covid_condition)
        .map(|condition| condition.patient_id.clone())
        .collect()
}

/// Patients with a negative SARS-CoV-2 test.
pub fn negative_test(tables: &SyntheaTables, codes: &DomainCodes) -> BTreeSet<String> {
    tables
        .observations
        .iter()
        .filter(|obs| {
            obs.code == codes.sars_cov2_test
                && obs.value.as_deref() == Some(codes.negative_test_value.as_str())
        })
        .map(|obs| obs.patient_id.clone())
        .collect()
}

/// Patients with a recorded death date.
pub fn deceased(tables: &SyntheaTables) -> BTreeSet<String> {
    tables
        .patients
        .iter()
        .filter(|patient| !patient.survived())
        .map(|patient| patient.id.clone())
        .collect()
}

/// Patients who finished a COVID-19 home isolation care plan.
pub fn completed_isolation(tables: &SyntheaTables, codes: &DomainCodes) -> BTreeSet<String> {
    tables
        .care_plans
        .iter()
        .filter(|plan| {
            plan.code == codes.home_isolation_plan
                && plan.stop.is_some()
                && plan.reason_code.as_deref() == Some(codes.covid_condition.as_str())
        })
        .map(|plan| plan.patient_id.clone())
        .collect()
}

/// Union of completed isolation and negative test.
pub fn survivors(
    completed_isolation: &BTreeSet<String>,
    negative_test: &BTreeSet<String>,
) -> BTreeSet<String> {
    completed_isolation.union(negative_test).cloned().collect()
}

/// Patients admitted to hospital for COVID-19.
pub fn inpatients(tables: &SyntheaTables, codes: &DomainCodes) -> BTreeSet<String> {
    tables
        .encounters
        .iter()
        .filter(|encounter| {
            encounter.code == codes.inpatient_admission
                && encounter.reason_code.as_deref() == Some(codes.covid_condition.as_str())
        })
        .map(|encounter| encounter.patient_id.clone())
        .collect()
}

/// Uniform sample without replacement. The population is iterated in sorted
/// order so a fixed seed always yields the same cohort.
pub fn sample_inpatients<R: Rng + ?Sized>(
    inpatients: &BTreeSet<String>,
    sample_size: usize,
    rng: &mut R,
) -> Result<BTreeSet<String>, CohortError> {
    if sample_size > inpatients.len() {
        return Err(CohortError::InsufficientPopulation {
            requested: sample_size,
            available: inpatients.len(),
        });
    }

    let population: Vec<&String> = inpatients.iter().collect();
    Ok(index::sample(rng, population.len(), sample_size)
        .into_iter()
        .map(|idx| population[idx].clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn tables() -> SyntheaTables {
        SyntheaTables {
            patients: vec![
                patient("a", None),
                patient("b", Some("2020-04-02")),
                patient("c", None),
                patient("d", None),
            ],
            conditions: vec![
                condition("a", COVID, "2020-03-01"),
                condition("b", COVID, "2020-03-02"),
                condition("c", "444814009", "2020-03-03"),
            ],
            observations: vec![
                observation(
                    "c",
                    "94531-1",
                    "2020-03-04T00:00:00Z",
                    "Not detected (qualifier value)",
                ),
                observation("a", "94531-1", "2020-03-01T00:00:00Z", "Detected (qualifier value)"),
                observation(
                    "d",
                    "94531-1",
                    "2020-03-04T00:00:00Z",
                    "Not detected (qualifier value)",
                ),
            ],
            care_plans: vec![
                care_plan("a", "736376001", Some("2020-03-20"), Some(COVID)),
                care_plan("b", "736376001", None, Some(COVID)),
                care_plan("d", "736376001", Some("2020-03-20"), Some(COVID)),
            ],
            encounters: vec![
                encounter("a", "1505002", Some(COVID)),
                encounter("a", "1505002", Some(COVID)),
                encounter("b", "1505002", Some(COVID)),
                encounter("c", "1505002", None),
                encounter("d", "185345009", Some(COVID)),
            ],
            medications: Vec::new(),
        }
    }

    #[test]
    fn derives_patient_sets() {
        let tables = tables();
        let codes = DomainCodes::default();

        assert_eq!(covid_positive(&tables, &codes), ids(&["a", "b"]));
        assert_eq!(negative_test(&tables, &codes), ids(&["c", "d"]));
        assert_eq!(deceased(&tables), ids(&["b"]));
        assert_eq!(completed_isolation(&tables, &codes), ids(&["a", "d"]));
        assert_eq!(inpatients(&tables, &codes), ids(&["a", "b"]));
    }

    #[test]
    fn survivors_are_union_without_duplicates() {
        let tables = tables();
        let codes = DomainCodes::default();
        let isolation = completed_isolation(&tables, &codes);
        let negative = negative_test(&tables, &codes);

        let union = survivors(&isolation, &negative);
        assert_eq!(union, ids(&["a", "c", "d"]));
        assert_eq!(union, survivors(&negative, &isolation));
    }

    #[test]
    fn oversized_sample_fails() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let err = select_cohort(&tables(), &DomainCodes::default(), 3, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            CohortError::InsufficientPopulation {
                requested: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let population: BTreeSet<String> = (0..50).map(|i| format!("p{i:02}")).collect();

        let first =
            sample_inpatients(&population, 10, &mut ChaCha20Rng::seed_from_u64(42)).unwrap();
        let second =
            sample_inpatients(&population, 10, &mut ChaCha20Rng::seed_from_u64(42)).unwrap();

        assert_eq!(first.len(), 10);
        assert_eq!(first, second);
        assert!(first.is_subset(&population));
    }

    #[test]
    fn report_counts_sampled_outcomes() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let selection = select_cohort(&tables(), &DomainCodes::default(), 2, &mut rng).unwrap();
        let report = selection.report();

        assert_eq!(report.sampled, 2);
        assert_eq!(report.sampled_survivors, 1);
        assert_eq!(report.sampled_deceased, 1);
        assert!(selection.is_survivor("a"));
        assert!(selection.is_sampled("b"));
    }
}
