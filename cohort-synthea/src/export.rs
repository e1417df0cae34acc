//! Tab-separated export in the annotated header format read by the
//! visualisation tool.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use cohort_core::{CohortDataset, CohortError, ColumnType, EventType, LabPanel};
use tracing::info;

use crate::plot;

/// Rendered in place of a missing value.
pub const MISSING: &str = " ";

/// Optional outputs on top of the four cohort tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Render the lab boxplot SVG.
    pub plot: bool,
    /// Write the long lab table as well.
    pub long_table: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            plot: true,
            long_table: false,
        }
    }
}

/// `covid_{sample_size}_{suffix}`
pub fn output_file_name(sample_size: usize, suffix: &str) -> String {
    format!("covid_{sample_size}_{suffix}")
}

/// Write every table of `dataset` into `dir`, which must already exist.
/// Returns the written paths in write order.
pub fn export_dataset(
    dataset: &CohortDataset,
    panel: &LabPanel,
    sample_size: usize,
    dir: &Path,
    options: ExportOptions,
) -> Result<Vec<PathBuf>, CohortError> {
    if !dir.is_dir() {
        return Err(CohortError::io(
            dir,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "output directory does not exist",
            ),
        ));
    }

    let path_for = |suffix: &str| dir.join(output_file_name(sample_size, suffix));
    let mut written = Vec::new();

    let path = path_for("patients.txt");
    write_patients(dataset, &path)?;
    written.push(path);

    let path = path_for("samples.txt");
    write_samples(dataset, panel, &path)?;
    written.push(path);

    let path = path_for("timeline_samples.txt");
    write_specimens(dataset, &path)?;
    written.push(path);

    let path = path_for("timeline_med.txt");
    write_medications(dataset, &path)?;
    written.push(path);

    if options.long_table {
        let path = path_for("all.txt");
        write_long_labs(dataset, &path)?;
        written.push(path);
    }

    if options.plot {
        let path = path_for("labs.svg");
        let svg = plot::render_lab_boxplots(&dataset.labs, panel);
        std::fs::write(&path, svg).map_err(|err| CohortError::io(&path, err))?;
        written.push(path);
    }

    for path in &written {
        info!("wrote {}", path.display());
    }
    Ok(written)
}

/// The four `#` lines preceding each table: display names twice, column
/// types, then an attribute priority of 1 for every column.
pub fn header_block(display_names: &[&str], types: &[ColumnType]) -> String {
    let names = display_names.join("\t");
    let tags: Vec<&str> = types.iter().map(|kind| kind.tag()).collect();
    let priorities = vec!["1"; display_names.len()];

    format!(
        "#{names}\n#{names}\n#{}\n#{}\n",
        tags.join("\t"),
        priorities.join("\t")
    )
}

struct Table<'a> {
    display_names: Vec<&'a str>,
    types: Vec<ColumnType>,
    columns: Vec<&'a str>,
}

fn write_table<I>(
    path: &Path,
    header: Option<&Table<'_>>,
    columns: &[&str],
    rows: I,
) -> Result<(), CohortError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let io_err = |err: std::io::Error| CohortError::io(path, err);
    let file = File::create(path).map_err(io_err)?;
    let mut out = BufWriter::new(file);

    if let Some(table) = header {
        out.write_all(header_block(&table.display_names, &table.types).as_bytes())
            .map_err(io_err)?;
    }

    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    let csv_err =
        |err: csv::Error| CohortError::DataIntegrity(format!("{}: {err}", path.display()));

    writer.write_record(columns).map_err(csv_err)?;
    for row in rows {
        writer.write_record(&row).map_err(csv_err)?;
    }
    writer.flush().map_err(io_err)
}

fn write_annotated<I>(path: &Path, table: &Table<'_>, rows: I) -> Result<(), CohortError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    write_table(path, Some(table), &table.columns, rows)
}

fn write_patients(dataset: &CohortDataset, path: &Path) -> Result<(), CohortError> {
    let table = Table {
        display_names: vec!["Patient_Identifier", "GENDER", "AGE", "SURVIVE"],
        types: vec![
            ColumnType::String,
            ColumnType::String,
            ColumnType::Number,
            ColumnType::String,
        ],
        columns: vec!["PATIENT_ID", "GENDER", "AGE", "SURVIVE"],
    };

    let rows = dataset.patients.iter().map(|patient| {
        vec![
            patient.patient_id.clone(),
            text_or_missing(patient.gender.as_deref()),
            patient
                .age
                .map(|age| age.to_string())
                .unwrap_or_else(|| MISSING.to_string()),
            python_bool(patient.survive).to_string(),
        ]
    });
    write_annotated(path, &table, rows)
}

fn write_samples(
    dataset: &CohortDataset,
    panel: &LabPanel,
    path: &Path,
) -> Result<(), CohortError> {
    let mut display_names = vec!["Patient_Identifier", "Sample_Identifier"];
    display_names.extend(panel.names());

    let mut types = vec![ColumnType::String, ColumnType::String];
    types.extend(
        panel
            .iter()
            .map(|lab| ColumnType::from_measurement(dataset.lab_type(&lab.code))),
    );

    let mut columns = vec!["PATIENT_ID", "SAMPLE_ID"];
    columns.extend(panel.names());

    let table = Table {
        display_names,
        types,
        columns,
    };

    let rows = dataset.samples.iter().map(|sample| {
        let mut row = vec![sample.patient_id.clone(), sample.sample_id.clone()];
        row.extend(panel.names().map(|name| number_or_missing(sample.value(name))));
        row
    });
    write_annotated(path, &table, rows)
}

fn write_specimens(dataset: &CohortDataset, path: &Path) -> Result<(), CohortError> {
    let table = Table {
        display_names: vec![
            "Patient_Identifier",
            "Start_Date",
            "Event_Type",
            "Sample_Identifier",
        ],
        types: vec![
            ColumnType::String,
            ColumnType::Number,
            ColumnType::String,
            ColumnType::String,
        ],
        columns: vec!["PATIENT_ID", "START_DATE", "EVENT_TYPE", "SAMPLE_ID"],
    };

    let rows = dataset.specimens.iter().map(|event| {
        vec![
            event.patient_id.clone(),
            event.start_day.to_string(),
            EventType::Specimen.as_str().to_string(),
            event.sample_id.clone(),
        ]
    });
    write_annotated(path, &table, rows)
}

fn write_medications(dataset: &CohortDataset, path: &Path) -> Result<(), CohortError> {
    let table = Table {
        display_names: vec![
            "Patient_Identifier",
            "Start_Date",
            "Stop_Date",
            "Event_Type",
            "Medication",
        ],
        types: vec![
            ColumnType::String,
            ColumnType::Number,
            ColumnType::Number,
            ColumnType::String,
            ColumnType::String,
        ],
        columns: vec!["PATIENT_ID", "START_DATE", "STOP_DATE", "EVENT_TYPE", "MED"],
    };

    let rows = dataset.medications.iter().map(|event| {
        vec![
            event.patient_id.clone(),
            event.start_day.to_string(),
            event.stop_day.to_string(),
            EventType::Medication.as_str().to_string(),
            event.medication.clone(),
        ]
    });
    write_annotated(path, &table, rows)
}

fn write_long_labs(dataset: &CohortDataset, path: &Path) -> Result<(), CohortError> {
    let columns = [
        "PATIENT",
        "SURVIVOR",
        "ONSET",
        "DATE",
        "CODE",
        "DESCRIPTION",
        "VALUE",
        "UNITS",
        "TYPE",
        "DAYS",
    ];

    let rows = dataset.labs.iter().map(|record| {
        vec![
            record.patient_id.clone(),
            python_bool(record.survivor).to_string(),
            record.onset.to_rfc3339_opts(SecondsFormat::Secs, true),
            record.recorded_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            record.code.clone(),
            text_or_missing(record.description.as_deref()),
            number_or_missing(record.value),
            text_or_missing(record.unit.as_deref()),
            text_or_missing(record.kind.as_deref()),
            record.day.to_string(),
        ]
    });
    write_table(path, None, &columns, rows)
}

fn python_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn text_or_missing(value: Option<&str>) -> String {
    match value {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => MISSING.to_string(),
    }
}

fn number_or_missing(value: Option<f64>) -> String {
    value
        .map(format_numeric)
        .unwrap_or_else(|| MISSING.to_string())
}

/// Integral values print without a fractional part.
pub fn format_numeric(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}
