use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use cohort_core::CohortConfig;
use cohort_synthea::{run, ExportOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "cohort-cli",
    about = "Build COVID-19 inpatient cohort tables from a Synthea CSV export."
)]
struct Args {
    /// Directory holding the Synthea CSV tables.
    #[arg(short, long)]
    input: PathBuf,

    /// Existing directory the cohort tables are written to.
    #[arg(short, long)]
    output: PathBuf,

    /// JSON file with pipeline settings. Flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of inpatients to sample.
    #[arg(short = 'n', long)]
    sample_size: Option<usize>,

    /// Seed for reproducible sampling.
    #[arg(long)]
    seed: Option<u64>,

    /// Date ages are computed at (YYYY-MM-DD).
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// Skip the lab boxplot SVG.
    #[arg(long)]
    no_plot: bool,

    /// Also write the long lab table.
    #[arg(long)]
    export_long: bool,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<CohortConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config file {}", path.display()))?;
                serde_json::from_str::<CohortConfig>(&data)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => CohortConfig::default(),
        };

        if let Some(size) = self.sample_size {
            config.sample_size = size;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(date) = self.reference_date {
            config.reference_date = date;
        }
        config.validate()?;
        Ok(config)
    }

    fn export_options(&self) -> ExportOptions {
        ExportOptions {
            plot: !self.no_plot,
            long_table: self.export_long,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.load_config()?;

    tracing::info!(
        sample_size = config.sample_size,
        seed = ?config.seed,
        "building cohort from {}",
        args.input.display()
    );

    let (dataset, written) = run(&args.input, &args.output, &config, args.export_options())
        .with_context(|| format!("cohort build failed for {}", args.input.display()))?;

    let report = &dataset.report;
    println!(
        "COVID-19 patients: {}\nSurvivors: {}\nInpatients: {}\nSampled: {} ({} survivors, {} deceased)",
        report.covid_positive,
        report.survivors,
        report.inpatients,
        report.sampled,
        report.sampled_survivors,
        report.sampled_deceased
    );
    println!(
        "Samples: {}\nSpecimen events: {}\nMedication events: {}",
        dataset.samples.len(),
        dataset.specimens.len(),
        dataset.medications.len()
    );
    for path in written {
        println!("Wrote {}", path.display());
    }

    Ok(())
}
