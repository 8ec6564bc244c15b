#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the accident record harvester.

use std::path::PathBuf;
use std::time::Instant;

use accident_harvest_cli_utils::IndicatifProgress;
use accident_harvest_ingest::LoadInputs;
use accident_harvest_ingest::config::{ConfigError, Overrides, validate};
use accident_harvest_models::config::{HarvestConfig, ResumeGranularity};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "accident_harvest",
    about = "Harvests aviation accident records and loads them into staging tables"
)]
struct Cli {
    /// TOML configuration file. Every value has a default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding harvested artifacts
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Proxy URL applied to every request (overrides `ACCIDENT_HARVEST_PROXY`)
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// `DuckDB` staging database (overrides `ACCIDENT_HARVEST_DB`)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct YearRange {
    /// First year to harvest
    #[arg(long)]
    start_year: Option<i32>,
    /// Last year to harvest (inclusive)
    #[arg(long)]
    end_year: Option<i32>,
    /// What counts as already harvested: `off`, `run` or `window`
    #[arg(long)]
    resume: Option<ResumeGranularity>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the Aviation Safety Network year listings into `asn_{year}.json`
    AviationSafety {
        #[command(flatten)]
        range: YearRange,
    },
    /// Download NTSB monthly export archives as `ntsb_{year}_{mm}.zip`
    Ntsb {
        #[command(flatten)]
        range: YearRange,
    },
    /// Unpack downloaded NTSB archives into `extracted/`
    Extract,
    /// Merge extracted NTSB case files into `merged_all_cases.json`
    Merge,
    /// Load harvested records into the staging tables.
    ///
    /// Without any file arguments, loads every listing envelope and the
    /// merged NTSB export found in the output directory.
    Load {
        /// Listing envelope(s) to load
        #[arg(long)]
        asn: Vec<PathBuf>,
        /// Merged NTSB export(s) to load
        #[arg(long)]
        ntsb: Vec<PathBuf>,
        /// Delimited file(s) with an `index` column to load
        #[arg(long)]
        csv: Vec<PathBuf>,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn apply_range(
    range: YearRange,
    start_year: &mut i32,
    end_year: &mut i32,
    resume: &mut ResumeGranularity,
) {
    if let Some(year) = range.start_year {
        *start_year = year;
    }
    if let Some(year) = range.end_year {
        *end_year = year;
    }
    if let Some(granularity) = range.resume {
        *resume = granularity;
    }
}

fn load_config(cli: &Cli) -> Result<HarvestConfig, ConfigError> {
    accident_harvest_ingest::config::load(
        cli.config.as_deref(),
        Overrides {
            output_dir: cli.output_dir.clone(),
            proxy: cli.proxy.clone(),
            database_path: cli.database.clone(),
        },
    )
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = accident_harvest_cli_utils::init_logger();
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::AviationSafety { range } => {
            let source = &mut config.aviation_safety;
            apply_range(
                range,
                &mut source.start_year,
                &mut source.end_year,
                &mut source.resume,
            );
            validate(&config)?;

            let start = Instant::now();
            let progress = IndicatifProgress::listing_bar(&multi, "Aviation Safety Network");
            let reports =
                accident_harvest_ingest::harvest_aviation_safety(&config, progress).await?;

            log::info!(
                "Harvested {} years in {:.1}s",
                reports.len(),
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Ntsb { range } => {
            let source = &mut config.ntsb;
            apply_range(
                range,
                &mut source.start_year,
                &mut source.end_year,
                &mut source.resume,
            );
            validate(&config)?;

            let start = Instant::now();
            let today = chrono::Local::now().date_naive();
            let progress = IndicatifProgress::months_bar(&multi, "NTSB exports");
            let report = accident_harvest_ingest::harvest_ntsb(&config, today, progress).await?;

            log::info!(
                "Processed {} months in {:.1}s",
                report.total(),
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Extract => {
            let report = accident_harvest_ingest::extract(&config)?;
            println!(
                "Extracted {} files from {} archives ({} failed)",
                report.files, report.archives, report.failed
            );
        }
        Commands::Merge => {
            let report = accident_harvest_ingest::merge(&config)?;
            println!(
                "Merged {} records from {} files ({} failed)",
                report.records, report.files, report.failed
            );
        }
        Commands::Load { asn, ntsb, csv } => {
            let given = LoadInputs {
                aviation_safety: asn,
                ntsb,
                tabular: csv,
            };
            let inputs = if given.is_empty() {
                accident_harvest_ingest::default_load_inputs(&config)?
            } else {
                given
            };

            if inputs.is_empty() {
                log::warn!(
                    "Nothing to load in {}; harvest first or pass files explicitly",
                    config.output_dir.display()
                );
                return Ok(());
            }

            let start = Instant::now();
            let loads = accident_harvest_ingest::load(&config, &inputs)?;

            println!("{:<30} {:>10}  STATUS", "TABLE", "NEW ROWS");
            println!("{}", "-".repeat(55));
            for load in &loads {
                match &load.result {
                    Ok(report) => println!(
                        "{:<30} {:>10}  ok",
                        load.kind.staging_table(),
                        report.inserted
                    ),
                    Err(e) => println!("{:<30} {:>10}  {e}", load.kind.staging_table(), "-"),
                }
            }

            log::info!(
                "Loaded into {} in {:.1}s",
                config.database_path.display(),
                start.elapsed().as_secs_f64()
            );
        }
        Commands::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
