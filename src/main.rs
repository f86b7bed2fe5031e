use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use sales_export::clock::SystemClock;
use sales_export::config::{default_config_path, ResolvedConfig};
use sales_export::credentials::{setup_instructions, EnvCredentialStore, PortalAccess};
use sales_export::download::DownloadOutcome;
use sales_export::merge::{merge_downloads, merge_folder, merge_prefixed_csv, MergeOutcome};
use sales_export::orchestrator::{ExportOrchestrator, MergeStatus, RunReport};
use sales_export::period::{generate_periods, Period};
use sales_export::portal::ChromeDriver;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sales-export")]
#[command(about = "Export sales reports from the portal period by period and merge them")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log as JSON lines instead of text
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
struct RangeArgs {
    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day of the range (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Days per export window
    #[arg(long)]
    window_days: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Log in, export every period and merge the downloads
    Run {
        #[command(flatten)]
        range: RangeArgs,

        /// Run Chrome without a window
        #[arg(long)]
        headless: bool,

        /// Leave the downloads unmerged
        #[arg(long)]
        no_merge: bool,
    },

    /// Print the export windows without opening a browser
    Periods {
        #[command(flatten)]
        range: RangeArgs,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge the spreadsheets already in the download directory
    Merge {
        /// Directory to merge instead of the configured download directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Merge `{prefix}*.csv` files into one `{prefix}_merged.csv` per prefix
    MergeCsv {
        /// Where the CSV files are read from
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Where merged files are written (must exist)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Prefixes to merge (defaults to the configured list)
        #[arg(long = "prefix")]
        prefixes: Vec<String>,
    },

    /// Merge every spreadsheet in a folder into one workbook
    MergeFolder {
        /// Folder to read
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Output file (defaults to the configured name inside the folder)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show current configuration
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off")
    });
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run_cli(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = ?err, "sales-export failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_cli(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = ResolvedConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    match cli.command {
        Some(Command::Run {
            range,
            headless,
            no_merge,
        }) => {
            config.browser.headless |= headless;
            let periods = periods_for(&config, &range)?;
            run_export(config, periods, !no_merge).await
        }
        Some(Command::Periods { range, json }) => {
            let periods = periods_for(&config, &range)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&periods)?);
            } else {
                print_periods(&periods);
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Merge { dir }) => {
            let dir = dir.unwrap_or_else(|| config.download_dir.clone());
            let outcome = merge_downloads(&dir, &config.merge, &SystemClock)?;
            print_merge(&dir.display().to_string(), &outcome);
            Ok(exit_for(&outcome))
        }
        Some(Command::MergeCsv {
            input_dir,
            output_dir,
            prefixes,
        }) => {
            let input_dir = input_dir
                .or_else(|| config.merge.csv_input_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            let output_dir = output_dir.unwrap_or_else(|| config.merge.csv_output_dir.clone());
            if !prefixes.is_empty() {
                config.merge.csv_prefixes = prefixes;
            }

            let mut all_written = true;
            for (prefix, outcome) in merge_prefixed_csv(&input_dir, &output_dir, &config.merge) {
                match outcome {
                    Ok(outcome) => {
                        all_written &= outcome.is_written();
                        print_merge(&prefix, &outcome);
                    }
                    Err(err) => {
                        all_written = false;
                        println!("{prefix}: failed: {err:#}");
                    }
                }
            }
            Ok(if all_written {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Some(Command::MergeFolder { dir, output }) => {
            let output = output.unwrap_or_else(|| dir.join(&config.merge.folder_output));
            let outcome = merge_folder(&dir, &output, &config.merge)?;
            print_merge(&dir.display().to_string(), &outcome);
            Ok(exit_for(&outcome))
        }
        Some(Command::Config) => {
            println!("Config file: {}", config_path.display());
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("sales-export - portal sales report exporter");
            println!("============================================\n");
            println!("Config: {}", config_path.display());
            println!("Download directory: {}", config.download_dir.display());
            println!(
                "Range: {} to {} in {}-day windows\n",
                config.range.start, config.range.end, config.range.window_days
            );
            println!("Commands:");
            println!("  run           Export every period and merge the downloads");
            println!("  periods       Print the export windows");
            println!("  merge         Merge the downloaded spreadsheets");
            println!("  merge-csv     Merge prefixed CSV batches");
            println!("  merge-folder  Merge every spreadsheet in a folder");
            println!("  config        Show current configuration\n");
            println!("Run 'sales-export --help' for more options.");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn periods_for(config: &ResolvedConfig, range: &RangeArgs) -> Result<Vec<Period>> {
    let start = range.from.unwrap_or(config.range.start);
    let end = range.to.unwrap_or(config.range.end);
    let window = range.window_days.unwrap_or(config.range.window_days);
    Ok(generate_periods(start, end, window)?)
}

fn print_periods(periods: &[Period]) {
    println!("{} periods:", periods.len());
    for (i, period) in periods.iter().enumerate() {
        println!(
            "  {:>3}. {} - {}  ({} days)",
            i + 1,
            period.start_label,
            period.end_label,
            period.days()
        );
    }
}

async fn run_export(config: ResolvedConfig, periods: Vec<Period>, merge: bool) -> Result<ExitCode> {
    let store = EnvCredentialStore::new();
    let Some(access) = PortalAccess::resolve(&store, &config.portal).await? else {
        eprintln!("{}", setup_instructions(&store));
        return Ok(ExitCode::FAILURE);
    };

    print_periods(&periods);
    let download_dir = config.ensure_download_dir()?.to_path_buf();
    let driver = ChromeDriver::launch(&config.browser, &download_dir).await?;

    let orchestrator = ExportOrchestrator::new(driver, config).with_merge(merge);
    let result = orchestrator.run(&access, &periods).await;

    if let Err(err) = orchestrator.into_driver().close().await {
        info!(error = %err, "Browser did not close cleanly");
    }

    let report = result?;
    print_report(&report, &download_dir);
    Ok(if report.downloaded() > 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &RunReport, download_dir: &Path) {
    println!();
    println!(
        "Downloaded {}/{} periods into {}",
        report.downloaded(),
        report.records.len(),
        download_dir.display()
    );
    for record in &report.records {
        match &record.outcome {
            DownloadOutcome::Saved(path) => {
                println!("  ok      {}  {}", record.period.name, path.display())
            }
            DownloadOutcome::Failed(reason) => {
                println!("  failed  {}  {}", record.period.name, reason)
            }
        }
    }

    match &report.merge {
        MergeStatus::Skipped => println!("Merge skipped"),
        MergeStatus::NothingDownloaded => println!("Nothing downloaded; no merge"),
        MergeStatus::Completed(outcome) => print_merge("downloads", outcome),
        MergeStatus::Failed(reason) => println!("Merge failed: {reason}"),
    }
}

fn print_merge(label: &str, outcome: &MergeOutcome) {
    match outcome {
        MergeOutcome::Written {
            path,
            files_read,
            rows,
            failures,
            ..
        } => {
            println!(
                "{label}: merged {files_read} files, {rows} rows -> {}",
                path.display()
            );
            for failure in failures {
                println!("  skipped {}: {}", failure.path.display(), failure.error);
            }
        }
        MergeOutcome::NoInputs => println!("{label}: no files to merge"),
        MergeOutcome::NothingReadable { failures } => {
            println!("{label}: none of {} files could be read", failures.len());
            for failure in failures {
                println!("  {}: {}", failure.path.display(), failure.error);
            }
        }
    }
}

fn exit_for(outcome: &MergeOutcome) -> ExitCode {
    if outcome.is_written() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
