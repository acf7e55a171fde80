//! kobo2calibre - sync highlights between a Kobo device and a calibre library

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kobo2calibre::config::{Config, DEFAULT_CONFIG_FILE};
use kobo2calibre::{
    DeviceMetadata, SqliteCalibreStore, SqliteKoboStore, SyncOptions, SyncReport, Translator,
    load_config, sync,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Direction {
    /// Copy device highlights into the calibre library
    KoboToCalibre,
    /// Copy calibre highlights onto the device
    CalibreToKobo,
}

#[derive(Parser)]
#[command(name = "kobo2calibre")]
#[command(version, about = "Sync highlights between a Kobo device and calibre", long_about = None)]
#[command(after_help = "EXAMPLES:
    kobo2calibre /media/KOBOeReader ~/Calibre\\ Library
    kobo2calibre /media/KOBOeReader ~/Calibre\\ Library --direction calibre-to-kobo --dry-run")]
struct Cli {
    /// Mount point of the device
    #[arg(value_name = "KOBO_VOLUME")]
    kobo_volume: PathBuf,

    /// Root of the calibre library
    #[arg(value_name = "CALIBRE_LIBRARY")]
    calibre_library: PathBuf,

    #[arg(long, value_enum, default_value_t = Direction::KoboToCalibre)]
    direction: Direction,

    /// Only sync books whose device path contains this text
    #[arg(long, value_name = "SUBSTR")]
    filter_bookname: Option<String>,

    /// Device database [default: <KOBO_VOLUME>/.kobo/KoboReader.sqlite]
    #[arg(long, value_name = "FILE")]
    kobo_store: Option<PathBuf>,

    /// Library database [default: <CALIBRE_LIBRARY>/metadata.db]
    #[arg(long, value_name = "FILE")]
    calibre_store: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Worker threads (overrides the config file)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Translate highlights without writing either store
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config, cli.debug);

    match run(&cli, &config) {
        Ok(report) => {
            println!(
                "{} books ({} unmatched, {} failed), {} highlights converted, {} skipped, {} inserted, {} already present",
                report.books,
                report.unmatched,
                report.failed_books,
                report.converted,
                report.failed,
                report.inserted,
                report.duplicates
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &Config, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli, config: &Config) -> kobo2calibre::Result<SyncReport> {
    let kobo_path = store_path(&cli.kobo_store, || SqliteKoboStore::default_path(&cli.kobo_volume));
    let calibre_path = store_path(&cli.calibre_store, || {
        SqliteCalibreStore::default_path(&cli.calibre_library)
    });

    let mut kobo = SqliteKoboStore::open(&kobo_path)?;
    let mut calibre = SqliteCalibreStore::open(&calibre_path)?;
    let metadata = DeviceMetadata::load(&cli.kobo_volume)?;
    info!(books = metadata.books().len(), "loaded device metadata");

    let translator = Translator::from_config(config);
    let options = SyncOptions {
        jobs: cli.jobs.unwrap_or(config.jobs),
        dry_run: cli.dry_run,
        filter_bookname: cli.filter_bookname.clone(),
        device_prefix: config.device_prefix.clone(),
    };
    let now = chrono::Utc::now();
    let library = cli.calibre_library.as_path();

    match cli.direction {
        Direction::KoboToCalibre => sync::kobo_to_calibre(
            library,
            &kobo,
            &mut calibre,
            &metadata,
            &translator,
            &options,
            now,
        ),
        Direction::CalibreToKobo => sync::calibre_to_kobo(
            library,
            &calibre,
            &mut kobo,
            &metadata,
            &translator,
            &options,
            now,
        ),
    }
}

fn store_path(explicit: &Option<PathBuf>, default: impl FnOnce() -> PathBuf) -> PathBuf {
    explicit.as_deref().map_or_else(default, Path::to_path_buf)
}
