//! Reads a vessel position log and prints, or saves, the distance every vessel travelled per month.

use anyhow::{Context, bail};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vessel_distance_logs::*;

/// Monthly travelled distance per vessel from a delimited position log
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Position log with a header row
    input: PathBuf,

    /// Field delimiter of the input and output files
    #[arg(short, long, default_value_t = ',')]
    delimiter: char,

    /// Column holding the vessel name or identifier
    #[arg(long, default_value = "Nombre")]
    vessel_column: String,

    /// Column holding the day first date
    #[arg(long, default_value = "Fecha")]
    date_column: String,

    #[arg(long, default_value = "Latitud")]
    latitude_column: String,

    #[arg(long, default_value = "Longitud")]
    longitude_column: String,

    /// Earth model used for the distance between consecutive positions
    #[arg(short, long, value_enum, default_value_t = DistanceModel::Haversine)]
    model: DistanceModel,

    /// Save the monthly distances to this csv file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of rows to print
    #[arg(short, long, default_value_t = 10)]
    preview: usize,

    /// Log filter, e.g. "debug" or "vessel_distance_logs=trace"
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,
}

impl Cli {
    fn column_names(&self) -> ColumnNames {
        ColumnNames {
            vessel_id: self.vessel_column.clone(),
            timestamp: self.date_column.clone(),
            latitude: self.latitude_column.clone(),
            longitude: self.longitude_column.clone(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if !cli.delimiter.is_ascii() {
        bail!("delimiter {:?} must be a single ascii character", cli.delimiter);
    }
    let delimiter = cli.delimiter as u8;

    let log = load_position_log(&cli.input, delimiter)
        .with_context(|| format!("failed to read position log {}", cli.input.display()))?;
    tracing::info!("Read {} position records from {}", log.records.len(), cli.input.display());

    let monthly = log
        .monthly_distances(&cli.column_names(), cli.model)
        .context("failed to compute monthly distances")?;

    print!("{}", preview(&monthly, cli.preview));

    if let Some(output) = &cli.output {
        monthly_distances_to_csv(output, &monthly, delimiter)
            .with_context(|| format!("failed to save monthly distances to {}", output.display()))?;
        tracing::info!("Saved {} rows to {}", monthly.len(), output.display());
    }

    Ok(())
}

/// Logs go to stderr so the printed table stays clean on stdout.
/// Falls back to "info" if the filter string is not understood.
fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
