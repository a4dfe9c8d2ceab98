//! geoenrich CLI: enrich tables of points with location features.
//!
//! Provides batch CSV enrichment from a feature definitions file and raw
//! calls against each enrichment endpoint.

mod commands;

use clap::{Args, Parser};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// geoenrich: location features for latitude/longitude data
#[derive(Parser, Debug)]
#[command(name = "geoenrich", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (searched for .geoenrich/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Extra configuration file merged over the layered configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Enrich a CSV file with every feature of a definitions file
    Enrich {
        /// Input CSV (lat/lon columns or a WKT `geometry` column)
        #[arg(short, long)]
        input: PathBuf,
        /// Feature definitions (.toml or .json)
        #[arg(short, long)]
        features: PathBuf,
        /// Output CSV (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Latitude column name
        #[arg(long)]
        lat_col: Option<String>,
        /// Longitude column name
        #[arg(long)]
        lon_col: Option<String>,
        /// Requests in flight per feature (overrides batch.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Validate a definitions file and list the features it yields
    Features {
        /// Feature definitions (.toml or .json)
        file: PathBuf,
    },
    /// Look up attributes at a point
    Lookup {
        #[command(flatten)]
        point: PointArgs,
        /// Comma-separated attribute labels
        #[arg(long)]
        labels: Option<String>,
        /// Also summarize each label within this radius
        #[arg(long)]
        summary_radius_km: Option<f64>,
    },
    /// Search points of interest near a point or inside a polygon
    Poi {
        #[command(flatten)]
        point: OptionalPointArgs,
        /// Comma-separated labels
        #[arg(long, conflicts_with = "brands")]
        labels: Option<String>,
        /// Comma-separated brands
        #[arg(long)]
        brands: Option<String>,
        #[command(flatten)]
        within: WithinArgs,
        /// GeoJSON polygon file; searches inside it instead of around a point
        #[arg(long, conflicts_with_all = ["latitude", "longitude"])]
        polygon: Option<PathBuf>,
    },
    /// Amenities score around a point
    Amenities {
        #[command(flatten)]
        point: PointArgs,
        #[command(flatten)]
        within: WithinArgs,
    },
    /// Travel-time isochrone around a point
    Isochrone {
        #[command(flatten)]
        point: PointArgs,
        #[command(flatten)]
        within: WithinArgs,
    },
    /// Venue clusters around a point
    Clusters {
        #[command(flatten)]
        point: PointArgs,
    },
    /// List labels and brands accepted by the points-of-interest endpoint
    PoiOptions,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default .geoenrich/config.toml into the workspace
    Init,
    /// Print the effective configuration
    Show,
}

/// A required coordinate plus free-form query parameters.
#[derive(Args, Debug)]
struct PointArgs {
    #[arg(long = "lat", allow_negative_numbers = true)]
    latitude: f64,
    #[arg(long = "lon", allow_negative_numbers = true)]
    longitude: f64,
    /// Extra query parameter as key=value (repeatable)
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,
}

#[derive(Args, Debug)]
struct OptionalPointArgs {
    #[arg(long = "lat", allow_negative_numbers = true, requires = "longitude")]
    latitude: Option<f64>,
    #[arg(long = "lon", allow_negative_numbers = true, requires = "latitude")]
    longitude: Option<f64>,
    /// Extra query parameter as key=value (repeatable)
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,
}

/// Search radius, by travel time or distance.
#[derive(Args, Debug, Default)]
struct WithinArgs {
    #[arg(long)]
    within_minutes_driving: Option<f64>,
    #[arg(long)]
    within_minutes_biking: Option<f64>,
    #[arg(long)]
    within_minutes_walking: Option<f64>,
    #[arg(long)]
    within_miles: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = match &cli.config {
        Some(file) => geoenrich_core::config::load_config_with_file(Some(&workspace), file),
        None => geoenrich_core::config::load_config(Some(&workspace), None),
    }
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Set up tracing: human-readable stderr, plus JSON file logging if enabled.
    // Stdout is reserved for command output.
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let (json_layer, _guard) = if config.logging.json_log {
        let log_dir = config
            .logging
            .log_dir
            .clone()
            .or_else(|| geoenrich_core::config::project_dirs().map(|d| d.data_dir().join("logs")))
            .unwrap_or_else(|| PathBuf::from("."));
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "geoenrich.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, &config, &workspace).await
}
