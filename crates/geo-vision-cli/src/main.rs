//! GeoVision CLI entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use geo_vision::{extract_gps, haversine_distance, LocationConsistency, SUPPORTED_EXTENSIONS};
use geo_vision_cli::{load_config, resolve_config_path, run_analyze, AnalyzeOptions, EndpointSettings, HttpVisionModel};

#[derive(Parser)]
#[command(
    name = "geo-vision",
    about = "Geographic vision analysis for simulated agents",
    version
)]
struct Cli {
    /// Path to a JSON config file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an image with the vision model and record the result.
    Analyze {
        /// Free-text intention; may name the image path.
        #[arg(short, long)]
        intention: String,

        /// Explicit image path.
        #[arg(long)]
        image: Option<String>,

        /// Display string for the agent's current position.
        #[arg(long)]
        position: Option<String>,

        /// Manual image latitude (used when the image has no GPS tags).
        #[arg(long, requires = "manual_lng", allow_negative_numbers = true)]
        manual_lat: Option<f64>,

        /// Manual image longitude.
        #[arg(long, requires = "manual_lat", allow_negative_numbers = true)]
        manual_lng: Option<f64>,

        /// Agent state file (status and memory stream).
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// AOI catalog file.
        #[arg(long)]
        aois: Option<PathBuf>,

        /// Latitude of the local XY origin.
        #[arg(long, requires = "origin_lng", allow_negative_numbers = true)]
        origin_lat: Option<f64>,

        /// Longitude of the local XY origin.
        #[arg(long, requires = "origin_lat", allow_negative_numbers = true)]
        origin_lng: Option<f64>,

        /// Chat completions endpoint. Also reads GEO_VISION_ENDPOINT.
        #[arg(long)]
        endpoint: Option<String>,

        /// Model name. Also reads GEO_VISION_MODEL.
        #[arg(long)]
        model: Option<String>,

        /// Bearer token. Also reads GEO_VISION_API_KEY.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Great-circle distance between two points, with its consistency class.
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lng1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lng2: f64,
    },

    /// Print the EXIF GPS fix of an image as JSON.
    Exif {
        path: PathBuf,
    },

    /// Print the effective configuration as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   geo-vision completions bash > ~/.local/share/bash-completion/completions/geo-vision
    ///   geo-vision completions zsh > ~/.zfunc/_geo-vision
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze {
            intention,
            image,
            position,
            manual_lat,
            manual_lng,
            state,
            aois,
            origin_lat,
            origin_lng,
            endpoint,
            model,
            api_key,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let settings = EndpointSettings::resolve(endpoint, model, api_key);
            tracing::info!("Model: {} at {}", settings.model, settings.endpoint);
            let model = Arc::new(HttpVisionModel::new(settings)?);

            let options = AnalyzeOptions {
                intention,
                image,
                position,
                manual: manual_lat.zip(manual_lng),
                state,
                aois,
                origin: origin_lat.zip(origin_lng),
            };
            let output = run_analyze(options, config, model).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            if !output.success {
                std::process::exit(2);
            }
        }

        Commands::Distance { lat1, lng1, lat2, lng2 } => {
            let config = load_config(cli.config.as_deref())?;
            let distance = haversine_distance(lat1, lng1, lat2, lng2);
            if !distance.is_finite() {
                anyhow::bail!("Invalid coordinates: ({lat1}, {lng1}) / ({lat2}, {lng2})");
            }
            let consistency = LocationConsistency::classify(
                distance,
                config.location_accuracy_threshold,
                config.possible_consistency_threshold,
            );
            println!("{distance:.1} m ({consistency})");
        }

        Commands::Exif { path } => {
            if !path.exists() {
                anyhow::bail!("Image not found: {}", path.display());
            }
            let fix = tokio::task::spawn_blocking(move || extract_gps(&path)).await?;
            println!("{}", serde_json::to_string_pretty(&fix)?);
        }

        Commands::Info => {
            let config = load_config(cli.config.as_deref())?;
            let info = serde_json::json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "config_path": resolve_config_path(cli.config.as_deref()),
                "config": config,
                "supported_formats": SUPPORTED_EXTENSIONS,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "geo-vision", &mut std::io::stdout());
        }
    }

    Ok(())
}
