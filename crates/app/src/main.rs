use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use perfcodec_core::{CodecConfig, ParameterTable, Performance, PerformanceCodec, Score};
use tracing_subscriber::EnvFilter;

fn main() -> perfcodec_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => CodecConfig::from_path(path)?,
        None => CodecConfig::default(),
    };

    match cli.command {
        Commands::Encode {
            score,
            performance,
            output,
        } => run_encode(config, &score, &performance, &output),
        Commands::Decode {
            table,
            score,
            output,
        } => run_decode(config, &table, &score, &output),
        Commands::Schema => {
            for column in ParameterTable::COLUMNS {
                println!("{column}");
            }
            Ok(())
        }
    }
}

fn run_encode(
    config: CodecConfig,
    score: &Path,
    performance: &Path,
    output: &Path,
) -> perfcodec_core::Result<()> {
    tracing::info!(?score, ?performance, ?output, "encoding performance");

    let codec = PerformanceCodec::new(config)?;
    let score: Score = read_json(score)?;
    let performance: Performance = read_json(performance)?;

    let table = codec.encode(&score, &performance)?;
    std::fs::write(output, table.to_json()?)?;
    tracing::info!(rows = table.len(), "wrote parameter table");
    Ok(())
}

fn run_decode(
    config: CodecConfig,
    table: &Path,
    score: &Path,
    output: &Path,
) -> perfcodec_core::Result<()> {
    tracing::info!(?table, ?score, ?output, "decoding parameter table");

    let codec = PerformanceCodec::new(config)?;
    let table = ParameterTable::from_json_str(&std::fs::read_to_string(table)?)?;
    let score: Score = read_json(score)?;

    let performance = codec.decode(&table, &score)?;
    std::fs::write(output, serde_json::to_string_pretty(&performance)?)?;
    tracing::info!(events = performance.len(), "wrote performance");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> perfcodec_core::Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(
    author,
    version = perfcodec_core::VERSION,
    about = "Expressive performance codec",
    long_about = None
)]
struct Cli {
    /// Codec configuration file (JSON). Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode an aligned score and performance into a parameter table.
    Encode {
        /// Score events as JSON.
        score: PathBuf,
        /// Performance events as JSON, matched to the score by id.
        performance: PathBuf,
        /// Output path for the parameter table.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Render a parameter table back into performed notes.
    Decode {
        /// Parameter table produced by `encode`.
        table: PathBuf,
        /// Score the table was encoded against.
        score: PathBuf,
        /// Output path for the performance.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the parameter table column schema.
    Schema,
}
