use clap::Parser;
use lenscast_core::{CatalogSource, Engine, EngineConfig, MemoryCatalog};
use lenscast_schema::CatalogRecord;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "lenscast-server", about = "Lenscast lens delta-sync server")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8471)]
    port: u16,

    /// Directory for lens version and delta storage.
    #[arg(long, default_value = "./lenscast-data")]
    data_dir: PathBuf,

    /// Optional engine config file (JSON). Defaults apply when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optional catalog seed file: a JSON array of catalog records.
    #[arg(long)]
    catalog: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let catalog = Arc::new(match &cli.catalog {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            let records: Vec<CatalogRecord> = serde_json::from_str(&content)?;
            info!("seeded catalog with {} records from {}", records.len(), path.display());
            MemoryCatalog::from_records(records)
        }
        None => MemoryCatalog::new(),
    });

    fs::create_dir_all(&cli.data_dir)?;
    let engine = Arc::new(Engine::new(
        &cli.data_dir,
        catalog as Arc<dyn CatalogSource>,
        config,
    )?);

    let addr = format!("0.0.0.0:{}", cli.port);
    info!("starting lenscast-server on {addr}");
    info!("data directory: {}", cli.data_dir.display());

    lenscast_server::run_server(&engine, &addr)?;
    Ok(())
}
