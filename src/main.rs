mod agent;
mod config;
mod core;
mod dedup;
mod providers;
mod query;
mod registry;
mod session;
mod store;
mod stream;
mod traits;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config_path = PathBuf::from("config.toml");
    let mut uploads: Vec<PathBuf> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("tabletalk {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("tabletalk {}", env!("CARGO_PKG_VERSION"));
                println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
                println!("Usage: tabletalk [OPTIONS] [FILE]...\n");
                println!("Arguments:");
                println!("  [FILE]...          Spreadsheet files (.csv, .xlsx, .xls, .ods) to upload");
                println!("\nOptions:");
                println!("  -c, --config <PATH>  Config file (default: config.toml)");
                println!("  -h, --help           Print help");
                println!("  -V, --version        Print version");
                return Ok(());
            }
            "--config" | "-c" => {
                config_path = PathBuf::from(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?,
                );
            }
            other => uploads.push(PathBuf::from(other)),
        }
    }

    let config = if config_path.exists() {
        config::AppConfig::load(&config_path)?
    } else {
        // No config file: env var key + defaults is enough to run.
        config::AppConfig::from_env()?
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(crate::core::run(config, uploads))
}
