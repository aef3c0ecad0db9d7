//! Farelink - Framed-JSON TCP client for the fare modelling microservice
//!
//! The core is the protocol client in `network`; this binary is a thin
//! front end that loads configuration, opens the connection (which runs
//! the mandatory INIT handshake), and issues prediction requests.

mod config;
mod network;
mod protocol;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use network::Client;

/// Farelink - fare modelling microservice client
#[derive(Parser)]
#[command(name = "farelink")]
#[command(author = "Farelink Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Query fare predictions from the modelling microservice", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a fare prediction for one trip
    Predict {
        /// Trip distance
        #[arg(short, long)]
        distance: f64,

        /// Trip datetime, ISO-8601 with timezone offset
        #[arg(short = 't', long)]
        datetime: String,

        /// Microservice host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Microservice port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Connect and run the INIT handshake only
    Init {
        /// Microservice host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Microservice port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration, then apply environment overrides
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };
    config.overlay_env()?;

    match cli.command {
        Commands::Predict {
            distance,
            datetime,
            host,
            port,
        } => {
            run_predict(config, host, port, distance, datetime).await?;
        }
        Commands::Init { host, port } => {
            run_init(config, host, port).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Connect, handshake, and issue one prediction
async fn run_predict(
    config: Config,
    host: Option<String>,
    port: Option<u16>,
    distance: f64,
    datetime: String,
) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.microservice.host.clone());
    let port = port.unwrap_or(config.microservice.port);

    let client = Client::new(config);
    client.connect(&host, port).await?;

    let prediction = client.predict(distance, &datetime).await?;

    println!("Trip distance:     {}", distance);
    println!("Trip datetime:     {}", datetime);
    println!("Predicted fare:    {:.2}", prediction.prediction);
    println!("Expected revenue:  {:.2}", prediction.expected_revenue);

    client.disconnect().await;
    Ok(())
}

/// Connect and run the handshake, reporting the service's acknowledgement
async fn run_init(config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.microservice.host.clone());
    let port = port.unwrap_or(config.microservice.port);

    let client = Client::new(config);
    client.connect(&host, port).await?;

    println!("Microservice at {}:{} initialised and ready.", host, port);

    client.disconnect().await;
    Ok(())
}
