// Copyright 2026 Parcelscope Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use parcelscope::assessor::{fetch_property_record, PropertyQuery};
use parcelscope::config::AppConfig;
use parcelscope::quote::HttpMailer;
use parcelscope::renderer::chromium::{find_chromium, ChromiumRenderer};
use parcelscope::renderer::Renderer;
use parcelscope::rest::{self, AppState};

#[derive(Parser)]
#[command(
    name = "parcelscope",
    about = "Parcelscope — headless retrieval of municipal property-assessment records",
    version
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on (overrides PARCELSCOPE_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single lookup from the command line and print the record
    Lookup {
        /// Region / city / town name
        city: String,
        /// Street name
        street: String,
        /// Address number
        number: String,
    },
    /// Check environment and diagnose issues
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::from_env();

    match cli.command {
        Commands::Serve { port } => {
            config.validate()?;
            let port = port.unwrap_or(config.port);

            let renderer = Arc::new(ChromiumRenderer::new().await?);
            let renderer_dyn: Arc<dyn Renderer> = renderer.clone();
            let mailer = Arc::new(HttpMailer::new(config.mail.clone()));
            let state = Arc::new(AppState {
                config,
                renderer: renderer_dyn,
                mailer,
            });

            rest::serve(port, state).await?;
            renderer.shutdown().await?;
        }
        Commands::Lookup {
            city,
            street,
            number,
        } => {
            config.validate()?;
            let renderer = ChromiumRenderer::new().await?;
            let query = PropertyQuery {
                region: city,
                street_name: street,
                address_number: number,
            };
            let record = fetch_property_record(&renderer, &config, &query).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            renderer.shutdown().await?;
        }
        Commands::Doctor => {
            match find_chromium() {
                Some(path) => println!("✓ Chromium: {}", path.display()),
                None => println!(
                    "✗ Chromium not found — install Chrome or set PARCELSCOPE_CHROMIUM_PATH"
                ),
            }
            match config.validate() {
                Ok(()) => println!("✓ Config valid (form URL: {})", config.form_url),
                Err(e) => println!("✗ Config invalid: {e:#}"),
            }
            if config.mail.api_key.is_empty() {
                println!("! PARCELSCOPE_MAIL_API_KEY unset — quote delivery will fail");
            } else {
                println!("✓ Mail API key configured");
            }
        }
    }

    Ok(())
}
