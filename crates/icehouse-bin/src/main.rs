#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions, clippy::similar_names)]

use clap::{Parser, Subcommand};
use icehouse::{ServiceConfig, tokio, tracing};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

mod authorizer;
mod config;
mod healthcheck;
mod serve;

pub(crate) use config::CONFIG_BIN;
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server
    Serve {},
    /// Check the health of a running server
    Healthcheck {
        #[clap(
            long,
            short,
            help = "Port of the server to check. Defaults to the configured listen port."
        )]
        port: Option<u16>,
    },
    /// Print the version of the server
    Version {},
    #[cfg(feature = "open-api")]
    /// Get the `OpenAPI` specification of the Management API as yaml
    ManagementOpenapi {},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_file(CONFIG_BIN.debug.extended_logs)
        .with_line_number(CONFIG_BIN.debug.extended_logs)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Some(Commands::Serve {}) => {
            print_info();
            serve().await?;
        }
        Some(Commands::Healthcheck { port }) => {
            let port = match port {
                Some(port) => port,
                None => ServiceConfig::load()?.listen_port,
            };
            healthcheck::health(port).await?;
        }
        Some(Commands::Version {}) => {
            println!("{VERSION}");
        }
        #[cfg(feature = "open-api")]
        Some(Commands::ManagementOpenapi {}) => {
            let doc = icehouse::api::management::v1::api_doc();
            println!("{}", doc.to_yaml()?);
        }
        None => {
            if CONFIG_BIN.debug.auto_serve {
                print_info();
                serve().await?;
            } else {
                // Error out if no subcommand is provided.
                eprintln!("No subcommand provided. Use --help for more information.");
                anyhow::bail!("No subcommand provided");
            }
        }
    }

    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    let config = ServiceConfig::load()?;
    tracing::info!(
        "Starting server on {}:{}...",
        config.bind_ip,
        config.listen_port
    );
    serve::serve_default(config).await
}

fn print_info() {
    let banner = r"  ___ ___ ___ _  _  ___  _   _ ___ ___
 |_ _/ __| __| || |/ _ \| | | / __| __|
  | | (__| _|| __ | (_) | |_| \__ \ _|
 |___\___|___|_||_|\___/ \___/|___/___|
";
    println!("{banner}\nIcehouse Version: {VERSION}\n");
    tracing::info!("Icehouse Version: {VERSION}");
}
