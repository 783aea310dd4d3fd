use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use federation_ca::configs::{AppConfig, StorageBackend, StorageConfig};
use federation_ca::dispatch::Dispatcher;
use federation_ca::external_interface::{send_invocation, start_socket_server};
use federation_ca::protocol::{Invocation, Response};
use federation_ca::root_authority;
use federation_ca::storage::{KeyValueStore, MemoryStore};

#[derive(Parser, Debug)]
#[command(name = "federation-ca", version, about = "Federation certificate authority and chain registry")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the registry socket server (default)
    Serve,
    /// Send one invocation to a running registry and print the response
    Call {
        function: String,
        args: Vec<String>,
        /// Issuance time in unix seconds, the server clock when omitted
        #[arg(long)]
        timestamp: Option<i64>,
        /// Socket to connect to instead of the configured one
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config),
        Command::Call {
            function,
            args,
            timestamp,
            socket,
        } => {
            let socket_path = socket.unwrap_or(config.server.socket_path);
            let invocation = Invocation {
                function,
                args,
                timestamp,
            };
            match send_invocation(&socket_path, &invocation)? {
                Response::Success { payload } => {
                    if let Some(payload) = payload {
                        println!("{}", payload);
                    }
                    Ok(())
                }
                Response::Error { kind, message } => bail!("{}: {}", kind, message),
            }
        }
    }
}

fn serve(config: AppConfig) -> Result<()> {
    let mut store = open_store(&config.storage)?;

    if !root_authority::has_root(&store)? {
        if config.bootstrap.generate_root_if_missing {
            root_authority::generate_and_install(&mut store, &config.root_ca, Utc::now())
                .context("Failed to generate root authority")?;
            info!(subject = %config.root_ca.common_name, "Root authority generated");
        } else {
            info!("No root authority stored; registerChain fails until one is installed");
        }
    }

    let dispatcher = Dispatcher::new(store, config.root_ca.clone());
    start_socket_server(dispatcher, &config.server.socket_path)
}

fn open_store(config: &StorageConfig) -> Result<Box<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory store; state is lost on exit");
            Ok(Box::new(MemoryStore::new()))
        }
        #[cfg(feature = "rocksdb")]
        StorageBackend::Rocksdb => {
            let store = federation_ca::rocksdb_store::RocksDbStore::open(&config.path)
                .context(format!("Failed to open store at {}", config.path.display()))?;
            info!(path = %config.path.display(), "Using RocksDB store");
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::Rocksdb => {
            bail!("The rocksdb backend requires building with the `rocksdb` feature")
        }
    }
}
