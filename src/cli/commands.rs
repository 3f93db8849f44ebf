use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::{ContextScope, ServerConfig};
use crate::core::{
    card::CardAttributes,
    reader::PcscTransport,
    session::CardSession,
    transport::{CardTransport, ReaderState},
    utils::format_hex_spaced,
};
use crate::http::server;

#[derive(Parser)]
#[command(name = "card-reader-server")]
#[command(about = "HTTP service for MIFARE Classic cards on PC/SC readers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Listen address, overrides the config file
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List available PCSC readers
    List {
        /// Show ATR and card type of present cards
        #[arg(short = 'l', long)]
        detailed: bool,

        /// PC/SC context scope
        #[arg(short, long, default_value = "user")]
        scope: ContextScope,
    },
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Some(Commands::Serve { bind, config }) => cmd_serve(bind, config),
        Some(Commands::List { detailed, scope }) => cmd_list(detailed, scope),
        None => cmd_serve(None, None),
    }
}

/// Resolve the configuration from the optional file and CLI overrides
pub fn resolve_config(bind: Option<SocketAddr>, config: Option<PathBuf>) -> Result<ServerConfig> {
    let mut resolved = match config {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };

    if let Some(bind) = bind {
        resolved.bind = bind;
    }

    resolved.auth_settings()?;
    Ok(resolved)
}

fn cmd_serve(bind: Option<SocketAddr>, config: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(bind, config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(server::serve(config))
}

fn cmd_list(detailed: bool, scope: ContextScope) -> Result<()> {
    let transport = PcscTransport::establish(scope.into()).context("Failed to initialize PCSC")?;

    let readers = transport
        .list_readers()
        .context("Failed to list readers")?;

    if readers.is_empty() {
        println!("No PCSC readers found.");
        return Ok(());
    }

    println!("Available PCSC readers:");
    for (i, reader) in readers.iter().enumerate() {
        println!("  [{}] {} ({})", i, reader.name, reader.state);

        if !detailed || reader.state == ReaderState::Empty {
            continue;
        }

        match CardSession::open(&transport, &reader.name) {
            Ok(session) => print_attributes(session.attributes()),
            Err(e) => println!("      Card: unavailable ({e})"),
        }
    }

    Ok(())
}

fn print_attributes(attributes: &CardAttributes) {
    println!("      ATR: {}", format_hex_spaced(attributes.atr()));
    println!("      Vendor: {}", attributes.vendor());
    println!("      Card type: {}", attributes.card_type());
}
