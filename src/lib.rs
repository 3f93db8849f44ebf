/// Card Reader Server - HTTP access to MIFARE Classic cards
///
/// This library reads and writes a user identifier stored on MIFARE Classic
/// 1K cards through PC/SC-compatible readers, and exposes those operations
/// over a small JSON HTTP API.
pub mod cli;
pub mod config;
pub mod core;
pub mod http;

// Re-export commonly used types
pub use crate::core::{
    error::CardError,
    orchestrator::{AuthSettings, CardInfo, DataRecord},
    reader::PcscTransport,
    transport::{CardConnection, CardTransport, Reader, ReaderState, Transmit, TransportError},
    utils::{format_uid, parse_hex},
};

// Common error type
pub type Result<T> = anyhow::Result<T>;
