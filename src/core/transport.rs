//! Seams between the MIFARE logic and the PC/SC driver

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors reported by the reader transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("No smart card present")]
    NoSmartcard,

    #[error("Card is not powered or did not negotiate a protocol")]
    CardNotReady,

    #[error("Reader is in use by another connection")]
    SharingViolation,

    #[error("Reader unavailable: {0}")]
    ReaderUnavailable(String),

    #[error("PC/SC error: {0}")]
    Pcsc(String),
}

impl From<pcsc::Error> for TransportError {
    fn from(err: pcsc::Error) -> Self {
        match err {
            pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard | pcsc::Error::ResetCard => {
                TransportError::NoSmartcard
            }
            pcsc::Error::UnpoweredCard
            | pcsc::Error::UnresponsiveCard
            | pcsc::Error::UnsupportedCard => TransportError::CardNotReady,
            pcsc::Error::SharingViolation => TransportError::SharingViolation,
            pcsc::Error::UnknownReader | pcsc::Error::ReaderUnavailable => {
                TransportError::ReaderUnavailable(err.to_string())
            }
            other => TransportError::Pcsc(other.to_string()),
        }
    }
}

/// Observable card state of a reader slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReaderState {
    /// No card in the field
    Empty,
    /// Card present, not yet powered or protocol-selected
    Present,
    /// Card present, powered and a protocol negotiated
    Ready,
    Unknown,
}

impl ReaderState {
    /// Whether a connection attempt is worth making
    pub fn is_usable(self) -> bool {
        matches!(self, ReaderState::Present | ReaderState::Ready)
    }
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReaderState::Empty => "empty",
            ReaderState::Present => "card present",
            ReaderState::Ready => "card ready",
            ReaderState::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// A reader as reported by one enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reader {
    pub name: String,
    pub state: ReaderState,
}

impl Reader {
    pub fn new(name: impl Into<String>, state: ReaderState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}

/// Sends one APDU and returns the raw response, status word included
#[cfg_attr(test, mockall::automock)]
pub trait Transmit {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// An open connection to the card in one reader.
///
/// Dropping the connection releases it.
pub trait CardConnection: Transmit {
    /// Current card state and the ATR captured by the driver
    fn status(&self) -> Result<(ReaderState, Vec<u8>), TransportError>;
}

/// Reader enumeration and connection
pub trait CardTransport {
    type Connection: CardConnection;

    /// List readers with their current presence state, in driver order
    fn list_readers(&self) -> Result<Vec<Reader>, TransportError>;

    /// Open a shared connection to the card in the named reader
    fn connect(&self, reader_name: &str) -> Result<Self::Connection, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_states() {
        assert!(!ReaderState::Empty.is_usable());
        assert!(ReaderState::Present.is_usable());
        assert!(ReaderState::Ready.is_usable());
        assert!(!ReaderState::Unknown.is_usable());
    }

    #[test]
    fn test_pcsc_error_mapping() {
        assert_eq!(
            TransportError::from(pcsc::Error::NoSmartcard),
            TransportError::NoSmartcard
        );
        assert_eq!(
            TransportError::from(pcsc::Error::RemovedCard),
            TransportError::NoSmartcard
        );
        assert_eq!(
            TransportError::from(pcsc::Error::SharingViolation),
            TransportError::SharingViolation
        );
        for not_ready in [
            pcsc::Error::UnpoweredCard,
            pcsc::Error::UnresponsiveCard,
            pcsc::Error::UnsupportedCard,
        ] {
            assert_eq!(TransportError::from(not_ready), TransportError::CardNotReady);
        }
        assert!(matches!(
            TransportError::from(pcsc::Error::UnknownReader),
            TransportError::ReaderUnavailable(_)
        ));
        assert!(matches!(
            TransportError::from(pcsc::Error::CommError),
            TransportError::Pcsc(_)
        ));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ReaderState::Empty.to_string(), "empty");
        assert_eq!(ReaderState::Ready.to_string(), "card ready");
    }
}
