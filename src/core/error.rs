use crate::core::apdu::ApduError;
use crate::core::mifare::MifareError;
use crate::core::transport::TransportError;
use thiserror::Error;

/// Outcome of a card operation that did not succeed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CardError {
    #[error("No card reader detected")]
    NoReaderDetected,

    #[error("Card reader unavailable: {0}")]
    ReaderUnavailable(String),

    #[error("Card in reader {0} is not ready")]
    CardNotReady(String),

    #[error("No smart card present")]
    NoCardPresent,

    #[error("No ready card found")]
    NoCardFound,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Reader communication failed: {0}")]
    Transport(TransportError),
}

impl CardError {
    /// Whether the orchestrator should move on to the next reader
    pub fn skips_reader(&self) -> bool {
        matches!(
            self,
            CardError::CardNotReady(_)
                | CardError::NoCardPresent
                | CardError::Transport(TransportError::CardNotReady)
                | CardError::Transport(TransportError::SharingViolation)
                | CardError::Transport(TransportError::ReaderUnavailable(_))
        )
    }
}

impl From<TransportError> for CardError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NoSmartcard => CardError::NoCardPresent,
            other => CardError::Transport(other),
        }
    }
}

impl From<MifareError> for CardError {
    fn from(err: MifareError) -> Self {
        match err {
            MifareError::Transport(err) => err.into(),
            // A truncated response is a failed operation
            MifareError::Apdu(ApduError::MalformedResponse(len)) => {
                CardError::OperationFailed(format!("malformed response ({len} bytes)"))
            }
        }
    }
}
