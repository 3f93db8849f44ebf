use crate::core::transport::{
    CardConnection, CardTransport, Reader, ReaderState, Transmit, TransportError,
};
use crate::core::utils::format_hex_spaced;
use pcsc::{Card, Context, Disposition, Protocols, Scope, ShareMode, State, Status};
use std::ffi::CString;
use std::time::Duration;

/// PC/SC resource manager context, scoped to one request
pub struct PcscTransport {
    context: Context,
}

impl PcscTransport {
    /// Establish a PC/SC context
    pub fn establish(scope: Scope) -> Result<Self, TransportError> {
        let context = Context::establish(scope)?;
        log::debug!("PC/SC context established");
        Ok(Self { context })
    }

    fn reader_names(&self) -> Result<Vec<CString>, TransportError> {
        let mut readers_buf = vec![0; 2048];
        match self.context.list_readers(&mut readers_buf) {
            Ok(readers) => Ok(readers.map(|name| name.to_owned()).collect()),
            Err(pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl CardTransport for PcscTransport {
    type Connection = PcscConnection;

    fn list_readers(&self) -> Result<Vec<Reader>, TransportError> {
        let names = self.reader_names()?;
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut states: Vec<pcsc::ReaderState> = names
            .iter()
            .map(|name| pcsc::ReaderState::new(name.clone(), State::UNAWARE))
            .collect();

        // Current state only, never wait for a change
        if let Err(err) = self.context.get_status_change(Duration::ZERO, &mut states) {
            log::warn!("Failed to query reader states: {err}");
            return Ok(names
                .iter()
                .map(|name| Reader::new(name.to_string_lossy(), ReaderState::Unknown))
                .collect());
        }

        Ok(states
            .iter()
            .map(|rs| Reader::new(rs.name().to_string_lossy(), presence_from_state(rs.event_state())))
            .collect())
    }

    fn connect(&self, reader_name: &str) -> Result<PcscConnection, TransportError> {
        let reader_cstr = CString::new(reader_name)
            .map_err(|_| TransportError::ReaderUnavailable(format!("invalid name: {reader_name}")))?;
        let card = self
            .context
            .connect(&reader_cstr, ShareMode::Shared, Protocols::ANY)?;

        log::info!("Successfully connected to reader: {reader_name}");
        Ok(PcscConnection { card: Some(card) })
    }
}

/// Shared-mode connection to a card
pub struct PcscConnection {
    card: Option<Card>,
}

impl PcscConnection {
    fn card(&self) -> Result<&Card, TransportError> {
        self.card.as_ref().ok_or(TransportError::NoSmartcard)
    }
}

impl Transmit for PcscConnection {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        log::debug!("Transmitting APDU: {}", format_hex_spaced(apdu));

        let mut response_buf = [0; pcsc::MAX_BUFFER_SIZE];
        let response = self.card()?.transmit(apdu, &mut response_buf)?;

        log::debug!("Received response: {}", format_hex_spaced(response));
        Ok(response.to_vec())
    }
}

impl CardConnection for PcscConnection {
    fn status(&self) -> Result<(ReaderState, Vec<u8>), TransportError> {
        let status = self.card()?.status2_owned()?;
        Ok((presence_from_status(status.status()), status.atr().to_vec()))
    }
}

impl Drop for PcscConnection {
    fn drop(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, err)) = card.disconnect(Disposition::LeaveCard) {
                log::warn!("Failed to disconnect cleanly from card: {err}");
            }
        }
    }
}

/// Reader state as reported by the status change query
fn presence_from_state(state: State) -> ReaderState {
    if state.contains(State::EMPTY) {
        ReaderState::Empty
    } else if state.contains(State::PRESENT) && !state.contains(State::MUTE) {
        ReaderState::Present
    } else {
        ReaderState::Unknown
    }
}

/// Card state as reported by a connected card
fn presence_from_status(status: Status) -> ReaderState {
    if status.contains(Status::PRESENT | Status::POWERED | Status::SPECIFIC) {
        ReaderState::Ready
    } else if status.contains(Status::PRESENT) {
        ReaderState::Present
    } else if status.contains(Status::ABSENT) {
        ReaderState::Empty
    } else {
        ReaderState::Unknown
    }
}
