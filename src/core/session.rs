//! One connection to the card in one reader

use crate::core::card::CardAttributes;
use crate::core::mifare::MifareClassic;
use crate::core::transport::{CardConnection, CardTransport, ReaderState, TransportError};

/// A card connection scoped to a single operation.
///
/// The connection is released when the session is dropped, on every exit
/// path.
pub struct CardSession<C: CardConnection> {
    reader_name: String,
    connection: C,
    attributes: CardAttributes,
}

impl<C: CardConnection> CardSession<C> {
    /// Connect to the named reader in shared mode and capture the ATR
    pub fn open<T>(transport: &T, reader_name: &str) -> Result<Self, TransportError>
    where
        T: CardTransport<Connection = C>,
    {
        log::info!("Connecting to reader: {reader_name}");
        let connection = transport.connect(reader_name)?;
        let (_, atr) = connection.status()?;

        Ok(Self {
            reader_name: reader_name.to_string(),
            connection,
            attributes: CardAttributes::from_atr(atr),
        })
    }

    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    /// Current card state, queried from the driver
    pub fn presence_state(&self) -> Result<ReaderState, TransportError> {
        self.connection.status().map(|(state, _)| state)
    }

    /// ATR captured when the session was opened
    pub fn attributes(&self) -> &CardAttributes {
        &self.attributes
    }

    /// MIFARE command set bound to this connection
    pub fn mifare(&mut self) -> MifareClassic<'_, C> {
        MifareClassic::new(&mut self.connection)
    }
}

impl<C: CardConnection> Drop for CardSession<C> {
    fn drop(&mut self) {
        log::info!("Disconnected from reader: {}", self.reader_name);
    }
}

/// A card is ready when present, powered and a protocol is negotiated
pub fn is_card_ready(state: ReaderState) -> bool {
    state == ReaderState::Ready
}
