//! End-to-end card operations across all attached readers
//!
//! Readers are tried strictly in enumeration order. Each attempt either
//! yields a result, asks to move on to the next reader, or stops the scan
//! with an error. Nothing is retried.

use crate::core::card::CardAttributes;
use crate::core::error::CardError;
use crate::core::mifare::{
    KeyReference, KeyStructure, MemoryAddress, BLOCK_SIZE, DATA_BLOCK, KEY_LENGTH,
    MANUFACTURER_BLOCK,
};
use crate::core::session::{is_card_ready, CardSession};
use crate::core::transport::{CardConnection, CardTransport, Reader, ReaderState, TransportError};
use crate::core::utils::format_uid;

/// How the reader's key store is prepared before authenticating
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSettings {
    pub key: KeyReference,
    /// Key loaded into the volatile key store before every authentication.
    /// `None` relies on the key already resident in the reader.
    pub load_key: Option<[u8; KEY_LENGTH]>,
}

/// Identity of the first ready card found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    pub uid: String,
    pub attributes: CardAttributes,
    pub reader: String,
}

/// Contents of the data block together with where they came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    pub uid: String,
    pub reader: String,
    pub content: String,
    pub length: usize,
}

/// Result of trying one reader
#[derive(Debug)]
enum Attempt<T> {
    Done(T),
    Skip,
}

/// First reader that produces a result, or the first error that stops the
/// scan. `Ok(None)` when every reader was skipped.
fn first_success<T, F>(readers: &[Reader], mut attempt: F) -> Result<Option<T>, CardError>
where
    F: FnMut(&Reader) -> Result<Attempt<T>, CardError>,
{
    readers
        .iter()
        .map(|reader| match attempt(reader) {
            Err(err) if err.skips_reader() => {
                log::info!("Skipping reader {}: {err}", reader.name);
                Ok(Attempt::Skip)
            }
            other => other,
        })
        .find_map(|outcome| match outcome {
            Ok(Attempt::Skip) => None,
            Ok(Attempt::Done(value)) => Some(Ok(value)),
            Err(err) => Some(Err(err)),
        })
        .transpose()
}

fn enumerate<T: CardTransport>(transport: &T) -> Result<Vec<Reader>, CardError> {
    let readers = transport.list_readers()?;
    if readers.is_empty() {
        log::warn!("No card reader detected");
        return Err(CardError::NoReaderDetected);
    }
    log::debug!("Found {} reader(s)", readers.len());
    Ok(readers)
}

/// Connect and check that the card is powered with a protocol negotiated
fn open_ready<T: CardTransport>(
    transport: &T,
    reader: &Reader,
) -> Result<CardSession<T::Connection>, CardError> {
    let session = CardSession::open(transport, &reader.name).map_err(|err| match err {
        TransportError::CardNotReady => CardError::CardNotReady(reader.name.clone()),
        other => other.into(),
    })?;
    if !is_card_ready(session.presence_state()?) {
        return Err(CardError::CardNotReady(reader.name.clone()));
    }
    Ok(session)
}

fn authenticate<C: CardConnection>(
    session: &mut CardSession<C>,
    address: MemoryAddress,
    auth: &AuthSettings,
) -> Result<bool, CardError> {
    let mut card = session.mifare();
    if let Some(key) = &auth.load_key {
        if !card.load_key(KeyStructure::VolatileMemory, auth.key.slot, key)? {
            log::warn!("Reader rejected the configured key");
            return Ok(false);
        }
    }
    Ok(card.authenticate(address, auth.key)?)
}

fn read_uid<C: CardConnection>(session: &mut CardSession<C>) -> Result<Option<String>, CardError> {
    Ok(session
        .mifare()
        .read_manufacturer_id(0)?
        .map(|uid| format_uid(&uid)))
}

/// UID of a card the operation already acted on.
///
/// Any failure yields an empty UID: past this point the reader must not be
/// skipped, and the completed operation is not reported as failed.
fn uid_after_success<C: CardConnection>(session: &mut CardSession<C>) -> String {
    match read_uid(session) {
        Ok(Some(uid)) => uid,
        Ok(None) => {
            log::warn!("UID unavailable on reader {}", session.reader_name());
            String::new()
        }
        Err(err) => {
            log::warn!("Failed to read UID on reader {}: {err}", session.reader_name());
            String::new()
        }
    }
}

/// Reject payload lengths that do not fill whole blocks of the data area
pub fn validate_length(length: usize) -> Result<(), CardError> {
    let capacity = DATA_BLOCK.data_capacity();
    if length == 0 || length % BLOCK_SIZE != 0 {
        return Err(CardError::InvalidRequest(format!(
            "length must be a positive multiple of {BLOCK_SIZE}, got {length}"
        )));
    }
    if length > capacity {
        return Err(CardError::InvalidRequest(format!(
            "length {length} exceeds the {capacity} bytes available before the sector trailer"
        )));
    }
    Ok(())
}

/// Identify the first ready card: UID, ATR and reader name.
///
/// Readers whose card is missing, not ready, or rejects authentication are
/// skipped.
pub fn scan_cards<T: CardTransport>(
    transport: &T,
    auth: &AuthSettings,
) -> Result<CardInfo, CardError> {
    let readers = enumerate(transport)?;

    first_success(&readers, |reader| {
        if reader.state == ReaderState::Empty {
            return Ok(Attempt::Skip);
        }

        let mut session = open_ready(transport, reader)?;
        if !authenticate(&mut session, MANUFACTURER_BLOCK, auth)? {
            log::warn!("Authentication failed on reader {}", reader.name);
            return Ok(Attempt::Skip);
        }

        match read_uid(&mut session)? {
            Some(uid) => Ok(Attempt::Done(CardInfo {
                uid,
                attributes: session.attributes().clone(),
                reader: reader.name.clone(),
            })),
            None => {
                log::warn!("UID unavailable on reader {}", reader.name);
                Ok(Attempt::Skip)
            }
        }
    })?
    .ok_or(CardError::NoCardFound)
}

/// Write `data` to the data block of the first usable card.
///
/// Returns the reader used and, with `want_uid`, the UID of the written card.
fn write_block<T: CardTransport>(
    transport: &T,
    data: &[u8],
    auth: &AuthSettings,
    want_uid: bool,
) -> Result<(Option<String>, String), CardError> {
    validate_length(data.len())?;
    let readers = enumerate(transport)?;

    first_success(&readers, |reader| {
        if !reader.state.is_usable() {
            return Ok(Attempt::Skip);
        }

        let mut session = open_ready(transport, reader)?;
        // Targeted operation: never fall through to another physical reader
        if !authenticate(&mut session, DATA_BLOCK, auth)? {
            return Err(CardError::AuthenticationFailed);
        }
        if !session.mifare().update_block(DATA_BLOCK, data)? {
            return Err(CardError::OperationFailed(format!(
                "write to reader {} rejected",
                reader.name
            )));
        }
        log::info!("Wrote {} bytes on reader {}", data.len(), reader.name);

        let uid = want_uid.then(|| uid_after_success(&mut session));
        Ok(Attempt::Done((uid, reader.name.clone())))
    })?
    .ok_or_else(|| CardError::ReaderUnavailable("no reader with a usable card".to_string()))
}

/// Store the user identifier in the data block
pub fn provision<T: CardTransport>(
    transport: &T,
    user_id: &str,
    auth: &AuthSettings,
) -> Result<(), CardError> {
    write_block(transport, user_id.as_bytes(), auth, false).map(|_| ())
}

/// Store arbitrary content in the data block and report what was written
pub fn write_data<T: CardTransport>(
    transport: &T,
    content: &str,
    auth: &AuthSettings,
) -> Result<DataRecord, CardError> {
    let (uid, reader) = write_block(transport, content.as_bytes(), auth, true)?;
    Ok(DataRecord {
        uid: uid.unwrap_or_default(),
        reader,
        content: content.to_string(),
        length: content.len(),
    })
}

/// Read `length` bytes from the data block.
///
/// With `target` set only the reader of that name is tried.
pub fn read_data<T: CardTransport>(
    transport: &T,
    target: Option<&str>,
    length: usize,
    auth: &AuthSettings,
) -> Result<DataRecord, CardError> {
    validate_length(length)?;
    let mut readers = enumerate(transport)?;

    if let Some(name) = target {
        readers.retain(|reader| reader.name == name);
        if readers.is_empty() {
            return Err(CardError::ReaderUnavailable(name.to_string()));
        }
    }

    first_success(&readers, |reader| {
        if reader.state == ReaderState::Empty {
            return Ok(Attempt::Skip);
        }

        let mut session = open_ready(transport, reader)?;
        if !authenticate(&mut session, DATA_BLOCK, auth)? {
            return Err(CardError::AuthenticationFailed);
        }

        let data = session
            .mifare()
            .read_block(DATA_BLOCK, length)?
            .ok_or_else(|| {
                CardError::OperationFailed(format!("read from reader {} rejected", reader.name))
            })?;
        let uid = uid_after_success(&mut session);

        Ok(Attempt::Done(DataRecord {
            uid,
            reader: reader.name.clone(),
            length: data.len(),
            content: String::from_utf8_lossy(&data).into_owned(),
        }))
    })?
    .ok_or_else(|| {
        CardError::ReaderUnavailable(target.unwrap_or("no reader with a card").to_string())
    })
}
