//! Fake PC/SC transport emulating readers with MIFARE Classic cards
#![allow(dead_code)]

use card_reader_server::{CardConnection, CardTransport, Reader, ReaderState, Transmit, TransportError};
use std::cell::RefCell;
use std::rc::Rc;

pub const MIFARE_1K_ATR: [u8; 20] = [
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x01, 0x00,
    0x00, 0x00, 0x00, 0x6A,
];

const SUCCESS: [u8; 2] = [0x90, 0x00];
const FAILURE: [u8; 2] = [0x63, 0x00];

/// A card on a fake reader
#[derive(Debug, Clone)]
pub struct FakeCard {
    pub uid: Vec<u8>,
    pub atr: Vec<u8>,
    /// State reported once connected
    pub state: ReaderState,
    pub accept_auth: bool,
    pub accept_key: bool,
    pub accept_read: bool,
    pub accept_write: bool,
    /// Respond with a single byte instead of a full status word
    pub truncate_responses: bool,
    /// Transport error raised by the command with this instruction byte
    pub transmit_error: Option<(u8, TransportError)>,
    /// 64 blocks of 16 bytes, shared between connections
    pub memory: Rc<RefCell<Vec<u8>>>,
}

impl FakeCard {
    pub fn new(uid: &[u8]) -> Self {
        Self {
            uid: uid.to_vec(),
            atr: MIFARE_1K_ATR.to_vec(),
            state: ReaderState::Ready,
            accept_auth: true,
            accept_key: true,
            accept_read: true,
            accept_write: true,
            truncate_responses: false,
            transmit_error: None,
            memory: Rc::new(RefCell::new(vec![0; 1024])),
        }
    }

    /// Fail the command with instruction `ins`, e.g. a card pulled mid-operation
    pub fn failing_on(mut self, ins: u8, err: TransportError) -> Self {
        self.transmit_error = Some((ins, err));
        self
    }

    pub fn block(&self, block: usize) -> Vec<u8> {
        self.memory.borrow()[block * 16..(block + 1) * 16].to_vec()
    }
}

/// A reader slot
#[derive(Debug, Clone)]
pub struct FakeReader {
    pub name: String,
    pub state: ReaderState,
    pub card: Option<FakeCard>,
    pub connect_error: Option<TransportError>,
}

impl FakeReader {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: ReaderState::Empty,
            card: None,
            connect_error: None,
        }
    }

    pub fn with_card(name: &str, card: FakeCard) -> Self {
        Self {
            name: name.to_string(),
            state: ReaderState::Present,
            card: Some(card),
            connect_error: None,
        }
    }

    pub fn failing(name: &str, state: ReaderState, err: TransportError) -> Self {
        Self {
            name: name.to_string(),
            state,
            card: None,
            connect_error: Some(err),
        }
    }
}

/// Everything the fake observed
#[derive(Debug, Default)]
pub struct Activity {
    pub list_calls: usize,
    pub connects: Vec<String>,
    pub disconnects: usize,
    pub apdus: Vec<Vec<u8>>,
}

impl Activity {
    /// APDUs with the given instruction byte
    pub fn sent(&self, ins: u8) -> usize {
        self.apdus.iter().filter(|apdu| apdu.get(1) == Some(&ins)).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    pub readers: Vec<FakeReader>,
    pub activity: Rc<RefCell<Activity>>,
}

impl FakeTransport {
    pub fn new(readers: Vec<FakeReader>) -> Self {
        Self {
            readers,
            activity: Rc::default(),
        }
    }

    pub fn activity(&self) -> std::cell::Ref<'_, Activity> {
        self.activity.borrow()
    }
}

impl CardTransport for FakeTransport {
    type Connection = FakeConnection;

    fn list_readers(&self) -> Result<Vec<Reader>, TransportError> {
        self.activity.borrow_mut().list_calls += 1;
        Ok(self
            .readers
            .iter()
            .map(|r| Reader::new(r.name.clone(), r.state))
            .collect())
    }

    fn connect(&self, reader_name: &str) -> Result<FakeConnection, TransportError> {
        let reader = self
            .readers
            .iter()
            .find(|r| r.name == reader_name)
            .ok_or_else(|| TransportError::ReaderUnavailable(reader_name.to_string()))?;

        if let Some(err) = &reader.connect_error {
            return Err(err.clone());
        }
        let card = reader.card.clone().ok_or(TransportError::NoSmartcard)?;

        self.activity.borrow_mut().connects.push(reader_name.to_string());
        Ok(FakeConnection {
            card,
            authenticated_sector: None,
            activity: Rc::clone(&self.activity),
        })
    }
}

pub struct FakeConnection {
    card: FakeCard,
    authenticated_sector: Option<usize>,
    activity: Rc<RefCell<Activity>>,
}

impl FakeConnection {
    fn respond(&mut self, apdu: &[u8]) -> Vec<u8> {
        match apdu {
            [0xFF, 0x82, _, _, 0x06, ..] => status(self.card.accept_key),
            [0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, msb, lsb, _, _] => {
                let block = u16::from_be_bytes([*msb, *lsb]) as usize;
                if self.card.accept_auth {
                    self.authenticated_sector = Some(block / 4);
                    SUCCESS.to_vec()
                } else {
                    self.authenticated_sector = None;
                    FAILURE.to_vec()
                }
            }
            [0xFF, 0xB0, msb, lsb, le] => {
                let block = u16::from_be_bytes([*msb, *lsb]) as usize;
                let len = if *le == 0 { 256 } else { *le as usize };
                if !self.card.accept_read || self.authenticated_sector != Some(block / 4) {
                    // Stale buffer contents along with the failure
                    let mut stale = vec![0xEE; len];
                    stale.extend_from_slice(&FAILURE);
                    return stale;
                }
                let start = block * 16;
                let mut data = self.card.memory.borrow()[start..start + len].to_vec();
                data.extend_from_slice(&SUCCESS);
                data
            }
            [0xFF, 0xD6, msb, lsb, lc, data @ ..] if data.len() == *lc as usize => {
                let block = u16::from_be_bytes([*msb, *lsb]) as usize;
                if !self.card.accept_write || self.authenticated_sector != Some(block / 4) {
                    return FAILURE.to_vec();
                }
                let start = block * 16;
                self.card.memory.borrow_mut()[start..start + data.len()].copy_from_slice(data);
                SUCCESS.to_vec()
            }
            [0xFF, 0xCA, 0x00, 0x00, _] => {
                let mut data = self.card.uid.clone();
                data.extend_from_slice(&SUCCESS);
                data
            }
            _ => vec![0x6D, 0x00],
        }
    }
}

fn status(ok: bool) -> Vec<u8> {
    if ok {
        SUCCESS.to_vec()
    } else {
        FAILURE.to_vec()
    }
}

impl Transmit for FakeConnection {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.activity.borrow_mut().apdus.push(apdu.to_vec());
        if let Some((ins, err)) = &self.card.transmit_error {
            if apdu.get(1) == Some(ins) {
                return Err(err.clone());
            }
        }
        if self.card.truncate_responses {
            return Ok(vec![0x90]);
        }
        Ok(self.respond(apdu))
    }
}

impl CardConnection for FakeConnection {
    fn status(&self) -> Result<(ReaderState, Vec<u8>), TransportError> {
        Ok((self.card.state, self.card.atr.clone()))
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.activity.borrow_mut().disconnects += 1;
    }
}
