//! ISO 7816-4 short-form APDU framing

use thiserror::Error;

/// Largest command data field in short form
pub const MAX_SHORT_DATA: usize = 255;

/// Largest expected length in short form (encoded as 0x00)
pub const MAX_SHORT_LE: usize = 256;

/// Errors raised while decoding a card response
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApduError {
    #[error("Malformed response: expected at least 2 bytes, got {0}")]
    MalformedResponse(usize),
}

/// A command APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    /// Expected response length. `Some(0)` and `Some(256)` both encode as 0x00.
    pub le: Option<usize>,
}

impl Command {
    /// Create a command without data or expected length (case 1)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Set command data
    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Set expected response length
    pub fn le(mut self, le: usize) -> Self {
        self.le = Some(le);
        self
    }

    /// Serialize the command.
    ///
    /// Panics when the data or expected length do not fit the short form.
    pub fn encode(&self) -> Vec<u8> {
        assert!(
            self.data.len() <= MAX_SHORT_DATA,
            "APDU data field too long for short form: {} bytes",
            self.data.len()
        );

        let mut apdu = Vec::with_capacity(4 + 1 + self.data.len() + 1);
        apdu.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);

        if !self.data.is_empty() {
            apdu.push(self.data.len() as u8);
            apdu.extend_from_slice(&self.data);
        }

        if let Some(le) = self.le {
            assert!(
                le <= MAX_SHORT_LE,
                "APDU expected length too large for short form: {le}"
            );
            // 256 wraps to 0x00, as does an explicit "any length" request
            apdu.push((le % MAX_SHORT_LE) as u8);
        }

        apdu
    }
}

/// A decoded response APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response data (without status word)
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl Response {
    /// Split a raw transport response into payload and status word.
    pub fn decode(raw: &[u8]) -> Result<Self, ApduError> {
        if raw.len() < 2 {
            return Err(ApduError::MalformedResponse(raw.len()));
        }

        let (data, sw) = raw.split_at(raw.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            sw1: sw[0],
            sw2: sw[1],
        })
    }

    /// True iff the status word is 9000
    pub fn is_success(&self) -> bool {
        is_success(self.sw1, self.sw2)
    }

    /// The status word as a 16-bit value
    pub fn status_word(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    /// Payload bytes, only when the status word signals success.
    pub fn into_data(self) -> Option<Vec<u8>> {
        if self.is_success() {
            Some(self.data)
        } else {
            None
        }
    }
}

/// Status word predicate: 0x90 0x00 and nothing else is a success.
pub fn is_success(sw1: u8, sw2: u8) -> bool {
    sw1 == 0x90 && sw2 == 0x00
}
