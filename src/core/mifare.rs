//! MIFARE Classic commands over PC/SC pseudo-APDUs
//!
//! MIFARE Classic 1K layout: 16 sectors of 4 blocks, 16 bytes per block,
//! 64 blocks addressed 0-63. Block 0 holds read-only manufacturer data and
//! the last block of each sector (the sector trailer) holds keys and access
//! bits. The adapter does not guard the trailers; callers only use the
//! addresses defined below.

use crate::core::apdu::{ApduError, Command, Response};
use crate::core::transport::{Transmit, TransportError};
use crate::core::utils::{describe_status_word, format_hex_spaced};
use thiserror::Error;

/// Class byte reserved by PC/SC part 3 for reader pseudo-APDUs
const PSEUDO_CLA: u8 = 0xFF;

const INS_LOAD_KEY: u8 = 0x82;
const INS_GENERAL_AUTHENTICATE: u8 = 0x86;
const INS_READ_BINARY: u8 = 0xB0;
const INS_UPDATE_BINARY: u8 = 0xD6;
const INS_GET_DATA: u8 = 0xCA;

/// Version byte of the general authenticate data object
const AUTHENTICATE_VERSION: u8 = 0x01;

pub const BLOCK_SIZE: usize = 16;
pub const BLOCKS_PER_SECTOR: u16 = 4;
pub const BLOCK_COUNT: u16 = 64;
pub const KEY_LENGTH: usize = 6;

/// Manufacturer block (sector 0, block 0)
pub const MANUFACTURER_BLOCK: MemoryAddress = MemoryAddress::new(0x00, 0x00);

/// Block holding the application's user identifier
pub const DATA_BLOCK: MemoryAddress = MemoryAddress::new(0x00, 0x08);

/// Errors from the protocol adapter
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MifareError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Apdu(#[from] ApduError),
}

/// Block address split into the two parameter bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryAddress {
    pub msb: u8,
    pub lsb: u8,
}

impl MemoryAddress {
    pub const fn new(msb: u8, lsb: u8) -> Self {
        Self { msb, lsb }
    }

    pub const fn block(self) -> u16 {
        ((self.msb as u16) << 8) | self.lsb as u16
    }

    pub const fn sector(self) -> u16 {
        self.block() / BLOCKS_PER_SECTOR
    }

    pub const fn is_sector_trailer(self) -> bool {
        self.block() % BLOCKS_PER_SECTOR == BLOCKS_PER_SECTOR - 1
    }

    /// Bytes that can be read or written from this block before reaching
    /// the sector trailer.
    pub const fn data_capacity(self) -> usize {
        if self.block() >= BLOCK_COUNT || self.is_sector_trailer() {
            return 0;
        }
        let trailer = self.sector() * BLOCKS_PER_SECTOR + BLOCKS_PER_SECTOR - 1;
        (trailer - self.block()) as usize * BLOCK_SIZE
    }
}

/// MIFARE key type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    A = 0x60,
    B = 0x61,
}

/// Reader key store used by `load_key`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStructure {
    VolatileMemory = 0x00,
    NonVolatileMemory = 0x20,
}

/// A key loaded in the reader, referenced during authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyReference {
    pub key_type: KeyType,
    pub slot: u8,
}

impl Default for KeyReference {
    fn default() -> Self {
        Self {
            key_type: KeyType::A,
            slot: 0,
        }
    }
}

/// MIFARE Classic command set bound to one connection.
///
/// Every operation sends exactly one APDU. Success is decided by the status
/// word alone; payload bytes are discarded when it is not 9000 because some
/// readers return stale buffer contents on error.
pub struct MifareClassic<'a, T: Transmit + ?Sized> {
    link: &'a mut T,
}

impl<'a, T: Transmit + ?Sized> MifareClassic<'a, T> {
    pub fn new(link: &'a mut T) -> Self {
        Self { link }
    }

    /// Store a key in the reader's key store for later `authenticate` calls
    pub fn load_key(
        &mut self,
        structure: KeyStructure,
        slot: u8,
        key: &[u8; KEY_LENGTH],
    ) -> Result<bool, MifareError> {
        let cmd = Command::new(PSEUDO_CLA, INS_LOAD_KEY, structure as u8, slot).data(key.to_vec());
        // Key material stays out of the logs
        log::debug!("Load key: structure={structure:?}, slot={slot}");
        Ok(self.exchange(&cmd)?.is_success())
    }

    /// Mutual authentication for the sector holding `address`.
    ///
    /// A rejected handshake is `Ok(false)`, not an error.
    pub fn authenticate(
        &mut self,
        address: MemoryAddress,
        key: KeyReference,
    ) -> Result<bool, MifareError> {
        let cmd = Command::new(PSEUDO_CLA, INS_GENERAL_AUTHENTICATE, 0x00, 0x00).data(vec![
            AUTHENTICATE_VERSION,
            address.msb,
            address.lsb,
            key.key_type as u8,
            key.slot,
        ]);
        log::debug!("General authenticate: {}", format_hex_spaced(&cmd.encode()));
        Ok(self.exchange(&cmd)?.is_success())
    }

    /// Read `length` bytes starting at `address`.
    ///
    /// `None` when the status word is not 9000.
    pub fn read_block(
        &mut self,
        address: MemoryAddress,
        length: usize,
    ) -> Result<Option<Vec<u8>>, MifareError> {
        let cmd = Command::new(PSEUDO_CLA, INS_READ_BINARY, address.msb, address.lsb).le(length);
        log::debug!("Read binary: {}", format_hex_spaced(&cmd.encode()));
        Ok(self.exchange(&cmd)?.into_data())
    }

    /// Write `data` starting at `address`. No read-back verification.
    pub fn update_block(
        &mut self,
        address: MemoryAddress,
        data: &[u8],
    ) -> Result<bool, MifareError> {
        let cmd = Command::new(PSEUDO_CLA, INS_UPDATE_BINARY, address.msb, address.lsb)
            .data(data.to_vec());
        log::debug!("Update binary: {}", format_hex_spaced(&cmd.encode()));
        Ok(self.exchange(&cmd)?.is_success())
    }

    /// Card UID through GET DATA. `size` 0 asks for the full UID.
    pub fn read_manufacturer_id(&mut self, size: usize) -> Result<Option<Vec<u8>>, MifareError> {
        let cmd = Command::new(
            PSEUDO_CLA,
            INS_GET_DATA,
            MANUFACTURER_BLOCK.msb,
            MANUFACTURER_BLOCK.lsb,
        )
        .le(size);
        log::debug!("Get data: {}", format_hex_spaced(&cmd.encode()));
        Ok(self.exchange(&cmd)?.into_data())
    }

    fn exchange(&mut self, cmd: &Command) -> Result<Response, MifareError> {
        let raw = self.link.transmit(&cmd.encode())?;
        let response = Response::decode(&raw)?;
        log::debug!(
            "SW1 SW2 = {:02X} {:02X} ({})",
            response.sw1,
            response.sw2,
            describe_status_word(response.sw1, response.sw2)
        );
        Ok(response)
    }
}
