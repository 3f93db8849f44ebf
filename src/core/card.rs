//! Card identification from the answer-to-reset

/// Offset of the registered application provider identifier in a PC/SC
/// contactless ATR
const RID_OFFSET: usize = 7;
const RID_LENGTH: usize = 5;

/// Offset of the card name bytes
const CARD_NAME_OFFSET: usize = 14;

/// Raw ATR captured when the card was connected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardAttributes {
    atr: Vec<u8>,
}

impl CardAttributes {
    pub fn from_atr(atr: impl Into<Vec<u8>>) -> Self {
        Self { atr: atr.into() }
    }

    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    /// Vendor label decoded from the RID
    pub fn vendor(&self) -> &'static str {
        let Some(rid) = self.atr.get(RID_OFFSET..RID_OFFSET + RID_LENGTH) else {
            return "Unknown Vendor";
        };

        match hex::encode_upper(rid).as_str() {
            "A000000306" => "PC/SC Workgroup",
            "A000000396" => "NXP Semiconductors Germany GmbH",
            _ => "Unknown Vendor",
        }
    }

    /// Card type label decoded from the little-endian card name
    pub fn card_type(&self) -> &'static str {
        let name = match self.atr.get(CARD_NAME_OFFSET..CARD_NAME_OFFSET + 2) {
            Some(&[lo, hi]) => i16::from_le_bytes([lo, hi]),
            _ => return "Unknown",
        };

        match name {
            1 => "MIFARE Classic 1K",
            2 => "MIFARE Classic 4K",
            _ => "Unknown",
        }
    }
}
