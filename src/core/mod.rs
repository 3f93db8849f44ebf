pub mod apdu;
pub mod card;
pub mod error;
pub mod mifare;
pub mod orchestrator;
pub mod reader;
pub mod session;
pub mod transport;
pub mod utils;
