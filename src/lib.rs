//! Host driver for the NXP PN532 contactless front-end over UART, plus two
//! card-emulation application profiles layered on ISO/IEC 14443-4: the NFC
//! Forum Type 4 Tag NDEF file system and a proprietary flat-buffer "Vault".
//!
//! This crate covers the wire protocol, the initiator workflows (scan,
//! read/write NDEF, read/write Vault) and the target-mode emulation loop.
//! NDEF record encoding, an HTTP surface, device auto-discovery and any UI
//! are deliberately left to external collaborators.

pub mod apdu;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod emulation;
pub mod error;
pub mod frame;
pub mod log;
pub mod target;
pub mod transport;
pub mod workflows;

pub use dispatch::Dispatcher;
pub use driver::{
    DriverFailure, EmulationHandle, EmulationStatus, NdefRead, NdefWrite, Pn532Driver, ScanOutcome,
    VaultRead, VaultWrite,
};
pub use error::{DriverError, Pn532Error};
pub use log::{LogDirection, LogEntry};
pub use target::CardDescriptor;
