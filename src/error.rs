//! Crate-wide error type.
//!
//! One flat enum, mirroring `dfu/error.rs`'s `DfuError`: domain-specific
//! variants for conditions the protocol itself defines, plus `#[from]`
//! conversions for the two I/O boundaries (serial port, raw std I/O) that
//! can fail in ways the protocol has no opinion about.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Pn532Error {
    #[error("transport not open")]
    TransportUnavailable,

    /// Covers a missing ACK, a short read, and a bad checksum alike: the
    /// transport layer collapses all three into `None` (see
    /// [`crate::transport::Transport::send_command`]), so callers above it
    /// only ever see "no response".
    #[error("no response from PN532")]
    NoResponse,

    #[error("no card present")]
    NoCard,

    /// Card-side status bytes that indicate a protocol-level rejection
    /// (SW1/SW2 other than `90 00`).
    #[error("card rejected APDU: SW={0:02X}{1:02X}")]
    ApduRejected(u8, u8),

    /// A single status byte reported by the command engine itself (e.g. a
    /// non-zero `TgGetData`/`TgSetData` status byte), distinct from the
    /// two-byte ISO 7816 status word above.
    #[error("command engine reported error status 0x{0:02X}")]
    ApduError(u8),

    #[error("write denied")]
    WriteDenied,

    #[error("payload too large for the addressed buffer")]
    TooLarge,

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serial(#[from] serialport::Error),
}

impl Pn532Error {
    /// Whether a caller driving a workflow loop should retry the same step,
    /// as opposed to surfacing the error immediately. Mirrors `DfuError`'s
    /// `is_retriable`.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Pn532Error::NoResponse | Pn532Error::TransportUnavailable)
    }

    /// Stable short code for log lines and external reporting, mirroring
    /// `DfuError::error_code`.
    pub fn error_code(&self) -> &'static str {
        match self {
            Pn532Error::TransportUnavailable => "transport_unavailable",
            Pn532Error::NoResponse => "no_response",
            Pn532Error::NoCard => "no_card",
            Pn532Error::ApduRejected(_, _) => "apdu_rejected",
            Pn532Error::ApduError(_) => "apdu_error",
            Pn532Error::WriteDenied => "write_denied",
            Pn532Error::TooLarge => "too_large",
            Pn532Error::Cancelled => "cancelled",
            Pn532Error::Io(_) => "io",
            Pn532Error::Serial(_) => "serial",
        }
    }
}

/// Alias kept distinct at the API surface: [`crate::driver::Pn532Driver`]'s
/// methods are documented against `DriverError` because that is the error a
/// caller outside this crate catches, even though today it carries exactly
/// the same variants as the wire-level [`Pn532Error`].
pub type DriverError = Pn532Error;
