//! Serial transport for the PN532: owns the port, serializes commands, and
//! absorbs the device's known post-wake-up quirks.
//!
//! Structured after `dfu/transport.rs`'s `DfuTransport`/`SerialTransport`
//! split: a narrow trait over the raw byte channel so tests can substitute a
//! scripted implementation, and a concrete struct wrapping `serialport`'s
//! trait object for real hardware.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;

use crate::config::{
    BAUD_RATE, HARD_RESET_ASSERT, HARD_RESET_SETTLE, OPEN_RESET_ASSERT, OPEN_RESET_SETTLE,
    WAKE_SLEEP,
};
use crate::error::Pn532Error;
use crate::frame::{self, ACK_FRAME};
use crate::log::{LogDirection, LogSink};
use std::sync::Arc;

/// Raw byte channel the transport drives. Implemented for real hardware by
/// [`SerialPortIo`]; tests substitute a scripted in-memory implementation.
pub trait PortIo: Send {
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize>;
    fn flush(&mut self) -> std::io::Result<()>;
    fn clear_input(&mut self) -> std::io::Result<()>;
    fn set_dtr(&mut self, level: bool) -> std::io::Result<()>;
}

/// `PortIo` backed by a real `serialport::SerialPort`.
pub struct SerialPortIo {
    port: Box<dyn SerialPort>,
}

impl SerialPortIo {
    pub fn open(port_name: &str) -> Result<Self, Pn532Error> {
        let port = serialport::new(port_name, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(50))
            .open()?;
        Ok(Self { port })
    }
}

impl PortIo for SerialPortIo {
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.port.write_all(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        self.port.set_timeout(timeout).map_err(std::io::Error::from)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }

    fn clear_input(&mut self) -> std::io::Result<()> {
        self.port.clear(serialport::ClearBuffer::Input).map_err(std::io::Error::from)
    }

    fn set_dtr(&mut self, level: bool) -> std::io::Result<()> {
        self.port.write_data_terminal_ready(level).map_err(std::io::Error::from)
    }
}

/// Owns the serial port and serializes every command against it. Callers
/// above this layer (the command engine, workflows) never issue a command
/// without going through [`Transport::send_command`], so no two commands
/// are ever in flight on the wire at once.
pub struct Transport {
    port: Option<Box<dyn PortIo>>,
    port_name: String,
    log: Option<Arc<LogSink>>,
}

impl Transport {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self { port: None, port_name: port_name.into(), log: None }
    }

    /// For tests: construct a transport already wired to a scripted
    /// `PortIo`, bypassing real device discovery.
    #[cfg(test)]
    pub fn with_port(port_name: impl Into<String>, port: Box<dyn PortIo>) -> Self {
        Self { port: Some(port), port_name: port_name.into(), log: None }
    }

    /// Attaches the shared log sink every TX/RX/ERR entry is appended to.
    pub fn with_log_sink(mut self, log: Arc<LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn PortIo>, Pn532Error> {
        self.port.as_mut().ok_or(Pn532Error::TransportUnavailable)
    }

    /// Opens the port at 115200 8-N-1 and pulses DTR to force the PN532
    /// into a known post-reset state: assert for 100 ms, release, wait
    /// 1.5 s, then flush any bytes that accumulated during reset.
    pub fn open(&mut self) -> Result<(), Pn532Error> {
        let mut port = SerialPortIo::open(&self.port_name)?;
        port.set_dtr(false)?;
        port.set_dtr(true)?;
        std::thread::sleep(OPEN_RESET_ASSERT);
        port.set_dtr(false)?;
        std::thread::sleep(OPEN_RESET_SETTLE);
        port.clear_input()?;
        self.port = Some(Box::new(port));
        Ok(())
    }

    /// Same DTR pulse as `open`, but with the longer timings used to
    /// recover from a stalled device: assert 500 ms, wait 3 s.
    pub fn hard_reset(&mut self) -> Result<(), Pn532Error> {
        let port = self.port_mut()?;
        port.set_dtr(true)?;
        std::thread::sleep(HARD_RESET_ASSERT);
        port.set_dtr(false)?;
        std::thread::sleep(HARD_RESET_SETTLE);
        port.clear_input()?;
        Ok(())
    }

    /// Writes the HSU wake-up preamble (sixteen `0x55` sync bytes followed
    /// by `00 00 FF`), sleeps 200 ms, flushes input, then issues one
    /// sacrificial `GetFirmwareVersion` whose response is discarded — the
    /// first command after HSU wake is unreliable.
    pub fn wake_up(&mut self) -> Result<(), Pn532Error> {
        let mut preamble = vec![0x55u8; 16];
        preamble.extend_from_slice(&[0x00, 0x00, 0xFF]);
        self.port_mut()?.write_all(&preamble)?;
        std::thread::sleep(WAKE_SLEEP);
        self.port_mut()?.clear_input()?;

        let _ = self.send_command(0x02, &[], Duration::from_millis(500));
        Ok(())
    }

    /// Writes one command frame, requires a 6-byte ACK, then reads the
    /// response within `timeout`. Returns `None` on a bad ACK, a short
    /// read, or a checksum mismatch — the transport never raises for these
    /// expected timing/protocol failures.
    pub fn send_command(&mut self, cmd: u8, params: &[u8], timeout: Duration) -> Option<Vec<u8>> {
        let frame = frame::build(cmd, params);
        let log = self.log.clone();
        log_entry(&log, LogDirection::Tx, &frame);

        let port = self.port.as_mut()?;
        if port.write_all(&frame).is_err() {
            log_entry(&log, LogDirection::Err, &[]);
            return None;
        }

        let mut ack = [0u8; 6];
        let deadline = Instant::now() + timeout;
        if read_exact_by_deadline(port.as_mut(), &mut ack, deadline).is_err() {
            log_entry(&log, LogDirection::Err, &[]);
            return None;
        }
        if ack != ACK_FRAME {
            log_entry(&log, LogDirection::Err, &ack);
            return None;
        }

        let mut reader = |buf: &mut [u8], t: Duration| port.read(buf, t);
        match frame::parse_response(&mut reader, deadline) {
            Ok(payload) => {
                log_entry(&log, LogDirection::Rx, &payload);
                Some(payload)
            }
            Err(_) => {
                log_entry(&log, LogDirection::Err, &[]);
                None
            }
        }
    }

    /// Flushes any bytes sitting unread in the OS input buffer. Used by the
    /// command engine's soft-retry tier ahead of each retried command, so a
    /// stale partial response left over from the failed attempt is never
    /// misread as the next attempt's ACK.
    pub fn clear_input(&mut self) -> Result<(), Pn532Error> {
        self.port_mut()?.clear_input()?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.port = None;
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

fn log_entry(log: &Option<Arc<LogSink>>, direction: LogDirection, bytes: &[u8]) {
    if let Some(sink) = log {
        sink.push(direction, bytes);
    }
}

fn read_exact_by_deadline(
    port: &mut dyn PortIo,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<(), Pn532Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Pn532Error::NoResponse);
        }
        let n = port.read(&mut buf[filled..], remaining).map_err(Pn532Error::Io)?;
        if n == 0 && Instant::now() >= deadline {
            return Err(Pn532Error::NoResponse);
        }
        filled += n;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedPort;
    use super::*;

    fn ack_then(rest: Vec<u8>) -> Vec<Vec<u8>> {
        vec![ACK_FRAME.to_vec(), rest]
    }

    fn response_frame(response_code: u8, payload: &[u8]) -> Vec<u8> {
        let mut data = vec![0xD5, response_code];
        data.extend_from_slice(payload);
        let len = data.len() as u8;
        let lcs = (0u8).wrapping_sub(len);
        let sum = data.iter().fold(0u8, |a, &b| a.wrapping_add(b));
        let dcs = (0u8).wrapping_sub(sum);
        let mut frame = vec![0x00, 0x00, 0xFF, len, lcs];
        frame.extend_from_slice(&data);
        frame.push(dcs);
        frame.push(0x00);
        frame
    }

    #[test]
    fn send_command_returns_payload_on_good_ack_and_frame() {
        let response = response_frame(0x03, &[0x32, 0x01, 0x06, 0x07]);
        let port = ScriptedPort::new(ack_then(response));
        let mut transport = Transport::with_port("COM_TEST", Box::new(port));

        let payload = transport.send_command(0x02, &[], Duration::from_millis(200));
        assert_eq!(payload, Some(vec![0xD5, 0x03, 0x32, 0x01, 0x06, 0x07]));
    }

    #[test]
    fn send_command_returns_none_on_bad_ack() {
        let mut bad_ack = ACK_FRAME;
        bad_ack[3] = 0xFF;
        let port = ScriptedPort::new(vec![bad_ack.to_vec()]);
        let mut transport = Transport::with_port("COM_TEST", Box::new(port));

        let payload = transport.send_command(0x02, &[], Duration::from_millis(50));
        assert_eq!(payload, None);
    }

    #[test]
    fn send_command_returns_none_on_no_response() {
        let port = ScriptedPort::new(vec![ACK_FRAME.to_vec()]);
        let mut transport = Transport::with_port("COM_TEST", Box::new(port));

        let payload = transport.send_command(0x02, &[], Duration::from_millis(50));
        assert_eq!(payload, None);
    }

    #[test]
    fn send_command_without_open_port_returns_none() {
        let mut transport = Transport::new("COM_TEST");
        assert_eq!(transport.send_command(0x02, &[], Duration::from_millis(50)), None);
    }
}
