//! Typed wrappers over every PN532 command this driver uses, plus the
//! recovery policy for post-wake-up stalls.
//!
//! Each wrapper lifts `Transport::send_command`'s `Option<Vec<u8>>` into a
//! `Result<Vec<u8>, Pn532Error>` without adding new semantics — `None`
//! becomes `Pn532Error::NoResponse` — the same "never raise for expected
//! timing/ack failures" propagation policy `dfu/protocol.rs::send_and_wait_ack`
//! uses, just expressed as a typed error instead of a retry loop baked into
//! the transport itself.

use std::time::Duration;

use crate::config::{
    DEFAULT_COMMAND_TIMEOUT, LIST_PASSIVE_TARGET_TIMEOUT, SOFT_RETRY_COUNT, SOFT_RETRY_DELAY,
    TARGET_COMMAND_TIMEOUT,
};
use crate::error::Pn532Error;
use crate::transport::Transport;

const CMD_GET_FIRMWARE_VERSION: u8 = 0x02;
const CMD_SET_PARAMETERS: u8 = 0x12;
const CMD_SAM_CONFIGURATION: u8 = 0x14;
const CMD_POWER_DOWN: u8 = 0x16;
const CMD_RF_CONFIGURATION: u8 = 0x32;
const CMD_IN_DATA_EXCHANGE: u8 = 0x40;
const CMD_IN_LIST_PASSIVE_TARGET: u8 = 0x4A;
const CMD_IN_RELEASE: u8 = 0x44;
const CMD_TG_INIT_AS_TARGET: u8 = 0x8C;
const CMD_TG_GET_DATA: u8 = 0x86;
const CMD_TG_SET_DATA: u8 = 0x8E;

/// Emulation-mode `SetParameters` flag: `fAutomaticATR_RES | fISO14443-4_PICC`.
pub const EMULATION_PARAMETERS_FLAG: u8 = 0x24;

fn lift(payload: Option<Vec<u8>>) -> Result<Vec<u8>, Pn532Error> {
    payload.ok_or(Pn532Error::NoResponse)
}

/// Bare `SAMConfiguration` attempt with no recovery — used internally by
/// [`sam_configuration_with_recovery`]'s retry tiers.
fn sam_configuration_once(transport: &mut Transport) -> Option<Vec<u8>> {
    transport.send_command(CMD_SAM_CONFIGURATION, &[0x01, 0x00], DEFAULT_COMMAND_TIMEOUT)
}

/// `SAMConfiguration` with the three-tier recovery policy: up to
/// [`SOFT_RETRY_COUNT`] soft retries (flush + delay); then one hard DTR
/// reset, re-wake, and `SOFT_RETRY_COUNT` more retries; then a full
/// close/open, re-wake, and `SOFT_RETRY_COUNT` more retries; then give up.
pub fn sam_configuration_with_recovery(transport: &mut Transport) -> Result<Vec<u8>, Pn532Error> {
    if let Some(payload) = sam_configuration_once(transport) {
        return Ok(payload);
    }

    for _ in 0..SOFT_RETRY_COUNT {
        transport.clear_input()?;
        std::thread::sleep(SOFT_RETRY_DELAY);
        if let Some(payload) = sam_configuration_once(transport) {
            return Ok(payload);
        }
    }

    transport.hard_reset()?;
    transport.wake_up()?;
    for _ in 0..SOFT_RETRY_COUNT {
        transport.clear_input()?;
        std::thread::sleep(SOFT_RETRY_DELAY);
        if let Some(payload) = sam_configuration_once(transport) {
            return Ok(payload);
        }
    }

    let port_name = transport.port_name().to_string();
    transport.close();
    *transport = Transport::new(port_name);
    transport.open()?;
    transport.wake_up()?;
    for _ in 0..SOFT_RETRY_COUNT {
        transport.clear_input()?;
        std::thread::sleep(SOFT_RETRY_DELAY);
        if let Some(payload) = sam_configuration_once(transport) {
            return Ok(payload);
        }
    }

    Err(Pn532Error::NoResponse)
}

pub struct FirmwareVersion {
    pub ic: u8,
    pub ver: u8,
    pub rev: u8,
    pub support: u8,
}

impl FirmwareVersion {
    /// Formats the IC byte as hex. For `ic == 0x32` this happens to read
    /// "PN532" — the chip's marketing name and its hex IC byte coincide
    /// only for that one value; this formats every IC byte the same way
    /// regardless.
    pub fn device_name(&self) -> String {
        format!("PN5{:02X}", self.ic)
    }
}

pub fn get_firmware_version(transport: &mut Transport) -> Result<FirmwareVersion, Pn532Error> {
    let payload = lift(transport.send_command(CMD_GET_FIRMWARE_VERSION, &[], DEFAULT_COMMAND_TIMEOUT))?;
    let body = payload.get(2..).ok_or(Pn532Error::NoResponse)?;
    if body.len() < 4 {
        return Err(Pn532Error::NoResponse);
    }
    Ok(FirmwareVersion { ic: body[0], ver: body[1], rev: body[2], support: body[3] })
}

pub fn rf_configuration(transport: &mut Transport, item: u8, bytes: &[u8]) -> Result<(), Pn532Error> {
    let mut params = vec![item];
    params.extend_from_slice(bytes);
    lift(transport.send_command(CMD_RF_CONFIGURATION, &params, DEFAULT_COMMAND_TIMEOUT))?;
    Ok(())
}

/// RF tuning every workflow applies before any RF exchange: extended
/// MaxRetries, then analog-A timings tolerant of another PN532 in target
/// mode.
pub fn tune_rf_for_target_mode_peer(transport: &mut Transport) -> Result<(), Pn532Error> {
    rf_configuration(transport, 0x05, &[0xFF, 0x01, 0xFF])?;
    rf_configuration(transport, 0x02, &[0x00, 0x0B, 0x0E])?;
    Ok(())
}

pub fn in_list_passive_target(transport: &mut Transport) -> Result<Vec<u8>, Pn532Error> {
    lift(transport.send_command(
        CMD_IN_LIST_PASSIVE_TARGET,
        &[0x01, 0x00],
        LIST_PASSIVE_TARGET_TIMEOUT,
    ))
}

pub fn in_data_exchange(transport: &mut Transport, tg: u8, apdu: &[u8], timeout: Duration) -> Option<Vec<u8>> {
    let mut params = vec![tg];
    params.extend_from_slice(apdu);
    transport.send_command(CMD_IN_DATA_EXCHANGE, &params, timeout)
}

pub fn in_release(transport: &mut Transport, tg: u8) -> Result<(), Pn532Error> {
    lift(transport.send_command(CMD_IN_RELEASE, &[tg], DEFAULT_COMMAND_TIMEOUT))?;
    Ok(())
}

pub fn power_down(transport: &mut Transport) -> Result<(), Pn532Error> {
    lift(transport.send_command(CMD_POWER_DOWN, &[0xF0], DEFAULT_COMMAND_TIMEOUT))?;
    Ok(())
}

pub fn set_parameters(transport: &mut Transport, flags: u8) -> Result<(), Pn532Error> {
    lift(transport.send_command(CMD_SET_PARAMETERS, &[flags], DEFAULT_COMMAND_TIMEOUT))?;
    Ok(())
}

/// Exact `TgInitAsTarget` parameter layout: mode `0x05` (PassiveOnly |
/// PICCOnly); MIFARE params `04 00 01 02 03 20` (ATQA=0400, 3-byte NFCID1
/// `01 02 03`, SAK=0x20 marking ISO14443-4 compliance); 18 zero FeliCa
/// params; NFCID3t `01..0A`; empty general bytes; historical bytes `80`
/// (category indicator only, required for Android to recognize the
/// emulated Type 4 Tag).
pub fn tg_init_as_target(transport: &mut Transport) -> Option<Vec<u8>> {
    let mut params = vec![0x05u8];
    params.extend_from_slice(&[0x04, 0x00, 0x01, 0x02, 0x03, 0x20]);
    params.extend_from_slice(&[0u8; 18]);
    params.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A]);
    params.push(0x00); // general bytes length
    params.push(0x01); // historical bytes length
    params.push(0x80);
    transport.send_command(CMD_TG_INIT_AS_TARGET, &params, TARGET_COMMAND_TIMEOUT)
}

pub fn tg_get_data(transport: &mut Transport) -> Option<Vec<u8>> {
    transport.send_command(CMD_TG_GET_DATA, &[], TARGET_COMMAND_TIMEOUT)
}

pub fn tg_set_data(transport: &mut Transport, apdu: &[u8]) -> Option<Vec<u8>> {
    transport.send_command(CMD_TG_SET_DATA, apdu, TARGET_COMMAND_TIMEOUT)
}
