//! Initiator workflows: scan, read/write NDEF, read/write Vault. Each is a
//! linear sequence of commands sharing a preamble (open, wake, configure,
//! list passive target) and a postamble (release, power down), grounded on
//! the original Python driver's `scan_type_a` orchestration and on
//! `dfu/protocol.rs::upload_firmware`'s staged-orchestration shape.

use crate::apdu;
use crate::commands::{
    get_firmware_version, in_list_passive_target, in_release, power_down, sam_configuration_with_recovery,
    tune_rf_for_target_mode_peer,
};
use crate::config::{NDEF_READ_CHUNK, NDEF_WRITE_CHUNK, TYPE4_NDEF_AID, VAULT_AID};
use crate::error::Pn532Error;
use crate::target::{self, CardDescriptor};
use crate::transport::Transport;

const TG: u8 = 0x01;

/// Runs the shared preamble (`open → wake → SAMConfiguration →
/// GetFirmwareVersion → RFConfiguration(x2) → InListPassiveTarget →
/// parse`) and returns the detected card, if any.
fn preamble(transport: &mut Transport) -> Result<Option<CardDescriptor>, Pn532Error> {
    if !transport.is_open() {
        transport.open()?;
    }
    transport.wake_up()?;
    sam_configuration_with_recovery(transport)?;
    let _ = get_firmware_version(transport)?;
    tune_rf_for_target_mode_peer(transport)?;
    let payload = in_list_passive_target(transport)?;
    target::parse_passive_target(&payload[2..])
}

/// Runs the shared postamble (`InRelease → PowerDown`), swallowing
/// individual failures so a postamble step never masks the workflow's own
/// result — both are best-effort once a target has possibly been
/// activated. The serial handle itself stays open across workflows; it is
/// only closed by the caller on a fatal transport error (§5's "opened
/// lazily on first use and closed on fatal serial error").
fn postamble(transport: &mut Transport) {
    let _ = in_release(transport, TG);
    let _ = power_down(transport);
}

/// Runs `body` between the shared preamble and postamble, always executing
/// the postamble even if `body` or the preamble itself fails partway
/// through a target activation.
fn with_preamble<T>(
    transport: &mut Transport,
    body: impl FnOnce(&mut Transport, Option<CardDescriptor>) -> Result<T, Pn532Error>,
) -> Result<T, Pn532Error> {
    let card = preamble(transport);
    let result = match card {
        Ok(card) => body(transport, card),
        Err(e) => Err(e),
    };
    postamble(transport);
    result
}

pub struct ScanOutcome {
    pub card: Option<CardDescriptor>,
}

pub fn scan(transport: &mut Transport) -> Result<ScanOutcome, Pn532Error> {
    with_preamble(transport, |_t, card| Ok(ScanOutcome { card }))
}

pub struct NdefRead {
    pub card: CardDescriptor,
    pub raw_bytes: Vec<u8>,
}

fn select_ndef_application(transport: &mut Transport) -> Result<(), Pn532Error> {
    let mut apdu_bytes = vec![0x00, 0xA4, 0x04, 0x00, TYPE4_NDEF_AID.len() as u8];
    apdu_bytes.extend_from_slice(&TYPE4_NDEF_AID);
    apdu_bytes.push(0x00);
    expect_ok(apdu::exchange(transport, TG, &apdu_bytes)?)
}

fn select_file(transport: &mut Transport, file_id: u16) -> Result<(), Pn532Error> {
    let apdu_bytes = vec![0x00, 0xA4, 0x00, 0x0C, 0x02, (file_id >> 8) as u8, (file_id & 0xFF) as u8];
    expect_ok(apdu::exchange(transport, TG, &apdu_bytes)?)
}

fn read_binary(transport: &mut Transport, offset: u16, length: u8) -> Result<Vec<u8>, Pn532Error> {
    let apdu_bytes = vec![0x00, 0xB0, (offset >> 8) as u8, (offset & 0xFF) as u8, length];
    let (sw1, sw2, body) = apdu::exchange(transport, TG, &apdu_bytes)?;
    if (sw1, sw2) != (0x90, 0x00) {
        return Err(Pn532Error::ApduRejected(sw1, sw2));
    }
    Ok(body)
}

fn expect_ok(result: (u8, u8, Vec<u8>)) -> Result<(), Pn532Error> {
    let (sw1, sw2, _) = result;
    if (sw1, sw2) == (0x90, 0x00) {
        Ok(())
    } else {
        Err(Pn532Error::ApduRejected(sw1, sw2))
    }
}

pub fn read_ndef(transport: &mut Transport) -> Result<NdefRead, Pn532Error> {
    with_preamble(transport, |transport, card| {
        let card = card.ok_or(Pn532Error::NoCard)?;

        select_ndef_application(transport)?;
        select_file(transport, crate::config::CC_FILE_ID)?;
        let cc = read_binary(transport, 0, 15)?;
        let ndef_file_id = u16::from_be_bytes([cc[9], cc[10]]);

        select_file(transport, ndef_file_id)?;
        let len_bytes = read_binary(transport, 0, 2)?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;

        let mut raw_bytes = Vec::with_capacity(len);
        let mut offset: u16 = 2;
        while raw_bytes.len() < len {
            let remaining = len - raw_bytes.len();
            let chunk_len = remaining.min(NDEF_READ_CHUNK) as u8;
            let chunk = read_binary(transport, offset, chunk_len)?;
            if chunk.is_empty() {
                break;
            }
            raw_bytes.extend_from_slice(&chunk);
            offset += chunk.len() as u16;
        }

        Ok(NdefRead { card, raw_bytes })
    })
}

pub struct NdefWrite {
    pub card: CardDescriptor,
    pub bytes_written: usize,
}

fn update_binary(transport: &mut Transport, offset: u16, data: &[u8]) -> Result<(), Pn532Error> {
    let mut apdu_bytes = vec![0x00, 0xD6, (offset >> 8) as u8, (offset & 0xFF) as u8, data.len() as u8];
    apdu_bytes.extend_from_slice(data);
    expect_ok(apdu::exchange(transport, TG, &apdu_bytes)?)
}

pub fn write_ndef(transport: &mut Transport, message: &[u8]) -> Result<NdefWrite, Pn532Error> {
    with_preamble(transport, |transport, card| {
        let card = card.ok_or(Pn532Error::NoCard)?;

        select_ndef_application(transport)?;
        select_file(transport, crate::config::CC_FILE_ID)?;
        let cc = read_binary(transport, 0, 15)?;

        let write_access = cc[14];
        if write_access != 0x00 {
            return Err(Pn532Error::WriteDenied);
        }
        let max_size = u16::from_be_bytes([cc[11], cc[12]]) as usize;
        if 2 + message.len() > max_size {
            return Err(Pn532Error::TooLarge);
        }
        let mlc = u16::from_be_bytes([cc[5], cc[6]]) as usize;
        let ndef_file_id = u16::from_be_bytes([cc[9], cc[10]]);

        select_file(transport, ndef_file_id)?;
        update_binary(transport, 0, &[0x00, 0x00])?;

        let chunk_size = mlc.min(NDEF_WRITE_CHUNK).max(1);
        let mut offset: u16 = 2;
        for chunk in message.chunks(chunk_size) {
            update_binary(transport, offset, chunk)?;
            offset += chunk.len() as u16;
        }

        let len = message.len() as u16;
        update_binary(transport, 0, &len.to_be_bytes())?;

        Ok(NdefWrite { card, bytes_written: message.len() })
    })
}

pub struct VaultRead {
    pub card: CardDescriptor,
    pub bytes: Vec<u8>,
}

fn select_vault_application(transport: &mut Transport) -> Result<(), Pn532Error> {
    let mut apdu_bytes = vec![0x00, 0xA4, 0x04, 0x00, VAULT_AID.len() as u8];
    apdu_bytes.extend_from_slice(&VAULT_AID);
    expect_ok(apdu::exchange(transport, TG, &apdu_bytes)?)
}

pub fn read_vault(transport: &mut Transport, offset: u8, length: u8) -> Result<VaultRead, Pn532Error> {
    with_preamble(transport, |transport, card| {
        let card = card.ok_or(Pn532Error::NoCard)?;
        select_vault_application(transport)?;

        let apdu_bytes = vec![0x00, 0xB0, 0x00, offset, length];
        let (sw1, sw2, body) = apdu::exchange(transport, TG, &apdu_bytes)?;
        if (sw1, sw2) != (0x90, 0x00) {
            return Err(Pn532Error::ApduRejected(sw1, sw2));
        }
        Ok(VaultRead { card, bytes: body })
    })
}

pub struct VaultWrite {
    pub card: CardDescriptor,
    pub bytes_written: usize,
}

pub fn write_vault(transport: &mut Transport, offset: u8, data: &[u8]) -> Result<VaultWrite, Pn532Error> {
    with_preamble(transport, |transport, card| {
        let card = card.ok_or(Pn532Error::NoCard)?;
        select_vault_application(transport)?;

        let mut apdu_bytes = vec![0x00, 0xD0, 0x00, offset, data.len() as u8];
        apdu_bytes.extend_from_slice(data);
        let (sw1, sw2, _) = apdu::exchange(transport, TG, &apdu_bytes)?;
        if (sw1, sw2) != (0x90, 0x00) {
            return Err(Pn532Error::ApduRejected(sw1, sw2));
        }
        Ok(VaultWrite { card, bytes_written: data.len() })
    })
}
