//! Single-APDU exchange over `InDataExchange`, with the ISO-DEP PCB/CID leak
//! workaround, retry-on-short-response, and status-word extraction.

use crate::commands::in_data_exchange;
use crate::config::{APDU_EXCHANGE_TIMEOUT, APDU_INTERFRAME_DELAY, APDU_RETRY_DELAY};
use crate::error::Pn532Error;
use crate::transport::Transport;

/// Sends `apdu` to target `tg` and returns `(sw1, sw2, response_payload)`.
///
/// Steps, numbered to match the six-step exchange this implements:
/// 1. delay 20 ms so an emulated peer can loop back from `TgSetData` to
///    `TgGetData`;
/// 2. `InDataExchange(tg, apdu)` with a 2-second timeout;
/// 3. a missing or too-short response is `NoResponse`;
/// 4. the status byte (third payload byte) must be zero, else
///    `ApduError(status)`;
/// 5. the response bytes after the leading `D5 41 <status>` are extracted;
/// 6. if the first response byte looks like an I-block PCB with the CID bit
///    set (`b & 0xE8 == 0x08`), the PCB and CID bytes are skipped;
/// 7. the trailing two bytes are SW1/SW2; if fewer than two bytes remain,
///    retry once after 100 ms, then fail.
pub fn exchange(transport: &mut Transport, tg: u8, apdu: &[u8]) -> Result<(u8, u8, Vec<u8>), Pn532Error> {
    std::thread::sleep(APDU_INTERFRAME_DELAY);

    let raw = in_data_exchange(transport, tg, apdu, APDU_EXCHANGE_TIMEOUT);
    let status_checked = status_checked_body(raw)?;

    match extract_sw(&status_checked) {
        Some(result) => Ok(result),
        None => {
            std::thread::sleep(APDU_RETRY_DELAY);
            let retry = in_data_exchange(transport, tg, apdu, APDU_EXCHANGE_TIMEOUT);
            let status_checked = status_checked_body(retry)?;
            extract_sw(&status_checked).ok_or(Pn532Error::NoResponse)
        }
    }
}

/// Validates the response exists, is at least 3 bytes, and carries a zero
/// status byte; returns the bytes after `D5 41 <status>`.
fn status_checked_body(raw: Option<Vec<u8>>) -> Result<Vec<u8>, Pn532Error> {
    let payload = raw.ok_or(Pn532Error::NoResponse)?;
    if payload.len() < 3 {
        return Err(Pn532Error::NoResponse);
    }
    let status = payload[2];
    if status != 0x00 {
        return Err(Pn532Error::ApduError(status));
    }
    Ok(payload[3..].to_vec())
}

/// Applies the ISO-DEP leak workaround and splits off SW1/SW2. Returns
/// `None` (rather than an error) when fewer than two bytes remain after the
/// workaround, signalling the caller should retry once.
fn extract_sw(body: &[u8]) -> Option<(u8, u8, Vec<u8>)> {
    let mut body = body;
    if let Some(&first) = body.first() {
        if first & 0xE8 == 0x08 && body.len() >= 2 {
            body = &body[2..];
        }
    }

    if body.len() < 2 {
        return None;
    }
    let sw1 = body[body.len() - 2];
    let sw2 = body[body.len() - 1];
    let response = body[..body.len() - 2].to_vec();
    Some((sw1, sw2, response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_sw_and_payload_without_leak() {
        let body = status_checked_body(Some(vec![0xD5, 0x41, 0x00, 0xAA, 0xBB, 0x90, 0x00])).unwrap();
        let (sw1, sw2, payload) = extract_sw(&body).unwrap();
        assert_eq!((sw1, sw2), (0x90, 0x00));
        assert_eq!(payload, vec![0xAA, 0xBB]);
    }

    #[test]
    fn iso_dep_leak_workaround_strips_pcb_and_cid() {
        let body =
            status_checked_body(Some(vec![0xD5, 0x41, 0x00, 0x08, 0x00, 0xAA, 0xBB, 0x90, 0x00])).unwrap();
        let (sw1, sw2, payload) = extract_sw(&body).unwrap();
        assert_eq!((sw1, sw2), (0x90, 0x00));
        assert_eq!(payload, vec![0xAA, 0xBB]);
    }

    #[test]
    fn iso_dep_leak_workaround_handles_cid_bit_variant() {
        let body =
            status_checked_body(Some(vec![0xD5, 0x41, 0x00, 0x0A, 0x00, 0xAA, 0xBB, 0x90, 0x00])).unwrap();
        let (sw1, sw2, payload) = extract_sw(&body).unwrap();
        assert_eq!((sw1, sw2), (0x90, 0x00));
        assert_eq!(payload, vec![0xAA, 0xBB]);
    }

    #[test]
    fn nonzero_status_is_an_apdu_error() {
        let raw = Some(vec![0xD5, 0x41, 0x7F]);
        assert!(matches!(status_checked_body(raw), Err(Pn532Error::ApduError(0x7F))));
    }

    #[test]
    fn missing_response_is_no_response() {
        assert!(matches!(status_checked_body(None), Err(Pn532Error::NoResponse)));
    }
}
