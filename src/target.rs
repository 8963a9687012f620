//! Decodes the passive-target descriptor returned by `InListPassiveTarget`.
//!
//! Field order and the "ATS length is inclusive of its own length byte"
//! behavior are grounded on the original Python driver's
//! `_parse_14443a_target`.

use serde::Serialize;

use crate::error::Pn532Error;

/// Immutable snapshot of one detected ISO 14443-A passive target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardDescriptor {
    pub uid: Vec<u8>,
    pub atqa: [u8; 2],
    pub sak: u8,
    pub ats: Option<Vec<u8>>,
}

impl CardDescriptor {
    pub fn uid_hex(&self) -> String {
        hex_string(&self.uid)
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parses the payload of an `InListPassiveTarget` response (the bytes after
/// the fixed `D5 4B` header): `NbTg, [Tg, ATQA(2), SAK(1), UIDLen(1),
/// UID(UIDLen), [ATSLen(1), ATS(ATSLen-1)]]`. Returns `Ok(None)` when
/// `NbTg == 0` (no card); only the first reported target is parsed, as this
/// driver never activates multiple targets at once.
pub fn parse_passive_target(data: &[u8]) -> Result<Option<CardDescriptor>, Pn532Error> {
    let mut cursor = data.iter().copied();

    let nb_tg = cursor.next().ok_or(Pn532Error::NoResponse)?;
    if nb_tg == 0 {
        return Ok(None);
    }

    let _tg = cursor.next().ok_or(Pn532Error::NoResponse)?;
    let atqa0 = cursor.next().ok_or(Pn532Error::NoResponse)?;
    let atqa1 = cursor.next().ok_or(Pn532Error::NoResponse)?;
    let sak = cursor.next().ok_or(Pn532Error::NoResponse)?;
    let uid_len = cursor.next().ok_or(Pn532Error::NoResponse)? as usize;

    let uid: Vec<u8> = cursor.by_ref().take(uid_len).collect();
    if uid.len() != uid_len {
        return Err(Pn532Error::NoResponse);
    }

    let ats = match cursor.next() {
        Some(ats_len) => {
            let body_len = (ats_len as usize).saturating_sub(1);
            let body: Vec<u8> = cursor.by_ref().take(body_len).collect();
            if body.len() != body_len {
                return Err(Pn532Error::NoResponse);
            }
            Some(body)
        }
        None => None,
    };

    Ok(Some(CardDescriptor { uid, atqa: [atqa0, atqa1], sak, ats }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_card_without_ats() {
        let data = [0x01, 0x01, 0x00, 0x04, 0x08, 0x04, 0xAA, 0xBB, 0xCC, 0xDD];
        let card = parse_passive_target(&data).unwrap().unwrap();
        assert_eq!(card.uid, vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(card.atqa, [0x00, 0x04]);
        assert_eq!(card.sak, 0x08);
        assert_eq!(card.ats, None);
        assert_eq!(card.uid_hex(), "aabbccdd");
    }

    #[test]
    fn parses_card_with_ats_length_inclusive_of_itself() {
        // ATSLen=4 means 3 bytes of ATS body follow the length byte.
        let data = [0x01, 0x01, 0x00, 0x04, 0x08, 0x04, 0xAA, 0xBB, 0xCC, 0xDD, 0x04, 0x75, 0x77, 0x81];
        let card = parse_passive_target(&data).unwrap().unwrap();
        assert_eq!(card.ats, Some(vec![0x75, 0x77, 0x81]));
    }

    #[test]
    fn no_targets_yields_none() {
        let data = [0x00];
        assert_eq!(parse_passive_target(&data).unwrap(), None);
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let data = [0x01, 0x01, 0x00, 0x04, 0x08, 0x04, 0xAA];
        assert!(parse_passive_target(&data).is_err());
    }
}
