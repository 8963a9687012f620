//! NFC Forum Type 4 Tag virtual file system: the Capability Container file
//! and the NDEF file, handling SELECT-by-AID, SELECT-by-file-id, and READ
//! BINARY. UPDATE BINARY is present only so it can be rejected — this
//! emulated tag is read-only over the air; its content is fixed when the
//! dispatcher is created ([`Type4State::new`]).

use crate::config::{CC_FILE_ID, NDEF_FILE_ID, NDEF_MAX_MESSAGE_SIZE, TYPE4_NDEF_AID};

const SW_OK: (u8, u8) = (0x90, 0x00);
const SW_NOT_FOUND: (u8, u8) = (0x6A, 0x82);
const SW_INS_NOT_SUPPORTED: (u8, u8) = (0x6D, 0x00);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectedFile {
    None,
    Cc,
    Ndef,
}

/// Emulated Type 4 Tag state: the NDEF message content and which file (if
/// any) is currently selected.
pub struct Type4State {
    ndef_message: Vec<u8>,
    selected: SelectedFile,
}

impl Type4State {
    pub fn new(initial_message: Vec<u8>) -> Self {
        let mut ndef_message = initial_message;
        ndef_message.truncate(NDEF_MAX_MESSAGE_SIZE);
        Self { ndef_message, selected: SelectedFile::None }
    }

    fn cc_file(&self) -> [u8; 15] {
        let max_size = (2 + NDEF_MAX_MESSAGE_SIZE) as u16;
        [
            0x00,
            0x0F, // CCLEN
            0x20, // MappingVersion
            0x00,
            0x3B, // MLe
            0x00,
            0x34, // MLc
            0x04, // NDEF-TLV type
            0x06, // NDEF-TLV len
            (NDEF_FILE_ID >> 8) as u8,
            (NDEF_FILE_ID & 0xFF) as u8,
            (max_size >> 8) as u8,
            (max_size & 0xFF) as u8,
            0x00, // read access
            0xFF, // write access (this emulator never allows UPDATE BINARY)
        ]
    }

    fn ndef_file(&self) -> Vec<u8> {
        let len = self.ndef_message.len() as u16;
        let mut file = vec![(len >> 8) as u8, (len & 0xFF) as u8];
        file.extend_from_slice(&self.ndef_message);
        file
    }

    /// Dispatches one C-APDU, returning the R-APDU bytes (payload followed
    /// by SW1/SW2). The CLA byte is never checked — a historical ISO
    /// relaxation this profile inherits.
    pub fn handle_apdu(&mut self, apdu: &[u8]) -> Vec<u8> {
        if apdu.len() < 4 {
            return status(SW_INS_NOT_SUPPORTED);
        }

        let ins = apdu[1];
        let p1 = apdu[2];
        let p2 = apdu[3];

        match ins {
            0xA4 => self.select(p1, p2, &apdu[4..]),
            0xB0 => self.read_binary(p1, p2, apdu.get(4..).unwrap_or(&[])),
            0xD6 => status(SW_NOT_FOUND),
            _ => status(SW_INS_NOT_SUPPORTED),
        }
    }

    fn select(&mut self, p1: u8, _p2: u8, rest: &[u8]) -> Vec<u8> {
        let lc = rest.first().copied().unwrap_or(0) as usize;
        let data = rest.get(1..1 + lc).unwrap_or(&[]);

        if p1 == 0x04 && data == TYPE4_NDEF_AID {
            return status(SW_OK);
        }
        if p1 == 0x00 && data.len() == 2 {
            let file_id = u16::from_be_bytes([data[0], data[1]]);
            if file_id == CC_FILE_ID {
                self.selected = SelectedFile::Cc;
                return status(SW_OK);
            }
            if file_id == NDEF_FILE_ID {
                self.selected = SelectedFile::Ndef;
                return status(SW_OK);
            }
        }
        status(SW_NOT_FOUND)
    }

    fn read_binary(&self, p1: u8, p2: u8, rest: &[u8]) -> Vec<u8> {
        let Some(&le) = rest.last() else {
            return status(SW_INS_NOT_SUPPORTED);
        };
        let offset = ((p1 as usize) << 8) | p2 as usize;
        let le = le as usize;

        let file: Vec<u8> = match self.selected {
            SelectedFile::None => return status(SW_NOT_FOUND),
            SelectedFile::Cc => self.cc_file().to_vec(),
            SelectedFile::Ndef => self.ndef_file(),
        };

        if offset > file.len() {
            return status(SW_NOT_FOUND);
        }
        let end = (offset + le).min(file.len());
        let mut response = file[offset..end].to_vec();
        response.push(SW_OK.0);
        response.push(SW_OK.1);
        response
    }

    pub fn ndef_message(&self) -> &[u8] {
        &self.ndef_message
    }
}

fn status(sw: (u8, u8)) -> Vec<u8> {
    vec![sw.0, sw.1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_aid() -> Vec<u8> {
        let mut apdu = vec![0x00, 0xA4, 0x04, 0x00, TYPE4_NDEF_AID.len() as u8];
        apdu.extend_from_slice(&TYPE4_NDEF_AID);
        apdu.push(0x00);
        apdu
    }

    fn select_file(id: u16) -> Vec<u8> {
        vec![0x00, 0xA4, 0x00, 0x0C, 0x02, (id >> 8) as u8, (id & 0xFF) as u8]
    }

    fn read_binary(offset: u16, le: u8) -> Vec<u8> {
        vec![0x00, 0xB0, (offset >> 8) as u8, (offset & 0xFF) as u8, le]
    }

    #[test]
    fn read_before_select_is_rejected() {
        let mut state = Type4State::new(vec![]);
        let resp = state.handle_apdu(&read_binary(0, 15));
        assert_eq!(resp, vec![0x6A, 0x82]);
    }

    #[test]
    fn cc_file_has_correct_layout_and_max_size() {
        let mut state = Type4State::new(vec![]);
        assert_eq!(state.handle_apdu(&select_aid()), vec![0x90, 0x00]);
        assert_eq!(state.handle_apdu(&select_file(CC_FILE_ID)), vec![0x90, 0x00]);

        let resp = state.handle_apdu(&read_binary(0, 15));
        assert_eq!(resp.len(), 17);
        assert_eq!(&resp[15..], &[0x90, 0x00]);
        let cc = &resp[..15];
        assert_eq!(&cc[0..2], &[0x00, 0x0F]);
        assert_eq!(cc[2], 0x20);
        assert_eq!(&cc[9..11], &[0xE1, 0x04]);
        let max_size = u16::from_be_bytes([cc[11], cc[12]]);
        assert_eq!(max_size as usize, 2 + NDEF_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn ndef_read_returns_big_endian_length_then_body() {
        let message = vec![0xD1, 0x01, 0x0C];
        let mut state = Type4State::new(message.clone());
        state.handle_apdu(&select_aid());
        state.handle_apdu(&select_file(NDEF_FILE_ID));

        let len_resp = state.handle_apdu(&read_binary(0, 2));
        assert_eq!(len_resp, vec![0x00, 0x03, 0x90, 0x00]);

        let body_resp = state.handle_apdu(&read_binary(2, 59));
        assert_eq!(&body_resp[..3], &message[..]);
        assert_eq!(&body_resp[3..], &[0x90, 0x00]);
        assert_eq!(state.ndef_message(), &message[..]);
    }

    #[test]
    fn read_past_end_of_file_is_truncated_not_out_of_bounds() {
        let mut state = Type4State::new(vec![0xAA; 3]);
        state.handle_apdu(&select_aid());
        state.handle_apdu(&select_file(NDEF_FILE_ID));
        let resp = state.handle_apdu(&read_binary(0, 255));
        // ndef file is 2 (len prefix) + 3 = 5 bytes total
        assert_eq!(resp.len(), 5 + 2);
        assert_eq!(&resp[resp.len() - 2..], &[0x90, 0x00]);
    }

    #[test]
    fn update_binary_is_always_rejected() {
        let mut state = Type4State::new(vec![]);
        state.handle_apdu(&select_aid());
        state.handle_apdu(&select_file(NDEF_FILE_ID));
        let resp = state.handle_apdu(&[0x00, 0xD6, 0x00, 0x00, 0x02, 0x00, 0x00]);
        assert_eq!(resp, vec![0x6A, 0x82]);
    }

    #[test]
    fn unknown_instruction_and_short_apdu_are_6d00() {
        let mut state = Type4State::new(vec![]);
        assert_eq!(state.handle_apdu(&[0x00, 0xCA, 0x00, 0x00]), vec![0x6D, 0x00]);
        assert_eq!(state.handle_apdu(&[0x00, 0xA4, 0x04]), vec![0x6D, 0x00]);
    }
}
