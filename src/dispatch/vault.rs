//! Proprietary flat-buffer Vault profile: SELECT-by-AID, READ BINARY, and
//! WRITE (INS `0xD0`) over a fixed 256-byte buffer.

use crate::config::{VAULT_AID, VAULT_BUFFER_SIZE};

const SW_OK: (u8, u8) = (0x90, 0x00);
const SW_NOT_FOUND: (u8, u8) = (0x6A, 0x82);
const SW_INS_NOT_SUPPORTED: (u8, u8) = (0x6D, 0x00);
const SW_WRONG_LENGTH: (u8, u8) = (0x67, 0x00);

/// Reserved for a possible future `GET VAULT LENGTH` instruction; not
/// matched by `handle_apdu` today, so it falls through to the unknown-INS
/// branch. No driver code in this codebase issues it.
pub const INS_GET_LENGTH: u8 = 0xD1;

pub struct VaultState {
    buffer: [u8; VAULT_BUFFER_SIZE],
    selected: bool,
}

impl VaultState {
    pub fn new(initial_data: &[u8]) -> Self {
        let mut buffer = [0u8; VAULT_BUFFER_SIZE];
        let n = initial_data.len().min(VAULT_BUFFER_SIZE);
        buffer[..n].copy_from_slice(&initial_data[..n]);
        Self { buffer, selected: false }
    }

    pub fn handle_apdu(&mut self, apdu: &[u8]) -> Vec<u8> {
        if apdu.len() < 4 {
            return status(SW_INS_NOT_SUPPORTED);
        }

        let ins = apdu[1];
        let p1 = apdu[2];
        let p2 = apdu[3];

        match ins {
            0xA4 => self.select(p1, &apdu[4..]),
            0xB0 => self.read_binary(p2, apdu.get(4..).unwrap_or(&[])),
            0xD0 => self.write(p2, &apdu[4..]),
            _ => status(SW_INS_NOT_SUPPORTED),
        }
    }

    fn select(&mut self, p1: u8, rest: &[u8]) -> Vec<u8> {
        let lc = rest.first().copied().unwrap_or(0) as usize;
        let data = rest.get(1..1 + lc).unwrap_or(&[]);
        if p1 == 0x04 && data == VAULT_AID {
            self.selected = true;
            return status(SW_OK);
        }
        status(SW_NOT_FOUND)
    }

    /// `P2` is the only offset field this profile reads; the Vault
    /// emulator in this codebase never consults `P1` for the offset, even
    /// though a 16-bit `P1:P2` offset would be needed to reach the full
    /// range its own test fixtures exercise.
    fn read_binary(&self, p2: u8, rest: &[u8]) -> Vec<u8> {
        if !self.selected {
            return status(SW_NOT_FOUND);
        }
        let Some(&le) = rest.last() else {
            return status(SW_INS_NOT_SUPPORTED);
        };
        let offset = p2 as usize;
        let le = le as usize;
        if offset >= VAULT_BUFFER_SIZE {
            return status(SW_NOT_FOUND);
        }
        let end = (offset + le).min(VAULT_BUFFER_SIZE);
        let mut response = self.buffer[offset..end].to_vec();
        response.push(SW_OK.0);
        response.push(SW_OK.1);
        response
    }

    fn write(&mut self, p2: u8, rest: &[u8]) -> Vec<u8> {
        if !self.selected {
            return status(SW_NOT_FOUND);
        }
        let Some(&lc) = rest.first() else {
            return status(SW_WRONG_LENGTH);
        };
        let offset = p2 as usize;
        let lc = lc as usize;
        let data = rest.get(1..1 + lc).unwrap_or(&[]);
        if data.len() != lc || offset + lc > VAULT_BUFFER_SIZE {
            return status(SW_NOT_FOUND);
        }
        self.buffer[offset..offset + lc].copy_from_slice(data);
        status(SW_OK)
    }

    pub fn buffer(&self) -> &[u8; VAULT_BUFFER_SIZE] {
        &self.buffer
    }
}

fn status(sw: (u8, u8)) -> Vec<u8> {
    vec![sw.0, sw.1]
}
