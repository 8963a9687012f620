//! PN532 "normal information frame" codec.
//!
//! Layout: preamble `00`, start code `00 FF`, `LEN`, `LCS` (two's-complement
//! of `LEN`), data (`TFI` + command/response code + parameters), `DCS`
//! (two's-complement of the data byte sum), postamble `00`. Mirrors the
//! framing/checksum style of `dfu/packet.rs`'s HCI packets, adapted to the
//! PN532's simpler fixed preamble/postamble rather than SLIP encoding.

use std::io;
use std::time::Instant;

use crate::error::Pn532Error;

pub const PREAMBLE: u8 = 0x00;
pub const START_CODE: [u8; 2] = [0x00, 0xFF];
pub const POSTAMBLE: u8 = 0x00;

/// Transport frame identifier, host-to-device direction.
pub const TFI_HOST_TO_PN532: u8 = 0xD4;
/// Transport frame identifier, device-to-host direction.
pub const TFI_PN532_TO_HOST: u8 = 0xD5;

/// Fixed 6-byte ACK frame the PN532 sends after accepting a command.
pub const ACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];

/// Two's-complement of a running byte sum, modulo 256.
fn checksum(sum: u8) -> u8 {
    (0u8).wrapping_sub(sum)
}

/// Builds a normal information frame carrying `cmd` and `params` from the
/// host. `LEN = 2 + params.len()` (TFI + cmd byte included); the caller must
/// keep `params.len() <= 253` so `LEN` fits in one byte.
pub fn build(cmd: u8, params: &[u8]) -> Vec<u8> {
    assert!(params.len() <= 253, "frame params too large for a normal frame");

    let len = 2 + params.len() as u8;
    let lcs = checksum(len);

    let mut data_sum = TFI_HOST_TO_PN532.wrapping_add(cmd);
    for &b in params {
        data_sum = data_sum.wrapping_add(b);
    }
    let dcs = checksum(data_sum);

    let mut frame = Vec::with_capacity(7 + params.len() + 1);
    frame.push(PREAMBLE);
    frame.extend_from_slice(&START_CODE);
    frame.push(len);
    frame.push(lcs);
    frame.push(TFI_HOST_TO_PN532);
    frame.push(cmd);
    frame.extend_from_slice(params);
    frame.push(dcs);
    frame.push(POSTAMBLE);
    frame
}

/// Reads a response frame off `read`, in two stages as the UART delivers it:
/// a fixed 5-byte header (preamble, start code, `LEN`, `LCS`), then
/// `LEN + 2` more bytes (data + `DCS` + postamble). `read` is handed the
/// remaining time budget on each call and returns however many bytes it
/// managed to read (possibly fewer than the buffer, possibly zero on a
/// timeout); call until the buffer fills or the deadline passes.
///
/// Returns the data block starting with the response TFI (`0xD5`) and
/// response code, with `DCS`/postamble stripped.
pub fn parse_response(
    read: &mut dyn FnMut(&mut [u8], std::time::Duration) -> io::Result<usize>,
    deadline: Instant,
) -> Result<Vec<u8>, Pn532Error> {
    let mut header = [0u8; 5];
    read_exact_by_deadline(read, &mut header, deadline)?;

    if header[0] != PREAMBLE || header[1] != START_CODE[0] || header[2] != START_CODE[1] {
        return Err(Pn532Error::NoResponse);
    }
    let len = header[3];
    let lcs = header[4];
    if len.wrapping_add(lcs) != 0 {
        return Err(Pn532Error::NoResponse);
    }

    let mut rest = vec![0u8; len as usize + 2];
    read_exact_by_deadline(read, &mut rest, deadline)?;

    let data = &rest[..len as usize];
    let dcs = rest[len as usize];
    let postamble = rest[len as usize + 1];
    if postamble != POSTAMBLE {
        return Err(Pn532Error::NoResponse);
    }

    let data_sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    if data_sum.wrapping_add(dcs) != 0 {
        return Err(Pn532Error::NoResponse);
    }

    Ok(data.to_vec())
}

/// Accumulates partial reads into `buf` until it is full or `deadline`
/// passes, mirroring `dfu/protocol.rs::wait_for_ack`'s deadline loop.
fn read_exact_by_deadline(
    read: &mut dyn FnMut(&mut [u8], std::time::Duration) -> io::Result<usize>,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<(), Pn532Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Pn532Error::NoResponse);
        }
        let n = read(&mut buf[filled..], remaining)?;
        if n == 0 && Instant::now() >= deadline {
            return Err(Pn532Error::NoResponse);
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scripted_reader(mut chunks: Vec<Vec<u8>>) -> impl FnMut(&mut [u8], Duration) -> io::Result<usize> {
        chunks.reverse();
        move |buf, _timeout| {
            let Some(chunk) = chunks.pop() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            Ok(n)
        }
    }

    #[test]
    fn build_produces_well_formed_checksums() {
        let frame = build(0x02, &[]);
        assert_eq!(frame[0], PREAMBLE);
        assert_eq!(&frame[1..3], &START_CODE);
        let len = frame[3];
        let lcs = frame[4];
        assert_eq!(len.wrapping_add(lcs), 0);
        assert_eq!(len, 2);
        let data = &frame[5..5 + len as usize];
        let dcs = frame[5 + len as usize];
        let sum = data.iter().fold(0u8, |a, &b| a.wrapping_add(b));
        assert_eq!(sum.wrapping_add(dcs), 0);
        assert_eq!(*frame.last().unwrap(), POSTAMBLE);
    }

    #[test]
    fn round_trip_sweep_over_commands_and_param_lengths() {
        for cmd in [0x00u8, 0x01, 0x14, 0x4A, 0x86, 0xFF] {
            for len in [0usize, 1, 5, 59, 253] {
                let params: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
                let frame = build(cmd, &params);

                // Re-derive the response-shaped data block directly (frame
                // layout is symmetric: TFI/cmd/params/DCS sit in the same
                // position whichever direction produced them).
                let data_len = frame[3] as usize;
                let data = &frame[5..5 + data_len];
                assert_eq!(data[0], TFI_HOST_TO_PN532);
                assert_eq!(data[1], cmd);
                assert_eq!(&data[2..], &params[..]);
            }
        }
    }

    #[test]
    fn parse_response_recovers_data_block() {
        let tfi_and_code_and_params = [TFI_PN532_TO_HOST, 0x03, 0x32, 0x01, 0x06, 0x07];
        let len = tfi_and_code_and_params.len() as u8;
        let lcs = checksum(len);
        let sum = tfi_and_code_and_params.iter().fold(0u8, |a, &b| a.wrapping_add(b));
        let dcs = checksum(sum);

        let mut bytes = vec![PREAMBLE, START_CODE[0], START_CODE[1], len, lcs];
        bytes.extend_from_slice(&tfi_and_code_and_params);
        bytes.push(dcs);
        bytes.push(POSTAMBLE);

        let mut reader = scripted_reader(vec![bytes[..5].to_vec(), bytes[5..].to_vec()]);
        let deadline = Instant::now() + Duration::from_millis(500);
        let data = parse_response(&mut reader, deadline).unwrap();
        assert_eq!(data, tfi_and_code_and_params);
    }

    #[test]
    fn parse_response_rejects_bad_checksum() {
        let mut bytes = vec![PREAMBLE, START_CODE[0], START_CODE[1], 0x02, checksum(0x02)];
        bytes.extend_from_slice(&[TFI_PN532_TO_HOST, 0x03]);
        bytes.push(0x00); // wrong DCS
        bytes.push(POSTAMBLE);

        let mut reader = scripted_reader(vec![bytes[..5].to_vec(), bytes[5..].to_vec()]);
        let deadline = Instant::now() + Duration::from_millis(500);
        assert!(matches!(parse_response(&mut reader, deadline), Err(Pn532Error::NoResponse)));
    }

    #[test]
    fn parse_response_times_out_on_short_stream() {
        let mut reader = scripted_reader(vec![vec![PREAMBLE, START_CODE[0]]]);
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(matches!(parse_response(&mut reader, deadline), Err(Pn532Error::NoResponse)));
    }

    #[test]
    fn ack_frame_is_the_fixed_constant() {
        assert_eq!(ACK_FRAME, [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00]);
    }
}
