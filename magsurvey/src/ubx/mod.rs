//! u-blox UBX binary protocol.
//!
//! Receivers configured for binary output send UBX frames:
//!
//! ```text
//! 0xB5 0x62 | class | id | length (u16 LE) | payload | CK_A CK_B
//! ```
//!
//! The checksum is an 8-bit Fletcher sum over class, id, length and payload.
//! [`UbxDecoder`] reassembles frames from an arbitrary byte stream and
//! resynchronises after noise or corrupt frames. [`NavPvt`] decodes the
//! navigation solution into a [`PositionFix`](crate::measurement::PositionFix).

mod nav_pvt;

pub use nav_pvt::{CarrierSolution, NavPvt};

#[cfg(test)]
pub(crate) use nav_pvt::tests::{nav_pvt_frame, PvtFields};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tracing::warn;

/// Frame preamble.
pub const SYNC: [u8; 2] = [0xB5, 0x62];

/// Navigation results class.
pub const CLASS_NAV: u8 = 0x01;

/// Position, velocity and time solution.
pub const ID_NAV_PVT: u8 = 0x07;

/// Sync, class, id and length.
const HEADER_LEN: usize = 6;

/// Longest payload accepted before a length is treated as noise.
const MAX_PAYLOAD_LEN: usize = 8192;

/// Errors from UBX message decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UbxError {
    #[error("unexpected message class 0x{class:02X} id 0x{id:02X}")]
    UnexpectedMessage { class: u8, id: u8 },

    #[error("payload is {actual} bytes, need at least {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("position out of range: {latitude}, {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },

    #[error("receiver reports no fix")]
    NoFix,
}

/// A checksum-verified UBX frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbxFrame {
    pub class: u8,
    pub id: u8,
    pub payload: Bytes,
}

impl UbxFrame {
    pub fn is_nav_pvt(&self) -> bool {
        self.class == CLASS_NAV && self.id == ID_NAV_PVT
    }
}

/// 8-bit Fletcher checksum as used by UBX.
pub fn fletcher(bytes: &[u8]) -> (u8, u8) {
    bytes.iter().fold((0u8, 0u8), |(a, b), &byte| {
        let a = a.wrapping_add(byte);
        (a, b.wrapping_add(a))
    })
}

/// Builds a complete frame with sync bytes and checksum.
///
/// Payloads longer than `u16::MAX` cannot be framed and are truncated.
pub fn encode_frame(class: u8, id: u8, payload: &[u8]) -> Bytes {
    let len = payload.len().min(u16::MAX as usize);
    let mut buf = BytesMut::with_capacity(HEADER_LEN + len + 2);
    buf.put_slice(&SYNC);
    buf.put_u8(class);
    buf.put_u8(id);
    buf.put_u16_le(len as u16);
    buf.put_slice(&payload[..len]);
    let (ck_a, ck_b) = fletcher(&buf[2..]);
    buf.put_u8(ck_a);
    buf.put_u8(ck_b);
    buf.freeze()
}

/// Streaming frame decoder.
///
/// Bytes may arrive in any chunking. Anything before a sync pair is
/// discarded; a frame with a bad checksum or an implausible length is
/// skipped by resuming the search one byte past its sync.
#[derive(Debug, Default)]
pub struct UbxDecoder {
    buffer: BytesMut,
    checksum_errors: u64,
}

impl UbxDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data` and returns every frame it completes.
    pub fn push(&mut self, data: &[u8]) -> Vec<UbxFrame> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Frames dropped for a checksum mismatch so far.
    pub fn checksum_errors(&self) -> u64 {
        self.checksum_errors
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn next_frame(&mut self) -> Option<UbxFrame> {
        loop {
            match self.buffer.windows(2).position(|pair| pair == SYNC) {
                Some(start) => self.buffer.advance(start),
                None => {
                    // A trailing first sync byte may pair with the next chunk
                    let keep = usize::from(self.buffer.last() == Some(&SYNC[0]));
                    let discard = self.buffer.len() - keep;
                    self.buffer.advance(discard);
                    return None;
                }
            }

            if self.buffer.len() < HEADER_LEN {
                return None;
            }
            let len = u16::from_le_bytes([self.buffer[4], self.buffer[5]]) as usize;
            if len > MAX_PAYLOAD_LEN {
                self.buffer.advance(1);
                continue;
            }

            let total = HEADER_LEN + len + 2;
            if self.buffer.len() < total {
                return None;
            }

            let expected = (self.buffer[total - 2], self.buffer[total - 1]);
            let actual = fletcher(&self.buffer[2..HEADER_LEN + len]);
            if expected != actual {
                self.checksum_errors += 1;
                warn!(
                    class = self.buffer[2],
                    id = self.buffer[3],
                    len,
                    "UBX checksum mismatch, resynchronising"
                );
                self.buffer.advance(1);
                continue;
            }

            let mut frame = self.buffer.split_to(total);
            let class = frame[2];
            let id = frame[3];
            frame.advance(HEADER_LEN);
            frame.truncate(len);
            return Some(UbxFrame {
                class,
                id,
                payload: frame.freeze(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_poll_request() {
        // NAV-PVT poll: empty payload
        let frame = encode_frame(CLASS_NAV, ID_NAV_PVT, &[]);
        assert_eq!(&frame[..], &[0xB5, 0x62, 0x01, 0x07, 0x00, 0x00, 0x08, 0x19]);
    }

    #[test]
    fn test_decoder_handles_noise_and_chunking() {
        let first = encode_frame(0x0A, 0x04, b"hello");
        let second = encode_frame(CLASS_NAV, ID_NAV_PVT, &[1, 2, 3]);

        let mut stream = vec![0x00, 0xB5, 0x13, 0x62];
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&[0xFF, 0xB5]);
        stream.extend_from_slice(&second);

        let mut decoder = UbxDecoder::new();
        let mut frames = Vec::new();
        for chunk in stream.chunks(3) {
            frames.extend(decoder.push(chunk));
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].class, 0x0A);
        assert_eq!(&frames[0].payload[..], b"hello");
        assert!(frames[1].is_nav_pvt());
        assert_eq!(&frames[1].payload[..], &[1, 2, 3]);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.checksum_errors(), 0);
    }

    #[test]
    fn test_corrupt_frame_is_skipped() {
        let mut corrupt = encode_frame(CLASS_NAV, ID_NAV_PVT, &[9, 9, 9, 9]).to_vec();
        corrupt[7] ^= 0xFF;
        let good = encode_frame(CLASS_NAV, ID_NAV_PVT, &[4, 5]);

        let mut decoder = UbxDecoder::new();
        assert!(decoder.push(&corrupt).is_empty());
        let frames = decoder.push(&good);

        assert_eq!(decoder.checksum_errors(), 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], &[4, 5]);
    }

    #[test]
    fn test_implausible_length_does_not_stall() {
        let mut decoder = UbxDecoder::new();
        // Length 0xFFFF would otherwise wait for 64 KiB
        assert!(decoder.push(&[0xB5, 0x62, 0x01, 0x07, 0xFF, 0xFF]).is_empty());
        let frames = decoder.push(&encode_frame(0x05, 0x01, &[0x06, 0x01]));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].class, 0x05);
    }

    #[test]
    fn test_partial_frame_waits() {
        let frame = encode_frame(0x0A, 0x04, b"abc");
        let mut decoder = UbxDecoder::new();
        assert!(decoder.push(&frame[..5]).is_empty());
        assert_eq!(decoder.buffered(), 5);
        assert_eq!(decoder.push(&frame[5..]).len(), 1);
    }
}
