//! Delimiter framing for the chat protocol.
//!
//! Every frame is the UTF-8 text of one command followed by [`DELIMITER`].
//! The delimiter bytes `0xFF 0xFE` never occur in well-formed UTF-8, so any
//! `&str` can be framed without escaping.
//!
//! TCP is free to split or coalesce frames across reads. [`FrameDecoder`]
//! keeps the unterminated tail of each read (the carry) and prepends it to
//! the next one.

use crate::error::FrameError;
use bytes::{Buf, Bytes, BytesMut};

/// Frame terminator.
pub const DELIMITER: &[u8] = b"\xFF\xFE";

/// Default upper bound for a single frame or an unterminated carry.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Encode `text` as one frame.
pub fn encode(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + DELIMITER.len());
    encode_into(text, &mut buf);
    buf.freeze()
}

/// Append the frame for `text` to `buf`.
pub fn encode_into(text: &str, buf: &mut BytesMut) {
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(DELIMITER);
}

/// Incremental decoder holding the partial-frame carry of one stream.
#[derive(Debug)]
pub struct FrameDecoder {
    carry: BytesMut,
    /// Offset in `carry` before which no delimiter can start.
    scanned: usize,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            carry: BytesMut::new(),
            scanned: 0,
            max_frame_size,
        }
    }

    /// Feed freshly read bytes and return every frame they complete.
    ///
    /// Bytes after the last delimiter stay buffered for the next call.
    pub fn decode(&mut self, input: &[u8]) -> Result<Vec<String>, FrameError> {
        self.carry.extend_from_slice(input);

        let mut frames = Vec::new();
        while let Some(pos) = find_delimiter(&self.carry, self.scanned) {
            if pos > self.max_frame_size {
                return Err(FrameError::TooLarge {
                    len: pos,
                    limit: self.max_frame_size,
                });
            }

            let frame = self.carry.split_to(pos);
            self.carry.advance(DELIMITER.len());
            self.scanned = 0;

            let text = String::from_utf8(frame.to_vec()).map_err(|_| FrameError::InvalidUtf8)?;
            frames.push(text);
        }

        if self.carry.len() > self.max_frame_size {
            return Err(FrameError::TooLarge {
                len: self.carry.len(),
                limit: self.max_frame_size,
            });
        }

        // A delimiter may straddle this read and the next one.
        self.scanned = self.carry.len().saturating_sub(DELIMITER.len() - 1);
        Ok(frames)
    }

    /// Bytes received but not yet forming a complete frame.
    pub fn carry(&self) -> &[u8] {
        &self.carry
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

/// Find the first delimiter at or after `from`, returning its start.
fn find_delimiter(buffer: &[u8], from: usize) -> Option<usize> {
    if buffer.len() < DELIMITER.len() {
        return None;
    }
    (from..=buffer.len() - DELIMITER.len()).find(|&i| &buffer[i..i + DELIMITER.len()] == DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_delimiter() {
        let frame = encode("SYN alice");
        assert_eq!(&frame[..9], b"SYN alice");
        assert_eq!(&frame[9..], DELIMITER);
    }

    #[test]
    fn test_decode_coalesced_frames() {
        let mut decoder = FrameDecoder::default();
        let mut wire = BytesMut::new();
        encode_into("SYN alice", &mut wire);
        encode_into("ACK alice", &mut wire);
        encode_into("hello", &mut wire);

        let frames = decoder.decode(&wire).unwrap();
        assert_eq!(frames, vec!["SYN alice", "ACK alice", "hello"]);
        assert!(decoder.carry().is_empty());
    }

    #[test]
    fn test_decode_keeps_partial_tail() {
        let mut decoder = FrameDecoder::default();
        let mut wire = BytesMut::new();
        encode_into("first", &mut wire);
        wire.extend_from_slice(b"sec");

        assert_eq!(decoder.decode(&wire).unwrap(), vec!["first"]);
        assert_eq!(decoder.carry(), b"sec");

        let mut rest = BytesMut::from(&b"ond"[..]);
        rest.extend_from_slice(DELIMITER);
        assert_eq!(decoder.decode(&rest).unwrap(), vec!["second"]);
        assert!(decoder.carry().is_empty());
    }

    #[test]
    fn test_decode_delimiter_split_across_reads() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.decode(b"hi\xFF").unwrap().is_empty());
        assert_eq!(decoder.decode(b"\xFE").unwrap(), vec!["hi"]);
    }

    #[test]
    fn test_decode_byte_at_a_time() {
        let mut decoder = FrameDecoder::default();
        let wire = encode("logged in");
        let mut frames = Vec::new();
        for byte in wire.iter() {
            frames.extend(decoder.decode(&[*byte]).unwrap());
        }
        assert_eq!(frames, vec!["logged in"]);
    }

    #[test]
    fn test_decode_empty_frame() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.decode(DELIMITER).unwrap(), vec![String::new()]);
    }

    #[test]
    fn test_unterminated_carry_over_limit() {
        let mut decoder = FrameDecoder::new(8);
        assert!(decoder.decode(b"12345678").unwrap().is_empty());
        assert_eq!(
            decoder.decode(b"9"),
            Err(FrameError::TooLarge { len: 9, limit: 8 })
        );
    }

    #[test]
    fn test_complete_frame_over_limit() {
        let mut decoder = FrameDecoder::new(4);
        let wire = encode("too long");
        assert_eq!(
            decoder.decode(&wire),
            Err(FrameError::TooLarge { len: 8, limit: 4 })
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.decode(b"\xC3\x28\xFF\xFE"), Err(FrameError::InvalidUtf8));
    }

    #[test]
    fn test_find_delimiter() {
        assert_eq!(find_delimiter(b"ab\xFF\xFEcd", 0), Some(2));
        assert_eq!(find_delimiter(b"ab\xFF\xFEcd", 3), None);
        assert_eq!(find_delimiter(b"\xFF", 0), None);
    }
}
