//! Property-based tests for the chat frame codec.
//!
//! TCP may split or coalesce frames anywhere, so decoding must not depend on
//! where read boundaries fall.

use chatline::protocols::chat::{encode, FrameDecoder};
use proptest::prelude::*;

/// Frame text: any string, including non-ASCII and embedded newlines.
fn frame_text() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[ -~]{0,40}",
        1 => any::<String>().prop_map(|s| s.chars().take(40).collect()),
        1 => Just("SYN RST alice".to_string()),
    ]
}

/// Concatenated encoding of `frames`.
fn wire(frames: &[String]) -> Vec<u8> {
    frames.iter().flat_map(|f| encode(f).to_vec()).collect()
}

proptest! {
    /// Frames survive arbitrary chunking of the byte stream.
    #[test]
    fn decode_is_independent_of_chunking(
        frames in prop::collection::vec(frame_text(), 0..20),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..30),
    ) {
        let bytes = wire(&frames);

        let mut offsets: Vec<usize> = cuts.iter().map(|c| c.index(bytes.len() + 1)).collect();
        offsets.push(0);
        offsets.push(bytes.len());
        offsets.sort_unstable();
        offsets.dedup();

        let mut decoder = FrameDecoder::default();
        let mut decoded = Vec::new();
        for pair in offsets.windows(2) {
            decoded.extend(decoder.decode(&bytes[pair[0]..pair[1]]).unwrap());
        }

        prop_assert_eq!(decoded, frames);
        prop_assert!(decoder.carry().is_empty());
    }

    /// Feeding a stream one byte at a time yields every frame in order.
    #[test]
    fn byte_at_a_time_preserves_order(frames in prop::collection::vec(frame_text(), 1..10)) {
        let bytes = wire(&frames);
        let mut decoder = FrameDecoder::default();
        let mut decoded = Vec::new();
        for byte in bytes.chunks(1) {
            decoded.extend(decoder.decode(byte).unwrap());
        }
        prop_assert_eq!(decoded.len(), frames.len());
        prop_assert_eq!(decoded, frames);
    }

    /// A trailing partial frame is held back until its delimiter arrives.
    #[test]
    fn partial_tail_is_carried(
        frames in prop::collection::vec(frame_text(), 0..5),
        tail in "[a-z]{1,20}",
    ) {
        let mut bytes = wire(&frames);
        bytes.extend_from_slice(tail.as_bytes());

        let mut decoder = FrameDecoder::default();
        let decoded = decoder.decode(&bytes).unwrap();
        prop_assert_eq!(&decoded, &frames);
        prop_assert_eq!(decoder.carry(), tail.as_bytes());

        let rest = decoder.decode(&encode("")[..]).unwrap();
        prop_assert_eq!(rest, vec![tail]);
    }
}
