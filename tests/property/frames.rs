//! Property-based tests for the direct-channel frame vocabulary.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text never panics the frame parser.
//! 2. Every encoded control frame parses back to the matching variant.
//! 3. Chunk counting agrees with a naive slice-based split.

use pairlink_proto::frame::{ControlFrame, TransferFrame, chunk_count};
use proptest::prelude::*;

/// Strategy for generating arbitrary `ControlFrame` values.
fn arb_control_frame() -> impl Strategy<Value = ControlFrame> {
    prop_oneof![
        ".{0,256}".prop_map(|text| ControlFrame::Chat { text }),
        (".{0,64}", any::<u64>()).prop_map(|(name, size)| ControlFrame::FileMeta { name, size }),
        Just(ControlFrame::FileEnd),
        ".{0,64}".prop_map(|reason| ControlFrame::FileAbort { reason }),
    ]
}

proptest! {
    #[test]
    fn parse_never_panics(text in "\\PC*") {
        let _ = TransferFrame::parse(&text);
    }

    #[test]
    fn encoded_frames_parse_to_matching_variant(frame in arb_control_frame()) {
        let parsed = TransferFrame::parse(&frame.to_text().unwrap());
        let expected = match frame {
            ControlFrame::Chat { text } => TransferFrame::Chat(text),
            ControlFrame::FileMeta { name, size } => TransferFrame::FileMeta { name, size },
            ControlFrame::FileEnd => TransferFrame::FileEnd,
            ControlFrame::FileAbort { reason } => TransferFrame::FileAbort { reason },
        };
        prop_assert_eq!(parsed, expected);
    }

    #[test]
    fn chunk_count_matches_slice_split(size in 0usize..200_000, chunk in 1usize..70_000) {
        let data = vec![0u8; size];
        let naive = data.chunks(chunk).count() as u64;
        prop_assert_eq!(chunk_count(size as u64, chunk as u64), naive);
    }
}
