//! Property-based tests for the chunked send path.
//!
//! Any file of N bytes sent with chunk size C crosses the channel as
//! `ceil(N / C)` binary frames and reassembles to the same bytes, whatever
//! the high-water mark.

use pairlink::channel::loopback::LoopbackChannel;
use pairlink::channel::{ChannelMessage, DataChannel};
use pairlink::transfer::receive::Reassembler;
use pairlink::transfer::{SendSummary, TransferConfig, TransferEngine, TransferEvent};
use proptest::prelude::*;

/// Reads the remote end until a file completes. Returns the number of
/// binary frames seen and the reassembled bytes.
async fn receive_file(remote: &LoopbackChannel) -> (u64, Vec<u8>) {
    let mut reassembler = Reassembler::new();
    let mut binary_frames = 0;
    loop {
        let message = remote.recv().await.unwrap();
        if matches!(message, ChannelMessage::Binary(_)) {
            binary_frames += 1;
        }
        for event in reassembler.handle(message) {
            match event {
                TransferEvent::FileReceived(file) => return (binary_frames, file.data),
                TransferEvent::Aborted { .. } | TransferEvent::Rejected(_) => {
                    panic!("unexpected {event:?}")
                }
                _ => {}
            }
        }
    }
}

fn send_through_loopback(data: &[u8], config: TransferConfig) -> (SendSummary, u64, Vec<u8>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let (local, remote) = LoopbackChannel::pair();
        let engine = TransferEngine::new(local, config).unwrap();
        let (sent, (frames, received)) =
            tokio::join!(engine.send_bytes("prop.bin", data), receive_file(&remote));
        (sent.unwrap(), frames, received)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chunked_send_reassembles_exactly(
        data in proptest::collection::vec(any::<u8>(), 0..60_000),
        chunk_size in 1usize..20_000,
        high_water_mark in 1usize..40_000,
    ) {
        let config = TransferConfig { chunk_size, high_water_mark };
        let expected_frames = (data.len() as u64).div_ceil(chunk_size as u64);

        let (summary, frames, received) = send_through_loopback(&data, config);

        prop_assert_eq!(summary.chunks, expected_frames);
        prop_assert_eq!(frames, expected_frames);
        prop_assert_eq!(summary.bytes, data.len() as u64);
        prop_assert_eq!(received, data);
    }
}
