//! Sample-conservation test against a generated WAV fixture
//!
//! Feeds a hound-generated 16-bit mono fixture through the streamer in
//! ragged chunk sizes and checks that every sample comes out of the
//! scheduler exactly once.

mod helpers;

use std::io::Cursor;
use std::time::Duration;

use helpers::{mock_sink, settle};
use pcm_streamer::{PcmStreamer, StreamConfig};

/// Generate a mono 16-bit fixture in memory and return its raw LE bytes.
fn wav_fixture_bytes(sample_count: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 24_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..sample_count {
            let value = ((i as i64 % 200) - 100) as i16 * 50;
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
    }

    cursor.set_position(0);
    let mut reader = hound::WavReader::new(cursor).unwrap();
    reader
        .samples::<i16>()
        .map(|s| s.unwrap())
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn every_fixture_sample_is_played_exactly_once() {
    let cfg = StreamConfig {
        frame_samples: 240, // 10 ms frames keep the drain passes short
        ..StreamConfig::default()
    };
    let (sink, events, handle) = mock_sink();
    let streamer = PcmStreamer::with_config(cfg, Box::new(sink), events);

    let bytes = wav_fixture_bytes(1_234);
    assert_eq!(bytes.len(), 2_468);

    // Ragged chunk sizes; sample pairs stay intact (an odd-length chunk
    // would drop its trailing byte by design)
    let mut offset = 0usize;
    let mut chunk_lens = [6usize, 480, 4, 960, 240, 34].iter().cycle();
    while offset < bytes.len() {
        let len = (*chunk_lens.next().unwrap()).min(bytes.len() - offset);
        streamer.push_pcm16(&bytes[offset..offset + len]);
        offset += len;
    }

    streamer.complete();

    // Walk the clock forward until the scheduler has drained everything
    for _ in 0..20 {
        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
    }

    assert_eq!(handle.submitted_samples(), 1_234);

    // Frames went out whole: all full-size except a short final flush
    let subs = handle.submissions();
    for sub in &subs[..subs.len() - 1] {
        assert_eq!(sub.samples.len(), 240);
    }
    assert_eq!(subs.last().unwrap().samples.len(), 1_234 % 240);
}
