// fuzz/fuzz_targets/frame_decoder.rs
//! Arbitrary bytes, split at an arbitrary point, must decode to the same
//! frames as the unsplit input, and every frame must reach the event parser
//! without panicking.
#![no_main]

use genstream_core::{parse_event, ChatEvent, FrameDecoder, Framing, ReportEvent};
use libfuzzer_sys::fuzz_target;

fn decode(framing: Framing, chunks: &[&[u8]]) -> Vec<String> {
    let mut decoder = FrameDecoder::new(framing);
    let mut frames = Vec::new();
    for chunk in chunks {
        frames.extend(decoder.push(chunk));
    }
    frames.extend(decoder.finish());
    frames
}

fuzz_target!(|data: &[u8]| {
    let Some((&split, body)) = data.split_first() else {
        return;
    };
    let at = usize::from(split).min(body.len());
    let (head, tail) = body.split_at(at);

    for framing in [Framing::Block, Framing::Line] {
        let whole = decode(framing, &[body]);
        let split = decode(framing, &[head, tail]);
        assert_eq!(whole, split, "{framing:?} frames depend on chunking");

        for frame in &whole {
            match framing {
                Framing::Block => {
                    let _ = parse_event::<ReportEvent>(frame);
                }
                Framing::Line => {
                    let _ = parse_event::<ChatEvent>(frame);
                }
            }
        }
    }
});
