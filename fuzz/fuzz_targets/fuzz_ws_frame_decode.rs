#![no_main]

use libfuzzer_sys::fuzz_target;

use controlgate::server::ws::frame::decode_frame;

fuzz_target!(|data: &[u8]| {
    // The decoder must never panic on arbitrary bytes: a malicious or
    // broken client controls this buffer completely. Insufficient data is
    // "need more", not an error, and a decoded frame must account for a
    // plausible slice of the input.
    if let Some((frame, consumed)) = decode_frame(data) {
        assert!(consumed <= data.len());
        assert!(frame.payload.len() <= consumed);
    }
});
