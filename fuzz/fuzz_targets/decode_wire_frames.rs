// Run locally (from the repo root):
//   cargo +nightly fuzz run decode_wire_frames -- -runs=1000
#![no_main]

use libfuzzer_sys::fuzz_target;

mod utils;

fuzz_target!(|data: &[u8]| {
    // Oracle: never panic on malformed length prefixes or protobuf bodies.
    // Errors are expected.
    let _ = starlark_wire::decode_event_frames(utils::truncate(data));
});
