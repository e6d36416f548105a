// Run locally (from the repo root):
//   cargo +nightly fuzz run read_dap_message -- -runs=1000
#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use starlark_dap::dap_tokio::DapReader;

mod utils;

fn runtime() -> &'static tokio::runtime::Runtime {
    static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("failed to build fuzz runtime")
    })
}

fuzz_target!(|data: &[u8]| {
    let input = utils::truncate(data);
    runtime().block_on(async {
        let mut reader = DapReader::new(input);
        // Read until EOF or the first framing error; neither may panic.
        while let Ok(Some(_)) = reader.read_value().await {}
    });
});
