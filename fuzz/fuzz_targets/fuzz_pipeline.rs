#![no_main]
use libfuzzer_sys::fuzz_target;
use wg_firewall::model::Deadline;
use wg_firewall::pipeline::ValidateRequest;
use wg_firewall::testing::builtin_pipeline;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let pipeline = builtin_pipeline();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        // Should never panic on any UTF-8 input, regardless of size or content.
        let _ = rt.block_on(pipeline.validate(ValidateRequest::new(s), Deadline::default_budget()));
    }
});
