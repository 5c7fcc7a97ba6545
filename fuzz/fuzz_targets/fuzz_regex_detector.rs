#![no_main]
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use wg_firewall::detect::regex_detector::RegexDetector;
use wg_firewall::detect::Detector;
use wg_firewall::model::{Deadline, Prompt};
use wg_firewall::patterns::StaticPatternProvider;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let detector = RegexDetector::new(Arc::new(StaticPatternProvider::builtin()));
        let prompt = Prompt::new(s);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        // Should never panic, and scanning the same text twice must agree.
        let (first, degraded1) = rt.block_on(detector.detect(&prompt, Deadline::default_budget()));
        let (second, degraded2) = rt.block_on(detector.detect(&prompt, Deadline::default_budget()));
        assert_eq!(degraded1, degraded2, "regex detector degraded flag is non-deterministic");
        assert_eq!(first.len(), second.len(), "regex detector finding count is non-deterministic");
    }
});
