#![no_main]
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use wg_firewall::detect::regex_detector::RegexDetector;
use wg_firewall::detect::Detector;
use wg_firewall::model::{Deadline, Prompt};
use wg_firewall::patterns::StaticPatternProvider;
use wg_firewall::policy::engine::PolicyEngine;
use wg_firewall::policy::{Action, Match, Policy, Rule};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let detector = RegexDetector::new(Arc::new(StaticPatternProvider::builtin()));
        let prompt = Prompt::new(s);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (findings, _) = rt.block_on(detector.detect(&prompt, Deadline::default_budget()));

        let mut policy = Policy::permissive("fuzz");
        policy.rules = vec![Rule {
            name: "block_everything_found".to_string(),
            enabled: true,
            match_: Match {
                categories: Vec::new(),
                min_severity: None,
                detection_type: None,
            },
            action: Action::Block,
        }];

        // Should never panic regardless of how many/what findings were produced.
        let verdict = PolicyEngine::new().evaluate(findings, &policy);
        if !verdict.findings.is_empty() {
            assert!(!verdict.is_safe, "a matched block rule must never be reported safe");
        }
    }
});
