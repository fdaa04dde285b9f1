//! Fuzz target for agent option strings.
//!
//! Parsing and validation must never panic, and whatever parses must
//! render back to an equivalent option string.

#![no_main]

use fl_config::{load_agent_config, AgentOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let _ = load_agent_config(raw);

    if let Ok(options) = raw.parse::<AgentOptions>() {
        // NaN never compares equal, so only check the structure holds.
        let rendered = options
            .to_option_string()
            .expect("parsed options always render");
        let reparsed: AgentOptions = rendered.parse().expect("rendered options reparse");
        assert_eq!(reparsed.deny.len(), options.deny.len());
        assert_eq!(reparsed.throw_ceiling, options.throw_ceiling);
    }
});
