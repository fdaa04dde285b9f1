//! Fuzz target for class-file parsing.
//!
//! Arbitrary bytes must never panic the parser, and anything it accepts must
//! serialize back to exactly the input.

#![no_main]

use fl_core::classfile::ClassFile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(class) = ClassFile::parse(data) {
        let bytes = class.to_bytes().expect("parsed class re-serializes");
        assert_eq!(bytes, data);
    }
});
