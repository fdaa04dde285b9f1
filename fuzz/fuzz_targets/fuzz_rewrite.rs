//! Fuzz target for the method rewriter.
//!
//! Raw input exercises the error paths; the generated class exercises
//! relocation of stack map frames and line tables behind the prologue.

#![no_main]

use arbitrary::Arbitrary;
use fl_config::AgentConfig;
use fl_core::classfile::ClassFile;
use fl_core::rewrite::{ClassLoad, MethodRewriter};
use fl_core::test_utils::{ClassBuilder, FixedRolls};
use fl_core::LoaderId;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    raw: Vec<u8>,
    padding: u8,
    first_frame: Vec<u8>,
    line_pcs: Vec<u8>,
    declares: bool,
}

fuzz_target!(|input: Input| {
    let Ok(rewriter) = MethodRewriter::new(&AgentConfig::default()) else {
        return;
    };
    let mut rolls = FixedRolls::new(&[0.0]);

    let raw = ClassLoad {
        loader: Some(LoaderId(1)),
        class_name: Some("com/acme/Fuzz"),
        bytes: &input.raw,
    };
    let _ = rewriter.rewrite(&raw, &mut rolls);

    let throws: &[&str] = if input.declares { &["java/io/IOException"] } else { &[] };
    let padding = input.padding as u16;
    let bytes = ClassBuilder::new("com/acme/Generated")
        .method("f", "()V", throws, |asm| {
            for _ in 0..padding {
                asm.nop();
            }
            asm.return_void();
            let lines: Vec<(u16, u16)> = input
                .line_pcs
                .iter()
                .map(|pc| (u16::from(*pc).min(padding), 1))
                .collect();
            asm.line_numbers(&lines);
            if !input.first_frame.is_empty() {
                asm.stack_map(&[&input.first_frame]);
            }
        })
        .build();
    let generated = ClassLoad {
        loader: Some(LoaderId(1)),
        class_name: Some("com/acme/Generated"),
        bytes: &bytes,
    };
    if let Ok(outcome) = rewriter.rewrite(&generated, &mut rolls) {
        if let Some(rewritten) = outcome.bytes {
            ClassFile::parse(&rewritten).expect("rewritten class parses");
        }
    }
});
