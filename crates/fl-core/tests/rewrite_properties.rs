//! Property tests for the rewriter.

use fl_config::AgentConfig;
use fl_core::classfile::ClassFile;
use fl_core::rewrite::{ClassLoad, DecisionKind, MethodRewriter, PROLOGUE_LEN};
use fl_core::test_utils::{method_code, nested_attribute, ClassBuilder, FixedRolls};
use fl_core::LoaderId;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Shape {
    Declares,
    Throws,
    Plain,
    Abstract,
}

fn shape() -> impl Strategy<Value = Shape> {
    prop_oneof![
        Just(Shape::Declares),
        Just(Shape::Throws),
        Just(Shape::Plain),
        Just(Shape::Abstract),
    ]
}

fn build(shapes: &[Shape], padding: usize) -> Vec<u8> {
    let mut builder = ClassBuilder::new("com/acme/Generated");
    for (i, shape) in shapes.iter().enumerate() {
        let name = format!("m{i}");
        builder = match shape {
            Shape::Declares => builder.method(&name, "()V", &["java/io/IOException"], |asm| {
                for _ in 0..padding {
                    asm.nop();
                }
                asm.return_void();
            }),
            Shape::Throws => builder.method(&name, "()V", &[], |asm| {
                for _ in 0..padding {
                    asm.nop();
                }
                asm.throw_new("java/lang/IllegalStateException");
            }),
            Shape::Plain => builder.method(&name, "()V", &[], |asm| {
                asm.return_void();
            }),
            Shape::Abstract => builder.abstract_method(&name, "()V"),
        };
    }
    builder.build()
}

fn rewrite(bytes: &[u8], probability: f64, rolls: &[f64]) -> fl_core::RewriteOutcome {
    let rewriter = MethodRewriter::new(&AgentConfig::default().with_probability(probability)).unwrap();
    let load = ClassLoad {
        loader: Some(LoaderId(1)),
        class_name: Some("com/acme/Generated"),
        bytes,
    };
    rewriter.rewrite(&load, &mut FixedRolls::new(rolls)).unwrap()
}

proptest! {
    #[test]
    fn certain_injection_covers_every_candidate(
        shapes in prop::collection::vec(shape(), 1..12),
        padding in 0usize..40,
    ) {
        let bytes = build(&shapes, padding);
        let outcome = rewrite(&bytes, 1.0, &[0.5]);
        let original = ClassFile::parse(&bytes).unwrap();

        prop_assert_eq!(outcome.decisions.len(), shapes.len());
        for (shape, decision) in shapes.iter().zip(&outcome.decisions) {
            let expected_injection = matches!(shape, Shape::Declares | Shape::Throws);
            prop_assert_eq!(decision.is_injected(), expected_injection);
            match shape {
                Shape::Plain => prop_assert_eq!(&decision.kind, &DecisionKind::SkippedNoCandidate),
                Shape::Abstract => prop_assert_eq!(&decision.kind, &DecisionKind::SkippedNoBody),
                _ => {}
            }
        }

        let any_candidate = shapes.iter().any(|s| matches!(s, Shape::Declares | Shape::Throws));
        prop_assert_eq!(outcome.bytes.is_some(), any_candidate);
        if let Some(bytes) = &outcome.bytes {
            let rewritten = ClassFile::parse(bytes).unwrap();
            for (i, shape) in shapes.iter().enumerate() {
                if matches!(shape, Shape::Abstract) {
                    continue;
                }
                let name = format!("m{i}");
                let before = method_code(&original, &name).code;
                let after = method_code(&rewritten, &name).code;
                if matches!(shape, Shape::Plain) {
                    prop_assert_eq!(after, before);
                } else {
                    prop_assert_eq!(after.len(), before.len() + PROLOGUE_LEN);
                    prop_assert_eq!(&after[PROLOGUE_LEN..], before.as_slice());
                }
            }
        }
    }

    #[test]
    fn zero_probability_never_changes_bytes(
        shapes in prop::collection::vec(shape(), 1..12),
        roll in 0u32..1000,
    ) {
        let bytes = build(&shapes, 0);
        let outcome = rewrite(&bytes, 0.0, &[f64::from(roll) / 1024.0]);
        prop_assert!(outcome.bytes.is_none());
        prop_assert_eq!(outcome.injected().count(), 0);
    }

    #[test]
    fn first_frame_offset_moves_by_prologue_length(offset in 0u16..=64, frame in 0u8..3) {
        // One frame at `offset`, in compact or extended encoding.
        let encoded: Vec<u8> = match frame {
            0 if offset < 64 => vec![offset as u8],
            1 if offset < 64 => vec![64 + offset as u8, 1],
            _ => vec![251, (offset >> 8) as u8, offset as u8],
        };
        let bytes = ClassBuilder::new("com/acme/Generated")
            .method("f", "()V", &["java/io/IOException"], |asm| {
                for _ in 0..offset {
                    asm.nop();
                }
                asm.return_void();
                asm.stack_map(&[&encoded]);
            })
            .build();
        let outcome = rewrite(&bytes, 1.0, &[0.0]);
        let rewritten = ClassFile::parse(outcome.bytes.as_deref().unwrap()).unwrap();
        let code = method_code(&rewritten, "f");
        let table = nested_attribute(&rewritten, &code, "StackMapTable");

        let shifted = offset + PROLOGUE_LEN as u16;
        let decoded = match table[2] {
            t @ 0..=63 => u16::from(t),
            t @ 64..=127 => u16::from(t - 64),
            _ => u16::from_be_bytes([table[3], table[4]]),
        };
        prop_assert_eq!(decoded, shifted);
        prop_assert_eq!(&table[..2], &[0, 1]);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let rewriter = MethodRewriter::new(&AgentConfig::default()).unwrap();
        let load = ClassLoad {
            loader: Some(LoaderId(1)),
            class_name: Some("com/acme/Fuzz"),
            bytes: &bytes,
        };
        let _ = rewriter.rewrite(&load, &mut FixedRolls::new(&[0.0]));
    }

    #[test]
    fn truncated_classes_are_errors(cut in 0usize..1000) {
        let bytes = build(&[Shape::Declares, Shape::Throws], 3);
        let cut = cut % bytes.len();
        prop_assert!(ClassFile::parse(&bytes[..cut]).is_err());
    }
}
