//! Agent lifecycle through the process-wide entry points.
//!
//! Activation is once per process, so everything runs in a single test.

use fl_core::agent::{self, ActivationMode};
use fl_core::classfile::{ClassFile, Constant};
use fl_core::factory::TypeIntrospector;
use fl_core::test_utils::{method_code, ClassBuilder};
use fl_core::{
    agentmain, assert_ok, premain, throw_dispatch, AgentError, ClassFileTransformer,
    Instrumentation, LoaderId, TypeRegistry,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingHost {
    transformers: Mutex<Vec<Arc<dyn ClassFileTransformer>>>,
}

impl RecordingHost {
    fn registered(&self) -> Vec<Arc<dyn ClassFileTransformer>> {
        self.transformers.lock().unwrap().clone()
    }
}

impl Instrumentation for RecordingHost {
    fn add_transformer(&self, transformer: Arc<dyn ClassFileTransformer>) {
        self.transformers.lock().unwrap().push(transformer);
    }

    fn type_introspector(&self) -> Arc<dyn TypeIntrospector> {
        Arc::new(TypeRegistry::with_standard_throwables())
    }
}

fn pushed_strings(class: &ClassFile, method: &str) -> (String, String) {
    let code = method_code(class, method).code;
    let pool = &class.constant_pool;
    let string = |hi: u8, lo: u8| match pool.get(u16::from_be_bytes([hi, lo])) {
        Some(Constant::String(utf8)) => assert_ok!(pool.utf8(*utf8)),
        other => panic!("expected a string constant, got {other:?}"),
    };
    (string(code[1], code[2]), string(code[4], code[5]))
}

#[test]
fn activation_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("faultline.log");
    let host = RecordingHost::default();

    // Before activation the prologue's call is inert.
    assert!(agent::active().is_none());
    assert!(throw_dispatch("com.acme.Repo.load", "java/io/IOException").is_ok());

    // A rejected option string activates nothing.
    let err = premain("prob=2", &host).unwrap_err();
    assert!(matches!(err, AgentError::Config(_)));
    assert!(agent::active().is_none());
    assert!(host.registered().is_empty());

    let options = format!("prob=1,ceiling=2,log={}", log.display());
    let agent = assert_ok!(premain(&options, &host));
    assert_eq!(agent.mode(), ActivationMode::Startup);
    assert_eq!(agent.config().throw_ceiling, 2);
    assert_eq!(host.registered().len(), 1);

    // A second activation, of either kind, is refused.
    match agentmain("0.5", &host) {
        Err(AgentError::AlreadyActive(id)) => assert_eq!(id, agent.activation_id()),
        other => panic!("expected AlreadyActive, got {other:?}"),
    }
    assert_eq!(host.registered().len(), 1);

    // The host offers a class to the registered transformer.
    let bytes = ClassBuilder::new("com/acme/Repo")
        .method("load", "()V", &["java/io/IOException"], |asm| {
            asm.return_void();
        })
        .build();
    let transformer = &host.registered()[0];
    let rewritten = assert_ok!(transformer.transform(Some(LoaderId(1)), Some("com/acme/Repo"), false, &bytes))
        .expect("class should be rewritten");
    let class = assert_ok!(ClassFile::parse(&rewritten));
    let (method_id, exception) = pushed_strings(&class, "load");

    // Running the rewritten method twice throws, the third time it runs.
    for _ in 0..2 {
        let thrown = throw_dispatch(&method_id, &exception).unwrap_err();
        assert_eq!(thrown.to_string(), "java.io.IOException: injected exception");
    }
    assert!(throw_dispatch(&method_id, &exception).is_ok());
    assert_eq!(agent.governor().count(&fl_common::MethodId::from_raw(method_id.clone())), 3);

    // Raising the ceiling at runtime applies to the next call.
    agent.governor().set_ceiling(10);
    assert!(throw_dispatch(&method_id, &exception).is_err());

    let content = std::fs::read_to_string(&log).unwrap();
    assert!(content.contains("transforming: com.acme.Repo"));
    assert!(content.contains("Injecting exception java/io/IOException for method com.acme.Repo.load"));
    assert_eq!(
        content
            .matches("Throwing java.io.IOException: injected exception from com.acme.Repo.load")
            .count(),
        3
    );
    for line in content.lines() {
        let (millis, _) = line.split_once(' ').expect("timestamped line");
        assert!(millis.parse::<i64>().is_ok(), "bad line {line:?}");
    }
}
