//! Which classes are never instrumented.

use fl_common::ClassName;
use fl_config::DenyList;
use serde::Serialize;

/// Why a class was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Defined by the bootstrap loader.
    BootstrapLoader,
    /// Matched the deny-list.
    Denied,
    /// Nested, inner, anonymous or synthetic (`$` in the name).
    Nested,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::BootstrapLoader => write!(f, "bootstrap loader"),
            IgnoreReason::Denied => write!(f, "deny-list"),
            IgnoreReason::Nested => write!(f, "nested class"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassFilter {
    deny: DenyList,
}

impl ClassFilter {
    pub fn new(deny: DenyList) -> Self {
        Self { deny }
    }

    /// `None` if the class may be instrumented.
    pub fn check(&self, name: &ClassName) -> Option<IgnoreReason> {
        if self.deny.is_denied(name.as_internal()) {
            Some(IgnoreReason::Denied)
        } else if name.is_nested() {
            Some(IgnoreReason::Nested)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fl_config::AgentConfig;

    fn filter() -> ClassFilter {
        ClassFilter::new(AgentConfig::default().deny_list().unwrap())
    }

    #[test]
    fn builtin_prefixes_are_denied() {
        let f = filter();
        for name in [
            "java/lang/String",
            "sun/misc/Unsafe",
            "jdk/internal/Foo",
            "org/junit/Assert",
            "org/jacoco/agent/rt/RT",
            "org/apache/tools/ant/Main",
            "org/slf4j/Logger",
            "ch/qos/logback/Core",
            "faultline/runtime/FaultDispatch",
        ] {
            assert_eq!(f.check(&ClassName::from(name)), Some(IgnoreReason::Denied), "{name}");
        }
    }

    #[test]
    fn nested_classes_are_ignored() {
        assert_eq!(
            filter().check(&ClassName::from("com/acme/Repo$1")),
            Some(IgnoreReason::Nested)
        );
    }

    #[test]
    fn application_classes_pass() {
        assert_eq!(filter().check(&ClassName::from("com/acme/Repo")), None);
    }
}
