//! Load-time method rewriting.
//!
//! For every class the host offers, [`MethodRewriter::rewrite`] decides per
//! method whether to splice in a call to the dispatch entry point, and if so
//! which exception type the call names. Decisions are returned alongside the
//! bytes so the caller can log them; the rewriter itself has no side effects.

pub mod candidate;
pub mod filter;
pub mod prologue;

pub use candidate::{Candidate, CandidateSource};
pub use filter::{ClassFilter, IgnoreReason};
pub use prologue::{UnsupportedReason, PROLOGUE_LEN};

use crate::classfile::{ClassFile, ClassFileError, CodeAttribute, ConstantPool, MemberInfo};
use crate::registrar::LoaderId;
use candidate::select_candidate;
use fl_common::{ClassName, MethodId};
use fl_config::{AgentConfig, DispatchTarget, ValidationResult};
use prologue::{inject_prologue, unsupported_reason, PrologueRefs};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("malformed class {class}: {source}")]
    Malformed {
        class: String,
        #[source]
        source: ClassFileError,
    },
}

impl RewriteError {
    pub fn class(&self) -> &str {
        match self {
            RewriteError::Malformed { class, .. } => class,
        }
    }
}

impl From<RewriteError> for fl_common::Error {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::Malformed { class, source } => fl_common::Error::ClassFormat {
                class,
                message: source.to_string(),
            },
        }
    }
}

/// One class-load event as seen by the rewriter.
#[derive(Debug, Clone, Copy)]
pub struct ClassLoad<'a> {
    /// `None` for the bootstrap loader.
    pub loader: Option<LoaderId>,
    /// Internal name, when the host knows it.
    pub class_name: Option<&'a str>,
    pub bytes: &'a [u8],
}

/// A method as the rewriter sees it.
#[derive(Debug, Clone)]
pub struct TargetMethod {
    pub owner: ClassName,
    pub name: String,
    pub descriptor: String,
    /// Internal names from the `throws` clause, in order.
    pub declared_exceptions: Vec<String>,
    /// `None` for abstract and native methods.
    pub body: Option<MethodBody>,
}

#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Position of the `Code` attribute among the method's attributes.
    pub attribute_index: usize,
    pub code: CodeAttribute,
}

impl TargetMethod {
    pub fn from_member(
        owner: &ClassName,
        member: &MemberInfo,
        pool: &ConstantPool,
    ) -> Result<Self, ClassFileError> {
        let body = if member.is_abstract_or_native() {
            None
        } else {
            member
                .code(pool)?
                .map(|(attribute_index, code)| MethodBody {
                    attribute_index,
                    code,
                })
        };
        Ok(Self {
            owner: owner.clone(),
            name: member.name(pool)?,
            descriptor: member.descriptor(pool)?,
            declared_exceptions: member.declared_exceptions(pool)?,
            body,
        })
    }

    pub fn id(&self) -> MethodId {
        MethodId::new(&self.owner, &self.name)
    }
}

/// What happened to one method.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DecisionKind {
    Injected {
        exception: String,
        source: CandidateSource,
        roll: f64,
    },
    SkippedNoBody,
    SkippedNoCandidate,
    SkippedByRoll {
        exception: String,
        roll: f64,
    },
    SkippedUnsupported {
        exception: String,
        reason: UnsupportedReason,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectionDecision {
    pub method: MethodId,
    pub descriptor: String,
    #[serde(flatten)]
    pub kind: DecisionKind,
}

impl InjectionDecision {
    pub fn is_injected(&self) -> bool {
        matches!(self.kind, DecisionKind::Injected { .. })
    }
}

/// Result of offering one class to the rewriter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RewriteOutcome {
    pub class: Option<ClassName>,
    /// Set when the whole class was skipped before parsing its methods.
    pub ignored: Option<IgnoreReason>,
    pub decisions: Vec<InjectionDecision>,
    /// Replacement bytes; `None` means "leave the class as it is".
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
}

impl RewriteOutcome {
    fn ignored(class: Option<ClassName>, reason: IgnoreReason) -> Self {
        Self {
            class,
            ignored: Some(reason),
            ..Self::default()
        }
    }

    pub fn injected(&self) -> impl Iterator<Item = &InjectionDecision> {
        self.decisions.iter().filter(|d| d.is_injected())
    }

    pub fn is_modified(&self) -> bool {
        self.bytes.is_some()
    }
}

/// Decides and performs prologue injection. Shared read-only by every
/// class-loading thread.
#[derive(Debug, Clone)]
pub struct MethodRewriter {
    filter: ClassFilter,
    probability: f64,
    dispatch: DispatchTarget,
}

impl MethodRewriter {
    pub fn new(config: &AgentConfig) -> ValidationResult<Self> {
        Ok(Self {
            filter: ClassFilter::new(config.deny_list()?),
            probability: config.probability,
            dispatch: config.dispatch.clone(),
        })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Offer one class. Errors mean the class is malformed and must be left
    /// exactly as it was loaded.
    pub fn rewrite<R: Rng + ?Sized>(
        &self,
        load: &ClassLoad<'_>,
        rng: &mut R,
    ) -> Result<RewriteOutcome, RewriteError> {
        let hinted = load.class_name.map(ClassName::from_internal);
        if load.loader.is_none() {
            return Ok(RewriteOutcome::ignored(hinted, IgnoreReason::BootstrapLoader));
        }
        if let Some(reason) = hinted.as_ref().and_then(|n| self.filter.check(n)) {
            return Ok(RewriteOutcome::ignored(hinted, reason));
        }

        let label = load.class_name.unwrap_or("<unnamed>");
        let malformed = |source| RewriteError::Malformed {
            class: label.to_string(),
            source,
        };

        let mut class = ClassFile::parse(load.bytes).map_err(malformed)?;
        let owner = match hinted {
            Some(name) => name,
            None => {
                let name = ClassName::from_internal(class.name().map_err(malformed)?);
                if let Some(reason) = self.filter.check(&name) {
                    return Ok(RewriteOutcome::ignored(Some(name), reason));
                }
                name
            }
        };

        let mut decisions = Vec::with_capacity(class.methods.len());
        let mut modified = false;
        for index in 0..class.methods.len() {
            let target = TargetMethod::from_member(&owner, &class.methods[index], &class.constant_pool)
                .map_err(malformed)?;
            let (decision, patch) = self
                .decide(target, &mut class.constant_pool, rng)
                .map_err(malformed)?;
            if let Some((attribute_index, info)) = patch {
                class.methods[index].attributes[attribute_index].info = info;
                modified = true;
            }
            decisions.push(decision);
        }

        let bytes = if modified {
            Some(class.to_bytes().map_err(malformed)?)
        } else {
            None
        };

        Ok(RewriteOutcome {
            class: Some(owner),
            ignored: None,
            decisions,
            bytes,
        })
    }

    /// Decide for one method; returns the new `Code` payload when injecting.
    fn decide<R: Rng + ?Sized>(
        &self,
        target: TargetMethod,
        pool: &mut ConstantPool,
        rng: &mut R,
    ) -> Result<(InjectionDecision, Option<(usize, Vec<u8>)>), ClassFileError> {
        let method = target.id();
        let TargetMethod {
            descriptor,
            declared_exceptions,
            body,
            ..
        } = target;
        let decision = |kind| InjectionDecision {
            method: method.clone(),
            descriptor: descriptor.clone(),
            kind,
        };

        let Some(mut body) = body else {
            return Ok((decision(DecisionKind::SkippedNoBody), None));
        };
        let Some(candidate) = select_candidate(&declared_exceptions, Some(&body.code.code), pool)?
        else {
            return Ok((decision(DecisionKind::SkippedNoCandidate), None));
        };
        if let Some(reason) = unsupported_reason(&body.code, pool) {
            let kind = DecisionKind::SkippedUnsupported {
                exception: candidate.exception,
                reason,
            };
            return Ok((decision(kind), None));
        }

        // Strict comparison: probability 0.0 never injects, 1.0 always does.
        let roll: f64 = rng.random();
        if roll >= self.probability {
            let kind = DecisionKind::SkippedByRoll {
                exception: candidate.exception,
                roll,
            };
            return Ok((decision(kind), None));
        }

        let refs = PrologueRefs::intern(pool, method.as_str(), &candidate.exception, &self.dispatch)?;
        inject_prologue(&mut body.code, &refs, pool)?;
        let info = body.code.to_bytes()?;
        let kind = DecisionKind::Injected {
            exception: candidate.exception,
            source: candidate.source,
            roll,
        };
        Ok((decision(kind), Some((body.attribute_index, info))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{method_code, ClassBuilder, FixedRolls};

    const APP: Option<LoaderId> = Some(LoaderId(1));

    fn rewriter(probability: f64) -> MethodRewriter {
        MethodRewriter::new(&AgentConfig::default().with_probability(probability)).unwrap()
    }

    fn load<'a>(name: Option<&'a str>, bytes: &'a [u8]) -> ClassLoad<'a> {
        ClassLoad {
            loader: APP,
            class_name: name,
            bytes,
        }
    }

    #[test]
    fn bootstrap_classes_are_never_parsed() {
        let outcome = rewriter(1.0)
            .rewrite(
                &ClassLoad {
                    loader: None,
                    class_name: Some("com/acme/A"),
                    bytes: b"not a class",
                },
                &mut FixedRolls::new(&[0.0]),
            )
            .unwrap();
        assert_eq!(outcome.ignored, Some(IgnoreReason::BootstrapLoader));
        assert!(outcome.bytes.is_none());
    }

    #[test]
    fn denied_names_skip_parsing() {
        let outcome = rewriter(1.0)
            .rewrite(&load(Some("java/util/Foo"), b"garbage"), &mut FixedRolls::new(&[0.0]))
            .unwrap();
        assert_eq!(outcome.ignored, Some(IgnoreReason::Denied));
    }

    #[test]
    fn name_comes_from_bytes_when_host_omits_it() {
        let bytes = ClassBuilder::new("com/acme/Outer$Inner")
            .method("f", "()V", &["java/io/IOException"], |asm| {
                asm.return_void();
            })
            .build();
        let outcome = rewriter(1.0)
            .rewrite(&load(None, &bytes), &mut FixedRolls::new(&[0.0]))
            .unwrap();
        assert_eq!(outcome.ignored, Some(IgnoreReason::Nested));
        assert_eq!(outcome.class.unwrap().as_internal(), "com/acme/Outer$Inner");
    }

    #[test]
    fn garbage_is_an_error() {
        let err = rewriter(1.0)
            .rewrite(&load(Some("com/acme/A"), b"\xCA\xFE\xBA\xBE"), &mut FixedRolls::new(&[0.0]))
            .unwrap_err();
        assert_eq!(err.class(), "com/acme/A");
        let common: fl_common::Error = err.into();
        assert_eq!(common.code(), 20);
    }

    #[test]
    fn injected_method_starts_with_prologue() {
        let bytes = ClassBuilder::new("com/acme/Repo")
            .method("load", "()V", &["java/io/IOException"], |asm| {
                asm.return_void();
            })
            .build();
        let outcome = rewriter(1.0)
            .rewrite(&load(Some("com/acme/Repo"), &bytes), &mut FixedRolls::new(&[0.5]))
            .unwrap();
        let rewritten = ClassFile::parse(outcome.bytes.as_deref().unwrap()).unwrap();
        let code = method_code(&rewritten, "load");
        assert_eq!(code.code.len(), PROLOGUE_LEN + 1);

        let pool = &rewritten.constant_pool;
        let id = u16::from_be_bytes([code.code[1], code.code[2]]);
        let exc = u16::from_be_bytes([code.code[4], code.code[5]]);
        let call = u16::from_be_bytes([code.code[7], code.code[8]]);
        let string = |i| match pool.get(i) {
            Some(crate::classfile::Constant::String(utf8)) => pool.utf8(*utf8).unwrap(),
            other => panic!("not a string: {other:?}"),
        };
        assert_eq!(string(id), "com.acme.Repo.load");
        assert_eq!(string(exc), "java/io/IOException");
        assert_eq!(
            pool.method_ref(call).unwrap(),
            (
                "faultline/runtime/FaultDispatch".to_string(),
                "throwDispatch".to_string(),
                "(Ljava/lang/String;Ljava/lang/String;)V".to_string()
            )
        );
    }

    #[test]
    fn roll_at_or_above_probability_skips() {
        let bytes = ClassBuilder::new("com/acme/Repo")
            .method("a", "()V", &["java/io/IOException"], |asm| {
                asm.return_void();
            })
            .method("b", "()V", &["java/io/IOException"], |asm| {
                asm.return_void();
            })
            .build();
        let outcome = rewriter(0.5)
            .rewrite(&load(Some("com/acme/Repo"), &bytes), &mut FixedRolls::new(&[0.25, 0.5]))
            .unwrap();
        assert!(outcome.decisions[0].is_injected());
        assert_eq!(
            outcome.decisions[1].kind,
            DecisionKind::SkippedByRoll {
                exception: "java/io/IOException".to_string(),
                roll: 0.5
            }
        );
    }

    #[test]
    fn no_candidates_means_no_new_bytes() {
        let bytes = ClassBuilder::new("com/acme/Plain")
            .method("f", "()V", &[], |asm| {
                asm.return_void();
            })
            .abstract_method("g", "()V")
            .build();
        let outcome = rewriter(1.0)
            .rewrite(&load(Some("com/acme/Plain"), &bytes), &mut FixedRolls::new(&[0.0]))
            .unwrap();
        assert!(outcome.bytes.is_none());
        assert_eq!(outcome.decisions[0].kind, DecisionKind::SkippedNoCandidate);
        assert_eq!(outcome.decisions[1].kind, DecisionKind::SkippedNoBody);
    }

    #[test]
    fn decisions_serialize_with_tag() {
        let decision = InjectionDecision {
            method: MethodId::from_raw("com.acme.A.f"),
            descriptor: "()V".to_string(),
            kind: DecisionKind::SkippedNoCandidate,
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["decision"], "skipped_no_candidate");
        assert_eq!(json["method"], "com.acme.A.f");
    }
}
