//! The host-facing transformer and its registration.
//!
//! The host runtime calls [`ClassFileTransformer::transform`] from whichever
//! thread is loading a class, possibly many at once. [`FaultTransformer`]
//! wraps the rewriter with the debug log and `tracing` output and maps
//! rewrite failures onto the host's "illegal class format" signal, which
//! makes the host keep the original bytes.

use crate::debug_log::DebugLog;
use crate::factory::TypeIntrospector;
use crate::rewrite::{ClassLoad, DecisionKind, MethodRewriter, RewriteError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn, Level};

/// Opaque identity of a defining class loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderId(pub u64);

#[derive(Debug, Error)]
#[error("illegal class format in {class}: {source}")]
pub struct IllegalClassFormat {
    pub class: String,
    #[source]
    pub source: RewriteError,
}

/// A load-time class transformer.
pub trait ClassFileTransformer: Send + Sync {
    /// Return replacement bytes, or `None` to keep the class unchanged.
    fn transform(
        &self,
        loader: Option<LoaderId>,
        class_name: Option<&str>,
        class_being_redefined: bool,
        class_file: &[u8],
    ) -> Result<Option<Vec<u8>>, IllegalClassFormat>;
}

/// The host capabilities the agent needs at activation.
pub trait Instrumentation: Send + Sync {
    fn add_transformer(&self, transformer: Arc<dyn ClassFileTransformer>);

    fn type_introspector(&self) -> Arc<dyn TypeIntrospector>;
}

#[derive(Debug)]
pub struct FaultTransformer {
    rewriter: MethodRewriter,
    log: DebugLog,
}

impl FaultTransformer {
    pub fn new(rewriter: MethodRewriter, log: DebugLog) -> Self {
        Self { rewriter, log }
    }

    pub fn rewriter(&self) -> &MethodRewriter {
        &self.rewriter
    }
}

impl ClassFileTransformer for FaultTransformer {
    fn transform(
        &self,
        loader: Option<LoaderId>,
        class_name: Option<&str>,
        class_being_redefined: bool,
        class_file: &[u8],
    ) -> Result<Option<Vec<u8>>, IllegalClassFormat> {
        // Redefinition and retransformation keep whatever is already loaded.
        if class_being_redefined {
            return Ok(None);
        }

        let load = ClassLoad {
            loader,
            class_name,
            bytes: class_file,
        };
        let outcome = match self.rewriter.rewrite(&load, &mut rand::rng()) {
            Ok(outcome) => outcome,
            Err(source) => {
                let class = source.class().to_string();
                warn!(class = %class, error = %source, "leaving malformed class untouched");
                self.log
                    .record(format_args!("transform failed for {class}: {source}"));
                return Err(IllegalClassFormat { class, source });
            }
        };

        let class = outcome
            .class
            .as_ref()
            .map_or_else(|| "<unnamed>".to_string(), |c| c.to_binary());
        if let Some(reason) = outcome.ignored {
            trace!(class = %class, reason = %reason, "class ignored");
            return Ok(None);
        }

        self.log.record(format_args!("transforming: {class}"));
        for decision in &outcome.decisions {
            match &decision.kind {
                DecisionKind::Injected { exception, roll, .. } => {
                    debug!(method = %decision.method, exception = %exception, roll, "injected");
                    self.log.record(format_args!(
                        "Injecting exception {exception} for method {} in class {class}",
                        decision.method
                    ));
                }
                DecisionKind::SkippedUnsupported { reason, .. } => {
                    debug!(method = %decision.method, reason = %reason, "method not instrumentable");
                }
                _ => trace!(decision = ?decision.kind, method = %decision.method, "skipped"),
            }
        }
        if tracing::enabled!(Level::TRACE) {
            if let Ok(json) = serde_json::to_string(&outcome) {
                trace!(class = %class, outcome = %json, "rewrite outcome");
            }
        }
        Ok(outcome.bytes)
    }
}
