//! Agent activation and the process-wide dispatch entry point.
//!
//! The host calls [`premain`] when the agent is named at startup and
//! [`agentmain`] when it is loaded into a running process. Both parse the
//! option string, build the shared state once, and register the transformer.
//! Activation happens at most once per process; the injected prologue reaches
//! the active agent through [`throw_dispatch`].

use crate::debug_log::DebugLog;
use crate::factory::{ExceptionFactory, Throwable, TypeIntrospector};
use crate::governor::ThrowGovernor;
use crate::registrar::{FaultTransformer, Instrumentation};
use crate::rewrite::MethodRewriter;
use fl_config::{load_agent_config, AgentConfig, ConfigError};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{info, info_span};

static ACTIVE: OnceLock<Arc<Agent>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Named on the command line, active before the application starts.
    Startup,
    /// Loaded into an already-running process.
    Attached,
}

impl std::fmt::Display for ActivationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationMode::Startup => write!(f, "startup"),
            ActivationMode::Attached => write!(f, "attached"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("agent already active in this process (activation {0})")]
    AlreadyActive(String),
}

impl From<AgentError> for fl_common::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Config(e) => e.into(),
            AgentError::AlreadyActive(_) => fl_common::Error::AlreadyActive,
        }
    }
}

/// Everything one activation owns.
#[derive(Debug)]
pub struct Agent {
    activation_id: String,
    mode: ActivationMode,
    config: Arc<AgentConfig>,
    factory: ExceptionFactory,
    transformer: Arc<FaultTransformer>,
    log: DebugLog,
}

/// Short random id tying log lines to one activation.
fn generate_activation_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("fl-{}", &uuid[..12])
}

impl Agent {
    /// Build an agent without registering it anywhere.
    pub fn build(
        mode: ActivationMode,
        config: AgentConfig,
        introspector: Arc<dyn TypeIntrospector>,
    ) -> Result<Self, AgentError> {
        let rewriter = MethodRewriter::new(&config).map_err(ConfigError::from)?;
        let log = DebugLog::new(&config.debug_log);
        let governor = Arc::new(ThrowGovernor::new(config.throw_ceiling));
        Ok(Self {
            activation_id: generate_activation_id(),
            mode,
            factory: ExceptionFactory::new(introspector, governor),
            transformer: Arc::new(FaultTransformer::new(rewriter, log.clone())),
            config: Arc::new(config),
            log,
        })
    }

    pub fn activation_id(&self) -> &str {
        &self.activation_id
    }

    pub fn mode(&self) -> ActivationMode {
        self.mode
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn governor(&self) -> &Arc<ThrowGovernor> {
        self.factory.governor()
    }

    pub fn factory(&self) -> &ExceptionFactory {
        &self.factory
    }

    pub fn transformer(&self) -> Arc<FaultTransformer> {
        Arc::clone(&self.transformer)
    }

    /// The prologue's call, routed to this agent.
    pub fn dispatch(&self, method_id: &str, exception: &str) -> Result<(), Throwable> {
        self.factory.throw_dispatch(method_id, exception).inspect_err(|throwable| {
            self.log
                .record(format_args!("Throwing {throwable} from {method_id}"));
        })
    }
}

/// Startup activation.
pub fn premain(options: &str, inst: &dyn Instrumentation) -> Result<Arc<Agent>, AgentError> {
    activate(ActivationMode::Startup, options, inst)
}

/// Activation in a running process.
pub fn agentmain(options: &str, inst: &dyn Instrumentation) -> Result<Arc<Agent>, AgentError> {
    activate(ActivationMode::Attached, options, inst)
}

fn activate(
    mode: ActivationMode,
    options: &str,
    inst: &dyn Instrumentation,
) -> Result<Arc<Agent>, AgentError> {
    if let Some(existing) = ACTIVE.get() {
        return Err(AgentError::AlreadyActive(existing.activation_id.clone()));
    }

    let config = load_agent_config(options)?;
    let agent = Arc::new(Agent::build(mode, config, inst.type_introspector())?);

    let span = info_span!("activation", id = %agent.activation_id, mode = %mode);
    let _enter = span.enter();

    // Lost race: someone else activated between the check and here.
    if ACTIVE.set(Arc::clone(&agent)).is_err() {
        let winner = ACTIVE.get().map(|a| a.activation_id.clone()).unwrap_or_default();
        return Err(AgentError::AlreadyActive(winner));
    }

    inst.add_transformer(agent.transformer());
    info!(
        probability = agent.config.probability,
        ceiling = agent.config.throw_ceiling,
        deny_entries = agent.config.deny.len(),
        debug_log = %agent.config.debug_log.display(),
        "fault injection active"
    );
    agent.log.record(format_args!(
        "agent {} active ({mode}), probability {}",
        agent.activation_id, agent.config.probability
    ));
    Ok(agent)
}

/// The active agent, if any.
pub fn active() -> Option<Arc<Agent>> {
    ACTIVE.get().cloned()
}

/// Target of every injected prologue.
///
/// Before activation this returns normally, so instrumented code that runs
/// without an agent behaves as if it was never rewritten.
pub fn throw_dispatch(method_id: &str, exception: &str) -> Result<(), Throwable> {
    match ACTIVE.get() {
        Some(agent) => agent.dispatch(method_id, exception),
        None => Ok(()),
    }
}
