//! fl-attach: load the faultline agent into a running JVM.
//!
//! Attaches, hands the agent its option string, then stays in the foreground
//! until SIGINT/SIGTERM. The agent has no detach path, so stopping the
//! controller does not uninstrument the target.

use clap::Parser;
use fl_common::{ProcessId, StructuredError};
use fl_config::resolve::resolve_with_env;
use fl_config::AgentOptions;
use fl_core::attach::{shutdown, AgentLoader, AgentPayload, AttachOptions, HotSpotAttacher};
use fl_core::exit_codes::ExitCode;
use fl_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Inject exceptions into a running JVM
#[derive(Parser, Debug)]
#[command(name = "fl-attach")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Probability that an eligible method is instrumented, in [0, 1]
    #[arg(short = 'p', long = "prob", default_value_t = 1.0)]
    prob: f64,

    /// Target process ID
    #[arg(short = 'P', long)]
    pid: Option<u32>,

    /// Agent payload: a .jar Java agent or a native agent library
    #[arg(short = 'a', long, env = "FAULTLINE_AGENT")]
    agent: Option<PathBuf>,

    /// Times each instrumented method may throw
    #[arg(long)]
    ceiling: Option<u64>,

    /// Extra class prefix or glob never to instrument (repeatable)
    #[arg(long = "deny", value_name = "PREFIX|GLOB")]
    deny: Vec<String>,

    /// Debug log path inside the target
    #[arg(long)]
    debug_log: Option<PathBuf>,

    /// Seconds to wait for the target's attach listener
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Log format: human or jsonl
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn agent_options(&self) -> AgentOptions {
        AgentOptions {
            probability: Some(self.prob),
            throw_ceiling: self.ceiling,
            deny: self.deny.clone(),
            debug_log: self.debug_log.clone(),
            dispatch: None,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = LogLevel::from_verbosity(cli.verbose, cli.quiet);
    let log_config = LogConfig::from_env(Some(level), cli.log_format);
    init_logging(&log_config);

    let exit_code = run(&cli, log_config.format);
    std::process::exit(exit_code.as_i32());
}

/// Report a failed attach the way the log format asks for.
fn report(err: fl_common::Error, format: LogFormat) {
    match format {
        LogFormat::Jsonl => eprintln!("{}", StructuredError::from(&err).to_json()),
        LogFormat::Human => eprintln!("{}", err.to_human()),
    }
}

fn run(cli: &Cli, format: LogFormat) -> ExitCode {
    let Some(pid) = cli.pid.map(ProcessId) else {
        eprintln!("fl-attach: missing required --pid <PID>");
        return ExitCode::ArgsError;
    };

    // Validate here so a bad option string never reaches the target.
    let options = cli.agent_options();
    if let Err(e) = resolve_with_env(&options, |_| None) {
        eprintln!("fl-attach: invalid agent options: {e}");
        return ExitCode::ArgsError;
    }
    let option_string = match options.to_option_string() {
        Ok(rendered) => rendered,
        Err(e) => {
            eprintln!("fl-attach: invalid agent options: {e}");
            return ExitCode::ArgsError;
        }
    };

    let Some(agent) = &cli.agent else {
        eprintln!("fl-attach: no agent payload; pass --agent or set FAULTLINE_AGENT");
        return ExitCode::ArgsError;
    };
    let payload = match AgentPayload::from_path(agent).canonicalize() {
        Ok(payload) => payload,
        Err(e) => {
            eprintln!("fl-attach: {e}");
            return ExitCode::from(&e);
        }
    };

    let attacher = HotSpotAttacher::new(AttachOptions {
        timeout: Duration::from_secs(cli.timeout),
        ..AttachOptions::default()
    });
    info!(pid = %pid, payload = %payload.path().display(), options = %option_string, "attaching");

    match attacher.load(pid, &payload, &option_string) {
        Ok(reply) => {
            info!(pid = %pid, output = %reply.output, "agent loaded");
        }
        Err(e) => {
            let code = ExitCode::from(&e);
            report(e.into(), format);
            return code;
        }
    }

    if let Err(e) = shutdown::install_handlers() {
        warn!(error = %e, "could not install signal handlers");
    }
    info!("attached; press Ctrl-C to stop");
    shutdown::wait_for_shutdown(Duration::from_millis(200));
    info!("interrupted");
    ExitCode::Interrupted
}
