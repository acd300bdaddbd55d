//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell as CompletionShell};
use colored::control;
use serde_json::{json, Value};
use thiserror::Error;

use drn_engine::core::config::Config;
use drn_engine::core::errors::{DrnError, StatusClass};
use drn_engine::engine::Engine;
use drn_engine::outcome::RecordError;
use drn_engine::risk::DeploymentContext;

/// Deployment-risk negotiation engine — scores proposed deployments,
/// generates canary rollout policies, and learns from recorded outcomes.
#[derive(Debug, Parser)]
#[command(
    name = "drn",
    author,
    version,
    about = "Deployment-risk negotiation engine",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Score a proposed deployment and generate its canary policy.
    Assess(AssessArgs),
    /// Record the observed outcome of a deployment.
    Record(RecordArgs),
    /// List recently recorded outcomes.
    History(HistoryArgs),
    /// Run one ensemble weight-tuning pass synchronously.
    Tune(TuneArgs),
    /// Run the engine in the foreground with the background tuning scheduler.
    Daemon(DaemonArgs),
    /// View resolved configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, clap::Args)]
struct AssessArgs {
    /// Path to a JSON `DeploymentContext`. Omit (or pass `-`) to read from stdin.
    #[arg(value_name = "PATH")]
    context: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
struct RecordArgs {
    /// Deployment id to record an outcome for.
    deployment_id: String,
    /// Observed error rate, in percent.
    #[arg(long, value_name = "PERCENT")]
    error_rate: f64,
    /// Observed p95 latency change, in percent.
    #[arg(long, value_name = "PERCENT")]
    latency_change: f64,
    /// Whether the deployment triggered a rollback.
    #[arg(long)]
    rollback: bool,
    /// Path to the original `DeploymentContext` JSON, to re-score against
    /// the real request rather than a synthesized one.
    #[arg(long, value_name = "PATH")]
    context: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args, Default)]
struct HistoryArgs {
    /// Maximum number of rows to return (default 20, capped at 500).
    #[arg(long, value_name = "N")]
    limit: Option<u32>,
}

#[derive(Debug, Clone, clap::Args, Default)]
struct TuneArgs {}

#[derive(Debug, Clone, clap::Args, Default)]
struct DaemonArgs {}

#[derive(Debug, Clone, clap::Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, clap::Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure with no structured status of its own.
    #[error("{0}")]
    Runtime(String),
    /// Engine-layer failure, carrying its own `status_class`.
    #[error(transparent)]
    Engine(#[from] DrnError),
    /// Outcome-recording failure, carrying its own `status_class`.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI: structured errors route
    /// through their `status_class` so the mapping stays consistent with
    /// whatever a transport adapter would do with the same error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Engine(e) => status_class_exit_code(e.status_class()),
            Self::Record(e) => status_class_exit_code(e.status_class()),
            Self::Runtime(_) | Self::Json(_) | Self::Io(_) => 5,
        }
    }
}

const fn status_class_exit_code(status_class: StatusClass) -> i32 {
    match status_class {
        StatusClass::BadRequest => 2,
        StatusClass::NotReady => 3,
        StatusClass::Timeout => 4,
        StatusClass::Internal => 5,
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Assess(args) => run_assess(cli, args),
        Command::Record(args) => run_record(cli, args),
        Command::History(args) => run_history(cli, args),
        Command::Tune(args) => run_tune(cli, args),
        Command::Daemon(args) => run_daemon(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_context(path: Option<&PathBuf>) -> Result<DeploymentContext, CliError> {
    let raw = match path {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path)
            .map_err(|e| CliError::Runtime(format!("reading {}: {e}", path.display())))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| CliError::Runtime(format!("reading stdin: {e}")))?;
            buf
        }
    };
    serde_json::from_str(&raw)
        .map_err(|e| CliError::User(format!("invalid deployment context JSON: {e}")))
}

fn build_engine(cli: &Cli) -> Result<Engine, CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let engine = Engine::new(&config)?;
    Ok(engine)
}

fn run_assess(cli: &Cli, args: &AssessArgs) -> Result<(), CliError> {
    let context = load_context(args.context.as_ref())?;
    let mut engine = build_engine(cli)?;
    let result = engine.assess(&context)?;
    engine.shutdown();

    match output_mode(cli) {
        OutputMode::Human => {
            let a = &result.risk_assessment;
            println!("Risk: {} ({:.1}/100)", a.risk_level, a.risk_score);
            println!("Confidence: {:.1}%", a.confidence_percent);
            if !a.identified_factors.is_empty() {
                println!(
                    "Factors: {}",
                    a.identified_factors
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            println!();
            println!("Canary policy:");
            for stage in &result.canary_policy.stages {
                println!(
                    "  [{}] {:<10} {:>5.1}%  {}s",
                    stage.index, stage.name, stage.traffic_percent, stage.duration_seconds
                );
            }
            println!(
                "Guardrails: error_rate <= {:.2}%, p95 latency <= {:.0}ms, rollback_on_violation={}",
                result.canary_policy.error_rate_threshold_percent,
                result.canary_policy.latency_threshold_ms,
                result.canary_policy.rollback_on_violation
            );
        }
        OutputMode::Json => {
            let payload = serde_json::to_value(&result)?;
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_record(cli: &Cli, args: &RecordArgs) -> Result<(), CliError> {
    let mut engine = build_engine(cli)?;

    let response = if let Some(path) = &args.context {
        let context = load_context(Some(path))?;
        let outcome = engine.record_outcome_with_context(
            &context,
            args.error_rate,
            args.latency_change,
            args.rollback,
        )?;
        drn_engine::engine::RecordOutcomeResponse {
            status: "success",
            deployment_id: outcome.deployment_id,
            final_score: outcome.final_score,
            timestamp: outcome.timestamp,
        }
    } else {
        engine.record_outcome(
            &args.deployment_id,
            args.error_rate,
            args.latency_change,
            args.rollback,
        )?
    };
    engine.shutdown();

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "Recorded outcome for {}: final_score={:.1}",
                response.deployment_id, response.final_score
            );
        }
        OutputMode::Json => {
            let payload = serde_json::to_value(&response)?;
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_history(cli: &Cli, args: &HistoryArgs) -> Result<(), CliError> {
    let mut engine = build_engine(cli)?;
    let (total, outcomes) = engine.recent_outcomes(args.limit)?;
    engine.shutdown();

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{total} total recorded outcomes, showing {}:", outcomes.len());
            println!(
                "  {:<20}  {:>8}  {:>10}  {:>10}  {:>8}",
                "deployment_id", "final", "error%", "latency%", "rollback"
            );
            for o in &outcomes {
                println!(
                    "  {:<20}  {:>8.1}  {:>10.2}  {:>10.1}  {:>8}",
                    o.deployment_id,
                    o.final_score,
                    o.actual_error_rate_percent,
                    o.actual_latency_change_percent,
                    o.rollback_triggered,
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({ "total": total, "outcomes": outcomes });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_tune(cli: &Cli, _args: &TuneArgs) -> Result<(), CliError> {
    let mut engine = build_engine(cli)?;
    let result = engine.tune_now()?;
    engine.shutdown();

    match output_mode(cli) {
        OutputMode::Human => match result {
            Some(r) => println!(
                "Tuned: heuristic_weight={:.3} ml_weight={:.3} samples_used={}",
                r.new_heuristic_weight, r.new_ml_weight, r.samples_used
            ),
            None => println!("Skipped: a tune was already in flight."),
        },
        OutputMode::Json => {
            let payload = json!({ "result": result });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_daemon(cli: &Cli, _args: &DaemonArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let mut engine = Engine::new(&config)?;

    #[cfg(feature = "daemon")]
    {
        let signals = drn_engine::daemon::signals::SignalHandler::new();
        eprintln!("drn: running in foreground, scheduler enabled={}", config.scheduler.enabled);
        while !signals.should_shutdown() {
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
        eprintln!("drn: shutdown requested, stopping scheduler");
    }
    #[cfg(not(feature = "daemon"))]
    {
        eprintln!("drn: daemon feature not enabled, running assessments only until Ctrl-C");
        loop {
            std::thread::sleep(std::time::Duration::from_secs(3600));
        }
    }

    engine.shutdown();
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;

    match args.command.clone().unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Path => match output_mode(cli) {
            OutputMode::Human => println!("{}", config.paths.config_file.display()),
            OutputMode::Json => write_json_line(&json!({ "config_path": config.paths.config_file }))?,
        },
        ConfigCommand::Show => match output_mode(cli) {
            OutputMode::Human => println!("{config:#?}"),
            OutputMode::Json => write_json_line(&serde_json::to_value(&config)?)?,
        },
        ConfigCommand::Validate => match output_mode(cli) {
            OutputMode::Human => println!("configuration is valid"),
            OutputMode::Json => write_json_line(&json!({ "valid": true }))?,
        },
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("DRN_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };
    match env_mode.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(CliError::User("x".to_string()).exit_code(), 1);
        assert_eq!(CliError::Runtime("x".to_string()).exit_code(), 5);
        assert_eq!(
            CliError::Engine(DrnError::Validation {
                details: String::new()
            })
            .exit_code(),
            2
        );
        assert_eq!(
            CliError::Engine(DrnError::NotReady { what: "store" }).exit_code(),
            3
        );
        assert_eq!(
            CliError::Engine(DrnError::Timeout {
                elapsed_ms: 1,
                budget_ms: 1
            })
            .exit_code(),
            4
        );
        assert_eq!(
            CliError::Engine(DrnError::Internal {
                details: String::new()
            })
            .exit_code(),
            5
        );
        assert_eq!(
            CliError::Record(RecordError::Validation {
                details: String::new()
            })
            .exit_code(),
            2
        );
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(resolve_output_mode(true, Some("human"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("json"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, None, true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }
}
