//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use gesp_analysis::analysis::report::{PreparedRun, ReportKind};
use gesp_analysis::analysis::seed::{Metric, replay_seed};
use gesp_analysis::analysis::sweep::{
    GraceSweep, GraceTimeSweep, SweepRunner, grace_axis, time_sweep_axes,
};
use gesp_analysis::core::config::Config;
use gesp_analysis::core::errors::GespError;
use gesp_analysis::data::synth::{SyntheticRunConfig, write_run};
use gesp_analysis::engine::decision::check_grace;
use gesp_analysis::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Grace-period early stopping analysis for evolutionary experiment logs.
#[derive(Debug, Parser)]
#[command(
    name = "gesp",
    author,
    version,
    about = "GESP - grace-period early stopping analysis",
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
    /// Report sweep progress on stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Load result logs and report which seeds are kept for analysis.
    Seeds(InputArgs),
    /// Replay one seed at one grace proportion, episode by episode.
    Replay(ReplayArgs),
    /// Sweep the grace proportion and report per-metric percentile bands.
    Grace(GraceArgs),
    /// Sweep grace proportion against elapsed-time cutoffs.
    Timeline(TimelineArgs),
    /// Write synthetic per-seed result logs.
    Simulate(SimulateArgs),
    /// Inspect configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct InputArgs {
    /// Directory holding per-seed result logs.
    #[arg(long, value_name = "DIR")]
    input: Option<PathBuf>,
    /// Experiment name (result file prefix).
    #[arg(long, value_name = "NAME")]
    experiment: Option<String>,
    /// Share of the longest run a seed must reach to be kept.
    #[arg(long, value_name = "FRACTION")]
    retention: Option<f64>,
    /// Also write the JSON report to this file.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct ReplayArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Seed to replay.
    #[arg(long)]
    seed: u64,
    /// Grace proportion in [0, 1].
    #[arg(long, default_value_t = 0.5)]
    grace: f64,
}

#[derive(Debug, Clone, Args, Default)]
struct GraceArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long)]
    grace_min: Option<f64>,
    #[arg(long)]
    grace_max: Option<f64>,
    /// Number of grace values, both bounds included.
    #[arg(long)]
    points: Option<usize>,
    /// Worker threads.
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,
}

#[derive(Debug, Clone, Args, Default)]
struct TimelineArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Number of grace values over [0, 1].
    #[arg(long)]
    grace_points: Option<usize>,
    /// Number of time cutoffs inside the run horizon.
    #[arg(long)]
    time_partitions: Option<usize>,
    /// Worker threads.
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct SimulateArgs {
    /// Directory to write logs into (defaults to input.results_dir).
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    #[arg(long, value_name = "NAME")]
    experiment: Option<String>,
    #[arg(long, default_value_t = 10)]
    seeds: u64,
    #[arg(long, default_value_t = 2)]
    first_seed: u64,
    #[arg(long, default_value_t = 200)]
    episodes: usize,
    #[arg(long, default_value_t = 100)]
    steps: usize,
    /// Seeds that stop after a third of the episodes.
    #[arg(long, default_value_t = 1)]
    truncated: u64,
    #[arg(long, default_value_t = 0)]
    rng_seed: u64,
    /// Overwrite existing log files.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the config file location.
    Path,
    /// Print the effective configuration.
    Show,
    /// Validate the effective configuration.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include build metadata.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input.
    #[error("{0}")]
    User(String),
    /// Analysis finished but part of its output could not be delivered.
    #[error("{0}")]
    Partial(String),
    #[error(transparent)]
    Gesp(#[from] GespError),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
            Self::Gesp(err) => match err {
                GespError::Io { .. } | GespError::Runtime { .. } => 2,
                GespError::Serialization { .. } => 3,
                _ => 1,
            },
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            Self::Gesp(err) => Some(err.code()),
            _ => None,
        }
    }
}

/// Per-command state: effective config, output mode, and the activity log.
struct Session<'a> {
    cli: &'a Cli,
    command: &'static str,
    mode: OutputMode,
    config: Config,
    log: JsonlWriter,
}

impl Session<'_> {
    fn note(&self, message: &str) {
        if !self.cli.quiet {
            eprintln!("gesp: {message}");
        }
    }

    fn entry(&self, event: EventType, severity: Severity) -> LogEntry {
        LogEntry::new(event, severity)
            .with_command(self.command)
            .with_experiment(&self.config.input.experiment_name)
    }

    fn runner(&self, parallelism: usize) -> SweepRunner {
        let runner = SweepRunner::new(parallelism);
        if !self.cli.verbose {
            return runner;
        }
        runner.with_progress(|done, total| {
            let step = (total / 10).max(1);
            if done == total || done % step == 0 {
                eprintln!("gesp: {done}/{total} seed replays");
            }
        })
    }

    fn prepare(&mut self, args: &InputArgs) -> Result<PreparedRun, CliError> {
        if let Some(dir) = &args.input {
            self.config.input.results_dir.clone_from(dir);
        }
        if let Some(name) = &args.experiment {
            self.config.input.experiment_name.clone_from(name);
        }
        if let Some(fraction) = args.retention {
            self.config.preprocess.retention_fraction = fraction;
        }
        self.config.validate()?;

        let start = self
            .entry(EventType::AnalysisStart, Severity::Info)
            .with_path(&self.config.input.results_dir);
        self.log.write_entry(&start);

        let run = PreparedRun::load(&self.config)?;
        if !run.outcome.discarded.is_empty() {
            let ids: Vec<u64> = run.outcome.discarded.iter().map(|d| d.seed).collect();
            let mut entry = self.entry(EventType::SeedsDiscarded, Severity::Warning);
            entry.seeds_discarded = Some(ids.clone());
            entry.seeds_retained = Some(run.outcome.retained.len());
            entry.details = Some(format!(
                "run time below {:.3} ({} x cohort max {:.3})",
                run.outcome.horizon, run.retention_fraction, run.outcome.cohort_max_elapsed
            ));
            self.log.write_entry(&entry);
            self.note(&format!(
                "dropped {} short seed(s): {ids:?}",
                run.outcome.discarded.len()
            ));
        }
        Ok(run)
    }

    fn complete(&mut self, run: &PreparedRun, started: Instant) {
        let mut entry = self.entry(EventType::AnalysisComplete, Severity::Info);
        entry.ok = Some(true);
        entry.seeds_retained = Some(run.outcome.retained.len());
        entry.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        self.log.write_entry(&entry);
    }

    /// Print (JSON mode) and optionally persist the report.
    fn deliver<T: Serialize>(
        &self,
        run: &PreparedRun,
        kind: ReportKind,
        result: T,
        output: Option<&PathBuf>,
    ) -> Result<(), CliError> {
        let report = run.report(&self.config, kind, result)?;
        if self.mode == OutputMode::Json {
            write_json_line(&serde_json::to_value(&report)?)?;
        }
        if let Some(path) = output {
            report.write_to(path).map_err(|e| {
                CliError::Partial(format!("analysis finished but the report was not written: {e}"))
            })?;
            self.note(&format!("report written to {}", path.display()));
        }
        Ok(())
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Seeds(args) => with_session(cli, "seeds", |s| run_seeds(s, args)),
        Command::Replay(args) => with_session(cli, "replay", |s| run_replay(s, args)),
        Command::Grace(args) => with_session(cli, "grace", |s| run_grace(s, args)),
        Command::Timeline(args) => with_session(cli, "timeline", |s| run_timeline(s, args)),
        Command::Simulate(args) => with_session(cli, "simulate", |s| run_simulate(s, args)),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
        Command::Version(args) => emit_version(cli, args),
    }
}

fn with_session<F>(cli: &Cli, command: &'static str, body: F) -> Result<(), CliError>
where
    F: FnOnce(&mut Session<'_>) -> Result<(), CliError>,
{
    let config = Config::load(cli.config.as_deref())?;
    let log = JsonlWriter::open(JsonlConfig::from_paths(&config.paths));
    let mut session = Session {
        cli,
        command,
        mode: output_mode(cli),
        config,
        log,
    };

    let result = body(&mut session);
    if let Err(err) = &result {
        let mut entry = session.entry(EventType::Error, Severity::Error);
        entry.ok = Some(false);
        entry.error_code = err.code().map(str::to_string);
        entry.error_message = Some(err.to_string());
        session.log.write_entry(&entry);
    }
    session.log.flush();
    result
}

fn run_seeds(session: &mut Session<'_>, args: &InputArgs) -> Result<(), CliError> {
    let started = Instant::now();
    let run = session.prepare(args)?;

    if session.mode == OutputMode::Human {
        let outcome = &run.outcome;
        println!(
            "{} {} ({} files, {} episodes kept)",
            "Experiment".bold(),
            run.experiment,
            run.inputs.len(),
            outcome.table.episode_count()
        );
        println!(
            "  cohort max run time {:.3}, horizon {:.3} ({} x max)",
            outcome.cohort_max_elapsed, outcome.horizon, run.retention_fraction
        );
        println!("  {:>8}  {:>9}  {:>12}  status", "seed", "episodes", "run time");
        for input in &run.inputs {
            let discarded = outcome.discarded.iter().find(|d| d.seed == input.seed);
            let max_elapsed = match discarded {
                Some(d) => Some(d.max_elapsed),
                None => outcome
                    .table
                    .seed(input.seed)
                    .and_then(|seed_run| seed_run.max_elapsed()),
            };
            let status = if discarded.is_some() {
                "dropped".red().to_string()
            } else {
                "kept".green().to_string()
            };
            println!(
                "  {:>8}  {:>9}  {:>12}  {status}",
                input.seed,
                input.episodes,
                max_elapsed.map_or_else(|| "-".to_string(), |t| format!("{t:.3}")),
            );
        }
    }

    let summary = run.outcome.summary(run.retention_fraction);
    session.deliver(&run, ReportKind::Seeds, summary, args.output.as_ref())?;
    session.complete(&run, started);
    Ok(())
}

fn run_replay(session: &mut Session<'_>, args: &ReplayArgs) -> Result<(), CliError> {
    let started = Instant::now();
    check_grace(args.grace)?;
    let run = session.prepare(&args.input)?;

    let Some(seed_run) = run.outcome.table.seed(args.seed) else {
        let reason = if run.outcome.discarded.iter().any(|d| d.seed == args.seed) {
            "was dropped as a short run"
        } else {
            "has no result file"
        };
        return Err(CliError::User(format!("seed {} {reason}", args.seed)));
    };
    let replay = replay_seed(seed_run.trajectories(), args.grace)?;

    if session.mode == OutputMode::Human {
        println!(
            "{} seed {} at grace {:.3}",
            "Replay".bold(),
            args.seed,
            args.grace
        );
        println!("  {:>7}  {:>7}  {:>8}  {:>7}", "episode", "frames", "new best", "stopped");
        for (index, decision) in replay.decisions.iter().enumerate() {
            let stopped = if decision.was_early_stopped {
                "yes".yellow().to_string()
            } else {
                "no".to_string()
            };
            println!(
                "  {index:>7}  {:>7}  {:>8}  {stopped:>7}",
                decision.frames_evaluated,
                if decision.found_new_best { "yes" } else { "no" },
            );
        }
        println!(
            "  steps without stopping {}, with stopping {}",
            replay.steps_no_stop, replay.steps_with_stop
        );
        println!(
            "  best without stopping {:.4}, with stopping {:.4}",
            replay.best_f_no_stop, replay.best_f_with_stop
        );
        for metric in Metric::ALL {
            println!("  {:<24} {:.4}", metric.label(), replay.metrics.get(metric));
        }
    }

    #[derive(Serialize)]
    struct ReplayResult<'r> {
        seed: u64,
        #[serde(flatten)]
        replay: &'r gesp_analysis::analysis::seed::SeedReplay,
    }
    let result = ReplayResult {
        seed: args.seed,
        replay: &replay,
    };
    session.deliver(&run, ReportKind::Replay, result, args.input.output.as_ref())?;
    session.complete(&run, started);
    Ok(())
}

fn run_grace(session: &mut Session<'_>, args: &GraceArgs) -> Result<(), CliError> {
    let started = Instant::now();
    let sweep_cfg = &mut session.config.sweep;
    if let Some(value) = args.grace_min {
        sweep_cfg.grace_min = value;
    }
    if let Some(value) = args.grace_max {
        sweep_cfg.grace_max = value;
    }
    if let Some(value) = args.points {
        sweep_cfg.grace_points = value;
    }
    if let Some(value) = args.parallelism {
        sweep_cfg.parallelism = value;
    }
    let run = session.prepare(&args.input)?;

    let cfg = &session.config.sweep;
    let grace = grace_axis(cfg.grace_min, cfg.grace_max, cfg.grace_points);
    let sweep = session
        .runner(cfg.parallelism)
        .grace_sweep(&run.outcome.table, &grace)?;

    if session.mode == OutputMode::Human {
        print_grace_sweep(&sweep);
    }
    session.deliver(&run, ReportKind::GraceSweep, &sweep, args.input.output.as_ref())?;
    session.complete(&run, started);
    Ok(())
}

fn run_timeline(session: &mut Session<'_>, args: &TimelineArgs) -> Result<(), CliError> {
    let started = Instant::now();
    if let Some(value) = args.grace_points {
        session.config.time_sweep.grace_points = value;
    }
    if let Some(value) = args.time_partitions {
        session.config.time_sweep.time_partitions = value;
    }
    if let Some(value) = args.parallelism {
        session.config.sweep.parallelism = value;
    }
    let run = session.prepare(&args.input)?;

    let cfg = &session.config.time_sweep;
    let (grace, cutoffs) =
        time_sweep_axes(cfg.grace_points, cfg.time_partitions, run.outcome.horizon);
    let sweep = session
        .runner(session.config.sweep.parallelism)
        .grace_time_sweep(&run.outcome.table, &grace, &cutoffs)?;

    for notice in &sweep.notices {
        let mut entry = session.entry(EventType::SweepPointSkipped, Severity::Warning);
        entry.grace = notice.grace;
        entry.time_cutoff = notice.time_cutoff;
        entry.details = Some(notice.message.clone());
        session.log.write_entry(&entry);
        session.note(&notice.message);
    }

    if session.mode == OutputMode::Human {
        print_time_sweep(&sweep);
    }
    session.deliver(&run, ReportKind::GraceTimeSweep, &sweep, args.input.output.as_ref())?;
    session.complete(&run, started);
    Ok(())
}

fn run_simulate(session: &mut Session<'_>, args: &SimulateArgs) -> Result<(), CliError> {
    let started = Instant::now();
    let dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| session.config.input.results_dir.clone());
    let experiment = args
        .experiment
        .clone()
        .unwrap_or_else(|| session.config.input.experiment_name.clone());
    let synth = SyntheticRunConfig {
        seeds: args.seeds,
        first_seed: args.first_seed,
        episodes: args.episodes,
        steps: args.steps,
        truncated_seeds: args.truncated,
        ..SyntheticRunConfig::default()
    };

    std::fs::create_dir_all(&dir).map_err(|source| GespError::io(&dir, source))?;
    let written = write_run(&dir, &experiment, &synth, args.rng_seed, args.force)?;

    let mut entry = LogEntry::new(EventType::SimulateComplete, Severity::Info)
        .with_command(session.command)
        .with_experiment(&experiment)
        .with_path(&dir)
        .with_details(format!("{} files", written.len()));
    entry.ok = Some(true);
    entry.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
    session.log.write_entry(&entry);

    match session.mode {
        OutputMode::Human => {
            println!(
                "Wrote {} result logs for {} to {}",
                written.len(),
                experiment.bold(),
                dir.display()
            );
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "simulate",
                "experiment": experiment,
                "dir": dir.to_string_lossy(),
                "files": written.iter().map(|p| p.to_string_lossy()).collect::<Vec<_>>(),
                "rng_seed": args.rng_seed,
                "synthetic": serde_json::to_value(&synth)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_grace_sweep(sweep: &GraceSweep) {
    println!(
        "{} over {} seeds {:?}",
        "Grace sweep".bold(),
        sweep.seeds.len(),
        sweep.seeds
    );
    for metric in Metric::ALL {
        println!();
        println!("  {}", metric.label().bold());
        println!("  {:>7}  {:>8}  {:>8}  {:>8}", "grace", "p25", "p50", "p75");
        for row in sweep.curve(metric) {
            println!(
                "  {:>7.3}  {:>8.4}  {:>8.4}  {:>8.4}",
                row.grace, row.p25, row.p50, row.p75
            );
        }
    }
}

fn print_time_sweep(sweep: &GraceTimeSweep) {
    println!(
        "{} ({} grace values x {} cutoffs)",
        "Grace x time sweep".bold(),
        sweep.grace_values.len(),
        sweep.time_cutoffs.len()
    );
    for metric in Metric::ALL {
        println!();
        println!("  {}", metric.label().bold());
        let header: String = sweep
            .time_cutoffs
            .iter()
            .map(|t| format!("{t:>9.2}"))
            .collect();
        println!("  {:>7} {header}", "grace\\t");
        for (grace, row) in sweep.grace_values.iter().zip(sweep.matrix(metric)) {
            let cells: String = row
                .iter()
                .map(|cell| cell.map_or_else(|| format!("{:>9}", "-"), |v| format!("{v:>9.4}")))
                .collect();
            println!("  {grace:>7.3} {cells}");
        }
    }
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;
            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml()?),
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;
                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                if output_mode(cli) == OutputMode::Json {
                    let payload = json!({
                        "command": "config validate",
                        "valid": false,
                        "error_code": e.code(),
                        "error": e.to_string(),
                    });
                    write_json_line(&payload)?;
                }
                Err(CliError::Gesp(e))
            }
        },
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");
    let git_sha = option_env!("GIT_SHA").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("gesp {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
                println!("git_sha: {git_sha}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "gesp",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                    "git_sha": git_sha,
                }
            });
            write_json_line(&payload)?;
        }
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
    let env_mode = std::env::var("GESP_OUTPUT_FORMAT").ok();
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

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_before_and_after_subcommand() {
        let before = Cli::try_parse_from([
            "gesp",
            "--config",
            "/tmp/gesp.toml",
            "--json",
            "--no-color",
            "-v",
            "seeds",
        ]);
        assert!(before.is_ok());

        let after = Cli::try_parse_from(["gesp", "seeds", "--json", "--no-color", "-q"]);
        assert!(after.is_ok());

        assert!(Cli::try_parse_from(["gesp", "-v", "-q", "seeds"]).is_err());
    }

    #[test]
    fn parses_analysis_subcommands() {
        let cases = [
            vec!["gesp", "seeds", "--input", "/data/results", "--experiment", "veenstra"],
            vec!["gesp", "replay", "--seed", "3", "--grace", "0.25"],
            vec!["gesp", "grace", "--grace-min", "0.1", "--points", "5", "-j", "4"],
            vec!["gesp", "grace", "--output", "/tmp/report.json"],
            vec!["gesp", "timeline", "--grace-points", "6", "--time-partitions", "4"],
            vec!["gesp", "simulate", "--output-dir", "/tmp/synth", "--seeds", "3", "--force"],
            vec!["gesp", "config", "show"],
            vec!["gesp", "config", "validate"],
            vec!["gesp", "version", "--verbose"],
        ];
        for case in cases {
            let parsed = Cli::try_parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse case: {case:?}");
        }
    }

    #[test]
    fn replay_requires_seed() {
        assert!(Cli::try_parse_from(["gesp", "replay"]).is_err());
        assert!(Cli::try_parse_from(["gesp", "replay", "--seed", "x"]).is_err());
    }

    #[test]
    fn completions_support_bash_zsh_and_fish() {
        for shell in ["bash", "zsh", "fish"] {
            let parsed = Cli::try_parse_from(["gesp", "completions", shell]);
            assert!(parsed.is_ok(), "failed shell parse for {shell}");
        }
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("json"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(
            resolve_output_mode(false, Some(" AUTO "), true),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(CliError::User(String::new()).exit_code(), 1);
        assert_eq!(CliError::Partial(String::new()).exit_code(), 4);
        assert_eq!(
            CliError::Gesp(GespError::GraceOutOfRange { value: 3.0 }).exit_code(),
            1
        );
        assert_eq!(
            CliError::Gesp(GespError::io("/x", io::Error::other("gone"))).exit_code(),
            2
        );
        assert_eq!(
            CliError::Gesp(GespError::EmptyCurve { step: 1 }).code(),
            Some("GESP-2006")
        );
    }
}
