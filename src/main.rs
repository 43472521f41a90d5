// main.rs
//
// `ccscan` binary: the CLI driver described in spec.md §6. Owns argument
// parsing and the default progress sink; every other behaviour (rule
// loading, scheduling, analysis, report rendering) lives in the library.

use ccscan::app::cache::AnalysisCache;
use ccscan::app::orchestrator;
use ccscan::app::scheduler::CancelToken;
use ccscan::core::model::{
    ProgressSink, ScanProgress, ScanRequest, SchedulingMode, ValidationStatus,
};
use ccscan::core::rule_store::{RuleDatabase, RuleStore};
use ccscan::core::{report, validators};
use ccscan::platform;
use ccscan::util;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Crash-log analysis engine for Bethesda game engines: suspect detection,
/// mod-conflict detection, plugin/FormID resolution, and game-file
/// validation.
#[derive(Parser, Debug)]
#[command(name = "ccscan", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug-level logging (equivalent to RUST_LOG=debug).
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress info-level logging (warnings and errors only).
    #[arg(long, global = true)]
    quiet: bool,
}

/// Flags shared by every subcommand that runs the analysis pipeline.
#[derive(Parser, Debug, Clone)]
struct ScanArgs {
    /// Crash log file, or directory to search recursively for `*.log` files.
    #[arg(long = "scan-path")]
    scan_path: PathBuf,

    /// Directory reports are written to. Created if missing.
    #[arg(long, default_value = "reports")]
    output: PathBuf,

    /// Directory containing installed mods, used for FCX-mode cross-checks.
    #[arg(long = "mods-path")]
    mods_path: Option<PathBuf>,

    /// Maximum number of logs analyzed concurrently. Omit to let the
    /// adaptive scheduler choose.
    #[arg(long = "parallel")]
    parallel: Option<usize>,

    /// Keep processing remaining logs after one fails instead of aborting
    /// the batch.
    #[arg(long = "continue-on-error")]
    continue_on_error: bool,

    /// Run the File Cross-Check (FCX) pass against `--mods-path`.
    #[arg(long)]
    fcx: bool,

    /// Simplify suspect output to the highest-severity match per log.
    #[arg(long)]
    simplify: bool,

    /// Include resolved FormID values in the report.
    #[arg(long = "show-formid-values")]
    show_formid_values: bool,

    /// Move logs with no detected suspects to a backup directory.
    #[arg(long = "move-unsolved")]
    move_unsolved: bool,

    /// Write a normalized sibling copy of each log before analysis.
    #[arg(long)]
    reformat: bool,

    /// Directory holding rule-database YAML overrides. Defaults to the
    /// platform config directory.
    #[arg(long = "rules-dir")]
    rules_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one log file or a directory of logs.
    ScanLogs(ScanArgs),

    /// Analyze the crash logs in the game's default log directory.
    ScanGame(ScanArgs),

    /// Analyze several scan targets as one batch, aggregating one summary.
    Batch {
        #[command(flatten)]
        args: ScanArgs,

        /// Additional scan targets, analyzed alongside `--scan-path`.
        #[arg(long = "also")]
        also: Vec<PathBuf>,
    },

    /// Validate game files (DDS/BA2/WAV/PEX-PSC) under a directory.
    ValidateFiles {
        /// Directory to search recursively for recognized game-file types.
        #[arg(long = "scan-path")]
        scan_path: PathBuf,

        /// Directory the validation report is written to.
        #[arg(long, default_value = "reports")]
        output: PathBuf,
    },

    /// Run the analysis pipeline on a single log and print only its report.
    GenerateReport {
        /// Crash log file to analyze.
        #[arg(long = "scan-path")]
        scan_path: PathBuf,

        /// Directory the report is written to.
        #[arg(long, default_value = "reports")]
        output: PathBuf,

        /// Directory holding rule-database YAML overrides.
        #[arg(long = "rules-dir")]
        rules_dir: Option<PathBuf>,
    },
}

/// Renders one line per scan-progress event to stdout. A GUI driver would
/// supply a different `ProgressSink`; the library never depends on this one.
struct CliProgressSink {
    quiet: bool,
}

impl ProgressSink for CliProgressSink {
    fn on_event(&self, event: ScanProgress) {
        if self.quiet && !matches!(event, ScanProgress::Failed { .. }) {
            return;
        }
        match event {
            ScanProgress::DiscoveryStarted { total } => {
                println!("Discovered {total} log(s) to analyze");
            }
            ScanProgress::LogStarted { path } => {
                tracing::debug!(path = %path.display(), "analyzing");
            }
            ScanProgress::LogCompleted { path, status, completed, total } => {
                println!(
                    "[{completed}/{total}] {} - {status:?}",
                    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
                );
            }
            ScanProgress::ModeSwitched { from, to } => {
                println!("Scheduler switched from {from:?} to {to:?}");
            }
            ScanProgress::Warning { message } => {
                eprintln!("warning: {message}");
            }
            ScanProgress::Failed { error } => {
                eprintln!("error: {error}");
            }
            ScanProgress::Cancelled => {
                println!("Scan cancelled; reporting partial results");
            }
            ScanProgress::Finished { summary_path } => {
                if let Some(path) = summary_path {
                    println!("Summary written to {}", path.display());
                }
            }
        }
    }
}

fn collect_log_paths(scan_path: &Path) -> std::io::Result<Vec<PathBuf>> {
    if scan_path.is_file() {
        return Ok(vec![scan_path.to_path_buf()]);
    }
    let mut paths = Vec::new();
    for entry in walkdir::WalkDir::new(scan_path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file()
            && entry.path().extension().map(|e| e.eq_ignore_ascii_case("log")).unwrap_or(false)
        {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}

fn collect_validation_targets(scan_path: &Path) -> Vec<PathBuf> {
    const RECOGNIZED: &[&str] = &["dds", "ba2", "wav", "xwm", "fuz", "pex", "psc"];
    if scan_path.is_file() {
        return vec![scan_path.to_path_buf()];
    }
    let mut paths = Vec::new();
    for entry in walkdir::WalkDir::new(scan_path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry.path().extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();
        if RECOGNIZED.contains(&ext.as_str()) {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();
    paths
}

fn build_request(args: &ScanArgs, log_paths: Vec<PathBuf>) -> ScanRequest {
    ScanRequest {
        log_paths,
        output_dir: args.output.clone(),
        mods_path: args.mods_path.clone(),
        fcx_mode: args.fcx,
        simplify: args.simplify,
        show_formid_values: args.show_formid_values,
        move_unsolved: args.move_unsolved,
        reformat: args.reformat,
        preferred_mode: args.parallel.map(|_| SchedulingMode::Parallel),
        batch_size: util::constants::DEFAULT_BATCH_SIZE,
        max_concurrent: args.parallel.unwrap_or_else(num_cpus_hint),
        continue_on_error: args.continue_on_error,
    }
}

fn num_cpus_hint() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Load (and compile) the rule database from `rules_dir`, falling back to
/// the config file's override and finally the platform default.
fn load_rules(rules_dir: Option<&Path>, config: &platform::config::AppConfig) -> Result<RuleDatabase, i32> {
    let platform_paths = platform::config::PlatformPaths::resolve();
    let fallback = config.rules_dir.as_deref().unwrap_or(&platform_paths.rules_dir);
    let dir = rules_dir.unwrap_or(fallback);
    match RuleStore::load(dir) {
        Ok(store) => Ok(RuleDatabase::compile(&store)),
        Err(e) => {
            eprintln!("Error: could not load rule database from '{}': {e}", dir.display());
            Err(3)
        }
    }
}

/// Run the full pipeline for one or more scan targets and translate the
/// result into the exit code spec.md §6 specifies.
fn run_scan_command(
    args: &ScanArgs,
    scan_paths: &[PathBuf],
    quiet: bool,
    config: &platform::config::AppConfig,
) -> i32 {
    let mut log_paths = Vec::new();
    for scan_path in scan_paths {
        match collect_log_paths(scan_path) {
            Ok(mut found) => log_paths.append(&mut found),
            Err(e) => {
                eprintln!("Error: could not read '{}': {e}", scan_path.display());
                return 3;
            }
        }
    }

    if log_paths.is_empty() {
        eprintln!("Error: no '*.log' files found under the given scan path(s)");
        return 3;
    }

    let rules = match load_rules(args.rules_dir.as_deref(), config) {
        Ok(rules) => rules,
        Err(code) => return code,
    };

    let request = build_request(args, log_paths);
    let cache = AnalysisCache::new(Duration::from_secs(util::constants::DEFAULT_CACHE_IDLE_TIMEOUT_SECS));
    let sink = CliProgressSink { quiet };
    let cancel = CancelToken::new();

    match orchestrator::run_scan(&request, &rules, &cache, &sink, &cancel) {
        Ok(result) => {
            println!(
                "{} succeeded, {} partial, {} failed",
                result.successful, result.partial, result.failed
            );
            if result.failed > 0 { 1 } else { 0 }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            match e {
                util::error::CrashLogError::Validation(_) => 3,
                _ => 1,
            }
        }
    }
}

fn run_validate_files(scan_path: &Path, output: &Path) -> i32 {
    let targets = collect_validation_targets(scan_path);
    if targets.is_empty() {
        println!(
            "No recognized game files (DDS/BA2/WAV/XWM/FUZ/PEX/PSC) found under '{}'",
            scan_path.display()
        );
        return 0;
    }

    if let Err(e) = std::fs::create_dir_all(output) {
        eprintln!("Error: output directory '{}' is not writable: {e}", output.display());
        return 3;
    }

    let mut lines = Vec::new();
    let mut worst = ValidationStatus::Valid;

    for path in &targets {
        match validators::validate(path) {
            Ok(Some(result)) => {
                if result.status > worst {
                    worst = result.status;
                }
                lines.push(report::render_validation_line(&path.display().to_string(), &result));
            }
            Ok(None) => {}
            Err(e) => {
                eprintln!("warning: could not validate '{}': {e}", path.display());
            }
        }
    }

    let mut body = String::from("# Game File Validation Report\n\n");
    for line in &lines {
        body.push_str(line);
        body.push('\n');
    }
    let report_path = output.join("validation_report.md");
    if let Err(e) = platform::fs::write_atomic(&report_path, body.as_bytes()) {
        eprintln!("Error: failed to write '{}': {e}", report_path.display());
        return 3;
    }

    println!("Validated {} file(s); report written to {}", targets.len(), report_path.display());

    match worst {
        ValidationStatus::Valid | ValidationStatus::Warning => 0,
        ValidationStatus::Error | ValidationStatus::Critical => 2,
    }
}

fn run_generate_report(
    scan_path: &Path,
    output: &Path,
    rules_dir: Option<&Path>,
    config: &platform::config::AppConfig,
) -> i32 {
    let args = ScanArgs {
        scan_path: scan_path.to_path_buf(),
        output: output.to_path_buf(),
        mods_path: None,
        parallel: Some(1),
        continue_on_error: false,
        fcx: false,
        simplify: false,
        show_formid_values: true,
        move_unsolved: false,
        reformat: false,
        rules_dir: rules_dir.map(|p| p.to_path_buf()),
    };
    run_scan_command(&args, std::slice::from_ref(&args.scan_path), true, config)
}

fn main() {
    let cli = Cli::parse();
    let platform_paths = platform::config::PlatformPaths::resolve();
    let config = platform::config::AppConfig::load(&platform_paths.config_file());

    util::logging::init(cli.verbose, cli.quiet, config.log_level());

    tracing::info!(version = util::constants::APP_VERSION, "ccscan starting");

    let exit_code = match &cli.command {
        Command::ScanLogs(args) => run_scan_command(args, std::slice::from_ref(&args.scan_path), cli.quiet, &config),
        Command::ScanGame(args) => run_scan_command(args, std::slice::from_ref(&args.scan_path), cli.quiet, &config),
        Command::Batch { args, also } => {
            let mut targets = vec![args.scan_path.clone()];
            targets.extend(also.iter().cloned());
            run_scan_command(args, &targets, cli.quiet, &config)
        }
        Command::ValidateFiles { scan_path, output } => run_validate_files(scan_path, output),
        Command::GenerateReport { scan_path, output, rules_dir } => {
            run_generate_report(scan_path, output, rules_dir.as_deref(), &config)
        }
    };

    std::process::exit(exit_code);
}
