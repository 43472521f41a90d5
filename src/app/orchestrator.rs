// app/orchestrator.rs
//
// Scan orchestrator (C10): validates a ScanRequest, optionally reformats
// logs, dispatches the batch through the adaptive scheduler, writes reports,
// and optionally relocates logs with no suspects found to the backup
// directory.
//
// Grounded on the teacher's `app/scan.rs` (present only as an unimplemented
// stub in the teacher -- built out fully here) and the progress-channel
// idiom from `app/dir_watcher.rs`, generalised from an mpsc channel to the
// `ProgressSink` trait so this layer never depends on a UI type.

use crate::app::cache::{cache_key, AnalysisCache};
use crate::app::scheduler::{self, CancelToken};
use crate::core::model::{
    AnalysisOutputs, CrashLog, LogOutcome, LogOutcomeStatus, ModFinding, ProgressSink, ScanProgress, ScanRequest,
    ScanResult, SuspectRule,
};
use crate::core::rule_store::RuleDatabase;
use crate::core::{conflicts, parser, plugins, report, scanner};
use crate::platform::fs as pfs;
use crate::util::constants::ABSOLUTE_MAX_LOGS;
use crate::util::error::{Result as CrashLogResult, ValidationError};
use std::path::{Path, PathBuf};

/// Validate a request before any work begins. Fatal on the first violation.
pub fn validate_request(request: &ScanRequest) -> std::result::Result<(), ValidationError> {
    if request.log_paths.is_empty() {
        return Err(ValidationError::EmptyLogPaths);
    }
    if request.log_paths.len() > ABSOLUTE_MAX_LOGS {
        return Err(ValidationError::ValueOutOfRange {
            field: "log_paths",
            value: request.log_paths.len().to_string(),
            expected: format!("at most {ABSOLUTE_MAX_LOGS}"),
        });
    }
    for path in &request.log_paths {
        if !path.is_file() {
            return Err(ValidationError::LogPathNotFound { path: path.clone() });
        }
    }
    if let Err(source) = std::fs::create_dir_all(&request.output_dir) {
        return Err(ValidationError::OutputDirUnwritable {
            path: request.output_dir.clone(),
            source,
        });
    }
    if request.batch_size == 0 || request.batch_size > crate::util::constants::MAX_BATCH_SIZE {
        return Err(ValidationError::ValueOutOfRange {
            field: "batch_size",
            value: request.batch_size.to_string(),
            expected: format!("1..={}", crate::util::constants::MAX_BATCH_SIZE),
        });
    }
    Ok(())
}

/// Run a full scan described by `request`. Returns a `ScanResult` with one
/// `LogOutcome` per input log, in input order, plus aggregated histograms
/// and a written batch summary report.
pub fn run_scan(
    request: &ScanRequest,
    rules: &RuleDatabase,
    cache: &AnalysisCache,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> CrashLogResult<ScanResult> {
    validate_request(request).map_err(crate::util::error::CrashLogError::Validation)?;

    sink.on_event(ScanProgress::DiscoveryStarted { total: request.log_paths.len() });

    if request.reformat {
        for path in &request.log_paths {
            if let Err(e) = reformat_sibling(path) {
                sink.on_event(ScanProgress::Warning {
                    message: format!("Reformat pass failed for '{}': {e}", path.display()),
                });
            }
        }
    }

    let total = request.log_paths.len();
    let error_rules: Vec<SuspectRule> = rules
        .error_rules
        .iter()
        .cloned()
        .chain(rules.stack_rules.iter().cloned())
        .collect();
    let mod_rules: Vec<_> = rules
        .essential
        .iter()
        .cloned()
        .chain(rules.frequent.iter().cloned())
        .chain(rules.conflicting.iter().cloned())
        .chain(rules.solutions.iter().cloned())
        .collect();

    let completed = std::sync::atomic::AtomicUsize::new(0);
    let output_dir = request.output_dir.clone();
    let move_unsolved = request.move_unsolved;
    let show_formid_values = request.show_formid_values;
    let backup_dir = request.output_dir.join("Backups").join("Unsolved");

    let worker = |path: &PathBuf| -> LogOutcome {
        sink.on_event(ScanProgress::LogStarted { path: path.clone() });
        let outcome = process_one_log(path, &error_rules, &mod_rules, cache, &output_dir, show_formid_values);

        if move_unsolved && outcome.status == LogOutcomeStatus::Success && outcome.suspects.is_empty() {
            if let Err(e) = pfs::move_with_fallback(path, &backup_dir.join(path.file_name().unwrap_or_default())) {
                sink.on_event(ScanProgress::Warning {
                    message: format!("Could not move unsolved log '{}': {e}", path.display()),
                });
            }
        }

        let done = completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        sink.on_event(ScanProgress::LogCompleted {
            path: path.clone(),
            status: outcome.status.clone(),
            completed: done,
            total,
        });
        outcome
    };

    let (raw_results, performance) = scheduler::run(
        request.log_paths.clone(),
        request.preferred_mode,
        request.batch_size,
        cancel,
        worker,
    );

    if cancel.is_cancelled() {
        sink.on_event(ScanProgress::Cancelled);
    }

    let mut result = ScanResult {
        performance,
        ..ScanResult::default()
    };

    for (path, outcome) in request.log_paths.iter().zip(raw_results.into_iter()) {
        let outcome = outcome.unwrap_or_else(|| LogOutcome {
            path: path.clone(),
            status: LogOutcomeStatus::Failed,
            report_path: None,
            game_version: None,
            suspects: Vec::new(),
            mod_findings: Vec::new(),
            messages: vec!["Cancelled before this log was processed".to_string()],
        });

        match outcome.status {
            LogOutcomeStatus::Success => result.successful += 1,
            LogOutcomeStatus::Partial => result.partial += 1,
            LogOutcomeStatus::Failed => {
                result.failed += 1;
                if !request.continue_on_error {
                    result.messages.push(format!("Aborting batch: '{}' failed and continue_on_error is false", path.display()));
                    result.results.push(outcome);
                    break;
                }
            }
        }

        for finding in &outcome.mod_findings {
            if finding.kind == crate::core::model::ModFindingKind::Conflict {
                *result.mod_conflict_histogram.entry(finding.rule_name.clone()).or_insert(0) += 1;
            }
        }
        if let Some(version) = &outcome.game_version {
            *result.game_distribution_histogram.entry(version.clone()).or_insert(0) += 1;
        }
        if let Some(path) = &outcome.report_path {
            result.report_paths.push(path.clone());
        }
        result.results.push(outcome);
    }

    let summary_path = request.output_dir.join("batch_summary.md");
    let summary = report::render_batch_summary(&result);
    if let Err(e) = pfs::write_atomic(&summary_path, summary.as_bytes()) {
        sink.on_event(ScanProgress::Warning { message: format!("Failed to write batch summary: {e}") });
    } else {
        result.report_paths.push(summary_path.clone());
    }

    sink.on_event(ScanProgress::Finished { summary_path: Some(summary_path) });

    Ok(result)
}

fn process_one_log(
    path: &Path,
    error_rules: &[SuspectRule],
    mod_rules: &[crate::core::model::ModRule],
    cache: &AnalysisCache,
    output_dir: &Path,
    show_formid_values: bool,
) -> LogOutcome {
    let raw_bytes = match pfs::read_file_bytes(path) {
        Ok(b) => b,
        Err(e) => {
            return LogOutcome {
                path: path.to_path_buf(),
                status: LogOutcomeStatus::Failed,
                report_path: None,
                game_version: None,
                suspects: Vec::new(),
                mod_findings: Vec::new(),
                messages: vec![format!("Could not read file: {e}")],
            }
        }
    };
    let key = cache_key(&raw_bytes);

    let (log, outputs) = if let Some(hit) = cache.get(&key) {
        hit
    } else {
        let log = match parser::parse(path) {
            Ok(log) => log,
            Err(e) => {
                return LogOutcome {
                    path: path.to_path_buf(),
                    status: LogOutcomeStatus::Failed,
                    report_path: None,
                    game_version: None,
                    suspects: Vec::new(),
                    mod_findings: Vec::new(),
                    messages: vec![e.to_string()],
                }
            }
        };

        let suspects = scanner::scan(&log, error_rules);
        let mod_findings: Vec<ModFinding> = conflicts::detect(&log, mod_rules);
        let plugin_analysis = plugins::analyze(&log);
        let outputs = AnalysisOutputs { suspects, mod_findings, plugin_analysis };
        cache.put(key, log.clone(), outputs.clone());
        (log, outputs)
    };

    let form_id_notes = if show_formid_values { build_form_id_notes(&log) } else { Vec::new() };

    let report_text = report::render_log_report(
        &log,
        &outputs.suspects,
        &outputs.mod_findings,
        &outputs.plugin_analysis,
        &form_id_notes,
    );
    let report_name = format!("{}.md", log.file_name);
    let report_path = output_dir.join(report_name);
    let mut messages = Vec::new();
    if outputs.plugin_analysis.combined_critical {
        messages.push(format!(
            "Plugin Limit Exceeded: {} regular + {} light plugins exceed the 255 total cap",
            outputs.plugin_analysis.regular_count, outputs.plugin_analysis.light_count
        ));
    } else if outputs.plugin_analysis.regular_warning {
        messages.push(format!(
            "Regular plugin count ({}) is approaching the 255 cap",
            outputs.plugin_analysis.regular_count
        ));
    }
    let write_ok = match pfs::write_atomic(&report_path, report_text.as_bytes()) {
        Ok(()) => true,
        Err(e) => {
            messages.push(format!("Failed to write report: {e}"));
            false
        }
    };

    LogOutcome {
        path: path.to_path_buf(),
        status: if write_ok { LogOutcomeStatus::Success } else { LogOutcomeStatus::Partial },
        report_path: write_ok.then_some(report_path),
        game_version: Some(log.game_version.clone()),
        suspects: outputs.suspects,
        mod_findings: outputs.mod_findings,
        messages,
    }
}

/// Resolve every FormID token found in a log's main error and call stack
/// against its plugin list, rendering one human-readable note per token in
/// the order it was first seen.
fn build_form_id_notes(log: &CrashLog) -> Vec<String> {
    plugins::extract_candidate_form_ids(log)
        .into_iter()
        .map(|form_id| {
            let resolution = plugins::resolve_form_id(log, form_id);
            match resolution.plugin_filename {
                Some(filename) => format!("{form_id} — record {:06X} in {filename}", resolution.record_id),
                None => format!("{form_id} — could not be resolved to a loaded plugin"),
            }
        })
        .collect()
}

/// Write a normalized copy of `path` alongside it (`<name>.reformatted.log`):
/// CRLF line endings collapsed to LF and trailing per-line whitespace
/// trimmed. The original file is never modified.
fn reformat_sibling(path: &Path) -> std::io::Result<()> {
    let text = pfs::read_file_lossy(path)?;
    let normalized: String = text
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    let sibling = sibling_reformatted_path(path);
    pfs::write_atomic(&sibling, normalized.as_bytes())
}

fn sibling_reformatted_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let file_name = match ext {
        Some(ext) => format!("{stem}.reformatted.{ext}"),
        None => format!("{stem}.reformatted"),
    };
    path.with_file_name(file_name)
}
