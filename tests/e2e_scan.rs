// End-to-end tests for the orchestrator (C10), exercising the real
// filesystem, the built-in rule database, and the real scheduler -- no
// mocks, no stubs. These mirror the concrete scenarios in spec.md §8.

use ccscan::app::cache::AnalysisCache;
use ccscan::app::orchestrator::run_scan;
use ccscan::app::scheduler::CancelToken;
use ccscan::core::model::{
    LogOutcomeStatus, ModFindingKind, NullSink, ScanRequest, SchedulingMode,
};
use ccscan::core::rule_store::{RuleDatabase, RuleStore};
use ccscan::core::validators;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn write_log(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn default_request(dir: &Path, log_paths: Vec<PathBuf>) -> ScanRequest {
    ScanRequest {
        log_paths,
        output_dir: dir.join("out"),
        mods_path: None,
        fcx_mode: false,
        simplify: false,
        show_formid_values: false,
        move_unsolved: false,
        reformat: false,
        preferred_mode: Some(SchedulingMode::Sequential),
        batch_size: 10,
        max_concurrent: 1,
        continue_on_error: true,
    }
}

fn rules() -> RuleDatabase {
    let store = RuleStore::load(Path::new("/nonexistent-ccscan-rules-dir")).expect("built-in rules always load");
    RuleDatabase::compile(&store)
}

/// Scenario 1: a stack-overflow crash with no plugins should identify
/// exactly one suspect, severity 5, confidence 1.0, no mod conflicts.
#[test]
fn stack_overflow_crash_identifies_exactly_one_suspect() {
    let dir = TempDir::new().unwrap();
    let log_path = write_log(
        dir.path(),
        "crash-2026-01-01.log",
        "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_STACK_OVERFLOW\" at 0x0\n",
    );

    let request = default_request(dir.path(), vec![log_path]);
    let db = rules();
    let cache = AnalysisCache::new(Duration::from_secs(600));
    let result = run_scan(&request, &db, &cache, &NullSink, &CancelToken::new()).unwrap();

    assert_eq!(result.successful, 1);
    let outcome = &result.results[0];
    assert_eq!(outcome.status, LogOutcomeStatus::Success);
    assert_eq!(outcome.suspects.len(), 1);
    assert_eq!(outcome.suspects[0].name, "Stack Overflow Crash");
    assert_eq!(outcome.suspects[0].severity, 5);
    assert_eq!(outcome.suspects[0].confidence, 1.0);
    assert!(outcome.mod_findings.iter().all(|f| f.kind != ModFindingKind::Conflict));
}

/// Scenario 2: 260 regular plugin entries exceed the 255 cap and must be
/// reported critical; an access-violation error with no matching pattern
/// produces no suspects.
#[test]
fn plugin_limit_violation_is_critical_with_no_suspects() {
    let dir = TempDir::new().unwrap();
    let mut plugins = String::new();
    for i in 0..=255u16 {
        plugins.push_str(&format!("\t[{:02X}] a{i}.esp\n", i.min(0xFF)));
    }
    let log_path = write_log(
        dir.path(),
        "crash-limit.log",
        &format!(
            "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0\nPLUGINS:\n{plugins}\n"
        ),
    );

    let log = ccscan::core::parser::parse(&log_path).unwrap();
    let analysis = ccscan::core::plugins::analyze(&log);
    assert_eq!(analysis.regular_count, 256);
    assert!(analysis.combined_critical);

    let request = default_request(dir.path(), vec![log_path]);
    let db = rules();
    let cache = AnalysisCache::new(Duration::from_secs(600));
    let result = run_scan(&request, &db, &cache, &NullSink, &CancelToken::new()).unwrap();
    assert_eq!(result.successful, 1);
    assert!(result.results[0].suspects.is_empty());
}

/// Scenario 3: two mods known to conflict, both present, must be reported
/// as a single Conflict finding.
#[test]
fn conflicting_mod_pair_is_reported() {
    let dir = TempDir::new().unwrap();
    let log_path = write_log(
        dir.path(),
        "crash-conflict.log",
        "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0\nPLUGINS:\n\t[00] betterpowerarmor.esp\n\t[01] knockoutframework.esp\n",
    );

    let request = default_request(dir.path(), vec![log_path]);
    let db = rules();
    let cache = AnalysisCache::new(Duration::from_secs(600));
    let result = run_scan(&request, &db, &cache, &NullSink, &CancelToken::new()).unwrap();

    let conflicts: Vec<_> = result.results[0]
        .mod_findings
        .iter()
        .filter(|f| f.kind == ModFindingKind::Conflict)
        .collect();
    assert_eq!(conflicts.len(), 1);
    assert!(result.mod_conflict_histogram.values().any(|&n| n == 1));
}

/// Scenario 4: GPU-gated rule fires with a matching NVIDIA vendor and is
/// silent for AMD.
#[test]
fn gpu_gated_suspect_and_finding_respect_detected_vendor() {
    let dir = TempDir::new().unwrap();

    let nvidia_log = write_log(
        dir.path(),
        "crash-nvidia.log",
        "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0\nPROBABLE CALL STACK:\n\tnvwgf2umx.dll+1234\nPLUGINS:\n\t[00] Fallout4.esm\nSYSTEM SPECS:\n\tGPU: NVIDIA GeForce RTX 3080\n",
    );
    let amd_log = write_log(
        dir.path(),
        "crash-amd.log",
        "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0\nPROBABLE CALL STACK:\n\tnvwgf2umx.dll+1234\nPLUGINS:\n\t[00] Fallout4.esm\nSYSTEM SPECS:\n\tGPU: AMD Radeon RX 6800\n",
    );

    let db = rules();
    let cache = AnalysisCache::new(Duration::from_secs(600));

    let nvidia_request = default_request(dir.path(), vec![nvidia_log]);
    let nvidia_result = run_scan(&nvidia_request, &db, &cache, &NullSink, &CancelToken::new()).unwrap();
    let nvidia_outcome = &nvidia_result.results[0];
    assert!(nvidia_outcome.suspects.iter().any(|s| s.name == "GPU Driver Crash"));
    assert!(nvidia_outcome
        .mod_findings
        .iter()
        .any(|f| f.rule_name.to_lowercase().contains("weapondebriscrashfix")));

    let amd_request = default_request(dir.path(), vec![amd_log]);
    let amd_result = run_scan(&amd_request, &db, &cache, &NullSink, &CancelToken::new()).unwrap();
    let amd_outcome = &amd_result.results[0];
    assert!(!amd_outcome
        .mod_findings
        .iter()
        .any(|f| f.rule_name.to_lowercase().contains("weapondebriscrashfix")));
}

/// Scenario 5: DDS header validation, power-of-two and non-power-of-two.
#[test]
fn dds_validation_distinguishes_valid_from_warning() {
    let dir = TempDir::new().unwrap();

    let make_dds = |width: u32, height: u32| -> Vec<u8> {
        let mut bytes = vec![0u8; 128];
        bytes[0..4].copy_from_slice(b"DDS ");
        bytes[12..16].copy_from_slice(&width.to_le_bytes());
        bytes[16..20].copy_from_slice(&height.to_le_bytes());
        bytes
    };

    let valid_path = dir.path().join("texture_pot.dds");
    std::fs::write(&valid_path, make_dds(1024, 1024)).unwrap();
    let valid = validators::validate(&valid_path).unwrap().unwrap();
    assert_eq!(valid.format, "DDS");
    assert_eq!(valid.status, ccscan::core::model::ValidationStatus::Valid);
    assert!(valid.properties.iter().any(|(k, v)| k == "width" && v == "1024"));
    assert!(valid.properties.iter().any(|(k, v)| k == "height" && v == "1024"));

    let warn_path = dir.path().join("texture_npot.dds");
    std::fs::write(&warn_path, make_dds(1000, 1024)).unwrap();
    let warning = validators::validate(&warn_path).unwrap().unwrap();
    assert_eq!(warning.status, ccscan::core::model::ValidationStatus::Warning);
}

/// Scenario 6: a BA2 file with a bad signature is rejected as an Error.
#[test]
fn ba2_rejects_invalid_signature() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.ba2");
    std::fs::write(&path, b"BSA\0restofheaderbytes").unwrap();
    let result = validators::validate(&path).unwrap().unwrap();
    assert_eq!(result.status, ccscan::core::model::ValidationStatus::Error);
    assert_eq!(result.description, "Invalid BA2 file: Invalid signature");
}

/// Idempotence: running the pipeline twice on the same input yields equal
/// outcome counts and identical suspect/finding content (timestamps aside).
#[test]
fn running_the_pipeline_twice_yields_equal_results() {
    let dir = TempDir::new().unwrap();
    let log_path = write_log(
        dir.path(),
        "crash-idempotent.log",
        "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_STACK_OVERFLOW\" at 0x0\n",
    );

    let db = rules();
    let cache = AnalysisCache::new(Duration::from_secs(600));

    let request_a = default_request(dir.path(), vec![log_path.clone()]);
    let result_a = run_scan(&request_a, &db, &cache, &NullSink, &CancelToken::new()).unwrap();

    let request_b = default_request(dir.path(), vec![log_path]);
    let result_b = run_scan(&request_b, &db, &cache, &NullSink, &CancelToken::new()).unwrap();

    assert_eq!(result_a.successful, result_b.successful);
    assert_eq!(result_a.results[0].suspects, result_b.results[0].suspects);
    assert_eq!(result_a.results[0].mod_findings, result_b.results[0].mod_findings);
}

/// `continue_on_error` lets a batch finish past one unreadable/malformed
/// log instead of aborting on the first failure.
#[test]
fn continue_on_error_processes_remaining_logs_after_a_failure() {
    let dir = TempDir::new().unwrap();
    let bad_log = write_log(dir.path(), "truncated.log", "only one line\n");
    let good_log = write_log(
        dir.path(),
        "good.log",
        "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_STACK_OVERFLOW\" at 0x0\n",
    );

    let mut request = default_request(dir.path(), vec![bad_log, good_log]);
    request.continue_on_error = true;
    let db = rules();
    let cache = AnalysisCache::new(Duration::from_secs(600));
    let result = run_scan(&request, &db, &cache, &NullSink, &CancelToken::new()).unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(result.successful, 1);
    assert_eq!(result.results.len(), 2);
}
