// core/report.rs
//
// Markdown report generator (C8): renders one log's analysis outputs into
// the fixed heading order, and a batch summary across many logs.
//
// Grounded on the teacher's `core/export.rs` (`impl Write`-based emission,
// one `write_section` per logical block), generalised from CSV rows to
// Markdown headings and from a `Write` sink to an owned `String` so the
// orchestrator (C10) can route the result through `platform::fs::write_atomic`.

use crate::core::model::{
    CrashLog, DetectedSuspect, ModFinding, ModFindingKind, PluginAnalysis, ScanResult, ValidationResult,
};
use std::fmt::Write as _;

/// Render one log's full analysis as Markdown. Heading order is fixed:
/// Basic Information, Main Error, Identified Mods, Suspects, Mod Conflicts,
/// FormIDs, Recommendations. A section with nothing to show still prints
/// its heading followed by a one-line "nothing found" note, so report
/// structure never depends on what was detected.
pub fn render_log_report(
    log: &CrashLog,
    suspects: &[DetectedSuspect],
    mod_findings: &[ModFinding],
    plugin_analysis: &PluginAnalysis,
    form_id_notes: &[String],
) -> String {
    let mut out = String::new();

    writeln!(out, "# Crash Log Report: {}", log.file_name).unwrap();
    writeln!(out).unwrap();

    writeln!(out, "## Basic Information").unwrap();
    writeln!(out, "- Crash generator version: {}", log.crashgen_version).unwrap();
    writeln!(out, "- Game version: {}", log.game_version).unwrap();
    writeln!(out, "- GPU vendor: {:?}", log.gpu_vendor()).unwrap();
    writeln!(out, "- Regular plugins: {}", plugin_analysis.regular_count).unwrap();
    writeln!(out, "- Light plugins: {}", plugin_analysis.light_count).unwrap();
    if plugin_analysis.combined_critical {
        writeln!(
            out,
            "- **CRITICAL: Plugin Limit Exceeded** — {} regular + {} light plugins exceed the 255 total cap.",
            plugin_analysis.regular_count, plugin_analysis.light_count
        )
        .unwrap();
    } else if plugin_analysis.regular_warning {
        writeln!(
            out,
            "- **Warning:** regular plugin count ({}) is approaching the 255 cap.",
            plugin_analysis.regular_count
        )
        .unwrap();
    }
    writeln!(out).unwrap();

    writeln!(out, "## Main Error").unwrap();
    writeln!(out, "```\n{}\n```", log.main_error).unwrap();
    writeln!(out).unwrap();

    writeln!(out, "## Identified Mods").unwrap();
    if log.plugins.is_empty() {
        writeln!(out, "No plugins were listed in this log.").unwrap();
    } else {
        for plugin in &log.plugins {
            writeln!(out, "- `[{}]` {}", plugin.index, plugin.filename).unwrap();
        }
    }
    if !plugin_analysis.duplicates.is_empty() {
        writeln!(out, "\n**Duplicate entries:** {}", plugin_analysis.duplicates.join(", ")).unwrap();
    }
    if !plugin_analysis.missing_masters.is_empty() {
        writeln!(out, "\n**Missing masters:** {}", plugin_analysis.missing_masters.join(", ")).unwrap();
    }
    writeln!(out).unwrap();

    writeln!(out, "## Suspects").unwrap();
    if suspects.is_empty() {
        writeln!(out, "No known suspect patterns matched.").unwrap();
    } else {
        for suspect in suspects {
            writeln!(
                out,
                "- **{}** (severity {}, confidence {:.0}%): matched {}",
                suspect.name,
                suspect.severity,
                suspect.confidence * 100.0,
                suspect.matched_signals.join(", ")
            )
            .unwrap();
        }
    }
    writeln!(out).unwrap();

    writeln!(out, "## Mod Conflicts").unwrap();
    let conflicts: Vec<_> = mod_findings.iter().filter(|f| f.kind == ModFindingKind::Conflict).collect();
    if conflicts.is_empty() {
        writeln!(out, "No conflicting mod pairs detected.").unwrap();
    } else {
        for finding in conflicts {
            writeln!(out, "- **{}**: {}", finding.rule_name, finding.description).unwrap();
        }
    }
    writeln!(out).unwrap();

    writeln!(out, "## FormIDs").unwrap();
    if form_id_notes.is_empty() {
        writeln!(out, "No FormIDs were extracted for resolution.").unwrap();
    } else {
        for note in form_id_notes {
            writeln!(out, "- {note}").unwrap();
        }
    }
    writeln!(out).unwrap();

    writeln!(out, "## Recommendations").unwrap();
    let recommendations: Vec<_> = mod_findings
        .iter()
        .filter(|f| matches!(f.kind, ModFindingKind::Recommendation | ModFindingKind::Warning | ModFindingKind::Info))
        .collect();
    if recommendations.is_empty() {
        writeln!(out, "No additional recommendations.").unwrap();
    } else {
        for finding in recommendations {
            write!(out, "- {}", finding.description).unwrap();
            if let Some(solution) = &finding.solution {
                write!(out, " — {solution}").unwrap();
            }
            writeln!(out).unwrap();
        }
    }

    out
}

/// Render a batch summary covering every processed log: totals, the most
/// frequent mod conflicts (top-10, ties broken alphabetically), and game
/// version distribution.
pub fn render_batch_summary(result: &ScanResult) -> String {
    let mut out = String::new();

    writeln!(out, "# Batch Scan Summary").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "- Total logs: {}", result.results.len()).unwrap();
    writeln!(out, "- Successful: {}", result.successful).unwrap();
    writeln!(out, "- Partial: {}", result.partial).unwrap();
    writeln!(out, "- Failed: {}", result.failed).unwrap();
    writeln!(out).unwrap();

    writeln!(out, "## Top Mod Conflicts").unwrap();
    let mut conflicts: Vec<(&String, &usize)> = result.mod_conflict_histogram.iter().collect();
    conflicts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    if conflicts.is_empty() {
        writeln!(out, "No mod conflicts were detected across this batch.").unwrap();
    } else {
        for (name, count) in conflicts.into_iter().take(10) {
            writeln!(out, "- {name}: {count} occurrence(s)").unwrap();
        }
    }
    writeln!(out).unwrap();

    writeln!(out, "## Game Version Distribution").unwrap();
    let mut versions: Vec<(&String, &usize)> = result.game_distribution_histogram.iter().collect();
    versions.sort_by(|a, b| a.0.cmp(b.0));
    if versions.is_empty() {
        writeln!(out, "No game-version data available.").unwrap();
    } else {
        for (version, count) in versions {
            writeln!(out, "- {version}: {count} log(s)").unwrap();
        }
    }
    writeln!(out).unwrap();

    writeln!(out, "## Recommendations").unwrap();
    let recommendations = batch_recommendations(result);
    if recommendations.is_empty() {
        writeln!(out, "No threshold-triggered recommendations for this batch.").unwrap();
    } else {
        for line in recommendations {
            writeln!(out, "- {line}").unwrap();
        }
    }

    out
}

/// Threshold-derived recommendations for a batch: a high failure rate, a
/// large number of total mod conflicts, and a long scan runtime each earn
/// their own line when crossed.
fn batch_recommendations(result: &ScanResult) -> Vec<String> {
    const FAILURE_RATE_THRESHOLD: f64 = 0.20;
    const CONFLICT_COUNT_THRESHOLD: usize = 10;
    const RUNTIME_THRESHOLD: std::time::Duration = std::time::Duration::from_secs(600);

    let mut lines = Vec::new();
    let total = result.results.len();

    if total > 0 {
        let failure_rate = result.failed as f64 / total as f64;
        if failure_rate > FAILURE_RATE_THRESHOLD {
            lines.push(format!(
                "Failure rate is {:.0}%, above the {:.0}% threshold — check for corrupted or unsupported log files.",
                failure_rate * 100.0,
                FAILURE_RATE_THRESHOLD * 100.0
            ));
        }
    }

    let total_conflicts: usize = result.mod_conflict_histogram.values().sum();
    if total_conflicts >= CONFLICT_COUNT_THRESHOLD {
        lines.push(format!(
            "{total_conflicts} mod conflicts detected across this batch — consider reviewing the load order before further scanning."
        ));
    }

    if result.performance.total_duration >= RUNTIME_THRESHOLD {
        lines.push(format!(
            "Batch runtime was {:.1} minutes — consider a narrower batch size or a faster scheduling mode.",
            result.performance.total_duration.as_secs_f64() / 60.0
        ));
    }

    lines
}

/// Render one validator result as a single Markdown list item, used when
/// assembling the `validate-files` subcommand's output.
pub fn render_validation_line(path_display: &str, result: &ValidationResult) -> String {
    let mut line = format!("- `{path_display}` [{:?}] {}", result.status, result.description);
    if let Some(issue) = &result.issue {
        let _ = write!(line, " ({issue})");
    }
    if let Some(recommendation) = &result.recommendation {
        let _ = write!(line, " — {recommendation}");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::LogOutcome;
    use crate::core::parser::parse_text;
    use std::path::PathBuf;

    #[test]
    fn report_contains_every_heading_in_fixed_order() {
        let text = "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0\n";
        let log = parse_text(&PathBuf::from("x.log"), text).unwrap();
        let analysis = PluginAnalysis::default();
        let report = render_log_report(&log, &[], &[], &analysis, &[]);

        let headings = ["Basic Information", "Main Error", "Identified Mods", "Suspects", "Mod Conflicts", "FormIDs", "Recommendations"];
        let mut last_pos = 0;
        for heading in headings {
            let pos = report.find(heading).unwrap_or_else(|| panic!("missing heading: {heading}"));
            assert!(pos >= last_pos, "heading {heading} out of order");
            last_pos = pos;
        }
    }

    #[test]
    fn plugin_limit_critical_is_surfaced_in_the_report() {
        let text = "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0\n";
        let log = parse_text(&PathBuf::from("x.log"), text).unwrap();
        let mut analysis = PluginAnalysis::default();
        analysis.regular_count = 200;
        analysis.light_count = 100;
        analysis.combined_critical = true;
        let report = render_log_report(&log, &[], &[], &analysis, &[]);
        assert!(report.contains("Plugin Limit Exceeded"));
    }

    #[test]
    fn empty_sections_still_render_a_note() {
        let text = "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0\n";
        let log = parse_text(&PathBuf::from("x.log"), text).unwrap();
        let analysis = PluginAnalysis::default();
        let report = render_log_report(&log, &[], &[], &analysis, &[]);
        assert!(report.contains("No known suspect patterns matched."));
        assert!(report.contains("No conflicting mod pairs detected."));
    }

    #[test]
    fn batch_summary_sorts_conflicts_by_count_desc_then_name() {
        let mut result = ScanResult::default();
        result.mod_conflict_histogram.insert("b conflict".to_string(), 3);
        result.mod_conflict_histogram.insert("a conflict".to_string(), 3);
        result.mod_conflict_histogram.insert("z conflict".to_string(), 5);
        let summary = render_batch_summary(&result);
        let a_pos = summary.find("a conflict").unwrap();
        let b_pos = summary.find("b conflict").unwrap();
        let z_pos = summary.find("z conflict").unwrap();
        assert!(z_pos < a_pos);
        assert!(a_pos < b_pos);
    }

    #[test]
    fn high_failure_rate_triggers_a_recommendation() {
        let mut result = ScanResult::default();
        result.results.push(LogOutcome {
            path: PathBuf::from("a.log"),
            status: crate::core::model::LogOutcomeStatus::Failed,
            report_path: None,
            game_version: None,
            suspects: Vec::new(),
            mod_findings: Vec::new(),
            messages: Vec::new(),
        });
        result.failed = 1;
        let summary = render_batch_summary(&result);
        assert!(summary.contains("Failure rate is 100%"));
    }

    #[test]
    fn low_failure_rate_has_no_recommendations() {
        let mut result = ScanResult::default();
        result.results.push(LogOutcome {
            path: PathBuf::from("a.log"),
            status: crate::core::model::LogOutcomeStatus::Success,
            report_path: None,
            game_version: None,
            suspects: Vec::new(),
            mod_findings: Vec::new(),
            messages: Vec::new(),
        });
        result.successful = 1;
        let summary = render_batch_summary(&result);
        assert!(summary.contains("No threshold-triggered recommendations for this batch."));
    }

    #[test]
    fn many_conflicts_trigger_a_recommendation() {
        let mut result = ScanResult::default();
        for i in 0..10 {
            result.mod_conflict_histogram.insert(format!("conflict {i}"), 1);
        }
        let summary = render_batch_summary(&result);
        assert!(summary.contains("mod conflicts detected across this batch"));
    }
}
