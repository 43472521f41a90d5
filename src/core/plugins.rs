// core/plugins.rs
//
// Plugin / FormID analysis (C5): load-order limit checks, missing-master and
// duplicate detection, and FormID -> owning-plugin resolution.
//
// Grounded on `other_examples/abfb567a_pStyl3-libloadorder__src-enums.rs.rs`
// (`GameId`, light-plugin support, plugin-count-exceeded reporting), adapted
// from that crate's enum-driven design into this repo's `PluginAnalysis`
// struct and `FormIdResolution` value.

use crate::core::model::{CrashLog, FormId, FormIdResolution, PluginAnalysis, PluginEntry, PluginIndex};
use crate::util::constants::{MAX_REGULAR_PLUGINS, REGULAR_PLUGIN_WARNING_THRESHOLD};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Analyze a crash log's plugin list: counts, cap/warning checks, and
/// duplicate filenames. Missing-master detection is deferred -- a crash log
/// alone carries no information about a plugin's declared masters, so that
/// check only runs when an actual game installation's load order is
/// supplied via `analyze_with_load_order`.
pub fn analyze(log: &CrashLog) -> PluginAnalysis {
    analyze_plugins(&log.plugins, &[])
}

/// Like `analyze`, but additionally flags plugins referenced as masters
/// that are absent from `installed_plugins` (a case-insensitive filename
/// set describing what is actually on disk).
pub fn analyze_with_load_order(log: &CrashLog, installed_plugins: &[String]) -> PluginAnalysis {
    analyze_plugins(&log.plugins, installed_plugins)
}

fn analyze_plugins(plugins: &[PluginEntry], installed_plugins: &[String]) -> PluginAnalysis {
    let mut regular_count = 0usize;
    let mut light_count = 0usize;
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();

    for plugin in plugins {
        match plugin.index {
            PluginIndex::Regular(_) => regular_count += 1,
            PluginIndex::Light(_) => light_count += 1,
        }
        let key = plugin.filename.to_lowercase();
        if !seen.insert(key) {
            duplicates.push(plugin.filename.clone());
        }
    }
    duplicates.sort();
    duplicates.dedup();

    let missing_masters = if installed_plugins.is_empty() {
        Vec::new()
    } else {
        let installed: HashSet<String> = installed_plugins.iter().map(|s| s.to_lowercase()).collect();
        let mut missing: Vec<String> = plugins
            .iter()
            .map(|p| p.filename.to_lowercase())
            .filter(|name| !installed.contains(name))
            .collect();
        missing.sort();
        missing.dedup();
        missing
    };

    PluginAnalysis {
        regular_count,
        light_count,
        missing_masters,
        duplicates,
        regular_warning: regular_count > REGULAR_PLUGIN_WARNING_THRESHOLD,
        combined_critical: regular_count + light_count > MAX_REGULAR_PLUGINS,
    }
}

/// Resolve a FormID to the plugin that owns it, by indexing into the
/// crash log's plugin list using the FormID's high byte (or, for light
/// plugins, the light sub-index) as a load-order position.
pub fn resolve_form_id(log: &CrashLog, form_id: FormId) -> FormIdResolution {
    let plugin_filename = if form_id.is_light() {
        let sub_index = form_id.light_sub_index();
        log.plugins
            .iter()
            .find(|p| matches!(p.index, PluginIndex::Light(i) if i == sub_index))
            .map(|p| p.filename.clone())
    } else {
        let high_byte = form_id.high_byte();
        log.plugins
            .iter()
            .find(|p| matches!(p.index, PluginIndex::Regular(i) if i == high_byte))
            .map(|p| p.filename.clone())
    };

    let record_id = if form_id.is_light() {
        form_id.light_record_id() as u32
    } else {
        form_id.regular_record_id()
    };

    FormIdResolution {
        form_id,
        plugin_filename,
        record_id,
    }
}

fn form_id_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:0x)?([0-9A-F]{8})\b").expect("static form-id token regex is valid"))
}

/// Scan a crash log's main error line and call-stack text for 8-hex-digit
/// FormID tokens (an optional `0x` prefix is tolerated), in first-seen
/// order with duplicates removed.
pub fn extract_candidate_form_ids(log: &CrashLog) -> Vec<FormId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let call_stack = log.call_stack_text();
    for text in [log.main_error.as_str(), call_stack.as_str()] {
        for caps in form_id_token_re().captures_iter(text) {
            if let Some(id) = FormId::parse(&caps[1]) {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_text;
    use std::path::PathBuf;

    fn log_with_plugins(plugin_lines: &str) -> CrashLog {
        let text = format!(
            "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0\nPLUGINS:\n{plugin_lines}\n"
        );
        parse_text(&PathBuf::from("x.log"), &text).unwrap()
    }

    #[test]
    fn counts_regular_and_light_plugins_separately() {
        let log = log_with_plugins("\t[00] Fallout4.esm\n\t[FE 001] Light.esl\n\t[FE 002] Light2.esl\n");
        let analysis = analyze(&log);
        assert_eq!(analysis.regular_count, 1);
        assert_eq!(analysis.light_count, 2);
    }

    #[test]
    fn duplicate_filenames_are_flagged_case_insensitively() {
        let log = log_with_plugins("\t[00] Mod.esp\n\t[01] MOD.ESP\n");
        let analysis = analyze(&log);
        assert_eq!(analysis.duplicates.len(), 1);
    }

    #[test]
    fn regular_plugin_count_at_threshold_does_not_warn() {
        let lines: String = (0..REGULAR_PLUGIN_WARNING_THRESHOLD)
            .map(|i| format!("\t[{:02X}] Mod{i}.esp\n", i % 256))
            .collect();
        let log = log_with_plugins(&lines);
        let analysis = analyze(&log);
        assert!(!analysis.regular_warning);
        assert!(!analysis.combined_critical);
    }

    #[test]
    fn regular_plugin_count_above_threshold_warns() {
        let lines: String = (0..REGULAR_PLUGIN_WARNING_THRESHOLD + 1)
            .map(|i| format!("\t[{:02X}] Mod{i}.esp\n", i % 256))
            .collect();
        let log = log_with_plugins(&lines);
        let analysis = analyze(&log);
        assert!(analysis.regular_warning);
        assert!(!analysis.combined_critical);
    }

    #[test]
    fn combined_total_above_255_is_critical_even_when_regular_alone_is_not() {
        let regular_lines: String = (0..200).map(|i| format!("\t[{:02X}] Mod{i}.esp\n", i)).collect();
        let light_lines: String = (0..100).map(|i| format!("\t[FE {:03X}] Light{i}.esl\n", i)).collect();
        let log = log_with_plugins(&format!("{regular_lines}{light_lines}"));
        let analysis = analyze(&log);
        assert_eq!(analysis.regular_count, 200);
        assert_eq!(analysis.light_count, 100);
        assert!(analysis.combined_critical);
    }

    #[test]
    fn missing_masters_only_checked_against_supplied_load_order() {
        let log = log_with_plugins("\t[00] Fallout4.esm\n\t[01] SomeMod.esp\n");
        assert!(analyze(&log).missing_masters.is_empty());

        let installed = vec!["fallout4.esm".to_string()];
        let analysis = analyze_with_load_order(&log, &installed);
        assert_eq!(analysis.missing_masters, vec!["somemod.esp"]);
    }

    #[test]
    fn resolves_regular_form_id_to_owning_plugin() {
        let log = log_with_plugins("\t[01] SomeMod.esp\n");
        let form_id = FormId::parse("01002345").unwrap();
        let resolution = resolve_form_id(&log, form_id);
        assert_eq!(resolution.plugin_filename.as_deref(), Some("SomeMod.esp"));
        assert_eq!(resolution.record_id, 0x002345);
    }

    #[test]
    fn resolves_light_form_id_to_owning_plugin() {
        let log = log_with_plugins("\t[FE 001] LightMod.esl\n");
        let form_id = FormId::parse("FE001234").unwrap();
        let resolution = resolve_form_id(&log, form_id);
        assert_eq!(resolution.plugin_filename.as_deref(), Some("LightMod.esl"));
        assert_eq!(resolution.record_id, 0x234);
    }

    #[test]
    fn unresolvable_form_id_yields_no_plugin_filename() {
        let log = log_with_plugins("\t[01] SomeMod.esp\n");
        let form_id = FormId::parse("FF001234").unwrap();
        let resolution = resolve_form_id(&log, form_id);
        assert_eq!(resolution.plugin_filename, None);
    }

    #[test]
    fn extracts_form_id_tokens_from_main_error_and_call_stack() {
        let text = "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x01002345\nPROBABLE CALL STACK:\n\tsome.dll+FE001234\n";
        let log = parse_text(&PathBuf::from("x.log"), text).unwrap();
        let ids = extract_candidate_form_ids(&log);
        assert_eq!(ids, vec![FormId::parse("01002345").unwrap(), FormId::parse("FE001234").unwrap()]);
    }

    #[test]
    fn duplicate_form_id_tokens_are_deduplicated_in_first_seen_order() {
        let text = "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x01002345\nPROBABLE CALL STACK:\n\tsome.dll+01002345\n";
        let log = parse_text(&PathBuf::from("x.log"), text).unwrap();
        let ids = extract_candidate_form_ids(&log);
        assert_eq!(ids, vec![FormId::parse("01002345").unwrap()]);
    }
}
