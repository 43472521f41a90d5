// core/conflicts.rs
//
// Mod-conflict detector (C4): evaluates ModRule entries against a CrashLog's
// plugin list, producing ModFinding records for missing-essential,
// frequent-crasher, conflicting-pair, and known-solution rules.
//
// Grounded on the teacher's filter-predicate composition in `core/filter.rs`
// (each rule kind below plays the role one predicate used to play) plus the
// pass-based structure of AutoQAC-rs's `CleaningService` (`other_examples`):
// one independent pass per rule kind, run in a fixed order, results merged.

use crate::core::model::{CrashLog, GpuConstraint, GpuVendor, ModFinding, ModFindingKind, ModRule, ModRuleKind};

/// Evaluate every rule in `rules` against `log`. Rules are processed in the
/// order given; findings are returned sorted alphabetically by rule name so
/// report output is deterministic regardless of rule-store iteration order.
pub fn detect(log: &CrashLog, rules: &[ModRule]) -> Vec<ModFinding> {
    let plugin_names: Vec<String> = log.plugins.iter().map(|p| p.filename.to_lowercase()).collect();
    let vendor = log.gpu_vendor();

    let mut findings: Vec<ModFinding> = rules
        .iter()
        .filter(|rule| gpu_gate_allows(rule.gpu_constraint, vendor))
        .filter_map(|rule| evaluate_rule(rule, &plugin_names))
        .collect();

    findings.sort_by(|a, b| a.rule_name.cmp(&b.rule_name));
    findings
}

/// A GPU-gated rule is skipped unless the detected vendor actually matches
/// the constraint. An `Unknown` vendor never satisfies a constraint -- it is
/// evaluated as absent evidence, not as a wildcard match.
fn gpu_gate_allows(constraint: Option<GpuConstraint>, vendor: GpuVendor) -> bool {
    match constraint {
        None => true,
        Some(GpuConstraint::Nvidia) => vendor == GpuVendor::Nvidia,
        Some(GpuConstraint::Amd) => vendor == GpuVendor::Amd,
    }
}

fn evaluate_rule(rule: &ModRule, plugin_names: &[String]) -> Option<ModFinding> {
    match &rule.kind {
        ModRuleKind::Essential { identifiers } => {
            let matched = matched_plugins(identifiers, plugin_names);
            if matched.is_empty() {
                Some(ModFinding {
                    kind: ModFindingKind::Recommendation,
                    rule_name: rule.name.clone(),
                    description: rule.description.clone(),
                    solution: rule.solution.clone(),
                    matched_plugins: Vec::new(),
                })
            } else {
                None
            }
        }
        ModRuleKind::FrequentCrasher { identifiers } => {
            let matched = matched_plugins(identifiers, plugin_names);
            (!matched.is_empty()).then(|| ModFinding {
                kind: ModFindingKind::Warning,
                rule_name: rule.name.clone(),
                description: rule.description.clone(),
                solution: rule.solution.clone(),
                matched_plugins: matched,
            })
        }
        ModRuleKind::KnownSolution { identifiers } => {
            let matched = matched_plugins(identifiers, plugin_names);
            (!matched.is_empty()).then(|| ModFinding {
                kind: ModFindingKind::Info,
                rule_name: rule.name.clone(),
                description: rule.description.clone(),
                solution: rule.solution.clone(),
                matched_plugins: matched,
            })
        }
        ModRuleKind::ConflictingPair { set_a, set_b } => {
            let matched_a = matched_plugins(set_a, plugin_names);
            let matched_b = matched_plugins(set_b, plugin_names);
            if matched_a.is_empty() || matched_b.is_empty() {
                return None;
            }
            let mut matched_plugins = matched_a;
            matched_plugins.extend(matched_b);
            matched_plugins.sort();
            matched_plugins.dedup();
            Some(ModFinding {
                kind: ModFindingKind::Conflict,
                rule_name: rule.name.clone(),
                description: rule.description.clone(),
                solution: rule.solution.clone(),
                matched_plugins,
            })
        }
    }
}

/// Case-insensitive, whitespace-insensitive containment match of each
/// identifier against the plugin filenames. An identifier prefixed with `!`
/// is a negated condition: it matches when the plugin list does *not*
/// contain it, but contributes nothing to `matched_plugins` since there is
/// no concrete plugin to report.
fn matched_plugins(identifiers: &[String], plugin_names: &[String]) -> Vec<String> {
    let mut matched = Vec::new();
    for identifier in identifiers {
        let (negate, needle) = match identifier.strip_prefix('!') {
            Some(rest) => (true, normalize(rest)),
            None => (false, normalize(identifier)),
        };
        let hit = plugin_names.iter().find(|name| normalize(name).contains(&needle));
        match (negate, hit) {
            (false, Some(name)) => matched.push(name.clone()),
            (true, None) => {}
            _ => return Vec::new(),
        }
    }
    matched.sort();
    matched.dedup();
    matched
}

fn normalize(s: &str) -> String {
    s.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect()
}
