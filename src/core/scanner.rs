// core/scanner.rs
//
// Suspect scanner (C3): evaluates the compiled SuspectRule set against one
// CrashLog, producing confidence-scored DetectedSuspect records.
//
// Generalised from the teacher's composable-predicate filter engine: each
// rule here plays the role one filter predicate used to play, but instead of
// a boolean match it produces a confidence score in [0, 1].

use crate::core::model::{CrashLog, DetectedSuspect, Signal, SuspectRule};
use crate::util::constants::MAX_BARE_SIGNAL_HITS;

/// Evaluate every rule against `log`, returning the suspects whose
/// confidence is greater than zero, sorted by severity (desc), then
/// confidence (desc), then name (asc) for stable report ordering.
pub fn scan(log: &CrashLog, rules: &[SuspectRule]) -> Vec<DetectedSuspect> {
    let mut suspects: Vec<DetectedSuspect> = rules
        .iter()
        .filter_map(|rule| evaluate_rule(log, rule))
        .collect();

    suspects.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.name.cmp(&b.name))
    });
    suspects
}

fn evaluate_rule(log: &CrashLog, rule: &SuspectRule) -> Option<DetectedSuspect> {
    match rule {
        SuspectRule::ErrorSignal { severity, name, substring } => {
            if log.main_error.to_lowercase().contains(&substring.to_lowercase()) {
                Some(DetectedSuspect {
                    name: name.clone(),
                    severity: *severity,
                    confidence: 1.0,
                    matched_signals: vec![substring.clone()],
                    recommended_solutions: Vec::new(),
                    documentation_url: None,
                })
            } else {
                None
            }
        }
        SuspectRule::StackSignal { severity, name, signals } => {
            evaluate_stack_signals(log, *severity, name, signals)
        }
    }
}

/// A `StackSignal` rule first requires every `Required` signal to be present
/// in `main_error` -- absent any one of them, the rule does not match at all.
/// Past that gate, each non-required signal (`Optional`/`Bare`) contributes
/// at most 1.0 to a satisfied-signal total regardless of how many times a
/// bare substring repeats in the stack (capped at `MAX_BARE_SIGNAL_HITS`
/// occurrences before being considered "present"), and the rule matches only
/// if that total reaches at least half of the non-required signal count
/// (or 1, whichever is larger). Confidence is the satisfied total over the
/// non-required signal count, clamped to [0, 1]; required signals do not
/// enter the confidence denominator since their presence is a gate, not a
/// graded contribution.
fn evaluate_stack_signals(
    log: &CrashLog,
    severity: u8,
    name: &str,
    signals: &[Signal],
) -> Option<DetectedSuspect> {
    let call_stack = log.call_stack_text();
    let mut matched = Vec::new();
    let mut satisfied_total = 0.0f64;
    let non_required_count = signals
        .iter()
        .filter(|s| !matches!(s, Signal::Required(_)))
        .count();

    for signal in signals {
        match signal {
            Signal::Required(s) => {
                if !log.main_error.contains(s.as_str()) {
                    return None;
                }
                matched.push(s.clone());
            }
            Signal::Optional(s) => {
                if log.main_error.contains(s.as_str()) {
                    matched.push(s.clone());
                    satisfied_total += 1.0;
                }
            }
            Signal::Bare(s) => {
                let hits = call_stack.matches(s.as_str()).count() as u32;
                if hits.min(MAX_BARE_SIGNAL_HITS) > 0 {
                    matched.push(s.clone());
                    satisfied_total += 1.0;
                }
            }
        }
    }

    if non_required_count == 0 {
        // An all-required rule matches on the gate alone; confidence is full
        // since every demanded signal was confirmed present.
        return Some(DetectedSuspect {
            name: name.to_string(),
            severity,
            confidence: 1.0,
            matched_signals: matched,
            recommended_solutions: Vec::new(),
            documentation_url: None,
        });
    }

    let threshold = (non_required_count as f64 / 2.0).max(1.0);
    if satisfied_total < threshold {
        return None;
    }

    let confidence = (satisfied_total / non_required_count as f64).clamp(0.0, 1.0);

    Some(DetectedSuspect {
        name: name.to_string(),
        severity,
        confidence,
        matched_signals: matched,
        recommended_solutions: Vec::new(),
        documentation_url: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_text;
    use std::path::PathBuf;

    fn log_with(main_error: &str, call_stack_body: &str) -> CrashLog {
        let text = format!(
            "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\n{main_error}\nPROBABLE CALL STACK:\n{call_stack_body}\n"
        );
        parse_text(&PathBuf::from("x.log"), &text).unwrap()
    }

    #[test]
    fn error_signal_matches_substring_with_full_confidence() {
        let log = log_with("Unhandled exception \"EXCEPTION_STACK_OVERFLOW\" at 0x0", "");
        let rule = SuspectRule::ErrorSignal {
            severity: 5,
            name: "Stack Overflow".to_string(),
            substring: "EXCEPTION_STACK_OVERFLOW".to_string(),
        };
        let suspects = scan(&log, &[rule]);
        assert_eq!(suspects.len(), 1);
        assert_eq!(suspects[0].confidence, 1.0);
    }

    #[test]
    fn error_signal_does_not_match_absent_substring() {
        let log = log_with("Unhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0", "");
        let rule = SuspectRule::ErrorSignal {
            severity: 5,
            name: "Stack Overflow".to_string(),
            substring: "EXCEPTION_STACK_OVERFLOW".to_string(),
        };
        assert!(scan(&log, &[rule]).is_empty());
    }

    #[test]
    fn required_signal_absent_blocks_the_whole_rule() {
        let log = log_with("Unhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0", "\tnvwgf2umx.dll+12345\n");
        let rule = SuspectRule::StackSignal {
            severity: 5,
            name: "Archive Invalidation Failure".to_string(),
            signals: vec![
                Signal::Required("EXCEPTION_HEAP_CORRUPTION".to_string()),
                Signal::Bare("nvwgf2umx".to_string()),
            ],
        };
        assert!(scan(&log, &[rule]).is_empty());
    }

    #[test]
    fn bare_signal_hits_are_capped_before_contributing() {
        let body = "\tnvwgf2umx.dll+1\n\tnvwgf2umx.dll+2\n\tnvwgf2umx.dll+3\n\tnvwgf2umx.dll+4\n\tnvwgf2umx.dll+5\n";
        let log = log_with("Unhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0", body);
        let rule = SuspectRule::StackSignal {
            severity: 4,
            name: "GPU Driver Crash".to_string(),
            signals: vec![Signal::Bare("nvwgf2umx".to_string())],
        };
        let suspects = scan(&log, &[rule]);
        assert_eq!(suspects.len(), 1);
        // 5 occurrences capped at MAX_BARE_SIGNAL_HITS (3) -> full single-signal contribution.
        assert_eq!(suspects[0].confidence, 1.0);
    }

    #[test]
    fn optional_signal_increases_confidence_but_is_not_required() {
        let log = log_with("Unhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0", "\tatidxx64.dll+1\n");
        let rule = SuspectRule::StackSignal {
            severity: 4,
            name: "GPU Driver Crash".to_string(),
            signals: vec![
                Signal::Optional("EXCEPTION_ACCESS_VIOLATION".to_string()),
                Signal::Bare("atidxx64".to_string()),
            ],
        };
        let suspects = scan(&log, &[rule]);
        assert_eq!(suspects.len(), 1);
        assert!(suspects[0].confidence > 0.5);
    }

    #[test]
    fn results_are_sorted_by_severity_desc_then_confidence_desc_then_name() {
        let log = log_with("EXCEPTION_ACCESS_VIOLATION and EXCEPTION_STACK_OVERFLOW both present", "");
        let rules = vec![
            SuspectRule::ErrorSignal {
                severity: 3,
                name: "Z Low Severity".to_string(),
                substring: "EXCEPTION_ACCESS_VIOLATION".to_string(),
            },
            SuspectRule::ErrorSignal {
                severity: 5,
                name: "A High Severity".to_string(),
                substring: "EXCEPTION_STACK_OVERFLOW".to_string(),
            },
        ];
        let suspects = scan(&log, &rules);
        assert_eq!(suspects[0].name, "A High Severity");
        assert_eq!(suspects[1].name, "Z Low Severity");
    }
}
