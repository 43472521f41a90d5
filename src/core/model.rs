// core/model.rs
//
// Core data model types. Pure data definitions with no I/O, no platform
// dependencies (Core depends on std only). These types are the shared
// vocabulary across all layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// =============================================================================
// Segments
// =============================================================================

/// The closed set of recognized crash-log segment headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentKind {
    CallStack,
    Modules,
    F4sePlugins,
    Plugins,
    SystemSpecs,
}

impl SegmentKind {
    /// All recognized segment headers, in the order they are expected to
    /// appear in a well-formed log. Used both for header matching and for
    /// rendering reports in a stable order.
    pub fn all() -> &'static [SegmentKind] {
        &[
            SegmentKind::CallStack,
            SegmentKind::Modules,
            SegmentKind::F4sePlugins,
            SegmentKind::Plugins,
            SegmentKind::SystemSpecs,
        ]
    }

    /// Returns the segment this header line introduces, if any.
    /// Matching is exact against the uppercase header text preceding `:`.
    pub fn from_header(line: &str) -> Option<Self> {
        let trimmed = line.trim().trim_end_matches(':').trim();
        match trimmed {
            "PROBABLE CALL STACK" => Some(Self::CallStack),
            "MODULES" => Some(Self::Modules),
            "F4SE PLUGINS" => Some(Self::F4sePlugins),
            "PLUGINS" => Some(Self::Plugins),
            "SYSTEM SPECS" => Some(Self::SystemSpecs),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::CallStack => "PROBABLE CALL STACK",
            Self::Modules => "MODULES",
            Self::F4sePlugins => "F4SE PLUGINS",
            Self::Plugins => "PLUGINS",
            Self::SystemSpecs => "SYSTEM SPECS",
        }
    }
}

/// A segment's location within `CrashLog::raw_lines`, as a half-open line
/// range. Storing ranges (rather than copying text) is what lets the parser
/// invariant hold for free: concatenating `raw_lines[range]` for every
/// segment in file order reconstructs the segment region byte-for-byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

// =============================================================================
// Plugins
// =============================================================================

/// A plugin's load-order position, distinguishing the regular 0x00-0xFF
/// index space from the light-plugin (ESL) `FE xxx` sentinel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginIndex {
    /// Regular plugin, index 0x00-0xFF. Counts toward the 255 regular cap.
    Regular(u8),
    /// Light plugin, sub-index 0x000-0xFFF. Counts toward the 4096 light cap.
    Light(u16),
}

impl std::fmt::Display for PluginIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regular(i) => write!(f, "{i:02X}"),
            Self::Light(i) => write!(f, "FE {i:03X}"),
        }
    }
}

/// Status assigned to a plugin entry after cross-referencing it against the
/// rest of the load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    Regular,
    Light,
    MissingMaster,
    Disabled,
}

/// One line of the `PLUGINS:` segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEntry {
    pub index: PluginIndex,
    pub filename: String,
    pub status: PluginStatus,
}

// =============================================================================
// FormID
// =============================================================================

/// An 8-hex-digit form identifier. The high byte names the owning plugin's
/// load index (or `FE` for light plugins, in which case the next 12 bits
/// select the sub-plugin and the low 12 bits are the in-plugin record ID;
/// for regular plugins the low 24 bits are the record ID directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormId(pub u32);

impl FormId {
    pub fn high_byte(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn is_light(&self) -> bool {
        self.high_byte() == 0xFE
    }

    /// For a light FormID, the 12-bit sub-plugin index.
    pub fn light_sub_index(&self) -> u16 {
        ((self.0 >> 12) & 0xFFF) as u16
    }

    /// For a light FormID, the 12-bit in-plugin record ID.
    pub fn light_record_id(&self) -> u16 {
        (self.0 & 0xFFF) as u16
    }

    /// For a regular FormID, the 24-bit in-plugin record ID.
    pub fn regular_record_id(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    pub fn parse(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches("0x").trim_start_matches("0X");
        u32::from_str_radix(hex, 16).ok().map(Self)
    }
}

impl std::fmt::Display for FormId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Outcome of resolving a FormID's high byte to an owning plugin.
#[derive(Debug, Clone)]
pub struct FormIdResolution {
    pub form_id: FormId,
    pub plugin_filename: Option<String>,
    pub record_id: u32,
}

// =============================================================================
// CrashLog
// =============================================================================

/// One parsed crash log. Immutable once constructed by the parser (C1);
/// borrowed by every downstream analyzer, never mutated.
#[derive(Debug, Clone)]
pub struct CrashLog {
    pub file_name: String,
    pub file_path: PathBuf,
    pub created_at: Option<DateTime<Utc>>,
    pub game_version: String,
    pub crashgen_version: String,
    pub main_error: String,
    pub raw_lines: Vec<String>,
    pub segments: HashMap<SegmentKind, LineRange>,
    pub plugins: Vec<PluginEntry>,
}

impl CrashLog {
    /// Borrow the lines belonging to a segment, in file order.
    pub fn segment_lines(&self, kind: SegmentKind) -> &[String] {
        match self.segments.get(&kind) {
            Some(range) => &self.raw_lines[range.start..range.end],
            None => &[],
        }
    }

    /// The `PROBABLE CALL STACK:` segment, concatenated into one string for
    /// substring search, joined with newlines.
    pub fn call_stack_text(&self) -> String {
        self.segment_lines(SegmentKind::CallStack).join("\n")
    }

    /// GPU vendor detected from `SYSTEM SPECS:`, or `Unknown` if the segment
    /// is absent or contains no recognizable vendor string. Per the
    /// documented behaviour, an unknown vendor never gates a rule off --
    /// the rule is evaluated as if the constraint were absent.
    pub fn gpu_vendor(&self) -> GpuVendor {
        for line in self.segment_lines(SegmentKind::SystemSpecs) {
            let lower = line.to_lowercase();
            if !lower.contains("gpu") {
                continue;
            }
            if lower.contains("nvidia") {
                return GpuVendor::Nvidia;
            }
            if lower.contains("amd") || lower.contains("radeon") {
                return GpuVendor::Amd;
            }
        }
        GpuVendor::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Unknown,
}

// =============================================================================
// Suspect rules (C3)
// =============================================================================

/// One signal within a StackSignal rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// `ME-REQ|S`: must be present in `main_error`, or the rule never matches.
    Required(String),
    /// `ME-OPT|S`: counted as satisfied if present in `main_error`.
    Optional(String),
    /// Bare `S`: counted once per occurrence in the call-stack text, capped.
    Bare(String),
}

impl Signal {
    /// Parse one signal string per the `ME-REQ|`/`ME-OPT|`/bare grammar.
    /// Returns `None` for an empty substring, which is always malformed.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(rest) = raw.strip_prefix("ME-REQ|") {
            return (!rest.is_empty()).then(|| Signal::Required(rest.to_string()));
        }
        if let Some(rest) = raw.strip_prefix("ME-OPT|") {
            return (!rest.is_empty()).then(|| Signal::Optional(rest.to_string()));
        }
        (!raw.is_empty()).then(|| Signal::Bare(raw.to_string()))
    }
}

/// A suspect-pattern rule: either a single-token error-text match, or a
/// multi-signal stack-evidence match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuspectRule {
    ErrorSignal {
        severity: u8,
        name: String,
        substring: String,
    },
    StackSignal {
        severity: u8,
        name: String,
        signals: Vec<Signal>,
    },
}

impl SuspectRule {
    pub fn name(&self) -> &str {
        match self {
            Self::ErrorSignal { name, .. } => name,
            Self::StackSignal { name, .. } => name,
        }
    }

    pub fn severity(&self) -> u8 {
        match self {
            Self::ErrorSignal { severity, .. } => *severity,
            Self::StackSignal { severity, .. } => *severity,
        }
    }
}

/// Result of applying one SuspectRule to a CrashLog.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedSuspect {
    pub name: String,
    pub severity: u8,
    pub confidence: f64,
    pub matched_signals: Vec<String>,
    pub recommended_solutions: Vec<String>,
    pub documentation_url: Option<String>,
}

// =============================================================================
// Mod rules (C4)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuConstraint {
    Nvidia,
    Amd,
}

/// Per-rule-kind identifier payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModRuleKind {
    /// A mod recommended (but not confirmed) to be present.
    Essential { identifiers: Vec<String> },
    /// A mod known to cause frequent crashes.
    FrequentCrasher { identifiers: Vec<String> },
    /// Two mods known to conflict when both are loaded.
    ConflictingPair {
        set_a: Vec<String>,
        set_b: Vec<String>,
    },
    /// A mod with a documented fix, surfaced as an informational finding.
    KnownSolution { identifiers: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModRule {
    pub name: String,
    pub kind: ModRuleKind,
    pub gpu_constraint: Option<GpuConstraint>,
    pub description: String,
    pub solution: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModFindingKind {
    Recommendation,
    Warning,
    Conflict,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModFinding {
    pub kind: ModFindingKind,
    pub rule_name: String,
    pub description: String,
    pub solution: Option<String>,
    /// Plugin filenames that triggered this finding, alphabetically sorted.
    pub matched_plugins: Vec<String>,
}

// =============================================================================
// Plugin analysis (C5)
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct PluginAnalysis {
    pub regular_count: usize,
    pub light_count: usize,
    pub missing_masters: Vec<String>,
    pub duplicates: Vec<String>,
    pub regular_warning: bool,
    pub combined_critical: bool,
}

// =============================================================================
// Game-file validators (C6)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationStatus {
    Valid,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub format: &'static str,
    pub issue: Option<String>,
    pub description: String,
    pub recommendation: Option<String>,
    pub properties: Vec<(String, String)>,
}

// =============================================================================
// Scheduler (C7)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulingMode {
    Sequential,
    Parallel,
    ProducerConsumer,
    Adaptive,
}

impl SchedulingMode {
    pub fn all() -> &'static [SchedulingMode] {
        &[
            SchedulingMode::Sequential,
            SchedulingMode::Parallel,
            SchedulingMode::ProducerConsumer,
            SchedulingMode::Adaptive,
        ]
    }
}

/// A snapshot of system load, sampled every `LOAD_SAMPLE_INTERVAL_MS`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_usage_fraction: f64,
    pub memory_usage_fraction: f64,
    pub idle_worker_fraction: f64,
}

impl ResourceSample {
    /// Unitless composite load in [0, 1].
    pub fn system_load(&self) -> f64 {
        (self.cpu_usage_fraction + self.memory_usage_fraction + (1.0 - self.idle_worker_fraction))
            / 3.0
    }
}

/// One completed record in the bounded performance history.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceRecord {
    pub mode: SchedulingMode,
    pub file_count: usize,
    pub memory_usage_fraction: f64,
    pub system_load: f64,
    pub efficiency: f64,
}

// =============================================================================
// ScanRequest / ScanResult (C10)
// =============================================================================

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub log_paths: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub mods_path: Option<PathBuf>,
    pub fcx_mode: bool,
    pub simplify: bool,
    pub show_formid_values: bool,
    pub move_unsolved: bool,
    pub reformat: bool,
    pub preferred_mode: Option<SchedulingMode>,
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcomeStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone)]
pub struct LogOutcome {
    pub path: PathBuf,
    pub status: LogOutcomeStatus,
    pub report_path: Option<PathBuf>,
    pub game_version: Option<String>,
    pub suspects: Vec<DetectedSuspect>,
    pub mod_findings: Vec<ModFinding>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub total_duration: std::time::Duration,
    pub mode_switches: usize,
    pub final_mode: Option<SchedulingMode>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub results: Vec<LogOutcome>,
    pub successful: usize,
    pub failed: usize,
    pub partial: usize,
    pub mod_conflict_histogram: HashMap<String, usize>,
    pub game_distribution_histogram: HashMap<String, usize>,
    pub messages: Vec<String>,
    pub performance: PerformanceMetrics,
    pub report_paths: Vec<PathBuf>,
}

// =============================================================================
// Cache (C9)
// =============================================================================

#[derive(Debug, Clone)]
pub struct AnalysisOutputs {
    pub suspects: Vec<DetectedSuspect>,
    pub mod_findings: Vec<ModFinding>,
    pub plugin_analysis: PluginAnalysis,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub log: CrashLog,
    pub outputs: AnalysisOutputs,
    pub last_accessed: std::time::Instant,
}

// =============================================================================
// Progress / notification sink
// =============================================================================

/// Events published by the orchestrator to whatever implements
/// `ProgressSink`. The orchestrator never references a UI type directly.
#[derive(Debug, Clone)]
pub enum ScanProgress {
    DiscoveryStarted { total: usize },
    LogStarted { path: PathBuf },
    LogCompleted {
        path: PathBuf,
        status: LogOutcomeStatus,
        completed: usize,
        total: usize,
    },
    ModeSwitched { from: SchedulingMode, to: SchedulingMode },
    Warning { message: String },
    Failed { error: String },
    Cancelled,
    Finished { summary_path: Option<PathBuf> },
}

/// Anything that wants to observe a scan's progress implements this. The
/// default CLI sink renders a line per event; other drivers can supply
/// their own without the library ever depending on them.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ScanProgress);
}

/// A sink that discards every event, used where no observer is wired up.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&self, _event: ScanProgress) {}
}
