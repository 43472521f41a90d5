// util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

pub const APP_NAME: &str = "ccscan";
pub const APP_ID: &str = "ccscan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Discovery limits
// =============================================================================

/// Maximum number of log paths accepted in a single ScanRequest.
pub const ABSOLUTE_MAX_LOGS: usize = 10_000;

// =============================================================================
// Plugin / FormID limits
// =============================================================================

/// Maximum regular (non-light) plugin load index. 0xFF is the last valid
/// regular index; games treat it as reserved in some contexts but the
/// analyzer counts it toward the 255 cap per the documented behaviour.
pub const MAX_REGULAR_PLUGIN_INDEX: u16 = 0xFF;

/// Hard cap on regular plugins before the condition is critical.
pub const MAX_REGULAR_PLUGINS: usize = 255;

/// Advisory threshold above which a regular-plugin-count warning is raised
/// even though the hard cap has not been hit yet.
pub const REGULAR_PLUGIN_WARNING_THRESHOLD: usize = 200;

/// Hard cap on light (ESL, `FE xxx`) plugins.
pub const MAX_LIGHT_PLUGINS: usize = 4096;

// =============================================================================
// Suspect scanner limits
// =============================================================================

/// Cap on bare stack-signal occurrence counting within one rule evaluation.
pub const MAX_BARE_SIGNAL_HITS: u32 = 3;

// =============================================================================
// Rule store limits
// =============================================================================

/// Maximum size of a rule-database YAML file in bytes.
pub const MAX_RULE_FILE_SIZE: u64 = 8 * 1024 * 1024; // 8 MiB

/// Truthy string set used for YAML-string -> bool coercion.
pub const TRUTHY_STRINGS: &[&str] = &["true", "yes", "on", "1"];

/// Falsy string set used for YAML-string -> bool coercion.
pub const FALSY_STRINGS: &[&str] = &["false", "no", "off", "0"];

// =============================================================================
// Game-file validator limits
// =============================================================================

/// Number of header bytes read (and bounds-checked) for DDS validation.
pub const DDS_HEADER_SIZE: usize = 20;

/// Number of header bytes read for BA2 validation.
pub const BA2_HEADER_SIZE: usize = 12;

/// Number of header bytes read for WAV/XWM/FUZ validation.
pub const WAV_HEADER_SIZE: usize = 28;

/// Chunk size used when streaming a file through SHA-256.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// Scheduler limits
// =============================================================================

/// Logs at or below this count always use Sequential mode.
pub const SEQUENTIAL_MAX_LOGS: usize = 3;

/// Logs at or below this count use Parallel (bounded) mode when load is low.
pub const PARALLEL_MAX_LOGS: usize = 20;

/// Logs above this count use Producer-Consumer mode when load is moderate.
pub const PRODUCER_CONSUMER_MIN_LOGS: usize = 50;

pub const SEQUENTIAL_LOAD_MEMORY_THRESHOLD: f64 = 0.90;
pub const SEQUENTIAL_LOAD_CPU_THRESHOLD: f64 = 0.95;
pub const PARALLEL_LOAD_THRESHOLD: f64 = 0.6;
pub const PRODUCER_CONSUMER_LOAD_THRESHOLD: f64 = 0.7;

/// How often system-load is sampled, in milliseconds.
pub const LOAD_SAMPLE_INTERVAL_MS: u64 = 2_000;

/// Worker-count multipliers per scheduling mode.
pub const WORKER_MULTIPLIER_SEQUENTIAL: f64 = 1.0;
pub const WORKER_MULTIPLIER_PARALLEL: f64 = 1.5;
pub const WORKER_MULTIPLIER_PRODUCER_CONSUMER: f64 = 2.0;
pub const WORKER_MULTIPLIER_ADAPTIVE: f64 = 1.8;

/// Memory/CPU pressure thresholds above which the worker count is halved.
pub const WORKER_PRESSURE_MEMORY_THRESHOLD: f64 = 0.80;
pub const WORKER_PRESSURE_CPU_THRESHOLD: f64 = 0.90;

pub const MIN_WORKERS: usize = 1;
pub const WORKER_HW_THREAD_CAP_MULTIPLIER: usize = 2;

/// Batch-size memory thresholds (halved / quartered).
pub const BATCH_HALVE_MEMORY_THRESHOLD: f64 = 0.60;
pub const BATCH_QUARTER_MEMORY_THRESHOLD: f64 = 0.80;
pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Efficiency (0-100) below which the adaptive loop consults history for a
/// better-performing mode.
pub const ADAPTIVE_EFFICIENCY_THRESHOLD: f64 = 80.0;

/// Minimum confidence in a historical mode recommendation before switching.
pub const ADAPTIVE_SWITCH_CONFIDENCE: f64 = 0.7;

/// Bounded FIFO size of the performance history.
pub const PERFORMANCE_HISTORY_SIZE: usize = 50;

/// Rolling window size used for per-mode running statistics.
pub const PERFORMANCE_ROLLING_WINDOW: usize = 10;

/// Similarity bands used when matching a history record to the current run.
pub const HISTORY_FILE_COUNT_BAND: f64 = 0.30;
pub const HISTORY_MEMORY_BAND_PP: f64 = 0.20;
pub const HISTORY_LOAD_BAND: f64 = 0.30;

/// Resident-set-size ceiling fraction above which the scheduler forces
/// sequential mode and reduces batch size regardless of the chosen mode.
pub const RSS_CEILING_FRACTION: f64 = 0.85;

// =============================================================================
// Cache limits
// =============================================================================

/// Default idle timeout before a cache entry is evicted (seconds).
pub const DEFAULT_CACHE_IDLE_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// Logging
// =============================================================================

pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Configuration / persisted state
// =============================================================================

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const BACKUPS_DIR_NAME: &str = "Backups";
pub const RULES_DIR_NAME: &str = "rules";

/// Rule-store file names within the rules directory.
pub const MAIN_RULES_FILE_NAME: &str = "main.yaml";
pub const GAME_RULES_FILE_NAME: &str = "game.yaml";
pub const SETTINGS_FILE_NAME: &str = "settings.yaml";
pub const IGNORE_FILE_NAME: &str = "ignore.yaml";
pub const GAME_LOCAL_FILE_NAME: &str = "game_local.yaml";
