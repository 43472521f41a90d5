// util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation: every subsystem gets its own error
// enum, composed into the top-level type, with causal chains preserved
// for diagnostic logging.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all ccscan operations.
#[derive(Debug)]
pub enum CrashLogError {
    /// Segmented parser failed on one log. Non-fatal to a batch.
    Parse(ParseError),

    /// A ScanRequest failed validation. Fatal to the run.
    Validation(ValidationError),

    /// Rule-store loading or a single rule definition was malformed.
    Rule(RuleError),

    /// Binary game-file validator found a structural violation.
    /// Surfaced as a `ValidationResult`, never thrown; this variant exists
    /// only for the I/O failures a validator cannot recover from.
    Format(FormatError),

    /// A run was cancelled before completion.
    Cancelled,

    /// An invariant was violated; indicates a bug rather than bad input.
    Internal { context: String },

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for CrashLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Validation(e) => write!(f, "Validation error: {e}"),
            Self::Rule(e) => write!(f, "Rule error: {e}"),
            Self::Format(e) => write!(f, "Format error: {e}"),
            Self::Cancelled => write!(f, "Scan cancelled"),
            Self::Internal { context } => write!(f, "Internal error: {context}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for CrashLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Validation(e) => Some(e),
            Self::Rule(e) => Some(e),
            Self::Format(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            Self::Cancelled | Self::Internal { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse errors (C1)
// ---------------------------------------------------------------------------

/// Errors from the segmented crash-log parser.
#[derive(Debug)]
pub enum ParseError {
    /// Line 1 did not match the fixed crash-generator/game-version prefix.
    MalformedHeader { path: PathBuf, line: String },

    /// File has fewer than 2 lines.
    Truncated { path: PathBuf, lines: usize },

    /// Decoding failed after BOM stripping.
    Encoding {
        path: PathBuf,
        source: std::str::Utf8Error,
    },

    /// I/O error while reading the log file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedHeader { path, line } => write!(
                f,
                "'{}': line 1 does not match the crash-generator header ('{line}')",
                path.display()
            ),
            Self::Truncated { path, lines } => write!(
                f,
                "'{}': truncated, only {lines} line(s)",
                path.display()
            ),
            Self::Encoding { path, source } => {
                write!(f, "'{}': invalid UTF-8 encoding: {source}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "'{}': I/O error: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encoding { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ParseError> for CrashLogError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Validation errors (C10)
// ---------------------------------------------------------------------------

/// Errors from ScanRequest validation. Fatal to the run.
#[derive(Debug)]
pub enum ValidationError {
    /// No log paths were supplied.
    EmptyLogPaths,

    /// A requested log path does not exist.
    LogPathNotFound { path: PathBuf },

    /// The output directory does not exist and could not be created.
    OutputDirUnwritable { path: PathBuf, source: io::Error },

    /// A numeric field (batch size, max concurrent, etc.) is out of range.
    ValueOutOfRange {
        field: &'static str,
        value: String,
        expected: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyLogPaths => write!(f, "ScanRequest has no log paths"),
            Self::LogPathNotFound { path } => {
                write!(f, "Log path '{}' does not exist", path.display())
            }
            Self::OutputDirUnwritable { path, source } => write!(
                f,
                "Output directory '{}' is not writable: {source}",
                path.display()
            ),
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(f, "'{field}' = '{value}' is out of range. Expected: {expected}"),
        }
    }
}

impl std::error::Error for ValidationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::OutputDirUnwritable { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ValidationError> for CrashLogError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

// ---------------------------------------------------------------------------
// Rule errors (C2, C3, C4)
// ---------------------------------------------------------------------------

/// Errors from rule-store loading or a single malformed rule entry.
/// A malformed rule is skipped with a logged warning; it never aborts a scan.
#[derive(Debug)]
pub enum RuleError {
    /// The rule-database YAML could not be parsed at all.
    YamlParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A rule file exceeds the maximum allowed size.
    FileTooLarge { path: PathBuf, size: u64, max_size: u64 },

    /// A `"severity | name"` key did not parse to a valid severity.
    InvalidSeverityKey { key: String, reason: String },

    /// A signal string within a StackSignal rule was malformed.
    InvalidSignal { rule_name: String, signal: String },

    /// Write attempted against a static (read-only) store.
    StaticStoreWrite { store: &'static str },

    /// I/O error reading or writing a rule-store file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::YamlParse { path, source } => {
                write!(f, "Failed to parse YAML '{}': {source}", path.display())
            }
            Self::FileTooLarge { path, size, max_size } => write!(
                f,
                "Rule file '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::InvalidSeverityKey { key, reason } => {
                write!(f, "Invalid rule key '{key}': {reason}")
            }
            Self::InvalidSignal { rule_name, signal } => {
                write!(f, "Rule '{rule_name}': invalid signal '{signal}'")
            }
            Self::StaticStoreWrite { store } => {
                write!(f, "Attempted write to static store '{store}'")
            }
            Self::Io { path, source } => {
                write!(f, "I/O error on rule store '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for RuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::YamlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<RuleError> for CrashLogError {
    fn from(e: RuleError) -> Self {
        Self::Rule(e)
    }
}

// ---------------------------------------------------------------------------
// Format errors (C6)
// ---------------------------------------------------------------------------

/// I/O-level failures encountered by a game-file validator. Structural
/// violations are never errors: they are reported as a `ValidationResult`.
#[derive(Debug)]
pub enum FormatError {
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "I/O error validating '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for FormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<FormatError> for CrashLogError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

/// Convenience type alias for ccscan results.
pub type Result<T> = std::result::Result<T, CrashLogError>;
