// core/parser.rs
//
// Segmented crash-log parser (C1): tokenizes one crash log into header,
// main-error, and the recognized section segments, then further parses the
// PLUGINS segment into PluginEntry records.

use crate::core::model::{
    CrashLog, LineRange, PluginEntry, PluginIndex, PluginStatus, SegmentKind,
};
use crate::platform::fs::read_file_lossy;
use crate::util::error::ParseError;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<crashgen>.+?)\s+v(?P<crashgen_version>[0-9][\w.\-]*)\s+for\s+(?P<game>.+?)\s+v(?P<game_version>[0-9][\w.\-]*)",
        )
        .expect("static header regex is valid")
    })
}

fn plugin_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[(?:(?P<reg>[0-9A-Fa-f]{2})|FE[:\s]+(?P<light>[0-9A-Fa-f]{3}))\]\s+(?P<name>\S.*)$")
            .expect("static plugin-line regex is valid")
    })
}

/// Parse a crash log file into a `CrashLog`.
///
/// Reads the file as UTF-8 with BOM tolerance. Fails with `MalformedHeader`
/// if line 1 does not match the crash-generator/game-version prefix,
/// `Truncated` if the file has fewer than 2 lines. Lines within the
/// `PLUGINS:` segment that do not match `[XX] Name.esp` / `[FE YYY] Name.esl`
/// are discarded with a logged warning rather than failing the parse.
pub fn parse(path: &Path) -> Result<CrashLog, ParseError> {
    let text = read_file_lossy(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_text(path, &text)
}

/// Parse already-read text. Split out so tests can exercise the parser
/// without touching the filesystem.
pub fn parse_text(path: &Path, text: &str) -> Result<CrashLog, ParseError> {
    let raw_lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();

    if raw_lines.len() < 2 {
        return Err(ParseError::Truncated {
            path: path.to_path_buf(),
            lines: raw_lines.len(),
        });
    }

    let header_caps = header_re().captures(&raw_lines[0]).ok_or_else(|| ParseError::MalformedHeader {
        path: path.to_path_buf(),
        line: raw_lines[0].clone(),
    })?;

    let crashgen_version = header_caps["crashgen_version"].to_string();
    let game_version = header_caps["game_version"].to_string();
    let main_error = raw_lines[1].trim().to_string();

    let segments = segment_lines(&raw_lines);

    let plugin_range = segments.get(&SegmentKind::Plugins).copied();
    let plugins = plugin_range
        .map(|range| parse_plugins(&raw_lines[range.start..range.end], path))
        .unwrap_or_default();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(CrashLog {
        file_name,
        file_path: path.to_path_buf(),
        created_at: None,
        game_version,
        crashgen_version,
        main_error,
        raw_lines,
        segments,
        plugins,
    })
}

/// Scan lines from index 2 onward for recognized section headers.
///
/// A header is a line, on its own, that matches one of the closed set of
/// segment names (see `SegmentKind::from_header`). Each segment's content
/// runs from the line after its header up to (not including) the next
/// header line, so every line in the file belongs to at most one segment
/// and concatenating the segments in file order reconstructs the segment
/// region exactly.
fn segment_lines(raw_lines: &[String]) -> HashMap<SegmentKind, LineRange> {
    let mut segments = HashMap::new();
    let mut current: Option<(SegmentKind, usize)> = None;

    for (idx, line) in raw_lines.iter().enumerate().skip(2) {
        if let Some(kind) = SegmentKind::from_header(line) {
            if let Some((prev_kind, start)) = current.take() {
                segments.insert(prev_kind, LineRange { start, end: idx });
            }
            current = Some((kind, idx + 1));
            continue;
        }
    }

    if let Some((kind, start)) = current {
        segments.insert(kind, LineRange { start, end: raw_lines.len() });
    }

    segments
}

/// Parse the `PLUGINS:` segment's lines into `PluginEntry` records.
/// Non-matching lines are discarded with a warning; the batch continues.
fn parse_plugins(lines: &[String], path: &Path) -> Vec<PluginEntry> {
    let mut entries = Vec::with_capacity(lines.len());
    for (offset, line) in lines.iter().enumerate() {
        let Some(caps) = plugin_line_re().captures(line) else {
            if !line.trim().is_empty() {
                tracing::warn!(
                    path = %path.display(),
                    line = offset,
                    text = %line,
                    "Discarding unrecognized PLUGINS line"
                );
            }
            continue;
        };

        let (index, status) = if let Some(reg) = caps.name("reg") {
            let value = u8::from_str_radix(reg.as_str(), 16).unwrap_or(0);
            (PluginIndex::Regular(value), PluginStatus::Regular)
        } else if let Some(light) = caps.name("light") {
            let value = u16::from_str_radix(light.as_str(), 16).unwrap_or(0);
            (PluginIndex::Light(value), PluginStatus::Light)
        } else {
            continue;
        };

        entries.push(PluginEntry {
            index,
            filename: caps["name"].trim().to_string(),
            status,
        });
    }
    entries
}
