// core/rule_store.rs
//
// YAML Rule Store (C2): loads and indexes the suspect-pattern and
// mod-conflict rule databases, resolves dotted key paths, and separates
// static (read-only) stores from user-mutable ones.
//
// Generalised from the built-in+user TOML profile pattern: static stores are
// parsed once (built-ins embedded via `include_str!`, optionally overridden
// by a file on disk); writable stores are re-read when their file's
// modification time changes.

use crate::core::model::{GpuConstraint, ModRule, ModRuleKind, Signal, SuspectRule};
use crate::util::constants;
use crate::util::error::RuleError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

/// The closed set of logical rule/settings stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreId {
    /// Suspect/mod-conflict rule database. Static, read-only.
    Main,
    /// Game-specific rule overrides, merged over MAIN. Static, read-only.
    Game,
    /// User settings. Writable.
    Settings,
    /// User-defined exclusions. Writable.
    Ignore,
    /// Game-local overrides (per-installation). Writable.
    GameLocal,
    /// Scratch store used by tests.
    Test,
}

impl StoreId {
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Main | Self::Game)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Main => "MAIN",
            Self::Game => "GAME",
            Self::Settings => "SETTINGS",
            Self::Ignore => "IGNORE",
            Self::GameLocal => "GAME_LOCAL",
            Self::Test => "TEST",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            Self::Main => constants::MAIN_RULES_FILE_NAME,
            Self::Game => constants::GAME_RULES_FILE_NAME,
            Self::Settings => constants::SETTINGS_FILE_NAME,
            Self::Ignore => constants::IGNORE_FILE_NAME,
            Self::GameLocal => constants::GAME_LOCAL_FILE_NAME,
            Self::Test => "test.yaml",
        }
    }
}

/// Built-in MAIN rule database, shipped inside the binary so a fresh install
/// has working suspect/conflict detection with no external files.
const BUILTIN_MAIN_RULES: &str = include_str!("builtin_main_rules.yaml");

struct StoreState {
    path: Option<PathBuf>,
    mtime: RwLock<Option<SystemTime>>,
    value: RwLock<serde_yaml::Value>,
}

/// Holds every logical store for the lifetime of one process/scan.
///
/// Reads take each store's `RwLock` for shared access; `put` takes it for
/// exclusive access. There is no cross-store locking, so concurrent readers
/// of different stores never contend.
pub struct RuleStore {
    dir: PathBuf,
    stores: HashMap<StoreId, StoreState>,
}

impl RuleStore {
    /// Load MAIN (built-in, optionally overridden by `<dir>/main.yaml`) and
    /// GAME (from `<dir>/game.yaml`, absent is not an error) as static
    /// stores, and register the writable stores without eagerly reading
    /// them (they are lazily loaded/reloaded on first access).
    pub fn load(dir: &Path) -> Result<Self, RuleError> {
        let mut stores = HashMap::new();

        let main_path = dir.join(StoreId::Main.file_name());
        let main_value = if main_path.is_file() {
            read_yaml_checked(&main_path)?
        } else {
            parse_yaml_str(BUILTIN_MAIN_RULES, &main_path)?
        };
        stores.insert(
            StoreId::Main,
            StoreState {
                path: Some(main_path),
                mtime: RwLock::new(None),
                value: RwLock::new(main_value),
            },
        );

        let game_path = dir.join(StoreId::Game.file_name());
        let game_value = if game_path.is_file() {
            read_yaml_checked(&game_path)?
        } else {
            serde_yaml::Value::Mapping(Default::default())
        };
        stores.insert(
            StoreId::Game,
            StoreState {
                path: Some(game_path),
                mtime: RwLock::new(None),
                value: RwLock::new(game_value),
            },
        );

        for id in [StoreId::Settings, StoreId::Ignore, StoreId::GameLocal, StoreId::Test] {
            let path = dir.join(id.file_name());
            stores.insert(
                id,
                StoreState {
                    path: Some(path),
                    mtime: RwLock::new(None),
                    value: RwLock::new(serde_yaml::Value::Mapping(Default::default())),
                },
            );
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            stores,
        })
    }

    /// Navigate `dotted.key.path` into a store, deserializing the leaf into
    /// `T`. Returns `None` if any intermediate key, or the leaf itself, is
    /// absent.
    pub fn get<T: DeserializeOwned>(&self, store: StoreId, dotted_key: &str) -> Option<T> {
        self.reload_if_stale(store);
        let state = self.stores.get(&store)?;
        let value = state.value.read().expect("rule store lock poisoned");
        let leaf = navigate(&value, dotted_key)?;
        serde_yaml::from_value(leaf.clone()).ok()
    }

    /// Write `value` at `dotted.key.path`, auto-creating missing
    /// intermediate mappings. Errors if `store` is static (MAIN/GAME).
    pub fn put<T: Serialize>(
        &self,
        store: StoreId,
        dotted_key: &str,
        value: T,
    ) -> Result<(), RuleError> {
        if store.is_static() {
            return Err(RuleError::StaticStoreWrite { store: store.label() });
        }
        self.reload_if_stale(store);
        let state = self.stores.get(&store).ok_or(RuleError::StaticStoreWrite { store: store.label() })?;
        let mut root = state.value.write().expect("rule store lock poisoned");
        let encoded = serde_yaml::to_value(value).map_err(|source| RuleError::YamlParse {
            path: state.path.clone().unwrap_or_default(),
            source,
        })?;
        navigate_mut(&mut root, dotted_key, encoded);

        if let Some(path) = &state.path {
            let bytes = serde_yaml::to_string(&*root).map_err(|source| RuleError::YamlParse {
                path: path.clone(),
                source,
            })?;
            std::fs::create_dir_all(&self.dir).map_err(|source| RuleError::Io {
                path: path.clone(),
                source,
            })?;
            std::fs::write(path, bytes).map_err(|source| RuleError::Io {
                path: path.clone(),
                source,
            })?;
            if let Ok(meta) = std::fs::metadata(path) {
                *state.mtime.write().expect("rule store lock poisoned") = meta.modified().ok();
            }
        }
        Ok(())
    }

    /// Writable stores are re-read when their backing file's mtime advances
    /// past what was last observed. Static stores never reload.
    fn reload_if_stale(&self, store: StoreId) {
        if store.is_static() {
            return;
        }
        let Some(state) = self.stores.get(&store) else {
            return;
        };
        let Some(path) = &state.path else {
            return;
        };
        let Ok(meta) = std::fs::metadata(path) else {
            return;
        };
        let Ok(disk_mtime) = meta.modified() else {
            return;
        };

        let stale = {
            let cached = state.mtime.read().expect("rule store lock poisoned");
            *cached != Some(disk_mtime)
        };
        if !stale {
            return;
        }

        if let Ok(value) = read_yaml_checked(path) {
            *state.value.write().expect("rule store lock poisoned") = value;
            *state.mtime.write().expect("rule store lock poisoned") = Some(disk_mtime);
        }
    }
}

fn navigate<'a>(root: &'a serde_yaml::Value, dotted_key: &str) -> Option<&'a serde_yaml::Value> {
    let mut current = root;
    for segment in dotted_key.split('.') {
        current = current.as_mapping()?.get(serde_yaml::Value::String(segment.to_string()))?;
    }
    Some(current)
}

fn navigate_mut(root: &mut serde_yaml::Value, dotted_key: &str, leaf: serde_yaml::Value) {
    let segments: Vec<&str> = dotted_key.split('.').collect();
    let mut current = root;
    for segment in &segments[..segments.len() - 1] {
        if !current.is_mapping() {
            *current = serde_yaml::Value::Mapping(Default::default());
        }
        let map = current.as_mapping_mut().expect("just ensured mapping");
        current = map
            .entry(serde_yaml::Value::String((*segment).to_string()))
            .or_insert_with(|| serde_yaml::Value::Mapping(Default::default()));
    }
    if !current.is_mapping() {
        *current = serde_yaml::Value::Mapping(Default::default());
    }
    current
        .as_mapping_mut()
        .expect("just ensured mapping")
        .insert(serde_yaml::Value::String(segments.last().unwrap().to_string()), leaf);
}

fn read_yaml_checked(path: &Path) -> Result<serde_yaml::Value, RuleError> {
    let meta = std::fs::metadata(path).map_err(|source| RuleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if meta.len() > constants::MAX_RULE_FILE_SIZE {
        return Err(RuleError::FileTooLarge {
            path: path.to_path_buf(),
            size: meta.len(),
            max_size: constants::MAX_RULE_FILE_SIZE,
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_yaml_str(&text, path)
}

fn parse_yaml_str(text: &str, path: &Path) -> Result<serde_yaml::Value, RuleError> {
    serde_yaml::from_str(text).map_err(|source| RuleError::YamlParse {
        path: path.to_path_buf(),
        source,
    })
}

// =============================================================================
// Typed rule database (compiled from MAIN + GAME)
// =============================================================================

/// The typed suspect/mod-conflict rules the scanner and conflict detector
/// consume, compiled from the MAIN and GAME stores' raw YAML.
#[derive(Debug, Clone, Default)]
pub struct RuleDatabase {
    pub error_rules: Vec<SuspectRule>,
    pub stack_rules: Vec<SuspectRule>,
    pub essential: Vec<ModRule>,
    pub frequent: Vec<ModRule>,
    pub conflicting: Vec<ModRule>,
    pub solutions: Vec<ModRule>,
}

impl RuleDatabase {
    /// Compile the database from a loaded `RuleStore`, merging GAME entries
    /// over MAIN (GAME keys with the same dotted key override MAIN's).
    /// Malformed individual rules are skipped with a logged warning; a
    /// malformed rule never aborts the whole load.
    pub fn compile(store: &RuleStore) -> Self {
        let mut db = RuleDatabase::default();

        for (section, target) in [
            ("crashlog_error_check", "error"),
            ("crashlog_stack_check", "stack"),
        ] {
            let merged = merged_mapping(store, section);
            for (key, value) in merged {
                match parse_severity_key(&key) {
                    Ok((severity, name)) => {
                        if target == "error" {
                            if let Some(substring) = value.as_str() {
                                db.error_rules.push(SuspectRule::ErrorSignal {
                                    severity,
                                    name,
                                    substring: substring.to_string(),
                                });
                            } else {
                                tracing::warn!(key = %key, "crashlog_error_check value must be a string; skipping");
                            }
                        } else {
                            match parse_signal_sequence(&value) {
                                Some(signals) if !signals.is_empty() => {
                                    db.stack_rules.push(SuspectRule::StackSignal { severity, name, signals });
                                }
                                _ => tracing::warn!(key = %key, "crashlog_stack_check rule has no valid signals; skipping"),
                            }
                        }
                    }
                    Err(reason) => tracing::warn!(key = %key, reason, "invalid rule key; skipping"),
                }
            }
        }

        db.essential = compile_mod_rules(store, "mods_core", |identifiers| ModRuleKind::Essential { identifiers });
        db.frequent = compile_mod_rules(store, "mods_freq", |identifiers| ModRuleKind::FrequentCrasher { identifiers });
        db.solutions = compile_mod_rules(store, "mods_solu", |identifiers| ModRuleKind::KnownSolution { identifiers });
        db.conflicting = compile_conflicting_pairs(store, "mods_conf");

        db
    }
}

fn merged_mapping(store: &RuleStore, section: &str) -> Vec<(String, serde_yaml::Value)> {
    let mut merged: HashMap<String, serde_yaml::Value> = HashMap::new();
    for id in [StoreId::Main, StoreId::Game] {
        if let Some(map) = store.get::<serde_yaml::Mapping>(id, section) {
            for (k, v) in map {
                if let Some(key) = k.as_str() {
                    merged.insert(key.to_string(), v);
                }
            }
        }
    }
    let mut entries: Vec<_> = merged.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Parse a `"severity | name"` key into (severity, name).
fn parse_severity_key(key: &str) -> Result<(u8, String), String> {
    let (sev_str, name) = key
        .split_once('|')
        .ok_or_else(|| "missing '|' separator".to_string())?;
    let severity: u8 = sev_str
        .trim()
        .parse()
        .map_err(|_| format!("severity '{}' is not a number 1-6", sev_str.trim()))?;
    if !(1..=6).contains(&severity) {
        return Err(format!("severity {severity} out of range 1-6"));
    }
    Ok((severity, name.trim().to_string()))
}

fn parse_signal_sequence(value: &serde_yaml::Value) -> Option<Vec<Signal>> {
    let seq = value.as_sequence()?;
    let signals: Vec<Signal> = seq
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(Signal::parse)
        .collect();
    Some(signals)
}

fn compile_mod_rules(
    store: &RuleStore,
    section: &str,
    build_kind: impl Fn(Vec<String>) -> ModRuleKind,
) -> Vec<ModRule> {
    let mut rules = Vec::new();
    for (key, value) in merged_mapping(store, section) {
        let identifiers: Vec<String> = key.split(',').map(|s| s.trim().to_string()).collect();
        let (description, solution, gpu_constraint) = decode_mod_value(&value);
        rules.push(ModRule {
            name: key,
            kind: build_kind(identifiers),
            gpu_constraint,
            description,
            solution,
        });
    }
    rules
}

fn compile_conflicting_pairs(store: &RuleStore, section: &str) -> Vec<ModRule> {
    let mut rules = Vec::new();
    for (key, value) in merged_mapping(store, section) {
        let Some((a, b)) = key.split_once('|') else {
            tracing::warn!(key = %key, "mods_conf key missing '|' pair separator; skipping");
            continue;
        };
        let (description, solution, gpu_constraint) = decode_mod_value(&value);
        let set_a = a.split(',').map(|s| s.trim().to_string()).collect();
        let set_b = b.split(',').map(|s| s.trim().to_string()).collect();
        rules.push(ModRule {
            name: key.clone(),
            kind: ModRuleKind::ConflictingPair { set_a, set_b },
            gpu_constraint,
            description,
            solution,
        });
    }
    rules
}

fn decode_mod_value(value: &serde_yaml::Value) -> (String, Option<String>, Option<GpuConstraint>) {
    if let Some(s) = value.as_str() {
        return (s.to_string(), None, None);
    }
    let description = value
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let solution = value
        .get("solution")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let gpu_constraint = value
        .get("gpu_constraint")
        .and_then(|v| v.as_str())
        .and_then(|s| match s.to_uppercase().as_str() {
            "NVIDIA" => Some(GpuConstraint::Nvidia),
            "AMD" => Some(GpuConstraint::Amd),
            _ => None,
        });
    (description, solution, gpu_constraint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn static_store_write_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = RuleStore::load(dir.path()).unwrap();
        let err = store.put(StoreId::Main, "foo", "bar").unwrap_err();
        assert!(matches!(err, RuleError::StaticStoreWrite { .. }));
    }

    #[test]
    fn writable_store_roundtrips_dotted_key() {
        let dir = TempDir::new().unwrap();
        let store = RuleStore::load(dir.path()).unwrap();
        store.put(StoreId::Settings, "scan.parallel", 4u32).unwrap();
        let value: Option<u32> = store.get(StoreId::Settings, "scan.parallel");
        assert_eq!(value, Some(4));
    }

    #[test]
    fn missing_dotted_key_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = RuleStore::load(dir.path()).unwrap();
        let value: Option<String> = store.get(StoreId::Settings, "a.b.c");
        assert_eq!(value, None);
    }

    #[test]
    fn builtin_main_rules_compile_into_nonempty_database() {
        let dir = TempDir::new().unwrap();
        let store = RuleStore::load(dir.path()).unwrap();
        let db = RuleDatabase::compile(&store);
        assert!(!db.error_rules.is_empty());
        assert!(!db.stack_rules.is_empty());
    }

    #[test]
    fn invalid_severity_key_is_skipped_not_fatal() {
        assert!(parse_severity_key("not-a-number | X").is_err());
        assert!(parse_severity_key("7 | X").is_err());
        assert!(parse_severity_key("5 | X").is_ok());
    }
}
