// core/mod.rs
//
// Core business logic layer.
// Dependencies: standard library, serde, serde_yaml, regex, chrono, sha2.
// Must NOT depend on: platform, app, or any filesystem/network I/O directly
// (rule_store.rs is the one exception: it owns the rule-database files'
// read/write/reload cycle, the same way the teacher's profile.rs did for
// TOML profiles).

pub mod conflicts;
pub mod model;
pub mod parser;
pub mod plugins;
pub mod report;
pub mod rule_store;
pub mod scanner;
pub mod validators;
