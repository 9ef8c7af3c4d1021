//! KDL schema for config.kdl.
//!
//! This module provides:
//! - `EngineConfig`, the Rust view of config.kdl
//! - Serialization/deserialization to/from KDL format
//! - Validation and defaults

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STATE_FILE: &str = "roadmap-state.json";
pub const DEFAULT_TICKETS_FILE: &str = "tickets.json";
pub const DEFAULT_FEATURES_FILE: &str = "features.json";
pub const DEFAULT_MODULES_FILE: &str = "modules.json";
pub const DEFAULT_MAX_BACKUPS: u32 = 5;
pub const DEFAULT_COMPRESS_AFTER_HOURS: u64 = 24;
pub const DEFAULT_HISTORY_LIMIT: u32 = 25;
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1000;
pub const DEFAULT_LOCK_RETRIES: u32 = 5;
pub const DEFAULT_LOCK_BASE_DELAY_MS: u64 = 100;

/// Engine settings stored in config.kdl.
///
/// Every key is optional; missing keys fall back to the defaults above.
///
/// # KDL Schema
///
/// ```kdl
/// state-file "roadmap-state.json"
/// tickets-file "tickets.json"
/// features-file "features.json"
/// modules-file "modules.json"
/// max-backups 5
/// compress-after-hours 24
/// history-limit 25
/// save-debounce-ms 1000
/// lock-retries 5
/// lock-base-delay-ms 100
/// git-automation #true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// State file, relative to the data directory unless absolute
    pub state_file: Option<String>,

    pub tickets_file: Option<String>,
    pub features_file: Option<String>,
    pub modules_file: Option<String>,

    /// Backups kept after each write
    pub max_backups: Option<u32>,

    /// Age after which plaintext backups are gzipped
    pub compress_after_hours: Option<u64>,

    pub history_limit: Option<u32>,
    pub save_debounce_ms: Option<u64>,
    pub lock_retries: Option<u32>,
    pub lock_base_delay_ms: Option<u64>,

    /// Commit manual milestone completions to git
    pub git_automation: Option<bool>,
}

impl EngineConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_backups == Some(0) {
            return Err("max-backups must be at least 1".to_string());
        }
        if self.history_limit == Some(0) {
            return Err("history-limit must be at least 1".to_string());
        }
        if self.lock_retries == Some(0) {
            return Err("lock-retries must be at least 1".to_string());
        }
        for (key, value) in [
            ("state-file", &self.state_file),
            ("tickets-file", &self.tickets_file),
            ("features-file", &self.features_file),
            ("modules-file", &self.modules_file),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(format!("{} must not be empty", key));
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            state_file: string_value(doc, "state-file"),
            tickets_file: string_value(doc, "tickets-file"),
            features_file: string_value(doc, "features-file"),
            modules_file: string_value(doc, "modules-file"),
            max_backups: integer_value(doc, "max-backups"),
            compress_after_hours: integer_value(doc, "compress-after-hours"),
            history_limit: integer_value(doc, "history-limit"),
            save_debounce_ms: integer_value(doc, "save-debounce-ms"),
            lock_retries: integer_value(doc, "lock-retries"),
            lock_base_delay_ms: integer_value(doc, "lock-base-delay-ms"),
            git_automation: doc
                .get("git-automation")
                .and_then(|node| node.entries().first())
                .and_then(|entry| entry.value().as_bool()),
        }
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        for (name, value) in [
            ("state-file", &self.state_file),
            ("tickets-file", &self.tickets_file),
            ("features-file", &self.features_file),
            ("modules-file", &self.modules_file),
        ] {
            if let Some(value) = value {
                push_node(&mut doc, name, KdlValue::String(value.clone()));
            }
        }

        for (name, value) in [
            ("max-backups", self.max_backups.map(i128::from)),
            ("compress-after-hours", self.compress_after_hours.map(i128::from)),
            ("history-limit", self.history_limit.map(i128::from)),
            ("save-debounce-ms", self.save_debounce_ms.map(i128::from)),
            ("lock-retries", self.lock_retries.map(i128::from)),
            ("lock-base-delay-ms", self.lock_base_delay_ms.map(i128::from)),
        ] {
            if let Some(value) = value {
                push_node(&mut doc, name, KdlValue::Integer(value));
            }
        }

        if let Some(enabled) = self.git_automation {
            push_node(&mut doc, "git-automation", KdlValue::Bool(enabled));
        }

        doc
    }
}

fn push_node(doc: &mut KdlDocument, name: &str, value: KdlValue) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    doc.nodes_mut().push(node);
}

fn string_value(doc: &KdlDocument, name: &str) -> Option<String> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_string())
        .map(str::to_string)
}

/// Non-negative integer that fits `T`; anything else is ignored.
fn integer_value<T: TryFrom<i128>>(doc: &KdlDocument, name: &str) -> Option<T> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_integer())
        .filter(|i| *i >= 0)
        .and_then(|i| T::try_from(i).ok())
}
