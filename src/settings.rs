//! Competition settings
//!
//! Zone thresholds live in an external key-value settings store. They are read
//! once per batch and fall back to 125/150/165 whenever the store is
//! unreachable, a key is missing or unparseable, or the triple is not strictly
//! increasing.

use crate::error::SettingsError;
use crate::types::{ZoneThresholds, DEFAULT_Z1, DEFAULT_Z2, DEFAULT_Z3};
use serde_json::Value;
use std::collections::HashMap;

/// Keys consumed by the scorer
pub const THRESHOLD_KEYS: [&str; 3] = ["z1", "z2", "z3"];

/// Read side of the settings store collaborator
pub trait SettingsStore {
    /// Fetch the values of `keys`; absent keys are simply missing from the map
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, String>, SettingsError>;
}

impl SettingsStore for HashMap<String, String> {
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, String>, SettingsError> {
        Ok(keys
            .iter()
            .filter_map(|key| self.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }
}

/// Settings held in memory, typically loaded from a JSON document
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: HashMap<String, String>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Load a flat JSON object; numbers and booleans are kept as their text
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let document: HashMap<String, Value> = serde_json::from_str(json)?;
        let values = document
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(s) => Some((key, s)),
                Value::Number(n) => Some((key, n.to_string())),
                Value::Bool(b) => Some((key, b.to_string())),
                _ => None,
            })
            .collect();
        Ok(Self { values })
    }
}

impl SettingsStore for StaticSettings {
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, String>, SettingsError> {
        SettingsStore::get(&self.values, keys)
    }
}

/// Resolved thresholds plus a record of every fallback taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdResolution {
    pub thresholds: ZoneThresholds,
    /// Keys that were missing or unparseable and took their default
    pub defaulted_keys: Vec<String>,
    /// Why the whole triple fell back to defaults, if it did
    pub fallback_reason: Option<String>,
}

impl ThresholdResolution {
    pub fn used_defaults(&self) -> bool {
        self.fallback_reason.is_some() || !self.defaulted_keys.is_empty()
    }
}

/// Resolve zone thresholds for one batch. Never fails.
pub fn resolve_thresholds(store: &dyn SettingsStore) -> ThresholdResolution {
    let values = match store.get(&THRESHOLD_KEYS) {
        Ok(values) => values,
        Err(e) => {
            log::warn!("settings store read failed, using default zone thresholds: {}", e);
            return ThresholdResolution {
                thresholds: ZoneThresholds::default(),
                defaulted_keys: Vec::new(),
                fallback_reason: Some(e.to_string()),
            };
        }
    };

    let mut defaulted_keys = Vec::new();
    let mut lookup = |key: &str, default: i64| -> i64 {
        match values.get(key).map(|v| v.trim().parse::<i64>()) {
            Some(Ok(parsed)) => parsed,
            Some(Err(_)) | None => {
                log::warn!("setting `{}` missing or not an integer, using {}", key, default);
                defaulted_keys.push(key.to_string());
                default
            }
        }
    };

    let z1 = lookup("z1", DEFAULT_Z1);
    let z2 = lookup("z2", DEFAULT_Z2);
    let z3 = lookup("z3", DEFAULT_Z3);

    match ZoneThresholds::new(z1, z2, z3) {
        Some(thresholds) => ThresholdResolution {
            thresholds,
            defaulted_keys,
            fallback_reason: None,
        },
        None => {
            let reason = format!("thresholds {z1}/{z2}/{z3} are not strictly increasing");
            log::warn!("{}, using default zone thresholds", reason);
            ThresholdResolution {
                thresholds: ZoneThresholds::default(),
                defaulted_keys,
                fallback_reason: Some(reason),
            }
        }
    }
}
