//! Parameter service: a typed, string-keyed store the engine exposes as
//! its only channel for the recognized core parameters that directly
//! govern behavior (worker count, chunksize, event cap). A richer,
//! plugin-facing service remains an external collaborator per spec.md §1;
//! this is the minimal slice the core itself needs.
//!
//! Grounded on the teacher's `utils/metrics.rs` shape (a `parking_lot`-
//! guarded struct behind an `Arc`), applied here to a config map instead of
//! a metrics buffer -- the teacher itself has no parameter registry, its
//! configuration is plain function arguments in `main.rs`.

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    UInt(u64),
    String(String),
}

impl ParamValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::String(s) => match s.as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            ParamValue::UInt(n) => Some(*n != 0),
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            ParamValue::UInt(n) => Some(*n),
            ParamValue::String(s) => s.parse().ok(),
            ParamValue::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<u64> for ParamValue {
    fn from(n: u64) -> Self {
        ParamValue::UInt(n)
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

/// Recognized core parameter keys, per §6.
pub mod keys {
    pub const NTHREADS: &str = "nthreads";
    pub const ENGINE: &str = "jana:engine";
    pub const EXTENDED_REPORT: &str = "jana:extended_report";
    pub const EVENT_SOURCE_CHUNKSIZE: &str = "jana:event_source_chunksize";
    pub const LOG_DEBUG: &str = "log:debug";
    pub const LOG_OFF: &str = "log:off";
    pub const NEVENTS: &str = "NEVENTS";
}

pub struct ParameterService {
    values: Mutex<HashMap<String, ParamValue>>,
}

impl Default for ParameterService {
    fn default() -> Self {
        let mut defaults = HashMap::new();
        defaults.insert(keys::NTHREADS.to_string(), ParamValue::UInt(0));
        defaults.insert(keys::ENGINE.to_string(), ParamValue::UInt(0));
        defaults.insert(keys::EXTENDED_REPORT.to_string(), ParamValue::Bool(false));
        defaults.insert(keys::EVENT_SOURCE_CHUNKSIZE.to_string(), ParamValue::UInt(1));
        defaults.insert(keys::NEVENTS.to_string(), ParamValue::UInt(0));
        ParameterService {
            values: Mutex::new(defaults),
        }
    }
}

impl ParameterService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<ParamValue> {
        self.values.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.lock().insert(key.into(), value.into());
    }

    /// Only inserts if the key isn't already present -- lets the embedder
    /// register a default without clobbering a value set earlier from the
    /// CLI.
    pub fn set_default(&self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.lock().entry(key.into()).or_insert_with(|| value.into());
    }

    /// All entries whose key starts with `prefix`, e.g. `"log:"`.
    pub fn filter_prefix(&self, prefix: &str) -> Vec<(String, ParamValue)> {
        self.values
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn nthreads(&self) -> usize {
        self.get(keys::NTHREADS)
            .and_then(|v| v.as_uint())
            .unwrap_or(0) as usize
    }

    pub fn event_source_chunksize(&self) -> usize {
        self.get(keys::EVENT_SOURCE_CHUNKSIZE)
            .and_then(|v| v.as_uint())
            .unwrap_or(1) as usize
    }

    pub fn nevents(&self) -> u64 {
        self.get(keys::NEVENTS).and_then(|v| v.as_uint()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overrides_default() {
        let params = ParameterService::new();
        assert_eq!(params.nthreads(), 0);
        params.set(keys::NTHREADS, 4u64);
        assert_eq!(params.nthreads(), 4);
    }

    #[test]
    fn set_default_does_not_clobber() {
        let params = ParameterService::new();
        params.set("custom", "user-value".to_string());
        params.set_default("custom", "plugin-default".to_string());
        assert_eq!(
            params.get("custom").unwrap().as_str().unwrap(),
            "user-value"
        );
    }

    #[test]
    fn prefix_filter_matches_namespace() {
        let params = ParameterService::new();
        params.set("log:debug", "core".to_string());
        params.set("log:off", "dashboard".to_string());
        params.set(keys::NTHREADS, 2u64);
        let matched = params.filter_prefix("log:");
        assert_eq!(matched.len(), 2);
    }
}
