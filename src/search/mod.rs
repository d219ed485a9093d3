//! Named recognition searches.
//!
//! A search is a named decoder configuration (grammar or keyword resource
//! plus tuning) registered once at startup. The registry tracks the set and
//! validates names before the engine is asked to arm one.

use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration payload for one named search. Opaque to the session core;
/// the engine consumes it during initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Unique search name, the key used to arm the decoder.
    pub name: String,
    /// Grammar or keyword resource, relative to the resource directory.
    pub grammar: PathBuf,
    /// Threshold balancing keyphrase false alarms against misses.
    pub keyword_threshold: f32,
}

impl SearchConfig {
    pub fn new(name: impl Into<String>, grammar: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            grammar: grammar.into(),
            keyword_threshold: 1e-20,
        }
    }
}

/// A search name that was never registered.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unknown search '{0}'")]
pub struct UnknownSearchError(pub String);

/// The set of searches available to the session. Fixed once registered;
/// there is no deletion.
#[derive(Debug, Default)]
pub struct SearchRegistry {
    searches: HashMap<String, SearchConfig>,
}

impl SearchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a search. Re-registering a name overwrites its config.
    pub fn register(&mut self, config: SearchConfig) {
        self.searches.insert(config.name.clone(), config);
    }

    pub fn get(&self, name: &str) -> Result<&SearchConfig, UnknownSearchError> {
        self.searches
            .get(name)
            .ok_or_else(|| UnknownSearchError(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.searches.keys().cloned().collect()
    }

    /// All registered configs, for handing to the engine loader.
    pub fn configs(&self) -> Vec<SearchConfig> {
        self.searches.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = SearchRegistry::new();
        registry.register(SearchConfig::new("colors", "colors.gram"));

        let config = registry.get("colors").unwrap();
        assert_eq!(config.grammar, PathBuf::from("colors.gram"));
    }

    #[test]
    fn test_get_unknown_search() {
        let registry = SearchRegistry::new();
        let err = registry.get("digits").unwrap_err();
        assert_eq!(err, UnknownSearchError("digits".to_string()));
    }

    #[test]
    fn test_register_overwrites() {
        let mut registry = SearchRegistry::new();
        registry.register(SearchConfig::new("colors", "colors.gram"));
        registry.register(SearchConfig::new("colors", "colors-kws.gram"));

        assert_eq!(registry.names(), vec!["colors".to_string()]);
        let config = registry.get("colors").unwrap();
        assert_eq!(config.grammar, PathBuf::from("colors-kws.gram"));
    }
}
