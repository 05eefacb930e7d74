//! Build configuration

use serde::{Deserialize, Serialize};

use crate::error::SemanticResult;

/// Options controlling one semantic build pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildConfig {
    /// Attach source spans to every built value
    pub source_map: bool,
    /// Log the assembled module's dump after the build finishes
    pub dump_semantic_tree: bool,
    /// Allow `try`/`throw` lowering to native exception primitives
    pub enable_exception: bool,
    /// Exported name of the entry function
    pub entry: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_map: false,
            dump_semantic_tree: false,
            enable_exception: false,
            entry: "_entry".to_string(),
        }
    }
}

impl BuildConfig {
    /// Parse a (possibly partial) JSON configuration; missing fields keep
    /// their defaults.
    pub fn from_json(text: &str) -> SemanticResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SemanticError;

    #[test]
    fn test_partial_json() {
        let config = BuildConfig::from_json(r#"{ "sourceMap": true, "entry": "main" }"#).unwrap();
        assert!(config.source_map);
        assert!(!config.enable_exception);
        assert_eq!(config.entry, "main");
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(BuildConfig::from_json("{}").unwrap(), BuildConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        let err = BuildConfig::from_json(r#"{ "sourceMap": 1 }"#).unwrap_err();
        assert!(matches!(err, SemanticError::Config(_)));
    }
}
