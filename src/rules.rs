use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One compliance rule as loaded from the rule file. Every field is optional;
/// the analyzer substitutes generic defaults when formatting findings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub clause_id: Option<String>,
}

/// Immutable rule-key → rule mapping, loaded once at startup and shared
/// read-only for the process lifetime.
#[derive(Debug, Default)]
pub struct RuleCatalog {
    rules: HashMap<String, Rule>,
}

impl RuleCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the catalog from a JSON file, or return an empty catalog when the
    /// file is missing or unparseable. The analyzer copes with an empty
    /// catalog through its formatting defaults.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => match Self::from_json_str(&content) {
                Ok(catalog) => {
                    tracing::info!(path = %path.display(), rules = catalog.len(), "rule catalog loaded");
                    catalog
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "rule file unparseable, using defaults");
                    Self::empty()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "rule file unreadable, using defaults");
                Self::empty()
            }
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        let rules: HashMap<String, Rule> = serde_json::from_str(content)?;
        Ok(Self { rules })
    }

    /// Look up a rule; unknown keys yield the all-defaults record.
    pub fn get(&self, key: &str) -> Rule {
        self.rules.get(key).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
