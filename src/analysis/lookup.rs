//! Diagnostic code descriptions
//!
//! The catalog is a flat JSON object of `code -> description`, e.g. the
//! output of scraping the analyzer's message documentation.

use anyhow::Context;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Returned whenever a code has no description.
pub const DESCRIPTION_NOT_FOUND: &str = "Description not found";

pub trait DiagnosticLookup {
    fn describe(&self, code: &str) -> Option<String>;
}

/// Lookup that never knows anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCatalog;

impl DiagnosticLookup for NoCatalog {
    fn describe(&self, _code: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Default, Clone)]
pub struct CatalogLookup {
    entries: HashMap<String, String>,
}

impl CatalogLookup {
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into().to_ascii_uppercase(), v.into()))
                .collect(),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read diagnostic catalog {}", path.display()))?;
        let entries: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Diagnostic catalog {} is not a JSON object of strings", path.display()))?;
        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DiagnosticLookup for CatalogLookup {
    fn describe(&self, code: &str) -> Option<String> {
        self.entries
            .get(&code.to_ascii_uppercase())
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn catalog_is_case_insensitive_on_codes() {
        let catalog = CatalogLookup::from_entries([("c0114", "Module has no docstring.")]);
        assert_eq!(
            catalog.describe("C0114").as_deref(),
            Some("Module has no docstring.")
        );
        assert_eq!(catalog.describe("W0611"), None);
    }

    #[test]
    fn blank_descriptions_count_as_missing() {
        let catalog = CatalogLookup::from_entries([("C0301", "   ")]);
        assert_eq!(catalog.describe("C0301"), None);
    }

    #[test]
    fn loads_catalog_from_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"{"W0611": "Unused import."}"#).unwrap();
        let catalog = CatalogLookup::load(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.describe("W0611").as_deref(), Some("Unused import."));
    }

    #[test]
    fn malformed_catalog_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(CatalogLookup::load(&path).is_err());
    }
}
