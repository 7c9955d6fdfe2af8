//! Versioned rule-set catalog with fallback on runtime failure.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::rules::{RuleSet, RuleSetExtractor};
use super::{ExtractionStrategy, ResultItem};
use crate::errors::ExtractionError;
use crate::routing::SiteOptions;

/// Option key selecting a catalog label per request.
pub const LABEL_OPTION: &str = "label";

struct Entry {
    extractor: Arc<RuleSetExtractor>,
    failure: Option<String>,
}

/// Summary of one registered version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSetVersion {
    /// Version number.
    pub version: u32,
    /// Recorded runtime failure, if any.
    pub failure: Option<String>,
}

/// Rule sets per label, newest version first.
#[derive(Default)]
pub struct RuleSetCatalog {
    entries: RwLock<HashMap<String, Vec<Entry>>>,
}

impl RuleSetCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies, compiles and stores a sealed rule set.
    ///
    /// Registering an existing version replaces it and clears its failure.
    pub fn register(&self, rule_set: RuleSet) -> Result<(), ExtractionError> {
        let extractor = Arc::new(RuleSetExtractor::new(rule_set)?);
        let label = extractor.rule_set().label.clone();
        let version = extractor.rule_set().version;

        let mut entries = self.entries.write();
        let versions = entries.entry(label.clone()).or_default();
        versions.retain(|e| e.extractor.rule_set().version != version);
        versions.push(Entry {
            extractor,
            failure: None,
        });
        versions.sort_by(|a, b| b.extractor.rule_set().version.cmp(&a.extractor.rule_set().version));

        tracing::info!(label = %label, version, "Registered rule set");
        Ok(())
    }

    /// Newest version of `label` with no recorded failure.
    #[must_use]
    pub fn latest_valid(&self, label: &str) -> Option<Arc<RuleSetExtractor>> {
        self.entries
            .read()
            .get(label)?
            .iter()
            .find(|e| e.failure.is_none())
            .map(|e| e.extractor.clone())
    }

    /// Records a runtime failure so later lookups skip this version.
    pub fn mark_failed(&self, label: &str, version: u32, error: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries
            .get_mut(label)
            .and_then(|v| v.iter_mut().find(|e| e.extractor.rule_set().version == version))
        {
            entry.failure = Some(error.to_string());
            tracing::warn!(label, version, error, "Rule set marked failed");
        }
    }

    /// Registered versions of `label`, newest first.
    #[must_use]
    pub fn versions(&self, label: &str) -> Vec<RuleSetVersion> {
        self.entries
            .read()
            .get(label)
            .map(|v| {
                v.iter()
                    .map(|e| RuleSetVersion {
                        version: e.extractor.rule_set().version,
                        failure: e.failure.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Extraction strategy backed by a [`RuleSetCatalog`].
///
/// Uses the request's `label` option when present, else its own label.
pub struct CatalogExtractor {
    catalog: Arc<RuleSetCatalog>,
    label: String,
}

impl CatalogExtractor {
    /// Creates a strategy for `label`.
    #[must_use]
    pub fn new(catalog: Arc<RuleSetCatalog>, label: impl Into<String>) -> Self {
        Self {
            catalog,
            label: label.into(),
        }
    }
}

impl ExtractionStrategy for CatalogExtractor {
    fn name(&self) -> &str {
        &self.label
    }

    fn extract(
        &self,
        text: &str,
        url: &str,
        options: &SiteOptions,
    ) -> Result<Vec<ResultItem>, ExtractionError> {
        let label = options
            .get_str(LABEL_OPTION)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.label.clone());
        let extractor = self
            .catalog
            .latest_valid(&label)
            .ok_or_else(|| ExtractionError::NoRuleSet(label.clone()))?;

        extractor.extract(text, url, options).map_err(|e| {
            self.catalog
                .mark_failed(&label, extractor.rule_set().version, &e.to_string());
            e
        })
    }
}
