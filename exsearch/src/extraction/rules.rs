//! Declarative extraction rule sets.
//!
//! A rule set is data, not code: an item selector plus one rule per output
//! field. Rule sets are produced offline, sealed with a SHA-256 digest of
//! their canonical JSON, and refused at load time if the digest does not
//! match.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

use super::{ExtractionStrategy, ResultItem};
use crate::errors::ExtractionError;
use crate::routing::SiteOptions;

/// How a matched string becomes a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Whitespace-collapsed text.
    #[default]
    Text,
    /// All digits joined, e.g. `"¥1,980"` -> 1980.
    Price,
    /// First run of digits.
    Integer,
    /// Resolved against the page URL.
    Url,
    /// Whether the selector matched.
    Exists,
}

/// Rule for one field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldRule {
    /// Selector relative to the item; `None` targets the item itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Attribute to read instead of text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Conversion.
    #[serde(default)]
    pub kind: ValueKind,
    /// Regex applied to the raw string; group 1 wins when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Fail the extraction when the value is missing.
    #[serde(default)]
    pub required: bool,
}

impl FieldRule {
    /// Text of the first element matching `selector`.
    #[must_use]
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Self::default()
        }
    }

    /// Attribute of the first element matching `selector`.
    #[must_use]
    pub fn attr(selector: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            attribute: Some(attribute.into()),
            ..Self::default()
        }
    }

    /// Sets the conversion.
    #[must_use]
    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets a regex filter.
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Marks the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A versioned, sealed set of extraction rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Site or page family the rules target.
    pub label: String,
    /// Monotonic version.
    pub version: u32,
    /// Selector matching one element per result item.
    pub item_selector: String,
    /// Rules for [`ResultItem`] fields, keyed by field name.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldRule>,
    /// Rules for entries of [`ResultItem::others`].
    #[serde(default)]
    pub extras: BTreeMap<String, FieldRule>,
    /// Hex SHA-256 of the canonical rule JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Field names a rule set may target.
pub const ITEM_FIELDS: &[&str] = &[
    "title",
    "price",
    "condition",
    "on_sale",
    "is_success",
    "image_url",
    "stock_quantity",
    "point",
    "detail_url",
];

impl RuleSet {
    /// Creates an unsealed rule set.
    #[must_use]
    pub fn new(label: impl Into<String>, version: u32, item_selector: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            version,
            item_selector: item_selector.into(),
            fields: BTreeMap::new(),
            extras: BTreeMap::new(),
            digest: None,
        }
    }

    /// Adds a field rule.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    /// Adds an extra rule.
    #[must_use]
    pub fn with_extra(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.extras.insert(name.into(), rule);
        self
    }

    /// Computes the digest of the rule content.
    #[must_use]
    pub fn compute_digest(&self) -> String {
        let unsealed = Self {
            digest: None,
            ..self.clone()
        };
        let canonical = serde_json::to_string(&unsealed).unwrap_or_default();
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Stores the digest.
    #[must_use]
    pub fn seal(mut self) -> Self {
        self.digest = Some(self.compute_digest());
        self
    }

    /// Checks the stored digest against the content.
    pub fn verify(&self) -> Result<(), ExtractionError> {
        match self.digest {
            Some(ref digest) if *digest == self.compute_digest() => Ok(()),
            _ => Err(ExtractionError::Integrity {
                label: self.label.clone(),
                version: self.version,
            }),
        }
    }

    /// Parses a JSON artifact.
    pub fn from_json(json: &str) -> Result<Self, ExtractionError> {
        serde_json::from_str(json).map_err(|e| ExtractionError::Parse(e.to_string()))
    }
}

struct CompiledRule {
    name: String,
    selector: Option<Selector>,
    attribute: Option<String>,
    kind: ValueKind,
    pattern: Option<Regex>,
    required: bool,
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|e| ExtractionError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

impl CompiledRule {
    fn compile(name: &str, rule: &FieldRule) -> Result<Self, ExtractionError> {
        let selector = rule.selector.as_deref().map(parse_selector).transpose()?;
        let pattern = rule
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ExtractionError::Parse(format!("invalid pattern for '{name}': {e}")))?;
        Ok(Self {
            name: name.to_string(),
            selector,
            attribute: rule.attribute.clone(),
            kind: rule.kind,
            pattern,
            required: rule.required,
        })
    }

    fn target<'a>(&self, item: ElementRef<'a>) -> Option<ElementRef<'a>> {
        match self.selector {
            Some(ref selector) => item.select(selector).next(),
            None => Some(item),
        }
    }

    fn raw(&self, element: ElementRef<'_>) -> Option<String> {
        let raw = match self.attribute {
            Some(ref attr) => element.value().attr(attr)?.trim().to_string(),
            None => element
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        };
        match self.pattern {
            Some(ref re) => {
                let caps = re.captures(&raw)?;
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().trim().to_string())
            }
            None => Some(raw),
        }
    }

    fn evaluate(&self, item: ElementRef<'_>, base: Option<&Url>) -> Option<Value> {
        let target = self.target(item);
        if self.kind == ValueKind::Exists {
            return Some(Value::Bool(target.is_some()));
        }
        let raw = self.raw(target?)?;
        if raw.is_empty() {
            return None;
        }
        match self.kind {
            ValueKind::Text => Some(Value::String(raw)),
            ValueKind::Price => {
                let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
                digits.parse::<i64>().ok().map(Value::from)
            }
            ValueKind::Integer => {
                let digits: String = raw
                    .chars()
                    .skip_while(|c| !c.is_ascii_digit())
                    .take_while(char::is_ascii_digit)
                    .collect();
                digits.parse::<i64>().ok().map(Value::from)
            }
            ValueKind::Url => {
                let resolved = match base {
                    Some(base) => base.join(&raw).map(String::from).unwrap_or(raw),
                    None => raw,
                };
                Some(Value::String(resolved))
            }
            ValueKind::Exists => None,
        }
    }
}

/// Applies one rule set with CSS selectors.
pub struct RuleSetExtractor {
    rule_set: RuleSet,
    name: String,
    item_selector: Selector,
    fields: Vec<CompiledRule>,
    extras: Vec<CompiledRule>,
}

impl RuleSetExtractor {
    /// Verifies and compiles a sealed rule set.
    pub fn new(rule_set: RuleSet) -> Result<Self, ExtractionError> {
        rule_set.verify()?;
        Self::compile(rule_set)
    }

    /// Compiles a rule set without checking its digest.
    pub fn compile(rule_set: RuleSet) -> Result<Self, ExtractionError> {
        if let Some(unknown) = rule_set
            .fields
            .keys()
            .find(|k| !ITEM_FIELDS.contains(&k.as_str()))
        {
            return Err(ExtractionError::Parse(format!("unknown item field '{unknown}'")));
        }

        let item_selector = parse_selector(&rule_set.item_selector)?;
        let fields = rule_set
            .fields
            .iter()
            .map(|(name, rule)| CompiledRule::compile(name, rule))
            .collect::<Result<Vec<_>, _>>()?;
        let extras = rule_set
            .extras
            .iter()
            .map(|(name, rule)| CompiledRule::compile(name, rule))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: format!("rules:{}@v{}", rule_set.label, rule_set.version),
            rule_set,
            item_selector,
            fields,
            extras,
        })
    }

    /// The rule set being applied.
    #[must_use]
    pub fn rule_set(&self) -> &RuleSet {
        &self.rule_set
    }

    fn build_item(&self, element: ElementRef<'_>, base: Option<&Url>) -> Result<Option<ResultItem>, ExtractionError> {
        let mut item = ResultItem {
            is_success: true,
            ..ResultItem::default()
        };

        for rule in &self.fields {
            let Some(value) = rule.evaluate(element, base) else {
                if rule.required {
                    return Err(ExtractionError::Parse(format!(
                        "required field '{}' missing in {}",
                        rule.name, self.name
                    )));
                }
                continue;
            };
            match rule.name.as_str() {
                "title" => item.title = value_to_string(&value),
                "price" => item.price = value.as_i64(),
                "condition" => item.condition = value_to_string(&value),
                "on_sale" => item.on_sale = value_to_bool(&value),
                "is_success" => item.is_success = value_to_bool(&value),
                "image_url" => item.image_url = value_to_string(&value),
                "stock_quantity" => item.stock_quantity = value.as_i64().unwrap_or(0),
                "point" => item.point = value.as_i64().unwrap_or(0),
                "detail_url" => item.detail_url = value_to_string(&value),
                _ => {}
            }
        }

        let mut others = Map::new();
        for rule in &self.extras {
            if let Some(value) = rule.evaluate(element, base) {
                others.insert(rule.name.clone(), value);
            } else if rule.required {
                return Err(ExtractionError::Parse(format!(
                    "required field '{}' missing in {}",
                    rule.name, self.name
                )));
            }
        }
        item.others = others;

        if item.title.is_empty() {
            return Ok(None);
        }
        Ok(Some(item))
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => crate::routing::is_truthy(other),
    }
}

impl ExtractionStrategy for RuleSetExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(
        &self,
        text: &str,
        url: &str,
        _options: &SiteOptions,
    ) -> Result<Vec<ResultItem>, ExtractionError> {
        let document = Html::parse_document(text);
        let base = Url::parse(url).ok();

        let mut items = Vec::new();
        for element in document.select(&self.item_selector) {
            if let Some(item) = self.build_item(element, base.as_ref())? {
                items.push(item);
            }
        }
        Ok(items)
    }
}
