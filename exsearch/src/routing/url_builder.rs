//! Keyword to search-URL resolution.

use url::Url;

use super::options::{is_truthy, SiteOptions};
use crate::errors::SearchError;

/// Builds a search URL from a keyword.
pub trait UrlBuilder: Send + Sync {
    /// Returns the search URL for `keyword`.
    fn build(&self, keyword: &str, options: &SiteOptions) -> Result<String, SearchError>;
}

/// An option key copied into the query string when truthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionParam {
    /// Key in [`SiteOptions`].
    pub option: String,
    /// Query parameter name.
    pub param: String,
    /// Require an integer value.
    pub integer: bool,
}

impl OptionParam {
    /// Copies `option` as-is under the same name.
    #[must_use]
    pub fn any(option: impl Into<String>) -> Self {
        let option = option.into();
        Self {
            param: option.clone(),
            option,
            integer: false,
        }
    }

    /// Copies `option` as an integer under the same name.
    #[must_use]
    pub fn integer(option: impl Into<String>) -> Self {
        Self {
            integer: true,
            ..Self::any(option)
        }
    }

    /// Renames the query parameter.
    #[must_use]
    pub fn as_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }
}

/// Builds `<base_url>?<fixed params>&<option params>&<keyword param>=<keyword>`.
#[derive(Debug, Clone)]
pub struct QueryUrlBuilder {
    base_url: Url,
    keyword_param: String,
    fixed_params: Vec<(String, String)>,
    option_params: Vec<OptionParam>,
}

impl QueryUrlBuilder {
    /// Creates a builder for `base_url`.
    pub fn new(base_url: &str, keyword_param: impl Into<String>) -> Result<Self, SearchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SearchError::Config(format!("invalid base url '{base_url}': {e}")))?;
        Ok(Self {
            base_url,
            keyword_param: keyword_param.into(),
            fixed_params: Vec::new(),
            option_params: Vec::new(),
        })
    }

    /// Adds a parameter sent with every query.
    #[must_use]
    pub fn with_fixed_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fixed_params.push((key.into(), value.into()));
        self
    }

    /// Whitelists an option key.
    #[must_use]
    pub fn with_option_param(mut self, param: OptionParam) -> Self {
        self.option_params.push(param);
        self
    }

    fn option_pairs(&self, options: &SiteOptions) -> Result<Vec<(String, String)>, SearchError> {
        let mut pairs = Vec::new();
        for entry in &self.option_params {
            let Some(value) = options.get(&entry.option).filter(|v| is_truthy(v)) else {
                continue;
            };
            let rendered = if entry.integer {
                options
                    .get_i64(&entry.option)
                    .ok_or_else(|| {
                        SearchError::validation(format!(
                            "option '{}' must be an integer, got {value}",
                            entry.option
                        ))
                    })?
                    .to_string()
            } else {
                match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Bool(_) => "1".to_string(),
                    other => other.to_string(),
                }
            };
            pairs.push((entry.param.clone(), rendered));
        }
        Ok(pairs)
    }
}

impl UrlBuilder for QueryUrlBuilder {
    fn build(&self, keyword: &str, options: &SiteOptions) -> Result<String, SearchError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(SearchError::validation("search keyword is empty"));
        }

        let option_pairs = self.option_pairs(options)?;
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in self.fixed_params.iter().chain(option_pairs.iter()) {
                query.append_pair(k, v);
            }
            query.append_pair(&self.keyword_param, keyword);
        }
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> QueryUrlBuilder {
        QueryUrlBuilder::new("https://shop.example/search", "keyword")
            .unwrap()
            .with_fixed_param("search", "x")
            .with_option_param(OptionParam::any("order_by"))
            .with_option_param(OptionParam::any("is_akiba").as_param("akiba"))
            .with_option_param(OptionParam::integer("display_count"))
    }

    #[test]
    fn test_only_truthy_whitelisted_options_are_copied() {
        let options = SiteOptions::from_value(json!({
            "order_by": "price",
            "is_akiba": false,
            "display_count": "50",
            "unknown": "ignored"
        }));

        let url = builder().build("ps5 pro", &options).unwrap();
        assert_eq!(
            url,
            "https://shop.example/search?search=x&order_by=price&display_count=50&keyword=ps5+pro"
        );
    }

    #[test]
    fn test_bool_option_renders_as_flag() {
        let options = SiteOptions::new().with("is_akiba", true);
        let url = builder().build("switch", &options).unwrap();
        assert!(url.contains("akiba=1"));
    }

    #[test]
    fn test_integer_option_rejects_text() {
        let options = SiteOptions::new().with("display_count", "many");
        let err = builder().build("switch", &options).unwrap_err();
        assert!(err.to_string().contains("display_count"));
    }

    #[test]
    fn test_empty_keyword() {
        assert!(builder().build("  ", &SiteOptions::new()).is_err());
    }
}
