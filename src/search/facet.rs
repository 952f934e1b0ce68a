//! Facet definitions and the facet source contract

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Locale key of the default facet name
pub const ROOT_LOCALE: &str = "";

/// Active facets of a scope keyed by attribute id
pub type FacetMap = HashMap<String, Facet>;

/// Whether selecting a value keeps the counts of its sibling values
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Selecting a value narrows the facet's own counts
    #[default]
    Single,
    /// Sibling counts are preserved for further selection
    Multi,
}

/// Operator joining multiple selected values
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TermCombination {
    And,
    #[default]
    Or,
}

/// One labelled backend query of a query facet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetQuery {
    /// Backend query, also the key of the returned count
    pub query: String,

    /// Label shown for the value
    pub label: String,
}

/// A facet dimension, identified by its attribute id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Facet {
    attribute_id: String,
    names: HashMap<String, String>,
    selection_strategy: SelectionStrategy,
    term_combination: TermCombination,
    enabled: bool,
    queries: Vec<FacetQuery>,
}

impl Facet {
    /// Create a field facet over the given attribute
    pub fn new(attribute_id: impl Into<String>) -> Self {
        Self {
            attribute_id: attribute_id.into(),
            names: HashMap::new(),
            selection_strategy: SelectionStrategy::default(),
            term_combination: TermCombination::default(),
            enabled: true,
            queries: Vec::new(),
        }
    }

    /// Set the default (ROOT) name
    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with_localized_name(ROOT_LOCALE, name)
    }

    /// Set the name for a locale tag such as `de` or `en_US`
    pub fn with_localized_name(
        mut self,
        locale: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.names.insert(locale.into(), name.into());
        self
    }

    pub fn with_selection_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.selection_strategy = strategy;
        self
    }

    pub fn with_term_combination(mut self, combination: TermCombination) -> Self {
        self.term_combination = combination;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Turn this facet into a query facet by adding a labelled backend query
    pub fn with_query(mut self, query: impl Into<String>, label: impl Into<String>) -> Self {
        self.queries.push(FacetQuery {
            query: query.into(),
            label: label.into(),
        });
        self
    }

    pub fn attribute_id(&self) -> &str {
        &self.attribute_id
    }

    /// Default name
    pub fn root_name(&self) -> Option<&str> {
        self.names.get(ROOT_LOCALE).map(String::as_str)
    }

    /// First name found in the lookup list, falling back to the default name
    pub fn name(&self, locales: &[&str]) -> Option<&str> {
        locales
            .iter()
            .find_map(|locale| self.names.get(*locale))
            .map(String::as_str)
            .or_else(|| self.root_name())
    }

    pub fn names(&self) -> &HashMap<String, String> {
        &self.names
    }

    /// Label used in results: the default name or the attribute id
    pub fn label(&self) -> &str {
        self.root_name().unwrap_or(&self.attribute_id)
    }

    pub fn selection_strategy(&self) -> SelectionStrategy {
        self.selection_strategy
    }

    pub fn term_combination(&self) -> TermCombination {
        self.term_combination
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Labelled queries; empty for field facets
    pub fn queries(&self) -> &[FacetQuery] {
        &self.queries
    }

    pub fn is_query_facet(&self) -> bool {
        !self.queries.is_empty()
    }
}

/// Facet configuration entry as read from the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetDefinition {
    pub attribute_id: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Additional names keyed by locale tag
    #[serde(default)]
    pub names: HashMap<String, String>,

    #[serde(default)]
    pub selection_strategy: SelectionStrategy,

    #[serde(default)]
    pub term_combination: TermCombination,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub queries: Vec<FacetQuery>,
}

fn default_true() -> bool {
    true
}

impl From<FacetDefinition> for Facet {
    fn from(def: FacetDefinition) -> Self {
        let mut facet = Facet::new(def.attribute_id)
            .with_selection_strategy(def.selection_strategy)
            .with_term_combination(def.term_combination)
            .with_enabled(def.enabled);
        if let Some(name) = def.name {
            facet = facet.with_name(name);
        }
        for (locale, name) in def.names {
            facet = facet.with_localized_name(locale, name);
        }
        for q in def.queries {
            facet = facet.with_query(q.query, q.label);
        }
        facet
    }
}

/// Recoverable failure reading facet configuration
#[derive(Debug, Clone, thiserror::Error)]
#[error("Facet model unavailable: {0}")]
pub struct FacetSourceError(pub String);

/// Context-scoped source of facet definitions
#[async_trait]
pub trait FacetSource: Send + Sync {
    /// Current facets of a scope.
    ///
    /// `Ok(None)` means no facet manager is configured for the scope.
    async fn get_facets(&self, scope: &str) -> Result<Option<FacetMap>, FacetSourceError>;
}

#[derive(Debug, Default)]
struct StaticFacetState {
    scopes: HashMap<String, FacetMap>,
    failure: Option<String>,
}

/// Facet source backed by a mutex-protected map
#[derive(Debug, Clone, Default)]
pub struct StaticFacetSource {
    state: Arc<Mutex<StaticFacetState>>,
}

impl StaticFacetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source holding the configured facets for one scope
    pub fn from_definitions(
        scope: impl Into<String>,
        definitions: impl IntoIterator<Item = FacetDefinition>,
    ) -> Self {
        let source = Self::new();
        let scope = scope.into();
        source.configure_scope(&scope);
        for def in definitions {
            source.put(&scope, def.into());
        }
        source
    }

    /// Make the scope known even when it has no facets yet
    pub fn configure_scope(&self, scope: &str) {
        self.state
            .lock()
            .scopes
            .entry(scope.to_string())
            .or_default();
    }

    /// Add or replace a facet
    pub fn put(&self, scope: &str, facet: Facet) {
        self.state
            .lock()
            .scopes
            .entry(scope.to_string())
            .or_default()
            .insert(facet.attribute_id().to_string(), facet);
    }

    pub fn remove(&self, scope: &str, attribute_id: &str) -> Option<Facet> {
        self.state
            .lock()
            .scopes
            .get_mut(scope)
            .and_then(|facets| facets.remove(attribute_id))
    }

    /// Drop the scope so it reads as unconfigured
    pub fn unconfigure_scope(&self, scope: &str) {
        self.state.lock().scopes.remove(scope);
    }

    /// Make every read fail until cleared with `None`
    pub fn set_failure(&self, message: Option<String>) {
        self.state.lock().failure = message;
    }
}

#[async_trait]
impl FacetSource for StaticFacetSource {
    async fn get_facets(&self, scope: &str) -> Result<Option<FacetMap>, FacetSourceError> {
        let state = self.state.lock();
        if let Some(ref message) = state.failure {
            return Err(FacetSourceError(message.clone()));
        }
        Ok(state.scopes.get(scope).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facet_defaults() {
        let facet = Facet::new("color");
        assert_eq!(facet.selection_strategy(), SelectionStrategy::Single);
        assert_eq!(facet.term_combination(), TermCombination::Or);
        assert!(facet.is_enabled());
        assert!(!facet.is_query_facet());
        assert_eq!(facet.label(), "color");
    }

    #[test]
    fn test_localized_name_lookup() {
        let facet = Facet::new("color")
            .with_name("Color")
            .with_localized_name("de", "Farbe");

        assert_eq!(facet.name(&["de"]), Some("Farbe"));
        assert_eq!(facet.name(&["fr", "de"]), Some("Farbe"));
        assert_eq!(facet.name(&["fr"]), Some("Color"));
        assert_eq!(facet.label(), "Color");
    }

    #[test]
    fn test_definition_conversion() {
        let def = FacetDefinition {
            attribute_id: "price".to_string(),
            name: Some("Price".to_string()),
            names: HashMap::new(),
            selection_strategy: SelectionStrategy::Multi,
            term_combination: TermCombination::And,
            enabled: true,
            queries: vec![FacetQuery {
                query: "price:[0 TO 10]".to_string(),
                label: "cheap".to_string(),
            }],
        };

        let facet: Facet = def.into();
        assert_eq!(facet.attribute_id(), "price");
        assert_eq!(facet.label(), "Price");
        assert_eq!(facet.selection_strategy(), SelectionStrategy::Multi);
        assert_eq!(facet.term_combination(), TermCombination::And);
        assert!(facet.is_query_facet());
    }

    #[tokio::test]
    async fn test_static_source_scopes() {
        let source = StaticFacetSource::new();
        assert!(source.get_facets("shop").await.unwrap().is_none());

        source.configure_scope("shop");
        assert!(source.get_facets("shop").await.unwrap().unwrap().is_empty());

        source.put("shop", Facet::new("color"));
        let facets = source.get_facets("shop").await.unwrap().unwrap();
        assert!(facets.contains_key("color"));

        assert!(source.remove("shop", "color").is_some());
        source.unconfigure_scope("shop");
        assert!(source.get_facets("shop").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_static_source_failure() {
        let source = StaticFacetSource::new();
        source.set_failure(Some("store offline".to_string()));
        assert!(source.get_facets("shop").await.is_err());

        source.set_failure(None);
        assert!(source.get_facets("shop").await.is_ok());
    }
}
