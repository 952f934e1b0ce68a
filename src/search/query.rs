//! Backend-agnostic query model

use crate::search::conventions::{escape_query_chars, facet_field_name, tag_local_param};
use crate::search::error::SearchResult;
use crate::search::facet::{Facet, SelectionStrategy, TermCombination};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of rows when the caller does not set one
pub const DEFAULT_MAX_RESULTS: i64 = 10;

/// Sort direction of a sort field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// How many document fields a result carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ResultProjection {
    /// Backend default field set
    #[default]
    Compact,
    /// All stored fields
    Full,
}

/// Whether a filter keeps or removes matching documents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    Inclusive,
    Exclusive,
}

/// Filter on a single raw attribute value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributeFilter {
    attribute_id: String,
    match_value: String,
    filter_type: FilterType,
}

impl AttributeFilter {
    pub fn new(attribute_id: impl Into<String>) -> Self {
        Self {
            attribute_id: attribute_id.into(),
            match_value: String::new(),
            filter_type: FilterType::default(),
        }
    }

    pub fn match_value(mut self, value: impl Into<String>) -> Self {
        self.match_value = value.into();
        self
    }

    pub fn of_type(mut self, filter_type: FilterType) -> Self {
        self.filter_type = filter_type;
        self
    }

    pub fn attribute_id(&self) -> &str {
        &self.attribute_id
    }

    pub fn value(&self) -> &str {
        &self.match_value
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Backend filter query, `attr:value` or `-attr:value`
    pub fn to_filter_query(&self) -> String {
        let value = escape_query_chars(&self.match_value);
        match self.filter_type {
            FilterType::Exclusive => format!("-{}:{}", self.attribute_id, value),
            FilterType::Inclusive => format!("{}:{}", self.attribute_id, value),
        }
    }
}

/// Selection of one or more values of a facet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetFilter {
    facet: Facet,
    values: Vec<String>,
    selection_strategy: Option<SelectionStrategy>,
    term_combination: Option<TermCombination>,
    filter_type: FilterType,
}

impl FacetFilter {
    pub fn new(facet: Facet) -> Self {
        Self {
            facet,
            values: Vec::with_capacity(1),
            selection_strategy: None,
            term_combination: None,
            filter_type: FilterType::default(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    /// Override the facet's selection strategy
    pub fn select(mut self, strategy: SelectionStrategy) -> Self {
        self.selection_strategy = Some(strategy);
        self
    }

    /// Override the facet's term combination
    pub fn combine_using(mut self, combination: TermCombination) -> Self {
        self.term_combination = Some(combination);
        self
    }

    pub fn of_type(mut self, filter_type: FilterType) -> Self {
        self.filter_type = filter_type;
        self
    }

    pub fn facet(&self) -> &Facet {
        &self.facet
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn selection_strategy(&self) -> SelectionStrategy {
        self.selection_strategy
            .unwrap_or_else(|| self.facet.selection_strategy())
    }

    pub fn term_combination(&self) -> TermCombination {
        self.term_combination
            .unwrap_or_else(|| self.facet.term_combination())
    }

    /// Backend filter query; `None` when no value is selected
    pub fn to_filter_query(&self) -> SearchResult<Option<String>> {
        let attribute_id = self.facet.attribute_id();
        let field = facet_field_name(attribute_id)?;

        let mut q = String::new();
        match self.values.as_slice() {
            [] => return Ok(None),
            values => {
                if self.filter_type == FilterType::Exclusive {
                    q.push('-');
                }
                if self.selection_strategy() == SelectionStrategy::Multi {
                    q.push_str(&tag_local_param(attribute_id));
                }
                q.push_str(&field);
                q.push(':');

                if let [single] = values {
                    q.push_str(&escape_query_chars(single));
                } else {
                    let separator = match self.term_combination() {
                        TermCombination::And => " AND ",
                        TermCombination::Or => " OR ",
                    };
                    let joined = values
                        .iter()
                        .map(|v| escape_query_chars(v))
                        .collect::<Vec<_>>()
                        .join(separator);
                    q.push('(');
                    q.push_str(&joined);
                    q.push(')');
                }
            }
        }

        Ok(Some(q))
    }
}

/// Search query built by
/// [`SearchService::create_query`](crate::search::SearchService::create_query)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Engine instance that created this query
    origin: Uuid,

    query: Option<String>,
    advanced_query: Option<String>,
    start_index: i64,
    max_results: i64,
    filter_queries: Vec<String>,
    attribute_filters: Vec<AttributeFilter>,
    facet_filters: Vec<FacetFilter>,
    sort_fields: Vec<(String, SortDirection)>,
    result_projection: ResultProjection,
}

impl Query {
    pub(crate) fn new(origin: Uuid) -> Self {
        Self {
            origin,
            query: None,
            advanced_query: None,
            start_index: 0,
            max_results: DEFAULT_MAX_RESULTS,
            filter_queries: Vec::new(),
            attribute_filters: Vec::new(),
            facet_filters: Vec::new(),
            sort_fields: Vec::new(),
            result_projection: ResultProjection::default(),
        }
    }

    pub(crate) fn origin(&self) -> Uuid {
        self.origin
    }

    /// Set the free-text user query
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set a backend-native query; an empty string clears it
    pub fn with_advanced_query(mut self, advanced_query: impl Into<String>) -> Self {
        let advanced_query = advanced_query.into();
        self.advanced_query = if advanced_query.is_empty() {
            None
        } else {
            Some(advanced_query)
        };
        self
    }

    pub fn with_start_index(mut self, start_index: i64) -> Self {
        self.start_index = start_index;
        self
    }

    /// Set the page size; negative values are rejected at execution time
    pub fn with_max_results(mut self, max_results: i64) -> Self {
        self.max_results = max_results;
        self
    }

    /// Append a raw backend filter query; blank strings are ignored
    pub fn with_filter_query(mut self, filter_query: impl Into<String>) -> Self {
        let filter_query = filter_query.into();
        if !filter_query.trim().is_empty() {
            self.filter_queries.push(filter_query);
        }
        self
    }

    /// Replace all raw filter queries
    pub fn with_filter_queries<I, S>(mut self, filter_queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_queries.clear();
        for fq in filter_queries {
            self = self.with_filter_query(fq);
        }
        self
    }

    pub fn with_attribute_filter(mut self, filter: AttributeFilter) -> Self {
        self.attribute_filters.push(filter);
        self
    }

    pub fn with_facet_filter(mut self, filter: FacetFilter) -> Self {
        self.facet_filters.push(filter);
        self
    }

    /// Add a sort field; re-adding a field moves it to the end
    pub fn with_sort_field(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        let field = field.into();
        if !field.trim().is_empty() {
            self.sort_fields.retain(|(existing, _)| *existing != field);
            self.sort_fields.push((field, direction));
        }
        self
    }

    /// Replace all sort fields with a single one
    pub fn with_only_sort_field(
        mut self,
        field: impl Into<String>,
        direction: SortDirection,
    ) -> Self {
        self.sort_fields.clear();
        self.with_sort_field(field, direction)
    }

    pub fn with_result_projection(mut self, projection: ResultProjection) -> Self {
        self.result_projection = projection;
        self
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn advanced_query(&self) -> Option<&str> {
        self.advanced_query.as_deref()
    }

    pub fn start_index(&self) -> i64 {
        self.start_index
    }

    pub fn max_results(&self) -> i64 {
        self.max_results
    }

    pub fn filter_queries(&self) -> &[String] {
        &self.filter_queries
    }

    pub fn attribute_filters(&self) -> &[AttributeFilter] {
        &self.attribute_filters
    }

    pub fn facet_filters(&self) -> &[FacetFilter] {
        &self.facet_filters
    }

    pub fn sort_fields(&self) -> &[(String, SortDirection)] {
        &self.sort_fields
    }

    pub fn result_projection(&self) -> ResultProjection {
        self.result_projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query::new(Uuid::new_v4())
    }

    #[test]
    fn test_attribute_filter_rendering() {
        let filter = AttributeFilter::new("color").match_value("blue");
        assert_eq!(filter.to_filter_query(), "color:blue");

        let filter = filter.of_type(FilterType::Exclusive);
        assert_eq!(filter.to_filter_query(), "-color:blue");
    }

    #[test]
    fn test_attribute_filter_escapes_value() {
        let filter = AttributeFilter::new("path").match_value("a:b (c)");
        assert_eq!(filter.to_filter_query(), "path:a\\:b\\ \\(c\\)");
    }

    #[test]
    fn test_facet_filter_multi_or() {
        let facet = Facet::new("size").with_selection_strategy(SelectionStrategy::Multi);
        let filter = FacetFilter::new(facet)
            .with_values(["S", "M"])
            .combine_using(TermCombination::Or);

        assert_eq!(
            filter.to_filter_query().unwrap().as_deref(),
            Some("{!tag=size}size_facet:(S OR M)")
        );
    }

    #[test]
    fn test_facet_filter_single_value() {
        let filter = FacetFilter::new(Facet::new("color")).with_value("dark blue");
        assert_eq!(
            filter.to_filter_query().unwrap().as_deref(),
            Some("color_facet:dark\\ blue")
        );
    }

    #[test]
    fn test_facet_filter_and_exclusive() {
        let facet = Facet::new("tag").with_term_combination(TermCombination::And);
        let filter = FacetFilter::new(facet)
            .with_values(["a", "b", "c"])
            .of_type(FilterType::Exclusive);

        assert_eq!(
            filter.to_filter_query().unwrap().as_deref(),
            Some("-tag_facet:(a AND b AND c)")
        );
    }

    #[test]
    fn test_facet_filter_overrides_facet_defaults() {
        let facet = Facet::new("size")
            .with_selection_strategy(SelectionStrategy::Multi)
            .with_term_combination(TermCombination::And);
        let filter = FacetFilter::new(facet)
            .with_values(["S", "M"])
            .select(SelectionStrategy::Single)
            .combine_using(TermCombination::Or);

        assert_eq!(filter.selection_strategy(), SelectionStrategy::Single);
        assert_eq!(
            filter.to_filter_query().unwrap().as_deref(),
            Some("size_facet:(S OR M)")
        );
    }

    #[test]
    fn test_empty_facet_filter_renders_nothing() {
        let filter = FacetFilter::new(Facet::new("color"));
        assert_eq!(filter.to_filter_query().unwrap(), None);
    }

    #[test]
    fn test_filter_queries_skip_blank() {
        let q = query()
            .with_filter_query("a:1")
            .with_filter_query("   ")
            .with_filter_query("")
            .with_filter_query("b:2");
        assert_eq!(q.filter_queries(), ["a:1", "b:2"]);

        let q = q.with_filter_queries(["c:3", " "]);
        assert_eq!(q.filter_queries(), ["c:3"]);
    }

    #[test]
    fn test_sort_field_reinsert_moves_to_end() {
        let q = query()
            .with_sort_field("price", SortDirection::Ascending)
            .with_sort_field("name", SortDirection::Descending)
            .with_sort_field("price", SortDirection::Descending);

        assert_eq!(
            q.sort_fields(),
            [
                ("name".to_string(), SortDirection::Descending),
                ("price".to_string(), SortDirection::Descending),
            ]
        );

        let q = q.with_only_sort_field("rank", SortDirection::Ascending);
        assert_eq!(q.sort_fields().len(), 1);
    }

    #[test]
    fn test_empty_advanced_query_is_cleared() {
        let q = query().with_advanced_query("title:foo");
        assert_eq!(q.advanced_query(), Some("title:foo"));

        let q = q.with_advanced_query("");
        assert_eq!(q.advanced_query(), None);
    }

    #[test]
    fn test_query_defaults() {
        let q = query();
        assert_eq!(q.start_index(), 0);
        assert_eq!(q.max_results(), DEFAULT_MAX_RESULTS);
        assert_eq!(q.result_projection(), ResultProjection::Compact);
        assert!(q.query().is_none());
    }
}
