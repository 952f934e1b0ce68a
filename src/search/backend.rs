//! Backend query/response types and the repository handle contract

use crate::search::document::Document;
use crate::search::error::SearchResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

/// Match-all query used when a relevance query has no text
pub const MATCH_ALL: &str = "*:*";

/// Raw backend result row
pub type BackendDocument = Map<String, Value>;

/// Query parser the backend applies to `q`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryParser {
    /// Relevance-boosted user query parser
    #[default]
    Dismax,
    /// Standard backend syntax
    Standard,
}

impl QueryParser {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryParser::Dismax => "dismax",
            QueryParser::Standard => "lucene",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Concrete backend query produced by the translator
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendQuery {
    pub query: Option<String>,
    pub parser: QueryParser,
    pub start: u64,
    pub rows: u64,
    pub filter_queries: Vec<String>,
    pub sort: Vec<(String, SortOrder)>,

    /// Facet counting switch; off means no facet parameters at all
    pub facet: bool,
    /// Facet fields, optionally prefixed with an exclusion local param
    pub facet_fields: Vec<String>,
    pub facet_queries: Vec<String>,

    /// Returned fields; `None` keeps the backend default set
    pub fields: Option<String>,
    pub debug: bool,
}

impl BackendQuery {
    /// Request parameters in wire order
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = Vec::new();
        let mut push = |k: &str, v: String| params.push((k.to_string(), v));

        let text = self.query.as_deref().filter(|q| !q.trim().is_empty());
        match (self.parser, text) {
            (QueryParser::Dismax, Some(q)) => push("q", q.to_string()),
            (QueryParser::Dismax, None) => push("q.alt", MATCH_ALL.to_string()),
            (QueryParser::Standard, q) => push("q", q.unwrap_or(MATCH_ALL).to_string()),
        }
        push("defType", self.parser.as_str().to_string());
        push("start", self.start.to_string());
        push("rows", self.rows.to_string());

        for fq in &self.filter_queries {
            push("fq", fq.clone());
        }

        if !self.sort.is_empty() {
            let sort = self
                .sort
                .iter()
                .map(|(field, order)| format!("{} {}", field, order.as_str()))
                .collect::<Vec<_>>()
                .join(",");
            push("sort", sort);
        }

        if self.facet {
            push("facet", "true".to_string());
            for field in &self.facet_fields {
                push("facet.field", field.clone());
            }
            for query in &self.facet_queries {
                push("facet.query", query.clone());
            }
        } else {
            push("facet", "false".to_string());
        }

        if let Some(ref fields) = self.fields {
            push("fl", fields.clone());
        }
        if self.debug {
            push("debugQuery", "true".to_string());
        }

        params
    }
}

/// Counts of one faceted field
#[derive(Debug, Clone, PartialEq)]
pub struct FacetField {
    pub name: String,
    pub values: Vec<FacetCount>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacetCount {
    pub name: String,
    pub count: u64,
}

/// Backend response in domain terms
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendResponse {
    /// Backend-reported query time in milliseconds
    pub q_time: u64,
    pub num_found: u64,
    pub start: u64,
    pub docs: Vec<BackendDocument>,
    pub facet_fields: Vec<FacetField>,
    /// Facet query counts keyed by the query string, in response order
    pub facet_queries: Vec<(String, u64)>,
}

/// Handle to a search backend
#[async_trait]
pub trait SearchRepository: Send + Sync {
    /// Execute a query
    async fn query(&self, query: &BackendQuery) -> SearchResult<BackendResponse>;

    /// Add or overwrite documents; visible after the next commit
    async fn add(&self, documents: &[Document]) -> SearchResult<()>;

    /// Add or overwrite documents and have the backend commit within the deadline
    async fn add_with_commit_within(
        &self,
        documents: &[Document],
        commit_within: Duration,
    ) -> SearchResult<()>;

    async fn commit(&self) -> SearchResult<()>;

    async fn optimize(&self) -> SearchResult<()>;
}
