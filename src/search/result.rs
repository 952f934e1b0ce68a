//! Backend-agnostic query results

use crate::search::backend::BackendResponse;
use crate::search::conventions::{escape_query_chars, facet_attribute_id};
use crate::search::document::Document;
use crate::search::facet::{Facet, FacetMap, FacetQuery};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One facet value with its count and the filter selecting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFacetValue {
    pub value: String,
    pub count: u64,
    /// Backend filter fragment narrowing to this value
    pub filter: String,
}

/// Facet counts of one facet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFacet {
    pub id: String,
    pub label: String,
    pub values: Vec<ResultFacetValue>,
}

impl ResultFacet {
    fn new(facet: &Facet) -> Self {
        Self {
            id: facet.attribute_id().to_string(),
            label: facet.label().to_string(),
            values: Vec::new(),
        }
    }

    pub fn value(&self, value: &str) -> Option<&ResultFacetValue> {
        self.values.iter().find(|v| v.value == value)
    }
}

/// Result of one query; documents and facets are built on first access
#[derive(Debug)]
pub struct QueryResult {
    response: BackendResponse,
    facet_model: Arc<FacetMap>,
    documents: OnceCell<Vec<Document>>,
    facets: OnceCell<HashMap<String, ResultFacet>>,
}

impl QueryResult {
    pub fn new(response: BackendResponse, facet_model: Arc<FacetMap>) -> Self {
        Self {
            response,
            facet_model,
            documents: OnceCell::new(),
            facets: OnceCell::new(),
        }
    }

    pub fn num_found(&self) -> u64 {
        self.response.num_found
    }

    pub fn start_offset(&self) -> u64 {
        self.response.start
    }

    pub fn query_time(&self) -> Duration {
        Duration::from_millis(self.response.q_time)
    }

    /// Number of rows in this page
    pub fn len(&self) -> usize {
        self.response.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.response.docs.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        self.documents.get_or_init(|| {
            self.response
                .docs
                .iter()
                .map(Document::from_backend_fields)
                .collect()
        })
    }

    /// Facets with at least one non-zero value, keyed by facet id
    pub fn facets(&self) -> &HashMap<String, ResultFacet> {
        self.facets.get_or_init(|| self.build_facets())
    }

    pub fn facet(&self, id: &str) -> Option<&ResultFacet> {
        self.facets().get(id)
    }

    fn build_facets(&self) -> HashMap<String, ResultFacet> {
        let mut facets: HashMap<String, ResultFacet> = HashMap::new();

        for field in &self.response.facet_fields {
            let field_name = strip_local_params(&field.name);
            let Some(facet) = self.facet_model.get(facet_attribute_id(field_name)) else {
                continue;
            };

            let values = field
                .values
                .iter()
                .filter(|v| v.count > 0)
                .map(|v| ResultFacetValue {
                    value: v.name.clone(),
                    count: v.count,
                    filter: format!("{}:{}", field_name, escape_query_chars(&v.name)),
                });

            facets
                .entry(facet.attribute_id().to_string())
                .or_insert_with(|| ResultFacet::new(facet))
                .values
                .extend(values);
        }

        // The backend reports one count per distinct query string, which may
        // be shared by several facets.
        let mut query_index: HashMap<&str, Vec<(&Facet, &FacetQuery)>> = HashMap::new();
        for facet in self.facet_model.values() {
            for facet_query in facet.queries() {
                query_index
                    .entry(facet_query.query.as_str())
                    .or_default()
                    .push((facet, facet_query));
            }
        }

        for (key, count) in &self.response.facet_queries {
            if *count == 0 {
                continue;
            }
            let Some(owners) = query_index.get(strip_local_params(key)) else {
                continue;
            };

            for (facet, facet_query) in owners {
                facets
                    .entry(facet.attribute_id().to_string())
                    .or_insert_with(|| ResultFacet::new(facet))
                    .values
                    .push(ResultFacetValue {
                        value: facet_query.label.clone(),
                        count: *count,
                        filter: facet_query.query.clone(),
                    });
            }
        }

        facets.retain(|_, facet| !facet.values.is_empty());
        facets
    }
}

/// Drop a leading `{!...}` local-params block
fn strip_local_params(name: &str) -> &str {
    if name.starts_with("{!") {
        if let Some(end) = name.find('}') {
            return &name[end + 1..];
        }
    }
    name
}
