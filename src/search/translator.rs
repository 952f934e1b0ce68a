//! Translation of [`Query`] into a [`BackendQuery`]

use crate::search::backend::{BackendQuery, QueryParser, SortOrder};
use crate::search::conventions::{exclude_local_param, facet_field_name};
use crate::search::error::{SearchError, SearchResult};
use crate::search::facet::{FacetMap, SelectionStrategy};
use crate::search::query::{Query, ResultProjection, SortDirection};
use uuid::Uuid;

/// Field list requesting every stored field
pub const ALL_FIELDS: &str = "*";

/// Translates queries created by one engine instance
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    origin: Uuid,
    debug: bool,
}

impl QueryTranslator {
    pub fn new(origin: Uuid, debug: bool) -> Self {
        Self { origin, debug }
    }

    /// Build the backend query for `query` against the active facet set.
    ///
    /// Facet counting is switched off entirely when `facets` is empty.
    pub fn translate(&self, query: &Query, facets: &FacetMap) -> SearchResult<BackendQuery> {
        if query.origin() != self.origin {
            return Err(SearchError::InvalidQuery(
                "query was not created by this search service".to_string(),
            ));
        }
        let rows = u64::try_from(query.max_results()).map_err(|_| {
            SearchError::InvalidArgument(format!(
                "max results must not be negative: {}",
                query.max_results()
            ))
        })?;
        let start = u64::try_from(query.start_index()).map_err(|_| {
            SearchError::InvalidArgument(format!(
                "start index must not be negative: {}",
                query.start_index()
            ))
        })?;

        let mut backend = BackendQuery {
            start,
            rows,
            debug: self.debug,
            ..BackendQuery::default()
        };

        match query.advanced_query() {
            Some(advanced) => {
                backend.query = Some(advanced.to_string());
                backend.parser = QueryParser::Standard;
            }
            None => {
                backend.query = query.query().map(str::to_string);
                backend.parser = QueryParser::Dismax;
            }
        }

        backend
            .filter_queries
            .extend(query.filter_queries().iter().cloned());

        backend.sort = query
            .sort_fields()
            .iter()
            .map(|(field, direction)| {
                let order = match direction {
                    SortDirection::Ascending => SortOrder::Asc,
                    SortDirection::Descending => SortOrder::Desc,
                };
                (field.clone(), order)
            })
            .collect();

        for filter in query.attribute_filters() {
            backend.filter_queries.push(filter.to_filter_query());
        }
        for filter in query.facet_filters() {
            if let Some(fq) = filter.to_filter_query()? {
                backend.filter_queries.push(fq);
            }
        }

        if !facets.is_empty() {
            self.request_facets(&mut backend, facets)?;
        }

        if query.result_projection() == ResultProjection::Full {
            backend.fields = Some(ALL_FIELDS.to_string());
        }

        Ok(backend)
    }

    fn request_facets(&self, backend: &mut BackendQuery, facets: &FacetMap) -> SearchResult<()> {
        let mut active: Vec<_> = facets.values().filter(|f| f.is_enabled()).collect();
        active.sort_by(|a, b| a.attribute_id().cmp(b.attribute_id()));

        for facet in active {
            if facet.is_query_facet() {
                backend
                    .facet_queries
                    .extend(facet.queries().iter().map(|q| q.query.clone()));
                continue;
            }

            let field = facet_field_name(facet.attribute_id())?;
            let field = match facet.selection_strategy() {
                SelectionStrategy::Multi => {
                    format!("{}{}", exclude_local_param(facet.attribute_id()), field)
                }
                SelectionStrategy::Single => field,
            };
            backend.facet_fields.push(field);
        }

        backend.facet = true;
        Ok(())
    }
}
