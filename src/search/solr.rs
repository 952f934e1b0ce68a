//! Solr repository handle over HTTP/JSON

use crate::search::backend::{
    BackendDocument, BackendQuery, BackendResponse, FacetCount, FacetField, SearchRepository,
};
use crate::search::config::SolrConfig;
use crate::search::document::Document;
use crate::search::error::{SearchError, SearchResult};
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SelectResponse {
    #[serde(rename = "responseHeader", default)]
    header: ResponseHeader,
    response: ResultSet,
    #[serde(default)]
    facet_counts: Option<FacetCounts>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseHeader {
    #[serde(rename = "QTime", default)]
    q_time: u64,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    #[serde(rename = "numFound")]
    num_found: u64,
    #[serde(default)]
    start: u64,
    #[serde(default)]
    docs: Vec<BackendDocument>,
}

#[derive(Debug, Default, Deserialize)]
struct FacetCounts {
    #[serde(default)]
    facet_queries: Map<String, Value>,
    /// Field name to a flat `[value, count, value, count, ...]` list
    #[serde(default)]
    facet_fields: Map<String, Value>,
}

impl SelectResponse {
    fn into_backend(self) -> SearchResult<BackendResponse> {
        let counts = self.facet_counts.unwrap_or_default();

        let facet_fields = counts
            .facet_fields
            .into_iter()
            .map(|(name, values)| {
                Ok(FacetField {
                    values: parse_flat_counts(&name, &values)?,
                    name,
                })
            })
            .collect::<SearchResult<Vec<_>>>()?;

        let facet_queries = counts
            .facet_queries
            .into_iter()
            .map(|(query, count)| {
                let count = count.as_u64().ok_or_else(|| {
                    SearchError::Serialization(format!("invalid count for facet query '{}'", query))
                })?;
                Ok((query, count))
            })
            .collect::<SearchResult<Vec<_>>>()?;

        Ok(BackendResponse {
            q_time: self.header.q_time,
            num_found: self.response.num_found,
            start: self.response.start,
            docs: self.response.docs,
            facet_fields,
            facet_queries,
        })
    }
}

fn parse_flat_counts(field: &str, values: &Value) -> SearchResult<Vec<FacetCount>> {
    let invalid =
        || SearchError::Serialization(format!("invalid facet counts for field '{}'", field));
    let items = values.as_array().ok_or_else(invalid)?;
    items
        .chunks(2)
        .map(|pair| match pair {
            [name, count] => Ok(FacetCount {
                name: match name {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
                count: count.as_u64().ok_or_else(invalid)?,
            }),
            _ => Err(invalid()),
        })
        .collect()
}

/// Repository talking to one Solr collection
#[derive(Clone)]
pub struct SolrRepository {
    client: Client,
    select_url: Url,
    update_url: Url,
    get_post_threshold: usize,
}

impl SolrRepository {
    pub fn new(config: &SolrConfig) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                SearchError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;

        let base = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.collection
        );
        let parse = |path: &str| {
            Url::parse(&format!("{}/{}", base, path)).map_err(|e| {
                SearchError::InvalidConfiguration(format!("Invalid Solr URL '{}': {}", base, e))
            })
        };

        Ok(Self {
            client,
            select_url: parse("select")?,
            update_url: parse("update")?,
            get_post_threshold: config.get_post_threshold,
        })
    }

    async fn check(response: Response) -> SearchResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SearchError::Backend(format!(
            "Solr returned HTTP {}: {}",
            status.as_u16(),
            body.trim()
        )))
    }

    async fn update(&self, body: Value, params: &[(&str, String)]) -> SearchResult<()> {
        let mut url = self.update_url.clone();
        url.query_pairs_mut()
            .append_pair("wt", "json")
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));

        let response = self.client.post(url).json(&body).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    fn documents_body(documents: &[Document]) -> Value {
        Value::Array(
            documents
                .iter()
                .map(|d| Value::Object(d.to_backend_fields()))
                .collect(),
        )
    }
}

#[async_trait]
impl SearchRepository for SolrRepository {
    async fn query(&self, query: &BackendQuery) -> SearchResult<BackendResponse> {
        let mut params = query.to_params();
        params.push(("wt".to_string(), "json".to_string()));

        let mut get_url = self.select_url.clone();
        get_url.query_pairs_mut().extend_pairs(params.iter());
        let encoded_len = get_url.query().map_or(0, str::len);

        let request = if encoded_len <= self.get_post_threshold {
            self.client.get(get_url)
        } else {
            self.client.post(self.select_url.clone()).form(&params)
        };
        debug!(
            url = %self.select_url,
            encoded_len,
            post = encoded_len > self.get_post_threshold,
            "Sending Solr query"
        );

        let response = Self::check(request.send().await?).await?;
        let body: SelectResponse = response.json().await?;
        body.into_backend()
    }

    async fn add(&self, documents: &[Document]) -> SearchResult<()> {
        self.update(Self::documents_body(documents), &[]).await
    }

    async fn add_with_commit_within(
        &self,
        documents: &[Document],
        commit_within: Duration,
    ) -> SearchResult<()> {
        let params = [("commitWithin", commit_within.as_millis().to_string())];
        self.update(Self::documents_body(documents), &params).await
    }

    async fn commit(&self) -> SearchResult<()> {
        self.update(json!({ "commit": {} }), &[]).await
    }

    async fn optimize(&self) -> SearchResult<()> {
        self.update(json!({ "optimize": {} }), &[]).await
    }
}

impl std::fmt::Debug for SolrRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolrRepository")
            .field("select_url", &self.select_url.as_str())
            .field("get_post_threshold", &self.get_post_threshold)
            .finish()
    }
}
