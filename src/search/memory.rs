//! Embedded in-memory repository handle
//!
//! Understands the filter syntax the translator produces: term, OR/AND value
//! lists, ranges, exclusion, `{!tag=..}` filters and `{!ex=..}` facet
//! exclusion. Facet fields fall back from `<attr>_facet` to `<attr>`, like
//! the backend schema's copy fields.

use crate::search::backend::{
    BackendQuery, BackendResponse, FacetCount, FacetField, QueryParser, SearchRepository,
    SortOrder, MATCH_ALL,
};
use crate::search::conventions::{ATTRIBUTE_ID, FACET_FIELD_SUFFIX};
use crate::search::document::{AttributeValue, Document};
use crate::search::error::{SearchError, SearchResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Default)]
struct Index {
    committed: BTreeMap<String, Document>,
    pending: Vec<Document>,
}

/// Repository keeping documents in memory, pending until commit
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    index: RwLock<Index>,
    failure: Mutex<Option<String>>,
    adds: AtomicUsize,
    commits: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a backend error until cleared with `None`
    pub fn fail_with(&self, message: Option<String>) {
        *self.failure.lock() = message;
    }

    /// Number of visible documents
    pub fn committed_len(&self) -> usize {
        self.index.read().committed.len()
    }

    /// Number of added but uncommitted documents
    pub fn pending_len(&self) -> usize {
        self.index.read().pending.len()
    }

    pub fn add_count(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> SearchResult<()> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(SearchError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn stage(&self, documents: &[Document]) -> SearchResult<()> {
        self.check_available()?;
        if documents.iter().any(|d| d.id().is_none()) {
            return Err(SearchError::Backend(
                "document is missing mandatory unique key field: id".to_string(),
            ));
        }
        self.index.write().pending.extend(documents.iter().cloned());
        self.adds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn apply_commit(&self) {
        let mut index = self.index.write();
        let pending = std::mem::take(&mut index.pending);
        let count = pending.len();
        for document in pending {
            if let Some(id) = document.id().map(str::to_string) {
                index.committed.insert(id, document);
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!(documents = count, total = index.committed.len(), "Committed pending documents");
    }
}

#[async_trait]
impl SearchRepository for InMemoryRepository {
    async fn query(&self, query: &BackendQuery) -> SearchResult<BackendResponse> {
        self.check_available()?;
        let started = Instant::now();

        let main = parse_main_query(query)?;
        let filters = query
            .filter_queries
            .iter()
            .map(|fq| parse_filter(fq))
            .collect::<SearchResult<Vec<_>>>()?;
        let facet_fields = query
            .facet_fields
            .iter()
            .map(|f| parse_facet_request(f))
            .collect::<Vec<_>>();
        let facet_queries = query
            .facet_queries
            .iter()
            .map(|fq| parse_facet_request(fq))
            .map(|(ex, q)| parse_filter(q).map(|f| (ex, f)))
            .collect::<SearchResult<Vec<_>>>()?;

        let index = self.index.read();
        let docs: Vec<&Document> = index.committed.values().collect();

        let matches = |doc: &Document, excluded: &HashSet<String>| {
            main.matches(doc)
                && filters.iter().all(|f| {
                    let is_excluded = f.tag.as_ref().is_some_and(|t| excluded.contains(t));
                    is_excluded || f.matches(doc)
                })
        };

        let no_exclusions = HashSet::new();
        let mut hits: Vec<&Document> = docs
            .iter()
            .copied()
            .filter(|d| matches(*d, &no_exclusions))
            .collect();
        sort_documents(&mut hits, &query.sort);

        let mut response = BackendResponse {
            num_found: hits.len() as u64,
            start: query.start,
            ..BackendResponse::default()
        };

        response.docs = hits
            .iter()
            .skip(usize::try_from(query.start).unwrap_or(usize::MAX))
            .take(usize::try_from(query.rows).unwrap_or(usize::MAX))
            .map(|d| d.to_backend_fields())
            .collect();

        if query.facet {
            for (excluded, field) in facet_fields {
                let facet_hits = docs.iter().copied().filter(|d| matches(*d, &excluded));
                response.facet_fields.push(count_field(&docs, facet_hits, field));
            }
            for ((excluded, filter), key) in facet_queries.iter().zip(&query.facet_queries) {
                let count = docs
                    .iter()
                    .filter(|d| matches(**d, excluded) && filter.matches(d))
                    .count();
                response.facet_queries.push((key.clone(), count as u64));
            }
        }

        response.q_time = started.elapsed().as_millis() as u64;
        Ok(response)
    }

    async fn add(&self, documents: &[Document]) -> SearchResult<()> {
        self.stage(documents)
    }

    /// Commits right away, which satisfies any commit deadline
    async fn add_with_commit_within(
        &self,
        documents: &[Document],
        _commit_within: Duration,
    ) -> SearchResult<()> {
        self.stage(documents)?;
        self.apply_commit();
        Ok(())
    }

    async fn commit(&self) -> SearchResult<()> {
        self.check_available()?;
        self.apply_commit();
        Ok(())
    }

    async fn optimize(&self) -> SearchResult<()> {
        self.check_available()
    }
}

/// String values of a field, resolving facet copy fields
fn field_values(doc: &Document, field: &str) -> Vec<String> {
    if field == ATTRIBUTE_ID {
        return doc.id().map(str::to_string).into_iter().collect();
    }
    let attribute = doc.attribute(field).or_else(|| {
        field
            .strip_suffix(FACET_FIELD_SUFFIX)
            .and_then(|source| doc.attribute(source))
    });
    attribute
        .map(|a| a.values().iter().map(ToString::to_string).collect())
        .unwrap_or_default()
}

fn count_field<'a>(
    all: &[&Document],
    hits: impl Iterator<Item = &'a Document>,
    field: &str,
) -> FacetField {
    let mut counts: HashMap<String, u64> = all
        .iter()
        .flat_map(|d| field_values(d, field))
        .map(|v| (v, 0))
        .collect();

    for doc in hits {
        let distinct: BTreeSet<String> = field_values(doc, field).into_iter().collect();
        for value in distinct {
            *counts.entry(value).or_default() += 1;
        }
    }

    let mut values: Vec<FacetCount> = counts
        .into_iter()
        .map(|(name, count)| FacetCount { name, count })
        .collect();
    values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

    FacetField {
        name: field.to_string(),
        values,
    }
}

fn sort_documents(docs: &mut [&Document], sort: &[(String, SortOrder)]) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, order) in sort {
            let ordering = compare_first(a, b, field);
            let ordering = match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering != CmpOrdering::Equal {
                return ordering;
            }
        }
        CmpOrdering::Equal
    });
}

fn first_value<'a>(doc: &'a Document, field: &str) -> Option<&'a AttributeValue> {
    doc.attribute(field).and_then(|a| a.first())
}

fn compare_first(a: &Document, b: &Document, field: &str) -> CmpOrdering {
    if field == ATTRIBUTE_ID {
        return a.id().cmp(&b.id());
    }
    match (first_value(a, field), first_value(b, field)) {
        (Some(x), Some(y)) => compare_values(x, y),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
}

fn compare_values(a: &AttributeValue, b: &AttributeValue) -> CmpOrdering {
    use AttributeValue::*;
    match (a, b) {
        (Integer(x), Integer(y)) => x.cmp(y),
        (Integer(_) | Float(_), Integer(_) | Float(_)) => {
            let x = as_number(a).unwrap_or_default();
            let y = as_number(b).unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal)
        }
        (Timestamp(x), Timestamp(y)) => x.cmp(y),
        (Boolean(x), Boolean(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn as_number(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Integer(i) => Some(*i as f64),
        AttributeValue::Float(f) => Some(*f),
        _ => None,
    }
}

enum MainQuery {
    All,
    Text(Vec<String>),
    Filter(Filter),
}

impl MainQuery {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            MainQuery::All => true,
            MainQuery::Text(terms) => {
                let text = doc
                    .all_attributes()
                    .flat_map(|a| a.values())
                    .filter_map(AttributeValue::as_str)
                    .map(str::to_lowercase)
                    .collect::<Vec<_>>()
                    .join(" ");
                terms.iter().all(|t| text.contains(t.as_str()))
            }
            MainQuery::Filter(filter) => filter.matches(doc),
        }
    }
}

fn parse_main_query(query: &BackendQuery) -> SearchResult<MainQuery> {
    let text = match query.query.as_deref().map(str::trim) {
        None | Some("") | Some(MATCH_ALL) => return Ok(MainQuery::All),
        Some(text) => text,
    };
    match query.parser {
        QueryParser::Standard if text.contains(':') => Ok(MainQuery::Filter(parse_filter(text)?)),
        _ => Ok(MainQuery::Text(
            split_unescaped(text)
                .iter()
                .map(|t| unescape(t).to_lowercase())
                .collect(),
        )),
    }
}

#[derive(Debug)]
enum Clause {
    All,
    Term(String, String),
    Any(String, Vec<String>),
    Every(String, Vec<String>),
    Range(String, Option<String>, Option<String>),
}

#[derive(Debug)]
struct Filter {
    tag: Option<String>,
    negate: bool,
    clause: Clause,
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        let hit = match &self.clause {
            Clause::All => true,
            Clause::Term(field, value) => {
                let values = field_values(doc, field);
                if value == "*" {
                    !values.is_empty()
                } else {
                    values.contains(value)
                }
            }
            Clause::Any(field, wanted) => {
                let values = field_values(doc, field);
                wanted.iter().any(|w| values.contains(w))
            }
            Clause::Every(field, wanted) => {
                let values = field_values(doc, field);
                wanted.iter().all(|w| values.contains(w))
            }
            Clause::Range(field, lower, upper) => field_values(doc, field)
                .iter()
                .any(|v| in_range(v, lower.as_deref(), upper.as_deref())),
        };
        hit != self.negate
    }
}

fn in_range(value: &str, lower: Option<&str>, upper: Option<&str>) -> bool {
    let cmp = |bound: &str| match (value.parse::<f64>(), bound.parse::<f64>()) {
        (Ok(v), Ok(b)) => v.partial_cmp(&b).unwrap_or(CmpOrdering::Equal),
        _ => value.cmp(bound),
    };
    lower.map_or(true, |l| cmp(l) != CmpOrdering::Less)
        && upper.map_or(true, |u| cmp(u) != CmpOrdering::Greater)
}

/// Split `{!ex=a,b}field` into the excluded tags and the rest
fn parse_facet_request(request: &str) -> (HashSet<String>, &str) {
    let mut excluded = HashSet::new();
    let mut rest = request;
    if let Some((params, tail)) = local_params(rest) {
        for (key, value) in params {
            if key == "ex" {
                excluded.extend(value.split(',').map(str::to_string));
            }
        }
        rest = tail;
    }
    (excluded, rest)
}

/// Parse a leading `{!k=v k2=v2}` block
fn local_params(input: &str) -> Option<(Vec<(&str, &str)>, &str)> {
    let body = input.strip_prefix("{!")?;
    let end = body.find('}')?;
    let params = body[..end]
        .split_whitespace()
        .filter_map(|kv| kv.split_once('='))
        .collect();
    Some((params, &body[end + 1..]))
}

fn parse_filter(input: &str) -> SearchResult<Filter> {
    let invalid = || SearchError::Backend(format!("cannot parse filter query '{}'", input));

    let mut rest = input.trim();
    let mut negate = false;
    let mut tag = None;
    loop {
        if let Some(tail) = rest.strip_prefix('-').filter(|_| !negate) {
            negate = true;
            rest = tail;
        } else if let Some((params, tail)) = local_params(rest) {
            tag = params
                .iter()
                .find(|(k, _)| *k == "tag")
                .map(|(_, v)| v.to_string());
            rest = tail;
        } else {
            break;
        }
    }

    if rest == MATCH_ALL {
        return Ok(Filter { tag, negate, clause: Clause::All });
    }

    let (field, value) = rest.split_once(':').ok_or_else(invalid)?;
    let field = field.trim().to_string();
    if field.is_empty() || value.is_empty() {
        return Err(invalid());
    }

    let clause = if let Some(inner) = value.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        let tokens = split_unescaped(inner);
        let mut values = Vec::new();
        let mut and = None;
        for token in tokens {
            match token.as_str() {
                "OR" | "AND" => {
                    let is_and = token == "AND";
                    if and.is_some_and(|a| a != is_and) {
                        return Err(invalid());
                    }
                    and = Some(is_and);
                }
                _ => values.push(unescape(&token)),
            }
        }
        if values.is_empty() {
            return Err(invalid());
        }
        if and == Some(true) {
            Clause::Every(field, values)
        } else {
            Clause::Any(field, values)
        }
    } else if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        let (lower, upper) = inner.split_once(" TO ").ok_or_else(invalid)?;
        let bound = |b: &str| Some(b.trim().to_string()).filter(|b| b != "*");
        Clause::Range(field, bound(lower), bound(upper))
    } else {
        Clause::Term(field, unescape(value))
    };

    Ok(Filter { tag, negate, clause })
}

/// Split on whitespace that is not escaped
fn split_unescaped(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, color: &str, size: &str, price: i64) -> Document {
        Document::new()
            .with_id(id)
            .with_name(format!("Shirt {}", id))
            .with_value("color", color)
            .with_value("size", size)
            .with_value("price", price)
    }

    async fn repository() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.add(&[
            doc("a", "blue", "S", 5),
            doc("b", "red", "M", 15),
            doc("c", "dark blue", "M", 25),
        ])
        .await
        .unwrap();
        repo.commit().await.unwrap();
        repo
    }

    fn ids(response: &BackendResponse) -> Vec<String> {
        response
            .docs
            .iter()
            .map(|d| d["id"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn query() -> BackendQuery {
        BackendQuery {
            rows: 10,
            ..BackendQuery::default()
        }
    }

    #[tokio::test]
    async fn test_documents_visible_after_commit() {
        let repo = InMemoryRepository::new();
        repo.add(&[doc("a", "blue", "S", 5)]).await.unwrap();
        assert_eq!(repo.pending_len(), 1);
        assert_eq!(repo.query(&query()).await.unwrap().num_found, 0);

        repo.commit().await.unwrap();
        assert_eq!(repo.query(&query()).await.unwrap().num_found, 1);
        assert_eq!(repo.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_missing_id() {
        let repo = InMemoryRepository::new();
        let result = repo.add(&[Document::new().with_value("color", "blue")]).await;
        assert!(matches!(result, Err(SearchError::Backend(_))));
    }

    #[tokio::test]
    async fn test_filter_queries() {
        let repo = repository().await;

        let mut q = query();
        q.filter_queries = vec!["color_facet:dark\\ blue".to_string()];
        assert_eq!(ids(&repo.query(&q).await.unwrap()), ["c"]);

        q.filter_queries = vec!["-size:M".to_string()];
        assert_eq!(ids(&repo.query(&q).await.unwrap()), ["a"]);

        q.filter_queries = vec!["{!tag=size}size_facet:(S OR M)".to_string()];
        assert_eq!(repo.query(&q).await.unwrap().num_found, 3);

        q.filter_queries = vec!["price:[10 TO *]".to_string()];
        assert_eq!(ids(&repo.query(&q).await.unwrap()), ["b", "c"]);
    }

    #[tokio::test]
    async fn test_tag_exclusion_keeps_sibling_counts() {
        let repo = repository().await;

        let mut q = query();
        q.filter_queries = vec!["{!tag=size}size_facet:S".to_string()];
        q.facet = true;
        q.facet_fields = vec!["{!ex=size}size_facet".to_string(), "color_facet".to_string()];

        let response = repo.query(&q).await.unwrap();
        assert_eq!(response.num_found, 1);

        let size = &response.facet_fields[0];
        assert_eq!(size.name, "size_facet");
        assert_eq!(size.values[0], FacetCount { name: "M".to_string(), count: 2 });
        assert_eq!(size.values[1], FacetCount { name: "S".to_string(), count: 1 });

        let color = &response.facet_fields[1];
        let blue = color.values.iter().find(|v| v.name == "blue").unwrap();
        let red = color.values.iter().find(|v| v.name == "red").unwrap();
        assert_eq!(blue.count, 1);
        assert_eq!(red.count, 0);
    }

    #[tokio::test]
    async fn test_facet_queries() {
        let repo = repository().await;

        let mut q = query();
        q.facet = true;
        q.facet_queries = vec!["price:[0 TO 10]".to_string(), "price:[100 TO *]".to_string()];

        let response = repo.query(&q).await.unwrap();
        assert_eq!(
            response.facet_queries,
            [("price:[0 TO 10]".to_string(), 1), ("price:[100 TO *]".to_string(), 0)]
        );
    }

    #[tokio::test]
    async fn test_sort_and_paging() {
        let repo = repository().await;

        let mut q = query();
        q.sort = vec![("price".to_string(), SortOrder::Desc)];
        q.start = 1;
        q.rows = 1;

        let response = repo.query(&q).await.unwrap();
        assert_eq!(response.num_found, 3);
        assert_eq!(response.start, 1);
        assert_eq!(ids(&response), ["b"]);
    }

    #[tokio::test]
    async fn test_free_text_and_standard_queries() {
        let repo = repository().await;

        let mut q = query();
        q.query = Some("shirt red".to_string());
        assert_eq!(ids(&repo.query(&q).await.unwrap()), ["b"]);

        q.parser = QueryParser::Standard;
        q.query = Some("id:(a OR c)".to_string());
        assert_eq!(ids(&repo.query(&q).await.unwrap()), ["a", "c"]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let repo = repository().await;
        repo.fail_with(Some("connection refused".to_string()));
        assert!(matches!(
            repo.query(&query()).await,
            Err(SearchError::Backend(_))
        ));

        repo.fail_with(None);
        assert!(repo.query(&query()).await.is_ok());
    }

    #[test]
    fn test_parse_filter_forms() {
        let filter = parse_filter("-{!tag=size}size_facet:(S AND M)").unwrap();
        assert!(filter.negate);
        assert_eq!(filter.tag.as_deref(), Some("size"));
        assert!(matches!(filter.clause, Clause::Every(_, ref v) if v == &["S", "M"]));

        assert!(parse_filter("no-colon").is_err());
        assert!(parse_filter("f:(a OR b AND c)").is_err());
    }
}
