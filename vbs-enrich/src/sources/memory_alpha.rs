//! Memory Alpha adapter (MediaWiki API)
//!
//! Two requests per episode: a full-text search for the episode page, then
//! a plain-text extract of the best hit.
//!
//! - Search: `action=query&list=search&srsearch=<term>`
//! - Page: `action=query&pageids=<id>&prop=extracts|info&inprop=url&explaintext`

use super::{MetadataAdapter, SourceContext};
use crate::error::{EnrichmentError, EnrichmentResult, ErrorCategory};
use crate::resilience::HttpRequest;
use crate::types::{fields, EpisodeId, EpisodeMetadata, EpisodeRequest};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

const EPISODE_SUFFIX: &str = " (episode)";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
    pageid: u64,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    query: Option<PageQuery>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    pages: HashMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: Option<String>,
    extract: Option<String>,
    fullurl: Option<String>,
    /// Present (as an empty string) when the page does not exist
    missing: Option<Value>,
}

pub struct MemoryAlphaAdapter {
    context: SourceContext,
}

impl MemoryAlphaAdapter {
    pub fn new(context: SourceContext) -> Self {
        Self { context }
    }

    fn url(&self, params: &[(&str, &str)]) -> EnrichmentResult<String> {
        let source = self.context.source();
        let base = [("action", "query"), ("format", "json"), ("origin", "*")];
        Url::parse_with_params(&source.endpoint, base.iter().chain(params.iter()))
            .map(String::from)
            .map_err(|e| {
                EnrichmentError::request(
                    &source.id,
                    ErrorCategory::Unknown,
                    format!("invalid endpoint {}: {}", source.endpoint, e),
                )
            })
    }

    async fn search(&self, term: &str) -> EnrichmentResult<Option<SearchHit>> {
        let url = self.url(&[("list", "search"), ("srsearch", term), ("srlimit", "5")])?;
        let response: SearchResponse = self.context.get_json(&HttpRequest::get(url)).await?;
        let hits = response.query.map(|q| q.search).unwrap_or_default();
        Ok(best_hit(hits))
    }

    async fn page(&self, page_id: u64) -> EnrichmentResult<Option<Page>> {
        let page_id = page_id.to_string();
        let url = self.url(&[
            ("pageids", page_id.as_str()),
            ("prop", "extracts|info"),
            ("inprop", "url"),
            ("explaintext", "1"),
        ])?;
        let response: PageResponse = self.context.get_json(&HttpRequest::get(url)).await?;
        let page = response
            .query
            .and_then(|mut q| q.pages.remove(&page_id))
            .filter(|p| p.missing.is_none());
        Ok(page)
    }
}

/// Search term: the title hint, or "<series> season N episode M"
fn search_term(request: &EpisodeRequest) -> EnrichmentResult<String> {
    if let Some(title) = request.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(title.to_string());
    }
    let id = EpisodeId::parse(&request.id)?;
    Ok(format!(
        "{} season {} episode {}",
        id.series_name(),
        id.season,
        id.episode
    ))
}

/// Prefer an explicit episode page over a same-named article
fn best_hit(hits: Vec<SearchHit>) -> Option<SearchHit> {
    let episode_page = hits.iter().position(|h| h.title.ends_with(EPISODE_SUFFIX));
    let index = episode_page.unwrap_or(0);
    hits.into_iter().nth(index)
}

/// First prose paragraph of a plain-text extract
fn first_paragraph(extract: &str) -> Option<String> {
    extract
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("=="))
        .map(str::to_string)
}

/// First "Stardate 41153.7" style mention in the extract
fn find_stardate(extract: &str) -> Option<String> {
    extract.match_indices("Stardate").find_map(|(index, word)| {
        let rest = extract[index + word.len()..].trim_start_matches([':', ' ']);
        let number: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let number = number.trim_end_matches('.');
        number
            .chars()
            .any(|c| c.is_ascii_digit())
            .then(|| number.to_string())
    })
}

fn parse_page(context: &SourceContext, episode_id: &str, page: Page) -> EpisodeMetadata {
    let source_id = context.source().id.as_str();
    let mut record = context.new_record(episode_id);

    let title = page
        .title
        .map(|t| t.strip_suffix(EPISODE_SUFFIX).map(str::to_string).unwrap_or(t));
    let extract = page.extract.unwrap_or_default();

    record.set_field(fields::TITLE, title.map(Value::from), source_id);
    record.set_field(
        fields::SYNOPSIS,
        first_paragraph(&extract).map(Value::from),
        source_id,
    );
    record.set_field(
        fields::STARDATE,
        find_stardate(&extract).map(Value::from),
        source_id,
    );
    record.set_field(
        fields::MEMORY_ALPHA_URL,
        page.fullurl.map(Value::from),
        source_id,
    );
    record
}

#[async_trait]
impl MetadataAdapter for MemoryAlphaAdapter {
    fn context(&self) -> &SourceContext {
        &self.context
    }

    async fn lookup(&self, request: &EpisodeRequest) -> EnrichmentResult<Option<EpisodeMetadata>> {
        let term = search_term(request)?;
        let Some(hit) = self.search(&term).await? else {
            debug!(episode_id = %request.id, term = %term, "No Memory Alpha search results");
            return Ok(None);
        };

        debug!(
            episode_id = %request.id,
            page_id = hit.pageid,
            title = %hit.title,
            "Fetching Memory Alpha page"
        );
        Ok(self
            .page(hit.pageid)
            .await?
            .map(|page| parse_page(&self.context, &request.id, page)))
    }
}
