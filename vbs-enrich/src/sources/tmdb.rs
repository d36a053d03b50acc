//! TMDB adapter (v3 REST API)
//!
//! Direct lookup: `/tv/{series_id}/season/{season}/episode/{episode}`, with the
//! series id taken from the static series catalog. Authenticates with a v4
//! read access token sent as a bearer header.

use super::{MetadataAdapter, SourceContext};
use crate::error::{EnrichmentError, EnrichmentResult, ErrorCategory};
use crate::resilience::HttpRequest;
use crate::types::{fields, EpisodeId, EpisodeMetadata, EpisodeRequest};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct TmdbEpisode {
    id: u64,
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
    runtime: Option<u32>,
    vote_average: Option<f64>,
    production_code: Option<String>,
    #[serde(default)]
    crew: Vec<TmdbCrewMember>,
}

#[derive(Debug, Deserialize)]
struct TmdbCrewMember {
    job: Option<String>,
    name: String,
}

impl TmdbEpisode {
    /// Names credited with `job`, joined with ", "
    fn credited(&self, job: &str) -> Option<String> {
        let names: Vec<&str> = self
            .crew
            .iter()
            .filter(|m| m.job.as_deref() == Some(job))
            .map(|m| m.name.as_str())
            .collect();
        (!names.is_empty()).then(|| names.join(", "))
    }
}

pub struct TmdbAdapter {
    context: SourceContext,
}

impl TmdbAdapter {
    pub fn new(context: SourceContext) -> Self {
        Self { context }
    }

    fn request_for(&self, id: &EpisodeId) -> EnrichmentResult<HttpRequest> {
        let source = self.context.source();
        let api_key = source
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                EnrichmentError::request(
                    &source.id,
                    ErrorCategory::Authentication,
                    "no API key configured",
                )
            })?;
        let series_id = id
            .tmdb_series_id()
            .ok_or_else(|| EnrichmentError::UnknownSeries(id.series.clone()))?;

        let url = format!(
            "{}/tv/{}/season/{}/episode/{}",
            source.endpoint.trim_end_matches('/'),
            series_id,
            id.season,
            id.episode
        );
        Ok(HttpRequest::get(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Accept", "application/json"))
    }
}

fn parse_episode(context: &SourceContext, episode_id: &str, episode: TmdbEpisode) -> EpisodeMetadata {
    let source_id = context.source().id.as_str();
    let mut record = context.new_record(episode_id);

    let director = episode.credited("Director");
    let writer = episode
        .credited("Writer")
        .or_else(|| episode.credited("Teleplay"));

    record.set_field(fields::TITLE, episode.name.map(Value::from), source_id);
    record.set_field(fields::SYNOPSIS, episode.overview.map(Value::from), source_id);
    record.set_field(fields::AIR_DATE, episode.air_date.map(Value::from), source_id);
    record.set_field(fields::DIRECTOR, director.map(Value::from), source_id);
    record.set_field(fields::WRITER, writer.map(Value::from), source_id);
    record.set_field(
        fields::RUNTIME_MINUTES,
        episode.runtime.map(Value::from),
        source_id,
    );
    record.set_field(
        fields::PRODUCTION_CODE,
        episode.production_code.map(Value::from),
        source_id,
    );
    // TMDB reports 0.0 for unrated episodes
    record.set_field(
        fields::RATING,
        episode
            .vote_average
            .filter(|v| *v > 0.0)
            .map(Value::from),
        source_id,
    );
    record.set_field(fields::TMDB_ID, Some(Value::from(episode.id)), source_id);
    record
}

#[async_trait]
impl MetadataAdapter for TmdbAdapter {
    fn context(&self) -> &SourceContext {
        &self.context
    }

    async fn lookup(&self, request: &EpisodeRequest) -> EnrichmentResult<Option<EpisodeMetadata>> {
        let id = EpisodeId::parse(&request.id)?;
        let http_request = self.request_for(&id)?;

        debug!(episode_id = %request.id, url = %http_request.url, "Querying TMDB");
        let episode: TmdbEpisode = self.context.get_json(&http_request).await?;
        Ok(Some(parse_episode(&self.context, &request.id, episode)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPISODE_JSON: &str = r#"{
        "id": 64032,
        "name": "Yesterday's Enterprise",
        "overview": "A temporal rift sends the Enterprise-C into the future.",
        "air_date": "1990-02-19",
        "runtime": 45,
        "vote_average": 0.0,
        "production_code": "40273-163",
        "crew": [
            {"job": "Director", "name": "David Carson"},
            {"job": "Teleplay", "name": "Ira Steven Behr"},
            {"job": "Teleplay", "name": "Richard Manning"},
            {"job": "Story", "name": "Trent Christopher Ganino"}
        ]
    }"#;

    #[test]
    fn test_episode_decodes() {
        let episode: TmdbEpisode = serde_json::from_str(EPISODE_JSON).unwrap();
        assert_eq!(episode.id, 64032);
        assert_eq!(episode.credited("Director").as_deref(), Some("David Carson"));
        assert_eq!(
            episode.credited("Teleplay").as_deref(),
            Some("Ira Steven Behr, Richard Manning")
        );
        assert_eq!(episode.credited("Writer"), None);
    }

    #[test]
    fn test_episode_without_crew_decodes() {
        let episode: TmdbEpisode =
            serde_json::from_str(r#"{"id": 1, "name": "Broken Bow"}"#).unwrap();
        assert!(episode.crew.is_empty());
        assert!(episode.air_date.is_none());
    }
}
