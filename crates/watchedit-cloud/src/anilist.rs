use reqwest::Client;
use serde::{Deserialize, Serialize};

use watchedit_core::{Episode, EpisodeType, NewWork, WorkType};

use crate::error::{CloudError, Result};
use crate::USER_AGENT;

const ANILIST_API: &str = "https://graphql.anilist.co";

/// Source label recorded on works pre-filled from AniList.
pub const ANILIST_SOURCE: &str = "AniList";

const SEARCH_QUERY: &str = r#"
    query ($search: String, $page: Int, $perPage: Int) {
        Page(page: $page, perPage: $perPage) {
            media(search: $search, type: ANIME) {
                id
                title { romaji english native }
                format
                episodes
                seasonYear
                genres
                coverImage { large medium }
                description(asHtml: false)
            }
        }
    }
"#;

#[derive(Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: Variables<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Variables<'a> {
    search: &'a str,
    page: u32,
    per_page: u32,
}

#[derive(Deserialize)]
struct GraphQLResponse {
    data: Option<Data>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Deserialize)]
struct Data {
    #[serde(rename = "Page")]
    page: Page,
}

#[derive(Deserialize)]
struct Page {
    media: Vec<Media>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Media {
    id: i64,
    title: Title,
    format: Option<String>,
    episodes: Option<u32>,
    season_year: Option<i32>,
    #[serde(default)]
    genres: Vec<String>,
    cover_image: Option<CoverImage>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct Title {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

#[derive(Deserialize)]
struct CoverImage {
    large: Option<String>,
    medium: Option<String>,
}

/// One search hit, flattened for display and for pre-filling a new work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimeCandidate {
    pub id: i64,
    pub title_romaji: Option<String>,
    pub title_english: Option<String>,
    pub title_native: Option<String>,
    pub format: Option<String>,
    pub episodes: Option<u32>,
    pub season_year: Option<i32>,
    pub genres: Vec<String>,
    pub cover_image: Option<String>,
    pub description: Option<String>,
}

impl From<Media> for AnimeCandidate {
    fn from(media: Media) -> Self {
        Self {
            id: media.id,
            title_romaji: media.title.romaji,
            title_english: media.title.english,
            title_native: media.title.native,
            format: media.format,
            episodes: media.episodes,
            season_year: media.season_year,
            genres: media.genres,
            cover_image: media.cover_image.and_then(|c| c.large.or(c.medium)),
            description: media.description,
        }
    }
}

impl AnimeCandidate {
    /// English, then romaji, then native.
    pub fn preferred_title(&self) -> Option<&str> {
        [&self.title_english, &self.title_romaji, &self.title_native]
            .into_iter()
            .flatten()
            .map(|t| t.trim())
            .find(|t| !t.is_empty())
    }

    pub fn work_type(&self) -> WorkType {
        match self.format.as_deref() {
            Some("MOVIE") => WorkType::Movie,
            _ => WorkType::Anime,
        }
    }

    /// Pre-filled input for creating a work from this candidate, with one
    /// season-1 episode per announced episode.
    pub fn to_new_work(&self) -> NewWork {
        let mut work = NewWork::new(
            self.preferred_title().unwrap_or("Untitled"),
            self.work_type(),
        );
        work.year = self.season_year;
        work.source = Some(ANILIST_SOURCE.to_string());
        work.episodes = (1..=self.episodes.unwrap_or(0))
            .map(|n| Episode::new(n, 1, EpisodeType::Episode))
            .collect();
        work
    }
}

#[derive(Clone)]
pub struct AniListClient {
    client: Client,
    base_url: String,
}

impl Default for AniListClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AniListClient {
    pub fn new() -> Self {
        Self::with_base_url(ANILIST_API)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.to_string(),
        }
    }

    pub async fn search_anime(
        &self,
        search: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<AnimeCandidate>> {
        let request = GraphQLRequest {
            query: SEARCH_QUERY,
            variables: Variables {
                search,
                page: page.max(1),
                per_page: per_page.clamp(1, 50),
            },
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed: GraphQLResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(CloudError::Status {
                    url: self.base_url.clone(),
                    status: status.as_u16(),
                    body: text,
                });
            }
            Err(e) => return Err(CloudError::Parse(e.to_string())),
        };

        if !parsed.errors.is_empty() {
            let messages: Vec<String> = parsed.errors.into_iter().map(|e| e.message).collect();
            return Err(CloudError::Api(self.base_url.clone(), messages.join("; ")));
        }

        let media = parsed.data.map(|d| d.page.media).unwrap_or_default();
        tracing::debug!(search, results = media.len(), "AniList search");
        Ok(media.into_iter().map(AnimeCandidate::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const SEARCH_BODY: &str = r#"{"data":{"Page":{"media":[
        {"id":21,"title":{"romaji":"One Piece","english":null,"native":"ONE PIECE"},
         "format":"TV","episodes":3,"seasonYear":1999,"genres":["Action"],
         "coverImage":{"large":"https://img/large.jpg","medium":null},"description":"Pirates"},
        {"id":199,"title":{"romaji":"Sen to Chihiro no Kamikakushi","english":"Spirited Away","native":null},
         "format":"MOVIE","episodes":1,"seasonYear":2001,"genres":[],"coverImage":null,"description":null}
    ]}}}"#;

    #[tokio::test]
    async fn test_search_anime() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "variables": {"search": "one piece", "page": 1, "perPage": 10}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SEARCH_BODY)
            .create_async()
            .await;

        let client = AniListClient::with_base_url(&server.url());
        let results = client.search_anime("one piece", 1, 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].preferred_title(), Some("One Piece"));
        assert_eq!(results[0].cover_image.as_deref(), Some("https://img/large.jpg"));
        assert_eq!(results[1].preferred_title(), Some("Spirited Away"));
    }

    #[tokio::test]
    async fn test_graphql_errors_surface() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(400)
            .with_body(r#"{"data":null,"errors":[{"message":"Validation error"}]}"#)
            .create_async()
            .await;

        let client = AniListClient::with_base_url(&server.url());
        match client.search_anime("x", 1, 5).await {
            Err(CloudError::Api(_, msg)) => assert_eq!(msg, "Validation error"),
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn test_candidate_to_new_work() {
        let tv = AnimeCandidate {
            id: 1,
            title_romaji: Some("Shingeki no Kyojin".into()),
            title_english: Some("Attack on Titan".into()),
            title_native: None,
            format: Some("TV".into()),
            episodes: Some(25),
            season_year: Some(2013),
            genres: vec![],
            cover_image: None,
            description: None,
        };
        let work = tv.to_new_work();
        assert_eq!(work.title, "Attack on Titan");
        assert_eq!(work.work_type, WorkType::Anime);
        assert_eq!(work.year, Some(2013));
        assert_eq!(work.source.as_deref(), Some(ANILIST_SOURCE));
        assert_eq!(work.episodes.len(), 25);
        assert_eq!(work.episodes[24].number, 25);
        assert!(work.episodes.iter().all(|ep| ep.season == 1));

        let movie = AnimeCandidate {
            format: Some("MOVIE".into()),
            episodes: None,
            title_english: Some("  ".into()),
            ..tv
        };
        let work = movie.to_new_work();
        assert_eq!(work.work_type, WorkType::Movie);
        assert_eq!(work.title, "Shingeki no Kyojin");
        assert!(work.episodes.is_empty());
    }
}
