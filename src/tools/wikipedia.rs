//! Wikipedia search tool backed by the MediaWiki action API.

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::ToolError;
use crate::tools::{ToolOutcome, ToolSpec};

const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";
const DEFAULT_RESULT_LIMIT: usize = 3;
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct WikipediaTool {
    client: Client,
    api_url: String,
    limit: usize,
}

impl WikipediaTool {
    pub fn new() -> Result<Self, ToolError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ToolError::Execution(err.to_string()))?;

        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            limit: DEFAULT_RESULT_LIMIT,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn into_spec(self) -> ToolSpec {
        ToolSpec::new(
            "wikipedia",
            "Search Wikipedia and return short summaries of the best matching articles.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search terms, e.g. a person, place, or concept."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }))
        .expect("valid schema")
        .with_handler(move |args| {
            let tool = self.clone();
            async move {
                let query = args
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::Execution("query missing".to_string()))?;
                tool.search(query).await.map(ToolOutcome::Text)
            }
        })
    }

    pub async fn search(&self, query: &str) -> Result<String, ToolError> {
        debug!(query, "wikipedia search");
        let limit = self.limit.to_string();
        let hits = self
            .get::<SearchResponse>(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
                ("utf8", "1"),
            ])
            .await?;

        let titles = search_titles(&hits);
        if titles.is_empty() {
            return Ok(format!("No Wikipedia results found for '{query}'."));
        }

        let joined = titles.join("|");
        let extracts = self
            .get::<ExtractResponse>(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exlimit", limit.as_str()),
                ("titles", joined.as_str()),
                ("format", "json"),
                ("utf8", "1"),
            ])
            .await?;

        Ok(render_digest(&titles, &extracts))
    }

    async fn get<T>(&self, params: &[(&str, &str)]) -> Result<T, ToolError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .get(&self.api_url)
            .query(params)
            .send()
            .await
            .map_err(|err| ToolError::Execution(format!("wikipedia request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Execution(format!(
                "wikipedia request failed ({})",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| ToolError::Execution(format!("wikipedia response invalid: {err}")))
    }
}

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
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: HashMap<String, ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    title: String,
    #[serde(default)]
    extract: Option<String>,
}

fn search_titles(response: &SearchResponse) -> Vec<String> {
    response
        .query
        .as_ref()
        .map(|query| query.search.iter().map(|hit| hit.title.clone()).collect())
        .unwrap_or_default()
}

// Keeps search ranking; the extracts API returns pages keyed by page id.
fn render_digest(titles: &[String], response: &ExtractResponse) -> String {
    let summaries = response
        .query
        .as_ref()
        .map(|query| {
            query
                .pages
                .values()
                .map(|page| (page.title.as_str(), page.extract.as_deref().unwrap_or("")))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    titles
        .iter()
        .map(|title| {
            let summary = summaries
                .get(title.as_str())
                .map(|text| text.trim())
                .filter(|text| !text.is_empty())
                .unwrap_or("No summary available.");
            format!("Title: {title}\nSummary: {summary}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn search_titles_follow_ranking() {
        let response: SearchResponse = serde_json::from_value(json!({
            "batchcomplete": "",
            "query": {
                "searchinfo": {"totalhits": 2},
                "search": [
                    {"ns": 0, "title": "Paris", "pageid": 22989},
                    {"ns": 0, "title": "France", "pageid": 5843419}
                ]
            }
        }))
        .expect("deserializes");

        assert_eq!(search_titles(&response), vec!["Paris", "France"]);
    }

    #[test]
    fn empty_search_has_no_titles() {
        let response: SearchResponse =
            serde_json::from_value(json!({"batchcomplete": ""})).expect("deserializes");
        assert!(search_titles(&response).is_empty());
    }

    #[test]
    fn digest_orders_by_titles_and_fills_missing_summaries() {
        let response: ExtractResponse = serde_json::from_value(json!({
            "query": {
                "pages": {
                    "5843419": {"pageid": 5843419, "title": "France", "extract": "France is a country."},
                    "22989": {"pageid": 22989, "title": "Paris", "extract": "Paris is the capital of France.\n"},
                    "1": {"pageid": 1, "title": "Île-de-France", "extract": ""}
                }
            }
        }))
        .expect("deserializes");

        let titles = vec![
            "Paris".to_string(),
            "France".to_string(),
            "Île-de-France".to_string(),
        ];
        let digest = render_digest(&titles, &response);

        assert_eq!(
            digest,
            "Title: Paris\nSummary: Paris is the capital of France.\n\n\
             Title: France\nSummary: France is a country.\n\n\
             Title: Île-de-France\nSummary: No summary available."
        );
    }

    #[test]
    fn tool_exposes_query_schema() {
        let spec = WikipediaTool::new().expect("client builds").into_spec();
        assert_eq!(spec.name(), "wikipedia");
        assert_eq!(spec.json_schema()["required"], json!(["query"]));
        assert_eq!(spec.json_schema()["additionalProperties"], json!(false));
        assert!(spec.definition().description.starts_with("Search Wikipedia and return"));
    }
}
