//! Web search fallback (DuckDuckGo Instant Answer API).

use serde::Deserialize;
use tracing::{debug, info};

use crate::chatbot::generator::BoxFuture;

/// Looks up a short text snippet for a query. An empty string means no answer.
pub trait WebSearch: Send + Sync {
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<String, String>>;
}

pub struct DuckDuckGo {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    abstract_text: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    text: Option<String>,
}

impl DuckDuckGo {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    async fn lookup(&self, query: &str) -> Result<String, String> {
        info!("🔎 Web search: {}", query.chars().take(80).collect::<String>());

        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            self.base_url,
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Search error {status}"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {e}"))?;
        debug!("Search response: {} bytes", body.len());

        extract_snippet(&body)
    }
}

impl WebSearch for DuckDuckGo {
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<String, String>> {
        Box::pin(self.lookup(query))
    }
}

/// Pick the best snippet: the direct answer, then the abstract, then the first related topic.
fn extract_snippet(body: &str) -> Result<String, String> {
    let parsed: InstantAnswer =
        serde_json::from_str(body).map_err(|e| format!("Failed to parse response: {e}"))?;

    let snippet = [parsed.answer, parsed.abstract_text]
        .into_iter()
        .find(|s| !s.trim().is_empty())
        .or_else(|| {
            parsed
                .related_topics
                .into_iter()
                .filter_map(|t| t.text)
                .find(|s| !s.trim().is_empty())
        })
        .unwrap_or_default();

    Ok(snippet.trim().to_string())
}
