//! Gemini `generateContent` client.

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chatbot::generator::{BoxFuture, Completion, GenerationError, TextGenerator};
use crate::chatbot::message::{Image, Role, Turn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Finish reasons that mean the model declined to answer.
const REFUSAL_REASONS: &[&str] = &["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

/// Content-safety threshold for one harm category, passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category: category.to_string(),
        threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
    })
    .collect()
}

/// Sampling parameters, passed through as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
            top_k: 1,
            max_output_tokens: 2048,
        }
    }
}

/// Everything the client needs besides the HTTP connection.
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    /// System instruction carrying the persona.
    pub persona: String,
    pub generation: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
    pub timeout_secs: u64,
}

pub struct GeminiClient {
    settings: GeminiSettings,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: &'a [SafetySetting],
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        Ok(Self { settings, client })
    }

    async fn send(&self, history: &[Turn], prompt: &str, image: Option<&Image>) -> Completion {
        let body = build_request(&self.settings, history, prompt, image);
        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, self.settings.model);

        info!(
            "🤖 Sending to Gemini: {} chars, {} prior turn(s), image: {}",
            prompt.len(),
            history.len(),
            image.is_some()
        );

        let response = match self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Completion::Failed(GenerationError::Http(e.to_string())),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                return Completion::Failed(GenerationError::Http(format!(
                    "Failed to read response: {e}"
                )));
            }
        };

        debug!("Gemini response status: {status}, {} bytes", text.len());
        interpret_response(status.as_u16(), &text)
    }
}

impl TextGenerator for GeminiClient {
    fn generate<'a>(
        &'a self,
        history: &'a [Turn],
        prompt: &'a str,
        image: Option<&'a Image>,
    ) -> BoxFuture<'a, Completion> {
        Box::pin(self.send(history, prompt, image))
    }
}

fn turn_content(role: Role, text: &str, image: Option<&Image>) -> Content {
    let mut parts = vec![Part {
        text: Some(text.to_string()),
        inline_data: None,
    }];
    if let Some(image) = image {
        parts.push(Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(image.data.as_slice()),
            }),
        });
    }

    Content {
        role: Some(match role {
            Role::User => "user",
            Role::Assistant => "model",
        }),
        parts,
    }
}

fn build_request<'a>(
    settings: &'a GeminiSettings,
    history: &[Turn],
    prompt: &str,
    image: Option<&Image>,
) -> GenerateRequest<'a> {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|t| turn_content(t.role, &t.text, t.image.as_ref()))
        .collect();
    contents.push(turn_content(Role::User, prompt, image));

    let system_instruction = (!settings.persona.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part {
            text: Some(settings.persona.clone()),
            inline_data: None,
        }],
    });

    GenerateRequest {
        system_instruction,
        contents,
        generation_config: settings.generation,
        safety_settings: &settings.safety_settings,
    }
}

/// Map an HTTP status and body onto a completion tag.
fn interpret_response(status: u16, body: &str) -> Completion {
    if !(200..300).contains(&status) {
        return Completion::Failed(GenerationError::Api {
            status,
            body: body.to_string(),
        });
    }

    let parsed: GenerateResponse = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(e) => return Completion::Failed(GenerationError::Parse(e.to_string())),
    };

    if let Some(error) = parsed.error {
        return Completion::Failed(GenerationError::Api {
            status,
            body: error.message,
        });
    }

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        warn!("Gemini blocked prompt: {reason}");
        return Completion::Refused(reason);
    }

    let Some(candidate) = parsed.candidates.and_then(|c| c.into_iter().next()) else {
        return Completion::Empty;
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let text = text.trim();

    if !text.is_empty() {
        return Completion::Text(text.to_string());
    }

    match candidate.finish_reason {
        Some(reason) if REFUSAL_REASONS.contains(&reason.as_str()) => Completion::Refused(reason),
        _ => Completion::Empty,
    }
}
