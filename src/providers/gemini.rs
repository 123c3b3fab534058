//! Gemini provider
//!
//! Streams replies from the `streamGenerateContent` endpoint using its SSE
//! mode (`alt=sse`): every `data:` line carries one JSON
//! `GenerateContentResponse` holding the next slice of the reply.
//!
//! # Configuration
//!
//! ```toml
//! [gemini]
//! api_key_env = "GEMINI_API_KEY"
//! model = "gemini-2.5-flash"
//! base_url = "https://generativelanguage.googleapis.com/v1beta"
//! ```

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::{Role, Turn};

use super::{FragmentStream, ModelClient, Prompt, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Finish reasons that mean the reply was cut off by the provider's filters
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Gemini connection settings
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// API root, e.g. https://generativelanguage.googleapis.com/v1beta
    pub base_url: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

impl From<&Turn> for Content {
    fn from(turn: &Turn) -> Self {
        Self {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            },
            parts: vec![Part {
                text: turn.content.clone(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<u16>,
    message: String,
}

// ============================================================================
// Provider
// ============================================================================

pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self { config, client })
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, self.config.model
        )
    }

    fn build_request(&self, prompt: &Prompt) -> GenerateContentRequest {
        let mut contents: Vec<Content> = prompt.history.iter().map(Content::from).collect();
        contents.push(Content {
            role: "user",
            parts: vec![Part {
                text: prompt.message.clone(),
            }],
        });

        let generation_config =
            if self.config.temperature.is_some() || self.config.max_output_tokens.is_some() {
                Some(GenerationConfig {
                    temperature: self.config.temperature,
                    max_output_tokens: self.config.max_output_tokens,
                })
            } else {
                None
            };

        GenerateContentRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: prompt.system_instruction.clone(),
                }],
            },
            generation_config,
        }
    }
}

#[async_trait]
impl ModelClient for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, prompt: Prompt) -> Result<FragmentStream, ProviderError> {
        let request = self.build_request(&prompt);
        tracing::debug!(
            model = %self.config.model,
            contents = request.contents.len(),
            "Opening Gemini stream"
        );

        let response = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        Ok(Box::pin(fragments(response.bytes_stream())))
    }
}

fn api_error(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|resp| resp.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    ProviderError::Api { status, message }
}

/// Turn the raw SSE body into text fragments
fn fragments<S, B>(chunks: S) -> impl Stream<Item = Result<String, ProviderError>> + Send + 'static
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    try_stream! {
        let mut events = Box::pin(chunks.eventsource());

        while let Some(event) = events.next().await {
            let event = event.map_err(stream_error)?;
            if event.data.is_empty() {
                continue;
            }

            let parsed = parse_chunk(&event.data)?;
            if !parsed.text.is_empty() {
                yield parsed.text;
            }
            if let Some(reason) = parsed.blocked {
                Err::<(), _>(ProviderError::Blocked(reason))?;
            }
        }
    }
}

fn stream_error(err: EventStreamError<reqwest::Error>) -> ProviderError {
    match err {
        EventStreamError::Transport(e) => ProviderError::RequestFailed(e),
        other => ProviderError::InvalidResponse(format!("Malformed event stream: {}", other)),
    }
}

// ============================================================================
// SSE Parsing
// ============================================================================

/// Text carried by one stream chunk
#[derive(Debug, Default, PartialEq)]
struct ParsedChunk {
    text: String,
    blocked: Option<String>,
}

fn parse_chunk(payload: &str) -> Result<ParsedChunk, ProviderError> {
    let chunk: StreamChunk = serde_json::from_str(payload).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse stream chunk: {} - Data: {}", e, payload))
    })?;

    if let Some(error) = chunk.error {
        return Err(ProviderError::Api {
            status: error.code.unwrap_or(500),
            message: error.message,
        });
    }

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Blocked(format!("prompt blocked ({})", reason)));
    }

    let mut parsed = ParsedChunk::default();
    if let Some(candidate) = chunk.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if part.thought {
                    continue;
                }
                if let Some(text) = part.text {
                    parsed.text.push_str(&text);
                }
            }
        }

        if let Some(reason) = candidate.finish_reason {
            if BLOCKING_FINISH_REASONS.contains(&reason.as_str()) {
                parsed.blocked = Some(format!("reply stopped ({})", reason));
            }
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base_url: &str) -> GeminiProvider {
        let mut config = GeminiConfig::new("test-key");
        config.base_url = base_url.to_string();
        GeminiProvider::new(config).unwrap()
    }

    fn prompt() -> Prompt {
        Prompt {
            system_instruction: "You plan trips.".to_string(),
            history: vec![
                Turn::user("Somewhere warm in March?"),
                Turn::assistant("Try the Canary Islands."),
            ],
            message: "What about food?".to_string(),
        }
    }

    fn sse_body(chunks: &[&str]) -> String {
        chunks
            .iter()
            .map(|text| {
                let json = serde_json::json!({
                    "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
                });
                format!("data: {}\r\n\r\n", json)
            })
            .collect()
    }

    #[test]
    fn test_request_shape() {
        let request = provider(DEFAULT_BASE_URL).build_request(&prompt());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You plan trips.");
        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "Try the Canary Islands.");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "What about food?");
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn test_generation_config_included_when_set() {
        let mut config = GeminiConfig::new("k");
        config.max_output_tokens = Some(2048);
        let provider = GeminiProvider::new(config).unwrap();

        let json = serde_json::to_value(provider.build_request(&prompt())).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert!(json["generationConfig"].get("temperature").is_none());
    }

    #[test]
    fn test_stream_url() {
        let url = provider("http://localhost:9999/v1beta").stream_url();
        assert_eq!(
            url,
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", GeminiConfig::new("super-secret"));
        assert!(!debug.contains("super-secret"));
    }

    #[tokio::test]
    async fn test_fragments_across_chunk_boundaries() {
        let body = sse_body(&["Caf\u{e9} ", "in Alfama"]).replacen("\r\n\r\n", "\r\r", 1);
        let bytes = body.as_bytes();

        // one cut inside the two-byte 'é', one inside the first `data:` field
        let cut = bytes.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = vec![
            Ok(bytes[..3].to_vec()),
            Ok(bytes[3..cut].to_vec()),
            Ok(bytes[cut..].to_vec()),
        ];

        let items: Vec<String> = fragments(futures::stream::iter(chunks))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(items, vec!["Caf\u{e9} ", "in Alfama"]);
    }

    #[test]
    fn test_parse_chunk_skips_thoughts() {
        let payload = r#"{"candidates":[{"content":{"parts":[
            {"text":"planning...","thought":true},
            {"text":"Day 1: "},
            {"text":"Alfama"}
        ]}}]}"#;
        let parsed = parse_chunk(payload).unwrap();
        assert_eq!(parsed.text, "Day 1: Alfama");
        assert!(parsed.blocked.is_none());
    }

    #[test]
    fn test_parse_chunk_final_usage_only() {
        let payload = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":""}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":10}}"#;
        assert_eq!(parse_chunk(payload).unwrap(), ParsedChunk::default());
    }

    #[test]
    fn test_parse_chunk_errors() {
        let err = parse_chunk(r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#)
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 429, ref message } if message == "quota"));

        let err = parse_chunk(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Blocked(_)));

        let parsed = parse_chunk(
            r#"{"candidates":[{"content":{"parts":[{"text":"partial"}]},"finishReason":"SAFETY"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text, "partial");
        assert!(parsed.blocked.is_some());

        let err = parse_chunk("not json").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_api_error_body() {
        let err = api_error(400, r#"{"error":{"code":400,"message":"API key not valid"}}"#);
        assert!(matches!(err, ProviderError::Api { status: 400, ref message } if message == "API key not valid"));

        let err = api_error(502, "Bad Gateway\n");
        assert!(matches!(err, ProviderError::Api { status: 502, ref message } if message == "Bad Gateway"));
    }

    #[tokio::test]
    async fn test_stream_against_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                mockito::Matcher::Regex(r"^/models/gemini-2\.5-flash:streamGenerateContent".into()),
            )
            .match_query(mockito::Matcher::UrlEncoded("alt".into(), "sse".into()))
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["Pack light", ", bring ", "sunscreen."]))
            .create_async()
            .await;

        let stream = provider(&server.url()).stream(prompt()).await.unwrap();
        let fragments: Vec<String> = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(fragments, vec!["Pack light", ", bring ", "sunscreen."]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_stream_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error":{"code":403,"message":"Permission denied"}}"#)
            .create_async()
            .await;

        let err = match provider(&server.url()).stream(prompt()).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(matches!(err, ProviderError::Api { status: 403, ref message } if message == "Permission denied"));
    }

    #[tokio::test]
    async fn test_stream_error_mid_stream() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(
            "{}data: {}\n\n",
            sse_body(&["Start"]),
            r#"{"error":{"code":500,"message":"internal"}}"#
        );
        let _mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let items: Vec<_> = provider(&server.url())
            .stream(prompt())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Start");
        assert!(matches!(items[1], Err(ProviderError::Api { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_stream_ends_after_blocked_reply() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(
            "{}data: {}\r\n\r\n{}",
            sse_body(&["Here is a"]),
            r#"{"candidates":[{"content":{"parts":[{"text":" partial"}]},"finishReason":"SAFETY"}]}"#,
            sse_body(&["never sent"])
        );
        let _mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let items: Vec<_> = provider(&server.url())
            .stream(prompt())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), "Here is a");
        assert_eq!(items[1].as_ref().unwrap(), " partial");
        assert!(matches!(items[2], Err(ProviderError::Blocked(ref reason)) if reason.contains("SAFETY")));
    }
}
