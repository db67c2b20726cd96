//! External LLM provider streaming implementations.
//!
//! Each provider streams text increments via SSE from its API. OpenAI and
//! Groq share one format, Gemini and Vertex AI share another, Anthropic has
//! its own.

use std::pin::Pin;

use futures::Stream;
use observa_core::{Error, Result};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tracing::{debug, error};

use crate::config::LLMConfig;
use crate::types::{GenerationConfig, LLMProvider, ResolvedProvider};

/// Boxed stream type for returning different stream implementations.
pub type BoxedStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// A single streamed text increment, end marker, or error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Token(String),
    Done { tokens_used: usize },
    Error(String),
}

/// A text-completion service: one prompt in, a stream of text chunks out.
pub trait CompletionBackend: Send + Sync {
    fn stream(&self, prompt: &str, generation: &GenerationConfig) -> BoxedStream;

    /// Short label for logs, e.g. `gemini/gemini-1.5-pro`.
    fn describe(&self) -> String;
}

/// Completion backend backed by one of the HTTP providers.
pub struct HttpCompletionClient {
    client: Client,
    target: ResolvedProvider,
}

impl HttpCompletionClient {
    pub fn new(target: ResolvedProvider) -> Self {
        Self {
            client: Client::new(),
            target,
        }
    }

    /// Build a client for whichever provider the config resolves to.
    pub fn from_config(config: &LLMConfig) -> Result<Self> {
        config
            .resolve_provider()
            .map(Self::new)
            .ok_or_else(|| Error::Config("No LLM provider configured".into()))
    }
}

impl CompletionBackend for HttpCompletionClient {
    fn stream(&self, prompt: &str, generation: &GenerationConfig) -> BoxedStream {
        stream_llm(&self.client, &self.target, prompt, generation)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.target.provider, self.target.model)
    }
}

/// Stream tokens from the appropriate provider.
pub fn stream_llm(
    client: &Client,
    target: &ResolvedProvider,
    prompt: &str,
    generation: &GenerationConfig,
) -> BoxedStream {
    let prompt = prompt.to_string();
    let generation = *generation;
    match target.provider {
        LLMProvider::OpenAI => Box::pin(stream_openai_compat(
            client.clone(),
            "https://api.openai.com/v1/chat/completions",
            prompt,
            target.model.clone(),
            target.api_key.clone(),
            generation,
        )),
        LLMProvider::Groq => Box::pin(stream_openai_compat(
            client.clone(),
            "https://api.groq.com/openai/v1/chat/completions",
            prompt,
            target.model.clone(),
            target.api_key.clone(),
            generation,
        )),
        LLMProvider::Anthropic => Box::pin(stream_anthropic(
            client.clone(),
            prompt,
            target.model.clone(),
            target.api_key.clone(),
            generation,
        )),
        LLMProvider::Gemini | LLMProvider::Vertex => Box::pin(stream_gemini(
            client.clone(),
            gemini_url(target),
            google_auth(target),
            prompt,
            generation,
        )),
    }
}

/// How a Google endpoint expects to be authenticated.
#[derive(Debug, Clone)]
enum GoogleAuth {
    ApiKey(String),
    Bearer(String),
}

impl GoogleAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            GoogleAuth::ApiKey(key) => request.header("x-goog-api-key", key),
            GoogleAuth::Bearer(token) => request.bearer_auth(token),
        }
    }
}

fn google_auth(target: &ResolvedProvider) -> GoogleAuth {
    match target.provider {
        LLMProvider::Vertex => GoogleAuth::Bearer(target.api_key.clone()),
        _ => GoogleAuth::ApiKey(target.api_key.clone()),
    }
}

/// Streaming endpoint for Gemini or Vertex AI.
fn gemini_url(target: &ResolvedProvider) -> String {
    match &target.vertex {
        Some(v) => format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}/publishers/google/models/{model}:streamGenerateContent?alt=sse",
            loc = v.location,
            project = v.project_id,
            model = target.model,
        ),
        None => format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:streamGenerateContent?alt=sse",
            target.model
        ),
    }
}

/// Pop every complete SSE `data:` payload off the buffer, keeping any
/// trailing partial line for the next read.
///
/// Works on bytes so multi-byte characters split across network reads are
/// only decoded once the whole line has arrived.
fn drain_sse_data(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=line_end).collect();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();

        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            payloads.push(data.trim_start().to_string());
        }
    }
    payloads
}

/// Concatenated text parts of the first Gemini candidate.
fn gemini_text(parsed: &Value) -> Option<String> {
    let parts = parsed["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Stream from OpenAI-compatible APIs (OpenAI, Groq).
fn stream_openai_compat(
    client: Client,
    url: &str,
    prompt: String,
    model: String,
    api_key: String,
    generation: GenerationConfig,
) -> impl Stream<Item = StreamChunk> + Send + 'static {
    let url = url.to_string();

    async_stream::stream! {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": generation.temperature,
            "top_p": generation.top_p,
            "max_tokens": generation.max_output_tokens,
            "stream": true,
        });

        debug!("Streaming from {} with model {}", url, model);

        let response = match client
            .post(&url)
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                yield StreamChunk::Error(format!("Request failed: {}", e));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            yield StreamChunk::Error(format!("API error {}: {}", status, body));
            return;
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        let mut token_count = 0usize;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    yield StreamChunk::Error(format!("Stream read error: {}", e));
                    return;
                }
            };
            buffer.extend_from_slice(&bytes);

            for data in drain_sse_data(&mut buffer) {
                if data.trim() == "[DONE]" {
                    yield StreamChunk::Done { tokens_used: token_count };
                    return;
                }
                if let Ok(parsed) = serde_json::from_str::<Value>(&data) {
                    if let Some(content) = parsed["choices"][0]["delta"]["content"].as_str() {
                        if !content.is_empty() {
                            token_count += 1;
                            yield StreamChunk::Token(content.to_string());
                        }
                    }
                }
            }
        }

        yield StreamChunk::Done { tokens_used: token_count };
    }
}

/// Stream from Anthropic's Messages API.
fn stream_anthropic(
    client: Client,
    prompt: String,
    model: String,
    api_key: String,
    generation: GenerationConfig,
) -> impl Stream<Item = StreamChunk> + Send + 'static {
    async_stream::stream! {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": generation.temperature,
            "top_p": generation.top_p,
            "max_tokens": generation.max_output_tokens,
            "stream": true,
        });

        debug!("Streaming from Anthropic with model {}", model);

        let response = match client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                yield StreamChunk::Error(format!("Request failed: {}", e));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            yield StreamChunk::Error(format!("API error {}: {}", status, body));
            return;
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        let mut token_count = 0usize;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    yield StreamChunk::Error(format!("Stream read error: {}", e));
                    return;
                }
            };
            buffer.extend_from_slice(&bytes);

            // Anthropic interleaves "event: " lines; only data lines matter
            for data in drain_sse_data(&mut buffer) {
                let Ok(parsed) = serde_json::from_str::<Value>(&data) else {
                    continue;
                };
                match parsed["type"].as_str() {
                    Some("content_block_delta") => {
                        if let Some(text) = parsed["delta"]["text"].as_str() {
                            if !text.is_empty() {
                                token_count += 1;
                                yield StreamChunk::Token(text.to_string());
                            }
                        }
                    }
                    Some("message_stop") => {
                        yield StreamChunk::Done { tokens_used: token_count };
                        return;
                    }
                    Some("error") => {
                        let msg = parsed["error"]["message"]
                            .as_str()
                            .unwrap_or("Unknown error");
                        error!("Anthropic error: {}", msg);
                        yield StreamChunk::Error(msg.to_string());
                        return;
                    }
                    _ => {}
                }
            }
        }

        yield StreamChunk::Done { tokens_used: token_count };
    }
}

/// Stream from Gemini `streamGenerateContent` (Google AI or Vertex AI).
fn stream_gemini(
    client: Client,
    url: String,
    auth: GoogleAuth,
    prompt: String,
    generation: GenerationConfig,
) -> impl Stream<Item = StreamChunk> + Send + 'static {
    async_stream::stream! {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": generation,
        });

        debug!("Streaming from {}", url);

        let response = match auth.apply(client.post(&url)).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                yield StreamChunk::Error(format!("Request failed: {}", e));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            yield StreamChunk::Error(format!("API error {}: {}", status, body));
            return;
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        let mut token_count = 0usize;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    yield StreamChunk::Error(format!("Stream read error: {}", e));
                    return;
                }
            };
            buffer.extend_from_slice(&bytes);

            for data in drain_sse_data(&mut buffer) {
                let Ok(parsed) = serde_json::from_str::<Value>(&data) else {
                    continue;
                };
                if let Some(msg) = parsed["error"]["message"].as_str() {
                    error!("Gemini error: {}", msg);
                    yield StreamChunk::Error(msg.to_string());
                    return;
                }
                if let Some(n) = parsed["usageMetadata"]["candidatesTokenCount"].as_u64() {
                    token_count = n as usize;
                }
                if let Some(text) = gemini_text(&parsed) {
                    yield StreamChunk::Token(text);
                }
            }
        }

        yield StreamChunk::Done { tokens_used: token_count };
    }
}

/// Verify credentials by making a minimal authenticated request.
pub async fn check_credentials(target: &ResolvedProvider) -> Result<()> {
    let client = Client::new();

    let request = match target.provider {
        LLMProvider::OpenAI => client
            .get("https://api.openai.com/v1/models")
            .bearer_auth(&target.api_key),
        LLMProvider::Groq => client
            .get("https://api.groq.com/openai/v1/models")
            .bearer_auth(&target.api_key),
        LLMProvider::Anthropic => client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &target.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&json!({
                "model": target.model,
                "max_tokens": 1,
                "messages": [{"role": "user", "content": "Hola"}],
            })),
        LLMProvider::Gemini => client
            .get("https://generativelanguage.googleapis.com/v1beta/models")
            .header("x-goog-api-key", &target.api_key),
        LLMProvider::Vertex => client
            .get("https://oauth2.googleapis.com/tokeninfo")
            .query(&[("access_token", target.api_key.as_str())]),
    };

    let resp = request
        .send()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(Error::Provider(format!(
            "{} returned status {}",
            target.provider,
            resp.status()
        )))
    }
}
