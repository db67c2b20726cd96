//! Completion service types.

use serde::{Deserialize, Serialize};

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Anthropic,
    Groq,
    Gemini,
    Vertex,
}

impl LLMProvider {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "anthropic" => Some(Self::Anthropic),
            "groq" => Some(Self::Groq),
            "gemini" => Some(Self::Gemini),
            "vertex" => Some(Self::Vertex),
            _ => None,
        }
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Groq => write!(f, "groq"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Vertex => write!(f, "vertex"),
        }
    }
}

/// Decoding parameters sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: usize,
    pub temperature: f64,
    #[serde(rename = "topP")]
    pub top_p: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 8192,
            temperature: 1.0,
            top_p: 0.95,
        }
    }
}

/// Google Cloud project coordinates for Vertex AI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexTarget {
    pub project_id: String,
    pub location: String,
}

/// A provider selection with everything needed to call it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub provider: LLMProvider,
    pub model: String,
    /// API key, or OAuth access token for Vertex.
    pub api_key: String,
    pub vertex: Option<VertexTarget>,
}

/// LLM config status (keys masked).
#[derive(Debug, Clone, Serialize)]
pub struct LLMConfigResponse {
    #[serde(rename = "preferredProvider")]
    pub preferred_provider: String,
    #[serde(rename = "openaiConfigured")]
    pub openai_configured: bool,
    #[serde(rename = "anthropicConfigured")]
    pub anthropic_configured: bool,
    #[serde(rename = "groqConfigured")]
    pub groq_configured: bool,
    #[serde(rename = "geminiConfigured")]
    pub gemini_configured: bool,
    #[serde(rename = "vertexConfigured")]
    pub vertex_configured: bool,
    #[serde(rename = "vertexProjectId")]
    pub vertex_project_id: Option<String>,
    #[serde(rename = "activeProvider")]
    pub active_provider: Option<String>,
    #[serde(rename = "activeModel")]
    pub active_model: Option<String>,
}

/// LLM config update request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LLMConfigUpdate {
    #[serde(rename = "preferredProvider")]
    pub preferred_provider: Option<String>,
    #[serde(rename = "openaiApiKey")]
    pub openai_api_key: Option<String>,
    #[serde(rename = "anthropicApiKey")]
    pub anthropic_api_key: Option<String>,
    #[serde(rename = "groqApiKey")]
    pub groq_api_key: Option<String>,
    #[serde(rename = "geminiApiKey")]
    pub gemini_api_key: Option<String>,
    #[serde(rename = "vertexAccessToken")]
    pub vertex_access_token: Option<String>,
    #[serde(rename = "vertexProjectId")]
    pub vertex_project_id: Option<String>,
    #[serde(rename = "openaiModel")]
    pub openai_model: Option<String>,
    #[serde(rename = "anthropicModel")]
    pub anthropic_model: Option<String>,
    #[serde(rename = "groqModel")]
    pub groq_model: Option<String>,
    #[serde(rename = "geminiModel")]
    pub gemini_model: Option<String>,
}
