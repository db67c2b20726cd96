//! LLM configuration persistence and provider selection.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{LLMConfigResponse, LLMConfigUpdate, LLMProvider, ResolvedProvider, VertexTarget};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_VERTEX_LOCATION: &str = "us-central1";

/// Stored LLM configuration (persisted to llm-config.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    #[serde(default = "default_preferred")]
    pub preferred_provider: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    /// Short-lived OAuth token; never written to disk.
    #[serde(skip)]
    pub vertex_access_token: Option<String>,
    #[serde(default)]
    pub vertex_project_id: Option<String>,
    #[serde(default = "default_vertex_location")]
    pub vertex_location: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_groq_model")]
    pub groq_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    /// Path to config file for saving.
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Credentials filled in from env vars at load time; never saved.
    #[serde(skip)]
    env_sourced: EnvSourced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EnvSourced {
    openai_api_key: bool,
    anthropic_api_key: bool,
    groq_api_key: bool,
    gemini_api_key: bool,
    vertex_project_id: bool,
}

/// Fill `slot` from env var `name` when it is empty. Returns whether it did.
fn fill_from_env(slot: &mut Option<String>, name: &str) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = std::env::var(name).ok().filter(|v| !v.is_empty());
    slot.is_some()
}

fn default_preferred() -> String {
    "auto".into()
}
fn default_vertex_location() -> String {
    DEFAULT_VERTEX_LOCATION.into()
}
fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.into()
}
fn default_anthropic_model() -> String {
    DEFAULT_ANTHROPIC_MODEL.into()
}
fn default_groq_model() -> String {
    DEFAULT_GROQ_MODEL.into()
}
fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.into()
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            preferred_provider: "auto".into(),
            openai_api_key: None,
            anthropic_api_key: None,
            groq_api_key: None,
            gemini_api_key: None,
            vertex_access_token: None,
            vertex_project_id: None,
            vertex_location: DEFAULT_VERTEX_LOCATION.into(),
            openai_model: DEFAULT_OPENAI_MODEL.into(),
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.into(),
            groq_model: DEFAULT_GROQ_MODEL.into(),
            gemini_model: DEFAULT_GEMINI_MODEL.into(),
            config_path: PathBuf::new(),
            env_sourced: EnvSourced::default(),
        }
    }
}

impl LLMConfig {
    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        let mut config: LLMConfig = std::fs::read_to_string(config_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        config.config_path = config_path.to_path_buf();

        // Env vars as fallback for credentials
        config.env_sourced = EnvSourced {
            openai_api_key: fill_from_env(&mut config.openai_api_key, "OPENAI_API_KEY"),
            anthropic_api_key: fill_from_env(&mut config.anthropic_api_key, "ANTHROPIC_API_KEY"),
            groq_api_key: fill_from_env(&mut config.groq_api_key, "GROQ_API_KEY"),
            gemini_api_key: fill_from_env(&mut config.gemini_api_key, "GEMINI_API_KEY"),
            vertex_project_id: fill_from_env(&mut config.vertex_project_id, "GOOGLE_CLOUD_PROJECT"),
        };
        fill_from_env(&mut config.vertex_access_token, "VERTEX_ACCESS_TOKEN");

        config
    }

    /// Save config to disk. Credentials that came from the environment stay
    /// out of the file.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.persisted()).map_err(std::io::Error::other)?;
        std::fs::write(&self.config_path, json)?;
        info!("Saved LLM config to {}", self.config_path.display());
        Ok(())
    }

    fn persisted(&self) -> Self {
        let mut copy = self.clone();
        let env = self.env_sourced;
        if env.openai_api_key {
            copy.openai_api_key = None;
        }
        if env.anthropic_api_key {
            copy.anthropic_api_key = None;
        }
        if env.groq_api_key {
            copy.groq_api_key = None;
        }
        if env.gemini_api_key {
            copy.gemini_api_key = None;
        }
        if env.vertex_project_id {
            copy.vertex_project_id = None;
        }
        copy
    }

    /// Apply an update, merging with existing config. Updated credentials are
    /// saved even if the environment supplied the previous value.
    pub fn apply_update(&mut self, update: &LLMConfigUpdate) {
        if let Some(p) = &update.preferred_provider {
            self.preferred_provider = p.clone();
        }
        if let Some(k) = &update.openai_api_key {
            self.openai_api_key = Some(k.clone());
            self.env_sourced.openai_api_key = false;
        }
        if let Some(k) = &update.anthropic_api_key {
            self.anthropic_api_key = Some(k.clone());
            self.env_sourced.anthropic_api_key = false;
        }
        if let Some(k) = &update.groq_api_key {
            self.groq_api_key = Some(k.clone());
            self.env_sourced.groq_api_key = false;
        }
        if let Some(k) = &update.gemini_api_key {
            self.gemini_api_key = Some(k.clone());
            self.env_sourced.gemini_api_key = false;
        }
        if let Some(t) = &update.vertex_access_token {
            self.vertex_access_token = Some(t.clone());
        }
        if let Some(p) = &update.vertex_project_id {
            self.vertex_project_id = Some(p.clone());
            self.env_sourced.vertex_project_id = false;
        }
        if let Some(m) = &update.openai_model {
            self.openai_model = m.clone();
        }
        if let Some(m) = &update.anthropic_model {
            self.anthropic_model = m.clone();
        }
        if let Some(m) = &update.groq_model {
            self.groq_model = m.clone();
        }
        if let Some(m) = &update.gemini_model {
            self.gemini_model = m.clone();
        }
    }

    /// Forget every credential held in memory.
    pub fn clear_credentials(&mut self) {
        self.openai_api_key = None;
        self.anthropic_api_key = None;
        self.groq_api_key = None;
        self.gemini_api_key = None;
        self.vertex_access_token = None;
        self.vertex_project_id = None;
        self.env_sourced = EnvSourced::default();
    }

    fn resolve(&self, provider: LLMProvider) -> Option<ResolvedProvider> {
        let (model, key, vertex) = match provider {
            LLMProvider::OpenAI => (&self.openai_model, self.openai_api_key.as_ref()?, None),
            LLMProvider::Anthropic => {
                (&self.anthropic_model, self.anthropic_api_key.as_ref()?, None)
            }
            LLMProvider::Groq => (&self.groq_model, self.groq_api_key.as_ref()?, None),
            LLMProvider::Gemini => (&self.gemini_model, self.gemini_api_key.as_ref()?, None),
            LLMProvider::Vertex => {
                let target = VertexTarget {
                    project_id: self.vertex_project_id.clone()?,
                    location: self.vertex_location.clone(),
                };
                (&self.gemini_model, self.vertex_access_token.as_ref()?, Some(target))
            }
        };
        Some(ResolvedProvider {
            provider,
            model: model.clone(),
            api_key: key.clone(),
            vertex,
        })
    }

    /// Resolve which provider and model to use.
    pub fn resolve_provider(&self) -> Option<ResolvedProvider> {
        // Explicit preference
        if self.preferred_provider != "auto" {
            return LLMProvider::parse(&self.preferred_provider).and_then(|p| self.resolve(p));
        }

        // Auto mode: Vertex > Gemini > Anthropic > Groq > OpenAI
        [
            LLMProvider::Vertex,
            LLMProvider::Gemini,
            LLMProvider::Anthropic,
            LLMProvider::Groq,
            LLMProvider::OpenAI,
        ]
        .into_iter()
        .find_map(|p| self.resolve(p))
    }

    /// Build the public config response (no credentials exposed).
    pub fn to_response(&self) -> LLMConfigResponse {
        let resolved = self.resolve_provider();
        LLMConfigResponse {
            preferred_provider: self.preferred_provider.clone(),
            openai_configured: self.openai_api_key.is_some(),
            anthropic_configured: self.anthropic_api_key.is_some(),
            groq_configured: self.groq_api_key.is_some(),
            gemini_configured: self.gemini_api_key.is_some(),
            vertex_configured: self.vertex_access_token.is_some()
                && self.vertex_project_id.is_some(),
            vertex_project_id: self.vertex_project_id.clone(),
            active_provider: resolved.as_ref().map(|r| r.provider.to_string()),
            active_model: resolved.map(|r| r.model),
        }
    }
}
