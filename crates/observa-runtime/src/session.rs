//! Session context: credentials, the editable prompt and scratch files for
//! one working session, with explicit teardown.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use observa_chat::{
    is_service_account_key, AccessTokenSource, HttpCompletionClient, LLMConfig, PromptTemplate,
    ServiceAccountTokens,
};
use observa_core::{Error, ObservaConfig, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// What the session currently knows about model credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialsStatus {
    pub configured: bool,
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    #[serde(rename = "credentialsPath")]
    pub credentials_path: Option<PathBuf>,
    #[serde(rename = "activeProvider")]
    pub active_provider: Option<String>,
}

/// Per-session state. Dropping the session tears it down.
pub struct Session {
    id: Uuid,
    config: ObservaConfig,
    dir: PathBuf,
    llm_config: RwLock<LLMConfig>,
    prompt: RwLock<PromptTemplate>,
    credentials_file: Mutex<Option<PathBuf>>,
    token_source: Arc<dyn AccessTokenSource>,
    temp_files: Mutex<Vec<PathBuf>>,
    closed: AtomicBool,
}

impl Session {
    /// Open a session with its own scratch directory under `temp/`.
    pub fn open(config: ObservaConfig) -> Result<Self> {
        let id = Uuid::new_v4();
        let dir = config.data_paths.temp.join(id.to_string());
        std::fs::create_dir_all(&dir)?;

        let llm_config = LLMConfig::load(&config.data_paths.llm_config_file);

        let prompt = match config.custom_prompt() {
            Some(text) => PromptTemplate::new(text).unwrap_or_else(|e| {
                warn!("Ignoring custom prompt: {}", e);
                PromptTemplate::default()
            }),
            None => PromptTemplate::default(),
        };

        info!("Session {} opened in {}", id, dir.display());

        Ok(Self {
            id,
            config,
            dir,
            llm_config: RwLock::new(llm_config),
            prompt: RwLock::new(prompt),
            credentials_file: Mutex::new(None),
            token_source: Arc::new(ServiceAccountTokens),
            temp_files: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Replace how service account keys are exchanged for access tokens.
    pub fn with_token_source(mut self, source: Arc<dyn AccessTokenSource>) -> Self {
        self.token_source = source;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &ObservaConfig {
        &self.config
    }

    pub fn llm_config(&self) -> &RwLock<LLMConfig> {
        &self.llm_config
    }

    /// Snapshot of the active prompt.
    pub fn prompt(&self) -> PromptTemplate {
        self.prompt.read().clone()
    }

    pub fn update_prompt(&self, text: &str) -> Result<()> {
        let template = PromptTemplate::new(text)?;
        *self.prompt.write() = template;
        info!("Prompt updated");
        Ok(())
    }

    pub fn restore_default_prompt(&self) {
        *self.prompt.write() = PromptTemplate::default();
        info!("Prompt restored to default");
    }

    /// Install an uploaded credentials file.
    ///
    /// The file is written into the session directory. A service account key
    /// is exchanged for a Vertex AI access token for its `project_id`; an
    /// `api_key` entry is used as the Gemini API key. If the exchange fails
    /// the file is removed and the error returned.
    pub async fn install_credentials(&self, raw: &[u8]) -> Result<CredentialsStatus> {
        let parsed: serde_json::Value = serde_json::from_slice(raw)?;
        let obj = parsed
            .as_object()
            .ok_or_else(|| Error::Config("Credentials file must be a JSON object".into()))?;
        let project = obj.get("project_id").and_then(|v| v.as_str());
        let api_key = obj.get("api_key").and_then(|v| v.as_str());
        let service_account = is_service_account_key(&parsed);
        if !service_account && api_key.is_none() {
            return Err(Error::Config(
                "Credentials file holds neither a service account key nor an api_key".into(),
            ));
        }

        let path = self.dir.join("credentials.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&parsed)?)?;

        let token = if service_account {
            match self.token_source.access_token(&path).await {
                Ok(token) => Some(token),
                Err(e) => {
                    remove_quietly(&path);
                    self.credentials_file.lock().take();
                    return Err(e);
                }
            }
        } else {
            None
        };

        if let Some(old) = self.credentials_file.lock().replace(path.clone()) {
            if old != path {
                remove_quietly(&old);
            }
        }

        {
            let mut llm = self.llm_config.write();
            if let Some(project) = project {
                llm.vertex_project_id = Some(project.to_string());
            }
            if let Some(key) = api_key {
                llm.gemini_api_key = Some(key.to_string());
            }
            if token.is_some() {
                llm.vertex_access_token = token;
            }
        }

        info!("Credentials installed at {}", path.display());
        Ok(self.credentials_status())
    }

    pub fn credentials_status(&self) -> CredentialsStatus {
        let llm = self.llm_config.read();
        let resolved = llm.resolve_provider();
        CredentialsStatus {
            configured: resolved.is_some(),
            project_id: llm.vertex_project_id.clone(),
            credentials_path: self.credentials_file.lock().clone(),
            active_provider: resolved.map(|r| r.provider.to_string()),
        }
    }

    /// Remove the stored credentials file and forget all keys.
    pub fn clear_credentials(&self) {
        if let Some(path) = self.credentials_file.lock().take() {
            remove_quietly(&path);
        }
        self.llm_config.write().clear_credentials();
        info!("Credentials cleared");
    }

    /// Completion client for the currently resolved provider.
    pub fn completion_client(&self) -> Result<HttpCompletionClient> {
        HttpCompletionClient::from_config(&self.llm_config.read())
    }

    /// Register a file to delete at teardown.
    pub fn track_temp_file(&self, path: impl Into<PathBuf>) {
        self.temp_files.lock().push(path.into());
    }

    /// A tracked path inside the session directory.
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        let path = self.dir.join(name);
        self.track_temp_file(path.clone());
        path
    }

    /// Clear credentials and delete every scratch file. Idempotent.
    pub fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.clear_credentials();
        for path in self.temp_files.lock().drain(..) {
            remove_quietly(&path);
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.dir.display(), e);
            }
        }
        info!("Session {} closed", self.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
