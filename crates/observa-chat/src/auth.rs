//! Vertex AI access tokens from a Google service account key.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use gcp_auth::{CustomServiceAccount, TokenProvider};
use observa_core::{Error, Result};
use serde_json::Value;
use tracing::debug;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Turns a key file on disk into a short-lived bearer token.
pub trait AccessTokenSource: Send + Sync {
    fn access_token<'a>(&'a self, key_file: &'a Path) -> BoxedFuture<'a, Result<String>>;
}

/// Signs a JWT with the key's private key and exchanges it at Google's
/// token endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceAccountTokens;

impl AccessTokenSource for ServiceAccountTokens {
    fn access_token<'a>(&'a self, key_file: &'a Path) -> BoxedFuture<'a, Result<String>> {
        Box::pin(async move {
            let account = CustomServiceAccount::from_file(key_file)
                .map_err(|e| Error::Config(format!("Invalid service account key: {}", e)))?;
            let token = account
                .token(&[CLOUD_PLATFORM_SCOPE])
                .await
                .map_err(|e| Error::Provider(format!("Token exchange failed: {}", e)))?;
            debug!("Obtained Vertex AI access token from {}", key_file.display());
            Ok(token.as_str().to_string())
        })
    }
}

/// Whether `value` looks like a service account key (as downloaded from the
/// Cloud console).
pub fn is_service_account_key(value: &Value) -> bool {
    value["type"] == "service_account"
        && value["private_key"].is_string()
        && value["client_email"].is_string()
}
