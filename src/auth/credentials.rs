use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Cached credential in token.json, compatible with Google's `authorized_user` format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedUser {
    #[serde(rename = "type")]
    pub kind: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl AuthorizedUser {
    pub fn new(secrets: &ClientKey, refresh_token: impl Into<String>) -> Self {
        Self {
            kind: "authorized_user".to_string(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// The OAuth application's credentials.json as downloaded from the Google console.
#[derive(Debug, Deserialize)]
pub struct ClientSecrets {
    pub installed: Option<ClientKey>,
    pub web: Option<ClientKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientKey {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: Option<String>,
    pub token_uri: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl ClientKey {
    pub fn auth_uri(&self) -> &str {
        self.auth_uri.as_deref().unwrap_or(GOOGLE_AUTH_URI)
    }

    pub fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URI)
    }
}

impl ClientSecrets {
    pub fn key(self) -> Result<ClientKey> {
        self.installed
            .or(self.web)
            .ok_or_else(|| anyhow!("credentials file has neither an `installed` nor a `web` key"))
    }
}

pub struct CredentialStore {
    token_path: PathBuf,
    secrets_path: PathBuf,
}

impl CredentialStore {
    pub fn new(token_path: impl Into<PathBuf>, secrets_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
            secrets_path: secrets_path.into(),
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Load the cached credential. Any read or parse failure counts as "not authorized".
    pub fn load(&self) -> Option<AuthorizedUser> {
        let raw = match fs::read_to_string(&self.token_path) {
            Ok(s) => s,
            Err(e) => {
                log::debug!("No usable token cache at {}: {e}", self.token_path.display());
                return None;
            }
        };
        match serde_json::from_str::<AuthorizedUser>(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                log::warn!(
                    "Ignoring malformed token cache {}: {e}",
                    self.token_path.display()
                );
                None
            }
        }
    }

    pub fn persist(&self, user: &AuthorizedUser) -> Result<()> {
        if let Some(dir) = self.token_path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let s = serde_json::to_string(user)?;
        fs::write(&self.token_path, s)
            .with_context(|| format!("writing {}", self.token_path.display()))?;
        Ok(())
    }

    pub fn client_key(&self) -> Result<ClientKey> {
        let raw = fs::read_to_string(&self.secrets_path)
            .with_context(|| format!("reading {}", self.secrets_path.display()))?;
        let secrets: ClientSecrets = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.secrets_path.display()))?;
        secrets.key()
    }
}
