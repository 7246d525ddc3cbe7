use anyhow::Result;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::auth::credentials::{AuthorizedUser, CredentialStore, GOOGLE_TOKEN_URI};
use crate::auth::oauth::{self, Tokens};

/// Refresh this long before Google says the token expires.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);
/// Used when the token endpoint omits `expires_in`.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3500);

/// Anything that can hand out a bearer token for the mail API.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Result<String>;
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct TokenManager {
    user: AuthorizedUser,
    token_uri: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(user: AuthorizedUser) -> Self {
        Self {
            user,
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Refresh against the token endpoint named in the store's client secrets,
    /// or Google's default when that file is absent or unreadable.
    pub fn for_store(user: AuthorizedUser, store: &CredentialStore) -> Self {
        match store.client_key() {
            Ok(key) => Self::new(user).with_token_uri(key.token_uri()),
            Err(e) => {
                log::debug!("Using default token endpoint: {e:#}");
                Self::new(user)
            }
        }
    }

    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    /// Seed the cache with a token obtained elsewhere (e.g. the interactive flow).
    pub fn with_tokens(self, tokens: &Tokens) -> Self {
        self.store(tokens);
        self
    }

    pub fn user(&self) -> &AuthorizedUser {
        &self.user
    }

    fn store(&self, tokens: &Tokens) {
        let lifetime = tokens
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LIFETIME);
        let mut cached = self.cached.lock().unwrap_or_else(|p| p.into_inner());
        *cached = Some(CachedToken {
            access_token: tokens.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
    }
}

impl TokenSource for TokenManager {
    /// Returns a valid access token, refreshing through the token endpoint when needed.
    fn access_token(&self) -> Result<String> {
        {
            let cached = self.cached.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(c) = cached.as_ref()
                && Instant::now() + EXPIRY_SKEW < c.expires_at
            {
                return Ok(c.access_token.clone());
            }
        }

        log::debug!("Refreshing Gmail access token");
        let tokens = oauth::refresh_access_token(&self.user, &self.token_uri)?;
        self.store(&tokens);
        Ok(tokens.access_token)
    }
}

/// Load the cached credential or fall back to `interactive`, persisting whatever it yields.
///
/// Returns the credential plus any tokens the interactive path already produced.
pub fn authorize<F>(
    store: &CredentialStore,
    interactive: F,
) -> Result<(AuthorizedUser, Option<Tokens>)>
where
    F: FnOnce() -> Result<(AuthorizedUser, Tokens)>,
{
    if let Some(user) = store.load() {
        log::info!("Using cached credentials from {}", store.token_path().display());
        return Ok((user, None));
    }

    log::info!("No cached credentials; starting interactive authorization");
    let (user, tokens) = interactive()?;
    store.persist(&user)?;
    log::info!("Saved credentials to {}", store.token_path().display());
    Ok((user, Some(tokens)))
}

/// Interactive authorization against the app's client secrets.
pub fn authorize_interactively(
    store: &CredentialStore,
    redirect_port: u16,
) -> Result<(AuthorizedUser, Tokens)> {
    let key = store.client_key()?;
    let tokens = oauth::perform_loopback_flow(&key, redirect_port)?;
    let refresh = tokens.refresh_token.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "Authorization server returned no refresh token; revoke the app's access and retry"
        )
    })?;
    Ok((AuthorizedUser::new(&key, refresh), tokens))
}
