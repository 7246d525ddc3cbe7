use anyhow::{Result, anyhow};
use oauth2::TokenResponse;
use oauth2::basic::BasicClient;
use oauth2::reqwest::http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, Scope, TokenUrl,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tiny_http::{Response, Server};
use url::Url;

use crate::auth::credentials::{AuthorizedUser, ClientKey, GOOGLE_AUTH_URI};

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/gmail.modify",
];

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Tokens returned by the oauth flow (in-memory)
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

fn tokens_from<T: TokenResponse<oauth2::basic::BasicTokenType>>(token: &T) -> Tokens {
    Tokens {
        access_token: token.access_token().secret().to_string(),
        refresh_token: token.refresh_token().map(|r| r.secret().to_string()),
        expires_in: token.expires_in().map(|d| d.as_secs()),
    }
}

/// Exchange the cached refresh token for a fresh access token.
pub fn refresh_access_token(user: &AuthorizedUser, token_uri: &str) -> Result<Tokens> {
    let oauth_client = BasicClient::new(
        ClientId::new(user.client_id.clone()),
        Some(ClientSecret::new(user.client_secret.clone())),
        AuthUrl::new(GOOGLE_AUTH_URI.to_string())?,
        Some(TokenUrl::new(token_uri.to_string())?),
    );

    let rt = RefreshToken::new(user.refresh_token.clone());
    let token = oauth_client
        .exchange_refresh_token(&rt)
        .request(http_client)
        .map_err(|e| anyhow!("Token refresh failed: {e}"))?;

    Ok(tokens_from(&token))
}

/// Authorization Code + PKCE over a loopback redirect. Opens the system browser
/// and captures the code with a one-shot local server.
///
/// `port` 0 binds an ephemeral port; the redirect URI follows whatever was bound.
pub fn perform_loopback_flow(key: &ClientKey, port: u16) -> Result<Tokens> {
    // Listen first so the browser can't beat us to the callback.
    let server = Server::http(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        .map_err(|e| anyhow!("Failed to bind OAuth callback server on port {port}: {e:?}"))?;
    let bound = server.server_addr();
    let redirect_uri = format!("http://127.0.0.1:{}", bound.port());

    let oauth_client = BasicClient::new(
        ClientId::new(key.client_id.clone()),
        Some(ClientSecret::new(key.client_secret.clone())),
        AuthUrl::new(key.auth_uri().to_string())?,
        Some(TokenUrl::new(key.token_uri().to_string())?),
    )
    .set_redirect_uri(RedirectUrl::new(redirect_uri.clone())?);

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (auth_url, csrf_token) = oauth_client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(pkce_challenge)
        .url();

    println!("Open this URL in your browser:\n{auth_url}");
    if let Err(e) = open::that(auth_url.as_str()) {
        log::warn!("Could not open browser automatically: {e}");
    }

    let code = wait_for_code(&server, &redirect_uri, csrf_token.secret())?;

    let token = oauth_client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(pkce_verifier)
        .request(http_client)
        .map_err(|e| anyhow!("Token exchange failed: {e}"))?;

    Ok(tokens_from(&token))
}

fn wait_for_code(server: &Server, redirect_uri: &str, expected_state: &str) -> Result<String> {
    let wait_until = Instant::now() + CALLBACK_TIMEOUT;

    while Instant::now() < wait_until {
        let Ok(maybe_request) = server.recv_timeout(Duration::from_millis(500)) else {
            continue;
        };
        let Some(request) = maybe_request else {
            continue;
        };

        // request.url() is path+query, e.g. "/?state=...&code=..."
        let full = format!("{}{}", redirect_uri, request.url());
        let outcome = callback_code(&full, expected_state);

        let reply = match &outcome {
            Ok(Some(_)) => "Authorization received. You can close this tab.",
            Ok(None) => "No code found in redirect. You can close this tab.",
            Err(_) => "Authorization failed. You can close this tab.",
        };
        let _ = request.respond(Response::from_string(reply));

        if let Some(code) = outcome? {
            return Ok(code);
        }
    }

    Err(anyhow!("No authorization code received within {}s", CALLBACK_TIMEOUT.as_secs()))
}

/// Pull the authorization code out of the redirect URL.
/// `Ok(None)` means an unrelated request (favicon etc.), keep waiting.
fn callback_code(full_url: &str, expected_state: &str) -> Result<Option<String>> {
    let parsed = Url::parse(full_url).map_err(|e| anyhow!("Bad redirect {full_url}: {e}"))?;

    let mut code = None;
    let mut state = None;
    for (k, v) in parsed.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => return Err(anyhow!("Authorization denied: {v}")),
            _ => {}
        }
    }

    let Some(code) = code else {
        return Ok(None);
    };
    if state.as_deref() != Some(expected_state) {
        return Err(anyhow!("OAuth state mismatch in redirect"));
    }
    Ok(Some(code))
}
