//! OAuth 2.0 authorization code flow.
//!
//! # Flow Overview
//!
//! 1. Generate a random `state` with [`generate_state`].
//! 2. Send the user to [`OAuthFlow::authorization_url`].
//! 3. Receive the authorization code (and `state`) on the redirect.
//! 4. Check the state with [`verify_state`] and exchange the code for an
//!    access token with [`OAuthFlow::exchange_code`].
//!
//! The resulting token is handed to
//! [`AuthStateStore::set_access_token`](crate::AuthStateStore::set_access_token).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, Result};

/// Length of the CSRF state in bytes (before base64 encoding).
const STATE_BYTES: usize = 24;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for an OAuth 2.0 authorization code flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// The OAuth client ID.
    pub client_id: String,

    /// The OAuth client secret (confidential clients only).
    pub client_secret: Option<String>,

    /// The authorization endpoint URL.
    pub auth_url: String,

    /// The token endpoint URL.
    pub token_url: String,

    /// The redirect URI registered with the authorization server.
    pub redirect_uri: String,

    /// The scopes to request.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Fail early on a config that cannot possibly work.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::InvalidConfig {
                reason: "missing client_id".to_string(),
            });
        }
        Url::parse(&self.auth_url)?;
        Url::parse(&self.token_url)?;
        Ok(())
    }
}

/// Raw token response from the authorization server.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// Raw error response from the authorization server.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// State helpers
// ---------------------------------------------------------------------------

/// Generate a random CSRF `state` value (base64url, no padding).
pub fn generate_state() -> Result<String> {
    let mut bytes = [0u8; STATE_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AuthError::Random)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Check that the redirect carried back the state we sent.
pub fn verify_state(expected: &str, returned: &str) -> Result<()> {
    if expected.is_empty() || expected != returned {
        return Err(AuthError::StateMismatch);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// OAuth flow
// ---------------------------------------------------------------------------

/// Builds authorization URLs and exchanges codes for access tokens.
pub struct OAuthFlow {
    config: OAuthConfig,
    client: reqwest::Client,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the authorization URL the user should visit.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UrlParse`] if the `auth_url` in the config is not
    /// a valid URL.
    pub fn authorization_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("redirect_uri", &self.config.redirect_uri);
            params.append_pair("state", state);

            if !self.config.scopes.is_empty() {
                params.append_pair("scope", &self.config.scopes.join(" "));
            }
        }

        Ok(url.to_string())
    }

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidGrant`] if the server rejects the code, or
    /// [`AuthError::Network`] on transport failure.
    pub async fn exchange_code(&self, code: &str) -> Result<String> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        tracing::debug!(token_url = %self.config.token_url, "exchanging authorization code");

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        Self::parse_token_response(response).await
    }

    async fn parse_token_response(response: reqwest::Response) -> Result<String> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            parse_token_body(&body)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::InvalidGrant {
                reason: parse_error_body(&body).unwrap_or_else(|| format!("HTTP {status}: {body}")),
            })
        }
    }
}

fn parse_token_body(body: &str) -> Result<String> {
    match serde_json::from_str::<TokenResponse>(body) {
        Ok(token) => {
            match token.token_type.as_deref() {
                Some(kind) if !kind.eq_ignore_ascii_case("bearer") => {
                    tracing::warn!(token_type = kind, "unexpected token type");
                }
                _ => {}
            }
            tracing::debug!("token exchange successful");
            Ok(token.access_token)
        }
        Err(_) => Err(AuthError::InvalidGrant {
            reason: parse_error_body(body)
                .unwrap_or_else(|| "token response has no access_token".to_string()),
        }),
    }
}

fn parse_error_body(body: &str) -> Option<String> {
    serde_json::from_str::<TokenErrorResponse>(body)
        .ok()
        .map(|e| e.error_description.unwrap_or(e.error))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
