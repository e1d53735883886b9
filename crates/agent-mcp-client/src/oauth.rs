//! OAuth 2.0 authorization-code + PKCE flow used to obtain tokens for a
//! remote MCP server.

use secrecy::Secret;

use crate::error::{Error, Result};
use crate::pkce::{PkceChallenge, generate_pkce, generate_state};
use crate::types::OAuthTokens;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

pub struct AuthorizationRequest {
    pub url: String,
    pub pkce: PkceChallenge,
    pub state: String,
}

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

    pub fn start(&self) -> Result<AuthorizationRequest> {
        let pkce = generate_pkce();
        let state = generate_state();

        let mut url = url::Url::parse(&self.config.auth_url).map_err(|e| Error::OAuth(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &state);
        if !self.config.scopes.is_empty() {
            url.query_pairs_mut().append_pair("scope", &self.config.scopes.join(" "));
        }

        Ok(AuthorizationRequest {
            url: url.to_string(),
            pkce,
            state,
        })
    }

    pub async fn exchange(&self, code: &str, verifier: &str) -> Result<OAuthTokens> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
            ("client_id", &self.config.client_id),
            ("code_verifier", verifier),
        ];
        let resp = self.client.post(&self.config.token_url).form(&form).send().await?;
        let resp = resp.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        parse_token_response(&body)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
        ];
        let resp = self.client.post(&self.config.token_url).form(&form).send().await?;
        let resp = resp.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        parse_token_response(&body)
    }
}

fn parse_token_response(resp: &serde_json::Value) -> Result<OAuthTokens> {
    let access_token = resp
        .get("access_token")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| Error::OAuth("missing access_token in token response".to_string()))?
        .to_string();
    let refresh_token = resp.get("refresh_token").and_then(serde_json::Value::as_str).map(str::to_string);
    let expires_at = resp.get("expires_in").and_then(serde_json::Value::as_u64).and_then(|secs| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs() + secs)
    });

    Ok(OAuthTokens {
        access_token: Secret::new(access_token),
        refresh_token: refresh_token.map(Secret::new),
        expires_at,
    })
}
