use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{ReminderError, Result};
use crate::models::session::Session;

const LOGIN_HOST: &str = "https://login.microsoftonline.com";
const SCOPES: &[&str] = &["openid", "Calendars.Read", "offline_access"];
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl OAuthSettings {
    /// Microsoft identity platform endpoints for `tenant`, redirecting back
    /// to the local callback on `port`.
    pub fn microsoft(client_id: &str, client_secret: &str, tenant: &str, port: u16) -> Result<Self> {
        let mut base = Url::parse(LOGIN_HOST)
            .map_err(|e| ReminderError::InvalidConfig(format!("login host: {e}")))?;
        base.path_segments_mut()
            .map_err(|_| ReminderError::InvalidConfig("login host cannot be a base".to_string()))?
            .push(tenant)
            .push("oauth2")
            .push("v2.0");
        let base = base.as_str().trim_end_matches('/').to_string();

        Ok(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            authorize_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
            redirect_uri: format!("http://localhost:{port}/callback"),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        })
    }
}

/// Turns authorization codes and refresh tokens into sessions.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    fn authorize_url(&self, state: &str) -> Result<String>;

    async fn exchange_code(&self, code: &str) -> Result<Session>;

    async fn renew(&self, session: &Session) -> Result<Session>;
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    client: Client,
    settings: OAuthSettings,
}

#[derive(Debug, Deserialize)]
struct TokenResponsePayload {
    access_token: Option<String>,
    token_type: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            settings,
        }
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    async fn post_form(&self, params: &[(&str, String)]) -> Result<Session> {
        let response = self
            .client
            .post(&self.settings.token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|error| ReminderError::OAuth(format!("request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| ReminderError::OAuth(format!("failed reading token response: {error}")))?;

        let parsed = serde_json::from_str::<TokenResponsePayload>(&body).map_err(|error| {
            ReminderError::OAuth(format!("invalid token response payload: {error}; body={body}"))
        })?;

        if !status.is_success() || parsed.error.is_some() {
            let code = parsed.error.unwrap_or_else(|| format!("http_{}", status.as_u16()));
            let detail = parsed.error_description.unwrap_or(body);
            return Err(ReminderError::OAuth(format!("token endpoint error: {code}; {detail}")));
        }

        let access_token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ReminderError::OAuth("token response has no access_token".to_string()))?;

        Ok(Session {
            access_token,
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: parsed.refresh_token,
            expiry: parsed
                .expires_in
                .filter(|seconds| *seconds > 0)
                .map(|seconds| Utc::now() + Duration::seconds(seconds)),
        })
    }
}

#[async_trait]
impl TokenExchanger for OAuthClient {
    fn authorize_url(&self, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &self.settings.authorize_endpoint,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("scope", self.settings.scopes.join(" ").as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| ReminderError::InvalidConfig(format!("authorize endpoint: {e}")))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<Session> {
        self.post_form(&[
            ("grant_type", "authorization_code".to_string()),
            ("client_id", self.settings.client_id.clone()),
            ("client_secret", self.settings.client_secret.clone()),
            ("redirect_uri", self.settings.redirect_uri.clone()),
            ("scope", self.settings.scopes.join(" ")),
            ("code", code.to_string()),
        ])
        .await
    }

    async fn renew(&self, session: &Session) -> Result<Session> {
        let refresh_token = session
            .refresh_token
            .clone()
            .ok_or_else(|| ReminderError::OAuth("session has no refresh token".to_string()))?;
        let mut renewed = self
            .post_form(&[
                ("grant_type", "refresh_token".to_string()),
                ("client_id", self.settings.client_id.clone()),
                ("client_secret", self.settings.client_secret.clone()),
                ("scope", self.settings.scopes.join(" ")),
                ("refresh_token", refresh_token.clone()),
            ])
            .await?;
        // Providers may omit the refresh token when it is unchanged.
        if renewed.refresh_token.is_none() {
            renewed.refresh_token = Some(refresh_token);
        }
        Ok(renewed)
    }
}
