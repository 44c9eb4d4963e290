//! REST API client for the medical backend
//!
//! Token-based access helpers and the medical-indicators endpoints. The
//! client attaches the stored credential as an `Authorization` header of the
//! form `{tokenType} {accessToken}`, transparently refreshes the access
//! token once on a 401, and retries the original request a single time.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::IndicatorSample;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Unexpected status: {0}")]
    Status(u16),
}

/// A (possibly partial) set of credentials to store. `None` fields leave the
/// stored value untouched, matching the backend's refresh response which may
/// omit a rotated refresh token.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
}

#[derive(Default)]
struct StoredTokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
}

/// Process-local credential store (the browser original kept these in
/// localStorage). Shared between the client and whoever handles login.
#[derive(Default)]
pub struct TokenStore {
    inner: RwLock<StoredTokens>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the given tokens; fields that are `None` keep their current value.
    pub fn set_tokens(&self, update: TokenSet) {
        let mut inner = self.inner.write().unwrap();
        if update.access_token.is_some() {
            inner.access_token = update.access_token;
        }
        if update.refresh_token.is_some() {
            inner.refresh_token = update.refresh_token;
        }
        if update.token_type.is_some() {
            inner.token_type = update.token_type;
        }
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap() = StoredTokens::default();
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.read().unwrap().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.read().unwrap().refresh_token.clone()
    }

    /// Token type, defaulting to `Bearer`.
    pub fn token_type(&self) -> String {
        self.inner
            .read()
            .unwrap()
            .token_type
            .clone()
            .unwrap_or_else(|| "Bearer".to_string())
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.read().unwrap().access_token.is_some()
    }

    /// `Authorization` header value, or None when not logged in.
    pub fn auth_header(&self) -> Option<String> {
        self.access_token()
            .map(|token| format!("{} {}", self.token_type(), token))
    }
}

/// Medical indicators payload as the backend DTO sees it: timestamp and
/// patient id are optional on submission and may be absent in generated
/// samples.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorsDto {
    pub heartrate: i32,
    pub temperature: f64,
    pub spo2: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IndicatorsDto {
    pub fn new(heartrate: i32, temperature: f64, spo2: i32, patient_id: i64) -> Self {
        Self {
            heartrate,
            temperature,
            spo2,
            patient_id: Some(patient_id),
            timestamp: None,
        }
    }
}

impl From<IndicatorSample> for IndicatorsDto {
    fn from(sample: IndicatorSample) -> Self {
        Self {
            heartrate: sample.heartrate,
            temperature: sample.temperature,
            spo2: sample.spo2,
            patient_id: Some(sample.patient_id),
            timestamp: Some(sample.timestamp),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// HTTP client for the backend REST API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: Arc::new(TokenStore::new()),
        }
    }

    /// Use a shared token store instead of a fresh one.
    pub fn with_tokens(mut self, tokens: Arc<TokenStore>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(header) = self.tokens.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Perform a request; on a 401 with a refresh token present, refresh the
    /// credential once and retry once. A failed refresh means the caller has
    /// to log in again.
    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let response = self.execute(method.clone(), path, body).await?;
        if response.status() == StatusCode::UNAUTHORIZED && self.tokens.refresh_token().is_some() {
            if !self.try_refresh().await? {
                return Err(ApiError::AuthRequired);
            }
            return self.execute(method, path, body).await;
        }
        Ok(response)
    }

    async fn try_refresh(&self) -> Result<bool, ApiError> {
        let refresh_token = match self.tokens.refresh_token() {
            Some(token) => token,
            None => return Ok(false),
        };
        let response = self
            .http
            .post(self.url("/api/auth/refresh"))
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            log::warn!("Token refresh rejected with status {}", response.status());
            return Ok(false);
        }
        let update: TokenSet = response.json().await?;
        if update.access_token.is_none() {
            return Ok(false);
        }
        self.tokens.set_tokens(update);
        log::debug!("Access token refreshed");
        Ok(true)
    }

    async fn into_json<T: for<'de> Deserialize<'de>>(
        response: Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }

    /// `GET /api/auth/me` — current user profile.
    pub async fn me(&self) -> Result<serde_json::Value, ApiError> {
        let response = self
            .request::<serde_json::Value>(Method::GET, "/api/auth/me", None)
            .await?;
        Self::into_json(response).await
    }

    /// `POST /api/auth/logout` — best-effort server-side revocation. The
    /// local session is cleared regardless of whether the server answered.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.tokens.refresh_token() {
            let result = self
                .http
                .post(self.url("/api/auth/logout"))
                .json(&RefreshRequest {
                    refresh_token: &refresh_token,
                })
                .send()
                .await;
            if let Err(e) = result {
                log::warn!("Logout request failed, clearing local session anyway: {}", e);
            }
        }
        self.tokens.clear();
    }

    /// `POST /api/medical-indicators/submit` — returns the server's
    /// processing acknowledgment (status, category, alert level).
    pub async fn submit_indicators(
        &self,
        indicators: &IndicatorsDto,
    ) -> Result<serde_json::Value, ApiError> {
        let response = self
            .request(Method::POST, "/api/medical-indicators/submit", Some(indicators))
            .await?;
        Self::into_json(response).await
    }

    /// `GET /api/medical-indicators/generate-random?includeCritical=`.
    pub async fn generate_random(&self, include_critical: bool) -> Result<IndicatorsDto, ApiError> {
        let path = format!(
            "/api/medical-indicators/generate-random?includeCritical={}",
            include_critical
        );
        let response = self.request::<()>(Method::GET, &path, None).await?;
        Self::into_json(response).await
    }

    /// `POST /api/medical-indicators/analyze`.
    pub async fn analyze(
        &self,
        indicators: &IndicatorsDto,
    ) -> Result<serde_json::Value, ApiError> {
        let response = self
            .request(Method::POST, "/api/medical-indicators/analyze", Some(indicators))
            .await?;
        Self::into_json(response).await
    }

    /// `GET /api/medical-indicators/patient/{id}/latest`.
    pub async fn latest_indicators(&self, patient_id: i64) -> Result<IndicatorsDto, ApiError> {
        let path = format!("/api/medical-indicators/patient/{}/latest", patient_id);
        let response = self.request::<()>(Method::GET, &path, None).await?;
        Self::into_json(response).await
    }
}
