//! Graph API client over HTTP

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{
    AppCredentials, ContainerRequest, ContainerStatus, CreationId, ExchangedToken, GraphApi,
    MediaId, TokenIntrospection,
};
use crate::error::{PlatformError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GraphClient {
    http: Client,
    /// Versioned root, e.g. `https://graph.facebook.com/v18.0`
    root: String,
    account_id: String,
    access_token: SecretString,
}

impl GraphClient {
    /// Create a client for one business account
    pub fn new(root: &str, account_id: &str, access_token: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            root: root.trim_end_matches('/').to_string(),
            account_id: account_id.to_string(),
            access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.root, path.trim_start_matches('/'))
    }

    /// Send a request and decode the JSON body, turning graph errors into
    /// [`PlatformError`]s
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        // Drop the URL from transport errors; it carries the access token
        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PlatformError::Network(e.without_url().to_string()))?;

        debug!("Graph API responded {} ({} bytes)", status, body.len());

        let value: Value = serde_json::from_str(&body).map_err(|_| {
            PlatformError::UnexpectedResponse(format!("HTTP {}: {}", status.as_u16(), truncate(&body)))
        })?;

        if let Some(error) = parse_graph_error(&value) {
            return Err(error.into());
        }

        Ok(value)
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn create_container(&self, request: &ContainerRequest) -> Result<CreationId> {
        let url = self.url(&format!("{}/media", self.account_id));
        let body = self
            .send(
                self.http
                    .post(url)
                    .query(request)
                    .query(&[("access_token", self.access_token.expose_secret())]),
            )
            .await?;

        Ok(CreationId(extract_id(&body)?))
    }

    async fn publish(&self, creation_id: &CreationId) -> Result<MediaId> {
        let url = self.url(&format!("{}/media_publish", self.account_id));
        let body = self
            .send(self.http.post(url).query(&[
                ("creation_id", creation_id.0.as_str()),
                ("access_token", self.access_token.expose_secret()),
            ]))
            .await?;

        Ok(MediaId(extract_id(&body)?))
    }

    async fn container_status(&self, creation_id: &CreationId) -> Result<ContainerStatus> {
        let url = self.url(&creation_id.0);
        let body = self
            .send(self.http.get(url).query(&[
                ("fields", "status_code,status"),
                ("access_token", self.access_token.expose_secret()),
            ]))
            .await?;

        let status_code = body
            .get("status_code")
            .and_then(Value::as_str)
            .ok_or_else(|| PlatformError::UnexpectedResponse(truncate(&body.to_string())))?;

        Ok(ContainerStatus::from_api(
            status_code,
            body.get("status").and_then(Value::as_str),
        ))
    }

    async fn introspect_token(
        &self,
        app: &AppCredentials,
        token: &SecretString,
    ) -> Result<TokenIntrospection> {
        let app_token = app.app_token();
        let body = self
            .send(self.http.get(self.url("debug_token")).query(&[
                ("input_token", token.expose_secret()),
                ("access_token", app_token.expose_secret()),
            ]))
            .await?;

        parse_introspection(&body)
    }

    async fn exchange_token(&self, app: &AppCredentials, token: &SecretString) -> Result<ExchangedToken> {
        let body = self
            .send(self.http.get(self.url("oauth/access_token")).query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", app.app_id.as_str()),
                ("client_secret", app.app_secret.expose_secret()),
                ("fb_exchange_token", token.expose_secret()),
            ]))
            .await?;

        parse_exchange(&body)
    }
}

/// Map an `{"error": {...}}` body to a platform error
///
/// Code 9007 ("media not ready") becomes [`PlatformError::Processing`] so
/// publish retries can recognise it.
fn parse_graph_error(body: &Value) -> Option<PlatformError> {
    let error = body.get("error")?;
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();

    if code == PlatformError::MEDIA_NOT_READY {
        return Some(PlatformError::Processing(message));
    }

    Some(PlatformError::Api {
        code,
        subcode: error.get("error_subcode").and_then(Value::as_i64),
        message,
    })
}

fn extract_id(body: &Value) -> Result<String> {
    match body.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(PlatformError::UnexpectedResponse(format!(
            "missing id in {}",
            truncate(&body.to_string())
        ))
        .into()),
    }
}

fn parse_introspection(body: &Value) -> Result<TokenIntrospection> {
    let data = body.get("data").ok_or_else(|| {
        PlatformError::UnexpectedResponse(format!("missing data in {}", truncate(&body.to_string())))
    })?;

    Ok(TokenIntrospection {
        is_valid: data.get("is_valid").and_then(Value::as_bool).unwrap_or(false),
        expires_at: data.get("expires_at").and_then(Value::as_i64),
        error_message: data
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(String::from),
        user_id: data.get("user_id").and_then(Value::as_str).map(String::from),
        scopes: data
            .get("scopes")
            .and_then(Value::as_array)
            .map(|scopes| {
                scopes
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

fn parse_exchange(body: &Value) -> Result<ExchangedToken> {
    let access_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PlatformError::UnexpectedResponse("missing access_token".to_string()))?;

    Ok(ExchangedToken {
        access_token: SecretString::from(access_token.to_string()),
        expires_in: body.get("expires_in").and_then(Value::as_u64),
    })
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 300;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    }
}
