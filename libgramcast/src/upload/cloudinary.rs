//! Cloudinary signed uploads

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

use super::Uploader;
use crate::config::UploadConfig;
use crate::error::{Result, UploadError};
use crate::media::MediaKind;
use crate::secrets::AccountSecrets;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

pub struct CloudinaryUploader {
    http: Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: SecretString,
}

impl CloudinaryUploader {
    pub fn new(
        base_url: &str,
        cloud_name: &str,
        api_key: &str,
        api_secret: SecretString,
    ) -> Result<Self> {
        if cloud_name.is_empty() {
            return Err(UploadError::NotConfigured("upload.cloud_name is empty".to_string()).into());
        }

        let http = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| UploadError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cloud_name: cloud_name.to_string(),
            api_key: api_key.to_string(),
            api_secret,
        })
    }

    /// Build an uploader from `[upload]` and the `CLOUDINARY_*` secrets
    pub fn from_config(config: &UploadConfig, secrets: &AccountSecrets) -> Result<Self> {
        let api_key = secrets
            .cloudinary_api_key
            .as_deref()
            .ok_or_else(|| UploadError::NotConfigured("CLOUDINARY_API is not set".to_string()))?;
        let api_secret = secrets
            .cloudinary_api_secret
            .clone()
            .ok_or_else(|| UploadError::NotConfigured("CLOUDINARY_SECRET is not set".to_string()))?;

        Self::new(&config.base_url, &config.cloud_name, api_key, api_secret)
    }

    fn endpoint(&self, kind: MediaKind) -> String {
        format!("{}/{}/{}/upload", self.base_url, self.cloud_name, kind.as_str())
    }
}

/// Hex SHA-256 request signature over the signed parameters
pub fn sign(timestamp: i64, api_secret: &str) -> String {
    let digest = Sha256::digest(format!("timestamp={}{}", timestamp, api_secret).as_bytes());
    format!("{:x}", digest)
}

#[async_trait]
impl Uploader for CloudinaryUploader {
    fn name(&self) -> &str {
        "cloudinary"
    }

    async fn upload(&self, path: &Path, kind: MediaKind) -> Result<String> {
        let failed = |reason: String| UploadError::Failed {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let timestamp = chrono::Utc::now().timestamp();
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", sign(timestamp, self.api_secret.expose_secret()));

        let response = self
            .http
            .post(self.endpoint(kind))
            .multipart(form)
            .send()
            .await
            .map_err(|e| failed(e.without_url().to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| failed(format!("HTTP {}: {}", status.as_u16(), e.without_url())))?;

        parse_upload_response(&body).map_err(|reason| failed(reason).into())
    }
}

fn parse_upload_response(body: &Value) -> std::result::Result<String, String> {
    if let Some(url) = body.get("secure_url").and_then(Value::as_str) {
        return Ok(url.to_string());
    }

    Err(body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("response has no secure_url")
        .to_string())
}
