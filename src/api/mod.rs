//! REST client for the classroom backend.
//!
//! One request per call, no retry. Any 401 clears the stored credential on
//! the shared [`AuthSession`], which also drops the real-time connection.

mod assignments;
mod attendance;
mod auth;
mod classrooms;
pub mod models;
mod posts;
mod quizzes;
mod video_classes;

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::auth::AuthSession;
use crate::config::ApiConfig;
use crate::error::{ClientError, Result};
use models::DownloadToken;

/// A file to send as a multipart part.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            mime_type: None,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin")
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(file_name, bytes))
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    fn into_part(self) -> Result<Part> {
        let part = Part::bytes(self.bytes).file_name(self.file_name);
        match self.mime_type {
            Some(mime) => part
                .mime_str(&mime)
                .map_err(|e| ClientError::InvalidConfiguration(format!("bad mime type: {}", e))),
            None => Ok(part),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    auth: AuthSession,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, auth: AuthSession) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth,
            client,
        })
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, self.client.get(self.url(path))).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let builder = self.client.post(self.url(path)).json(body);
        self.send(Method::POST, path, builder).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let builder = self.client.put(self.url(path)).json(body);
        self.send(Method::PUT, path, builder).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::DELETE, path, self.client.delete(self.url(path))).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T> {
        let builder = self.client.post(self.url(path)).multipart(form);
        self.send(Method::POST, path, builder).await
    }

    /// Builds a navigation link that carries the token as a `token` query
    /// parameter. The token ends up in URLs and server logs; prefer
    /// [`signed_download_url`](Self::signed_download_url).
    pub fn download_url(&self, path: &str) -> Result<String> {
        let token = self.auth.token().ok_or(ClientError::MissingToken)?;

        tracing::warn!(path = %path, "Building download link with bearer token in query string");

        Ok(append_query(
            &self.url(path),
            "token",
            &urlencoding::encode(token.as_str()),
        ))
    }

    /// Asks the backend for a short-lived token scoped to one resource and
    /// builds a link carrying it as `downloadToken`.
    pub async fn signed_download_url(&self, path: &str) -> Result<String> {
        if !self.auth.is_authenticated() {
            return Err(ClientError::MissingToken);
        }

        let token_path = format!("{}/download-token", path.trim_end_matches('/'));
        let grant: DownloadToken = self.post(&token_path, &serde_json::json!({})).await?;

        tracing::debug!(path = %path, expires_at = ?grant.expires_at, "Issued download token");

        Ok(append_query(
            &self.url(path),
            "downloadToken",
            &urlencoding::encode(&grant.token),
        ))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<T> {
        let builder = match self.auth.token() {
            Some(token) => builder.bearer_auth(token.as_str()),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            tracing::error!(method = %method, path = %path, error = %e, "Request failed");
            ClientError::from(e)
        })?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            let credential_cleared = self.auth.clear();
            tracing::warn!(
                method = %method,
                path = %path,
                credential_cleared,
                "Request unauthorized, signing out"
            );
            return Err(ClientError::Unauthorized { credential_cleared });
        }

        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(status, &body);
            tracing::warn!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                message = %message,
                "Request rejected"
            );
            return Err(ClientError::Http {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(method = %method, path = %path, status = status.as_u16(), "Request succeeded");
        decode_body(&body)
    }
}

/// An empty body decodes as `{}`; typed decoding then fails if the target
/// type has required fields.
fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let result = if body.trim().is_empty() {
        serde_json::from_value(Value::Object(serde_json::Map::new()))
    } else {
        serde_json::from_str(body)
    };

    result.map_err(|e| ClientError::Decode(e.to_string()))
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = value.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }

    if !body.trim().is_empty() {
        return body.trim().to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string()
}

fn append_query(url: &str, key: &str, encoded_value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, separator, key, encoded_value)
}

/// Builds a multipart form from text fields and file attachments.
pub(crate) fn multipart_form(
    fields: &[(&str, String)],
    file_field: &str,
    attachments: Vec<Attachment>,
) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name.to_string(), value.clone());
    }
    for attachment in attachments {
        form = form.part(file_field.to_string(), attachment.into_part()?);
    }
    Ok(form)
}
