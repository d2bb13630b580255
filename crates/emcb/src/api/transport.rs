// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the vendor API: request building, envelopes, error mapping.

use std::sync::Once;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::{Envelope, IssueTokenRequest, TokenIssuer};
use crate::auth::{RequestAuth, TokenGrant};
use crate::error::{ApiError, AuthError};

/// Header carrying the application subscription key on every request.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Em-Api-Subscription-Key";

/// Message the API puts in a rate-limit error body.
const RATE_LIMIT_MESSAGE: &str = "Too Many Requests";

/// Install the ring crypto provider for rustls once per process.
pub fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Thin wrapper over `reqwest` bound to one API root.
#[derive(Debug, Clone)]
pub struct RestTransport {
    base_url: String,
    client: Client,
}

impl RestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        ensure_crypto_provider();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start a request, attaching subscription key and bearer when given.
    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
        auth: Option<&RequestAuth>,
    ) -> RequestBuilder {
        let req = self.client.request(method, self.url(path)).header("Accept", "application/json");
        match auth {
            Some(auth) => req
                .header(SUBSCRIPTION_KEY_HEADER, &auth.subscription_key)
                .bearer_auth(&auth.bearer),
            None => req,
        }
    }

    /// Send and decode the `data` payload.
    pub(crate) async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = req.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        let resp = check_status(resp).await?;
        let envelope: Envelope<T> =
            resp.json().await.map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }

    /// Send and discard any body.
    pub(crate) async fn send_empty(&self, req: RequestBuilder) -> Result<(), ApiError> {
        let resp = req.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        check_status(resp).await?;
        Ok(())
    }
}

async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(error_from_body(status, &text))
}

/// Map a non-2xx response to an [`ApiError`].
///
/// Error bodies look like `{"error":{"message":"..."}}`. A 429 status, or the
/// rate-limit message under any status, is reported as [`ApiError::RateLimited`].
pub(crate) fn error_from_body(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_owned());

    if status == StatusCode::TOO_MANY_REQUESTS || message == RATE_LIMIT_MESSAGE {
        return ApiError::RateLimited;
    }
    ApiError::Status { status: status.as_u16(), message }
}

fn auth_error(err: ApiError) -> AuthError {
    match err {
        ApiError::Auth(e) => e,
        ApiError::RateLimited => {
            AuthError::Rejected { status: 429, message: RATE_LIMIT_MESSAGE.to_owned() }
        }
        ApiError::Status { status, message } => AuthError::Rejected { status, message },
        ApiError::Transport(msg) | ApiError::Decode(msg) => AuthError::Transport(msg),
    }
}

#[async_trait::async_trait]
impl TokenIssuer for RestTransport {
    async fn issue_token(
        &self,
        subscription_key: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenGrant, AuthError> {
        let req = self
            .request(Method::POST, "/serviceAccount/authToken", None)
            .header(SUBSCRIPTION_KEY_HEADER, subscription_key)
            .json(&IssueTokenRequest { client_id, client_secret });
        self.send(req).await.map_err(auth_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_requests_status_is_rate_limited() {
        let err = error_from_body(StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(err, ApiError::RateLimited);
        assert!(err.is_retryable());
    }

    #[test]
    fn rate_limit_message_is_recognised_under_other_status() {
        let body = r#"{"error":{"message":"Too Many Requests"}}"#;
        assert_eq!(error_from_body(StatusCode::FORBIDDEN, body), ApiError::RateLimited);
    }

    #[test]
    fn error_message_is_extracted_from_body() {
        let body = r#"{"error":{"message":"device not found"}}"#;
        let err = error_from_body(StatusCode::NOT_FOUND, body);
        assert_eq!(err, ApiError::Status { status: 404, message: "device not found".into() });
        assert!(!err.is_retryable());
    }

    #[test]
    fn plain_text_body_is_kept_verbatim() {
        let err = error_from_body(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err, ApiError::Status { status: 502, message: "upstream down".into() });
    }

    #[test]
    fn api_errors_map_to_auth_rejections() {
        assert_eq!(
            auth_error(ApiError::Status { status: 401, message: "nope".into() }),
            AuthError::Rejected { status: 401, message: "nope".into() }
        );
        assert!(matches!(auth_error(ApiError::RateLimited), AuthError::Rejected { status: 429, .. }));
        assert!(matches!(auth_error(ApiError::Decode("x".into())), AuthError::Transport(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() -> anyhow::Result<()> {
        let transport = RestTransport::new("http://localhost:1234/api/v1/", Duration::from_secs(1))?;
        assert_eq!(transport.base_url(), "http://localhost:1234/api/v1");
        assert_eq!(transport.url("/devices"), "http://localhost:1234/api/v1/devices");
        Ok(())
    }
}
