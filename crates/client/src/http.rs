//! Request gateway: the single HTTP entry point.
//!
//! Every outbound call goes through [`Gateway::request`], which attaches the
//! session credential, decodes the `{ message, data }` envelope, and maps
//! status codes onto [`ClientError`]. An unauthorized response triggers at
//! most one credential refresh followed by one replay of the original
//! request; the retry budget is an explicit `attempt` counter, not hidden
//! request state. Concurrent expiries coalesce behind a single in-flight
//! refresh.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::{AuthHandle, Credential};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::types::{Envelope, RefreshPayload};

/// Path of the credential-exchange endpoint.
const REFRESH_PATH: &str = "/auth/refresh-token";

/// Authenticated HTTP gateway to the marketplace backend.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    http: reqwest::Client,
    base: String,
    auth: AuthHandle,
    /// Single-flight gate: only one credential refresh runs at a time, and
    /// waiters re-check the credential after acquiring.
    refresh_gate: Mutex<()>,
}

impl Gateway {
    /// Create a gateway for `config`, authenticating from `auth`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig, auth: AuthHandle) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(GatewayInner {
                http,
                base: config.base_url.as_str().trim_end_matches('/').to_string(),
                auth,
                refresh_gate: Mutex::new(()),
            }),
        })
    }

    /// `GET` an endpoint and decode the envelope's `data`.
    ///
    /// # Errors
    ///
    /// See [`Gateway::request`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, None).await
    }

    /// `POST` a JSON body and decode the envelope's `data`.
    ///
    /// # Errors
    ///
    /// See [`Gateway::request`].
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::POST, path, Some(serde_json::to_value(body)?))
            .await
    }

    /// `PUT` a JSON body and decode the envelope's `data`.
    ///
    /// # Errors
    ///
    /// See [`Gateway::request`].
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::PUT, path, Some(serde_json::to_value(body)?))
            .await
    }

    /// `DELETE` an endpoint and decode the envelope's `data`.
    ///
    /// # Errors
    ///
    /// See [`Gateway::request`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::DELETE, path, None).await
    }

    /// `POST` to an endpoint whose response carries no `data` payload.
    ///
    /// # Errors
    ///
    /// See [`Gateway::request`].
    pub async fn post_unit(&self, path: &str) -> Result<()> {
        let _envelope = self
            .envelope::<serde_json::Value>(Method::POST, path, None)
            .await?;
        Ok(())
    }

    /// Send a request, recovering from credential expiry at most once, and
    /// require a `data` payload in the response.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AuthExpired`] when the credential expired and could
    ///   not be refreshed (the session has been torn down)
    /// - [`ClientError::Unauthorized`] when the backend rejects the request
    ///   after the one permitted replay, or the request was anonymous
    /// - [`ClientError::NotFound`], [`ClientError::BusinessRule`],
    ///   [`ClientError::Server`], [`ClientError::Network`],
    ///   [`ClientError::Parse`] per the response
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let envelope = self.envelope(method, path, body).await?;
        envelope.data.ok_or_else(|| ClientError::Server {
            status: 200,
            message: "response envelope has no data".to_string(),
        })
    }

    #[instrument(skip(self, body), fields(method = %method, path = %path))]
    async fn envelope<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Envelope<T>> {
        let url = self.url(path)?;
        let mut attempt: u8 = 0;

        loop {
            let credential = self.inner.auth.credential();

            let mut builder = self.inner.http.request(method.clone(), url.clone());
            if let Some(credential) = &credential {
                builder = builder.bearer_auth(credential.expose());
            }
            if let Some(body) = &body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status();

            // Expiry recovery applies only to requests that actually carried
            // a credential; an anonymous 401 (e.g. a rejected login) is just
            // an unauthorized response.
            if status == StatusCode::UNAUTHORIZED
                && attempt == 0
                && let Some(observed) = credential
            {
                debug!("credential rejected, attempting refresh");
                self.refresh_credential(&observed).await?;
                attempt = 1;
                continue;
            }

            return Self::decode(status, response).await;
        }
    }

    /// Exchange the current credential for a fresh one, coalescing
    /// concurrent refreshes into one network call.
    ///
    /// `observed` is the credential that was just rejected. After acquiring
    /// the gate, the current credential is re-read: if another task already
    /// rotated it, the exchange is skipped and the caller replays with the
    /// new one.
    async fn refresh_credential(&self, observed: &Credential) -> Result<()> {
        let _gate = self.inner.refresh_gate.lock().await;

        match self.inner.auth.credential() {
            Some(current) if current.expose() != observed.expose() => {
                debug!("credential already refreshed by concurrent request");
                return Ok(());
            }
            Some(_) => {}
            // Session torn down while we waited on the gate.
            None => return Err(ClientError::AuthExpired),
        }

        let url = self.url(REFRESH_PATH)?;
        let response = self
            .inner
            .http
            .post(url)
            .bearer_auth(observed.expose())
            .send()
            .await?;

        if response.status().is_success() {
            let envelope: Envelope<RefreshPayload> = response.json().await?;
            let payload = envelope.data.ok_or(ClientError::AuthExpired)?;
            self.inner.auth.rotate_credential(&payload.token);
            Ok(())
        } else {
            warn!(status = %response.status(), "credential refresh rejected, tearing session down");
            self.inner.auth.clear();
            Err(ClientError::AuthExpired)
        }
    }

    async fn decode<T: DeserializeOwned>(
        status: StatusCode,
        response: reqwest::Response,
    ) -> Result<Envelope<T>> {
        // Read as text first so decode failures can be reported with context.
        let text = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }

        let message = serde_json::from_str::<Envelope<serde_json::Value>>(&text)
            .ok()
            .and_then(|envelope| envelope.message)
            .unwrap_or_else(|| text.chars().take(200).collect());

        Err(match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                ClientError::BusinessRule(message)
            }
            s if s.is_server_error() => ClientError::Server {
                status: s.as_u16(),
                message,
            },
            s => ClientError::Server {
                status: s.as_u16(),
                message,
            },
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{path}", self.inner.base))
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }
}
