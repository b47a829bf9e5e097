// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP backend for a hosted PostgREST-style table API with object storage
//! and password auth.
//!
//! Endpoints used:
//!
//! | Operation | Request |
//! |---|---|
//! | upsert | `POST /rest/v1/{table}?on_conflict=…` + `Prefer: resolution=merge-duplicates` |
//! | count | `GET /rest/v1/{table}?user_id=eq.…` + `Prefer: count=exact`, total read from `Content-Range` |
//! | select | `GET /rest/v1/{table}?select=*&user_id=eq.…` |
//! | blob up | `POST /storage/v1/object/{bucket}/{path}` + `x-upsert: true` |
//! | blob down | `GET /storage/v1/object/{bucket}/{path}` |
//! | sign in | `POST /auth/v1/token?grant_type=password` |
//! | sign up | `POST /auth/v1/signup` |

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::traits::{AuthClient, Identity, RemoteBackend};
use crate::descriptor::OWNER_COLUMN;
use crate::error::SyncError;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    /// Project URL, e.g. `https://abc.example.co`
    pub base_url: String,
    /// Public (anon) API key sent as `apikey`
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 { 30 }

fn transport_err(e: reqwest::Error) -> SyncError {
    SyncError::Transport {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

async fn check(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Transport {
        status: Some(status.as_u16()),
        message: if body.is_empty() { status.to_string() } else { body },
    })
}

/// Total row count from a `Content-Range` header (`0-9/42`, `*/0`).
#[must_use]
pub fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

#[derive(Clone)]
struct Endpoint {
    client: Client,
    base: Url,
    api_key: String,
}

impl Endpoint {
    fn new(config: &RestConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(transport_err)?;
        let base = Url::parse(&config.base_url)
            .map_err(|e| SyncError::transport(format!("invalid base url '{}': {e}", config.base_url)))?;
        Ok(Self {
            client,
            base,
            api_key: config.api_key.clone(),
        })
    }

    /// Base URL extended by path segments; `/` inside a segment splits it.
    fn url(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::transport("base url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments.iter().flat_map(|s| s.split('/')).filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url, identity: Option<&Identity>) -> RequestBuilder {
        let bearer = identity.map_or(self.api_key.as_str(), |i| i.access_token.as_str());
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }
}

/// Table and object storage client.
#[derive(Clone)]
pub struct RestBackend {
    endpoint: Endpoint,
}

impl RestBackend {
    pub fn new(config: &RestConfig) -> Result<Self, SyncError> {
        Ok(Self {
            endpoint: Endpoint::new(config)?,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, SyncError> {
        self.endpoint.url(&["rest", "v1", table])
    }

    fn object_url(&self, bucket: &str, path: &str) -> Result<Url, SyncError> {
        self.endpoint.url(&["storage", "v1", "object", bucket, path])
    }
}

fn owner_filter(identity: &Identity) -> String {
    format!("eq.{}", identity.user_id)
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn upsert(
        &self,
        identity: &Identity,
        table: &str,
        row: &Map<String, Value>,
        conflict: &[&str],
    ) -> Result<(), SyncError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("on_conflict", &conflict.join(","));
        debug!(table, "POST upsert");

        let response = self
            .endpoint
            .request(reqwest::Method::POST, url, Some(identity))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row)
            .send()
            .await
            .map_err(transport_err)?;
        check(response).await?;
        Ok(())
    }

    async fn count(&self, identity: &Identity, table: &str) -> Result<u64, SyncError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("select", OWNER_COLUMN)
            .append_pair(OWNER_COLUMN, &owner_filter(identity))
            .append_pair("limit", "1");

        let response = self
            .endpoint
            .request(reqwest::Method::GET, url, Some(identity))
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(transport_err)?;
        let response = check(response).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| SyncError::transport(format!("{table}: missing or malformed Content-Range")))
    }

    async fn select_all(&self, identity: &Identity, table: &str) -> Result<Vec<Map<String, Value>>, SyncError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair(OWNER_COLUMN, &owner_filter(identity));

        let response = self
            .endpoint
            .request(reqwest::Method::GET, url, Some(identity))
            .send()
            .await
            .map_err(transport_err)?;
        check(response).await?.json().await.map_err(transport_err)
    }

    async fn upload_blob(
        &self,
        identity: &Identity,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), SyncError> {
        let url = self.object_url(bucket, path)?;
        debug!(bucket, path, size = bytes.len(), "POST object");

        let response = self
            .endpoint
            .request(reqwest::Method::POST, url, Some(identity))
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(transport_err)?;
        check(response).await?;
        Ok(())
    }

    async fn download_blob(&self, identity: &Identity, bucket: &str, path: &str) -> Result<Vec<u8>, SyncError> {
        let url = self.object_url(bucket, path)?;
        let response = self
            .endpoint
            .request(reqwest::Method::GET, url, Some(identity))
            .send()
            .await
            .map_err(transport_err)?;
        let bytes = check(response).await?.bytes().await.map_err(transport_err)?;
        Ok(bytes.to_vec())
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct AuthResponse {
    access_token: Option<String>,
    user: Option<AuthUser>,
}

/// Password auth client; keeps the last issued session in memory.
pub struct RestAuth {
    endpoint: Endpoint,
    session: Mutex<Option<Identity>>,
}

impl RestAuth {
    pub fn new(config: &RestConfig) -> Result<Self, SyncError> {
        Ok(Self {
            endpoint: Endpoint::new(config)?,
            session: Mutex::new(None),
        })
    }

    async fn grant(&self, url: Url, email: &str, password: &str) -> Result<Identity, SyncError> {
        let response = self
            .endpoint
            .request(reqwest::Method::POST, url, None)
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(transport_err)?;

        let response = check(response)
            .await
            .map_err(|e| SyncError::AuthFailed(e.to_string()))?;
        let body: AuthResponse = response.json().await.map_err(transport_err)?;

        let (Some(access_token), Some(user)) = (body.access_token, body.user) else {
            return Err(SyncError::AuthFailed("no session issued (email confirmation required?)".into()));
        };
        let identity = Identity {
            user_id: user.id,
            email: user.email,
            access_token,
        };
        *self.session.lock() = Some(identity.clone());
        Ok(identity)
    }
}

#[async_trait]
impl AuthClient for RestAuth {
    async fn current_session(&self) -> Result<Option<Identity>, SyncError> {
        Ok(self.session.lock().clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, SyncError> {
        let mut url = self.endpoint.url(&["auth", "v1", "token"])?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        self.grant(url, email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, SyncError> {
        let url = self.endpoint.url(&["auth", "v1", "signup"])?;
        self.grant(url, email, password).await
    }
}
