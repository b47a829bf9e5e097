// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote session provider.
//!
//! The backend auth client may be published late (the host loads it
//! asynchronously), so [`SessionProvider::ensure_session`] first waits on a
//! readiness channel, bounded by a timeout, before reusing or establishing a
//! session.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use backup_sync::session::{SessionPolicy, SessionProvider};
//! use backup_sync::storage::memory::{MemoryAuth, MemoryKeyValueStore};
//! use backup_sync::clock::SystemClock;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (publisher, session) = SessionProvider::channel(
//!     SessionPolicy::anonymous("peblgen.app"),
//!     Arc::new(MemoryKeyValueStore::new()),
//!     Arc::new(SystemClock),
//!     Duration::from_secs(30),
//! );
//!
//! // Later, once the client library has loaded:
//! publisher.send_replace(Some(Arc::new(MemoryAuth::new())));
//!
//! let identity = session.ensure_session().await.unwrap();
//! println!("signed in as {}", identity.user_id);
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::SyncError;
use crate::storage::traits::{AuthClient, Identity, KeyValueStore};

/// Key/value key holding this device's id.
pub const DEVICE_ID_KEY: &str = "peblgen_device_id";
/// Key/value key holding this device's generated password.
pub const DEVICE_PASSWORD_KEY: &str = "peblgen_device_password";

/// Publishes the auth client once it is ready.
pub type ClientPublisher = watch::Sender<Option<Arc<dyn AuthClient>>>;

/// How a session is established when none is live.
#[derive(Clone)]
pub enum SessionPolicy {
    /// Per-device account with generated, locally persisted credentials
    Anonymous { email_domain: String },
    /// Fixed account; sign-in only
    Credentials { email: String, password: String },
}

impl SessionPolicy {
    pub fn anonymous(email_domain: impl Into<String>) -> Self {
        Self::Anonymous {
            email_domain: email_domain.into(),
        }
    }
}

impl std::fmt::Debug for SessionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous { email_domain } => f.debug_struct("Anonymous").field("email_domain", email_domain).finish(),
            Self::Credentials { email, .. } => f
                .debug_struct("Credentials")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

pub struct SessionProvider {
    client_rx: watch::Receiver<Option<Arc<dyn AuthClient>>>,
    policy: SessionPolicy,
    key_values: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ready_timeout: parking_lot::Mutex<Duration>,
    identity: watch::Sender<Option<Identity>>,
    /// Serializes sign-in so concurrent callers share one attempt
    establish: Mutex<()>,
}

impl SessionProvider {
    pub fn new(
        client_rx: watch::Receiver<Option<Arc<dyn AuthClient>>>,
        policy: SessionPolicy,
        key_values: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        ready_timeout: Duration,
    ) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            client_rx,
            policy,
            key_values,
            clock,
            ready_timeout: parking_lot::Mutex::new(ready_timeout),
            identity,
            establish: Mutex::new(()),
        }
    }

    /// A provider plus the sender the host uses to publish its client.
    pub fn channel(
        policy: SessionPolicy,
        key_values: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        ready_timeout: Duration,
    ) -> (ClientPublisher, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self::new(rx, policy, key_values, clock, ready_timeout))
    }

    /// A provider whose client is available immediately.
    pub fn ready(
        client: Arc<dyn AuthClient>,
        policy: SessionPolicy,
        key_values: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (_, rx) = watch::channel(Some(client));
        Self::new(rx, policy, key_values, clock, Duration::from_secs(30))
    }

    /// Bound on waiting for the client to be published.
    ///
    /// [`SyncEngine::new`](crate::SyncEngine::new) applies its configured
    /// `client_ready_timeout_ms` here.
    pub fn set_ready_timeout(&self, timeout: Duration) {
        *self.ready_timeout.lock() = timeout;
    }

    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        *self.ready_timeout.lock()
    }

    /// Flips from `None` to the identity once a session exists.
    #[must_use]
    pub fn identity_receiver(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    #[must_use]
    pub fn current_identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    /// Forget the cached identity (e.g. after the backend rejected its token).
    pub fn invalidate(&self) {
        self.identity.send_replace(None);
    }

    /// Return a usable identity, establishing a session if needed.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_session(&self) -> Result<Identity, SyncError> {
        if let Some(identity) = self.current_identity() {
            return Ok(identity);
        }

        let _guard = self.establish.lock().await;
        if let Some(identity) = self.current_identity() {
            return Ok(identity);
        }

        let client = self.wait_for_client().await?;

        let identity = match client.current_session().await {
            Ok(Some(identity)) => {
                debug!(user_id = %identity.user_id, "Reusing existing session");
                identity
            }
            Ok(None) => self.establish(client.as_ref()).await?,
            Err(e) => {
                warn!(error = %e, "Session lookup failed, signing in");
                self.establish(client.as_ref()).await?
            }
        };

        info!(user_id = %identity.user_id, "Session ready");
        self.identity.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn wait_for_client(&self) -> Result<Arc<dyn AuthClient>, SyncError> {
        let mut rx = self.client_rx.clone();
        let ready_timeout = self.ready_timeout();
        let outcome = tokio::time::timeout(ready_timeout, rx.wait_for(Option::is_some)).await;
        match outcome {
            Ok(Ok(client)) => client.as_ref().cloned().ok_or(SyncError::AuthUnavailable),
            Ok(Err(_)) => {
                warn!("Auth client channel closed before a client was published");
                Err(SyncError::AuthUnavailable)
            }
            Err(_) => {
                warn!(timeout = ?ready_timeout, "Auth client not published in time");
                Err(SyncError::AuthUnavailable)
            }
        }
    }

    async fn establish(&self, client: &dyn AuthClient) -> Result<Identity, SyncError> {
        match &self.policy {
            SessionPolicy::Credentials { email, password } => client
                .sign_in(email, password)
                .await
                .map_err(|e| SyncError::AuthFailed(e.to_string())),
            SessionPolicy::Anonymous { email_domain } => self.anonymous(client, email_domain).await,
        }
    }

    async fn anonymous(&self, client: &dyn AuthClient, email_domain: &str) -> Result<Identity, SyncError> {
        let device_id = match self.key_values.get_item(DEVICE_ID_KEY).await? {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                self.key_values.set_item(DEVICE_ID_KEY, &id).await?;
                info!("Generated new device id");
                id
            }
        };

        let email = format!("user{device_id}@{email_domain}");
        let minted = format!("{device_id}_{}", self.clock.now().timestamp_millis());
        let stored = self.key_values.get_item(DEVICE_PASSWORD_KEY).await?;

        match client.sign_in(&email, stored.as_deref().unwrap_or(&minted)).await {
            Ok(identity) => Ok(identity),
            Err(sign_in_err) => {
                debug!(error = %sign_in_err, "Sign-in failed, creating device account");
                let identity = client
                    .sign_up(&email, &minted)
                    .await
                    .map_err(|e| SyncError::AuthFailed(e.to_string()))?;
                self.key_values.set_item(DEVICE_PASSWORD_KEY, &minted).await?;
                Ok(identity)
            }
        }
    }
}
