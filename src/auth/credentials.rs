//! Credential snapshots, providers, and the refresh cache
//!
//! A fetch never talks to a discovery mechanism directly: it receives an
//! immutable [`CredentialSnapshot`] by value. The [`CredentialCache`] owns
//! the current snapshot and replaces it through a pluggable
//! [`CredentialProvider`] when the snapshot is about to expire, so
//! short-lived credentials can roll over mid-transfer without interrupting
//! in-flight fetches (which keep signing with the snapshot they were
//! spawned with).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::constants::auth;
use crate::errors::{CredentialError, CredentialResult};

/// Immutable access credentials with an expiration timestamp
///
/// The empty "pass-through" snapshot means requests go out unsigned; it is
/// the fallback when no discovery mechanism can produce credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSnapshot {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: String,
    /// None means the snapshot never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialSnapshot {
    /// Sentinel snapshot carrying no credentials and no expiry
    pub fn passthrough(region: impl Into<String>) -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: None,
            region: region.into(),
            expires_at: None,
        }
    }

    /// Whether this is the unsigned pass-through sentinel
    pub fn is_passthrough(&self) -> bool {
        self.access_key_id.is_empty()
    }

    /// Whether the snapshot expires within `margin` from now
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self.expires_at {
            None => false,
            Some(at) => {
                let remaining = at.signed_duration_since(Utc::now());
                remaining.to_std().map_or(true, |left| left < margin)
            }
        }
    }
}

/// Pluggable source of credential snapshots
///
/// The cache calls `snapshot()` at most once per lifetime of a snapshot.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn snapshot(&self) -> CredentialResult<CredentialSnapshot>;
}

/// Provider backed by the AWS default chain
///
/// Resolves environment variables, shared config/credentials files, and
/// instance metadata, in that order.
#[derive(Debug, Default)]
pub struct AmbientProvider;

impl AmbientProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CredentialProvider for AmbientProvider {
    async fn snapshot(&self) -> CredentialResult<CredentialSnapshot> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let region = config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| auth::DEFAULT_REGION.to_string());

        let provider = config.credentials_provider().ok_or_else(|| {
            CredentialError::ProviderUnavailable {
                reason: "no credentials provider in the default chain".to_string(),
            }
        })?;

        let creds = provider.provide_credentials().await.map_err(|e| {
            CredentialError::ProviderUnavailable {
                reason: e.to_string(),
            }
        })?;

        let expires_at = creds.expiry().map(DateTime::<Utc>::from);
        debug!(
            region = %region,
            expires_at = ?expires_at,
            "resolved credentials from the ambient chain"
        );

        Ok(CredentialSnapshot {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().map(str::to_string),
            region,
            expires_at,
        })
    }
}

/// Provider that always returns the same snapshot
///
/// Useful for library consumers with externally managed credentials.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    snapshot: CredentialSnapshot,
}

impl StaticProvider {
    pub fn new(snapshot: CredentialSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl CredentialProvider for StaticProvider {
    async fn snapshot(&self) -> CredentialResult<CredentialSnapshot> {
        Ok(self.snapshot.clone())
    }
}

/// Holds the current snapshot and refreshes it before expiry
///
/// `current()` hands the snapshot out by value; callers never share mutable
/// credential state. When the held snapshot has less than the refresh margin
/// remaining, the provider is invoked once and the result replaces it. If
/// the provider is unavailable the cache falls back to the pass-through
/// sentinel, which never expires, so the provider is not hammered again.
pub struct CredentialCache {
    provider: Arc<dyn CredentialProvider>,
    margin: Duration,
    held: Mutex<Option<CredentialSnapshot>>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn CredentialProvider>, margin: Duration) -> Self {
        Self {
            provider,
            margin,
            held: Mutex::new(None),
        }
    }

    /// Cache over the ambient AWS chain with the default refresh margin
    pub fn ambient() -> Self {
        Self::new(Arc::new(AmbientProvider::new()), auth::DEFAULT_REFRESH_MARGIN)
    }

    /// The current snapshot, refreshed first if it is missing or about to
    /// expire
    pub async fn current(&self) -> CredentialSnapshot {
        let mut held = self.held.lock().await;

        let stale = match held.as_ref() {
            None => true,
            Some(snapshot) => snapshot.expires_within(self.margin),
        };

        if stale {
            match self.provider.snapshot().await {
                Ok(snapshot) => {
                    debug!(expires_at = ?snapshot.expires_at, "credential snapshot refreshed");
                    *held = Some(snapshot);
                }
                Err(e) => {
                    warn!(error = %e, "credential provider unavailable, using pass-through");
                    *held = Some(CredentialSnapshot::passthrough(auth::DEFAULT_REGION));
                }
            }
        }

        held.clone().expect("snapshot populated above")
    }
}
