#![cfg_attr(feature = "mock", allow(dead_code, unused_imports))]

use crate::http_client::{handle_http_response, https_client};
use anyhow::{Context, Result};
use jwt_simple::prelude::{Claims, Duration as JwtDuration, RS256KeyPair, RSAKeyPairLike};
use log::{debug, info};
#[cfg(feature = "mock")]
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{
    path::Path,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use trait_variant::make;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
        }
    }
}

/// Partial registry record; fields left `None` are not touched by a merge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryUpdate {
    pub status: DeviceStatus,
    pub assigned_to: Option<String>,
}

impl RegistryUpdate {
    pub fn status(status: DeviceStatus) -> Self {
        Self {
            status,
            assigned_to: None,
        }
    }

    pub fn assigned(requester_id: impl Into<String>, status: DeviceStatus) -> Self {
        Self {
            status,
            assigned_to: Some(requester_id.into()),
        }
    }

    /// Fold a newer update into this one, keeping the latest status and any
    /// assignment that has not been written yet
    pub fn merge(self, newer: RegistryUpdate) -> Self {
        Self {
            status: newer.status,
            assigned_to: newer.assigned_to.or(self.assigned_to),
        }
    }
}

/// Remote key-value document store holding device records
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait RegistryClient {
    /// Merge `update` into the document keyed by `device_id`, setting
    /// `lastSeen` to the server time
    async fn merge(&self, device_id: &str, update: &RegistryUpdate) -> Result<()>;
}

#[derive(Clone, Debug, Deserialize)]
struct ServiceAccountKey {
    project_id: String,
    private_key_id: String,
    private_key: String,
    client_email: String,
    #[serde(default = "ServiceAccountKey::default_token_uri")]
    token_uri: String,
}

impl ServiceAccountKey {
    fn default_token_uri() -> String {
        "https://oauth2.googleapis.com/token".to_string()
    }
}

#[derive(Serialize, Deserialize)]
struct ScopeClaims {
    scope: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Firestore backed device registry
pub struct FirestoreClient {
    client: Client,
    key: ServiceAccountKey,
    collection: String,
    token: Mutex<Option<CachedToken>>,
}

impl FirestoreClient {
    const SCOPE: &str = "https://www.googleapis.com/auth/datastore";
    const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
    const API_URL: &str = "https://firestore.googleapis.com/v1";
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

    pub fn from_credentials_file(path: &Path, collection: impl Into<String>) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_reader(
            std::fs::File::open(path)
                .context(format!("failed to open registry credentials: {path:?}"))?,
        )
        .context(format!("failed to parse registry credentials: {path:?}"))?;

        info!(
            "registry: project {} as {}",
            key.project_id, key.client_email
        );

        Ok(Self {
            client: https_client(Self::REQUEST_TIMEOUT)?,
            key,
            collection: collection.into(),
            token: Mutex::new(None),
        })
    }

    fn document_name(&self, device_id: &str) -> String {
        format!(
            "projects/{}/databases/(default)/documents/{}/{device_id}",
            self.key.project_id, self.collection
        )
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents:commit",
            Self::API_URL,
            self.key.project_id
        )
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        debug!("requesting registry access token");

        let key_pair = RS256KeyPair::from_pem(&self.key.private_key)
            .context("failed to parse service account private key")?
            .with_key_id(&self.key.private_key_id);

        let claims = Claims::with_custom_claims(
            ScopeClaims {
                scope: Self::SCOPE.to_string(),
            },
            JwtDuration::from_hours(1),
        )
        .with_issuer(&self.key.client_email)
        .with_audience(&self.key.token_uri);

        let assertion = key_pair
            .sign(claims)
            .context("failed to sign token assertion")?;

        let res = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", Self::GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("failed to send token request")?;

        let body = handle_http_response(res, "token request").await?;
        let token: TokenResponse =
            serde_json::from_str(&body).context("failed to parse token response")?;

        let lifetime = Duration::from_secs(token.expires_in);

        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(Self::TOKEN_REFRESH_MARGIN),
        })
    }
}

impl RegistryClient for FirestoreClient {
    async fn merge(&self, device_id: &str, update: &RegistryUpdate) -> Result<()> {
        let body = commit_body(&self.document_name(device_id), update);
        let token = self.access_token().await?;
        let url = self.commit_url();

        debug!("POST {url} with body: {body}");

        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context(format!("failed to send POST request to {url}"))?;

        handle_http_response(res, "registry commit").await?;
        Ok(())
    }
}

/// Build a Firestore commit that upserts only the given fields and stamps
/// `lastSeen` with the request time
fn commit_body(document_name: &str, update: &RegistryUpdate) -> Value {
    let mut fields = serde_json::Map::new();
    let mut field_paths = vec!["status"];

    fields.insert(
        "status".to_string(),
        json!({ "stringValue": update.status.as_str() }),
    );

    if let Some(assigned_to) = &update.assigned_to {
        fields.insert(
            "assignedTo".to_string(),
            json!({ "stringValue": assigned_to }),
        );
        field_paths.push("assignedTo");
    }

    json!({
        "writes": [{
            "update": {
                "name": document_name,
                "fields": fields,
            },
            "updateMask": { "fieldPaths": field_paths },
            "updateTransforms": [{
                "fieldPath": "lastSeen",
                "setToServerValue": "REQUEST_TIME",
            }],
        }]
    })
}
