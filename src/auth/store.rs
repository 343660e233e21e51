//! Remote Stores
//! Mission: Read users and API keys from the PostgREST-style datastore

use crate::auth::models::{ApiKeyRecord, UserRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_subject_id(&self, id: Uuid) -> Result<Option<UserRecord>>;
}

#[async_trait::async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn find_key_by_digest(&self, digest: &str) -> Result<Option<ApiKeyRecord>>;
    async fn update_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn insert_key(&self, record: &ApiKeyRecord) -> Result<()>;
}

/// REST client for `{base}/rest/v1/<table>` endpoints
pub struct RestStore {
    http_client: reqwest::Client,
    rest_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(http_client: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            rest_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<T>> {
        let resp = self
            .request(reqwest::Method::GET, table)
            .query(&[("select", "*".to_string()), (column, format!("eq.{}", value))])
            .send()
            .await
            .with_context(|| format!("Failed to query {}", table))?;

        if !resp.status().is_success() {
            anyhow::bail!("Query on {} failed with status {}", table, resp.status());
        }

        let mut rows = resp
            .json::<Vec<T>>()
            .await
            .with_context(|| format!("Invalid {} payload", table))?;

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.swap_remove(0)))
        }
    }
}

#[async_trait::async_trait]
impl UserStore for RestStore {
    async fn find_user_by_subject_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        self.select_one("users", "id", &id.to_string()).await
    }
}

#[async_trait::async_trait]
impl ApiKeyStore for RestStore {
    async fn find_key_by_digest(&self, digest: &str) -> Result<Option<ApiKeyRecord>> {
        self.select_one("api_keys", "key_hash", digest).await
    }

    async fn update_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let resp = self
            .request(reqwest::Method::PATCH, "api_keys")
            .query(&[("id", format!("eq.{}", id))])
            .json(&json!({ "last_used": at }))
            .send()
            .await
            .context("Failed to update API key usage")?;

        if !resp.status().is_success() {
            anyhow::bail!("API key usage update failed with status {}", resp.status());
        }

        debug!(key_id = %id, "Updated API key last_used");
        Ok(())
    }

    async fn insert_key(&self, record: &ApiKeyRecord) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "api_keys")
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await
            .context("Failed to insert API key")?;

        if !resp.status().is_success() {
            anyhow::bail!("API key insert failed with status {}", resp.status());
        }

        Ok(())
    }
}
