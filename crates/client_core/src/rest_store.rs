//! [`RecordStore`] over a PostgREST-style HTTP API.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use layout::RecordStore;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{CardColor, CatalogItem, IconRef, ItemId, LayoutOverlayEntry, Role, UserId, UserProfile},
    protocol::CatalogItemDraft,
};
use tracing::debug;
use url::Url;

const CATALOG_TABLE: &str = "catalog_items";
const OVERLAY_TABLE: &str = "layout_overlay";
const PROFILE_TABLE: &str = "user_profiles";

#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    pub base_url: Url,
    pub api_key: String,
    /// Bearer token of the signed-in user; the api key is sent in its place
    /// when absent.
    pub access_token: Option<String>,
}

impl RestStoreConfig {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid rest url '{base_url}'"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            access_token: None,
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

pub struct RestRecordStore {
    http: Client,
    config: RestStoreConfig,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: i64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    card_color: Option<String>,
    #[serde(default)]
    target_url: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    access_list: Option<Vec<UserId>>,
}

impl From<CatalogRow> for CatalogItem {
    fn from(row: CatalogRow) -> Self {
        Self {
            id: ItemId(row.id),
            title: row.title,
            description: row.description.unwrap_or_default(),
            icon: row.icon.as_deref().map(IconRef::parse).unwrap_or_default(),
            card_color: CardColor::parse(row.card_color.as_deref()),
            target_url: row.target_url.filter(|url| !url.is_empty()),
            created_at: row.created_at,
            access_list: row.access_list.unwrap_or_default(),
        }
    }
}

/// Body for inserts and patches. Unlike the draft's own serialization, a
/// missing target url is sent as an explicit null so a patch clears it.
#[derive(Debug, Serialize)]
struct CatalogWrite<'a> {
    title: &'a str,
    description: &'a str,
    icon: &'a str,
    card_color: &'a str,
    target_url: Option<&'a str>,
    access_list: &'a [UserId],
}

impl<'a> From<&'a CatalogItemDraft> for CatalogWrite<'a> {
    fn from(draft: &'a CatalogItemDraft) -> Self {
        Self {
            title: &draft.title,
            description: &draft.description,
            icon: draft.icon.as_stored(),
            card_color: &draft.card_color.0,
            target_url: draft.target_url.as_deref(),
            access_list: &draft.access_list,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    role: Option<i32>,
}

impl RestRecordStore {
    pub fn new(config: RestStoreConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.config
            .base_url
            .join(&format!("rest/v1/{table}"))
            .with_context(|| format!("failed to build url for table {table}"))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
    }
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn list_catalog_items(&self) -> Result<Vec<CatalogItem>> {
        let rows: Vec<CatalogRow> = self
            .authorized(self.http.get(self.table_url(CATALOG_TABLE)?))
            .query(&[("select", "*"), ("order", "created_at.asc,id.asc")])
            .send()
            .await
            .context("catalog request failed")?
            .error_for_status()
            .context("catalog request rejected")?
            .json()
            .await
            .context("malformed catalog response")?;
        debug!(items = rows.len(), "rest: catalog listed");
        Ok(rows.into_iter().map(CatalogItem::from).collect())
    }

    async fn create_catalog_item(&self, draft: &CatalogItemDraft) -> Result<CatalogItem> {
        let rows: Vec<CatalogRow> = self
            .authorized(self.http.post(self.table_url(CATALOG_TABLE)?))
            .header("Prefer", "return=representation")
            .json(&CatalogWrite::from(draft))
            .send()
            .await
            .context("catalog insert failed")?
            .error_for_status()
            .context("catalog insert rejected")?
            .json()
            .await
            .context("malformed catalog insert response")?;
        rows.into_iter()
            .next()
            .map(CatalogItem::from)
            .ok_or_else(|| anyhow!("catalog insert returned no row"))
    }

    async fn update_catalog_item(&self, item_id: ItemId, draft: &CatalogItemDraft) -> Result<()> {
        let rows: Vec<CatalogRow> = self
            .authorized(self.http.patch(self.table_url(CATALOG_TABLE)?))
            .query(&[("id", format!("eq.{item_id}"))])
            .header("Prefer", "return=representation")
            .json(&CatalogWrite::from(draft))
            .send()
            .await
            .with_context(|| format!("failed to update catalog item {item_id}"))?
            .error_for_status()
            .with_context(|| format!("update of catalog item {item_id} rejected"))?
            .json()
            .await
            .context("malformed catalog update response")?;
        if rows.is_empty() {
            return Err(anyhow!("catalog item {item_id} not found"));
        }
        Ok(())
    }

    async fn delete_catalog_item(&self, item_id: ItemId) -> Result<()> {
        let rows: Vec<CatalogRow> = self
            .authorized(self.http.delete(self.table_url(CATALOG_TABLE)?))
            .query(&[("id", format!("eq.{item_id}"))])
            .header("Prefer", "return=representation")
            .send()
            .await
            .with_context(|| format!("failed to delete catalog item {item_id}"))?
            .error_for_status()
            .with_context(|| format!("delete of catalog item {item_id} rejected"))?
            .json()
            .await
            .context("malformed catalog delete response")?;
        if rows.is_empty() {
            return Err(anyhow!("catalog item {item_id} not found"));
        }
        Ok(())
    }

    async fn list_overlay_entries(&self, user_id: UserId) -> Result<Vec<LayoutOverlayEntry>> {
        let entries: Vec<LayoutOverlayEntry> = self
            .authorized(self.http.get(self.table_url(OVERLAY_TABLE)?))
            .query(&[
                ("select", "user_id,item_id,position,pinned".to_string()),
                ("user_id", format!("eq.{user_id}")),
            ])
            .send()
            .await
            .with_context(|| format!("overlay request for user {user_id} failed"))?
            .error_for_status()
            .with_context(|| format!("overlay request for user {user_id} rejected"))?
            .json()
            .await
            .context("malformed overlay response")?;
        Ok(entries)
    }

    async fn upsert_overlay_entries(&self, entries: &[LayoutOverlayEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.authorized(self.http.post(self.table_url(OVERLAY_TABLE)?))
            .query(&[("on_conflict", "user_id,item_id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(entries)
            .send()
            .await
            .context("overlay upsert failed")?
            .error_for_status()
            .context("overlay upsert rejected")?;
        debug!(entries = entries.len(), "rest: overlay upserted");
        Ok(())
    }

    async fn load_user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let rows: Vec<ProfileRow> = self
            .authorized(self.http.get(self.table_url(PROFILE_TABLE)?))
            .query(&[
                ("select", "username,avatar_url,role".to_string()),
                ("user_id", format!("eq.{user_id}")),
            ])
            .send()
            .await
            .with_context(|| format!("profile request for user {user_id} failed"))?
            .error_for_status()
            .with_context(|| format!("profile request for user {user_id} rejected"))?
            .json()
            .await
            .context("malformed profile response")?;
        let fallback = UserProfile::fallback();
        Ok(rows.into_iter().next().map(|row| UserProfile {
            username: row.username.unwrap_or(fallback.username),
            avatar_url: row.avatar_url,
            role: row.role.map(Role).unwrap_or(fallback.role),
        }))
    }
}

#[cfg(test)]
#[path = "tests/rest_store_tests.rs"]
mod tests;
