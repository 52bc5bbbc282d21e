use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use layout::RecordStore;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{
    domain::{
        CardColor, CatalogItem, IconRef, ItemId, LayoutOverlayEntry, Role, UserId, UserProfile,
    },
    protocol::CatalogItemDraft,
};

const CATALOG_COLUMNS: &str =
    "id, title, description, icon, card_color, target_url, access_list, created_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own database, so an
        // in-memory store must stay on one long-lived connection.
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run hub migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn find_catalog_item(&self, item_id: ItemId) -> Result<Option<CatalogItem>> {
        let row = sqlx::query(&format!(
            "SELECT {CATALOG_COLUMNS} FROM catalog_items WHERE id = ?"
        ))
        .bind(item_id.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load catalog item {item_id}"))?;
        row.as_ref().map(catalog_item_from_row).transpose()
    }

    pub async fn upsert_user_profile(&self, user_id: UserId, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_profiles (user_id, username, avatar_url, role) VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET username = excluded.username, avatar_url = excluded.avatar_url, role = excluded.role",
        )
        .bind(user_id.to_string())
        .bind(&profile.username)
        .bind(profile.avatar_url.as_deref())
        .bind(profile.role.0)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save profile for user {user_id}"))?;
        Ok(())
    }

    pub async fn count_overlay_entries(&self, user_id: UserId) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM layout_overlay WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await
            .context("failed to count overlay entries")
    }
}

#[async_trait]
impl RecordStore for Storage {
    async fn list_catalog_items(&self) -> Result<Vec<CatalogItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATALOG_COLUMNS} FROM catalog_items ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list catalog items")?;
        rows.iter().map(catalog_item_from_row).collect()
    }

    async fn create_catalog_item(&self, draft: &CatalogItemDraft) -> Result<CatalogItem> {
        let created_at = Utc::now();
        let row = sqlx::query(
            "INSERT INTO catalog_items (title, description, icon, card_color, target_url, access_list, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.icon.as_stored())
        .bind(&draft.card_color.0)
        .bind(draft.target_url.as_deref())
        .bind(encode_access_list(&draft.access_list)?)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert catalog item")?;

        let id = ItemId(row.try_get::<i64, _>("id")?);
        debug!(item_id = %id, "storage: created catalog item");
        Ok(CatalogItem {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            icon: draft.icon.clone(),
            card_color: draft.card_color.clone(),
            target_url: draft.target_url.clone(),
            created_at,
            access_list: draft.access_list.clone(),
        })
    }

    async fn update_catalog_item(&self, item_id: ItemId, draft: &CatalogItemDraft) -> Result<()> {
        let result = sqlx::query(
            "UPDATE catalog_items
             SET title = ?, description = ?, icon = ?, card_color = ?, target_url = ?, access_list = ?
             WHERE id = ?",
        )
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.icon.as_stored())
        .bind(&draft.card_color.0)
        .bind(draft.target_url.as_deref())
        .bind(encode_access_list(&draft.access_list)?)
        .bind(item_id.0)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update catalog item {item_id}"))?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("catalog item {item_id} not found"));
        }
        Ok(())
    }

    async fn delete_catalog_item(&self, item_id: ItemId) -> Result<()> {
        let result = sqlx::query("DELETE FROM catalog_items WHERE id = ?")
            .bind(item_id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete catalog item {item_id}"))?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("catalog item {item_id} not found"));
        }
        Ok(())
    }

    async fn list_overlay_entries(&self, user_id: UserId) -> Result<Vec<LayoutOverlayEntry>> {
        let rows = sqlx::query(
            "SELECT item_id, position, pinned FROM layout_overlay WHERE user_id = ? ORDER BY item_id",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list overlay entries for user {user_id}"))?;

        rows.into_iter()
            .map(|row| -> Result<LayoutOverlayEntry> {
                Ok(LayoutOverlayEntry {
                    user_id,
                    item_id: ItemId(row.try_get::<i64, _>("item_id")?),
                    position: row.try_get::<i64, _>("position")?,
                    pinned: row.try_get::<bool, _>("pinned")?,
                })
            })
            .collect()
    }

    async fn upsert_overlay_entries(&self, entries: &[LayoutOverlayEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin overlay upsert")?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO layout_overlay (user_id, item_id, position, pinned, updated_at)
                 VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
                 ON CONFLICT(user_id, item_id) DO UPDATE SET position = excluded.position, pinned = excluded.pinned, updated_at = CURRENT_TIMESTAMP",
            )
            .bind(entry.user_id.to_string())
            .bind(entry.item_id.0)
            .bind(entry.position)
            .bind(entry.pinned)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "failed to upsert overlay entry user={} item={}",
                    entry.user_id, entry.item_id
                )
            })?;
        }
        tx.commit().await.context("failed to commit overlay upsert")?;
        Ok(())
    }

    async fn load_user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT username, avatar_url, role FROM user_profiles WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load profile for user {user_id}"))?;
        row.map(|row| -> Result<UserProfile> {
            Ok(UserProfile {
                username: row.try_get::<String, _>("username")?,
                avatar_url: row.try_get::<Option<String>, _>("avatar_url")?,
                role: Role(row.try_get::<i32, _>("role")?),
            })
        })
        .transpose()
    }
}

fn catalog_item_from_row(row: &SqliteRow) -> Result<CatalogItem> {
    let id = ItemId(row.try_get::<i64, _>("id")?);
    let access_list_raw: String = row.try_get("access_list")?;
    let access_list = serde_json::from_str::<Vec<UserId>>(&access_list_raw)
        .with_context(|| format!("catalog item {id} has a malformed access list"))?;
    Ok(CatalogItem {
        id,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        icon: IconRef::parse(&row.try_get::<String, _>("icon")?),
        card_color: CardColor::parse(row.try_get::<Option<String>, _>("card_color")?.as_deref()),
        target_url: row.try_get("target_url")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        access_list,
    })
}

fn encode_access_list(access_list: &[UserId]) -> Result<String> {
    serde_json::to_string(access_list).context("failed to encode access list")
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

/// Opening a file database never creates directories, so the parent of the
/// file is created up front. In-memory urls have nothing to create.
fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    match sqlite_path(database_url).as_deref().and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| {
                format!(
                    "cannot create directory '{}' for sqlite database '{database_url}'",
                    parent.display()
                )
            }),
        _ => Ok(()),
    }
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) {
        return None;
    }
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split_once('?').map_or(rest, |(path, _)| path);
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
