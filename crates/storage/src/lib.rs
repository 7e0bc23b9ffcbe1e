use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, SqliteConnection,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{
    domain::{ChannelId, ServerId, UserId},
    error::ApiException,
    protocol::{Category, ServerEdit, ServerSnapshot},
};

/// Local system of record for server sidebar ordering and persisted client stores.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredStoreData {
    pub store_id: String,
    pub data: serde_json::Value,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Inserts or fully replaces a server record.
    pub async fn upsert_server(&self, snapshot: &ServerSnapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO servers (server_id, name, owner_id, permission, channel_ids, categories, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(server_id) DO UPDATE SET
                name = excluded.name,
                owner_id = excluded.owner_id,
                permission = excluded.permission,
                channel_ids = excluded.channel_ids,
                categories = excluded.categories,
                updated_at = excluded.updated_at",
        )
        .bind(snapshot.server_id.as_str())
        .bind(&snapshot.name)
        .bind(snapshot.owner.as_str())
        .bind(snapshot.permission as i64)
        .bind(serde_json::to_string(&snapshot.channel_ids)?)
        .bind(serde_json::to_string(&snapshot.categories)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to upsert server {}", snapshot.server_id))?;
        Ok(())
    }

    pub async fn load_server(&self, server_id: &ServerId) -> Result<Option<ServerSnapshot>> {
        let mut conn = self.pool.acquire().await?;
        fetch_server(&mut conn, server_id).await
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerSnapshot>> {
        let rows = sqlx::query(
            "SELECT server_id, name, owner_id, permission, channel_ids, categories, updated_at
             FROM servers ORDER BY server_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    /// Validates and applies a sidebar edit atomically, returning the stored result.
    ///
    /// Rejections surface as [`ApiException`] inside the returned error.
    pub async fn edit_server(&self, server_id: &ServerId, edit: &ServerEdit) -> Result<ServerSnapshot> {
        let mut tx = self.pool.begin().await?;
        let mut snapshot = fetch_server(&mut tx, server_id)
            .await?
            .ok_or_else(|| ApiException::not_found(format!("server {server_id} not found")))?;

        edit.validate(&snapshot)?;

        snapshot.categories = edit.categories.clone();
        if let Some(channels) = &edit.channels {
            snapshot.channel_ids = channels.clone();
        }
        let updated_at = Utc::now();
        snapshot.updated_at = Some(updated_at);

        sqlx::query(
            "UPDATE servers SET channel_ids = ?, categories = ?, updated_at = ? WHERE server_id = ?",
        )
        .bind(serde_json::to_string(&snapshot.channel_ids)?)
        .bind(serde_json::to_string(&snapshot.categories)?)
        .bind(updated_at)
        .bind(server_id.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            %server_id,
            categories = snapshot.categories.len(),
            channels_replaced = edit.channels.is_some(),
            "server ordering edited"
        );
        Ok(snapshot)
    }

    /// Appends a channel to the end of the server's flat list.
    pub async fn add_channel(&self, server_id: &ServerId, channel_id: &ChannelId) -> Result<ServerSnapshot> {
        self.rewrite_server(server_id, |snapshot| {
            if !snapshot.channel_ids.contains(channel_id) {
                snapshot.channel_ids.push(channel_id.clone());
            }
        })
        .await
    }

    /// Removes a channel from the flat list and from whichever category held it.
    pub async fn remove_channel(&self, server_id: &ServerId, channel_id: &ChannelId) -> Result<ServerSnapshot> {
        self.rewrite_server(server_id, |snapshot| {
            snapshot.channel_ids.retain(|id| id != channel_id);
            for category in &mut snapshot.categories {
                category.channels.retain(|id| id != channel_id);
            }
        })
        .await
    }

    pub async fn save_store_data(
        &self,
        store_id: &str,
        data: &serde_json::Value,
        revision: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO client_state (store_id, data, revision, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(store_id) DO UPDATE SET
                data = excluded.data,
                revision = excluded.revision,
                updated_at = excluded.updated_at",
        )
        .bind(store_id)
        .bind(serde_json::to_string(data)?)
        .bind(revision)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save store '{store_id}'"))?;
        Ok(())
    }

    pub async fn load_store_data(&self, store_id: &str) -> Result<Option<StoredStoreData>> {
        let row = sqlx::query(
            "SELECT store_id, data, revision, updated_at FROM client_state WHERE store_id = ?",
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("data")?;
        Ok(Some(StoredStoreData {
            store_id: row.try_get("store_id")?,
            data: serde_json::from_str(&raw)
                .with_context(|| format!("corrupt data for store '{store_id}'"))?,
            revision: row.try_get("revision")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn rewrite_server(
        &self,
        server_id: &ServerId,
        change: impl FnOnce(&mut ServerSnapshot),
    ) -> Result<ServerSnapshot> {
        let mut tx = self.pool.begin().await?;
        let mut snapshot = fetch_server(&mut tx, server_id)
            .await?
            .ok_or_else(|| ApiException::not_found(format!("server {server_id} not found")))?;
        change(&mut snapshot);
        let updated_at = Utc::now();
        snapshot.updated_at = Some(updated_at);

        sqlx::query(
            "UPDATE servers SET channel_ids = ?, categories = ?, updated_at = ? WHERE server_id = ?",
        )
        .bind(serde_json::to_string(&snapshot.channel_ids)?)
        .bind(serde_json::to_string(&snapshot.categories)?)
        .bind(updated_at)
        .bind(server_id.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(snapshot)
    }
}

async fn fetch_server(conn: &mut SqliteConnection, server_id: &ServerId) -> Result<Option<ServerSnapshot>> {
    let row = sqlx::query(
        "SELECT server_id, name, owner_id, permission, channel_ids, categories, updated_at
         FROM servers WHERE server_id = ?",
    )
    .bind(server_id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .with_context(|| format!("failed to load server {server_id}"))?;

    row.as_ref().map(snapshot_from_row).transpose()
}

fn snapshot_from_row(row: &SqliteRow) -> Result<ServerSnapshot> {
    let server_id: String = row.try_get("server_id")?;
    let channel_ids: String = row.try_get("channel_ids")?;
    let categories: String = row.try_get("categories")?;
    let channel_ids: Vec<ChannelId> = serde_json::from_str(&channel_ids)
        .with_context(|| format!("corrupt channel list for server {server_id}"))?;
    let categories: Vec<Category> = serde_json::from_str(&categories)
        .with_context(|| format!("corrupt categories for server {server_id}"))?;

    Ok(ServerSnapshot {
        server_id: ServerId::new(server_id),
        name: row.try_get("name")?,
        owner: UserId::new(row.try_get::<String, _>("owner_id")?),
        permission: row.try_get::<i64, _>("permission")? as u64,
        channel_ids,
        categories,
        updated_at: row.try_get("updated_at").ok(),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_file_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return None;
    }
    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
