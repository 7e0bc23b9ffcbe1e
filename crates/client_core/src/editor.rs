use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{ServerId, UserId},
    error::ApiException,
    protocol::ServerEdit,
};
use storage::Storage;

/// Outbound "edit server" capability of the system of record.
#[async_trait]
pub trait ServerEditor: Send + Sync {
    async fn edit_server(&self, server_id: &ServerId, edit: ServerEdit) -> Result<()>;
}

/// Applies edits to the local SQLite store.
#[derive(Clone)]
pub struct StorageServerEditor {
    storage: Storage,
    actor: Option<UserId>,
}

impl StorageServerEditor {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            actor: None,
        }
    }

    /// Edits are rejected as forbidden unless `actor` may manage the server's channels.
    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }
}

#[async_trait]
impl ServerEditor for StorageServerEditor {
    async fn edit_server(&self, server_id: &ServerId, edit: ServerEdit) -> Result<()> {
        if let Some(actor) = &self.actor {
            let server = self
                .storage
                .load_server(server_id)
                .await?
                .ok_or_else(|| ApiException::not_found(format!("server {server_id} not found")))?;
            if !permissions::can_manage_channels(server.permission, &server.owner, Some(actor)) {
                return Err(ApiException::forbidden(format!(
                    "user {actor} may not manage channels on server {server_id}"
                ))
                .into());
            }
        }
        self.storage.edit_server(server_id, &edit).await?;
        Ok(())
    }
}
