use shared::domain::ServerId;
use sidebar::OrderingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SidebarError {
    #[error("a sidebar save for server {0} is still in flight")]
    SaveInProgress(ServerId),
    #[error("server {server_id} rejected the sidebar edit: {source}")]
    PersistRejected {
        server_id: ServerId,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Ordering(#[from] OrderingError),
}
