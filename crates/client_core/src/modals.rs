//! Modal stack service, constructed once and handed to whatever opens modals.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModalRequest {
    /// Changelog viewer opened on the entry at `initial`.
    Changelog { initial: usize },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalEvent {
    Opened(ModalRequest),
    Closed(ModalRequest),
}

pub struct ModalController {
    stack: Mutex<Vec<ModalRequest>>,
    events: broadcast::Sender<ModalEvent>,
}

impl ModalController {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            stack: Mutex::new(Vec::new()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModalEvent> {
        self.events.subscribe()
    }

    pub async fn push(&self, modal: ModalRequest) {
        debug!(?modal, "opening modal");
        self.stack.lock().await.push(modal.clone());
        let _ = self.events.send(ModalEvent::Opened(modal));
    }

    /// Closes the topmost modal.
    pub async fn pop(&self) -> Option<ModalRequest> {
        let closed = self.stack.lock().await.pop();
        if let Some(modal) = &closed {
            let _ = self.events.send(ModalEvent::Closed(modal.clone()));
        }
        closed
    }

    pub async fn close_all(&self) {
        let drained: Vec<_> = self.stack.lock().await.drain(..).rev().collect();
        for modal in drained {
            let _ = self.events.send(ModalEvent::Closed(modal));
        }
    }

    pub async fn active(&self) -> Option<ModalRequest> {
        self.stack.lock().await.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.stack.lock().await.len()
    }
}
