//! Build job queue on top of the shared store list primitive.

use bytes::Bytes;
use imgforge_core::{BuildRequest, Result, SharedStore};
use std::sync::Arc;

/// FIFO queue of serialized build requests.
///
/// Ordering holds while a single consumer is active. There is no
/// acknowledgement: a dequeued request is gone even if its build fails.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn SharedStore>,
    name: String,
}

impl JobQueue {
    pub fn new(store: Arc<dyn SharedStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a request to the tail of the queue.
    pub async fn enqueue(&self, request: &BuildRequest) -> Result<()> {
        let payload = serde_json::to_vec(request)?;
        self.store.push_back(&self.name, Bytes::from(payload)).await
    }

    /// Remove and decode the head of the queue.
    ///
    /// Returns `Ok(None)` when the queue is empty.
    pub async fn dequeue(&self) -> Result<Option<BuildRequest>> {
        match self.store.pop_front(&self.name).await? {
            Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }
}
