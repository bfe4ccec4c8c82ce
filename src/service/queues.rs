//! Queue send and receive.
//!
//! Receive acknowledges at once: the message is deleted before its text is
//! returned, so a caller that fails afterwards loses it. There is no
//! redelivery.

use super::StorageService;
use crate::storage::{QueueBackend, StorageResult};

impl StorageService {
    /// Append a message to `queue`.
    ///
    /// # Errors
    /// Returns the backend error if the send fails.
    pub async fn send(&self, queue: &str, text: &str) -> StorageResult<()> {
        self.backend.send_message(queue, text).await.map_err(|e| {
            tracing::error!(queue, error = %e, "Queue send failed");
            e
        })?;
        tracing::debug!(queue, bytes = text.len(), "Sent message");
        Ok(())
    }

    /// Take at most one message from `queue` and delete it. `None` if the
    /// queue has no visible message.
    ///
    /// # Errors
    /// Returns the backend error if receiving or deleting fails.
    pub async fn receive(&self, queue: &str) -> StorageResult<Option<String>> {
        let received = self.backend.receive_message(queue).await.map_err(|e| {
            tracing::error!(queue, error = %e, "Queue receive failed");
            e
        })?;
        let Some(message) = received else {
            return Ok(None);
        };

        self.backend
            .delete_message(queue, &message.id, &message.pop_receipt)
            .await
            .map_err(|e| {
                tracing::error!(queue, message_id = %message.id, error = %e, "Queue ack failed");
                e
            })?;

        tracing::debug!(queue, message_id = %message.id, "Received message");
        Ok(Some(message.text))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::provision::ResourceLayout;
    use crate::storage::SimStorageBackend;

    #[tokio::test]
    async fn test_receive_removes_message() {
        let sim = Arc::new(SimStorageBackend::new());
        let svc = StorageService::start(sim.clone(), ResourceLayout::default())
            .await
            .unwrap();

        svc.send("notifications", "first").await.unwrap();
        svc.send("notifications", "second").await.unwrap();
        assert_eq!(sim.queue_len("notifications").await, 2);

        assert_eq!(svc.receive("notifications").await.unwrap().as_deref(), Some("first"));
        assert_eq!(sim.queue_len("notifications").await, 1);
        assert_eq!(svc.receive("notifications").await.unwrap().as_deref(), Some("second"));
        assert_eq!(svc.receive("notifications").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_queue() {
        let svc = StorageService::start(Arc::new(SimStorageBackend::new()), ResourceLayout::default())
            .await
            .unwrap();
        assert!(svc.send("no-such-queue", "x").await.unwrap_err().is_not_found());
    }
}
