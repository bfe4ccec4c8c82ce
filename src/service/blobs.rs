//! Blob uploads and downloads.

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::StorageService;
use crate::payload::{generated_name, timestamped_name, Payload};
use crate::provision::ResourceLayout;
use crate::storage::{AccessPolicy, BlobBackend, StorageError, StorageResult};

/// How an uploaded blob is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobNaming {
    /// Random UUID plus the original extension
    Generated,
    /// `YYYYMMDDHHMMSS_<original>` in UTC
    Timestamped,
}

impl BlobNaming {
    fn apply(self, payload: &Payload) -> String {
        match self {
            Self::Generated => generated_name(payload),
            Self::Timestamped => timestamped_name(payload, Utc::now()),
        }
    }
}

/// A stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedBlob {
    /// Blob name inside its container
    pub name: String,
    /// Locator the blob can be fetched from
    pub url: String,
}

impl StorageService {
    /// Store a product image under a generated name in the public image
    /// container.
    ///
    /// # Errors
    /// Returns the backend error if the write fails.
    pub async fn upload_image(&self, payload: Payload) -> StorageResult<UploadedBlob> {
        let container = self.layout.images_container.clone();
        self.upload_blob(&container, ResourceLayout::IMAGES_POLICY, payload, BlobNaming::Generated)
            .await
    }

    /// Store a payment proof under a timestamped name in the private proof
    /// container.
    ///
    /// # Errors
    /// Returns the backend error if the write fails.
    pub async fn upload_proof(&self, payload: Payload) -> StorageResult<UploadedBlob> {
        let container = self.layout.proofs_container.clone();
        self.upload_blob(&container, ResourceLayout::PROOFS_POLICY, payload, BlobNaming::Timestamped)
            .await
    }

    /// Store `payload` in `container`, creating the container with `policy`
    /// if it does not exist yet.
    ///
    /// # Errors
    /// Returns the backend error if the container cannot be ensured or the
    /// write fails.
    pub async fn upload_blob(
        &self,
        container: &str,
        policy: AccessPolicy,
        payload: Payload,
        naming: BlobNaming,
    ) -> StorageResult<UploadedBlob> {
        let name = naming.apply(&payload);
        let size_bytes = payload.len();

        let result = async {
            self.backend.ensure_container(container, policy).await?;
            self.backend
                .put_blob(container, &name, payload.into_data())
                .await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(container, blob = %name, error = %e, "Blob upload failed");
            return Err(e);
        }

        let url = self.backend.blob_url(container, &name);
        tracing::info!(container, blob = %name, size_bytes, "Uploaded blob");
        Ok(UploadedBlob { name, url })
    }

    /// Read a blob.
    ///
    /// # Errors
    /// Returns `NotFound` if the blob does not exist.
    pub async fn download_blob(&self, container: &str, name: &str) -> StorageResult<Bytes> {
        match self.backend.get_blob(container, name).await {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Err(StorageError::not_found(format!("blob {container}/{name}"))),
            Err(e) => {
                tracing::error!(container, blob = name, error = %e, "Blob download failed");
                Err(e)
            }
        }
    }

    /// Delete a blob. A blob that does not exist is not an error.
    ///
    /// # Errors
    /// Returns the backend error if the delete fails.
    pub async fn delete_blob(&self, container: &str, name: &str) -> StorageResult<()> {
        match self.backend.delete_blob(container, name).await {
            Ok(existed) => {
                tracing::debug!(container, blob = name, existed, "Deleted blob");
                Ok(())
            }
            Err(e) => {
                tracing::error!(container, blob = name, error = %e, "Blob delete failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::SimStorageBackend;

    async fn service() -> (Arc<SimStorageBackend>, StorageService) {
        let sim = Arc::new(SimStorageBackend::new());
        let svc = StorageService::start(sim.clone(), ResourceLayout::default())
            .await
            .unwrap();
        (sim, svc)
    }

    #[tokio::test]
    async fn test_upload_image_generated_name() {
        let (_, svc) = service().await;
        let payload = Payload::new("kite.png", Bytes::from_static(b"\x89PNG")).unwrap();

        let blob = svc.upload_image(payload).await.unwrap();
        assert!(blob.name.ends_with(".png"));
        assert_ne!(blob.name, "kite.png");
        assert_eq!(blob.url, format!("memory://images/{}", blob.name));

        let data = svc.download_blob("images", &blob.name).await.unwrap();
        assert_eq!(data.as_ref(), b"\x89PNG");
    }

    #[tokio::test]
    async fn test_upload_proof_timestamped_name() {
        let (_, svc) = service().await;
        let payload = Payload::new("receipt.pdf", Bytes::from_static(b"%PDF")).unwrap();

        let blob = svc.upload_proof(payload).await.unwrap();
        let (stamp, original) = blob.name.split_once('_').unwrap();
        assert_eq!(original, "receipt.pdf");
        assert_eq!(stamp.len(), 14);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_upload_blob_creates_container() {
        let (sim, svc) = service().await;
        let payload = Payload::new("a.txt", Bytes::from_static(b"a")).unwrap();

        svc.upload_blob("scratch", AccessPolicy::Container, payload, BlobNaming::Timestamped)
            .await
            .unwrap();
        assert_eq!(sim.container_policy("scratch").await, Some(AccessPolicy::Container));
    }

    #[tokio::test]
    async fn test_delete_blob_is_idempotent() {
        let (_, svc) = service().await;
        let payload = Payload::new("kite.png", Bytes::from_static(b"x")).unwrap();
        let blob = svc.upload_image(payload).await.unwrap();

        svc.delete_blob("images", &blob.name).await.unwrap();
        svc.delete_blob("images", &blob.name).await.unwrap();
        svc.delete_blob("images", "never-existed.png").await.unwrap();

        let err = svc.download_blob("images", &blob.name).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_blob_in_missing_container() {
        let (sim, svc) = service().await;

        svc.delete_blob("never-made", "x.png").await.unwrap();
        assert_eq!(sim.container_policy("never-made").await, None);
    }
}
