//! File share uploads and downloads.

use bytes::Bytes;
use chrono::Utc;

use super::StorageService;
use crate::payload::{timestamped_name, Payload};
use crate::storage::{ShareBackend, StorageError, StorageResult};

impl StorageService {
    /// Store `payload` in `share`, optionally inside `directory`, under a
    /// timestamped name. The directory is created if missing. Returns the
    /// stored file name.
    ///
    /// # Errors
    /// Returns `NotFound` if the share does not exist, or the backend error
    /// if the write fails.
    pub async fn upload_file(
        &self,
        payload: Payload,
        share: &str,
        directory: Option<&str>,
    ) -> StorageResult<String> {
        let name = timestamped_name(&payload, Utc::now());
        let size_bytes = payload.len();

        let result = async {
            if let Some(dir) = directory {
                self.backend.ensure_directory(share, dir).await?;
            }
            self.backend
                .put_file(share, directory, &name, payload.into_data())
                .await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(share, directory = ?directory, file = %name, error = %e, "File upload failed");
            return Err(e);
        }

        tracing::info!(share, directory = ?directory, file = %name, size_bytes, "Uploaded file");
        Ok(name)
    }

    /// Read a file from `share`, optionally inside `directory`.
    ///
    /// # Errors
    /// Returns `NotFound` if the file does not exist.
    pub async fn download_file(
        &self,
        share: &str,
        file_name: &str,
        directory: Option<&str>,
    ) -> StorageResult<Bytes> {
        match self.backend.get_file(share, directory, file_name).await {
            Ok(Some(data)) => Ok(data),
            Ok(None) => {
                let path = match directory {
                    Some(dir) => format!("{share}/{dir}/{file_name}"),
                    None => format!("{share}/{file_name}"),
                };
                Err(StorageError::not_found(format!("file {path}")))
            }
            Err(e) => {
                tracing::error!(share, directory = ?directory, file = file_name, error = %e, "File download failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::provision::ResourceLayout;
    use crate::storage::SimStorageBackend;

    async fn service() -> StorageService {
        StorageService::start(Arc::new(SimStorageBackend::new()), ResourceLayout::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let svc = service().await;
        let payload = Payload::new("invoice-7.pdf", Bytes::from_static(b"%PDF-1.7")).unwrap();

        let name = svc.upload_file(payload, "documents", Some("invoices")).await.unwrap();
        assert!(name.ends_with("_invoice-7.pdf"));

        let data = svc.download_file("documents", &name, Some("invoices")).await.unwrap();
        assert_eq!(data.as_ref(), b"%PDF-1.7");

        // Same name at the share root is a different file.
        let err = svc.download_file("documents", &name, None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_upload_to_share_root() {
        let svc = service().await;
        let payload = Payload::new("terms.txt", Bytes::from_static(b"v2")).unwrap();

        let name = svc.upload_file(payload, "documents", None).await.unwrap();
        assert!(name.ends_with("_terms.txt"));

        let data = svc.download_file("documents", &name, None).await.unwrap();
        assert_eq!(data.as_ref(), b"v2");

        let err = svc
            .download_file("documents", &name, Some("invoices"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_upload_creates_directory() {
        let svc = service().await;
        let payload = Payload::new("q3.csv", Bytes::from_static(b"a,b")).unwrap();

        let name = svc.upload_file(payload, "documents", Some("reports")).await.unwrap();
        let data = svc.download_file("documents", &name, Some("reports")).await.unwrap();
        assert_eq!(data.as_ref(), b"a,b");
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let svc = service().await;
        let err = svc
            .download_file("documents", "nope.pdf", Some("invoices"))
            .await
            .unwrap_err();
        match err {
            StorageError::NotFound { resource } => {
                assert_eq!(resource, "file documents/invoices/nope.pdf");
            }
            other => panic!("expected not found, got {other:?}"),
        }
    }
}
