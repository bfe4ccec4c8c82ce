//! Upload Payloads
//!
//! A named byte buffer handed to blob and share uploads. How the caller got
//! the bytes (multipart form, file, socket) does not matter here.

use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::UPLOAD_TIMESTAMP_FORMAT;
use crate::storage::{StorageError, StorageResult};

/// Bytes plus the name they were uploaded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    file_name: String,
    data: Bytes,
}

impl Payload {
    /// Wrap an in-memory buffer.
    ///
    /// # Errors
    /// Returns `InvalidName` if `file_name` is empty or contains a path.
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> StorageResult<Self> {
        let file_name = file_name.into();
        validate_file_name(&file_name)?;
        Ok(Self {
            file_name,
            data: data.into(),
        })
    }

    /// Read `reader` to the end.
    ///
    /// # Errors
    /// Returns `Io` if reading fails and `InvalidName` for a bad file name.
    pub async fn from_reader<R>(file_name: impl Into<String>, mut reader: R) -> StorageResult<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Self::new(file_name, buf)
    }

    /// Read a file from disk, named after its final path component.
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read and `InvalidName` if the path
    /// has no usable file name.
    pub async fn from_path(path: &Path) -> StorageResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::invalid_name(path.display().to_string(), "no file name"))?
            .to_string();
        let data = tokio::fs::read(path).await?;
        Self::new(file_name, data)
    }

    /// Original file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Extension of the original name including the dot, or `""`.
    #[must_use]
    pub fn extension(&self) -> &str {
        match self.file_name.rfind('.') {
            Some(0) | None => "",
            Some(dot) => &self.file_name[dot..],
        }
    }

    /// Payload bytes.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume into the byte buffer.
    #[must_use]
    pub fn into_data(self) -> Bytes {
        self.data
    }
}

fn validate_file_name(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::invalid_name(name, "file name is empty"));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StorageError::invalid_name(name, "file name must not contain a path"));
    }
    Ok(())
}

// =============================================================================
// Naming
// =============================================================================

/// Collision-improbable name keeping the original extension:
/// `3f2b…-….png`.
#[must_use]
pub fn generated_name(payload: &Payload) -> String {
    format!("{}{}", uuid::Uuid::new_v4(), payload.extension())
}

/// `YYYYMMDDHHMMSS_<original>` using `now` in UTC.
#[must_use]
pub fn timestamped_name(payload: &Payload, now: DateTime<Utc>) -> String {
    format!("{}_{}", now.format(UPLOAD_TIMESTAMP_FORMAT), payload.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn test_extension() {
        let p = |name: &str| Payload::new(name, Bytes::new()).unwrap();
        assert_eq!(p("cat.png").extension(), ".png");
        assert_eq!(p("archive.tar.gz").extension(), ".gz");
        assert_eq!(p("README").extension(), "");
        assert_eq!(p(".env").extension(), "");
    }

    #[test]
    fn test_rejects_paths() {
        assert!(Payload::new("", Bytes::new()).is_err());
        assert!(Payload::new("../etc/passwd", Bytes::new()).is_err());
        assert!(Payload::new("dir\\file.txt", Bytes::new()).is_err());
    }

    #[test]
    fn test_generated_name_keeps_extension() {
        let payload = Payload::new("photo.jpeg", Bytes::from_static(b"x")).unwrap();
        let a = generated_name(&payload);
        let b = generated_name(&payload);
        assert!(a.ends_with(".jpeg"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_timestamped_name() {
        let payload = Payload::new("receipt.pdf", Bytes::from_static(b"x")).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(timestamped_name(&payload, now), "20240309140507_receipt.pdf");
    }

    #[tokio::test]
    async fn test_from_reader() {
        let payload = Payload::from_reader("note.txt", &b"hello"[..]).await.unwrap();
        assert_eq!(payload.data().as_ref(), b"hello");
        assert_eq!(payload.len(), 5);
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice-7.pdf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"%PDF")
            .unwrap();

        let payload = Payload::from_path(&path).await.unwrap();
        assert_eq!(payload.file_name(), "invoice-7.pdf");
        assert_eq!(payload.into_data(), Bytes::from_static(b"%PDF"));
    }
}
