//! Physical Resources
//!
//! Descriptors for the tables, containers, queues, shares and directories the
//! facade provisions, plus the naming rules each kind must satisfy.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};
use crate::constants::{RESOURCE_NAME_LENGTH_MAX, RESOURCE_NAME_LENGTH_MIN};

/// Maximum length of a share directory name
const DIRECTORY_NAME_LENGTH_MAX: usize = 255;

// =============================================================================
// Kinds and Policies
// =============================================================================

/// Kind of physical resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Partitioned entity table
    Table,
    /// Flat blob container
    Container,
    /// Message queue
    Queue,
    /// Hierarchical file share
    Share,
    /// Directory inside a share
    Directory,
}

impl ResourceKind {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Container => "container",
            Self::Queue => "queue",
            Self::Share => "share",
            Self::Directory => "directory",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anonymous access policy of a blob container, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPolicy {
    /// No anonymous access
    #[default]
    Private,
    /// Anonymous read of individual blobs
    Blob,
    /// Anonymous read of blobs and container listing
    Container,
}

impl AccessPolicy {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Blob => "blob",
            Self::Container => "container",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "private" => Some(Self::Private),
            "blob" => Some(Self::Blob),
            "container" => Some(Self::Container),
            _ => None,
        }
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// A physical resource the facade depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Kind of resource
    pub kind: ResourceKind,
    /// Name; directories are written `share/directory`
    pub name: String,
    /// Access policy, containers only
    pub access_policy: Option<AccessPolicy>,
}

impl ResourceDescriptor {
    /// Describe an entity table.
    #[must_use]
    pub fn table(name: impl Into<String>) -> Self {
        Self::plain(ResourceKind::Table, name)
    }

    /// Describe a blob container with its access policy.
    #[must_use]
    pub fn container(name: impl Into<String>, policy: AccessPolicy) -> Self {
        Self {
            kind: ResourceKind::Container,
            name: name.into(),
            access_policy: Some(policy),
        }
    }

    /// Describe a queue.
    #[must_use]
    pub fn queue(name: impl Into<String>) -> Self {
        Self::plain(ResourceKind::Queue, name)
    }

    /// Describe a file share.
    #[must_use]
    pub fn share(name: impl Into<String>) -> Self {
        Self::plain(ResourceKind::Share, name)
    }

    /// Describe a directory inside a share.
    #[must_use]
    pub fn directory(share: &str, directory: &str) -> Self {
        Self::plain(ResourceKind::Directory, format!("{share}/{directory}"))
    }

    fn plain(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            access_policy: None,
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)?;
        if let Some(policy) = self.access_policy {
            write!(f, " ({})", policy.as_str())?;
        }
        Ok(())
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Check `name` against the naming rules of `kind`.
///
/// Tables: letters and digits, starting with a letter. Containers, queues and
/// shares: lowercase letters, digits and single hyphens, no leading or
/// trailing hyphen. Directories: any printable name without path separators.
///
/// # Errors
/// Returns `InvalidName` describing the violated rule.
pub fn validate_resource_name(kind: ResourceKind, name: &str) -> StorageResult<()> {
    if kind == ResourceKind::Directory {
        return validate_directory_name(name);
    }

    let len = name.len();
    if !(RESOURCE_NAME_LENGTH_MIN..=RESOURCE_NAME_LENGTH_MAX).contains(&len) {
        return Err(StorageError::invalid_name(
            name,
            format!(
                "{kind} names must be {RESOURCE_NAME_LENGTH_MIN}-{RESOURCE_NAME_LENGTH_MAX} characters"
            ),
        ));
    }

    match kind {
        ResourceKind::Table => {
            let starts_with_letter = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
            if !starts_with_letter || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(StorageError::invalid_name(
                    name,
                    "table names are alphanumeric and start with a letter",
                ));
            }
        }
        _ => {
            let valid_chars = name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
            if !valid_chars
                || name.starts_with('-')
                || name.ends_with('-')
                || name.contains("--")
            {
                return Err(StorageError::invalid_name(
                    name,
                    format!("{kind} names use lowercase letters, digits and single inner hyphens"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_directory_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.len() > DIRECTORY_NAME_LENGTH_MAX {
        return Err(StorageError::invalid_name(
            name,
            format!("directory names must be 1-{DIRECTORY_NAME_LENGTH_MAX} characters"),
        ));
    }
    if name == "." || name == ".." {
        return Err(StorageError::invalid_name(name, "relative directory names are not allowed"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '"' | '\\' | '/' | ':' | '|' | '<' | '>' | '*' | '?') || c.is_control())
    {
        return Err(StorageError::invalid_name(
            name,
            format!("directory name contains forbidden character {c:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert!(validate_resource_name(ResourceKind::Table, "Customers").is_ok());
        assert!(validate_resource_name(ResourceKind::Table, "Orders2024").is_ok());
        assert!(validate_resource_name(ResourceKind::Table, "2Orders").is_err());
        assert!(validate_resource_name(ResourceKind::Table, "order-items").is_err());
        assert!(validate_resource_name(ResourceKind::Table, "ab").is_err());
    }

    #[test]
    fn test_container_and_queue_names() {
        assert!(validate_resource_name(ResourceKind::Container, "images").is_ok());
        assert!(validate_resource_name(ResourceKind::Queue, "order-events").is_ok());
        assert!(validate_resource_name(ResourceKind::Container, "Images").is_err());
        assert!(validate_resource_name(ResourceKind::Queue, "-orders").is_err());
        assert!(validate_resource_name(ResourceKind::Queue, "orders-").is_err());
        assert!(validate_resource_name(ResourceKind::Share, "doc--uments").is_err());
    }

    #[test]
    fn test_directory_names() {
        assert!(validate_resource_name(ResourceKind::Directory, "invoices").is_ok());
        assert!(validate_resource_name(ResourceKind::Directory, "Q1 Reports").is_ok());
        assert!(validate_resource_name(ResourceKind::Directory, "a/b").is_err());
        assert!(validate_resource_name(ResourceKind::Directory, "..").is_err());
        assert!(validate_resource_name(ResourceKind::Directory, "").is_err());
    }

    #[test]
    fn test_descriptor_display() {
        let images = ResourceDescriptor::container("images", AccessPolicy::Blob);
        assert_eq!(images.to_string(), "container images (blob)");
        assert_eq!(
            ResourceDescriptor::directory("documents", "invoices").to_string(),
            "directory documents/invoices"
        );
    }

    #[test]
    fn test_access_policy_parse() {
        assert_eq!(AccessPolicy::parse("BLOB"), Some(AccessPolicy::Blob));
        assert_eq!(AccessPolicy::parse("private"), Some(AccessPolicy::Private));
        assert_eq!(AccessPolicy::parse("public"), None);
    }
}
