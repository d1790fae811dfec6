//! Resource Locator Module
//!
//! Identifies a logical vault resource across requests. Equality and hashing
//! are identity-based on the logical resource path only, so concurrent and
//! repeated requests for the same resource map onto the same verification
//! cache entry even when the physical path representation differs.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Stable identity of a vault resource plus the location of its ciphertext.
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    /// Logical path of the resource as addressed by clients, e.g. `/docs/a.txt`.
    resource_path: String,
    /// Filesystem path of the backing encrypted file.
    physical_path: PathBuf,
}

impl ResourceLocator {
    pub fn new(resource_path: impl Into<String>, physical_path: impl Into<PathBuf>) -> Self {
        Self {
            resource_path: resource_path.into(),
            physical_path: physical_path.into(),
        }
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn physical_path(&self) -> &Path {
        &self.physical_path
    }
}

impl PartialEq for ResourceLocator {
    fn eq(&self, other: &Self) -> bool {
        self.resource_path == other.resource_path
    }
}

impl Eq for ResourceLocator {}

impl Hash for ResourceLocator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource_path.hash(state);
    }
}
