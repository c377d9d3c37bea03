// shuttle/src/transport/mod.rs
mod glacier;
mod local;
mod s3;
mod sigv4;

pub use glacier::{tree_hash, GlacierConfig, GlacierTransporter};
pub use local::LocalTransporter;
pub use s3::{S3Config, S3Location, S3Transporter};
pub use sigv4::{Credentials, Signer};

use crate::core::{FileHandle, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ships a local file to storage and hands back a locator for it.
pub trait Transporter: Send + Sync {
    /// Sends `file` and returns its locator. Remote transporters delete the
    /// local copy once the send succeeds.
    fn transport(&self, file: &mut FileHandle, overrides: &TransportOverrides) -> Result<String>;

    /// Removes the stored copy behind `locator`. Best effort: failures are
    /// reported as `false`.
    fn delete(&self, locator: &str) -> bool;
}

impl<T: Transporter + ?Sized> Transporter for Arc<T> {
    fn transport(&self, file: &mut FileHandle, overrides: &TransportOverrides) -> Result<String> {
        (**self).transport(file, overrides)
    }

    fn delete(&self, locator: &str) -> bool {
        (**self).delete(locator)
    }
}

/// Settings a single send may override on top of the transporter's own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOverrides {
    pub folder: Option<String>,
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    pub encryption: Option<String>,
    pub return_url: Option<bool>,
    pub metadata: BTreeMap<String, String>,
}

impl TransportOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = Some(acl.into());
        self
    }

    pub fn with_storage_class(mut self, storage_class: impl Into<String>) -> Self {
        self.storage_class = Some(storage_class.into());
        self
    }

    pub fn with_encryption(mut self, encryption: impl Into<String>) -> Self {
        self.encryption = Some(encryption.into());
        self
    }

    pub fn with_return_url(mut self, return_url: bool) -> Self {
        self.return_url = Some(return_url);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Layers `other` on top of `self`; set fields in `other` win.
    pub fn merge(&self, other: &TransportOverrides) -> TransportOverrides {
        let mut metadata = self.metadata.clone();
        metadata.extend(other.metadata.clone());
        TransportOverrides {
            folder: other.folder.clone().or_else(|| self.folder.clone()),
            acl: other.acl.clone().or_else(|| self.acl.clone()),
            storage_class: other
                .storage_class
                .clone()
                .or_else(|| self.storage_class.clone()),
            encryption: other.encryption.clone().or_else(|| self.encryption.clone()),
            return_url: other.return_url.or(self.return_url),
            metadata,
        }
    }
}

/// Overrides for one transport call: shared defaults plus per-file entries
/// keyed by send order (0 is the original, 1.. the derivatives).
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub defaults: TransportOverrides,
    pub per_file: BTreeMap<usize, TransportOverrides>,
}

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(mut self, defaults: TransportOverrides) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_file(mut self, index: usize, overrides: TransportOverrides) -> Self {
        self.per_file.insert(index, overrides);
        self
    }

    pub fn for_file(&self, index: usize) -> TransportOverrides {
        match self.per_file.get(&index) {
            Some(overrides) => self.defaults.merge(overrides),
            None => self.defaults.clone(),
        }
    }
}

/// Folder prefix as an object key prefix: no leading slash, one trailing.
pub(crate) fn key_prefix(folder: &str) -> String {
    let trimmed = folder.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}
