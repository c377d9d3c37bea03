// shuttle/src/transport/local.rs
use super::{TransportOverrides, Transporter};
use crate::core::{FileHandle, Result, ShuttleError};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Moves files into a directory tree on this machine.
#[derive(Debug, Clone)]
pub struct LocalTransporter {
    root: PathBuf,
    overwrite: bool,
    return_url: bool,
}

impl LocalTransporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overwrite: false,
            return_url: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Locators become `file://` URLs instead of plain paths.
    pub fn with_return_url(mut self, return_url: bool) -> Self {
        self.return_url = return_url;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locator_path(locator: &str) -> Option<PathBuf> {
        if locator.starts_with("file://") {
            Url::parse(locator).ok()?.to_file_path().ok()
        } else {
            Some(PathBuf::from(locator))
        }
    }
}

impl Transporter for LocalTransporter {
    fn transport(&self, file: &mut FileHandle, overrides: &TransportOverrides) -> Result<String> {
        let dir = match overrides.folder.as_deref().map(|f| f.trim_matches('/')) {
            Some(folder) if !folder.is_empty() => self.root.join(folder),
            _ => self.root.clone(),
        };

        file.move_to(&dir, self.overwrite)?;
        log::debug!("Stored {} locally", file.path().display());

        if overrides.return_url.unwrap_or(self.return_url) {
            Url::from_file_path(file.path())
                .map(|url| url.to_string())
                .map_err(|_| {
                    ShuttleError::Transportation(format!(
                        "{} can not be expressed as a URL",
                        file.path().display()
                    ))
                })
        } else {
            Ok(file.path().display().to_string())
        }
    }

    fn delete(&self, locator: &str) -> bool {
        let Some(path) = Self::locator_path(locator) else {
            log::warn!("Unrecognised local locator {}", locator);
            return false;
        };

        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Could not delete {}: {}", path.display(), e);
                false
            }
        }
    }
}
