// shuttle/src/core/mime.rs
use super::{Result, ShuttleError};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::Command;

const GENERIC: &str = "application/octet-stream";

pub const CATEGORIES: [&str; 5] = ["application", "audio", "image", "text", "video"];

const ARCHIVE: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-7z-compressed",
    "application/x-rar-compressed",
    "application/vnd.rar",
    "application/x-tar",
    "application/gzip",
    "application/x-gzip",
    "application/x-bzip",
    "application/x-bzip2",
];

const DOCUMENT: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.oasis.opendocument.text",
    "application/rtf",
    "text/rtf",
    "text/plain",
];

const SPREADSHEET: &[&str] = &[
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.oasis.opendocument.spreadsheet",
    "text/csv",
];

const PRESENTATION: &[&str] = &[
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.presentation",
];

/// Resolves the mime type of a file on disk.
///
/// The `file` utility is asked first, then the magic bytes are sniffed. The
/// type registered for the extension overrides both when they disagree, since
/// probes regularly misreport scripts and plain text. `declared` is the type
/// claimed by the uploader and is only used when nothing else is known.
pub fn resolve(path: &Path, declared: Option<&str>) -> String {
    let probed = probe_with_command(path).or_else(|| probe_magic(path));
    let from_ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(from_extension);

    match (probed, from_ext) {
        (Some(probed), Some(ext_type)) => {
            if probed != ext_type {
                log::debug!(
                    "Probe reported {} for {} but extension says {}",
                    probed,
                    path.display(),
                    ext_type
                );
            }
            ext_type.to_string()
        }
        (None, Some(ext_type)) => ext_type.to_string(),
        (Some(probed), None) => probed,
        (None, None) => declared.unwrap_or(GENERIC).to_string(),
    }
}

fn probe_with_command(path: &Path) -> Option<String> {
    let output = Command::new("file")
        .args(["--brief", "--mime-type"])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let mime = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if mime.is_empty() || mime == GENERIC || !mime.contains('/') {
        None
    } else {
        Some(mime)
    }
}

fn probe_magic(path: &Path) -> Option<String> {
    let mut header = [0u8; 64];
    let read = File::open(path).and_then(|mut f| f.read(&mut header)).ok()?;
    image::guess_format(&header[..read])
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// Canonical mime type registered for an extension.
pub fn from_extension(ext: &str) -> Option<&'static str> {
    mime_guess::from_ext(&ext.to_lowercase()).first_raw()
}

/// Preferred extension for a mime type.
pub fn extension_for(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/tiff" => Some("tif"),
        "text/plain" => Some("txt"),
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied()),
    }
}

/// Mime types grouped under a named subtype such as `archive`.
pub fn subtype(name: &str) -> Result<&'static [&'static str]> {
    match name {
        "archive" => Ok(ARCHIVE),
        "document" => Ok(DOCUMENT),
        "spreadsheet" => Ok(SPREADSHEET),
        "presentation" => Ok(PRESENTATION),
        other => Err(ShuttleError::Config(format!(
            "Subtype {} does not exist",
            other
        ))),
    }
}

/// Checks a mime type against a top-level category or a named subtype.
pub fn matches_category(mime: &str, category: &str) -> Result<bool> {
    if CATEGORIES.contains(&category) {
        return Ok(top_level(mime) == category);
    }
    Ok(subtype(category)?.contains(&mime))
}

pub fn top_level(mime: &str) -> &str {
    mime.split('/').next().unwrap_or(mime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extension_lookup() {
        assert_eq!(from_extension("jpg"), Some("image/jpeg"));
        assert_eq!(from_extension("PNG"), Some("image/png"));
        assert_eq!(from_extension("definitely-not-an-ext"), None);
    }

    #[test]
    fn preferred_extension() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("no/such-type"), None);
    }

    #[test]
    fn categories_and_subtypes() {
        assert!(matches_category("image/png", "image").unwrap());
        assert!(!matches_category("image/png", "video").unwrap());
        assert!(matches_category("application/zip", "archive").unwrap());
        assert!(!matches_category("image/png", "archive").unwrap());
        assert!(matches!(
            matches_category("image/png", "spaceship"),
            Err(ShuttleError::Config(_))
        ));
    }

    #[test]
    fn extension_wins_over_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"#!/bin/sh\necho hello\n").unwrap();

        assert_eq!(resolve(&path, None), "text/plain");
    }

    #[test]
    fn magic_bytes_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload");
        image::RgbImage::new(4, 4)
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        assert_eq!(resolve(&path, Some("application/pdf")), "image/png");
    }
}
