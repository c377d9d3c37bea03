// shuttle/src/utils/mod.rs
use std::path::{Path, PathBuf};

/// Picks the path a file called `name.ext` should land at inside `dir`.
///
/// With `overwrite` the plain name is returned. Otherwise `-1`, `-2`, ... is
/// appended to the name until nothing exists at the path. The check and the
/// later write are not atomic.
pub fn find_destination(dir: &Path, name: &str, ext: &str, overwrite: bool) -> PathBuf {
    let file_name = |stem: &str| {
        if ext.is_empty() {
            stem.to_string()
        } else {
            format!("{}.{}", stem, ext)
        }
    };

    let mut target = dir.join(file_name(name));
    if overwrite {
        return target;
    }

    let mut counter = 1;
    while target.exists() {
        target = dir.join(file_name(&format!("{}-{}", name, counter)));
        counter += 1;
    }

    target
}

/// Splits `photo.final.JPG` into (`photo.final`, `jpg`).
pub fn split_file_name(file_name: &str) -> (String, String) {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let ext = get_file_extension(path).unwrap_or_default();
    (stem, ext)
}

/// Replaces every character that is not a letter, digit, `_` or `-` with `-`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Short random suffix used to keep derivative names apart.
pub fn unique_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let base = 1024_f64;
    let bytes_f64 = bytes as f64;
    let exponent = ((bytes_f64.log10() / base.log10()).floor() as usize).min(UNITS.len() - 1);
    let size = bytes_f64 / base.powi(exponent as i32);

    format!("{:.2} {}", size, UNITS[exponent])
}

pub fn is_supported_format(path: &Path) -> bool {
    let extensions = ["jpg", "jpeg", "png", "gif"];

    get_file_extension(path)
        .map(|ext| extensions.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_counts_up() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_destination(dir.path(), "a", "jpg", false), dir.path().join("a.jpg"));

        std::fs::write(dir.path().join("a.jpg"), "").unwrap();
        std::fs::write(dir.path().join("a-1.jpg"), "").unwrap();
        assert_eq!(find_destination(dir.path(), "a", "jpg", false), dir.path().join("a-2.jpg"));
        assert_eq!(find_destination(dir.path(), "a", "jpg", true), dir.path().join("a.jpg"));
    }

    #[test]
    fn destination_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob"), "").unwrap();
        assert_eq!(find_destination(dir.path(), "blob", "", false), dir.path().join("blob-1"));
    }

    #[test]
    fn sanitize_keeps_letters_digits_dash_underscore() {
        assert_eq!(sanitize_name("a b/c.d_e-f"), "a-b-c-d_e-f");
        assert_eq!(sanitize_name("Straße_2024"), "Straße_2024");
    }

    #[test]
    fn split_names() {
        assert_eq!(split_file_name("photo.final.JPG"), ("photo.final".into(), "jpg".into()));
        assert_eq!(split_file_name("README"), ("README".into(), String::new()));
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512.00 B");
        assert_eq!(format_file_size(1536), "1.50 KB");
    }

    #[test]
    fn suffix_is_short_and_distinct() {
        let a = unique_suffix();
        assert_eq!(a.len(), 8);
        assert_ne!(a, unique_suffix());
    }
}
