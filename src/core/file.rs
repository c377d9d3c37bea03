// shuttle/src/core/file.rs
use super::{mime, Dimensions, Result, ShuttleError, UploadedFile};
use crate::processors::{Loader, MetadataProcessor};
use crate::utils::{find_destination, sanitize_name};
use serde::Serialize;
use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

/// What the uploader claimed about a file before it reached local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub name: String,
    pub mime_type: Option<String>,
    pub size: u64,
}

/// Camera fields read from exif. Every field is an empty string when the file
/// carries no exif data or cannot carry any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExifData {
    pub make: String,
    pub model: String,
    pub exposure: String,
    pub orientation: String,
    pub fnumber: String,
    pub date: String,
    pub iso: String,
    pub focal: String,
}

impl ExifData {
    pub fn orientation_value(&self) -> Option<u16> {
        self.orientation.trim().parse().ok()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn fields(&self) -> [(&'static str, &str); 8] {
        [
            ("make", &self.make),
            ("model", &self.model),
            ("exposure", &self.exposure),
            ("orientation", &self.orientation),
            ("fnumber", &self.fnumber),
            ("date", &self.date),
            ("iso", &self.iso),
            ("focal", &self.focal),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub basename: String,
    pub dir: PathBuf,
    pub ext: String,
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A file on local storage plus lazily computed facts about it.
///
/// Every mutation that changes the path drops all cached facts. Once
/// [`FileHandle::delete`] has run the handle is gone and reads fail.
#[derive(Debug, Clone)]
pub struct FileHandle {
    path: PathBuf,
    origin: Option<Origin>,
    dimensions: OnceCell<Option<Dimensions>>,
    mime_type: OnceCell<String>,
    exif: OnceCell<ExifData>,
    deleted: bool,
}

impl FileHandle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ShuttleError::Io(format!("{} does not exist", path.display())));
        }

        Ok(Self {
            path: absolute(path)?,
            origin: None,
            dimensions: OnceCell::new(),
            mime_type: OnceCell::new(),
            exif: OnceCell::new(),
            deleted: false,
        })
    }

    pub fn with_origin(path: impl AsRef<Path>, origin: Origin) -> Result<Self> {
        let mut file = Self::open(path)?;
        file.origin = Some(origin);
        Ok(file)
    }

    /// Opens the temporary file of an upload. Files without an extension are
    /// renamed on the spot so every live handle has one.
    pub fn from_upload(upload: &UploadedFile) -> Result<Self> {
        let origin = Origin {
            name: upload.name.clone(),
            mime_type: upload.mime_type.clone(),
            size: upload.size,
        };
        let mut file = Self::with_origin(&upload.tmp_name, origin)?;
        if file.ext().is_empty() {
            file.synthesize_extension()?;
        }
        Ok(file)
    }

    fn synthesize_extension(&mut self) -> Result<()> {
        let declared = self
            .origin
            .as_ref()
            .and_then(|o| Path::new(&o.name).extension())
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        let ext = match declared {
            Some(ext) if !ext.is_empty() => ext,
            _ => mime::extension_for(&self.mime_type()?)
                .unwrap_or("bin")
                .to_string(),
        };

        let target = self.path.with_extension(&ext);
        log::debug!("Adding .{} to {}", ext, self.path.display());
        fs::rename(&self.path, &target)?;
        self.reset();
        self.path = target;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn ext(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    pub fn dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn exists(&self) -> bool {
        !self.deleted && self.path.is_file()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.deleted {
            return Err(ShuttleError::Io(format!(
                "{} has been deleted",
                self.path.display()
            )));
        }
        Ok(())
    }

    pub fn size(&self) -> Result<u64> {
        self.ensure_live()?;
        let metadata = fs::metadata(&self.path).map_err(|e| {
            ShuttleError::Io(format!("Failed to stat {}: {}", self.path.display(), e))
        })?;
        Ok(metadata.len())
    }

    pub fn mime_type(&self) -> Result<String> {
        self.ensure_live()?;
        if let Some(mime_type) = self.mime_type.get() {
            return Ok(mime_type.clone());
        }

        let declared = self.origin.as_ref().and_then(|o| o.mime_type.as_deref());
        let resolved = mime::resolve(&self.path, declared);
        let _ = self.mime_type.set(resolved.clone());
        Ok(resolved)
    }

    pub fn dimensions(&self) -> Result<Option<Dimensions>> {
        self.ensure_live()?;
        if let Some(dimensions) = self.dimensions.get() {
            return Ok(*dimensions);
        }

        let dimensions = if self.is_image()? {
            Loader::new().probe_dimensions(&self.path)
        } else {
            None
        };
        let _ = self.dimensions.set(dimensions);
        Ok(dimensions)
    }

    pub fn width(&self) -> Result<Option<u32>> {
        Ok(self.dimensions()?.map(|d| d.width))
    }

    pub fn height(&self) -> Result<Option<u32>> {
        Ok(self.dimensions()?.map(|d| d.height))
    }

    pub fn exif(&self) -> Result<ExifData> {
        self.ensure_live()?;
        if let Some(exif) = self.exif.get() {
            return Ok(exif.clone());
        }

        let exif = match self.mime_type()?.as_str() {
            "image/jpeg" | "image/pjpeg" | "image/tiff" => {
                MetadataProcessor::new().read_fields(&self.path)?
            }
            _ => ExifData::default(),
        };
        let _ = self.exif.set(exif.clone());
        Ok(exif)
    }

    pub fn is_application(&self) -> Result<bool> {
        self.is_category("application")
    }

    pub fn is_audio(&self) -> Result<bool> {
        self.is_category("audio")
    }

    pub fn is_image(&self) -> Result<bool> {
        self.is_category("image")
    }

    pub fn is_text(&self) -> Result<bool> {
        self.is_category("text")
    }

    pub fn is_video(&self) -> Result<bool> {
        self.is_category("video")
    }

    /// Membership in a named subtype such as `archive` or `spreadsheet`.
    pub fn is_subtype(&self, subtype: &str) -> Result<bool> {
        Ok(mime::subtype(subtype)?.contains(&self.mime_type()?.as_str()))
    }

    fn is_category(&self, category: &str) -> Result<bool> {
        Ok(mime::top_level(&self.mime_type()?) == category)
    }

    /// Moves the file into `dir`. Moving into the directory it already lives in
    /// does nothing. Without `overwrite` an existing `name.ext` pushes the file
    /// to `name-1.ext`, `name-2.ext` and so on.
    pub fn move_to(&mut self, dir: impl AsRef<Path>, overwrite: bool) -> Result<()> {
        self.ensure_live()?;
        let dir = dir.as_ref();
        if self.lives_in(dir) {
            return Ok(());
        }

        fs::create_dir_all(dir)?;
        let target = find_destination(dir, &self.name(), &self.ext(), overwrite);

        fs::rename(&self.path, &target).map_err(|e| {
            ShuttleError::Io(format!(
                "Failed to move {} to {}: {}",
                self.path.display(),
                target.display(),
                e
            ))
        })?;

        log::debug!("Moved {} to {}", self.path.display(), target.display());
        self.reset();
        self.path = absolute(&target)?;
        Ok(())
    }

    fn lives_in(&self, dir: &Path) -> bool {
        match (fs::canonicalize(dir), fs::canonicalize(self.dir())) {
            (Ok(target), Ok(current)) => target == current,
            _ => false,
        }
    }

    /// Renames the file in place. The final name is `prepend + name + append`
    /// with every character other than letters, digits, `_` and `-` replaced
    /// by `-`. An empty `name` keeps the current one. Existing files at the
    /// target path are overwritten.
    pub fn rename(&mut self, name: &str, append: &str, prepend: &str) -> Result<()> {
        self.rename_with(
            |current| {
                if name.is_empty() {
                    current.to_string()
                } else {
                    name.to_string()
                }
            },
            append,
            prepend,
        )
    }

    pub fn rename_with<F>(&mut self, name: F, append: &str, prepend: &str) -> Result<()>
    where
        F: FnOnce(&str) -> String,
    {
        self.ensure_live()?;
        let base = name(&self.name());
        let sanitized = sanitize_name(&format!("{}{}{}", prepend, base, append));
        let ext = self.ext();
        let file_name = if ext.is_empty() {
            sanitized
        } else {
            format!("{}.{}", sanitized, ext)
        };

        let target = self.dir().join(file_name);
        if target == self.path {
            return Ok(());
        }

        fs::rename(&self.path, &target).map_err(|e| {
            ShuttleError::Io(format!(
                "Failed to rename {} to {}: {}",
                self.path.display(),
                target.display(),
                e
            ))
        })?;

        self.reset();
        self.path = target;
        Ok(())
    }

    /// Drops every cached fact.
    pub fn reset(&mut self) {
        self.dimensions = OnceCell::new();
        self.mime_type = OnceCell::new();
        self.exif = OnceCell::new();
    }

    /// Unlinks the file. Returns `false` instead of failing when the file is
    /// already gone.
    pub fn delete(&mut self) -> bool {
        if self.deleted {
            return false;
        }

        self.reset();
        self.deleted = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::debug!("Deleted {}", self.path.display());
                true
            }
            Err(e) => {
                log::warn!("Could not delete {}: {}", self.path.display(), e);
                false
            }
        }
    }

    pub fn to_info(&self) -> Result<FileInfo> {
        let dimensions = self.dimensions()?;
        Ok(FileInfo {
            basename: self.basename(),
            dir: self.dir(),
            ext: self.ext(),
            name: self.name(),
            path: self.path.clone(),
            size: self.size()?,
            mime_type: self.mime_type()?,
            width: dimensions.map(|d| d.width),
            height: dimensions.map(|d| d.height),
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_jpeg(path: &Path, width: u32, height: u32) {
        image::RgbImage::from_pixel(width, height, image::Rgb([120, 60, 30]))
            .save_with_format(path, image::ImageFormat::Jpeg)
            .unwrap();
    }

    #[test]
    fn open_missing_file_fails() {
        let err = FileHandle::open("/definitely/not/here.jpg").unwrap_err();
        assert!(matches!(err, ShuttleError::Io(_)));
        assert!(err.message().ends_with("does not exist"));
    }

    #[test]
    fn path_parts() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Holiday.JPG");
        write_jpeg(&path, 10, 20);

        let file = FileHandle::open(&path).unwrap();
        assert_eq!(file.basename(), "Holiday.JPG");
        assert_eq!(file.name(), "Holiday");
        assert_eq!(file.ext(), "jpg");
        assert_eq!(file.dir(), tmp.path());
        assert_eq!(file.mime_type().unwrap(), "image/jpeg");
        assert_eq!(file.dimensions().unwrap(), Some(Dimensions::new(10, 20)));
        assert!(file.is_image().unwrap());
        assert!(!file.is_video().unwrap());
    }

    #[test]
    fn non_images_have_no_dimensions_or_exif() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("readme.txt");
        fs::write(&path, "hello").unwrap();

        let file = FileHandle::open(&path).unwrap();
        assert_eq!(file.dimensions().unwrap(), None);
        assert_eq!(file.width().unwrap(), None);
        assert!(file.exif().unwrap().is_empty());
        assert!(file.is_text().unwrap());
    }

    #[test]
    fn jpeg_without_exif_yields_empty_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.jpg");
        write_jpeg(&path, 8, 8);

        let exif = FileHandle::open(&path).unwrap().exif().unwrap();
        assert!(exif.is_empty());
        assert_eq!(exif.orientation_value(), None);
    }

    #[test]
    fn move_to_same_directory_is_noop() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("same.jpg");
        write_jpeg(&path, 4, 4);

        let mut file = FileHandle::open(&path).unwrap();
        file.move_to(tmp.path(), false).unwrap();
        assert_eq!(file.path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn move_avoids_collisions() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target");
        fs::create_dir_all(&target).unwrap();
        for name in ["x.jpg", "x-1.jpg", "x-2.jpg"] {
            fs::write(target.join(name), "taken").unwrap();
        }

        let source = tmp.path().join("x.jpg");
        write_jpeg(&source, 4, 4);

        let mut file = FileHandle::open(&source).unwrap();
        file.move_to(&target, false).unwrap();
        assert_eq!(file.basename(), "x-3.jpg");
        assert!(!source.exists());
    }

    #[test]
    fn move_with_overwrite_replaces() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("x.jpg"), "taken").unwrap();

        let source = tmp.path().join("x.jpg");
        write_jpeg(&source, 4, 4);

        let mut file = FileHandle::open(&source).unwrap();
        file.move_to(&target, true).unwrap();
        assert_eq!(file.basename(), "x.jpg");
        assert_eq!(file.dimensions().unwrap(), Some(Dimensions::new(4, 4)));
    }

    #[test]
    fn move_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("deep.jpg");
        write_jpeg(&source, 4, 4);

        let mut file = FileHandle::open(&source).unwrap();
        file.move_to(tmp.path().join("a/b/c"), false).unwrap();
        assert!(tmp.path().join("a/b/c/deep.jpg").exists());
    }

    #[test]
    fn rename_sanitizes_and_wraps() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg");
        write_jpeg(&path, 4, 4);

        let mut file = FileHandle::open(&path).unwrap();
        file.rename("my photo!", "-large", "2024_").unwrap();
        assert_eq!(file.basename(), "2024_my-photo--large.jpg");

        file.rename_with(|current| current.to_uppercase(), "", "").unwrap();
        assert_eq!(file.basename(), "2024_MY-PHOTO--LARGE.jpg");

        file.rename("Ünïcödé", "", "").unwrap();
        assert_eq!(file.basename(), "Ünïcödé.jpg");
    }

    #[test]
    fn cache_is_cleared_by_rename_and_move() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pic.png");
        let write_png = |path: &Path, w: u32, h: u32| {
            image::RgbImage::new(w, h)
                .save_with_format(path, image::ImageFormat::Png)
                .unwrap();
        };
        write_png(&path, 6, 3);

        let mut file = FileHandle::open(&path).unwrap();
        assert_eq!(file.dimensions().unwrap(), Some(Dimensions::new(6, 3)));

        // Cached until the path changes.
        write_png(&path, 9, 2);
        assert_eq!(file.dimensions().unwrap(), Some(Dimensions::new(6, 3)));

        file.move_to(tmp.path().join("moved"), false).unwrap();
        assert_eq!(file.dimensions().unwrap(), Some(Dimensions::new(9, 2)));

        write_png(file.path(), 2, 7);
        file.rename("renamed", "", "").unwrap();
        assert_eq!(file.dimensions().unwrap(), Some(Dimensions::new(2, 7)));
        assert_eq!(file.size().unwrap(), fs::metadata(file.path()).unwrap().len());

        // Bytes that turn into an image show up as one only after a move.
        let blob = tmp.path().join("blob");
        fs::write(&blob, "plain words").unwrap();
        let mut file = FileHandle::open(&blob).unwrap();
        let before = file.mime_type().unwrap();
        assert_ne!(before, "image/png");

        image::RgbImage::new(2, 2)
            .save_with_format(&blob, image::ImageFormat::Png)
            .unwrap();
        assert_eq!(file.mime_type().unwrap(), before);

        file.move_to(tmp.path().join("other"), false).unwrap();
        assert_eq!(file.mime_type().unwrap(), "image/png");
        assert_eq!(file.dimensions().unwrap(), Some(Dimensions::new(2, 2)));
        assert_eq!(file.size().unwrap(), fs::metadata(file.path()).unwrap().len());
        assert_ne!(file.size().unwrap(), 11);
    }

    #[test]
    fn delete_is_terminal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gone.jpg");
        write_jpeg(&path, 4, 4);

        let mut file = FileHandle::open(&path).unwrap();
        assert!(file.delete());
        assert!(!path.exists());
        assert!(!file.delete());
        assert!(matches!(file.size(), Err(ShuttleError::Io(_))));
        assert!(matches!(file.mime_type(), Err(ShuttleError::Io(_))));
    }

    #[test]
    fn upload_without_extension_gets_one() {
        let tmp = TempDir::new().unwrap();
        let tmp_name = tmp.path().join("upload-A1b2C3");
        write_jpeg(&tmp_name, 5, 5);

        let upload = UploadedFile::new(&tmp_name, "camera", 100);
        let file = FileHandle::from_upload(&upload).unwrap();
        assert_eq!(file.ext(), "jpg");
        assert!(file.path().exists());
        assert!(!tmp_name.exists());
    }
}
