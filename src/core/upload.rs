// shuttle/src/core/upload.rs
use std::path::PathBuf;

/// Transport-level status reported by the platform that received an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadError {
    #[default]
    Ok,
    IniSize,
    FormSize,
    Partial,
    NoFile,
    NoTmpDir,
    CantWrite,
    Extension,
}

impl UploadError {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::IniSize,
            2 => Self::FormSize,
            3 => Self::Partial,
            4 => Self::NoFile,
            6 => Self::NoTmpDir,
            7 => Self::CantWrite,
            _ => Self::Extension,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Ok => "File uploaded successfully",
            Self::IniSize | Self::FormSize => "File exceeds the maximum file size",
            Self::Partial => "File was only partially uploaded",
            Self::NoFile => "No file was found for upload",
            Self::NoTmpDir | Self::CantWrite | Self::Extension => "File failed to upload",
        }
    }
}

/// Upload metadata handed over by the web layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub tmp_name: PathBuf,
    pub name: String,
    pub error: UploadError,
    pub size: u64,
    pub mime_type: Option<String>,
}

impl UploadedFile {
    pub fn new(tmp_name: impl Into<PathBuf>, name: impl Into<String>, size: u64) -> Self {
        Self {
            tmp_name: tmp_name.into(),
            name: name.into(),
            error: UploadError::Ok,
            size,
            mime_type: None,
        }
    }

    pub fn with_error(mut self, error: UploadError) -> Self {
        self.error = error;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}
