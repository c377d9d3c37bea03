// shuttle/src/core/pipeline.rs
use super::{FileHandle, Result, ShuttleError, UploadedFile};
use crate::fetch::RemoteFetcher;
use crate::processors::RasterBackend;
use crate::transform::{TransformEngine, TransformSpec};
use crate::transport::{TransportOptions, Transporter};
use crate::utils::{find_destination, split_file_name, unique_suffix};
use crate::validation::Validator;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Empty,
    Acquired,
    Validated,
    Transformed,
    Transported,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub original: Option<FileHandle>,
    pub derivatives: Vec<FileHandle>,
    pub locators: Vec<String>,
}

/// Takes one file from acquisition through validation, transformation and
/// transport. Any failing phase unwinds everything the run produced.
pub struct Pipeline {
    directory: PathBuf,
    engine: TransformEngine,
    validator: Option<Validator>,
    transporter: Option<Box<dyn Transporter>>,
    fetcher: Option<Box<dyn RemoteFetcher>>,
    self_transforms: Vec<TransformSpec>,
    transforms: Vec<TransformSpec>,
    original: Option<FileHandle>,
    derivatives: Vec<FileHandle>,
    locators: Vec<String>,
    state: PipelineState,
}

impl Pipeline {
    /// Files are acquired into `directory`, which is created on first use.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            engine: TransformEngine::default(),
            validator: None,
            transporter: None,
            fetcher: None,
            self_transforms: Vec::new(),
            transforms: Vec::new(),
            original: None,
            derivatives: Vec::new(),
            locators: Vec::new(),
            state: PipelineState::Empty,
        }
    }

    pub fn with_backend(mut self, backend: Box<dyn RasterBackend>) -> Self {
        self.engine = TransformEngine::new(backend);
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_transporter(mut self, transporter: Box<dyn Transporter>) -> Self {
        self.transporter = Some(transporter);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn RemoteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Registers a transform that replaces the original. Self transforms run
    /// in registration order, each on the output of the previous one.
    pub fn add_self_transform(&mut self, spec: impl Into<TransformSpec>) -> Result<&mut Self> {
        let spec = spec.into();
        spec.transform.validate()?;
        self.self_transforms.push(spec);
        Ok(self)
    }

    /// Registers a transform that derives a new file from the original.
    /// Orientation is rejected here since it only ever rewrites the original.
    pub fn add_transform(&mut self, spec: impl Into<TransformSpec>) -> Result<&mut Self> {
        let spec = spec.into();
        spec.transform.validate_branch()?;
        self.transforms.push(spec);
        Ok(self)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn original(&self) -> Option<&FileHandle> {
        self.original.as_ref()
    }

    pub fn derivatives(&self) -> &[FileHandle] {
        &self.derivatives
    }

    pub fn locators(&self) -> &[String] {
        &self.locators
    }

    /// Original first, then derivatives in the order they were made.
    pub fn files(&self) -> Vec<&FileHandle> {
        self.original.iter().chain(self.derivatives.iter()).collect()
    }

    pub fn into_result(self) -> PipelineResult {
        PipelineResult {
            original: self.original,
            derivatives: self.derivatives,
            locators: self.locators,
        }
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    /// Moves an uploaded temp file into the working directory under its
    /// declared name. Transport-level upload errors and rule failures are both
    /// reported as [`ShuttleError::Validation`]; rules run against the temp
    /// file before it is moved.
    pub fn upload(&mut self, upload: &UploadedFile, overwrite: bool) -> Result<&FileHandle> {
        self.release();
        if upload.tmp_name.as_os_str().is_empty() {
            return Err(ShuttleError::Validation(
                "Invalid file detected for upload".to_string(),
            ));
        }
        if !upload.error.is_ok() {
            return Err(ShuttleError::Validation(upload.error.message().to_string()));
        }
        if !upload.tmp_name.is_file() {
            return Err(ShuttleError::Validation("File failed to upload".to_string()));
        }

        let temp = FileHandle::from_upload(upload)?;
        if let Some(validator) = &self.validator {
            validator.validate(Some(&temp))?;
        }

        let declared = Path::new(&upload.name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let (mut name, mut ext) = split_file_name(declared);
        if name.is_empty() {
            name = temp.name();
        }
        if ext.is_empty() {
            ext = temp.ext();
        }

        fs::create_dir_all(&self.directory)?;
        let target = find_destination(&self.directory, &name, &ext, overwrite);
        if !move_or_copy(temp.path(), &target) {
            return Err(ShuttleError::Validation(
                "An unknown error has occurred".to_string(),
            ));
        }

        log::info!("Uploaded {} to {}", upload.name, target.display());
        let origin = temp.origin().cloned();
        let file = match origin {
            Some(origin) => FileHandle::with_origin(&target, origin)?,
            None => FileHandle::open(&target)?,
        };
        self.state = if self.validator.is_some() {
            PipelineState::Validated
        } else {
            PipelineState::Acquired
        };
        Ok(&*self.original.insert(file))
    }

    /// Copies a file already on this machine into the working directory,
    /// optionally removing the source once the copy has passed validation.
    pub fn import_from_local(
        &mut self,
        path: impl AsRef<Path>,
        overwrite: bool,
        delete_source: bool,
    ) -> Result<&FileHandle> {
        let mut source = FileHandle::open(path)?;
        self.release();
        fs::create_dir_all(&self.directory)?;
        let target = find_destination(&self.directory, &source.name(), &source.ext(), overwrite);

        let copied = !same_file(source.path(), &target);
        if copied {
            fs::copy(source.path(), &target).map_err(|e| {
                ShuttleError::Io(format!(
                    "Failed to copy {} to new location: {}",
                    source.basename(),
                    e
                ))
            })?;
        }

        log::info!("Imported {} to {}", source.basename(), target.display());
        self.acquire(&target, &source.basename(), copied)?;
        if copied && delete_source {
            source.delete();
        }
        self.current()
    }

    /// Downloads `url` into the working directory. The file is named after the
    /// last URL path segment, or a random name when there is none.
    pub fn import_from_remote(&mut self, url: &str, overwrite: bool) -> Result<&FileHandle> {
        self.release();
        let fetcher = self.fetcher.as_deref().ok_or_else(|| {
            ShuttleError::RuntimeUnavailable(
                "An HTTP client is required for remote file importing".to_string(),
            )
        })?;

        let name = Url::parse(url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|segment| !segment.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let (stem, ext) = split_file_name(&name);

        fs::create_dir_all(&self.directory)?;
        let target = find_destination(&self.directory, &stem, &ext, overwrite);

        let fetched = File::create(&target)
            .map_err(ShuttleError::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                let bytes = fetcher.fetch(url, &mut writer)?;
                writer.flush()?;
                Ok(bytes)
            });

        match fetched {
            Ok(bytes) if bytes > 0 => {
                log::info!("Imported {} bytes from {}", bytes, url);
                self.acquire(&target, &name, true)
            }
            Ok(_) => {
                discard(&target);
                Err(ShuttleError::Io(format!(
                    "Failed to import {} from remote location: empty response",
                    name
                )))
            }
            Err(e) => {
                discard(&target);
                Err(ShuttleError::Io(format!(
                    "Failed to import {} from remote location: {}",
                    name,
                    e.message()
                )))
            }
        }
    }

    /// Writes everything `reader` yields into the working directory as `name`.
    pub fn import_from_stream(
        &mut self,
        reader: &mut dyn Read,
        name: &str,
        overwrite: bool,
    ) -> Result<&FileHandle> {
        self.release();
        let (stem, ext) = split_file_name(name);
        let stem = if stem.is_empty() { unique_suffix() } else { stem };

        fs::create_dir_all(&self.directory)?;
        let target = find_destination(&self.directory, &stem, &ext, overwrite);

        let mut writer = BufWriter::new(File::create(&target)?);
        let copied = io::copy(reader, &mut writer).and_then(|bytes| {
            writer.flush()?;
            Ok(bytes)
        });
        drop(writer);

        match copied {
            Ok(0) => {
                discard(&target);
                Err(ShuttleError::Io("No file detected in input stream".to_string()))
            }
            Ok(bytes) => {
                log::info!("Imported {} bytes from stream to {}", bytes, target.display());
                self.acquire(&target, name, true)
            }
            Err(e) => {
                discard(&target);
                Err(e.into())
            }
        }
    }

    /// Wraps a freshly copied file and runs the bound rules on it. A file
    /// that fails them is removed again when `discard_on_failure` is set.
    fn acquire(
        &mut self,
        target: &Path,
        declared: &str,
        discard_on_failure: bool,
    ) -> Result<&FileHandle> {
        let size = fs::metadata(target)?.len();
        let mut file = FileHandle::from_upload(&UploadedFile::new(target, declared, size))?;

        if let Some(validator) = &self.validator {
            if let Err(e) = validator.validate(Some(&file)) {
                if discard_on_failure {
                    file.delete();
                }
                return Err(e);
            }
            self.state = PipelineState::Validated;
        } else {
            self.state = PipelineState::Acquired;
        }

        Ok(&*self.original.insert(file))
    }

    fn current(&self) -> Result<&FileHandle> {
        self.original
            .as_ref()
            .ok_or_else(|| ShuttleError::Io("No original file detected".to_string()))
    }

    /// Lets go of the files of an earlier run before a new acquisition.
    /// Transported files belong to their destination and are only forgotten.
    fn release(&mut self) {
        if self.state == PipelineState::Transported {
            self.original = None;
            self.derivatives.clear();
            self.locators.clear();
            self.state = PipelineState::Empty;
        } else {
            self.rollback();
        }
    }

    // =========================================================================
    // Transformation
    // =========================================================================

    /// Runs self transforms on the original, then every branch transform on
    /// the result. On the first failure everything produced so far, original
    /// included, is deleted and the pipeline is back to empty.
    ///
    /// Calling it again replaces the derivatives of the previous call; self
    /// transforms are not applied a second time.
    pub fn transform(&mut self) -> Result<()> {
        if self.original.is_none() {
            return Err(ShuttleError::Io("No original file detected".to_string()));
        }
        if self.state == PipelineState::Transported {
            return Err(ShuttleError::Config(
                "Files have already been transported".to_string(),
            ));
        }

        let apply_self = self.state != PipelineState::Transformed;
        for mut derivative in self.derivatives.drain(..) {
            if !derivative.is_deleted() {
                derivative.delete();
            }
        }

        match self.run_transforms(apply_self) {
            Ok(()) => {
                self.state = PipelineState::Transformed;
                log::info!(
                    "Transformed original with {} self and {} branch transforms",
                    self.self_transforms.len(),
                    self.transforms.len()
                );
                Ok(())
            }
            Err(e) => {
                log::warn!("Transform failed, rolling back: {}", e);
                self.rollback();
                Err(ShuttleError::Transformation(e.message().to_string()))
            }
        }
    }

    fn run_transforms(&mut self, apply_self: bool) -> Result<()> {
        let Some(original) = self.original.as_mut() else {
            return Ok(());
        };

        if apply_self {
            for spec in &self.self_transforms {
                self.engine.apply(original, spec, true)?;
                original.reset();
            }
        }

        for spec in &self.transforms {
            let derivative = self.engine.apply(original, spec, false)?;
            log::debug!("Derived {}", derivative.basename());
            self.derivatives.push(derivative);
        }
        Ok(())
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Sends the original and then every derivative. When a send fails, the
    /// copies already sent are deleted remotely, local files are rolled back
    /// and the failure is returned.
    pub fn transport(&mut self, options: &TransportOptions) -> Result<Vec<String>> {
        if self.transporter.is_none() {
            return Err(ShuttleError::Config("No transporter has been defined".to_string()));
        }
        if self.original.is_none() && self.derivatives.is_empty() {
            return Err(ShuttleError::Io("No files to transport".to_string()));
        }

        let (sent, failure) = self.send_all(options);

        if let Some(e) = failure {
            log::warn!("Transport failed after {} files, rolling back: {}", sent.len(), e);
            if let Some(transporter) = self.transporter.as_deref() {
                for locator in &sent {
                    if !transporter.delete(locator) {
                        log::warn!("Could not delete remote copy {}", locator);
                    }
                }
            }
            self.rollback();
            return Err(ShuttleError::Transportation(e.message().to_string()));
        }

        log::info!("Transported {} files", sent.len());
        self.locators = sent.clone();
        self.state = PipelineState::Transported;
        Ok(sent)
    }

    fn send_all(&mut self, options: &TransportOptions) -> (Vec<String>, Option<ShuttleError>) {
        let mut sent = Vec::new();
        let Some(transporter) = self.transporter.as_deref() else {
            return (sent, None);
        };

        let files = self.original.iter_mut().chain(self.derivatives.iter_mut());
        for (index, file) in files.enumerate() {
            match transporter.transport(file, &options.for_file(index)) {
                Ok(locator) => {
                    log::debug!("Sent {} as {}", file.basename(), locator);
                    sent.push(locator);
                }
                Err(e) => return (sent, Some(e)),
            }
        }
        (sent, None)
    }

    /// Deletes the original and every derivative and empties the pipeline.
    /// Safe to call any number of times.
    pub fn rollback(&mut self) {
        if let Some(mut original) = self.original.take() {
            if !original.is_deleted() {
                original.delete();
            }
        }
        for mut derivative in self.derivatives.drain(..) {
            if !derivative.is_deleted() {
                derivative.delete();
            }
        }
        self.locators.clear();
        self.state = PipelineState::Empty;
    }
}

fn move_or_copy(from: &Path, to: &Path) -> bool {
    if fs::rename(from, to).is_ok() {
        return true;
    }
    match fs::copy(from, to) {
        Ok(_) => {
            discard(from);
            true
        }
        Err(e) => {
            log::warn!("Could not move {} to {}: {}", from.display(), to.display(), e);
            false
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("Could not remove {}: {}", path.display(), e);
    }
}
