// shuttle/src/processors/batch.rs
use crate::config::PipelineConfig;
use crate::core::{Result, ShuttleError};
use crate::transport::Transporter;
use crate::utils::{is_supported_format, unique_suffix};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Totals for a directory run.
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub processed_count: usize,
    pub derivative_count: usize,
    pub locators: Vec<String>,
    /// `(file, message)` for every file whose pipeline failed.
    pub errors: Vec<(String, String)>,
}

/// Feeds every file of a directory through its own pipeline in parallel.
pub struct BatchProcessor {
    config: PipelineConfig,
    thread_pool: Option<rayon::ThreadPool>,
    progress: bool,
}

struct FileOutcome {
    derivatives: usize,
    locators: Vec<String>,
}

impl BatchProcessor {
    /// `max_threads` of 0 uses rayon's global pool.
    pub fn new(config: PipelineConfig, max_threads: usize) -> Result<Self> {
        let thread_pool = if max_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(max_threads)
                .build()
                .map_err(|e| {
                    ShuttleError::RuntimeUnavailable(format!("Failed to create thread pool: {}", e))
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            config,
            thread_pool,
            progress: true,
        })
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn process_directory(&self, input_dir: &Path, recursive: bool) -> Result<BatchStats> {
        self.validate_paths(input_dir)?;

        let paths = self.collect_paths(input_dir, recursive);
        if paths.is_empty() {
            log::warn!("No files found in {}", input_dir.display());
            return Ok(BatchStats::default());
        }

        log::info!("Processing {} files from {}", paths.len(), input_dir.display());

        let transporter = self.config.transporter()?;
        let pb = self.create_progress_bar(paths.len());
        let run = || -> Vec<(PathBuf, Result<FileOutcome>)> {
            paths
                .par_iter()
                .progress_with(pb.clone())
                .map(|path| (path.clone(), self.process_file(path, transporter.clone())))
                .collect()
        };
        let results = match &self.thread_pool {
            Some(pool) => pool.install(run),
            None => run(),
        };

        let mut stats = BatchStats::default();
        for (path, result) in results {
            match result {
                Ok(outcome) => {
                    stats.processed_count += 1;
                    stats.derivative_count += outcome.derivatives;
                    stats.locators.extend(outcome.locators);
                }
                Err(e) => {
                    log::warn!("{} failed: {}", path.display(), e);
                    stats.errors.push((path.display().to_string(), e.to_string()));
                }
            }
        }

        pb.finish_with_message(format!(
            "Processed {} files, {} derivatives, {} failed",
            stats.processed_count,
            stats.derivative_count,
            stats.errors.len()
        ));

        Ok(stats)
    }

    /// Each file gets its own subdirectory of the working directory, so
    /// pipelines never pick names or roll back files of one another.
    fn process_file(
        &self,
        path: &Path,
        transporter: Option<Arc<dyn Transporter>>,
    ) -> Result<FileOutcome> {
        let directory = self.config.directory.join(unique_suffix());
        let outcome = self.run_pipeline(path, &directory, transporter);
        // Only succeeds once everything inside was transported or rolled back.
        if std::fs::remove_dir(&directory).is_ok() {
            log::debug!("Removed empty {}", directory.display());
        }
        outcome
    }

    fn run_pipeline(
        &self,
        path: &Path,
        directory: &Path,
        transporter: Option<Arc<dyn Transporter>>,
    ) -> Result<FileOutcome> {
        let has_transport = transporter.is_some();
        let mut pipeline = self.config.build_pipeline_in(directory, transporter)?;

        pipeline.import_from_local(path, self.config.overwrite, false)?;
        if self.config.has_transforms() {
            pipeline.transform()?;
        }
        if has_transport {
            pipeline.transport(&self.config.transport_options()?)?;
        }

        let result = pipeline.into_result();
        Ok(FileOutcome {
            derivatives: result.derivatives.len(),
            locators: result.locators,
        })
    }

    /// Images only when transforms are configured, everything otherwise.
    fn collect_paths(&self, input_dir: &Path, recursive: bool) -> Vec<PathBuf> {
        let walker = if recursive {
            WalkDir::new(input_dir)
        } else {
            WalkDir::new(input_dir).max_depth(1)
        };
        let images_only = self.config.has_transforms();
        let work_dir = std::fs::canonicalize(&self.config.directory).ok();

        let mut paths: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| !images_only || is_supported_format(entry.path()))
            .filter(|entry| match (&work_dir, entry.path().parent()) {
                (Some(work), Some(parent)) => std::fs::canonicalize(parent)
                    .map(|p| !p.starts_with(work))
                    .unwrap_or(true),
                _ => true,
            })
            .map(|entry| entry.into_path())
            .collect();
        paths.sort();
        paths
    }

    fn create_progress_bar(&self, total: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    pub fn validate_paths(&self, input_dir: &Path) -> Result<()> {
        if !input_dir.exists() {
            return Err(ShuttleError::Io(format!(
                "Input directory does not exist: {}",
                input_dir.display()
            )));
        }

        if !input_dir.is_dir() {
            return Err(ShuttleError::Io(format!(
                "Input path is not a directory: {}",
                input_dir.display()
            )));
        }

        let directory = &self.config.directory;
        if directory.exists() && !directory.is_dir() {
            return Err(ShuttleError::Config(format!(
                "Working path exists but is not a directory: {}",
                directory.display()
            )));
        }

        if let (Ok(input), Ok(work)) = (std::fs::canonicalize(input_dir), std::fs::canonicalize(directory)) {
            if input == work {
                return Err(ShuttleError::Config(
                    "Input and working directories cannot be the same".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TransformEntry, TransportEntry};
    use tempfile::TempDir;

    fn write_jpeg(dir: &Path, name: &str, width: u32, height: u32) {
        image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]))
            .save(dir.join(name))
            .unwrap();
    }

    fn files_under(dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    }

    fn config(work: &Path) -> PipelineConfig {
        PipelineConfig {
            directory: work.to_path_buf(),
            transforms: vec![TransformEntry {
                kind: "scale".to_string(),
                percent: Some(0.5),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn runs_one_pipeline_per_image() {
        let input = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_jpeg(input.path(), "a.jpg", 40, 20);
        write_jpeg(input.path(), "b.jpg", 10, 10);
        std::fs::write(input.path().join("notes.txt"), "skip me").unwrap();

        let stats = BatchProcessor::new(config(work.path()), 2)
            .unwrap()
            .with_progress(false)
            .process_directory(input.path(), false)
            .unwrap();

        assert_eq!(stats.processed_count, 2);
        assert_eq!(stats.derivative_count, 2);
        assert!(stats.errors.is_empty());
        assert_eq!(files_under(work.path()).len(), 4);
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 2);
    }

    #[test]
    fn same_names_in_different_folders_stay_apart() {
        let input = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        for folder in ["a", "b", "c"] {
            std::fs::create_dir(input.path().join(folder)).unwrap();
            write_jpeg(&input.path().join(folder), "photo.jpg", 8, 8);
        }

        let stats = BatchProcessor::new(config(work.path()), 3)
            .unwrap()
            .with_progress(false)
            .process_directory(input.path(), true)
            .unwrap();

        assert_eq!(stats.processed_count, 3);
        let originals: Vec<PathBuf> = files_under(work.path())
            .into_iter()
            .filter(|p| p.file_name().is_some_and(|n| n == "photo.jpg"))
            .collect();
        assert_eq!(originals.len(), 3);
    }

    #[test]
    fn failures_are_collected_per_file() {
        let input = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_jpeg(input.path(), "good.jpg", 40, 20);
        std::fs::write(input.path().join("broken.jpg"), "not really a jpeg").unwrap();

        let stats = BatchProcessor::new(config(work.path()), 0)
            .unwrap()
            .with_progress(false)
            .process_directory(input.path(), false)
            .unwrap();

        assert_eq!(stats.processed_count, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].0.ends_with("broken.jpg"));
    }

    #[test]
    fn recursive_walk_and_local_transport() {
        let input = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        std::fs::create_dir(input.path().join("nested")).unwrap();
        write_jpeg(input.path(), "top.jpg", 8, 8);
        write_jpeg(&input.path().join("nested"), "deep.jpg", 8, 8);

        let mut config = config(work.path());
        config.transport = Some(TransportEntry {
            backend: "local".to_string(),
            directory: Some(store.path().to_path_buf()),
            ..Default::default()
        });

        let processor = BatchProcessor::new(config, 1).unwrap().with_progress(false);
        let shallow = processor.process_directory(input.path(), false).unwrap();
        assert_eq!(shallow.processed_count, 1);

        let deep = processor.process_directory(input.path(), true).unwrap();
        assert_eq!(deep.processed_count, 2);
        assert_eq!(deep.locators.len(), 4);
        assert!(deep.locators.iter().all(|l| Path::new(l).exists()));
    }

    #[test]
    fn rejects_missing_or_shared_directories() {
        let work = TempDir::new().unwrap();
        let processor = BatchProcessor::new(config(work.path()), 0).unwrap();
        assert!(processor.validate_paths(&work.path().join("missing")).is_err());
        assert!(processor.validate_paths(work.path()).is_err());
    }
}
