// shuttle/src/main.rs
use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use shuttle::cli::{Cli, Commands};
use shuttle::fetch::HttpFetcher;
use shuttle::utils::format_file_size;
use shuttle::{BatchProcessor, FileHandle, PipelineConfig};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    match cli.command {
        Commands::Run {
            config,
            source,
            delete_source,
        } => process_run(config, source, delete_source)?,
        Commands::Batch {
            config,
            input,
            threads,
            recursive,
        } => process_batch(config, input, threads, recursive)?,
        Commands::Info { input } => process_info(input)?,
    }

    Ok(())
}

fn process_run(config: PathBuf, source: String, delete_source: bool) -> anyhow::Result<()> {
    let config = PipelineConfig::load(&config)
        .with_context(|| format!("Loading {}", config.display()))?;
    let transporter = config.transporter()?;
    let has_transport = transporter.is_some();
    let mut pipeline = config.build_pipeline(transporter)?;

    if Cli::is_remote(&source) {
        pipeline = pipeline.with_fetcher(Box::new(HttpFetcher::new()?));
        pipeline.import_from_remote(&source, config.overwrite)?;
    } else {
        pipeline.import_from_local(&source, config.overwrite, delete_source)?;
    }

    if config.has_transforms() {
        pipeline.transform()?;
    }

    if has_transport {
        for locator in pipeline.transport(&config.transport_options()?)? {
            println!("{}", locator);
        }
    } else {
        for file in pipeline.files() {
            println!("{}", file.path().display());
        }
    }

    Ok(())
}

fn process_batch(
    config: PathBuf,
    input: PathBuf,
    threads: usize,
    recursive: bool,
) -> anyhow::Result<()> {
    let config = PipelineConfig::load(&config)
        .with_context(|| format!("Loading {}", config.display()))?;
    let processor = BatchProcessor::new(config, threads)?;
    let stats = processor.process_directory(&input, recursive)?;

    println!(
        "Batch complete. Processed {} files into {} derivatives, {} failed",
        stats.processed_count,
        stats.derivative_count,
        stats.errors.len()
    );
    for (file, error) in &stats.errors {
        println!("  {}: {}", file, error);
    }
    for locator in &stats.locators {
        println!("{}", locator);
    }

    if !stats.errors.is_empty() {
        anyhow::bail!("{} files failed", stats.errors.len());
    }
    Ok(())
}

fn process_info(input: PathBuf) -> anyhow::Result<()> {
    let file = FileHandle::open(&input)?;
    let info = file.to_info()?;

    println!("=== File Information ===");
    println!("File: {}", info.path.display());
    println!("Size: {}", format_file_size(info.size));
    println!("Type: {}", info.mime_type);
    if let (Some(width), Some(height)) = (info.width, info.height) {
        let aspect_ratio = width as f32 / height.max(1) as f32;
        println!("Dimensions: {} x {} pixels", width, height);
        println!("Aspect Ratio: {:.2}:1", aspect_ratio);
    }

    let exif = file.exif()?;
    println!("Has EXIF metadata: {}", !exif.is_empty());
    if !exif.is_empty() {
        println!("\n=== EXIF Metadata ===");
        for (name, value) in exif.fields() {
            if !value.is_empty() {
                println!("{}: {}", name, value);
            }
        }
    }

    Ok(())
}
