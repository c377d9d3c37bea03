// shuttle/src/cli.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shuttle", version, about = "Validate, transform and ship files to storage")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one file or URL through a pipeline
    Run {
        /// Pipeline description (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Local path or http(s) URL
        source: String,

        /// Remove a local source once it has been imported
        #[arg(long)]
        delete_source: bool,
    },

    /// Run every file of a directory through its own pipeline
    Batch {
        /// Pipeline description (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Input directory
        input: PathBuf,

        /// Number of worker threads (0 = one per core)
        #[arg(short, long, default_value_t = 0)]
        threads: usize,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Print what is known about a file
    Info {
        input: PathBuf,
    },
}

impl Cli {
    pub fn is_remote(source: &str) -> bool {
        let lower = source.to_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_batch_flags() {
        let cli = Cli::parse_from([
            "shuttle", "-v", "batch", "--config", "p.toml", "photos", "-t", "4", "-r",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Batch {
                config,
                input,
                threads,
                recursive,
            } => {
                assert_eq!(config, PathBuf::from("p.toml"));
                assert_eq!(input, PathBuf::from("photos"));
                assert_eq!(threads, 4);
                assert!(recursive);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn remote_sources() {
        assert!(Cli::is_remote("HTTPS://example.com/a.jpg"));
        assert!(!Cli::is_remote("./a.jpg"));
    }
}
