// shuttle/src/processors/mod.rs
mod backend;
mod batch;
mod compressor;
mod loader;
mod metadata;
mod resizer;

pub use backend::{ImageBackend, RasterBackend, RenderRequest};
pub use batch::{BatchProcessor, BatchStats};
pub use compressor::Compressor;
pub use loader::Loader;
pub use metadata::MetadataProcessor;
pub use resizer::Resizer;

#[cfg(test)]
pub(crate) use backend::tests as test_backends;

pub mod prelude {
    pub use super::{BatchProcessor, Compressor, ImageBackend, Loader, MetadataProcessor, Resizer};
}
