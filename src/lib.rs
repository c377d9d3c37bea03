// shuttle/src/lib.rs
pub mod cli;
pub mod config;
pub mod core;
pub mod fetch;
pub mod processors;
pub mod transform;
pub mod transport;
pub mod utils;
pub mod validation;

pub use config::PipelineConfig;
pub use core::{
    Dimensions, ExifData, FileHandle, FileInfo, Origin, Pipeline, PipelineResult, PipelineState,
    Quality, RasterFormat, ResizeAlgorithm, Result, ShuttleError, UploadError, UploadedFile,
};
pub use fetch::{HttpFetcher, RemoteFetcher};
pub use processors::{BatchProcessor, BatchStats, ImageBackend, RasterBackend, RenderRequest};
pub use transform::{Transform, TransformEngine, TransformSpec};
pub use transport::{
    GlacierTransporter, LocalTransporter, S3Transporter, TransportOptions, TransportOverrides,
    Transporter,
};
pub use validation::{Predicate, Validator};

pub mod prelude {
    pub use crate::transform::{
        CropConfig, FitConfig, FlipConfig, FlipDirection, ResizeConfig, RotateConfig, ScaleConfig,
    };
    pub use crate::{
        FileHandle, Pipeline, PipelineConfig, Predicate, ShuttleError, Transform, TransformSpec,
        TransportOptions, Validator,
    };
}
