// shuttle/src/config.rs
//! TOML description of a pipeline: where files land, which rules they must
//! pass, how they are transformed and where they are shipped.

use crate::core::{Pipeline, ResizeAlgorithm, Result, ShuttleError};
use crate::processors::ImageBackend;
use crate::transform::{
    CropAnchor, CropConfig, FitConfig, FlipConfig, FlipDirection, HorizontalAlign, ResizeConfig,
    ResizeMode, RotateConfig, ScaleConfig, SourceRect, Transform, TransformSpec, VerticalAlign,
};
use crate::transport::{
    Credentials, GlacierConfig, GlacierTransporter, LocalTransporter, S3Config, S3Transporter,
    TransportOptions, TransportOverrides, Transporter,
};
use crate::validation::Validator;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub directory: PathBuf,
    pub overwrite: bool,
    pub algorithm: String,
    pub optimize_png: bool,
    pub rules: Vec<RuleEntry>,
    pub self_transforms: Vec<TransformEntry>,
    pub transforms: Vec<TransformEntry>,
    pub transport: Option<TransportEntry>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("uploads"),
            overwrite: false,
            algorithm: "lanczos3".to_string(),
            optimize_png: false,
            rules: Vec::new(),
            self_transforms: Vec::new(),
            transforms: Vec::new(),
            transport: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub rule: String,
    pub message: String,
    #[serde(default)]
    pub params: Vec<ParamValue>,
}

/// Rule parameters may be written as strings or numbers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl ParamValue {
    fn to_param(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
        }
    }
}

/// One transform in flat form: `kind` plus whichever options that kind reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformEntry {
    pub kind: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mode: Option<String>,
    pub expand: Option<bool>,
    pub aspect: Option<bool>,
    pub location: Option<String>,
    pub source: Option<[f64; 4]>,
    pub fill: Option<[u8; 3]>,
    pub horizontal: Option<String>,
    pub vertical: Option<String>,
    pub percent: Option<f64>,
    pub direction: Option<String>,
    pub degrees: Option<f64>,
    pub quality: Option<u8>,
    pub target: Option<String>,
}

impl TransformEntry {
    pub fn to_spec(&self) -> Result<TransformSpec> {
        let transform = match self.kind.to_lowercase().as_str() {
            "crop" => {
                let mut config = CropConfig {
                    width: self.width,
                    height: self.height,
                    ..Default::default()
                };
                if let Some(location) = &self.location {
                    config = config.with_anchor(location.parse::<CropAnchor>()?);
                }
                if let Some([x, y, w, h]) = self.source {
                    config = config.with_source_rect(SourceRect::new(x, y, w, h));
                }
                Transform::Crop(config)
            }
            "fit" => {
                let mut config = FitConfig {
                    width: self.width,
                    height: self.height,
                    fill: self.fill,
                    ..Default::default()
                };
                if let Some(h) = &self.horizontal {
                    config.horizontal = h.parse::<HorizontalAlign>()?;
                }
                if let Some(v) = &self.vertical {
                    config.vertical = v.parse::<VerticalAlign>()?;
                }
                Transform::Fit(config)
            }
            "resize" => {
                let mut config = ResizeConfig {
                    width: self.width,
                    height: self.height,
                    ..Default::default()
                };
                if let Some(mode) = &self.mode {
                    config = config.with_mode(mode.parse::<ResizeMode>()?);
                }
                if let Some(expand) = self.expand {
                    config = config.with_expand(expand);
                }
                if let Some(aspect) = self.aspect {
                    config = config.with_aspect(aspect);
                }
                Transform::Resize(config)
            }
            "scale" => Transform::Scale(ScaleConfig {
                percent: self.percent.or(ScaleConfig::default().percent),
            }),
            "flip" => {
                let direction = match &self.direction {
                    Some(d) => d.parse::<FlipDirection>()?,
                    None => FlipDirection::default(),
                };
                Transform::Flip(FlipConfig::new(direction))
            }
            "rotate" => Transform::Rotate(RotateConfig {
                degrees: self.degrees.unwrap_or(RotateConfig::default().degrees),
            }),
            "orientation" | "exif" => Transform::Orientation,
            other => {
                return Err(ShuttleError::Config(format!(
                    "Transformer {} does not exist",
                    other
                )))
            }
        };

        transform.validate()?;
        let mut spec = TransformSpec::new(transform);
        if let Some(quality) = self.quality {
            spec = spec.with_quality(quality);
        }
        if let Some(target) = &self.target {
            spec = spec.with_target(target.clone());
        }
        Ok(spec)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverrideEntry {
    pub folder: Option<String>,
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    pub encryption: Option<String>,
    pub return_url: Option<bool>,
    pub metadata: BTreeMap<String, String>,
}

impl From<&OverrideEntry> for TransportOverrides {
    fn from(entry: &OverrideEntry) -> Self {
        TransportOverrides {
            folder: entry.folder.clone(),
            acl: entry.acl.clone(),
            storage_class: entry.storage_class.clone(),
            encryption: entry.encryption.clone(),
            return_url: entry.return_url,
            metadata: entry.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportEntry {
    /// `local`, `s3` or `glacier`.
    pub backend: String,
    pub directory: Option<PathBuf>,
    pub bucket: String,
    pub vault: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub account_id: Option<String>,
    pub folder: Option<String>,
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    pub encryption: Option<String>,
    pub return_url: Option<bool>,
    pub metadata: BTreeMap<String, String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    /// Per-file overrides keyed by send position, `"0"` being the original.
    pub files: BTreeMap<String, OverrideEntry>,
}

impl TransportEntry {
    fn credentials(&self) -> Result<Credentials> {
        match (&self.access_key, &self.secret_key) {
            (Some(key), Some(secret)) => {
                Ok(Credentials::new(key.clone(), secret.clone())?
                    .with_session_token(self.session_token.clone()))
            }
            _ => Credentials::from_env(),
        }
    }

    pub fn build(&self) -> Result<Arc<dyn Transporter>> {
        match self.backend.to_lowercase().as_str() {
            "local" => {
                let directory = self.directory.clone().ok_or_else(|| {
                    ShuttleError::Config("Please provide a directory for local transport".to_string())
                })?;
                Ok(Arc::new(
                    LocalTransporter::new(directory).with_return_url(self.return_url.unwrap_or(false)),
                ))
            }
            "s3" => {
                let mut config = S3Config::new(&self.bucket, &self.region, self.credentials()?);
                if let Some(endpoint) = &self.endpoint {
                    config = config.with_endpoint(endpoint.clone());
                }
                if let Some(folder) = &self.folder {
                    config = config.with_folder(folder.clone());
                }
                if let Some(acl) = &self.acl {
                    config = config.with_acl(acl.clone());
                }
                if let Some(storage_class) = &self.storage_class {
                    config = config.with_storage_class(storage_class.clone());
                }
                if let Some(encryption) = &self.encryption {
                    config = config.with_encryption(encryption.clone());
                }
                if let Some(return_url) = self.return_url {
                    config = config.with_return_url(return_url);
                }
                config.metadata = self.metadata.clone();
                Ok(Arc::new(S3Transporter::new(config)?))
            }
            "glacier" => {
                let mut config = GlacierConfig::new(&self.vault, &self.region, self.credentials()?);
                if let Some(account_id) = &self.account_id {
                    config = config.with_account_id(account_id.clone());
                }
                if let Some(endpoint) = &self.endpoint {
                    config = config.with_endpoint(endpoint.clone());
                }
                Ok(Arc::new(GlacierTransporter::new(config)?))
            }
            other => Err(ShuttleError::Config(format!(
                "Transporter {} does not exist",
                other
            ))),
        }
    }

    pub fn options(&self) -> Result<TransportOptions> {
        let mut options = TransportOptions::new();
        for (index, entry) in &self.files {
            let index = index.parse::<usize>().map_err(|_| {
                ShuttleError::Config(format!("Invalid transport file index {}", index))
            })?;
            options = options.with_file(index, entry.into());
        }
        Ok(options)
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ShuttleError::Io(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&text)?;
        log::debug!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Parses and checks every rule and transform up front.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| ShuttleError::Config(format!("Invalid pipeline config: {}", e)))?;
        config.algorithm.parse::<ResizeAlgorithm>()?;
        for entry in &config.self_transforms {
            entry.to_spec()?;
        }
        for entry in &config.transforms {
            entry.to_spec()?.transform.validate_branch()?;
        }
        if let Some(transport) = &config.transport {
            transport.options()?;
        }
        Ok(config)
    }

    pub fn validator(&self) -> Option<Validator> {
        if self.rules.is_empty() {
            return None;
        }
        let mut validator = Validator::new();
        for rule in &self.rules {
            let params = rule.params.iter().map(ParamValue::to_param).collect();
            validator.add_named_rule(rule.rule.clone(), rule.message.clone(), params);
        }
        Some(validator)
    }

    pub fn has_transforms(&self) -> bool {
        !self.self_transforms.is_empty() || !self.transforms.is_empty()
    }

    pub fn transporter(&self) -> Result<Option<Arc<dyn Transporter>>> {
        self.transport.as_ref().map(TransportEntry::build).transpose()
    }

    pub fn transport_options(&self) -> Result<TransportOptions> {
        match &self.transport {
            Some(transport) => transport.options(),
            None => Ok(TransportOptions::new()),
        }
    }

    /// A pipeline with every rule and transform registered. The transporter
    /// is passed in so one connection can serve many pipelines.
    pub fn build_pipeline(&self, transporter: Option<Arc<dyn Transporter>>) -> Result<Pipeline> {
        self.build_pipeline_in(&self.directory, transporter)
    }

    /// Same as [`PipelineConfig::build_pipeline`] with files acquired into
    /// `directory` instead of the configured one.
    pub fn build_pipeline_in(
        &self,
        directory: &Path,
        transporter: Option<Arc<dyn Transporter>>,
    ) -> Result<Pipeline> {
        let algorithm = self.algorithm.parse::<ResizeAlgorithm>()?;
        let backend = ImageBackend::new(algorithm).with_png_optimization(self.optimize_png);

        let mut pipeline = Pipeline::new(directory).with_backend(Box::new(backend));
        if let Some(validator) = self.validator() {
            pipeline = pipeline.with_validator(validator);
        }
        if let Some(transporter) = transporter {
            pipeline = pipeline.with_transporter(Box::new(transporter));
        }

        for entry in &self.self_transforms {
            pipeline.add_self_transform(entry.to_spec()?)?;
        }
        for entry in &self.transforms {
            pipeline.add_transform(entry.to_spec()?)?;
        }
        Ok(pipeline)
    }
}
