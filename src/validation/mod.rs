// shuttle/src/validation/mod.rs
use crate::core::{mime, FileHandle, Result, ShuttleError};
use std::fmt;
use std::sync::Arc;

/// Built-in checks on facts a [`FileHandle`] can answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Size in bytes must not exceed the limit.
    MaxSize(u64),
    Extension(Vec<String>),
    MimeType(Vec<String>),
    /// Top-level category (`image`, `text`, ...) or named subtype (`archive`, ...).
    Category(Vec<String>),
    Width(u32),
    Height(u32),
    MinWidth(u32),
    MaxWidth(u32),
    MinHeight(u32),
    MaxHeight(u32),
}

impl Predicate {
    /// Builds a predicate from its configuration name, e.g. `("ext", ["jpg"])`.
    pub fn parse(name: &str, params: &[String]) -> Result<Self> {
        let list = || -> Result<Vec<String>> {
            if params.is_empty() {
                return Err(ShuttleError::Config(format!(
                    "Validation method {} needs at least one value",
                    name
                )));
            }
            Ok(params.iter().map(|p| p.to_lowercase()).collect())
        };
        let number = || -> Result<u64> {
            params
                .first()
                .and_then(|p| p.trim().parse::<u64>().ok())
                .ok_or_else(|| {
                    ShuttleError::Config(format!("Validation method {} needs a number", name))
                })
        };
        let pixels = || -> Result<u32> {
            u32::try_from(number()?).map_err(|_| {
                ShuttleError::Config(format!("Validation method {} value is too large", name))
            })
        };

        match name {
            "size" => Ok(Self::MaxSize(number()?)),
            "ext" => Ok(Self::Extension(list()?)),
            "mimeType" | "mime_type" => Ok(Self::MimeType(list()?)),
            "type" => Ok(Self::Category(list()?)),
            "width" => Ok(Self::Width(pixels()?)),
            "height" => Ok(Self::Height(pixels()?)),
            "minWidth" | "min_width" => Ok(Self::MinWidth(pixels()?)),
            "maxWidth" | "max_width" => Ok(Self::MaxWidth(pixels()?)),
            "minHeight" | "min_height" => Ok(Self::MinHeight(pixels()?)),
            "maxHeight" | "max_height" => Ok(Self::MaxHeight(pixels()?)),
            other => Err(ShuttleError::Config(format!(
                "Validation method {} does not exist",
                other
            ))),
        }
    }

    pub fn check(&self, file: &FileHandle) -> Result<bool> {
        match self {
            Self::MaxSize(max) => Ok(file.size()? <= *max),
            Self::Extension(allowed) => Ok(allowed.contains(&file.ext())),
            Self::MimeType(allowed) => Ok(allowed.contains(&file.mime_type()?.to_lowercase())),
            Self::Category(categories) => {
                let mime_type = file.mime_type()?;
                for category in categories {
                    if mime::matches_category(&mime_type, category)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Width(w) => Ok(file.width()? == Some(*w)),
            Self::Height(h) => Ok(file.height()? == Some(*h)),
            Self::MinWidth(w) => Ok(file.width()?.is_some_and(|v| v >= *w)),
            Self::MaxWidth(w) => Ok(file.width()?.is_some_and(|v| v <= *w)),
            Self::MinHeight(h) => Ok(file.height()?.is_some_and(|v| v >= *h)),
            Self::MaxHeight(h) => Ok(file.height()?.is_some_and(|v| v <= *h)),
        }
    }
}

pub type CustomCheck = Arc<dyn Fn(&FileHandle) -> bool + Send + Sync>;

#[derive(Clone)]
enum Check {
    Builtin(Predicate),
    /// Resolved when validation runs, so typos surface as configuration errors.
    Named { name: String, params: Vec<String> },
    Custom(CustomCheck),
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(p) => f.debug_tuple("Builtin").field(p).finish(),
            Self::Named { name, params } => f
                .debug_struct("Named")
                .field("name", name)
                .field("params", params)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    check: Check,
    message: String,
}

impl Rule {
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Ordered rules; the first failing rule ends validation.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: Vec<Rule>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, predicate: Predicate, message: impl Into<String>) -> &mut Self {
        self.push(Check::Builtin(predicate), message)
    }

    pub fn add_named_rule(
        &mut self,
        name: impl Into<String>,
        message: impl Into<String>,
        params: Vec<String>,
    ) -> &mut Self {
        let check = Check::Named {
            name: name.into(),
            params,
        };
        self.push(check, message)
    }

    pub fn add_custom_rule<F>(&mut self, check: F, message: impl Into<String>) -> &mut Self
    where
        F: Fn(&FileHandle) -> bool + Send + Sync + 'static,
    {
        self.push(Check::Custom(Arc::new(check)), message)
    }

    fn push(&mut self, check: Check, message: impl Into<String>) -> &mut Self {
        self.rules.push(Rule {
            check,
            message: message.into(),
        });
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn validate(&self, file: Option<&FileHandle>) -> Result<()> {
        if self.rules.is_empty() {
            return Ok(());
        }

        let file = file.ok_or_else(|| {
            ShuttleError::Io("No file present for validation".to_string())
        })?;

        for rule in &self.rules {
            let passed = match &rule.check {
                Check::Builtin(predicate) => predicate.check(file)?,
                Check::Named { name, params } => Predicate::parse(name, params)?.check(file)?,
                Check::Custom(check) => check(file),
            };

            if !passed {
                log::debug!("{} failed validation: {}", file.basename(), rule.message);
                return Err(ShuttleError::Validation(rule.message.clone()));
            }
        }

        log::debug!("{} passed {} rules", file.basename(), self.rules.len());
        Ok(())
    }
}
