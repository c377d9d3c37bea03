// shuttle/src/processors/metadata.rs
use crate::core::{ExifData, Result, ShuttleError};
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Default)]
pub struct MetadataProcessor;

impl MetadataProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn read_metadata(&self, path: &Path) -> Result<Option<Exif>> {
        let file = File::open(path)?;
        let mut bufreader = BufReader::new(&file);

        match Reader::new().read_from_container(&mut bufreader) {
            Ok(exif) => {
                log::debug!("Found EXIF data in {}", path.display());
                Ok(Some(exif))
            }
            Err(exif::Error::NotFound(_)) => {
                log::debug!("No EXIF data found in {}", path.display());
                Ok(None)
            }
            Err(exif::Error::InvalidFormat(msg)) => {
                log::debug!("Unreadable EXIF block in {}: {}", path.display(), msg);
                Ok(None)
            }
            Err(e) => Err(ShuttleError::Io(format!(
                "EXIF read error in {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// The camera fields of `path`, empty when there is no exif block.
    pub fn read_fields(&self, path: &Path) -> Result<ExifData> {
        Ok(self
            .read_metadata(path)?
            .map(|exif| self.extract_fields(&exif))
            .unwrap_or_default())
    }

    pub fn extract_fields(&self, exif: &Exif) -> ExifData {
        let orientation = exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(|value| value.to_string())
            .unwrap_or_default();

        ExifData {
            make: field_text(exif, Tag::Make),
            model: field_text(exif, Tag::Model),
            exposure: field_text(exif, Tag::ExposureTime),
            orientation,
            fnumber: field_text(exif, Tag::FNumber),
            date: field_text(exif, Tag::DateTimeOriginal),
            iso: field_text(exif, Tag::PhotographicSensitivity),
            focal: field_text(exif, Tag::FocalLength),
        }
    }
}

fn field_text(exif: &Exif, tag: Tag) -> String {
    let Some(field) = exif.get_field(tag, In::PRIMARY) else {
        return String::new();
    };

    match &field.value {
        Value::Ascii(parts) => parts
            .iter()
            .map(|part| String::from_utf8_lossy(part).trim().to_string())
            .collect::<Vec<_>>()
            .join(" "),
        _ => field.display_value().to_string(),
    }
}
