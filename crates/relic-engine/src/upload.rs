use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{ImageFormat, ImageReader};
use relic_contracts::request::{ImagePayload, InputError, JPEG_MIME, PNG_MIME};

const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// A user-selected image, checked to be a JPEG or PNG.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    path: PathBuf,
    payload: ImagePayload,
    width: u32,
    height: u32,
}

impl ImageUpload {
    pub fn open(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
            let label = if ext.is_empty() {
                path.display().to_string()
            } else {
                format!(".{ext}")
            };
            return Err(InputError::UnsupportedImageType(label).into());
        }
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        Self::from_bytes(path, bytes)
    }

    /// The MIME label comes from the content, not the file name.
    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self> {
        let format = image::guess_format(&bytes).map_err(|_| {
            InputError::UnsupportedImageType(format!("unrecognized data in {}", path.display()))
        })?;
        let mime_type = match format {
            ImageFormat::Jpeg => JPEG_MIME,
            ImageFormat::Png => PNG_MIME,
            other => {
                return Err(InputError::UnsupportedImageType(
                    other.to_mime_type().to_string(),
                )
                .into())
            }
        };
        let (width, height) = ImageReader::with_format(Cursor::new(bytes.as_slice()), format)
            .into_dimensions()
            .with_context(|| format!("failed decoding {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            payload: ImagePayload::new(mime_type, bytes),
            width,
            height,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn payload(&self) -> &ImagePayload {
        &self.payload
    }

    pub fn mime_type(&self) -> &str {
        self.payload.mime_type.as_str()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn byte_len(&self) -> usize {
        self.payload.data.len()
    }
}
