use crate::domain::ports::BillImage;
use crate::utils::error::{Result, SplitError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 10;

/// Upload constraints for bill photographs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageIntake {
    pub max_file_size: usize,
    pub max_files: usize,
    pub allowed_types: Vec<String>,
}

impl Default for ImageIntake {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
            allowed_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
        }
    }
}

impl ImageIntake {
    /// Checks every image and replaces its declared content type with the one
    /// detected from its bytes.
    pub fn accept(&self, images: &mut [BillImage]) -> Result<()> {
        if images.is_empty() {
            return Err(SplitError::NoImages);
        }
        if images.len() > self.max_files {
            return Err(SplitError::TooManyImages {
                count: images.len(),
                max: self.max_files,
            });
        }

        for (index, image) in images.iter_mut().enumerate() {
            let mime = self.check(index, image)?;
            image.content_type = Some(mime);
        }

        tracing::debug!(
            count = images.len(),
            bytes = images.iter().map(|i| i.data.len()).sum::<usize>(),
            "Accepted bill images"
        );
        Ok(())
    }

    fn check(&self, index: usize, image: &BillImage) -> Result<String> {
        let size = image.data.len();
        if size == 0 {
            return Err(SplitError::EmptyImage { index });
        }
        if size > self.max_file_size {
            return Err(SplitError::ImageTooLarge {
                index,
                size,
                max: self.max_file_size,
            });
        }

        if let Some(declared) = image.content_type.as_deref() {
            let declared = normalize_mime(declared);
            if !self.is_allowed(&declared) {
                return Err(SplitError::UnsupportedFormat {
                    index,
                    detected: declared,
                });
            }
        }

        let detected = infer::get(&image.data)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        if !self.is_allowed(&detected) {
            return Err(SplitError::UnsupportedFormat { index, detected });
        }

        if let Some(declared) = image.content_type.as_deref() {
            if normalize_mime(declared) != detected {
                tracing::warn!(
                    index,
                    declared,
                    detected = %detected,
                    "Image content type does not match its bytes, using detected type"
                );
            }
        }
        Ok(detected)
    }

    fn is_allowed(&self, mime: &str) -> bool {
        self.allowed_types
            .iter()
            .any(|allowed| normalize_mime(allowed) == mime)
    }
}

fn normalize_mime(mime: &str) -> String {
    let lower = mime.trim().to_ascii_lowercase();
    match lower.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => lower,
    }
}
