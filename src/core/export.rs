use crate::domain::model::Split;
use crate::domain::ports::Storage;
use crate::utils::error::{Result, SplitError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(SplitError::InvalidConfigValueError {
                field: "format".to_string(),
                value: other.to_string(),
                reason: "Unsupported format. Valid formats: json, csv".to_string(),
            }),
        }
    }
}

pub fn to_csv(split: &Split) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["participant", "items", "tax", "tip", "delivery", "total"])?;
    for share in &split.shares {
        writer.write_record([
            share.participant.clone(),
            share.items.to_string(),
            share.tax.to_string(),
            share.tip.to_string(),
            share.delivery.to_string(),
            share.total.to_string(),
        ])?;
    }
    let data = writer
        .into_inner()
        .map_err(|e| SplitError::IoError(e.into_error()))?;
    String::from_utf8(data).map_err(|e| SplitError::ConfigError {
        message: format!("CSV output is not valid UTF-8: {}", e),
    })
}

pub fn to_json(split: &Split) -> Result<String> {
    Ok(serde_json::to_string_pretty(split)?)
}

/// Writes confirmed splits through a [`Storage`] backend.
pub struct SplitExporter<S: Storage> {
    storage: S,
}

impl<S: Storage> SplitExporter<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Writes `<name>.<ext>` and returns the relative path written.
    pub async fn export(&self, split: &Split, name: &str, format: ExportFormat) -> Result<String> {
        let body = match format {
            ExportFormat::Json => to_json(split)?,
            ExportFormat::Csv => to_csv(split)?,
        };
        let path = format!("{}.{}", name, format.extension());
        tracing::debug!("Writing split ({} bytes) to {}", body.len(), path);
        self.storage.write_file(&path, body.as_bytes()).await?;
        Ok(path)
    }
}
