use crate::domain::model::Bill;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// A photograph of (part of) a bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillImage {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Declared MIME type; replaced with the detected one during intake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl BillImage {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            content_type: None,
            filename: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseRequest {
    pub images: Vec<BillImage>,
    /// Free text describing who shared what.
    pub description: String,
    /// Reviewer feedback on a previous attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Formatted output of the previous attempt, sent along with the feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_output: Option<String>,
}

/// External service that turns bill photographs into a structured bill.
#[async_trait]
pub trait BillParser: Send + Sync {
    async fn parse(&self, request: &ParseRequest) -> Result<Bill>;
}

#[async_trait]
impl<T: BillParser + ?Sized> BillParser for Box<T> {
    async fn parse(&self, request: &ParseRequest) -> Result<Bill> {
        (**self).parse(request).await
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        // Accept data URLs as produced by browsers.
        let payload = match encoded.split_once(";base64,") {
            Some((_, rest)) => rest,
            None => encoded.as_str(),
        };
        STANDARD
            .decode(payload.trim())
            .map_err(serde::de::Error::custom)
    }
}
