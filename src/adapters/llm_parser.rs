use crate::config::ParserConfig;
use crate::core::draft::BillDraft;
use crate::domain::model::Bill;
use crate::domain::ports::{BillImage, BillParser, ParseRequest};
use crate::utils::error::{Result, SplitError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SYSTEM_PROMPT: &str = r#"You are a receipt parser that extracts line items from photographs of a bill.

You may receive several images of the same bill (pages, angles or sections). Read them together and list every line only once.

1. Extract the people from the user's description and give each a unique short abbreviation (for example V, A).
2. Read every line item with its exact name and price. Include a quantity only when the bill prints one and the price is per unit.
3. Extract every fee, charge, tax, tip and discount exactly as printed. Use negative amounts for discounts and credits.
4. Map each item to the people who shared it according to the description. Append "*N" to an abbreviation when that person had N portions.
5. Include the total printed on the bill, if any.

Only report items and fees that appear on the bill. Reply with a single JSON object of this shape:
{"persons":[{"abbreviation":"A","name":"Alice"}],
 "items":[{"name":"Pizza","price":"20.00","quantity":1}],
 "fees":[{"name":"Sales Tax","amount":"2.00"}],
 "item_shares":[{"item":"Pizza","persons":["A","B"]}],
 "total":"25.00"}"#;

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// [`BillParser`] backed by an OpenAI-compatible chat completions endpoint.
pub struct ChatCompletionsParser {
    config: ParserConfig,
    client: Client,
}

impl ChatCompletionsParser {
    pub fn new(config: ParserConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, client })
    }

    fn build_request<'a>(&'a self, request: &ParseRequest) -> ChatRequest<'a> {
        let mut parts = vec![ContentPart::Text {
            text: user_prompt(request),
        }];
        parts.extend(request.images.iter().map(|image| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: data_url(image),
            },
        }));

        ChatRequest {
            model: self.config.model.as_deref(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(parts),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: self.config.temperature,
        }
    }
}

#[async_trait]
impl BillParser for ChatCompletionsParser {
    async fn parse(&self, request: &ParseRequest) -> Result<Bill> {
        let body = self.build_request(request);

        tracing::debug!("Making bill parser request to: {}", self.config.endpoint);
        let mut http = self.client.post(&self.config.endpoint).json(&body);
        for (key, value) in &self.config.headers {
            http = http.header(key, value);
        }
        let response = http.send().await?;

        let status = response.status();
        tracing::debug!("Bill parser response status: {}", status);
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!("Bill parser request failed with status {}", status);
            return Err(SplitError::ParserStatus {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| SplitError::ParseOutput {
                message: "response contained no message content".to_string(),
            })?;

        let draft = parse_draft(&content)?;
        Ok(draft.into_bill())
    }
}

fn user_prompt(request: &ParseRequest) -> String {
    let mut prompt = format!(
        "Process these {} receipt image(s) using the split description: {}",
        request.images.len(),
        request.description.trim()
    );
    if let Some(feedback) = request.feedback.as_deref() {
        prompt.push_str(&format!("\n\nPrevious output had issues: {}", feedback));
        if let Some(previous) = request.previous_output.as_deref() {
            prompt.push_str(&format!("\nPrevious output was:\n{}", previous));
        }
        prompt.push_str("\nPlease improve based on this feedback.");
    }
    prompt
}

fn data_url(image: &BillImage) -> String {
    let mime = image.content_type.as_deref().unwrap_or("image/png");
    format!("data:{};base64,{}", mime, STANDARD.encode(&image.data))
}

/// Reads the JSON document out of the reply, tolerating a markdown code fence.
fn parse_draft(content: &str) -> Result<BillDraft> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(json.trim()).map_err(|e| SplitError::ParseOutput {
        message: format!("invalid bill JSON: {}", e),
    })
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
