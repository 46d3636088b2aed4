use crate::core::calculator::{FeePolicy, SplitCalculator, SplitPolicy};
use crate::core::intake::ImageIntake;
use crate::domain::model::Money;
use crate::utils::error::{Result, SplitError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

pub const DEFAULT_PARSER_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub intake: ImageIntake,
    pub parser: ParserConfig,
    pub split: SplitConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Review sessions untouched for this long are dropped.
    pub session_ttl_minutes: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            session_ttl_minutes: 240,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection settings for the chat completions endpoint that reads bills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub endpoint: String,
    pub model: Option<String>,
    pub timeout_seconds: u64,
    pub temperature: Option<f32>,
    /// Sent with every request, e.g. `api-key` or `Authorization`.
    pub headers: HashMap<String, String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_PARSER_ENDPOINT.to_string(),
            model: None,
            timeout_seconds: 60,
            temperature: None,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub scale: u32,
    pub reconciliation_tolerance: Money,
    pub tax_policy: FeePolicy,
    pub tip_policy: FeePolicy,
    pub delivery_policy: FeePolicy,
}

impl Default for SplitConfig {
    fn default() -> Self {
        let policy = SplitPolicy::default();
        Self {
            scale: policy.scale,
            reconciliation_tolerance: policy.tolerance,
            tax_policy: policy.tax,
            tip_policy: policy.tip,
            delivery_policy: policy.delivery,
        }
    }
}

impl SplitConfig {
    pub fn policy(&self) -> SplitPolicy {
        SplitPolicy {
            scale: self.scale,
            tolerance: self.reconciliation_tolerance,
            tax: self.tax_policy,
            tip: self.tip_policy,
            delivery: self.delivery_policy,
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        tracing::debug!("Loaded configuration from {}", path.as_ref().display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content);
        toml::from_str(&processed).map_err(|e| SplitError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Reads `path` when given, otherwise starts from the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn calculator(&self) -> SplitCalculator {
        SplitCalculator::new(self.split.policy())
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"))
}

/// Replaces `${VAR_NAME}` with the variable's value. Unset variables are left
/// in place.
fn substitute_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let name = &caps[1];
            std::env::var(name).unwrap_or_else(|_| {
                tracing::warn!("Environment variable {} is not set", name);
                format!("${{{}}}", name)
            })
        })
        .into_owned()
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("server.host", &self.server.host)?;
        validation::validate_positive_number("server.port", self.server.port as usize, 1)?;
        validation::validate_range(
            "server.session_ttl_minutes",
            self.server.session_ttl_minutes,
            1,
            10_080,
        )?;

        validation::validate_positive_number("intake.max_files", self.intake.max_files, 1)?;
        validation::validate_positive_number(
            "intake.max_file_size",
            self.intake.max_file_size,
            1,
        )?;
        validation::validate_image_types("intake.allowed_types", &self.intake.allowed_types)?;

        validation::validate_url("parser.endpoint", &self.parser.endpoint)?;
        validation::validate_range("parser.timeout_seconds", self.parser.timeout_seconds, 1, 600)?;

        validation::validate_range("split.scale", self.split.scale, 0, 6)?;
        if self.split.reconciliation_tolerance.is_negative() {
            return Err(SplitError::InvalidConfigValueError {
                field: "split.reconciliation_tolerance".to_string(),
                value: self.split.reconciliation_tolerance.to_string(),
                reason: "Tolerance cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}
