use crate::domain::model::Money;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplitError {
    // Intake
    #[error("No images were uploaded")]
    NoImages,

    #[error("Too many images: {count} uploaded, at most {max} allowed")]
    TooManyImages { count: usize, max: usize },

    #[error("Image {index} is empty")]
    EmptyImage { index: usize },

    #[error("Image {index} is {size} bytes, exceeding the {max} byte limit")]
    ImageTooLarge { index: usize, size: usize, max: usize },

    #[error("Image {index} has unsupported format: {detected}")]
    UnsupportedFormat { index: usize, detected: String },

    // Parsing
    #[error("Bill parser request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Bill parser returned status {status}: {body}")]
    ParserStatus { status: u16, body: String },

    #[error("Bill parser output could not be understood: {message}")]
    ParseOutput { message: String },

    #[error("Formatted bill is invalid: {message}")]
    FormatError { message: String },

    // Calculation
    #[error("Item {index} ('{description}') has no assigned participant")]
    UnassignedItem { index: usize, description: String },

    #[error(
        "Declared total {declared} does not match computed total {computed} (difference {difference}, tolerance {tolerance})"
    )]
    Reconciliation {
        declared: Money,
        computed: Money,
        difference: Money,
        tolerance: Money,
    },

    #[error("Unknown participant '{name}'")]
    UnknownParticipant { name: String },

    #[error("Participant '{name}' is already part of this bill")]
    DuplicateParticipant { name: String },

    #[error("The bill has no participants")]
    NoParticipants,

    #[error("Item {index} has invalid price {price}: prices cannot be negative")]
    InvalidPrice { index: usize, price: Money },

    #[error("Item {index} has invalid quantity: quantity must be at least 1")]
    InvalidQuantity { index: usize },

    #[error("Item {index} assigns weight 0 to '{name}'")]
    InvalidWeight { index: usize, name: String },

    #[error("Amount {amount} cannot be represented in minor currency units")]
    AmountOutOfRange { amount: String },

    #[error("Item index {index} is out of range ({len} items)")]
    ItemOutOfRange { index: usize, len: usize },

    // Session
    #[error("Review session {id} not found")]
    SessionNotFound { id: String },

    #[error("Review session is confirmed and can no longer be edited")]
    SessionConfirmed,

    #[error("Review session has not been confirmed yet")]
    SessionNotConfirmed,

    #[error("Review session was not created from an upload and cannot be regenerated")]
    NoSourceImages,

    // Ambient
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Intake,
    Parsing,
    Calculation,
    Session,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SplitError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SplitError::NoImages
            | SplitError::TooManyImages { .. }
            | SplitError::EmptyImage { .. }
            | SplitError::ImageTooLarge { .. }
            | SplitError::UnsupportedFormat { .. } => ErrorCategory::Intake,
            SplitError::ApiError(_)
            | SplitError::ParserStatus { .. }
            | SplitError::ParseOutput { .. }
            | SplitError::FormatError { .. } => ErrorCategory::Parsing,
            SplitError::UnassignedItem { .. }
            | SplitError::Reconciliation { .. }
            | SplitError::UnknownParticipant { .. }
            | SplitError::DuplicateParticipant { .. }
            | SplitError::NoParticipants
            | SplitError::InvalidPrice { .. }
            | SplitError::InvalidQuantity { .. }
            | SplitError::InvalidWeight { .. }
            | SplitError::AmountOutOfRange { .. }
            | SplitError::ItemOutOfRange { .. } => ErrorCategory::Calculation,
            SplitError::SessionNotFound { .. }
            | SplitError::SessionConfirmed
            | SplitError::SessionNotConfirmed
            | SplitError::NoSourceImages => ErrorCategory::Session,
            SplitError::ConfigError { .. }
            | SplitError::InvalidConfigValueError { .. }
            | SplitError::MissingConfigError { .. } => ErrorCategory::Configuration,
            SplitError::IoError(_)
            | SplitError::SerializationError(_)
            | SplitError::CsvError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Calculation | ErrorCategory::Session => ErrorSeverity::Low,
            ErrorCategory::Intake | ErrorCategory::Parsing => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// Index of the line item the error refers to, used to highlight it during review.
    pub fn item_index(&self) -> Option<usize> {
        match self {
            SplitError::UnassignedItem { index, .. }
            | SplitError::InvalidPrice { index, .. }
            | SplitError::InvalidQuantity { index }
            | SplitError::InvalidWeight { index, .. }
            | SplitError::ItemOutOfRange { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Intake => format!("The uploaded bill could not be accepted: {}", self),
            ErrorCategory::Parsing => format!("The bill could not be read: {}", self),
            ErrorCategory::Calculation => format!("The split could not be computed: {}", self),
            ErrorCategory::Session => self.to_string(),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("Internal error: {}", self),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SplitError::NoImages | SplitError::EmptyImage { .. } => {
                "Upload at least one clear photo of the bill"
            }
            SplitError::TooManyImages { .. } => "Upload fewer images in one request",
            SplitError::ImageTooLarge { .. } => "Resize or compress the photo and upload it again",
            SplitError::UnsupportedFormat { .. } => "Upload the bill as a JPEG or PNG image",
            SplitError::ApiError(_) | SplitError::ParserStatus { .. } => {
                "Check the parser endpoint and credentials, or enter the items manually"
            }
            SplitError::ParseOutput { .. } => {
                "Retry with feedback describing the problem, or enter the items manually"
            }
            SplitError::FormatError { .. } => {
                "Make sure the PERSONS, ITEMS, FEES and SHARES sections are all present"
            }
            SplitError::UnassignedItem { .. } => "Assign the highlighted item to at least one participant",
            SplitError::Reconciliation { .. } => {
                "Check the highlighted prices and fees against the bill, or correct the declared total"
            }
            SplitError::UnknownParticipant { .. } | SplitError::NoParticipants => {
                "Add the participant to the bill first"
            }
            SplitError::DuplicateParticipant { .. } => "Use a different name for each participant",
            SplitError::InvalidPrice { .. }
            | SplitError::InvalidQuantity { .. }
            | SplitError::InvalidWeight { .. }
            | SplitError::AmountOutOfRange { .. }
            | SplitError::ItemOutOfRange { .. } => "Correct the highlighted item",
            SplitError::SessionNotFound { .. } => "Upload the bill again to start a new review",
            SplitError::SessionConfirmed => "Reopen the review before editing",
            SplitError::SessionNotConfirmed => "Confirm the split before exporting it",
            SplitError::NoSourceImages => "Edit the bill directly instead of regenerating it",
            SplitError::ConfigError { .. }
            | SplitError::InvalidConfigValueError { .. }
            | SplitError::MissingConfigError { .. } => "Fix the configuration file and try again",
            SplitError::IoError(_) | SplitError::SerializationError(_) | SplitError::CsvError(_) => {
                "Check file permissions and available disk space"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;
