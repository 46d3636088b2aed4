pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

pub use adapters::{ChatCompletionsParser, LocalStorage};
pub use config::AppConfig;
pub use crate::core::{
    FeePolicy, ImageIntake, ReviewSession, SplitCalculator, SplitEngine, SplitPolicy,
};
pub use domain::model::{Bill, LineItem, Money, Participant, Split};
pub use utils::error::{Result, SplitError};
