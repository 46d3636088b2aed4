pub mod calculator;
pub mod draft;
pub mod engine;
pub mod export;
pub mod fees;
pub mod formatted;
pub mod intake;
pub mod review;

pub use crate::domain::model::{Bill, Split};
pub use crate::domain::ports::{BillParser, Storage};
pub use crate::utils::error::Result;
pub use calculator::{FeePolicy, SplitCalculator, SplitPolicy};
pub use engine::SplitEngine;
pub use intake::ImageIntake;
pub use review::{Edit, ReviewSession, ReviewState};
