// Adapters: concrete implementations of the domain ports.

pub mod llm_parser;
pub mod storage;

pub use llm_parser::ChatCompletionsParser;
pub use storage::LocalStorage;
