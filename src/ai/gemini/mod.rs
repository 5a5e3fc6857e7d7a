pub mod client;
pub mod types;

pub use client::GeminiStreamClient;
pub use types::{GenerateContentRequest, InlineData, Part, StreamChunk};
