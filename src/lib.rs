//! Streaming response aggregator for the Gemini multimodal API.
//!
//! Consumes the chunked `streamGenerateContent` event stream, rebuilds an
//! ordered sequence of text and image items, merges text fragments into runs,
//! flags markdown, and hands incremental updates to a consumer while keeping
//! a replayable conversation history.

pub mod ai;
pub mod error;
pub mod history;
pub mod models;
pub mod session;
pub mod stream;
pub mod transcript;

pub use error::{Error, Result};
pub use session::{ContentSink, Conversation, SessionState, StopHandle};
