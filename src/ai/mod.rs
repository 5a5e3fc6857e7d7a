//! Transport layer for the generative API
//!
//! The session controller only needs a byte stream back from a request; the
//! Gemini client provides one over HTTP and the mock replays scripted chunks.

pub mod gemini;
pub mod mime;
pub mod mock;

pub use gemini::GeminiStreamClient;
pub use mock::MockStreamingClient;

use crate::ai::gemini::GenerateContentRequest;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;

/// Raw response body, delivered chunk by chunk as it arrives.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[async_trait]
pub trait StreamingService: Send + Sync {
    /// Issue the request and return the body stream once a success status
    /// has been received. Non-success statuses and connection failures are
    /// returned as errors before any body byte is read.
    async fn stream_generate_content(&self, request: &GenerateContentRequest)
        -> Result<ByteStream>;
}
