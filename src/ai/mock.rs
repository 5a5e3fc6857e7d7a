use super::{ByteStream, StreamingService};
use crate::ai::gemini::GenerateContentRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{future, stream};
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum MockChunk {
    Data(Bytes),
    Fail(String),
}

#[derive(Debug, Clone)]
enum MockResponse {
    Stream { chunks: Vec<MockChunk>, hang: bool },
    Api { status: u16, message: String },
    Transport(String),
    Pending,
}

/// Scriptable [`StreamingService`] that replays canned response bodies.
///
/// Responses are served in the order they were added and cycle once
/// exhausted. Every request body is recorded as JSON for assertions. Clones
/// share the script and the recorded requests.
#[derive(Clone)]
pub struct MockStreamingClient {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<serde_json::Value>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockStreamingClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Body delivered as the given chunks, then closed.
    pub fn with_chunks<I, C>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        self.push(MockResponse::Stream {
            chunks: data_chunks(chunks),
            hang: false,
        })
    }

    /// Body delivered as the given chunks, after which the stream stays open
    /// without producing anything more.
    pub fn with_hanging_chunks<I, C>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        self.push(MockResponse::Stream {
            chunks: data_chunks(chunks),
            hang: true,
        })
    }

    /// Body delivered as the given chunks, then a transport failure.
    pub fn with_interrupted_chunks<I, C>(self, chunks: I, message: &str) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        let mut chunks = data_chunks(chunks);
        chunks.push(MockChunk::Fail(message.to_string()));
        self.push(MockResponse::Stream {
            chunks,
            hang: false,
        })
    }

    pub fn with_api_error(self, status: u16, message: &str) -> Self {
        self.push(MockResponse::Api {
            status,
            message: message.to_string(),
        })
    }

    pub fn with_transport_error(self, message: &str) -> Self {
        self.push(MockResponse::Transport(message.to_string()))
    }

    /// Request that never receives a response.
    pub fn with_pending_response(self) -> Self {
        self.push(MockResponse::Pending)
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Request bodies received so far, in order.
    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.requests.lock().unwrap().clone()
    }

    fn push(self, response: MockResponse) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }
}

impl Default for MockStreamingClient {
    fn default() -> Self {
        Self::new()
    }
}

fn data_chunks<I, C>(chunks: I) -> Vec<MockChunk>
where
    I: IntoIterator<Item = C>,
    C: Into<Bytes>,
{
    chunks
        .into_iter()
        .map(|chunk| MockChunk::Data(chunk.into()))
        .collect()
}

#[async_trait]
impl StreamingService for MockStreamingClient {
    async fn stream_generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<ByteStream> {
        self.requests
            .lock()
            .unwrap()
            .push(serde_json::to_value(request)?);

        let response = {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;

            let responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                None
            } else {
                let index = (*count - 1) % responses.len();
                Some(responses[index].clone())
            }
        };

        match response {
            None => Ok(Box::pin(stream::empty::<Result<Bytes>>())),
            Some(MockResponse::Api { status, message }) => Err(Error::Api { status, message }),
            Some(MockResponse::Transport(message)) => Err(Error::Transport(message)),
            Some(MockResponse::Pending) => future::pending::<Result<ByteStream>>().await,
            Some(MockResponse::Stream { chunks, hang }) => {
                let items = stream::iter(chunks.into_iter().map(|chunk| match chunk {
                    MockChunk::Data(bytes) => Ok(bytes),
                    MockChunk::Fail(message) => Err(Error::Transport(message)),
                }));
                if hang {
                    Ok(Box::pin(items.chain(stream::pending::<Result<Bytes>>())))
                } else {
                    Ok(Box::pin(items))
                }
            }
        }
    }
}
