//! Stream session controller
//!
//! A [`Conversation`] owns the history and runs one request/response cycle
//! at a time:
//!
//! ```text
//! Idle → Sending → Streaming → Finalizing → Completed | Failed | Cancelled
//! ```
//!
//! The network read loop and the consumer run as two futures joined on the
//! caller's task and connected by a bounded channel, so items reach the
//! consumer in emission order and the reader waits whenever the consumer
//! falls behind.

use crate::ai::gemini::{GenerateContentRequest, Part};
use crate::ai::{ByteStream, StreamingService};
use crate::history::ConversationHistory;
use crate::models::{
    ContentItem, GenerationConfig, ImageAttachment, Role, SafetySetting, Turn,
};
use crate::stream::StreamPipeline;
use crate::{Error, Result};
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const DELIVERY_BUFFER: usize = 16;

/// Receiver of session output.
///
/// `on_content_item` is called zero or more times in emission order, then
/// exactly one of `on_error` or `on_complete`.
pub trait ContentSink {
    fn on_content_item(&mut self, item: ContentItem);
    fn on_error(&mut self, message: &str);
    fn on_complete(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sending,
    Streaming,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

/// Cloneable handle that stops the in-flight session.
///
/// Stopping is cooperative: the read loop notices between chunks, between
/// lines, or while waiting for the next chunk. A stop issued while no session
/// runs is discarded when the next session starts.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token().cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token().is_cancelled()
    }

    fn token(&self) -> CancellationToken {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn begin_session(&self) -> CancellationToken {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = CancellationToken::new();
        current.clone()
    }
}

/// Why the read loop stopped.
#[derive(Debug)]
enum StreamEnd {
    Done,
    Exhausted,
    Stopped,
    Failed(Error),
}

pub struct Conversation {
    service: Box<dyn StreamingService>,
    history: ConversationHistory,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
    state: SessionState,
    stop: StopHandle,
}

impl Conversation {
    pub fn new(service: Box<dyn StreamingService>) -> Self {
        Self {
            service,
            history: ConversationHistory::new(),
            generation_config: GenerationConfig::default(),
            safety_settings: Vec::new(),
            state: SessionState::Idle,
            stop: StopHandle::default(),
        }
    }

    pub fn with_generation_config(mut self, generation_config: GenerationConfig) -> Self {
        self.generation_config = generation_config;
        self
    }

    pub fn with_safety_settings(mut self, safety_settings: Vec<SafetySetting>) -> Self {
        self.safety_settings = safety_settings;
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Start a new chat.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.state = SessionState::Idle;
    }

    pub fn replace_history(&mut self, turns: Vec<Turn>) {
        self.history.replace(turns);
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation_config
    }

    /// State of the current or most recent session.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub async fn generate_content<S>(&mut self, prompt: &str, sink: &mut S) -> Result<SessionState>
    where
        S: ContentSink + ?Sized,
    {
        self.run_session(prompt, None, sink).await
    }

    pub async fn generate_content_with_image<S>(
        &mut self,
        prompt: &str,
        image: ImageAttachment,
        sink: &mut S,
    ) -> Result<SessionState>
    where
        S: ContentSink + ?Sized,
    {
        self.run_session(prompt, Some(image), sink).await
    }

    /// Run one exchange. Fatal errors are reported to `sink` and returned;
    /// a stop request yields `Ok(SessionState::Cancelled)`.
    async fn run_session<S>(
        &mut self,
        prompt: &str,
        image: Option<ImageAttachment>,
        sink: &mut S,
    ) -> Result<SessionState>
    where
        S: ContentSink + ?Sized,
    {
        let token = self.stop.begin_session();
        self.transition(SessionState::Sending);

        let user_parts = user_parts(prompt, image.as_ref());
        if user_parts.is_empty() {
            return Err(self.fail(
                Error::Generic("Prompt must contain text or an image".to_string()),
                sink,
            ));
        }

        let mut contents = self.history.snapshot().to_vec();
        contents.push(Turn::new(Role::User, user_parts.clone()));
        let request = GenerateContentRequest {
            contents,
            generation_config: self.generation_config.clone(),
            safety_settings: self.safety_settings.clone(),
        };

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            response = self.service.stream_generate_content(&request) => Some(response),
        };

        let stream = match response {
            None => {
                info!("Session stopped before the response arrived");
                self.transition(SessionState::Cancelled);
                sink.on_complete();
                return Ok(SessionState::Cancelled);
            }
            Some(Err(e)) => return Err(self.fail(e, sink)),
            Some(Ok(stream)) => stream,
        };

        self.history.append_turn(Role::User, user_parts);
        self.transition(SessionState::Streaming);

        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);
        let reader = read_stream(stream, StreamPipeline::new(), tx, token);
        let delivery = deliver(rx, sink);
        let ((pipeline, end), delivered) = tokio::join!(reader, delivery);

        self.transition(SessionState::Finalizing);
        debug!(
            "Stream finished ({:?}): {} chunk(s), {} payload(s), {} item(s) delivered",
            end,
            pipeline.chunk_count(),
            pipeline.payload_count(),
            delivered
        );

        let model_parts = pipeline.model_parts();
        if !model_parts.is_empty() {
            self.history.append_turn(Role::Model, model_parts);
        }

        match end {
            StreamEnd::Done | StreamEnd::Exhausted => {
                self.transition(SessionState::Completed);
                sink.on_complete();
                Ok(SessionState::Completed)
            }
            StreamEnd::Stopped => {
                info!("Session stopped after {} item(s)", delivered);
                self.transition(SessionState::Cancelled);
                sink.on_complete();
                Ok(SessionState::Cancelled)
            }
            StreamEnd::Failed(e) => Err(self.fail(e, sink)),
        }
    }

    fn fail<S>(&mut self, e: Error, sink: &mut S) -> Error
    where
        S: ContentSink + ?Sized,
    {
        error!("Session failed: {}", e);
        self.transition(SessionState::Failed);
        sink.on_error(&e.to_string());
        e
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn user_parts(prompt: &str, image: Option<&ImageAttachment>) -> Vec<Part> {
    let mut parts = Vec::with_capacity(2);
    if !prompt.trim().is_empty() {
        parts.push(Part::text(prompt));
    }
    if let Some(image) = image {
        parts.push(Part::inline(image.mime_type.clone(), &image.data));
    }
    parts
}

/// Drive the body through the pipeline until `[DONE]`, exhaustion, a stop
/// request or a transport error. The body is dropped on return, which closes
/// the connection.
async fn read_stream(
    mut stream: ByteStream,
    mut pipeline: StreamPipeline,
    tx: mpsc::Sender<ContentItem>,
    token: CancellationToken,
) -> (StreamPipeline, StreamEnd) {
    let end = 'read: loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            next = stream.next() => Some(next),
        };
        let Some(next) = next else {
            break StreamEnd::Stopped;
        };

        let (lines, source_ended) = match next {
            Some(Ok(chunk)) => (pipeline.push_chunk(&chunk), false),
            Some(Err(e)) => break StreamEnd::Failed(e),
            None => (pipeline.finish().into_iter().collect(), true),
        };

        for line in lines {
            if token.is_cancelled() {
                break 'read StreamEnd::Stopped;
            }
            for item in pipeline.handle_line(&line) {
                if tx.send(item).await.is_err() {
                    break 'read StreamEnd::Stopped;
                }
            }
            if !pipeline.is_active() {
                break 'read StreamEnd::Done;
            }
        }

        if source_ended {
            break StreamEnd::Exhausted;
        }
    };

    drop(stream);
    (pipeline, end)
}

async fn deliver<S>(mut rx: mpsc::Receiver<ContentItem>, sink: &mut S) -> usize
where
    S: ContentSink + ?Sized,
{
    let mut delivered = 0;
    while let Some(item) = rx.recv().await {
        sink.on_content_item(item);
        delivered += 1;
    }
    delivered
}
