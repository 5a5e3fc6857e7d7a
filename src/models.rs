//! Data models and structures
//!
//! Defines the content items handed to consumers, conversation turns, the
//! generation options sent with every request, and environment configuration.

use crate::ai::gemini::types::Part;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A fragment pulled out of one decoded stream payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPart {
    Text(String),
    InlineBinary { data: Bytes, mime_type: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    PlainText,
    StructuredText,
    Image,
}

/// Payload of a [`ContentItem`], one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBody {
    PlainText(String),
    StructuredText(String),
    Image { data: Bytes, mime_type: String },
}

impl ContentBody {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentBody::PlainText(_) => ContentKind::PlainText,
            ContentBody::StructuredText(_) => ContentKind::StructuredText,
            ContentBody::Image { .. } => ContentKind::Image,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ContentBody::PlainText(text) | ContentBody::StructuredText(text) => Some(text),
            ContentBody::Image { .. } => None,
        }
    }
}

/// Unit of output delivered to consumers.
///
/// When `is_incremental` is set the body carries only the delta to append to
/// the previous item of the same kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub body: ContentBody,
    pub created_at: DateTime<Utc>,
    pub is_incremental: bool,
}

impl ContentItem {
    pub fn new(body: ContentBody, is_incremental: bool) -> Self {
        Self {
            body,
            created_at: Utc::now(),
            is_incremental,
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.body.kind()
    }

    pub fn text(&self) -> Option<&str> {
        self.body.text()
    }

    pub fn is_text(&self) -> bool {
        !matches!(self.body, ContentBody::Image { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One exchange entry as it appears in the request `contents` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect()
    }
}

/// Output modality requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Text,
    Image,
}

/// `generationConfig` block; passed through to the API unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub response_modalities: Vec<Modality>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: Some(1.0),
            top_k: Some(40),
            top_p: Some(0.95),
            max_output_tokens: Some(8192),
            response_mime_type: Some("text/plain".to_string()),
            response_modalities: vec![Modality::Text, Modality::Image],
        }
    }
}

impl GenerationConfig {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn with_response_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.response_mime_type = Some(mime_type.into());
        self
    }

    /// Modalities form an ordered set: later duplicates are dropped.
    pub fn with_response_modalities(mut self, modalities: &[Modality]) -> Self {
        self.response_modalities.clear();
        for modality in modalities {
            if !self.response_modalities.contains(modality) {
                self.response_modalities.push(*modality);
            }
        }
        self
    }
}

/// `{category, threshold}` pair, sent verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

impl SafetySetting {
    pub fn new(category: impl Into<String>, threshold: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            threshold: threshold.into(),
        }
    }
}

/// Image supplied by the caller alongside a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub data: Bytes,
    pub mime_type: String,
}

impl ImageAttachment {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Sniff the MIME type from the image's magic bytes.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let mime_type = crate::ai::mime::detect_image_mime(&data).to_string();
        Self { data, mime_type }
    }
}

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp-image-generation";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        check_env_file(dotenvy::dotenv())?;

        Ok(Self {
            api_key: std::env::var("GEMINI_API_KEY")
                .map_err(|_| crate::Error::Config("GEMINI_API_KEY not set".to_string()))?,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            connect_timeout: duration_from_env(
                "GEMINI_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
            read_timeout: duration_from_env("GEMINI_READ_TIMEOUT_SECS", DEFAULT_READ_TIMEOUT_SECS)?,
        })
    }
}

/// A missing `.env` is fine; one that fails to parse is not.
fn check_env_file<T>(loaded: dotenvy::Result<T>) -> crate::Result<()> {
    match loaded {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn duration_from_env(key: &str, default_secs: u64) -> crate::Result<Duration> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| crate::Error::Config(format!("{} must be a whole number of seconds", key))),
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}
