//! Speech-to-text collaborator.
//!
//! The pipeline only needs ordered word timestamps for an audio file. The
//! production implementation calls Deepgram's prerecorded REST endpoint.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, info};

use slidecut_models::{normalize_words, Word};

use crate::config::TranscriberConfig;
use crate::error::{WorkerError, WorkerResult};

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Word timestamps for `audio`, ordered by start time. An empty
    /// transcript is an error.
    async fn transcribe(&self, audio: &Path) -> WorkerResult<Vec<Word>>;
}

#[derive(Debug, Deserialize)]
struct DeepgramResponse {
    results: Option<DeepgramResults>,
}

#[derive(Debug, Deserialize)]
struct DeepgramResults {
    #[serde(default)]
    channels: Vec<DeepgramChannel>,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    #[serde(default)]
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    #[serde(default)]
    words: Vec<DeepgramWord>,
}

#[derive(Debug, Deserialize)]
struct DeepgramWord {
    word: String,
    punctuated_word: Option<String>,
    start: f64,
    end: f64,
    #[serde(default)]
    confidence: f64,
}

impl From<DeepgramWord> for Word {
    fn from(w: DeepgramWord) -> Self {
        Word::new(w.punctuated_word.unwrap_or(w.word), w.start, w.end, w.confidence)
    }
}

/// Deepgram prerecorded transcription client.
#[derive(Debug, Clone)]
pub struct DeepgramTranscriber {
    client: reqwest::Client,
    config: TranscriberConfig,
}

impl DeepgramTranscriber {
    pub fn new(config: TranscriberConfig) -> WorkerResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(WorkerError::config_error("DEEPGRAM_API_KEY is not set"));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/listen", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn transcribe(&self, audio: &Path) -> WorkerResult<Vec<Word>> {
        let body = tokio::fs::read(audio).await.map_err(|e| {
            WorkerError::transcription_failed(format!("cannot read {}: {}", audio.display(), e))
        })?;
        debug!(audio = %audio.display(), bytes = body.len(), "Sending audio for transcription");

        let mut query: Vec<(&str, &str)> = vec![
            ("model", self.config.model.as_str()),
            ("smart_format", "true"),
            ("punctuate", "true"),
        ];
        if let Some(language) = self.config.language.as_deref() {
            query.push(("language", language));
        }

        let response = self
            .client
            .post(self.endpoint())
            .query(&query)
            .header(AUTHORIZATION, format!("Token {}", self.config.api_key))
            .header(CONTENT_TYPE, "audio/wav")
            .body(body)
            .send()
            .await
            .map_err(|e| WorkerError::transcription_failed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WorkerError::transcription_failed(format!(
                "provider returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: DeepgramResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::transcription_failed(format!("bad response: {}", e)))?;

        let words: Vec<Word> = parsed
            .results
            .and_then(|r| r.channels.into_iter().next())
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.words.into_iter().map(Word::from).collect())
            .unwrap_or_default();

        if words.is_empty() {
            return Err(WorkerError::transcription_failed(
                "no words returned from transcription",
            ));
        }

        info!(audio = %audio.display(), words = words.len(), "Transcribed audio");
        Ok(normalize_words(words))
    }
}
