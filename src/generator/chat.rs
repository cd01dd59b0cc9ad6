//! Streaming client for OpenAI-compatible chat-completions APIs.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, SiteForgeError};
use crate::generator::{ContentGenerator, FragmentStream};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a web designer. Answer with a single complete \
HTML document, styles and scripts inline, and nothing else: no markdown fences, no commentary.";

/// Settings for [`ChatCompletionGenerator`].
#[derive(Clone)]
pub struct ChatSettings {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    max_connections: Option<usize>,
    system_prompt: String,
}

impl ChatSettings {
    /// Settings for the DeepSeek API: `deepseek-chat` at
    /// `https://api.deepseek.com/v1`, 20 s read timeout, no connection cap.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            timeout: Duration::from_secs(20),
            max_connections: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Root of the API; `chat/completions` is appended to it.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Longest silence tolerated between two reads of the response.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap on concurrently open generations. Must be at least 1.
    pub fn max_connections(mut self, max: Option<usize>) -> Result<Self> {
        if max == Some(0) {
            return Err(SiteForgeError::Config(
                "generator max connections must be at least 1".into(),
            ));
        }
        self.max_connections = max;
        Ok(self)
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

impl fmt::Debug for ChatSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSettings")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

/// [`ContentGenerator`] that streams a chat completion and yields each
/// content delta as one fragment.
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    endpoint: Url,
    settings: ChatSettings,
    permits: Option<Arc<Semaphore>>,
}

impl ChatCompletionGenerator {
    /// Validate `settings` and build the HTTP client.
    pub fn new(settings: ChatSettings) -> Result<Self> {
        let mut base = Url::parse(&settings.base_url)
            .map_err(|e| SiteForgeError::Config(format!("invalid generator url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(SiteForgeError::Config(format!(
                "generator url {base} cannot hold a path"
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("chat/completions")
            .map_err(|e| SiteForgeError::Config(format!("invalid generator url: {e}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.timeout)
            .read_timeout(settings.timeout)
            .build()
            .map_err(|e| SiteForgeError::Config(format!("generator client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            permits: settings.max_connections.map(|n| Arc::new(Semaphore::new(n))),
            settings,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

impl ContentGenerator for ChatCompletionGenerator {
    async fn generate(&self, prompt: &str) -> Result<FragmentStream> {
        let permit = match &self.permits {
            Some(permits) => Some(
                permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| SiteForgeError::Generation(Box::new(e)))?,
            ),
            None => None,
        };

        let request = ChatRequest {
            model: &self.settings.model,
            stream: true,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.settings.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SiteForgeError::Generation(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SiteForgeError::Generation(
                format!("chat completions returned {status}: {body}").into(),
            ));
        }

        let state = ChatStream {
            upstream: response.bytes_stream().boxed(),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            failed: None,
            done: false,
            _permit: permit,
        };

        Ok(futures::stream::unfold(state, |mut state| async move {
            let item = state.next_item().await?;
            Some((item, state))
        })
        .boxed())
    }
}

struct ChatStream {
    upstream: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Bytes>,
    failed: Option<SiteForgeError>,
    done: bool,
    _permit: Option<OwnedSemaphorePermit>,
}

impl ChatStream {
    /// Next fragment in production order. An error is held back until every
    /// fragment decoded before it has been yielded, and ends the stream.
    async fn next_item(&mut self) -> Option<Result<Bytes>> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Some(Ok(fragment));
            }
            if let Some(e) = self.failed.take() {
                return Some(Err(e));
            }
            if self.done {
                return None;
            }
            match self.upstream.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = self.ingest(&chunk) {
                        self.failed = Some(e);
                        self.done = true;
                    }
                }
                Some(Err(e)) => {
                    self.failed = Some(SiteForgeError::Generation(Box::new(e)));
                    self.done = true;
                }
                None => self.done = true,
            }
        }
    }

    fn ingest(&mut self, chunk: &[u8]) -> Result<()> {
        for data in self.decoder.push(chunk) {
            if data == "[DONE]" {
                self.done = true;
                break;
            }
            let parsed: ChatChunk = serde_json::from_str(&data)
                .map_err(|e| SiteForgeError::Generation(Box::new(e)))?;
            for choice in parsed.choices {
                if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                    self.pending.push_back(Bytes::from(content));
                }
            }
        }
        Ok(())
    }
}

/// Splits a Server-Sent Events byte stream into `data:` payloads.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes; returns the payloads of every line completed by them.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        assert_eq!(decoder.push(b"1}\n\n"), vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn decoder_skips_comments_and_crlf() {
        let mut decoder = SseDecoder::default();
        let payloads = decoder.push(b": keep-alive\r\ndata: one\r\n\r\ndata:two\n");
        assert_eq!(payloads, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn decoder_keeps_multibyte_chars_across_chunks() {
        let mut decoder = SseDecoder::default();
        let line = "data: привет\n".as_bytes();
        let (head, tail) = line.split_at(7);
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["привет".to_string()]);
    }

    fn chat_stream(chunks: Vec<&'static str>) -> ChatStream {
        let upstream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, reqwest::Error>(Bytes::from_static(c.as_bytes()))),
        );
        ChatStream {
            upstream: upstream.boxed(),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            failed: None,
            done: false,
            _permit: None,
        }
    }

    #[test]
    fn ingest_collects_deltas_until_done() {
        let mut stream = chat_stream(vec![]);
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"<html>\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"</html>\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        );
        stream.ingest(body.as_bytes()).unwrap();
        assert!(stream.done);
        let fragments: Vec<_> = stream.pending.into_iter().collect();
        assert_eq!(
            fragments,
            vec![Bytes::from_static(b"<html>"), Bytes::from_static(b"</html>")]
        );
    }

    #[test]
    fn ingest_rejects_malformed_payload() {
        let mut stream = chat_stream(vec![]);
        let err = stream.ingest(b"data: {not json\n").unwrap_err();
        assert!(matches!(err, SiteForgeError::Generation(_)));
    }

    #[tokio::test]
    async fn decode_error_follows_fragments_of_same_chunk() {
        let mut stream = chat_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"<html>\"}}]}\n\ndata: {broken\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
        ]);

        let first = stream.next_item().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"<html>"));
        assert!(matches!(
            stream.next_item().await,
            Some(Err(SiteForgeError::Generation(_)))
        ));
        assert!(stream.next_item().await.is_none());
    }

    #[tokio::test]
    async fn next_item_yields_deltas_across_chunks() {
        let mut stream = chat_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\"b\"}}]}\n\ndata: [DONE]\n\n",
        ]);
        let mut fragments = Vec::new();
        while let Some(item) = stream.next_item().await {
            fragments.push(item.unwrap());
        }
        assert_eq!(fragments, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    }

    #[test]
    fn settings_normalize_base_url() {
        let settings = ChatSettings::new("key").base_url("http://localhost:8080/v1");
        let generator = ChatCompletionGenerator::new(settings).unwrap();
        assert_eq!(
            generator.endpoint.as_str(),
            "http://localhost:8080/v1/chat/completions"
        );
        assert!(ChatSettings::new("key").max_connections(Some(0)).is_err());
        assert!(ChatCompletionGenerator::new(ChatSettings::new("key").base_url("nope")).is_err());
    }
}
