//! Test utilities for mathroute-core.
//!
//! Mock collaborators with call counters, a tiny inline tokenizer and a
//! one-shot local HTTP server. Only compiled when running tests.

use crate::embedding::{TextEncoder, TokenizerHandle};
use crate::error::{EmbeddingError, GenerationError, SearchError};
use crate::generation::{GenerationRequest, Generator};
use crate::index::{CollectionInfo, IndexHit, VectorIndex};
use crate::lookup::LookupClient;
use crate::retriever::Retriever;
use crate::types::{LookupResult, RetrievedMatch};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Word-level tokenizer over a five-word vocabulary:
/// `[UNK]`=0, `what`=1, `is`=2, `two`=3, `plus`=4.
const TEST_TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": {"type": "Whitespace"},
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {"[UNK]": 0, "what": 1, "is": 2, "two": 3, "plus": 4},
    "unk_token": "[UNK]"
  }
}"#;

/// Creates a TokenizerHandle over the inline test vocabulary.
///
/// # Panics
///
/// Panics if the inline tokenizer JSON cannot be parsed.
pub fn test_tokenizer_handle(max_length: usize) -> TokenizerHandle {
    TokenizerHandle::from_bytes(TEST_TOKENIZER_JSON.as_bytes().to_vec(), max_length)
        .expect("Failed to create TokenizerHandle")
}

/// Same vocabulary, but the file asks for fixed padding to 8 tokens the way
/// published sentence-transformer tokenizers do.
pub fn padded_tokenizer_handle(max_length: usize) -> TokenizerHandle {
    let mut json: serde_json::Value =
        serde_json::from_str(TEST_TOKENIZER_JSON).expect("Invalid test tokenizer JSON");
    json["padding"] = serde_json::json!({
        "strategy": {"Fixed": 8},
        "direction": "Right",
        "pad_to_multiple_of": null,
        "pad_id": 0,
        "pad_type_id": 0,
        "pad_token": "[PAD]"
    });
    let bytes = serde_json::to_vec(&json).expect("Failed to serialize tokenizer JSON");
    TokenizerHandle::from_bytes(bytes, max_length).expect("Failed to create TokenizerHandle")
}

/// Knowledge-base payload for a problem.
pub fn hit(problem: &str, score: Option<f32>) -> IndexHit {
    IndexHit {
        id: problem.to_string(),
        score,
        payload: HashMap::from([
            ("problem".to_string(), problem.to_string()),
            ("solution".to_string(), format!("solution of {}", problem)),
            ("level".to_string(), "Level 1".to_string()),
            ("type".to_string(), "Algebra".to_string()),
        ]),
    }
}

pub fn retrieved(problem: &str, score: f32) -> RetrievedMatch {
    RetrievedMatch {
        problem: problem.to_string(),
        solution: format!("solution of {}", problem),
        level: "Level 1".to_string(),
        topic: "Algebra".to_string(),
        score,
    }
}

/// Deterministic byte-histogram encoder.
pub struct StubEncoder {
    dimension: usize,
}

impl StubEncoder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl TextEncoder for StubEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0; self.dimension];
        for b in text.bytes() {
            v[b as usize % self.dimension] += 1.0;
        }
        Ok(v)
    }
}

/// Index returning a fixed hit list regardless of the query vector.
pub struct StaticIndex {
    hits: Vec<IndexHit>,
    reachable: bool,
}

impl StaticIndex {
    pub fn new(hits: Vec<IndexHit>) -> Self {
        Self {
            hits,
            reachable: true,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            hits: Vec::new(),
            reachable: false,
        }
    }
}

#[async_trait]
impl VectorIndex for StaticIndex {
    async fn search(&self, _vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, SearchError> {
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }

    async fn collection_info(&self) -> Result<CollectionInfo, SearchError> {
        if !self.reachable {
            return Err(SearchError::Unavailable("connection refused".to_string()));
        }
        Ok(CollectionInfo {
            point_count: self.hits.len() as u64,
        })
    }
}

/// Retriever returning canned matches (or an error) and recording calls.
pub struct MockRetriever {
    result: Result<Vec<RetrievedMatch>, SearchError>,
    pub calls: AtomicUsize,
    pub last_limits: Mutex<Option<(usize, f32)>>,
}

impl MockRetriever {
    pub fn returning(matches: Vec<RetrievedMatch>) -> Self {
        Self {
            result: Ok(matches),
            calls: AtomicUsize::new(0),
            last_limits: Mutex::new(None),
        }
    }

    pub fn failing(error: SearchError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
            last_limits: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn search(
        &self,
        _query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedMatch>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_limits.lock().unwrap() = Some((top_k, threshold));
        self.result.clone()
    }
}

/// Lookup replaying a script of results; the last one repeats.
pub struct ScriptedLookup {
    script: Mutex<Vec<LookupResult>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedLookup {
    pub fn new(script: Vec<LookupResult>) -> Self {
        assert!(!script.is_empty(), "script must not be empty");
        let mut script = script;
        script.reverse();
        Self {
            script: Mutex::new(script),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn repeating(result: LookupResult) -> Self {
        Self::new(vec![result])
    }

    /// Shared call counter, usable after the lookup is moved into a wrapper.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl LookupClient for ScriptedLookup {
    async fn lookup(&self, _query: &str) -> LookupResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop().unwrap()
        } else {
            script[0].clone()
        }
    }
}

/// Generator answering with fixed text (or failing) and recording requests.
pub struct MockGenerator {
    result: Result<String, GenerationError>,
    pub calls: AtomicUsize,
    last: Mutex<Option<GenerationRequest>>,
}

impl MockGenerator {
    pub fn answering(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn failing(error: GenerationError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request.clone());
        self.result.clone()
    }
}

/// Serves exactly one HTTP response on a local port.
///
/// Returns the base url and a handle resolving to the request line
/// (e.g. `GET /?i=1%2B1 HTTP/1.1`).
pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let body = body.to_string();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {} Stub\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request.lines().next().unwrap_or_default().to_string()
    });

    (url, handle)
}

/// Reads headers and any Content-Length body from a raw HTTP request.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// A local url nothing is listening on.
pub async fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
