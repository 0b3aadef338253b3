use crate::context::ExtractionContext;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("extraction service returned HTTP {0}")]
    Status(u16),
    #[error("extraction response was not JSON: {0}")]
    Malformed(String),
    #[error("extraction response contained no content")]
    EmptyResponse,
    #[error("missing api key: {0}")]
    ApiKey(String),
}

/// Seam for the extraction capability. Implementations return the model's
/// raw candidate-task JSON; callers own validation and resolution.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        transcript: &str,
        context: &ExtractionContext,
    ) -> Result<Value, ExtractError>;
}

/// Returns pre-loaded responses in sequence. Panics when exhausted, which in
/// a test means the pipeline called extraction more times than expected.
pub struct CannedExtractor {
    responses: Vec<Value>,
    calls: AtomicUsize,
}

impl CannedExtractor {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn single(response: Value) -> Self {
        Self::new(vec![response])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for CannedExtractor {
    async fn extract(
        &self,
        _transcript: &str,
        _context: &ExtractionContext,
    ) -> Result<Value, ExtractError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses[n].clone())
    }
}

/// Always fails with the configured error, for exercising fatal paths.
pub struct FailingExtractor {
    status: Option<u16>,
}

impl FailingExtractor {
    pub fn transport() -> Self {
        Self { status: None }
    }

    pub fn status(code: u16) -> Self {
        Self { status: Some(code) }
    }
}

#[async_trait]
impl Extractor for FailingExtractor {
    async fn extract(
        &self,
        _transcript: &str,
        _context: &ExtractionContext,
    ) -> Result<Value, ExtractError> {
        match self.status {
            Some(code) => Err(ExtractError::Status(code)),
            None => Err(ExtractError::Transport("connection refused".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_context() -> ExtractionContext {
        ExtractionContext {
            participants: vec![],
            patients: vec![],
            categories: vec![],
        }
    }

    #[tokio::test]
    async fn canned_extractor_replays_in_order() {
        let extractor = CannedExtractor::new(vec![json!({"a": 1}), json!({"b": 2})]);
        let first = extractor.extract("t", &empty_context()).await.unwrap();
        let second = extractor.extract("t", &empty_context()).await.unwrap();
        assert_eq!(first["a"], 1);
        assert_eq!(second["b"], 2);
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn failing_extractor_reports_status() {
        let extractor = FailingExtractor::status(503);
        let err = extractor.extract("t", &empty_context()).await.unwrap_err();
        assert!(matches!(err, ExtractError::Status(503)));
    }
}
