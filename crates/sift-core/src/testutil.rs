//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::traits::{Cleaner, CompletionProvider, CompletionRequest, Fetcher};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns queued responses.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    pub urls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.urls.lock().unwrap().push(url.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

/// Mock cleaner that returns the input unchanged and records it.
#[derive(Clone, Default)]
pub struct MockCleaner {
    pub inputs: Arc<Mutex<Vec<String>>>,
}

impl MockCleaner {
    pub fn passthrough() -> Self {
        Self::default()
    }
}

impl Cleaner for MockCleaner {
    fn clean(&self, html: &str) -> String {
        self.inputs.lock().unwrap().push(html.to_string());
        html.to_string()
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Owned copy of a [`CompletionRequest`] seen by [`MockProvider`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model_id: String,
    pub api_base: String,
    pub temperature: f32,
    pub system_message: String,
    pub user_message: String,
    pub schema_name: String,
}

/// Mock completion provider returning queued results.
#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Result<Vec<serde_json::Value>, AppError>>>>,
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockProvider {
    /// Provider answering every call with `instances`.
    pub fn new(instances: Vec<serde_json::Value>) -> Self {
        Self::with_responses(vec![Ok(instances)])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    /// One queued result per call; an empty queue answers with no records.
    pub fn with_responses(responses: Vec<Result<Vec<serde_json::Value>, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl CompletionProvider for MockProvider {
    async fn complete(
        &self,
        request: &CompletionRequest<'_>,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model_id: request.model_id.to_string(),
            api_base: request.api_base.to_string(),
            temperature: request.temperature,
            system_message: request.system_message.to_string(),
            user_message: request.user_message.to_string(),
            schema_name: request.schema.name.clone(),
        });

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Vec::new())
        } else {
            responses.remove(0)
        }
    }
}
