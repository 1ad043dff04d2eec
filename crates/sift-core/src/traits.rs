use std::future::Future;

use crate::error::AppError;
use crate::schema::RecordSchema;

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Converts raw HTML into plain text for a prompt.
///
/// Cleaning is best-effort: malformed markup degrades the output, it never
/// fails.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> String;
}

/// One schema-guided completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model_id: &'a str,
    pub api_base: &'a str,
    pub temperature: f32,
    pub system_message: &'a str,
    pub user_message: &'a str,
    pub schema: &'a RecordSchema,
}

/// Language-model completion endpoint constrained to a record schema.
pub trait CompletionProvider: Send + Sync + Clone {
    /// Returns zero or more raw instances of `request.schema`, not yet
    /// validated against it.
    fn complete(
        &self,
        request: &CompletionRequest<'_>,
    ) -> impl Future<Output = Result<Vec<serde_json::Value>, AppError>> + Send;
}
