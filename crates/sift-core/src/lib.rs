pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod flatten;
pub mod models;
pub mod pipeline;
pub mod resolver;
pub mod schema;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{ExtractionConfig, Settings};
pub use context::{LLM_EXTRACTED_DATA_KEY, LLM_RESPONSE_MODEL_KEY, RequestContext};
pub use error::AppError;
pub use extractor::Extractor;
pub use flatten::{FlattenMode, Flattener};
pub use models::{ExtractedData, FlatRecord, RawExtractedRecord};
pub use pipeline::Pipeline;
pub use resolver::{SchemaRef, SchemaRegistry, SchemaResolver};
pub use schema::{FieldDescriptor, FieldType, RecordSchema};
pub use traits::{Cleaner, CompletionProvider, CompletionRequest, Fetcher};
