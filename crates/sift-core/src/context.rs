use serde_json::{Map, Value};

use crate::error::AppError;
use crate::resolver::SchemaRef;

/// Context slot read for a per-request schema override.
pub const LLM_RESPONSE_MODEL_KEY: &str = "llm_response_model";
/// Context slot the pipeline writes its result to.
pub const LLM_EXTRACTED_DATA_KEY: &str = "llm_extracted_data";

/// State attached to one in-flight request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub url: String,
    pub meta: Map<String, Value>,
}

impl RequestContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            meta: Map::new(),
        }
    }

    /// Override the schema for this request with a registry path or an
    /// inline descriptor object.
    pub fn with_schema(mut self, schema: impl Into<Value>) -> Self {
        self.meta.insert(LLM_RESPONSE_MODEL_KEY.to_string(), schema.into());
        self
    }

    pub fn schema_override(&self) -> Result<Option<SchemaRef>, AppError> {
        match self.meta.get(LLM_RESPONSE_MODEL_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => SchemaRef::from_meta(value).map(Some),
        }
    }

    /// Result written by the pipeline, if it ran.
    pub fn extracted_data(&self) -> Option<&Value> {
        self.meta.get(LLM_EXTRACTED_DATA_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_override_by_default() {
        let ctx = RequestContext::new("https://housing.example.edu");
        assert!(ctx.schema_override().unwrap().is_none());
        assert!(ctx.extracted_data().is_none());
    }

    #[test]
    fn test_path_override() {
        let ctx = RequestContext::new("https://housing.example.edu")
            .with_schema("dorm_capacity.CapacityInfo");
        assert!(matches!(
            ctx.schema_override().unwrap(),
            Some(SchemaRef::Path(p)) if p == "dorm_capacity.CapacityInfo"
        ));
    }

    #[test]
    fn test_invalid_override() {
        let ctx = RequestContext::new("https://housing.example.edu").with_schema(json!([1]));
        assert!(ctx.schema_override().is_err());
    }
}
