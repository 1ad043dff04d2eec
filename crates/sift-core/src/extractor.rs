use crate::config::ExtractionConfig;
use crate::error::AppError;
use crate::models::RawExtractedRecord;
use crate::schema::RecordSchema;
use crate::traits::{CompletionProvider, CompletionRequest};

/// Issues one schema-guided completion per page and validates the output.
#[derive(Clone)]
pub struct Extractor<P: CompletionProvider> {
    provider: P,
}

impl<P: CompletionProvider> Extractor<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Extract zero or more records of `schema` from cleaned page text.
    ///
    /// Every failure (transport, provider rejection, unparseable or
    /// non-conforming output) is returned as [`AppError::ExtractionFailed`]
    /// carrying `url`. No retries.
    pub async fn extract(
        &self,
        text: &str,
        schema: &RecordSchema,
        config: &ExtractionConfig,
        url: &str,
    ) -> Result<Vec<RawExtractedRecord>, AppError> {
        let system_message = config.system_prompt(url);
        let request = CompletionRequest {
            model_id: &config.model_id,
            api_base: &config.api_base,
            temperature: config.temperature,
            system_message: &system_message,
            user_message: text,
            schema,
        };

        tracing::info!(%url, model = %config.model_id, schema = %schema.name, "Extracting");

        let instances = self
            .provider
            .complete(&request)
            .await
            .map_err(|e| AppError::extraction_failed(url, e))?;

        let records = instances
            .iter()
            .map(|instance| schema.validate(instance))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::extraction_failed(url, e))?;

        if let Some(field) = schema.identifying_field() {
            let ids: Vec<&str> = records
                .iter()
                .filter_map(|r| r.get(field).and_then(|v| v.as_str()))
                .collect();
            tracing::info!(%url, records = records.len(), ?ids, "Extraction complete");
        } else {
            tracing::info!(%url, records = records.len(), "Extraction complete");
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog;
    use crate::schema::FieldType;
    use crate::testutil::MockProvider;
    use serde_json::json;

    fn config() -> ExtractionConfig {
        let mut config = ExtractionConfig::new(Arc::new(catalog::dorm_item()));
        config.system_message = "Extract from {url}".into();
        config.model_id = "test-model".into();
        config
    }

    #[tokio::test]
    async fn returns_validated_records() {
        let provider = MockProvider::new(vec![
            json!({"name": "Maple Hall", "capacity": {"n_person": 420}}),
            json!({"name": "Oak Hall"}),
        ]);
        let extractor = Extractor::new(provider.clone());

        let records = extractor
            .extract("text", &catalog::dorm_item(), &config(), "https://a.example")
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["capacity"]["n_person"], json!(420));
        assert_eq!(records[1]["telephone"], json!(null));
    }

    #[tokio::test]
    async fn sends_composed_request() {
        let provider = MockProvider::new(vec![]);
        let extractor = Extractor::new(provider.clone());

        extractor
            .extract("page text", &catalog::dorm_item(), &config(), "https://a.example")
            .await
            .unwrap();

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system_message, "Extract from https://a.example");
        assert_eq!(calls[0].user_message, "page text");
        assert_eq!(calls[0].model_id, "test-model");
        assert_eq!(calls[0].schema_name, "DormItem");
    }

    #[tokio::test]
    async fn empty_output_is_not_an_error() {
        let extractor = Extractor::new(MockProvider::new(vec![]));
        let records = extractor
            .extract("nothing here", &catalog::dorm_item(), &config(), "https://a.example")
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn provider_error_is_wrapped() {
        let extractor = Extractor::new(MockProvider::with_error(AppError::LlmError {
            message: "overloaded".into(),
            status_code: 503,
            retryable: true,
        }));

        let err = extractor
            .extract("text", &catalog::dorm_item(), &config(), "https://a.example")
            .await
            .unwrap_err();

        match err {
            AppError::ExtractionFailed { url, source } => {
                assert_eq!(url, "https://a.example");
                assert!(matches!(*source, AppError::LlmError { status_code: 503, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_conforming_output_is_wrapped() {
        let schema = RecordSchema::new("Listing").required("title", FieldType::String);
        let extractor = Extractor::new(MockProvider::new(vec![json!({"beds": 2})]));

        let err = extractor
            .extract("text", &schema, &config(), "https://b.example")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::ExtractionFailed { ref source, .. }
                if matches!(**source, AppError::SchemaValidationError(_))
        ));
    }
}
