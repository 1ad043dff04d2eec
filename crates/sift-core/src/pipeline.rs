use std::sync::Arc;

use crate::config::ExtractionConfig;
use crate::context::{LLM_EXTRACTED_DATA_KEY, RequestContext};
use crate::error::AppError;
use crate::extractor::Extractor;
use crate::flatten::Flattener;
use crate::models::ExtractedData;
use crate::resolver::{SchemaRef, SchemaResolver};
use crate::schema::RecordSchema;
use crate::traits::{Cleaner, CompletionProvider};

/// Per-page processing: clean → resolve → extract → flatten → attach.
///
/// Generic over the cleaner and completion provider so tests run without
/// real HTML parsing or LLM calls. Holds no mutable state; one instance
/// serves any number of concurrent requests.
pub struct Pipeline<C, P>
where
    C: Cleaner,
    P: CompletionProvider,
{
    cleaner: C,
    extractor: Extractor<P>,
    resolver: SchemaResolver,
    config: Arc<ExtractionConfig>,
    flattener: Flattener,
}

impl<C, P> Pipeline<C, P>
where
    C: Cleaner,
    P: CompletionProvider,
{
    pub fn new(cleaner: C, provider: P, resolver: SchemaResolver, config: ExtractionConfig) -> Self {
        let flattener = Flattener::new(config.flatten_mode);
        Self {
            cleaner,
            extractor: Extractor::new(provider),
            resolver,
            config: Arc::new(config),
            flattener,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Schema for this request: its own override, else the crawl schema
    /// (source or global tier).
    ///
    /// Fails with `SchemaNotConfigured` when neither is present.
    pub fn schema_for(&self, ctx: &RequestContext) -> Result<Arc<RecordSchema>, AppError> {
        let request = ctx.schema_override()?;
        let crawl = self.config.schema.clone().map(SchemaRef::Handle);
        self.resolver.resolve(request.as_ref(), crawl.as_ref(), None)
    }

    /// Run the pipeline for one fetched page.
    ///
    /// The result is returned and also written to
    /// `ctx.meta["llm_extracted_data"]`. With `unwrap_nested` disabled the
    /// extracted records pass through unchanged as a list.
    pub async fn process(
        &self,
        html: &str,
        ctx: &mut RequestContext,
    ) -> Result<ExtractedData, AppError> {
        // 1. Clean
        let text = self.cleaner.clean(html);
        tracing::info!(
            url = %ctx.url,
            "Cleaned {} bytes of HTML to {} bytes of text ({}% reduction)",
            html.len(),
            text.len(),
            if html.is_empty() {
                0
            } else {
                100 - (text.len() * 100 / html.len()).min(100)
            }
        );

        // 2. Resolve
        let schema = self.schema_for(ctx)?;

        // 3. Extract
        let records = self
            .extractor
            .extract(&text, &schema, &self.config, &ctx.url)
            .await?;

        // 4. Flatten
        let data = if self.config.unwrap_nested {
            self.flattener.flatten(records)
        } else {
            ExtractedData::Many(records)
        };

        // 5. Attach
        ctx.meta
            .insert(LLM_EXTRACTED_DATA_KEY.to_string(), data.to_value());

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::resolver::SchemaRegistry;
    use crate::schema::FieldType;
    use crate::testutil::{MockCleaner, MockProvider};
    use serde_json::json;

    fn resolver() -> SchemaResolver {
        SchemaResolver::new(SchemaRegistry::with_builtin())
    }

    fn config(unwrap_nested: bool) -> ExtractionConfig {
        let mut config = ExtractionConfig::new(Arc::new(catalog::dorm_item()));
        config.unwrap_nested = unwrap_nested;
        config
    }

    #[tokio::test]
    async fn flattens_and_attaches_result() {
        let provider = MockProvider::new(vec![json!({
            "name": "Maple Hall",
            "capacity": {"n_person": 420, "n_floor": 6}
        })]);
        let pipeline = Pipeline::new(MockCleaner::passthrough(), provider, resolver(), config(true));
        let mut ctx = RequestContext::new("https://housing.example.edu/maple");

        let data = pipeline.process("<p>Maple Hall</p>", &mut ctx).await.unwrap();

        let ExtractedData::One(record) = &data else {
            panic!("expected a single record, got {data:?}");
        };
        assert_eq!(record["name"], json!("Maple Hall"));
        assert_eq!(record["n_person"], json!(420));
        assert_eq!(record["n_unit"], json!(null));
        assert!(!record.contains_key("capacity"));
        assert_eq!(ctx.extracted_data(), Some(&data.to_value()));
    }

    #[tokio::test]
    async fn unwrap_disabled_passes_records_through() {
        let instance = json!({"name": "Maple Hall", "capacity": {"n_person": 420}});
        let pipeline = Pipeline::new(
            MockCleaner::passthrough(),
            MockProvider::new(vec![instance]),
            resolver(),
            config(false),
        );
        let mut ctx = RequestContext::new("https://housing.example.edu/maple");

        let data = pipeline.process("<p>x</p>", &mut ctx).await.unwrap();

        let ExtractedData::Many(records) = data else {
            panic!("expected the raw list");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["capacity"]["n_person"], json!(420));
    }

    #[tokio::test]
    async fn request_override_selects_schema() {
        let provider = MockProvider::new(vec![json!({"n_person": 12})]);
        let pipeline = Pipeline::new(
            MockCleaner::passthrough(),
            provider.clone(),
            resolver(),
            config(true),
        );
        let mut ctx = RequestContext::new("https://housing.example.edu/cap")
            .with_schema(catalog::CAPACITY_INFO);

        let data = pipeline.process("<p>12 people</p>", &mut ctx).await.unwrap();

        assert_eq!(provider.calls.lock().unwrap()[0].schema_name, "CapacityInfo");
        assert_eq!(data.into_records()[0]["n_person"], json!(12));
    }

    #[tokio::test]
    async fn inline_override_selects_schema() {
        let provider = MockProvider::new(vec![json!({"title": "Loft"})]);
        let pipeline = Pipeline::new(
            MockCleaner::passthrough(),
            provider.clone(),
            resolver(),
            config(true),
        );
        let inline = serde_json::to_value(
            RecordSchema::new("Listing").required("title", FieldType::String),
        )
        .unwrap();
        let mut ctx = RequestContext::new("https://rent.example").with_schema(inline);

        pipeline.process("<p>Loft</p>", &mut ctx).await.unwrap();

        assert_eq!(provider.calls.lock().unwrap()[0].schema_name, "Listing");
    }

    #[tokio::test]
    async fn unknown_override_fails_before_extraction() {
        let provider = MockProvider::new(vec![]);
        let pipeline = Pipeline::new(
            MockCleaner::passthrough(),
            provider.clone(),
            resolver(),
            config(true),
        );
        let mut ctx = RequestContext::new("https://a.example").with_schema("campus.Housing");

        let err = pipeline.process("<p>x</p>", &mut ctx).await.unwrap_err();

        assert!(matches!(err, AppError::UnknownSchema(_)));
        assert!(provider.calls.lock().unwrap().is_empty());
        assert!(ctx.extracted_data().is_none());
    }

    #[tokio::test]
    async fn request_schema_suffices_without_crawl_schema() {
        let provider = MockProvider::new(vec![json!({"n_person": 30})]);
        let pipeline = Pipeline::new(
            MockCleaner::passthrough(),
            provider.clone(),
            resolver(),
            ExtractionConfig::without_schema(),
        );
        let mut ctx = RequestContext::new("https://housing.example.edu/cap")
            .with_schema(catalog::CAPACITY_INFO);

        let data = pipeline.process("<p>30 people</p>", &mut ctx).await.unwrap();

        assert_eq!(provider.calls.lock().unwrap()[0].schema_name, "CapacityInfo");
        assert_eq!(data.into_records()[0]["n_person"], json!(30));
    }

    #[tokio::test]
    async fn no_schema_anywhere_fails_before_extraction() {
        let provider = MockProvider::new(vec![]);
        let pipeline = Pipeline::new(
            MockCleaner::passthrough(),
            provider.clone(),
            resolver(),
            ExtractionConfig::without_schema(),
        );
        let mut ctx = RequestContext::new("https://a.example");

        let err = pipeline.process("<p>x</p>", &mut ctx).await.unwrap_err();

        assert!(matches!(err, AppError::SchemaNotConfigured));
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extraction_error_leaves_context_untouched() {
        let pipeline = Pipeline::new(
            MockCleaner::passthrough(),
            MockProvider::with_error(AppError::Timeout(120)),
            resolver(),
            config(true),
        );
        let mut ctx = RequestContext::new("https://a.example");

        let err = pipeline.process("<p>x</p>", &mut ctx).await.unwrap_err();

        assert!(matches!(err, AppError::ExtractionFailed { .. }));
        assert!(err.is_retryable());
        assert!(ctx.extracted_data().is_none());
    }

    #[tokio::test]
    async fn cleaned_text_reaches_provider() {
        let cleaner = MockCleaner::passthrough();
        let provider = MockProvider::new(vec![]);
        let pipeline = Pipeline::new(cleaner.clone(), provider.clone(), resolver(), config(true));
        let mut ctx = RequestContext::new("https://a.example");

        let data = pipeline.process("<p>hello</p>", &mut ctx).await.unwrap();

        assert!(data.is_empty());
        assert_eq!(*cleaner.inputs.lock().unwrap(), vec!["<p>hello</p>".to_string()]);
        assert_eq!(provider.calls.lock().unwrap()[0].user_message, "<p>hello</p>");
        assert_eq!(ctx.extracted_data(), Some(&json!([])));
    }
}
