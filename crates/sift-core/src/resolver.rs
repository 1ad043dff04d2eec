use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::catalog;
use crate::error::AppError;
use crate::schema::RecordSchema;

type SchemaFactory = Arc<dyn Fn() -> RecordSchema + Send + Sync>;

/// Registry of schemas addressable by dotted path (e.g. `dorm_capacity.DormItem`).
///
/// Populated by explicit registration at startup.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    factories: BTreeMap<String, SchemaFactory>,
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("schemas", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in catalog already registered.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register(catalog::DORM_ITEM, catalog::dorm_item)
            .register(catalog::CAPACITY_INFO, catalog::capacity_info);
        registry
    }

    /// Register a schema factory under `path`, replacing any previous entry.
    pub fn register<F>(&mut self, path: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> RecordSchema + Send + Sync + 'static,
    {
        self.factories.insert(path.into(), Arc::new(factory));
        self
    }

    /// Register a ready-made schema under its own name.
    pub fn register_schema(&mut self, schema: RecordSchema) -> &mut Self {
        let name = schema.name.clone();
        self.register(name, move || schema.clone())
    }

    /// Load a JSON schema descriptor and register it under its `name`.
    ///
    /// Returns the registered path.
    pub fn register_file(&mut self, path: &Path) -> Result<String, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read schema file {}: {e}",
                path.display()
            ))
        })?;

        let schema: RecordSchema = serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(format!(
                "Invalid schema descriptor in {}: {e}",
                path.display()
            ))
        })?;

        if schema.name.trim().is_empty() {
            return Err(AppError::ConfigError(format!(
                "Schema descriptor {} has an empty name",
                path.display()
            )));
        }

        let name = schema.name.clone();
        self.register_schema(schema);
        tracing::debug!(schema = %name, file = %path.display(), "Registered schema file");
        Ok(name)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.factories.contains_key(path)
    }

    /// Registered paths in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the schema registered under `path`.
    pub fn lookup(&self, path: &str) -> Result<Arc<RecordSchema>, AppError> {
        if let Some(factory) = self.factories.get(path) {
            return Ok(Arc::new(factory()));
        }

        let message = match path.rsplit_once('.') {
            Some((module, type_name)) => {
                let prefix = format!("{module}.");
                if self.factories.keys().any(|k| k.starts_with(&prefix)) {
                    format!("{path} (module '{module}' has no schema '{type_name}')")
                } else {
                    format!("{path} (unknown module '{module}')")
                }
            }
            None => path.to_string(),
        };
        Err(AppError::UnknownSchema(message))
    }
}

/// Reference to a schema: either a concrete handle or a registry path.
#[derive(Debug, Clone)]
pub enum SchemaRef {
    Handle(Arc<RecordSchema>),
    Path(String),
}

impl SchemaRef {
    /// Parse the form stored in a request context slot: a string path or an
    /// inline schema descriptor object.
    pub fn from_meta(value: &Value) -> Result<Self, AppError> {
        match value {
            Value::String(path) => Ok(SchemaRef::Path(path.clone())),
            Value::Object(_) => {
                let schema: RecordSchema = serde_json::from_value(value.clone()).map_err(|e| {
                    AppError::ConfigError(format!("Invalid inline schema descriptor: {e}"))
                })?;
                Ok(SchemaRef::Handle(Arc::new(schema)))
            }
            other => Err(AppError::ConfigError(format!(
                "Schema reference must be a path string or a descriptor object, got {other}"
            ))),
        }
    }
}

impl From<RecordSchema> for SchemaRef {
    fn from(schema: RecordSchema) -> Self {
        SchemaRef::Handle(Arc::new(schema))
    }
}

impl From<Arc<RecordSchema>> for SchemaRef {
    fn from(schema: Arc<RecordSchema>) -> Self {
        SchemaRef::Handle(schema)
    }
}

impl From<&str> for SchemaRef {
    fn from(path: &str) -> Self {
        SchemaRef::Path(path.to_string())
    }
}

impl From<String> for SchemaRef {
    fn from(path: String) -> Self {
        SchemaRef::Path(path)
    }
}

/// Picks the schema for a request: request override, then crawl source,
/// then global default.
#[derive(Debug, Clone)]
pub struct SchemaResolver {
    registry: Arc<SchemaRegistry>,
}

impl SchemaResolver {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Resolve a single reference.
    pub fn resolve_ref(&self, schema_ref: &SchemaRef) -> Result<Arc<RecordSchema>, AppError> {
        match schema_ref {
            SchemaRef::Handle(schema) => Ok(Arc::clone(schema)),
            SchemaRef::Path(path) => self.registry.lookup(path.trim()),
        }
    }

    /// Resolve through the precedence chain.
    ///
    /// The first tier that carries a reference decides; a reference that
    /// fails to resolve is an error, it does not fall through to lower tiers.
    pub fn resolve(
        &self,
        request: Option<&SchemaRef>,
        source: Option<&SchemaRef>,
        global: Option<&SchemaRef>,
    ) -> Result<Arc<RecordSchema>, AppError> {
        let (tier, schema_ref) = [("request", request), ("source", source), ("global", global)]
            .into_iter()
            .find_map(|(tier, r)| r.map(|r| (tier, r)))
            .ok_or(AppError::SchemaNotConfigured)?;

        let schema = self.resolve_ref(schema_ref)?;
        tracing::debug!(tier, schema = %schema.name, "Resolved response schema");
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use serde_json::json;
    use std::io::Write;

    fn resolver() -> SchemaResolver {
        SchemaResolver::new(SchemaRegistry::with_builtin())
    }

    fn listing() -> RecordSchema {
        RecordSchema::new("Listing").required("title", FieldType::String)
    }

    #[test]
    fn test_request_override_wins() {
        let request = SchemaRef::from(listing());
        let source = SchemaRef::from(catalog::DORM_ITEM);
        let schema = resolver()
            .resolve(Some(&request), Some(&source), None)
            .unwrap();
        assert_eq!(schema.name, "Listing");
    }

    #[test]
    fn test_source_wins_over_global() {
        let source = SchemaRef::from(catalog::CAPACITY_INFO);
        let global = SchemaRef::from(catalog::DORM_ITEM);
        let schema = resolver()
            .resolve(None, Some(&source), Some(&global))
            .unwrap();
        assert_eq!(schema.name, "CapacityInfo");
    }

    #[test]
    fn test_global_default_used_last() {
        let global = SchemaRef::from(catalog::DORM_ITEM);
        let schema = resolver().resolve(None, None, Some(&global)).unwrap();
        assert_eq!(schema.name, "DormItem");
    }

    #[test]
    fn test_nothing_configured_fails() {
        let err = resolver().resolve(None, None, None).unwrap_err();
        assert!(matches!(err, AppError::SchemaNotConfigured));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unknown_path_does_not_fall_through() {
        let request = SchemaRef::from("dorm_capacity.Missing");
        let global = SchemaRef::from(catalog::DORM_ITEM);
        let err = resolver()
            .resolve(Some(&request), None, Some(&global))
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownSchema(_)));
        assert!(err.to_string().contains("has no schema 'Missing'"));
    }

    #[test]
    fn test_unknown_module_reported() {
        let err = resolver()
            .resolve_ref(&SchemaRef::from("campus.Housing"))
            .unwrap_err();
        assert!(err.to_string().contains("unknown module 'campus'"));
    }

    #[test]
    fn test_register_custom_factory() {
        let mut registry = SchemaRegistry::new();
        registry.register("listings.Listing", listing);
        assert!(registry.contains("listings.Listing"));
        assert_eq!(registry.lookup("listings.Listing").unwrap().name, "Listing");
    }

    #[test]
    fn test_builtin_names_sorted() {
        let registry = SchemaRegistry::with_builtin();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec![catalog::CAPACITY_INFO, catalog::DORM_ITEM]);
    }

    #[test]
    fn test_register_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name": "campus.Housing", "fields": [{{"name": "beds", "type": "integer"}}]}}"#
        )
        .unwrap();

        let mut registry = SchemaRegistry::new();
        let name = registry.register_file(file.path()).unwrap();
        assert_eq!(name, "campus.Housing");
        assert_eq!(registry.lookup("campus.Housing").unwrap().fields.len(), 1);
    }

    #[test]
    fn test_register_file_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = SchemaRegistry::new().register_file(file.path()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_schema_ref_from_meta() {
        let by_path = SchemaRef::from_meta(&json!("dorm_capacity.DormItem")).unwrap();
        assert!(matches!(by_path, SchemaRef::Path(ref p) if p == "dorm_capacity.DormItem"));

        let inline = SchemaRef::from_meta(&json!({
            "name": "Inline",
            "fields": [{"name": "n_person", "type": "integer"}]
        }))
        .unwrap();
        assert_eq!(resolver().resolve_ref(&inline).unwrap().name, "Inline");

        assert!(SchemaRef::from_meta(&json!(42)).is_err());
    }
}
