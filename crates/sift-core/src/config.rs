use std::str::FromStr;
use std::sync::Arc;

use crate::error::AppError;
use crate::flatten::FlattenMode;
use crate::resolver::{SchemaRef, SchemaResolver};
use crate::schema::RecordSchema;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.0001;
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a data extraction expert, your role is to extract data from the given text according to the provided schema. make sure your output is a valid JSON object.";

/// Host configuration surface. Every value is optional; unset values fall
/// back to the defaults above when building an [`ExtractionConfig`].
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Global default schema reference (`SIFT_RESPONSE_MODEL`).
    pub response_model: Option<String>,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// System message template; `{url}` is replaced by the page URL.
    pub system_message: Option<String>,
    pub additional_system_message: Option<String>,
    pub unwrap_nested: Option<bool>,
    pub flatten_mode: Option<FlattenMode>,
    pub ignore_links: Option<bool>,
    pub ignore_images: Option<bool>,
}

impl Settings {
    /// Read settings from `SIFT_*` environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            response_model: get("SIFT_RESPONSE_MODEL"),
            api_base: get("SIFT_LLM_API_BASE"),
            model: get("SIFT_LLM_MODEL"),
            temperature: parse_opt(get("SIFT_LLM_TEMPERATURE"), "SIFT_LLM_TEMPERATURE")?,
            system_message: get("SIFT_LLM_SYSTEM_MESSAGE"),
            additional_system_message: get("SIFT_LLM_ADDITIONAL_SYSTEM_MESSAGE"),
            unwrap_nested: parse_bool(get("SIFT_UNWRAP_NESTED"), "SIFT_UNWRAP_NESTED")?,
            flatten_mode: parse_opt(get("SIFT_FLATTEN_MODE"), "SIFT_FLATTEN_MODE")?,
            ignore_links: parse_bool(
                get("SIFT_HTML_CLEANER_IGNORE_LINKS"),
                "SIFT_HTML_CLEANER_IGNORE_LINKS",
            )?,
            ignore_images: parse_bool(
                get("SIFT_HTML_CLEANER_IGNORE_IMAGES"),
                "SIFT_HTML_CLEANER_IGNORE_IMAGES",
            )?,
        })
    }
}

fn parse_opt<T>(raw: Option<String>, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|v| {
        v.trim()
            .parse::<T>()
            .map_err(|e| AppError::ConfigError(format!("Invalid {key} '{v}': {e}")))
    })
    .transpose()
}

fn parse_bool(raw: Option<String>, key: &str) -> Result<Option<bool>, AppError> {
    raw.map(|v| match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::ConfigError(format!(
            "Invalid {key} '{v}': expected true or false"
        ))),
    })
    .transpose()
}

/// Immutable per-crawl extraction configuration.
///
/// Built once from [`Settings`]; shared read-only between concurrent
/// requests.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Resolved crawl-level schema (source or global tier). `None` when
    /// every request must carry its own.
    pub schema: Option<Arc<RecordSchema>>,
    pub unwrap_nested: bool,
    pub flatten_mode: FlattenMode,
    pub api_base: String,
    pub model_id: String,
    pub temperature: f32,
    pub system_message: String,
    pub additional_system_message: Option<String>,
    pub clean_ignore_links: bool,
    pub clean_ignore_images: bool,
}

impl ExtractionConfig {
    /// Config with defaults for everything except the schema.
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        Self::without_schema().with_schema(schema)
    }

    /// Config with defaults and no crawl-level schema.
    pub fn without_schema() -> Self {
        Self {
            schema: None,
            unwrap_nested: false,
            flatten_mode: FlattenMode::default(),
            api_base: DEFAULT_API_BASE.to_string(),
            model_id: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            additional_system_message: None,
            clean_ignore_links: true,
            clean_ignore_images: true,
        }
    }

    pub fn with_schema(mut self, schema: Arc<RecordSchema>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Build the crawl config, resolving the schema from the crawl source or
    /// the global setting.
    ///
    /// A reference that does not resolve fails here, before any network
    /// activity. Having no reference at all is allowed: requests may still
    /// carry their own, and [`Pipeline::schema_for`](crate::Pipeline::schema_for)
    /// reports `SchemaNotConfigured` for those that do not.
    pub fn from_settings(
        settings: &Settings,
        source_schema: Option<&SchemaRef>,
        resolver: &SchemaResolver,
    ) -> Result<Self, AppError> {
        let global = settings.response_model.clone().map(SchemaRef::Path);
        let schema = match resolver.resolve(None, source_schema, global.as_ref()) {
            Ok(schema) => Some(schema),
            Err(AppError::SchemaNotConfigured) => None,
            Err(e) => return Err(e),
        };

        let temperature = settings.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(AppError::ConfigError(format!(
                "Temperature {temperature} out of range 0.0..=2.0"
            )));
        }

        let defaults = Self::without_schema();
        Ok(Self {
            schema,
            unwrap_nested: settings.unwrap_nested.unwrap_or(defaults.unwrap_nested),
            flatten_mode: settings.flatten_mode.unwrap_or(defaults.flatten_mode),
            api_base: settings
                .api_base
                .clone()
                .unwrap_or(defaults.api_base.clone()),
            model_id: settings.model.clone().unwrap_or(defaults.model_id.clone()),
            temperature,
            system_message: settings
                .system_message
                .clone()
                .unwrap_or(defaults.system_message.clone()),
            additional_system_message: settings.additional_system_message.clone(),
            clean_ignore_links: settings.ignore_links.unwrap_or(defaults.clean_ignore_links),
            clean_ignore_images: settings
                .ignore_images
                .unwrap_or(defaults.clean_ignore_images),
        })
    }

    /// System instruction for one page.
    pub fn system_prompt(&self, url: &str) -> String {
        let base = self.system_message.replace("{url}", url);
        match self.additional_system_message.as_deref() {
            Some(extra) if !extra.trim().is_empty() => format!("{base}\n\n{extra}"),
            _ => base,
        }
    }
}
