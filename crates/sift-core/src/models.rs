use serde::Serialize;
use serde_json::{Map, Value};

/// A record as returned by the extractor: field name to scalar, list or
/// nested mapping. Lives only between extraction and flattening.
pub type RawExtractedRecord = Map<String, Value>;

/// A record with no nested mappings; the shape handed to export.
pub type FlatRecord = Map<String, Value>;

/// Result of processing one page.
///
/// Serializes untagged: a single record becomes a JSON object, several
/// records a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractedData {
    One(Map<String, Value>),
    Many(Vec<Map<String, Value>>),
}

impl ExtractedData {
    /// Number of records carried.
    pub fn len(&self) -> usize {
        match self {
            ExtractedData::One(_) => 1,
            ExtractedData::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into export rows, one per record.
    pub fn into_records(self) -> Vec<Map<String, Value>> {
        match self {
            ExtractedData::One(record) => vec![record],
            ExtractedData::Many(records) => records,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ExtractedData::One(record) => Value::Object(record.clone()),
            ExtractedData::Many(records) => {
                Value::Array(records.iter().cloned().map(Value::Object).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_single_serializes_as_object() {
        let data = ExtractedData::One(record(json!({"n_person": 100})));
        assert_eq!(serde_json::to_value(&data).unwrap(), json!({"n_person": 100}));
        assert_eq!(data.to_value(), json!({"n_person": 100}));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_many_serializes_as_array() {
        let data = ExtractedData::Many(vec![
            record(json!({"name": "North Hall"})),
            record(json!({"name": "South Hall"})),
        ]);
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!([{"name": "North Hall"}, {"name": "South Hall"}])
        );
        assert_eq!(data.into_records().len(), 2);
    }

    #[test]
    fn test_empty_many() {
        let data = ExtractedData::Many(vec![]);
        assert!(data.is_empty());
        assert_eq!(data.to_value(), json!([]));
    }
}
