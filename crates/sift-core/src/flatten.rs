//! Flattening of nested extraction records into tabular rows.
//!
//! Nested mappings are merged into their parent's top level and the nesting
//! field is removed:
//!
//! ```text
//! {"name": "A", "capacity": {"n_person": 100}}  ->  {"name": "A", "n_person": 100}
//! ```
//!
//! Collision rule: when an inner key already exists at the top level, the
//! nested value overwrites it. Nested fields are merged in lexicographic
//! order of their names, so between two nested fields carrying the same
//! inner key the lexicographically greater one wins.
//!
//! [`FlattenMode::SingleLevel`] unwraps exactly one layer; a mapping nested
//! two levels deep stays a mapping. [`FlattenMode::Recursive`] repeats the
//! pass until no mapping remains. Lists are leaves in both modes, including
//! lists of mappings.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::models::{ExtractedData, FlatRecord, RawExtractedRecord};

/// How deep the flattener unwraps nested mappings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlattenMode {
    #[default]
    SingleLevel,
    Recursive,
}

impl FlattenMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlattenMode::SingleLevel => "single",
            FlattenMode::Recursive => "recursive",
        }
    }
}

impl fmt::Display for FlattenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FlattenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "single-level" | "single_level" => Ok(FlattenMode::SingleLevel),
            "recursive" => Ok(FlattenMode::Recursive),
            _ => Err(format!("Unknown flatten mode: {}", s)),
        }
    }
}

/// Turns extracted records into flat rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flattener {
    mode: FlattenMode,
}

impl Flattener {
    pub fn new(mode: FlattenMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> FlattenMode {
        self.mode
    }

    /// Flatten every record independently.
    ///
    /// Exactly one resulting record is returned as [`ExtractedData::One`];
    /// zero or several are returned in input order as
    /// [`ExtractedData::Many`], never collapsed.
    pub fn flatten(&self, records: Vec<RawExtractedRecord>) -> ExtractedData {
        let mut records = records;
        loop {
            let nested = nested_fields(&records);
            if nested.is_empty() {
                break;
            }
            records = records
                .into_iter()
                .map(|record| merge_nested(record, &nested))
                .collect();
            if self.mode == FlattenMode::SingleLevel {
                break;
            }
        }
        collapse(records)
    }
}

/// Field names holding a mapping in any record, with the union of the inner
/// keys seen for each.
fn nested_fields(records: &[RawExtractedRecord]) -> BTreeMap<String, BTreeSet<String>> {
    let mut nested: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for record in records {
        for (key, value) in record {
            if let Value::Object(inner) = value {
                nested
                    .entry(key.clone())
                    .or_default()
                    .extend(inner.keys().cloned());
            }
        }
    }
    nested
}

fn merge_nested(
    mut record: RawExtractedRecord,
    nested: &BTreeMap<String, BTreeSet<String>>,
) -> FlatRecord {
    // Detach every nested field before merging, so an inner key named like
    // a not-yet-merged nested field cannot replace it.
    let detached: Vec<(&String, &BTreeSet<String>, Value)> = nested
        .iter()
        .filter_map(|(field, inner_keys)| {
            record
                .remove(field)
                .map(|value| (field, inner_keys, value))
        })
        .collect();

    for (field, inner_keys, value) in detached {
        match value {
            Value::Object(inner) => {
                for (key, value) in inner {
                    if let Some(previous) = record.get(&key) {
                        if *previous != value {
                            tracing::debug!(
                                field = %field,
                                key = %key,
                                "Nested value overwrites existing field"
                            );
                        }
                    }
                    record.insert(key, value);
                }
            }
            // Absent nested record: keep the columns it has elsewhere.
            Value::Null => {
                for key in inner_keys {
                    record.entry(key.clone()).or_insert(Value::Null);
                }
            }
            // Nested in another record but a leaf here.
            leaf => {
                record.insert(field.clone(), leaf);
            }
        }
    }
    record
}

fn collapse(mut records: Vec<Map<String, Value>>) -> ExtractedData {
    if records.len() == 1 {
        if let Some(record) = records.pop() {
            return ExtractedData::One(record);
        }
    }
    ExtractedData::Many(records)
}
