//! Built-in schemas for dormitory capacity extraction.

use crate::schema::{FieldDescriptor, FieldType, RecordSchema};

pub const DORM_ITEM: &str = "dorm_capacity.DormItem";
pub const CAPACITY_INFO: &str = "dorm_capacity.CapacityInfo";

/// Available room types.
pub const ROOM_TYPES: [&str; 9] = [
    "single",
    "double",
    "triple",
    "quad",
    "studio",
    "suite",
    "apartment",
    "shared",
    "other",
];

fn room_types() -> FieldDescriptor {
    FieldDescriptor::optional(
        "room_types",
        FieldType::list(FieldType::enumeration(ROOM_TYPES)),
    )
    .with_description("Available room types, mention each type only once with a single word.")
}

/// Capacity figures of a housing facility. Every field is optional.
pub fn capacity_info() -> RecordSchema {
    RecordSchema::new("CapacityInfo")
        .describe("Capacity data of a housing facility.")
        .field(
            FieldDescriptor::optional("n_person", FieldType::Integer)
                .with_description("Total number of people the place can accommodate."),
        )
        .field(
            FieldDescriptor::optional("n_unit", FieldType::Integer)
                .with_description("Total number of units available if any."),
        )
        .field(
            FieldDescriptor::optional("n_building", FieldType::Integer)
                .with_description("Total number of buildings in the property."),
        )
        .field(
            FieldDescriptor::optional("n_floor", FieldType::Integer)
                .with_description("Total number of floors in the building."),
        )
        .field(room_types())
}

/// A dormitory with nested capacity data; only `name` is required.
pub fn dorm_item() -> RecordSchema {
    RecordSchema::new("DormItem")
        .describe("Dormitory data extracted from a web page.")
        .field(FieldDescriptor::required("name", FieldType::String).with_description("Name of the dorm."))
        .field(
            FieldDescriptor::optional("address", FieldType::String).with_description(
                "Physical address of the dorm or university including zip code and state.",
            ),
        )
        .field(
            FieldDescriptor::optional("telephone", FieldType::String)
                .with_description("Telephone number of the dorm or university."),
        )
        .field(
            FieldDescriptor::optional("email", FieldType::String)
                .with_description("Email address of the dorm or university."),
        )
        .field(room_types())
        .field(
            FieldDescriptor::optional("capacity", FieldType::record(capacity_info()))
                .with_description("Capacity data of the dorm."),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dorm_item_requires_name_only() {
        let schema = dorm_item();
        assert_eq!(schema.identifying_field(), Some("name"));
        assert_eq!(schema.fields.iter().filter(|f| f.required).count(), 1);
    }

    #[test]
    fn test_dorm_item_validates_model_output() {
        let record = dorm_item()
            .validate(&json!({
                "name": "Maple Hall",
                "room_types": ["double", "suite"],
                "capacity": {"n_person": 420, "n_floor": 6}
            }))
            .unwrap();

        assert_eq!(record["capacity"]["n_person"], json!(420));
        assert_eq!(record["capacity"]["n_unit"], json!(null));
        assert_eq!(record["telephone"], json!(null));
    }
}
