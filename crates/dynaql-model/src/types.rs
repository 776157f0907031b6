//! Shared schema types: key roles, attribute types, projections, throughput,
//! and the wire-shaped table/index description structs returned by the
//! storage backend's describe call.
//!
//! Structs follow the store's JSON wire format with `PascalCase` field names;
//! enums carry both their wire string (`as_str`) and, where the query
//! language spells them differently, the language keyword.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Key role within a key schema element.
///
/// `Hash` denotes the partition key; `Range` denotes the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Partition key.
    #[serde(rename = "HASH")]
    Hash,
    /// Sort key.
    #[serde(rename = "RANGE")]
    Range,
}

impl KeyType {
    /// Returns the wire-format string representation of this key role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "HASH",
            Self::Range => "RANGE",
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar type of a key-eligible attribute.
///
/// The query language spells these out (`STRING`, `NUMBER`, `BINARY`); the
/// wire format abbreviates them (`S`, `N`, `B`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    /// String type.
    String,
    /// Number type.
    Number,
    /// Binary type.
    Binary,
}

impl AttrType {
    /// Returns the one-letter wire-format representation.
    #[must_use]
    pub fn as_letter(&self) -> &'static str {
        match self {
            Self::String => "S",
            Self::Number => "N",
            Self::Binary => "B",
        }
    }

    /// Returns the query-language keyword for this type.
    #[must_use]
    pub fn as_keyword(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Binary => "BINARY",
        }
    }

    /// Parse the one-letter wire representation.
    #[must_use]
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "S" => Some(Self::String),
            "N" => Some(Self::Number),
            "B" => Some(Self::Binary),
            _ => None,
        }
    }
}

impl Serialize for AttrType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_letter())
    }
}

impl<'de> Deserialize<'de> for AttrType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_letter(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown attribute type '{s}'")))
    }
}

impl std::fmt::Display for AttrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_keyword())
    }
}

/// Which attributes an index carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectionClass {
    /// All attributes from the table are projected into the index.
    #[default]
    #[serde(rename = "ALL")]
    All,
    /// Only the index and primary keys are projected.
    #[serde(rename = "KEYS_ONLY")]
    KeysOnly,
    /// Keys plus an explicit list of non-key attributes.
    #[serde(rename = "INCLUDE")]
    Include,
}

impl ProjectionClass {
    /// Returns the wire-format string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::KeysOnly => "KEYS_ONLY",
            Self::Include => "INCLUDE",
        }
    }

    /// Returns the query-language keyword (`ALL`, `KEYS`, `INCLUDE`).
    #[must_use]
    pub fn as_keyword(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::KeysOnly => "KEYS",
            Self::Include => "INCLUDE",
        }
    }
}

impl std::fmt::Display for ProjectionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

/// An element of the key schema for a table or index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    /// The name of the key attribute.
    pub attribute_name: String,
    /// The role of the attribute (`HASH` or `RANGE`).
    pub key_type: KeyType,
}

impl KeySchemaElement {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            attribute_name: name.into(),
            key_type,
        }
    }
}

/// An attribute declaration naming an attribute and its scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeDefinition {
    /// The name of the attribute.
    pub attribute_name: String,
    /// The scalar data type of the attribute.
    pub attribute_type: AttrType,
}

/// Provisioned read/write capacity for a table or global index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Throughput {
    /// Read capacity units.
    pub read_capacity_units: i64,
    /// Write capacity units.
    pub write_capacity_units: i64,
}

impl Throughput {
    /// Convenience constructor.
    #[must_use]
    pub fn new(read: i64, write: i64) -> Self {
        Self {
            read_capacity_units: read,
            write_capacity_units: write,
        }
    }
}

/// Projection settings for a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Projection {
    /// The projection class.
    pub projection_type: ProjectionClass,
    /// The non-key attributes to project when the class is `INCLUDE`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_key_attributes: Vec<String>,
}

/// Description of a secondary index, as returned by the describe call.
///
/// Local and global indexes share this shape; a local index has no hash key
/// of its own in `key_schema` beyond the table's and carries no throughput.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexDescription {
    /// The index name.
    pub index_name: String,
    /// The key schema for this index.
    pub key_schema: Vec<KeySchemaElement>,
    /// The attributes projected into this index.
    #[serde(default)]
    pub projection: Projection,
    /// Provisioned throughput (global indexes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput: Option<Throughput>,
    /// The number of items in the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<i64>,
    /// The total size of the index in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_size_bytes: Option<i64>,
}

/// Comprehensive description of a table, as returned by the describe call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableDescription {
    /// The name of the table.
    pub table_name: String,
    /// The current status of the table (e.g. `ACTIVE`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_status: Option<String>,
    /// The attribute definitions for key and index attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_definitions: Vec<AttributeDefinition>,
    /// The key schema for the table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_schema: Vec<KeySchemaElement>,
    /// The provisioned throughput settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput: Option<Throughput>,
    /// The local secondary indexes on the table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_secondary_indexes: Vec<IndexDescription>,
    /// The global secondary indexes on the table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_secondary_indexes: Vec<IndexDescription>,
    /// The number of items in the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<i64>,
    /// The total size of the table in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_size_bytes: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_serialize_key_schema_element() {
        let elem = KeySchemaElement::new("pk", KeyType::Hash);
        let json = serde_json::to_string(&elem).expect("serialize KeySchemaElement");
        assert_eq!(json, r#"{"AttributeName":"pk","KeyType":"HASH"}"#);
    }

    #[test]
    fn test_should_serialize_attr_type_as_letter() {
        let def = AttributeDefinition {
            attribute_name: "id".to_owned(),
            attribute_type: AttrType::String,
        };
        let json = serde_json::to_string(&def).expect("serialize AttributeDefinition");
        assert_eq!(json, r#"{"AttributeName":"id","AttributeType":"S"}"#);
    }

    #[test]
    fn test_should_reject_unknown_attr_type() {
        let result: Result<AttributeDefinition, _> =
            serde_json::from_str(r#"{"AttributeName":"id","AttributeType":"SS"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_should_spell_projection_keywords() {
        assert_eq!(ProjectionClass::All.as_keyword(), "ALL");
        assert_eq!(ProjectionClass::KeysOnly.as_keyword(), "KEYS");
        assert_eq!(ProjectionClass::KeysOnly.as_str(), "KEYS_ONLY");
        assert_eq!(ProjectionClass::Include.as_keyword(), "INCLUDE");
    }

    #[test]
    fn test_should_deserialize_table_description_from_wire_json() {
        let json = r#"{
            "TableName": "posts",
            "TableStatus": "ACTIVE",
            "KeySchema": [
                {"AttributeName": "author", "KeyType": "HASH"},
                {"AttributeName": "posted", "KeyType": "RANGE"}
            ],
            "AttributeDefinitions": [
                {"AttributeName": "author", "AttributeType": "S"},
                {"AttributeName": "posted", "AttributeType": "N"},
                {"AttributeName": "topic", "AttributeType": "S"}
            ],
            "ProvisionedThroughput": {"ReadCapacityUnits": 5, "WriteCapacityUnits": 5},
            "GlobalSecondaryIndexes": [
                {
                    "IndexName": "topic-idx",
                    "KeySchema": [{"AttributeName": "topic", "KeyType": "HASH"}],
                    "Projection": {"ProjectionType": "KEYS_ONLY"},
                    "ProvisionedThroughput": {"ReadCapacityUnits": 2, "WriteCapacityUnits": 1}
                }
            ],
            "ItemCount": 12
        }"#;
        let desc: TableDescription =
            serde_json::from_str(json).expect("deserialize TableDescription");
        assert_eq!(desc.table_name, "posts");
        assert_eq!(desc.key_schema.len(), 2);
        assert_eq!(desc.attribute_definitions.len(), 3);
        assert_eq!(desc.global_secondary_indexes.len(), 1);
        assert_eq!(
            desc.global_secondary_indexes[0].projection.projection_type,
            ProjectionClass::KeysOnly
        );
        assert_eq!(desc.item_count, Some(12));
    }
}
