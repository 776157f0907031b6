//! Table metadata as seen by the query planner.
//!
//! [`TableMeta`] is built from the backend's [`TableDescription`] and cached
//! by the session. It exposes the candidate-index enumeration used for query
//! planning ([`TableMeta::iter_query_indexes`]) and renders the `DUMP SCHEMA`
//! output, which is valid `CREATE TABLE` input.

use std::collections::HashSet;
use std::fmt;

use crate::types::{
    AttrType, KeySchemaElement, KeyType, ProjectionClass, TableDescription, Throughput,
};
use crate::value::{Key, Value};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while interpreting a table description.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The description has no hash key.
    #[error("table '{table}' has no hash key")]
    MissingHashKey {
        /// The table name.
        table: String,
    },
    /// A key schema references an attribute with no type definition.
    #[error("attribute '{attr}' is used as a key but has no type definition")]
    UndefinedAttribute {
        /// The attribute name.
        attr: String,
    },
    /// A primary key value was missing when constructing a key.
    #[error("missing value for key attribute '{attr}'")]
    MissingKeyValue {
        /// The attribute name.
        attr: String,
    },
}

// ---------------------------------------------------------------------------
// TableField
// ---------------------------------------------------------------------------

/// A typed attribute of a table, optionally carrying a primary-key role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableField {
    /// The attribute name.
    pub name: String,
    /// The scalar data type.
    pub attr_type: AttrType,
    /// The primary-key role, if any.
    pub key_type: Option<KeyType>,
}

impl TableField {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, attr_type: AttrType, key_type: Option<KeyType>) -> Self {
        Self {
            name: name.into(),
            attr_type,
            key_type,
        }
    }

    /// The `CREATE TABLE` fragment declaring this field.
    #[must_use]
    pub fn schema(&self) -> String {
        match self.key_type {
            Some(role) => format!("{} {} {} KEY", self.name, self.attr_type, role),
            None => format!("{} {}", self.name, self.attr_type),
        }
    }
}

impl fmt::Display for TableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.schema())
    }
}

// ---------------------------------------------------------------------------
// Indexes
// ---------------------------------------------------------------------------

/// A local secondary index: an alternate range key sharing the table's hash
/// key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIndex {
    /// The index name.
    pub name: String,
    /// The alternate range key.
    pub range_key: TableField,
    /// The projection class.
    pub projection: ProjectionClass,
    /// The projected non-key attributes when the class is `INCLUDE`.
    pub includes: Vec<String>,
}

impl LocalIndex {
    /// The attribute-declaration fragment for this index, e.g.
    /// `ts NUMBER ALL INDEX('ts-idx')`.
    #[must_use]
    pub fn schema(&self) -> String {
        let mut out = format!(
            "{} {} {} INDEX('{}'",
            self.range_key.name,
            self.range_key.attr_type,
            self.projection.as_keyword(),
            self.name
        );
        if !self.includes.is_empty() {
            out.push_str(", [");
            out.push_str(
                &self
                    .includes
                    .iter()
                    .map(|i| format!("'{i}'"))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            out.push(']');
        }
        out.push(')');
        out
    }
}

/// A global secondary index: an independent hash/range key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalIndex {
    /// The index name.
    pub name: String,
    /// The projection class.
    pub projection: ProjectionClass,
    /// The index hash key.
    pub hash_key: TableField,
    /// The optional index range key.
    pub range_key: Option<TableField>,
    /// The projected non-key attributes when the class is `INCLUDE`.
    pub includes: Vec<String>,
    /// Provisioned throughput for the index.
    pub throughput: Throughput,
}

impl GlobalIndex {
    /// The `CREATE TABLE` clause constructing this index, e.g.
    /// `GLOBAL ALL INDEX ('topic-idx', topic, posted, THROUGHPUT (2, 1))`.
    #[must_use]
    pub fn schema(&self) -> String {
        let mut parts = vec![self.hash_key.name.clone()];
        if let Some(range) = &self.range_key {
            parts.push(range.name.clone());
        }
        if !self.includes.is_empty() {
            parts.push(format!(
                "[{}]",
                self.includes
                    .iter()
                    .map(|i| format!("'{i}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        parts.push(format!(
            "THROUGHPUT ({}, {})",
            self.throughput.read_capacity_units, self.throughput.write_capacity_units
        ));
        format!(
            "GLOBAL {} INDEX ('{}', {})",
            self.projection.as_keyword(),
            self.name,
            parts.join(", ")
        )
    }
}

// ---------------------------------------------------------------------------
// QueryIndex
// ---------------------------------------------------------------------------

/// The name of the pseudo-index representing the table's own primary key.
pub const TABLE_INDEX: &str = "TABLE";

/// A flattened view of an index used during query planning.
///
/// When building queries the planner needs to decide whether a constraint set
/// is sufficient for an index lookup or only for a scan. This container
/// reduces the table key, local indexes, and global indexes to one uniform
/// shape so that logic stays simple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryIndex {
    /// The index name (`TABLE` for the primary key pseudo-index).
    pub name: String,
    /// Whether this is a global index (or the primary key itself).
    pub is_global: bool,
    /// The hash key attribute name.
    pub hash_key: String,
    /// The range key attribute name, if the index has one.
    pub range_key: Option<String>,
    /// The set of projected attributes; `None` means all attributes.
    pub attributes: Option<HashSet<String>>,
}

impl QueryIndex {
    /// Returns `true` if the index projects every attribute in `attrs`.
    /// Passing `None` asks whether the index projects *all* attributes.
    #[must_use]
    pub fn projects_all_attributes(&self, attrs: Option<&HashSet<String>>) -> bool {
        let Some(projected) = &self.attributes else {
            return true;
        };
        match attrs {
            None => false,
            Some(wanted) => wanted.iter().all(|a| projected.contains(a)),
        }
    }

    /// Only global indexes (and the table itself) can be scanned.
    #[must_use]
    pub fn scannable(&self) -> bool {
        self.is_global
    }
}

impl fmt::Display for QueryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range_key {
            Some(range) => write!(f, "QueryIndex('{}', {}, {})", self.name, self.hash_key, range),
            None => write!(f, "QueryIndex('{}', {})", self.name, self.hash_key),
        }
    }
}

// ---------------------------------------------------------------------------
// TableMeta
// ---------------------------------------------------------------------------

/// Cached metadata for one table: key schema, attributes, and indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    /// The table name.
    pub name: String,
    /// The table status string reported by the backend, if any.
    pub status: Option<String>,
    /// All declared attributes, including key and index attributes.
    pub attrs: Vec<TableField>,
    /// The hash key field.
    pub hash_key: TableField,
    /// The range key field, if the table has one.
    pub range_key: Option<TableField>,
    /// Local secondary indexes.
    pub local_indexes: Vec<LocalIndex>,
    /// Global secondary indexes.
    pub global_indexes: Vec<GlobalIndex>,
    /// Provisioned table throughput.
    pub throughput: Throughput,
    /// Number of items in the table.
    pub item_count: i64,
    /// Size of the table in bytes.
    pub size: i64,
}

impl TableMeta {
    /// Build metadata from a backend table description.
    pub fn from_description(desc: &TableDescription) -> Result<Self, SchemaError> {
        let lookup_type = |attr: &str| -> Result<AttrType, SchemaError> {
            desc.attribute_definitions
                .iter()
                .find(|d| d.attribute_name == attr)
                .map(|d| d.attribute_type)
                .ok_or_else(|| SchemaError::UndefinedAttribute {
                    attr: attr.to_owned(),
                })
        };
        let key_field = |schema: &[KeySchemaElement],
                         role: KeyType|
         -> Result<Option<TableField>, SchemaError> {
            schema
                .iter()
                .find(|e| e.key_type == role)
                .map(|e| {
                    Ok(TableField::new(
                        e.attribute_name.clone(),
                        lookup_type(&e.attribute_name)?,
                        Some(role),
                    ))
                })
                .transpose()
        };

        let hash_key =
            key_field(&desc.key_schema, KeyType::Hash)?.ok_or_else(|| SchemaError::MissingHashKey {
                table: desc.table_name.clone(),
            })?;
        let range_key = key_field(&desc.key_schema, KeyType::Range)?;

        let mut local_indexes = Vec::new();
        for index in &desc.local_secondary_indexes {
            let Some(mut range) = key_field(&index.key_schema, KeyType::Range)? else {
                continue;
            };
            range.key_type = None;
            local_indexes.push(LocalIndex {
                name: index.index_name.clone(),
                range_key: range,
                projection: index.projection.projection_type,
                includes: index.projection.non_key_attributes.clone(),
            });
        }

        let mut global_indexes = Vec::new();
        for index in &desc.global_secondary_indexes {
            let Some(mut hash) = key_field(&index.key_schema, KeyType::Hash)? else {
                continue;
            };
            hash.key_type = None;
            let mut range = key_field(&index.key_schema, KeyType::Range)?;
            if let Some(r) = &mut range {
                r.key_type = None;
            }
            global_indexes.push(GlobalIndex {
                name: index.index_name.clone(),
                projection: index.projection.projection_type,
                hash_key: hash,
                range_key: range,
                includes: index.projection.non_key_attributes.clone(),
                throughput: index.provisioned_throughput.unwrap_or_default(),
            });
        }

        let attrs = desc
            .attribute_definitions
            .iter()
            .map(|d| {
                let key_type = desc
                    .key_schema
                    .iter()
                    .find(|e| e.attribute_name == d.attribute_name)
                    .map(|e| e.key_type);
                TableField::new(d.attribute_name.clone(), d.attribute_type, key_type)
            })
            .collect();

        Ok(Self {
            name: desc.table_name.clone(),
            status: desc.table_status.clone(),
            attrs,
            hash_key,
            range_key,
            local_indexes,
            global_indexes,
            throughput: desc.provisioned_throughput.unwrap_or_default(),
            item_count: desc.item_count.unwrap_or(0),
            size: desc.table_size_bytes.unwrap_or(0),
        })
    }

    /// Enumerate candidate indexes for query planning, deterministically:
    /// the `TABLE` pseudo-index first, then local indexes sorted by name,
    /// then global indexes sorted by name.
    #[must_use]
    pub fn iter_query_indexes(&self) -> Vec<QueryIndex> {
        let mut out = vec![QueryIndex {
            name: TABLE_INDEX.to_owned(),
            is_global: true,
            hash_key: self.hash_key.name.clone(),
            range_key: self.range_key.as_ref().map(|r| r.name.clone()),
            attributes: None,
        }];

        let mut locals: Vec<_> = self.local_indexes.iter().collect();
        locals.sort_by(|a, b| a.name.cmp(&b.name));
        for index in locals {
            out.push(QueryIndex {
                name: index.name.clone(),
                is_global: false,
                hash_key: self.hash_key.name.clone(),
                range_key: Some(index.range_key.name.clone()),
                attributes: self.projected_attributes(
                    index.projection,
                    None,
                    Some(&index.range_key.name),
                    &index.includes,
                ),
            });
        }

        let mut globals: Vec<_> = self.global_indexes.iter().collect();
        globals.sort_by(|a, b| a.name.cmp(&b.name));
        for index in globals {
            out.push(QueryIndex {
                name: index.name.clone(),
                is_global: true,
                hash_key: index.hash_key.name.clone(),
                range_key: index.range_key.as_ref().map(|r| r.name.clone()),
                attributes: self.projected_attributes(
                    index.projection,
                    Some(&index.hash_key.name),
                    index.range_key.as_ref().map(|r| r.name.as_str()),
                    &index.includes,
                ),
            });
        }

        out
    }

    /// The attribute set projected by an index, or `None` for `ALL`.
    fn projected_attributes(
        &self,
        projection: ProjectionClass,
        index_hash: Option<&str>,
        index_range: Option<&str>,
        includes: &[String],
    ) -> Option<HashSet<String>> {
        if projection == ProjectionClass::All {
            return None;
        }
        let mut attrs = HashSet::new();
        attrs.insert(self.hash_key.name.clone());
        if let Some(range) = &self.range_key {
            attrs.insert(range.name.clone());
        }
        if let Some(h) = index_hash {
            attrs.insert(h.to_owned());
        }
        if let Some(r) = index_range {
            attrs.insert(r.to_owned());
        }
        attrs.extend(includes.iter().cloned());
        Some(attrs)
    }

    /// All indexes that could serve a query given candidate hash and range
    /// fields. If any index matches both the hash and a range field, indexes
    /// matching only the hash are excluded (the narrower plan always wins).
    #[must_use]
    pub fn get_matching_indexes(
        &self,
        possible_hash: &HashSet<String>,
        possible_range: &HashSet<String>,
    ) -> Vec<QueryIndex> {
        let matches: Vec<QueryIndex> = self
            .iter_query_indexes()
            .into_iter()
            .filter(|index| possible_hash.contains(&index.hash_key))
            .collect();
        let range_matches: Vec<QueryIndex> = matches
            .iter()
            .filter(|index| {
                index
                    .range_key
                    .as_ref()
                    .is_some_and(|r| possible_range.contains(r))
            })
            .cloned()
            .collect();
        if range_matches.is_empty() {
            matches
        } else {
            range_matches
        }
    }

    /// Look up a specific index by name (`TABLE` names the primary key).
    #[must_use]
    pub fn get_index(&self, index_name: &str) -> Option<QueryIndex> {
        self.iter_query_indexes()
            .into_iter()
            .find(|index| index.name == index_name)
    }

    /// The names of the primary key attributes, hash key first.
    #[must_use]
    pub fn primary_key_attributes(&self) -> Vec<&str> {
        match &self.range_key {
            Some(range) => vec![self.hash_key.name.as_str(), range.name.as_str()],
            None => vec![self.hash_key.name.as_str()],
        }
    }

    /// Extract the primary key of an item.
    pub fn primary_key_from_item(
        &self,
        item: &std::collections::HashMap<String, Value>,
    ) -> Result<Key, SchemaError> {
        let mut key = Key::new();
        for attr in self.primary_key_attributes() {
            let value = item
                .get(attr)
                .ok_or_else(|| SchemaError::MissingKeyValue {
                    attr: attr.to_owned(),
                })?;
            key.insert(attr.to_owned(), value.clone());
        }
        Ok(key)
    }

    /// Construct a primary key from positional values (hash, then range).
    pub fn primary_key(&self, hash: Value, range: Option<Value>) -> Result<Key, SchemaError> {
        let mut key = Key::new();
        key.insert(self.hash_key.name.clone(), hash);
        if let Some(range_field) = &self.range_key {
            let value = range.ok_or_else(|| SchemaError::MissingKeyValue {
                attr: range_field.name.clone(),
            })?;
            key.insert(range_field.name.clone(), value);
        }
        Ok(key)
    }

    /// Combined read throughput of the table and its global indexes.
    #[must_use]
    pub fn total_read_throughput(&self) -> i64 {
        self.throughput.read_capacity_units
            + self
                .global_indexes
                .iter()
                .map(|i| i.throughput.read_capacity_units)
                .sum::<i64>()
    }

    /// Combined write throughput of the table and its global indexes.
    #[must_use]
    pub fn total_write_throughput(&self) -> i64 {
        self.throughput.write_capacity_units
            + self
                .global_indexes
                .iter()
                .map(|i| i.throughput.write_capacity_units)
                .sum::<i64>()
    }

    /// The `CREATE TABLE` statement that reconstructs this table's schema.
    #[must_use]
    pub fn schema(&self) -> String {
        let mut decls = vec![self.hash_key.schema()];
        if let Some(range) = &self.range_key {
            decls.push(range.schema());
        }
        for index in &self.local_indexes {
            decls.push(index.schema());
        }
        // Remaining declared attributes (global index keys, mostly).
        let covered: HashSet<String> = decls
            .iter()
            .filter_map(|d| d.split_whitespace().next().map(str::to_string))
            .collect();
        for attr in &self.attrs {
            if !covered.contains(attr.name.as_str()) {
                decls.push(format!("{} {}", attr.name, attr.attr_type));
            }
        }
        decls.push(format!(
            "THROUGHPUT ({}, {})",
            self.throughput.read_capacity_units, self.throughput.write_capacity_units
        ));

        let mut out = format!("CREATE TABLE {} ({})", self.name, decls.join(", "));
        for index in &self.global_indexes {
            out.push(' ');
            out.push_str(&index.schema());
        }
        out.push(';');
        out
    }
}

impl fmt::Display for TableMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeDefinition, IndexDescription, Projection};

    fn sample_description() -> TableDescription {
        TableDescription {
            table_name: "posts".to_owned(),
            table_status: Some("ACTIVE".to_owned()),
            attribute_definitions: vec![
                AttributeDefinition {
                    attribute_name: "author".to_owned(),
                    attribute_type: AttrType::String,
                },
                AttributeDefinition {
                    attribute_name: "posted".to_owned(),
                    attribute_type: AttrType::Number,
                },
                AttributeDefinition {
                    attribute_name: "score".to_owned(),
                    attribute_type: AttrType::Number,
                },
                AttributeDefinition {
                    attribute_name: "topic".to_owned(),
                    attribute_type: AttrType::String,
                },
            ],
            key_schema: vec![
                KeySchemaElement::new("author", KeyType::Hash),
                KeySchemaElement::new("posted", KeyType::Range),
            ],
            provisioned_throughput: Some(Throughput::new(5, 5)),
            local_secondary_indexes: vec![IndexDescription {
                index_name: "score-idx".to_owned(),
                key_schema: vec![
                    KeySchemaElement::new("author", KeyType::Hash),
                    KeySchemaElement::new("score", KeyType::Range),
                ],
                projection: Projection::default(),
                provisioned_throughput: None,
                item_count: None,
                index_size_bytes: None,
            }],
            global_secondary_indexes: vec![IndexDescription {
                index_name: "topic-idx".to_owned(),
                key_schema: vec![
                    KeySchemaElement::new("topic", KeyType::Hash),
                    KeySchemaElement::new("posted", KeyType::Range),
                ],
                projection: Projection {
                    projection_type: ProjectionClass::KeysOnly,
                    non_key_attributes: Vec::new(),
                },
                provisioned_throughput: Some(Throughput::new(2, 1)),
                item_count: None,
                index_size_bytes: None,
            }],
            item_count: Some(10),
            table_size_bytes: Some(4096),
        }
    }

    #[test]
    fn test_should_build_meta_from_description() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        assert_eq!(meta.hash_key.name, "author");
        assert_eq!(meta.range_key.as_ref().unwrap().name, "posted");
        assert_eq!(meta.local_indexes.len(), 1);
        assert_eq!(meta.global_indexes.len(), 1);
    }

    #[test]
    fn test_should_error_when_hash_key_missing() {
        let mut desc = sample_description();
        desc.key_schema.retain(|e| e.key_type != KeyType::Hash);
        let result = TableMeta::from_description(&desc);
        assert!(matches!(result, Err(SchemaError::MissingHashKey { .. })));
    }

    #[test]
    fn test_should_enumerate_indexes_table_first_then_sorted() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        let names: Vec<String> = meta
            .iter_query_indexes()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["TABLE", "score-idx", "topic-idx"]);
    }

    #[test]
    fn test_should_prefer_range_matching_indexes() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        let hash: HashSet<String> = ["author".to_owned()].into();
        let range: HashSet<String> = ["score".to_owned()].into();
        let matches = meta.get_matching_indexes(&hash, &range);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "score-idx");
    }

    #[test]
    fn test_should_fall_back_to_hash_only_matches() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        let hash: HashSet<String> = ["author".to_owned()].into();
        let matches = meta.get_matching_indexes(&hash, &HashSet::new());
        let names: Vec<&str> = matches.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["TABLE", "score-idx"]);
    }

    #[test]
    fn test_should_match_global_index_hash_key() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        let hash: HashSet<String> = ["topic".to_owned()].into();
        let matches = meta.get_matching_indexes(&hash, &HashSet::new());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "topic-idx");
        assert!(matches[0].is_global);
    }

    #[test]
    fn test_should_report_projected_attributes_for_keys_only() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        let index = meta.get_index("topic-idx").unwrap();
        let projected = index.attributes.as_ref().unwrap();
        assert!(projected.contains("author"));
        assert!(projected.contains("posted"));
        assert!(projected.contains("topic"));
        assert!(!projected.contains("score"));

        let wanted: HashSet<String> = ["topic".to_owned(), "score".to_owned()].into();
        assert!(!index.projects_all_attributes(Some(&wanted)));
        assert!(!index.projects_all_attributes(None));
    }

    #[test]
    fn test_should_mark_only_global_indexes_scannable() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        assert!(meta.get_index("TABLE").unwrap().scannable());
        assert!(meta.get_index("topic-idx").unwrap().scannable());
        assert!(!meta.get_index("score-idx").unwrap().scannable());
    }

    #[test]
    fn test_should_extract_primary_key_from_item() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        let mut item = std::collections::HashMap::new();
        item.insert("author".to_owned(), Value::from("alice"));
        item.insert("posted".to_owned(), Value::from(3));
        item.insert("extra".to_owned(), Value::from("x"));
        let key = meta.primary_key_from_item(&item).unwrap();
        assert_eq!(key.len(), 2);
        assert_eq!(key["author"], Value::from("alice"));
    }

    #[test]
    fn test_should_require_range_value_when_building_key() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        let result = meta.primary_key(Value::from("alice"), None);
        assert!(matches!(result, Err(SchemaError::MissingKeyValue { .. })));
    }

    #[test]
    fn test_should_render_schema_as_create_statement() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        let schema = meta.schema();
        assert!(schema.starts_with("CREATE TABLE posts ("));
        assert!(schema.contains("author STRING HASH KEY"));
        assert!(schema.contains("posted NUMBER RANGE KEY"));
        assert!(schema.contains("score NUMBER ALL INDEX('score-idx')"));
        assert!(schema.contains("topic STRING"));
        assert!(schema.contains("THROUGHPUT (5, 5)"));
        assert!(schema.contains("GLOBAL KEYS INDEX ('topic-idx', topic, posted, THROUGHPUT (2, 1))"));
        assert!(schema.ends_with(';'));
    }

    #[test]
    fn test_should_sum_total_throughput() {
        let meta = TableMeta::from_description(&sample_description()).unwrap();
        assert_eq!(meta.total_read_throughput(), 7);
        assert_eq!(meta.total_write_throughput(), 6);
    }
}
