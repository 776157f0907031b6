//! The abstract storage collaborator.
//!
//! The engine owns none of the storage implementation; it issues calls
//! through [`TableStore`] and consumes lazily-paginated item streams. Real
//! backends adapt their client here; tests plug in a recording mock.

use std::collections::HashMap;

use dynaql_model::{
    AttributeDefinition, IndexDescription, Item, Key, KeySchemaElement, TableDescription,
    Throughput, Value,
};

use crate::expr::UpdateAction;
use crate::lang::ast::ReturnValues;

/// A lazy stream of items. The caller controls whether and when to advance;
/// nothing is buffered beyond the backend's own pages.
pub type ItemStream = Box<dyn Iterator<Item = Result<Item, StoreError>>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the storage backend.
///
/// The engine propagates these unchanged, except that `IF EXISTS` /
/// `IF NOT EXISTS` statements swallow exactly the not-found / already-exists
/// codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The named table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),
    /// The named table already exists.
    #[error("table already exists: {0}")]
    TableExists(String),
    /// The named index does not exist.
    #[error("index not found: {0}")]
    IndexNotFound(String),
    /// The named index already exists.
    #[error("index already exists: {0}")]
    IndexExists(String),
    /// A conditional write failed its condition.
    #[error("conditional check failed: {0}")]
    ConditionFailed(String),
    /// Provisioned throughput was exceeded.
    #[error("throughput exceeded on table {0}")]
    ThroughputExceeded(String),
    /// The request was malformed.
    #[error("validation error: {0}")]
    Validation(String),
    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A query against a table or index.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// The table to query.
    pub table: String,
    /// The key condition expression (placeholder-encoded).
    pub key_condition: String,
    /// An optional filter expression applied server-side after the key
    /// condition.
    pub filter: Option<String>,
    /// Placeholder-to-name substitutions for both expressions.
    pub names: HashMap<String, String>,
    /// Placeholder-to-value substitutions for both expressions.
    pub values: HashMap<String, Value>,
    /// The index to query, or `None` for the table's own key.
    pub index: Option<String>,
    /// Maximum number of items to return.
    pub limit: Option<u64>,
    /// Maximum number of items to examine.
    pub scan_limit: Option<u64>,
    /// Whether to use a strongly consistent read.
    pub consistent: bool,
    /// Whether to traverse the range key in descending order.
    pub reverse: bool,
}

/// A scan of a table or global index.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    /// The table to scan.
    pub table: String,
    /// An optional filter expression (placeholder-encoded).
    pub filter: Option<String>,
    /// Placeholder-to-name substitutions.
    pub names: HashMap<String, String>,
    /// Placeholder-to-value substitutions.
    pub values: HashMap<String, Value>,
    /// A global index to scan instead of the base table.
    pub index: Option<String>,
    /// Maximum number of items to return.
    pub limit: Option<u64>,
}

/// An update of a single item.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItemRequest {
    /// The table containing the item.
    pub table: String,
    /// The item's primary key.
    pub key: Key,
    /// The actions to apply.
    pub actions: Vec<UpdateAction>,
    /// Which item image to return.
    pub returns: ReturnValues,
}

/// A request to create a table.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableRequest {
    /// The table name.
    pub table: String,
    /// Type definitions for every key and index attribute.
    pub attrs: Vec<AttributeDefinition>,
    /// The table's key schema.
    pub key_schema: Vec<KeySchemaElement>,
    /// Local secondary indexes.
    pub local_indexes: Vec<IndexDescription>,
    /// Global secondary indexes.
    pub global_indexes: Vec<IndexDescription>,
    /// Provisioned throughput.
    pub throughput: Option<Throughput>,
}

/// A schema alteration applied by `updateTable`.
#[derive(Debug, Clone, PartialEq)]
pub enum TableUpdate {
    /// Change the table's provisioned throughput.
    Throughput(Throughput),
    /// Change a global index's provisioned throughput.
    IndexThroughput {
        /// The index name.
        index: String,
        /// The new capacity.
        throughput: Throughput,
    },
    /// Create a new global index.
    CreateIndex(IndexDescription),
    /// Drop a global index.
    DropIndex(String),
}

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// The storage backend as the engine sees it.
pub trait TableStore {
    /// Describe a table's schema and indexes.
    fn describe_table(&self, name: &str) -> Result<TableDescription, StoreError>;

    /// List all table names.
    fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    /// Run an index query.
    fn query(&self, request: QueryRequest) -> Result<ItemStream, StoreError>;

    /// Run a scan.
    fn scan(&self, request: ScanRequest) -> Result<ItemStream, StoreError>;

    /// Fetch a batch of items by primary key.
    fn batch_get(
        &self,
        table: &str,
        keys: Vec<Key>,
        consistent: bool,
    ) -> Result<ItemStream, StoreError>;

    /// Write one item, replacing any existing item with the same key.
    fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError>;

    /// Apply update actions to one item, optionally returning an item image.
    fn update_item(&self, request: UpdateItemRequest) -> Result<Option<Item>, StoreError>;

    /// Delete one item by primary key.
    fn delete_item(&self, table: &str, key: Key) -> Result<(), StoreError>;

    /// Create a table.
    fn create_table(&self, request: CreateTableRequest) -> Result<(), StoreError>;

    /// Delete a table.
    fn delete_table(&self, name: &str) -> Result<(), StoreError>;

    /// Apply a schema alteration.
    fn update_table(&self, table: &str, update: TableUpdate) -> Result<(), StoreError>;
}
