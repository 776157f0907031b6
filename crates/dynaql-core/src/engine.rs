//! The statement execution engine.
//!
//! [`Engine`] owns the session: the storage collaborator, the table-metadata
//! cache, the variable scope, and the allow-scans safety switch. Execution is
//! single-threaded and synchronous; a statement's parse, resolution,
//! planning, and store calls all happen inside [`Engine::execute`], and read
//! results are returned as lazy row streams that the caller drives.
//!
//! `EXPLAIN` wraps any statement: store calls are recorded instead of
//! issued (reads yield no rows, so mutations driven by reads record one
//! representative per-item call).

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use dynaql_model::{
    AttrType, AttributeDefinition, IndexDescription, Item, Key, KeySchemaElement, KeyType,
    Projection, TableMeta, Throughput, Value,
};

use crate::error::EngineError;
use crate::expr::{Constraint, Encoder, Projected, Selection, UpdateExpression};
use crate::lang::ast::{
    AlterAction, AlterStatement, AttrRoleAst, CountStatement, CreateStatement, DeleteStatement,
    DropStatement, DumpStatement, GlobalIndexAst, InsertData, InsertStatement, KeyTuple,
    ReturnValues, ScanStatement, SelectStatement, Statement, UpdateStatement, WhereClause,
};
use crate::lang::parser::parse_statement;
use crate::planner::{Plan, QueryPlan, select_index, validate_scan_index};
use crate::resolver::{Scope, resolve};
use crate::store::{
    CreateTableRequest, ItemStream, QueryRequest, ScanRequest, StoreError, TableStore,
    TableUpdate, UpdateItemRequest,
};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One output row: ordered named cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The cells in projection order (alphabetical for `SELECT *`).
    pub columns: Vec<(String, Projected)>,
}

impl Row {
    /// Build an identity row from a raw item, columns sorted by name.
    #[must_use]
    pub fn from_item(item: &Item) -> Self {
        let mut keys: Vec<&String> = item.keys().collect();
        keys.sort();
        Self {
            columns: keys
                .into_iter()
                .map(|k| (k.clone(), Projected::Val(item[k].clone())))
                .collect(),
        }
    }

    /// Look up a cell by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Projected> {
        self.columns
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

/// A lazy stream of output rows.
pub type RowStream = Box<dyn Iterator<Item = Result<Row, EngineError>>>;

/// A store call that a statement would issue, recorded by `EXPLAIN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCall {
    /// The collaborator method name.
    pub method: &'static str,
    /// A rendering of the call's arguments.
    pub detail: String,
}

impl std::fmt::Display for PlannedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.method, self.detail)
    }
}

/// The result of executing one statement.
pub enum QueryResult {
    /// A status message (mutations, schema changes).
    Status(String),
    /// A scalar count.
    Count(u64),
    /// A lazy sequence of rows.
    Rows(RowStream),
    /// Rendered schema text (`DUMP SCHEMA`).
    Schema(String),
    /// The calls an `EXPLAIN`ed statement would issue.
    Explain(Vec<PlannedCall>),
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(s) => f.debug_tuple("Status").field(s).finish(),
            Self::Count(n) => f.debug_tuple("Count").field(n).finish(),
            Self::Rows(_) => f.write_str("Rows(..)"),
            Self::Schema(s) => f.debug_tuple("Schema").field(s).finish(),
            Self::Explain(calls) => f.debug_tuple("Explain").field(calls).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A single query session bound to one storage collaborator.
#[derive(Debug)]
pub struct Engine<S> {
    store: Rc<S>,
    metadata: HashMap<String, TableMeta>,
    scope: Scope,
    allow_scan: bool,
    explain_log: Option<Vec<PlannedCall>>,
}

impl<S: TableStore + 'static> Engine<S> {
    /// Create an engine over a store. Scans are disallowed until explicitly
    /// enabled.
    pub fn new(store: S) -> Self {
        Self {
            store: Rc::new(store),
            metadata: HashMap::new(),
            scope: Scope::new(),
            allow_scan: false,
            explain_log: None,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Allow or forbid silent degradation of queries to full scans.
    pub fn allow_scans(&mut self, allow: bool) {
        self.allow_scan = allow;
    }

    /// Bind a session variable usable in literal positions.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.scope.set(name, value);
    }

    /// The session variable scope.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Fetch (or return cached) metadata for a table.
    pub fn describe(&mut self, table: &str, refresh: bool) -> Result<TableMeta, EngineError> {
        if refresh || !self.metadata.contains_key(table) {
            let desc = self.store.describe_table(table)?;
            let meta = TableMeta::from_description(&desc)?;
            debug!(table, "fetched table metadata");
            self.metadata.insert(table.to_owned(), meta);
        }
        Ok(self.metadata[table].clone())
    }

    /// Drop a table's cached metadata (schema-mutating statements call this
    /// automatically).
    pub fn invalidate(&mut self, table: &str) {
        self.metadata.remove(table);
    }

    /// Parse and execute a single statement.
    pub fn execute(&mut self, text: &str) -> Result<QueryResult, EngineError> {
        let statement = parse_statement(text)?;
        self.execute_statement(&statement)
    }

    /// Execute an already-parsed statement.
    pub fn execute_statement(&mut self, statement: &Statement) -> Result<QueryResult, EngineError> {
        match statement {
            Statement::Select(s) => self.run_select(s),
            Statement::Scan(s) => self.run_scan(s),
            Statement::Count(s) => self.run_count(s),
            Statement::Insert(s) => self.run_insert(s),
            Statement::Update(s) => self.run_update(s),
            Statement::Delete(s) => self.run_delete(s),
            Statement::Create(s) => self.run_create(s),
            Statement::Drop(s) => self.run_drop(s),
            Statement::Alter(s) => self.run_alter(s),
            Statement::Dump(s) => self.run_dump(s),
            Statement::Explain(inner) => {
                self.explain_log = Some(Vec::new());
                let result = self.execute_statement(inner);
                let calls = self.explain_log.take().unwrap_or_default();
                result?;
                Ok(QueryResult::Explain(calls))
            }
            // Capacity accounting is a host concern; ANALYZE executes the
            // wrapped statement unchanged.
            Statement::Analyze(inner) => self.execute_statement(inner),
        }
    }

    fn explaining(&self) -> bool {
        self.explain_log.is_some()
    }

    fn record(&mut self, method: &'static str, detail: String) {
        if let Some(log) = &mut self.explain_log {
            log.push(PlannedCall { method, detail });
        }
    }

    // -----------------------------------------------------------------------
    // Store-call helpers (explain-aware)
    // -----------------------------------------------------------------------

    fn call_query(&mut self, request: QueryRequest) -> Result<ItemStream, EngineError> {
        if self.explaining() {
            self.record("query", describe_query(&request));
            return Ok(Box::new(std::iter::empty()));
        }
        Ok(self.store.query(request)?)
    }

    fn call_scan(&mut self, request: ScanRequest) -> Result<ItemStream, EngineError> {
        if self.explaining() {
            self.record("scan", describe_scan(&request));
            return Ok(Box::new(std::iter::empty()));
        }
        Ok(self.store.scan(request)?)
    }

    fn call_batch_get(
        &mut self,
        table: &str,
        keys: Vec<Key>,
        consistent: bool,
    ) -> Result<ItemStream, EngineError> {
        if self.explaining() {
            self.record(
                "batch_get",
                format!("table={table}, keys={}, consistent={consistent}", keys.len()),
            );
            return Ok(Box::new(std::iter::empty()));
        }
        Ok(self.store.batch_get(table, keys, consistent)?)
    }

    // -----------------------------------------------------------------------
    // SELECT / SCAN / COUNT
    // -----------------------------------------------------------------------

    fn run_select(&mut self, stmt: &SelectStatement) -> Result<QueryResult, EngineError> {
        let meta = self.describe(&stmt.table, false)?;
        let selection = Selection::from_ast(&stmt.selection, &self.scope)?;

        let stream = match &stmt.where_clause {
            WhereClause::KeysIn(tuples) => {
                let keys = self.resolve_key_tuples(&meta, tuples)?;
                self.call_batch_get(&stmt.table, keys, stmt.consistent)?
            }
            WhereClause::Conditions(cond) => {
                let constraint = Constraint::from_condition(cond, &self.scope)?;
                let plan = select_index(
                    &meta,
                    &constraint,
                    stmt.using.as_deref(),
                    self.allow_scan,
                )?;
                match plan {
                    Plan::Query(plan) => {
                        self.check_order_by(stmt, &plan)?;
                        let request = build_query_request(&stmt.table, &plan, stmt);
                        self.call_query(request)?
                    }
                    Plan::Scan { index, filter } => {
                        if stmt.order_by.is_some() {
                            return Err(EngineError::Syntax(
                                "ORDER BY requires an index query, not a scan".to_owned(),
                            ));
                        }
                        let request =
                            build_scan_request(&stmt.table, index, filter.as_ref(), stmt.limit);
                        self.call_scan(request)?
                    }
                }
            }
        };

        if selection.is_count {
            return Ok(QueryResult::Count(count_stream(stream)?));
        }
        Ok(QueryResult::Rows(project_stream(stream, selection)))
    }

    fn run_scan(&mut self, stmt: &ScanStatement) -> Result<QueryResult, EngineError> {
        let index = match &stmt.using {
            Some(name) => {
                let meta = self.describe(&stmt.table, false)?;
                let validated = validate_scan_index(&meta, name)?;
                if validated == dynaql_model::TABLE_INDEX {
                    None
                } else {
                    Some(validated)
                }
            }
            None => None,
        };
        let filter = stmt
            .filter
            .as_ref()
            .map(|cond| Constraint::from_condition(cond, &self.scope))
            .transpose()?;
        let request = build_scan_request(&stmt.table, index, filter.as_ref(), stmt.limit);
        let stream = self.call_scan(request)?;
        Ok(QueryResult::Rows(project_stream(
            stream,
            Selection {
                exprs: Vec::new(),
                is_count: false,
            },
        )))
    }

    fn run_count(&mut self, stmt: &CountStatement) -> Result<QueryResult, EngineError> {
        let meta = self.describe(&stmt.table, false)?;
        let constraint = Constraint::from_condition(&stmt.where_clause, &self.scope)?;
        let plan = select_index(&meta, &constraint, stmt.using.as_deref(), self.allow_scan)?;
        let stream = match plan {
            Plan::Query(plan) => {
                let mut encoder = Encoder::new();
                let key_condition = plan.key_condition.build(&mut encoder);
                let filter = plan.filter.as_ref().map(|f| f.build(&mut encoder));
                let (names, values) = encoder.into_maps();
                self.call_query(QueryRequest {
                    table: stmt.table.clone(),
                    key_condition,
                    filter,
                    names,
                    values,
                    index: index_param(&plan),
                    limit: None,
                    scan_limit: None,
                    consistent: stmt.consistent,
                    reverse: false,
                })?
            }
            Plan::Scan { index, filter } => {
                let request = build_scan_request(&stmt.table, index, filter.as_ref(), None);
                self.call_scan(request)?
            }
        };
        Ok(QueryResult::Count(count_stream(stream)?))
    }

    // -----------------------------------------------------------------------
    // INSERT
    // -----------------------------------------------------------------------

    fn run_insert(&mut self, stmt: &InsertStatement) -> Result<QueryResult, EngineError> {
        let items = self.resolve_insert_items(&stmt.data)?;
        let mut count = 0u64;
        for item in items {
            if self.explaining() {
                self.record("put_item", format!("table={}", stmt.table));
                count += 1;
                continue;
            }
            self.store
                .put_item(&stmt.table, item)
                .map_err(|e| partial(count, e))?;
            count += 1;
        }
        Ok(QueryResult::Status(format!("Inserted {count} items")))
    }

    fn resolve_insert_items(&self, data: &InsertData) -> Result<Vec<Item>, EngineError> {
        match data {
            InsertData::Positional { columns, rows } => rows
                .iter()
                .map(|row| {
                    let mut item = Item::new();
                    for (column, literal) in columns.iter().zip(row) {
                        item.insert(column.clone(), resolve(literal, &self.scope)?);
                    }
                    Ok(item)
                })
                .collect(),
            InsertData::Keyed(rows) => rows
                .iter()
                .map(|row| {
                    let mut item = Item::new();
                    for (column, literal) in row {
                        item.insert(column.clone(), resolve(literal, &self.scope)?);
                    }
                    Ok(item)
                })
                .collect(),
        }
    }

    // -----------------------------------------------------------------------
    // UPDATE / DELETE
    // -----------------------------------------------------------------------

    fn run_update(&mut self, stmt: &UpdateStatement) -> Result<QueryResult, EngineError> {
        let meta = self.describe(&stmt.table, false)?;
        let expr = UpdateExpression::from_clauses(stmt.clauses.clone())?;
        let returns = stmt.returns;

        // Key-addressed updates go straight to the store without a read.
        if let Some(WhereClause::KeysIn(tuples)) = &stmt.where_clause {
            let keys = self.resolve_key_tuples(&meta, tuples)?;
            return self.apply_updates_by_key(stmt, &expr, keys);
        }

        let stream = self.driving_stream(stmt.table.clone(), &meta, stmt.where_clause.as_ref(),
            stmt.using.as_deref())?;

        if self.explaining() {
            let sample = expr
                .build_actions(&self.scope, &Item::new())
                .map_or_else(|_| "<per-row actions>".to_owned(), render_actions);
            self.record(
                "update_item",
                format!("table={}, key=<per-row>, actions=[{sample}]", stmt.table),
            );
            return Ok(QueryResult::Status("explained".to_owned()));
        }

        let table = stmt.table.clone();
        let scope = self.scope.clone();
        let store = Rc::clone(&self.store);

        if returns == ReturnValues::None {
            let mut count = 0u64;
            for item in stream {
                let item = item.map_err(|e| partial(count, e))?;
                let key = meta.primary_key_from_item(&item)?;
                let actions = expr.build_actions(&scope, &item)?;
                store
                    .update_item(UpdateItemRequest {
                        table: table.clone(),
                        key,
                        actions,
                        returns,
                    })
                    .map_err(|e| partial(count, e))?;
                count += 1;
            }
            return Ok(QueryResult::Status(format!("Updated {count} items")));
        }

        // With RETURNS, mutations apply as the caller drives the stream.
        let rows = stream.map(move |item| {
            let item = item?;
            let key = meta.primary_key_from_item(&item)?;
            let actions = expr.build_actions(&scope, &item)?;
            let returned = store.update_item(UpdateItemRequest {
                table: table.clone(),
                key,
                actions,
                returns,
            })?;
            Ok(Row::from_item(&returned.unwrap_or_default()))
        });
        Ok(QueryResult::Rows(Box::new(rows)))
    }

    fn apply_updates_by_key(
        &mut self,
        stmt: &UpdateStatement,
        expr: &UpdateExpression,
        keys: Vec<Key>,
    ) -> Result<QueryResult, EngineError> {
        let returns = stmt.returns;
        let mut returned_rows = Vec::new();
        let mut count = 0u64;
        for key in keys {
            // There is no pre-read here, so right-hand sides can reference
            // session variables but not the item's own fields.
            let actions = expr.build_actions(&self.scope, &Item::new())?;
            if self.explaining() {
                self.record(
                    "update_item",
                    format!(
                        "table={}, key={}, actions=[{}]",
                        stmt.table,
                        render_key(&key),
                        render_actions(actions)
                    ),
                );
                continue;
            }
            let returned = self
                .store
                .update_item(UpdateItemRequest {
                    table: stmt.table.clone(),
                    key,
                    actions,
                    returns,
                })
                .map_err(|e| partial(count, e))?;
            count += 1;
            if returns != ReturnValues::None {
                returned_rows.push(Ok(Row::from_item(&returned.unwrap_or_default())));
            }
        }
        if returns == ReturnValues::None {
            Ok(QueryResult::Status(format!("Updated {count} items")))
        } else {
            Ok(QueryResult::Rows(Box::new(returned_rows.into_iter())))
        }
    }

    fn run_delete(&mut self, stmt: &DeleteStatement) -> Result<QueryResult, EngineError> {
        let meta = self.describe(&stmt.table, false)?;

        if let WhereClause::KeysIn(tuples) = &stmt.where_clause {
            let keys = self.resolve_key_tuples(&meta, tuples)?;
            let mut count = 0u64;
            for key in keys {
                if self.explaining() {
                    self.record(
                        "delete_item",
                        format!("table={}, key={}", stmt.table, render_key(&key)),
                    );
                    continue;
                }
                self.store
                    .delete_item(&stmt.table, key)
                    .map_err(|e| partial(count, e))?;
                count += 1;
            }
            return Ok(QueryResult::Status(format!("Deleted {count} items")));
        }

        let stream = self.driving_stream(
            stmt.table.clone(),
            &meta,
            Some(&stmt.where_clause),
            stmt.using.as_deref(),
        )?;

        if self.explaining() {
            self.record(
                "delete_item",
                format!("table={}, key=<per-row>", stmt.table),
            );
            return Ok(QueryResult::Status("explained".to_owned()));
        }

        let mut count = 0u64;
        for item in stream {
            let item = item.map_err(|e| partial(count, e))?;
            let key = meta.primary_key_from_item(&item)?;
            self.store
                .delete_item(&stmt.table, key)
                .map_err(|e| partial(count, e))?;
            count += 1;
        }
        Ok(QueryResult::Status(format!("Deleted {count} items")))
    }

    /// The read that drives a bulk mutation: an index query when the WHERE
    /// clause allows one, a scan otherwise (or over the whole table when
    /// there is no WHERE clause at all).
    fn driving_stream(
        &mut self,
        table: String,
        meta: &TableMeta,
        where_clause: Option<&WhereClause>,
        using: Option<&str>,
    ) -> Result<ItemStream, EngineError> {
        let cond = match where_clause {
            None => {
                let request = build_scan_request(&table, None, None, None);
                return self.call_scan(request);
            }
            Some(WhereClause::Conditions(cond)) => cond,
            Some(WhereClause::KeysIn(_)) => {
                // Key-addressed paths are handled by the callers.
                return Err(EngineError::Syntax(
                    "KEYS IN cannot drive a query".to_owned(),
                ));
            }
        };

        let constraint = Constraint::from_condition(cond, &self.scope)?;
        let plan = select_index(meta, &constraint, using, self.allow_scan)?;
        match plan {
            Plan::Query(plan) => {
                let mut encoder = Encoder::new();
                let key_condition = plan.key_condition.build(&mut encoder);
                let filter = plan.filter.as_ref().map(|f| f.build(&mut encoder));
                let (names, values) = encoder.into_maps();
                self.call_query(QueryRequest {
                    table,
                    key_condition,
                    filter,
                    names,
                    values,
                    index: index_param(&plan),
                    limit: None,
                    scan_limit: None,
                    consistent: false,
                    reverse: false,
                })
            }
            Plan::Scan { index, filter } => {
                let request = build_scan_request(&table, index, filter.as_ref(), None);
                self.call_scan(request)
            }
        }
    }

    // -----------------------------------------------------------------------
    // CREATE / DROP / ALTER / DUMP
    // -----------------------------------------------------------------------

    fn run_create(&mut self, stmt: &CreateStatement) -> Result<QueryResult, EngineError> {
        let request = build_create_request(stmt)?;
        self.invalidate(&stmt.table);

        if self.explaining() {
            self.record("create_table", format!("table={}", stmt.table));
            return Ok(QueryResult::Status("explained".to_owned()));
        }

        match self.store.create_table(request) {
            Ok(()) => {}
            Err(StoreError::TableExists(_)) if stmt.if_not_exists => {}
            Err(e) => return Err(e.into()),
        }
        Ok(QueryResult::Status(format!("Created table '{}'", stmt.table)))
    }

    fn run_drop(&mut self, stmt: &DropStatement) -> Result<QueryResult, EngineError> {
        self.invalidate(&stmt.table);

        if self.explaining() {
            self.record("delete_table", format!("table={}", stmt.table));
            return Ok(QueryResult::Status("explained".to_owned()));
        }

        match self.store.delete_table(&stmt.table) {
            Ok(()) => {}
            Err(StoreError::TableNotFound(_)) if stmt.if_exists => {}
            Err(e) => return Err(e.into()),
        }
        Ok(QueryResult::Status(format!("Dropped table '{}'", stmt.table)))
    }

    fn run_alter(&mut self, stmt: &AlterStatement) -> Result<QueryResult, EngineError> {
        self.invalidate(&stmt.table);

        let (update, swallow): (TableUpdate, Option<fn(&StoreError) -> bool>) = match &stmt.action {
            AlterAction::SetThroughput { index, throughput } => {
                let throughput = Throughput::new(throughput.0, throughput.1);
                let update = match index {
                    Some(index) => TableUpdate::IndexThroughput {
                        index: index.clone(),
                        throughput,
                    },
                    None => TableUpdate::Throughput(throughput),
                };
                (update, None)
            }
            AlterAction::DropIndex { index, if_exists } => (
                TableUpdate::DropIndex(index.clone()),
                if *if_exists {
                    Some(|e: &StoreError| matches!(e, StoreError::IndexNotFound(_)))
                } else {
                    None
                },
            ),
            AlterAction::CreateIndex {
                spec,
                if_not_exists,
            } => (
                TableUpdate::CreateIndex(build_index_description(spec)),
                if *if_not_exists {
                    Some(|e: &StoreError| matches!(e, StoreError::IndexExists(_)))
                } else {
                    None
                },
            ),
        };

        if self.explaining() {
            self.record("update_table", format!("table={}, {update:?}", stmt.table));
            return Ok(QueryResult::Status("explained".to_owned()));
        }

        match self.store.update_table(&stmt.table, update) {
            Ok(()) => {}
            Err(e) if swallow.is_some_and(|f| f(&e)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(QueryResult::Status(format!("Altered table '{}'", stmt.table)))
    }

    fn run_dump(&mut self, stmt: &DumpStatement) -> Result<QueryResult, EngineError> {
        let tables = if stmt.tables.is_empty() {
            self.store.list_tables()?
        } else {
            stmt.tables.clone()
        };
        let mut schemas = Vec::new();
        for table in &tables {
            let meta = self.describe(table, true)?;
            schemas.push(meta.schema());
        }
        Ok(QueryResult::Schema(schemas.join("\n\n")))
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    fn resolve_key_tuples(
        &self,
        meta: &TableMeta,
        tuples: &[KeyTuple],
    ) -> Result<Vec<Key>, EngineError> {
        tuples
            .iter()
            .map(|tuple| {
                if tuple.range.is_some() && meta.range_key.is_none() {
                    return Err(EngineError::Syntax(format!(
                        "table '{}' has no range key",
                        meta.name
                    )));
                }
                let hash = resolve(&tuple.hash, &self.scope)?;
                let range = tuple
                    .range
                    .as_ref()
                    .map(|r| resolve(r, &self.scope))
                    .transpose()?;
                Ok(meta.primary_key(hash, range)?)
            })
            .collect()
    }

    fn check_order_by(
        &self,
        stmt: &SelectStatement,
        plan: &QueryPlan,
    ) -> Result<(), EngineError> {
        let Some(order_field) = &stmt.order_by else {
            return Ok(());
        };
        if plan.index.range_key.as_deref() == Some(order_field.as_str()) {
            Ok(())
        } else {
            Err(EngineError::Syntax(format!(
                "cannot ORDER BY '{order_field}'; queries are ordered by the index range key ({})",
                plan.index.range_key.as_deref().unwrap_or("none")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

fn partial(processed: u64, source: StoreError) -> EngineError {
    if processed == 0 {
        EngineError::Store(source)
    } else {
        EngineError::PartialFailure { processed, source }
    }
}

fn index_param(plan: &QueryPlan) -> Option<String> {
    if plan.index.name == dynaql_model::TABLE_INDEX {
        None
    } else {
        Some(plan.index.name.clone())
    }
}

fn build_query_request(table: &str, plan: &QueryPlan, stmt: &SelectStatement) -> QueryRequest {
    let mut encoder = Encoder::new();
    let key_condition = plan.key_condition.build(&mut encoder);
    let filter = plan.filter.as_ref().map(|f| f.build(&mut encoder));
    let (names, values) = encoder.into_maps();
    QueryRequest {
        table: table.to_owned(),
        key_condition,
        filter,
        names,
        values,
        index: index_param(plan),
        limit: stmt.limit,
        scan_limit: stmt.scan_limit,
        consistent: stmt.consistent,
        reverse: stmt.descending == Some(true),
    }
}

fn build_scan_request(
    table: &str,
    index: Option<String>,
    filter: Option<&Constraint>,
    limit: Option<u64>,
) -> ScanRequest {
    let mut encoder = Encoder::new();
    let filter = filter.map(|f| f.build(&mut encoder));
    let (names, values) = encoder.into_maps();
    ScanRequest {
        table: table.to_owned(),
        filter,
        names,
        values,
        index,
        limit,
    }
}

fn declare_attr(attrs: &mut Vec<AttributeDefinition>, name: &str, attr_type: AttrType) {
    if !attrs.iter().any(|a| a.attribute_name == name) {
        attrs.push(AttributeDefinition {
            attribute_name: name.to_owned(),
            attribute_type: attr_type,
        });
    }
}

fn build_create_request(stmt: &CreateStatement) -> Result<CreateTableRequest, EngineError> {
    let mut attrs: Vec<AttributeDefinition> = Vec::new();
    let mut hash_key = None;
    let mut range_key = None;
    let mut local_indexes = Vec::new();

    for attr in &stmt.attrs {
        declare_attr(&mut attrs, &attr.name, attr.attr_type);
        match &attr.role {
            AttrRoleAst::HashKey => {
                if hash_key.replace(attr.name.clone()).is_some() {
                    return Err(EngineError::Syntax(
                        "table declares more than one hash key".to_owned(),
                    ));
                }
            }
            AttrRoleAst::RangeKey => {
                if range_key.replace(attr.name.clone()).is_some() {
                    return Err(EngineError::Syntax(
                        "table declares more than one range key".to_owned(),
                    ));
                }
            }
            AttrRoleAst::Index { .. } | AttrRoleAst::Plain => {}
        }
    }

    let hash_key = hash_key
        .ok_or_else(|| EngineError::Syntax("table declares no hash key".to_owned()))?;

    for attr in &stmt.attrs {
        if let AttrRoleAst::Index {
            projection,
            name,
            includes,
        } = &attr.role
        {
            local_indexes.push(IndexDescription {
                index_name: name.clone(),
                key_schema: vec![
                    KeySchemaElement::new(hash_key.clone(), KeyType::Hash),
                    KeySchemaElement::new(attr.name.clone(), KeyType::Range),
                ],
                projection: Projection {
                    projection_type: *projection,
                    non_key_attributes: includes.clone(),
                },
                provisioned_throughput: None,
                item_count: None,
                index_size_bytes: None,
            });
        }
    }

    let mut global_indexes = Vec::new();
    for spec in &stmt.global_indexes {
        for (key, inline_type) in
            std::iter::once(&spec.hash).chain(spec.range.as_ref().into_iter())
        {
            match inline_type {
                Some(t) => declare_attr(&mut attrs, key, *t),
                None => {
                    if !attrs.iter().any(|a| a.attribute_name == *key) {
                        return Err(EngineError::Syntax(format!(
                            "global index '{}' key '{key}' has no declared type",
                            spec.name
                        )));
                    }
                }
            }
        }
        global_indexes.push(build_index_description(spec));
    }

    let mut key_schema = vec![KeySchemaElement::new(hash_key, KeyType::Hash)];
    if let Some(range) = range_key {
        key_schema.push(KeySchemaElement::new(range, KeyType::Range));
    }

    Ok(CreateTableRequest {
        table: stmt.table.clone(),
        attrs,
        key_schema,
        local_indexes,
        global_indexes,
        throughput: stmt
            .throughput
            .map(|(read, write)| Throughput::new(read, write)),
    })
}

fn build_index_description(spec: &GlobalIndexAst) -> IndexDescription {
    let mut key_schema = vec![KeySchemaElement::new(spec.hash.0.clone(), KeyType::Hash)];
    if let Some((range, _)) = &spec.range {
        key_schema.push(KeySchemaElement::new(range.clone(), KeyType::Range));
    }
    IndexDescription {
        index_name: spec.name.clone(),
        key_schema,
        projection: Projection {
            projection_type: spec.projection,
            non_key_attributes: spec.includes.clone(),
        },
        provisioned_throughput: spec
            .throughput
            .map(|(read, write)| Throughput::new(read, write)),
        item_count: None,
        index_size_bytes: None,
    }
}

fn count_stream(stream: ItemStream) -> Result<u64, EngineError> {
    let mut count = 0u64;
    for item in stream {
        item?;
        count += 1;
    }
    Ok(count)
}

fn project_stream(stream: ItemStream, selection: Selection) -> RowStream {
    Box::new(stream.map(move |item| {
        let item = item?;
        if selection.is_identity() {
            Ok(Row::from_item(&item))
        } else {
            Ok(Row {
                columns: selection.project(&item),
            })
        }
    }))
}

fn describe_query(request: &QueryRequest) -> String {
    let mut out = format!("table={}, key={}", request.table, request.key_condition);
    if let Some(filter) = &request.filter {
        out.push_str(&format!(", filter={filter}"));
    }
    if let Some(index) = &request.index {
        out.push_str(&format!(", index={index}"));
    }
    if let Some(limit) = request.limit {
        out.push_str(&format!(", limit={limit}"));
    }
    if request.consistent {
        out.push_str(", consistent=true");
    }
    if request.reverse {
        out.push_str(", reverse=true");
    }
    out
}

fn describe_scan(request: &ScanRequest) -> String {
    let mut out = format!("table={}", request.table);
    if let Some(filter) = &request.filter {
        out.push_str(&format!(", filter={filter}"));
    }
    if let Some(index) = &request.index {
        out.push_str(&format!(", index={index}"));
    }
    if let Some(limit) = request.limit {
        out.push_str(&format!(", limit={limit}"));
    }
    out
}

fn render_key(key: &Key) -> String {
    let mut parts: Vec<String> = key.iter().map(|(k, v)| format!("{k}={v}")).collect();
    parts.sort();
    format!("{{{}}}", parts.join(", "))
}

fn render_actions(actions: Vec<crate::expr::UpdateAction>) -> String {
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
