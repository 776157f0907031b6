//! Typed statement AST produced by the parser.
//!
//! Every statement kind is a closed enum variant with exhaustive matching
//! downstream; there is no stringly-typed dispatch. Literal values stay
//! unresolved here ([`Literal`]) so variable references can be resolved
//! against the ambient scope (and, for updates, against each row) at
//! execution time.

use dynaql_model::{AttrType, ProjectionClass};

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

/// An unresolved literal as parsed from query text.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// A numeric literal, kept as raw text until resolution.
    Num {
        /// The digits as written (no sign).
        text: String,
        /// Whether a unary minus preceded the number.
        negative: bool,
    },
    /// A quoted string.
    Str(String),
    /// `TRUE` or `FALSE`.
    Bool(bool),
    /// `NULL`.
    Null,
    /// A binary literal `b'...'`.
    Binary(Vec<u8>),
    /// A set literal `(v, ...)`; the empty-set literal `()` is
    /// `Set(vec![])`, distinct from an empty grouping which never parses.
    Set(Vec<Literal>),
    /// A list literal `[v, ...]`.
    List(Vec<Literal>),
    /// A map literal `{"key": v, ...}`.
    Map(Vec<(String, Literal)>),
    /// An identifier to be resolved against the ambient scope.
    Var(String),
    /// `NOW()` / `UTCNOW()`.
    Now {
        /// Whether the UTC variant was used.
        utc: bool,
    },
    /// `TIMESTAMP(x)` / `UTCTIMESTAMP(x)` (and the `TS`/`UTCTS` aliases).
    Timestamp {
        /// Whether the UTC variant was used.
        utc: bool,
        /// The argument literal (string, number, or variable).
        arg: Box<Literal>,
    },
    /// A timestamp expression with interval offsets applied, e.g.
    /// `NOW() - INTERVAL '1 day'`.
    TsOffset {
        /// The base timestamp expression.
        base: Box<Literal>,
        /// Offsets applied in order; `true` means subtraction. The string
        /// is the raw interval spec (e.g. `"1 day 2 hours"`).
        offsets: Vec<(bool, String)>,
    },
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Comparison operators usable in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>` (also written `!=`; normalized one-way at construction).
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// The backend spelling of this operator (`!=` never appears).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named predicate functions usable in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondFunction {
    /// `attribute_exists(f)` (also `f IS NOT NULL`).
    AttributeExists,
    /// `attribute_not_exists(f)` (also `f IS NULL`).
    AttributeNotExists,
    /// `begins_with(f, v)` (also `f BEGINS WITH v`).
    BeginsWith,
    /// `contains(f, v)` (also `f CONTAINS v`).
    Contains,
    /// `attribute_type(f, t)`.
    AttributeType,
}

impl CondFunction {
    /// The backend function name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttributeExists => "attribute_exists",
            Self::AttributeNotExists => "attribute_not_exists",
            Self::BeginsWith => "begins_with",
            Self::Contains => "contains",
            Self::AttributeType => "attribute_type",
        }
    }
}

/// The right-hand side of a comparison: a literal or another field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOrLiteral {
    /// A field reference.
    Field(String),
    /// A literal value.
    Literal(Literal),
}

/// A parsed (unresolved) WHERE/FILTER condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    /// `field op value-or-field`.
    Compare {
        /// The constrained field.
        field: String,
        /// The operator.
        op: CompareOp,
        /// The right-hand side.
        value: FieldOrLiteral,
    },
    /// `field BETWEEN low AND high`.
    Between {
        /// The constrained field.
        field: String,
        /// Lower bound (inclusive).
        low: Literal,
        /// Upper bound (inclusive).
        high: Literal,
    },
    /// `field IN (v, ...)`.
    In {
        /// The constrained field.
        field: String,
        /// Candidate values.
        values: Vec<Literal>,
    },
    /// A predicate function call.
    Function {
        /// The function.
        name: CondFunction,
        /// The field argument.
        field: String,
        /// The second argument, when the function takes one.
        operand: Option<Literal>,
    },
    /// `size(field) op value`.
    Size {
        /// The field whose size is tested.
        field: String,
        /// The operator.
        op: CompareOp,
        /// The comparison value.
        value: Literal,
    },
    /// Conjunction of two or more conditions with one joining operator.
    Junction {
        /// `true` for AND, `false` for OR.
        is_and: bool,
        /// The joined conditions.
        exprs: Vec<ConditionExpr>,
    },
    /// `NOT expr`.
    Not(Box<ConditionExpr>),
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Arithmetic operators usable in selection expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl ArithOp {
    /// The operator character.
    #[must_use]
    pub fn as_char(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }
}

/// A parsed selection expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectExprAst {
    /// A field reference.
    Field(String),
    /// A literal value.
    Literal(Literal),
    /// Binary arithmetic.
    Arith {
        /// The operator.
        op: ArithOp,
        /// Left operand.
        left: Box<SelectExprAst>,
        /// Right operand.
        right: Box<SelectExprAst>,
    },
    /// `NOW()` / `UTCNOW()`.
    Now {
        /// Whether the UTC variant was used.
        utc: bool,
    },
    /// `TIMESTAMP(expr)` / `UTCTIMESTAMP(expr)`.
    Timestamp {
        /// Whether the UTC variant was used.
        utc: bool,
        /// The inner expression.
        inner: Box<SelectExprAst>,
    },
}

/// The projection clause of a SELECT.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionAst {
    /// `*`, the identity projection.
    All,
    /// `COUNT(*)`, which short-circuits projection entirely.
    CountStar,
    /// An explicit projection list with optional aliases.
    List(Vec<NamedSelectAst>),
}

/// One projection entry with its optional `AS` alias.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSelectAst {
    /// The expression.
    pub expr: SelectExprAst,
    /// The alias, if one was given.
    pub alias: Option<String>,
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// Operators usable in a SET entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    /// `=`
    Assign,
    /// `+=`
    AddAssign,
    /// `-=`
    SubAssign,
    /// `<<` (set union).
    Append,
    /// `>>` (set difference).
    Detach,
}

/// An operand in an update right-hand side: a reference (row field or
/// session variable, resolved per row) or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum OperandAst {
    /// An identifier resolved per row (row fields shadow session scope).
    Ref(String),
    /// A literal value.
    Lit(Literal),
}

/// The right-hand side of a SET entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SetRhsAst {
    /// A plain operand.
    Operand(OperandAst),
    /// `left (+|-) right`.
    Arith {
        /// `true` for addition, `false` for subtraction.
        add: bool,
        /// Left operand.
        left: OperandAst,
        /// Right operand.
        right: OperandAst,
    },
    /// `if_not_exists(field, default)`.
    IfNotExists(String, OperandAst),
    /// `list_append(a, b)`.
    ListAppend(OperandAst, OperandAst),
}

/// One entry of a SET clause.
#[derive(Debug, Clone, PartialEq)]
pub struct SetEntryAst {
    /// The target field.
    pub field: String,
    /// The operator.
    pub op: SetOp,
    /// The right-hand side.
    pub rhs: SetRhsAst,
}

/// The parsed update clauses of an UPDATE statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateClausesAst {
    /// SET entries.
    pub set: Vec<SetEntryAst>,
    /// REMOVE fields.
    pub remove: Vec<String>,
    /// Explicit ADD pairs.
    pub add: Vec<(String, Literal)>,
    /// Explicit DELETE pairs.
    pub delete: Vec<(String, Literal)>,
}

impl UpdateClausesAst {
    /// Returns `true` if no clause was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty() && self.add.is_empty() && self.delete.is_empty()
    }
}

/// What an UPDATE returns per mutated item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnValues {
    /// Nothing (the default).
    #[default]
    None,
    /// The whole item as it was before the update.
    AllOld,
    /// The whole item as it is after the update.
    AllNew,
    /// Only the updated attributes, pre-update.
    UpdatedOld,
    /// Only the updated attributes, post-update.
    UpdatedNew,
}

impl ReturnValues {
    /// The wire-format string for the store call.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::AllOld => "ALL_OLD",
            Self::AllNew => "ALL_NEW",
            Self::UpdatedOld => "UPDATED_OLD",
            Self::UpdatedNew => "UPDATED_NEW",
        }
    }
}

// ---------------------------------------------------------------------------
// WHERE clause
// ---------------------------------------------------------------------------

/// A primary key tuple in a `WHERE KEYS IN` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyTuple {
    /// The hash key value.
    pub hash: Literal,
    /// The range key value, for tables with a range key.
    pub range: Option<Literal>,
}

/// The WHERE clause of a read or mutation statement.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// A constraint tree.
    Conditions(ConditionExpr),
    /// An explicit list of primary keys.
    KeysIn(Vec<KeyTuple>),
}

// ---------------------------------------------------------------------------
// Schema statements
// ---------------------------------------------------------------------------

/// The key/index role of a declared attribute in CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrRoleAst {
    /// `HASH KEY`.
    HashKey,
    /// `RANGE KEY`.
    RangeKey,
    /// `[ALL|KEYS|INCLUDE] INDEX('name'[, ['incl', ...]])`: a local index
    /// using this attribute as its range key.
    Index {
        /// The projection class (default `ALL`).
        projection: ProjectionClass,
        /// The index name.
        name: String,
        /// Included attributes for `INCLUDE` projections.
        includes: Vec<String>,
    },
    /// A plain attribute definition with no key role.
    Plain,
}

/// One attribute declaration in CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrDeclAst {
    /// The attribute name.
    pub name: String,
    /// The declared type.
    pub attr_type: AttrType,
    /// The key/index role.
    pub role: AttrRoleAst,
}

/// A GLOBAL INDEX clause in CREATE TABLE or ALTER TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalIndexAst {
    /// The projection class (default `ALL`).
    pub projection: ProjectionClass,
    /// The index name.
    pub name: String,
    /// Hash key name with optional inline type (required if the attribute
    /// is not declared elsewhere).
    pub hash: (String, Option<AttrType>),
    /// Optional range key name with optional inline type.
    pub range: Option<(String, Option<AttrType>)>,
    /// Included attributes for `INCLUDE` projections.
    pub includes: Vec<String>,
    /// Optional provisioned throughput.
    pub throughput: Option<(i64, i64)>,
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// Whether a consistent read was requested.
    pub consistent: bool,
    /// The projection.
    pub selection: SelectionAst,
    /// The table to read.
    pub table: String,
    /// The WHERE clause.
    pub where_clause: WhereClause,
    /// An explicitly named index (`USING`).
    pub using: Option<String>,
    /// Maximum number of items to return.
    pub limit: Option<u64>,
    /// Maximum number of items to examine (`SCAN LIMIT`).
    pub scan_limit: Option<u64>,
    /// `ORDER BY` field; must name the selected index's range key.
    pub order_by: Option<String>,
    /// `true` for DESC, `false` for ASC; `None` if unspecified.
    pub descending: Option<bool>,
}

/// A SCAN statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanStatement {
    /// The table to scan.
    pub table: String,
    /// The FILTER condition, if any.
    pub filter: Option<ConditionExpr>,
    /// Maximum number of items to return.
    pub limit: Option<u64>,
    /// A global index to scan instead of the base table.
    pub using: Option<String>,
}

/// A COUNT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CountStatement {
    /// Whether a consistent read was requested.
    pub consistent: bool,
    /// The table to count.
    pub table: String,
    /// The WHERE condition.
    pub where_clause: ConditionExpr,
    /// An explicitly named index.
    pub using: Option<String>,
}

/// The row data of an INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertData {
    /// `(a, b) VALUES (1, 2), (3, 4)`.
    Positional {
        /// Column names.
        columns: Vec<String>,
        /// Row value tuples.
        rows: Vec<Vec<Literal>>,
    },
    /// `(a=1, b=2), (a=3)` shorthand.
    Keyed(Vec<Vec<(String, Literal)>>),
}

/// An INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// The target table.
    pub table: String,
    /// The row data.
    pub data: InsertData,
}

/// An UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    /// The target table.
    pub table: String,
    /// The update clauses.
    pub clauses: UpdateClausesAst,
    /// The WHERE clause; absent means every item in the table.
    pub where_clause: Option<WhereClause>,
    /// An explicitly named index for the driving query.
    pub using: Option<String>,
    /// What to return per mutated item.
    pub returns: ReturnValues,
}

/// A DELETE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    /// The target table.
    pub table: String,
    /// The WHERE clause.
    pub where_clause: WhereClause,
    /// An explicitly named index for the driving query.
    pub using: Option<String>,
}

/// A CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateStatement {
    /// Whether `IF NOT EXISTS` was given.
    pub if_not_exists: bool,
    /// The table name.
    pub table: String,
    /// Attribute declarations.
    pub attrs: Vec<AttrDeclAst>,
    /// Table throughput, if declared.
    pub throughput: Option<(i64, i64)>,
    /// Global index clauses.
    pub global_indexes: Vec<GlobalIndexAst>,
}

/// A DROP TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DropStatement {
    /// Whether `IF EXISTS` was given.
    pub if_exists: bool,
    /// The table name.
    pub table: String,
}

/// The action of an ALTER TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    /// `SET [INDEX i] THROUGHPUT (r, w)`.
    SetThroughput {
        /// The index to change, or `None` for the table itself.
        index: Option<String>,
        /// The new read/write capacity.
        throughput: (i64, i64),
    },
    /// `DROP INDEX i [IF EXISTS]`.
    DropIndex {
        /// The index name.
        index: String,
        /// Whether `IF EXISTS` was given.
        if_exists: bool,
    },
    /// `CREATE GLOBAL ... INDEX (...) [IF NOT EXISTS]`.
    CreateIndex {
        /// The index specification.
        spec: GlobalIndexAst,
        /// Whether `IF NOT EXISTS` was given.
        if_not_exists: bool,
    },
}

/// An ALTER TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterStatement {
    /// The table name.
    pub table: String,
    /// The alteration to apply.
    pub action: AlterAction,
}

/// A DUMP SCHEMA statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpStatement {
    /// The tables to dump; empty means all tables.
    pub tables: Vec<String>,
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// SELECT.
    Select(SelectStatement),
    /// SCAN.
    Scan(ScanStatement),
    /// COUNT.
    Count(CountStatement),
    /// INSERT.
    Insert(InsertStatement),
    /// UPDATE.
    Update(UpdateStatement),
    /// DELETE.
    Delete(DeleteStatement),
    /// CREATE TABLE.
    Create(CreateStatement),
    /// DROP TABLE.
    Drop(DropStatement),
    /// ALTER TABLE.
    Alter(AlterStatement),
    /// DUMP SCHEMA.
    Dump(DumpStatement),
    /// EXPLAIN wrapping another statement.
    Explain(Box<Statement>),
    /// ANALYZE wrapping another statement.
    Analyze(Box<Statement>),
}
