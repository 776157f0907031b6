//! Recursive-descent parser for query statements.
//!
//! Turns the token stream into the typed [`Statement`] AST. Keywords are
//! matched case-insensitively against identifier tokens; every failure
//! carries the byte offset of the offending token so callers can render a
//! caret against the original source.

use dynaql_model::{AttrType, ProjectionClass};

use super::ast::{
    AlterAction, AlterStatement, ArithOp, AttrDeclAst, AttrRoleAst, CompareOp, CondFunction,
    ConditionExpr, CountStatement, CreateStatement, DeleteStatement, DropStatement, DumpStatement,
    FieldOrLiteral, GlobalIndexAst, InsertData, InsertStatement, KeyTuple, Literal, NamedSelectAst,
    OperandAst, ReturnValues, ScanStatement, SelectExprAst, SelectStatement, SelectionAst,
    SetEntryAst, SetOp, SetRhsAst, Statement, UpdateClausesAst, UpdateStatement, WhereClause,
};
use super::lexer::{Spanned, Tok, tokenize};
use crate::error::ParseError;

/// Valid second arguments to `attribute_type()`.
const TYPE_DESCRIPTORS: [&str; 10] = ["S", "SS", "N", "NS", "B", "BS", "NULL", "BOOL", "L", "M"];

/// Parse one or more `;`-separated statements.
pub fn parse(input: &str) -> Result<Vec<Statement>, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens);
    let mut statements = Vec::new();
    loop {
        while parser.eat(&Tok::Semi) {}
        if parser.at_end() {
            return Ok(statements);
        }
        statements.push(parser.parse_statement()?);
        if !parser.at_end() && !parser.check(&Tok::Semi) {
            return Err(parser.unexpected("';' or end of input"));
        }
    }
}

/// Parse exactly one statement.
pub fn parse_statement(input: &str) -> Result<Statement, ParseError> {
    let mut statements = parse(input)?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        0 => Err(ParseError::new("empty statement", 0)),
        _ => Err(ParseError::new("expected a single statement", 0)),
    }
}

/// Parse a bare condition fragment (a WHERE clause body).
///
/// Used for diagnostics and for verifying that rendered constraint
/// expressions re-parse to the same tree.
pub fn parse_condition(input: &str) -> Result<ConditionExpr, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens);
    let cond = parser.parse_or()?;
    if !parser.at_end() {
        return Err(parser.unexpected("end of condition"));
    }
    Ok(cond)
}

// ---------------------------------------------------------------------------
// Parser core
// ---------------------------------------------------------------------------

/// Token-stream cursor with keyword helpers.
#[derive(Debug)]
struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).map_or(&Tok::Eof, |s| &s.tok)
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        self.tokens
            .get(self.pos + ahead)
            .map_or(&Tok::Eof, |s| &s.tok)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |s| s.offset)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), ParseError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.unexpected(&tok.to_string()))
        }
    }

    /// Returns `true` if the current token is the given keyword.
    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Ident(id) if id.eq_ignore_ascii_case(kw))
    }

    /// Returns `true` if the token `ahead` positions from here is the keyword.
    fn is_kw_at(&self, ahead: usize, kw: &str) -> bool {
        matches!(self.peek_at(ahead), Tok::Ident(id) if id.eq_ignore_ascii_case(kw))
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("keyword '{}'", kw.to_uppercase())))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::new(
            format!("expected {expected}, found {}", self.peek()),
            self.offset(),
        )
    }

    /// Parse a bare identifier (keywords allowed where unambiguous).
    fn parse_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Tok::Ident(_) => {
                let Tok::Ident(name) = self.advance() else {
                    unreachable!()
                };
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// Parse a table name: identifiers optionally joined by dots.
    fn parse_table(&mut self) -> Result<String, ParseError> {
        let mut name = self.parse_ident("table name")?;
        while self.check(&Tok::Dot) {
            self.advance();
            name.push('.');
            name.push_str(&self.parse_ident("table name")?);
        }
        Ok(name)
    }

    /// Parse a field path: `name`, `info.rating`, `tags[0]`.
    fn parse_field(&mut self) -> Result<String, ParseError> {
        let mut field = self.parse_ident("field name")?;
        loop {
            if self.check(&Tok::Dot) {
                self.advance();
                field.push('.');
                field.push_str(&self.parse_ident("field name")?);
            } else if self.check(&Tok::LBracket) {
                self.advance();
                let Tok::Num(index) = self.advance() else {
                    return Err(self.unexpected("list index"));
                };
                self.expect(&Tok::RBracket)?;
                field.push('[');
                field.push_str(&index);
                field.push(']');
            } else {
                return Ok(field);
            }
        }
    }

    /// Parse a field name that may be quoted.
    fn parse_field_or_quoted(&mut self) -> Result<String, ParseError> {
        if let Tok::Str(_) = self.peek() {
            let Tok::Str(name) = self.advance() else {
                unreachable!()
            };
            Ok(name)
        } else {
            self.parse_field()
        }
    }

    /// Parse an unsigned integer token.
    fn parse_u64(&mut self, what: &str) -> Result<u64, ParseError> {
        let offset = self.offset();
        let Tok::Num(text) = self.advance() else {
            return Err(ParseError::new(format!("expected {what}"), offset));
        };
        text.parse()
            .map_err(|_| ParseError::new(format!("invalid {what} '{text}'"), offset))
    }

    fn parse_i64(&mut self, what: &str) -> Result<i64, ParseError> {
        let offset = self.offset();
        let Tok::Num(text) = self.advance() else {
            return Err(ParseError::new(format!("expected {what}"), offset));
        };
        text.parse()
            .map_err(|_| ParseError::new(format!("invalid {what} '{text}'"), offset))
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

impl Parser {
    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if self.eat_kw("explain") {
            return Ok(Statement::Explain(Box::new(self.parse_statement()?)));
        }
        if self.eat_kw("analyze") {
            return Ok(Statement::Analyze(Box::new(self.parse_statement()?)));
        }
        if self.eat_kw("select") {
            return self.parse_select();
        }
        if self.eat_kw("scan") {
            return self.parse_scan();
        }
        if self.eat_kw("count") {
            return self.parse_count();
        }
        if self.eat_kw("insert") {
            return self.parse_insert();
        }
        if self.eat_kw("update") {
            return self.parse_update();
        }
        if self.eat_kw("delete") {
            return self.parse_delete();
        }
        if self.eat_kw("create") {
            return self.parse_create();
        }
        if self.eat_kw("drop") {
            return self.parse_drop();
        }
        if self.eat_kw("alter") {
            return self.parse_alter();
        }
        if self.eat_kw("dump") {
            return self.parse_dump();
        }
        Err(self.unexpected("a statement keyword"))
    }

    fn parse_select(&mut self) -> Result<Statement, ParseError> {
        let consistent = self.eat_kw("consistent");
        let selection = self.parse_selection()?;
        self.expect_kw("from")?;
        let table = self.parse_table()?;
        self.expect_kw("where")?;
        let where_offset = self.offset();
        let where_clause = self.parse_where_body()?;

        let mut stmt = SelectStatement {
            consistent,
            selection,
            table,
            where_clause,
            using: None,
            limit: None,
            scan_limit: None,
            order_by: None,
            descending: None,
        };

        loop {
            if self.eat_kw("using") {
                stmt.using = Some(self.parse_index_name()?);
            } else if self.is_kw("scan") && self.is_kw_at(1, "limit") {
                self.advance();
                self.advance();
                stmt.scan_limit = Some(self.parse_u64("scan limit")?);
            } else if self.eat_kw("limit") {
                stmt.limit = Some(self.parse_u64("limit")?);
            } else if self.eat_kw("order") {
                self.expect_kw("by")?;
                stmt.order_by = Some(self.parse_field()?);
            } else if self.eat_kw("asc") {
                stmt.descending = Some(false);
            } else if self.eat_kw("desc") {
                stmt.descending = Some(true);
            } else {
                break;
            }
        }

        if matches!(stmt.where_clause, WhereClause::KeysIn(_)) {
            if stmt.limit.is_some() || stmt.scan_limit.is_some() {
                return Err(ParseError::new(
                    "cannot use LIMIT with WHERE KEYS IN",
                    where_offset,
                ));
            }
            if stmt.using.is_some() {
                return Err(ParseError::new(
                    "cannot use USING with WHERE KEYS IN",
                    where_offset,
                ));
            }
            if stmt.selection != SelectionAst::All {
                return Err(ParseError::new(
                    "must SELECT * when using WHERE KEYS IN",
                    where_offset,
                ));
            }
        }

        Ok(Statement::Select(stmt))
    }

    fn parse_scan(&mut self) -> Result<Statement, ParseError> {
        let table = self.parse_table()?;
        let mut stmt = ScanStatement {
            table,
            filter: None,
            limit: None,
            using: None,
        };
        loop {
            if self.eat_kw("filter") {
                stmt.filter = Some(self.parse_or()?);
            } else if self.eat_kw("limit") {
                stmt.limit = Some(self.parse_u64("limit")?);
            } else if self.eat_kw("using") {
                stmt.using = Some(self.parse_index_name()?);
            } else {
                break;
            }
        }
        Ok(Statement::Scan(stmt))
    }

    fn parse_count(&mut self) -> Result<Statement, ParseError> {
        let consistent = self.eat_kw("consistent");
        let table = self.parse_table()?;
        self.expect_kw("where")?;
        let where_clause = self.parse_or()?;
        let using = if self.eat_kw("using") {
            Some(self.parse_index_name()?)
        } else {
            None
        };
        Ok(Statement::Count(CountStatement {
            consistent,
            table,
            where_clause,
            using,
        }))
    }

    fn parse_insert(&mut self) -> Result<Statement, ParseError> {
        self.expect_kw("into")?;
        let table = self.parse_table()?;
        self.expect(&Tok::LParen)?;

        // `(a = 1, ...)` is the keyed shorthand; `(a, b) VALUES ...` is the
        // positional form. One token of lookahead distinguishes them.
        if matches!(self.peek(), Tok::Ident(_)) && self.peek_at(1) == &Tok::Eq {
            let mut rows = vec![self.parse_keyed_row()?];
            while self.eat(&Tok::Comma) {
                self.expect(&Tok::LParen)?;
                rows.push(self.parse_keyed_row()?);
            }
            return Ok(Statement::Insert(InsertStatement {
                table,
                data: InsertData::Keyed(rows),
            }));
        }

        let mut columns = vec![self.parse_ident("column name")?];
        while self.eat(&Tok::Comma) {
            columns.push(self.parse_ident("column name")?);
        }
        self.expect(&Tok::RParen)?;
        self.expect_kw("values")?;

        let mut rows = Vec::new();
        loop {
            let offset = self.offset();
            self.expect(&Tok::LParen)?;
            let mut row = vec![self.parse_literal()?];
            while self.eat(&Tok::Comma) {
                row.push(self.parse_literal()?);
            }
            self.expect(&Tok::RParen)?;
            if row.len() != columns.len() {
                return Err(ParseError::new(
                    format!(
                        "row has {} values but {} columns were named",
                        row.len(),
                        columns.len()
                    ),
                    offset,
                ));
            }
            rows.push(row);
            if !self.eat(&Tok::Comma) {
                break;
            }
        }

        Ok(Statement::Insert(InsertStatement {
            table,
            data: InsertData::Positional { columns, rows },
        }))
    }

    /// Parse the remainder of a `(k=v, ...)` group; the `(` is consumed.
    fn parse_keyed_row(&mut self) -> Result<Vec<(String, Literal)>, ParseError> {
        let mut row = Vec::new();
        loop {
            let field = self.parse_ident("attribute name")?;
            self.expect(&Tok::Eq)?;
            row.push((field, self.parse_literal()?));
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen)?;
        Ok(row)
    }

    fn parse_update(&mut self) -> Result<Statement, ParseError> {
        let table = self.parse_table()?;
        let clauses_offset = self.offset();
        let mut clauses = UpdateClausesAst::default();

        loop {
            if self.eat_kw("set") {
                clauses.set.push(self.parse_set_entry()?);
                while self.eat(&Tok::Comma) {
                    clauses.set.push(self.parse_set_entry()?);
                }
            } else if self.eat_kw("remove") {
                clauses.remove.push(self.parse_field()?);
                while self.eat(&Tok::Comma) {
                    clauses.remove.push(self.parse_field()?);
                }
            } else if self.eat_kw("add") {
                let (field, value) = self.parse_field_value()?;
                clauses.add.push((field, value));
                while self.eat(&Tok::Comma) {
                    let (field, value) = self.parse_field_value()?;
                    clauses.add.push((field, value));
                }
            } else if self.is_kw("delete") {
                self.advance();
                let (field, value) = self.parse_field_value()?;
                clauses.delete.push((field, value));
                while self.eat(&Tok::Comma) {
                    let (field, value) = self.parse_field_value()?;
                    clauses.delete.push((field, value));
                }
            } else {
                break;
            }
        }

        if clauses.is_empty() {
            return Err(ParseError::new(
                "UPDATE requires at least one SET, REMOVE, ADD, or DELETE clause",
                clauses_offset,
            ));
        }

        let where_offset = self.offset();
        let where_clause = if self.eat_kw("where") {
            Some(self.parse_where_body()?)
        } else {
            None
        };
        let using = if self.eat_kw("using") {
            Some(self.parse_index_name()?)
        } else {
            None
        };
        if using.is_some() && matches!(where_clause, Some(WhereClause::KeysIn(_))) {
            return Err(ParseError::new(
                "cannot use USING with WHERE KEYS IN",
                where_offset,
            ));
        }
        let returns = self.parse_returns()?;

        Ok(Statement::Update(UpdateStatement {
            table,
            clauses,
            where_clause,
            using,
            returns,
        }))
    }

    fn parse_set_entry(&mut self) -> Result<SetEntryAst, ParseError> {
        let field = self.parse_field()?;
        let op = match self.peek() {
            Tok::Eq => SetOp::Assign,
            Tok::PlusEq => SetOp::AddAssign,
            Tok::MinusEq => SetOp::SubAssign,
            Tok::Shl => SetOp::Append,
            Tok::Shr => SetOp::Detach,
            _ => return Err(self.unexpected("'=', '+=', '-=', '<<', or '>>'")),
        };
        self.advance();

        let rhs = if op == SetOp::Assign {
            self.parse_set_rhs()?
        } else {
            SetRhsAst::Operand(self.parse_operand()?)
        };
        Ok(SetEntryAst { field, op, rhs })
    }

    fn parse_set_rhs(&mut self) -> Result<SetRhsAst, ParseError> {
        if self.is_kw("if_not_exists") && self.peek_at(1) == &Tok::LParen {
            self.advance();
            self.advance();
            let field = self.parse_field()?;
            self.expect(&Tok::Comma)?;
            let default = self.parse_operand()?;
            self.expect(&Tok::RParen)?;
            return Ok(SetRhsAst::IfNotExists(field, default));
        }
        if self.is_kw("list_append") && self.peek_at(1) == &Tok::LParen {
            self.advance();
            self.advance();
            let first = self.parse_operand()?;
            self.expect(&Tok::Comma)?;
            let second = self.parse_operand()?;
            self.expect(&Tok::RParen)?;
            return Ok(SetRhsAst::ListAppend(first, second));
        }

        let first = self.parse_operand()?;
        match self.peek() {
            Tok::Plus => {
                self.advance();
                let second = self.parse_operand()?;
                Ok(SetRhsAst::Arith {
                    add: true,
                    left: first,
                    right: second,
                })
            }
            Tok::Minus => {
                self.advance();
                let second = self.parse_operand()?;
                Ok(SetRhsAst::Arith {
                    add: false,
                    left: first,
                    right: second,
                })
            }
            _ => Ok(SetRhsAst::Operand(first)),
        }
    }

    /// Parse an update operand: an identifier reference or a literal.
    fn parse_operand(&mut self) -> Result<OperandAst, ParseError> {
        if matches!(self.peek(), Tok::Ident(_)) && !self.ident_starts_literal() {
            let field = self.parse_field()?;
            return Ok(OperandAst::Ref(field));
        }
        Ok(OperandAst::Lit(self.parse_literal()?))
    }

    /// Returns `true` if the current identifier token begins a literal:
    /// `TRUE`/`FALSE`/`NULL` always do; the timestamp function names only
    /// when followed by `(` (they are ordinary field names otherwise).
    fn ident_starts_literal(&self) -> bool {
        let Tok::Ident(id) = self.peek() else {
            return false;
        };
        match id.to_ascii_lowercase().as_str() {
            "true" | "false" | "null" => true,
            "now" | "utcnow" | "timestamp" | "ts" | "utctimestamp" | "utcts" => {
                self.peek_at(1) == &Tok::LParen
            }
            _ => false,
        }
    }

    fn parse_field_value(&mut self) -> Result<(String, Literal), ParseError> {
        let field = self.parse_field()?;
        let value = self.parse_literal()?;
        Ok((field, value))
    }

    fn parse_returns(&mut self) -> Result<ReturnValues, ParseError> {
        if !self.eat_kw("returns") {
            return Ok(ReturnValues::None);
        }
        if self.eat_kw("none") {
            return Ok(ReturnValues::None);
        }
        if self.eat_kw("all") {
            if self.eat_kw("old") {
                return Ok(ReturnValues::AllOld);
            }
            self.expect_kw("new")?;
            return Ok(ReturnValues::AllNew);
        }
        self.expect_kw("updated")?;
        if self.eat_kw("old") {
            return Ok(ReturnValues::UpdatedOld);
        }
        self.expect_kw("new")?;
        Ok(ReturnValues::UpdatedNew)
    }

    fn parse_delete(&mut self) -> Result<Statement, ParseError> {
        self.expect_kw("from")?;
        let table = self.parse_table()?;
        self.expect_kw("where")?;
        let where_offset = self.offset();
        let where_clause = self.parse_where_body()?;
        let using = if self.eat_kw("using") {
            Some(self.parse_index_name()?)
        } else {
            None
        };
        if using.is_some() && matches!(where_clause, WhereClause::KeysIn(_)) {
            return Err(ParseError::new(
                "cannot use USING with WHERE KEYS IN",
                where_offset,
            ));
        }
        Ok(Statement::Delete(DeleteStatement {
            table,
            where_clause,
            using,
        }))
    }

    fn parse_create(&mut self) -> Result<Statement, ParseError> {
        self.expect_kw("table")?;
        let if_not_exists = self.parse_if_not_exists()?;
        let table = self.parse_table()?;
        self.expect(&Tok::LParen)?;

        let mut attrs = Vec::new();
        let mut throughput = None;
        loop {
            if self.eat_kw("throughput") {
                throughput = Some(self.parse_throughput_args()?);
            } else {
                attrs.push(self.parse_attr_decl()?);
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen)?;

        let mut global_indexes = Vec::new();
        while self.eat_kw("global") {
            global_indexes.push(self.parse_global_index()?);
        }

        Ok(Statement::Create(CreateStatement {
            if_not_exists,
            table,
            attrs,
            throughput,
            global_indexes,
        }))
    }

    fn parse_attr_decl(&mut self) -> Result<AttrDeclAst, ParseError> {
        let name = self.parse_ident("attribute name")?;
        let attr_type = self.parse_attr_type()?;

        let role = if self.is_kw("hash") {
            self.advance();
            self.expect_kw("key")?;
            AttrRoleAst::HashKey
        } else if self.is_kw("range") {
            self.advance();
            self.expect_kw("key")?;
            AttrRoleAst::RangeKey
        } else if self.is_kw("index")
            || self.is_kw("all")
            || self.is_kw("keys")
            || self.is_kw("include")
        {
            let projection = self.parse_projection_class();
            self.expect_kw("index")?;
            self.expect(&Tok::LParen)?;
            let index_name = self.parse_quoted_name("index name")?;
            let includes = if self.eat(&Tok::Comma) {
                self.parse_include_list()?
            } else {
                Vec::new()
            };
            self.expect(&Tok::RParen)?;
            AttrRoleAst::Index {
                projection,
                name: index_name,
                includes,
            }
        } else {
            AttrRoleAst::Plain
        };

        Ok(AttrDeclAst {
            name,
            attr_type,
            role,
        })
    }

    fn parse_attr_type(&mut self) -> Result<AttrType, ParseError> {
        if self.eat_kw("string") {
            Ok(AttrType::String)
        } else if self.eat_kw("number") {
            Ok(AttrType::Number)
        } else if self.eat_kw("binary") {
            Ok(AttrType::Binary)
        } else {
            Err(self.unexpected("STRING, NUMBER, or BINARY"))
        }
    }

    /// Parse an optional projection-class keyword; defaults to `ALL`.
    fn parse_projection_class(&mut self) -> ProjectionClass {
        if self.eat_kw("keys") {
            ProjectionClass::KeysOnly
        } else if self.eat_kw("include") {
            ProjectionClass::Include
        } else {
            self.eat_kw("all");
            ProjectionClass::All
        }
    }

    /// Parse a `GLOBAL ... INDEX (...)` clause; the `GLOBAL` keyword is
    /// consumed.
    fn parse_global_index(&mut self) -> Result<GlobalIndexAst, ParseError> {
        let projection = self.parse_projection_class();
        self.expect_kw("index")?;
        self.expect(&Tok::LParen)?;
        let name = self.parse_quoted_name("index name")?;
        self.expect(&Tok::Comma)?;

        let hash = self.parse_index_key()?;
        let mut range = None;
        let mut includes = Vec::new();
        let mut throughput = None;

        while self.eat(&Tok::Comma) {
            if self.eat_kw("throughput") {
                throughput = Some(self.parse_throughput_args()?);
            } else if self.check(&Tok::LBracket) {
                includes = self.parse_include_list()?;
            } else if range.is_none() {
                range = Some(self.parse_index_key()?);
            } else {
                return Err(self.unexpected("'[', THROUGHPUT, or ')'"));
            }
        }
        self.expect(&Tok::RParen)?;

        Ok(GlobalIndexAst {
            projection,
            name,
            hash,
            range,
            includes,
            throughput,
        })
    }

    /// Parse a global-index key: `name [STRING|NUMBER|BINARY]`.
    fn parse_index_key(&mut self) -> Result<(String, Option<AttrType>), ParseError> {
        let name = self.parse_ident("key attribute name")?;
        let attr_type = if self.is_kw("string") || self.is_kw("number") || self.is_kw("binary") {
            Some(self.parse_attr_type()?)
        } else {
            None
        };
        Ok((name, attr_type))
    }

    /// Parse `['a', 'b', ...]`.
    fn parse_include_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&Tok::LBracket)?;
        let mut includes = vec![self.parse_quoted_name("attribute name")?];
        while self.eat(&Tok::Comma) {
            includes.push(self.parse_quoted_name("attribute name")?);
        }
        self.expect(&Tok::RBracket)?;
        Ok(includes)
    }

    /// Parse the `(r, w)` argument list of a THROUGHPUT clause.
    fn parse_throughput_args(&mut self) -> Result<(i64, i64), ParseError> {
        self.expect(&Tok::LParen)?;
        let read = self.parse_i64("read capacity")?;
        self.expect(&Tok::Comma)?;
        let write = self.parse_i64("write capacity")?;
        self.expect(&Tok::RParen)?;
        Ok((read, write))
    }

    /// Parse a name given as a quoted string or bare identifier.
    fn parse_quoted_name(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Tok::Str(_) => {
                let Tok::Str(name) = self.advance() else {
                    unreachable!()
                };
                Ok(name)
            }
            Tok::Ident(_) => self.parse_ident(what),
            _ => Err(self.unexpected(what)),
        }
    }

    /// An index name in `USING`: bare or quoted.
    fn parse_index_name(&mut self) -> Result<String, ParseError> {
        self.parse_quoted_name("index name")
    }

    fn parse_if_not_exists(&mut self) -> Result<bool, ParseError> {
        if self.eat_kw("if") {
            self.expect_kw("not")?;
            self.expect_kw("exists")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_if_exists(&mut self) -> Result<bool, ParseError> {
        if self.eat_kw("if") {
            self.expect_kw("exists")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_drop(&mut self) -> Result<Statement, ParseError> {
        self.expect_kw("table")?;
        let if_exists = self.parse_if_exists()?;
        let table = self.parse_table()?;
        Ok(Statement::Drop(DropStatement { if_exists, table }))
    }

    fn parse_alter(&mut self) -> Result<Statement, ParseError> {
        self.expect_kw("table")?;
        let table = self.parse_table()?;

        let action = if self.eat_kw("set") {
            let index = if self.eat_kw("index") {
                Some(self.parse_index_name()?)
            } else {
                None
            };
            self.expect_kw("throughput")?;
            let throughput = self.parse_throughput_args()?;
            AlterAction::SetThroughput { index, throughput }
        } else if self.eat_kw("drop") {
            self.expect_kw("index")?;
            let index = self.parse_index_name()?;
            let if_exists = self.parse_if_exists()?;
            AlterAction::DropIndex { index, if_exists }
        } else if self.eat_kw("create") {
            self.expect_kw("global")?;
            let spec = self.parse_global_index()?;
            let if_not_exists = self.parse_if_not_exists()?;
            AlterAction::CreateIndex {
                spec,
                if_not_exists,
            }
        } else {
            return Err(self.unexpected("SET, DROP INDEX, or CREATE GLOBAL INDEX"));
        };

        Ok(Statement::Alter(AlterStatement { table, action }))
    }

    fn parse_dump(&mut self) -> Result<Statement, ParseError> {
        self.expect_kw("schema")?;
        let mut tables = Vec::new();
        if matches!(self.peek(), Tok::Ident(_)) {
            tables.push(self.parse_table()?);
            while self.eat(&Tok::Comma) {
                tables.push(self.parse_table()?);
            }
        }
        Ok(Statement::Dump(DumpStatement { tables }))
    }
}

// ---------------------------------------------------------------------------
// WHERE clauses and conditions
// ---------------------------------------------------------------------------

impl Parser {
    /// Parse the body following `WHERE`: either `KEYS IN ...` or a condition.
    fn parse_where_body(&mut self) -> Result<WhereClause, ParseError> {
        if self.is_kw("keys") && self.is_kw_at(1, "in") {
            self.advance();
            self.advance();
            let mut keys = vec![self.parse_key_tuple()?];
            while self.eat(&Tok::Comma) {
                keys.push(self.parse_key_tuple()?);
            }
            return Ok(WhereClause::KeysIn(keys));
        }
        Ok(WhereClause::Conditions(self.parse_or()?))
    }

    /// Parse one key tuple: `(hash[, range])` or a bare hash value.
    fn parse_key_tuple(&mut self) -> Result<KeyTuple, ParseError> {
        if self.eat(&Tok::LParen) {
            let hash = self.parse_literal()?;
            let range = if self.eat(&Tok::Comma) {
                Some(self.parse_literal()?)
            } else {
                None
            };
            self.expect(&Tok::RParen)?;
            Ok(KeyTuple { hash, range })
        } else {
            Ok(KeyTuple {
                hash: self.parse_literal()?,
                range: None,
            })
        }
    }

    /// Parse OR-joined conditions (lowest precedence).
    fn parse_or(&mut self) -> Result<ConditionExpr, ParseError> {
        let first = self.parse_and()?;
        if !self.is_kw("or") {
            return Ok(first);
        }
        let mut exprs = junction_children(first, false);
        while self.eat_kw("or") {
            let next = self.parse_and()?;
            exprs.extend(junction_children(next, false));
        }
        Ok(ConditionExpr::Junction {
            is_and: false,
            exprs,
        })
    }

    /// Parse AND-joined conditions.
    fn parse_and(&mut self) -> Result<ConditionExpr, ParseError> {
        let first = self.parse_not()?;
        if !self.is_kw("and") {
            return Ok(first);
        }
        let mut exprs = junction_children(first, true);
        while self.eat_kw("and") {
            let next = self.parse_not()?;
            exprs.extend(junction_children(next, true));
        }
        Ok(ConditionExpr::Junction {
            is_and: true,
            exprs,
        })
    }

    fn parse_not(&mut self) -> Result<ConditionExpr, ParseError> {
        if self.eat_kw("not") {
            let inner = self.parse_not()?;
            return Ok(ConditionExpr::Not(Box::new(inner)));
        }
        self.parse_cond_primary()
    }

    fn parse_cond_primary(&mut self) -> Result<ConditionExpr, ParseError> {
        if self.check(&Tok::LParen) {
            self.advance();
            let inner = self.parse_or()?;
            self.expect(&Tok::RParen)?;
            return Ok(inner);
        }

        // Predicate function calls.
        if let Some(cond) = self.try_parse_cond_function()? {
            return Ok(cond);
        }

        // Field-initiated constraints.
        let field = self.parse_field_or_quoted()?;
        self.parse_field_constraint(field)
    }

    /// Try to parse `attribute_exists(...)`-style function constraints and
    /// `size(f) op v`. Returns `None` if the current token is not one of the
    /// function names followed by `(`.
    fn try_parse_cond_function(&mut self) -> Result<Option<ConditionExpr>, ParseError> {
        let Tok::Ident(id) = self.peek() else {
            return Ok(None);
        };
        if self.peek_at(1) != &Tok::LParen {
            return Ok(None);
        }
        let name = match id.to_ascii_lowercase().as_str() {
            "attribute_exists" => Some((CondFunction::AttributeExists, false)),
            "attribute_not_exists" => Some((CondFunction::AttributeNotExists, false)),
            "begins_with" => Some((CondFunction::BeginsWith, true)),
            "contains" => Some((CondFunction::Contains, true)),
            "attribute_type" => None, // handled below; takes a type descriptor
            "size" => {
                self.advance();
                self.advance();
                let field = self.parse_field_or_quoted()?;
                self.expect(&Tok::RParen)?;
                let op = self.parse_compare_op()?;
                let value = self.parse_literal()?;
                return Ok(Some(ConditionExpr::Size { field, op, value }));
            }
            _ => return Ok(None),
        };

        if let Some((function, has_operand)) = name {
            self.advance();
            self.advance();
            let field = self.parse_field_or_quoted()?;
            let operand = if has_operand {
                self.expect(&Tok::Comma)?;
                Some(self.parse_literal()?)
            } else {
                None
            };
            self.expect(&Tok::RParen)?;
            return Ok(Some(ConditionExpr::Function {
                name: function,
                field,
                operand,
            }));
        }

        // attribute_type(f, t)
        self.advance();
        self.advance();
        let field = self.parse_field_or_quoted()?;
        self.expect(&Tok::Comma)?;
        let descriptor = self.parse_type_descriptor()?;
        self.expect(&Tok::RParen)?;
        Ok(Some(ConditionExpr::Function {
            name: CondFunction::AttributeType,
            field,
            operand: Some(Literal::Str(descriptor)),
        }))
    }

    fn parse_type_descriptor(&mut self) -> Result<String, ParseError> {
        let offset = self.offset();
        let raw = match self.advance() {
            Tok::Ident(id) => id,
            Tok::Str(s) => s,
            other => {
                return Err(ParseError::new(
                    format!("expected a type descriptor, found {other}"),
                    offset,
                ));
            }
        };
        let upper = raw.to_ascii_uppercase();
        if TYPE_DESCRIPTORS.contains(&upper.as_str()) {
            Ok(upper)
        } else {
            Err(ParseError::new(
                format!("unknown type descriptor '{raw}'"),
                offset,
            ))
        }
    }

    /// Parse the constraint that follows a field name.
    fn parse_field_constraint(&mut self, field: String) -> Result<ConditionExpr, ParseError> {
        // Comparison operator.
        if matches!(
            self.peek(),
            Tok::Eq | Tok::Ne | Tok::Lt | Tok::Le | Tok::Gt | Tok::Ge
        ) {
            let op = self.parse_compare_op()?;
            let value = self.parse_field_or_literal()?;
            return Ok(ConditionExpr::Compare { field, op, value });
        }

        if self.eat_kw("between") {
            let low = self.parse_literal()?;
            self.expect_kw("and")?;
            let high = self.parse_literal()?;
            return Ok(ConditionExpr::Between { field, low, high });
        }

        if self.eat_kw("in") {
            self.expect(&Tok::LParen)?;
            let mut values = vec![self.parse_literal()?];
            while self.eat(&Tok::Comma) {
                values.push(self.parse_literal()?);
            }
            self.expect(&Tok::RParen)?;
            return Ok(ConditionExpr::In { field, values });
        }

        if self.eat_kw("is") {
            // IS NULL -> attribute_not_exists; IS NOT NULL -> attribute_exists.
            let negated = self.eat_kw("not");
            self.expect_kw("null")?;
            let name = if negated {
                CondFunction::AttributeExists
            } else {
                CondFunction::AttributeNotExists
            };
            return Ok(ConditionExpr::Function {
                name,
                field,
                operand: None,
            });
        }

        if self.eat_kw("contains") {
            let operand = self.parse_literal()?;
            return Ok(ConditionExpr::Function {
                name: CondFunction::Contains,
                field,
                operand: Some(operand),
            });
        }

        if self.is_kw("not") && self.is_kw_at(1, "contains") {
            self.advance();
            self.advance();
            let operand = self.parse_literal()?;
            return Ok(ConditionExpr::Not(Box::new(ConditionExpr::Function {
                name: CondFunction::Contains,
                field,
                operand: Some(operand),
            })));
        }

        if self.is_kw("begins") && self.is_kw_at(1, "with") {
            self.advance();
            self.advance();
            let operand = self.parse_literal()?;
            return Ok(ConditionExpr::Function {
                name: CondFunction::BeginsWith,
                field,
                operand: Some(operand),
            });
        }

        Err(self.unexpected("a comparison operator, BETWEEN, IN, IS, CONTAINS, or BEGINS WITH"))
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp, ParseError> {
        let op = match self.peek() {
            Tok::Eq => CompareOp::Eq,
            Tok::Ne => CompareOp::Ne,
            Tok::Lt => CompareOp::Lt,
            Tok::Le => CompareOp::Le,
            Tok::Gt => CompareOp::Gt,
            Tok::Ge => CompareOp::Ge,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        self.advance();
        Ok(op)
    }

    /// Parse the right-hand side of a comparison: another field reference or
    /// a literal. A bare identifier that does not begin a literal is a field.
    fn parse_field_or_literal(&mut self) -> Result<FieldOrLiteral, ParseError> {
        if matches!(self.peek(), Tok::Ident(_)) && !self.ident_starts_literal() {
            return Ok(FieldOrLiteral::Field(self.parse_field()?));
        }
        Ok(FieldOrLiteral::Literal(self.parse_literal()?))
    }
}

/// Flatten nested same-kind junctions so `AND(AND(a,b),c)` and `AND(a,b,c)`
/// are the same tree.
fn junction_children(expr: ConditionExpr, want_and: bool) -> Vec<ConditionExpr> {
    match expr {
        ConditionExpr::Junction { is_and, exprs } if is_and == want_and => exprs,
        other => vec![other],
    }
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

impl Parser {
    /// Parse a literal value, including timestamp expressions and trailing
    /// `± INTERVAL` offsets.
    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let base = self.parse_literal_base()?;

        // `ts ± INTERVAL '...'` chains.
        let mut offsets = Vec::new();
        while (self.check(&Tok::Plus) || self.check(&Tok::Minus))
            && self.is_kw_at(1, "interval")
        {
            let negative = self.advance() == Tok::Minus;
            self.advance(); // INTERVAL
            let offset = self.offset();
            let Tok::Str(spec) = self.advance() else {
                return Err(ParseError::new(
                    "expected a quoted interval after INTERVAL",
                    offset,
                ));
            };
            offsets.push((negative, spec));
        }

        if offsets.is_empty() {
            Ok(base)
        } else {
            Ok(Literal::TsOffset {
                base: Box::new(base),
                offsets,
            })
        }
    }

    fn parse_literal_base(&mut self) -> Result<Literal, ParseError> {
        match self.peek().clone() {
            Tok::Num(text) => {
                self.advance();
                Ok(Literal::Num {
                    text,
                    negative: false,
                })
            }
            Tok::Minus | Tok::Plus => {
                let negative = self.advance() == Tok::Minus;
                let offset = self.offset();
                let Tok::Num(text) = self.advance() else {
                    return Err(ParseError::new("expected a number after sign", offset));
                };
                Ok(Literal::Num { text, negative })
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Literal::Str(s))
            }
            Tok::Bin(b) => {
                self.advance();
                Ok(Literal::Binary(b))
            }
            Tok::LParen => {
                self.advance();
                if self.eat(&Tok::RParen) {
                    // The empty-set literal.
                    return Ok(Literal::Set(Vec::new()));
                }
                let mut items = vec![self.parse_literal()?];
                while self.eat(&Tok::Comma) {
                    items.push(self.parse_literal()?);
                }
                self.expect(&Tok::RParen)?;
                Ok(Literal::Set(items))
            }
            Tok::LBracket => {
                self.advance();
                if self.eat(&Tok::RBracket) {
                    return Ok(Literal::List(Vec::new()));
                }
                let mut items = vec![self.parse_literal()?];
                while self.eat(&Tok::Comma) {
                    items.push(self.parse_literal()?);
                }
                self.expect(&Tok::RBracket)?;
                Ok(Literal::List(items))
            }
            Tok::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                if !self.check(&Tok::RBrace) {
                    loop {
                        let offset = self.offset();
                        let Tok::Str(key) = self.advance() else {
                            return Err(ParseError::new("expected a quoted map key", offset));
                        };
                        self.expect(&Tok::Colon)?;
                        entries.push((key, self.parse_literal()?));
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Tok::RBrace)?;
                Ok(Literal::Map(entries))
            }
            Tok::Ident(id) => {
                let lower = id.to_ascii_lowercase();
                let call = self.peek_at(1) == &Tok::LParen;
                match lower.as_str() {
                    "true" => {
                        self.advance();
                        Ok(Literal::Bool(true))
                    }
                    "false" => {
                        self.advance();
                        Ok(Literal::Bool(false))
                    }
                    "null" => {
                        self.advance();
                        Ok(Literal::Null)
                    }
                    "now" | "utcnow" if call => {
                        self.advance();
                        self.advance();
                        self.expect(&Tok::RParen)?;
                        Ok(Literal::Now {
                            utc: lower == "utcnow",
                        })
                    }
                    "timestamp" | "ts" | "utctimestamp" | "utcts" if call => {
                        self.advance();
                        self.advance();
                        let arg = self.parse_literal()?;
                        self.expect(&Tok::RParen)?;
                        Ok(Literal::Timestamp {
                            utc: lower.starts_with("utc"),
                            arg: Box::new(arg),
                        })
                    }
                    _ => {
                        self.advance();
                        Ok(Literal::Var(id))
                    }
                }
            }
            _ => Err(self.unexpected("a literal value")),
        }
    }
}

// ---------------------------------------------------------------------------
// Selection expressions
// ---------------------------------------------------------------------------

impl Parser {
    fn parse_selection(&mut self) -> Result<SelectionAst, ParseError> {
        if self.eat(&Tok::Star) {
            return Ok(SelectionAst::All);
        }
        if self.is_kw("count") && self.peek_at(1) == &Tok::LParen && self.peek_at(2) == &Tok::Star {
            self.advance();
            self.advance();
            self.advance();
            self.expect(&Tok::RParen)?;
            return Ok(SelectionAst::CountStar);
        }

        let mut entries = vec![self.parse_named_select()?];
        while self.eat(&Tok::Comma) {
            entries.push(self.parse_named_select()?);
        }
        Ok(SelectionAst::List(entries))
    }

    fn parse_named_select(&mut self) -> Result<NamedSelectAst, ParseError> {
        let expr = self.parse_select_expr()?;
        let alias = if self.eat_kw("as") {
            Some(self.parse_ident("alias")?)
        } else {
            None
        };
        Ok(NamedSelectAst { expr, alias })
    }

    /// Additive level: `term (('+'|'-') term)*`.
    fn parse_select_expr(&mut self) -> Result<SelectExprAst, ParseError> {
        let mut left = self.parse_select_term()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => ArithOp::Add,
                Tok::Minus => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_select_term()?;
            left = SelectExprAst::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    /// Multiplicative level: `factor (('*'|'/') factor)*`.
    fn parse_select_term(&mut self) -> Result<SelectExprAst, ParseError> {
        let mut left = self.parse_select_factor()?;
        loop {
            let op = match self.peek() {
                Tok::Star => ArithOp::Mul,
                Tok::Slash => ArithOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_select_factor()?;
            left = SelectExprAst::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_select_factor(&mut self) -> Result<SelectExprAst, ParseError> {
        if self.check(&Tok::LParen) {
            self.advance();
            let inner = self.parse_select_expr()?;
            self.expect(&Tok::RParen)?;
            return Ok(inner);
        }

        if let Tok::Ident(id) = self.peek() {
            let lower = id.to_ascii_lowercase();
            let call = self.peek_at(1) == &Tok::LParen;
            match lower.as_str() {
                "now" | "utcnow" if call => {
                    self.advance();
                    self.advance();
                    self.expect(&Tok::RParen)?;
                    return Ok(SelectExprAst::Now {
                        utc: lower == "utcnow",
                    });
                }
                "timestamp" | "ts" | "utctimestamp" | "utcts" if call => {
                    self.advance();
                    self.advance();
                    let inner = self.parse_select_expr()?;
                    self.expect(&Tok::RParen)?;
                    return Ok(SelectExprAst::Timestamp {
                        utc: lower.starts_with("utc"),
                        inner: Box::new(inner),
                    });
                }
                "true" | "false" | "null" => {
                    return Ok(SelectExprAst::Literal(self.parse_literal()?));
                }
                _ => return Ok(SelectExprAst::Field(self.parse_field()?)),
            }
        }

        Ok(SelectExprAst::Literal(self.parse_literal()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(input: &str) -> SelectStatement {
        match parse_statement(input).unwrap() {
            Statement::Select(s) => s,
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn test_should_parse_simple_select() {
        let stmt = select("SELECT * FROM foobars WHERE foo = 0 AND bar = 'green'");
        assert!(!stmt.consistent);
        assert_eq!(stmt.table, "foobars");
        assert_eq!(stmt.selection, SelectionAst::All);
        let WhereClause::Conditions(ConditionExpr::Junction { is_and, exprs }) = &stmt.where_clause
        else {
            panic!("expected AND junction");
        };
        assert!(is_and);
        assert_eq!(exprs.len(), 2);
        assert!(matches!(
            &exprs[0],
            ConditionExpr::Compare {
                field,
                op: CompareOp::Eq,
                value: FieldOrLiteral::Literal(Literal::Num { text, negative: false })
            } if field == "foo" && text == "0"
        ));
        assert!(matches!(
            &exprs[1],
            ConditionExpr::Compare {
                field,
                op: CompareOp::Eq,
                value: FieldOrLiteral::Literal(Literal::Str(s))
            } if field == "bar" && s == "green"
        ));
    }

    #[test]
    fn test_should_parse_keywords_case_insensitively() {
        let stmt = select("select * from foobars where foo = 1");
        assert_eq!(stmt.table, "foobars");
    }

    #[test]
    fn test_should_flatten_nested_and_junctions() {
        let a = parse_condition("(a = 1 AND b = 2) AND c = 3").unwrap();
        let b = parse_condition("a = 1 AND b = 2 AND c = 3").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_should_normalize_bang_equals() {
        let cond = parse_condition("a != 1").unwrap();
        assert!(matches!(
            cond,
            ConditionExpr::Compare {
                op: CompareOp::Ne,
                ..
            }
        ));
    }

    #[test]
    fn test_should_parse_between_and_in() {
        let cond = parse_condition("a BETWEEN 1 AND 5 AND b IN (1, 2, 3)").unwrap();
        let ConditionExpr::Junction { exprs, .. } = cond else {
            panic!("expected junction");
        };
        assert!(matches!(&exprs[0], ConditionExpr::Between { .. }));
        assert!(matches!(&exprs[1], ConditionExpr::In { values, .. } if values.len() == 3));
    }

    #[test]
    fn test_should_desugar_is_null_to_attribute_not_exists() {
        let cond = parse_condition("a IS NULL").unwrap();
        assert!(matches!(
            cond,
            ConditionExpr::Function {
                name: CondFunction::AttributeNotExists,
                operand: None,
                ..
            }
        ));
        let cond = parse_condition("a IS NOT NULL").unwrap();
        assert!(matches!(
            cond,
            ConditionExpr::Function {
                name: CondFunction::AttributeExists,
                ..
            }
        ));
    }

    #[test]
    fn test_should_desugar_begins_with_and_contains() {
        let cond = parse_condition("a BEGINS WITH 'x'").unwrap();
        assert!(matches!(
            cond,
            ConditionExpr::Function {
                name: CondFunction::BeginsWith,
                ..
            }
        ));
        let cond = parse_condition("a NOT CONTAINS 5").unwrap();
        assert!(matches!(cond, ConditionExpr::Not(_)));
    }

    #[test]
    fn test_should_parse_size_and_attribute_type() {
        let cond = parse_condition("size(a) > 3 AND attribute_type(b, 'N')").unwrap();
        let ConditionExpr::Junction { exprs, .. } = cond else {
            panic!("expected junction");
        };
        assert!(matches!(
            &exprs[0],
            ConditionExpr::Size {
                op: CompareOp::Gt,
                ..
            }
        ));
        assert!(matches!(
            &exprs[1],
            ConditionExpr::Function {
                name: CondFunction::AttributeType,
                operand: Some(Literal::Str(t)),
                ..
            } if t == "N"
        ));
    }

    #[test]
    fn test_should_reject_unknown_type_descriptor() {
        assert!(parse_condition("attribute_type(a, 'XX')").is_err());
    }

    #[test]
    fn test_should_parse_field_to_field_comparison() {
        let cond = parse_condition("a = b").unwrap();
        assert!(matches!(
            cond,
            ConditionExpr::Compare {
                value: FieldOrLiteral::Field(f),
                ..
            } if f == "b"
        ));
    }

    #[test]
    fn test_should_parse_keys_in_clause() {
        let stmt = select("SELECT * FROM foobars WHERE KEYS IN ('a', 1), ('b', 2)");
        let WhereClause::KeysIn(keys) = &stmt.where_clause else {
            panic!("expected KEYS IN");
        };
        assert_eq!(keys.len(), 2);
        assert!(keys[0].range.is_some());
    }

    #[test]
    fn test_should_reject_limit_with_keys_in() {
        let err = parse_statement("SELECT * FROM t WHERE KEYS IN ('a') LIMIT 5").unwrap_err();
        assert!(err.message.contains("LIMIT"));
    }

    #[test]
    fn test_should_reject_projection_with_keys_in() {
        let err = parse_statement("SELECT foo FROM t WHERE KEYS IN ('a')").unwrap_err();
        assert!(err.message.contains("SELECT *"));
    }

    #[test]
    fn test_should_reject_using_with_keys_in() {
        let err = parse_statement("SELECT * FROM t WHERE KEYS IN ('a') USING idx").unwrap_err();
        assert!(err.message.contains("USING"));
    }

    #[test]
    fn test_should_parse_select_options() {
        let stmt = select(
            "SELECT CONSISTENT * FROM t WHERE a = 1 USING 'my-index' LIMIT 10 SCAN LIMIT 100 \
             ORDER BY b DESC",
        );
        assert!(stmt.consistent);
        assert_eq!(stmt.using.as_deref(), Some("my-index"));
        assert_eq!(stmt.limit, Some(10));
        assert_eq!(stmt.scan_limit, Some(100));
        assert_eq!(stmt.order_by.as_deref(), Some("b"));
        assert_eq!(stmt.descending, Some(true));
    }

    #[test]
    fn test_should_parse_count_star_selection() {
        let stmt = select("SELECT COUNT(*) FROM t WHERE a = 1");
        assert_eq!(stmt.selection, SelectionAst::CountStar);
    }

    #[test]
    fn test_should_parse_selection_arithmetic_with_precedence() {
        let stmt = select("SELECT a + b * 2 AS total FROM t WHERE a = 1");
        let SelectionAst::List(entries) = &stmt.selection else {
            panic!("expected list");
        };
        assert_eq!(entries[0].alias.as_deref(), Some("total"));
        // a + (b * 2): the top node is the addition.
        let SelectExprAst::Arith { op, right, .. } = &entries[0].expr else {
            panic!("expected arithmetic");
        };
        assert_eq!(*op, ArithOp::Add);
        assert!(matches!(
            right.as_ref(),
            SelectExprAst::Arith {
                op: ArithOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_should_parse_timestamp_selection_function() {
        let stmt = select("SELECT TIMESTAMP(ts) FROM t WHERE a = 1");
        let SelectionAst::List(entries) = &stmt.selection else {
            panic!("expected list");
        };
        assert!(matches!(
            &entries[0].expr,
            SelectExprAst::Timestamp { utc: false, .. }
        ));
    }

    #[test]
    fn test_should_parse_scan_with_filter() {
        let Statement::Scan(stmt) = parse_statement("SCAN foobars FILTER foo = 1 LIMIT 5").unwrap()
        else {
            panic!("expected Scan");
        };
        assert_eq!(stmt.table, "foobars");
        assert!(stmt.filter.is_some());
        assert_eq!(stmt.limit, Some(5));
    }

    #[test]
    fn test_should_parse_count_statement() {
        let Statement::Count(stmt) =
            parse_statement("COUNT CONSISTENT foobars WHERE foo = 1 USING idx").unwrap()
        else {
            panic!("expected Count");
        };
        assert!(stmt.consistent);
        assert_eq!(stmt.using.as_deref(), Some("idx"));
    }

    #[test]
    fn test_should_parse_positional_insert() {
        let Statement::Insert(stmt) =
            parse_statement("INSERT INTO foobars (foo, bar) VALUES (1, 'a'), (2, 'b')").unwrap()
        else {
            panic!("expected Insert");
        };
        let InsertData::Positional { columns, rows } = &stmt.data else {
            panic!("expected positional data");
        };
        assert_eq!(columns, &["foo", "bar"]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_should_reject_mismatched_insert_row_width() {
        assert!(parse_statement("INSERT INTO t (a, b) VALUES (1)").is_err());
    }

    #[test]
    fn test_should_parse_keyed_insert() {
        let Statement::Insert(stmt) =
            parse_statement("INSERT INTO t (a=1, b='x'), (a=2)").unwrap()
        else {
            panic!("expected Insert");
        };
        let InsertData::Keyed(rows) = &stmt.data else {
            panic!("expected keyed data");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn test_should_parse_update_with_all_clause_kinds() {
        let Statement::Update(stmt) = parse_statement(
            "UPDATE t SET a = 1, b += 2, c << (3) REMOVE d ADD e 4 DELETE f (5) \
             WHERE id = 'x' RETURNS ALL NEW",
        )
        .unwrap() else {
            panic!("expected Update");
        };
        assert_eq!(stmt.clauses.set.len(), 3);
        assert_eq!(stmt.clauses.remove, vec!["d".to_owned()]);
        assert_eq!(stmt.clauses.add.len(), 1);
        assert_eq!(stmt.clauses.delete.len(), 1);
        assert_eq!(stmt.returns, ReturnValues::AllNew);
        assert_eq!(stmt.clauses.set[1].op, SetOp::AddAssign);
        assert_eq!(stmt.clauses.set[2].op, SetOp::Append);
    }

    #[test]
    fn test_should_parse_update_set_with_field_arithmetic() {
        let Statement::Update(stmt) =
            parse_statement("UPDATE t SET x = x + 4 WHERE id = 'a'").unwrap()
        else {
            panic!("expected Update");
        };
        let SetRhsAst::Arith { add, left, right } = &stmt.clauses.set[0].rhs else {
            panic!("expected arithmetic rhs");
        };
        assert!(add);
        assert!(matches!(left, OperandAst::Ref(f) if f == "x"));
        assert!(matches!(
            right,
            OperandAst::Lit(Literal::Num { text, .. }) if text == "4"
        ));
    }

    #[test]
    fn test_should_parse_update_set_functions() {
        let Statement::Update(stmt) = parse_statement(
            "UPDATE t SET a = if_not_exists(a, 0), b = list_append(b, [1]) WHERE id = 'a'",
        )
        .unwrap() else {
            panic!("expected Update");
        };
        assert!(matches!(&stmt.clauses.set[0].rhs, SetRhsAst::IfNotExists(f, _) if f == "a"));
        assert!(matches!(&stmt.clauses.set[1].rhs, SetRhsAst::ListAppend(_, _)));
    }

    #[test]
    fn test_should_reject_update_without_clauses() {
        assert!(parse_statement("UPDATE t WHERE id = 'a'").is_err());
    }

    #[test]
    fn test_should_parse_delete_statement() {
        let Statement::Delete(stmt) =
            parse_statement("DELETE FROM t WHERE id = 'a' USING idx").unwrap()
        else {
            panic!("expected Delete");
        };
        assert_eq!(stmt.table, "t");
        assert_eq!(stmt.using.as_deref(), Some("idx"));
    }

    #[test]
    fn test_should_parse_create_table() {
        let Statement::Create(stmt) = parse_statement(
            "CREATE TABLE IF NOT EXISTS posts (\
             author STRING HASH KEY, posted NUMBER RANGE KEY, \
             score NUMBER INDEX('score-idx'), topic STRING, THROUGHPUT (5, 5)) \
             GLOBAL KEYS INDEX ('topic-idx', topic, posted, THROUGHPUT (2, 1))",
        )
        .unwrap() else {
            panic!("expected Create");
        };
        assert!(stmt.if_not_exists);
        assert_eq!(stmt.attrs.len(), 4);
        assert_eq!(stmt.throughput, Some((5, 5)));
        assert!(matches!(stmt.attrs[0].role, AttrRoleAst::HashKey));
        assert!(matches!(stmt.attrs[1].role, AttrRoleAst::RangeKey));
        assert!(matches!(
            &stmt.attrs[2].role,
            AttrRoleAst::Index { name, projection: ProjectionClass::All, .. } if name == "score-idx"
        ));
        assert!(matches!(stmt.attrs[3].role, AttrRoleAst::Plain));
        assert_eq!(stmt.global_indexes.len(), 1);
        let gsi = &stmt.global_indexes[0];
        assert_eq!(gsi.projection, ProjectionClass::KeysOnly);
        assert_eq!(gsi.hash.0, "topic");
        assert_eq!(gsi.range.as_ref().unwrap().0, "posted");
        assert_eq!(gsi.throughput, Some((2, 1)));
    }

    #[test]
    fn test_should_parse_create_with_inline_gsi_key_types() {
        let Statement::Create(stmt) = parse_statement(
            "CREATE TABLE t (id STRING HASH KEY) \
             GLOBAL INCLUDE INDEX ('g', foo STRING, ['a', 'b'])",
        )
        .unwrap() else {
            panic!("expected Create");
        };
        let gsi = &stmt.global_indexes[0];
        assert_eq!(gsi.hash.1, Some(AttrType::String));
        assert_eq!(gsi.includes, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn test_should_parse_drop_table() {
        let Statement::Drop(stmt) = parse_statement("DROP TABLE IF EXISTS t").unwrap() else {
            panic!("expected Drop");
        };
        assert!(stmt.if_exists);
        assert_eq!(stmt.table, "t");
    }

    #[test]
    fn test_should_parse_alter_variants() {
        let Statement::Alter(stmt) =
            parse_statement("ALTER TABLE t SET INDEX foo THROUGHPUT (1, 2)").unwrap()
        else {
            panic!("expected Alter");
        };
        assert!(matches!(
            stmt.action,
            AlterAction::SetThroughput {
                index: Some(_),
                throughput: (1, 2)
            }
        ));

        let Statement::Alter(stmt) =
            parse_statement("ALTER TABLE t DROP INDEX foo IF EXISTS").unwrap()
        else {
            panic!("expected Alter");
        };
        assert!(matches!(
            stmt.action,
            AlterAction::DropIndex {
                if_exists: true,
                ..
            }
        ));

        let Statement::Alter(stmt) = parse_statement(
            "ALTER TABLE t CREATE GLOBAL ALL INDEX ('g', foo STRING) IF NOT EXISTS",
        )
        .unwrap() else {
            panic!("expected Alter");
        };
        assert!(matches!(
            stmt.action,
            AlterAction::CreateIndex {
                if_not_exists: true,
                ..
            }
        ));
    }

    #[test]
    fn test_should_parse_dump_schema() {
        let Statement::Dump(stmt) = parse_statement("DUMP SCHEMA a, b").unwrap() else {
            panic!("expected Dump");
        };
        assert_eq!(stmt.tables, vec!["a".to_owned(), "b".to_owned()]);

        let Statement::Dump(stmt) = parse_statement("DUMP SCHEMA").unwrap() else {
            panic!("expected Dump");
        };
        assert!(stmt.tables.is_empty());
    }

    #[test]
    fn test_should_parse_explain_wrapper() {
        let stmt = parse_statement("EXPLAIN SELECT * FROM t WHERE a = 1").unwrap();
        assert!(matches!(stmt, Statement::Explain(inner) if matches!(*inner, Statement::Select(_))));
    }

    #[test]
    fn test_should_parse_multiple_statements() {
        let statements = parse("DROP TABLE a; DROP TABLE b;").unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_should_ignore_comments() {
        let statements = parse("-- leading comment\nDROP TABLE a; -- trailing\n").unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_should_report_offset_for_unknown_option_token() {
        let err = parse("SELECT * FROM t WHERE a = 1 FROB").unwrap_err();
        assert_eq!(err.offset, 28);
    }

    #[test]
    fn test_should_parse_timestamp_literals_in_conditions() {
        let cond = parse_condition("ts > NOW() - INTERVAL '1 hour'").unwrap();
        let ConditionExpr::Compare {
            value: FieldOrLiteral::Literal(Literal::TsOffset { base, offsets }),
            ..
        } = cond
        else {
            panic!("expected timestamp offset literal");
        };
        assert!(matches!(*base, Literal::Now { utc: false }));
        assert_eq!(offsets, vec![(true, "1 hour".to_owned())]);
    }

    #[test]
    fn test_should_parse_variable_reference_in_literal_position() {
        let cond = parse_condition("a IN (x, 2)").unwrap();
        let ConditionExpr::In { values, .. } = cond else {
            panic!("expected IN");
        };
        assert!(matches!(&values[0], Literal::Var(v) if v == "x"));
    }

    #[test]
    fn test_should_parse_empty_set_literal() {
        let cond = parse_condition("a = ()").unwrap();
        assert!(matches!(
            cond,
            ConditionExpr::Compare {
                value: FieldOrLiteral::Literal(Literal::Set(items)),
                ..
            } if items.is_empty()
        ));
    }

    #[test]
    fn test_should_parse_nested_collection_literals() {
        let cond = parse_condition("a = {'k': [1, 2], 'j': (3, 4)}").unwrap();
        let ConditionExpr::Compare {
            value: FieldOrLiteral::Literal(Literal::Map(entries)),
            ..
        } = cond
        else {
            panic!("expected map literal");
        };
        assert_eq!(entries.len(), 2);
    }
}
