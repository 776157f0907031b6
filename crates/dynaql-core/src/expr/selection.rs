//! Selection (projection) expressions.
//!
//! A [`Selection`] is an ordered list of named projection expressions, each a
//! tree of field references, values, arithmetic, and timestamp functions.
//! Evaluation is a pure function of an in-memory row, with no backend I/O.
//!
//! Arithmetic follows SQL's NULL-tolerant convention: an operation with one
//! missing operand returns the other operand, and only returns nothing when
//! both are missing. Type errors (say, dividing a string) surface as a
//! recoverable per-row [`Projected::Error`] cell, never a fault.

use std::fmt;

use chrono::{DateTime, Utc};

use dynaql_model::{Item, Number, Value};

use super::visitor::ExprVisitor;
use crate::error::EngineError;
use crate::lang::ast::{ArithOp, NamedSelectAst, SelectExprAst, SelectionAst};
use crate::resolver::{
    Scope, datetime_from_epoch_number, format_datetime, parse_datetime_str, resolve,
};

// ---------------------------------------------------------------------------
// Projected cell values
// ---------------------------------------------------------------------------

/// One projected cell of an output row.
#[derive(Debug, Clone, PartialEq)]
pub enum Projected {
    /// A concrete value.
    Val(Value),
    /// An instant produced by a timestamp function.
    Time(DateTime<Utc>),
    /// The expression had no value for this row.
    Missing,
    /// The expression failed for this row (recoverable, per-row).
    Error(String),
}

impl fmt::Display for Projected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Val(v) => write!(f, "{v}"),
            Self::Time(t) => f.write_str(&format_datetime(*t)),
            Self::Missing => f.write_str("NULL"),
            Self::Error(e) => write!(f, "<error: {e}>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Expression tree
// ---------------------------------------------------------------------------

/// A resolved selection expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectExpr {
    /// A field reference (dotted paths and `[n]` subscripts supported).
    Field(String),
    /// A resolved literal.
    Value(Value),
    /// Binary arithmetic.
    Arith {
        /// The operator.
        op: ArithOp,
        /// Left operand.
        left: Box<SelectExpr>,
        /// Right operand.
        right: Box<SelectExpr>,
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
        inner: Box<SelectExpr>,
    },
}

impl SelectExpr {
    fn from_ast(ast: &SelectExprAst, scope: &Scope) -> Result<Self, EngineError> {
        Ok(match ast {
            SelectExprAst::Field(f) => Self::Field(f.clone()),
            SelectExprAst::Literal(lit) => Self::Value(resolve(lit, scope)?),
            SelectExprAst::Arith { op, left, right } => Self::Arith {
                op: *op,
                left: Box::new(Self::from_ast(left, scope)?),
                right: Box::new(Self::from_ast(right, scope)?),
            },
            SelectExprAst::Now { utc } => Self::Now { utc: *utc },
            SelectExprAst::Timestamp { utc, inner } => Self::Timestamp {
                utc: *utc,
                inner: Box::new(Self::from_ast(inner, scope)?),
            },
        })
    }

    /// Evaluate this expression against a row.
    #[must_use]
    pub fn evaluate(&self, item: &Item) -> Projected {
        match self {
            Self::Field(path) => lookup_path(item, path),
            Self::Value(v) => Projected::Val(v.clone()),
            Self::Now { .. } => Projected::Time(Utc::now()),
            Self::Timestamp { utc, inner } => match inner.evaluate(item) {
                Projected::Val(Value::S(s)) => parse_datetime_str(&s, *utc)
                    .map_or_else(|e| Projected::Error(e.to_string()), Projected::Time),
                Projected::Val(Value::N(n)) => datetime_from_epoch_number(&n)
                    .map_or_else(|e| Projected::Error(e.to_string()), Projected::Time),
                Projected::Val(other) => Projected::Error(format!(
                    "TIMESTAMP() requires a string or number, found {}",
                    other.type_descriptor()
                )),
                other => other,
            },
            Self::Arith { op, left, right } => {
                let left = left.evaluate(item);
                let right = right.evaluate(item);
                apply_arith(*op, left, right)
            }
        }
    }

    /// Register the fields this expression reads on the visitor, returning
    /// the encoded names.
    pub fn build(&self, visitor: &mut dyn ExprVisitor, fields: &mut Vec<String>) {
        match self {
            Self::Field(path) => fields.push(visitor.get_field(path)),
            Self::Value(_) | Self::Now { .. } => {}
            Self::Arith { left, right, .. } => {
                left.build(visitor, fields);
                right.build(visitor, fields);
            }
            Self::Timestamp { inner, .. } => inner.build(visitor, fields),
        }
    }
}

impl fmt::Display for SelectExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(path) => f.write_str(path),
            Self::Value(v) => write!(f, "{v}"),
            Self::Arith { op, left, right } => {
                write!(f, "({left} {} {right})", op.as_char())
            }
            Self::Now { utc } => f.write_str(if *utc { "UTCNOW()" } else { "NOW()" }),
            Self::Timestamp { utc, inner } => {
                write!(
                    f,
                    "{}({inner})",
                    if *utc { "UTCTIMESTAMP" } else { "TIMESTAMP" }
                )
            }
        }
    }
}

/// Walk a dotted/indexed path into an item.
fn lookup_path(item: &Item, path: &str) -> Projected {
    let mut current: Option<Value> = None;
    for segment in path.split('.') {
        let (name, subscripts) = match segment.find('[') {
            Some(idx) => segment.split_at(idx),
            None => (segment, ""),
        };

        current = match current {
            None => item.get(name).cloned(),
            Some(Value::M(map)) => map.get(name).cloned(),
            Some(_) => None,
        };

        for subscript in subscripts.split_terminator(']') {
            let Ok(index) = subscript.trim_start_matches('[').parse::<usize>() else {
                return Projected::Missing;
            };
            current = match current {
                Some(Value::L(list)) => list.get(index).cloned(),
                _ => None,
            };
        }

        if current.is_none() {
            return Projected::Missing;
        }
    }
    current.map_or(Projected::Missing, Projected::Val)
}

/// NULL-tolerant arithmetic over projected cells.
fn apply_arith(op: ArithOp, left: Projected, right: Projected) -> Projected {
    // Errors poison the cell; missing operands fall through to the other
    // side.
    if let Projected::Error(_) = left {
        return left;
    }
    if let Projected::Error(_) = right {
        return right;
    }
    let left = cell_value(left);
    let right = cell_value(right);

    match (left, right) {
        (None, None) => Projected::Missing,
        (Some(l), None) => match op {
            ArithOp::Add | ArithOp::Sub | ArithOp::Mul | ArithOp::Div => Projected::Val(l),
        },
        (None, Some(r)) => match (op, &r) {
            (ArithOp::Add | ArithOp::Mul, _) => Projected::Val(r),
            (ArithOp::Sub, Value::N(n)) => Projected::Val(Value::N(n.neg())),
            (ArithOp::Div, Value::N(n)) => Number::Int(1)
                .div(n)
                .map_or_else(|e| Projected::Error(e.to_string()), |q| Projected::Val(Value::N(q))),
            (ArithOp::Sub | ArithOp::Div, other) => Projected::Error(format!(
                "cannot apply '{}' to {}",
                op.as_char(),
                other.type_descriptor()
            )),
        },
        (Some(l), Some(r)) => arith_values(op, &l, &r),
    }
}

fn cell_value(cell: Projected) -> Option<Value> {
    match cell {
        Projected::Val(Value::Null) | Projected::Missing => None,
        Projected::Val(v) => Some(v),
        Projected::Time(t) => Some(crate::resolver::epoch_value(t)),
        Projected::Error(_) => None,
    }
}

fn arith_values(op: ArithOp, left: &Value, right: &Value) -> Projected {
    match (left, right, op) {
        (Value::N(l), Value::N(r), ArithOp::Add) => Projected::Val(Value::N(l.add(r))),
        (Value::N(l), Value::N(r), ArithOp::Sub) => Projected::Val(Value::N(l.sub(r))),
        (Value::N(l), Value::N(r), ArithOp::Mul) => Projected::Val(Value::N(l.mul(r))),
        (Value::N(l), Value::N(r), ArithOp::Div) => l
            .div(r)
            .map_or_else(|e| Projected::Error(e.to_string()), |q| Projected::Val(Value::N(q))),
        (Value::S(l), Value::S(r), ArithOp::Add) => Projected::Val(Value::S(format!("{l}{r}"))),
        (l, r, _) => Projected::Error(format!(
            "cannot apply '{}' to {} and {}",
            op.as_char(),
            l.type_descriptor(),
            r.type_descriptor()
        )),
    }
}

// ---------------------------------------------------------------------------
// Named selections
// ---------------------------------------------------------------------------

/// One projection entry with the key it occupies in the output row.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSelection {
    /// The expression.
    pub expr: SelectExpr,
    /// The alias, if one was given.
    pub alias: Option<String>,
}

impl NamedSelection {
    /// The key this entry occupies in the output row: the alias if present,
    /// otherwise the expression's own rendering.
    #[must_use]
    pub fn key(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.expr.to_string())
    }
}

/// The resolved projection of a SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// The projection entries; empty for the identity projection (`*`).
    pub exprs: Vec<NamedSelection>,
    /// Whether this is a `COUNT(*)` selection.
    pub is_count: bool,
}

impl Selection {
    /// Build a selection from the AST, resolving embedded literals.
    pub fn from_ast(ast: &SelectionAst, scope: &Scope) -> Result<Self, EngineError> {
        match ast {
            SelectionAst::All => Ok(Self {
                exprs: Vec::new(),
                is_count: false,
            }),
            SelectionAst::CountStar => Ok(Self {
                exprs: Vec::new(),
                is_count: true,
            }),
            SelectionAst::List(entries) => {
                let exprs: Result<Vec<NamedSelection>, EngineError> = entries
                    .iter()
                    .map(|NamedSelectAst { expr, alias }| {
                        Ok(NamedSelection {
                            expr: SelectExpr::from_ast(expr, scope)?,
                            alias: alias.clone(),
                        })
                    })
                    .collect();
                Ok(Self {
                    exprs: exprs?,
                    is_count: false,
                })
            }
        }
    }

    /// Returns `true` for the identity projection, which passes items
    /// through unchanged.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.exprs.is_empty() && !self.is_count
    }

    /// Project one item into an ordered list of named cells.
    #[must_use]
    pub fn project(&self, item: &Item) -> Vec<(String, Projected)> {
        self.exprs
            .iter()
            .map(|entry| (entry.key(), entry.expr.evaluate(item)))
            .collect()
    }

    /// Register every field the projection reads, returning the encoded
    /// names in first-use order.
    pub fn build(&self, visitor: &mut dyn ExprVisitor) -> Vec<String> {
        let mut fields = Vec::new();
        for entry in &self.exprs {
            entry.expr.build(visitor, &mut fields);
        }
        fields.dedup();
        fields
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_count {
            return f.write_str("COUNT(*)");
        }
        if self.exprs.is_empty() {
            return f.write_str("*");
        }
        let parts: Vec<String> = self
            .exprs
            .iter()
            .map(|e| match &e.alias {
                Some(alias) => format!("{} AS {alias}", e.expr),
                None => e.expr.to_string(),
            })
            .collect();
        f.write_str(&parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::visitor::RawRenderer;
    use crate::lang::ast::Statement;
    use crate::lang::parser::parse_statement;

    fn selection(attrs: &str) -> Selection {
        let stmt =
            parse_statement(&format!("SELECT {attrs} FROM t WHERE a = 1")).unwrap();
        let Statement::Select(select) = stmt else {
            panic!("expected Select");
        };
        Selection::from_ast(&select.selection, &Scope::new()).unwrap()
    }

    fn item(pairs: &[(&str, Value)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn test_should_pass_items_through_for_star() {
        let sel = selection("*");
        assert!(sel.is_identity());
        assert!(!sel.is_count);
    }

    #[test]
    fn test_should_flag_count_star() {
        let sel = selection("COUNT(*)");
        assert!(sel.is_count);
    }

    #[test]
    fn test_should_project_fields_in_order_with_aliases() {
        let sel = selection("foo, bar AS renamed");
        let row = sel.project(&item(&[("foo", Value::from(1)), ("bar", Value::from(2))]));
        assert_eq!(row.len(), 2);
        assert_eq!(row[0], ("foo".to_owned(), Projected::Val(Value::from(1))));
        assert_eq!(row[1].0, "renamed");
    }

    #[test]
    fn test_should_evaluate_arithmetic() {
        let sel = selection("foo + bar * 2");
        let row = sel.project(&item(&[("foo", Value::from(1)), ("bar", Value::from(3))]));
        assert_eq!(row[0].1, Projected::Val(Value::from(7)));
        assert_eq!(row[0].0, "(foo + (bar * 2))");
    }

    #[test]
    fn test_should_ignore_missing_operands_in_arithmetic() {
        let sel = selection("foo + bar");
        let row = sel.project(&item(&[("foo", Value::from(5))]));
        assert_eq!(row[0].1, Projected::Val(Value::from(5)));

        let sel = selection("foo - bar");
        let row = sel.project(&item(&[("bar", Value::from(5))]));
        assert_eq!(row[0].1, Projected::Val(Value::from(-5)));

        let sel = selection("foo + bar");
        let row = sel.project(&item(&[]));
        assert_eq!(row[0].1, Projected::Missing);
    }

    #[test]
    fn test_should_surface_type_errors_as_error_cells() {
        let sel = selection("foo / bar");
        let row = sel.project(&item(&[
            ("foo", Value::from("x")),
            ("bar", Value::from(2)),
        ]));
        assert!(matches!(row[0].1, Projected::Error(_)));
    }

    #[test]
    fn test_should_surface_division_by_zero_as_error_cell() {
        let sel = selection("foo / bar");
        let row = sel.project(&item(&[("foo", Value::from(1)), ("bar", Value::from(0))]));
        assert!(matches!(row[0].1, Projected::Error(_)));
    }

    #[test]
    fn test_should_concatenate_strings_with_plus() {
        let sel = selection("a + b");
        let row = sel.project(&item(&[("a", Value::from("x")), ("b", Value::from("y"))]));
        assert_eq!(row[0].1, Projected::Val(Value::from("xy")));
    }

    #[test]
    fn test_should_navigate_nested_paths() {
        let mut info = std::collections::HashMap::new();
        info.insert("rating".to_owned(), Value::from(9));
        let sel = selection("info.rating");
        let row = sel.project(&item(&[("info", Value::M(info))]));
        assert_eq!(row[0].1, Projected::Val(Value::from(9)));
    }

    #[test]
    fn test_should_index_into_lists() {
        let sel = selection("tags[1]");
        let row = sel.project(&item(&[(
            "tags",
            Value::L(vec![Value::from("a"), Value::from("b")]),
        )]));
        assert_eq!(row[0].1, Projected::Val(Value::from("b")));
    }

    #[test]
    fn test_should_evaluate_timestamp_of_epoch_field() {
        let sel = selection("UTCTIMESTAMP(ts)");
        let row = sel.project(&item(&[("ts", Value::from(1_577_836_800))]));
        let Projected::Time(t) = &row[0].1 else {
            panic!("expected a time cell");
        };
        assert_eq!(t.timestamp(), 1_577_836_800);
    }

    #[test]
    fn test_should_return_missing_timestamp_for_missing_field() {
        let sel = selection("TIMESTAMP(ts)");
        let row = sel.project(&item(&[]));
        assert_eq!(row[0].1, Projected::Missing);
    }

    #[test]
    fn test_should_collect_projected_fields() {
        let sel = selection("foo + bar, TIMESTAMP(ts), 7");
        let mut raw = RawRenderer;
        assert_eq!(sel.build(&mut raw), vec!["foo", "bar", "ts"]);
    }
}
