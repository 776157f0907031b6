//! Resolved constraint expressions.
//!
//! A [`Constraint`] is the typed form of a WHERE/FILTER tree after literal
//! resolution. It answers the two questions query planning needs (which
//! fields could pin a partition key, and which could pin a sort key) and
//! renders itself into a backend-safe expression string through a visitor.
//!
//! Key-candidacy rules: a hash key must be pinned by an exact `=` against a
//! value; a range key may be pinned by any operator except `<>`, by
//! `BETWEEN`, or by `begins_with`. OR-joined trees and negations never
//! contribute key candidates, since they cannot guarantee a safe narrowing.

use std::collections::HashSet;
use std::fmt;

use dynaql_model::{QueryIndex, Value};

use super::visitor::{ExprVisitor, RawRenderer};
use crate::error::EngineError;
use crate::lang::ast::{CompareOp, CondFunction, ConditionExpr, FieldOrLiteral};
use crate::resolver::{Scope, resolve};

/// A comparison operand: a resolved value or another field.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A resolved value.
    Value(Value),
    /// A field reference.
    Field(String),
}

impl Operand {
    fn build(&self, visitor: &mut dyn ExprVisitor) -> String {
        match self {
            Self::Value(v) => visitor.get_value(v),
            Self::Field(f) => visitor.get_field(f),
        }
    }
}

/// A resolved constraint tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `field op operand`, e.g. `foo = 4`.
    Operator {
        /// The constrained field.
        field: String,
        /// The comparison operator (`!=` is already `<>` here).
        op: CompareOp,
        /// The right-hand side.
        value: Operand,
    },
    /// A predicate function, e.g. `attribute_exists(foo)`.
    Function {
        /// The function.
        name: CondFunction,
        /// The field argument.
        field: String,
        /// The second argument, when the function takes one.
        operand: Option<Value>,
    },
    /// `size(field) op value`.
    Size {
        /// The field whose size is tested.
        field: String,
        /// The comparison operator.
        op: CompareOp,
        /// The comparison value.
        value: Value,
    },
    /// `field BETWEEN low AND high`.
    Between {
        /// The constrained field.
        field: String,
        /// Lower bound (inclusive).
        low: Value,
        /// Upper bound (inclusive).
        high: Value,
    },
    /// `field IN (v, ...)`.
    In {
        /// The constrained field.
        field: String,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// Two or more constraints joined by a single operator.
    Conjunction {
        /// `true` for AND, `false` for OR.
        is_and: bool,
        /// The joined constraints.
        children: Vec<Constraint>,
    },
    /// `NOT constraint`.
    Invert(Box<Constraint>),
}

impl Constraint {
    /// Build a constraint from a parsed condition, resolving literals
    /// against the session scope.
    pub fn from_condition(cond: &ConditionExpr, scope: &Scope) -> Result<Self, EngineError> {
        match cond {
            ConditionExpr::Compare { field, op, value } => {
                let value = match value {
                    // A bound session variable wins over a field reference;
                    // an unbound identifier stays a field-to-field compare.
                    FieldOrLiteral::Field(f) => match scope.get(f) {
                        Some(bound) => Operand::Value(bound.clone()),
                        None => Operand::Field(f.clone()),
                    },
                    FieldOrLiteral::Literal(lit) => Operand::Value(resolve(lit, scope)?),
                };
                Ok(Self::Operator {
                    field: field.clone(),
                    op: *op,
                    value,
                })
            }
            ConditionExpr::Between { field, low, high } => Ok(Self::Between {
                field: field.clone(),
                low: resolve(low, scope)?,
                high: resolve(high, scope)?,
            }),
            ConditionExpr::In { field, values } => {
                let values: Result<Vec<Value>, EngineError> =
                    values.iter().map(|v| resolve(v, scope)).collect();
                Ok(Self::In {
                    field: field.clone(),
                    values: values?,
                })
            }
            ConditionExpr::Function {
                name,
                field,
                operand,
            } => {
                let operand = operand
                    .as_ref()
                    .map(|lit| resolve(lit, scope))
                    .transpose()?;
                Ok(Self::Function {
                    name: *name,
                    field: field.clone(),
                    operand,
                })
            }
            ConditionExpr::Size { field, op, value } => Ok(Self::Size {
                field: field.clone(),
                op: *op,
                value: resolve(value, scope)?,
            }),
            ConditionExpr::Junction { is_and, exprs } => {
                let children: Result<Vec<Self>, EngineError> = exprs
                    .iter()
                    .map(|e| Self::from_condition(e, scope))
                    .collect();
                Ok(Self::join(*is_and, children?))
            }
            ConditionExpr::Not(inner) => {
                Ok(Self::Invert(Box::new(Self::from_condition(inner, scope)?)))
            }
        }
    }

    /// Join constraints with AND, flattening nested AND-conjunctions.
    #[must_use]
    pub fn and(children: Vec<Constraint>) -> Self {
        Self::join(true, children)
    }

    /// Join constraints with OR, flattening nested OR-conjunctions.
    #[must_use]
    pub fn or(children: Vec<Constraint>) -> Self {
        Self::join(false, children)
    }

    fn join(is_and: bool, children: Vec<Constraint>) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Self::Conjunction {
                    is_and: child_and,
                    children: grandchildren,
                } if child_and == is_and => flat.extend(grandchildren),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.into_iter().next().unwrap_or(Self::Conjunction {
                is_and,
                children: Vec::new(),
            });
        }
        Self::Conjunction {
            is_and,
            children: flat,
        }
    }

    /// Render this constraint through a visitor. Conjunctions are fully
    /// parenthesized, so no operator-precedence ambiguity ever reaches the
    /// backend.
    pub fn build(&self, visitor: &mut dyn ExprVisitor) -> String {
        match self {
            Self::Operator { field, op, value } => {
                let field = visitor.get_field(field);
                let value = value.build(visitor);
                format!("{field} {op} {value}")
            }
            Self::Function {
                name,
                field,
                operand,
            } => {
                let field = visitor.get_field(field);
                match operand {
                    Some(value) => {
                        let value = visitor.get_value(value);
                        format!("{}({field}, {value})", name.as_str())
                    }
                    None => format!("{}({field})", name.as_str()),
                }
            }
            Self::Size { field, op, value } => {
                let field = visitor.get_field(field);
                let value = visitor.get_value(value);
                format!("size({field}) {op} {value}")
            }
            Self::Between { field, low, high } => {
                let field = visitor.get_field(field);
                let low = visitor.get_value(low);
                let high = visitor.get_value(high);
                format!("{field} BETWEEN {low} AND {high}")
            }
            Self::In { field, values } => {
                let field = visitor.get_field(field);
                let values: Vec<String> = values.iter().map(|v| visitor.get_value(v)).collect();
                format!("{field} IN ({})", values.join(", "))
            }
            Self::Conjunction { is_and, children } => {
                let joiner = if *is_and { " AND " } else { " OR " };
                let parts: Vec<String> = children.iter().map(|c| c.build(visitor)).collect();
                format!("({})", parts.join(joiner))
            }
            Self::Invert(inner) => format!("NOT {}", inner.build(visitor)),
        }
    }

    /// The field this constraint could supply as an exact-match hash key.
    #[must_use]
    pub fn hash_field(&self) -> Option<&str> {
        match self {
            Self::Operator {
                field,
                op: CompareOp::Eq,
                value: Operand::Value(_),
            } => Some(field),
            _ => None,
        }
    }

    /// The field this constraint could supply as a sort-key condition.
    #[must_use]
    pub fn range_field(&self) -> Option<&str> {
        match self {
            Self::Operator {
                field,
                op,
                value: Operand::Value(_),
            } if *op != CompareOp::Ne => Some(field),
            Self::Between { field, .. } => Some(field),
            Self::Function {
                name: CondFunction::BeginsWith,
                field,
                ..
            } => Some(field),
            _ => None,
        }
    }

    /// The set of fields this tree could pin as a hash key. Empty for
    /// OR-joined trees and negations.
    #[must_use]
    pub fn possible_hash_fields(&self) -> HashSet<String> {
        match self {
            Self::Conjunction { is_and, children } => {
                if !is_and {
                    return HashSet::new();
                }
                children
                    .iter()
                    .filter_map(|c| c.hash_field().map(str::to_owned))
                    .collect()
            }
            other => other.hash_field().map(str::to_owned).into_iter().collect(),
        }
    }

    /// The set of fields this tree could pin as a range key. Empty for
    /// OR-joined trees and negations.
    #[must_use]
    pub fn possible_range_fields(&self) -> HashSet<String> {
        match self {
            Self::Conjunction { is_and, children } => {
                if !is_and {
                    return HashSet::new();
                }
                children
                    .iter()
                    .filter_map(|c| c.range_field().map(str::to_owned))
                    .collect()
            }
            other => other.range_field().map(str::to_owned).into_iter().collect(),
        }
    }

    /// Split this tree into the key condition for `index` and the residual
    /// filter.
    ///
    /// Only valid once an index has been selected, which implies the root is
    /// either a single key-pinning constraint or an AND-conjunction. A single
    /// matching child is returned unwrapped rather than as a one-element
    /// conjunction.
    #[must_use]
    pub fn remove_index(&self, index: &QueryIndex) -> (Constraint, Option<Constraint>) {
        let Self::Conjunction {
            is_and: true,
            children,
        } = self
        else {
            // The whole WHERE is a single key constraint.
            return (self.clone(), None);
        };

        let mut query = Vec::new();
        let mut remainder = Vec::new();
        for child in children {
            if child.hash_field() == Some(index.hash_key.as_str()) {
                query.push(child.clone());
            } else if index.range_key.is_some()
                && child.range_field() == index.range_key.as_deref()
            {
                query.push(child.clone());
            } else {
                remainder.push(child.clone());
            }
        }

        let query = Self::and(query);
        let filter = match remainder.len() {
            0 => None,
            _ => Some(Self::and(remainder)),
        };
        (query, filter)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build(&mut RawRenderer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::visitor::Encoder;
    use crate::lang::parser::parse_condition;

    fn constraint(input: &str) -> Constraint {
        let cond = parse_condition(input).unwrap();
        Constraint::from_condition(&cond, &Scope::new()).unwrap()
    }

    #[test]
    fn test_should_report_hash_field_for_equality_on_value() {
        let c = constraint("foo = 1");
        assert_eq!(c.hash_field(), Some("foo"));
        assert_eq!(c.possible_hash_fields(), ["foo".to_owned()].into());
    }

    #[test]
    fn test_should_not_report_hash_field_for_field_comparison() {
        assert_eq!(constraint("foo = bar").hash_field(), None);
    }

    #[test]
    fn test_should_report_range_fields_for_range_operators() {
        assert_eq!(constraint("foo > 1").range_field(), Some("foo"));
        assert_eq!(constraint("foo BETWEEN 1 AND 2").range_field(), Some("foo"));
        assert_eq!(constraint("foo BEGINS WITH 'a'").range_field(), Some("foo"));
        assert_eq!(constraint("foo <> 1").range_field(), None);
    }

    #[test]
    fn test_should_collect_key_fields_through_and_conjunction() {
        let c = constraint("foo = 1 AND bar > 2 AND baz CONTAINS 'x'");
        assert_eq!(c.possible_hash_fields(), ["foo".to_owned()].into());
        // `foo = 1` is also a legal range condition.
        assert_eq!(
            c.possible_range_fields(),
            ["foo".to_owned(), "bar".to_owned()].into()
        );
    }

    #[test]
    fn test_should_return_empty_key_fields_for_or_trees() {
        let c = constraint("foo = 1 OR bar = 2");
        assert!(c.possible_hash_fields().is_empty());
        assert!(c.possible_range_fields().is_empty());
    }

    #[test]
    fn test_should_return_empty_key_fields_for_negation() {
        let c = constraint("NOT foo = 1");
        assert!(c.possible_hash_fields().is_empty());
        assert!(c.possible_range_fields().is_empty());
    }

    #[test]
    fn test_should_flatten_conjunctions_to_identical_trees() {
        let nested = constraint("(foo = 1 AND bar = 2) AND baz = 3");
        let flat = constraint("foo = 1 AND bar = 2 AND baz = 3");
        assert_eq!(nested, flat);
        assert_eq!(nested.possible_hash_fields(), flat.possible_hash_fields());
        assert_eq!(nested.possible_range_fields(), flat.possible_range_fields());
    }

    #[test]
    fn test_should_build_with_placeholders() {
        let mut encoder = Encoder::new();
        let rendered = constraint("foo = 1 AND bar BEGINS WITH 'a'").build(&mut encoder);
        assert_eq!(rendered, "(#f1 = :v1 AND begins_with(#f2, :v2))");
        assert_eq!(encoder.attribute_names().unwrap().len(), 2);
        assert_eq!(encoder.expression_values().unwrap().len(), 2);
    }

    #[test]
    fn test_should_parenthesize_nested_junctions() {
        let c = constraint("a = 1 AND (b = 2 OR c = 3)");
        assert_eq!(c.to_string(), "(a = 1 AND (b = 2 OR c = 3))");
    }

    #[test]
    fn test_should_split_key_and_filter_constraints() {
        let index = QueryIndex {
            name: "TABLE".to_owned(),
            is_global: true,
            hash_key: "id".to_owned(),
            range_key: Some("bar".to_owned()),
            attributes: None,
        };
        let c = constraint("id = 'a' AND bar = 1");
        let (query, filter) = c.remove_index(&index);
        assert_eq!(query.to_string(), "(id = 'a' AND bar = 1)");
        assert!(filter.is_none());

        let c = constraint("id = 'a' AND baz = 1");
        let (query, filter) = c.remove_index(&index);
        assert_eq!(query.to_string(), "id = 'a'");
        assert_eq!(filter.unwrap().to_string(), "baz = 1");
    }

    #[test]
    fn test_should_unwrap_single_child_after_split() {
        let index = QueryIndex {
            name: "TABLE".to_owned(),
            is_global: true,
            hash_key: "id".to_owned(),
            range_key: None,
            attributes: None,
        };
        let c = constraint("id = 'a'");
        let (query, filter) = c.remove_index(&index);
        assert!(matches!(query, Constraint::Operator { .. }));
        assert!(filter.is_none());
    }

    #[test]
    fn test_should_roundtrip_rendered_constraints() {
        for input in [
            "foo = 1",
            "foo <> 1",
            "foo > 1 AND bar <= 2",
            "foo BETWEEN 1 AND 5",
            "foo IN (1, 2, 3)",
            "attribute_exists(foo)",
            "begins_with(foo, 'a')",
            "size(foo) > 3",
            "NOT contains(foo, 'x')",
            "(a = 1 AND b = 2) OR c = 3",
        ] {
            let original = constraint(input);
            let rendered = original.to_string();
            let reparsed = constraint(&rendered);
            assert_eq!(original, reparsed, "failed for input: {input}");
        }
    }

    #[test]
    fn test_should_normalize_bang_equals_to_angle_brackets() {
        let c = constraint("foo != 1");
        assert_eq!(c.to_string(), "foo <> 1");
    }
}
