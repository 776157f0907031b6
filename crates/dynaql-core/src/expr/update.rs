//! Update expressions: SET / REMOVE / ADD / DELETE clauses mapped onto the
//! store's four update actions.
//!
//! The mapping:
//!
//! | Source           | Action | Value                                  |
//! |------------------|--------|----------------------------------------|
//! | `f = value`      | SET    | as-is; a null value becomes REMOVE     |
//! | `f += n`         | ADD    | n (numeric)                            |
//! | `f -= n`         | ADD    | negated n                              |
//! | `f << v`         | ADD    | v coerced to a singleton set (union)   |
//! | `f >> v`         | DELETE | v coerced to a singleton set (difference) |
//! | `REMOVE f`       | REMOVE | (none)                                 |
//! | `ADD f v`        | ADD    | as given                               |
//! | `DELETE f v`     | DELETE | as given                               |
//!
//! Right-hand sides resolve per row: row fields shadow session variables, so
//! `SET bar = bar + 4` reads the row's current `bar`. Combining null with
//! `+=`/`-=` is rejected, and a field may appear in only one sub-clause.

use std::collections::HashSet;
use std::fmt;

use dynaql_model::{Item, Value};

use crate::error::EngineError;
use crate::lang::ast::{OperandAst, SetEntryAst, SetOp, SetRhsAst, UpdateClausesAst};
use crate::resolver::{Scope, resolve_with_row};

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// One update action in the store's vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// Write the value.
    Set {
        /// The target field.
        field: String,
        /// The value to write.
        value: Value,
    },
    /// Numeric increment or set union.
    Add {
        /// The target field.
        field: String,
        /// The increment or set to merge.
        value: Value,
    },
    /// Set difference.
    Delete {
        /// The target field.
        field: String,
        /// The set of elements to remove.
        value: Value,
    },
    /// Drop the field.
    Remove {
        /// The target field.
        field: String,
    },
}

impl UpdateAction {
    /// The field this action targets.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Set { field, .. }
            | Self::Add { field, .. }
            | Self::Delete { field, .. }
            | Self::Remove { field } => field,
        }
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { field, value } => write!(f, "SET {field} = {value}"),
            Self::Add { field, value } => write!(f, "ADD {field} {value}"),
            Self::Delete { field, value } => write!(f, "DELETE {field} {value}"),
            Self::Remove { field } => write!(f, "REMOVE {field}"),
        }
    }
}

// ---------------------------------------------------------------------------
// UpdateExpression
// ---------------------------------------------------------------------------

/// A validated update expression, ready to produce per-row actions.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    clauses: UpdateClausesAst,
}

impl UpdateExpression {
    /// Validate and wrap parsed update clauses.
    ///
    /// Rejects a field appearing in more than one sub-clause with
    /// [`EngineError::DuplicateFieldUpdate`].
    pub fn from_clauses(clauses: UpdateClausesAst) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        let fields = clauses
            .set
            .iter()
            .map(|e| e.field.as_str())
            .chain(clauses.remove.iter().map(String::as_str))
            .chain(clauses.add.iter().map(|(f, _)| f.as_str()))
            .chain(clauses.delete.iter().map(|(f, _)| f.as_str()));
        for field in fields {
            if !seen.insert(field) {
                return Err(EngineError::DuplicateFieldUpdate {
                    field: field.to_owned(),
                });
            }
        }
        Ok(Self { clauses })
    }

    /// Produce the store actions for one row, resolving right-hand sides
    /// with the row's fields shadowing the session scope.
    pub fn build_actions(
        &self,
        scope: &Scope,
        row: &Item,
    ) -> Result<Vec<UpdateAction>, EngineError> {
        let mut actions = Vec::new();

        for entry in &self.clauses.set {
            actions.push(set_entry_action(entry, scope, row)?);
        }
        for field in &self.clauses.remove {
            actions.push(UpdateAction::Remove {
                field: field.clone(),
            });
        }
        for (field, literal) in &self.clauses.add {
            let value = resolve_with_row(literal, scope, row)?;
            actions.push(UpdateAction::Add {
                field: field.clone(),
                value,
            });
        }
        for (field, literal) in &self.clauses.delete {
            let value = resolve_with_row(literal, scope, row)?;
            actions.push(UpdateAction::Delete {
                field: field.clone(),
                value,
            });
        }

        Ok(actions)
    }
}

fn set_entry_action(
    entry: &SetEntryAst,
    scope: &Scope,
    row: &Item,
) -> Result<UpdateAction, EngineError> {
    let field = entry.field.clone();
    match entry.op {
        SetOp::Assign => {
            let value = resolve_rhs(&entry.rhs, scope, row)?;
            if value.is_null() {
                // Assigning null drops the attribute rather than storing a
                // literal null.
                Ok(UpdateAction::Remove { field })
            } else {
                Ok(UpdateAction::Set { field, value })
            }
        }
        SetOp::AddAssign | SetOp::SubAssign => {
            let value = resolve_rhs(&entry.rhs, scope, row)?;
            if value.is_null() {
                return Err(EngineError::Syntax(
                    "cannot increment or decrement by NULL".to_owned(),
                ));
            }
            let Value::N(number) = value else {
                return Err(EngineError::Syntax(format!(
                    "'{field}' increment requires a number, found {}",
                    value.type_descriptor()
                )));
            };
            let number = if entry.op == SetOp::SubAssign {
                number.neg()
            } else {
                number
            };
            Ok(UpdateAction::Add {
                field,
                value: Value::N(number),
            })
        }
        SetOp::Append | SetOp::Detach => {
            let value = resolve_rhs(&entry.rhs, scope, row)?;
            let descriptor = value.type_descriptor();
            let set = value.into_set().ok_or_else(|| {
                EngineError::Syntax(format!(
                    "'{field}' set operation requires a set or scalar element, found {descriptor}"
                ))
            })?;
            if entry.op == SetOp::Append {
                Ok(UpdateAction::Add { field, value: set })
            } else {
                Ok(UpdateAction::Delete { field, value: set })
            }
        }
    }
}

fn resolve_rhs(rhs: &SetRhsAst, scope: &Scope, row: &Item) -> Result<Value, EngineError> {
    match rhs {
        SetRhsAst::Operand(operand) => resolve_operand(operand, scope, row),
        SetRhsAst::Arith { add, left, right } => {
            let left = resolve_operand(left, scope, row)?;
            let right = resolve_operand(right, scope, row)?;
            arith(*add, &left, &right)
        }
        SetRhsAst::IfNotExists(field, default) => match row.get(field) {
            Some(existing) => Ok(existing.clone()),
            None => resolve_operand(default, scope, row),
        },
        SetRhsAst::ListAppend(first, second) => {
            let first = resolve_operand(first, scope, row)?;
            let second = resolve_operand(second, scope, row)?;
            match (first, second) {
                (Value::L(mut a), Value::L(b)) => {
                    a.extend(b);
                    Ok(Value::L(a))
                }
                (a, b) => Err(EngineError::Syntax(format!(
                    "list_append requires two lists, found {} and {}",
                    a.type_descriptor(),
                    b.type_descriptor()
                ))),
            }
        }
    }
}

fn resolve_operand(operand: &OperandAst, scope: &Scope, row: &Item) -> Result<Value, EngineError> {
    match operand {
        OperandAst::Ref(name) => row
            .get(name)
            .or_else(|| scope.get(name))
            .cloned()
            .ok_or_else(|| EngineError::UnknownVariable { name: name.clone() }),
        OperandAst::Lit(literal) => resolve_with_row(literal, scope, row),
    }
}

/// Null-tolerant `+`/`-` over update operands.
fn arith(add: bool, left: &Value, right: &Value) -> Result<Value, EngineError> {
    match (left, right) {
        (Value::Null, Value::Null) => Ok(Value::Null),
        (l, Value::Null) => Ok(l.clone()),
        (Value::Null, Value::N(n)) => Ok(Value::N(if add { *n } else { n.neg() })),
        (Value::N(l), Value::N(r)) => Ok(Value::N(if add { l.add(r) } else { l.sub(r) })),
        (Value::S(l), Value::S(r)) if add => Ok(Value::S(format!("{l}{r}"))),
        (l, r) => Err(EngineError::Syntax(format!(
            "cannot apply '{}' to {} and {}",
            if add { '+' } else { '-' },
            l.type_descriptor(),
            r.type_descriptor()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynaql_model::Number;

    use crate::lang::ast::Statement;
    use crate::lang::parser::parse_statement;

    fn expression(clauses: &str) -> Result<UpdateExpression, EngineError> {
        let stmt = parse_statement(&format!("UPDATE t {clauses} WHERE id = 'a'")).unwrap();
        let Statement::Update(update) = stmt else {
            panic!("expected Update");
        };
        UpdateExpression::from_clauses(update.clauses)
    }

    fn actions(clauses: &str, row: &[(&str, Value)]) -> Vec<UpdateAction> {
        let row: Item = row
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        expression(clauses)
            .unwrap()
            .build_actions(&Scope::new(), &row)
            .unwrap()
    }

    #[test]
    fn test_should_map_assignment_to_set_action() {
        let acts = actions("SET x = 5", &[]);
        assert_eq!(
            acts,
            vec![UpdateAction::Set {
                field: "x".to_owned(),
                value: Value::from(5)
            }]
        );
    }

    #[test]
    fn test_should_map_null_assignment_to_remove() {
        let acts = actions("SET x = NULL", &[]);
        assert_eq!(
            acts,
            vec![UpdateAction::Remove {
                field: "x".to_owned()
            }]
        );
    }

    #[test]
    fn test_should_map_add_assign_to_add_action() {
        let acts = actions("SET x += 4", &[]);
        assert_eq!(
            acts,
            vec![UpdateAction::Add {
                field: "x".to_owned(),
                value: Value::from(4)
            }]
        );
    }

    #[test]
    fn test_should_negate_sub_assign() {
        let acts = actions("SET x -= 4", &[]);
        assert_eq!(
            acts,
            vec![UpdateAction::Add {
                field: "x".to_owned(),
                value: Value::from(-4)
            }]
        );
    }

    #[test]
    fn test_should_reject_null_increment() {
        let err = expression("SET x += foo")
            .unwrap()
            .build_actions(&Scope::new(), &Item::new());
        assert!(err.is_err());

        let row: Item = [("y".to_owned(), Value::Null)].into();
        let err = expression("SET x += y")
            .unwrap()
            .build_actions(&Scope::new(), &row)
            .unwrap_err();
        assert!(matches!(err, EngineError::Syntax(_)));
    }

    #[test]
    fn test_should_coerce_append_to_singleton_set_union() {
        let acts = actions("SET tags << 'new'", &[]);
        assert_eq!(
            acts,
            vec![UpdateAction::Add {
                field: "tags".to_owned(),
                value: Value::Ss(vec!["new".to_owned()])
            }]
        );
        // Already a set: passed through.
        let acts = actions("SET tags << ('a', 'b')", &[]);
        assert_eq!(
            acts,
            vec![UpdateAction::Add {
                field: "tags".to_owned(),
                value: Value::Ss(vec!["a".to_owned(), "b".to_owned()])
            }]
        );
    }

    #[test]
    fn test_should_coerce_detach_to_singleton_set_difference() {
        let acts = actions("SET nums >> 3", &[]);
        assert_eq!(
            acts,
            vec![UpdateAction::Delete {
                field: "nums".to_owned(),
                value: Value::Ns(vec![Number::Int(3)])
            }]
        );
    }

    #[test]
    fn test_should_map_explicit_clauses_as_given() {
        let acts = actions("REMOVE a ADD b 1 DELETE c ('x')", &[]);
        assert_eq!(acts.len(), 3);
        assert_eq!(
            acts[0],
            UpdateAction::Remove {
                field: "a".to_owned()
            }
        );
        assert_eq!(
            acts[1],
            UpdateAction::Add {
                field: "b".to_owned(),
                value: Value::from(1)
            }
        );
        assert_eq!(
            acts[2],
            UpdateAction::Delete {
                field: "c".to_owned(),
                value: Value::Ss(vec!["x".to_owned()])
            }
        );
    }

    #[test]
    fn test_should_resolve_field_reference_against_row() {
        let acts = actions("SET x = x + 4", &[("x", Value::from(10))]);
        assert_eq!(
            acts,
            vec![UpdateAction::Set {
                field: "x".to_owned(),
                value: Value::from(14)
            }]
        );
    }

    #[test]
    fn test_should_let_row_fields_shadow_session_scope() {
        let mut scope = Scope::new();
        scope.set("x", Value::from(100));
        let row: Item = [("x".to_owned(), Value::from(1))].into();
        let acts = expression("SET y = x + 1")
            .unwrap()
            .build_actions(&scope, &row)
            .unwrap();
        assert_eq!(
            acts,
            vec![UpdateAction::Set {
                field: "y".to_owned(),
                value: Value::from(2)
            }]
        );
    }

    #[test]
    fn test_should_apply_if_not_exists_against_row() {
        let acts = actions("SET x = if_not_exists(x, 0)", &[("x", Value::from(7))]);
        assert_eq!(
            acts,
            vec![UpdateAction::Set {
                field: "x".to_owned(),
                value: Value::from(7)
            }]
        );
        let acts = actions("SET x = if_not_exists(x, 0)", &[]);
        assert_eq!(
            acts,
            vec![UpdateAction::Set {
                field: "x".to_owned(),
                value: Value::from(0)
            }]
        );
    }

    #[test]
    fn test_should_concatenate_lists_with_list_append() {
        let acts = actions(
            "SET l = list_append(l, [3])",
            &[("l", Value::L(vec![Value::from(1), Value::from(2)]))],
        );
        assert_eq!(
            acts,
            vec![UpdateAction::Set {
                field: "l".to_owned(),
                value: Value::L(vec![Value::from(1), Value::from(2), Value::from(3)])
            }]
        );
    }

    #[test]
    fn test_should_reject_duplicate_field_across_clauses() {
        let err = expression("SET x = 1 REMOVE x").unwrap_err();
        assert!(matches!(
            err,
            EngineError::DuplicateFieldUpdate { field } if field == "x"
        ));
    }

    #[test]
    fn test_should_fail_on_unresolvable_reference() {
        let err = expression("SET x = nope")
            .unwrap()
            .build_actions(&Scope::new(), &Item::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownVariable { .. }));
    }
}
