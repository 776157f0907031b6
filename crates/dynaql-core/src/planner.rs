//! Index selection and query/scan routing.
//!
//! Given a table's metadata and a resolved constraint tree, the planner
//! decides whether the statement can be served by an index query and which
//! index to use, then splits the constraints into the key condition and the
//! residual filter. When no index qualifies the plan degrades to a scan,
//! but only when scanning has been explicitly allowed, since an accidental
//! full-table scan is the most expensive mistake this language can make.

use dynaql_model::{QueryIndex, TableMeta};
use tracing::debug;

use crate::error::EngineError;
use crate::expr::Constraint;

/// A fully decided read plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Serve the statement with an index query.
    Query(QueryPlan),
    /// Serve the statement with a (filtered) scan.
    Scan {
        /// The global index to scan, or `None` for the base table.
        index: Option<String>,
        /// The filter pushed down to the scan, if any.
        filter: Option<Constraint>,
    },
}

/// An index query with its split constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// The chosen index (`TABLE` for the primary key).
    pub index: QueryIndex,
    /// The key condition for the query call.
    pub key_condition: Constraint,
    /// The residual filter pushed down on the query call, if any.
    pub filter: Option<Constraint>,
}

/// Select an index for a WHERE constraint tree.
///
/// With `named` set (a `USING` clause), selection is skipped: the named
/// index must exist and its hash key must be pinned by the constraints,
/// otherwise the statement fails with [`EngineError::IndexKeyMismatch`].
///
/// Without it, every candidate (the table's own key first, then local and
/// global indexes sorted by name) is filtered on hash-key coverage; if any
/// candidate also covers a range field, hash-only candidates are discarded.
/// The first survivor wins, which makes selection deterministic for a given
/// schema and constraint tree.
pub fn select_index(
    meta: &TableMeta,
    constraint: &Constraint,
    named: Option<&str>,
    allow_scan: bool,
) -> Result<Plan, EngineError> {
    let possible_hash = constraint.possible_hash_fields();

    if let Some(index_name) = named {
        let index = meta
            .get_index(index_name)
            .ok_or_else(|| EngineError::UnknownIndex {
                index: index_name.to_owned(),
                table: meta.name.clone(),
            })?;
        if !possible_hash.contains(&index.hash_key) {
            return Err(EngineError::IndexKeyMismatch {
                index: index.name,
                hash_key: index.hash_key,
            });
        }
        debug!(table = %meta.name, index = %index.name, "using explicitly named index");
        return Ok(make_query_plan(index, constraint));
    }

    let possible_range = constraint.possible_range_fields();
    let matches = meta.get_matching_indexes(&possible_hash, &possible_range);

    match matches.into_iter().next() {
        Some(index) => {
            debug!(table = %meta.name, index = %index.name, "selected index");
            Ok(make_query_plan(index, constraint))
        }
        None if allow_scan => {
            debug!(table = %meta.name, "no index qualifies; falling back to scan");
            Ok(Plan::Scan {
                index: None,
                filter: Some(constraint.clone()),
            })
        }
        None => Err(EngineError::NoIndexAvailable {
            table: meta.name.clone(),
        }),
    }
}

fn make_query_plan(index: QueryIndex, constraint: &Constraint) -> Plan {
    let (key_condition, filter) = constraint.remove_index(&index);
    Plan::Query(QueryPlan {
        index,
        key_condition,
        filter,
    })
}

/// Validate an explicitly named index for a scan: only global indexes can
/// be scanned independently.
pub fn validate_scan_index(meta: &TableMeta, index_name: &str) -> Result<String, EngineError> {
    let index = meta
        .get_index(index_name)
        .ok_or_else(|| EngineError::UnknownIndex {
            index: index_name.to_owned(),
            table: meta.name.clone(),
        })?;
    if !index.scannable() {
        return Err(EngineError::Syntax(format!(
            "index '{index_name}' is a local index and cannot be scanned; \
             only global indexes are independently scannable"
        )));
    }
    Ok(index.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynaql_model::{
        AttrType, AttributeDefinition, IndexDescription, KeySchemaElement, KeyType, Projection,
        TableDescription, Throughput,
    };

    use crate::lang::parser::parse_condition;
    use crate::resolver::Scope;

    fn meta() -> TableMeta {
        let desc = TableDescription {
            table_name: "posts".to_owned(),
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
                key_schema: vec![KeySchemaElement::new("topic", KeyType::Hash)],
                projection: Projection::default(),
                provisioned_throughput: Some(Throughput::new(2, 1)),
                item_count: None,
                index_size_bytes: None,
            }],
            ..Default::default()
        };
        TableMeta::from_description(&desc).unwrap()
    }

    fn constraint(input: &str) -> Constraint {
        Constraint::from_condition(&parse_condition(input).unwrap(), &Scope::new()).unwrap()
    }

    #[test]
    fn test_should_select_table_key_for_hash_equality() {
        let plan = select_index(&meta(), &constraint("author = 'a'"), None, false).unwrap();
        let Plan::Query(plan) = plan else {
            panic!("expected a query plan");
        };
        assert_eq!(plan.index.name, "TABLE");
        assert!(plan.filter.is_none());
    }

    #[test]
    fn test_should_prefer_range_narrowed_index() {
        let plan =
            select_index(&meta(), &constraint("author = 'a' AND score > 5"), None, false).unwrap();
        let Plan::Query(plan) = plan else {
            panic!("expected a query plan");
        };
        assert_eq!(plan.index.name, "score-idx");
        assert!(plan.filter.is_none());
    }

    #[test]
    fn test_should_select_global_index_without_table_hash() {
        let plan = select_index(&meta(), &constraint("topic = 'rust'"), None, false).unwrap();
        let Plan::Query(plan) = plan else {
            panic!("expected a query plan");
        };
        assert_eq!(plan.index.name, "topic-idx");
        assert!(plan.index.is_global);
    }

    #[test]
    fn test_should_split_residual_filter() {
        let plan = select_index(
            &meta(),
            &constraint("author = 'a' AND posted > 5 AND extra = 1"),
            None,
            false,
        )
        .unwrap();
        let Plan::Query(plan) = plan else {
            panic!("expected a query plan");
        };
        assert_eq!(plan.index.name, "TABLE");
        assert_eq!(
            plan.key_condition.to_string(),
            "(author = 'a' AND posted > 5)"
        );
        assert_eq!(plan.filter.unwrap().to_string(), "extra = 1");
    }

    #[test]
    fn test_should_be_deterministic_across_calls() {
        let c = constraint("author = 'a'");
        let first = select_index(&meta(), &c, None, false).unwrap();
        for _ in 0..10 {
            assert_eq!(select_index(&meta(), &c, None, false).unwrap(), first);
        }
    }

    #[test]
    fn test_should_error_without_index_when_scans_disallowed() {
        let result = select_index(&meta(), &constraint("extra = 1"), None, false);
        assert!(matches!(result, Err(EngineError::NoIndexAvailable { .. })));
    }

    #[test]
    fn test_should_degrade_to_scan_when_allowed() {
        let plan = select_index(&meta(), &constraint("extra = 1"), None, true).unwrap();
        let Plan::Scan { index, filter } = plan else {
            panic!("expected a scan plan");
        };
        assert!(index.is_none());
        assert_eq!(filter.unwrap().to_string(), "extra = 1");
    }

    #[test]
    fn test_should_force_scan_for_or_rooted_trees() {
        let result = select_index(&meta(), &constraint("author = 'a' OR topic = 'x'"), None, false);
        assert!(matches!(result, Err(EngineError::NoIndexAvailable { .. })));
    }

    #[test]
    fn test_should_validate_named_index_hash_key() {
        let err = select_index(
            &meta(),
            &constraint("author = 'a'"),
            Some("topic-idx"),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::IndexKeyMismatch { .. }));

        let plan = select_index(
            &meta(),
            &constraint("topic = 'rust'"),
            Some("topic-idx"),
            false,
        )
        .unwrap();
        assert!(matches!(plan, Plan::Query(p) if p.index.name == "topic-idx"));
    }

    #[test]
    fn test_should_error_on_unknown_named_index() {
        let err =
            select_index(&meta(), &constraint("author = 'a'"), Some("nope"), false).unwrap_err();
        assert!(matches!(err, EngineError::UnknownIndex { .. }));
    }

    #[test]
    fn test_should_restrict_scans_to_global_indexes() {
        assert!(validate_scan_index(&meta(), "topic-idx").is_ok());
        assert!(validate_scan_index(&meta(), "score-idx").is_err());
        assert!(validate_scan_index(&meta(), "TABLE").is_ok());
    }
}
