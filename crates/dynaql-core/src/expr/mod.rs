//! The typed expression model: constraints (WHERE), selections (projection
//! lists), updates (SET/REMOVE/ADD/DELETE), and the encoding visitor that
//! renders backend-safe expression strings.

pub mod constraint;
pub mod selection;
pub mod update;
pub mod visitor;

pub use constraint::{Constraint, Operand};
pub use selection::{NamedSelection, Projected, SelectExpr, Selection};
pub use update::{UpdateAction, UpdateExpression};
pub use visitor::{Encoder, ExprVisitor, RawRenderer};
