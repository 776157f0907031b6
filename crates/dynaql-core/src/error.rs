//! Error taxonomy for the query front-end and engine.

use dynaql_model::{SchemaError, ValueError};

use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// A parse failure with a byte offset into the source text.
///
/// The offset points at the token (or character) where parsing failed; use
/// [`ParseError::point_at`] to render the offending line with a caret.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} (at offset {offset})")]
pub struct ParseError {
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Byte offset into the original source text.
    pub offset: usize,
}

impl ParseError {
    /// Create a parse error at the given source offset.
    #[must_use]
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }

    /// Render the offending source line with a caret under the failure
    /// column, e.g.:
    ///
    /// ```text
    /// SELECT * FORM foobars
    ///          ^
    /// ```
    #[must_use]
    pub fn point_at(&self, source: &str) -> String {
        let offset = self.offset.min(source.len());
        let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[offset..]
            .find('\n')
            .map_or(source.len(), |i| offset + i);
        let line = &source[line_start..line_end];
        let column = source[line_start..offset].chars().count();
        format!("{line}\n{}^", " ".repeat(column))
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Top-level error type for statement execution.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The query text could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The statement parsed but is semantically invalid.
    #[error("syntax error: {0}")]
    Syntax(String),
    /// An identifier could not be resolved in the ambient scope.
    #[error("unknown variable '{name}'")]
    UnknownVariable {
        /// The unresolved identifier.
        name: String,
    },
    /// No index can serve the query and scanning is not allowed.
    #[error(
        "no index can serve this query on table '{table}'; \
         add a key condition or enable scans"
    )]
    NoIndexAvailable {
        /// The table being queried.
        table: String,
    },
    /// An explicitly named index cannot serve the query's constraints.
    #[error("constraints do not include the hash key '{hash_key}' of index '{index}'")]
    IndexKeyMismatch {
        /// The named index.
        index: String,
        /// The hash key the constraints must pin.
        hash_key: String,
    },
    /// The named index does not exist on the table.
    #[error("unknown index '{index}' on table '{table}'")]
    UnknownIndex {
        /// The named index.
        index: String,
        /// The table.
        table: String,
    },
    /// A field appears in more than one update sub-clause.
    #[error("field '{field}' appears in more than one update clause")]
    DuplicateFieldUpdate {
        /// The duplicated field.
        field: String,
    },
    /// A value conversion or arithmetic failure.
    #[error(transparent)]
    Value(#[from] ValueError),
    /// A table-description interpretation failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A backend error, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A bulk mutation failed partway through; items already mutated stay
    /// mutated.
    #[error("bulk mutation failed after {processed} items: {source}")]
    PartialFailure {
        /// Items successfully mutated before the failure.
        processed: u64,
        /// The underlying backend error.
        source: StoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_point_caret_at_offset() {
        let err = ParseError::new("unexpected token", 9);
        let rendered = err.point_at("SELECT * FORM foobars");
        assert_eq!(rendered, "SELECT * FORM foobars\n         ^");
    }

    #[test]
    fn test_should_point_caret_on_correct_line_of_multiline_source() {
        let source = "SELECT *\nFROM foobars\nWHERE ???";
        let offset = source.find("???").unwrap();
        let err = ParseError::new("unexpected token", offset);
        let rendered = err.point_at(source);
        assert_eq!(rendered, "WHERE ???\n      ^");
    }

    #[test]
    fn test_should_clamp_offset_past_end_of_source() {
        let err = ParseError::new("unexpected end of input", 999);
        let rendered = err.point_at("SELECT");
        assert_eq!(rendered, "SELECT\n      ^");
    }
}
