//! Encoding visitor for expression rendering.
//!
//! Backends reserve many words, so raw field names and values never appear in
//! rendered expressions. A [`ExprVisitor`] is passed by reference into each
//! `build` call; the [`Encoder`] implementation replaces field names with
//! `#fN` placeholders and values with `:vN` placeholders, collecting the
//! substitution maps to send alongside the expression string.
//!
//! Field placeholders are memoized: the same field name always maps to the
//! same placeholder within one visitor. Value placeholders are never
//! memoized; every occurrence gets a fresh one.

use std::collections::HashMap;

use dynaql_model::Value;

/// Translates raw field names and values into expression-safe tokens.
pub trait ExprVisitor {
    /// The safe representation of a field name (or dotted/indexed path).
    fn get_field(&mut self, field: &str) -> String;
    /// The safe representation of a value.
    fn get_value(&mut self, value: &Value) -> String;
}

/// The placeholder-substituting visitor used for real backend calls.
#[derive(Debug, Default)]
pub struct Encoder {
    field_to_key: HashMap<String, String>,
    fields: HashMap<String, String>,
    values: HashMap<String, Value>,
    next_field: usize,
    next_value: usize,
}

impl Encoder {
    /// Create an empty encoder. Encoders are single-use: one per built
    /// expression set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder-to-name substitutions collected so far, if any.
    #[must_use]
    pub fn attribute_names(&self) -> Option<&HashMap<String, String>> {
        if self.fields.is_empty() {
            None
        } else {
            Some(&self.fields)
        }
    }

    /// Placeholder-to-value substitutions collected so far, if any.
    #[must_use]
    pub fn expression_values(&self) -> Option<&HashMap<String, Value>> {
        if self.values.is_empty() {
            None
        } else {
            Some(&self.values)
        }
    }

    /// Consume the encoder, returning the collected substitution maps.
    #[must_use]
    pub fn into_maps(self) -> (HashMap<String, String>, HashMap<String, Value>) {
        (self.fields, self.values)
    }

    fn placeholder(&mut self, name: &str) -> String {
        if let Some(key) = self.field_to_key.get(name) {
            return key.clone();
        }
        self.next_field += 1;
        let key = format!("#f{}", self.next_field);
        self.field_to_key.insert(name.to_owned(), key.clone());
        self.fields.insert(key.clone(), name.to_owned());
        key
    }
}

impl ExprVisitor for Encoder {
    fn get_field(&mut self, field: &str) -> String {
        // Encode each name segment of a path, leaving dots and `[n]`
        // subscripts intact: `info.tags[0]` -> `#f1.#f2[0]`.
        field
            .split('.')
            .map(|segment| match segment.find('[') {
                Some(bracket) => {
                    let (name, subscript) = segment.split_at(bracket);
                    format!("{}{subscript}", self.placeholder(name))
                }
                None => self.placeholder(segment),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn get_value(&mut self, value: &Value) -> String {
        self.next_value += 1;
        let key = format!(":v{}", self.next_value);
        self.values.insert(key.clone(), value.clone());
        key
    }
}

/// Pass-through visitor rendering fields and values in source syntax.
///
/// Used for `Display` implementations and diagnostics; its output re-parses
/// to the original expression for scalar values.
#[derive(Debug, Default)]
pub struct RawRenderer;

impl ExprVisitor for RawRenderer {
    fn get_field(&mut self, field: &str) -> String {
        field.to_owned()
    }

    fn get_value(&mut self, value: &Value) -> String {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_memoize_field_placeholders() {
        let mut encoder = Encoder::new();
        let a = encoder.get_field("order");
        let b = encoder.get_field("order");
        assert_eq!(a, b);
        assert_eq!(a, "#f1");
        assert_eq!(encoder.attribute_names().unwrap()["#f1"], "order");
    }

    #[test]
    fn test_should_never_memoize_values() {
        let mut encoder = Encoder::new();
        let a = encoder.get_value(&Value::from(1));
        let b = encoder.get_value(&Value::from(1));
        assert_ne!(a, b);
        assert_eq!(encoder.expression_values().unwrap().len(), 2);
    }

    #[test]
    fn test_should_encode_each_path_segment() {
        let mut encoder = Encoder::new();
        let encoded = encoder.get_field("info.tags[0]");
        assert_eq!(encoded, "#f1.#f2[0]");
        let names = encoder.attribute_names().unwrap();
        assert_eq!(names["#f1"], "info");
        assert_eq!(names["#f2"], "tags");
    }

    #[test]
    fn test_should_render_raw_syntax() {
        let mut raw = RawRenderer;
        assert_eq!(raw.get_field("foo"), "foo");
        assert_eq!(raw.get_value(&Value::from("green")), "'green'");
        assert_eq!(raw.get_value(&Value::from(3)), "3");
    }
}
