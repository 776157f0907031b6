//! Literal resolution: parsed literals to typed values.
//!
//! Resolution happens at statement-bind time with the session [`Scope`], and
//! again per row for UPDATE right-hand sides, where the current item's fields
//! shadow session variables. Identifiers that resolve nowhere are a fatal
//! [`EngineError::UnknownVariable`], never a silent null.
//!
//! Timestamp expressions (`NOW()`, `TIMESTAMP(x)`, `± INTERVAL '...'`)
//! resolve to epoch-second numbers, which is what the store persists; the
//! selection layer renders datetimes only in projection output.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use dynaql_model::{Item, Number, Value};

use crate::error::EngineError;
use crate::lang::ast::Literal;

/// The last epoch second of year 9999. A numeric timestamp larger than this
/// (in magnitude) cannot be epoch seconds, so it is read as milliseconds.
const MAX_EPOCH_SECONDS: i64 = 253_402_300_799;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Session-level variable bindings consulted during literal resolution.
///
/// The scope is an immutable snapshot from the resolver's point of view;
/// updates go through the owning session between statements.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
}

impl Scope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Remove a binding.
    pub fn unset(&mut self, name: &str) {
        self.vars.remove(name);
    }

    /// Look up a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve a literal against the session scope.
pub fn resolve(literal: &Literal, scope: &Scope) -> Result<Value, EngineError> {
    resolve_inner(literal, &|name| scope.get(name).cloned())
}

/// Resolve a literal against a row overlaid on the session scope; row fields
/// shadow session variables.
pub fn resolve_with_row(
    literal: &Literal,
    scope: &Scope,
    row: &Item,
) -> Result<Value, EngineError> {
    resolve_inner(literal, &|name| {
        row.get(name).cloned().or_else(|| scope.get(name).cloned())
    })
}

fn resolve_inner(
    literal: &Literal,
    lookup: &dyn Fn(&str) -> Option<Value>,
) -> Result<Value, EngineError> {
    match literal {
        Literal::Num { text, negative } => {
            let number = Number::parse(text)?;
            Ok(Value::N(if *negative { number.neg() } else { number }))
        }
        Literal::Str(s) => Ok(Value::S(s.clone())),
        Literal::Bool(b) => Ok(Value::Bool(*b)),
        Literal::Null => Ok(Value::Null),
        Literal::Binary(b) => Ok(Value::B(bytes::Bytes::from(b.clone()))),
        Literal::Set(items) => resolve_set(items, lookup),
        Literal::List(items) => {
            let values: Result<Vec<Value>, EngineError> =
                items.iter().map(|i| resolve_inner(i, lookup)).collect();
            Ok(Value::L(values?))
        }
        Literal::Map(entries) => {
            let mut map = HashMap::new();
            for (key, value) in entries {
                map.insert(key.clone(), resolve_inner(value, lookup)?);
            }
            Ok(Value::M(map))
        }
        Literal::Var(name) => lookup(name).ok_or_else(|| EngineError::UnknownVariable {
            name: name.clone(),
        }),
        Literal::Now { .. } | Literal::Timestamp { .. } | Literal::TsOffset { .. } => {
            Ok(epoch_value(resolve_datetime(literal, lookup)?))
        }
    }
}

/// Sets are typed by their first element; mixing element types is an error.
fn resolve_set(
    items: &[Literal],
    lookup: &dyn Fn(&str) -> Option<Value>,
) -> Result<Value, EngineError> {
    let values: Result<Vec<Value>, EngineError> =
        items.iter().map(|i| resolve_inner(i, lookup)).collect();
    let values = values?;
    let Some(first) = values.first() else {
        // The empty-set literal `()`.
        return Ok(Value::Ss(Vec::new()));
    };
    match first {
        Value::S(_) => {
            let strings: Option<Vec<String>> =
                values.iter().map(|v| v.as_s().map(str::to_owned)).collect();
            strings.map(Value::Ss)
        }
        Value::N(_) => {
            let numbers: Option<Vec<Number>> = values.iter().map(|v| v.as_n().copied()).collect();
            numbers.map(Value::Ns)
        }
        Value::B(_) => {
            let bins: Option<Vec<bytes::Bytes>> = values
                .iter()
                .map(|v| match v {
                    Value::B(b) => Some(b.clone()),
                    _ => None,
                })
                .collect();
            bins.map(Value::Bs)
        }
        other => {
            return Err(EngineError::Syntax(format!(
                "sets may only contain strings, numbers, or binary (found {})",
                other.type_descriptor()
            )));
        }
    }
    .ok_or_else(|| EngineError::Syntax("set elements must all have the same type".to_owned()))
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Resolve a timestamp-flavored literal to an instant.
pub fn resolve_datetime(
    literal: &Literal,
    lookup: &dyn Fn(&str) -> Option<Value>,
) -> Result<DateTime<Utc>, EngineError> {
    match literal {
        Literal::Now { .. } => Ok(Utc::now()),
        Literal::Timestamp { utc, arg } => match resolve_inner(arg, lookup)? {
            Value::S(s) => parse_datetime_str(&s, *utc),
            Value::N(n) => datetime_from_epoch_number(&n),
            other => Err(EngineError::Syntax(format!(
                "TIMESTAMP() requires a string or number, found {}",
                other.type_descriptor()
            ))),
        },
        Literal::TsOffset { base, offsets } => {
            let mut instant = resolve_datetime(base, lookup)?;
            for (negative, spec) in offsets {
                let interval = parse_interval(spec)?;
                instant = interval.apply(instant, *negative)?;
            }
            Ok(instant)
        }
        other => match resolve_inner(other, lookup)? {
            Value::N(n) => datetime_from_epoch_number(&n),
            Value::S(s) => parse_datetime_str(&s, true),
            v => Err(EngineError::Syntax(format!(
                "expected a timestamp, found {}",
                v.type_descriptor()
            ))),
        },
    }
}

/// Convert an instant to the epoch-second number the store persists.
#[must_use]
pub fn epoch_value(instant: DateTime<Utc>) -> Value {
    let micros = instant.timestamp_micros();
    if micros % 1_000_000 == 0 {
        Value::N(Number::Int(micros / 1_000_000))
    } else {
        Value::N(Number::from(Decimal::new(micros, 6)))
    }
}

/// Interpret a numeric epoch value, auto-detecting seconds vs. milliseconds:
/// a magnitude that would land past year 9999 as seconds is read as
/// milliseconds instead.
pub fn datetime_from_epoch_number(number: &Number) -> Result<DateTime<Utc>, EngineError> {
    let raw = number.as_decimal();
    let seconds = if raw.abs() > Decimal::from(MAX_EPOCH_SECONDS) {
        raw / Decimal::from(1000)
    } else {
        raw
    };
    let micros = (seconds * Decimal::from(1_000_000))
        .trunc()
        .to_i64()
        .ok_or_else(|| EngineError::Syntax(format!("timestamp '{number}' is out of range")))?;
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| EngineError::Syntax(format!("timestamp '{number}' is out of range")))
}

/// Parse a datetime string permissively. Strings without an explicit zone
/// are read as UTC when `utc` is set, and as local time otherwise.
pub fn parse_datetime_str(text: &str, utc: bool) -> Result<DateTime<Utc>, EngineError> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
    ];
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| EngineError::Syntax(format!("cannot parse timestamp '{text}'")))?;

    if utc {
        Ok(naive.and_utc())
    } else {
        use chrono::TimeZone;
        chrono::Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| EngineError::Syntax(format!("ambiguous local timestamp '{text}'")))
    }
}

// ---------------------------------------------------------------------------
// Intervals
// ---------------------------------------------------------------------------

/// A calendar-aware duration with mixed-unit accumulation.
///
/// Months apply calendar arithmetic; days and sub-day units are fixed-width.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interval {
    /// Whole months (years fold in at 12 months each).
    pub months: i64,
    /// Whole days (weeks fold in at 7 days each).
    pub days: i64,
    /// Microseconds (hours, minutes, seconds fold in).
    pub micros: i64,
}

impl Interval {
    /// Apply this interval to an instant, subtracting when `negative`.
    pub fn apply(
        &self,
        instant: DateTime<Utc>,
        negative: bool,
    ) -> Result<DateTime<Utc>, EngineError> {
        let sign: i64 = if negative { -1 } else { 1 };
        let months = sign * self.months;
        let shifted = if months >= 0 {
            let months = u32::try_from(months)
                .ok()
                .map(Months::new)
                .ok_or_else(|| EngineError::Syntax("interval months out of range".to_owned()))?;
            instant.checked_add_months(months)
        } else {
            let months = u32::try_from(-months)
                .ok()
                .map(Months::new)
                .ok_or_else(|| EngineError::Syntax("interval months out of range".to_owned()))?;
            instant.checked_sub_months(months)
        };
        shifted
            .and_then(|dt| dt.checked_add_signed(Duration::days(sign * self.days)))
            .and_then(|dt| dt.checked_add_signed(Duration::microseconds(sign * self.micros)))
            .ok_or_else(|| EngineError::Syntax("interval arithmetic out of range".to_owned()))
    }
}

/// Parse an interval spec like `"1 hour"` or `"1 year, 2 months 3 days"`.
pub fn parse_interval(spec: &str) -> Result<Interval, EngineError> {
    let mut interval = Interval::default();
    let mut tokens = spec
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty());

    let mut saw_any = false;
    while let Some(amount_text) = tokens.next() {
        let amount: i64 = amount_text.parse().map_err(|_| {
            EngineError::Syntax(format!("invalid interval amount '{amount_text}'"))
        })?;
        let unit = tokens
            .next()
            .ok_or_else(|| EngineError::Syntax(format!("missing unit after '{amount_text}'")))?;
        match unit.to_ascii_lowercase().trim_end_matches('s') {
            "year" => interval.months += amount * 12,
            "month" => interval.months += amount,
            "week" => interval.days += amount * 7,
            "day" => interval.days += amount,
            "hour" => interval.micros += amount * 3_600_000_000,
            "minute" => interval.micros += amount * 60_000_000,
            "second" => interval.micros += amount * 1_000_000,
            "millisecond" => interval.micros += amount * 1_000,
            "microsecond" => interval.micros += amount,
            other => {
                return Err(EngineError::Syntax(format!(
                    "unknown interval unit '{other}'"
                )));
            }
        }
        saw_any = true;
    }
    if !saw_any {
        return Err(EngineError::Syntax("empty interval".to_owned()));
    }
    Ok(interval)
}

/// Render an instant for projection output (RFC 3339, UTC).
#[must_use]
pub fn format_datetime(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::parse_condition;
    use crate::lang::ast::{ConditionExpr, FieldOrLiteral};

    fn lit(input: &str) -> Literal {
        // Parse `x = <literal>` and pull the literal back out.
        let cond = parse_condition(&format!("x = {input}")).unwrap();
        let ConditionExpr::Compare { value, .. } = cond else {
            panic!("expected comparison");
        };
        // A bare identifier RHS parses as a field reference; the resolver
        // treats such identifiers as scope variables.
        match value {
            FieldOrLiteral::Literal(literal) => literal,
            FieldOrLiteral::Field(name) => Literal::Var(name),
        }
    }

    #[test]
    fn test_should_resolve_integer_and_decimal_literals() {
        let scope = Scope::new();
        assert_eq!(resolve(&lit("4"), &scope).unwrap(), Value::from(4));
        assert_eq!(resolve(&lit("-7"), &scope).unwrap(), Value::from(-7));
        let v = resolve(&lit("1.5"), &scope).unwrap();
        assert!(matches!(v, Value::N(Number::Decimal(_))));
    }

    #[test]
    fn test_should_resolve_collection_literals() {
        let scope = Scope::new();
        assert_eq!(
            resolve(&lit("('a', 'b')"), &scope).unwrap(),
            Value::Ss(vec!["a".to_owned(), "b".to_owned()])
        );
        assert_eq!(
            resolve(&lit("(1, 2)"), &scope).unwrap(),
            Value::Ns(vec![Number::Int(1), Number::Int(2)])
        );
        assert_eq!(
            resolve(&lit("[1, 'a']"), &scope).unwrap(),
            Value::L(vec![Value::from(1), Value::from("a")])
        );
        let Value::M(m) = resolve(&lit("{'k': 1}"), &scope).unwrap() else {
            panic!("expected map");
        };
        assert_eq!(m["k"], Value::from(1));
    }

    #[test]
    fn test_should_resolve_empty_set_to_empty_string_set() {
        let scope = Scope::new();
        assert_eq!(resolve(&lit("()"), &scope).unwrap(), Value::Ss(Vec::new()));
    }

    #[test]
    fn test_should_reject_mixed_type_set() {
        let scope = Scope::new();
        let result = resolve(&lit("(1, 'a')"), &scope);
        assert!(matches!(result, Err(EngineError::Syntax(_))));
    }

    #[test]
    fn test_should_resolve_variable_from_scope() {
        let mut scope = Scope::new();
        scope.set("who", Value::from("alice"));
        assert_eq!(resolve(&lit("who"), &scope).unwrap(), Value::from("alice"));
    }

    #[test]
    fn test_should_fail_on_unknown_variable() {
        let result = resolve(&lit("nope"), &Scope::new());
        assert!(matches!(
            result,
            Err(EngineError::UnknownVariable { name }) if name == "nope"
        ));
    }

    #[test]
    fn test_should_shadow_scope_with_row_fields() {
        let mut scope = Scope::new();
        scope.set("x", Value::from(100));
        let mut row = Item::new();
        row.insert("x".to_owned(), Value::from(1));
        assert_eq!(
            resolve_with_row(&lit("x"), &scope, &row).unwrap(),
            Value::from(1)
        );
        // Fields absent from the row still come from the session scope.
        scope.set("y", Value::from(2));
        assert_eq!(
            resolve_with_row(&lit("y"), &scope, &row).unwrap(),
            Value::from(2)
        );
    }

    #[test]
    fn test_should_resolve_timestamp_string_to_epoch_seconds() {
        let scope = Scope::new();
        let v = resolve(&lit("UTCTIMESTAMP('2020-01-01')"), &scope).unwrap();
        assert_eq!(v, Value::from(1_577_836_800));
    }

    #[test]
    fn test_should_detect_millisecond_epochs_by_magnitude() {
        // 1.6e12 read as seconds would land far past year 9999.
        let dt = datetime_from_epoch_number(&Number::Int(1_600_000_000_000)).unwrap();
        assert_eq!(dt.timestamp(), 1_600_000_000);
        // Small magnitudes stay seconds.
        let dt = datetime_from_epoch_number(&Number::Int(1_600_000_000)).unwrap();
        assert_eq!(dt.timestamp(), 1_600_000_000);
    }

    #[test]
    fn test_should_apply_interval_offsets() {
        let scope = Scope::new();
        let v = resolve(
            &lit("UTCTIMESTAMP('2020-03-01') - INTERVAL '1 day'"),
            &scope,
        )
        .unwrap();
        // 2020 is a leap year: one day before March 1 is February 29.
        let expected = resolve(&lit("UTCTIMESTAMP('2020-02-29')"), &scope).unwrap();
        assert_eq!(v, expected);
    }

    #[test]
    fn test_should_accumulate_mixed_interval_units() {
        let interval = parse_interval("1 year 2 months, 1 week 1 day 90 minutes").unwrap();
        assert_eq!(interval.months, 14);
        assert_eq!(interval.days, 8);
        assert_eq!(interval.micros, 90 * 60_000_000);
    }

    #[test]
    fn test_should_apply_calendar_month_arithmetic() {
        let start = parse_datetime_str("2020-01-31", true).unwrap();
        let shifted = parse_interval("1 month").unwrap().apply(start, false).unwrap();
        // Clamped to the end of February.
        assert_eq!(shifted, parse_datetime_str("2020-02-29", true).unwrap());
    }

    #[test]
    fn test_should_reject_unknown_interval_unit() {
        assert!(parse_interval("3 fortnights").is_err());
    }

    #[test]
    fn test_should_resolve_now_to_a_number() {
        let v = resolve(&lit("NOW()"), &Scope::new()).unwrap();
        assert!(matches!(v, Value::N(_)));
    }
}
