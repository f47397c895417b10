//! # Value typing
//!
//! Player attributes and configuration entries are held as `serde_json::Value`
//! and typed on access. This module provides the closed set of supported
//! kinds ([`ValueKind`]), the serialized type tag grammar stored next to every
//! config entry, structural validation, and the lenient coercions shared by
//! all [`ValueType`] implementations.
//!
//! ## Type tags
//!
//! | Tag | Rust type |
//! |-----|-----------|
//! | `bool` | `bool` |
//! | `int` | any integer width |
//! | `float` | `f32`, `f64` |
//! | `string` | `String` |
//! | `datetime` | `chrono::DateTime<Utc>` (RFC 3339 text) |
//! | `timespan` | `std::time::Duration` (`[d.]hh:mm:ss[.fffffff]` text) |
//! | `guid` | `uuid::Uuid` |
//! | `uri` | `url::Url` |
//! | `enum<Name:A\|B>` | fieldless enums via [`value_enum!`](crate::value_enum) |
//! | `list<T>` | `Vec<T>` |
//! | `dict<K,V>` | `HashMap<K, V>`, `BTreeMap<K, V>` |
//! | `nullable<T>` | `Option<T>` |
//! | `any` | `serde_json::Value` |

mod convert;

pub use convert::{enum_variant_name, ValueType};

use crate::error::{ValueError, ValueResult};
use chrono::DateTime;
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Value kinds
// ============================================================================

/// Closed union of the value shapes a stored attribute or config entry may take.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    String,
    DateTime,
    TimeSpan,
    Guid,
    Uri,
    Enum { name: String, variants: Vec<String> },
    List(Box<ValueKind>),
    Dict(Box<ValueKind>, Box<ValueKind>),
    Nullable(Box<ValueKind>),
    /// Untyped JSON passthrough
    Any,
}

impl ValueKind {
    pub fn list(element: ValueKind) -> Self {
        ValueKind::List(Box::new(element))
    }

    pub fn dict(key: ValueKind, value: ValueKind) -> Self {
        ValueKind::Dict(Box::new(key), Box::new(value))
    }

    pub fn nullable(inner: ValueKind) -> Self {
        match inner {
            ValueKind::Nullable(_) => inner,
            other => ValueKind::Nullable(Box::new(other)),
        }
    }

    pub fn enumeration(name: &str, variants: &[&str]) -> Self {
        ValueKind::Enum {
            name: name.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Whether a value of kind `other` may be stored in a slot of this kind.
    ///
    /// Equal kinds are always accepted. `float` accepts `int`, `nullable<T>`
    /// accepts `T`, and containers are checked element by element, so
    /// `list<string>` rejects `list<int>`.
    pub fn accepts(&self, other: &ValueKind) -> bool {
        match (self, other) {
            (ValueKind::Any, _) => true,
            (a, b) if a == b => true,
            (ValueKind::Float, ValueKind::Int) => true,
            (ValueKind::Nullable(inner), ValueKind::Nullable(o)) => inner.accepts(o),
            (ValueKind::Nullable(inner), o) => inner.accepts(o),
            (ValueKind::List(a), ValueKind::List(b)) => a.accepts(b),
            (ValueKind::Dict(ak, av), ValueKind::Dict(bk, bv)) => ak.accepts(bk) && av.accepts(bv),
            (ValueKind::Enum { name: a, .. }, ValueKind::Enum { name: b, .. }) => a == b,
            _ => false,
        }
    }

    /// Structural check of a JSON value against this kind.
    pub fn validate(&self, value: &Value) -> ValueResult<()> {
        self.normalize(value).map(|_| ())
    }

    /// Coerces a JSON value into the canonical representation of this kind.
    ///
    /// Hand-edited documents often quote numbers or write `1` for `true`;
    /// those are accepted and rewritten. Anything that cannot be coerced is an
    /// error naming both shapes.
    pub fn normalize(&self, value: &Value) -> ValueResult<Value> {
        match self {
            ValueKind::Any => Ok(value.clone()),
            ValueKind::Nullable(inner) => match value {
                Value::Null => Ok(Value::Null),
                other => inner.normalize(other),
            },
            ValueKind::Bool => coerce_bool(value).map(Value::Bool),
            ValueKind::Int => match value {
                Value::Number(n) if n.is_u64() => Ok(value.clone()),
                _ => coerce_i64(value).map(|i| Value::Number(i.into())),
            },
            ValueKind::Float => {
                let f = coerce_f64(value)?;
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| ValueError::OutOfRange {
                        expected: "float".to_string(),
                        value: f.to_string(),
                    })
            }
            ValueKind::String => coerce_string(value).map(Value::String),
            ValueKind::DateTime => {
                let text = expect_str(value, self)?;
                DateTime::parse_from_rfc3339(text).map_err(|e| ValueError::InvalidLiteral {
                    kind: "datetime".to_string(),
                    value: text.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(value.clone())
            }
            ValueKind::TimeSpan => {
                let span = match value {
                    Value::String(text) => parse_timespan(text)?,
                    Value::Number(_) => seconds_to_span(coerce_f64(value)?)?,
                    other => return Err(ValueError::mismatch(self, other)),
                };
                Ok(Value::String(format_timespan(span)))
            }
            ValueKind::Guid => {
                let text = expect_str(value, self)?;
                let id = Uuid::parse_str(text).map_err(|e| ValueError::InvalidLiteral {
                    kind: "guid".to_string(),
                    value: text.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Value::String(id.to_string()))
            }
            ValueKind::Uri => {
                let text = expect_str(value, self)?;
                let uri = url::Url::parse(text).map_err(|e| ValueError::InvalidLiteral {
                    kind: "uri".to_string(),
                    value: text.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Value::String(uri.to_string()))
            }
            ValueKind::Enum { name, variants } => {
                let refs: Vec<&str> = variants.iter().map(String::as_str).collect();
                let variant = enum_variant_name(value, name, &refs)?;
                Ok(Value::String(variant.to_string()))
            }
            ValueKind::List(element) => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| element.normalize(item))
                    .collect::<ValueResult<Vec<_>>>()
                    .map(Value::Array),
                other => Err(ValueError::mismatch(self, other)),
            },
            ValueKind::Dict(key, element) => match value {
                Value::Object(map) => {
                    let mut out = serde_json::Map::with_capacity(map.len());
                    for (k, v) in map {
                        let normalized_key = key.normalize(&Value::String(k.clone()))?;
                        out.insert(key_to_string(&normalized_key), element.normalize(v)?);
                    }
                    Ok(Value::Object(out))
                }
                other => Err(ValueError::mismatch(self, other)),
            },
        }
    }
}

// ============================================================================
// Type tag grammar
// ============================================================================

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => f.write_str("bool"),
            ValueKind::Int => f.write_str("int"),
            ValueKind::Float => f.write_str("float"),
            ValueKind::String => f.write_str("string"),
            ValueKind::DateTime => f.write_str("datetime"),
            ValueKind::TimeSpan => f.write_str("timespan"),
            ValueKind::Guid => f.write_str("guid"),
            ValueKind::Uri => f.write_str("uri"),
            ValueKind::Any => f.write_str("any"),
            ValueKind::Enum { name, variants } => write!(f, "enum<{}:{}>", name, variants.join("|")),
            ValueKind::List(element) => write!(f, "list<{}>", element),
            ValueKind::Dict(key, value) => write!(f, "dict<{},{}>", key, value),
            ValueKind::Nullable(inner) => write!(f, "nullable<{}>", inner),
        }
    }
}

impl FromStr for ValueKind {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = TagParser { tag: s, pos: 0 };
        let kind = parser.kind()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(parser.malformed("trailing characters"));
        }
        Ok(kind)
    }
}

impl serde::Serialize for ValueKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ValueKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

/// Recursive-descent parser over the type tag grammar.
struct TagParser<'a> {
    tag: &'a str,
    pos: usize,
}

impl<'a> TagParser<'a> {
    fn malformed(&self, reason: &str) -> ValueError {
        ValueError::MalformedTypeTag {
            tag: self.tag.to_string(),
            reason: format!("{} at offset {}", reason, self.pos),
        }
    }

    fn rest(&self) -> &'a str {
        &self.tag[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.tag.len() - trimmed.len();
    }

    fn ident(&mut self) -> ValueResult<&'a str> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.malformed("expected identifier"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn expect(&mut self, c: char) -> ValueResult<()> {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.malformed(&format!("expected '{}'", c)))
        }
    }

    fn peek(&mut self, c: char) -> bool {
        self.skip_ws();
        self.rest().starts_with(c)
    }

    fn kind(&mut self) -> ValueResult<ValueKind> {
        let name = self.ident()?;
        let kind = match name.to_ascii_lowercase().as_str() {
            "bool" => ValueKind::Bool,
            "int" => ValueKind::Int,
            "float" => ValueKind::Float,
            "string" => ValueKind::String,
            "datetime" => ValueKind::DateTime,
            "timespan" => ValueKind::TimeSpan,
            "guid" => ValueKind::Guid,
            "uri" => ValueKind::Uri,
            "any" => ValueKind::Any,
            "list" => {
                self.expect('<')?;
                let element = self.kind()?;
                self.expect('>')?;
                ValueKind::list(element)
            }
            "nullable" => {
                self.expect('<')?;
                let inner = self.kind()?;
                self.expect('>')?;
                ValueKind::nullable(inner)
            }
            "dict" => {
                self.expect('<')?;
                let key = self.kind()?;
                self.expect(',')?;
                let value = self.kind()?;
                self.expect('>')?;
                ValueKind::dict(key, value)
            }
            "enum" => {
                self.expect('<')?;
                let enum_name = self.ident()?.to_string();
                self.expect(':')?;
                let mut variants = vec![self.ident()?.to_string()];
                while self.peek('|') {
                    self.expect('|')?;
                    variants.push(self.ident()?.to_string());
                }
                self.expect('>')?;
                ValueKind::Enum {
                    name: enum_name,
                    variants,
                }
            }
            _ => return Err(ValueError::UnknownTypeTag(self.tag.to_string())),
        };
        Ok(kind)
    }
}

// ============================================================================
// Lenient coercions
// ============================================================================

fn expect_str<'v>(value: &'v Value, kind: &ValueKind) -> ValueResult<&'v str> {
    value.as_str().ok_or_else(|| ValueError::mismatch(kind, value))
}

pub(crate) fn coerce_bool(value: &Value) -> ValueResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(ValueError::mismatch("bool", value)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ValueError::mismatch("bool", value)),
        },
        other => Err(ValueError::mismatch("bool", other)),
    }
}

pub(crate) fn coerce_i64(value: &Value) -> ValueResult<i64> {
    let out_of_range = || ValueError::OutOfRange {
        expected: "int".to_string(),
        value: value.to_string(),
    };
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.is_u64() {
                Err(out_of_range())
            } else {
                integral(n.as_f64().unwrap_or(f64::NAN)).ok_or_else(out_of_range)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
                .ok_or_else(|| ValueError::mismatch("int", value))
        }
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(ValueError::mismatch("int", other)),
    }
}

pub(crate) fn coerce_u64(value: &Value) -> ValueResult<u64> {
    match value {
        Value::Number(n) if n.is_u64() => Ok(n.as_u64().unwrap_or_default()),
        Value::String(s) if s.trim().parse::<u64>().is_ok() => Ok(s.trim().parse::<u64>().unwrap_or_default()),
        _ => {
            let i = coerce_i64(value)?;
            u64::try_from(i).map_err(|_| ValueError::OutOfRange {
                expected: "unsigned int".to_string(),
                value: value.to_string(),
            })
        }
    }
}

pub(crate) fn coerce_f64(value: &Value) -> ValueResult<f64> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| ValueError::mismatch("float", value)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ValueError::mismatch("float", value)),
        other => Err(ValueError::mismatch("float", other)),
    }
}

pub(crate) fn coerce_string(value: &Value) -> ValueResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ValueError::mismatch("string", other)),
    }
}

fn integral(f: f64) -> Option<i64> {
    // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// JSON object keys are always text; scalar keys are rendered without quotes.
pub(crate) fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Timespans
// ============================================================================

/// Parses `[d.]hh:mm:ss[.fffffff]` into a duration.
pub fn parse_timespan(text: &str) -> ValueResult<Duration> {
    let invalid = |reason: &str| ValueError::InvalidLiteral {
        kind: "timespan".to_string(),
        value: text.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = text.trim();
    if trimmed.starts_with('-') {
        return Err(invalid("negative spans are not supported"));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid("expected hh:mm:ss"));
    }

    let (days, hours) = match parts[0].split_once('.') {
        Some((d, h)) => (
            d.parse::<u64>().map_err(|_| invalid("bad day count"))?,
            h.parse::<u64>().map_err(|_| invalid("bad hours"))?,
        ),
        None => (0, parts[0].parse::<u64>().map_err(|_| invalid("bad hours"))?),
    };
    let minutes = parts[1].parse::<u64>().map_err(|_| invalid("bad minutes"))?;
    let (seconds, nanos) = match parts[2].split_once('.') {
        Some((s, frac)) => {
            if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("bad fraction"));
            }
            let padded = format!("{:0<9}", frac);
            (
                s.parse::<u64>().map_err(|_| invalid("bad seconds"))?,
                padded.parse::<u32>().map_err(|_| invalid("bad fraction"))?,
            )
        }
        None => (parts[2].parse::<u64>().map_err(|_| invalid("bad seconds"))?, 0),
    };

    if hours > 23 || minutes > 59 || seconds > 59 {
        return Err(invalid("component out of range"));
    }

    let total = days
        .checked_mul(86_400)
        .and_then(|d| d.checked_add(hours * 3_600 + minutes * 60 + seconds))
        .ok_or_else(|| invalid("span too large"))?;
    Ok(Duration::new(total, nanos))
}

/// Converts a plain number of seconds into a duration.
pub(crate) fn seconds_to_span(seconds: f64) -> ValueResult<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|e| ValueError::InvalidLiteral {
        kind: "timespan".to_string(),
        value: seconds.to_string(),
        reason: e.to_string(),
    })
}

/// Formats a duration as `[d.]hh:mm:ss[.fffffff]`.
pub fn format_timespan(span: Duration) -> String {
    let total = span.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    let ticks = span.subsec_nanos() / 100;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{}.", days));
    }
    out.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
    if ticks > 0 {
        out.push_str(&format!(".{:07}", ticks));
    }
    out
}
