//! Typed conversion between Rust values and stored JSON values

use super::{
    coerce_bool, coerce_f64, coerce_i64, coerce_string, coerce_u64, format_timespan, key_to_string,
    parse_timespan, seconds_to_span, ValueKind,
};
use crate::error::{ValueError, ValueResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;
use uuid::Uuid;

/// A Rust type that can be stored in the attribute store or the config registry.
///
/// `kind()` names the stored shape, `to_value()` renders the canonical JSON
/// form, and `from_value()` reads it back, coercing leniently where the stored
/// form was written by hand or by an older module version.
pub trait ValueType: Sized + Send + Sync + 'static {
    fn kind() -> ValueKind;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> ValueResult<Self>;
}

impl ValueType for bool {
    fn kind() -> ValueKind {
        ValueKind::Bool
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        coerce_bool(value)
    }
}

macro_rules! signed_value_type {
    ($($ty:ty),+) => {
        $(
            impl ValueType for $ty {
                fn kind() -> ValueKind {
                    ValueKind::Int
                }

                fn to_value(&self) -> Value {
                    Value::from(*self as i64)
                }

                fn from_value(value: &Value) -> ValueResult<Self> {
                    let wide = coerce_i64(value)?;
                    <$ty>::try_from(wide).map_err(|_| ValueError::OutOfRange {
                        expected: stringify!($ty).to_string(),
                        value: wide.to_string(),
                    })
                }
            }
        )+
    };
}

macro_rules! unsigned_value_type {
    ($($ty:ty),+) => {
        $(
            impl ValueType for $ty {
                fn kind() -> ValueKind {
                    ValueKind::Int
                }

                fn to_value(&self) -> Value {
                    Value::from(*self as u64)
                }

                fn from_value(value: &Value) -> ValueResult<Self> {
                    let wide = coerce_u64(value)?;
                    <$ty>::try_from(wide).map_err(|_| ValueError::OutOfRange {
                        expected: stringify!($ty).to_string(),
                        value: wide.to_string(),
                    })
                }
            }
        )+
    };
}

signed_value_type!(i8, i16, i32, i64, isize);
unsigned_value_type!(u8, u16, u32, u64, usize);

impl ValueType for f64 {
    fn kind() -> ValueKind {
        ValueKind::Float
    }

    fn to_value(&self) -> Value {
        serde_json::Number::from_f64(*self)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        coerce_f64(value)
    }
}

impl ValueType for f32 {
    fn kind() -> ValueKind {
        ValueKind::Float
    }

    fn to_value(&self) -> Value {
        f64::from(*self).to_value()
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        coerce_f64(value).map(|f| f as f32)
    }
}

impl ValueType for String {
    fn kind() -> ValueKind {
        ValueKind::String
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        coerce_string(value)
    }
}

impl ValueType for DateTime<Utc> {
    fn kind() -> ValueKind {
        ValueKind::DateTime
    }

    fn to_value(&self) -> Value {
        Value::String(self.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        let text = value
            .as_str()
            .ok_or_else(|| ValueError::mismatch(ValueKind::DateTime, value))?;
        DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| ValueError::InvalidLiteral {
                kind: "datetime".to_string(),
                value: text.to_string(),
                reason: e.to_string(),
            })
    }
}

impl ValueType for Duration {
    fn kind() -> ValueKind {
        ValueKind::TimeSpan
    }

    fn to_value(&self) -> Value {
        Value::String(format_timespan(*self))
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        match value {
            Value::String(text) => parse_timespan(text),
            Value::Number(_) => seconds_to_span(coerce_f64(value)?),
            other => Err(ValueError::mismatch(ValueKind::TimeSpan, other)),
        }
    }
}

impl ValueType for Uuid {
    fn kind() -> ValueKind {
        ValueKind::Guid
    }

    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        let text = value
            .as_str()
            .ok_or_else(|| ValueError::mismatch(ValueKind::Guid, value))?;
        Uuid::parse_str(text).map_err(|e| ValueError::InvalidLiteral {
            kind: "guid".to_string(),
            value: text.to_string(),
            reason: e.to_string(),
        })
    }
}

impl ValueType for url::Url {
    fn kind() -> ValueKind {
        ValueKind::Uri
    }

    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        let text = value
            .as_str()
            .ok_or_else(|| ValueError::mismatch(ValueKind::Uri, value))?;
        url::Url::parse(text).map_err(|e| ValueError::InvalidLiteral {
            kind: "uri".to_string(),
            value: text.to_string(),
            reason: e.to_string(),
        })
    }
}

impl ValueType for Value {
    fn kind() -> ValueKind {
        ValueKind::Any
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        Ok(value.clone())
    }
}

impl<T: ValueType> ValueType for Option<T> {
    fn kind() -> ValueKind {
        ValueKind::nullable(T::kind())
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ValueType> ValueType for Vec<T> {
    fn kind() -> ValueKind {
        ValueKind::list(T::kind())
    }

    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(ValueType::to_value).collect())
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            other => Err(ValueError::mismatch(Self::kind(), other)),
        }
    }
}

impl<K, V> ValueType for HashMap<K, V>
where
    K: ValueType + Eq + Hash,
    V: ValueType,
{
    fn kind() -> ValueKind {
        ValueKind::dict(K::kind(), V::kind())
    }

    fn to_value(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(k, v)| (key_to_string(&k.to_value()), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        match value {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| -> ValueResult<(K, V)> {
                    Ok((K::from_value(&Value::String(k.clone()))?, V::from_value(v)?))
                })
                .collect(),
            other => Err(ValueError::mismatch(Self::kind(), other)),
        }
    }
}

impl<K, V> ValueType for BTreeMap<K, V>
where
    K: ValueType + Ord,
    V: ValueType,
{
    fn kind() -> ValueKind {
        ValueKind::dict(K::kind(), V::kind())
    }

    fn to_value(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(k, v)| (key_to_string(&k.to_value()), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: &Value) -> ValueResult<Self> {
        match value {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| -> ValueResult<(K, V)> {
                    Ok((K::from_value(&Value::String(k.clone()))?, V::from_value(v)?))
                })
                .collect(),
            other => Err(ValueError::mismatch(Self::kind(), other)),
        }
    }
}

/// Resolves a stored enum value to one of `variants`.
///
/// Accepts the variant name in any letter case, or its zero-based ordinal.
pub fn enum_variant_name<'a>(value: &Value, name: &str, variants: &[&'a str]) -> ValueResult<&'a str> {
    let unknown = |variant: String| ValueError::UnknownVariant {
        name: name.to_string(),
        variant,
    };
    match value {
        Value::String(text) => variants
            .iter()
            .copied()
            .find(|v| v.eq_ignore_ascii_case(text.trim()))
            .ok_or_else(|| unknown(text.clone())),
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| variants.get(i).copied())
            .ok_or_else(|| unknown(n.to_string())),
        other => Err(ValueError::mismatch(format!("enum {}", name), other)),
    }
}

/// Implements [`ValueType`] for a fieldless enum, storing variants by name.
///
/// ```rust
/// use zenith_core::value_enum;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum RankMode { Points, Kills }
///
/// value_enum!(RankMode { Points, Kills });
/// ```
#[macro_export]
macro_rules! value_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::value::ValueType for $ty {
            fn kind() -> $crate::value::ValueKind {
                $crate::value::ValueKind::enumeration(stringify!($ty), &[$(stringify!($variant)),+])
            }

            fn to_value(&self) -> $crate::__serde_json::Value {
                match self {
                    $($ty::$variant => $crate::__serde_json::Value::String(stringify!($variant).to_string()),)+
                }
            }

            fn from_value(value: &$crate::__serde_json::Value) -> $crate::error::ValueResult<Self> {
                let name = $crate::value::enum_variant_name(value, stringify!($ty), &[$(stringify!($variant)),+])?;
                $(
                    if name == stringify!($variant) {
                        return Ok($ty::$variant);
                    }
                )+
                Err($crate::error::ValueError::UnknownVariant {
                    name: stringify!($ty).to_string(),
                    variant: name.to_string(),
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum RankMode {
        Points,
        Kills,
    }

    crate::value_enum!(RankMode { Points, Kills });

    #[test]
    fn test_primitive_coercion() {
        assert_eq!(i32::from_value(&json!("5000")).unwrap(), 5000);
        assert_eq!(i32::from_value(&json!(12.0)).unwrap(), 12);
        assert!(u8::from_value(&json!(300)).is_err());
        assert!(u32::from_value(&json!(-1)).is_err());
        assert_eq!(u64::from_value(&json!(76561198012345678u64)).unwrap(), 76561198012345678);
        assert!(bool::from_value(&json!("yes")).unwrap());
        assert_eq!(String::from_value(&json!(42)).unwrap(), "42");
        assert_eq!(f64::from_value(&json!(3)).unwrap(), 3.0);
    }

    #[test]
    fn test_generic_containers() {
        let value = json!({"de": ["1", 2], "en": []});
        let parsed = HashMap::<String, Vec<i64>>::from_value(&value).unwrap();
        assert_eq!(parsed["de"], vec![1, 2]);
        assert!(parsed["en"].is_empty());

        let keyed = BTreeMap::<u32, bool>::from_value(&json!({"7": true})).unwrap();
        assert_eq!(keyed.get(&7), Some(&true));
        assert_eq!(keyed.to_value(), json!({"7": true}));

        assert_eq!(Option::<i32>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(&json!(3)).unwrap(), Some(3));
        assert_eq!(Option::<i32>::kind().to_string(), "nullable<int>");
    }

    #[test]
    fn test_enum_by_name_and_ordinal() {
        assert_eq!(RankMode::from_value(&json!("kills")).unwrap(), RankMode::Kills);
        assert_eq!(RankMode::from_value(&json!(0)).unwrap(), RankMode::Points);
        assert!(RankMode::from_value(&json!("deaths")).is_err());
        assert_eq!(RankMode::Kills.to_value(), json!("Kills"));
        assert_eq!(RankMode::kind().to_string(), "enum<RankMode:Points|Kills>");
    }

    #[test]
    fn test_special_scalars() {
        let id = Uuid::new_v4();
        assert_eq!(Uuid::from_value(&id.to_value()).unwrap(), id);

        let span = Duration::from_secs(3_725);
        assert_eq!(span.to_value(), json!("01:02:05"));
        assert_eq!(Duration::from_value(&json!(90)).unwrap(), Duration::from_secs(90));

        let when = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(DateTime::<Utc>::from_value(&when.to_value()).unwrap(), when);

        let uri = url::Url::from_value(&json!("https://example.com/ranks")).unwrap();
        assert_eq!(uri.host_str(), Some("example.com"));
        assert!(url::Url::from_value(&json!("not a uri")).is_err());
    }
}
