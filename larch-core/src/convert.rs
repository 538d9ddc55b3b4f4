//! Converters for typed cells.
//!
//! A converter runs on every value written to a typed cell before it is
//! stored. Rejecting the value leaves the cell untouched and surfaces as
//! [`ReactiveError::Conversion`](crate::ReactiveError::Conversion).

use std::rc::Rc;

use chrono::NaiveDateTime;

use crate::pointer::Pointer;
use crate::value::Value;

/// Shared converter closure. The error string becomes the conversion reason.
pub type Converter = Rc<dyn Fn(Value) -> Result<Value, String>>;

/// Wrap a closure as a [`Converter`].
pub fn from_fn<F>(f: F) -> Converter
where
    F: Fn(Value) -> Result<Value, String> + 'static,
{
    Rc::new(f)
}

fn rejected(expected: &str, value: &Value) -> String {
    format!("expected {expected}, got {} `{value}`", value.kind_name())
}

/// Integers; floats are truncated, strings parsed, booleans map to 0/1.
/// Floats outside the `i64` range are rejected.
pub fn int() -> Converter {
    from_fn(|value| match value {
        Value::Int(_) => Ok(value),
        Value::Float(f) => {
            let whole = f.trunc();
            if whole >= i64::MIN as f64 && whole < i64::MAX as f64 {
                Ok(Value::Int(whole as i64))
            } else {
                Err(rejected("an integer in range", &value))
            }
        }
        Value::Bool(b) => Ok(Value::Int(b.into())),
        Value::Str(ref s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| rejected("an integer", &value)),
        other => Err(rejected("an integer", &other)),
    })
}

/// Floats; integers are promoted, strings parsed.
pub fn float() -> Converter {
    from_fn(|value| match value {
        Value::Float(_) => Ok(value),
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::Str(ref s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| rejected("a number", &value)),
        other => Err(rejected("a number", &other)),
    })
}

/// Strings; any scalar is rendered with its display form.
pub fn string() -> Converter {
    from_fn(|value| match value {
        Value::Str(_) => Ok(value),
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::DateTime(_)
        | Value::Duration(_) => Ok(Value::Str(value.to_string().into())),
        other => Err(rejected("a scalar", &other)),
    })
}

/// Booleans from truthiness.
pub fn boolean() -> Converter {
    from_fn(|value| match value {
        Value::Bool(_) => Ok(value),
        Value::Null | Value::Int(_) | Value::Float(_) | Value::Str(_) => {
            Ok(Value::Bool(value.is_truthy()))
        }
        other => Err(rejected("a boolean", &other)),
    })
}

/// Timestamps; strings are parsed as ISO 8601 (`2016-01-09T08:00:00`).
pub fn datetime() -> Converter {
    from_fn(|value| match value {
        Value::DateTime(_) => Ok(value),
        Value::Str(ref s) => s
            .trim()
            .parse::<NaiveDateTime>()
            .map(Value::DateTime)
            .map_err(|_| rejected("an ISO 8601 timestamp", &value)),
        other => Err(rejected("a timestamp", &other)),
    })
}

/// Pointers and expressions pass through; anything else becomes a
/// constant pointer.
pub fn pointer() -> Converter {
    from_fn(|value| match value {
        Value::Pointer(_) | Value::Expression(_) => Ok(value),
        other => Ok(Value::Pointer(Pointer::constant(other))),
    })
}

/// Accepts only values of the same kind as `template` (or null).
pub fn same_kind(template: &Value) -> Converter {
    let kind = template.kind_name();
    from_fn(move |value| {
        if value.is_null() || value.kind_name() == kind {
            Ok(value)
        } else {
            Err(rejected(kind, &value))
        }
    })
}

/// Converter matching the kind of a typed cell's default.
pub fn infer(default: &Value) -> Converter {
    match default {
        Value::Int(_) => int(),
        Value::Float(_) => float(),
        Value::Str(_) => string(),
        Value::Bool(_) => boolean(),
        Value::DateTime(_) => datetime(),
        Value::Pointer(_) | Value::Expression(_) => pointer(),
        other => same_kind(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_parses_strings() {
        let convert = int();
        assert_eq!(convert(Value::from("1")).unwrap(), Value::Int(1));
        assert_eq!(convert(Value::Float(2.9)).unwrap(), Value::Int(2));
        assert!(convert(Value::from("one")).is_err());
    }

    #[test]
    fn int_rejects_out_of_range_floats() {
        let convert = int();
        for f in [1e30, -1e30, 9.3e18, f64::NAN, f64::INFINITY] {
            let err = convert(Value::Float(f)).unwrap_err();
            assert!(err.contains("an integer in range"), "{err}");
        }
        assert_eq!(
            convert(Value::Float(-9.2e18)).unwrap(),
            Value::Int(-9_200_000_000_000_000_000)
        );
        assert_eq!(convert(Value::Float(-0.5)).unwrap(), Value::Int(0));
    }

    #[test]
    fn float_promotes() {
        let convert = float();
        assert_eq!(convert(Value::from("2")).unwrap(), Value::Float(2.0));
        assert_eq!(convert(Value::Int(3)).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn datetime_parses_iso() {
        let convert = datetime();
        let value = convert(Value::from("2016-01-09T08:00:00")).unwrap();
        assert_eq!(value.to_string(), "2016-01-09 08:00:00");
    }

    #[test]
    fn infer_follows_default_kind() {
        assert_eq!(infer(&Value::Int(0))(Value::from("7")).unwrap(), Value::Int(7));
        let err = infer(&Value::Null)(Value::Int(1)).unwrap_err();
        assert!(err.contains("expected null"));
    }

    #[test]
    fn pointer_wraps_constants() {
        let value = pointer()(Value::Int(5)).unwrap();
        assert!(value.is_proxy());
        assert_eq!(value.resolve().unwrap(), Value::Int(5));
    }
}
