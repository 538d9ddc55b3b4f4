//! Dynamic values stored in cells.
//!
//! A [`Value`] is either plain data (numbers, strings, timestamps, plain
//! sequences and maps) or a handle into the reactive world (objects,
//! reactive collections, pointers, proxy expressions and change actions).
//! Plain data compares structurally; reactive handles compare by identity.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use chrono::{NaiveDateTime, TimeDelta};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

use crate::collections::{ActionRecord, Dict, List};
use crate::error::{ReactiveError, Result};
use crate::pointer::{Pointer, PointerExpression};
use crate::reactive::Object;

/// Hashable key of a plain map or reactive dict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DictKey {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for DictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for DictKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for DictKey {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<bool> for DictKey {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for DictKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for DictKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<DictKey> for Value {
    fn from(key: DictKey) -> Self {
        match key {
            DictKey::Bool(b) => Value::Bool(b),
            DictKey::Int(i) => Value::Int(i),
            DictKey::Str(s) => Value::Str(s.into()),
        }
    }
}

/// Arithmetic operators understood by values and proxy expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

/// A value held by a cell.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    /// Plain, non-reactive sequence snapshot.
    Seq(Rc<Vec<Value>>),
    /// Plain, non-reactive map snapshot.
    Map(Rc<IndexMap<DictKey, Value>>),
    Object(Object),
    List(List),
    Dict(Dict),
    Pointer(Pointer),
    Expression(PointerExpression),
    Action(ActionRecord),
}

impl Value {
    /// Short name of the value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::DateTime(_) => "datetime",
            Self::Duration(_) => "duration",
            Self::Seq(_) => "seq",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Pointer(_) => "pointer",
            Self::Expression(_) => "expression",
            Self::Action(_) => "action",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Truth value for conditions such as "if a predecessor is set".
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Duration(d) => !d.is_zero(),
            Self::Seq(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
            Self::DateTime(_)
            | Self::Object(_)
            | Self::List(_)
            | Self::Dict(_)
            | Self::Pointer(_)
            | Self::Expression(_)
            | Self::Action(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view; integers are promoted.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<TimeDelta> {
        match self {
            Self::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Self::Seq(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<DictKey, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The reactive object behind an object, list or dict value.
    pub fn as_reactive(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            Self::List(list) => Some(list.as_object()),
            Self::Dict(dict) => Some(dict.as_object()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Self::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&Pointer> {
        match self {
            Self::Pointer(pointer) => Some(pointer),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionRecord> {
        match self {
            Self::Action(record) => Some(record),
            _ => None,
        }
    }

    /// Whether reading this value goes through a pointer or expression.
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Pointer(_) | Self::Expression(_))
    }

    /// Dereference a stored pointer or expression; other values are
    /// returned unchanged.
    ///
    /// Inside a rule, every cell the proxy resolves through becomes a
    /// dependency of that rule.
    pub fn resolve(&self) -> Result<Value> {
        match self {
            Self::Pointer(pointer) => pointer.get(),
            Self::Expression(expression) => expression.eval(),
            other => Ok(other.clone()),
        }
    }

    fn mismatch(&self, op: &'static str, rhs: &Value) -> ReactiveError {
        ReactiveError::TypeMismatch {
            op,
            lhs: self.kind_name(),
            rhs: rhs.kind_name(),
        }
    }

    /// Apply a binary arithmetic operator.
    pub fn binary(&self, op: BinaryOp, rhs: &Value) -> Result<Value> {
        use BinaryOp::*;
        use Value::*;

        let overflow = || ReactiveError::InvalidOperation(format!("overflow in `{}`", op.symbol()));

        match (op, self, rhs) {
            (Div, Int(_) | Float(_), Int(_) | Float(_)) if rhs.as_float() == Some(0.0) => Err(
                ReactiveError::InvalidOperation("division by zero".into()),
            ),
            (Add, Int(a), Int(b)) => a.checked_add(*b).map(Int).ok_or_else(overflow),
            (Sub, Int(a), Int(b)) => a.checked_sub(*b).map(Int).ok_or_else(overflow),
            (Mul, Int(a), Int(b)) => a.checked_mul(*b).map(Int).ok_or_else(overflow),
            (_, Int(_) | Float(_), Int(_) | Float(_)) => {
                let (a, b) = match (self.as_float(), rhs.as_float()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(self.mismatch(op.symbol(), rhs)),
                };
                Ok(Float(match op {
                    Add => a + b,
                    Sub => a - b,
                    Mul => a * b,
                    Div => a / b,
                }))
            }
            (Add, DateTime(t), Duration(d)) | (Add, Duration(d), DateTime(t)) => {
                t.checked_add_signed(*d).map(DateTime).ok_or_else(overflow)
            }
            (Sub, DateTime(t), Duration(d)) => {
                t.checked_sub_signed(*d).map(DateTime).ok_or_else(overflow)
            }
            (Sub, DateTime(a), DateTime(b)) => Ok(Duration(a.signed_duration_since(*b))),
            (Add, Duration(a), Duration(b)) => a.checked_add(b).map(Duration).ok_or_else(overflow),
            (Sub, Duration(a), Duration(b)) => a.checked_sub(b).map(Duration).ok_or_else(overflow),
            (Mul, Duration(d), Int(n)) | (Mul, Int(n), Duration(d)) => i32::try_from(*n)
                .ok()
                .and_then(|n| d.checked_mul(n))
                .map(Duration)
                .ok_or_else(overflow),
            (Div, Duration(_), Int(0)) => Err(ReactiveError::InvalidOperation(
                "division by zero".into(),
            )),
            (Div, Duration(d), Int(n)) => i32::try_from(*n)
                .ok()
                .and_then(|n| d.checked_div(n))
                .map(Duration)
                .ok_or_else(overflow),
            (Add, Str(a), Str(b)) => Ok(Str(format!("{a}{b}").into())),
            (Add, Seq(a), Seq(b)) => {
                let mut items = Vec::with_capacity(a.len() + b.len());
                items.extend(a.iter().cloned());
                items.extend(b.iter().cloned());
                Ok(Seq(Rc::new(items)))
            }
            (Mul, Seq(items), Int(n)) => {
                let n = usize::try_from(*n).unwrap_or(0);
                let len = items.len().checked_mul(n).ok_or_else(overflow)?;
                let mut repeated = Vec::new();
                repeated.try_reserve_exact(len).map_err(|_| overflow())?;
                repeated.extend(items.iter().cloned().cycle().take(len));
                Ok(Seq(Rc::new(repeated)))
            }
            _ => Err(self.mismatch(op.symbol(), rhs)),
        }
    }

    pub fn try_add(&self, rhs: &Value) -> Result<Value> {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn try_sub(&self, rhs: &Value) -> Result<Value> {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn try_mul(&self, rhs: &Value) -> Result<Value> {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn try_div(&self, rhs: &Value) -> Result<Value> {
        self.binary(BinaryOp::Div, rhs)
    }

    pub fn try_neg(&self) -> Result<Value> {
        match self {
            Self::Int(i) => i
                .checked_neg()
                .map(Self::Int)
                .ok_or_else(|| ReactiveError::InvalidOperation("overflow in `-`".into())),
            Self::Float(f) => Ok(Self::Float(-f)),
            Self::Duration(d) => Ok(Self::Duration(-*d)),
            other => Err(other.mismatch("neg", &Value::Null)),
        }
    }

    /// Total comparison between values of compatible kinds.
    pub fn compare(&self, rhs: &Value) -> Result<Ordering> {
        use Value::*;
        match (self, rhs) {
            (Null, Null) => Ok(Ordering::Equal),
            (Bool(a), Bool(b)) => Ok(a.cmp(b)),
            (Int(a), Int(b)) => Ok(a.cmp(b)),
            (Int(_) | Float(_), Int(_) | Float(_)) => self
                .as_float()
                .zip(rhs.as_float())
                .and_then(|(a, b)| a.partial_cmp(&b))
                .ok_or_else(|| self.mismatch("cmp", rhs)),
            (Str(a), Str(b)) => Ok(a.cmp(b)),
            (DateTime(a), DateTime(b)) => Ok(a.cmp(b)),
            (Duration(a), Duration(b)) => Ok(a.cmp(b)),
            (Seq(a), Seq(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        other => return Ok(other),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(self.mismatch("cmp", rhs)),
        }
    }

    /// The larger of two comparable values.
    pub fn max(self, rhs: Value) -> Result<Value> {
        Ok(match self.compare(&rhs)? {
            Ordering::Less => rhs,
            _ => self,
        })
    }

    /// The smaller of two comparable values.
    pub fn min(self, rhs: Value) -> Result<Value> {
        Ok(match self.compare(&rhs)? {
            Ordering::Greater => rhs,
            _ => self,
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Int(_) | Float(_), Int(_) | Float(_)) => self.as_float() == other.as_float(),
            (Str(a), Str(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Duration(a), Duration(b)) => a == b,
            (Seq(a), Seq(b)) => Rc::ptr_eq(a, b) || a == b,
            (Map(a), Map(b)) => Rc::ptr_eq(a, b) || a == b,
            (Object(a), Object(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Dict(a), Dict(b)) => a == b,
            (Pointer(a), Pointer(b)) => a == b,
            (Expression(a), Expression(b)) => a == b,
            (Action(a), Action(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => f.write_str(s),
            Self::DateTime(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            Self::Duration(d) => write!(f, "{d}"),
            Self::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Object(object) => write!(f, "{object}"),
            Self::List(list) => write!(f, "{list}"),
            Self::Dict(dict) => write!(f, "{dict}"),
            Self::Pointer(pointer) => write!(f, "{pointer}"),
            Self::Expression(expression) => write!(f, "{expression}"),
            Self::Action(record) => write!(f, "{record}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Str(s) => serializer.serialize_str(s),
            Self::DateTime(t) => t.serialize(serializer),
            Self::Duration(d) => serializer.collect_str(d),
            Self::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Action(record) => record.serialize(serializer),
            Self::Object(_)
            | Self::List(_)
            | Self::Dict(_)
            | Self::Pointer(_)
            | Self::Expression(_) => serializer.collect_str(self),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from($v: $ty) -> Self {
                    $body
                }
            }
        )*
    };
}

value_from! {
    bool => |v| Value::Bool(v),
    i64 => |v| Value::Int(v),
    i32 => |v| Value::Int(v.into()),
    u32 => |v| Value::Int(v.into()),
    f64 => |v| Value::Float(v),
    &str => |v| Value::Str(v.into()),
    String => |v| Value::Str(v.into()),
    NaiveDateTime => |v| Value::DateTime(v),
    TimeDelta => |v| Value::Duration(v),
    Vec<Value> => |v| Value::Seq(Rc::new(v)),
    IndexMap<DictKey, Value> => |v| Value::Map(Rc::new(v)),
    Object => |v| Value::Object(v),
    &Object => |v| Value::Object(v.clone()),
    List => |v| Value::List(v),
    Dict => |v| Value::Dict(v),
    Pointer => |v| Value::Pointer(v),
    PointerExpression => |v| Value::Expression(v),
    ActionRecord => |v| Value::Action(v),
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

macro_rules! value_try_into {
    ($($ty:ty => $kind:literal, $accessor:ident);* $(;)?) => {
        $(
            impl TryFrom<Value> for $ty {
                type Error = ReactiveError;

                fn try_from(value: Value) -> Result<Self> {
                    value.$accessor().ok_or(ReactiveError::TypeMismatch {
                        op: "into",
                        lhs: value.kind_name(),
                        rhs: $kind,
                    })
                }
            }
        )*
    };
}

value_try_into! {
    bool => "bool", as_bool;
    i64 => "int", as_int;
    f64 => "float", as_float;
    NaiveDateTime => "datetime", as_datetime;
    TimeDelta => "duration", as_duration;
}

impl TryFrom<Value> for String {
    type Error = ReactiveError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(ReactiveError::TypeMismatch {
                op: "into",
                lhs: other.kind_name(),
                rhs: "str",
            }),
        }
    }
}

impl TryFrom<Value> for Object {
    type Error = ReactiveError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => Ok(object),
            other => Err(ReactiveError::TypeMismatch {
                op: "into",
                lhs: other.kind_name(),
                rhs: "object",
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> Value {
        NaiveDate::from_ymd_opt(2016, 1, 9)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .map(Value::DateTime)
            .unwrap()
    }

    #[test]
    fn numbers_promote_to_float() {
        assert_eq!(Value::Int(2).try_add(&Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(
            Value::Int(2).try_add(&Value::Float(0.5)).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Int(7).try_div(&Value::Int(2)).unwrap(), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero_is_rejected() {
        let err = Value::Int(1).try_div(&Value::Int(0)).unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidOperation(_)));
    }

    #[test]
    fn huge_sequence_repeat_is_rejected() {
        let seq = Value::Seq(Rc::new(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(
            seq.try_mul(&Value::Int(3)).unwrap(),
            Value::Seq(Rc::new([1, 2, 1, 2, 1, 2].map(Value::Int).to_vec()))
        );
        for n in [i64::MAX, i64::MAX / 2] {
            let err = seq.try_mul(&Value::Int(n)).unwrap_err();
            assert_eq!(err, ReactiveError::InvalidOperation("overflow in `*`".into()));
        }
        assert_eq!(seq.try_mul(&Value::Int(-1)).unwrap(), Value::Seq(Rc::new(Vec::new())));
    }

    #[test]
    fn datetime_arithmetic() {
        let start = at(8, 0);
        let end = start.try_add(&TimeDelta::hours(2).into()).unwrap();
        assert_eq!(end, at(10, 0));
        assert_eq!(
            end.try_sub(&start).unwrap(),
            Value::Duration(TimeDelta::hours(2))
        );
        assert_eq!(
            Value::Duration(TimeDelta::minutes(30))
                .try_mul(&Value::Int(3))
                .unwrap(),
            Value::Duration(TimeDelta::minutes(90))
        );
    }

    #[test]
    fn incompatible_operands_mismatch() {
        let err = Value::from("a").try_add(&Value::Int(1)).unwrap_err();
        assert_eq!(
            err,
            ReactiveError::TypeMismatch {
                op: "+",
                lhs: "str",
                rhs: "int"
            }
        );
    }

    #[test]
    fn compare_and_max() {
        assert_eq!(
            Value::Int(1).compare(&Value::Float(1.5)).unwrap(),
            Ordering::Less
        );
        assert_eq!(at(9, 0).max(at(11, 0)).unwrap(), at(11, 0));
        assert!(Value::from("x").compare(&Value::Int(1)).is_err());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::Int(3).is_truthy());
        assert!(!Value::from(Vec::<Value>::new()).is_truthy());
    }

    #[test]
    fn serializes_plain_data() {
        let mut map = IndexMap::new();
        map.insert(DictKey::from("n"), Value::Int(1));
        let value = Value::from(vec![Value::Null, Value::from("s"), Value::from(map)]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"[null,"s",{"n":1}]"#);
    }

    #[test]
    fn try_from_reports_kinds() {
        assert_eq!(i64::try_from(Value::Int(4)).unwrap(), 4);
        let err = i64::try_from(Value::from("4")).unwrap_err();
        assert_eq!(
            err,
            ReactiveError::TypeMismatch {
                op: "into",
                lhs: "str",
                rhs: "int"
            }
        );
    }
}
