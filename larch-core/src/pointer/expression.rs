//! Proxy Expressions
//!
//! Arithmetic on [`Pointer`]s does not compute anything; it builds an
//! expression tree whose leaves are pointers and constants. Evaluating the
//! tree resolves the leaves it reaches and applies the operators.
//!
//! # Dependencies
//!
//! Only the leaves actually resolved during an evaluation are read. With
//! [`PointerExpression::select`], the branch not taken is never resolved,
//! so a rule evaluating the expression depends on the active branch only.
//!
//! # Example
//!
//! ```rust
//! use chrono::{NaiveDate, TimeDelta};
//! use larch_core::{Pointer, PointerExpression, Runtime, Schema, Value};
//!
//! let rt = Runtime::new();
//! let schema = Schema::builder("Task").cell("start", Value::Null).build().unwrap();
//! let start = NaiveDate::from_ymd_opt(2016, 1, 9).unwrap().and_hms_opt(8, 0, 0).unwrap();
//! let task = rt.create(&schema, [("start", Value::from(start))]).unwrap();
//!
//! let end = Pointer::to(&task).attr("start") + TimeDelta::hours(2);
//! assert_eq!(end.eval().unwrap(), Value::from(start + TimeDelta::hours(2)));
//!
//! let later = PointerExpression::max(end.clone(), start + TimeDelta::hours(3));
//! assert_eq!(later.eval().unwrap(), Value::from(start + TimeDelta::hours(3)));
//! ```

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

use chrono::{NaiveDateTime, TimeDelta};

use super::Pointer;
use crate::error::Result;
use crate::value::{BinaryOp, Value};

/// Function applied by a call node to its evaluated arguments.
pub type ExprFn = Rc<dyn Fn(&[Value]) -> Result<Value>>;

enum ExprNode {
    Pointer(Pointer),
    Constant(Value),
    Neg(PointerExpression),
    Binary(BinaryOp, PointerExpression, PointerExpression),
    Call {
        name: Rc<str>,
        func: ExprFn,
        args: Vec<PointerExpression>,
    },
    Select {
        condition: PointerExpression,
        then: PointerExpression,
        otherwise: PointerExpression,
    },
}

/// Lazily evaluated function of pointers.
#[derive(Clone)]
pub struct PointerExpression(Rc<ExprNode>);

impl PointerExpression {
    fn node(node: ExprNode) -> Self {
        Self(Rc::new(node))
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Self::node(ExprNode::Constant(value.into()))
    }

    /// Apply `func` to the evaluated `args`.
    pub fn call<F, I, A>(name: &str, func: F, args: I) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
        I: IntoIterator<Item = A>,
        A: Into<PointerExpression>,
    {
        Self::node(ExprNode::Call {
            name: name.into(),
            func: Rc::new(func),
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    /// The larger of two operands.
    pub fn max(a: impl Into<PointerExpression>, b: impl Into<PointerExpression>) -> Self {
        let args: [PointerExpression; 2] = [a.into(), b.into()];
        Self::call("max", |args| fold_extreme(args, Value::max), args)
    }

    /// The smaller of two operands.
    pub fn min(a: impl Into<PointerExpression>, b: impl Into<PointerExpression>) -> Self {
        let args: [PointerExpression; 2] = [a.into(), b.into()];
        Self::call("min", |args| fold_extreme(args, Value::min), args)
    }

    /// `then` when `condition` is truthy, otherwise `otherwise`.
    pub fn select(
        condition: impl Into<PointerExpression>,
        then: impl Into<PointerExpression>,
        otherwise: impl Into<PointerExpression>,
    ) -> Self {
        Self::node(ExprNode::Select {
            condition: condition.into(),
            then: then.into(),
            otherwise: otherwise.into(),
        })
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<PointerExpression>) -> Self {
        Self::node(ExprNode::Binary(op, self, rhs.into()))
    }

    /// Evaluate the tree, resolving the pointers it reaches.
    pub fn eval(&self) -> Result<Value> {
        match &*self.0 {
            ExprNode::Pointer(pointer) => pointer.get()?.resolve(),
            ExprNode::Constant(value) => Ok(value.clone()),
            ExprNode::Neg(inner) => inner.eval()?.try_neg(),
            ExprNode::Binary(op, lhs, rhs) => lhs.eval()?.binary(*op, &rhs.eval()?),
            ExprNode::Call { func, args, .. } => {
                let values = args.iter().map(Self::eval).collect::<Result<Vec<_>>>()?;
                func(&values)
            }
            ExprNode::Select {
                condition,
                then,
                otherwise,
            } => {
                if condition.eval()?.is_truthy() {
                    then.eval()
                } else {
                    otherwise.eval()
                }
            }
        }
    }

    /// Every pointer leaf of the tree, in evaluation order.
    pub fn pointers(&self) -> Vec<Pointer> {
        let mut out = Vec::new();
        self.collect_pointers(&mut out);
        out
    }

    fn collect_pointers(&self, out: &mut Vec<Pointer>) {
        match &*self.0 {
            ExprNode::Pointer(pointer) => out.push(pointer.clone()),
            ExprNode::Constant(_) => {}
            ExprNode::Neg(inner) => inner.collect_pointers(out),
            ExprNode::Binary(_, lhs, rhs) => {
                lhs.collect_pointers(out);
                rhs.collect_pointers(out);
            }
            ExprNode::Call { args, .. } => {
                for arg in args {
                    arg.collect_pointers(out);
                }
            }
            ExprNode::Select {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_pointers(out);
                then.collect_pointers(out);
                otherwise.collect_pointers(out);
            }
        }
    }
}

fn fold_extreme(args: &[Value], pick: fn(Value, Value) -> Result<Value>) -> Result<Value> {
    let mut values = args.iter().cloned();
    let first = values.next().unwrap_or_default();
    values.try_fold(first, pick)
}

impl PartialEq for PointerExpression {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for PointerExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ExprNode::Pointer(pointer) => write!(f, "{pointer}"),
            ExprNode::Constant(value) => write!(f, "{value}"),
            ExprNode::Neg(inner) => write!(f, "-{inner}"),
            ExprNode::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.symbol()),
            ExprNode::Call { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            ExprNode::Select {
                condition,
                then,
                otherwise,
            } => write!(f, "({then} if {condition} else {otherwise})"),
        }
    }
}

impl fmt::Debug for PointerExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointerExpression({self})")
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<Pointer> for PointerExpression {
    fn from(pointer: Pointer) -> Self {
        Self::node(ExprNode::Pointer(pointer))
    }
}

impl From<&Pointer> for PointerExpression {
    fn from(pointer: &Pointer) -> Self {
        pointer.clone().into()
    }
}

impl From<Value> for PointerExpression {
    fn from(value: Value) -> Self {
        match value {
            Value::Pointer(pointer) => pointer.into(),
            Value::Expression(expression) => expression,
            other => Self::constant(other),
        }
    }
}

macro_rules! expression_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PointerExpression {
                fn from(value: $ty) -> Self {
                    Self::constant(value)
                }
            }
        )*
    };
}

expression_from_scalar!(i64, i32, f64, bool, &str, NaiveDateTime, TimeDelta);

// ----------------------------------------------------------------------------
// Operators
// ----------------------------------------------------------------------------

macro_rules! expression_ops {
    ($($trait:ident, $method:ident, $op:expr);* $(;)?) => {
        $(
            impl<R: Into<PointerExpression>> $trait<R> for PointerExpression {
                type Output = PointerExpression;

                fn $method(self, rhs: R) -> PointerExpression {
                    self.binary($op, rhs)
                }
            }

            impl<R: Into<PointerExpression>> $trait<R> for Pointer {
                type Output = PointerExpression;

                fn $method(self, rhs: R) -> PointerExpression {
                    PointerExpression::from(self).binary($op, rhs)
                }
            }
        )*
    };
}

expression_ops! {
    Add, add, BinaryOp::Add;
    Sub, sub, BinaryOp::Sub;
    Mul, mul, BinaryOp::Mul;
    Div, div, BinaryOp::Div;
}

impl Neg for PointerExpression {
    type Output = PointerExpression;

    fn neg(self) -> PointerExpression {
        Self::node(ExprNode::Neg(self))
    }
}

impl Neg for Pointer {
    type Output = PointerExpression;

    fn neg(self) -> PointerExpression {
        -PointerExpression::from(self)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
