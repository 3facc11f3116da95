//! Predicate expressions over entity fields.
//!
//! An [`Expr`] can be evaluated against the JSON view of an entity, and it can
//! be partially evaluated: every subexpression that does not read an entity
//! field is folded into a constant. Two predicates that only differ in how
//! their constants were produced (a literal, a captured local, a closure)
//! fold to the same tree.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use super::{PredicateError, Result};

/// Binary operators supported by [`Expr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    /// String containment, or membership of the right value in a left array.
    Contains,
    /// Membership of the left value in a right array.
    In,
}

impl BinaryOp {
    /// Stable tag used in canonical text.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::And => "and",
            Self::Or => "or",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Contains => "contains",
            Self::In => "in",
        }
    }
}

/// Closure producing a value when the expression is folded or evaluated.
pub type ValueFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// A predicate or value expression.
#[derive(Clone)]
pub enum Expr {
    /// Reads a field of the entity. Dotted paths walk nested objects.
    Field(String),
    /// A literal value.
    Const(Value),
    /// A value closed over from the caller's scope (a local or an in-memory collection).
    Captured { name: String, value: Value },
    /// A value computed lazily by a closure.
    Deferred(ValueFn),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Self::Const(value) => f.debug_tuple("Const").field(value).finish(),
            Self::Captured { name, value } => f
                .debug_struct("Captured")
                .field("name", name)
                .field("value", value)
                .finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Self::Binary { op, left, right } => f
                .debug_struct("Binary")
                .field("op", op)
                .field("left", left)
                .field("right", right)
                .finish(),
        }
    }
}

impl Expr {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self::Const(value.into())
    }

    pub fn captured(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Captured {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(f))
    }

    /// A predicate matching every entity.
    pub fn always() -> Self {
        Self::Const(Value::Bool(true))
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(rhs.into()),
        }
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    pub fn plus(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn minus(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn times(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn contains(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Contains, rhs)
    }

    pub fn is_in(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::In, rhs)
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Folds every field-independent subexpression into a constant.
    ///
    /// Captured values and deferred closures are resolved, constant operands
    /// are combined, and `and`/`or` with a constant boolean side are reduced.
    pub fn partial_eval(&self) -> Result<Expr> {
        match self {
            Self::Field(_) | Self::Const(_) => Ok(self.clone()),
            Self::Captured { value, .. } => Ok(Self::Const(value.clone())),
            Self::Deferred(f) => Ok(Self::Const(f())),
            Self::Not(inner) => match inner.partial_eval()? {
                Self::Const(value) => Ok(Self::Const(apply_not(&value)?)),
                folded => Ok(Self::Not(Box::new(folded))),
            },
            Self::Binary { op, left, right } => {
                fold_binary(*op, left.partial_eval()?, right.partial_eval()?)
            }
        }
    }

    /// Evaluates the expression against the JSON view of an entity.
    ///
    /// Missing fields read as `null`.
    pub fn evaluate(&self, entity: &Value) -> Result<Value> {
        match self {
            Self::Field(path) => Ok(lookup(entity, path).cloned().unwrap_or(Value::Null)),
            Self::Const(value) | Self::Captured { value, .. } => Ok(value.clone()),
            Self::Deferred(f) => Ok(f()),
            Self::Not(inner) => apply_not(&inner.evaluate(entity)?),
            Self::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                if !as_bool(&left.evaluate(entity)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(as_bool(&right.evaluate(entity)?)?))
            }
            Self::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                if as_bool(&left.evaluate(entity)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(as_bool(&right.evaluate(entity)?)?))
            }
            Self::Binary { op, left, right } => {
                apply_binary(*op, &left.evaluate(entity)?, &right.evaluate(entity)?)
            }
        }
    }

    /// Evaluates the expression as a predicate.
    pub fn matches(&self, entity: &Value) -> Result<bool> {
        as_bool(&self.evaluate(entity)?)
    }
}

macro_rules! impl_from_for_expr {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::Const(value.into())
                }
            }
        )*
    };
}

impl_from_for_expr!(bool, i32, i64, u32, u64, f64, String, &str, Value);

/// Reads a dotted path such as `address.city` from a JSON object.
pub fn lookup<'a>(entity: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(entity, |value, segment| value.get(segment))
}

/// Orders two JSON scalars of the same kind. Numbers compare numerically.
///
/// Returns `None` when the values are not comparable (different kinds,
/// arrays, objects).
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match compare_values(left, right) {
        Some(ordering) => ordering == Ordering::Equal,
        None => left == right,
    }
}

fn as_bool(value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| PredicateError::NotBoolean(value.to_string()))
}

fn apply_not(value: &Value) -> Result<Value> {
    Ok(Value::Bool(!as_bool(value)?))
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> PredicateError {
    PredicateError::TypeMismatch {
        op: op.tag(),
        left: left.to_string(),
        right: right.to_string(),
    }
}

fn fold_binary(op: BinaryOp, left: Expr, right: Expr) -> Result<Expr> {
    match (op, left, right) {
        (op, Expr::Const(l), Expr::Const(r)) => Ok(Expr::Const(apply_binary(op, &l, &r)?)),
        (BinaryOp::And, Expr::Const(Value::Bool(true)), other)
        | (BinaryOp::And, other, Expr::Const(Value::Bool(true)))
        | (BinaryOp::Or, Expr::Const(Value::Bool(false)), other)
        | (BinaryOp::Or, other, Expr::Const(Value::Bool(false))) => Ok(other),
        (BinaryOp::And, Expr::Const(Value::Bool(false)), _)
        | (BinaryOp::And, _, Expr::Const(Value::Bool(false))) => Ok(Expr::Const(Value::Bool(false))),
        (BinaryOp::Or, Expr::Const(Value::Bool(true)), _)
        | (BinaryOp::Or, _, Expr::Const(Value::Bool(true))) => Ok(Expr::Const(Value::Bool(true))),
        (op, left, right) => Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }),
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let out = match op {
        BinaryOp::Eq => Value::Bool(values_equal(left, right)),
        BinaryOp::Ne => Value::Bool(!values_equal(left, right)),
        BinaryOp::Lt => Value::Bool(compare_values(left, right) == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(
            compare_values(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(compare_values(left, right) == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            compare_values(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::And => Value::Bool(as_bool(left)? && as_bool(right)?),
        BinaryOp::Or => Value::Bool(as_bool(left)? || as_bool(right)?),
        BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Value::String(format!("{a}{b}")),
            _ => arithmetic(op, left, right, i64::checked_add, |a, b| a + b)?,
        },
        BinaryOp::Sub => arithmetic(op, left, right, i64::checked_sub, |a, b| a - b)?,
        BinaryOp::Mul => arithmetic(op, left, right, i64::checked_mul, |a, b| a * b)?,
        BinaryOp::Contains => match (left, right) {
            (Value::String(haystack), Value::String(needle)) => {
                Value::Bool(haystack.contains(needle.as_str()))
            }
            (Value::Array(items), needle) => {
                Value::Bool(items.iter().any(|item| values_equal(item, needle)))
            }
            _ => return Err(mismatch(op, left, right)),
        },
        BinaryOp::In => match right {
            Value::Array(items) => Value::Bool(items.iter().any(|item| values_equal(left, item))),
            _ => return Err(mismatch(op, left, right)),
        },
    };
    Ok(out)
}

fn arithmetic(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Result<Value> {
    let (Value::Number(a), Value::Number(b)) = (left, right) else {
        return Err(mismatch(op, left, right));
    };

    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return int(a, b)
            .map(Value::from)
            .ok_or(PredicateError::Overflow(op.tag()));
    }

    let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
        return Err(mismatch(op, left, right));
    };
    Number::from_f64(float(a, b))
        .map(Value::Number)
        .ok_or(PredicateError::Overflow(op.tag()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customer() -> Value {
        json!({
            "id": 42,
            "name": "Ada Lovelace",
            "active": true,
            "score": 17,
            "tags": ["vip", "beta"],
            "address": { "city": "London" }
        })
    }

    #[test]
    fn test_field_equality() {
        let expr = Expr::field("active").equals(true);
        assert!(expr.matches(&customer()).unwrap());
    }

    #[test]
    fn test_nested_field_lookup() {
        let expr = Expr::field("address.city").equals("London");
        assert!(expr.matches(&customer()).unwrap());
    }

    #[test]
    fn test_missing_field_is_null() {
        let expr = Expr::field("deleted_at").equals(Value::Null);
        assert!(expr.matches(&customer()).unwrap());
    }

    #[test]
    fn test_numeric_comparisons_mix_int_and_float() {
        assert!(Expr::field("score").gt(16.5).matches(&customer()).unwrap());
        assert!(Expr::field("score").le(17).matches(&customer()).unwrap());
        assert!(Expr::field("score").equals(17.0).matches(&customer()).unwrap());
    }

    #[test]
    fn test_incomparable_values_do_not_match() {
        let expr = Expr::field("name").lt(10);
        assert!(!expr.matches(&customer()).unwrap());
    }

    #[test]
    fn test_in_captured_collection() {
        let expr = Expr::field("id").is_in(Expr::captured("wanted", vec![1, 42, 99]));
        assert!(expr.matches(&customer()).unwrap());
    }

    #[test]
    fn test_contains_string_and_array() {
        assert!(Expr::field("name")
            .contains("Love")
            .matches(&customer())
            .unwrap());
        assert!(Expr::field("tags")
            .contains("vip")
            .matches(&customer())
            .unwrap());
    }

    #[test]
    fn test_and_short_circuits() {
        // Right side would fail as a non-boolean, but is never evaluated.
        let expr = Expr::field("active")
            .equals(false)
            .and(Expr::field("score"));
        assert!(!expr.matches(&customer()).unwrap());
    }

    #[test]
    fn test_non_boolean_predicate_errors() {
        let result = Expr::field("score").matches(&customer());
        assert_eq!(result, Err(PredicateError::NotBoolean("17".to_string())));
    }

    #[test]
    fn test_partial_eval_resolves_captured_and_deferred() {
        let captured = Expr::field("score").gt(Expr::captured("threshold", 10));
        let deferred = Expr::field("score").gt(Expr::deferred(|| json!(10)));

        let a = captured.partial_eval().unwrap();
        let b = deferred.partial_eval().unwrap();

        assert_eq!(format!("{a:?}"), format!("{b:?}"));
        assert!(matches!(
            a,
            Expr::Binary { op: BinaryOp::Gt, ref right, .. } if matches!(**right, Expr::Const(ref v) if *v == json!(10))
        ));
    }

    #[test]
    fn test_partial_eval_folds_constant_arithmetic() {
        let expr = Expr::field("score").equals(Expr::value(8).plus(Expr::captured("n", 9)));
        let folded = expr.partial_eval().unwrap();
        let Expr::Binary { right, .. } = folded else {
            panic!("expected binary expression");
        };
        assert!(matches!(*right, Expr::Const(ref v) if *v == json!(17)));
    }

    #[test]
    fn test_partial_eval_drops_true_conjunct() {
        let expr = Expr::always().and(Expr::field("active").equals(true));
        let folded = expr.partial_eval().unwrap();
        assert!(matches!(folded, Expr::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_partial_eval_false_conjunct_is_false() {
        let expr = Expr::field("active").equals(true).and(Expr::captured("enabled", false));
        let folded = expr.partial_eval().unwrap();
        assert!(matches!(folded, Expr::Const(Value::Bool(false))));
    }

    #[test]
    fn test_partial_eval_keeps_field_negation() {
        let folded = Expr::field("active").negate().partial_eval().unwrap();
        assert!(matches!(folded, Expr::Not(_)));
    }

    #[test]
    fn test_partial_eval_reports_type_errors() {
        let result = Expr::value("a").minus(1).partial_eval();
        assert!(matches!(result, Err(PredicateError::TypeMismatch { op: "sub", .. })));
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        let result = Expr::value(i64::MAX).plus(1).partial_eval();
        assert_eq!(result.unwrap_err(), PredicateError::Overflow("add"));
    }

    #[test]
    fn test_string_concatenation() {
        let expr = Expr::field("name").equals(Expr::value("Ada ").plus("Lovelace"));
        assert!(expr.matches(&customer()).unwrap());
    }
}
