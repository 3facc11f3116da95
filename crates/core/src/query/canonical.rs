//! Canonical text rendering for predicates and JSON values.
//!
//! The rendering is an s-expression over the partially evaluated tree.
//! Object keys are emitted in sorted order and integral floats are written
//! as integers, so equal values always render to the same text.

use serde_json::{Number, Value};

use super::{Expr, Result};

/// Renders the partially evaluated form of `expr`.
pub fn canonical_expr(expr: &Expr) -> Result<String> {
    let folded = expr.partial_eval()?;
    let mut out = String::new();
    write_expr(&folded, &mut out);
    Ok(out)
}

/// Renders a JSON value in canonical form.
pub fn canonical_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Field(name) => {
            out.push('.');
            out.push_str(name);
        }
        Expr::Const(value) | Expr::Captured { value, .. } => write_value(value, out),
        Expr::Deferred(f) => write_value(&f(), out),
        Expr::Not(inner) => {
            out.push_str("(not ");
            write_expr(inner, out);
            out.push(')');
        }
        Expr::Binary { op, left, right } => {
            out.push('(');
            out.push_str(op.tag());
            out.push(' ');
            write_expr(left, out);
            out.push(' ');
            write_expr(right, out);
            out.push(')');
        }
    }
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out),
        // Display on a JSON string yields its quoted, escaped form.
        Value::String(_) => out.push_str(&value.to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: &Number, out: &mut String) {
    const EXACT_INT_LIMIT: f64 = 9_007_199_254_740_992.0;

    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() < EXACT_INT_LIMIT {
            out.push_str(&(f as i64).to_string());
        } else {
            out.push_str(&f.to_string());
        }
    }
}
