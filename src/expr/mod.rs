//! Rule expression language.
//!
//! A small arithmetic/comparison grammar over named sensor values:
//!
//! ```text
//! expr       := or
//! or         := and ( ("or" | "||") and )*
//! and        := not ( ("and" | "&&") not )*
//! not        := ("not" | "!") not | comparison
//! comparison := additive ( ("<" | "<=" | ">" | ">=" | "==" | "!=") additive )?
//! additive   := term ( ("+" | "-") term )*
//! term       := unary ( ("*" | "/") unary )*
//! unary      := "-" unary | primary
//! primary    := number | "true" | "false" | identifier | "(" expr ")"
//! ```
//!
//! Evaluation is pure. Every variable the expression references must be
//! bound in the environment, including variables on the side of an
//! `and`/`or` that would not change the result.

mod cache;
mod parser;

pub use cache::ExpressionCache;
pub use parser::parse;

use std::collections::{BTreeMap, BTreeSet};

/// Variable bindings for one evaluation.
pub type Environment = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("unbound variable `{0}`")]
    UnboundVariable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    Var(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Intermediate value; comparisons yield booleans, arithmetic yields numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    fn as_f64(self) -> f64 {
        match self {
            Self::Number(n) => n,
            Self::Bool(true) => 1.0,
            Self::Bool(false) => 0.0,
        }
    }

    fn truthy(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Number(n) => n != 0.0 && !n.is_nan(),
        }
    }
}

impl Expr {
    /// Evaluate to a boolean against `env`.
    ///
    /// # Errors
    ///
    /// Returns `ExprError::UnboundVariable` for the first referenced name
    /// (in source order) missing from `env`.
    pub fn evaluate(&self, env: &Environment) -> Result<bool, ExprError> {
        self.eval(env).map(Value::truthy)
    }

    /// Every variable name referenced by the expression.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Number(_) | Self::Bool(_) => {}
            Self::Var(name) => {
                out.insert(name.as_str());
            }
            Self::Neg(inner) | Self::Not(inner) => inner.collect_variables(out),
            Self::Binary { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
        }
    }

    fn eval(&self, env: &Environment) -> Result<Value, ExprError> {
        match self {
            Self::Number(n) => Ok(Value::Number(*n)),
            Self::Bool(b) => Ok(Value::Bool(*b)),
            Self::Var(name) => env
                .get(name)
                .copied()
                .map(Value::Number)
                .ok_or_else(|| ExprError::UnboundVariable(name.clone())),
            Self::Neg(inner) => Ok(Value::Number(-inner.eval(env)?.as_f64())),
            Self::Not(inner) => Ok(Value::Bool(!inner.eval(env)?.truthy())),
            Self::Binary { op, left, right } => {
                // Both sides are evaluated so unbound names always surface.
                let lv = left.eval(env)?;
                let rv = right.eval(env)?;
                Ok(eval_binop(*op, lv, rv))
            }
        }
    }
}

fn eval_binop(op: BinOp, lv: Value, rv: Value) -> Value {
    let (l, r) = (lv.as_f64(), rv.as_f64());
    match op {
        BinOp::Add => Value::Number(l + r),
        BinOp::Sub => Value::Number(l - r),
        BinOp::Mul => Value::Number(l * r),
        BinOp::Div => Value::Number(l / r),
        BinOp::Lt => Value::Bool(l < r),
        BinOp::Le => Value::Bool(l <= r),
        BinOp::Gt => Value::Bool(l > r),
        BinOp::Ge => Value::Bool(l >= r),
        BinOp::Eq => Value::Bool(l == r),
        // NaN compares false under every operator, `!=` included.
        BinOp::Ne => Value::Bool(!l.is_nan() && !r.is_nan() && l != r),
        BinOp::And => Value::Bool(lv.truthy() && rv.truthy()),
        BinOp::Or => Value::Bool(lv.truthy() || rv.truthy()),
    }
}

/// Parse and evaluate in one step. Prefer [`ExpressionCache`] in loops.
///
/// # Errors
///
/// Returns `ExprError::Parse` for malformed text or
/// `ExprError::UnboundVariable` for a missing binding.
pub fn evaluate_str(text: &str, env: &Environment) -> Result<bool, ExprError> {
    parse(text)?.evaluate(env)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, f64)]) -> Environment {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn simple_threshold() {
        let e = env(&[("pm2_5", 64.0)]);
        assert!(evaluate_str("pm2_5 > 50", &e).unwrap());
        assert!(!evaluate_str("pm2_5 <= 50", &e).unwrap());
    }

    #[test]
    fn logical_combinators() {
        let e = env(&[("temp", 31.0), ("humidity", 15.0)]);
        assert!(evaluate_str("temp > 30 and humidity < 20", &e).unwrap());
        assert!(evaluate_str("temp > 40 or humidity < 20", &e).unwrap());
        assert!(!evaluate_str("not (temp > 30)", &e).unwrap());
        assert!(evaluate_str("temp > 30 && !(humidity >= 20)", &e).unwrap());
    }

    #[test]
    fn arithmetic_precedence() {
        let e = env(&[("a", 2.0), ("b", 3.0)]);
        assert!(evaluate_str("a + b * 2 == 8", &e).unwrap());
        assert!(evaluate_str("(a + b) * 2 == 10", &e).unwrap());
        assert!(evaluate_str("-a + 5 == b", &e).unwrap());
        assert!(evaluate_str("b / a == 1.5", &e).unwrap());
        assert!(evaluate_str("a - b - 1 == -2", &e).unwrap());
    }

    #[test]
    fn unbound_variable_is_an_error() {
        let e = env(&[("temp", 31.0)]);
        assert_eq!(
            evaluate_str("temp > 30 or co2 > 1000", &e),
            Err(ExprError::UnboundVariable("co2".to_string()))
        );
    }

    #[test]
    fn division_by_zero_is_total() {
        let e = env(&[("x", 0.0)]);
        assert!(evaluate_str("1 / x > 1000", &e).unwrap());
        assert!(!evaluate_str("x / x > 0", &e).unwrap());
        assert!(!evaluate_str("x / x", &e).unwrap());
        assert!(!evaluate_str("x / x != 0", &e).unwrap());
    }

    #[test]
    fn numbers_coerce_to_booleans() {
        let e = env(&[("door_open", 1.0), ("heater", 0.0)]);
        assert!(evaluate_str("door_open", &e).unwrap());
        assert!(!evaluate_str("heater", &e).unwrap());
        assert!(evaluate_str("door_open and not heater", &e).unwrap());
        assert!(evaluate_str("true", &e).unwrap());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let e = env(&[("humidity", 15.0), ("co2", 1200.0)]);
        let expr = parse("humidity < 20 and co2 > 1000").unwrap();
        let first = expr.evaluate(&e).unwrap();
        for _ in 0..10 {
            assert_eq!(expr.evaluate(&e).unwrap(), first);
        }
    }

    #[test]
    fn variables_are_collected() {
        let expr = parse("temp_avg > 30 and (humidity < 20 or temp > 45)").unwrap();
        let vars: Vec<_> = expr.variables().into_iter().collect();
        assert_eq!(vars, vec!["humidity", "temp", "temp_avg"]);
    }
}
