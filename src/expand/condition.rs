//! Numeric evaluation of bound conditions against calibration values.
//!
//! Templates keep a flat operator list; evaluation applies the usual
//! precedence: `^`, then `* /`, then `+ -`, then comparisons, then `and`,
//! then `or`/`xor`. Values that are not available evaluate to NaN.

use crate::calibration::Calibration;
use crate::error::{CompileError, ErrorKind, Reference, Result};

use super::compiled::{Compiled, Variable};

#[derive(Debug, Clone, Copy)]
enum Token<'c> {
    Value(f64),
    Op(&'c str),
}

fn evaluation_error(message: String) -> CompileError {
    ErrorKind::Evaluation(message).into()
}

pub fn is_true(value: f64) -> bool {
    value != 0.0 && !value.is_nan()
}

fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

pub fn evaluate(compiled: &Compiled, calibration: &Calibration) -> Result<f64> {
    match compiled {
        Compiled::Literal(text) => literal(text, calibration),
        Compiled::Variable(v) => variable(v, calibration),
        Compiled::Operator(op) => Err(evaluation_error(format!("dangling operator `{}`", op))),
        Compiled::Group(inner) => evaluate(inner, calibration),
        Compiled::Expr(terms) => {
            let tokens = terms
                .iter()
                .map(|term| match term {
                    Compiled::Operator(op) => Ok(Token::Op(op.as_str())),
                    other => evaluate(other, calibration).map(Token::Value),
                })
                .collect::<Result<Vec<_>>>()?;
            let mut climber = Climber {
                tokens: &tokens,
                pos: 0,
            };
            let value = climber.expr(0)?;
            match climber.tokens.get(climber.pos) {
                None => Ok(value),
                Some(_) => Err(evaluation_error(format!("cannot evaluate `{}`", compiled))),
            }
        }
        Compiled::Call { name, args } => call(name, args, calibration),
        Compiled::Sum(items) => items.iter().map(|i| evaluate(i, calibration)).sum(),
        Compiled::Equation { .. } => Err(evaluation_error(format!(
            "`{}` is an equation, not a condition",
            compiled
        ))),
    }
}

fn lookup(name: &str, calibration: &Calibration) -> Result<f64> {
    match calibration.get(name) {
        Some(Some(value)) => Ok(value),
        Some(None) => Ok(f64::NAN),
        None => Err(ErrorKind::undefined(Reference::Value, name).into()),
    }
}

fn literal(text: &str, calibration: &Calibration) -> Result<f64> {
    text.parse::<f64>().or_else(|_| lookup(text, calibration))
}

fn variable(v: &Variable, calibration: &Calibration) -> Result<f64> {
    let suffix = match &v.time_offset {
        Some(offset) => format!("({})", offset),
        None => String::new(),
    };
    let volume = lookup(&format!("{}{}", v.name, suffix), calibration)?;
    if v.as_value {
        Ok(lookup(&format!("{}{}", v.price_name(), suffix), calibration)? * volume)
    } else {
        Ok(volume)
    }
}

fn call(name: &str, args: &[Compiled], calibration: &Calibration) -> Result<f64> {
    let values = args
        .iter()
        .map(|a| evaluate(a, calibration))
        .collect::<Result<Vec<_>>>()?;
    let arity = |expected: usize| -> Result<()> {
        if values.len() == expected {
            Ok(())
        } else {
            Err(ErrorKind::Arguments {
                function: name.to_string(),
                expected,
                found: values.len(),
            }
            .into())
        }
    };
    match name.to_ascii_lowercase().as_str() {
        "abs" => arity(1).map(|_| values[0].abs()),
        "exp" => arity(1).map(|_| values[0].exp()),
        "log" => arity(1).map(|_| values[0].ln()),
        "sqrt" => arity(1).map(|_| values[0].sqrt()),
        "if" => arity(3).map(|_| {
            if is_true(values[0]) {
                values[1]
            } else {
                values[2]
            }
        }),
        "min" if !values.is_empty() => Ok(values.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" if !values.is_empty() => {
            Ok(values.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        }
        _ => Err(evaluation_error(format!(
            "function `{}` cannot be evaluated",
            name
        ))),
    }
}

fn precedence(op: &str) -> Option<u8> {
    match op {
        "or" | "xor" => Some(1),
        "and" => Some(2),
        "<>" | "==" | "<" | "<=" | "=<" | ">" | ">=" | "=>" => Some(3),
        "+" | "-" => Some(4),
        "*" | "/" => Some(5),
        "^" => Some(6),
        _ => None,
    }
}

fn apply(op: &str, lhs: f64, rhs: f64) -> f64 {
    match op {
        "+" => lhs + rhs,
        "-" => lhs - rhs,
        "*" => lhs * rhs,
        "/" => lhs / rhs,
        "^" => lhs.powf(rhs),
        "<>" => bool_value(lhs != rhs),
        "==" => bool_value(lhs == rhs),
        "<" => bool_value(lhs < rhs),
        "<=" | "=<" => bool_value(lhs <= rhs),
        ">" => bool_value(lhs > rhs),
        ">=" | "=>" => bool_value(lhs >= rhs),
        "and" => bool_value(is_true(lhs) && is_true(rhs)),
        "or" => bool_value(is_true(lhs) || is_true(rhs)),
        "xor" => bool_value(is_true(lhs) != is_true(rhs)),
        _ => f64::NAN,
    }
}

struct Climber<'t, 'c> {
    tokens: &'t [Token<'c>],
    pos: usize,
}

impl Climber<'_, '_> {
    fn operand(&mut self) -> Result<f64> {
        let token = self.tokens.get(self.pos).copied();
        self.pos += 1;
        match token {
            Some(Token::Value(value)) => Ok(value),
            Some(Token::Op("-")) => Ok(-self.operand()?),
            Some(Token::Op("+")) => self.operand(),
            Some(Token::Op(op)) => Err(evaluation_error(format!("unexpected operator `{}`", op))),
            None => Err(evaluation_error("missing operand".to_string())),
        }
    }

    fn expr(&mut self, min_precedence: u8) -> Result<f64> {
        let mut lhs = self.operand()?;
        while let Some(Token::Op(op)) = self.tokens.get(self.pos).copied() {
            let prec = precedence(op)
                .ok_or_else(|| evaluation_error(format!("unknown operator `{}`", op)))?;
            if prec < min_precedence {
                break;
            }
            self.pos += 1;
            // `^` is right associative
            let next = if op == "^" { prec } else { prec + 1 };
            let rhs = self.expr(next)?;
            lhs = apply(op, lhs, rhs);
        }
        Ok(lhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lit(text: &str) -> Compiled {
        Compiled::Literal(text.to_string())
    }

    fn op(op: &str) -> Compiled {
        Compiled::Operator(op.to_string())
    }

    fn var(name: &str, as_value: bool) -> Compiled {
        Compiled::Variable(Variable {
            name: name.to_string(),
            time_offset: None,
            as_value,
        })
    }

    #[test]
    fn standard_precedence() {
        let calibration = Calibration::new();
        let expr = Compiled::Expr(vec![
            lit("1"),
            op("+"),
            lit("2"),
            op("*"),
            lit("3"),
            op("^"),
            lit("2"),
        ]);
        assert_relative_eq!(evaluate(&expr, &calibration).unwrap(), 19.0);

        let expr = Compiled::Expr(vec![op("-"), lit("2"), op("+"), lit("5")]);
        assert_relative_eq!(evaluate(&expr, &calibration).unwrap(), 3.0);
    }

    #[test]
    fn comparisons_and_booleans() {
        let calibration: Calibration = [("Q_01_10", 15.0), ("Q_02_10", 0.0)].into_iter().collect();
        let expr = Compiled::Expr(vec![
            var("Q_01_10", false),
            op("<>"),
            lit("0"),
            op("and"),
            var("Q_02_10", false),
            op("=="),
            lit("0"),
        ]);
        assert!(is_true(evaluate(&expr, &calibration).unwrap()));

        let expr = Compiled::Expr(vec![var("Q_02_10", false), op("<>"), lit("0")]);
        assert!(!is_true(evaluate(&expr, &calibration).unwrap()));

        let expr = Compiled::Expr(vec![lit("1"), op("xor"), lit("1"), op("or"), lit("0")]);
        assert!(!is_true(evaluate(&expr, &calibration).unwrap()));
    }

    #[test]
    fn value_leaves_multiply_price_and_volume() {
        let calibration: Calibration = [("PQ", 2.0), ("Q", 21.0)].into_iter().collect();
        assert_relative_eq!(evaluate(&var("Q", true), &calibration).unwrap(), 42.0);
    }

    #[test]
    fn missing_and_unavailable_values() {
        let mut calibration = Calibration::new();
        calibration.insert("X", None);
        assert!(evaluate(&var("X", false), &calibration).unwrap().is_nan());
        let err = evaluate(&var("Y", false), &calibration).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::undefined(Reference::Value, "Y"));
    }

    #[test]
    fn functions_and_sums() {
        let calibration = Calibration::new();
        let call = Compiled::Call {
            name: "max".to_string(),
            args: vec![lit("3"), lit("7"), lit("-1")],
        };
        assert_relative_eq!(evaluate(&call, &calibration).unwrap(), 7.0);
        let sum = Compiled::Sum(vec![lit("1"), lit("2.5")]);
        assert_relative_eq!(evaluate(&sum, &calibration).unwrap(), 3.5);
        assert_relative_eq!(evaluate(&Compiled::Sum(vec![]), &calibration).unwrap(), 0.0);
    }
}
