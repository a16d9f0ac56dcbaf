//! Literal equation text for compiled templates.

use std::fmt;

use super::compiled::{Compiled, Variable};

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let suffix = match &self.time_offset {
            Some(offset) => format!("({})", offset),
            None => String::new(),
        };
        if self.as_value {
            write!(f, "P{}{} * {}{}", self.name, suffix, self.name, suffix)
        } else {
            write!(f, "{}{}", self.name, suffix)
        }
    }
}

impl fmt::Display for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Compiled::Literal(text) | Compiled::Operator(text) => write!(f, "{}", text),
            Compiled::Variable(v) => write!(f, "{}", v),
            Compiled::Expr(terms) => {
                let mut terms = terms.iter().peekable();
                // a leading operator is unary and binds to the next term
                if let Some(Compiled::Operator(op)) = terms.peek() {
                    write!(f, "{}", op)?;
                    terms.next();
                    if let Some(term) = terms.next() {
                        write!(f, "{}", term)?;
                    }
                } else if let Some(term) = terms.next() {
                    write!(f, "{}", term)?;
                }
                for term in terms {
                    write!(f, " {}", term)?;
                }
                Ok(())
            }
            Compiled::Group(inner) => write!(f, "({})", inner),
            Compiled::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Compiled::Sum(items) => {
                write!(f, "0")?;
                for item in items {
                    write!(f, " + {}", item)?;
                }
                Ok(())
            }
            Compiled::Equation { lhs, rhs } => write!(f, "{} = {}", lhs, rhs),
        }
    }
}

pub fn generate(compiled: &Compiled) -> String {
    compiled.to_string()
}
