/// A reference to a model variable after placeholders and indices have been
/// substituted, e.g. `X_01_10` with offset `-1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub time_offset: Option<String>,
    /// render as `P<name> * <name>`
    pub as_value: bool,
}

impl Variable {
    pub fn price_name(&self) -> String {
        format!("P{}", self.name)
    }

    /// The names this leaf stands for: the price variable too in value form.
    pub fn names(&self) -> Vec<String> {
        if self.as_value {
            vec![self.price_name(), self.name.clone()]
        } else {
            vec![self.name.clone()]
        }
    }
}

/// The bound form of a template for one binding. Contains no iterator or
/// placeholder references, only literal text.
#[derive(Debug, Clone, PartialEq)]
pub enum Compiled {
    Literal(String),
    Variable(Variable),
    Operator(String),
    Expr(Vec<Compiled>),
    Group(Box<Compiled>),
    Call { name: String, args: Vec<Compiled> },
    Sum(Vec<Compiled>),
    Equation { lhs: Box<Compiled>, rhs: Box<Compiled> },
}

impl Compiled {
    /// All variable leaves, in output order.
    pub fn extract_varnames(&self) -> Vec<&Variable> {
        match self {
            Compiled::Literal(_) | Compiled::Operator(_) => vec![],
            Compiled::Variable(v) => vec![v],
            Compiled::Group(inner) => inner.extract_varnames(),
            Compiled::Expr(items) | Compiled::Sum(items) | Compiled::Call { args: items, .. } => {
                items.iter().flat_map(Compiled::extract_varnames).collect()
            }
            Compiled::Equation { lhs, rhs } => {
                let mut names = lhs.extract_varnames();
                names.extend(rhs.extract_varnames());
                names
            }
        }
    }

    /// The variable an equation defines: the first variable of its left side.
    /// A value-form left side (`PQ * Q = ...`) defines nothing.
    pub fn defined_variable(&self) -> Option<&str> {
        match self {
            Compiled::Equation { lhs, .. } => lhs
                .extract_varnames()
                .first()
                .filter(|v| !v.as_value)
                .map(|v| v.name.as_str()),
            _ => None,
        }
    }

    /// Variables the right side of an equation depends on in the current
    /// period. Lagged references (with a time offset) are not dependencies.
    pub fn referenced_variables(&self) -> Vec<String> {
        let rhs = match self {
            Compiled::Equation { rhs, .. } => rhs.as_ref(),
            other => other,
        };
        let mut names: Vec<String> = Vec::new();
        for v in rhs.extract_varnames() {
            if v.time_offset.is_some() {
                continue;
            }
            for name in v.names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, offset: Option<&str>, as_value: bool) -> Compiled {
        Compiled::Variable(Variable {
            name: name.to_string(),
            time_offset: offset.map(String::from),
            as_value,
        })
    }

    #[test]
    fn equation_definition_and_references() {
        let eq = Compiled::Equation {
            lhs: Box::new(Compiled::Expr(vec![var("Q_01", None, false)])),
            rhs: Box::new(Compiled::Expr(vec![
                var("A", None, true),
                Compiled::Operator("+".to_string()),
                var("Q_01", Some("-1"), false),
                Compiled::Operator("+".to_string()),
                Compiled::Call {
                    name: "log".to_string(),
                    args: vec![var("B", None, false)],
                },
            ])),
        };
        assert_eq!(eq.defined_variable(), Some("Q_01"));
        assert_eq!(eq.referenced_variables(), vec!["PA", "A", "B"]);
        assert_eq!(eq.extract_varnames().len(), 4);
    }

    #[test]
    fn bare_expression_defines_nothing() {
        let expr = Compiled::Expr(vec![var("A", None, false)]);
        assert_eq!(expr.defined_variable(), None);
        assert_eq!(expr.referenced_variables(), vec!["A"]);
    }

    #[test]
    fn value_line_defines_nothing() {
        let eq = Compiled::Equation {
            lhs: Box::new(Compiled::Expr(vec![var("Q", None, true)])),
            rhs: Box::new(Compiled::Expr(vec![var("A", None, true)])),
        };
        assert_eq!(eq.defined_variable(), None);
    }
}
