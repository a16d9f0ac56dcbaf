use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringSpan {
    pub pos_start: usize,
    pub pos_end: usize,
}

impl fmt::Display for StringSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.pos_start, self.pos_end)
    }
}

/// Per-formula option tokens (`@pv`, `@over`, or with a `!` sigil).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaOption {
    /// emit a value-form line (every variable as price * volume) after each equation
    PriceVolume,
    /// the formula may redefine variables defined by earlier statements
    Override,
}

/// A name built from adjacent parts, e.g. `test|V|_energy|O|`.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier<'a> {
    pub parts: Vec<Ast<'a>>,
    pub as_value: bool,
}

impl<'a> Identifier<'a> {
    /// The name, if this identifier is a single plain variable name.
    pub fn simple_name(&self) -> Option<&'a str> {
        match self.parts.as_slice() {
            [Ast {
                kind: AstKind::VariableName(name),
                ..
            }] => Some(name),
            _ => None,
        }
    }

    /// The local name, if this identifier is a single `%local` reference.
    pub fn local_name(&self) -> Option<&'a str> {
        match self.parts.as_slice() {
            [Ast {
                kind: AstKind::LocalName(name),
                ..
            }] => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index<'a> {
    pub exprs: Vec<Ast<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Array<'a> {
    pub identifier: Box<Ast<'a>>,
    pub index: Option<Box<Ast<'a>>>,
    pub time_offset: Option<Box<Ast<'a>>>,
    pub as_value: bool,
}

/// A flat expression: an optional leading unary operator followed by atoms
/// separated by operators. There is no precedence in the tree, a nested
/// `Expr` term is a parenthesized group.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr<'a> {
    pub terms: Vec<Ast<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function<'a> {
    pub name: &'a str,
    pub args: Vec<Ast<'a>>,
}

/// A call whose single argument is a nested formula, e.g.
/// `sum(Q[c, s] if Q[c, s] <> 0, c in 01 02 03)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaFunction<'a> {
    pub name: &'a str,
    pub formula: Box<Ast<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Equation<'a> {
    pub lhs: Box<Ast<'a>>,
    pub rhs: Box<Ast<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct List<'a> {
    pub base: Box<Ast<'a>>,
    pub exclusion: Option<Box<Ast<'a>>>,
}

/// An iterator declaration. `lists` is `None` for a bare reference to an
/// ambient iterator (`sum(X[c] where c)`).
#[derive(Debug, Clone, PartialEq)]
pub struct Iter<'a> {
    pub names: Vec<&'a str>,
    pub lists: Option<Vec<Ast<'a>>>,
}

impl Iter<'_> {
    pub fn is_parallel(&self) -> bool {
        self.names.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formula<'a> {
    pub options: Vec<FormulaOption>,
    pub body: Box<Ast<'a>>,
    pub condition: Option<Box<Ast<'a>>>,
    pub iterators: Vec<Ast<'a>>,
}

impl Formula<'_> {
    pub fn has_option(&self, option: FormulaOption) -> bool {
        self.options.contains(&option)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<'a> {
    pub names: Vec<&'a str>,
    pub lists: Vec<Ast<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstKind<'a> {
    Integer(i64),
    /// source text, emitted unchanged
    Real(&'a str),
    VariableName(&'a str),
    /// includes the leading `%`
    LocalName(&'a str),
    /// the iterator name, without the leading `$`
    LoopCounter(&'a str),
    Placeholder(Box<Ast<'a>>),
    Identifier(Identifier<'a>),
    Index(Index<'a>),
    TimeOffset(Box<Ast<'a>>),
    Array(Array<'a>),
    Operator(&'a str),
    ComparisonOperator(&'a str),
    BooleanOperator(&'a str),
    Expr(Expr<'a>),
    Function(Function<'a>),
    FormulaFunction(FormulaFunction<'a>),
    Condition(Box<Ast<'a>>),
    Equation(Equation<'a>),
    ListBase(Vec<&'a str>),
    List(List<'a>),
    Iterator(Iter<'a>),
    Formula(Formula<'a>),
    Assignment(Assignment<'a>),
    Instruction(Box<Ast<'a>>),
}

impl<'a> AstKind<'a> {
    pub fn as_formula(&self) -> Option<&Formula<'a>> {
        match self {
            AstKind::Formula(f) => Some(f),
            _ => None,
        }
    }
    pub fn as_expr(&self) -> Option<&Expr<'a>> {
        match self {
            AstKind::Expr(e) => Some(e),
            _ => None,
        }
    }
    pub fn as_identifier(&self) -> Option<&Identifier<'a>> {
        match self {
            AstKind::Identifier(i) => Some(i),
            _ => None,
        }
    }
    pub fn as_array(&self) -> Option<&Array<'a>> {
        match self {
            AstKind::Array(a) => Some(a),
            _ => None,
        }
    }
    pub fn as_iterator(&self) -> Option<&Iter<'a>> {
        match self {
            AstKind::Iterator(i) => Some(i),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&List<'a>> {
        match self {
            AstKind::List(l) => Some(l),
            _ => None,
        }
    }
    pub fn as_function(&self) -> Option<&Function<'a>> {
        match self {
            AstKind::Function(f) => Some(f),
            _ => None,
        }
    }
    pub fn as_formula_function(&self) -> Option<&FormulaFunction<'a>> {
        match self {
            AstKind::FormulaFunction(f) => Some(f),
            _ => None,
        }
    }
}

/// The fixed node-kind vocabulary of the grammar output. `None` stands for
/// an optional grammar element that was not present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Integer,
    Real,
    VariableName,
    LocalName,
    LoopCounter,
    Placeholder,
    Identifier,
    Index,
    TimeOffset,
    Array,
    Operator,
    ComparisonOperator,
    BooleanOperator,
    Expr,
    Function,
    FormulaFunction,
    Condition,
    Equation,
    ListBase,
    List,
    Iterator,
    Formula,
    Assignment,
    Instruction,
    None,
}

impl NodeKind {
    /// Kind of an optional child, `NodeKind::None` when it is absent.
    pub fn of(child: Option<&Ast>) -> NodeKind {
        child.map_or(NodeKind::None, Ast::node_kind)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            NodeKind::Integer => "integer",
            NodeKind::Real => "real",
            NodeKind::VariableName => "variableName",
            NodeKind::LocalName => "localName",
            NodeKind::LoopCounter => "loopCounter",
            NodeKind::Placeholder => "placeholder",
            NodeKind::Identifier => "identifier",
            NodeKind::Index => "index",
            NodeKind::TimeOffset => "timeOffset",
            NodeKind::Array => "array",
            NodeKind::Operator => "operator",
            NodeKind::ComparisonOperator => "comparisonOperator",
            NodeKind::BooleanOperator => "booleanOperator",
            NodeKind::Expr => "expr",
            NodeKind::Function => "function",
            NodeKind::FormulaFunction => "formulaFunction",
            NodeKind::Condition => "condition",
            NodeKind::Equation => "equation",
            NodeKind::ListBase => "listBase",
            NodeKind::List => "list",
            NodeKind::Iterator => "iterator",
            NodeKind::Formula => "formula",
            NodeKind::Assignment => "assignment",
            NodeKind::Instruction => "instruction",
            NodeKind::None => "none",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ast<'a> {
    pub kind: AstKind<'a>,
    pub span: Option<StringSpan>,
}

impl<'a> Ast<'a> {
    pub fn new(kind: AstKind<'a>, span: Option<StringSpan>) -> Self {
        Self { kind, span }
    }

    pub fn node_kind(&self) -> NodeKind {
        match &self.kind {
            AstKind::Integer(_) => NodeKind::Integer,
            AstKind::Real(_) => NodeKind::Real,
            AstKind::VariableName(_) => NodeKind::VariableName,
            AstKind::LocalName(_) => NodeKind::LocalName,
            AstKind::LoopCounter(_) => NodeKind::LoopCounter,
            AstKind::Placeholder(_) => NodeKind::Placeholder,
            AstKind::Identifier(_) => NodeKind::Identifier,
            AstKind::Index(_) => NodeKind::Index,
            AstKind::TimeOffset(_) => NodeKind::TimeOffset,
            AstKind::Array(_) => NodeKind::Array,
            AstKind::Operator(_) => NodeKind::Operator,
            AstKind::ComparisonOperator(_) => NodeKind::ComparisonOperator,
            AstKind::BooleanOperator(_) => NodeKind::BooleanOperator,
            AstKind::Expr(_) => NodeKind::Expr,
            AstKind::Function(_) => NodeKind::Function,
            AstKind::FormulaFunction(_) => NodeKind::FormulaFunction,
            AstKind::Condition(_) => NodeKind::Condition,
            AstKind::Equation(_) => NodeKind::Equation,
            AstKind::ListBase(_) => NodeKind::ListBase,
            AstKind::List(_) => NodeKind::List,
            AstKind::Iterator(_) => NodeKind::Iterator,
            AstKind::Formula(_) => NodeKind::Formula,
            AstKind::Assignment(_) => NodeKind::Assignment,
            AstKind::Instruction(_) => NodeKind::Instruction,
        }
    }

    /// A copy of this leaf reference flagged for price * volume rendering.
    /// Nodes other than identifiers and arrays are returned unchanged.
    pub fn with_value_flag(&self) -> Ast<'a> {
        let kind = match &self.kind {
            AstKind::Identifier(id) => AstKind::Identifier(Identifier {
                parts: id.parts.clone(),
                as_value: true,
            }),
            AstKind::Array(array) => AstKind::Array(Array {
                as_value: true,
                ..array.clone()
            }),
            other => other.clone(),
        };
        Ast::new(kind, self.span)
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

impl fmt::Display for Ast<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            AstKind::Integer(i) => write!(f, "{}", i),
            AstKind::Real(r) => write!(f, "{}", r),
            AstKind::VariableName(name) | AstKind::LocalName(name) => write!(f, "{}", name),
            AstKind::LoopCounter(name) => write!(f, "${}", name),
            AstKind::Placeholder(inner) => write!(f, "|{}|", inner),
            AstKind::Identifier(id) => write!(f, "{}", join(&id.parts, "")),
            AstKind::Index(index) => write!(f, "[{}]", join(&index.exprs, ", ")),
            AstKind::TimeOffset(inner) => write!(f, "({})", inner),
            AstKind::Array(array) => {
                write!(f, "{}", array.identifier)?;
                if let Some(index) = &array.index {
                    write!(f, "{}", index)?;
                }
                if let Some(offset) = &array.time_offset {
                    write!(f, "{}", offset)?;
                }
                Ok(())
            }
            AstKind::Operator(op)
            | AstKind::ComparisonOperator(op)
            | AstKind::BooleanOperator(op) => write!(f, "{}", op),
            AstKind::Expr(expr) => {
                let terms = expr
                    .terms
                    .iter()
                    .map(|t| match t.kind {
                        AstKind::Expr(_) => format!("({})", t),
                        _ => t.to_string(),
                    })
                    .collect::<Vec<_>>();
                write!(f, "{}", terms.join(" "))
            }
            AstKind::Function(func) => write!(f, "{}({})", func.name, join(&func.args, ", ")),
            AstKind::FormulaFunction(func) => write!(f, "{}({})", func.name, func.formula),
            AstKind::Condition(expr) => write!(f, "if {}", expr),
            AstKind::Equation(eq) => write!(f, "{} = {}", eq.lhs, eq.rhs),
            AstKind::ListBase(tokens) => write!(f, "{}", tokens.join(" ")),
            AstKind::List(list) => match &list.exclusion {
                Some(exclusion) => write!(f, "{} \\ {}", list.base, exclusion),
                None => write!(f, "{}", list.base),
            },
            AstKind::Iterator(iter) => {
                let names = if iter.is_parallel() {
                    format!("({})", iter.names.join(", "))
                } else {
                    iter.names.join(", ")
                };
                match &iter.lists {
                    Some(lists) if lists.len() > 1 => {
                        write!(f, "{} in ({})", names, join(lists, ", "))
                    }
                    Some(lists) => write!(f, "{} in {}", names, join(lists, ", ")),
                    None => write!(f, "{}", names),
                }
            }
            AstKind::Formula(formula) => {
                for option in &formula.options {
                    match option {
                        FormulaOption::PriceVolume => write!(f, "@pv ")?,
                        FormulaOption::Override => write!(f, "@over ")?,
                    }
                }
                write!(f, "{}", formula.body)?;
                if let Some(condition) = &formula.condition {
                    write!(f, " {}", condition)?;
                }
                if !formula.iterators.is_empty() {
                    write!(f, ", {}", join(&formula.iterators, ", "))?;
                }
                Ok(())
            }
            AstKind::Assignment(assignment) => {
                if assignment.names.len() > 1 {
                    write!(
                        f,
                        "({}) := ({})",
                        assignment.names.join(", "),
                        join(&assignment.lists, ", ")
                    )
                } else {
                    write!(
                        f,
                        "{} := {}",
                        assignment.names.join(", "),
                        join(&assignment.lists, ", ")
                    )
                }
            }
            AstKind::Instruction(inner) => write!(f, "{}", inner),
        }
    }
}
