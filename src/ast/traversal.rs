//! Generic fold (`traverse`) and rebuild (`transform`) over the AST, plus the
//! two passes built from them: iterator-name extraction and the value-form
//! rewrite used by the price/volume option.

use itertools::Itertools;

use super::ast::{
    Array, Assignment, Ast, AstKind, Equation, Expr, Formula, FormulaFunction, Function,
    Identifier, Index, Iter, List,
};

impl<'a> Ast<'a> {
    /// The semantically relevant children of a node. Formula functions are
    /// opaque: their nested formula declares its own scope, so visitors that
    /// care about it must handle `FormulaFunction` themselves.
    pub fn children(&self) -> Vec<&Ast<'a>> {
        match &self.kind {
            AstKind::Integer(_)
            | AstKind::Real(_)
            | AstKind::VariableName(_)
            | AstKind::LocalName(_)
            | AstKind::LoopCounter(_)
            | AstKind::Operator(_)
            | AstKind::ComparisonOperator(_)
            | AstKind::BooleanOperator(_)
            | AstKind::ListBase(_)
            | AstKind::FormulaFunction(_) => vec![],
            AstKind::Placeholder(inner)
            | AstKind::TimeOffset(inner)
            | AstKind::Condition(inner)
            | AstKind::Instruction(inner) => vec![inner.as_ref()],
            AstKind::Identifier(id) => id.parts.iter().collect(),
            AstKind::Index(index) => index.exprs.iter().collect(),
            AstKind::Array(array) => {
                let mut children = vec![array.identifier.as_ref()];
                children.extend(array.index.as_deref());
                children.extend(array.time_offset.as_deref());
                children
            }
            AstKind::Expr(expr) => expr.terms.iter().collect(),
            AstKind::Function(func) => func.args.iter().collect(),
            AstKind::Equation(eq) => vec![eq.lhs.as_ref(), eq.rhs.as_ref()],
            AstKind::List(list) => {
                let mut children = vec![list.base.as_ref()];
                children.extend(list.exclusion.as_deref());
                children
            }
            AstKind::Iterator(iter) => iter.lists.iter().flatten().collect(),
            AstKind::Formula(formula) => {
                let mut children = vec![formula.body.as_ref()];
                children.extend(formula.condition.as_deref());
                children
            }
            AstKind::Assignment(assignment) => assignment.lists.iter().collect(),
        }
    }

    /// Applies `visit` to this node. When it declines (returns `None`) the
    /// traversal falls back to the node's children and concatenates their
    /// results, lazily.
    pub fn traverse<'s, T, F>(&'s self, visit: &'s F) -> Box<dyn Iterator<Item = T> + 's>
    where
        T: 's,
        F: Fn(&'s Ast<'a>) -> Option<Vec<T>>,
    {
        match visit(self) {
            Some(results) => Box::new(results.into_iter()),
            None => Box::new(
                self.children()
                    .into_iter()
                    .flat_map(move |child| child.traverse(visit)),
            ),
        }
    }

    /// Rebuilds the tree, replacing every node for which `visit` returns
    /// `Some`. Declined nodes are rebuilt from their transformed children.
    pub fn transform<F>(&self, visit: &F) -> Ast<'a>
    where
        F: Fn(&Ast<'a>) -> Option<Ast<'a>>,
    {
        if let Some(replacement) = visit(self) {
            return replacement;
        }
        let t = |ast: &Ast<'a>| ast.transform(visit);
        let tb = |ast: &Ast<'a>| Box::new(ast.transform(visit));
        let kind = match &self.kind {
            AstKind::Placeholder(inner) => AstKind::Placeholder(tb(inner)),
            AstKind::TimeOffset(inner) => AstKind::TimeOffset(tb(inner)),
            AstKind::Condition(inner) => AstKind::Condition(tb(inner)),
            AstKind::Instruction(inner) => AstKind::Instruction(tb(inner)),
            AstKind::Identifier(id) => AstKind::Identifier(Identifier {
                parts: id.parts.iter().map(t).collect(),
                as_value: id.as_value,
            }),
            AstKind::Index(index) => AstKind::Index(Index {
                exprs: index.exprs.iter().map(t).collect(),
            }),
            AstKind::Array(array) => AstKind::Array(Array {
                identifier: tb(&array.identifier),
                index: array.index.as_deref().map(tb),
                time_offset: array.time_offset.as_deref().map(tb),
                as_value: array.as_value,
            }),
            AstKind::Expr(expr) => AstKind::Expr(Expr {
                terms: expr.terms.iter().map(t).collect(),
            }),
            AstKind::Function(func) => AstKind::Function(Function {
                name: func.name,
                args: func.args.iter().map(t).collect(),
            }),
            AstKind::Equation(eq) => AstKind::Equation(Equation {
                lhs: tb(&eq.lhs),
                rhs: tb(&eq.rhs),
            }),
            AstKind::List(list) => AstKind::List(List {
                base: tb(&list.base),
                exclusion: list.exclusion.as_deref().map(tb),
            }),
            AstKind::Iterator(iter) => AstKind::Iterator(Iter {
                names: iter.names.clone(),
                lists: iter
                    .lists
                    .as_ref()
                    .map(|lists| lists.iter().map(t).collect()),
            }),
            AstKind::Formula(formula) => AstKind::Formula(Formula {
                options: formula.options.clone(),
                body: tb(&formula.body),
                condition: formula.condition.as_deref().map(tb),
                iterators: formula.iterators.clone(),
            }),
            AstKind::Assignment(assignment) => AstKind::Assignment(Assignment {
                names: assignment.names.clone(),
                lists: assignment.lists.iter().map(t).collect(),
            }),
            leaf => leaf.clone(),
        };
        Ast::new(kind, self.span)
    }

    /// Names of the iterators this template needs bound, in first-use order.
    /// Collected from simple identifiers inside indices, variable
    /// placeholders and loop counters. A nested formula function contributes
    /// only the names it does not declare or reference in its own clause.
    pub fn extract_iterators(&self) -> Vec<&'a str> {
        self.traverse(&free_names).unique().collect()
    }

    /// The price/volume form of this expression: every variable or array
    /// reference is flagged to render as `P<name> * <name>`. Index
    /// sub-expressions, plain function arguments and conditions are left
    /// alone; `sum` bodies are rewritten too.
    pub fn value_form(&self) -> Ast<'a> {
        self.transform(&value_visit)
    }
}

fn free_names<'a>(node: &Ast<'a>) -> Option<Vec<&'a str>> {
    iterator_names(node, false)
}

fn index_names<'a>(node: &Ast<'a>) -> Option<Vec<&'a str>> {
    iterator_names(node, true)
}

fn iterator_names<'a>(node: &Ast<'a>, in_index: bool) -> Option<Vec<&'a str>> {
    match &node.kind {
        AstKind::Index(index) => Some(
            index
                .exprs
                .iter()
                .flat_map(|e| e.traverse(&index_names))
                .collect(),
        ),
        AstKind::Identifier(id) if in_index => id.simple_name().map(|name| vec![name]),
        AstKind::Placeholder(inner) => match inner.kind {
            AstKind::VariableName(name) => Some(vec![name]),
            _ => Some(vec![]),
        },
        AstKind::LoopCounter(name) => Some(vec![name]),
        AstKind::FormulaFunction(FormulaFunction { formula, .. }) => {
            let formula = formula.kind.as_formula()?;
            let declared = formula
                .iterators
                .iter()
                .filter_map(|i| i.kind.as_iterator())
                .flat_map(|i| i.names.iter().copied())
                .collect::<Vec<_>>();
            let mut names = formula
                .body
                .traverse(&free_names)
                .collect::<Vec<_>>();
            if let Some(condition) = &formula.condition {
                names.extend(condition.traverse(&free_names));
            }
            Some(
                names
                    .into_iter()
                    .filter(|name| !declared.contains(name))
                    .collect(),
            )
        }
        _ => None,
    }
}

fn value_visit<'a>(node: &Ast<'a>) -> Option<Ast<'a>> {
    match &node.kind {
        AstKind::Identifier(id) if id.local_name().is_some() => Some(node.clone()),
        AstKind::Identifier(_) | AstKind::Array(_) => Some(node.with_value_flag()),
        AstKind::Function(_) | AstKind::Condition(_) => Some(node.clone()),
        AstKind::FormulaFunction(func) if func.name == "sum" => Some(Ast::new(
            AstKind::FormulaFunction(FormulaFunction {
                name: func.name,
                formula: Box::new(func.formula.transform(&value_visit)),
            }),
            node.span,
        )),
        AstKind::FormulaFunction(_) => Some(node.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{AstKind, NodeKind};
    use crate::parser::{parse_fragment, Rule};

    #[test]
    fn extract_iterators_from_indices_and_placeholders() {
        let ast = parse_fragment(Rule::formula, "Q|V|[c, s] = X[c] + $t * Y|W|").unwrap();
        assert_eq!(ast.extract_iterators(), vec!["V", "c", "s", "t", "W"]);
    }

    #[test]
    fn absent_optional_children_are_none() {
        let ast = parse_fragment(Rule::expr, "X[c](-1) + Y[c]").unwrap();
        let terms = &ast.kind.as_expr().unwrap().terms;
        let lagged = terms[0].kind.as_array().unwrap();
        let plain = terms[2].kind.as_array().unwrap();
        assert_eq!(NodeKind::of(lagged.time_offset.as_deref()), NodeKind::TimeOffset);
        assert_eq!(NodeKind::of(plain.time_offset.as_deref()), NodeKind::None);
        assert_eq!(NodeKind::of(None).to_string(), "none");
    }

    #[test]
    fn extract_iterators_skips_names_declared_by_sum() {
        let ast = parse_fragment(Rule::formula, "A[s] = sum(Q[c, s], c in 01 02)").unwrap();
        assert_eq!(ast.extract_iterators(), vec!["s"]);
    }

    #[test]
    fn extract_iterators_skips_ambient_refs_of_sum() {
        // `where c` brings the ambient `c` into the sum's own scope
        let ast = parse_fragment(Rule::formula, "A[s] = sum(Q[c, s] where c)").unwrap();
        assert_eq!(ast.extract_iterators(), vec!["s"]);
    }

    #[test]
    fn traverse_counts_operators() {
        let ast = parse_fragment(Rule::expr, "a + b * (c - d)").unwrap();
        let ops = ast
            .traverse(&|n| match n.kind {
                AstKind::Operator(op) => Some(vec![op]),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(ops, vec!["+", "*", "-"]);
    }

    #[test]
    fn value_form_flags_leaves_only() {
        let ast = parse_fragment(Rule::expr, "X[c] + log(Y) + Z").unwrap();
        let value = ast.value_form();
        let terms = &value.kind.as_expr().unwrap().terms;
        assert!(terms[0].kind.as_array().unwrap().as_value);
        // index parts are never flagged
        let index = terms[0].kind.as_array().unwrap().index.as_ref().unwrap();
        assert_eq!(index.traverse(&|n| match &n.kind {
            AstKind::Identifier(id) => Some(vec![id.as_value]),
            _ => None,
        }).collect::<Vec<_>>(), vec![false]);
        assert_eq!(terms[2].node_kind(), NodeKind::Function);
        let args = &terms[2].kind.as_function().unwrap().args;
        assert!(!args[0].kind.as_expr().unwrap().terms[0]
            .kind
            .as_identifier()
            .unwrap()
            .as_value);
        assert!(terms[4].kind.as_identifier().unwrap().as_value);
    }

    #[test]
    fn transform_preserves_untouched_tree() {
        let ast = parse_fragment(Rule::formula, "Q[c] = A[c] if A[c] > 0, c in 01 02").unwrap();
        assert_eq!(ast.transform(&|_| None), ast);
    }
}
