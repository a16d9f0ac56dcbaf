//! Lists, iterator declarations and the binding product.

use std::collections::HashMap;

use itertools::{Either, Itertools};

use crate::ast::{Assignment, Ast, AstKind, Formula, Iter};
use crate::error::{CompileError, ErrorKind, Reference, Result};

use super::context::{Axis, Context, ListValues, LocalHeap, LocalValue};

fn at(kind: ErrorKind, ast: &Ast) -> CompileError {
    CompileError::new(kind, ast.span)
}

fn list_part(ast: &Ast, heap: &LocalHeap) -> Result<ListValues> {
    match &ast.kind {
        AstKind::ListBase(tokens) => Ok(ListValues::from_tokens(tokens.iter().copied())),
        AstKind::LocalName(name) => heap
            .get(*name)
            .map(LocalValue::as_list)
            .ok_or_else(|| at(ErrorKind::undefined(Reference::Local, *name), ast)),
        _ => Err(at(
            ErrorKind::Syntax(format!("expected a list, found {}", ast.node_kind())),
            ast,
        )),
    }
}

/// Values of a `list` node, exclusion applied.
pub fn compile_list(ast: &Ast, heap: &LocalHeap) -> Result<ListValues> {
    match &ast.kind {
        AstKind::List(list) => {
            let base = list_part(&list.base, heap)?;
            match &list.exclusion {
                Some(exclusion) => Ok(base.exclude(&list_part(exclusion, heap)?)),
                None => Ok(base),
            }
        }
        _ => list_part(ast, heap),
    }
}

/// The value an assignment stores: a single token without exclusion is a
/// scalar, a bare local is copied as is, anything else is a list.
pub fn compile_local_value(ast: &Ast, heap: &LocalHeap) -> Result<LocalValue> {
    if let AstKind::List(list) = &ast.kind {
        if list.exclusion.is_none() {
            match &list.base.kind {
                AstKind::ListBase(tokens) if tokens.len() == 1 => {
                    return Ok(LocalValue::Scalar(tokens[0].to_string()))
                }
                AstKind::LocalName(name) => {
                    return heap.get(*name).cloned().ok_or_else(|| {
                        at(ErrorKind::undefined(Reference::Local, *name), &list.base)
                    })
                }
                _ => {}
            }
        }
    }
    compile_list(ast, heap).map(LocalValue::List)
}

pub fn compile_assignment(
    assignment: &Assignment,
    ast: &Ast,
    heap: &LocalHeap,
) -> Result<Vec<(String, LocalValue)>> {
    if assignment.names.len() != assignment.lists.len() {
        return Err(at(
            ErrorKind::ArityMismatch {
                names: assignment.names.iter().map(|n| n.to_string()).collect(),
            },
            ast,
        ));
    }
    assignment
        .names
        .iter()
        .zip(assignment.lists.iter())
        .map(|(name, list)| Ok((name.to_string(), compile_local_value(list, heap)?)))
        .collect()
}

/// The axis an iterator declaration ranges over. A bare name refers to the
/// ambient iterator of that name.
pub fn compile_iterator(iter: &Iter, ast: &Ast, ctx: &Context) -> Result<Axis> {
    match &iter.lists {
        None => {
            let name = iter.names[0];
            ctx.ambient
                .find(name)
                .map(|(_, axis)| axis.clone())
                .ok_or_else(|| at(ErrorKind::undefined(Reference::Iterator, name), ast))
        }
        Some(lists) if !iter.is_parallel() && lists.len() == 1 => {
            Ok(Axis::single(iter.names[0], &compile_list(&lists[0], &ctx.heap)?))
        }
        Some(lists) => {
            let lists = lists
                .iter()
                .map(|l| compile_list(l, &ctx.heap))
                .collect::<Result<Vec<_>>>()?;
            Axis::zip(&iter.names, &lists).map_err(|e| at(e.kind().clone(), ast))
        }
    }
}

/// Iterator values of one point of the binding product, with the loop
/// counters stored under `$name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    values: HashMap<String, String>,
}

impl Binding {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn counter(&self, name: &str) -> Option<&str> {
        self.get(&format!("${}", name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn row(axis: &Axis, row: usize) -> Binding {
        let mut values = HashMap::new();
        for (name, bound) in axis.names.iter().zip(axis.rows[row].iter()) {
            values.insert(name.clone(), bound.value.clone());
            values.insert(format!("${}", name), bound.counter.to_string());
        }
        Binding { values }
    }

    fn merge(parts: Vec<Binding>) -> Binding {
        let mut values = HashMap::new();
        for part in parts {
            values.extend(part.values);
        }
        Binding { values }
    }
}

/// A binding plus the bindings of the enclosing formulas. Inner names
/// shadow outer ones.
#[derive(Debug)]
pub struct Scope<'s> {
    pub binding: Binding,
    pub parent: Option<&'s Scope<'s>>,
}

impl<'s> Scope<'s> {
    pub fn new(binding: Binding, parent: Option<&'s Scope<'s>>) -> Self {
        Self { binding, parent }
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.binding
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.lookup(name)))
    }

    pub fn counter(&self, name: &str) -> Option<&str> {
        self.binding
            .counter(name)
            .or_else(|| self.parent.and_then(|p| p.counter(name)))
    }
}

/// The axes a formula expands over: its declared iterators in order, then
/// the ambient iterators it references that are not already bound by an
/// enclosing scope, in registration order.
pub fn formula_axes(
    formula: &Formula,
    ast: &Ast,
    ctx: &Context,
    parent: Option<&Scope>,
) -> Result<Vec<Axis>> {
    let mut axes: Vec<Axis> = Vec::new();
    for iterator in &formula.iterators {
        if let Some(iter) = iterator.kind.as_iterator() {
            let axis = compile_iterator(iter, iterator, ctx)?;
            if let Some(name) = axis
                .names
                .iter()
                .find(|n| axes.iter().any(|a| a.declares(n)))
            {
                return Err(at(ErrorKind::DuplicateIterator(name.clone()), iterator));
            }
            axes.push(axis);
        }
    }

    let mut ambient: Vec<(usize, Axis)> = Vec::new();
    for name in ast.extract_iterators() {
        if axes.iter().any(|a| a.declares(name))
            || ambient.iter().any(|(_, a)| a.declares(name))
            || parent.and_then(|p| p.lookup(name)).is_some()
        {
            continue;
        }
        match ctx.ambient.find(name) {
            Some((position, axis)) => ambient.push((position, axis.clone())),
            None => return Err(at(ErrorKind::undefined(Reference::Iterator, name), ast)),
        }
    }
    ambient.sort_by_key(|(position, _)| *position);
    axes.extend(ambient.into_iter().map(|(_, axis)| axis));
    Ok(axes)
}

/// Every point of the product of `axes`, the last axis varying fastest.
/// Without axes there is exactly one, empty, binding.
pub fn bindings(axes: Vec<Axis>) -> impl Iterator<Item = Binding> {
    if axes.is_empty() {
        Either::Left(std::iter::once(Binding::default()))
    } else {
        let rows = axes
            .iter()
            .map(|axis| {
                (0..axis.len())
                    .map(|row| Binding::row(axis, row))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        Either::Right(
            rows.into_iter()
                .map(Vec::into_iter)
                .multi_cartesian_product()
                .map(Binding::merge),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_fragment, Rule};

    fn axis(text: &str, ctx: &Context) -> Result<Axis> {
        let ast = parse_fragment(Rule::iterator, text).unwrap();
        compile_iterator(ast.kind.as_iterator().unwrap(), &ast, ctx)
    }

    #[test]
    fn exclusion_keeps_source_positions() {
        let ctx = Context::new();
        let axis = axis("c in 01 02 03 04 05 06 07 \\ 04 06", &ctx).unwrap();
        let all = bindings(vec![axis]).collect::<Vec<_>>();
        let counters = all.iter().map(|b| b.counter("c").unwrap()).collect::<Vec<_>>();
        assert_eq!(counters, vec!["1", "2", "3", "5", "7"]);
    }

    #[test]
    fn parallel_iterator_zips() {
        let ctx = Context::new();
        let axis = axis("(c, s) in (01 02 03, 04 05 06)", &ctx).unwrap();
        let all = bindings(vec![axis]).collect::<Vec<_>>();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].get("c"), Some("03"));
        assert_eq!(all[2].get("s"), Some("06"));
    }

    #[test]
    fn parallel_iterator_length_mismatch() {
        let ctx = Context::new();
        let err = axis("(c, s) in (01 02 03, 04 05)", &ctx).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ArityMismatch { .. }));
        assert!(err.span().is_some());
    }

    #[test]
    fn product_varies_last_axis_fastest() {
        let ctx = Context::new();
        let a = axis("c in 1 2", &ctx).unwrap();
        let b = axis("s in x y z", &ctx).unwrap();
        let all = bindings(vec![a, b])
            .map(|b| format!("{}{}", b.get("c").unwrap(), b.get("s").unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(all, vec!["1x", "1y", "1z", "2x", "2y", "2z"]);
    }

    #[test]
    fn no_axes_gives_one_binding() {
        assert_eq!(bindings(vec![]).count(), 1);
    }

    #[test]
    fn empty_axis_gives_no_bindings() {
        let ctx = Context::new();
        let a = axis("c in 1 2 \\ 1 2", &ctx).unwrap();
        assert_eq!(bindings(vec![a]).count(), 0);
    }

    #[test]
    fn locals_in_iterators() {
        let ctx = Context::new().with_locals([
            (
                "%all".to_string(),
                LocalValue::List(ListValues::from_tokens(["01", "02", "03"])),
            ),
            ("%one".to_string(), LocalValue::Scalar("02".to_string())),
        ]);
        let a = axis("c in %all \\ %one", &ctx).unwrap();
        assert_eq!(a.len(), 2);
        let a = axis("c in %one", &ctx).unwrap();
        assert_eq!(a.len(), 1);
        let err = axis("c in %missing", &ctx).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::undefined(Reference::Local, "%missing")
        );
    }

    #[test]
    fn assignments_store_scalars_and_lists() {
        let ast = parse_fragment(Rule::assignment, "(%a, %b, %y) := (1 2 3, 15 12 3, 2006)").unwrap();
        let assignment = match &ast.kind {
            AstKind::Assignment(a) => a,
            _ => unreachable!(),
        };
        let locals = compile_assignment(assignment, &ast, &LocalHeap::new()).unwrap();
        assert_eq!(locals[0].1, LocalValue::List(ListValues::from_tokens(["1", "2", "3"])));
        assert_eq!(locals[2].1, LocalValue::Scalar("2006".to_string()));
    }

    #[test]
    fn duplicate_iterator_is_rejected() {
        let ast = parse_fragment(Rule::formula, "X[c] = 1, c in 1 2, c in 3").unwrap();
        let formula = ast.kind.as_formula().unwrap();
        let err = formula_axes(formula, &ast, &Context::new(), None).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DuplicateIterator("c".to_string()));
    }

    #[test]
    fn ambient_axes_join_when_referenced() {
        let ctx = Context::new()
            .with_ambient(Axis::single("t", &ListValues::from_tokens(["a"])))
            .with_ambient(Axis::single("s", &ListValues::from_tokens(["10", "20"])))
            .with_ambient(Axis::single("u", &ListValues::from_tokens(["z"])));
        let ast = parse_fragment(Rule::formula, "X[c, s, t] = 1, c in 1 2").unwrap();
        let formula = ast.kind.as_formula().unwrap();
        let axes = formula_axes(formula, &ast, &ctx, None).unwrap();
        let names = axes.iter().map(|a| a.names[0].as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["c", "t", "s"]);
    }

    #[test]
    fn undefined_iterator() {
        let ast = parse_fragment(Rule::formula, "X[c, s] = 1, c in 1 2").unwrap();
        let formula = ast.kind.as_formula().unwrap();
        let err = formula_axes(formula, &ast, &Context::new(), None).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::undefined(Reference::Iterator, "s"));
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut outer = Binding::default();
        outer.values.insert("c".to_string(), "01".to_string());
        outer.values.insert("s".to_string(), "10".to_string());
        let mut inner = Binding::default();
        inner.values.insert("c".to_string(), "02".to_string());
        let outer = Scope::new(outer, None);
        let inner = Scope::new(inner, Some(&outer));
        assert_eq!(inner.lookup("c"), Some("02"));
        assert_eq!(inner.lookup("s"), Some("10"));
        assert_eq!(inner.lookup("x"), None);
    }
}
