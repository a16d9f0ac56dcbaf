//! Binds templates against iterator bindings and the local heap, producing
//! one compiled tree per surviving binding.

use log::{debug, trace};

use crate::ast::{self, Ast, AstKind, Formula, FormulaOption, Identifier};
use crate::calibration::Calibration;
use crate::error::{CompileError, ErrorKind, Reference, Result};

use super::compiled::{Compiled, Variable};
use super::condition::{evaluate, is_true};
use super::context::Context;
use super::iterators::{bindings, formula_axes, Binding, Scope};

fn at(kind: ErrorKind, ast: &Ast) -> CompileError {
    CompileError::new(kind, ast.span)
}

/// Gives an error raised without a location the span of `ast`.
fn located(err: CompileError, ast: &Ast) -> CompileError {
    match err.span() {
        Some(_) => err,
        None => at(err.kind().clone(), ast),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Width of the widest zero-padded code among `terms`.
fn code_width(terms: &[Compiled]) -> Option<usize> {
    terms
        .iter()
        .filter_map(|term| match term {
            Compiled::Literal(text)
                if text.len() > 1
                    && text.starts_with('0')
                    && text.bytes().all(|b| b.is_ascii_digit()) =>
            {
                Some(text.len())
            }
            _ => None,
        })
        .max()
}

#[derive(Debug, Clone, Copy)]
pub struct Binder<'c> {
    ctx: &'c Context,
    calibration: &'c Calibration,
    in_condition: bool,
}

impl<'c> Binder<'c> {
    pub fn new(ctx: &'c Context, calibration: &'c Calibration) -> Self {
        Self {
            ctx,
            calibration,
            in_condition: false,
        }
    }

    /// In conditions a bare bound iterator name stands for its value.
    fn for_condition(self) -> Self {
        Self {
            in_condition: true,
            ..self
        }
    }

    pub fn bind(&self, ast: &Ast, scope: &Scope) -> Result<Compiled> {
        match &ast.kind {
            AstKind::Integer(i) => Ok(Compiled::Literal(i.to_string())),
            AstKind::Real(r) => Ok(Compiled::Literal(r.to_string())),
            AstKind::VariableName(name) => Ok(Compiled::Literal(name.to_string())),
            AstKind::LoopCounter(name) => scope
                .counter(name)
                .map(|c| Compiled::Literal(c.to_string()))
                .ok_or_else(|| at(ErrorKind::undefined(Reference::Iterator, *name), ast)),
            AstKind::Identifier(id) => self.bind_identifier(id, ast, scope),
            AstKind::Array(array) => self.bind_array(array, ast, scope),
            AstKind::Operator(op)
            | AstKind::ComparisonOperator(op)
            | AstKind::BooleanOperator(op) => Ok(Compiled::Operator(op.to_string())),
            AstKind::Expr(expr) => self.bind_expr(expr, scope),
            AstKind::Function(func) => self.bind_function(func, ast, scope),
            AstKind::FormulaFunction(func) => {
                let items = self
                    .expand(&func.formula, Some(scope))?
                    .collect::<Result<Vec<_>>>()?;
                match func.name {
                    "sum" => Ok(Compiled::Sum(items)),
                    name => Ok(Compiled::Call {
                        name: name.to_string(),
                        args: items,
                    }),
                }
            }
            AstKind::Condition(inner) => self.for_condition().bind(inner, scope),
            AstKind::Equation(eq) => Ok(Compiled::Equation {
                lhs: Box::new(self.bind(&eq.lhs, scope)?),
                rhs: Box::new(self.bind(&eq.rhs, scope)?),
            }),
            _ => Err(at(
                ErrorKind::Syntax(format!(
                    "{} cannot appear in an expression",
                    ast.node_kind()
                )),
                ast,
            )),
        }
    }

    fn scalar_local(&self, name: &str, ast: &Ast) -> Result<&'c str> {
        match self.ctx.local(name) {
            Some(value) => value
                .as_scalar()
                .ok_or_else(|| at(ErrorKind::undefined(Reference::ScalarLocal, name), ast)),
            None => Err(at(ErrorKind::undefined(Reference::Local, name), ast)),
        }
    }

    /// Concatenated parts of an identifier with placeholders and locals
    /// substituted.
    fn identifier_text(&self, id: &Identifier, scope: &Scope) -> Result<String> {
        let mut text = String::new();
        for part in &id.parts {
            match &part.kind {
                AstKind::VariableName(name) => text.push_str(name),
                AstKind::LocalName(name) => text.push_str(self.scalar_local(name, part)?),
                AstKind::Placeholder(inner) => match &inner.kind {
                    AstKind::VariableName(name) => text.push_str(scope.lookup(name).ok_or_else(
                        || at(ErrorKind::undefined(Reference::Iterator, *name), part),
                    )?),
                    AstKind::LocalName(name) => {
                        text.push_str(self.scalar_local(name, part)?)
                    }
                    _ => {
                        return Err(at(
                            ErrorKind::Syntax("invalid placeholder".to_string()),
                            part,
                        ))
                    }
                },
                _ => {
                    return Err(at(
                        ErrorKind::Syntax(format!("{} in identifier", part.node_kind())),
                        part,
                    ))
                }
            }
        }
        Ok(text)
    }

    fn bind_identifier(&self, id: &Identifier, ast: &Ast, scope: &Scope) -> Result<Compiled> {
        if self.in_condition {
            if let Some(value) = id.simple_name().and_then(|name| scope.lookup(name)) {
                return Ok(Compiled::Literal(value.to_string()));
            }
        }
        let text = self.identifier_text(id, scope).map_err(|e| located(e, ast))?;
        if id.local_name().is_some() {
            return Ok(Compiled::Literal(text));
        }
        Ok(Compiled::Variable(Variable {
            name: text,
            time_offset: None,
            as_value: id.as_value,
        }))
    }

    /// One `_`-joined component of an array name. Arithmetic on literals,
    /// such as `$c - 1`, is computed; a zero-padded operand keeps the result
    /// at its width (`02 - 1` is `01`).
    fn index_component(&self, expr: &Ast, scope: &Scope) -> Result<String> {
        let bound = self.for_condition().bind(expr, scope)?;
        if let Compiled::Expr(terms) = &bound {
            if terms.len() > 1 && bound.extract_varnames().is_empty() {
                if let Ok(value) = evaluate(&bound, self.calibration) {
                    if value.is_finite() {
                        return Ok(match code_width(terms) {
                            Some(width) if value.fract() == 0.0 && value >= 0.0 => {
                                format!("{:0width$}", value as i64, width = width)
                            }
                            _ => format_number(value),
                        });
                    }
                }
            }
        }
        Ok(bound.to_string().replace(' ', ""))
    }

    fn bind_array(&self, array: &ast::Array, ast: &Ast, scope: &Scope) -> Result<Compiled> {
        let mut name = match array.identifier.kind.as_identifier() {
            Some(id) => self.identifier_text(id, scope)?,
            None => array.identifier.to_string(),
        };
        if let Some(AstKind::Index(index)) = array.index.as_deref().map(|i| &i.kind) {
            for expr in &index.exprs {
                name.push('_');
                name.push_str(&self.index_component(expr, scope)?);
            }
        }
        let time_offset = match array.time_offset.as_deref().map(|o| &o.kind) {
            Some(AstKind::TimeOffset(offset)) => Some(match &offset.kind {
                AstKind::Integer(i) => i.to_string(),
                AstKind::VariableName(name) => scope.lookup(name).unwrap_or(*name).to_string(),
                _ => offset.to_string(),
            }),
            _ => None,
        };
        trace!("bound {} to {}", ast, name);
        Ok(Compiled::Variable(Variable {
            name,
            time_offset,
            as_value: array.as_value,
        }))
    }

    fn bind_expr(&self, expr: &ast::Expr, scope: &Scope) -> Result<Compiled> {
        let mut terms = Vec::with_capacity(expr.terms.len());
        for term in &expr.terms {
            let bound = self.bind(term, scope)?;
            let grouped = match (&term.kind, &bound) {
                (AstKind::Expr(_), _) => true,
                // `value(a + b)` inside a larger expression keeps its grouping
                (AstKind::Function(func), Compiled::Expr(inner)) => {
                    func.name == "value" && expr.terms.len() > 1 && inner.len() > 1
                }
                // so does a non-empty `sum`
                (AstKind::FormulaFunction(_), Compiled::Sum(items)) => {
                    expr.terms.len() > 1 && !items.is_empty()
                }
                _ => false,
            };
            if grouped {
                terms.push(Compiled::Group(Box::new(bound)));
            } else {
                terms.push(bound);
            }
        }
        Ok(Compiled::Expr(terms))
    }

    fn bind_function(&self, func: &ast::Function, ast: &Ast, scope: &Scope) -> Result<Compiled> {
        match (func.name, func.args.len()) {
            ("value", 1) => self.bind(&func.args[0].value_form(), scope),
            ("value", found) => Err(at(
                ErrorKind::Arguments {
                    function: "value".to_string(),
                    expected: 1,
                    found,
                },
                ast,
            )),
            // resolved now, against the calibration values
            ("if", 3) => {
                let condition = self.for_condition().bind(&func.args[0], scope)?;
                let value =
                    evaluate(&condition, self.calibration).map_err(|e| located(e, &func.args[0]))?;
                let branch = if is_true(value) { 1 } else { 2 };
                self.bind(&func.args[branch], scope)
            }
            (name, _) => Ok(Compiled::Call {
                name: name.to_string(),
                args: func
                    .args
                    .iter()
                    .map(|arg| self.bind(arg, scope))
                    .collect::<Result<Vec<_>>>()?,
            }),
        }
    }

    /// Lazily expands a formula node over its binding product. The axes are
    /// resolved, and reference errors raised, before the first item.
    pub fn expand<'s, 'a>(
        &self,
        ast: &'s Ast<'a>,
        parent: Option<&'s Scope<'s>>,
    ) -> Result<Expansion<'s, 'a, 'c>> {
        let formula = ast.kind.as_formula().ok_or_else(|| {
            at(
                ErrorKind::Syntax(format!("expected a formula, found {}", ast.node_kind())),
                ast,
            )
        })?;
        let axes = formula_axes(formula, ast, self.ctx, parent)?;
        debug!(
            "expanding `{}` over {} axes ({} bindings)",
            formula.body,
            axes.len(),
            axes.iter().map(|a| a.len()).product::<usize>()
        );
        let value_body = formula
            .has_option(FormulaOption::PriceVolume)
            .then(|| formula.body.value_form());
        Ok(Expansion {
            binder: *self,
            formula,
            value_body,
            bindings: Box::new(bindings(axes)),
            parent,
            pending: None,
            done: false,
        })
    }
}

/// The compiled items of one formula, in binding order. With the
/// price/volume option each surviving binding yields its volume form then
/// its value form. Iteration stops after the first error.
pub struct Expansion<'s, 'a, 'c> {
    binder: Binder<'c>,
    formula: &'s Formula<'a>,
    value_body: Option<Ast<'a>>,
    bindings: Box<dyn Iterator<Item = Binding>>,
    parent: Option<&'s Scope<'s>>,
    pending: Option<Compiled>,
    done: bool,
}

impl Expansion<'_, '_, '_> {
    fn next_binding(&mut self) -> Result<Option<Compiled>> {
        for binding in self.bindings.by_ref() {
            let scope = Scope::new(binding, self.parent);
            if let Some(condition) = &self.formula.condition {
                let bound = self.binder.bind(condition, &scope)?;
                let value = evaluate(&bound, self.binder.calibration)
                    .map_err(|e| located(e, condition))?;
                if !is_true(value) {
                    trace!("condition `{}` is false", bound);
                    continue;
                }
            }
            let volume = self.binder.bind(&self.formula.body, &scope)?;
            if let Some(value_body) = &self.value_body {
                self.pending = Some(self.binder.bind(value_body, &scope)?);
            }
            return Ok(Some(volume));
        }
        Ok(None)
    }
}

impl Iterator for Expansion<'_, '_, '_> {
    type Item = Result<Compiled>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(value) = self.pending.take() {
            return Some(Ok(value));
        }
        if self.done {
            return None;
        }
        match self.next_binding() {
            Ok(Some(compiled)) => Some(Ok(compiled)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
