//! Statement-by-statement compilation of model files.

pub mod dependency;
pub mod source;

use std::mem;

use log::debug;

use crate::ast::{Ast, AstKind, FormulaOption};
use crate::calibration::Calibration;
use crate::error::{CompileError, ErrorKind, Result};
use crate::expand::{compile_assignment, compile_iterator, Binder, Compiled, Context};
use crate::parser::parse_instruction;

pub use dependency::{EquationEntry, EquationSet};
pub use source::{
    flatten, flatten_text, include_target, logical_lines, FileLoader, LogicalLine, MemoryLoader,
    SourceLoader,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverOptions {
    /// emit equations in dependency order instead of generation order
    pub order_equations: bool,
}

fn statement<'s, 'a>(ast: &'s Ast<'a>) -> &'s Ast<'a> {
    match &ast.kind {
        AstKind::Instruction(inner) => inner,
        _ => ast,
    }
}

/// Runs one statement: declarations update `ctx` in place, formulas pass each
/// compiled item to `emit` along with whether the formula may override.
fn run_statement<F>(
    ctx: &mut Context,
    text: &str,
    calibration: &Calibration,
    mut emit: F,
) -> Result<()>
where
    F: FnMut(Compiled, bool, &Ast) -> Result<()>,
{
    let ast = parse_instruction(text)?;
    let inner = statement(&ast);
    match &inner.kind {
        AstKind::Assignment(assignment) => {
            let locals = compile_assignment(assignment, inner, &ctx.heap)?;
            debug!(
                "locals {}",
                locals.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(" ")
            );
            *ctx = mem::take(ctx).with_locals(locals);
        }
        AstKind::Iterator(iter) => {
            let axis = compile_iterator(iter, inner, ctx)?;
            debug!("iterator {} ({} values)", axis.names.join(" "), axis.len());
            *ctx = mem::take(ctx).with_ambient(axis);
        }
        AstKind::Formula(formula) => {
            let overriding = formula.has_option(FormulaOption::Override);
            let binder = Binder::new(ctx, calibration);
            for compiled in binder.expand(inner, None)? {
                emit(compiled?, overriding, inner)?;
            }
        }
        _ => {
            return Err(CompileError::new(
                ErrorKind::Syntax(format!(
                    "expected a statement, found {}",
                    inner.node_kind()
                )),
                inner.span,
            ))
        }
    }
    Ok(())
}

/// Compiles one logical statement against `ctx`, returning the updated
/// context and the generated lines. Declarations generate nothing.
pub fn compile_instruction(
    ctx: Context,
    text: &str,
    calibration: &Calibration,
) -> Result<(Context, Vec<String>)> {
    let mut ctx = ctx;
    let mut lines = Vec::new();
    run_statement(&mut ctx, text, calibration, |compiled, _, _| {
        lines.push(compiled.to_string());
        Ok(())
    })?;
    Ok((ctx, lines))
}

/// Compiles a sequence of logical lines, threading the iterator and local
/// declarations from one statement to the next.
pub struct FileDriver<'c> {
    options: DriverOptions,
    calibration: &'c Calibration,
    context: Context,
    equations: EquationSet,
}

impl<'c> FileDriver<'c> {
    pub fn new(options: DriverOptions, calibration: &'c Calibration) -> Self {
        Self {
            options,
            calibration,
            context: Context::new(),
            equations: EquationSet::new(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn equations(&self) -> &EquationSet {
        &self.equations
    }

    pub fn compile_line(&mut self, line: &LogicalLine) -> Result<()> {
        debug!("{}:{}: {}", line.file.as_deref().unwrap_or("-"), line.number, line.text);
        let equations = &mut self.equations;
        run_statement(
            &mut self.context,
            &line.text,
            self.calibration,
            |compiled, overriding, ast| {
                equations
                    .push(EquationEntry::from_compiled(&compiled), overriding)
                    .map_err(|kind| CompileError::new(kind, ast.span))
            },
        )
        .map_err(|e| e.with_line(line.source_line()))
    }

    pub fn compile_lines<'l, I>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = &'l LogicalLine>,
    {
        lines.into_iter().try_for_each(|line| self.compile_line(line))
    }

    /// The generated equations, ordered according to the driver options.
    pub fn finish(self) -> Vec<String> {
        let lines = if self.options.order_equations {
            self.equations.in_dependency_order()
        } else {
            self.equations.in_source_order()
        };
        lines.into_iter().map(String::from).collect()
    }
}
