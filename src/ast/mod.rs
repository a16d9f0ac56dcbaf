pub mod ast;
pub mod traversal;

pub use ast::{Ast, AstKind, NodeKind, StringSpan};
pub use ast::{Array, Assignment, Equation, Expr, FormulaOption, Function, FormulaFunction};
pub use ast::{Formula, Identifier, Index, Iter, List};
