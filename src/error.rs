use std::fmt::{self, Write};

use pest::Span;
use thiserror::Error;

use crate::ast::StringSpan;

/// What kind of name failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Iterator,
    Local,
    ScalarLocal,
    Value,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let what = match self {
            Reference::Iterator => "iterator",
            Reference::Local => "local variable",
            Reference::ScalarLocal => "scalar local",
            Reference::Value => "value",
        };
        f.write_str(what)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("undefined {what} `{name}`")]
    UndefinedReference { what: Reference, name: String },
    #[error("parallel iterators ({}) differ in length", .names.join(", "))]
    ArityMismatch { names: Vec<String> },
    #[error("iterator `{0}` is declared more than once")]
    DuplicateIterator(String),
    #[error("variable `{0}` is already defined, mark the formula with @over to replace it")]
    DuplicateDefinition(String),
    #[error("file includes itself: {}", .chain.join(" -> "))]
    SelfInclusion { chain: Vec<String> },
    #[error("function `{function}` takes {expected} argument(s), found {found}")]
    Arguments {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("cannot evaluate condition: {0}")]
    Evaluation(String),
    #[error("cannot read `{path}`: {message}")]
    Io { path: String, message: String },
    #[error("invalid calibration data: {0}")]
    Calibration(String),
}

impl ErrorKind {
    pub fn undefined(what: Reference, name: impl Into<String>) -> Self {
        ErrorKind::UndefinedReference {
            what,
            name: name.into(),
        }
    }
}

/// The logical source line a statement came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub file: Option<String>,
    pub number: usize,
    pub text: String,
}

/// A compilation failure, optionally located by a span into the statement
/// text and by the source line the statement came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    kind: ErrorKind,
    span: Option<StringSpan>,
    line: Option<SourceLine>,
}

pub type Result<T> = std::result::Result<T, CompileError>;

impl CompileError {
    pub fn new(kind: ErrorKind, span: Option<StringSpan>) -> Self {
        Self {
            kind,
            span,
            line: None,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn span(&self) -> Option<StringSpan> {
        self.span
    }

    pub fn line(&self) -> Option<&SourceLine> {
        self.line.as_ref()
    }

    /// Attaches the source line, keeping one that was attached earlier (an
    /// error inside an included file keeps its own location).
    pub fn with_line(mut self, line: SourceLine) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    fn line_col(&self, input: &str) -> Option<(usize, usize)> {
        let source_ref = self.span?;
        let span = Span::new(input, source_ref.pos_start, source_ref.pos_end)?;
        Some(span.start_pos().line_col())
    }

    pub fn as_error_message(&self, f: &mut String, input: &str) -> fmt::Result {
        match self.line_col(input) {
            Some((line, col)) => write!(f, "Line {}, Column {}: Error: {}", line, col, self.kind),
            None => write!(f, "Error: {}", self.kind),
        }
    }
}

impl From<ErrorKind> for CompileError {
    fn from(kind: ErrorKind) -> Self {
        CompileError::new(kind, None)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.line {
            Some(line) => {
                write!(f, "Error at line {}", line.number)?;
                if let Some((_, col)) = self.line_col(&line.text) {
                    write!(f, ", column {}", col)?;
                }
                if let Some(file) = &line.file {
                    write!(f, " ({})", file)?;
                }
                write!(f, ":\n\n    {}\n\n{}", line.text, self.kind)
            }
            None => match self.span {
                Some(source_ref) => write!(f, "{}: Error: {}", source_ref, self.kind),
                None => write!(f, "Error: {}", self.kind),
            },
        }
    }
}

impl std::error::Error for CompileError {}
