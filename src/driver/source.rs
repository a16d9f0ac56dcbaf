//! Logical lines and `include` flattening.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{CompileError, ErrorKind, Result, SourceLine};

pub const DEFAULT_EXTENSION: &str = "mdl";

/// One statement after comment stripping and continuation joining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    pub file: Option<String>,
    /// physical line number of the first line of the statement
    pub number: usize,
    pub text: String,
}

impl LogicalLine {
    pub fn source_line(&self) -> SourceLine {
        SourceLine {
            file: self.file.clone(),
            number: self.number,
            text: self.text.clone(),
        }
    }
}

/// Drops a `#` comment; `\#` stands for a literal `#`.
fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'#') => {
                out.push('#');
                chars.next();
            }
            '#' => break,
            c => out.push(c),
        }
    }
    out
}

/// The line without its trailing ` _` continuation marker, if it has one.
fn continued(line: &str) -> Option<&str> {
    let head = line.strip_suffix('_')?;
    if head.is_empty() || head.ends_with(char::is_whitespace) {
        Some(head)
    } else {
        None
    }
}

/// Splits source text into logical lines: comments removed, blank lines
/// dropped, and lines ending in a whitespace-separated `_` joined with the
/// next non-blank line.
pub fn logical_lines(file: Option<&str>, text: &str) -> Vec<LogicalLine> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (i, physical) in text.lines().enumerate() {
        let stripped = strip_comment(physical);
        let stripped = stripped.trim_end();
        if stripped.trim().is_empty() {
            continue;
        }
        let piece = match &pending {
            Some(_) => stripped.trim_start(),
            None => stripped,
        };
        let (number, mut buffer) = pending.take().unwrap_or((i + 1, String::new()));
        match continued(piece) {
            Some(head) => {
                buffer.push_str(head);
                pending = Some((number, buffer));
            }
            None => {
                buffer.push_str(piece);
                lines.push(LogicalLine {
                    file: file.map(String::from),
                    number,
                    text: buffer,
                });
            }
        }
    }
    if let Some((number, buffer)) = pending {
        lines.push(LogicalLine {
            file: file.map(String::from),
            number,
            text: buffer.trim_end().to_string(),
        });
    }
    lines
}

/// The file named by an `include <name>` statement.
pub fn include_target(text: &str) -> Option<&str> {
    let rest = text.trim().strip_prefix("include")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let name = rest.trim();
    (!name.is_empty()).then_some(name)
}

/// Where included sources come from.
pub trait SourceLoader {
    /// A canonical key for `name` as included from `from` (`None` for the
    /// root). Two includes of the same source resolve to the same key.
    fn resolve(&self, name: &str, from: Option<&str>) -> Result<String>;

    fn load(&self, key: &str) -> Result<String>;
}

fn with_default_extension(name: &str) -> PathBuf {
    let path = PathBuf::from(name);
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(DEFAULT_EXTENSION)
    }
}

fn io_error(path: &str, message: String) -> CompileError {
    ErrorKind::Io {
        path: path.to_string(),
        message,
    }
    .into()
}

/// Reads sources from disk; includes resolve relative to the including file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl SourceLoader for FileLoader {
    fn resolve(&self, name: &str, from: Option<&str>) -> Result<String> {
        let path = with_default_extension(name);
        let path = match from.and_then(|f| Path::new(f).parent()) {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        };
        let path = fs::canonicalize(&path)
            .map_err(|e| io_error(&path.display().to_string(), e.to_string()))?;
        Ok(path.display().to_string())
    }

    fn load(&self, key: &str) -> Result<String> {
        fs::read_to_string(key).map_err(|e| io_error(key, e.to_string()))
    }
}

/// Sources held in memory, keyed by name (with the default extension).
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, name: &str, text: &str) -> Self {
        self.sources.insert(
            with_default_extension(name).display().to_string(),
            text.to_string(),
        );
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn resolve(&self, name: &str, _from: Option<&str>) -> Result<String> {
        Ok(with_default_extension(name).display().to_string())
    }

    fn load(&self, key: &str) -> Result<String> {
        self.sources
            .get(key)
            .cloned()
            .ok_or_else(|| io_error(key, "no such source".to_string()))
    }
}

fn flatten_lines(
    key: &str,
    text: &str,
    loader: &dyn SourceLoader,
    chain: &mut Vec<String>,
    out: &mut Vec<LogicalLine>,
) -> Result<()> {
    chain.push(key.to_string());
    for line in logical_lines(Some(key), text) {
        let Some(name) = include_target(&line.text) else {
            out.push(line);
            continue;
        };
        let mut included = || -> Result<()> {
            let target = loader.resolve(name, Some(key))?;
            if chain.contains(&target) {
                let mut cycle = chain.clone();
                cycle.push(target);
                return Err(ErrorKind::SelfInclusion { chain: cycle }.into());
            }
            info!("including {}", target);
            let text = loader.load(&target)?;
            flatten_lines(&target, &text, loader, chain, out)
        };
        included().map_err(|e| e.with_line(line.source_line()))?;
    }
    chain.pop();
    Ok(())
}

/// The logical lines of `root` with every include replaced by the lines of
/// the included source. A source that includes itself, directly or through
/// other sources, is an error.
pub fn flatten(root: &str, loader: &dyn SourceLoader) -> Result<Vec<LogicalLine>> {
    let key = loader.resolve(root, None)?;
    info!("reading {}", key);
    let text = loader.load(&key)?;
    flatten_text(&key, &text, loader)
}

/// Like [`flatten`], for a root whose text is already in memory.
pub fn flatten_text(key: &str, text: &str, loader: &dyn SourceLoader) -> Result<Vec<LogicalLine>> {
    let mut chain = Vec::new();
    let mut out = Vec::new();
    flatten_lines(key, text, loader, &mut chain, &mut out)?;
    Ok(out)
}
