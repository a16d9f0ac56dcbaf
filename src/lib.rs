extern crate pest;
#[macro_use]
extern crate pest_derive;

pub mod ast;
pub mod calibration;
pub mod driver;
pub mod error;
pub mod expand;
pub mod parser;

use std::path::Path;

use log::info;

pub use calibration::Calibration;
pub use driver::{compile_instruction, DriverOptions, FileDriver};
pub use error::{CompileError, ErrorKind, Result};

use driver::source::{flatten, flatten_text, FileLoader, MemoryLoader, SourceLoader};

fn compile_lines(
    lines: &[driver::LogicalLine],
    calibration: &Calibration,
    options: DriverOptions,
) -> Result<Vec<String>> {
    let mut driver = FileDriver::new(options, calibration);
    driver.compile_lines(lines)?;
    let equations = driver.finish();
    info!("{} statements, {} equations", lines.len(), equations.len());
    Ok(equations)
}

/// Compiles model text held in memory. `include` statements are not
/// available without a file system; use [`compile_with_loader`] for that.
pub fn compile_str(
    text: &str,
    calibration: &Calibration,
    options: DriverOptions,
) -> Result<Vec<String>> {
    let lines = flatten_text("<input>", text, &MemoryLoader::new())?;
    compile_lines(&lines, calibration, options)
}

/// Compiles the model file at `path` and everything it includes.
pub fn compile_file(
    path: &Path,
    calibration: &Calibration,
    options: DriverOptions,
) -> Result<Vec<String>> {
    compile_with_loader(&path.display().to_string(), &FileLoader, calibration, options)
}

/// Compiles the source `root` as resolved by `loader`.
pub fn compile_with_loader(
    root: &str,
    loader: &dyn SourceLoader,
    calibration: &Calibration,
    options: DriverOptions,
) -> Result<Vec<String>> {
    let lines = flatten(root, loader)?;
    compile_lines(&lines, calibration, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_text() {
        let text = "\
%sectors := 01 02 03
s in %sectors
@pv Q_|s| = A_|s| _
    + B_|s|  # continued
";
        let equations = compile_str(text, &Calibration::new(), DriverOptions::default()).unwrap();
        assert_eq!(
            equations,
            vec![
                "Q_01 = A_01 + B_01",
                "PQ_01 * Q_01 = PA_01 * A_01 + PB_01 * B_01",
                "Q_02 = A_02 + B_02",
                "PQ_02 * Q_02 = PA_02 * A_02 + PB_02 * B_02",
                "Q_03 = A_03 + B_03",
                "PQ_03 * Q_03 = PA_03 * A_03 + PB_03 * B_03",
            ]
        );
    }

    #[test]
    fn generated_lines_parse_as_plain_equations() {
        let text = "\
%base := 2006
(c, s) in (01 02, 10 20)
@pv Q[c, s] = A[c] * K[s](-1) + sum(X[c, s] * $c, s in 10 20) if K[s] > 0
V[s] = value(Q[01, s] + Q[02, s]) + @elem(Y[s], %base)
R[c] = 0.0000001 * sum(Q[c, t], t in 10 20) + 99999999999999999999
";
        let calibration: Calibration = [("K_10", 1.0), ("K_20", 2.0)].into_iter().collect();
        let equations = compile_str(text, &calibration, DriverOptions::default()).unwrap();
        assert_eq!(equations.len(), 8);
        assert_eq!(
            equations[6],
            "R_01 = 0.0000001 * (0 + Q_01_10 + Q_01_20) + 99999999999999999999"
        );
        for equation in &equations {
            assert!(!equation.contains('|') && !equation.contains('$') && !equation.contains('%'));
            let ast = parser::parse_fragment(parser::Rule::formula, equation).unwrap();
            assert_eq!(ast.node_kind(), ast::NodeKind::Formula);
        }
    }

    #[test]
    fn include_without_loader_fails() {
        let err = compile_str("include lists", &Calibration::new(), DriverOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io { .. }));
    }
}
