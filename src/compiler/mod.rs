pub mod dump;
mod handlers;
pub mod interpreter;
pub mod operand;
pub mod preprocess;
pub mod source;
pub mod verifier;

pub use interpreter::{Datum, ExecStats, Interpreter, VarType, Variable};
pub use preprocess::{FunctionRange, Program, Statement};
pub use verifier::{CheckError, CheckReport, CheckWarning, check_program};

use crate::config::{DumpFormat, RuntimeConfig};
use std::fs;
use std::path::{Path, PathBuf};

/// Where and how to dump the preprocessed program.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// `None`: no dump, `Some(None)`: stderr, `Some(Some(path))`: file
    pub dump_program: Option<Option<PathBuf>>,
    pub format: DumpFormat,
}

/// Load and preprocess a program file.
pub fn load_program(path: &Path) -> Result<Program, String> {
    let statements = source::load_file(path)?;
    Ok(preprocess::preprocess(statements))
}

/// Run program text and return its exit status.
pub fn run_source(source: &str, config: &RuntimeConfig) -> Result<i32, String> {
    let program = Program::parse(source);
    let mut interpreter = Interpreter::new(program, config);
    interpreter.run().map_err(|e| e.to_string())
}

/// Run a program file and return its exit status.
pub fn run_file(path: &Path, config: &RuntimeConfig) -> Result<i32, String> {
    run_file_with_dump(path, config, &DumpOptions::default())
}

/// Run a program file, dumping the preprocessed program first if requested.
pub fn run_file_with_dump(
    path: &Path,
    config: &RuntimeConfig,
    dump_opts: &DumpOptions,
) -> Result<i32, String> {
    let program = load_program(path)?;

    if let Some(target) = &dump_opts.dump_program {
        let content = match dump_opts.format {
            DumpFormat::Human => dump::format_program(&program),
            DumpFormat::Json => dump::format_program_json(&program)?,
        };
        write_dump(&content, target.as_deref())?;
    }

    let mut interpreter = Interpreter::new(program, config);
    interpreter.run().map_err(|e| e.to_string())
}

/// Statically check a file. Returns the warnings on success and the
/// formatted errors on failure.
pub fn check_file(path: &Path) -> Result<Vec<CheckWarning>, String> {
    let program = load_program(path)?;
    let report = check_program(&program);
    if report.is_ok() {
        return Ok(report.warnings);
    }
    let mut output = String::new();
    for error in &report.errors {
        output.push_str(&format!("{}\n  --> {}\n", error, path.display()));
    }
    Err(output.trim_end().to_string())
}

fn write_dump(content: &str, target: Option<&Path>) -> Result<(), String> {
    match target {
        Some(path) => fs::write(path, content)
            .map_err(|e| format!("failed to write dump to {}: {}", path.display(), e)),
        None => {
            eprint!("{}", content);
            Ok(())
        }
    }
}
