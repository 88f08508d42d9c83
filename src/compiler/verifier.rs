//! Static checks over a preprocessed program.
//!
//! Rules:
//! - Arity: known opcodes get an accepted number of arguments
//! - Calls: CALL names a defined function
//! - Jumps: symbolic targets name a label, numeric targets name a statement
//!
//! Operand types are only known at run time and are not checked here.

use crate::vm::{Op, Scalar};

use super::operand::{parse_number, split_instruction};
use super::preprocess::{def_name, Program};

/// Check error types
#[derive(Debug, Clone, PartialEq)]
pub enum CheckError {
    /// Wrong number of arguments for a known opcode
    Arity { statement: usize, message: String },
    /// CALL of a name with no definition
    UndefinedFunction { statement: usize, name: String },
    /// Jump to a label that is never defined
    UndefinedLabel { statement: usize, name: String },
    /// Numeric jump target that names no statement
    InvalidJumpTarget { statement: usize, target: String },
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::Arity { statement, message } => {
                write!(f, "error at statement {}: {}", statement, message)
            }
            CheckError::UndefinedFunction { statement, name } => {
                write!(f, "error at statement {}: Function '{}' not found", statement, name)
            }
            CheckError::UndefinedLabel { statement, name } => {
                write!(f, "error at statement {}: Undefined label '{}'", statement, name)
            }
            CheckError::InvalidJumpTarget { statement, target } => {
                write!(
                    f,
                    "error at statement {}: Jump target {} does not name a statement",
                    statement, target
                )
            }
        }
    }
}

impl std::error::Error for CheckError {}

/// Non-fatal findings.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckWarning {
    UnknownInstruction { statement: usize, mnemonic: String },
    DuplicateLabel { name: String },
}

impl std::fmt::Display for CheckWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckWarning::UnknownInstruction { statement, mnemonic } => write!(
                f,
                "WARNING: statement {}: unknown instruction '{}'",
                statement, mnemonic
            ),
            CheckWarning::DuplicateLabel { name } => {
                write!(f, "WARNING: label '{}' is defined more than once", name)
            }
        }
    }
}

/// Result of checking a program.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check every statement of `program`.
pub fn check_program(program: &Program) -> CheckReport {
    let mut report = CheckReport::default();

    for name in &program.duplicate_labels {
        report.warnings.push(CheckWarning::DuplicateLabel { name: name.clone() });
    }

    for statement in &program.statements {
        let text = statement.text.trim();
        if text.is_empty() || def_name(text).is_some() {
            continue;
        }
        let (mnemonic, args) = split_instruction(text);
        let Some(op) = Op::from_mnemonic(mnemonic) else {
            report.warnings.push(CheckWarning::UnknownInstruction {
                statement: statement.number,
                mnemonic: mnemonic.to_string(),
            });
            continue;
        };
        if let Err(message) = op.check_arity(args.len()) {
            report.errors.push(CheckError::Arity {
                statement: statement.number,
                message,
            });
            continue;
        }

        match op {
            Op::Call => {
                if !program.functions.contains_key(&args[0]) {
                    report.errors.push(CheckError::UndefinedFunction {
                        statement: statement.number,
                        name: args[0].clone(),
                    });
                }
            }
            Op::Jmp => check_target(program, statement.number, &args[0], &mut report),
            _ if op.is_conditional_jump() => {
                check_target(program, statement.number, &args[1], &mut report)
            }
            _ => {}
        }
    }

    report
}

fn check_target(program: &Program, statement: usize, target: &str, report: &mut CheckReport) {
    if program.labels.contains_key(target) {
        return;
    }
    match parse_number(target) {
        Some(Scalar::Int(n)) => {
            let found = usize::try_from(n)
                .ok()
                .and_then(|n| program.statement_index(n))
                .is_some();
            if !found {
                report.errors.push(CheckError::InvalidJumpTarget {
                    statement,
                    target: target.to_string(),
                });
            }
        }
        Some(Scalar::Float(_)) => report.errors.push(CheckError::InvalidJumpTarget {
            statement,
            target: target.to_string(),
        }),
        None => report.errors.push(CheckError::UndefinedLabel {
            statement,
            name: target.to_string(),
        }),
    }
}
