//! Preprocessing pass: statement normalization, function ranges and labels.
//!
//! Runs once before execution:
//! 1. `DEF name: stmt` is split into the marker `DEF name:` and `stmt`, so
//!    every slot holds exactly one statement.
//! 2. Function ranges are closed by `RETURN` (inclusive), by the next `DEF`
//!    (at the previous statement) or by end of input.
//! 3. `label: stmt` binds `label` to the slot and leaves only `stmt` behind.

use serde::Serialize;
use std::collections::BTreeMap;

use super::source::{split_statements, strip_comments};

/// One preprocessed statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    /// 1-based number of the source statement this slot came from
    pub number: usize,
    pub text: String,
}

/// Inclusive range of statement indices covered by a function definition.
///
/// `start` is the `DEF` marker; the body begins at `start + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FunctionRange {
    pub start: usize,
    pub end: usize,
}

/// A preprocessed program.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Program {
    pub statements: Vec<Statement>,
    /// Label name -> index of the statement where execution resumes
    pub labels: BTreeMap<String, usize>,
    pub functions: BTreeMap<String, FunctionRange>,
    /// Every definition in source order, including shadowed duplicates
    #[serde(skip)]
    definitions: Vec<FunctionRange>,
    /// Labels defined more than once (the last definition wins)
    #[serde(skip)]
    pub duplicate_labels: Vec<String>,
}

impl Program {
    /// Strip comments, split and preprocess program text.
    pub fn parse(source: &str) -> Program {
        preprocess(split_statements(&strip_comments(source)))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Index of the first slot that came from source statement `number`.
    pub fn statement_index(&self, number: usize) -> Option<usize> {
        self.statements.iter().position(|s| s.number == number)
    }

    /// The definition whose marker sits at `index`.
    pub fn definition_at(&self, index: usize) -> Option<FunctionRange> {
        self.definitions.iter().copied().find(|d| d.start == index)
    }
}

/// Name declared by a `DEF name:` marker.
pub fn def_name(text: &str) -> Option<&str> {
    let rest = text.trim().strip_prefix("DEF ")?;
    let name = rest.split_whitespace().next()?.trim_end_matches(':');
    if name.is_empty() { None } else { Some(name) }
}

fn is_return(text: &str) -> bool {
    text.split_whitespace().next() == Some("RETURN")
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split `label: rest` into its parts.
fn split_label(text: &str) -> Option<(&str, &str)> {
    let (label, rest) = text.split_once(':')?;
    let label = label.trim();
    if is_identifier(label) {
        Some((label, rest.trim()))
    } else {
        None
    }
}

/// Run the preprocessing pass over raw statements.
pub fn preprocess(raw: Vec<String>) -> Program {
    let mut program = Program::default();

    for (i, text) in raw.iter().enumerate() {
        let number = i + 1;
        let s = text.trim();
        if s.starts_with("DEF ") {
            if let Some((head, rest)) = s.split_once(':') {
                program.statements.push(Statement {
                    number,
                    text: format!("{}:", head.trim()),
                });
                if !rest.trim().is_empty() {
                    program.statements.push(Statement {
                        number,
                        text: rest.trim().to_string(),
                    });
                }
                continue;
            }
        }
        program.statements.push(Statement {
            number,
            text: s.to_string(),
        });
    }

    let mut open: Option<(String, usize)> = None;
    for i in 0..program.statements.len() {
        if def_name(&program.statements[i].text).is_none() {
            if let Some((label, rest)) = split_label(&program.statements[i].text) {
                let (label, rest) = (label.to_string(), rest.to_string());
                if program.labels.insert(label.clone(), i).is_some() {
                    program.duplicate_labels.push(label);
                }
                program.statements[i].text = rest;
            }
        }

        let text = &program.statements[i].text;
        if let Some(name) = def_name(text) {
            let name = name.to_string();
            if let Some((prev, start)) = open.take() {
                close_function(&mut program, prev, start, i - 1);
            }
            open = Some((name, i));
        } else if is_return(text) {
            if let Some((name, start)) = open.take() {
                close_function(&mut program, name, start, i);
            }
        }
    }

    if let Some((name, start)) = open {
        let end = program.statements.len() - 1;
        close_function(&mut program, name, start, end);
    }

    program
}

fn close_function(program: &mut Program, name: String, start: usize, end: usize) {
    let range = FunctionRange { start, end };
    program.functions.insert(name, range);
    program.definitions.push(range);
}
