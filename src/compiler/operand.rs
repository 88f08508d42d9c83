//! Statement and operand syntax.
//!
//! Operands are classified once, purely syntactically. Whether a bare name
//! refers to a defined variable is decided later by the interpreter.

use crate::vm::{Register, Scalar};

use super::preprocess::is_identifier;

/// Split a statement into its opcode and raw argument strings.
pub fn split_instruction(text: &str) -> (&str, Vec<String>) {
    let text = text.trim();
    match text.split_once(char::is_whitespace) {
        Some((opcode, rest)) => (opcode, split_args(rest)),
        None => (text, Vec::new()),
    }
}

/// Split an argument list on top-level commas.
///
/// Commas inside `[...]` or double quotes do not split; each argument is trimmed.
pub fn split_args(s: &str) -> Vec<String> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for c in s.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    args.push(current.trim().to_string());
    args
}

/// Parse a numeric literal: optional sign, digits, optional fraction.
///
/// The literal form decides the type: a `.` makes it a float.
pub fn parse_number(s: &str) -> Option<Scalar> {
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    let digits_ok = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if !digits_ok(int_part) || !frac_part.is_none_or(digits_ok) {
        return None;
    }
    if int_part.is_empty() && frac_part.is_none_or(str::is_empty) {
        return None;
    }
    if frac_part.is_some() {
        return s.parse::<f64>().ok().map(Scalar::Float);
    }
    match s.parse::<i64>() {
        Ok(n) => Some(Scalar::Int(n)),
        Err(_) => s.parse::<f64>().ok().map(Scalar::Float),
    }
}

/// Resolve `\n`, `\t`, `\\` and `\"` escapes.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Contents of a double-quoted token, with escapes resolved.
pub fn unquote(s: &str) -> Option<String> {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        Some(unescape(&s[1..s.len() - 1]))
    } else {
        None
    }
}

/// Base of an indexed operand.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexBase {
    Register(Register),
    Variable(String),
}

/// A syntactically classified operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Register(Register),
    /// A bare identifier; may or may not name a variable
    Name(String),
    Scalar(Scalar),
    /// `[a b c]` or `[a, b, c]`; elements are registers, names or numbers
    Vector(Vec<Operand>),
    Str(String),
    /// `base[index]`
    Element { base: IndexBase, index: Box<Operand> },
    Unresolved(String),
}

impl Operand {
    pub fn parse(token: &str) -> Operand {
        let token = token.trim();
        if let Some(s) = unquote(token) {
            return Operand::Str(s);
        }
        if let Some(n) = parse_number(token) {
            return Operand::Scalar(n);
        }
        if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let elements = inner
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .map(Operand::parse_simple)
                .collect();
            return Operand::Vector(elements);
        }
        if let Some((base, index)) = split_indexed(token) {
            let base = match Register::parse(base) {
                Some(reg) => IndexBase::Register(reg),
                None => IndexBase::Variable(base.to_string()),
            };
            return Operand::Element {
                base,
                index: Box::new(Operand::parse_simple(index)),
            };
        }
        Operand::parse_simple(token)
    }

    /// Register, name or number; anything else is unresolved.
    fn parse_simple(token: &str) -> Operand {
        let token = token.trim();
        if let Some(reg) = Register::parse(token) {
            Operand::Register(reg)
        } else if let Some(n) = parse_number(token) {
            Operand::Scalar(n)
        } else if is_identifier(token) {
            Operand::Name(token.to_string())
        } else {
            Operand::Unresolved(token.to_string())
        }
    }
}

/// Split `name[expr]` into `name` and `expr`.
fn split_indexed(token: &str) -> Option<(&str, &str)> {
    let body = token.strip_suffix(']')?;
    let open = body.find('[')?;
    let base = body[..open].trim();
    if is_identifier(base) {
        Some((base, body[open + 1..].trim()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::RegClass;

    #[test]
    fn test_split_instruction() {
        let (op, args) = split_instruction("  MOVE I1, 5 ");
        assert_eq!(op, "MOVE");
        assert_eq!(args, vec!["I1", "5"]);

        let (op, args) = split_instruction("HALT");
        assert_eq!(op, "HALT");
        assert!(args.is_empty());
    }

    #[test]
    fn test_split_args_respects_brackets_and_quotes() {
        assert_eq!(
            split_args("v, [1, 2, 3], 4"),
            vec!["v", "[1, 2, 3]", "4"]
        );
        assert_eq!(split_args("\"a, b\", \"\\n\""), vec!["\"a, b\"", "\"\\n\""]);
        assert_eq!(split_args(" x ,y"), vec!["x", "y"]);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(Scalar::Int(42)));
        assert_eq!(parse_number("-3"), Some(Scalar::Int(-3)));
        assert_eq!(parse_number("2.5"), Some(Scalar::Float(2.5)));
        assert_eq!(parse_number(".5"), Some(Scalar::Float(0.5)));
        assert_eq!(parse_number("4.0"), Some(Scalar::Float(4.0)));
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("."), None);
        assert_eq!(parse_number("1e5"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_unquote_and_escapes() {
        assert_eq!(unquote("\"AB\""), Some("AB".to_string()));
        assert_eq!(unquote("\"a\\nb\\t\\\"\""), Some("a\nb\t\"".to_string()));
        assert_eq!(unquote("AB"), None);
        assert_eq!(unquote("\""), None);
    }

    #[test]
    fn test_operand_classification() {
        assert_eq!(
            Operand::parse("FF2"),
            Operand::Register(Register::new(RegClass::Float, 1))
        );
        assert_eq!(Operand::parse("count"), Operand::Name("count".to_string()));
        assert_eq!(Operand::parse("7"), Operand::Scalar(Scalar::Int(7)));
        assert_eq!(Operand::parse("\"hi\""), Operand::Str("hi".to_string()));
        assert_eq!(Operand::parse("a-b"), Operand::Unresolved("a-b".to_string()));
    }

    #[test]
    fn test_vector_literal() {
        let Operand::Vector(elements) = Operand::parse("[1 2.5, I1 x]") else {
            panic!("expected vector literal");
        };
        assert_eq!(
            elements,
            vec![
                Operand::Scalar(Scalar::Int(1)),
                Operand::Scalar(Scalar::Float(2.5)),
                Operand::Register(Register::new(RegClass::Int, 0)),
                Operand::Name("x".to_string()),
            ]
        );
        assert_eq!(Operand::parse("[]"), Operand::Vector(vec![]));
    }

    #[test]
    fn test_indexed_operand() {
        assert_eq!(
            Operand::parse("V1[I2]"),
            Operand::Element {
                base: IndexBase::Register(Register::new(RegClass::Vector, 0)),
                index: Box::new(Operand::Register(Register::new(RegClass::Int, 1))),
            }
        );
        assert_eq!(
            Operand::parse("data[3]"),
            Operand::Element {
                base: IndexBase::Variable("data".to_string()),
                index: Box::new(Operand::Scalar(Scalar::Int(3))),
            }
        );
    }
}
