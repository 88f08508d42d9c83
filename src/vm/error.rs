use std::fmt;

/// A fatal runtime error with the context of the statement that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    /// 1-based source statement number
    pub statement: usize,
    pub message: String,
    /// Text of the offending statement
    pub text: String,
}

impl RuntimeError {
    pub fn new(statement: usize, message: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            statement,
            message: message.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fatal error at statement {}: {}\n  ====> {}",
            self.statement, self.message, self.text
        )
    }
}

impl std::error::Error for RuntimeError {}
