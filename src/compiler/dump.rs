//! Pretty-printer for preprocessed programs.
//!
//! Used by `--dump-program` to show what the preprocessing pass produced:
//! the statement slots, the label table and the function ranges.

use crate::compiler::preprocess::Program;

/// Tree printer for a [`Program`].
pub struct ProgramPrinter {
    output: String,
}

impl Default for ProgramPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramPrinter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
        }
    }

    pub fn print_program(mut self, program: &Program) -> String {
        self.writeln(&format!("Program ({} statements)", program.len()));

        self.writeln("├── Statements");
        for (i, statement) in program.statements.iter().enumerate() {
            let branch = if i + 1 == program.len() { "└── " } else { "├── " };
            let text = if statement.text.is_empty() {
                "<blank>"
            } else {
                statement.text.as_str()
            };
            self.writeln(&format!("│   {}[{}] #{} {}", branch, i, statement.number, text));
        }

        self.writeln("├── Labels");
        let labels = program.labels.len();
        for (i, (name, index)) in program.labels.iter().enumerate() {
            let branch = if i + 1 == labels { "└── " } else { "├── " };
            self.writeln(&format!("│   {}{} -> {}", branch, name, index));
        }

        self.writeln("└── Functions");
        let functions = program.functions.len();
        for (i, (name, range)) in program.functions.iter().enumerate() {
            let branch = if i + 1 == functions { "└── " } else { "├── " };
            self.writeln(&format!("    {}{} [{}..={}]", branch, name, range.start, range.end));
        }

        self.output
    }

    fn writeln(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
    }
}

/// Human-readable tree form.
pub fn format_program(program: &Program) -> String {
    ProgramPrinter::new().print_program(program)
}

/// JSON form.
pub fn format_program_json(program: &Program) -> Result<String, String> {
    serde_json::to_string_pretty(program).map_err(|e| format!("failed to serialize program: {}", e))
}
