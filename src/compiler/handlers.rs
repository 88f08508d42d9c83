//! Per-opcode handlers.

use std::io::Write;

use crate::vm::executor::combine;
use crate::vm::{
    ArithOp, Op, OperationExecutor, Origin, RegClass, Register, Resolved, Scalar, Value,
};

use super::interpreter::{Datum, Flow, Frame, Interpreter, VarType};
use super::operand::{parse_number, unquote, IndexBase, Operand};

fn output_error(e: std::io::Error) -> String {
    format!("Output error: {}", e)
}

impl Interpreter {
    pub(super) fn dispatch(&mut self, op: Op, args: &[String]) -> Result<Flow, String> {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
        match op {
            Op::Move => self.exec_move(arg(0), arg(1))?,
            Op::Add => self.exec_arith(ArithOp::Add, arg(0), arg(1))?,
            Op::Sub => self.exec_arith(ArithOp::Sub, arg(0), arg(1))?,
            Op::Mul => self.exec_arith(ArithOp::Mul, arg(0), arg(1))?,
            Op::Div => self.exec_arith(ArithOp::Div, arg(0), arg(1))?,
            Op::Mod => self.exec_arith(ArithOp::Mod, arg(0), arg(1))?,
            Op::Dot => self.exec_dot(arg(0), arg(1), arg(2))?,
            Op::Mag => self.exec_mag(arg(0), arg(1))?,
            Op::Norm => self.exec_norm(arg(0))?,
            Op::Store => self.exec_store(arg(0), arg(1))?,
            Op::LoadM => self.exec_loadm(arg(0), arg(1))?,
            Op::Var => self.exec_var(arg(0), arg(1), args.get(2).map(String::as_str))?,
            Op::Input => self.exec_input(arg(0), args.get(1).map(String::as_str))?,
            Op::Push => self.exec_push(arg(0))?,
            Op::Pop => self.exec_pop(arg(0))?,
            Op::Print => {
                let end = args.get(1).map(|e| unquote(e).unwrap_or_else(|| e.clone()));
                self.exec_print(arg(0), end.as_deref())?
            }
            Op::PrintF => self.exec_print(arg(0), Some("\n"))?,
            Op::Text => self.exec_text(arg(0))?,
            Op::Jmp => return self.jump_target(arg(0)).map(Flow::Jump),
            Op::Jz | Op::Jnz | Op::Jg | Op::Jge | Op::Jl | Op::Jle => {
                return self.exec_conditional_jump(op, arg(0), arg(1));
            }
            Op::Call => return self.exec_call(arg(0)),
            Op::Return => return Ok(self.exec_return()),
            Op::Halt => return self.exec_halt(args.first().map(String::as_str)),
        }
        Ok(Flow::Next)
    }

    // ---- data movement ----

    /// Write a resolved value into a register, variable or element.
    fn assign(&mut self, dst: &str, datum: Datum) -> Result<(), String> {
        match Operand::parse(dst) {
            Operand::Register(reg) => match datum {
                Datum::Number(value) => OperationExecutor::new(&mut self.cpu).move_value(reg, &value),
                Datum::Text(_) => Err(format!(
                    "Cannot move string value to {} due to type mismatch",
                    reg
                )),
            },
            Operand::Name(name) => self.assign_variable(&name, &datum),
            Operand::Element { base, index } => {
                let value = element_value(&datum)?;
                self.write_element(&base, &index, value)
            }
            _ => Err(format!("Invalid destination '{}'", dst)),
        }
    }

    fn exec_move(&mut self, dst: &str, src: &str) -> Result<(), String> {
        let datum = self.resolve(src)?;
        self.assign(dst, datum)
    }

    fn exec_var(&mut self, name: &str, data: &str, buffer: Option<&str>) -> Result<(), String> {
        // bare tokens that name nothing are string data
        let datum = match Operand::parse(data) {
            Operand::Name(token) if self.variable(&token).is_none() => Datum::Text(token),
            Operand::Unresolved(token) => Datum::Text(token),
            operand => self.resolve_operand(&operand)?,
        };
        let buffer = match buffer {
            Some(token) => {
                let size = self.integer(token, "Buffer size")?;
                Some(usize::try_from(size).map_err(|_| format!("Invalid buffer size {}", size))?)
            }
            None => None,
        };
        self.define_variable(name, &datum, buffer)
    }

    fn exec_input(&mut self, key: &str, prompt: Option<&str>) -> Result<(), String> {
        if let Some(prompt) = prompt {
            let text = unquote(prompt).unwrap_or_else(|| prompt.to_string());
            write!(self.output, "{}", text).map_err(output_error)?;
        }
        self.output.flush().map_err(output_error)?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|e| format!("Input error: {}", e))?;
        if read == 0 {
            return Err(format!("Unexpected end of input while reading '{}'", key));
        }
        let line = line.trim_end_matches(['\n', '\r']);
        let datum = match parse_number(line.trim()) {
            Some(n) => Datum::Number(Resolved::literal(n.into())),
            None => Datum::Text(line.to_string()),
        };
        self.assign(key, datum)
    }

    fn exec_push(&mut self, key: &str) -> Result<(), String> {
        let value = match self.resolve(key)? {
            Datum::Number(r) => r.value.as_scalar().ok_or_else(|| {
                format!("Cannot push vector value '{}'; only scalars fit on the stack", key)
            })?,
            Datum::Text(_) => return Err(format!("Cannot push string value '{}'", key)),
        };
        if self.stack.len() >= self.config.stack_size {
            return Err(format!("Stack overflow (capacity {})", self.config.stack_size));
        }
        self.stack.push(value);
        Ok(())
    }

    fn exec_pop(&mut self, key: &str) -> Result<(), String> {
        let value = self.stack.pop().ok_or_else(|| "Stack underflow".to_string())?;
        self.assign(key, Datum::Number(Resolved::new(value.into(), Origin::Memory)))
    }

    // ---- arithmetic ----

    fn exec_arith(&mut self, op: ArithOp, dst: &str, src: &str) -> Result<(), String> {
        let rhs = self.number(src)?;
        match Operand::parse(dst) {
            Operand::Register(reg) => OperationExecutor::new(&mut self.cpu).arith(op, reg, &rhs),
            Operand::Name(name) => {
                let var = self.lookup(&name)?;
                let class = match var.ty {
                    VarType::Int => RegClass::Int,
                    VarType::Float => RegClass::Float,
                    VarType::Vector => RegClass::Vector,
                    VarType::Str => {
                        return Err(format!(
                            "Cannot perform {} on string variable '{}'",
                            op.noun(),
                            name
                        ));
                    }
                };
                let current = self.number(&name)?;
                let result = combine(op, class, &current.value, &rhs)?;
                self.assign_variable(&name, &Datum::Number(Resolved::literal(result)))
            }
            Operand::Element { base, index } => {
                let current = self.read_element(&base, &index)?;
                let class = if current.is_int() { RegClass::Int } else { RegClass::Float };
                let result = combine(op, class, &current.into(), &rhs)?;
                let value = result
                    .as_scalar()
                    .ok_or_else(|| "Cannot store a vector in a single element".to_string())?;
                self.write_element(&base, &index, value)
            }
            _ => Err(format!("Invalid destination '{}'", dst)),
        }
    }

    fn exec_dot(&mut self, dst: &str, a: &str, b: &str) -> Result<(), String> {
        let dst = self.register(dst)?;
        let a = self.vector(a)?;
        let b = self.vector(b)?;
        OperationExecutor::new(&mut self.cpu).dot_product(dst, &a, &b)
    }

    fn exec_mag(&mut self, dst: &str, v: &str) -> Result<(), String> {
        let dst = self.register(dst)?;
        let v = self.vector(v)?;
        OperationExecutor::new(&mut self.cpu).magnitude(dst, &v)
    }

    fn exec_norm(&mut self, reg: &str) -> Result<(), String> {
        let reg = self.register(reg)?;
        OperationExecutor::new(&mut self.cpu).normalize(reg)
    }

    fn register(&self, token: &str) -> Result<Register, String> {
        Register::parse(token).ok_or_else(|| format!("Expected a register, got '{}'", token))
    }

    fn vector(&self, token: &str) -> Result<Vec<f64>, String> {
        match self.number(token)?.value {
            Value::Vector(v) => Ok(v),
            other => Err(format!(
                "Expected a vector operand, got {} '{}'",
                other.type_name(),
                token
            )),
        }
    }

    // ---- memory ----

    /// A memory address: an integer literal, register or variable.
    fn address(&self, token: &str) -> Result<usize, String> {
        let addr = self.integer(token, "Memory address")?;
        usize::try_from(addr).map_err(|_| format!("Memory address {} out of range", addr))
    }

    fn exec_store(&mut self, src: &str, addr: &str) -> Result<(), String> {
        let addr = self.address(addr)?;
        match Operand::parse(src) {
            Operand::Register(reg) => OperationExecutor::new(&mut self.cpu).store(reg, addr),
            Operand::Element {
                base: base @ IndexBase::Register(_),
                index,
            } => {
                let value = self.read_element(&base, &index)?;
                self.cpu.write_memory(addr, value)
            }
            _ => Err(format!("STORE expects a register, got '{}'", src)),
        }
    }

    fn exec_loadm(&mut self, dst: &str, addr: &str) -> Result<(), String> {
        let addr = self.address(addr)?;
        match Operand::parse(dst) {
            Operand::Register(reg) => OperationExecutor::new(&mut self.cpu).load(reg, addr),
            _ => {
                let value = self.cpu.read_memory(addr)?;
                self.assign(dst, Datum::Number(Resolved::new(value.into(), Origin::Memory)))
            }
        }
    }

    // ---- output ----

    fn exec_print(&mut self, key: &str, end: Option<&str>) -> Result<(), String> {
        match Operand::parse(key) {
            Operand::Register(reg) => {
                OperationExecutor::new(&mut self.cpu)
                    .print(reg, &mut self.output)
                    .map_err(output_error)?;
            }
            // unresolvable keys print as written
            Operand::Name(name) if self.variable(&name).is_none() => {
                write!(self.output, "{}", key).map_err(output_error)?;
            }
            Operand::Element {
                base: IndexBase::Variable(name),
                ..
            } if self.variable(&name).is_none() => {
                write!(self.output, "{}", key).map_err(output_error)?;
            }
            Operand::Unresolved(_) => {
                write!(self.output, "{}", key).map_err(output_error)?;
            }
            operand => {
                let text = match self.resolve_operand(&operand)? {
                    Datum::Number(r) => r.value.to_string(),
                    Datum::Text(s) => s,
                };
                write!(self.output, "{}", text).map_err(output_error)?;
            }
        }
        if let Some(end) = end {
            write!(self.output, "{}", end).map_err(output_error)?;
        }
        Ok(())
    }

    fn exec_text(&mut self, key: &str) -> Result<(), String> {
        let code = self.integer(key, "Character code")?;
        let c = u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| format!("Invalid character code {}", code))?;
        write!(self.output, "{}", c).map_err(output_error)
    }

    // ---- control flow ----

    /// Resolve a jump target to the statement index where execution resumes.
    fn jump_target(&self, token: &str) -> Result<usize, String> {
        if let Some(index) = self.program.labels.get(token) {
            return Ok(*index);
        }
        match Operand::parse(token) {
            Operand::Scalar(Scalar::Int(n)) => usize::try_from(n)
                .ok()
                .and_then(|n| self.program.statement_index(n))
                .ok_or_else(|| format!("Jump target {} does not name a statement", n)),
            Operand::Name(label) => Err(format!("Undefined label '{}'", label)),
            _ => Err(format!("Invalid jump target '{}'", token)),
        }
    }

    fn exec_conditional_jump(&mut self, op: Op, reg: &str, target: &str) -> Result<Flow, String> {
        let value = match Register::parse(reg) {
            Some(r) if !r.is_vector() => self.cpu.read_register(r),
            _ => {
                return Err(format!(
                    "{} requires a scalar register, got '{}'",
                    op.mnemonic(),
                    reg
                ));
            }
        };
        let x = match value {
            Value::Int(n) => n as f64,
            Value::Float(f) => f,
            Value::Vector(_) => 0.0,
        };
        // the target is only looked up when the jump is taken
        if op.jump_condition(x) {
            self.jump_target(target).map(Flow::Jump)
        } else {
            Ok(Flow::Next)
        }
    }

    fn exec_call(&mut self, name: &str) -> Result<Flow, String> {
        let range = self
            .program
            .functions
            .get(name)
            .copied()
            .ok_or_else(|| format!("Function '{}' not found", name))?;
        if self.frames.len() >= self.config.max_call_depth {
            return Err(format!(
                "Maximum call depth of {} exceeded",
                self.config.max_call_depth
            ));
        }
        self.frames.push(Frame {
            name: name.to_string(),
            return_to: self.ip,
            end: range.end,
        });
        self.stats.calls += 1;
        self.stats.max_call_depth = self.stats.max_call_depth.max(self.frames.len());
        if self.config.trace {
            self.trace(&format!("call {} (depth {})", name, self.frames.len()));
        }
        Ok(Flow::Jump(range.start + 1))
    }

    fn exec_return(&mut self) -> Flow {
        if self.frames.is_empty() {
            self.warn("RETURN outside of a function, ignoring");
            return Flow::Next;
        }
        Flow::Jump(self.leave_function() + 1)
    }

    fn exec_halt(&mut self, code: Option<&str>) -> Result<Flow, String> {
        let code = match code {
            Some(token) => self.integer(token, "Exit code")?,
            None => 0,
        };
        Ok(Flow::Halt(code as i32))
    }
}

/// The scalar stored into a single element.
fn element_value(datum: &Datum) -> Result<Scalar, String> {
    match datum {
        Datum::Number(r) => r
            .value
            .as_scalar()
            .ok_or_else(|| "Cannot store a vector in a single element".to_string()),
        Datum::Text(s) => Err(format!("Cannot store string \"{}\" in a vector element", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Program;
    use crate::config::RuntimeConfig;
    use crate::vm::RuntimeError;

    fn run_with_input(source: &str, input: &str) -> (Result<i32, RuntimeError>, String, Interpreter) {
        let out = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        struct Sink(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);
        impl Write for Sink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut interp = Interpreter::with_io(
            Program::parse(source),
            &RuntimeConfig::default(),
            Box::new(Sink(out.clone())),
            Box::new(std::io::Cursor::new(input.as_bytes().to_vec())),
            Box::new(std::io::sink()),
        );
        let result = interp.run();
        let text = String::from_utf8(out.borrow().clone()).unwrap();
        (result, text, interp)
    }

    fn run(source: &str) -> (Result<i32, RuntimeError>, String) {
        let (result, out, _) = run_with_input(source, "");
        (result, out)
    }

    fn output(source: &str) -> String {
        let (result, out) = run(source);
        result.unwrap();
        out
    }

    fn fatal(source: &str) -> RuntimeError {
        run(source).0.unwrap_err()
    }

    #[test]
    fn test_string_and_vector_variables_print() {
        assert_eq!(output("VAR x, \"AB\";\nPRINT x;"), "AB");
        assert_eq!(output("VAR v, [1 2 3];\nPRINT v;"), "[1 2 3]");
        assert_eq!(output("VAR w, hello;\nPRINT w;"), "hello");
    }

    #[test]
    fn test_var_copies_register_and_variable() {
        assert_eq!(output("MOVE I2, 9;\nVAR a, I2;\nVAR b, a;\nPRINT b;"), "9");
        assert_eq!(output("VAR f, 2.5;\nPRINT f;"), "2.5");
    }

    #[test]
    fn test_var_buffer_too_small() {
        let err = fatal("VAR v, [1 2 3], 2;");
        assert!(err.message.contains("Buffer size 2 is smaller"));
    }

    #[test]
    fn test_print_end_argument_and_printf() {
        assert_eq!(output("PRINT 1, \" \";\nPRINT 2, \"\\n\";\nPRINTF 3;"), "1 2\n3\n");
        assert_eq!(output("PRINT nothing_here;"), "nothing_here");
        assert_eq!(output("MOVE FF1, 32;\nPRINT FF1;"), "32.0");
    }

    #[test]
    fn test_text_prints_character() {
        assert_eq!(output("MOVE I1, 72;\nTEXT I1;\nTEXT 105;"), "Hi");
        assert!(fatal("TEXT -1;").message.contains("Invalid character code"));
    }

    #[test]
    fn test_arithmetic_on_variables_and_elements() {
        assert_eq!(output("VAR n, 10;\nADD n, 5;\nPRINT n;"), "15");
        assert_eq!(output("VAR v, [1 2 3];\nMUL v, 2;\nPRINT v;"), "[2 4 6]");
        assert_eq!(output("MOVE V1, [1 2 3];\nADD V1[1], 0.5;\nPRINT V1;"), "[1 2.5 3]");
        assert_eq!(output("MOVE V1, [4 5 6];\nMOVE I1, 2;\nPRINT V1[I1];"), "6.0");
    }

    #[test]
    fn test_integer_float_register_mixing_is_fatal() {
        let err = fatal("MOVE FF1, 1.5;\nADD I1, FF1;");
        assert!(err.message.contains("between integer and floating point registers"));
        assert_eq!(err.statement, 2);
    }

    #[test]
    fn test_division_cases() {
        assert!(fatal("MOVE I1, 4;\nDIV I1, 0;").message.contains("Division by zero"));
        assert_eq!(
            output("MOVE V1, [10 20 30];\nDIV V1, [2 0 3];\nPRINT V1;"),
            "[5 0 10]"
        );
        assert_eq!(output("MOVE I1, -7;\nDIV I1, 2;\nPRINT I1;"), "-4");
        assert_eq!(output("MOVE I1, -7;\nMOD I1, 2;\nPRINT I1;"), "1");
    }

    #[test]
    fn test_integer_wraparound() {
        assert_eq!(output("MOVE I1, 2147483647;\nADD I1, 1;\nPRINT I1;"), "-2147483648");
    }

    #[test]
    fn test_index_errors() {
        assert!(fatal("MOVE V1, [1 2];\nPRINT V1[5];").message.contains("out of range"));
        assert!(fatal("PRINT I1[0];").message.contains("non-vector register"));
        assert!(fatal("MOVE FF1, 1.0;\nPRINT V1[FF1];").message.contains("integer register"));
    }

    #[test]
    fn test_vector_literal_bounds() {
        assert!(fatal("MOVE V1, [];").message.contains("between 1 and 32"));
        let long = vec!["1"; 33].join(" ");
        assert!(fatal(&format!("MOVE V1, [{}];", long)).message.contains("got 33"));
    }

    #[test]
    fn test_dot_mag_norm() {
        assert_eq!(
            output("MOVE V1, [1 2 3];\nMOVE V2, [4 5 6];\nDOT I1, V1, V2;\nDOT FF1, V1, V2;\nPRINT I1, \" \";\nPRINT FF1;"),
            "32 32.0"
        );
        assert_eq!(output("MOVE V1, [3 4];\nMAG FF2, V1;\nPRINT FF2;"), "5.0");
        assert!(fatal("MOVE V1, [0 0];\nNORM V1;").message.contains("zero vector"));
    }

    #[test]
    fn test_store_and_loadm() {
        assert_eq!(
            output("MOVE V1, [1 2 3];\nSTORE V1, 100;\nLOADM V2, 100;\nPRINT V2;"),
            "[1 2 3]"
        );
        assert_eq!(
            output("MOVE I1, 42;\nMOVE I2, 7;\nSTORE I1, I2;\nLOADM I3, 7;\nPRINT I3;"),
            "42"
        );
        assert!(fatal("STORE I1, 1000;").message.contains("out of range"));
        assert!(fatal("STORE I1, 2.5;").message.contains("must be an integer"));
    }

    #[test]
    fn test_push_pop_is_lifo() {
        let source = "MOVE I1, 1;\nMOVE I2, 2;\nMOVE I3, 3;\n\
            PUSH I1;\nPUSH I2;\nPUSH I3;\n\
            POP I4;\nPOP I5;\nPOP I6;\n\
            PRINT I4;\nPRINT I5;\nPRINT I6;";
        let (result, out, interp) = run_with_input(source, "");
        result.unwrap();
        assert_eq!(out, "321");
        assert_eq!(interp.stack_depth(), 0);
    }

    #[test]
    fn test_pop_into_variable_reinfers_type() {
        let (result, out, interp) =
            run_with_input("VAR x, 1;\nMOVE FF1, 2.5;\nPUSH FF1;\nPOP x;\nPRINT x;", "");
        result.unwrap();
        assert_eq!(out, "2.5");
        assert_eq!(interp.variable("x").unwrap().ty, VarType::Float);
    }

    #[test]
    fn test_stack_underflow_and_overflow() {
        assert_eq!(fatal("POP I1;").message, "Stack underflow");
        assert!(fatal("MOVE V1, [1];\nPUSH V1;").message.contains("vector"));
    }

    #[test]
    fn test_jumps() {
        let source = "MOVE I1, 3;\nloop: PRINT I1;\nSUB I1, 1;\nJG I1, loop;\nPRINTF \"\";";
        assert_eq!(output(source), "321\n");
        // source statement 4 is `PRINT 3`
        assert_eq!(output("JMP 4;\nPRINT 1;\nPRINT 2;\nPRINT 3;"), "3");
        assert!(fatal("JMP nowhere;").message.contains("Undefined label 'nowhere'"));
        assert!(fatal("JMP 99;").message.contains("does not name a statement"));
        assert!(fatal("JZ V1, 1;").message.contains("scalar register"));
    }

    #[test]
    fn test_undefined_function() {
        let err = fatal("CALL missing;");
        assert_eq!(err.message, "Function 'missing' not found");
    }

    #[test]
    fn test_return_outside_function_continues() {
        assert_eq!(output("RETURN;\nPRINT 1;"), "1");
    }

    #[test]
    fn test_input_numeric_and_string() {
        let (result, out, interp) = run_with_input(
            "INPUT I1, \"n? \";\nINPUT name;\nPRINT I1, \" \";\nPRINT name;",
            "41\nAda\n",
        );
        result.unwrap();
        assert_eq!(out, "n? 41 Ada");
        assert_eq!(interp.variable("name").unwrap().ty, VarType::Str);
    }

    #[test]
    fn test_input_end_of_stream_is_fatal() {
        let (result, _, _) = run_with_input("INPUT I1;", "");
        assert!(result.unwrap_err().message.contains("end of input"));
    }

    #[test]
    fn test_string_variables_cannot_be_indexed() {
        let err = fatal("VAR s, \"cat\";\nPRINT s[0];");
        assert_eq!(err.message, "Cannot index variable 's' of type string");
        assert!(fatal("VAR s, \"cat\";\nMOVE s[0], 98;").message.contains("Cannot index"));
        assert!(fatal("VAR n, 5;\nPRINT n[0];").message.contains("of type int"));
        assert!(fatal("VAR v, [1 2];\nMOVE v[0], \"b\";").message.contains("vector element"));
    }

    #[test]
    fn test_conditional_jump_target_resolved_only_when_taken() {
        // not taken: the undefined label is never looked up
        assert_eq!(output("MOVE I1, 1;\nJZ I1, typo;\nPRINT 1;"), "1");
        assert_eq!(output("JG I1, 99;\nPRINT 2;"), "2");
        // taken: the same target is fatal
        assert!(fatal("JZ I1, typo;").message.contains("Undefined label 'typo'"));
        assert!(fatal("JGE I1, 99;").message.contains("does not name a statement"));
    }

    #[test]
    fn test_print_undefined_indexed_name_prints_token() {
        assert_eq!(output("PRINT foo[0];"), "foo[0]");
        assert_eq!(output("PRINTF ghost[I1];"), "ghost[I1]\n");
    }
}
