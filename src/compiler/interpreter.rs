//! The interpreter: program state, operand resolution and the execution loop.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use crate::config::RuntimeConfig;
use crate::vm::{
    CpuState, MAX_VECTOR_LEN, Op, Origin, Register, Resolved, RuntimeError, Scalar, Value,
};

use super::operand::{split_instruction, IndexBase, Operand};
use super::preprocess::{def_name, is_identifier, Program};

/// Type tag of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Int,
    Float,
    Vector,
    Str,
}

impl VarType {
    pub fn name(&self) -> &'static str {
        match self {
            VarType::Int => "int",
            VarType::Float => "float",
            VarType::Vector => "vector",
            VarType::Str => "string",
        }
    }
}

/// A named, memory-backed binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    /// First memory slot
    pub head: usize,
    /// Slots currently in use
    pub len: usize,
    /// Slots reserved at `head`
    pub capacity: usize,
    pub ty: VarType,
}

/// A resolved operand: a number (scalar or vector) or a string.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Number(Resolved),
    Text(String),
}

impl Datum {
    /// Memory layout of this value when bound to a variable.
    fn slots(&self) -> (VarType, Vec<Scalar>) {
        match self {
            Datum::Number(r) => match &r.value {
                Value::Int(n) => (VarType::Int, vec![Scalar::Int(*n)]),
                Value::Float(f) => (VarType::Float, vec![Scalar::Float(*f)]),
                Value::Vector(v) => (
                    VarType::Vector,
                    v.iter().map(|x| Scalar::Float(*x)).collect(),
                ),
            },
            Datum::Text(s) => (
                VarType::Str,
                s.chars().map(|c| Scalar::Int(c as i64)).collect(),
            ),
        }
    }
}

/// What the loop does after a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Flow {
    Next,
    Jump(usize),
    Halt(i32),
}

/// Execution counters reported by `--stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStats {
    pub steps: u64,
    pub calls: u64,
    pub max_call_depth: usize,
}

/// An active function call.
#[derive(Debug, Clone)]
pub(super) struct Frame {
    pub(super) name: String,
    /// Index of the CALL statement
    pub(super) return_to: usize,
    /// Last index of the function's range
    pub(super) end: usize,
}

/// Interprets a preprocessed program against a fresh CPU.
pub struct Interpreter {
    pub(super) program: Program,
    pub(super) cpu: CpuState,
    pub(super) variables: HashMap<String, Variable>,
    /// Next free memory slot for variable allocation
    pub(super) memory_cursor: usize,
    pub(super) stack: Vec<Scalar>,
    pub(super) frames: Vec<Frame>,
    pub(super) ip: usize,
    pub(super) config: RuntimeConfig,
    pub(super) stats: ExecStats,
    pub(super) output: Box<dyn Write>,
    pub(super) input: Box<dyn BufRead>,
    pub(super) diagnostics: Box<dyn Write>,
}

impl Interpreter {
    /// Create an interpreter wired to stdout, stdin and stderr.
    pub fn new(program: Program, config: &RuntimeConfig) -> Self {
        Self::with_io(
            program,
            config,
            Box::new(io::stdout()),
            Box::new(io::stdin().lock()),
            Box::new(io::stderr()),
        )
    }

    /// Create an interpreter with custom I/O channels.
    pub fn with_io(
        program: Program,
        config: &RuntimeConfig,
        output: Box<dyn Write>,
        input: Box<dyn BufRead>,
        diagnostics: Box<dyn Write>,
    ) -> Self {
        Self {
            program,
            cpu: CpuState::new(config.float_mode),
            variables: HashMap::new(),
            memory_cursor: 0,
            stack: Vec::new(),
            frames: Vec::new(),
            ip: 0,
            config: config.clone(),
            stats: ExecStats::default(),
            output,
            input,
            diagnostics,
        }
    }

    pub fn cpu(&self) -> &CpuState {
        &self.cpu
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn stats(&self) -> ExecStats {
        self.stats
    }

    /// Run the program to completion.
    ///
    /// Returns the exit status: the HALT code, or 0 when execution runs
    /// past the last statement.
    pub fn run(&mut self) -> Result<i32, RuntimeError> {
        let result = self.execute();
        let _ = self.output.flush();
        if self.config.stats {
            let _ = writeln!(
                self.diagnostics,
                "[STATS] steps: {}, calls: {}, max call depth: {}",
                self.stats.steps, self.stats.calls, self.stats.max_call_depth
            );
        }
        result
    }

    fn execute(&mut self) -> Result<i32, RuntimeError> {
        self.ip = 0;
        loop {
            if let Some(frame) = self.frames.last() {
                if self.ip > frame.end {
                    self.ip = self.leave_function() + 1;
                    continue;
                }
            }
            let Some(statement) = self.program.statements.get(self.ip).cloned() else {
                return Ok(0);
            };
            let flow = self
                .step(statement.number, &statement.text)
                .map_err(|message| RuntimeError::new(statement.number, message, &statement.text))?;
            match flow {
                Flow::Next => self.ip += 1,
                Flow::Jump(target) => self.ip = target,
                Flow::Halt(code) => return Ok(code),
            }
        }
    }

    /// Execute one statement.
    fn step(&mut self, number: usize, text: &str) -> Result<Flow, String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Flow::Next);
        }

        self.stats.steps += 1;
        if let Some(limit) = self.config.max_steps {
            if self.stats.steps > limit {
                return Err(format!("Step limit of {} exceeded", limit));
            }
        }
        if self.config.trace {
            self.trace(&format!("#{}: {}", number, text));
        }

        // definitions are never fallen into
        if def_name(text).is_some() {
            return Ok(match self.program.definition_at(self.ip) {
                Some(range) => Flow::Jump(range.end + 1),
                None => Flow::Next,
            });
        }

        let (mnemonic, args) = split_instruction(text);
        let Some(op) = Op::from_mnemonic(mnemonic) else {
            // only top-level statements are skipped with a warning
            if !self.frames.is_empty() {
                return Err(format!("Unknown instruction: {}", mnemonic));
            }
            self.warn(&format!("unknown instruction '{}', skipping", mnemonic));
            return Ok(Flow::Next);
        };
        op.check_arity(args.len())?;
        self.dispatch(op, &args)
    }

    /// Pop the active frame and return the index of its CALL statement.
    pub(super) fn leave_function(&mut self) -> usize {
        match self.frames.pop() {
            Some(frame) => {
                if self.config.trace {
                    self.trace(&format!("return from {}", frame.name));
                }
                frame.return_to
            }
            None => self.ip,
        }
    }

    pub(super) fn warn(&mut self, message: &str) {
        let _ = writeln!(self.diagnostics, "WARNING: {}", message);
    }

    pub(super) fn trace(&mut self, message: &str) {
        let _ = writeln!(self.diagnostics, "[TRACE] {}", message);
    }

    // ---- operand resolution ----

    /// Resolve an argument token to a value.
    pub(super) fn resolve(&self, token: &str) -> Result<Datum, String> {
        self.resolve_operand(&Operand::parse(token))
    }

    pub(super) fn resolve_operand(&self, operand: &Operand) -> Result<Datum, String> {
        match operand {
            Operand::Register(reg) => Ok(Datum::Number(Resolved::new(
                self.cpu.read_register(*reg),
                Origin::Register(reg.class),
            ))),
            Operand::Scalar(s) => Ok(Datum::Number(Resolved::literal((*s).into()))),
            Operand::Str(s) => Ok(Datum::Text(s.clone())),
            Operand::Vector(elements) => {
                let v = self.vector_literal(elements)?;
                Ok(Datum::Number(Resolved::literal(Value::Vector(v))))
            }
            Operand::Element { base, index } => {
                let value = self.read_element(base, index)?;
                Ok(Datum::Number(Resolved::new(value.into(), Origin::Memory)))
            }
            Operand::Name(name) => self.read_variable(name),
            Operand::Unresolved(token) => Err(format!("Cannot resolve operand '{}'", token)),
        }
    }

    /// Resolve a token that must produce a number.
    pub(super) fn number(&self, token: &str) -> Result<Resolved, String> {
        match self.resolve(token)? {
            Datum::Number(r) => Ok(r),
            Datum::Text(_) => Err(format!("Expected a numeric operand, got string '{}'", token)),
        }
    }

    /// Resolve a token that must produce an integer. Integral float
    /// literals are accepted.
    pub(super) fn integer(&self, token: &str, what: &str) -> Result<i64, String> {
        let r = self.number(token)?;
        match (r.value, r.origin) {
            (Value::Int(n), _) => Ok(n),
            (Value::Float(f), Origin::Literal) if f.fract() == 0.0 => Ok(f as i64),
            _ => Err(format!("{} must be an integer, got '{}'", what, token)),
        }
    }

    fn vector_literal(&self, elements: &[Operand]) -> Result<Vec<f64>, String> {
        if elements.is_empty() || elements.len() > MAX_VECTOR_LEN {
            return Err(format!(
                "Vector literal must have between 1 and {} elements, got {}",
                MAX_VECTOR_LEN,
                elements.len()
            ));
        }
        elements
            .iter()
            .map(|element| match self.resolve_operand(element)? {
                Datum::Number(Resolved {
                    value: Value::Int(n),
                    ..
                }) => Ok(n as f64),
                Datum::Number(Resolved {
                    value: Value::Float(f),
                    ..
                }) => Ok(f),
                _ => Err("Vector literal elements must be scalars".to_string()),
            })
            .collect()
    }

    pub(super) fn lookup(&self, name: &str) -> Result<Variable, String> {
        self.variables
            .get(name)
            .copied()
            .ok_or_else(|| format!("Cannot resolve operand '{}'", name))
    }

    /// Read a variable's current contents.
    pub(super) fn read_variable(&self, name: &str) -> Result<Datum, String> {
        let var = self.lookup(name)?;
        let slots = (var.head..var.head + var.len)
            .map(|addr| self.cpu.read_memory(addr))
            .collect::<Result<Vec<_>, _>>()?;
        let value = match var.ty {
            VarType::Int => Value::Int(slots.first().map_or(0, |s| s.as_i64())),
            VarType::Float => Value::Float(slots.first().map_or(0.0, |s| s.as_f64())),
            VarType::Vector => Value::Vector(slots.iter().map(|s| s.as_f64()).collect()),
            VarType::Str => {
                let text = slots
                    .iter()
                    .map(|s| char::from_u32(s.as_i64() as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect();
                return Ok(Datum::Text(text));
            }
        };
        Ok(Datum::Number(Resolved::new(value, Origin::Memory)))
    }

    /// Evaluate an index expression: an integer register, an integer
    /// variable or an integer literal.
    fn index_value(&self, index: &Operand) -> Result<usize, String> {
        let n = match index {
            Operand::Register(reg) => match self.cpu.read_register(*reg) {
                Value::Int(n) => n,
                _ => return Err(format!("Index register {} must be an integer register", reg)),
            },
            Operand::Name(name) => {
                let var = self.lookup(name)?;
                if var.ty != VarType::Int {
                    return Err(format!(
                        "Index variable '{}' must hold an integer, not a {}",
                        name,
                        var.ty.name()
                    ));
                }
                self.cpu.read_memory(var.head)?.as_i64()
            }
            Operand::Scalar(Scalar::Int(n)) => *n,
            Operand::Scalar(Scalar::Float(f)) => {
                return Err(format!("Index must be an integer, got {}", f));
            }
            Operand::Unresolved(token) => {
                return Err(format!("Invalid index expression '{}'", token));
            }
            _ => return Err("Invalid index expression".to_string()),
        };
        usize::try_from(n).map_err(|_| format!("Index {} out of range", n))
    }

    fn element_slot(&self, name: &str, idx: usize) -> Result<(Variable, usize), String> {
        let var = self.lookup(name)?;
        if var.ty != VarType::Vector {
            return Err(format!(
                "Cannot index variable '{}' of type {}",
                name,
                var.ty.name()
            ));
        }
        if idx >= var.len {
            return Err(format!(
                "Index {} out of range for '{}' (length {})",
                idx, name, var.len
            ));
        }
        Ok((var, var.head + idx))
    }

    pub(super) fn read_element(&self, base: &IndexBase, index: &Operand) -> Result<Scalar, String> {
        let idx = self.index_value(index)?;
        match base {
            IndexBase::Register(reg) => {
                let v = self.vector_register(*reg)?;
                v.get(idx).map(|x| Scalar::Float(*x)).ok_or_else(|| {
                    format!("Index {} out of range for {} (length {})", idx, reg, v.len())
                })
            }
            IndexBase::Variable(name) => {
                let (_, addr) = self.element_slot(name, idx)?;
                Ok(Scalar::Float(self.cpu.read_memory(addr)?.as_f64()))
            }
        }
    }

    pub(super) fn write_element(
        &mut self,
        base: &IndexBase,
        index: &Operand,
        value: Scalar,
    ) -> Result<(), String> {
        let idx = self.index_value(index)?;
        match base {
            IndexBase::Register(reg) => {
                let mut v = self.vector_register(*reg)?;
                let len = v.len();
                let slot = v.get_mut(idx).ok_or_else(|| {
                    format!("Index {} out of range for {} (length {})", idx, reg, len)
                })?;
                *slot = value.as_f64();
                self.cpu.write_register(*reg, Value::Vector(v))
            }
            IndexBase::Variable(name) => {
                let (_, addr) = self.element_slot(name, idx)?;
                self.cpu.write_memory(addr, Scalar::Float(value.as_f64()))
            }
        }
    }

    fn vector_register(&self, reg: Register) -> Result<Vec<f64>, String> {
        match self.cpu.read_register(reg) {
            Value::Vector(v) => Ok(v),
            _ => Err(format!("Cannot index non-vector register {}", reg)),
        }
    }

    // ---- variables ----

    /// Reserve `capacity` slots at the memory cursor.
    fn allocate(&mut self, name: &str, capacity: usize) -> Result<usize, String> {
        let head = self.memory_cursor;
        match head.checked_add(capacity) {
            Some(end) if end <= self.cpu.memory_size() => {
                self.memory_cursor = end;
                Ok(head)
            }
            _ => Err(format!(
                "Out of memory: cannot allocate {} slots for '{}' at address {}",
                capacity, name, head
            )),
        }
    }

    fn fill(&mut self, head: usize, slots: &[Scalar]) -> Result<(), String> {
        self.cpu.check_range(head, slots.len())?;
        for (i, slot) in slots.iter().enumerate() {
            self.cpu.write_memory(head + i, *slot)?;
        }
        Ok(())
    }

    /// Define (or redefine) a variable.
    ///
    /// A redefinition reuses the existing region when the new capacity fits,
    /// otherwise a fresh region is allocated.
    pub(super) fn define_variable(
        &mut self,
        name: &str,
        datum: &Datum,
        buffer: Option<usize>,
    ) -> Result<(), String> {
        if !is_identifier(name) || Register::parse(name).is_some() {
            return Err(format!("Invalid variable name '{}'", name));
        }
        let (ty, slots) = datum.slots();
        let capacity = match buffer {
            Some(0) => return Err(format!("Buffer size of '{}' must be positive", name)),
            Some(size) if size < slots.len() => {
                return Err(format!(
                    "Buffer size {} is smaller than the {} initial values of '{}'",
                    size,
                    slots.len(),
                    name
                ));
            }
            Some(size) => size,
            None => slots.len().max(1),
        };
        let head = match self.variables.get(name) {
            Some(existing) if capacity <= existing.capacity => existing.head,
            _ => self.allocate(name, capacity)?,
        };
        self.fill(head, &slots)?;
        self.variables.insert(
            name.to_string(),
            Variable {
                head,
                len: slots.len(),
                capacity,
                ty,
            },
        );
        Ok(())
    }

    /// Assign to a variable, defining it if needed. An existing variable
    /// keeps its region and may change type, but never grows.
    pub(super) fn assign_variable(&mut self, name: &str, datum: &Datum) -> Result<(), String> {
        let Some(var) = self.variables.get(name).copied() else {
            return self.define_variable(name, datum, None);
        };
        let (ty, slots) = datum.slots();
        if slots.len() > var.capacity {
            return Err(format!(
                "Buffer overflow: '{}' has room for {} values, got {}",
                name,
                var.capacity,
                slots.len()
            ));
        }
        self.fill(var.head, &slots)?;
        self.variables.insert(
            name.to_string(),
            Variable {
                len: slots.len(),
                ty,
                ..var
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A cloneable in-memory sink.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn interpreter(source: &str, config: &RuntimeConfig) -> (Interpreter, SharedBuf, SharedBuf) {
        let out = SharedBuf::default();
        let err = SharedBuf::default();
        let interp = Interpreter::with_io(
            Program::parse(source),
            config,
            Box::new(out.clone()),
            Box::new(io::empty()),
            Box::new(err.clone()),
        );
        (interp, out, err)
    }

    fn run(source: &str) -> (Result<i32, RuntimeError>, String, String) {
        let (mut interp, out, err) = interpreter(source, &RuntimeConfig::default());
        let result = interp.run();
        (result, out.contents(), err.contents())
    }

    #[test]
    fn test_normal_completion_returns_zero() {
        let (result, out, _) = run("MOVE I1, 5;\nPRINT I1;");
        assert_eq!(result.unwrap(), 0);
        assert_eq!(out, "5");
    }

    #[test]
    fn test_halt_code() {
        let (result, out, _) = run("PRINTF 1;\nHALT 3;\nPRINTF 2;");
        assert_eq!(result.unwrap(), 3);
        assert_eq!(out, "1\n");
    }

    #[test]
    fn test_unknown_opcode_warns_and_continues() {
        let (result, out, err) = run("FROB I1;\nPRINT 7;");
        assert_eq!(result.unwrap(), 0);
        assert_eq!(out, "7");
        assert!(err.contains("WARNING: unknown instruction 'FROB', skipping"));
    }

    #[test]
    fn test_unknown_opcode_inside_function_is_fatal() {
        let (result, out, err) = run("DEF f: FROB I1;\nRETURN;\nCALL f;\nPRINT 1;");
        let e = result.unwrap_err();
        assert_eq!(e.message, "Unknown instruction: FROB");
        assert_eq!(e.statement, 1);
        assert!(out.is_empty());
        assert!(!err.contains("WARNING"));
    }

    #[test]
    fn test_fatal_error_carries_statement() {
        let (result, _, _) = run("MOVE I1, 1;\nDIV I1, 0;");
        let err = result.unwrap_err();
        assert_eq!(err.statement, 2);
        assert_eq!(err.message, "Division by zero");
        assert_eq!(err.text, "DIV I1, 0");
    }

    #[test]
    fn test_definition_is_skipped_and_called() {
        let (result, out, _) = run("DEF hello: PRINTF \"hi\";\nRETURN;\nCALL hello;\nCALL hello;");
        assert_eq!(result.unwrap(), 0);
        assert_eq!(out, "hi\nhi\n");
    }

    #[test]
    fn test_recursion_uses_frame_stack() {
        let source = "MOVE I1, 3;\n\
            CALL down;\n\
            HALT 0;\n\
            DEF down:\n\
            PRINT I1;\n\
            SUB I1, 1;\n\
            JZ I1, out;\n\
            CALL down;\n\
            out: RETURN;";
        let (result, out, _) = run(source);
        assert_eq!(result.unwrap(), 0);
        assert_eq!(out, "321");
    }

    #[test]
    fn test_max_call_depth() {
        let config = RuntimeConfig {
            max_call_depth: 4,
            ..Default::default()
        };
        let (mut interp, _, _) = interpreter("DEF f: CALL f;\nRETURN;\nCALL f;", &config);
        let err = interp.run().unwrap_err();
        assert!(err.message.contains("Maximum call depth of 4 exceeded"));
    }

    #[test]
    fn test_max_steps() {
        let config = RuntimeConfig {
            max_steps: Some(10),
            ..Default::default()
        };
        let (mut interp, _, _) = interpreter("top: JMP top;", &config);
        let err = interp.run().unwrap_err();
        assert_eq!(err.message, "Step limit of 10 exceeded");
    }

    #[test]
    fn test_trace_and_stats() {
        let config = RuntimeConfig {
            trace: true,
            stats: true,
            ..Default::default()
        };
        let (mut interp, _, err) = interpreter("DEF f: RETURN;\nCALL f;", &config);
        interp.run().unwrap();
        let err = err.contents();
        assert!(err.contains("[TRACE] #2: CALL f"));
        assert!(err.contains("[TRACE] call f (depth 1)"));
        assert!(err.contains("[TRACE] return from f"));
        assert!(err.contains("[STATS] steps: 3, calls: 1, max call depth: 1"));
    }

    #[test]
    fn test_variable_allocation_advances_cursor() {
        let (mut interp, _, _) = interpreter(
            "VAR a, 1;\nVAR s, \"hey\";\nVAR v, [1 2], 4;",
            &RuntimeConfig::default(),
        );
        interp.run().unwrap();
        assert_eq!(
            interp.variable("a"),
            Some(&Variable { head: 0, len: 1, capacity: 1, ty: VarType::Int })
        );
        assert_eq!(
            interp.variable("s"),
            Some(&Variable { head: 1, len: 3, capacity: 3, ty: VarType::Str })
        );
        assert_eq!(
            interp.variable("v"),
            Some(&Variable { head: 4, len: 2, capacity: 4, ty: VarType::Vector })
        );
        assert_eq!(interp.cpu().read_memory(1).unwrap(), Scalar::Int('h' as i64));
    }

    #[test]
    fn test_redefinition_reuses_region_when_it_fits() {
        let (mut interp, _, _) = interpreter(
            "VAR s, \"abc\";\nVAR s, 5;\nVAR t, 1;\nVAR s, [1 2 3 4];",
            &RuntimeConfig::default(),
        );
        interp.run().unwrap();
        // "abc" -> 5 reuses head 0; t lands at 3; the 4-vector needs a new region
        assert_eq!(interp.variable("t").unwrap().head, 3);
        let s = interp.variable("s").unwrap();
        assert_eq!((s.head, s.len, s.ty), (4, 4, VarType::Vector));
    }

    #[test]
    fn test_move_cannot_grow_variable() {
        let (result, _, _) = run("VAR x, 1;\nMOVE x, [1 2 3];");
        assert!(result.unwrap_err().message.contains("Buffer overflow"));
    }

    #[test]
    fn test_out_of_memory() {
        let (result, _, _) = run("VAR a, 0, 999;\nVAR b, 1, 2;");
        assert!(result.unwrap_err().message.contains("Out of memory"));
    }
}
