//! Register arithmetic and data primitives on top of [`CpuState`].
//!
//! The class rules live here:
//! - integer and floating point registers never mix
//! - vector and non-vector registers never mix
//! - vector/vector operations are elementwise and need equal lengths
//! - a non-register scalar (literal, variable, element) broadcasts over a vector
//! - the destination class decides whether a result is rounded to an integer

use std::io::{self, Write};

use crate::vm::cpu::{CpuState, MAX_VECTOR_LEN, RegClass, Register};
use crate::vm::{Scalar, Value};

/// Arithmetic operator of ADD/SUB/MUL/DIV/MOD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    /// Noun used in diagnostics ("Cannot perform addition between ...").
    pub fn noun(&self) -> &'static str {
        match self {
            ArithOp::Add => "addition",
            ArithOp::Sub => "subtraction",
            ArithOp::Mul => "multiplication",
            ArithOp::Div => "division",
            ArithOp::Mod => "modulo",
        }
    }

    fn zero_divisor_error(&self) -> String {
        match self {
            ArithOp::Mod => "Modulo by zero".to_string(),
            _ => "Division by zero".to_string(),
        }
    }

    pub fn apply_int(&self, a: i64, b: i64) -> Result<i64, String> {
        match self {
            ArithOp::Add => Ok(a.wrapping_add(b)),
            ArithOp::Sub => Ok(a.wrapping_sub(b)),
            ArithOp::Mul => Ok(a.wrapping_mul(b)),
            ArithOp::Div => {
                if b == 0 {
                    return Err(self.zero_divisor_error());
                }
                Ok(floor_div(a, b))
            }
            ArithOp::Mod => {
                if b == 0 {
                    return Err(self.zero_divisor_error());
                }
                Ok(a.wrapping_sub(floor_div(a, b).wrapping_mul(b)))
            }
        }
    }

    pub fn apply_float(&self, a: f64, b: f64) -> Result<f64, String> {
        match self {
            ArithOp::Add => Ok(a + b),
            ArithOp::Sub => Ok(a - b),
            ArithOp::Mul => Ok(a * b),
            ArithOp::Div => {
                if b == 0.0 {
                    return Err(self.zero_divisor_error());
                }
                Ok(a / b)
            }
            ArithOp::Mod => {
                if b == 0.0 {
                    return Err(self.zero_divisor_error());
                }
                Ok(floor_mod(a, b))
            }
        }
    }

    /// Elementwise vector/vector step. Division by a zero component yields 0.
    fn apply_element(&self, a: f64, b: f64) -> Result<f64, String> {
        match self {
            ArithOp::Div if b == 0.0 => Ok(0.0),
            _ => self.apply_float(a, b),
        }
    }
}

/// Integer division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Float remainder carrying the divisor's sign.
fn floor_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
}

/// Where an operand's value came from. Register operands follow the strict
/// class rules; everything else is a resolved scalar or vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Register(RegClass),
    /// A variable or an indexed element
    Memory,
    Literal,
}

/// A fully resolved operand value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: Value,
    pub origin: Origin,
}

impl Resolved {
    pub fn new(value: Value, origin: Origin) -> Self {
        Self { value, origin }
    }

    pub fn literal(value: Value) -> Self {
        Self::new(value, Origin::Literal)
    }

    fn is_register(&self) -> bool {
        matches!(self.origin, Origin::Register(_))
    }
}

/// Combine a destination value of class `class` with a source operand.
pub fn combine(
    op: ArithOp,
    class: RegClass,
    lhs: &Value,
    rhs: &Resolved,
) -> Result<Value, String> {
    match (class, lhs) {
        (RegClass::Int, Value::Int(a)) => {
            let b = int_operand(rhs, op.noun())?;
            // register/register division rounds the true quotient half to even
            if op == ArithOp::Div && rhs.origin == Origin::Register(RegClass::Int) {
                if b == 0 {
                    return Err(op.zero_divisor_error());
                }
                return Ok(Value::Int((*a as f64 / b as f64).round_ties_even() as i64));
            }
            Ok(Value::Int(op.apply_int(*a, b)?))
        }
        (RegClass::Float, Value::Float(a)) => {
            let b = float_operand(rhs, op.noun())?;
            Ok(Value::Float(op.apply_float(*a, b)?))
        }
        (RegClass::Vector, Value::Vector(xs)) => {
            let b = match &rhs.value {
                Value::Vector(ys) => {
                    if xs.len() != ys.len() {
                        return Err(format!(
                            "Vector size mismatch: {} != {}",
                            xs.len(),
                            ys.len()
                        ));
                    }
                    let result = xs
                        .iter()
                        .zip(ys)
                        .map(|(x, y)| op.apply_element(*x, *y))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(Value::Vector(result));
                }
                _ if rhs.is_register() => {
                    return Err(format!(
                        "Cannot perform {} between vector and non-vector registers",
                        op.noun()
                    ));
                }
                Value::Int(n) => *n as f64,
                Value::Float(f) => *f,
            };
            // scalar broadcast
            let result = xs
                .iter()
                .map(|x| op.apply_float(*x, b))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Vector(result))
        }
        _ => Err(format!(
            "Destination holds a {} value but is used as {}",
            lhs.type_name(),
            class.describe()
        )),
    }
}

/// Coerce a source operand for an integer destination.
fn int_operand(rhs: &Resolved, action: &str) -> Result<i64, String> {
    match (&rhs.value, rhs.origin) {
        (Value::Int(n), _) => Ok(*n),
        (Value::Float(f), Origin::Literal) if f.fract() == 0.0 => Ok(*f as i64),
        (Value::Float(_), Origin::Register(_)) => Err(format!(
            "Cannot perform {} between integer and floating point registers",
            action
        )),
        (Value::Float(f), Origin::Literal) => Err(format!(
            "Cannot use floating point literal {} with an integer destination",
            f
        )),
        (Value::Float(_), Origin::Memory) => Err(format!(
            "Cannot perform {} between an integer destination and a float value",
            action
        )),
        (Value::Vector(_), _) => Err(format!(
            "Cannot perform {} between vector and non-vector operands",
            action
        )),
    }
}

/// Coerce a source operand for a floating point destination.
fn float_operand(rhs: &Resolved, action: &str) -> Result<f64, String> {
    match (&rhs.value, rhs.origin) {
        (Value::Int(_), Origin::Register(_)) => Err(format!(
            "Cannot perform {} between integer and floating point registers",
            action
        )),
        (Value::Int(n), _) => Ok(*n as f64),
        (Value::Float(f), _) => Ok(*f),
        (Value::Vector(_), _) => Err(format!(
            "Cannot perform {} between vector and non-vector operands",
            action
        )),
    }
}

/// Convert a source operand into a value storable in a register of `class`.
pub fn coerce(class: RegClass, src: &Resolved, dst_name: &str) -> Result<Value, String> {
    match class {
        RegClass::Int => match (&src.value, src.origin) {
            (Value::Int(n), _) => Ok(Value::Int(*n)),
            (Value::Float(f), Origin::Literal) if f.fract() == 0.0 => Ok(Value::Int(*f as i64)),
            (Value::Float(f), Origin::Literal) => Err(format!(
                "Cannot move floating point literal {} to {} due to type mismatch",
                f, dst_name
            )),
            (value, _) => Err(format!(
                "Cannot move {} value to {} due to type mismatch",
                value.type_name(),
                dst_name
            )),
        },
        RegClass::Float => match (&src.value, src.origin) {
            (Value::Int(_), Origin::Register(_)) => Err(format!(
                "Cannot move integer register to {} due to type mismatch",
                dst_name
            )),
            (Value::Int(n), _) => Ok(Value::Float(*n as f64)),
            (Value::Float(f), _) => Ok(Value::Float(*f)),
            (Value::Vector(_), _) => Err(format!(
                "Cannot move vector value to {} due to type mismatch",
                dst_name
            )),
        },
        RegClass::Vector => match &src.value {
            Value::Vector(v) => Ok(Value::Vector(v.clone())),
            other => Err(format!(
                "Expected vector value for {}, got {}",
                dst_name,
                other.type_name()
            )),
        },
    }
}

/// Round a scalar result for its destination class.
fn scalar_result(class: RegClass, value: f64, what: &str) -> Result<Value, String> {
    match class {
        RegClass::Int => Ok(Value::Int(value.round_ties_even() as i64)),
        RegClass::Float => Ok(Value::Float(value)),
        RegClass::Vector => Err(format!(
            "{} result must be written to a scalar register",
            what
        )),
    }
}

fn dot(a: &[f64], b: &[f64]) -> Result<f64, String> {
    if a.len() != b.len() {
        return Err(format!(
            "Vectors must have the same length for dot product ({} != {})",
            a.len(),
            b.len()
        ));
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

fn magnitude_of(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Executes primitives against a borrowed CPU.
pub struct OperationExecutor<'a> {
    cpu: &'a mut CpuState,
}

impl<'a> OperationExecutor<'a> {
    pub fn new(cpu: &'a mut CpuState) -> Self {
        Self { cpu }
    }

    /// `dst = dst <op> src`, in place.
    pub fn arith(&mut self, op: ArithOp, dst: Register, src: &Resolved) -> Result<(), String> {
        let current = self.cpu.read_register(dst);
        let result = combine(op, dst.class, &current, src)?;
        self.cpu.write_register(dst, result)
    }

    /// Dot product of two vectors, written to scalar register `dst`.
    pub fn dot_product(&mut self, dst: Register, a: &[f64], b: &[f64]) -> Result<(), String> {
        let sum = dot(a, b)?;
        let value = scalar_result(dst.class, sum, "Dot product")?;
        self.cpu.write_register(dst, value)
    }

    /// Euclidean norm of `v`, written to scalar register `dst`.
    pub fn magnitude(&mut self, dst: Register, v: &[f64]) -> Result<(), String> {
        let value = scalar_result(dst.class, magnitude_of(v), "Magnitude")?;
        self.cpu.write_register(dst, value)
    }

    /// Scale vector register `reg` to unit length.
    pub fn normalize(&mut self, reg: Register) -> Result<(), String> {
        let Value::Vector(v) = self.cpu.read_register(reg) else {
            return Err("Normalization can only be performed on vector registers.".to_string());
        };
        let mag = magnitude_of(&v);
        if mag == 0.0 {
            return Err("Cannot normalize a zero vector.".to_string());
        }
        let normalized = v.iter().map(|x| x / mag).collect();
        self.cpu.write_register(reg, Value::Vector(normalized))
    }

    /// Copy a resolved operand into `dst`, applying the class rules.
    pub fn move_value(&mut self, dst: Register, src: &Resolved) -> Result<(), String> {
        let value = coerce(dst.class, src, &dst.to_string())?;
        self.cpu.write_register(dst, value)
    }

    /// Write a register to memory at `addr`.
    ///
    /// Vectors are written as a length-prefixed run: the length at `addr`,
    /// elements after it. The whole run is bounds-checked first.
    pub fn store(&mut self, reg: Register, addr: usize) -> Result<(), String> {
        match self.cpu.read_register(reg) {
            Value::Vector(v) => {
                self.cpu.check_range(addr, v.len() + 1)?;
                self.cpu.write_memory(addr, Scalar::Int(v.len() as i64))?;
                for (i, x) in v.iter().enumerate() {
                    self.cpu.write_memory(addr + 1 + i, Scalar::Float(*x))?;
                }
                Ok(())
            }
            Value::Int(n) => self.cpu.write_memory(addr, Scalar::Int(n)),
            Value::Float(f) => self.cpu.write_memory(addr, Scalar::Float(f)),
        }
    }

    /// Inverse of [`store`](Self::store).
    pub fn load(&mut self, reg: Register, addr: usize) -> Result<(), String> {
        if !reg.is_vector() {
            let value = self.cpu.read_memory(addr)?;
            return self.cpu.write_register(reg, value.into());
        }
        let len = self.cpu.read_memory(addr)?.as_i64();
        if !(1..=MAX_VECTOR_LEN as i64).contains(&len) {
            return Err(format!("Invalid vector length {} at address {}", len, addr));
        }
        let len = len as usize;
        self.cpu.check_range(addr + 1, len)?;
        let v = (0..len)
            .map(|i| self.cpu.read_memory(addr + 1 + i).map(|s| s.as_f64()))
            .collect::<Result<Vec<_>, _>>()?;
        self.cpu.write_register(reg, Value::Vector(v))
    }

    /// Write a register's current value to `out`.
    pub fn print(&self, reg: Register, out: &mut dyn Write) -> io::Result<()> {
        write!(out, "{}", self.cpu.read_register(reg))
    }
}
