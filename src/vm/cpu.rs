//! Register banks and flat memory of the emulated CPU.

use std::fmt;

use crate::config::FloatMode;
use crate::vm::{Scalar, Value};

/// Registers per class (I1-I6, FF1-FF6, V1-V6).
pub const REGISTERS_PER_CLASS: usize = 6;
/// Number of memory slots.
pub const MEMORY_SIZE: usize = 1000;
/// Default length of a freshly constructed vector register.
pub const DEFAULT_VECTOR_LEN: usize = 8;
/// Vector lengths are constrained to `1..=MAX_VECTOR_LEN`.
pub const MAX_VECTOR_LEN: usize = 32;

/// Register class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    Int,
    Float,
    Vector,
}

impl RegClass {
    fn prefix(&self) -> &'static str {
        match self {
            RegClass::Int => "I",
            RegClass::Float => "FF",
            RegClass::Vector => "V",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            RegClass::Int => "integer",
            RegClass::Float => "floating point",
            RegClass::Vector => "vector",
        }
    }
}

/// A fixed-identity register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub class: RegClass,
    /// Zero-based slot (`I1` is index 0)
    pub index: usize,
}

impl Register {
    pub fn new(class: RegClass, index: usize) -> Self {
        Self { class, index }
    }

    /// Parse a register name such as `I3`, `FF1` or `V6`.
    pub fn parse(name: &str) -> Option<Self> {
        let (class, digits) = if let Some(rest) = name.strip_prefix("FF") {
            (RegClass::Float, rest)
        } else if let Some(rest) = name.strip_prefix('I') {
            (RegClass::Int, rest)
        } else if let Some(rest) = name.strip_prefix('V') {
            (RegClass::Vector, rest)
        } else {
            return None;
        };
        if digits.len() != 1 {
            return None;
        }
        let n: usize = digits.parse().ok()?;
        if (1..=REGISTERS_PER_CLASS).contains(&n) {
            Some(Self::new(class, n - 1))
        } else {
            None
        }
    }

    pub fn is_vector(&self) -> bool {
        self.class == RegClass::Vector
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class.prefix(), self.index + 1)
    }
}

/// Wrap an integer into the signed 32-bit range.
pub fn wrap_i32(value: i64) -> i64 {
    let mut v = value.rem_euclid(1 << 32);
    if v >= 1 << 31 {
        v -= 1 << 32;
    }
    v
}

/// Reduce a float through a single-precision encode/decode round-trip.
pub fn quantize(value: f64, mode: FloatMode) -> f64 {
    match mode {
        FloatMode::Native => value as f32 as f64,
        FloatMode::Legacy => {
            let bits = (value as f32).to_bits();
            let sign = bits >> 31;
            let exponent = ((bits >> 23) & 0xff) as i32 - 127;
            let mantissa = bits & 0x7f_ffff;
            let exponent = if exponent == 0 { 1 - 127 } else { exponent };
            let magnitude = 2f64.powi(exponent) * (1.0 + mantissa as f64 / (1u32 << 23) as f64);
            if sign == 1 { -magnitude } else { magnitude }
        }
    }
}

/// Register banks and memory.
///
/// Every mutation re-applies the class normalization rules: integer
/// registers wrap to 32 bits, float registers are re-quantized. Callers
/// validate register identity and operand types before calling in; the
/// only rejections here are malformed vectors and out-of-range addresses.
#[derive(Debug, Clone)]
pub struct CpuState {
    ints: [i64; REGISTERS_PER_CLASS],
    floats: [f64; REGISTERS_PER_CLASS],
    vectors: Vec<Vec<f64>>,
    memory: Vec<Scalar>,
    float_mode: FloatMode,
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new(FloatMode::default())
    }
}

impl CpuState {
    pub fn new(float_mode: FloatMode) -> Self {
        Self {
            ints: [0; REGISTERS_PER_CLASS],
            floats: [0.0; REGISTERS_PER_CLASS],
            vectors: vec![vec![0.0; DEFAULT_VECTOR_LEN]; REGISTERS_PER_CLASS],
            memory: vec![Scalar::Int(0); MEMORY_SIZE],
            float_mode,
        }
    }

    pub fn float_mode(&self) -> FloatMode {
        self.float_mode
    }

    pub fn memory_size(&self) -> usize {
        self.memory.len()
    }

    pub fn read_register(&self, reg: Register) -> Value {
        match reg.class {
            RegClass::Int => Value::Int(self.ints[reg.index]),
            RegClass::Float => Value::Float(self.floats[reg.index]),
            RegClass::Vector => Value::Vector(self.vectors[reg.index].clone()),
        }
    }

    /// Write a register, normalizing the stored value for its class.
    ///
    /// Floats written to an integer register are truncated toward zero;
    /// a vector write must carry 1..=32 elements or nothing changes.
    pub fn write_register(&mut self, reg: Register, value: Value) -> Result<(), String> {
        match (reg.class, value) {
            (RegClass::Int, Value::Int(n)) => self.ints[reg.index] = n,
            (RegClass::Int, Value::Float(f)) => self.ints[reg.index] = f as i64,
            (RegClass::Float, Value::Int(n)) => self.floats[reg.index] = n as f64,
            (RegClass::Float, Value::Float(f)) => self.floats[reg.index] = f,
            (RegClass::Vector, Value::Vector(v)) => {
                if v.is_empty() || v.len() > MAX_VECTOR_LEN {
                    return Err(format!(
                        "Vector register must be assigned a list of floats with length between 1 and {}, got {}",
                        MAX_VECTOR_LEN,
                        v.len()
                    ));
                }
                self.vectors[reg.index] = v;
            }
            (RegClass::Vector, other) => {
                return Err(format!(
                    "Vector register {} cannot hold a {} value",
                    reg,
                    other.type_name()
                ));
            }
            (_, Value::Vector(_)) => {
                return Err(format!("Register {} cannot hold a vector value", reg));
            }
        }
        self.normalize_registers();
        Ok(())
    }

    /// Reset a register to its class zero. Vectors collapse to a single 0.0.
    pub fn reset_register(&mut self, reg: Register) {
        match reg.class {
            RegClass::Int => self.ints[reg.index] = 0,
            RegClass::Float => self.floats[reg.index] = 0.0,
            RegClass::Vector => self.vectors[reg.index] = vec![0.0],
        }
        self.normalize_registers();
    }

    pub fn read_memory(&self, addr: usize) -> Result<Scalar, String> {
        self.memory.get(addr).copied().ok_or_else(|| {
            format!(
                "Memory address {} out of range (0..{})",
                addr,
                self.memory.len()
            )
        })
    }

    pub fn write_memory(&mut self, addr: usize, value: Scalar) -> Result<(), String> {
        let size = self.memory.len();
        let slot = self
            .memory
            .get_mut(addr)
            .ok_or_else(|| format!("Memory address {} out of range (0..{})", addr, size))?;
        *slot = value;
        // Memory writes re-run the register pass as well; in legacy float mode
        // this is observable because the quantization is not idempotent.
        self.normalize_registers();
        Ok(())
    }

    /// Check that `len` slots starting at `addr` are addressable.
    pub fn check_range(&self, addr: usize, len: usize) -> Result<(), String> {
        match addr.checked_add(len) {
            Some(end) if end <= self.memory.len() => Ok(()),
            _ => Err(format!(
                "Memory range {}..{} out of range (0..{})",
                addr,
                addr.saturating_add(len),
                self.memory.len()
            )),
        }
    }

    fn normalize_registers(&mut self) {
        for n in self.ints.iter_mut() {
            *n = wrap_i32(*n);
        }
        for f in self.floats.iter_mut() {
            *f = quantize(*f, self.float_mode);
        }
    }
}
