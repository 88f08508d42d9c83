use std::fmt;

/// A single memory slot or stack entry.
///
/// Memory is untyped at the storage level: a slot holds whatever scalar was
/// last written to it, and the owning variable's type tag decides how it is read.
#[derive(Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    pub fn as_f64(&self) -> f64 {
        match self {
            Scalar::Int(n) => *n as f64,
            Scalar::Float(f) => *f,
        }
    }

    /// Integer view, truncating floats toward zero.
    pub fn as_i64(&self) -> i64 {
        match self {
            Scalar::Int(n) => *n,
            Scalar::Float(f) => *f as i64,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Scalar::Int(n) => *n == 0,
            Scalar::Float(f) => *f == 0.0,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Scalar::Int(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
        }
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(n) => write!(f, "Int({})", n),
            Scalar::Float(x) => write!(f, "Float({})", x),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// The contents of a register, or a value read out of a variable.
#[derive(Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Vector(Vec<f64>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Int(n) => Some(Scalar::Int(*n)),
            Value::Float(f) => Some(Scalar::Float(*f)),
            Value::Vector(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Vector(_) => "vector",
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Int(n) => Value::Int(n),
            Scalar::Float(f) => Value::Float(f),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Vector(v) => write!(f, "Vector({:?})", v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Vector(v) => f.write_str(&format_vector(v)),
        }
    }
}

/// Format a float scalar; integral values keep a trailing `.0`.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{}", x);
    if s.contains('.') { s } else { format!("{}.0", s) }
}

/// Format a vector element in its shortest form (`1`, `0.5`).
pub fn format_element(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", x)
    }
}

/// Format a vector as `[a b c]`.
pub fn format_vector(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format_element(*x)).collect();
    format!("[{}]", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_display_keeps_fraction() {
        assert_eq!(Value::Float(32.0).to_string(), "32.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Float(-4.0).to_string(), "-4.0");
    }

    #[test]
    fn test_vector_display() {
        assert_eq!(Value::Vector(vec![1.0, 2.0, 3.0]).to_string(), "[1 2 3]");
        assert_eq!(Value::Vector(vec![0.5, -1.25]).to_string(), "[0.5 -1.25]");
    }

    #[test]
    fn test_int_display() {
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Scalar::Int(42).to_string(), "42");
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(Scalar::Int(3).as_f64(), 3.0);
        assert_eq!(Scalar::Float(3.9).as_i64(), 3);
        assert_eq!(Scalar::Float(-3.9).as_i64(), -3);
        assert!(Scalar::Float(0.0).is_zero());
        assert!(!Scalar::Int(1).is_zero());
    }

    #[test]
    fn test_non_finite_display() {
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NAN), "nan");
    }
}
