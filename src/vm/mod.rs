mod value;
mod ops;
mod error;
pub mod cpu;
pub mod executor;

pub use value::{Scalar, Value, format_element, format_float, format_vector};
pub use ops::Op;
pub use error::RuntimeError;
pub use cpu::{CpuState, RegClass, Register, MAX_VECTOR_LEN, MEMORY_SIZE};
pub use executor::{ArithOp, OperationExecutor, Origin, Resolved};
