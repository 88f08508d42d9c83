//! vasm - a small register machine for a line-oriented assembly language
//!
//! This library provides the emulated CPU and the interpreter that runs
//! `.vasm` programs against it.

pub mod compiler;
pub mod config;
pub mod vm;

// Re-export commonly used types
pub use compiler::{Interpreter, Program};
pub use config::{FloatMode, RuntimeConfig};
pub use vm::{CpuState, RuntimeError, Value};
