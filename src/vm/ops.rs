/// Opcodes of the vasm instruction set.
///
/// A statement is `MNEMONIC arg, arg, ...`; the mnemonic is matched exactly
/// (upper case). `DEF name:` is a definition marker, not an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // ========================================
    // Data movement
    // ========================================
    Move,
    Store,
    LoadM,
    Var,
    Input,
    Push,
    Pop,

    // ========================================
    // Arithmetic
    // ========================================
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // ========================================
    // Vector-only
    // ========================================
    Dot,
    Mag,
    Norm,

    // ========================================
    // Output
    // ========================================
    Print,
    PrintF,
    Text,

    // ========================================
    // Control flow
    // ========================================
    Jmp,
    Jz,
    Jnz,
    Jg,
    Jge,
    Jl,
    Jle,
    Call,
    Return,
    Halt,
}

impl Op {
    pub const ALL: [Op; 28] = [
        Op::Move,
        Op::Store,
        Op::LoadM,
        Op::Var,
        Op::Input,
        Op::Push,
        Op::Pop,
        Op::Add,
        Op::Sub,
        Op::Mul,
        Op::Div,
        Op::Mod,
        Op::Dot,
        Op::Mag,
        Op::Norm,
        Op::Print,
        Op::PrintF,
        Op::Text,
        Op::Jmp,
        Op::Jz,
        Op::Jnz,
        Op::Jg,
        Op::Jge,
        Op::Jl,
        Op::Jle,
        Op::Call,
        Op::Return,
        Op::Halt,
    ];

    pub fn from_mnemonic(s: &str) -> Option<Op> {
        let op = match s {
            "MOVE" => Op::Move,
            "STORE" => Op::Store,
            "LOADM" => Op::LoadM,
            "VAR" => Op::Var,
            "INPUT" => Op::Input,
            "PUSH" => Op::Push,
            "POP" => Op::Pop,
            "ADD" => Op::Add,
            "SUB" => Op::Sub,
            "MUL" => Op::Mul,
            "DIV" => Op::Div,
            "MOD" => Op::Mod,
            "DOT" => Op::Dot,
            "MAG" => Op::Mag,
            "NORM" => Op::Norm,
            "PRINT" => Op::Print,
            "PRINTF" => Op::PrintF,
            "TEXT" => Op::Text,
            "JMP" => Op::Jmp,
            "JZ" => Op::Jz,
            "JNZ" => Op::Jnz,
            "JG" => Op::Jg,
            "JGE" => Op::Jge,
            "JL" => Op::Jl,
            "JLE" => Op::Jle,
            "CALL" => Op::Call,
            "RETURN" => Op::Return,
            "HALT" => Op::Halt,
            _ => return None,
        };
        Some(op)
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Move => "MOVE",
            Op::Store => "STORE",
            Op::LoadM => "LOADM",
            Op::Var => "VAR",
            Op::Input => "INPUT",
            Op::Push => "PUSH",
            Op::Pop => "POP",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Mod => "MOD",
            Op::Dot => "DOT",
            Op::Mag => "MAG",
            Op::Norm => "NORM",
            Op::Print => "PRINT",
            Op::PrintF => "PRINTF",
            Op::Text => "TEXT",
            Op::Jmp => "JMP",
            Op::Jz => "JZ",
            Op::Jnz => "JNZ",
            Op::Jg => "JG",
            Op::Jge => "JGE",
            Op::Jl => "JL",
            Op::Jle => "JLE",
            Op::Call => "CALL",
            Op::Return => "RETURN",
            Op::Halt => "HALT",
        }
    }

    /// Accepted argument count as (min, max).
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Op::Move | Op::Store | Op::LoadM => (2, 2),
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod => (2, 2),
            Op::Var => (2, 3),
            Op::Input => (1, 2),
            Op::Push | Op::Pop => (1, 1),
            Op::Dot => (3, 3),
            Op::Mag => (2, 2),
            Op::Norm => (1, 1),
            Op::Print => (1, 2),
            Op::PrintF | Op::Text => (1, 1),
            Op::Jmp | Op::Call => (1, 1),
            Op::Jz | Op::Jnz | Op::Jg | Op::Jge | Op::Jl | Op::Jle => (2, 2),
            Op::Return => (0, 0),
            Op::Halt => (0, 1),
        }
    }

    /// Check an argument count against this opcode's arity.
    pub fn check_arity(&self, argc: usize) -> Result<(), String> {
        let (min, max) = self.arity();
        if argc >= min && argc <= max {
            return Ok(());
        }
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        Err(format!(
            "{} expects {} argument{}, got {}",
            self.mnemonic(),
            expected,
            if min == 1 && max == 1 { "" } else { "s" },
            argc
        ))
    }

    pub fn is_conditional_jump(&self) -> bool {
        matches!(
            self,
            Op::Jz | Op::Jnz | Op::Jg | Op::Jge | Op::Jl | Op::Jle
        )
    }

    /// Zero test applied by a conditional jump.
    pub fn jump_condition(&self, value: f64) -> bool {
        match self {
            Op::Jz => value == 0.0,
            Op::Jnz => value != 0.0,
            Op::Jg => value > 0.0,
            Op::Jge => value >= 0.0,
            Op::Jl => value < 0.0,
            Op::Jle => value <= 0.0,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonic_round_trip() {
        for op in Op::ALL {
            assert_eq!(Op::from_mnemonic(op.mnemonic()), Some(op));
        }
    }

    #[test]
    fn test_unknown_mnemonic() {
        assert_eq!(Op::from_mnemonic("NOP"), None);
        assert_eq!(Op::from_mnemonic("move"), None);
        assert_eq!(Op::from_mnemonic("DEF"), None);
    }

    #[test]
    fn test_arity_messages() {
        assert!(Op::Move.check_arity(2).is_ok());
        assert_eq!(
            Op::Move.check_arity(3).unwrap_err(),
            "MOVE expects 2 arguments, got 3"
        );
        assert_eq!(
            Op::Var.check_arity(1).unwrap_err(),
            "VAR expects 2 to 3 arguments, got 1"
        );
        assert_eq!(
            Op::Push.check_arity(0).unwrap_err(),
            "PUSH expects 1 argument, got 0"
        );
        assert!(Op::Halt.check_arity(0).is_ok());
    }

    #[test]
    fn test_jump_conditions() {
        assert!(Op::Jz.jump_condition(0.0));
        assert!(!Op::Jz.jump_condition(1.0));
        assert!(Op::Jnz.jump_condition(-2.0));
        assert!(Op::Jg.jump_condition(0.5));
        assert!(!Op::Jg.jump_condition(0.0));
        assert!(Op::Jge.jump_condition(0.0));
        assert!(Op::Jl.jump_condition(-1.0));
        assert!(Op::Jle.jump_condition(0.0));
        assert!(!Op::Jle.jump_condition(3.0));
    }
}
