use crate::il::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a `jmp` goes, once labels have been resolved.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum JumpTarget {
    /// A statically known program counter.
    Pc(usize),
    /// A bare identifier that names no label in the program.
    Label(String),
    /// Anything that cannot be resolved before execution.
    Dynamic,
}

/// A MuASM instruction.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Instruction {
    Skip,
    Assign {
        dest: String,
        expr: Expression,
    },
    Load {
        dest: String,
        addr: Expression,
    },
    Store {
        src: String,
        addr: Expression,
    },
    Beqz {
        cond: Expression,
        target: String,
        target_pc: Option<usize>,
    },
    Jmp {
        target: Expression,
        resolved: JumpTarget,
    },
    Spbarr,
    Cmov {
        dest: String,
        cond: Expression,
        value: Expression,
    },
}

impl Instruction {
    pub fn skip() -> Instruction {
        Instruction::Skip
    }

    pub fn spbarr() -> Instruction {
        Instruction::Spbarr
    }

    pub fn assign<S: Into<String>>(dest: S, expr: Expression) -> Instruction {
        Instruction::Assign {
            dest: dest.into(),
            expr,
        }
    }

    pub fn load<S: Into<String>>(dest: S, addr: Expression) -> Instruction {
        Instruction::Load {
            dest: dest.into(),
            addr,
        }
    }

    pub fn store<S: Into<String>>(src: S, addr: Expression) -> Instruction {
        Instruction::Store {
            src: src.into(),
            addr,
        }
    }

    /// A `beqz` whose target has not been resolved yet.
    pub fn beqz<S: Into<String>>(cond: Expression, target: S) -> Instruction {
        Instruction::Beqz {
            cond,
            target: target.into(),
            target_pc: None,
        }
    }

    /// A `jmp` whose target has not been resolved yet.
    pub fn jmp(target: Expression) -> Instruction {
        Instruction::Jmp {
            target,
            resolved: JumpTarget::Dynamic,
        }
    }

    pub fn cmov<S: Into<String>>(dest: S, cond: Expression, value: Expression) -> Instruction {
        Instruction::Cmov {
            dest: dest.into(),
            cond,
            value,
        }
    }

    /// The MuASM mnemonic for this instruction.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Skip => "skip",
            Instruction::Assign { .. } => "assign",
            Instruction::Load { .. } => "load",
            Instruction::Store { .. } => "store",
            Instruction::Beqz { .. } => "beqz",
            Instruction::Jmp { .. } => "jmp",
            Instruction::Spbarr => "spbarr",
            Instruction::Cmov { .. } => "cmov",
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Instruction::Beqz { .. })
    }

    pub fn is_barrier(&self) -> bool {
        matches!(self, Instruction::Spbarr)
    }

    /// Registers read by this instruction.
    pub fn registers_read(&self) -> Vec<&str> {
        match self {
            Instruction::Skip | Instruction::Spbarr => Vec::new(),
            Instruction::Assign { expr, .. } => expr.registers(),
            Instruction::Load { addr, .. } => addr.registers(),
            Instruction::Store { src, addr } => {
                let mut registers = vec![src.as_str()];
                registers.append(&mut addr.registers());
                registers
            }
            Instruction::Beqz { cond, .. } => cond.registers(),
            Instruction::Jmp { target, resolved } => match resolved {
                JumpTarget::Dynamic => target.registers(),
                JumpTarget::Pc(_) | JumpTarget::Label(_) => Vec::new(),
            },
            Instruction::Cmov { cond, value, .. } => {
                let mut registers = value.registers();
                registers.append(&mut cond.registers());
                registers
            }
        }
    }

    /// Registers written by this instruction.
    pub fn registers_written(&self) -> Vec<&str> {
        match self {
            Instruction::Assign { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::Cmov { dest, .. } => vec![dest.as_str()],
            Instruction::Skip
            | Instruction::Spbarr
            | Instruction::Store { .. }
            | Instruction::Beqz { .. }
            | Instruction::Jmp { .. } => Vec::new(),
        }
    }

    /// Every register this instruction names, reads first.
    pub fn registers(&self) -> Vec<&str> {
        let mut registers = self.registers_read();
        registers.append(&mut self.registers_written());
        registers
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Skip => write!(f, "skip"),
            Instruction::Assign { dest, expr } => write!(f, "{} <- {}", dest, expr),
            Instruction::Load { dest, addr } => write!(f, "load {}, {}", dest, addr),
            Instruction::Store { src, addr } => write!(f, "store {}, {}", src, addr),
            Instruction::Beqz { cond, target, .. } => write!(f, "beqz {}, {}", cond, target),
            Instruction::Jmp { target, .. } => write!(f, "jmp {}", target),
            Instruction::Spbarr => write!(f, "spbarr"),
            Instruction::Cmov { dest, cond, value } => {
                write!(f, "{} <- {} ? {}", dest, value, cond)
            }
        }
    }
}
