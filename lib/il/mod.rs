//! MuASM, the analyzed language.
//!
//! # An Introduction
//!
//! MuASM is a minimal register/memory assembly language for modelling
//! speculative execution. A program is a sequence of instructions indexed by
//! program counter, with optional labels.
//!
//! ## `Expression`
//!
//! The terminals are `Register` and `Constant`. Binary expressions are built
//! from `+`, `-`, `*` and `&`. Expressions carry no width; MuASM values are
//! unbounded integers for the purpose of this analysis, and constant folding
//! wraps on overflow.
//!
//! ## `Instruction`
//!
//! There are eight instructions:
//!
//! * `skip`: does nothing.
//! * `x <- e`: assigns an expression to a register.
//! * `load x, e`: loads the memory cell addressed by `e` into `x`.
//! * `store x, e`: stores `x` into the memory cell addressed by `e`.
//! * `beqz e, L`: branches to `L` when `e` is zero, otherwise falls through.
//! * `jmp e`: jumps to the label or program counter in `e`.
//! * `spbarr`: a speculation barrier.
//! * `x <- e ? c`: a conditional move of `e` into `x` when `c` holds.
//!
//! ## `Program`
//!
//! A `Program` owns its `ProgramEntry`s and the label table. Labels are
//! resolved by the parser; `beqz` targets carry their program counter and
//! `jmp` targets are classified as a `JumpTarget`.

mod expression;
mod instruction;
mod program;

pub use self::expression::*;
pub use self::instruction::*;
pub use self::program::*;

/// A convenience function to create a register expression.
pub fn expr_reg<S: Into<String>>(name: S) -> Expression {
    Expression::register(name)
}

/// A convenience function to create a constant expression.
pub fn expr_const(value: i64) -> Expression {
    Expression::constant(value)
}
