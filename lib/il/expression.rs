use serde::{Deserialize, Serialize};
use std::fmt;

/// The binary operators of MuASM expressions.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    And,
}

impl BinaryOperator {
    /// Binding strength, higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::And => 1,
            BinaryOperator::Add | BinaryOperator::Sub => 2,
            BinaryOperator::Mul => 3,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::And => "&",
        }
    }

    fn apply(&self, lhs: i64, rhs: i64) -> i64 {
        match self {
            BinaryOperator::Add => lhs.wrapping_add(rhs),
            BinaryOperator::Sub => lhs.wrapping_sub(rhs),
            BinaryOperator::Mul => lhs.wrapping_mul(rhs),
            BinaryOperator::And => lhs & rhs,
        }
    }
}

/// A MuASM expression.
///
/// Expressions are trees over register references and integer literals.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Expression {
    Register(String),
    Constant(i64),
    Binary(BinaryOperator, Box<Expression>, Box<Expression>),
}

macro_rules! expression_binop {
    ($op: path, $n: ident) => {
        pub fn $n(lhs: Expression, rhs: Expression) -> Expression {
            Expression::Binary($op, Box::new(lhs), Box::new(rhs))
        }
    };
}

impl Expression {
    pub fn register<S: Into<String>>(name: S) -> Expression {
        Expression::Register(name.into())
    }

    pub fn constant(value: i64) -> Expression {
        Expression::Constant(value)
    }

    pub fn binary(op: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    expression_binop!(BinaryOperator::Add, add);
    expression_binop!(BinaryOperator::Sub, sub);
    expression_binop!(BinaryOperator::Mul, mul);
    expression_binop!(BinaryOperator::And, and);

    /// Returns the names of all registers read by this expression, in
    /// left-to-right order. Duplicates are kept.
    pub fn registers(&self) -> Vec<&str> {
        match self {
            Expression::Register(name) => vec![name.as_str()],
            Expression::Constant(_) => Vec::new(),
            Expression::Binary(_, lhs, rhs) => {
                let mut registers = lhs.registers();
                registers.append(&mut rhs.registers());
                registers
            }
        }
    }

    /// Fold this expression to an integer if it contains no registers.
    pub fn eval_constant(&self) -> Option<i64> {
        match self {
            Expression::Register(_) => None,
            Expression::Constant(value) => Some(*value),
            Expression::Binary(op, lhs, rhs) => {
                Some(op.apply(lhs.eval_constant()?, rhs.eval_constant()?))
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expression::Binary(op, _, _) => op.precedence(),
            Expression::Register(_) | Expression::Constant(_) => u8::MAX,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Register(name) => write!(f, "{}", name),
            Expression::Constant(value) => write!(f, "{}", value),
            Expression::Binary(op, lhs, rhs) => {
                // Operators are left-associative, so a right operand of equal
                // precedence needs parentheses to survive a reparse.
                if lhs.precedence() < op.precedence() {
                    write!(f, "({})", lhs)?;
                } else {
                    write!(f, "{}", lhs)?;
                }
                write!(f, " {} ", op.symbol())?;
                if rhs.precedence() <= op.precedence() {
                    write!(f, "({})", rhs)
                } else {
                    write!(f, "{}", rhs)
                }
            }
        }
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Expression {
        Expression::Constant(value)
    }
}
