//! Abstract transfer functions for MuASM instructions.

use crate::analysis::lattice::*;
use crate::analysis::state::{AbsState, ExecutionMode};
use crate::il::{Expression, Instruction, JumpTarget};
use crate::parser;
use crate::vcfg::GraphNode;
use crate::Error;

impl RelValue {
    /// The side of this value the given mode sees.
    pub fn point(&self, mode: ExecutionMode) -> SecurityPoint {
        match mode {
            ExecutionMode::NS => self.ns(),
            ExecutionMode::Speculative => self.sp(),
        }
    }
}

/// Evaluate the security of an expression. Constants are `Low`.
pub fn eval(expression: &Expression, state: &AbsState) -> RelValue {
    match expression {
        Expression::Register(name) => state.reg(name),
        Expression::Constant(_) => RelValue::low(),
        Expression::Binary(_, lhs, rhs) => eval(lhs, state).join(&eval(rhs, state)),
    }
}

/// The instruction a node executes, if it has one.
///
/// Nodes without an AST fall back to parsing their rendered instruction.
pub fn node_instruction(node: &GraphNode) -> Result<Option<Instruction>, Error> {
    if let Some(instruction) = node.instruction_ast() {
        return Ok(Some(instruction.clone()));
    }
    match node.instruction() {
        Some(text) => parser::parse_instruction(text)
            .map(Some)
            .map_err(|error| Error::UnsupportedInstruction {
                node: node.id().to_string(),
                detail: error.to_string(),
            }),
        None => Ok(None),
    }
}

/// Apply the instruction at `node` to `state`.
///
/// Markers and nodes with no instruction leave the state unchanged.
pub fn apply_instruction(
    node: &GraphNode,
    state: &AbsState,
    mode: ExecutionMode,
) -> Result<AbsState, Error> {
    match node_instruction(node)? {
        Some(instruction) => Ok(apply(&instruction, &node.pc().to_string(), state, mode)),
        None => Ok(state.clone()),
    }
}

/// Apply `instruction`, found at program counter `pc`, to `state`. Every read
/// sees `state`, never this instruction's own writes.
pub fn apply(instruction: &Instruction, pc: &str, state: &AbsState, mode: ExecutionMode) -> AbsState {
    let mut out = state.clone();
    match instruction {
        Instruction::Skip | Instruction::Spbarr => {}
        Instruction::Assign { dest, expr } => {
            out.write_reg(dest, eval(expr, state), mode);
        }
        Instruction::Load { dest, addr } => {
            let key = addr.to_string();
            let loaded = state.cell(&key).join(&eval(addr, state));
            out.observe_mem(format!("{}:{}", pc, key), loaded.point(mode), mode);
            out.write_reg(dest, loaded, mode);
        }
        Instruction::Store { src, addr } => {
            let key = addr.to_string();
            let address = eval(addr, state);
            out.observe_mem(format!("{}:{}", pc, key), address.point(mode), mode);
            out.write_cell(&key, state.reg(src).join(&address), mode);
        }
        Instruction::Cmov { dest, cond, value } => {
            out.write_reg(dest, eval(cond, state).join(&eval(value, state)), mode);
        }
        Instruction::Beqz { cond, .. } => {
            out.observe_ctrl(pc, eval(cond, state).point(mode), mode);
        }
        Instruction::Jmp { target, resolved } => {
            let point = match resolved {
                JumpTarget::Pc(_) => SecurityPoint::Low,
                JumpTarget::Label(_) | JumpTarget::Dynamic => eval(target, state).point(mode),
            };
            out.observe_ctrl(format!("{}:target:{}", pc, target), point, mode);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::state::Policy;
    use crate::il::{expr_const, expr_reg};
    use crate::vcfg::NodeKind;

    fn state() -> AbsState {
        let policy = Policy::new()
            .reg("h", SecurityPoint::High)
            .cell("secret", SecurityPoint::High)
            .cell("pub", SecurityPoint::Low);
        AbsState::seeded(&policy, vec!["x", "y", "h", "i"])
    }

    #[test]
    fn assignment() {
        let instruction = Instruction::assign("x", Expression::add(expr_reg("y"), expr_reg("h")));
        let out = apply(&instruction, "0", &state(), ExecutionMode::NS);
        assert_eq!(out.reg("x"), RelValue::high());

        let out = apply(&instruction, "0", &state(), ExecutionMode::Speculative);
        assert_eq!(out.reg("x").ns(), SecurityPoint::Low);
        assert_eq!(out.reg("x").sp(), SecurityPoint::High);
    }

    #[test]
    fn load_observes_loaded_value() {
        let load = Instruction::load("x", expr_reg("secret"));
        let out = apply(&load, "1", &state(), ExecutionMode::NS);
        assert_eq!(out.obs_mem()["1:secret"], LatticeValue::EqHigh);
        assert_eq!(out.reg("x"), RelValue::high());

        let out = apply(&load, "1", &state(), ExecutionMode::Speculative);
        assert_eq!(out.obs_mem()["1:secret"], LatticeValue::Leak);
        assert!(out.has_violation());

        let load = Instruction::load("x", expr_reg("pub"));
        let out = apply(&load, "1", &state(), ExecutionMode::Speculative);
        assert_eq!(out.obs_mem()["1:pub"], LatticeValue::EqLow);
    }

    #[test]
    fn store_observes_address() {
        let store = Instruction::store("h", expr_reg("pub"));
        let out = apply(&store, "2", &state(), ExecutionMode::Speculative);
        assert_eq!(out.obs_mem()["2:pub"], LatticeValue::EqLow);
        assert_eq!(out.cell("pub").sp(), SecurityPoint::High);
        assert_eq!(out.cell("pub").ns(), SecurityPoint::Low);

        let store = Instruction::store("x", Expression::add(expr_reg("pub"), expr_reg("h")));
        let out = apply(&store, "2", &state(), ExecutionMode::Speculative);
        assert_eq!(out.obs_mem()["2:pub + h"], LatticeValue::Leak);
    }

    #[test]
    fn reads_see_the_incoming_state() {
        let instruction = Instruction::load("h", expr_reg("h"));
        let mut incoming = state();
        incoming.write_reg("h", RelValue::low(), ExecutionMode::NS);
        let out = apply(&instruction, "0", &incoming, ExecutionMode::NS);
        assert_eq!(out.obs_mem()["0:h"], LatticeValue::EqHigh);
    }

    #[test]
    fn cmov_joins_condition_and_value() {
        let cmov = Instruction::cmov("x", expr_reg("h"), expr_const(1));
        let out = apply(&cmov, "0", &state(), ExecutionMode::NS);
        assert_eq!(out.reg("x"), RelValue::high());
    }

    #[test]
    fn control_observations() {
        let beqz = Instruction::Beqz {
            cond: expr_reg("h"),
            target: "L".to_string(),
            target_pc: Some(3),
        };
        let out = apply(&beqz, "4", &state(), ExecutionMode::Speculative);
        assert_eq!(out.obs_ctrl()["4"], LatticeValue::Leak);
        assert_eq!(out.regs(), state().regs());

        let jmp = Instruction::Jmp {
            target: expr_reg("L"),
            resolved: JumpTarget::Pc(0),
        };
        let out = apply(&jmp, "5", &state(), ExecutionMode::Speculative);
        assert_eq!(out.obs_ctrl()["5:target:L"], LatticeValue::EqLow);
    }

    #[test]
    fn text_fallback() {
        let node = GraphNode::new("n0", 0, NodeKind::Ns).with_instruction_text("x <- h");
        let out = apply_instruction(&node, &state(), ExecutionMode::NS).unwrap();
        assert_eq!(out.reg("x"), RelValue::high());

        let node = GraphNode::new("n0", 0, NodeKind::Ns).with_instruction_text("bnez x, L");
        assert!(matches!(
            apply_instruction(&node, &state(), ExecutionMode::NS),
            Err(Error::UnsupportedInstruction { .. })
        ));

        let marker = GraphNode::new("spec_end_0", -2, NodeKind::Spec);
        assert_eq!(
            apply_instruction(&marker, &state(), ExecutionMode::Speculative).unwrap(),
            state()
        );
    }
}
