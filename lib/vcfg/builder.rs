use crate::il::{Expression, Instruction, JumpTarget, Program};
use crate::vcfg::*;
use crate::{parser, Error, ParseError};
use log::debug;

/// Build a `StaticGraph` from MuASM source text.
pub fn build_vcfg_from_source(source: &str, options: &BuildOptions) -> Result<StaticGraph, Error> {
    let program = parser::parse(source)?;
    build_vcfg(&program, options)
}

/// Build a `StaticGraph` from a `Program`.
///
/// One `ns` node `n{pc}` is created per instruction. For every `beqz`, the
/// mispredicted side is laid out according to `options.mode()`:
///
/// * `light`: a `spec-begin` and a `spec-end` marker per branch. The
///   `spec-begin` forks to both successors and to `spec-end`, and the analysis
///   counts the speculation window.
/// * `meta`: for each direction, the path the branch does not commit to is
///   unrolled into distinct `spec` nodes, `s{context}_{pc}`, for at most
///   `window_size` instructions.
///
/// Rollback edges are only emitted under `SpeculationMode::StackGuard`.
pub fn build_vcfg(program: &Program, options: &BuildOptions) -> Result<StaticGraph, Error> {
    if options.window_size() <= 0 {
        return Err(Error::InvalidWindowSize(options.window_size()));
    }

    let mut builder = Builder {
        program,
        options,
        graph: StaticGraph::new(),
        next_context: 0,
    };

    builder.committed()?;

    for entry in program.entries() {
        if entry.instruction().is_branch() {
            match options.mode() {
                BuildMode::Light => builder.light(entry.pc())?,
                BuildMode::Meta => builder.meta(entry.pc())?,
            }
        }
    }

    debug!(
        "built {} vcfg with {} nodes, {} edges, {} speculation contexts",
        options.mode(),
        builder.graph.num_nodes(),
        builder.graph.num_edges(),
        builder.next_context
    );

    Ok(builder.graph)
}

/// An unrolled speculative path still to be laid out.
struct Pending {
    /// Node the path continues from.
    from: String,
    /// Next instruction, or `None` when the path falls off the program.
    pc: Option<usize>,
    budget: usize,
    context: usize,
    /// Where committed execution resumes once the path is squashed.
    rollback: usize,
    origin: usize,
}

struct Builder<'p> {
    program: &'p Program,
    options: &'p BuildOptions,
    graph: StaticGraph,
    next_context: usize,
}

fn ns_id(pc: usize) -> String {
    format!("n{}", pc)
}

impl<'p> Builder<'p> {
    fn fresh_context(&mut self) -> usize {
        let context = self.next_context;
        self.next_context += 1;
        context
    }

    /// The pc `pc` falls through to, if it is inside the program.
    fn next_pc(&self, pc: usize) -> Option<usize> {
        if pc + 1 < self.program.len() {
            Some(pc + 1)
        } else {
            None
        }
    }

    fn in_program(&self, pc: usize) -> Option<usize> {
        if pc < self.program.len() {
            Some(pc)
        } else {
            None
        }
    }

    /// Insert an edge unless the two nodes are already connected.
    fn edge(&mut self, source: &str, target: &str, kind: EdgeKind, label: &str) -> Result<(), Error> {
        if self.graph.has_edge(source, target) {
            return Ok(());
        }
        let edge = GraphEdge::new(source, target, kind);
        if label.is_empty() {
            self.graph.insert_edge(edge)
        } else {
            self.graph.insert_edge(edge.with_label(label))
        }
    }

    /// The pc a `beqz` at `pc` jumps to.
    fn branch_target(&self, pc: usize) -> Result<usize, Error> {
        let entry = self
            .program
            .entry(pc)
            .ok_or(Error::Custom(format!("no instruction at pc {}", pc)))?;
        match entry.instruction() {
            Instruction::Beqz {
                target,
                target_pc: Some(target_pc),
                ..
            } => {
                if *target_pc > self.program.len() {
                    Err(ParseError::new(format!("Branch target `{}` is out of range", target))
                        .with_line(entry.source_line())
                        .into())
                } else {
                    Ok(*target_pc)
                }
            }
            Instruction::Beqz { target, .. } => {
                Err(ParseError::new(format!("Undefined label `{}`", target))
                    .with_line(entry.source_line())
                    .into())
            }
            _ => Err(Error::Custom(format!("no beqz at pc {}", pc))),
        }
    }

    /// The pc a `jmp` at `pc` goes to.
    fn jump_target(&self, pc: usize, target: &Expression, resolved: &JumpTarget) -> Result<usize, Error> {
        match resolved {
            JumpTarget::Pc(target_pc) if *target_pc <= self.program.len() => Ok(*target_pc),
            _ => Err(Error::UnresolvedJump {
                pc,
                target: target.to_string(),
            }),
        }
    }

    /// Committed nodes and edges.
    fn committed(&mut self) -> Result<(), Error> {
        let program = self.program;
        for entry in program.entries() {
            self.graph.insert_node(
                GraphNode::new(ns_id(entry.pc()), entry.pc() as i64, NodeKind::Ns)
                    .with_label(entry.label())
                    .with_instruction(entry.instruction().clone()),
            )?;
        }

        for entry in program.entries() {
            let pc = entry.pc();
            let source = ns_id(pc);
            match entry.instruction() {
                Instruction::Jmp { target, resolved } => {
                    let target_pc = self.jump_target(pc, target, resolved)?;
                    if let Some(target_pc) = self.in_program(target_pc) {
                        self.edge(&source, &ns_id(target_pc), EdgeKind::Ns, "jmp")?;
                    }
                }
                Instruction::Beqz { .. } => {
                    let target_pc = self.branch_target(pc)?;
                    if let Some(target_pc) = self.in_program(target_pc) {
                        self.edge(&source, &ns_id(target_pc), EdgeKind::Ns, "taken")?;
                    }
                    if let Some(next) = self.next_pc(pc) {
                        self.edge(&source, &ns_id(next), EdgeKind::Ns, "not-taken")?;
                    }
                }
                _ => {
                    if let Some(next) = self.next_pc(pc) {
                        self.edge(&source, &ns_id(next), EdgeKind::Ns, "")?;
                    }
                }
            }
        }
        Ok(())
    }

    /// One `spec-begin`/`spec-end` pair for the branch at `pc`.
    fn light(&mut self, pc: usize) -> Result<(), Error> {
        let context = self.fresh_context();
        let origin = SpecOrigin::new(pc, context);
        let begin_id = format!("spec_begin_{}", context);
        let end_id = format!("spec_end_{}", context);

        self.graph.insert_node(
            GraphNode::new(begin_id.clone(), -(2 * context as i64 + 1), NodeKind::Spec)
                .with_spec_origin(origin)
                .with_spec_context(SpecContext::begin(context)),
        )?;
        self.graph.insert_node(
            GraphNode::new(end_id.clone(), -(2 * context as i64 + 2), NodeKind::Spec)
                .with_spec_origin(origin)
                .with_spec_context(SpecContext::end(context)),
        )?;

        self.edge(&ns_id(pc), &begin_id, EdgeKind::Spec, "mispredict")?;
        if let Some(taken) = self.in_program(self.branch_target(pc)?) {
            self.edge(&begin_id, &ns_id(taken), EdgeKind::Spec, "taken")?;
        }
        if let Some(next) = self.next_pc(pc) {
            self.edge(&begin_id, &ns_id(next), EdgeKind::Spec, "not-taken")?;
        }
        self.edge(&begin_id, &end_id, EdgeKind::Spec, "squash")?;

        if self.options.speculation_mode() == SpeculationMode::StackGuard {
            self.edge(&end_id, &ns_id(pc), EdgeKind::Rollback, "rollback")?;
        }
        Ok(())
    }

    /// Unroll both mispredicted directions of the branch at `pc`.
    fn meta(&mut self, pc: usize) -> Result<(), Error> {
        let taken = self.branch_target(pc)?;
        let next = pc + 1;
        let budget = self.options.window_size() as usize;

        // Committed to `next`, speculating `taken`, and the other way around.
        for (speculated, committed) in [(taken, next), (next, taken)] {
            let context = self.fresh_context();
            self.unroll(Pending {
                from: ns_id(pc),
                pc: self.in_program(speculated),
                budget,
                context,
                rollback: committed,
                origin: pc,
            })?;
        }
        Ok(())
    }

    fn unroll(&mut self, first: Pending) -> Result<(), Error> {
        let program = self.program;
        let mut queue = vec![first];

        while let Some(pending) = queue.pop() {
            let pc = match pending.pc {
                Some(pc) if pending.budget > 0 => pc,
                _ => {
                    self.squash(&pending.from, pending.rollback)?;
                    continue;
                }
            };

            let id = format!("s{}_{}", pending.context, pc);
            if self.graph.has_node(&id) {
                self.edge(&pending.from, &id, EdgeKind::Spec, "")?;
                continue;
            }

            let entry = program
                .entry(pc)
                .ok_or(Error::Custom(format!("no instruction at pc {}", pc)))?;
            self.graph.insert_node(
                GraphNode::new(id.clone(), pc as i64, NodeKind::Spec)
                    .with_label(entry.label())
                    .with_instruction(entry.instruction().clone())
                    .with_spec_origin(SpecOrigin::new(pending.origin, pending.context)),
            )?;
            self.edge(&pending.from, &id, EdgeKind::Spec, "")?;

            let budget = pending.budget - 1;
            match entry.instruction() {
                Instruction::Spbarr => self.squash(&id, pending.rollback)?,
                Instruction::Beqz { .. } => {
                    let taken = self.branch_target(pc)?;
                    for successor in [self.in_program(taken), self.next_pc(pc)] {
                        let context = self.fresh_context();
                        queue.push(Pending {
                            from: id.clone(),
                            pc: successor,
                            budget,
                            context,
                            rollback: pending.rollback,
                            origin: pc,
                        });
                    }
                }
                Instruction::Jmp { target, resolved } => {
                    let target_pc = self.jump_target(pc, target, resolved)?;
                    queue.push(Pending {
                        from: id.clone(),
                        pc: self.in_program(target_pc),
                        budget,
                        ..pending
                    });
                }
                _ => {
                    queue.push(Pending {
                        from: id.clone(),
                        pc: self.next_pc(pc),
                        budget,
                        ..pending
                    });
                }
            }
        }
        Ok(())
    }

    /// End a speculative path at `from`, rolling back to `rollback` if the
    /// speculation mode asks for it.
    fn squash(&mut self, from: &str, rollback: usize) -> Result<(), Error> {
        if self.options.speculation_mode() != SpeculationMode::StackGuard {
            return Ok(());
        }
        let is_spec = self.graph.node(from).map(|node| node.is_spec()).unwrap_or(false);
        match self.in_program(rollback) {
            Some(rollback) if is_spec => {
                self.edge(from, &ns_id(rollback), EdgeKind::Rollback, "rollback")
            }
            _ => Ok(()),
        }
    }
}
