use crate::il::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One instruction of a `Program`, with its position in the source.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramEntry {
    label: Option<String>,
    instruction: Instruction,
    source_line: usize,
    pc: usize,
}

impl ProgramEntry {
    pub fn new(
        label: Option<String>,
        instruction: Instruction,
        source_line: usize,
        pc: usize,
    ) -> ProgramEntry {
        ProgramEntry {
            label,
            instruction,
            source_line,
            pc,
        }
    }

    /// The first label bound to this instruction, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    pub(crate) fn instruction_mut(&mut self) -> &mut Instruction {
        &mut self.instruction
    }

    /// The 1-based source line this instruction was parsed from.
    pub fn source_line(&self) -> usize {
        self.source_line
    }

    pub fn pc(&self) -> usize {
        self.pc
    }
}

/// A parsed MuASM program.
///
/// Instructions are indexed by program counter, starting at 0. A label may
/// resolve to `len()`, the position just past the last instruction.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Program {
    entries: Vec<ProgramEntry>,
    labels: BTreeMap<String, usize>,
}

impl Program {
    pub fn new(entries: Vec<ProgramEntry>, labels: BTreeMap<String, usize>) -> Program {
        Program { entries, labels }
    }

    pub fn entries(&self) -> &[ProgramEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [ProgramEntry] {
        &mut self.entries
    }

    /// Get the entry at the given program counter.
    pub fn entry(&self, pc: usize) -> Option<&ProgramEntry> {
        self.entries.get(pc)
    }

    /// Get the instruction at the given program counter.
    pub fn instruction(&self, pc: usize) -> Option<&Instruction> {
        self.entries.get(pc).map(|entry| entry.instruction())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> &BTreeMap<String, usize> {
        &self.labels
    }

    /// Look up the program counter a label is bound to.
    pub fn label_pc(&self, label: &str) -> Option<usize> {
        self.labels.get(label).cloned()
    }

    /// Every register named anywhere in the program.
    pub fn registers(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .flat_map(|entry| entry.instruction().registers())
            .map(|register| register.to_string())
            .collect()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for pc in 0..=self.entries.len() {
            for (label, _) in self.labels.iter().filter(|(_, l)| **l == pc) {
                writeln!(f, "{}:", label)?;
            }
            if let Some(entry) = self.entries.get(pc) {
                writeln!(f, "    {}", entry.instruction())?;
            }
        }
        Ok(())
    }
}
