//! Abstract states, and the security policy they start from.

use crate::analysis::lattice::*;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Whether execution is committed or running down a mispredicted path.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ExecutionMode {
    NS,
    Speculative,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionMode::NS => write!(f, "NS"),
            ExecutionMode::Speculative => write!(f, "Speculative"),
        }
    }
}

/// The security of a program's inputs.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Policy {
    regs: BTreeMap<String, SecurityPoint>,
    mem: BTreeMap<String, SecurityPoint>,
}

impl Policy {
    pub fn new() -> Policy {
        Policy::default()
    }

    /// Read a policy from its JSON form, `{"regs": {...}, "mem": {...}}`.
    pub fn from_json(json: &str) -> Result<Policy, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn regs(&self) -> &BTreeMap<String, SecurityPoint> {
        &self.regs
    }

    pub fn mem(&self) -> &BTreeMap<String, SecurityPoint> {
        &self.mem
    }

    pub fn set_reg<S: Into<String>>(&mut self, name: S, point: SecurityPoint) {
        self.regs.insert(name.into(), point);
    }

    pub fn set_mem<S: Into<String>>(&mut self, key: S, point: SecurityPoint) {
        self.mem.insert(key.into(), point);
    }

    /// A builder-style form of `set_reg`.
    pub fn reg<S: Into<String>>(mut self, name: S, point: SecurityPoint) -> Policy {
        self.set_reg(name, point);
        self
    }

    /// A builder-style form of `set_mem`.
    pub fn cell<S: Into<String>>(mut self, key: S, point: SecurityPoint) -> Policy {
        self.set_mem(key, point);
        self
    }
}

/// The abstract state at one program point.
///
/// Registers missing from `regs` read as `(Low, Low)` and memory cells missing
/// from `mem` read as `(High, High)`. A missing observation is `Bot`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsState {
    regs: BTreeMap<String, RelValue>,
    mem: BTreeMap<String, RelValue>,
    obs_mem: BTreeMap<String, LatticeValue>,
    obs_ctrl: BTreeMap<String, LatticeValue>,
}

fn default_reg() -> RelValue {
    RelValue::low()
}

fn default_cell() -> RelValue {
    RelValue::high()
}

/// Update one observation key.
///
/// In committed execution a high observation establishes `EqHigh` as the
/// baseline. Speculatively, a high observation without that baseline is a
/// `Leak`, and `Leak` never goes away.
fn observe(
    observations: &mut BTreeMap<String, LatticeValue>,
    key: String,
    point: SecurityPoint,
    mode: ExecutionMode,
) {
    let current = observations
        .get(&key)
        .cloned()
        .unwrap_or(LatticeValue::Bot);
    let next = match mode {
        ExecutionMode::NS => {
            if point.is_high_like() {
                current.join(LatticeValue::EqHigh)
            } else {
                current.join(LatticeValue::EqLow)
            }
        }
        ExecutionMode::Speculative => {
            if current == LatticeValue::Leak {
                LatticeValue::Leak
            } else if point.is_high_like() {
                if current == LatticeValue::EqHigh {
                    LatticeValue::EqHigh
                } else {
                    LatticeValue::Leak
                }
            } else {
                current.join(LatticeValue::EqLow)
            }
        }
    };
    observations.insert(key, next);
}

fn join_maps<K: Clone + Ord, V: Clone>(
    lhs: &BTreeMap<K, V>,
    rhs: &BTreeMap<K, V>,
    missing: Option<&V>,
    join: fn(&V, &V) -> V,
) -> BTreeMap<K, V> {
    let mut joined = lhs.clone();
    for (key, value) in rhs {
        let next = match lhs.get(key) {
            Some(current) => join(current, value),
            None => match missing {
                Some(missing) => join(missing, value),
                None => value.clone(),
            },
        };
        joined.insert(key.clone(), next);
    }
    if let Some(missing) = missing {
        for (key, value) in lhs {
            if !rhs.contains_key(key) {
                joined.insert(key.clone(), join(value, missing));
            }
        }
    }
    joined
}

impl AbsState {
    /// The empty state.
    pub fn new() -> AbsState {
        AbsState::default()
    }

    /// The state analysis starts from: every policy entry, and every named
    /// register, seeded with its initial value.
    pub fn seeded<'r, I>(policy: &Policy, registers: I) -> AbsState
    where
        I: IntoIterator<Item = &'r str>,
    {
        let mut state = AbsState::new();
        for register in registers {
            state.regs.insert(register.to_string(), default_reg());
        }
        for (name, point) in policy.regs() {
            state.regs.insert(name.clone(), RelValue::uniform(*point));
        }
        for (key, point) in policy.mem() {
            state.mem.insert(key.clone(), RelValue::uniform(*point));
        }
        state
    }

    pub fn regs(&self) -> &BTreeMap<String, RelValue> {
        &self.regs
    }

    pub fn mem(&self) -> &BTreeMap<String, RelValue> {
        &self.mem
    }

    pub fn obs_mem(&self) -> &BTreeMap<String, LatticeValue> {
        &self.obs_mem
    }

    pub fn obs_ctrl(&self) -> &BTreeMap<String, LatticeValue> {
        &self.obs_ctrl
    }

    pub fn reg(&self, name: &str) -> RelValue {
        self.regs.get(name).cloned().unwrap_or_else(default_reg)
    }

    pub fn cell(&self, key: &str) -> RelValue {
        self.mem.get(key).cloned().unwrap_or_else(default_cell)
    }

    /// Write a register. A committed write replaces both sides, a speculative
    /// write joins into the speculative side only.
    pub fn write_reg(&mut self, name: &str, value: RelValue, mode: ExecutionMode) {
        let next = written(self.reg(name), value, mode);
        self.regs.insert(name.to_string(), next);
    }

    /// Write a memory cell, with the same rules as `write_reg`.
    pub fn write_cell(&mut self, key: &str, value: RelValue, mode: ExecutionMode) {
        let next = written(self.cell(key), value, mode);
        self.mem.insert(key.to_string(), next);
    }

    pub fn observe_mem<S: Into<String>>(&mut self, key: S, point: SecurityPoint, mode: ExecutionMode) {
        observe(&mut self.obs_mem, key.into(), point, mode);
    }

    pub fn observe_ctrl<S: Into<String>>(&mut self, key: S, point: SecurityPoint, mode: ExecutionMode) {
        observe(&mut self.obs_ctrl, key.into(), point, mode);
    }

    /// Every observation that witnesses a violation, as
    /// `(channel, key, value)`.
    pub fn violations(&self) -> Vec<(&'static str, &str, LatticeValue)> {
        let obs_mem = self
            .obs_mem
            .iter()
            .map(|(key, value)| ("obsMem", key.as_str(), *value));
        let obs_ctrl = self
            .obs_ctrl
            .iter()
            .map(|(key, value)| ("obsCtrl", key.as_str(), *value));
        obs_mem
            .chain(obs_ctrl)
            .filter(|(_, _, value)| value.is_violation())
            .collect()
    }

    pub fn has_violation(&self) -> bool {
        self.obs_mem
            .values()
            .chain(self.obs_ctrl.values())
            .any(|value| value.is_violation())
    }

    /// The least upper bound of two states.
    pub fn join(&self, other: &AbsState) -> AbsState {
        fn join_rel(lhs: &RelValue, rhs: &RelValue) -> RelValue {
            lhs.join(rhs)
        }
        fn join_lattice(lhs: &LatticeValue, rhs: &LatticeValue) -> LatticeValue {
            lhs.join(*rhs)
        }

        AbsState {
            regs: join_maps(&self.regs, &other.regs, Some(&default_reg()), join_rel),
            mem: join_maps(&self.mem, &other.mem, Some(&default_cell()), join_rel),
            obs_mem: join_maps(&self.obs_mem, &other.obs_mem, None, join_lattice),
            obs_ctrl: join_maps(&self.obs_ctrl, &other.obs_ctrl, None, join_lattice),
        }
    }

    /// Join `other` into this state. Returns true if this state changed.
    pub fn merge(&mut self, other: &AbsState) -> bool {
        let joined = self.join(other);
        if joined == *self {
            false
        } else {
            *self = joined;
            true
        }
    }

    /// Join only the observation channels of `other` into this state.
    /// Returns true if this state changed.
    pub fn merge_observations(&mut self, other: &AbsState) -> bool {
        let observations = AbsState {
            regs: self.regs.clone(),
            mem: self.mem.clone(),
            obs_mem: other.obs_mem.clone(),
            obs_ctrl: other.obs_ctrl.clone(),
        };
        self.merge(&observations)
    }
}

fn written(current: RelValue, value: RelValue, mode: ExecutionMode) -> RelValue {
    match mode {
        ExecutionMode::NS => value,
        ExecutionMode::Speculative => RelValue::new(current.ns(), current.sp().join(value.sp())),
    }
}

impl fmt::Display for AbsState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (name, value) in &self.regs {
            writeln!(f, "reg {} = {}", name, value)?;
        }
        for (key, value) in &self.mem {
            writeln!(f, "mem [{}] = {}", key, value)?;
        }
        for (key, value) in &self.obs_mem {
            writeln!(f, "obsMem {} = {}", key, value)?;
        }
        for (key, value) in &self.obs_ctrl {
            writeln!(f, "obsCtrl {} = {}", key, value)?;
        }
        Ok(())
    }
}
