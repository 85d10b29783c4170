use crate::analysis::state::Policy;
use crate::vcfg::SpeculationMode;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::default;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_SPEC_WINDOW: i64 = 8;
pub const DEFAULT_MAX_STEPS: usize = 10_000;
pub const DEFAULT_ITERATION_CAP: usize = 100_000;

/// The order the worklist is drained in.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceMode {
    /// First in, first out.
    #[default]
    Bfs,
    /// Last in, first out. Follows one path as far as it goes before
    /// backtracking.
    SinglePath,
}

impl FromStr for TraceMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<TraceMode, Error> {
        match s {
            "bfs" => Ok(TraceMode::Bfs),
            "single-path" => Ok(TraceMode::SinglePath),
            _ => Err(Error::UnknownOption(s.to_string())),
        }
    }
}

impl fmt::Display for TraceMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TraceMode::Bfs => write!(f, "bfs"),
            TraceMode::SinglePath => write!(f, "single-path"),
        }
    }
}

/// Options for `analyze`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzeOptions {
    policy: Policy,
    entry_regs: Vec<String>,
    entry_node_id: Option<String>,
    trace_mode: TraceMode,
    max_steps: usize,
    iteration_cap: usize,
    speculation_mode: SpeculationMode,
    spec_window: i64,
}

impl AnalyzeOptions {
    /// Create a new set of AnalyzeOptions with the default settings.
    pub fn new() -> AnalyzeOptions {
        AnalyzeOptions::default()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
    }

    /// Registers seeded at entry even if the program never names them.
    pub fn entry_regs(&self) -> &[String] {
        &self.entry_regs
    }

    pub fn set_entry_regs(&mut self, entry_regs: Vec<String>) {
        self.entry_regs = entry_regs;
    }

    /// The node to start from, instead of the graph's entry.
    pub fn entry_node_id(&self) -> Option<&str> {
        self.entry_node_id.as_deref()
    }

    pub fn set_entry_node_id(&mut self, entry_node_id: Option<String>) {
        self.entry_node_id = entry_node_id;
    }

    pub fn trace_mode(&self) -> TraceMode {
        self.trace_mode
    }

    pub fn set_trace_mode(&mut self, trace_mode: TraceMode) {
        self.trace_mode = trace_mode;
    }

    /// The longest trace analysis may produce.
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn set_max_steps(&mut self, max_steps: usize) {
        self.max_steps = max_steps;
    }

    /// The most state-changing merges analysis may perform.
    pub fn iteration_cap(&self) -> usize {
        self.iteration_cap
    }

    pub fn set_iteration_cap(&mut self, iteration_cap: usize) {
        self.iteration_cap = iteration_cap;
    }

    pub fn speculation_mode(&self) -> SpeculationMode {
        self.speculation_mode
    }

    pub fn set_speculation_mode(&mut self, speculation_mode: SpeculationMode) {
        self.speculation_mode = speculation_mode;
    }

    /// How many instructions one speculation context may execute.
    ///
    /// The remaining window is part of every speculative state, so analysis
    /// cost grows linearly with this value. Speculative loops with a large
    /// window can run into `max_steps` or `iteration_cap`.
    pub fn spec_window(&self) -> i64 {
        self.spec_window
    }

    pub fn set_spec_window(&mut self, spec_window: i64) {
        self.spec_window = spec_window;
    }
}

impl default::Default for AnalyzeOptions {
    fn default() -> AnalyzeOptions {
        AnalyzeOptions {
            policy: Policy::default(),
            entry_regs: Vec::new(),
            entry_node_id: None,
            trace_mode: TraceMode::default(),
            max_steps: DEFAULT_MAX_STEPS,
            iteration_cap: DEFAULT_ITERATION_CAP,
            speculation_mode: SpeculationMode::default(),
            spec_window: DEFAULT_SPEC_WINDOW,
        }
    }
}

/// Create your analyze options with the builder pattern.
pub struct AnalyzeOptionsBuilder {
    options: AnalyzeOptions,
}

impl AnalyzeOptionsBuilder {
    pub fn new() -> AnalyzeOptionsBuilder {
        AnalyzeOptionsBuilder {
            options: AnalyzeOptions::default(),
        }
    }

    pub fn policy(mut self, policy: Policy) -> AnalyzeOptionsBuilder {
        self.options.policy = policy;
        self
    }

    pub fn entry_regs(mut self, entry_regs: Vec<String>) -> AnalyzeOptionsBuilder {
        self.options.entry_regs = entry_regs;
        self
    }

    pub fn entry_node_id<S: Into<String>>(mut self, entry_node_id: S) -> AnalyzeOptionsBuilder {
        self.options.entry_node_id = Some(entry_node_id.into());
        self
    }

    pub fn trace_mode(mut self, trace_mode: TraceMode) -> AnalyzeOptionsBuilder {
        self.options.trace_mode = trace_mode;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> AnalyzeOptionsBuilder {
        self.options.max_steps = max_steps;
        self
    }

    pub fn iteration_cap(mut self, iteration_cap: usize) -> AnalyzeOptionsBuilder {
        self.options.iteration_cap = iteration_cap;
        self
    }

    pub fn speculation_mode(mut self, speculation_mode: SpeculationMode) -> AnalyzeOptionsBuilder {
        self.options.speculation_mode = speculation_mode;
        self
    }

    pub fn spec_window(mut self, spec_window: i64) -> AnalyzeOptionsBuilder {
        self.options.spec_window = spec_window;
        self
    }

    pub fn build(self) -> AnalyzeOptions {
        self.options
    }
}

impl default::Default for AnalyzeOptionsBuilder {
    fn default() -> AnalyzeOptionsBuilder {
        AnalyzeOptionsBuilder::new()
    }
}
