//! The worklist fixpoint driver.
//!
//! States are keyed by node, execution mode and the stack of open speculation
//! contexts. Each stack frame carries the number of speculative instructions
//! its context may still execute, so a speculative path ends either where the
//! graph ends it or where its window runs out, whichever comes first.

use crate::analysis::options::*;
use crate::analysis::semantics;
use crate::analysis::state::{AbsState, ExecutionMode};
use crate::analysis::lattice::SecurityPoint;
use crate::vcfg::{self, BuildOptions, EdgeKind, GraphNode, SpecPhase, SpeculationMode, StaticGraph};
use crate::{Error, ErrorType};
use log::{debug, info, trace, warn};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Version of the `AnalysisResult` wire format.
pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Verdict {
    Secure,
    #[serde(rename = "SNI_Violation")]
    SniViolation,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Secure => write!(f, "Secure"),
            Verdict::SniViolation => write!(f, "SNI_Violation"),
        }
    }
}

/// One application of an instruction during analysis.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    step_id: usize,
    node_id: String,
    pc: i64,
    execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    state: AbsState,
    is_violation: bool,
}

impl TraceStep {
    pub fn step_id(&self) -> usize {
        self.step_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn pc(&self) -> i64 {
        self.pc
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    /// The instruction executed, or the marker passed through.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The state after this step.
    pub fn state(&self) -> &AbsState {
        &self.state
    }

    pub fn is_violation(&self) -> bool {
        self.is_violation
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Trace {
    steps: Vec<TraceStep>,
}

impl Trace {
    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// An `Error`, in the form it is reported in an `AnalysisResult`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    error_type: ErrorType,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl ErrorInfo {
    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&serde_json::Value> {
        self.detail.as_ref()
    }
}

impl From<&Error> for ErrorInfo {
    fn from(error: &Error) -> ErrorInfo {
        ErrorInfo {
            error_type: error.error_type(),
            message: error.to_string(),
            detail: error.detail(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum WarningType {
    /// The policy assigns `Top` to an input, so the verdict may be
    /// conservative.
    TopObserved,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Warning {
    #[serde(rename = "type")]
    warning_type: WarningType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl Warning {
    pub fn warning_type(&self) -> WarningType {
        self.warning_type
    }

    pub fn detail(&self) -> Option<&serde_json::Value> {
        self.detail.as_ref()
    }
}

/// The outcome of one analysis.
///
/// When `error` is set, the trace holds the steps taken before the failure
/// and the verdict is `Secure` only in the sense that no violation was found
/// before it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    schema_version: String,
    graph: StaticGraph,
    trace: Trace,
    trace_mode: TraceMode,
    result: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<Warning>,
}

impl AnalysisResult {
    fn failed(graph: StaticGraph, options: &AnalyzeOptions, error: &Error) -> AnalysisResult {
        AnalysisResult {
            schema_version: SCHEMA_VERSION.to_string(),
            graph,
            trace: Trace::default(),
            trace_mode: options.trace_mode(),
            result: Verdict::Secure,
            error: Some(ErrorInfo::from(error)),
            warnings: policy_warnings(options),
        }
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// The graph that was analyzed.
    pub fn graph(&self) -> &StaticGraph {
        &self.graph
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn steps(&self) -> &[TraceStep] {
        self.trace.steps()
    }

    pub fn trace_mode(&self) -> TraceMode {
        self.trace_mode
    }

    pub fn verdict(&self) -> Verdict {
        self.result
    }

    pub fn is_secure(&self) -> bool {
        self.error.is_none() && self.result == Verdict::Secure
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// The first violating step, if any.
    pub fn violation(&self) -> Option<&TraceStep> {
        self.trace.steps.iter().find(|step| step.is_violation())
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn policy_warnings(options: &AnalyzeOptions) -> Vec<Warning> {
    let regs = options
        .policy()
        .regs()
        .iter()
        .map(|(name, point)| ("regs", name, point));
    let mem = options
        .policy()
        .mem()
        .iter()
        .map(|(name, point)| ("mem", name, point));
    regs.chain(mem)
        .filter(|(_, _, point)| **point == SecurityPoint::Top)
        .map(|(channel, name, _)| Warning {
            warning_type: WarningType::TopObserved,
            detail: Some(json!({ "channel": channel, "name": name })),
        })
        .collect()
}

/// Check a graph for speculative non-interference.
///
/// This never fails. Errors are reported in `AnalysisResult::error`, along
/// with the trace computed before the failure.
pub fn analyze(graph: &StaticGraph, options: &AnalyzeOptions) -> AnalysisResult {
    let mut engine = Engine::new(graph, options);
    let outcome = engine.run();

    let (result, error) = match outcome {
        Ok(verdict) => (verdict, None),
        Err(error) => {
            warn!("analysis stopped: {}", error);
            (Verdict::Secure, Some(ErrorInfo::from(&error)))
        }
    };

    debug!(
        "{} after {} steps and {} relaxations",
        result,
        engine.steps.len(),
        engine.relaxations
    );

    AnalysisResult {
        schema_version: SCHEMA_VERSION.to_string(),
        graph: graph.clone(),
        trace: Trace {
            steps: engine.steps,
        },
        trace_mode: options.trace_mode(),
        result,
        error,
        warnings: policy_warnings(options),
    }
}

/// Parse, build and analyze MuASM source text.
pub fn analyze_source(
    source: &str,
    build_options: &BuildOptions,
    options: &AnalyzeOptions,
) -> AnalysisResult {
    match vcfg::build_vcfg_from_source(source, build_options) {
        Ok(graph) => analyze(&graph, options),
        Err(error) => {
            warn!("could not build graph: {}", error);
            AnalysisResult::failed(StaticGraph::new(), options, &error)
        }
    }
}

/// An open speculation context.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct Frame {
    context: Option<usize>,
    remaining: usize,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct StateKey {
    node: usize,
    mode: ExecutionMode,
    frames: Vec<Frame>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Payload {
    Full,
    /// Only the observation channels survive a rollback.
    Observations,
}

struct Engine<'a> {
    graph: &'a StaticGraph,
    options: &'a AnalyzeOptions,
    initial: AbsState,
    states: BTreeMap<StateKey, AbsState>,
    worklist: VecDeque<StateKey>,
    queued: FxHashSet<StateKey>,
    steps: Vec<TraceStep>,
    relaxations: usize,
}

fn describe(node: &GraphNode) -> Option<String> {
    if let Some(instruction) = node.instruction() {
        return Some(instruction.to_string());
    }
    node.spec_context().map(|context| match context.phase() {
        SpecPhase::Begin => format!("spec-begin {}", context.id()),
        SpecPhase::End => format!("spec-end {}", context.id()),
    })
}

impl<'a> Engine<'a> {
    fn new(graph: &'a StaticGraph, options: &'a AnalyzeOptions) -> Engine<'a> {
        let mut registers: BTreeSet<String> = options.entry_regs().iter().cloned().collect();
        for node in graph.nodes() {
            // Unparseable text is reported when the node is reached.
            if let Ok(Some(instruction)) = semantics::node_instruction(node) {
                registers.extend(instruction.registers().into_iter().map(|r| r.to_string()));
            }
        }

        Engine {
            graph,
            options,
            initial: AbsState::seeded(options.policy(), registers.iter().map(|r| r.as_str())),
            states: BTreeMap::new(),
            worklist: VecDeque::new(),
            queued: FxHashSet::default(),
            steps: Vec::new(),
            relaxations: 0,
        }
    }

    fn window(&self) -> usize {
        self.options.spec_window().max(0) as usize
    }

    fn stack_guard(&self) -> bool {
        self.options.speculation_mode() == SpeculationMode::StackGuard
    }

    fn enqueue(&mut self, key: StateKey) {
        if self.queued.insert(key.clone()) {
            self.worklist.push_back(key);
        }
    }

    fn pop(&mut self) -> Option<StateKey> {
        let key = match self.options.trace_mode() {
            TraceMode::Bfs => self.worklist.pop_front(),
            TraceMode::SinglePath => self.worklist.pop_back(),
        }?;
        self.queued.remove(&key);
        Some(key)
    }

    fn entry_key(&self) -> Result<Option<StateKey>, Error> {
        let entry = match self.options.entry_node_id() {
            Some(id) => self
                .graph
                .node(id)
                .ok_or_else(|| Error::Graph(format!("entry node `{}` does not exist", id)))?,
            None => match self.graph.entry() {
                Some(entry) => entry,
                None => return Ok(None),
            },
        };

        Ok(Some(if entry.is_spec() {
            StateKey {
                node: entry.index(),
                mode: ExecutionMode::Speculative,
                frames: vec![Frame {
                    context: entry.context_id(),
                    remaining: self.window(),
                }],
            }
        } else {
            StateKey {
                node: entry.index(),
                mode: ExecutionMode::NS,
                frames: Vec::new(),
            }
        }))
    }

    fn run(&mut self) -> Result<Verdict, Error> {
        self.graph.validate()?;
        if self.options.spec_window() <= 0 {
            return Err(Error::InvalidSpecWindow(self.options.spec_window()));
        }

        let entry = match self.entry_key()? {
            Some(entry) => entry,
            None => return Ok(Verdict::Secure),
        };
        self.states.insert(entry.clone(), self.initial.clone());
        self.enqueue(entry);

        let graph = self.graph;
        while let Some(key) = self.pop() {
            if self.steps.len() >= self.options.max_steps() {
                return Err(Error::MaxStepsExceeded(self.options.max_steps()));
            }

            let node = graph.node_at(key.node)?;
            let state = self
                .states
                .get(&key)
                .ok_or_else(|| Error::Custom(format!("no state for node {}", node.id())))?;

            trace!(
                "step {}: {} ({}) in {}",
                self.steps.len(),
                node.id(),
                node.instruction_ast().map_or("-", |i| i.mnemonic()),
                key.mode
            );

            let out = semantics::apply_instruction(node, state, key.mode)?;
            let is_violation = out.has_violation();

            self.steps.push(TraceStep {
                step_id: self.steps.len(),
                node_id: node.id().to_string(),
                pc: node.pc(),
                execution_mode: key.mode,
                description: describe(node),
                state: out.clone(),
                is_violation,
            });

            if is_violation {
                for (channel, observation, value) in out.violations() {
                    info!(
                        "{} {} is {} at {} ({})",
                        channel,
                        observation,
                        value,
                        node.id(),
                        key.mode
                    );
                }
                return Ok(Verdict::SniViolation);
            }

            for (target, payload) in self.transitions(&key, node)? {
                self.propagate(target, &out, payload)?;
            }
        }

        Ok(Verdict::Secure)
    }

    /// Merge `out` into the state at `target`, and queue `target` if that
    /// changed anything.
    fn propagate(&mut self, target: StateKey, out: &AbsState, payload: Payload) -> Result<(), Error> {
        let changed = match self.states.get_mut(&target) {
            Some(state) => match payload {
                Payload::Full => state.merge(out),
                Payload::Observations => state.merge_observations(out),
            },
            None => {
                let state = match payload {
                    Payload::Full => out.clone(),
                    Payload::Observations => {
                        let mut state = self.initial.clone();
                        state.merge_observations(out);
                        state
                    }
                };
                self.states.insert(target.clone(), state);
                true
            }
        };

        if changed {
            self.relaxations += 1;
            if self.relaxations > self.options.iteration_cap() {
                return Err(Error::IterationCapExceeded(self.options.iteration_cap()));
            }
            self.enqueue(target);
        }
        Ok(())
    }

    /// The frames for a `spec` edge into `target`, or `None` if the edge may
    /// not be taken.
    fn enter(&self, key: &StateKey, frames: &[Frame], target: &GraphNode) -> Option<Vec<Frame>> {
        if key.mode == ExecutionMode::NS {
            return Some(vec![Frame {
                context: target.context_id(),
                remaining: self.window(),
            }]);
        }

        let mut frames = frames.to_vec();
        let context = match target.context_id() {
            Some(context) => context,
            None => return Some(frames),
        };
        if frames.last().map(|frame| frame.context) == Some(Some(context)) {
            return Some(frames);
        }
        if frames.iter().any(|frame| frame.context == Some(context)) {
            // An enclosing context, reached from inside a nested one.
            return if self.stack_guard() { None } else { Some(frames) };
        }
        let remaining = frames
            .last()
            .map(|frame| frame.remaining)
            .unwrap_or_else(|| self.window());
        frames.push(Frame {
            context: Some(context),
            remaining,
        });
        Some(frames)
    }

    fn transitions(&self, key: &StateKey, node: &GraphNode) -> Result<Vec<(StateKey, Payload)>, Error> {
        let graph = self.graph;
        let mut frames = key.frames.clone();
        let edges = graph.edges_out(node.id())?;

        // Whether this speculative path has to end here.
        let mut squash = false;
        if key.mode == ExecutionMode::Speculative {
            if !node.is_marker() {
                if let Some(top) = frames.last_mut() {
                    top.remaining = top.remaining.saturating_sub(1);
                    squash = top.remaining == 0;
                }
                if let Some(instruction) = semantics::node_instruction(node)? {
                    squash |= instruction.is_barrier();
                }
            }
            squash |= edges.is_empty() && !node.is_spec_end();
        }

        if squash {
            let end = frames
                .last()
                .and_then(|frame| frame.context)
                .and_then(|context| graph.spec_end_for(context));
            if let Some(end) = end {
                if end.index() != node.index() {
                    trace!("squashing speculation at {} into {}", node.id(), end.id());
                    let target = StateKey {
                        node: end.index(),
                        mode: ExecutionMode::Speculative,
                        frames,
                    };
                    return Ok(vec![(target, Payload::Full)]);
                }
            }
        }

        let mut transitions = Vec::new();
        for edge in edges {
            // A squashed path can only roll back.
            if squash && edge.kind() != EdgeKind::Rollback {
                continue;
            }

            let target = graph
                .node(edge.target())
                .ok_or_else(|| Error::Graph(format!("node `{}` does not exist", edge.target())))?;

            let (mode, target_frames, payload) = match edge.kind() {
                EdgeKind::Ns => (key.mode, frames.clone(), Payload::Full),
                EdgeKind::Spec => match self.enter(key, &frames, target) {
                    Some(target_frames) => {
                        (ExecutionMode::Speculative, target_frames, Payload::Full)
                    }
                    None => {
                        debug!("pruned {} -> {}: context already open", node.id(), target.id());
                        continue;
                    }
                },
                EdgeKind::Rollback => {
                    let top = frames.last().map(|frame| frame.context);
                    if self.stack_guard() && top.is_some() && top != Some(node.context_id()) {
                        debug!("pruned rollback {} -> {}: not the innermost context", node.id(), target.id());
                        continue;
                    }
                    (ExecutionMode::NS, Vec::new(), Payload::Observations)
                }
            };

            if self.stack_guard() && target.is_spec_end() {
                let top = target_frames.last().map(|frame| frame.context);
                if top != Some(target.context_id()) {
                    debug!("pruned {} -> {}: context mismatch", node.id(), target.id());
                    continue;
                }
            }

            transitions.push((
                StateKey {
                    node: target.index(),
                    mode,
                    frames: target_frames,
                },
                payload,
            ));
        }
        Ok(transitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::state::Policy;
    use crate::vcfg::{GraphEdge, NodeKind, SpecContext, SpecOrigin};

    fn secret_policy() -> Policy {
        Policy::new().cell("secret", SecurityPoint::High)
    }

    #[test]
    fn empty_graph_is_secure() {
        let result = analyze(&StaticGraph::new(), &AnalyzeOptions::default());
        assert_eq!(result.verdict(), Verdict::Secure);
        assert!(result.error().is_none());
        assert!(result.steps().is_empty());
    }

    #[test]
    fn committed_secret_loads_are_allowed() {
        let options = AnalyzeOptionsBuilder::new().policy(secret_policy()).build();
        let result = analyze_source("load x, secret\nskip", &BuildOptions::default(), &options);
        assert!(result.is_secure());
        assert_eq!(result.steps().len(), 2);
        assert_eq!(result.steps()[0].state().obs_mem()["0:secret"], crate::analysis::LatticeValue::EqHigh);
    }

    #[test]
    fn speculative_window_is_counted() {
        let source = "beqz c, End\nskip\nskip\nload x, secret\nEnd: skip";
        let leaks = |spec_window| {
            let options = AnalyzeOptionsBuilder::new()
                .policy(secret_policy())
                .spec_window(spec_window)
                .build();
            analyze_source(source, &BuildOptions::default(), &options).verdict()
        };
        assert_eq!(leaks(2), Verdict::Secure);
        assert_eq!(leaks(3), Verdict::SniViolation);
    }

    #[test]
    fn barrier_stops_speculation() {
        let source = "beqz c, End\nspbarr\nload x, secret\nEnd: skip";
        let options = AnalyzeOptionsBuilder::new().policy(secret_policy()).build();
        let result = analyze_source(source, &BuildOptions::default(), &options);
        assert!(result.is_secure());
        assert!(result
            .steps()
            .iter()
            .any(|step| step.node_id() == "spec_end_0"));
    }

    #[test]
    fn invalid_spec_window() {
        let options = AnalyzeOptionsBuilder::new().spec_window(0).build();
        let result = analyze_source("skip", &BuildOptions::default(), &options);
        let error = result.error().unwrap();
        assert_eq!(error.error_type(), ErrorType::AnalysisError);
        assert!(error.message().contains("specWindow"));
    }

    #[test]
    fn max_steps() {
        let options = AnalyzeOptionsBuilder::new().max_steps(2).build();
        let result = analyze_source("skip\nskip\nskip", &BuildOptions::default(), &options);
        let error = result.error().unwrap();
        assert_eq!(error.detail().unwrap()["maxSteps"], 2);
        assert_eq!(result.steps().len(), 2);
    }

    #[test]
    fn spec_entry_node_starts_speculative() {
        let mut graph = StaticGraph::new();
        graph
            .insert_node(GraphNode::new("n0", 0, NodeKind::Ns).with_instruction_text("load x, secret"))
            .unwrap();
        graph
            .insert_node(
                GraphNode::new("spec_begin_0", -1, NodeKind::Spec)
                    .with_spec_origin(SpecOrigin::new(0, 0))
                    .with_spec_context(SpecContext::begin(0)),
            )
            .unwrap();
        graph
            .insert_node(
                GraphNode::new("spec_end_0", -2, NodeKind::Spec)
                    .with_spec_origin(SpecOrigin::new(0, 0))
                    .with_spec_context(SpecContext::end(0)),
            )
            .unwrap();
        for target in ["n0", "spec_end_0"] {
            graph
                .insert_edge(GraphEdge::new("spec_begin_0", target, EdgeKind::Spec))
                .unwrap();
        }

        let options = AnalyzeOptionsBuilder::new()
            .policy(secret_policy())
            .entry_node_id("spec_begin_0")
            .build();
        let result = analyze(&graph, &options);
        assert!(result.error().is_none());
        assert_eq!(result.steps()[0].node_id(), "spec_begin_0");
        assert_eq!(result.steps()[0].execution_mode(), ExecutionMode::Speculative);
        assert_eq!(result.verdict(), Verdict::SniViolation);
        let violation = result.violation().unwrap();
        assert_eq!(violation.node_id(), "n0");
        assert_eq!(violation.execution_mode(), ExecutionMode::Speculative);

        // The same load is allowed when the analysis starts committed.
        let options = AnalyzeOptionsBuilder::new().policy(secret_policy()).build();
        let result = analyze(&graph, &options);
        assert!(result.is_secure());
        assert_eq!(result.steps()[0].execution_mode(), ExecutionMode::NS);
    }

    #[test]
    fn unknown_entry_node() {
        let options = AnalyzeOptionsBuilder::new().entry_node_id("n7").build();
        let result = analyze_source("skip", &BuildOptions::default(), &options);
        assert_eq!(result.error().unwrap().error_type(), ErrorType::ParseError);
    }

    #[test]
    fn top_policy_warns() {
        let options = AnalyzeOptionsBuilder::new()
            .policy(Policy::new().reg("k", SecurityPoint::Top))
            .build();
        let result = analyze_source("x <- 1", &BuildOptions::default(), &options);
        assert!(result.is_secure());
        assert_eq!(result.warnings().len(), 1);
        assert_eq!(result.warnings()[0].warning_type(), WarningType::TopObserved);
        assert_eq!(result.warnings()[0].detail().unwrap()["name"], "k");
    }

    #[test]
    fn mismatched_spec_end_is_pruned() {
        // A nested context routed into its parent's spec-end.
        let mut graph = StaticGraph::new();
        graph
            .insert_node(GraphNode::new("n0", 0, NodeKind::Ns).with_instruction_text("skip"))
            .unwrap();
        graph
            .insert_node(
                GraphNode::new("spec_begin_0", -1, NodeKind::Spec)
                    .with_spec_origin(SpecOrigin::new(0, 0))
                    .with_spec_context(SpecContext::begin(0)),
            )
            .unwrap();
        graph
            .insert_node(
                GraphNode::new("spec_begin_1", -3, NodeKind::Spec)
                    .with_spec_origin(SpecOrigin::new(0, 1))
                    .with_spec_context(SpecContext::begin(1)),
            )
            .unwrap();
        graph
            .insert_node(
                GraphNode::new("spec_end_0", -2, NodeKind::Spec)
                    .with_spec_origin(SpecOrigin::new(0, 0))
                    .with_spec_context(SpecContext::end(0)),
            )
            .unwrap();
        for (source, target) in [
            ("n0", "spec_begin_0"),
            ("spec_begin_0", "spec_begin_1"),
            ("spec_begin_1", "spec_end_0"),
        ] {
            graph
                .insert_edge(GraphEdge::new(source, target, EdgeKind::Spec))
                .unwrap();
        }

        let guarded = AnalyzeOptionsBuilder::new()
            .speculation_mode(SpeculationMode::StackGuard)
            .build();
        let result = analyze(&graph, &guarded);
        assert!(result.is_secure());
        assert!(result.steps().iter().all(|step| step.node_id() != "spec_end_0"));

        let result = analyze(&graph, &AnalyzeOptions::default());
        assert!(result.steps().iter().any(|step| step.node_id() == "spec_end_0"));
    }

    #[test]
    fn result_json_shape() {
        let options = AnalyzeOptionsBuilder::new().policy(secret_policy()).build();
        let result = analyze_source(
            "beqz c, End\nload x, secret\nEnd: skip",
            &BuildOptions::default(),
            &options,
        );
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(json["result"], "SNI_Violation");
        assert_eq!(json["traceMode"], "bfs");
        assert!(json["graph"]["nodes"].is_array());
        assert!(json.get("error").is_none());
        let steps = json["trace"]["steps"].as_array().unwrap();
        let last = steps.last().unwrap();
        assert_eq!(last["isViolation"], true);
        assert_eq!(last["executionMode"], "Speculative");
        assert_eq!(last["state"]["obsMem"]["1:secret"], "Leak");
    }
}
