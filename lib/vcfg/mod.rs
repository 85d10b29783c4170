//! The speculative control flow graph.
//!
//! A `StaticGraph` holds one `ns` node per program instruction, wired the way
//! the program commits, plus `spec` nodes and edges modelling the mispredicted
//! side of every `beqz`. How the speculative side is laid out depends on the
//! `BuildMode`; see `build_vcfg`.
//!
//! Node indices follow insertion order, so the `ns` nodes of a built graph
//! always come first, in program counter order.

use crate::graph::{self, Graph};
use crate::il::Instruction;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

mod builder;
mod options;

pub use self::builder::{build_vcfg, build_vcfg_from_source};
pub use self::options::*;

/// Whether a node belongs to committed or speculative execution.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Ns,
    Spec,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Ns,
    Spec,
    /// From the end of a speculative path back into committed execution.
    Rollback,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EdgeKind::Ns => write!(f, "ns"),
            EdgeKind::Spec => write!(f, "spec"),
            EdgeKind::Rollback => write!(f, "rollback"),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecPhase {
    Begin,
    End,
}

/// Marks a `spec-begin` or `spec-end` node of a speculation context.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SpecContext {
    id: usize,
    phase: SpecPhase,
}

impl SpecContext {
    pub fn new(id: usize, phase: SpecPhase) -> SpecContext {
        SpecContext { id, phase }
    }

    pub fn begin(id: usize) -> SpecContext {
        SpecContext::new(id, SpecPhase::Begin)
    }

    pub fn end(id: usize) -> SpecContext {
        SpecContext::new(id, SpecPhase::End)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn phase(&self) -> SpecPhase {
        self.phase
    }
}

/// The branch a speculative node was reached from, and the context it runs in.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecOrigin {
    branch_pc: usize,
    context: usize,
}

impl SpecOrigin {
    pub fn new(branch_pc: usize, context: usize) -> SpecOrigin {
        SpecOrigin { branch_pc, context }
    }

    pub fn branch_pc(&self) -> usize {
        self.branch_pc
    }

    pub fn context(&self) -> usize {
        self.context
    }
}

/// A node in a `StaticGraph`.
///
/// Real instructions have a non-negative `pc`. The `spec-begin` and `spec-end`
/// markers of light mode have a negative `pc` and carry no instruction.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    #[serde(skip)]
    index: usize,
    id: String,
    pc: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spec_origin: Option<SpecOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spec_context: Option<SpecContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instruction_ast: Option<Instruction>,
}

impl GraphNode {
    pub fn new<S: Into<String>>(id: S, pc: i64, kind: NodeKind) -> GraphNode {
        GraphNode {
            index: 0,
            id: id.into(),
            pc,
            label: None,
            kind,
            spec_origin: None,
            spec_context: None,
            instruction: None,
            instruction_ast: None,
        }
    }

    /// Attach an instruction, and its rendering.
    pub fn with_instruction(mut self, instruction: Instruction) -> GraphNode {
        self.instruction = Some(instruction.to_string());
        self.instruction_ast = Some(instruction);
        self
    }

    /// Attach only the text of an instruction. The analysis parses it on
    /// demand.
    pub fn with_instruction_text<S: Into<String>>(mut self, text: S) -> GraphNode {
        self.instruction = Some(text.into());
        self.instruction_ast = None;
        self
    }

    pub fn with_label<S: Into<String>>(mut self, label: Option<S>) -> GraphNode {
        self.label = label.map(|label| label.into());
        self
    }

    pub fn with_spec_origin(mut self, spec_origin: SpecOrigin) -> GraphNode {
        self.spec_origin = Some(spec_origin);
        self
    }

    pub fn with_spec_context(mut self, spec_context: SpecContext) -> GraphNode {
        self.spec_context = Some(spec_context);
        self
    }

    /// The index of this node in its graph.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pc(&self) -> i64 {
        self.pc
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_spec(&self) -> bool {
        self.kind == NodeKind::Spec
    }

    /// True for the synthetic `spec-begin`/`spec-end` nodes.
    pub fn is_marker(&self) -> bool {
        self.pc < 0
    }

    pub fn spec_origin(&self) -> Option<&SpecOrigin> {
        self.spec_origin.as_ref()
    }

    pub fn spec_context(&self) -> Option<&SpecContext> {
        self.spec_context.as_ref()
    }

    /// The speculation context this node belongs to, if any.
    pub fn context_id(&self) -> Option<usize> {
        self.spec_context
            .map(|context| context.id())
            .or_else(|| self.spec_origin.map(|origin| origin.context()))
    }

    pub fn is_spec_end(&self) -> bool {
        self.spec_context
            .map(|context| context.phase() == SpecPhase::End)
            .unwrap_or(false)
    }

    /// The rendered instruction.
    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    pub fn instruction_ast(&self) -> Option<&Instruction> {
        self.instruction_ast.as_ref()
    }
}

impl graph::Vertex for GraphNode {
    fn index(&self) -> usize {
        self.index
    }

    fn dot_label(&self) -> String {
        match (&self.instruction, &self.spec_context) {
            (Some(instruction), _) => format!("{}\n{}", self.id, instruction),
            (None, Some(context)) => match context.phase() {
                SpecPhase::Begin => format!("spec-begin {}", context.id()),
                SpecPhase::End => format!("spec-end {}", context.id()),
            },
            (None, None) => self.id.clone(),
        }
    }

    fn dot_fill_color(&self) -> String {
        match self.kind {
            NodeKind::Ns => "#ffddcc".to_string(),
            NodeKind::Spec => {
                if self.is_marker() {
                    "#dddddd".to_string()
                } else {
                    "#ccddff".to_string()
                }
            }
        }
    }
}

/// An edge in a `StaticGraph`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GraphEdge {
    #[serde(skip)]
    head: usize,
    #[serde(skip)]
    tail: usize,
    source: String,
    target: String,
    kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl GraphEdge {
    pub fn new<S: Into<String>, T: Into<String>>(source: S, target: T, kind: EdgeKind) -> GraphEdge {
        GraphEdge {
            head: 0,
            tail: 0,
            source: source.into(),
            target: target.into(),
            kind,
            label: None,
        }
    }

    pub fn with_label<S: Into<String>>(mut self, label: S) -> GraphEdge {
        self.label = Some(label.into());
        self
    }

    /// Id of the node this edge leaves.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Id of the node this edge enters.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl graph::Edge for GraphEdge {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }

    fn dot_label(&self) -> String {
        match self.label {
            Some(ref label) => label.clone(),
            None => self.kind.to_string(),
        }
    }

    fn dot_style(&self) -> String {
        match self.kind {
            EdgeKind::Ns => "solid".to_string(),
            EdgeKind::Spec => "dashed".to_string(),
            EdgeKind::Rollback => "dotted".to_string(),
        }
    }

    fn dot_color(&self) -> String {
        match self.kind {
            EdgeKind::Ns => "#000000".to_string(),
            EdgeKind::Spec => "#0000aa".to_string(),
            EdgeKind::Rollback => "#aa0000".to_string(),
        }
    }
}

/// A graph of committed and speculative control flow.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(into = "StaticGraphWire", try_from = "StaticGraphWire")]
pub struct StaticGraph {
    graph: Graph<GraphNode, GraphEdge>,
    ids: BTreeMap<String, usize>,
}

impl StaticGraph {
    pub fn new() -> StaticGraph {
        StaticGraph {
            graph: Graph::new(),
            ids: BTreeMap::new(),
        }
    }

    /// Get the underlying graph.
    pub fn graph(&self) -> &Graph<GraphNode, GraphEdge> {
        &self.graph
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.num_vertices()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.num_edges()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.num_vertices() == 0
    }

    /// Insert a node, assigning it the next index.
    ///
    /// # Errors
    /// Error if a node with the same id already exists.
    pub fn insert_node(&mut self, mut node: GraphNode) -> Result<usize, Error> {
        if self.ids.contains_key(node.id()) {
            return Err(Error::Graph(format!("duplicate node id `{}`", node.id())));
        }
        let index = self.graph.num_vertices();
        node.index = index;
        self.ids.insert(node.id.clone(), index);
        self.graph.insert_vertex(node)?;
        Ok(index)
    }

    /// Insert an edge between two existing nodes.
    ///
    /// # Errors
    /// Error if either endpoint does not exist, or if there is already an
    /// edge between the two nodes.
    pub fn insert_edge(&mut self, mut edge: GraphEdge) -> Result<(), Error> {
        edge.head = self.index_of(edge.source())?;
        edge.tail = self.index_of(edge.target())?;
        self.graph.insert_edge(edge)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        match (self.ids.get(source), self.ids.get(target)) {
            (Some(head), Some(tail)) => self.graph.has_edge(*head, *tail),
            _ => false,
        }
    }

    fn index_of(&self, id: &str) -> Result<usize, Error> {
        self.ids
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Graph(format!("node `{}` does not exist", id)))
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.ids
            .get(id)
            .and_then(|index| self.graph.vertex(*index).ok())
    }

    /// Look up a node by index.
    pub fn node_at(&self, index: usize) -> Result<&GraphNode, Error> {
        self.graph.vertex(index)
    }

    /// All nodes, in index order.
    pub fn nodes(&self) -> Vec<&GraphNode> {
        self.graph.vertices()
    }

    /// All edges, ordered by source and then target index.
    pub fn edges(&self) -> Vec<&GraphEdge> {
        self.graph.edges()
    }

    /// The edges leaving the node with the given id.
    pub fn edges_out(&self, id: &str) -> Result<Vec<&GraphEdge>, Error> {
        self.graph.edges_out(self.index_of(id)?)
    }

    /// The node analysis starts from: `n0` if present, otherwise the first
    /// node.
    pub fn entry(&self) -> Option<&GraphNode> {
        self.node("n0").or_else(|| self.graph.vertices().into_iter().next())
    }

    /// The `spec-end` node of a speculation context, if the graph has one.
    pub fn spec_end_for(&self, context: usize) -> Option<&GraphNode> {
        self.graph.vertices().into_iter().find(|node| {
            node.spec_context()
                .map(|spec_context| {
                    spec_context.id() == context && spec_context.phase() == SpecPhase::End
                })
                .unwrap_or(false)
        })
    }

    /// Check the structural invariants of this graph.
    ///
    /// Node ids are unique and edge endpoints exist by construction. This
    /// additionally checks that every rollback edge leaves a `spec` node and
    /// enters an `ns` node.
    pub fn validate(&self) -> Result<(), Error> {
        for edge in self.graph.edges() {
            let source = self.graph.vertex(edge.head)?;
            let target = self.graph.vertex(edge.tail)?;
            if source.id() != edge.source() || target.id() != edge.target() {
                return Err(Error::Graph(format!(
                    "edge {} -> {} does not match its endpoints",
                    edge.source(),
                    edge.target()
                )));
            }
            if edge.kind() == EdgeKind::Rollback
                && (source.kind() != NodeKind::Spec || target.kind() != NodeKind::Ns)
            {
                return Err(Error::Graph(format!(
                    "rollback edge {} -> {} must go from a spec node to an ns node",
                    edge.source(),
                    edge.target()
                )));
            }
        }
        Ok(())
    }

    /// Project this graph onto committed control flow, dropping every `spec`
    /// node and every edge that is not an `ns` edge.
    pub fn to_cfg(&self) -> Result<StaticGraph, Error> {
        let mut cfg = StaticGraph::new();
        for node in self.graph.vertices() {
            if node.kind() == NodeKind::Ns {
                cfg.insert_node(node.clone())?;
            }
        }
        for edge in self.graph.edges() {
            if edge.kind() == EdgeKind::Ns
                && cfg.has_node(edge.source())
                && cfg.has_node(edge.target())
            {
                cfg.insert_edge(edge.clone())?;
            }
        }
        Ok(cfg)
    }

    /// Returns a string in the graphviz format.
    pub fn dot_graph(&self) -> String {
        self.graph.dot_graph()
    }
}

impl Default for StaticGraph {
    fn default() -> StaticGraph {
        StaticGraph::new()
    }
}

/// Free-standing form of `StaticGraph::to_cfg`.
pub fn to_cfg(graph: &StaticGraph) -> Result<StaticGraph, Error> {
    graph.to_cfg()
}

#[derive(Deserialize, Serialize)]
struct StaticGraphWire {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl From<StaticGraph> for StaticGraphWire {
    fn from(graph: StaticGraph) -> StaticGraphWire {
        StaticGraphWire {
            nodes: graph.nodes().into_iter().cloned().collect(),
            edges: graph.edges().into_iter().cloned().collect(),
        }
    }
}

impl TryFrom<StaticGraphWire> for StaticGraph {
    type Error = Error;

    fn try_from(wire: StaticGraphWire) -> Result<StaticGraph, Error> {
        let mut graph = StaticGraph::new();
        for node in wire.nodes {
            graph.insert_node(node)?;
        }
        for edge in wire.edges {
            graph.insert_edge(edge)?;
        }
        graph.validate()?;
        Ok(graph)
    }
}
