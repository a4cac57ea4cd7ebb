//! The plan compiler and evaluator.
//!
//! An [`ExtractorSet`] ingests any number of extractor expressions and
//! compiles them into one dataflow plan:
//!
//! ```text
//! expressions
//!     ↓ add_extractor (recursive resolve, threading the current source)
//! plan nodes (Batch / Composition) + link table
//!     ↓ compile (freeze, snapshot per-node links)
//! immutable plan
//!     ↓ extract_all (seed with the record, one compose sweep)
//! positional output vector
//! ```
//!
//! Structural deduplication happens during resolve: a composite is keyed by
//! its operation identity plus its already-resolved input ids, so
//! structurally identical sub-expressions — whether inside one registered
//! expression or across unrelated ones — share a single node. Leaf reads
//! below one source are funneled into the first batch engine that accepts
//! them, so one traversal serves all of them.
//!
//! Node ids are allocated depth-first, inputs before consumers, which makes
//! increasing-id order a valid evaluation order: the evaluator runs one
//! linear sweep, and every push lands on a strictly later node or on the
//! output vector.

#[cfg(test)]
mod test_plan;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::batch::BatchEngine;
use crate::composer::{self, ResultSink, ValueComposer};
use crate::error::{EvalError, PlanError};
use crate::extractor::{CompositeOp, Extractor};
use crate::value::Value;

type NodeId = usize;

/// Resolved producer of a value inside a plan under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Ref {
    /// The raw record handed to `extract_all`.
    Source,
    /// Output of a composition node.
    Node(NodeId),
    /// Local output slot of a batch node.
    BatchSlot { batch: NodeId, slot: usize },
}

/// Directed edge from a producer to its consumer(s). Fan-out is a chain of
/// `Fork`s, appended in O(1) when a producer gains another consumer.
#[derive(Debug, Clone)]
enum Link {
    /// Slot of the final output vector.
    Result(usize),
    /// Input slot `arg` of a downstream node.
    Input { node: NodeId, arg: usize },
    Fork(Box<Link>, Box<Link>),
}

/// CSE identity of one composition: operation identity plus resolved inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CompositionKey {
    op: CompositeOp,
    inputs: SmallVec<[Ref; 2]>,
}

#[derive(Debug)]
enum PlanNode {
    Batch(BatchNode),
    Composition(CompositionNode),
}

#[derive(Debug)]
struct BatchNode {
    engine: Box<dyn BatchEngine>,
    /// Outgoing link per engine-local slot, snapshotted by `compile`.
    out_links: Vec<Link>,
}

#[derive(Debug)]
struct CompositionNode {
    /// The full composite expression, kept for diagnostics.
    expr: Extractor,
    op: CompositeOp,
    /// Snapshotted by `compile`.
    out_link: Option<Link>,
}

/// A set of extractor expressions compiled into one shared plan.
///
/// Build incrementally with [`add_extractor`](Self::add_extractor), freeze
/// with [`compile`](Self::compile), then run
/// [`extract_all`](Self::extract_all) against any number of records. A
/// compiled set is immutable and can be shared across threads; each
/// evaluation owns its own transient state.
#[derive(Debug, Default)]
pub struct ExtractorSet {
    nodes: Vec<PlanNode>,
    /// Batch nodes reading from a given source, probed for compatibility.
    batches: FxHashMap<Ref, Vec<NodeId>>,
    /// Composition dedup index.
    index: FxHashMap<CompositionKey, NodeId>,
    /// Producer → consumer edges, keyed by producer.
    links: FxHashMap<Ref, Link>,
    /// Resolved id per output slot, in registration order.
    outs: Vec<Ref>,
    compiled: bool,
}

impl ExtractorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of output slots (distinct top-level registrations).
    pub fn size(&self) -> usize {
        self.outs.len()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Registers a top-level expression and returns its output slot.
    ///
    /// An expression that resolves (after deduplication) to an id already
    /// bound to an output slot reuses that slot.
    pub fn add_extractor(&mut self, extractor: &Extractor) -> Result<usize, PlanError> {
        if self.compiled {
            return Err(PlanError::AlreadyCompiled);
        }
        let id = self.resolve(Ref::Source, extractor)?;
        if let Some(slot) = self.outs.iter().position(|out| *out == id) {
            return Ok(slot);
        }
        let slot = self.outs.len();
        self.outs.push(id);
        self.add_link(id, Link::Result(slot));
        Ok(slot)
    }

    /// Resolves `extractor` against the producer `source`, creating nodes
    /// and links as needed, and returns the id producing its value.
    fn resolve(&mut self, source: Ref, extractor: &Extractor) -> Result<Ref, PlanError> {
        match extractor {
            Extractor::Verbatim => Ok(source),
            Extractor::Chain { head, tail } => {
                let mid = self.resolve(source, head)?;
                self.resolve(mid, tail)
            }
            Extractor::Composite { op, args } => {
                let mut inputs: SmallVec<[Ref; 2]> = SmallVec::with_capacity(args.len());
                for arg in args {
                    inputs.push(self.resolve(source, arg)?);
                }
                let key = CompositionKey {
                    op: op.clone(),
                    inputs,
                };
                if let Some(&node) = self.index.get(&key) {
                    return Ok(Ref::Node(node));
                }
                let node = self.nodes.len();
                self.nodes.push(PlanNode::Composition(CompositionNode {
                    expr: extractor.clone(),
                    op: op.clone(),
                    out_link: None,
                }));
                for (arg, input) in key.inputs.iter().enumerate() {
                    self.add_link(*input, Link::Input { node, arg });
                }
                self.index.insert(key, node);
                Ok(Ref::Node(node))
            }
            Extractor::Leaf(leaf) => {
                let candidates = self.batches.get(&source).cloned().unwrap_or_default();
                for node in candidates {
                    if let PlanNode::Batch(batch) = &self.nodes[node] {
                        if leaf.is_compatible(batch.engine.as_ref()) {
                            return self.add_to_batch(node, extractor);
                        }
                    }
                }
                let node = self.nodes.len();
                self.nodes.push(PlanNode::Batch(BatchNode {
                    engine: leaf.new_engine(),
                    out_links: Vec::new(),
                }));
                self.batches.entry(source).or_default().push(node);
                // The batch consumes its source region at input slot 0.
                self.add_link(source, Link::Input { node, arg: 0 });
                self.add_to_batch(node, extractor)
            }
        }
    }

    fn add_to_batch(&mut self, node: NodeId, extractor: &Extractor) -> Result<Ref, PlanError> {
        let (PlanNode::Batch(batch), Extractor::Leaf(leaf)) = (&mut self.nodes[node], extractor)
        else {
            unreachable!("add_to_batch called for a non-batch pairing");
        };
        let slot = batch.engine.add(leaf)?;
        Ok(Ref::BatchSlot { batch: node, slot })
    }

    fn add_link(&mut self, from: Ref, link: Link) {
        match self.links.remove(&from) {
            Some(existing) => {
                self.links
                    .insert(from, Link::Fork(Box::new(existing), Box::new(link)));
            }
            None => {
                self.links.insert(from, link);
            }
        }
    }

    /// Freezes the plan: compiles every batch engine and snapshots each
    /// node's outgoing link(s) out of the link table. Idempotent; after the
    /// first call the set rejects further mutation.
    pub fn compile(&mut self) -> Result<(), PlanError> {
        if self.compiled {
            return Ok(());
        }
        self.compiled = true;
        for node in 0..self.nodes.len() {
            match &mut self.nodes[node] {
                PlanNode::Batch(batch) => {
                    batch.engine.compile()?;
                    let mut out_links = Vec::with_capacity(batch.engine.len());
                    for slot in 0..batch.engine.len() {
                        let link = self
                            .links
                            .get(&Ref::BatchSlot { batch: node, slot })
                            .cloned()
                            .ok_or(PlanError::UnlinkedSlot { node, slot })?;
                        out_links.push(link);
                    }
                    batch.out_links = out_links;
                }
                PlanNode::Composition(composition) => {
                    composition.out_link = self.links.get(&Ref::Node(node)).cloned();
                }
            }
        }
        Ok(())
    }

    /// Evaluates the compiled plan against one record.
    ///
    /// Seeds the source link with `record`, then composes every node in
    /// increasing id order; each result is pushed along the node's link(s)
    /// to consumers that are guaranteed to compose later, so one linear
    /// sweep suffices. Output slots that receive no push are simply absent
    /// for this record.
    pub fn extract_all(&self, record: &Value, out: &mut dyn ResultSink) -> Result<(), EvalError> {
        if !self.compiled {
            return Err(EvalError::NotCompiled);
        }
        let mut states: Vec<NodeState> = self.nodes.iter().map(NodeState::new).collect();
        if let Some(link) = self.links.get(&Ref::Source) {
            route(link, 0, &mut states, out, record.clone())?;
        }
        for node in 0..states.len() {
            let (head, tail) = states.split_at_mut(node + 1);
            match &self.nodes[node] {
                PlanNode::Batch(batch) => {
                    let NodeState::Batch { input, composed } = &mut head[node] else {
                        unreachable!("state kind diverged from node kind");
                    };
                    *composed = true;
                    // A source value that never arrived means every read of
                    // this batch is absent.
                    let Some(input) = input.take() else {
                        continue;
                    };
                    batch
                        .engine
                        .extract_all(&input, &mut |slot: usize, value: Value| {
                            match batch.out_links.get(slot) {
                                Some(link) => route(link, node + 1, tail, out, value),
                                None => Err(EvalError::SlotOutOfRange { slot }),
                            }
                        })?;
                }
                PlanNode::Composition(composition) => {
                    let NodeState::Composition { composer, composed } = &mut head[node] else {
                        unreachable!("state kind diverged from node kind");
                    };
                    *composed = true;
                    if let Some(value) = composer.compose()? {
                        if let Some(link) = &composition.out_link {
                            route(link, node + 1, tail, out, value)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Human-readable rendering of the compiled plan: node ids, operation
    /// descriptions and links. Diagnostics only.
    pub fn dump(&self) -> Result<String, PlanError> {
        if !self.compiled {
            return Err(PlanError::NotCompiled);
        }
        let mut out = String::from("<composite>\n");
        for (id, node) in self.nodes.iter().enumerate() {
            match node {
                PlanNode::Batch(batch) => {
                    out.push_str(&format!("<batch id=\"B{}\">\n", id));
                    batch.engine.dump(&mut out)?;
                    for (slot, link) in batch.out_links.iter().enumerate() {
                        self.dump_link(&mut out, Some(slot), link);
                    }
                    out.push_str("</batch>\n");
                }
                PlanNode::Composition(composition) => {
                    out.push_str(&format!("<composition id=\"C{}\">\n", id));
                    out.push_str(&format!("<extractor>{}</extractor>\n", composition.expr));
                    if let Some(link) = &composition.out_link {
                        self.dump_link(&mut out, None, link);
                    }
                    out.push_str("</composition>\n");
                }
            }
        }
        out.push_str("</composite>");
        Ok(out)
    }

    fn dump_link(&self, out: &mut String, slot: Option<usize>, link: &Link) {
        match link {
            Link::Fork(a, b) => {
                self.dump_link(out, slot, a);
                self.dump_link(out, slot, b);
            }
            Link::Result(result) => self.write_link(out, slot, &format!("R{}", result)),
            Link::Input { node, arg } => {
                let target = match &self.nodes[*node] {
                    PlanNode::Batch(_) => format!("B{}", node),
                    PlanNode::Composition(_) => format!("C{}[{}]", node, arg),
                };
                self.write_link(out, slot, &target);
            }
        }
    }

    fn write_link(&self, out: &mut String, slot: Option<usize>, target: &str) {
        match slot {
            Some(n) => out.push_str(&format!("<link n=\"{}\">{}</link>\n", n, target)),
            None => out.push_str(&format!("<link>{}</link>\n", target)),
        }
    }
}

/// Per-evaluation state of one node. Discarded when the call returns.
enum NodeState {
    Batch {
        input: Option<Value>,
        composed: bool,
    },
    Composition {
        composer: Box<dyn ValueComposer>,
        composed: bool,
    },
}

impl NodeState {
    fn new(node: &PlanNode) -> Self {
        match node {
            PlanNode::Batch(_) => NodeState::Batch {
                input: None,
                composed: false,
            },
            PlanNode::Composition(composition) => NodeState::Composition {
                composer: composer::new_composer(&composition.op),
                composed: false,
            },
        }
    }

    fn push(&mut self, slot: usize, value: Value) -> Result<(), EvalError> {
        match self {
            NodeState::Batch { input, composed } => {
                if *composed {
                    return Err(EvalError::PushAfterCompose);
                }
                if slot != 0 {
                    return Err(EvalError::SlotOutOfRange { slot });
                }
                if input.is_some() {
                    return Err(EvalError::DuplicateInput { slot });
                }
                *input = Some(value);
                Ok(())
            }
            NodeState::Composition { composer, composed } => {
                if *composed {
                    return Err(EvalError::PushAfterCompose);
                }
                composer.push(slot, value)
            }
        }
    }
}

/// Delivers `value` along `link`. `later` holds the states of nodes with id
/// `base..`; links may only target those (construction guarantees inputs
/// have strictly lower ids than their consumers).
fn route(
    link: &Link,
    base: usize,
    later: &mut [NodeState],
    out: &mut dyn ResultSink,
    value: Value,
) -> Result<(), EvalError> {
    match link {
        Link::Result(slot) => out.push(*slot, value),
        Link::Input { node, arg } => {
            match node.checked_sub(base).and_then(|i| later.get_mut(i)) {
                Some(state) => state.push(*arg, value),
                None => Err(EvalError::BadLinkOrder { node: *node }),
            }
        }
        Link::Fork(a, b) => {
            route(a, base, later, out, value.clone())?;
            route(b, base, later, out, value)
        }
    }
}
