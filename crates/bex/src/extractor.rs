//! The extractor expression model.
//!
//! An [`Extractor`] is an immutable, structurally comparable description of
//! how to derive one value from a binary record. Expressions are built with
//! the constructors below and handed to
//! [`ExtractorSet::add_extractor`](crate::ExtractorSet::add_extractor), which
//! compiles any number of them into a single shared plan.
//!
//! The set of variants is closed: leaves read from the record through a
//! format-specific family ([`ProtoBufExtractor`]), composites combine the
//! outputs of sub-expressions, and chains stage one extractor over the
//! output of another. Keeping the set closed is what makes structural
//! deduplication cheap — two expressions are the same computation exactly
//! when they are equal values.

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::protobuf::ProtoBufExtractor;
use crate::value::Value;

/// Binary boolean function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BoolOp {
    And,
    Or,
    Xor,
}

impl BoolOp {
    pub(crate) fn apply(self, left: bool, right: bool) -> bool {
        match self {
            BoolOp::And => left && right,
            BoolOp::Or => left || right,
            BoolOp::Xor => left ^ right,
        }
    }
}

impl Display for BoolOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BoolOp::And => write!(f, "AND"),
            BoolOp::Or => write!(f, "OR"),
            BoolOp::Xor => write!(f, "XOR"),
        }
    }
}

/// Operation identity of a composite extractor.
///
/// The variant (plus its payload) is the operation token used in structural
/// deduplication: two composites with equal ops and equal resolved inputs
/// compile to one plan node. `Filter` carries a process-unique token
/// instead, so deduplication for filters is by construction identity:
/// clones of one constructed filter dedup, independently constructed
/// filters do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CompositeOp {
    /// AND / OR / XOR over two boolean inputs.
    Bool(BoolOp),
    /// Structural equality of two inputs.
    Equals,
    /// Boolean negation of one input.
    Not,
    /// No inputs; emits the carried value every evaluation.
    Const(Value),
    /// Projects a key out of a `Value::Map` input.
    MapGet(Value),
    /// Normalizes a binary input to `Value::Bytes`.
    AsBlob,
    /// Predicate-gated pass-through of inputs (predicate, processor).
    Filter(u64),
    /// Gathers every pushed value of one input into an ordered list.
    Collect,
}

static NEXT_FILTER_TOKEN: AtomicU64 = AtomicU64::new(0);

impl CompositeOp {
    fn filter() -> Self {
        CompositeOp::Filter(NEXT_FILTER_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// One extractor expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Extractor {
    /// Identity: yields its source unchanged. Collapses to the source id
    /// during plan construction, producing no node.
    Verbatim,
    /// Two-stage chain: `tail` runs over the value produced by `head`.
    Chain {
        head: Box<Extractor>,
        tail: Box<Extractor>,
    },
    /// Format-specific leaf read, grouped into batches by the plan compiler.
    Leaf(ProtoBufExtractor),
    /// Multi-input function over the outputs of `args`.
    Composite { op: CompositeOp, args: Vec<Extractor> },
}

impl Extractor {
    pub fn verbatim() -> Self {
        Extractor::Verbatim
    }

    /// Chains `tail` over the output of `head`.
    ///
    /// When `head` supports push-down for `tail` the pair is fused at
    /// construction time into a single extractor that decodes the nested
    /// value directly from `head`'s input, skipping materialization of the
    /// intermediate value. Otherwise the two stay a two-stage chain.
    pub fn chain(head: Extractor, tail: Extractor) -> Self {
        if matches!(head, Extractor::Verbatim) {
            return tail;
        }
        if matches!(tail, Extractor::Verbatim) {
            return head;
        }
        if head.can_push_down(&tail) {
            head.push_down(tail)
        } else {
            Extractor::Chain {
                head: Box::new(head),
                tail: Box::new(tail),
            }
        }
    }

    pub fn and(left: Extractor, right: Extractor) -> Self {
        Self::boolean(BoolOp::And, left, right)
    }

    pub fn or(left: Extractor, right: Extractor) -> Self {
        Self::boolean(BoolOp::Or, left, right)
    }

    pub fn xor(left: Extractor, right: Extractor) -> Self {
        Self::boolean(BoolOp::Xor, left, right)
    }

    pub fn boolean(op: BoolOp, left: Extractor, right: Extractor) -> Self {
        Extractor::Composite {
            op: CompositeOp::Bool(op),
            args: vec![left, right],
        }
    }

    pub fn equals(left: Extractor, right: Extractor) -> Self {
        Extractor::Composite {
            op: CompositeOp::Equals,
            args: vec![left, right],
        }
    }

    pub fn not(arg: Extractor) -> Self {
        Extractor::Composite {
            op: CompositeOp::Not,
            args: vec![arg],
        }
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Extractor::Composite {
            op: CompositeOp::Const(value.into()),
            args: Vec::new(),
        }
    }

    /// Projects `key` out of a map-valued input (`Verbatim` source reads the
    /// record itself).
    pub fn map_get(key: impl Into<Value>, arg: Extractor) -> Self {
        Extractor::Composite {
            op: CompositeOp::MapGet(key.into()),
            args: vec![arg],
        }
    }

    pub fn as_blob(arg: Extractor) -> Self {
        Extractor::Composite {
            op: CompositeOp::AsBlob,
            args: vec![arg],
        }
    }

    /// Passes the `processor` value through only when `predicate` evaluated
    /// to true. A false predicate, or a value that never arrived, produces
    /// nothing.
    pub fn filter(predicate: Extractor, processor: Extractor) -> Self {
        Extractor::Composite {
            op: CompositeOp::filter(),
            args: vec![predicate, processor],
        }
    }

    /// Collects every value produced by `arg` (typically a repeated-field
    /// read) into an ordered list.
    pub fn collect(arg: Extractor) -> Self {
        Extractor::Composite {
            op: CompositeOp::Collect,
            args: vec![arg],
        }
    }

    /// Whether this extractor can absorb `nested` and decode its value
    /// directly from this extractor's own input.
    pub fn can_push_down(&self, nested: &Extractor) -> bool {
        match self {
            Extractor::Verbatim => true,
            Extractor::Chain { tail, .. } => tail.can_push_down(nested),
            Extractor::Leaf(leaf) => leaf.can_push_down(nested),
            Extractor::Composite {
                op: CompositeOp::Filter(_),
                args,
            } => args[1].can_push_down(nested),
            Extractor::Composite { .. } => false,
        }
    }

    /// Fuses `nested` into this extractor. Callers check
    /// [`can_push_down`](Self::can_push_down) first; the plain
    /// [`chain`](Self::chain) constructor does both.
    pub fn push_down(self, nested: Extractor) -> Extractor {
        match self {
            Extractor::Verbatim => nested,
            Extractor::Chain { head, tail } => Extractor::Chain {
                head,
                tail: Box::new(tail.push_down(nested)),
            },
            Extractor::Leaf(leaf) => leaf.push_down(nested),
            Extractor::Composite {
                op: CompositeOp::Filter(_),
                mut args,
            } => {
                let processor = args.pop().unwrap_or(Extractor::Verbatim);
                let predicate = args.pop().unwrap_or(Extractor::Verbatim);
                Extractor::filter(predicate, processor.push_down(nested))
            }
            other => other,
        }
    }
}

impl From<ProtoBufExtractor> for Extractor {
    fn from(leaf: ProtoBufExtractor) -> Self {
        Extractor::Leaf(leaf)
    }
}

impl Display for Extractor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Extractor::Verbatim => write!(f, "verbatim"),
            Extractor::Chain { head, tail } => write!(f, "{}/{}", head, tail),
            Extractor::Leaf(leaf) => write!(f, "{}", leaf),
            Extractor::Composite { op, args } => match op {
                CompositeOp::Bool(op) => write!(f, "{}({}, {})", op, args[0], args[1]),
                CompositeOp::Equals => write!(f, "EQ({}, {})", args[0], args[1]),
                CompositeOp::Not => write!(f, "NOT({})", args[0]),
                CompositeOp::Const(value) => write!(f, "const({})", value),
                CompositeOp::MapGet(key) => write!(f, "GET[{}]({})", key, args[0]),
                CompositeOp::AsBlob => write!(f, "asBlob({})", args[0]),
                CompositeOp::Filter(_) => write!(f, "f({})/{}", args[0], args[1]),
                CompositeOp::Collect => write!(f, "collect({})", args[0]),
            },
        }
    }
}
