//! Protocol-buffer leaf extractors.
//!
//! A [`ProtoBufExtractor`] addresses one field by its path of field numbers
//! and says how to interpret the wire value found there. It is the leaf
//! family of the expression model: the plan compiler groups every protobuf
//! leaf below one source into a single [`ProtoBufExtractorSet`] engine, so
//! one scan of the record serves all of them.
//!
//! No schema is involved — interpretation is chosen by the caller, and the
//! same field can be registered under several interpretations at once (the
//! record is still read once).

mod set;
mod wire;

use std::fmt::{self, Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::batch::BatchEngine;
use crate::extractor::Extractor;

pub use set::ProtoBufExtractorSet;

/// Wire-value interpretation at the end of a field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PbKind {
    /// Plain varint (also accepts fixed32/fixed64), as `Value::UInt`.
    Unsigned,
    /// Zigzag varint (also accepts fixed32/fixed64), as `Value::Int`.
    Signed,
    /// fixed32 or fixed64, as `Value::Float`.
    Float,
    /// Length-delimited UTF-8, as `Value::String`.
    Utf8,
    /// Length-delimited payload verbatim, as `Value::Bytes`.
    Bytes,
    /// Length-delimited sub-message, evaluated per occurrence by an embedded
    /// extractor expression fused into the scan.
    Nested(Box<Extractor>),
}

impl PbKind {
    fn describe(&self) -> String {
        match self {
            PbKind::Unsigned => "uint".to_string(),
            PbKind::Signed => "int".to_string(),
            PbKind::Float => "float".to_string(),
            PbKind::Utf8 => "string".to_string(),
            PbKind::Bytes => "bytes".to_string(),
            PbKind::Nested(inner) => format!("{{{}}}", inner),
        }
    }
}

/// A leaf extractor reading one protobuf field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProtoBufExtractor {
    path: SmallVec<[u32; 4]>,
    kind: PbKind,
}

impl ProtoBufExtractor {
    pub(crate) fn new(path: impl IntoIterator<Item = u32>, kind: PbKind) -> Self {
        Self {
            path: path.into_iter().collect(),
            kind,
        }
    }

    /// Unsigned integer interpretation of `path`.
    pub fn unsigned(path: impl IntoIterator<Item = u32>) -> Extractor {
        Extractor::Leaf(Self::new(path, PbKind::Unsigned))
    }

    /// Signed (zigzag) integer interpretation of `path`.
    pub fn signed(path: impl IntoIterator<Item = u32>) -> Extractor {
        Extractor::Leaf(Self::new(path, PbKind::Signed))
    }

    /// Floating-point interpretation of `path` (single or double precision,
    /// chosen by the wire type found in the record).
    pub fn float(path: impl IntoIterator<Item = u32>) -> Extractor {
        Extractor::Leaf(Self::new(path, PbKind::Float))
    }

    /// UTF-8 string interpretation of `path`.
    pub fn string(path: impl IntoIterator<Item = u32>) -> Extractor {
        Extractor::Leaf(Self::new(path, PbKind::Utf8))
    }

    /// Raw payload of `path`, as bytes. Also the natural head of a chain
    /// onto a sub-message.
    pub fn bytes(path: impl IntoIterator<Item = u32>) -> Extractor {
        Extractor::Leaf(Self::new(path, PbKind::Bytes))
    }

    /// Runs `inner` over every occurrence of the sub-message at `path`,
    /// fused into this extractor's scan. Each occurrence is evaluated
    /// independently; whatever `inner` emits is forwarded.
    pub fn nested(inner: Extractor, path: impl IntoIterator<Item = u32>) -> Extractor {
        Extractor::Leaf(Self::new(path, PbKind::Nested(Box::new(inner))))
    }

    pub fn path(&self) -> &[u32] {
        &self.path
    }

    pub fn kind(&self) -> &PbKind {
        &self.kind
    }

    /// A fresh, empty engine for this extractor's family.
    pub(crate) fn new_engine(&self) -> Box<dyn BatchEngine> {
        Box::new(ProtoBufExtractorSet::new())
    }

    /// Whether `engine` can batch this extractor.
    pub(crate) fn is_compatible(&self, engine: &dyn BatchEngine) -> bool {
        engine.as_any().is::<ProtoBufExtractorSet>()
    }

    /// A nested extractor can be absorbed whenever this extractor addresses
    /// a raw payload — the nested read then happens inside the same scan.
    pub(crate) fn can_push_down(&self, _nested: &Extractor) -> bool {
        matches!(self.kind, PbKind::Bytes)
    }

    pub(crate) fn push_down(mut self, nested: Extractor) -> Extractor {
        match nested {
            Extractor::Verbatim => Extractor::Leaf(self),
            // Fusing two path reads is pure path concatenation; the nested
            // interpretation takes over at the combined terminal.
            Extractor::Leaf(inner) => {
                self.path.extend(inner.path);
                self.kind = inner.kind;
                Extractor::Leaf(self)
            }
            other => {
                self.kind = PbKind::Nested(Box::new(other));
                Extractor::Leaf(self)
            }
        }
    }
}

impl Display for ProtoBufExtractor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let path = self
            .path
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<String>>()
            .join(".");
        write!(f, "pb[{}:{}]", path, self.kind.describe())
    }
}
