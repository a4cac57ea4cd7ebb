//! The protobuf batch engine: a path trie evaluated in one scan.
//!
//! Registered field paths are merged into a trie keyed by field number. One
//! linear pass over the record region decodes every terminal interpretation,
//! recurses into length-delimited payloads that carry deeper paths, and runs
//! embedded nested extractor sets once per occurrence of their sub-message.

use bytes::Bytes;
use itertools::Itertools;
use rustc_hash::FxHashMap;

use super::wire::{self, WireReader, WireType};
use super::{PbKind, ProtoBufExtractor};
use crate::batch::BatchEngine;
use crate::composer::ResultSink;
use crate::error::{DecodeError, EvalError, PlanError};
use crate::plan::ExtractorSet;
use crate::value::Value;

/// Batched traversal engine for [`ProtoBufExtractor`] leaves.
#[derive(Debug, Default)]
pub struct ProtoBufExtractorSet {
    root: TrieNode,
    slots: usize,
    compiled: bool,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: FxHashMap<u32, TrieNode>,
    /// Terminal interpretations registered at this path: (kind, local slot).
    scalars: Vec<(PbKind, usize)>,
    /// Embedded expressions evaluated per occurrence of this path.
    nested: Option<NestedSet>,
}

/// All nested expressions at one path share a compiled sub-plan; its output
/// indexes are remapped to engine-local slots.
#[derive(Debug)]
struct NestedSet {
    set: ExtractorSet,
    slots: Vec<usize>,
}

impl ProtoBufExtractorSet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchEngine for ProtoBufExtractorSet {
    fn add(&mut self, leaf: &ProtoBufExtractor) -> Result<usize, PlanError> {
        if self.compiled {
            return Err(PlanError::AlreadyCompiled);
        }
        if leaf.path().is_empty() {
            return Err(PlanError::EmptyPath);
        }
        let Self { root, slots, .. } = self;
        let mut node = root;
        for field in leaf.path() {
            node = node.children.entry(*field).or_default();
        }
        match leaf.kind() {
            PbKind::Nested(inner) => {
                let nested = node.nested.get_or_insert_with(|| NestedSet {
                    set: ExtractorSet::new(),
                    slots: Vec::new(),
                });
                let index = nested.set.add_extractor(inner.as_ref())?;
                if index == nested.slots.len() {
                    nested.slots.push(*slots);
                    *slots += 1;
                }
                Ok(nested.slots[index])
            }
            kind => {
                if let Some((_, slot)) = node.scalars.iter().find(|(k, _)| k == kind) {
                    return Ok(*slot);
                }
                let slot = *slots;
                *slots += 1;
                node.scalars.push((kind.clone(), slot));
                Ok(slot)
            }
        }
    }

    fn len(&self) -> usize {
        self.slots
    }

    fn compile(&mut self) -> Result<(), PlanError> {
        if self.compiled {
            return Ok(());
        }
        self.compiled = true;
        self.root.compile()
    }

    fn extract_all(&self, record: &Value, sink: &mut dyn ResultSink) -> Result<(), EvalError> {
        if !self.compiled {
            return Err(EvalError::NotCompiled);
        }
        let Value::Bytes(buf) = record else {
            return Err(EvalError::Decode(DecodeError::ExpectedBytes {
                got: record.type_name(),
            }));
        };
        self.root.scan(buf, sink)
    }

    fn dump(&self, out: &mut String) -> Result<(), PlanError> {
        if !self.compiled {
            return Err(PlanError::NotCompiled);
        }
        let mut path = Vec::new();
        self.root.dump(&mut path, out)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn mismatch(field: u32, wire_type: WireType) -> EvalError {
    EvalError::Decode(DecodeError::UnsupportedWireType {
        field,
        wire_type: wire_type.raw(),
    })
}

impl TrieNode {
    fn compile(&mut self) -> Result<(), PlanError> {
        if let Some(nested) = &mut self.nested {
            nested.set.compile()?;
        }
        for child in self.children.values_mut() {
            child.compile()?;
        }
        Ok(())
    }

    /// One pass over a message region. Every registered read below this trie
    /// node is served; unknown fields are skipped by wire type.
    fn scan(&self, buf: &Bytes, sink: &mut dyn ResultSink) -> Result<(), EvalError> {
        let mut reader = WireReader::new(buf);
        while reader.has_remaining() {
            let (field, wire_type) = reader.tag()?;
            let Some(child) = self.children.get(&field) else {
                reader.skip(wire_type)?;
                continue;
            };
            match wire_type {
                WireType::Varint => {
                    let raw = reader.varint()?;
                    for (kind, slot) in &child.scalars {
                        match kind {
                            PbKind::Unsigned => sink.push(*slot, Value::UInt(raw))?,
                            PbKind::Signed => sink.push(*slot, Value::Int(wire::zigzag(raw)))?,
                            _ => return Err(mismatch(field, wire_type)),
                        }
                    }
                    if !child.children.is_empty() || child.nested.is_some() {
                        return Err(mismatch(field, wire_type));
                    }
                }
                WireType::Fixed64 => {
                    let raw = reader.fixed64()?;
                    for (kind, slot) in &child.scalars {
                        match kind {
                            PbKind::Unsigned => sink.push(*slot, Value::UInt(raw))?,
                            PbKind::Signed => sink.push(*slot, Value::Int(raw as i64))?,
                            PbKind::Float => {
                                sink.push(*slot, Value::Float(f64::from_bits(raw)))?;
                            }
                            _ => return Err(mismatch(field, wire_type)),
                        }
                    }
                    if !child.children.is_empty() || child.nested.is_some() {
                        return Err(mismatch(field, wire_type));
                    }
                }
                WireType::Fixed32 => {
                    let raw = reader.fixed32()?;
                    for (kind, slot) in &child.scalars {
                        match kind {
                            PbKind::Unsigned => sink.push(*slot, Value::UInt(u64::from(raw)))?,
                            PbKind::Signed => sink.push(*slot, Value::Int(i64::from(raw as i32)))?,
                            PbKind::Float => {
                                sink.push(*slot, Value::Float(f64::from(f32::from_bits(raw))))?;
                            }
                            _ => return Err(mismatch(field, wire_type)),
                        }
                    }
                    if !child.children.is_empty() || child.nested.is_some() {
                        return Err(mismatch(field, wire_type));
                    }
                }
                WireType::Len => {
                    let (start, end) = reader.len_delimited()?;
                    let payload = buf.slice(start..end);
                    for (kind, slot) in &child.scalars {
                        match kind {
                            PbKind::Utf8 => {
                                let text = std::str::from_utf8(&payload)
                                    .map_err(|_| DecodeError::InvalidUtf8 { field })?;
                                sink.push(*slot, Value::String(text.to_string()))?;
                            }
                            PbKind::Bytes => sink.push(*slot, Value::Bytes(payload.clone()))?,
                            _ => return Err(mismatch(field, wire_type)),
                        }
                    }
                    if !child.children.is_empty() {
                        child.scan(&payload, sink)?;
                    }
                    if let Some(nested) = &child.nested {
                        let record = Value::Bytes(payload.clone());
                        nested
                            .set
                            .extract_all(&record, &mut |index: usize, value: Value| {
                                match nested.slots.get(index) {
                                    Some(slot) => sink.push(*slot, value),
                                    None => Err(EvalError::SlotOutOfRange { slot: index }),
                                }
                            })?;
                    }
                }
            }
        }
        Ok(())
    }

    fn dump(&self, path: &mut Vec<u32>, out: &mut String) -> Result<(), PlanError> {
        let rendered = path.iter().map(ToString::to_string).join(".");
        for (kind, slot) in &self.scalars {
            out.push_str(&format!(
                "<pb slot=\"{}\" path=\"{}\" type=\"{}\"/>\n",
                slot,
                rendered,
                kind.describe()
            ));
        }
        if let Some(nested) = &self.nested {
            let slots = nested.slots.iter().map(ToString::to_string).join(",");
            out.push_str(&format!("<pb slots=\"{}\" path=\"{}\">\n", slots, rendered));
            out.push_str(&nested.set.dump()?);
            out.push('\n');
            out.push_str("</pb>\n");
        }
        for (field, child) in self.children.iter().sorted_by_key(|(field, _)| **field) {
            path.push(*field);
            child.dump(path, out)?;
            path.pop();
        }
        Ok(())
    }
}
