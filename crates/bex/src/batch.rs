//! The batched-traversal engine contract.
//!
//! Leaf extractors that read from the same source region and report mutual
//! compatibility are grouped into one engine, so a single traversal of the
//! region serves every grouped read.

use std::any::Any;
use std::fmt;

use crate::composer::ResultSink;
use crate::error::{EvalError, PlanError};
use crate::protobuf::ProtoBufExtractor;
use crate::value::Value;

/// A format-specific engine that batches compatible leaf extractors over one
/// traversal of a source region.
pub trait BatchEngine: fmt::Debug + Send + Sync + Any {
    /// Registers a leaf extractor and returns its engine-local output slot.
    /// Structurally equal leaves share one slot.
    fn add(&mut self, leaf: &ProtoBufExtractor) -> Result<usize, PlanError>;

    /// Number of allocated output slots.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finalizes the engine's internal traversal plan. No further
    /// [`add`](Self::add) calls are accepted afterwards.
    fn compile(&mut self) -> Result<(), PlanError>;

    /// Runs the batched traversal once over `record`, pushing each slot's
    /// value(s) into `sink`.
    ///
    /// A repeated field may push its slot several times, in encounter
    /// order; a field absent from the record pushes nothing.
    fn extract_all(&self, record: &Value, sink: &mut dyn ResultSink) -> Result<(), EvalError>;

    /// Renders the engine's traversal plan into `out` (diagnostics only;
    /// requires the engine to be compiled).
    fn dump(&self, out: &mut String) -> Result<(), PlanError>;

    /// Concrete-type access for compatibility checks.
    fn as_any(&self) -> &dyn Any;
}
