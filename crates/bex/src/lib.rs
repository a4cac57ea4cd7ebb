//! bex extracts many independent values from one binary record in a single
//! pass.
//!
//! Callers describe each desired value as a composable [`Extractor`]
//! expression — a field path, a transform, a predicate, an aggregate — and
//! register any number of them in an [`ExtractorSet`]. The set compiles them
//! into one plan: duplicate sub-computations are shared, field reads that
//! can ride the same traversal are batched, and evaluation is a single
//! push-style dataflow sweep writing into a positional output vector.
//!
//! ## Examples
//!
//! Reading one field under two interpretations costs one traversal:
//!
//! ```rust
//! use bex::{ExtractorSet, ProtoBufExtractor, ResultVec, Value};
//!
//! let mut set = ExtractorSet::new();
//! let signed = set.add_extractor(&ProtoBufExtractor::signed([2]))?;
//! let unsigned = set.add_extractor(&ProtoBufExtractor::unsigned([2]))?;
//! set.compile()?;
//!
//! // field 2 carries varint 199
//! let record = Value::from(vec![0x10, 0xc7, 0x01]);
//! let mut out = ResultVec::new(set.size());
//! set.extract_all(&record, &mut out)?;
//!
//! assert_eq!(out.get(signed), Some(&Value::Int(-100)));
//! assert_eq!(out.get(unsigned), Some(&Value::UInt(199)));
//! # Ok::<(), bex::Error>(())
//! ```
//!
//! A compiled set is immutable: share it freely and evaluate from as many
//! threads as you like; every `extract_all` call owns its transient state.
//! An output slot that receives no value (missing field, false predicate)
//! is simply absent — never an error.

mod batch;
mod composer;
mod error;
mod extractor;
mod plan;
mod protobuf;
mod value;

pub use batch::BatchEngine;
pub use composer::{ResultSink, ResultVec, ValueComposer};
pub use error::{DecodeError, Error, EvalError, PlanError};
pub use extractor::{BoolOp, CompositeOp, Extractor};
pub use plan::ExtractorSet;
pub use protobuf::{PbKind, ProtoBufExtractor, ProtoBufExtractorSet};
pub use value::Value;
