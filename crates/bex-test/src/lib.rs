//! Test support for bex.
//!
//! [`pb`] builds protocol-buffer wire-format records without a schema
//! compiler, so tests can assemble exactly the bytes they need. [`strategies`]
//! provides reusable proptest generators for random records.

pub mod pb;
pub mod strategies;

pub use pb::Message;
