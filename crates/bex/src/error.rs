//! Error taxonomy: plan-construction errors, evaluation protocol errors and
//! wire-level decode errors. Data-level absence (a missing field, a false
//! predicate) is never an error — it is "no push" all the way to the output
//! vector.

/// Errors raised while building or compiling a plan.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("cannot add extractor to a compiled set")]
    AlreadyCompiled,
    #[error("extractor set is not compiled")]
    NotCompiled,
    #[error("extractor is not supported by this batch engine")]
    IncompatibleExtractor,
    #[error("leaf extractor has an empty field path")]
    EmptyPath,
    #[error("batch slot {slot} of node {node} has no outgoing link")]
    UnlinkedSlot { node: usize, slot: usize },
}

/// Errors raised while decoding a binary record.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record truncated at byte {offset}")]
    Truncated { offset: usize },
    #[error("varint exceeds 64 bits at byte {offset}")]
    VarintOverflow { offset: usize },
    #[error("field number 0 at byte {offset}")]
    InvalidFieldNumber { offset: usize },
    #[error("wire type {wire_type} is not valid for field {field}")]
    UnsupportedWireType { field: u32, wire_type: u8 },
    #[error("length-delimited payload of field {field} is not valid UTF-8")]
    InvalidUtf8 { field: u32 },
    #[error("expected a binary record, got {got}")]
    ExpectedBytes { got: &'static str },
}

/// Errors raised while evaluating a compiled plan against one record.
///
/// Apart from [`EvalError::Decode`], these indicate a malformed plan or a
/// protocol violation and are never retried.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("extractor set is not compiled")]
    NotCompiled,
    #[error("input slot {slot} is already set")]
    DuplicateInput { slot: usize },
    #[error("push after compose")]
    PushAfterCompose,
    #[error("input slot {slot} is out of range")]
    SlotOutOfRange { slot: usize },
    #[error("expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error("push targets node {node} out of evaluation order")]
    BadLinkOrder { node: usize },
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Any error the library can produce.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}
