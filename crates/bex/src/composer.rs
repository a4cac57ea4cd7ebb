//! The push/compose protocol.
//!
//! Every multi-input plan node owns one [`ValueComposer`] per evaluation: a
//! small state machine that records input arrivals (`push`) and is asked
//! exactly once, after all inputs had the opportunity to arrive, for its
//! result (`compose`). Emitting `None` is the explicit "no value" channel —
//! short-circuited predicates, absent fields and filtered-out values all
//! surface as a missing push downstream, never as an error.

use std::mem;

use crate::error::EvalError;
use crate::extractor::{BoolOp, CompositeOp};
use crate::value::Value;

/// Receives positional results pushed out of a plan or a batch engine.
///
/// Implemented by [`ResultVec`] and blanket-implemented for closures, so an
/// evaluation can write into a plain `FnMut(usize, Value)`-shaped sink.
pub trait ResultSink {
    fn push(&mut self, slot: usize, value: Value) -> Result<(), EvalError>;
}

impl<F> ResultSink for F
where
    F: FnMut(usize, Value) -> Result<(), EvalError>,
{
    fn push(&mut self, slot: usize, value: Value) -> Result<(), EvalError> {
        self(slot, value)
    }
}

/// Fixed-size positional output vector.
///
/// A `None` slot after evaluation means the value was absent for that
/// extraction — a valid, non-error outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultVec {
    slots: Vec<Option<Value>>,
}

impl ResultVec {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    pub fn get(&self, slot: usize) -> Option<&Value> {
        self.slots.get(slot).and_then(|v| v.as_ref())
    }

    pub fn take(&mut self, slot: usize) -> Option<Value> {
        self.slots.get_mut(slot).and_then(|v| v.take())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Clears all slots so the vector can be reused for another evaluation.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

impl ResultSink for ResultVec {
    fn push(&mut self, slot: usize, value: Value) -> Result<(), EvalError> {
        match self.slots.get_mut(slot) {
            Some(entry) => {
                *entry = Some(value);
                Ok(())
            }
            None => Err(EvalError::SlotOutOfRange { slot }),
        }
    }
}

/// Per-evaluation state machine of one composition node.
pub trait ValueComposer {
    /// Records the arrival of one input value at `slot`.
    fn push(&mut self, slot: usize, value: Value) -> Result<(), EvalError>;

    /// Produces the node's result, or `None` when the inputs that arrived do
    /// not yield one. Called exactly once per evaluation.
    fn compose(&mut self) -> Result<Option<Value>, EvalError>;
}

/// Creates the fresh per-evaluation composer for `op`.
pub(crate) fn new_composer(op: &CompositeOp) -> Box<dyn ValueComposer> {
    match op {
        CompositeOp::Bool(bool_op) => Box::new(BinaryComposer::new(BinaryFn::Bool(*bool_op))),
        CompositeOp::Equals => Box::new(BinaryComposer::new(BinaryFn::Equals)),
        CompositeOp::Not => Box::new(UnaryComposer::new(UnaryFn::Not)),
        CompositeOp::AsBlob => Box::new(UnaryComposer::new(UnaryFn::AsBlob)),
        CompositeOp::MapGet(key) => Box::new(UnaryComposer::new(UnaryFn::MapGet(key.clone()))),
        CompositeOp::Const(value) => Box::new(ConstComposer {
            value: value.clone(),
        }),
        CompositeOp::Filter(_) => Box::new(FilterComposer::default()),
        CompositeOp::Collect => Box::new(CollectComposer::default()),
    }
}

enum BinaryFn {
    Bool(BoolOp),
    Equals,
}

/// Two single-valued inputs; composes only when both arrived.
struct BinaryComposer {
    function: BinaryFn,
    left: Option<Value>,
    right: Option<Value>,
}

impl BinaryComposer {
    fn new(function: BinaryFn) -> Self {
        Self {
            function,
            left: None,
            right: None,
        }
    }
}

impl ValueComposer for BinaryComposer {
    fn push(&mut self, slot: usize, value: Value) -> Result<(), EvalError> {
        let entry = match slot {
            0 => &mut self.left,
            1 => &mut self.right,
            _ => return Err(EvalError::SlotOutOfRange { slot }),
        };
        if entry.is_some() {
            return Err(EvalError::DuplicateInput { slot });
        }
        *entry = Some(value);
        Ok(())
    }

    fn compose(&mut self) -> Result<Option<Value>, EvalError> {
        let (Some(left), Some(right)) = (self.left.take(), self.right.take()) else {
            return Ok(None);
        };
        match &self.function {
            BinaryFn::Equals => Ok(Some(Value::Bool(left == right))),
            BinaryFn::Bool(op) => {
                let (Some(left), Some(right)) = (left.as_bool(), right.as_bool()) else {
                    return Err(EvalError::TypeMismatch {
                        expected: "bool",
                        got: if left.as_bool().is_none() {
                            left.type_name()
                        } else {
                            right.type_name()
                        },
                    });
                };
                Ok(Some(Value::Bool(op.apply(left, right))))
            }
        }
    }
}

enum UnaryFn {
    Not,
    AsBlob,
    MapGet(Value),
}

/// One single-valued input.
struct UnaryComposer {
    function: UnaryFn,
    input: Option<Value>,
}

impl UnaryComposer {
    fn new(function: UnaryFn) -> Self {
        Self {
            function,
            input: None,
        }
    }
}

impl ValueComposer for UnaryComposer {
    fn push(&mut self, slot: usize, value: Value) -> Result<(), EvalError> {
        if slot != 0 {
            return Err(EvalError::SlotOutOfRange { slot });
        }
        if self.input.is_some() {
            return Err(EvalError::DuplicateInput { slot });
        }
        self.input = Some(value);
        Ok(())
    }

    fn compose(&mut self) -> Result<Option<Value>, EvalError> {
        let Some(input) = self.input.take() else {
            return Ok(None);
        };
        match &self.function {
            UnaryFn::Not => match input.as_bool() {
                Some(b) => Ok(Some(Value::Bool(!b))),
                None => Err(EvalError::TypeMismatch {
                    expected: "bool",
                    got: input.type_name(),
                }),
            },
            UnaryFn::AsBlob => match input {
                Value::Bytes(_) => Ok(Some(input)),
                other => Err(EvalError::TypeMismatch {
                    expected: "bytes",
                    got: other.type_name(),
                }),
            },
            UnaryFn::MapGet(key) => match &input {
                // Missing key is absence, not an error.
                Value::Map(_) => Ok(input.map_get(key).cloned()),
                other => Err(EvalError::TypeMismatch {
                    expected: "map",
                    got: other.type_name(),
                }),
            },
        }
    }
}

/// No inputs; emits its constant every evaluation.
struct ConstComposer {
    value: Value,
}

impl ValueComposer for ConstComposer {
    fn push(&mut self, slot: usize, _value: Value) -> Result<(), EvalError> {
        Err(EvalError::SlotOutOfRange { slot })
    }

    fn compose(&mut self) -> Result<Option<Value>, EvalError> {
        Ok(Some(self.value.clone()))
    }
}

/// Slot 0 is the predicate, slot 1 the processed value. Re-pushes overwrite
/// (repeated sources race to the last occurrence); the value passes only
/// when the predicate arrived true.
#[derive(Default)]
struct FilterComposer {
    passed: bool,
    value: Option<Value>,
}

impl ValueComposer for FilterComposer {
    fn push(&mut self, slot: usize, value: Value) -> Result<(), EvalError> {
        match slot {
            0 => match value.as_bool() {
                Some(b) => {
                    self.passed = b;
                    Ok(())
                }
                None => Err(EvalError::TypeMismatch {
                    expected: "bool",
                    got: value.type_name(),
                }),
            },
            1 => {
                self.value = Some(value);
                Ok(())
            }
            _ => Err(EvalError::SlotOutOfRange { slot }),
        }
    }

    fn compose(&mut self) -> Result<Option<Value>, EvalError> {
        if self.passed {
            Ok(self.value.take())
        } else {
            Ok(None)
        }
    }
}

/// Accepts any number of pushes to slot 0, preserving arrival order.
#[derive(Default)]
struct CollectComposer {
    items: Vec<Value>,
}

impl ValueComposer for CollectComposer {
    fn push(&mut self, slot: usize, value: Value) -> Result<(), EvalError> {
        if slot != 0 {
            return Err(EvalError::SlotOutOfRange { slot });
        }
        self.items.push(value);
        Ok(())
    }

    fn compose(&mut self) -> Result<Option<Value>, EvalError> {
        // Zero matches is still an answer for a collection query.
        Ok(Some(Value::List(mem::take(&mut self.items))))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn composer(op: CompositeOp) -> Box<dyn ValueComposer> {
        new_composer(&op)
    }

    #[rstest]
    #[case(BoolOp::And, true, false, false)]
    #[case(BoolOp::Or, true, false, true)]
    #[case(BoolOp::Xor, true, true, false)]
    fn test_bool_composer(
        #[case] op: BoolOp,
        #[case] left: bool,
        #[case] right: bool,
        #[case] expected: bool,
    ) {
        let mut c = composer(CompositeOp::Bool(op));
        c.push(0, Value::Bool(left)).unwrap();
        c.push(1, Value::Bool(right)).unwrap();
        assert_eq!(c.compose().unwrap(), Some(Value::Bool(expected)));
    }

    #[test]
    fn test_binary_composer_missing_input_is_silent() {
        let mut c = composer(CompositeOp::Equals);
        c.push(0, Value::Int(1)).unwrap();
        assert_eq!(c.compose().unwrap(), None);
    }

    #[test]
    fn test_binary_composer_rejects_duplicate_push() {
        let mut c = composer(CompositeOp::Equals);
        c.push(0, Value::Int(1)).unwrap();
        assert_eq!(
            c.push(0, Value::Int(2)),
            Err(EvalError::DuplicateInput { slot: 0 })
        );
    }

    #[test]
    fn test_binary_composer_rejects_out_of_range_slot() {
        let mut c = composer(CompositeOp::Equals);
        assert_eq!(
            c.push(2, Value::Int(1)),
            Err(EvalError::SlotOutOfRange { slot: 2 })
        );
    }

    #[rstest]
    #[case(Value::Bool(true), Some(Value::Bool(false)))]
    #[case(Value::Bool(false), Some(Value::Bool(true)))]
    fn test_not_composer(#[case] input: Value, #[case] expected: Option<Value>) {
        let mut c = composer(CompositeOp::Not);
        c.push(0, input).unwrap();
        assert_eq!(c.compose().unwrap(), expected);
    }

    #[test]
    fn test_not_composer_type_mismatch() {
        let mut c = composer(CompositeOp::Not);
        c.push(0, Value::Int(1)).unwrap();
        assert_eq!(
            c.compose(),
            Err(EvalError::TypeMismatch {
                expected: "bool",
                got: "int"
            })
        );
    }

    #[test]
    fn test_const_composer() {
        let mut c = composer(CompositeOp::Const(Value::from("A")));
        assert_eq!(c.compose().unwrap(), Some(Value::from("A")));
        assert_eq!(
            c.push(0, Value::Int(1)),
            Err(EvalError::SlotOutOfRange { slot: 0 })
        );
    }

    #[rstest]
    #[case(Some(true), Some(Value::Int(7)), Some(Value::Int(7)))]
    #[case(Some(false), Some(Value::Int(7)), None)]
    #[case(Some(true), None, None)]
    #[case(None, Some(Value::Int(7)), None)]
    fn test_filter_composer(
        #[case] predicate: Option<bool>,
        #[case] value: Option<Value>,
        #[case] expected: Option<Value>,
    ) {
        let mut c = composer(CompositeOp::Filter(0));
        if let Some(p) = predicate {
            c.push(0, Value::Bool(p)).unwrap();
        }
        if let Some(v) = value {
            c.push(1, v).unwrap();
        }
        assert_eq!(c.compose().unwrap(), expected);
    }

    #[test]
    fn test_collect_composer_preserves_order() {
        let mut c = composer(CompositeOp::Collect);
        for n in [3, 1, 2] {
            c.push(0, Value::Int(n)).unwrap();
        }
        assert_eq!(
            c.compose().unwrap(),
            Some(Value::List(vec![
                Value::Int(3),
                Value::Int(1),
                Value::Int(2)
            ]))
        );
    }

    #[test]
    fn test_collect_composer_empty_is_empty_list() {
        let mut c = composer(CompositeOp::Collect);
        assert_eq!(c.compose().unwrap(), Some(Value::List(Vec::new())));
    }

    #[test]
    fn test_map_get_composer_missing_key_is_silent() {
        let mut c = composer(CompositeOp::MapGet(Value::from("missing")));
        c.push(0, Value::Map(vec![(Value::from("A"), Value::Int(1))]))
            .unwrap();
        assert_eq!(c.compose().unwrap(), None);
    }

    #[test]
    fn test_result_vec() {
        let mut out = ResultVec::new(2);
        out.push(1, Value::Int(5)).unwrap();
        assert_eq!(out.get(0), None);
        assert_eq!(out.get(1), Some(&Value::Int(5)));
        assert_eq!(
            out.push(2, Value::Int(9)),
            Err(EvalError::SlotOutOfRange { slot: 2 })
        );
        out.reset();
        assert_eq!(out.get(1), None);
    }
}
