//! Reusable proptest strategies for generating wire-format records.
//!
//! ```rust,ignore
//! use bex_test::strategies::arb_record;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn evaluates_deterministically(record in arb_record()) {
//!         // Your test here
//!     }
//! }
//! ```

use bytes::Bytes;
use proptest::prelude::*;

use crate::pb::Message;

/// One scalar field value.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Varint(u64),
    Str(String),
    Double(f64),
}

/// Strategy for one scalar field value.
pub fn arb_field_value() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        any::<u64>().prop_map(FieldValue::Varint),
        "[a-zA-Z0-9]{0,12}".prop_map(FieldValue::Str),
        any::<f64>().prop_map(FieldValue::Double),
    ]
}

fn apply(message: Message, field: u32, value: &FieldValue) -> Message {
    match value {
        FieldValue::Varint(v) => message.varint(field, *v),
        FieldValue::Str(s) => message.string(field, s),
        FieldValue::Double(d) => message.double(field, *d),
    }
}

/// Strategy for a flat record with up to eight fields (numbers 1..=6,
/// repeats allowed).
pub fn arb_record() -> impl Strategy<Value = Bytes> {
    prop::collection::vec((1u32..=6, arb_field_value()), 0..8).prop_map(|fields| {
        fields
            .iter()
            .fold(Message::new(), |message, (field, value)| {
                apply(message, *field, value)
            })
            .encode()
    })
}

/// Strategy for a record whose field 1 repeats a key/value sub-message
/// (field 1 = key, field 2 = value), like a serialized properties map.
pub fn arb_properties_record() -> impl Strategy<Value = Bytes> {
    prop::collection::vec(("[a-z]{1,6}", "[a-z0-9]{0,10}"), 0..6).prop_map(|entries| {
        entries
            .iter()
            .fold(Message::new(), |message, (key, value)| {
                message.message(1, Message::new().string(1, key).string(2, value))
            })
            .encode()
    })
}
