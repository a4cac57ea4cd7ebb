use bex_test::pb::Message;

use super::*;
use crate::protobuf::ProtoBufExtractor;

fn eval(set: &ExtractorSet, record: &Value) -> crate::ResultVec {
    let mut out = crate::ResultVec::new(set.size());
    set.extract_all(record, &mut out).unwrap();
    out
}

fn batches(dump: &str) -> usize {
    dump.matches("<batch id=").count()
}

fn compositions(dump: &str) -> usize {
    dump.matches("<composition id=").count()
}

#[test]
fn test_identity_resolves_to_the_source() {
    let mut set = ExtractorSet::new();
    let slot = set.add_extractor(&Extractor::verbatim()).unwrap();
    set.compile().unwrap();

    let out = eval(&set, &Value::Int(7));
    assert_eq!(out.get(slot), Some(&Value::Int(7)));
}

#[test]
fn test_duplicate_registration_reuses_the_output_slot() {
    let mut set = ExtractorSet::new();
    let first = set.add_extractor(&ProtoBufExtractor::unsigned([1])).unwrap();
    let second = set.add_extractor(&ProtoBufExtractor::unsigned([1])).unwrap();
    assert_eq!(first, second);
    assert_eq!(set.size(), 1);
}

#[test]
fn test_identical_composites_compile_to_one_node() {
    let expression = Extractor::equals(
        ProtoBufExtractor::string([1]),
        Extractor::constant("A"),
    );
    let mut set = ExtractorSet::new();
    let first = set.add_extractor(&expression).unwrap();
    let second = set.add_extractor(&expression.clone()).unwrap();
    set.compile().unwrap();

    assert_eq!(first, second);
    let dump = set.dump().unwrap();
    // One equals node, one const node, one batch for the string read.
    assert_eq!(compositions(&dump), 2);
    assert_eq!(batches(&dump), 1);
}

#[test]
fn test_compatible_leaves_share_one_batch() {
    let mut set = ExtractorSet::new();
    let uint = set.add_extractor(&ProtoBufExtractor::unsigned([1])).unwrap();
    let text = set.add_extractor(&ProtoBufExtractor::string([2])).unwrap();
    let int = set.add_extractor(&ProtoBufExtractor::signed([1])).unwrap();
    set.compile().unwrap();

    assert_eq!(batches(&set.dump().unwrap()), 1);

    let record = Value::Bytes(Message::new().varint(1, 42).string(2, "hi").encode());
    let out = eval(&set, &record);
    assert_eq!(out.get(uint), Some(&Value::UInt(42)));
    assert_eq!(out.get(text), Some(&Value::from("hi")));
    assert_eq!(out.get(int), Some(&Value::Int(21)));
}

#[test]
fn test_chain_over_a_composite_gets_its_own_batch() {
    // as_blob cannot absorb the tail, so the chain stays two-stage and the
    // tail read batches under the composition's output.
    let chained = Extractor::chain(
        Extractor::as_blob(ProtoBufExtractor::bytes([1])),
        ProtoBufExtractor::unsigned([2]),
    );
    let mut set = ExtractorSet::new();
    let slot = set.add_extractor(&chained).unwrap();
    set.compile().unwrap();

    let dump = set.dump().unwrap();
    assert_eq!(batches(&dump), 2);
    assert_eq!(compositions(&dump), 1);

    let record = Value::Bytes(
        Message::new()
            .message(1, Message::new().varint(2, 42))
            .encode(),
    );
    let out = eval(&set, &record);
    assert_eq!(out.get(slot), Some(&Value::UInt(42)));
}

#[test]
fn test_fan_out_delivers_to_every_consumer() {
    let field = ProtoBufExtractor::unsigned([1]);
    let mut set = ExtractorSet::new();
    let raw = set.add_extractor(&field).unwrap();
    let matched = set
        .add_extractor(&Extractor::equals(field.clone(), Extractor::constant(5u64)))
        .unwrap();
    set.compile().unwrap();

    let record = Value::Bytes(Message::new().varint(1, 5).encode());
    let out = eval(&set, &record);
    assert_eq!(out.get(raw), Some(&Value::UInt(5)));
    assert_eq!(out.get(matched), Some(&Value::Bool(true)));
}

#[test]
fn test_one_producer_can_feed_two_slots_of_one_node() {
    let field = ProtoBufExtractor::unsigned([1]);
    let mut set = ExtractorSet::new();
    let slot = set
        .add_extractor(&Extractor::equals(field.clone(), field))
        .unwrap();
    set.compile().unwrap();

    let record = Value::Bytes(Message::new().varint(1, 9).encode());
    let out = eval(&set, &record);
    assert_eq!(out.get(slot), Some(&Value::Bool(true)));
}

#[test]
fn test_push_down_introduces_no_intermediate_node() {
    let fused = Extractor::chain(
        ProtoBufExtractor::bytes([1]),
        ProtoBufExtractor::unsigned([3]),
    );
    let mut set = ExtractorSet::new();
    let slot = set.add_extractor(&fused).unwrap();
    set.compile().unwrap();

    let dump = set.dump().unwrap();
    assert_eq!(batches(&dump), 1);
    assert_eq!(compositions(&dump), 0);

    let record = Value::Bytes(
        Message::new()
            .message(1, Message::new().varint(3, 77))
            .encode(),
    );
    assert_eq!(eval(&set, &record).get(slot), Some(&Value::UInt(77)));

    // The fused result equals evaluating the outer read, then the inner
    // read over its output.
    let mut outer = ExtractorSet::new();
    let outer_slot = outer.add_extractor(&ProtoBufExtractor::bytes([1])).unwrap();
    outer.compile().unwrap();
    let intermediate = eval(&outer, &record).take(outer_slot).unwrap();

    let mut inner = ExtractorSet::new();
    let inner_slot = inner.add_extractor(&ProtoBufExtractor::unsigned([3])).unwrap();
    inner.compile().unwrap();
    assert_eq!(eval(&inner, &intermediate).get(inner_slot), Some(&Value::UInt(77)));
}

#[test]
fn test_mutating_a_compiled_set_is_rejected() {
    let mut set = ExtractorSet::new();
    set.add_extractor(&ProtoBufExtractor::unsigned([1])).unwrap();
    set.compile().unwrap();
    assert_eq!(
        set.add_extractor(&ProtoBufExtractor::unsigned([2])),
        Err(PlanError::AlreadyCompiled)
    );
    // Recompiling is a no-op.
    assert_eq!(set.compile(), Ok(()));
}

#[test]
fn test_uncompiled_set_rejects_evaluation_and_dump() {
    let mut set = ExtractorSet::new();
    set.add_extractor(&ProtoBufExtractor::unsigned([1])).unwrap();

    let record = Value::Bytes(Message::new().varint(1, 1).encode());
    let mut out = crate::ResultVec::new(set.size());
    assert_eq!(
        set.extract_all(&record, &mut out),
        Err(EvalError::NotCompiled)
    );
    assert_eq!(set.dump(), Err(PlanError::NotCompiled));
}

#[test]
fn test_evaluation_is_a_pure_function_of_plan_and_record() {
    let mut set = ExtractorSet::new();
    set.add_extractor(&ProtoBufExtractor::unsigned([1])).unwrap();
    set.add_extractor(&Extractor::collect(ProtoBufExtractor::string([2])))
        .unwrap();
    set.compile().unwrap();

    let record = Value::Bytes(
        Message::new()
            .varint(1, 3)
            .string(2, "a")
            .string(2, "b")
            .encode(),
    );
    assert_eq!(eval(&set, &record), eval(&set, &record));
}

#[test]
fn test_absent_field_leaves_the_slot_empty() {
    let mut set = ExtractorSet::new();
    let slot = set.add_extractor(&ProtoBufExtractor::unsigned([9])).unwrap();
    set.compile().unwrap();

    let record = Value::Bytes(Message::new().varint(1, 1).encode());
    assert_eq!(eval(&set, &record).get(slot), None);
}

#[test]
fn test_decode_errors_abort_the_evaluation() {
    let mut set = ExtractorSet::new();
    set.add_extractor(&ProtoBufExtractor::string([1])).unwrap();
    set.compile().unwrap();

    // field 1 is a varint where a length-delimited value is expected
    let record = Value::Bytes(Message::new().varint(1, 1).encode());
    let mut out = crate::ResultVec::new(set.size());
    assert!(matches!(
        set.extract_all(&record, &mut out),
        Err(EvalError::Decode(_))
    ));
}

#[test]
fn test_dump_renders_batch_slots_and_links() {
    let mut set = ExtractorSet::new();
    set.add_extractor(&ProtoBufExtractor::signed([2])).unwrap();
    set.add_extractor(&ProtoBufExtractor::unsigned([2])).unwrap();
    set.compile().unwrap();

    assert_eq!(
        set.dump().unwrap(),
        "<composite>\n\
         <batch id=\"B0\">\n\
         <pb slot=\"0\" path=\"2\" type=\"int\"/>\n\
         <pb slot=\"1\" path=\"2\" type=\"uint\"/>\n\
         <link n=\"0\">R0</link>\n\
         <link n=\"1\">R1</link>\n\
         </batch>\n\
         </composite>"
    );
}

#[test]
fn test_dump_renders_composition_links() {
    let mut set = ExtractorSet::new();
    set.add_extractor(&Extractor::not(Extractor::equals(
        ProtoBufExtractor::unsigned([1]),
        Extractor::constant(1u64),
    )))
    .unwrap();
    set.compile().unwrap();

    let dump = set.dump().unwrap();
    assert!(dump.contains("<composition id=\"C1\">"));
    assert!(dump.contains("<extractor>EQ(pb[1:uint], const(1))</extractor>"));
    assert!(dump.contains("<link>R0</link>"));
}

#[test]
fn test_compiled_set_is_shared_across_threads() {
    fn assert_shareable<T: Send + Sync>(_: &T) {}

    let mut set = ExtractorSet::new();
    let slot = set.add_extractor(&ProtoBufExtractor::unsigned([1])).unwrap();
    set.compile().unwrap();
    assert_shareable(&set);

    let record = Value::Bytes(Message::new().varint(1, 11).encode());
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let out = eval(&set, &record);
                assert_eq!(out.get(slot), Some(&Value::UInt(11)));
            });
        }
    });
}
