use std::io::{Cursor, Seek, SeekFrom, Write};

use symcodec::codec::CodecId;
use symcodec::construct::primitives::{u16_be, u32_le, u64_le, u8, Bytes, Const, CString, Flag, GreedyBytes, PaddedString, Padding};
use symcodec::stream::Stream;
use symcodec::{
    compile_or_interpret, container, Array, Checksum, ChecksumKind, Compressed, Computed,
    Construct, ConstructError, Defaulted, Expr, Field, GreedyRange, IfThenElse, IntoConstruct,
    ListContainer, PathSegment, Pointer, Prefixed, PrefixedArray, Rebuild, RepeatUntil, Struct,
    Switch, Tell, Value,
};
use tempfile::tempfile;

fn counted_names() -> Struct {
    Struct::new(vec![
        Field::named("count", u32_le()),
        Field::named("payload", Array::new(Expr::this("count"), PaddedString::new(3))),
    ])
}

#[test]
fn test_counted_record_round_trip() {
    let data = b"\x01\x00\x00\x00abc";
    let parsed = counted_names().parse_bytes(data).unwrap();
    let expected = container! { "count" => 1, "payload" => vec![Value::from("abc")] };
    assert_eq!(parsed, Value::from(expected));

    let rebuilt = counted_names().build_bytes(&parsed).unwrap();
    assert_eq!(rebuilt, data);
    assert_eq!(rebuilt.len(), 7);
}

#[test]
fn test_fixed_count_mismatch_on_build() {
    let arr = Array::new(3, u8());
    let err = arr.build_bytes(&Value::from(vec![Value::from(1), Value::from(2)])).unwrap_err();
    assert!(matches!(err, ConstructError::RepeatCountMismatch { expected: 3, actual: 2 }));
}

#[test]
fn test_forward_reference_is_rejected() {
    let backwards = Struct::new(vec![
        Field::named("a", u8()),
        Field::named("b", Bytes::new(Expr::this("c"))),
        Field::named("c", u8()),
    ]);
    let err = backwards.parse_bytes(&[1, 2, 3, 4]).unwrap_err();
    assert!(matches!(err.root_cause(), ConstructError::MissingContextValue(n) if n == "c"));
    assert_eq!(err.path(), [PathSegment::Field("b".into())]);

    let forwards = Struct::new(vec![
        Field::named("a", u8()),
        Field::named("b", Bytes::new(Expr::this("a"))),
    ]);
    let v = forwards.parse_bytes(&[2, 9, 8]).unwrap();
    assert_eq!(v.as_container().unwrap()["b"], Value::from(vec![9u8, 8]));
}

#[test]
fn test_error_path_names_failure_site() {
    let entry = Struct::new(vec![Field::named("length", u32_le())]);
    let table = Struct::new(vec![
        Field::named("n", u8()),
        Field::named("entries", Array::new(Expr::this("n"), entry)),
    ]);
    let err = table.parse_bytes(&[3, 1, 0, 0, 0, 2, 0, 0, 0, 7]).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ConstructError::StreamTruncated { requested: 4, available: 1 }
    ));
    assert_eq!(
        err.path(),
        [
            PathSegment::Field("entries".into()),
            PathSegment::Index(2),
            PathSegment::Field("length".into()),
        ]
    );
    assert!(err.to_string().ends_with("(at entries -> [2] -> length)"));
}

#[test]
fn test_switch_selects_by_discriminant() {
    let message = Struct::new(vec![
        Field::named("kind", u8()),
        Field::named(
            "body",
            Switch::new(Expr::this("kind")).case(1, u16_be()).case(2, CString),
        ),
    ]);
    let v = message.parse_bytes(&[1, 0x12, 0x34]).unwrap();
    assert_eq!(v.as_container().unwrap()["body"], Value::Int(0x1234));
    let v = message.parse_bytes(b"\x02hi\0").unwrap();
    assert_eq!(v.as_container().unwrap()["body"], Value::from("hi"));

    let err = message.parse_bytes(&[7, 0]).unwrap_err();
    assert!(matches!(err.root_cause(), ConstructError::NoMatchingCase(_)));

    let with_default = Switch::new(Expr::param("kind")).case(1, u8()).default(GreedyBytes);
    let mut params = symcodec::Container::new();
    params.set("kind", 5);
    assert_eq!(with_default.parse_with(b"xyz", params).unwrap(), Value::from(b"xyz"));
}

#[test]
fn test_if_then_else_and_flag() {
    let optional = Struct::new(vec![
        Field::named("present", Flag),
        Field::named("value", IfThenElse::when(Expr::this("present"), u8())),
    ]);
    let v = optional.parse_bytes(&[1, 42]).unwrap();
    assert_eq!(v.as_container().unwrap()["value"], Value::Int(42));
    let v = optional.parse_bytes(&[0]).unwrap();
    assert!(v.as_container().unwrap()["value"].is_none());
    assert_eq!(optional.build_bytes(&v).unwrap(), [0]);
}

#[test]
fn test_pointer_reads_elsewhere_and_returns() {
    let header = Struct::new(vec![
        Field::named("offset", u8()),
        Field::named("target", Pointer::new(Expr::this("offset"), u16_be())),
        Field::named("next", u8()),
    ]);
    let v = header.parse_bytes(&[4, 0xaa, 0, 0, 0xbe, 0xef]).unwrap();
    let c = v.as_container().unwrap();
    assert_eq!(c["target"], Value::Int(0xbeef));
    assert_eq!(c["next"], Value::Int(0xaa));

    let tail = Pointer::new(-2i64, u16_be());
    assert_eq!(tail.parse_bytes(&[0, 0, 0, 1, 2]).unwrap(), Value::Int(0x0102));
    assert_eq!(tail.sizeof_static().unwrap(), 0);
}

#[test]
fn test_pointer_restores_position_after_inner_failure() {
    let mut stream = Cursor::new(vec![0u8; 8]);
    stream.seek(SeekFrom::Start(3)).unwrap();
    let far = Pointer::new(6, u32_le());
    let err = far.parse_stream(&mut stream, symcodec::Container::new()).unwrap_err();
    assert!(matches!(err, ConstructError::StreamTruncated { requested: 4, available: 2 }));
    assert_eq!(stream.tell().unwrap(), 3);
}

#[test]
fn test_pointer_on_file_stream() {
    let mut file = tempfile().unwrap();
    file.write_all(&[9, 0, 0, 0, 0, 0, 0xca, 0xfe]).unwrap();
    file.seek(SeekFrom::Start(1)).unwrap();

    let far = Pointer::new(6, u16_be());
    let v = far.parse_stream(&mut file, symcodec::Container::new()).unwrap();
    assert_eq!(v, Value::Int(0xcafe));
    assert_eq!(file.stream_position().unwrap(), 1);

    let relative = Pointer::relative(5, u16_be());
    assert_eq!(relative.parse_stream(&mut file, symcodec::Container::new()).unwrap(), Value::Int(0xcafe));
    assert_eq!(file.stream_position().unwrap(), 1);
}

#[test]
fn test_pointer_build_writes_out_of_line() {
    let layout = Struct::new(vec![
        Field::named("value", Pointer::new(4, u8())),
        Field::anonymous(Padding::new(4)),
    ]);
    let out = layout.build_bytes(&container! { "value" => 0x55 }.into()).unwrap();
    assert_eq!(out, [0, 0, 0, 0, 0x55]);
}

#[test]
fn test_computed_and_rebuild() {
    let packet = Struct::new(vec![
        Field::named("length", Rebuild::new(u8(), Expr::len_of("data"))),
        Field::named("data", Bytes::new(Expr::this("length"))),
        Field::named("double", Computed::new(Expr::new(|ctx| {
            let n = ctx.get("length")?.as_int().unwrap_or(0);
            Ok(Value::Int(n * 2))
        }))),
    ]);
    let out = packet.build_bytes(&container! { "data" => b"abc" }.into()).unwrap();
    assert_eq!(out, b"\x03abc");

    let v = packet.parse_bytes(&out).unwrap();
    assert_eq!(v.as_container().unwrap()["double"], Value::Int(6));
    assert_eq!(packet.parse_bytes(&out).unwrap(), v);
}

#[test]
fn test_defaults_and_constants_fill_in_missing_fields() {
    let header = Struct::new(vec![
        Field::anonymous(Const::bytes(b"HDR")),
        Field::named("version", Defaulted::new(u8(), 2)),
        Field::named("pos", Tell),
    ]);
    let out = header.build_bytes(&symcodec::Container::new().into()).unwrap();
    assert_eq!(out, b"HDR\x02");
    let v = header.parse_bytes(&out).unwrap();
    assert_eq!(v, Value::from(container! { "version" => 2, "pos" => 4 }));

    let err = header.parse_bytes(b"BAD\x02").unwrap_err();
    assert!(matches!(err, ConstructError::FormatViolation(_)));
}

#[test]
fn test_missing_field_on_build() {
    let err = counted_names().build_bytes(&container! { "count" => 0 }.into()).unwrap_err();
    assert!(matches!(err.root_cause(), ConstructError::MissingContextValue(n) if n == "payload"));
}

#[test]
fn test_greedy_range_stops_at_first_failure() {
    let words = GreedyRange::new(u16_be());
    let mut stream = Cursor::new(vec![0, 1, 0, 2, 9]);
    let v = words.parse_stream(&mut stream, symcodec::Container::new()).unwrap();
    assert_eq!(v, Value::from(vec![Value::from(1), Value::from(2)]));
    assert_eq!(stream.tell().unwrap(), 4);
    assert!(matches!(words.sizeof_static(), Err(ConstructError::SizeUndetermined(_))));
    assert_eq!(words.build_bytes(&v).unwrap(), [0, 1, 0, 2]);
}

#[test]
fn test_greedy_range_propagates_definition_errors() {
    let broken = GreedyRange::new(Bytes::new(Expr::this("nope")));
    let err = broken.parse_bytes(&[1, 2]).unwrap_err();
    assert!(matches!(err.root_cause(), ConstructError::MissingContextValue(_)));
}

#[test]
fn test_repeat_until_and_prefixed_array() {
    let until_zero = RepeatUntil::new(|v: &Value, _: &ListContainer, _: &symcodec::Context<'_>| v.as_int() == Some(0), u8());
    let v = until_zero.parse_bytes(&[3, 2, 0, 9]).unwrap();
    assert_eq!(v.as_list().unwrap().len(), 3);
    assert_eq!(until_zero.build_bytes(&v).unwrap(), [3, 2, 0]);
    assert!(until_zero.build_bytes(&Value::from(vec![Value::from(1)])).is_err());

    let prefixed = PrefixedArray::new(u8(), u16_be());
    let v = prefixed.parse_bytes(&[2, 0, 1, 0, 2]).unwrap();
    assert_eq!(v.as_list().unwrap().len(), 2);
    assert_eq!(prefixed.build_bytes(&v).unwrap(), [2, 0, 1, 0, 2]);
}

#[test]
fn test_array_elements_see_index_and_enclosing_fields() {
    let entry = Struct::new(vec![
        Field::named("slot", Computed::new(Expr::index())),
        Field::named("width", Computed::new(Expr::parent("width"))),
        Field::named("raw", Bytes::new(Expr::parent("width"))),
    ]);
    let table = Struct::new(vec![
        Field::named("width", u8()),
        Field::named("rows", Array::new(2, entry)),
    ]);
    let v = table.parse_bytes(&[1, 0xa, 0xb]).unwrap();
    let rows = v.as_container().unwrap()["rows"].as_list().unwrap().clone();
    assert_eq!(rows[1].as_container().unwrap()["slot"], Value::Int(1));
    assert_eq!(rows[0].as_container().unwrap()["width"], Value::Int(1));
    assert_eq!(table.build_bytes(&v).unwrap(), [1, 0xa, 0xb]);
}

#[test]
fn test_prefixed_bounds_greedy_child() {
    let framed = Struct::new(vec![
        Field::named("body", Prefixed::new(u8(), GreedyBytes)),
        Field::named("trailer", u8()),
    ]);
    let v = framed.parse_bytes(&[2, b'h', b'i', 0xff]).unwrap();
    let c = v.as_container().unwrap();
    assert_eq!(c["body"], Value::from(b"hi"));
    assert_eq!(c["trailer"], Value::Int(0xff));
    assert_eq!(framed.build_bytes(&v).unwrap(), [2, b'h', b'i', 0xff]);
}

#[test]
fn test_compressed_round_trip_for_every_codec() {
    let text = b"symmetric codecs, symmetric codecs, symmetric codecs".to_vec();
    for id in [CodecId::None, CodecId::Zstd, CodecId::Lz4, CodecId::Brotli, CodecId::Lzma] {
        let layout = Struct::new(vec![
            Field::named("tag", u8()),
            Field::named("blob", Prefixed::new(u32_le(), Compressed::new(GreedyBytes, id))),
        ]);
        let value = Value::from(container! { "tag" => 7, "blob" => text.clone() });
        let out = layout.build_bytes(&value).unwrap();
        assert_eq!(layout.parse_bytes(&out).unwrap(), value, "codec {}", id.name());
    }
    assert_eq!(CodecId::from_name("ZSTD"), Some(CodecId::Zstd));
}

#[test]
fn test_corrupt_compressed_data_is_a_format_violation() {
    let blob = Compressed::new(GreedyBytes, CodecId::Zstd);
    let err = blob.parse_bytes(b"definitely not a zstd frame").unwrap_err();
    assert!(matches!(&err, ConstructError::FormatViolation(msg) if msg.contains("zstd")));
    assert!(err.to_string().contains("27 bytes of compressed data"));
}

#[test]
fn test_checksums_are_computed_and_verified() {
    for (kind, field) in [
        (ChecksumKind::Crc32, u32_le().into_construct()),
        (ChecksumKind::Blake3, Bytes::new(32).into_construct()),
    ] {
        let layout = Struct::new(vec![
            Field::named("data", Bytes::new(5)),
            Field::named("sum", Checksum::new(field, kind, Expr::this("data"))),
        ]);
        let out = layout.build_bytes(&container! { "data" => b"hello" }.into()).unwrap();
        let v = layout.parse_bytes(&out).unwrap();
        assert_eq!(v.as_container().unwrap()["sum"], kind.digest(b"hello"));

        let mut corrupt = out.clone();
        corrupt[0] ^= 1;
        let err = layout.parse_bytes(&corrupt).unwrap_err();
        assert!(matches!(err.root_cause(), ConstructError::FormatViolation(_)));
    }
    assert_eq!(ChecksumKind::Crc32.digest(b"hello"), Value::Int(0x3610a686));
}

#[test]
fn test_sizeof() {
    assert_eq!(counted_names().sizeof_static().unwrap_err().to_string(),
        "size cannot be determined: depends on `count` (at payload)");
    let fixed = Struct::new(vec![
        Field::named("a", u32_le()),
        Field::named("b", Array::new(3, u16_be())),
        Field::named("c", Computed::new(1)),
        Field::anonymous(Padding::new(2)),
    ]);
    assert_eq!(fixed.sizeof_static().unwrap(), 12);

    let mut params = symcodec::Container::new();
    params.set("n", 5);
    assert_eq!(Bytes::new(Expr::param("n")).sizeof_with(params).unwrap(), 5);

    let mut params = symcodec::Container::new();
    params.set("n", usize::MAX / 2);
    let err = Array::new(Expr::param("n"), u64_le()).sizeof_with(params).unwrap_err();
    assert!(matches!(err.root_cause(), ConstructError::SizeUndetermined(_)));

    // the prefix says how long the region is, so there is no static size
    let prefixed = Prefixed::new(u8(), Bytes::new(2));
    assert!(matches!(prefixed.sizeof_static(), Err(ConstructError::SizeUndetermined(_))));
}

#[test]
fn test_huge_count_is_truncated_not_allocated() {
    let mut data = (1u64 << 60).to_le_bytes().to_vec();
    data.push(1);
    let counted = Struct::new(vec![
        Field::named("n", u64_le()),
        Field::named("items", Array::new(Expr::this("n"), u8())),
    ]);
    let err = counted.parse_bytes(&data).unwrap_err();
    assert!(matches!(err.root_cause(), ConstructError::StreamTruncated { available: 0, .. }));

    let mut data = (u64::MAX >> 1).to_le_bytes().to_vec();
    data.push(1);
    let sized = Struct::new(vec![
        Field::named("n", u64_le()),
        Field::named("data", Bytes::new(Expr::this("n"))),
    ]);
    let err = sized.parse_bytes(&data).unwrap_err();
    assert!(matches!(err.root_cause(), ConstructError::StreamTruncated { available: 1, .. }));

    let prefixed = PrefixedArray::new(u32_le(), u8());
    let err = prefixed.parse_bytes(b"\xFF\xFF\xFF\xFF\x01\x02").unwrap_err();
    assert!(matches!(err.root_cause(), ConstructError::StreamTruncated { .. }));
}

#[test]
fn test_compiled_struct_matches_interpreted() {
    let fixed = Struct::new(vec![
        Field::named("magic", Const::new(u16_be(), 0xcafe)),
        Field::named("values", Array::new(2, u32_le())),
    ])
    .into_construct();
    let compiled = compile_or_interpret(&fixed);
    assert_eq!(format!("{compiled:?}").split_whitespace().next(), Some("Buffered"));

    let data = [0xca, 0xfe, 1, 0, 0, 0, 2, 0, 0, 0];
    let a = fixed.parse_bytes(&data).unwrap();
    let b = compiled.parse_bytes(&data).unwrap();
    assert_eq!(a, b);
    assert_eq!(compiled.build_bytes(&a).unwrap(), fixed.build_bytes(&b).unwrap());
    assert!(compiled.parse_bytes(&data[..9]).is_err());
}

#[test]
fn test_compiled_prefixed_struct_matches_interpreted() {
    let layout = Struct::new(vec![Field::named("p", Prefixed::new(u8(), Bytes::new(2)))]).into_construct();
    let compiled = compile_or_interpret(&layout);
    assert_ne!(format!("{compiled:?}").split_whitespace().next(), Some("Buffered"));

    // the child reads two of the three prefixed bytes; the rest is skipped
    let data = [3, b'a', b'b', b'c'];
    let a = layout.parse_bytes(&data).unwrap();
    assert_eq!(a, Value::from(container! { "p" => b"ab".to_vec() }));
    assert_eq!(compiled.parse_bytes(&data).unwrap(), a);
    assert_eq!(compiled.build_bytes(&a).unwrap(), layout.build_bytes(&a).unwrap());
}

#[test]
fn test_uncompilable_constructs_fall_back_silently() {
    let opaque = Computed::new(Expr::new(|_| Ok(Value::Int(1)))).into_construct();
    assert!(opaque.compile().is_err());
    let used = compile_or_interpret(&opaque);
    assert!(std::sync::Arc::ptr_eq(&used, &opaque));

    let positioned = Pointer::new(0, u8()).into_construct();
    assert!(matches!(positioned.compile(), Err(symcodec::CompileError::PositionDependent(_))));
    assert_eq!(compile_or_interpret(&positioned).parse_bytes(&[4]).unwrap(), Value::Int(4));

    // a variable-size struct still compiles, just without buffering
    let compiled = compile_or_interpret(&counted_names().into_construct());
    assert_eq!(compiled.parse_bytes(b"\x01\x00\x00\x00abc").unwrap(),
        counted_names().parse_bytes(b"\x01\x00\x00\x00abc").unwrap());
}
