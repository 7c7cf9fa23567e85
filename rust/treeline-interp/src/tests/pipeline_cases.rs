//! End-to-end cases: descriptor text → decoder → basket decode → assembly.

use std::collections::BTreeMap;

use treeline_format::schema::BasicType;

use crate::adapter::{ArrayData, PlainAdapter};
use crate::basket::{DecodeContext, decode_basket, decode_basket_with};
use crate::build::decoder_for;
use crate::decoder::{Decoder, Shape};
use crate::fixed::AsFixed;
use crate::grouped::AsGrouped;
use crate::record::Registry;
use crate::tests::data_gen::{self, WireWriter};

fn build(text: &str) -> Decoder {
    let registry = Registry::new();
    decoder_for(&treeline_typename::parse(text).unwrap(), &registry).unwrap()
}

fn assemble_one(decoder: &Decoder, data: Vec<u8>, rows: u64) -> ArrayData {
    let basket = data_gen::partition(data, 0..rows);
    let decoded = decode_basket(decoder, &basket, "col", 0).unwrap();
    let baskets: BTreeMap<usize, _> = [(0usize, decoded)].into();
    decoder
        .final_array(baskets, 0..rows, &[0..rows], &PlainAdapter)
        .unwrap()
}

#[test]
fn nested_vector_map_vector_pipeline() {
    let decoder = build("vector<map<int,vector<float>>>");
    assert_eq!(
        decoder.logical_shape(),
        Shape::Jagged(Box::new(Shape::Map(
            Box::new(Shape::Item {
                basic_type: BasicType::Int32,
                dims: vec![]
            }),
            Box::new(Shape::Jagged(Box::new(Shape::Item {
                basic_type: BasicType::Float32,
                dims: vec![]
            })))
        )))
    );

    // Row 0: one map, written with keys out of order: {2: [0.5], 1: [1.5, 2.5]}.
    // Row 1: empty vector. Row 2: two maps, one of them empty.
    let mut w = WireWriter::new();
    let frame = w.begin_frame(1);
    w.u32(1);
    w.u32(2); // map entry count
    w.i32(2).i32(1); // keys run
    w.u32(1).f32(0.5); // value run: vector for key 2
    w.u32(2).f32(1.5).f32(2.5); // vector for key 1
    w.end_frame(frame);

    let frame = w.begin_frame(1);
    w.u32(0);
    w.end_frame(frame);

    let frame = w.begin_frame(1);
    w.u32(2);
    w.u32(0); // empty map
    w.u32(1);
    w.i32(9);
    w.u32(3).f32(1.0).f32(2.0).f32(3.0);
    w.end_frame(frame);

    let array = assemble_one(&decoder, w.finish(), 3);
    let ArrayData::Jagged { offsets, content } = array else {
        panic!("expected jagged output");
    };
    assert_eq!(offsets.as_slice(), &[0, 1, 1, 3]);

    let ArrayData::Map {
        offsets: map_offsets,
        keys,
        values,
    } = *content
    else {
        panic!("expected map content");
    };
    assert_eq!(map_offsets.as_slice(), &[0, 2, 2, 3]);

    // Keys come back sorted; the value vectors follow their keys.
    let ArrayData::Fixed { values: key_values, .. } = *keys else {
        panic!("expected fixed keys");
    };
    assert_eq!(key_values.as_slice::<i32>(), &[1, 2, 9]);

    let ArrayData::Jagged {
        offsets: value_offsets,
        content: value_content,
    } = *values
    else {
        panic!("expected jagged map values");
    };
    assert_eq!(value_offsets.as_slice(), &[0, 2, 3, 6]);
    let ArrayData::Fixed { values: floats, .. } = *value_content else {
        panic!("expected fixed floats");
    };
    assert_eq!(floats.as_slice::<f32>(), &[1.5, 2.5, 0.5, 1.0, 2.0, 3.0]);
}

#[test]
fn map_keys_sort_and_duplicates_keep_the_last_value() {
    let decoder = build("map<string,int>");

    let mut w = WireWriter::new();
    // Row 0: keys inserted as ["two", "one"].
    let frame = w.begin_frame(1);
    w.u32(2);
    w.str_prefixed(b"two").str_prefixed(b"one");
    w.i32(2).i32(1);
    w.end_frame(frame);
    // Row 1: duplicate key "a"; the later value 3 must win.
    let frame = w.begin_frame(1);
    w.u32(3);
    w.str_prefixed(b"a").str_prefixed(b"b").str_prefixed(b"a");
    w.i32(1).i32(2).i32(3);
    w.end_frame(frame);

    let array = assemble_one(&decoder, w.finish(), 2);
    let ArrayData::Map { offsets, keys, values } = array else {
        panic!("expected map output");
    };
    assert_eq!(offsets.as_slice(), &[0, 2, 4]);

    let ArrayData::Jagged {
        offsets: key_offsets,
        content: key_bytes,
    } = *keys
    else {
        panic!("expected jagged keys");
    };
    let ArrayData::Fixed { values: key_content, .. } = *key_bytes else {
        panic!("expected key bytes");
    };
    let lengths: Vec<usize> = key_offsets.lengths().collect();
    assert_eq!(lengths, vec![3, 3, 1, 1]);
    assert_eq!(key_content.as_bytes(), b"onetwoab");

    let ArrayData::Fixed { values: int_values, .. } = *values else {
        panic!("expected fixed values");
    };
    assert_eq!(int_values.as_slice::<i32>(), &[1, 2, 3, 2]);
}

#[test]
fn set_rows_come_back_sorted() {
    let decoder = build("set<int>");
    let mut w = WireWriter::new();
    let frame = w.begin_frame(1);
    w.u32(4);
    w.i32(5).i32(-1).i32(5).i32(3);
    w.end_frame(frame);
    let array = assemble_one(&decoder, w.finish(), 1);
    let ArrayData::Jagged { offsets, content } = array else {
        panic!("expected jagged output");
    };
    assert_eq!(offsets.as_slice(), &[0, 3]);
    let ArrayData::Fixed { values, .. } = *content else {
        panic!("expected fixed content");
    };
    assert_eq!(values.as_slice::<i32>(), &[-1, 3, 5]);
}

#[test]
fn strings_trim_across_partitions() {
    let decoder = build("string");
    let all_rows: Vec<Vec<u8>> = vec![
        b"alpha".to_vec(),
        vec![b'x'; 254],
        vec![b'y'; 255],
        vec![b'z'; 256],
        b"".to_vec(),
        b"tail".to_vec(),
    ];
    let mut baskets = BTreeMap::new();
    let entry_ranges = vec![0u64..2, 2..4, 4..6];
    for (index, chunk) in all_rows.chunks(2).enumerate() {
        let rows: Vec<&[u8]> = chunk.iter().map(|r| r.as_slice()).collect();
        let basket = data_gen::partition(
            data_gen::string_basket(&rows),
            entry_ranges[index].clone(),
        );
        baskets.insert(
            index,
            decode_basket(&decoder, &basket, "names", index).unwrap(),
        );
    }

    let array = decoder
        .final_array(baskets, 1..5, &entry_ranges, &PlainAdapter)
        .unwrap();
    let ArrayData::Jagged { offsets, content } = array else {
        panic!("expected jagged output");
    };
    let lengths: Vec<usize> = offsets.lengths().collect();
    assert_eq!(lengths, vec![254, 255, 256, 0]);
    let ArrayData::Fixed { values, .. } = *content else {
        panic!("expected byte content");
    };
    let mut expected = Vec::new();
    for row in &all_rows[1..5] {
        expected.extend_from_slice(row);
    }
    assert_eq!(values.as_bytes(), expected.as_slice());
}

#[test]
fn truncated_float_column_decodes_within_tolerance() {
    let registry = Registry::new();
    let decoder =
        crate::build::decoder_for_column("Double32_t", "pt[0,100,16]", &registry).unwrap();
    let bits = 16u32;
    let scale = (1u64 << bits) as f64 / 100.0;
    let originals = [0.0f64, 12.5, 63.21, 99.9];
    let mut w = WireWriter::new();
    for &value in &originals {
        w.u32((value * scale) as u32);
    }
    let array = assemble_one(&decoder, w.finish(), originals.len() as u64);
    let ArrayData::Fixed { values, basic_type, .. } = array else {
        panic!("expected fixed output");
    };
    assert_eq!(basic_type, BasicType::Float64);
    let tolerance = 100.0 / (1u64 << bits) as f64;
    for (decoded, original) in values.as_slice::<f64>().iter().zip(&originals) {
        assert!((decoded - original).abs() <= tolerance, "{original} -> {decoded}");
    }
}

#[test]
fn bitset_validates_the_declared_width() {
    let decoder = build("bitset<8>");
    let mut w = WireWriter::new();
    let frame = w.begin_frame(1);
    w.u32(8);
    w.bytes(&[1, 0, 0, 1, 1, 0, 1, 0]);
    w.end_frame(frame);
    let array = assemble_one(&decoder, w.finish(), 1);
    let ArrayData::Jagged { offsets, content } = array else {
        panic!("expected jagged output");
    };
    assert_eq!(offsets.as_slice(), &[0, 8]);
    let ArrayData::Fixed { values, basic_type, .. } = *content else {
        panic!("expected fixed content");
    };
    assert_eq!(basic_type, BasicType::Bool);
    assert_eq!(values.as_bytes(), &[1, 0, 0, 1, 1, 0, 1, 0]);

    let mut w = WireWriter::new();
    let frame = w.begin_frame(1);
    w.u32(5);
    w.bytes(&[1, 0, 0, 1, 1]);
    w.end_frame(frame);
    let basket = data_gen::partition(w.finish(), 0..1);
    let err = decode_basket(&decoder, &basket, "flags", 0).unwrap_err();
    assert!(err.to_string().contains("bitset declares 8 bits"), "{err}");
}

#[test]
fn framing_mismatch_carries_the_decoder_trail() {
    let decoder = build("vector<int>");
    let mut w = WireWriter::new();
    let frame = w.begin_frame(1);
    w.u32(2);
    w.i32(10).i32(20);
    w.end_frame(frame);
    let mut data = w.finish();
    // Corrupt the declared byte count.
    let word = u32::from_be_bytes(data[0..4].try_into().unwrap()) + 2;
    data[0..4].copy_from_slice(&word.to_be_bytes());

    let basket = data_gen::partition(data, 0..1);
    let err = decode_basket(&decoder, &basket, "col", 0).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("framing mismatch"), "{msg}");
    assert!(msg.contains("vector<int32_t>"), "{msg}");
}

#[test]
fn counter_column_counts_drive_and_validate_rows() {
    let decoder = build("vector<int>");
    let data = data_gen::vector_i32_basket(&[vec![1, 2], vec![3]]);

    let basket = data_gen::partition(data.clone(), 0..2);
    let mut ctx = DecodeContext::new("col", 0).with_expected_counts(vec![2, 1]);
    let array = decode_basket_with(&decoder, &basket, &mut ctx).unwrap();
    assert_eq!(array.item_count(), 2);

    let mut ctx = DecodeContext::new("col", 0).with_expected_counts(vec![2, 2]);
    let err = decode_basket_with(&decoder, &basket, &mut ctx).unwrap_err();
    assert!(err.to_string().contains("counter column"), "{err}");
}

#[test]
fn grouped_columns_refuse_direct_reads() {
    let decoder = Decoder::Grouped(AsGrouped::new(
        "jet",
        vec![
            ("jet.pt".to_string(), Decoder::Fixed(AsFixed::new(BasicType::Float32))),
            ("jet.n".to_string(), Decoder::Fixed(AsFixed::new(BasicType::Int32))),
        ],
    ));

    let basket = data_gen::partition(vec![], 0..0);
    let err = decode_basket(&decoder, &basket, "jet", 0).unwrap_err();
    assert!(err.to_string().contains("jet.pt, jet.n"), "{err}");

    let err = decoder
        .final_array(BTreeMap::new(), 0..0, &[], &PlainAdapter)
        .unwrap_err();
    assert!(err.to_string().contains("not directly readable"), "{err}");
}

#[test]
fn trailing_bytes_are_rejected() {
    let decoder = build("vector<int>");
    let mut data = data_gen::vector_i32_basket(&[vec![1]]);
    data.push(0xff);
    let basket = data_gen::partition(data, 0..1).with_row_offsets(
        treeline_sequence::offsets::Offsets::from_slice(&[0, 14]),
    );
    let err = decode_basket(&decoder, &basket, "col", 0).unwrap_err();
    assert!(err.to_string().contains("trailing bytes"), "{err}");
}
