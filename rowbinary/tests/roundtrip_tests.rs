use std::io::Cursor;

use bytes::BytesMut;
use num_bigint::BigInt;

use common::column::column_type::DefaultKind;
use common::schema::table_schema::TableSchema;
use common::value::value::Value;
use rowbinary::decoder::RowBinaryDecoder;
use rowbinary::encoder::encode_value;
use rowbinary::type_parser::parse_column;

fn sample_schema() -> TableSchema {
    TableSchema::new(vec![
        parse_column("a", "UInt64", DefaultKind::None).unwrap(),
        parse_column("b", "Array(Nullable(Int32))", DefaultKind::None).unwrap(),
        parse_column("c", "Decimal64(3)", DefaultKind::None).unwrap(),
    ])
}

fn sample_row() -> Vec<Value> {
    vec![
        Value::UInt(42),
        Value::Array(vec![Value::Int(1), Value::Null, Value::Int(7)]),
        Value::Decimal {
            unscaled: BigInt::from(12345),
            scale: 3,
        },
    ]
}

#[test]
fn roundtrip_row_has_exact_wire_length() {
    let schema = sample_schema();
    let row = sample_row();

    let mut buf = BytesMut::new();
    for (column, value) in schema.columns().iter().zip(row.iter()) {
        encode_value(&mut buf, column, value).unwrap();
    }

    // 8 + 1 + (1+4) + (1+0) + (1+4) + 8
    assert_eq!(buf.len(), 28);

    let mut decoder = RowBinaryDecoder::new(Cursor::new(buf.to_vec()));
    let decoded = decoder.decode_row(&schema).unwrap();
    assert_eq!(decoded, row);
    assert!(decoder.at_end().unwrap());
}

#[test]
fn wire_bytes_match_expected_layout() {
    let schema = sample_schema();
    let row = sample_row();

    let mut buf = BytesMut::new();
    for (column, value) in schema.columns().iter().zip(row.iter()) {
        encode_value(&mut buf, column, value).unwrap();
    }

    let expected = hex::decode(concat!(
        "2a00000000000000", // a = 42, u64 LE
        "03",               // array len
        "0001000000",       // present, 1
        "01",               // null
        "0007000000",       // present, 7
        "3930000000000000", // c = 12345 unscaled, i64 LE
    ))
    .unwrap();
    assert_eq!(buf.to_vec(), expected);
}

#[test]
fn decoding_truncated_row_fails() {
    let schema = sample_schema();
    let row = sample_row();

    let mut buf = BytesMut::new();
    for (column, value) in schema.columns().iter().zip(row.iter()) {
        encode_value(&mut buf, column, value).unwrap();
    }

    let truncated = &buf.to_vec()[..20];
    let mut decoder = RowBinaryDecoder::new(Cursor::new(truncated.to_vec()));
    assert!(decoder.decode_row(&schema).is_err());
}
