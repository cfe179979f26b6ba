use std::io;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use uuid::Uuid;

use common::column::column::ColumnDescriptor;
use common::column::column_type::TypeCategory;
use common::err::client_error::DecodeFault;
use common::err::CResult;
use common::schema::table_schema::TableSchema;
use common::value::value::Value;

use crate::leb128::{map_read_err, read_var_bytes, read_var_string, read_var_uint};
use crate::wide::{bigint_from_le_bytes, biguint_from_le_bytes};

/// 单字节回推的读取器, 用于行边界上的 EOF 探测
struct PushbackReader<R> {
    inner: R,
    pending: Option<u8>,
}

impl<R: Read> Read for PushbackReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(byte) = self.pending.take() {
            buf[0] = byte;
            return Ok(1);
        }
        self.inner.read(buf)
    }
}

/// RowBinary 流式解码器。
///
/// 从字节流按列描述符依次还原 Value。行级入口提供分配模式
/// (decode_row) 与槽位复用模式 (decode_row_into): 复用模式在行边界
/// 改写既有 Value, 越过行边界仍持有旧引用的调用方看到的是被覆盖后的值。
pub struct RowBinaryDecoder<R> {
    reader: PushbackReader<R>,
}

impl<R: Read> RowBinaryDecoder<R> {
    pub fn new(reader: R) -> Self {
        RowBinaryDecoder {
            reader: PushbackReader {
                inner: reader,
                pending: None,
            },
        }
    }

    pub fn into_inner(self) -> R {
        self.reader.inner
    }

    /// 流是否已经干净地结束。读到字节则回推
    pub fn at_end(&mut self) -> CResult<bool> {
        if self.reader.pending.is_some() {
            return Ok(false);
        }
        let mut byte = [0u8; 1];
        loop {
            match self.reader.inner.read(&mut byte) {
                Ok(0) => return Ok(true),
                Ok(_) => {
                    self.reader.pending = Some(byte[0]);
                    return Ok(false);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_read_err(err)),
            }
        }
    }

    /// RowBinaryWithNamesAndTypes 的头部: 列数 + 列名 + 类型串
    pub fn decode_names_and_types(&mut self) -> CResult<(Vec<String>, Vec<String>)> {
        let count = read_var_uint(&mut self.reader)? as usize;
        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            names.push(read_var_string(&mut self.reader)?);
        }
        let mut types = Vec::with_capacity(count);
        for _ in 0..count {
            types.push(read_var_string(&mut self.reader)?);
        }
        Ok((names, types))
    }

    /// 分配一行新 Value
    pub fn decode_row(&mut self, schema: &TableSchema) -> CResult<Vec<Value>> {
        let mut values = Vec::with_capacity(schema.len());
        for column in schema.columns() {
            values.push(self.decode_value(column)?);
        }
        Ok(values)
    }

    /// 复用模式: 改写调用方持有的槽位
    pub fn decode_row_into(
        &mut self,
        schema: &TableSchema,
        slots: &mut Vec<Value>,
    ) -> CResult<()> {
        slots.resize(schema.len(), Value::Null);
        for (column, slot) in schema.columns().iter().zip(slots.iter_mut()) {
            *slot = self.decode_value(column)?;
        }
        Ok(())
    }

    pub fn decode_value(&mut self, column: &ColumnDescriptor) -> CResult<Value> {
        let wire = column.wire_type();

        if wire.category() == TypeCategory::Nullable {
            let flag = self.read_u8()?;
            return match flag {
                1 => Ok(Value::Null),
                0 => {
                    let inner = wire.inner().expect("nullable wraps one inner type");
                    self.decode_payload(inner.wire_type())
                }
                other => Err(DecodeFault::UnexpectedTag(other).into()),
            };
        }
        self.decode_payload(wire)
    }

    fn read_u8(&mut self) -> CResult<u8> {
        self.reader.read_u8().map_err(map_read_err)
    }

    fn read_fixed(&mut self, len: usize) -> CResult<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        self.reader.read_exact(&mut bytes).map_err(map_read_err)?;
        Ok(bytes)
    }

    fn decode_payload(&mut self, wire: &ColumnDescriptor) -> CResult<Value> {
        match wire.category() {
            TypeCategory::Integer => self.decode_integer(wire),
            TypeCategory::Float => {
                if wire.width_bits() == 32 {
                    Ok(Value::Float32(
                        self.reader.read_f32::<LittleEndian>().map_err(map_read_err)?,
                    ))
                } else {
                    Ok(Value::Float64(
                        self.reader.read_f64::<LittleEndian>().map_err(map_read_err)?,
                    ))
                }
            }
            TypeCategory::Decimal => {
                let bytes = self.read_fixed(wire.width_bits() as usize / 8)?;
                Ok(Value::Decimal {
                    unscaled: bigint_from_le_bytes(&bytes),
                    scale: wire.scale(),
                })
            }
            TypeCategory::Bool => match self.read_u8()? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(DecodeFault::UnexpectedTag(other).into()),
            },
            TypeCategory::String => Ok(Value::String(read_var_string(&mut self.reader)?)),
            TypeCategory::FixedString => {
                Ok(Value::Bytes(self.read_fixed(wire.fixed_length())?))
            }
            TypeCategory::Date => {
                if wire.width_bits() == 32 {
                    let days = self.reader.read_i32::<LittleEndian>().map_err(map_read_err)?;
                    Ok(Value::Date(days))
                } else {
                    let days = self.reader.read_u16::<LittleEndian>().map_err(map_read_err)?;
                    Ok(Value::Date(days as i32))
                }
            }
            TypeCategory::DateTime => {
                if wire.width_bits() == 64 {
                    let ticks = self.reader.read_i64::<LittleEndian>().map_err(map_read_err)?;
                    let multiplier = 10i128.pow(9 - wire.scale());
                    Ok(Value::Instant(ticks as i128 * multiplier))
                } else {
                    let secs = self.reader.read_u32::<LittleEndian>().map_err(map_read_err)?;
                    Ok(Value::Instant(secs as i128 * 1_000_000_000))
                }
            }
            TypeCategory::Uuid => {
                let high = self.reader.read_u64::<LittleEndian>().map_err(map_read_err)?;
                let low = self.reader.read_u64::<LittleEndian>().map_err(map_read_err)?;
                let mut bytes = [0u8; 16];
                bytes[0..8].copy_from_slice(&high.to_be_bytes());
                bytes[8..16].copy_from_slice(&low.to_be_bytes());
                Ok(Value::Uuid(Uuid::from_bytes(bytes)))
            }
            TypeCategory::Ipv4 => {
                let bytes = self.read_fixed(4)?;
                Ok(Value::Ipv4(std::net::Ipv4Addr::new(
                    bytes[0], bytes[1], bytes[2], bytes[3],
                )))
            }
            TypeCategory::Ipv6 => {
                let bytes = self.read_fixed(16)?;
                let octets: [u8; 16] = bytes.try_into().expect("16 bytes read");
                Ok(Value::Ipv6(std::net::Ipv6Addr::from(octets)))
            }
            TypeCategory::Enum => {
                let member = if wire.width_bits() == 16 {
                    self.reader.read_i16::<LittleEndian>().map_err(map_read_err)? as i32
                } else {
                    self.reader.read_i8().map_err(map_read_err)? as i32
                };
                if wire.enum_name_of(member).is_none() {
                    return Err(DecodeFault::InvalidData(format!(
                        "value {} is not a declared member of {}",
                        member, wire
                    ))
                    .into());
                }
                Ok(Value::Int(member as i64))
            }
            TypeCategory::Array | TypeCategory::Nested => {
                let len = read_var_uint(&mut self.reader)? as usize;
                let child = &wire.children()[0];
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode_value(child)?);
                }
                Ok(Value::Array(items))
            }
            TypeCategory::Tuple => {
                let mut items = Vec::with_capacity(wire.children().len());
                for child in wire.children() {
                    items.push(self.decode_value(child)?);
                }
                Ok(Value::Tuple(items))
            }
            TypeCategory::Map => {
                let len = read_var_uint(&mut self.reader)? as usize;
                let key = &wire.children()[0];
                let val = &wire.children()[1];
                let mut pairs = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    let k = self.decode_value(key)?;
                    let v = self.decode_value(val)?;
                    pairs.push((k, v));
                }
                Ok(Value::Map(pairs))
            }
            TypeCategory::AggregateBitmap => {
                Ok(Value::Bitmap(read_var_bytes(&mut self.reader)?))
            }
            // decode_value 入口已剥离
            TypeCategory::Nullable | TypeCategory::LowCardinality => {
                Err(DecodeFault::InvalidData(format!("unexpected wrapper {}", wire)).into())
            }
        }
    }

    fn decode_integer(&mut self, wire: &ColumnDescriptor) -> CResult<Value> {
        let width_bytes = wire.width_bits() as usize / 8;
        let bytes = self.read_fixed(width_bytes)?;

        if width_bytes <= 8 {
            if wire.is_signed() {
                // 符号扩展到 64 位
                let fill = if bytes[width_bytes - 1] & 0x80 != 0 {
                    0xff
                } else {
                    0
                };
                let mut wide = [fill; 8];
                wide[..width_bytes].copy_from_slice(&bytes);
                Ok(Value::Int(i64::from_le_bytes(wide)))
            } else {
                let mut wide = [0u8; 8];
                wide[..width_bytes].copy_from_slice(&bytes);
                Ok(Value::UInt(u64::from_le_bytes(wide)))
            }
        } else if wire.is_signed() {
            Ok(Value::BigInt(bigint_from_le_bytes(&bytes)))
        } else {
            Ok(Value::BigUInt(biguint_from_le_bytes(&bytes)))
        }
    }
}

impl<R: Read> RowBinaryDecoder<R> {
    /// 解码一行, 流尾返回 None
    pub fn decode_row_opt(&mut self, schema: &TableSchema) -> CResult<Option<Vec<Value>>> {
        if self.at_end()? {
            return Ok(None);
        }
        Ok(Some(self.decode_row(schema)?))
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use bytes::BytesMut;
    use num_bigint::{BigInt, BigUint};

    use common::err::client_error::{ClientError, DecodeFault};
    use common::schema::table_schema::TableSchema;
    use common::value::value::Value;

    use crate::decoder::RowBinaryDecoder;
    use crate::encoder::encode_value;
    use crate::type_parser::{parse_column, parse_column_type};

    fn roundtrip(type_str: &str, value: Value) {
        let column = parse_column_type(type_str).unwrap();
        let mut buf = BytesMut::new();
        encode_value(&mut buf, &column, &value).unwrap();

        let mut decoder = RowBinaryDecoder::new(Cursor::new(buf.to_vec()));
        let decoded = decoder.decode_value(&column).unwrap();
        assert_eq!(decoded, value, "round-trip mismatch for {}", type_str);
        assert!(decoder.at_end().unwrap());
    }

    #[test]
    fn test_scalar_roundtrip() {
        roundtrip("Int8", Value::Int(-5));
        roundtrip("Int64", Value::Int(i64::MIN));
        roundtrip("UInt64", Value::UInt(u64::MAX));
        roundtrip("Int128", Value::BigInt(BigInt::from(-1) << 100));
        roundtrip("UInt256", Value::BigUInt(BigUint::from(7u8) << 200));
        roundtrip("Float32", Value::Float32(1.5));
        roundtrip("Float64", Value::Float64(-0.25));
        roundtrip("Bool", Value::Bool(true));
        roundtrip("String", Value::String(String::from("你好")));
        roundtrip("Date", Value::Date(19000));
        roundtrip("Date32", Value::Date(-3000));
        roundtrip("DateTime", Value::Instant(1_600_000_000 * 1_000_000_000));
        roundtrip(
            "DateTime64(3)",
            Value::Instant(1_600_000_000_123 * 1_000_000),
        );
        roundtrip(
            "UUID",
            Value::Uuid(uuid::Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap()),
        );
        roundtrip("IPv4", Value::Ipv4("127.0.0.1".parse().unwrap()));
        roundtrip("IPv6", Value::Ipv6("::1".parse().unwrap()));
    }

    #[test]
    fn test_decimal_roundtrip() {
        roundtrip(
            "Decimal(9, 3)",
            Value::Decimal {
                unscaled: BigInt::from(-12345),
                scale: 3,
            },
        );
        roundtrip(
            "Decimal(76, 10)",
            Value::Decimal {
                unscaled: BigInt::from(1) << 200,
                scale: 10,
            },
        );
    }

    #[test]
    fn test_composite_roundtrip() {
        roundtrip(
            "Array(Nullable(Int32))",
            Value::Array(vec![Value::Int(1), Value::Null, Value::Int(7)]),
        );
        roundtrip(
            "Map(String, Array(UInt8))",
            Value::Map(vec![(
                Value::String(String::from("k")),
                Value::Array(vec![Value::UInt(1), Value::UInt(2)]),
            )]),
        );
        roundtrip(
            "Tuple(UInt8, String)",
            Value::Tuple(vec![Value::UInt(1), Value::String(String::from("x"))]),
        );
        roundtrip(
            "Nested(x UInt8, y String)",
            Value::Array(vec![Value::Tuple(vec![
                Value::UInt(3),
                Value::String(String::from("a")),
            ])]),
        );
        roundtrip("AggregateFunction(groupBitmap, UInt32)", Value::Bitmap(vec![0, 1, 2, 3]));
    }

    #[test]
    fn test_nullable_wire_shape() {
        // 非空值的首字节必须是 0
        let column = parse_column_type("Nullable(UInt8)").unwrap();
        let mut buf = BytesMut::new();
        encode_value(&mut buf, &column, &Value::UInt(9)).unwrap();
        assert_eq!(buf[0], 0);

        let mut decoder = RowBinaryDecoder::new(Cursor::new(vec![1u8]));
        assert_eq!(decoder.decode_value(&column).unwrap(), Value::Null);

        let mut decoder = RowBinaryDecoder::new(Cursor::new(vec![9u8, 0]));
        assert!(matches!(
            decoder.decode_value(&column),
            Err(ClientError::Decode(DecodeFault::UnexpectedTag(9)))
        ));
    }

    #[test]
    fn test_invalid_utf8_string_fails() {
        let column = parse_column_type("String").unwrap();
        let mut decoder = RowBinaryDecoder::new(Cursor::new(vec![2u8, 0xff, 0xfe]));
        assert!(matches!(
            decoder.decode_value(&column),
            Err(ClientError::Decode(DecodeFault::InvalidUtf8))
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let column = parse_column_type("UInt64").unwrap();
        let mut decoder = RowBinaryDecoder::new(Cursor::new(vec![1u8, 2, 3]));
        assert!(matches!(
            decoder.decode_value(&column),
            Err(ClientError::Decode(DecodeFault::Truncated))
        ));
    }

    #[test]
    fn test_row_streaming_and_reuse() {
        let schema = TableSchema::new(vec![
            parse_column("a", "UInt8", Default::default()).unwrap(),
            parse_column("b", "String", Default::default()).unwrap(),
        ]);

        let mut buf = BytesMut::new();
        for (a, b) in [(1u8, "one"), (2, "two")] {
            encode_value(
                &mut buf,
                schema.column_at(0).unwrap(),
                &Value::UInt(a as u64),
            )
            .unwrap();
            encode_value(
                &mut buf,
                schema.column_at(1).unwrap(),
                &Value::String(b.to_string()),
            )
            .unwrap();
        }

        let mut decoder = RowBinaryDecoder::new(Cursor::new(buf.to_vec()));
        let mut slots = Vec::new();
        decoder.decode_row_into(&schema, &mut slots).unwrap();
        assert_eq!(slots[0], Value::UInt(1));

        // 槽位在下一行被改写
        decoder.decode_row_into(&schema, &mut slots).unwrap();
        assert_eq!(slots[0], Value::UInt(2));
        assert_eq!(slots[1], Value::String(String::from("two")));

        assert!(decoder.decode_row_opt(&schema).unwrap().is_none());
    }

    #[test]
    fn test_names_and_types_header() {
        let mut buf = BytesMut::new();
        crate::leb128::write_var_uint(&mut buf, 2);
        crate::leb128::write_var_bytes(&mut buf, b"id");
        crate::leb128::write_var_bytes(&mut buf, b"name");
        crate::leb128::write_var_bytes(&mut buf, b"UInt64");
        crate::leb128::write_var_bytes(&mut buf, b"String");

        let mut decoder = RowBinaryDecoder::new(Cursor::new(buf.to_vec()));
        let (names, types) = decoder.decode_names_and_types().unwrap();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(types, vec!["UInt64", "String"]);
    }
}
