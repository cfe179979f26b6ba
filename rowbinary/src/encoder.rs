use bytes::{BufMut, BytesMut};
use num_bigint::BigInt;

use common::column::column::ColumnDescriptor;
use common::column::column_type::TypeCategory;
use common::err::client_error::EncodeFault;
use common::err::CResult;
use common::value::value::Value;

use crate::leb128::{write_var_bytes, write_var_uint};
use crate::wide::bigint_to_le_bytes;

/// RowBinary 编码器。单字段入口, 行级组装由写入方按表结构驱动。
///
/// 非 Nullable 列收到 null 直接报错; Nullable 列先写 1 字节存在标记。
pub fn encode_value(buf: &mut BytesMut, column: &ColumnDescriptor, value: &Value) -> CResult<()> {
    let wire = column.wire_type();

    if wire.category() == TypeCategory::Nullable {
        if value.is_null() {
            buf.put_u8(1);
            return Ok(());
        }
        buf.put_u8(0);
        let inner = wire.inner().expect("nullable wraps one inner type");
        return encode_payload(buf, inner.wire_type(), value, column);
    }

    if value.is_null() {
        return Err(EncodeFault::UnexpectedNull(label(column)).into());
    }
    encode_payload(buf, wire, value, column)
}

/// RowBinaryWithDefaults 的字段编码: 1 = 用库默认值, 0 = 值随后
pub fn encode_value_with_default(
    buf: &mut BytesMut,
    column: &ColumnDescriptor,
    value: Option<&Value>,
) -> CResult<()> {
    match value {
        None => {
            buf.put_u8(1);
            Ok(())
        }
        Some(v) => {
            buf.put_u8(0);
            encode_value(buf, column, v)
        }
    }
}

fn label(column: &ColumnDescriptor) -> String {
    if column.name().is_empty() {
        column.to_string()
    } else {
        column.name().to_string()
    }
}

fn mismatch(column: &ColumnDescriptor, value: &Value) -> EncodeFault {
    EncodeFault::TypeMismatch {
        column: label(column),
        got: value.type_name().to_string(),
    }
}

/// 整数族负载统一收敛到 BigInt 后按位宽检查落盘
fn integer_payload(value: &Value) -> Option<BigInt> {
    match value {
        Value::Int(v) => Some(BigInt::from(*v)),
        Value::UInt(v) => Some(BigInt::from(*v)),
        Value::BigInt(b) => Some(b.clone()),
        Value::BigUInt(b) => Some(BigInt::from(b.clone())),
        Value::Bool(b) => Some(BigInt::from(*b as u8)),
        _ => None,
    }
}

fn put_integer(
    buf: &mut BytesMut,
    column: &ColumnDescriptor,
    wire: &ColumnDescriptor,
    unscaled: BigInt,
) -> CResult<()> {
    let width_bytes = wire.width_bits() as usize / 8;
    let bytes = if wire.is_signed() {
        bigint_to_le_bytes(&unscaled, width_bytes)
    } else {
        if unscaled.sign() == num_bigint::Sign::Minus {
            None
        } else {
            unscaled
                .to_biguint()
                .and_then(|u| crate::wide::biguint_to_le_bytes(&u, width_bytes))
        }
    };
    match bytes {
        Some(bytes) => {
            buf.put_slice(&bytes);
            Ok(())
        }
        None => Err(EncodeFault::TypeMismatch {
            column: label(column),
            got: format!("integer {} out of range for {}", unscaled, wire),
        }
        .into()),
    }
}

fn encode_payload(
    buf: &mut BytesMut,
    wire: &ColumnDescriptor,
    value: &Value,
    column: &ColumnDescriptor,
) -> CResult<()> {
    match wire.category() {
        TypeCategory::Integer => {
            let unscaled = integer_payload(value).ok_or_else(|| mismatch(column, value))?;
            put_integer(buf, column, wire, unscaled)
        }
        TypeCategory::Float => match wire.width_bits() {
            32 => {
                let v = match value {
                    Value::Float32(v) => *v,
                    Value::Float64(v) => *v as f32,
                    Value::Int(v) => *v as f32,
                    Value::UInt(v) => *v as f32,
                    _ => return Err(mismatch(column, value).into()),
                };
                buf.put_f32_le(v);
                Ok(())
            }
            _ => {
                let v = match value {
                    Value::Float64(v) => *v,
                    Value::Float32(v) => *v as f64,
                    Value::Int(v) => *v as f64,
                    Value::UInt(v) => *v as f64,
                    _ => return Err(mismatch(column, value).into()),
                };
                buf.put_f64_le(v);
                Ok(())
            }
        },
        TypeCategory::Decimal => {
            let unscaled = decimal_unscaled(wire, value, column)?;
            put_integer(buf, column, wire, unscaled)
        }
        TypeCategory::Bool => {
            let v = match value {
                Value::Bool(b) => *b as u8,
                Value::Int(0) | Value::UInt(0) => 0,
                Value::Int(1) | Value::UInt(1) => 1,
                _ => return Err(mismatch(column, value).into()),
            };
            buf.put_u8(v);
            Ok(())
        }
        TypeCategory::String => match value {
            Value::String(s) => {
                write_var_bytes(buf, s.as_bytes());
                Ok(())
            }
            Value::Bytes(b) => {
                write_var_bytes(buf, b);
                Ok(())
            }
            _ => Err(mismatch(column, value).into()),
        },
        TypeCategory::FixedString => {
            let bytes: &[u8] = match value {
                Value::String(s) => s.as_bytes(),
                Value::Bytes(b) => b,
                _ => return Err(mismatch(column, value).into()),
            };
            let fixed = wire.fixed_length();
            if bytes.len() > fixed {
                return Err(EncodeFault::FixedStringOverflow {
                    column: label(column),
                    len: bytes.len(),
                    fixed,
                }
                .into());
            }
            buf.put_slice(bytes);
            // 右侧补零对齐
            buf.put_bytes(0, fixed - bytes.len());
            Ok(())
        }
        TypeCategory::Date => {
            let days = match value {
                Value::Date(d) => *d as i64,
                Value::Int(v) => *v,
                Value::UInt(v) => *v as i64,
                _ => return Err(mismatch(column, value).into()),
            };
            if wire.width_bits() == 32 {
                let days = i32::try_from(days).map_err(|_| EncodeFault::TypeMismatch {
                    column: label(column),
                    got: format!("{} days out of Date32 range", days),
                })?;
                buf.put_i32_le(days);
            } else {
                let days = u16::try_from(days).map_err(|_| EncodeFault::TypeMismatch {
                    column: label(column),
                    got: format!("{} days out of Date range", days),
                })?;
                buf.put_u16_le(days);
            }
            Ok(())
        }
        TypeCategory::DateTime => {
            if wire.width_bits() == 64 {
                let ticks = match value {
                    Value::Instant(nanos) => {
                        let divisor = 10i128.pow(9 - wire.scale());
                        let ticks = nanos.div_euclid(divisor);
                        i64::try_from(ticks).map_err(|_| EncodeFault::TypeMismatch {
                            column: label(column),
                            got: format!("instant {} ns out of DateTime64 range", nanos),
                        })?
                    }
                    Value::Int(v) => *v,
                    Value::UInt(v) => {
                        i64::try_from(*v).map_err(|_| mismatch(column, value))?
                    }
                    _ => return Err(mismatch(column, value).into()),
                };
                buf.put_i64_le(ticks);
            } else {
                let secs = match value {
                    Value::Instant(nanos) => {
                        let secs = nanos.div_euclid(1_000_000_000);
                        u32::try_from(secs).map_err(|_| EncodeFault::TypeMismatch {
                            column: label(column),
                            got: format!("instant {} ns out of DateTime range", nanos),
                        })?
                    }
                    Value::Int(v) => u32::try_from(*v).map_err(|_| mismatch(column, value))?,
                    Value::UInt(v) => u32::try_from(*v).map_err(|_| mismatch(column, value))?,
                    _ => return Err(mismatch(column, value).into()),
                };
                buf.put_u32_le(secs);
            }
            Ok(())
        }
        TypeCategory::Uuid => {
            let uuid = match value {
                Value::Uuid(u) => *u,
                Value::String(s) => uuid::Uuid::parse_str(s)
                    .map_err(|_| mismatch(column, value))?,
                _ => return Err(mismatch(column, value).into()),
            };
            // RFC 4122 大端字节按两个 u64 半区小端落盘 (high, low)
            let bytes = uuid.as_bytes();
            let high = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
            let low = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
            buf.put_u64_le(high);
            buf.put_u64_le(low);
            Ok(())
        }
        TypeCategory::Ipv4 => {
            let ip = match value {
                Value::Ipv4(ip) => *ip,
                Value::String(s) => s
                    .parse::<std::net::Ipv4Addr>()
                    .map_err(|_| mismatch(column, value))?,
                _ => return Err(mismatch(column, value).into()),
            };
            buf.put_slice(&ip.octets());
            Ok(())
        }
        TypeCategory::Ipv6 => {
            let ip = match value {
                Value::Ipv6(ip) => *ip,
                Value::String(s) => s
                    .parse::<std::net::Ipv6Addr>()
                    .map_err(|_| mismatch(column, value))?,
                _ => return Err(mismatch(column, value).into()),
            };
            buf.put_slice(&ip.octets());
            Ok(())
        }
        TypeCategory::Enum => {
            let member = match value {
                Value::Int(v) => i32::try_from(*v).ok(),
                Value::UInt(v) => i32::try_from(*v).ok(),
                Value::String(s) => wire.enum_value_of(s),
                _ => return Err(mismatch(column, value).into()),
            };
            let member = member.ok_or_else(|| mismatch(column, value))?;
            if wire.enum_name_of(member).is_none() {
                return Err(EncodeFault::EnumValueOutOfRange {
                    column: label(column),
                    value: member as i64,
                }
                .into());
            }
            if wire.width_bits() == 16 {
                buf.put_i16_le(member as i16);
            } else {
                buf.put_i8(member as i8);
            }
            Ok(())
        }
        TypeCategory::Array | TypeCategory::Nested => {
            let items = match value {
                Value::Array(items) => items,
                _ => return Err(mismatch(column, value).into()),
            };
            let child = &wire.children()[0];
            write_var_uint(buf, items.len() as u64);
            for item in items {
                encode_value(buf, child, item)?;
            }
            Ok(())
        }
        TypeCategory::Tuple => {
            let items = match value {
                Value::Tuple(items) => items,
                _ => return Err(mismatch(column, value).into()),
            };
            if items.len() != wire.children().len() {
                return Err(mismatch(column, value).into());
            }
            for (item, child) in items.iter().zip(wire.children()) {
                encode_value(buf, child, item)?;
            }
            Ok(())
        }
        TypeCategory::Map => {
            let pairs = match value {
                Value::Map(pairs) => pairs,
                _ => return Err(mismatch(column, value).into()),
            };
            let key = &wire.children()[0];
            let val = &wire.children()[1];
            write_var_uint(buf, pairs.len() as u64);
            for (k, v) in pairs {
                encode_value(buf, key, k)?;
                encode_value(buf, val, v)?;
            }
            Ok(())
        }
        TypeCategory::AggregateBitmap => {
            let bytes = match value {
                Value::Bitmap(b) => b,
                Value::Bytes(b) => b,
                _ => return Err(mismatch(column, value).into()),
            };
            write_var_bytes(buf, bytes);
            Ok(())
        }
        // wire_type 已剥离包装, 到不了这两支
        TypeCategory::Nullable | TypeCategory::LowCardinality => {
            Err(mismatch(column, value).into())
        }
    }
}

/// 任意来源的 decimal 负载换算到列的 scale
fn decimal_unscaled(
    wire: &ColumnDescriptor,
    value: &Value,
    column: &ColumnDescriptor,
) -> CResult<BigInt> {
    let target = wire.scale();
    match value {
        Value::Decimal { unscaled, scale } => {
            if *scale == target {
                Ok(unscaled.clone())
            } else if *scale < target {
                Ok(unscaled * BigInt::from(10).pow(target - scale))
            } else {
                let divisor = BigInt::from(10).pow(scale - target);
                let (quotient, remainder) = (unscaled / &divisor, unscaled % &divisor);
                if remainder != BigInt::from(0) {
                    return Err(EncodeFault::TypeMismatch {
                        column: label(column),
                        got: format!("decimal scale {} does not fit scale {}", scale, target),
                    }
                    .into());
                }
                Ok(quotient)
            }
        }
        Value::Int(v) => Ok(BigInt::from(*v) * BigInt::from(10).pow(target)),
        Value::UInt(v) => Ok(BigInt::from(*v) * BigInt::from(10).pow(target)),
        Value::BigInt(b) => Ok(b * BigInt::from(10).pow(target)),
        Value::Float64(f) => decimal_from_text(&format!("{:.*}", target as usize, f), target)
            .ok_or_else(|| mismatch(column, value).into()),
        Value::Float32(f) => {
            decimal_from_text(&format!("{:.*}", target as usize, *f as f64), target)
                .ok_or_else(|| mismatch(column, value).into())
        }
        Value::String(s) => {
            decimal_from_text(s, target).ok_or_else(|| mismatch(column, value).into())
        }
        _ => Err(mismatch(column, value).into()),
    }
}

/// 规范十进制文本 -> 目标 scale 的未缩放整数。小数位超长返回 None
fn decimal_from_text(text: &str, target_scale: u32) -> Option<BigInt> {
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    if frac_part.len() > target_scale as usize {
        return None;
    }

    let mut digits = String::with_capacity(int_part.len() + target_scale as usize);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    for _ in frac_part.len()..target_scale as usize {
        digits.push('0');
    }
    let mut unscaled: BigInt = digits.parse().ok()?;
    if negative {
        unscaled = -unscaled;
    }
    Some(unscaled)
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;
    use num_bigint::BigInt;

    use common::column::column::ColumnDescriptor;
    use common::column::column_type::TypeCategory;
    use common::err::client_error::{ClientError, EncodeFault};
    use common::value::value::Value;

    use crate::encoder::{encode_value, encode_value_with_default};
    use crate::type_parser::parse_column_type;

    fn encode(type_str: &str, value: &Value) -> Vec<u8> {
        let column = parse_column_type(type_str).unwrap();
        let mut buf = BytesMut::new();
        encode_value(&mut buf, &column, value).unwrap();
        buf.to_vec()
    }

    fn encode_err(type_str: &str, value: &Value) -> ClientError {
        let column = parse_column_type(type_str).unwrap();
        let mut buf = BytesMut::new();
        encode_value(&mut buf, &column, value).unwrap_err()
    }

    #[test]
    fn test_integers_little_endian() {
        assert_eq!(encode("UInt8", &Value::UInt(0xab)), vec![0xab]);
        assert_eq!(encode("UInt16", &Value::UInt(0x0102)), vec![0x02, 0x01]);
        assert_eq!(
            encode("Int32", &Value::Int(-2)),
            vec![0xfe, 0xff, 0xff, 0xff]
        );
        assert_eq!(encode("Int64", &Value::Int(1)), {
            let mut v = vec![1u8];
            v.extend_from_slice(&[0; 7]);
            v
        });
    }

    #[test]
    fn test_integer_range_check() {
        let err = encode_err("UInt8", &Value::Int(256));
        assert!(matches!(
            err,
            ClientError::Encode(EncodeFault::TypeMismatch { .. })
        ));
        let err = encode_err("UInt8", &Value::Int(-1));
        assert!(matches!(
            err,
            ClientError::Encode(EncodeFault::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_wide_integers() {
        let bytes = encode("Int128", &Value::BigInt(BigInt::from(-1)));
        assert_eq!(bytes, vec![0xff; 16]);

        let bytes = encode("UInt256", &Value::from(1u64));
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes.len(), 32);
    }

    #[test]
    fn test_nullable_flag() {
        assert_eq!(encode("Nullable(UInt8)", &Value::Null), vec![1]);
        assert_eq!(encode("Nullable(UInt8)", &Value::UInt(7)), vec![0, 7]);

        let err = encode_err("UInt8", &Value::Null);
        assert!(matches!(
            err,
            ClientError::Encode(EncodeFault::UnexpectedNull(_))
        ));
    }

    #[test]
    fn test_string_and_fixed_string() {
        assert_eq!(
            encode("String", &Value::String(String::from("ab"))),
            vec![2, b'a', b'b']
        );

        assert_eq!(
            encode("FixedString(4)", &Value::String(String::from("ab"))),
            vec![b'a', b'b', 0, 0]
        );

        let err = encode_err("FixedString(2)", &Value::String(String::from("abc")));
        assert!(matches!(
            err,
            ClientError::Encode(EncodeFault::FixedStringOverflow { len: 3, fixed: 2, .. })
        ));
    }

    #[test]
    fn test_decimal_rescale() {
        // 12.345 at Decimal64(3) -> unscaled 12345, 8 bytes LE
        let value = Value::Decimal {
            unscaled: BigInt::from(12345),
            scale: 3,
        };
        let bytes = encode("Decimal64(3)", &value);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..2], &[0x39, 0x30]);

        // scale 1 -> 3 需要补零
        let value = Value::Decimal {
            unscaled: BigInt::from(5),
            scale: 1,
        };
        assert_eq!(encode("Decimal32(3)", &value)[..2], [0xf4, 0x01]);

        // 文本与整数来源
        assert_eq!(
            encode("Decimal32(2)", &Value::String(String::from("1.25")))[..2],
            [0x7d, 0x00]
        );
        assert_eq!(encode("Decimal32(2)", &Value::Int(2))[..2], [0xc8, 0x00]);

        // 缩 scale 丢精度要报错
        let value = Value::Decimal {
            unscaled: BigInt::from(123),
            scale: 4,
        };
        assert!(matches!(
            encode_err("Decimal32(2)", &value),
            ClientError::Encode(EncodeFault::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_enum_membership() {
        let column = "Enum8('a' = 1, 'b' = 2)";
        assert_eq!(encode(column, &Value::Int(2)), vec![2]);
        assert_eq!(encode(column, &Value::String(String::from("a"))), vec![1]);

        assert!(matches!(
            encode_err(column, &Value::Int(9)),
            ClientError::Encode(EncodeFault::EnumValueOutOfRange { value: 9, .. })
        ));
    }

    #[test]
    fn test_uuid_half_order() {
        let uuid = uuid::Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let bytes = encode("UUID", &Value::Uuid(uuid));
        // 高半区小端在前
        assert_eq!(
            bytes,
            vec![
                0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00, //
                0xff, 0xee, 0xdd, 0xcc, 0xbb, 0xaa, 0x99, 0x88,
            ]
        );
    }

    #[test]
    fn test_array_of_nullable() {
        let value = Value::Array(vec![Value::Int(1), Value::Null, Value::Int(7)]);
        let bytes = encode("Array(Nullable(Int32))", &value);
        // len + (flag+4) + flag + (flag+4)
        assert_eq!(bytes.len(), 1 + 5 + 1 + 5);
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[6], 1);
    }

    #[test]
    fn test_with_default_marker() {
        let column = parse_column_type("UInt8").unwrap();
        let mut buf = BytesMut::new();
        encode_value_with_default(&mut buf, &column, None).unwrap();
        assert_eq!(buf.as_ref(), &[1]);

        let mut buf = BytesMut::new();
        encode_value_with_default(&mut buf, &column, Some(&Value::UInt(9))).unwrap();
        assert_eq!(buf.as_ref(), &[0, 9]);
    }

    #[test]
    fn test_low_cardinality_transparent() {
        assert_eq!(
            encode("LowCardinality(String)", &Value::String(String::from("x"))),
            encode("String", &Value::String(String::from("x")))
        );
    }

    #[test]
    fn test_map() {
        let value = Value::Map(vec![
            (Value::String(String::from("k")), Value::UInt(1)),
            (Value::String(String::from("q")), Value::UInt(2)),
        ]);
        let bytes = encode("Map(String, UInt8)", &value);
        assert_eq!(bytes, vec![2, 1, b'k', 1, 1, b'q', 2]);
    }
}
