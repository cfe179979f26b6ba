use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use num_bigint::{BigInt, BigUint, Sign};
use uuid::Uuid;

/// 1970-01-01 的 CE 日序号, chrono num_days_from_ce 口径
pub const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// 单个字段的解码结果。
///
/// 整数按符号与宽度分档: 64 位以内收敛到 Int/UInt, 128/256 位走大整数。
/// Decimal 保留未缩放整数与 scale, 相等性按 (unscaled, scale) 判定。
/// DateTime/DateTime64 统一为自 epoch 的纳秒数。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,

    Int(i64),
    UInt(u64),
    BigInt(BigInt),
    BigUInt(BigUint),

    Float32(f32),
    Float64(f64),

    Decimal { unscaled: BigInt, scale: u32 },

    Bool(bool),

    String(String),
    Bytes(Vec<u8>),

    /// 自 1970-01-01 的天数
    Date(i32),
    /// 自 epoch 的纳秒数
    Instant(i128),

    Uuid(Uuid),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),

    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Vec<(Value, Value)>),

    /// 序列化的 roaring bitmap, 原样透传
    Bitmap(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 负载种类名, 用于错误信息
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Int(_) => "Int",
            Value::UInt(_) => "UInt",
            Value::BigInt(_) => "BigInt",
            Value::BigUInt(_) => "BigUInt",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::Decimal { .. } => "Decimal",
            Value::Bool(_) => "Bool",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Date(_) => "Date",
            Value::Instant(_) => "Instant",
            Value::Uuid(_) => "Uuid",
            Value::Ipv4(_) => "Ipv4",
            Value::Ipv6(_) => "Ipv6",
            Value::Array(_) => "Array",
            Value::Tuple(_) => "Tuple",
            Value::Map(_) => "Map",
            Value::Bitmap(_) => "Bitmap",
        }
    }
}

/// Decimal 的规范十进制渲染, 不带 locale
pub fn decimal_to_string(unscaled: &BigInt, scale: u32) -> String {
    let negative = unscaled.sign() == Sign::Minus;
    let mut digits = unscaled.magnitude().to_string();

    if scale == 0 {
        return if negative {
            format!("-{}", digits)
        } else {
            digits
        };
    }

    let scale = scale as usize;
    if digits.len() <= scale {
        let pad = scale - digits.len() + 1;
        digits = format!("{}{}", "0".repeat(pad), digits);
    }
    let point = digits.len() - scale;
    let rendered = format!("{}.{}", &digits[..point], &digits[point..]);
    if negative {
        format!("-{}", rendered)
    } else {
        rendered
    }
}

/// 天数 -> 日历日期
pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Value::BigInt(BigInt::from(v))
    }
}

impl From<u128> for Value {
    fn from(v: u128) -> Self {
        Value::BigUInt(BigUint::from(v))
    }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Self {
        Value::BigInt(v)
    }
}

impl From<BigUint> for Value {
    fn from(v: BigUint) -> Self {
        Value::BigUInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(date_to_days(v))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        let nanos =
            v.timestamp() as i128 * 1_000_000_000 + v.timestamp_subsec_nanos() as i128;
        Value::Instant(nanos)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<Ipv4Addr> for Value {
    fn from(v: Ipv4Addr) -> Self {
        Value::Ipv4(v)
    }
}

impl From<Ipv6Addr> for Value {
    fn from(v: Ipv6Addr) -> Self {
        Value::Ipv6(v)
    }
}

impl From<IpAddr> for Value {
    fn from(v: IpAddr) -> Self {
        match v {
            IpAddr::V4(v4) => Value::Ipv4(v4),
            IpAddr::V6(v6) => Value::Ipv6(v6),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            None => Value::Null,
            Some(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use num_bigint::BigInt;

    use crate::value::value::{date_to_days, days_to_date, decimal_to_string, Value};

    #[test]
    fn test_decimal_render() {
        assert_eq!(decimal_to_string(&BigInt::from(12345), 3), "12.345");
        assert_eq!(decimal_to_string(&BigInt::from(-12345), 3), "-12.345");
        assert_eq!(decimal_to_string(&BigInt::from(5), 3), "0.005");
        assert_eq!(decimal_to_string(&BigInt::from(-5), 3), "-0.005");
        assert_eq!(decimal_to_string(&BigInt::from(42), 0), "42");
        assert_eq!(decimal_to_string(&BigInt::from(0), 2), "0.00");
    }

    #[test]
    fn test_day_conversion() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_days(epoch), 0);
        assert_eq!(days_to_date(0), Some(epoch));

        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let days = date_to_days(date);
        assert_eq!(days_to_date(days), Some(date));
    }

    #[test]
    fn test_from_option() {
        let v: Value = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: Value = Some(7i64).into();
        assert_eq!(v, Value::Int(7));
    }

    #[test]
    fn test_decimal_equality_is_unscaled_plus_scale() {
        let a = Value::Decimal {
            unscaled: BigInt::from(100),
            scale: 2,
        };
        let b = Value::Decimal {
            unscaled: BigInt::from(10),
            scale: 1,
        };
        // 1.00 与 1.0 不做归一化
        assert_ne!(a, b);
    }
}
