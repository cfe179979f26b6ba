use std::net::IpAddr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use num_bigint::BigInt;
use uuid::Uuid;

use crate::column::column::ColumnDescriptor;
use crate::column::column_type::TypeCategory;
use crate::err::client_error::ValueFault;
use crate::err::CResult;
use crate::value::value::{days_to_date, decimal_to_string, Value};

pub const NANOS_PER_DAY: i128 = 86_400 * 1_000_000_000;

/// 带时区元数据的时间点。时区仅当来源列声明时附带
#[derive(Debug, Clone, PartialEq)]
pub struct ZonedInstant {
    nanos: i128,
    tz: Option<String>,
}

impl ZonedInstant {
    pub fn new(nanos: i128, tz: Option<String>) -> Self {
        ZonedInstant { nanos, tz }
    }

    /// 自 epoch 的纳秒数
    pub fn nanos(&self) -> i128 {
        self.nanos
    }

    pub fn timezone(&self) -> Option<&str> {
        self.tz.as_deref()
    }

    pub fn to_utc(&self) -> CResult<DateTime<Utc>> {
        let secs = self.nanos.div_euclid(1_000_000_000);
        let subsec = self.nanos.rem_euclid(1_000_000_000) as u32;
        let secs = i64::try_from(secs)
            .map_err(|_| ValueFault::Overflow(format!("instant {} ns", self.nanos)))?;
        DateTime::from_timestamp(secs, subsec)
            .ok_or_else(|| ValueFault::Overflow(format!("instant {} ns", self.nanos)).into())
    }
}

/// 列描述符与值的组合视图。
///
/// 访问器在描述符的约束下做类型转换: 无损加宽放行, 缩窄报 Overflow,
/// 对 null 的具体类型访问报 Null。视图的生命周期绑定在所属 Record 上,
/// 跨行保留需要 clone 出 Value。
#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    column: &'a ColumnDescriptor,
    value: &'a Value,
}

impl<'a> Field<'a> {
    pub fn new(column: &'a ColumnDescriptor, value: &'a Value) -> Self {
        Field { column, value }
    }

    pub fn column(&self) -> &ColumnDescriptor {
        self.column
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// nullable 访问入口: null 返回 None, 其余访问器不再报 Null
    pub fn opt(&self) -> Option<&Self> {
        if self.value.is_null() {
            None
        } else {
            Some(self)
        }
    }

    /// 剥掉 LowCardinality 与 Nullable 包装后的负载类型
    fn payload_type(&self) -> &'a ColumnDescriptor {
        let mut column = self.column.wire_type();
        if column.category() == TypeCategory::Nullable {
            column = column.inner().unwrap_or(column).wire_type();
        }
        column
    }

    fn non_null(&self) -> CResult<&'a Value> {
        if self.value.is_null() {
            return Err(ValueFault::Null.into());
        }
        Ok(self.value)
    }

    fn mismatch(&self, expect: &'static str) -> ValueFault {
        ValueFault::TypeMismatch {
            expect,
            got: self.value.type_name(),
        }
    }

    pub fn as_i64(&self) -> CResult<i64> {
        match self.non_null()? {
            Value::Int(v) => Ok(*v),
            Value::UInt(v) => i64::try_from(*v)
                .map_err(|_| ValueFault::Overflow(format!("{} as i64", v)).into()),
            Value::BigInt(b) => i64::try_from(b)
                .map_err(|_| ValueFault::Overflow(format!("{} as i64", b)).into()),
            Value::BigUInt(b) => i64::try_from(b)
                .map_err(|_| ValueFault::Overflow(format!("{} as i64", b)).into()),
            Value::Bool(b) => Ok(*b as i64),
            Value::String(s) => s
                .parse::<i64>()
                .map_err(|_| ValueFault::Overflow(format!("'{}' as i64", s)).into()),
            _ => Err(self.mismatch("i64").into()),
        }
    }

    pub fn as_u64(&self) -> CResult<u64> {
        match self.non_null()? {
            Value::UInt(v) => Ok(*v),
            Value::Int(v) => u64::try_from(*v)
                .map_err(|_| ValueFault::Overflow(format!("{} as u64", v)).into()),
            Value::BigInt(b) => u64::try_from(b)
                .map_err(|_| ValueFault::Overflow(format!("{} as u64", b)).into()),
            Value::BigUInt(b) => u64::try_from(b)
                .map_err(|_| ValueFault::Overflow(format!("{} as u64", b)).into()),
            Value::Bool(b) => Ok(*b as u64),
            Value::String(s) => s
                .parse::<u64>()
                .map_err(|_| ValueFault::Overflow(format!("'{}' as u64", s)).into()),
            _ => Err(self.mismatch("u64").into()),
        }
    }

    pub fn as_big_int(&self) -> CResult<BigInt> {
        match self.non_null()? {
            Value::Int(v) => Ok(BigInt::from(*v)),
            Value::UInt(v) => Ok(BigInt::from(*v)),
            Value::BigInt(b) => Ok(b.clone()),
            Value::BigUInt(b) => Ok(BigInt::from(b.clone())),
            Value::String(s) => s
                .parse::<BigInt>()
                .map_err(|_| ValueFault::Overflow(format!("'{}' as integer", s)).into()),
            _ => Err(self.mismatch("big integer").into()),
        }
    }

    pub fn as_f64(&self) -> CResult<f64> {
        match self.non_null()? {
            Value::Float64(v) => Ok(*v),
            Value::Float32(v) => Ok(*v as f64),
            Value::Int(v) => Ok(*v as f64),
            Value::UInt(v) => Ok(*v as f64),
            Value::BigInt(b) => Ok(b.to_string().parse::<f64>().unwrap_or(f64::INFINITY)),
            Value::BigUInt(b) => Ok(b.to_string().parse::<f64>().unwrap_or(f64::INFINITY)),
            Value::Decimal { unscaled, scale } => Ok(decimal_to_string(unscaled, *scale)
                .parse::<f64>()
                .unwrap_or(f64::INFINITY)),
            Value::String(s) => s
                .parse::<f64>()
                .map_err(|_| ValueFault::Overflow(format!("'{}' as f64", s)).into()),
            _ => Err(self.mismatch("f64").into()),
        }
    }

    pub fn as_decimal(&self) -> CResult<BigDecimal> {
        match self.non_null()? {
            Value::Decimal { unscaled, scale } => {
                Ok(BigDecimal::new(unscaled.clone(), *scale as i64))
            }
            Value::Int(v) => Ok(BigDecimal::from(*v)),
            Value::UInt(v) => Ok(BigDecimal::from(*v)),
            Value::BigInt(b) => Ok(BigDecimal::from(b.clone())),
            Value::BigUInt(b) => Ok(BigDecimal::from(BigInt::from(b.clone()))),
            Value::Float64(v) => BigDecimal::try_from(*v)
                .map_err(|_| ValueFault::Overflow(format!("{} as decimal", v)).into()),
            Value::Float32(v) => BigDecimal::try_from(*v as f64)
                .map_err(|_| ValueFault::Overflow(format!("{} as decimal", v)).into()),
            Value::String(s) => s
                .parse::<BigDecimal>()
                .map_err(|_| ValueFault::Overflow(format!("'{}' as decimal", s)).into()),
            _ => Err(self.mismatch("decimal").into()),
        }
    }

    pub fn as_bool(&self) -> CResult<bool> {
        match self.non_null()? {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) | Value::UInt(0) => Ok(false),
            Value::Int(1) | Value::UInt(1) => Ok(true),
            _ => Err(self.mismatch("bool").into()),
        }
    }

    pub fn as_string(&self) -> CResult<String> {
        match self.non_null()? {
            Value::String(s) => Ok(s.clone()),
            Value::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|_| self.mismatch("utf-8 string").into()),
            Value::Int(v) => {
                // Enum 列渲染为成员名
                let payload = self.payload_type();
                if payload.category() == TypeCategory::Enum {
                    if let Some(name) = payload.enum_name_of(*v as i32) {
                        return Ok(name.to_string());
                    }
                }
                Ok(v.to_string())
            }
            Value::UInt(v) => Ok(v.to_string()),
            Value::BigInt(b) => Ok(b.to_string()),
            Value::BigUInt(b) => Ok(b.to_string()),
            Value::Float32(v) => Ok(v.to_string()),
            Value::Float64(v) => Ok(v.to_string()),
            Value::Decimal { unscaled, scale } => Ok(decimal_to_string(unscaled, *scale)),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Date(days) => days_to_date(*days)
                .map(|d| d.to_string())
                .ok_or_else(|| ValueFault::Overflow(format!("date {} days", days)).into()),
            Value::Instant(nanos) => {
                let instant = ZonedInstant::new(*nanos, None);
                Ok(instant.to_utc()?.to_rfc3339())
            }
            Value::Uuid(u) => Ok(u.to_string()),
            Value::Ipv4(ip) => Ok(ip.to_string()),
            Value::Ipv6(ip) => Ok(ip.to_string()),
            _ => Err(self.mismatch("string").into()),
        }
    }

    pub fn as_bytes(&self) -> CResult<Vec<u8>> {
        match self.non_null()? {
            Value::Bytes(b) => Ok(b.clone()),
            Value::String(s) => Ok(s.clone().into_bytes()),
            Value::Bitmap(b) => Ok(b.clone()),
            _ => Err(self.mismatch("bytes").into()),
        }
    }

    pub fn as_date(&self) -> CResult<NaiveDate> {
        match self.non_null()? {
            Value::Date(days) => days_to_date(*days)
                .ok_or_else(|| ValueFault::Overflow(format!("date {} days", days)).into()),
            Value::Instant(nanos) => {
                let days = nanos.div_euclid(NANOS_PER_DAY) as i32;
                days_to_date(days)
                    .ok_or_else(|| ValueFault::Overflow(format!("instant {} ns", nanos)).into())
            }
            Value::String(s) => s
                .parse::<NaiveDate>()
                .map_err(|_| ValueFault::Overflow(format!("'{}' as date", s)).into()),
            _ => Err(self.mismatch("date").into()),
        }
    }

    pub fn as_instant(&self) -> CResult<ZonedInstant> {
        let tz = self.payload_type().timezone().map(|s| s.to_string());
        match self.non_null()? {
            Value::Instant(nanos) => Ok(ZonedInstant::new(*nanos, tz)),
            Value::Date(days) => Ok(ZonedInstant::new(*days as i128 * NANOS_PER_DAY, tz)),
            _ => Err(self.mismatch("instant").into()),
        }
    }

    pub fn as_uuid(&self) -> CResult<Uuid> {
        match self.non_null()? {
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => Uuid::parse_str(s)
                .map_err(|_| ValueFault::Overflow(format!("'{}' as uuid", s)).into()),
            _ => Err(self.mismatch("uuid").into()),
        }
    }

    pub fn as_inet(&self) -> CResult<IpAddr> {
        match self.non_null()? {
            Value::Ipv4(ip) => Ok(IpAddr::V4(*ip)),
            Value::Ipv6(ip) => Ok(IpAddr::V6(*ip)),
            Value::String(s) => s
                .parse::<IpAddr>()
                .map_err(|_| ValueFault::Overflow(format!("'{}' as inet", s)).into()),
            _ => Err(self.mismatch("inet").into()),
        }
    }

    pub fn as_list(&self) -> CResult<Vec<Field<'a>>> {
        let payload = self.payload_type();
        match self.non_null()? {
            Value::Array(items) => {
                let child = payload
                    .children()
                    .first()
                    .ok_or_else(|| self.mismatch("list"))?;
                Ok(items.iter().map(|v| Field::new(child, v)).collect())
            }
            _ => Err(self.mismatch("list").into()),
        }
    }

    pub fn as_tuple(&self) -> CResult<Vec<Field<'a>>> {
        let payload = self.payload_type();
        match self.non_null()? {
            Value::Tuple(items) => {
                if payload.children().len() != items.len() {
                    return Err(self.mismatch("tuple").into());
                }
                Ok(items
                    .iter()
                    .zip(payload.children())
                    .map(|(v, c)| Field::new(c, v))
                    .collect())
            }
            _ => Err(self.mismatch("tuple").into()),
        }
    }

    pub fn as_map(&self) -> CResult<Vec<(Field<'a>, Field<'a>)>> {
        let payload = self.payload_type();
        match self.non_null()? {
            Value::Map(pairs) => {
                let key = payload
                    .children()
                    .first()
                    .ok_or_else(|| self.mismatch("map"))?;
                let val = payload
                    .children()
                    .get(1)
                    .ok_or_else(|| self.mismatch("map"))?;
                Ok(pairs
                    .iter()
                    .map(|(k, v)| (Field::new(key, k), Field::new(val, v)))
                    .collect())
            }
            _ => Err(self.mismatch("map").into()),
        }
    }
}

// 生命周期与 payload_type 的借用无关, Field 本身 Copy
impl<'a> Field<'a> {
    /// 深拷贝出脱离 Record 生命周期的 Value
    pub fn to_owned_value(&self) -> Value {
        self.value.clone()
    }
}
