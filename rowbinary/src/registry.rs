use std::collections::HashMap;

use once_cell::sync::Lazy;

use common::column::column::ColumnDescriptor;
use common::column::column_type::TypeCategory;

/// 无参数类型的静态元数据: 规范名、分类、定长编码字节数
#[derive(Debug, Clone, Copy)]
pub struct SimpleType {
    pub name: &'static str,
    pub category: TypeCategory,
    pub signed: bool,
    pub width_bits: u16,
}

impl SimpleType {
    /// 定长类型的编码字节数, 变长返回 None
    pub fn encoded_len(&self) -> Option<usize> {
        match self.category {
            TypeCategory::Integer
            | TypeCategory::Float
            | TypeCategory::Date
            | TypeCategory::DateTime => Some(self.width_bits as usize / 8),
            TypeCategory::Bool => Some(1),
            TypeCategory::Uuid => Some(16),
            TypeCategory::Ipv4 => Some(4),
            TypeCategory::Ipv6 => Some(16),
            _ => None,
        }
    }

    pub fn descriptor(&self) -> ColumnDescriptor {
        ColumnDescriptor::new(self.category)
            .with_signed(self.signed)
            .with_width_bits(self.width_bits)
    }
}

macro_rules! simple {
    ($name:literal, $category:expr, $signed:expr, $width:expr) => {
        (
            $name,
            SimpleType {
                name: $name,
                category: $category,
                signed: $signed,
                width_bits: $width,
            },
        )
    };
}

/// 规范名 -> 元数据。外层类型名大小写敏感
pub static SIMPLE_TYPES: Lazy<HashMap<&'static str, SimpleType>> = Lazy::new(|| {
    HashMap::from([
        simple!("Int8", TypeCategory::Integer, true, 8),
        simple!("Int16", TypeCategory::Integer, true, 16),
        simple!("Int32", TypeCategory::Integer, true, 32),
        simple!("Int64", TypeCategory::Integer, true, 64),
        simple!("Int128", TypeCategory::Integer, true, 128),
        simple!("Int256", TypeCategory::Integer, true, 256),
        simple!("UInt8", TypeCategory::Integer, false, 8),
        simple!("UInt16", TypeCategory::Integer, false, 16),
        simple!("UInt32", TypeCategory::Integer, false, 32),
        simple!("UInt64", TypeCategory::Integer, false, 64),
        simple!("UInt128", TypeCategory::Integer, false, 128),
        simple!("UInt256", TypeCategory::Integer, false, 256),
        simple!("Float32", TypeCategory::Float, true, 32),
        simple!("Float64", TypeCategory::Float, true, 64),
        simple!("Bool", TypeCategory::Bool, false, 8),
        simple!("String", TypeCategory::String, false, 0),
        simple!("Date", TypeCategory::Date, false, 16),
        simple!("Date32", TypeCategory::Date, true, 32),
        simple!("UUID", TypeCategory::Uuid, false, 128),
        simple!("IPv4", TypeCategory::Ipv4, false, 32),
        simple!("IPv6", TypeCategory::Ipv6, false, 128),
    ])
});

pub fn lookup(name: &str) -> Option<&'static SimpleType> {
    SIMPLE_TYPES.get(name)
}
