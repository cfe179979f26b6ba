use std::fmt;

use crate::column::column_type::{DefaultKind, TypeCategory};

/// 单个列类型解析后的元数据。
///
/// 由类型串(如 `Array(Nullable(Decimal(9, 3)))`)解析得到，驱动 RowBinary
/// 编解码。复合类型的子类型保存在 children 中，声明顺序。
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    name: String,

    category: TypeCategory,

    /// Integer 分类是否有符号
    signed: bool,

    /// Integer/Float/Decimal/Date/DateTime/Enum 的位宽
    width_bits: u16,

    /// Decimal 的精度
    precision: u32,

    /// Decimal 与 DateTime64 的小数位
    scale: u32,

    /// DateTime 携带的时区, 仅展示用元数据
    timezone: Option<String>,

    /// Enum8/Enum16 的成员, 声明顺序
    enum_members: Vec<(String, i32)>,

    /// FixedString 的字节长度
    fixed_length: usize,

    /// 复合类型的子类型
    children: Vec<ColumnDescriptor>,

    /// Nested 与命名 Tuple 的子列名, 与 children 对齐
    child_names: Vec<String>,

    default_kind: DefaultKind,
}

impl ColumnDescriptor {
    pub fn new(category: TypeCategory) -> Self {
        ColumnDescriptor {
            name: String::new(),
            category,
            signed: true,
            width_bits: 0,
            precision: 0,
            scale: 0,
            timezone: None,
            enum_members: Vec::new(),
            fixed_length: 0,
            children: Vec::new(),
            child_names: Vec::new(),
            default_kind: DefaultKind::None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    pub fn with_width_bits(mut self, width_bits: u16) -> Self {
        self.width_bits = width_bits;
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_timezone(mut self, timezone: Option<String>) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_enum_members(mut self, members: Vec<(String, i32)>) -> Self {
        self.enum_members = members;
        self
    }

    pub fn with_fixed_length(mut self, fixed_length: usize) -> Self {
        self.fixed_length = fixed_length;
        self
    }

    pub fn with_children(mut self, children: Vec<ColumnDescriptor>) -> Self {
        self.children = children;
        self
    }

    pub fn with_child_names(mut self, child_names: Vec<String>) -> Self {
        self.child_names = child_names;
        self
    }

    pub fn with_default_kind(mut self, default_kind: DefaultKind) -> Self {
        self.default_kind = default_kind;
        self
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn set_default_kind(&mut self, default_kind: DefaultKind) {
        self.default_kind = default_kind;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> TypeCategory {
        self.category
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn width_bits(&self) -> u16 {
        self.width_bits
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    pub fn enum_members(&self) -> &[(String, i32)] {
        &self.enum_members
    }

    pub fn fixed_length(&self) -> usize {
        self.fixed_length
    }

    pub fn children(&self) -> &[ColumnDescriptor] {
        &self.children
    }

    pub fn child_names(&self) -> &[String] {
        &self.child_names
    }

    pub fn default_kind(&self) -> DefaultKind {
        self.default_kind
    }

    pub fn is_nullable(&self) -> bool {
        self.category == TypeCategory::Nullable
    }

    /// Nullable/LowCardinality 的内部类型
    pub fn inner(&self) -> Option<&ColumnDescriptor> {
        match self.category {
            TypeCategory::Nullable | TypeCategory::LowCardinality => self.children.first(),
            _ => None,
        }
    }

    /// 剥离 LowCardinality 包装。RowBinary 线上形态与内部类型一致
    pub fn wire_type(&self) -> &ColumnDescriptor {
        if self.category == TypeCategory::LowCardinality {
            self.children.first().unwrap_or(self)
        } else {
            self
        }
    }

    /// 按成员值查 enum 名
    pub fn enum_name_of(&self, value: i32) -> Option<&str> {
        self.enum_members
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }

    pub fn enum_value_of(&self, name: &str) -> Option<i32> {
        self.enum_members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// 渲染为 ClickHouse 规范类型串
impl fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            TypeCategory::Integer => {
                let prefix = if self.signed { "Int" } else { "UInt" };
                write!(f, "{}{}", prefix, self.width_bits)
            }
            TypeCategory::Float => write!(f, "Float{}", self.width_bits),
            TypeCategory::Decimal => write!(f, "Decimal({}, {})", self.precision, self.scale),
            TypeCategory::Bool => write!(f, "Bool"),
            TypeCategory::String => write!(f, "String"),
            TypeCategory::FixedString => write!(f, "FixedString({})", self.fixed_length),
            TypeCategory::Date => {
                if self.width_bits == 32 {
                    write!(f, "Date32")
                } else {
                    write!(f, "Date")
                }
            }
            TypeCategory::DateTime => {
                if self.width_bits == 64 {
                    match &self.timezone {
                        Some(tz) => write!(f, "DateTime64({}, '{}')", self.scale, tz),
                        None => write!(f, "DateTime64({})", self.scale),
                    }
                } else {
                    match &self.timezone {
                        Some(tz) => write!(f, "DateTime('{}')", tz),
                        None => write!(f, "DateTime"),
                    }
                }
            }
            TypeCategory::Uuid => write!(f, "UUID"),
            TypeCategory::Ipv4 => write!(f, "IPv4"),
            TypeCategory::Ipv6 => write!(f, "IPv6"),
            TypeCategory::Enum => {
                write!(f, "Enum{}(", self.width_bits)?;
                for (i, (name, value)) in self.enum_members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}' = {}", name, value)?;
                }
                write!(f, ")")
            }
            TypeCategory::Array => write!(f, "Array({})", self.children[0]),
            TypeCategory::Tuple => {
                write!(f, "Tuple(")?;
                for (i, child) in self.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            TypeCategory::Map => write!(f, "Map({}, {})", self.children[0], self.children[1]),
            TypeCategory::Nested => {
                // Nested 固定包裹单个 Tuple 子类型, 子列名挂在 Tuple 上
                let tuple = &self.children[0];
                write!(f, "Nested(")?;
                for (i, child) in tuple.children().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", tuple.child_names()[i], child)?;
                }
                write!(f, ")")
            }
            TypeCategory::Nullable => write!(f, "Nullable({})", self.children[0]),
            TypeCategory::LowCardinality => write!(f, "LowCardinality({})", self.children[0]),
            TypeCategory::AggregateBitmap => {
                write!(f, "AggregateFunction(groupBitmap, {})", self.children[0])
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::column::column::ColumnDescriptor;
    use crate::column::column_type::TypeCategory;

    #[test]
    fn test_display_roundtrip_names() {
        let int32 = ColumnDescriptor::new(TypeCategory::Integer).with_width_bits(32);
        assert_eq!(int32.to_string(), "Int32");

        let uint64 = ColumnDescriptor::new(TypeCategory::Integer)
            .with_signed(false)
            .with_width_bits(64);
        assert_eq!(uint64.to_string(), "UInt64");

        let decimal = ColumnDescriptor::new(TypeCategory::Decimal)
            .with_precision(9)
            .with_scale(3)
            .with_width_bits(32);
        assert_eq!(decimal.to_string(), "Decimal(9, 3)");

        let nullable = ColumnDescriptor::new(TypeCategory::Nullable).with_children(vec![int32]);
        let array = ColumnDescriptor::new(TypeCategory::Array).with_children(vec![nullable]);
        assert_eq!(array.to_string(), "Array(Nullable(Int32))");
    }

    #[test]
    fn test_wire_type_strips_low_cardinality() {
        let inner = ColumnDescriptor::new(TypeCategory::String);
        let lc = ColumnDescriptor::new(TypeCategory::LowCardinality)
            .with_children(vec![inner.clone()]);
        assert_eq!(lc.wire_type(), &inner);
        assert_eq!(inner.wire_type().category(), TypeCategory::String);
    }

    #[test]
    fn test_enum_lookup() {
        let e = ColumnDescriptor::new(TypeCategory::Enum)
            .with_width_bits(8)
            .with_enum_members(vec![(String::from("a"), 1), (String::from("b"), 2)]);
        assert_eq!(e.enum_name_of(2), Some("b"));
        assert_eq!(e.enum_value_of("a"), Some(1));
        assert_eq!(e.enum_name_of(9), None);
        assert_eq!(e.to_string(), "Enum8('a' = 1, 'b' = 2)");
    }
}
