/// 列类型分类。按 RowBinary 的编码形态划分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Bool,
    String,
    FixedString,
    Date,
    DateTime,
    Uuid,
    Ipv4,
    Ipv6,
    Enum,
    Array,
    Tuple,
    Map,
    Nested,
    Nullable,
    LowCardinality,
    AggregateBitmap,
}

impl TypeCategory {
    /// 复合类型至少持有一个子类型
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            TypeCategory::Array
                | TypeCategory::Tuple
                | TypeCategory::Map
                | TypeCategory::Nested
                | TypeCategory::Nullable
                | TypeCategory::LowCardinality
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeCategory::Integer | TypeCategory::Float | TypeCategory::Decimal
        )
    }

    /// Nullable(X) 不允许 X 为下列类型
    pub fn forbids_nullable_wrap(&self) -> bool {
        matches!(
            self,
            TypeCategory::Nullable
                | TypeCategory::Array
                | TypeCategory::Tuple
                | TypeCategory::Map
                | TypeCategory::Nested
        )
    }

    /// LowCardinality(X) 只允许字符串、数字与日期类
    pub fn allows_low_cardinality_wrap(&self) -> bool {
        matches!(
            self,
            TypeCategory::String
                | TypeCategory::FixedString
                | TypeCategory::Integer
                | TypeCategory::Float
                | TypeCategory::Decimal
                | TypeCategory::Date
                | TypeCategory::DateTime
        )
    }
}

/// 列默认值的种类。对应 DESCRIBE TABLE 结果的 default_type 列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DefaultKind {
    #[default]
    None,
    Default,
    Materialized,
    Alias,
    Ephemeral,
}

impl DefaultKind {
    pub fn parse(text: &str) -> DefaultKind {
        match text {
            "DEFAULT" => DefaultKind::Default,
            "MATERIALIZED" => DefaultKind::Materialized,
            "ALIAS" => DefaultKind::Alias,
            "EPHEMERAL" => DefaultKind::Ephemeral,
            _ => DefaultKind::None,
        }
    }

    /// MATERIALIZED/ALIAS/EPHEMERAL 列不参与 insert 编码
    pub fn is_write_skipped(&self) -> bool {
        matches!(
            self,
            DefaultKind::Materialized | DefaultKind::Alias | DefaultKind::Ephemeral
        )
    }
}
