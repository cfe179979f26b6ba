use std::collections::HashMap;
use std::sync::Arc;

use crate::column::column::ColumnDescriptor;

/// 表结构。列的声明顺序 + 大小写不敏感的列名索引。
///
/// 构造后不可变, 整体以 Arc 在 cache 与 Record 之间共享。
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    columns: Vec<Arc<ColumnDescriptor>>,

    /// 小写列名 -> 列下标
    index: HashMap<String, usize>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        let columns: Vec<Arc<ColumnDescriptor>> =
            columns.into_iter().map(Arc::new).collect();
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            index.insert(column.name().to_lowercase(), i);
        }

        TableSchema { columns, index }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Arc<ColumnDescriptor>] {
        &self.columns
    }

    /// 大小写不敏感的列名查找, 返回 0 起始下标
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_lowercase()).copied()
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Arc<ColumnDescriptor>> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn column_at(&self, index: usize) -> Option<&Arc<ColumnDescriptor>> {
        self.columns.get(index)
    }
}

#[cfg(test)]
mod test {
    use crate::column::column::ColumnDescriptor;
    use crate::column::column_type::TypeCategory;
    use crate::schema::table_schema::TableSchema;

    fn sample() -> TableSchema {
        TableSchema::new(vec![
            ColumnDescriptor::new(TypeCategory::Integer)
                .with_width_bits(64)
                .with_signed(false)
                .with_name("Id"),
            ColumnDescriptor::new(TypeCategory::String).with_name("event_name"),
        ])
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let schema = sample();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.column_index("id"), Some(0));
        assert_eq!(schema.column_index("ID"), Some(0));
        assert_eq!(schema.column_index("EVENT_NAME"), Some(1));
        assert_eq!(schema.column_index("missing"), None);

        let column = schema.column_by_name("Event_Name").unwrap();
        assert_eq!(column.name(), "event_name");
    }

    #[test]
    fn test_order_preserved() {
        let schema = sample();
        assert_eq!(schema.column_at(0).unwrap().name(), "Id");
        assert_eq!(schema.column_at(1).unwrap().name(), "event_name");
        assert!(schema.column_at(2).is_none());
    }
}
