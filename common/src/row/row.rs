use std::fmt;
use std::sync::Arc;

use crate::err::client_error::ClientError;
use crate::err::CResult;
use crate::schema::table_schema::TableSchema;
use crate::value::field::Field;
use crate::value::value::Value;

/// 一行解码结果: 按列序的 Value + 所属表结构。
///
/// 流式结果集逐行产出 Row; 复用模式下 Row 的底层 Value 会在下一行被改写,
/// 需要保留的值必须先 clone。
#[derive(Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,

    schema: Arc<TableSchema>,
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Row");
        for (val, column) in self.values.iter().zip(self.schema.columns().iter()) {
            debug.field(column.name(), val);
        }
        debug.finish()
    }
}

impl Row {
    /// Creates `Row` from values and schema.
    pub fn new_row(values: Vec<Value>, schema: Arc<TableSchema>) -> Self {
        assert_eq!(values.len(), schema.len());

        Row { values, schema }
    }

    /// Returns length of a row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has a length of 0.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// 按 0 起始下标取字段视图
    pub fn field_at(&self, index: usize) -> Option<Field<'_>> {
        let column = self.schema.column_at(index)?;
        let value = self.values.get(index)?;
        Some(Field::new(column, value))
    }

    /// 大小写不敏感的列名取字段视图
    pub fn field(&self, name: &str) -> CResult<Field<'_>> {
        let index = self
            .schema
            .column_index(name)
            .ok_or_else(|| ClientError::UnknownColumn(format!("unknown column '{}'", name)))?;
        Ok(Field::new(
            self.schema.column_at(index).unwrap(),
            &self.values[index],
        ))
    }
}
