use std::sync::Arc;

use bytes::BytesMut;

use common::column::column_type::DefaultKind;
use common::err::client_error::{ClientError, EncodeFault};
use common::err::CResult;
use common::schema::table_schema::TableSchema;
use common::value::value::Value;
use rowbinary::encoder::{encode_value, encode_value_with_default};

/// 按表结构驱动的行暂存与编码。
///
/// 字段按列名或 1 起始下标写入暂存区; commit_row 按声明列序编码,
/// MATERIALIZED/ALIAS/EPHEMERAL 列整体跳过。表里存在 DEFAULT 列时整批
/// 使用 RowBinaryWithDefaults, 否则退回普通 RowBinary。
pub struct RowBinaryTableWriter {
    schema: Arc<TableSchema>,

    /// 行暂存区, 列位对齐
    staging: Vec<Option<Value>>,

    /// 本行是否写入过任何字段
    dirty: bool,

    payload: BytesMut,
    rows: u64,
    with_defaults: bool,
}

impl RowBinaryTableWriter {
    pub fn new(schema: Arc<TableSchema>) -> Self {
        let with_defaults = schema
            .columns()
            .iter()
            .any(|c| c.default_kind() == DefaultKind::Default);
        let staging = vec![None; schema.len()];
        RowBinaryTableWriter {
            schema,
            staging,
            dirty: false,
            payload: BytesMut::new(),
            rows: 0,
            with_defaults,
        }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// 整批使用的 FORMAT 名
    pub fn format(&self) -> &'static str {
        if self.with_defaults {
            "RowBinaryWithDefaults"
        } else {
            "RowBinary"
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// 当前行是否有未提交字段
    pub fn has_pending(&self) -> bool {
        self.dirty
    }

    /// 大小写不敏感按列名写入
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> CResult<()> {
        let index = self
            .schema
            .column_index(name)
            .ok_or_else(|| ClientError::UnknownColumn(format!("unknown column '{}'", name)))?;
        self.put(index, value.into())
    }

    /// 按 1 起始下标写入
    pub fn set_index(&mut self, index: usize, value: impl Into<Value>) -> CResult<()> {
        if index == 0 || index > self.schema.len() {
            return Err(ClientError::UnknownColumn(format!(
                "column index {} out of range [1, {}]",
                index,
                self.schema.len()
            )));
        }
        self.put(index - 1, value.into())
    }

    fn put(&mut self, index: usize, value: Value) -> CResult<()> {
        let column = self.schema.column_at(index).expect("index checked");
        if column.default_kind().is_write_skipped() {
            return Err(ClientError::UnknownColumn(format!(
                "column '{}' is {:?} and can not be written",
                column.name(),
                column.default_kind()
            )));
        }
        self.staging[index] = Some(value);
        self.dirty = true;
        Ok(())
    }

    /// 提交一行。成功后行计数 +1, 暂存区清空
    pub fn commit_row(&mut self) -> CResult<()> {
        let mut row = BytesMut::new();

        for (index, column) in self.schema.columns().iter().enumerate() {
            if column.default_kind().is_write_skipped() {
                continue;
            }
            let staged = self.staging[index].as_ref();

            if self.with_defaults {
                match staged {
                    Some(value) => encode_value_with_default(&mut row, column, Some(value))?,
                    None if column.default_kind() == DefaultKind::Default => {
                        encode_value_with_default(&mut row, column, None)?;
                    }
                    None if column.is_nullable() => {
                        encode_value_with_default(&mut row, column, Some(&Value::Null))?;
                    }
                    None => {
                        return Err(EncodeFault::MissingRequired(column.name().to_string()).into())
                    }
                }
            } else {
                match staged {
                    Some(value) => encode_value(&mut row, column, value)?,
                    None if column.is_nullable() => {
                        encode_value(&mut row, column, &Value::Null)?;
                    }
                    None => {
                        return Err(EncodeFault::MissingRequired(column.name().to_string()).into())
                    }
                }
            }
        }

        // 整行编码成功才落入批缓冲
        self.payload.extend_from_slice(&row);
        self.rows += 1;
        self.staging.fill(None);
        self.dirty = false;
        Ok(())
    }

    /// 取走整批数据, 写入器归零
    pub fn take_payload(&mut self) -> (BytesMut, u64) {
        let payload = std::mem::take(&mut self.payload);
        let rows = std::mem::replace(&mut self.rows, 0);
        (payload, rows)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use common::column::column_type::DefaultKind;
    use common::err::client_error::{ClientError, EncodeFault};
    use common::schema::table_schema::TableSchema;
    use rowbinary::type_parser::parse_column;

    use crate::insert::RowBinaryTableWriter;

    fn writer(columns: Vec<(&str, &str, DefaultKind)>) -> RowBinaryTableWriter {
        let schema = TableSchema::new(
            columns
                .into_iter()
                .map(|(name, type_str, kind)| parse_column(name, type_str, kind).unwrap())
                .collect(),
        );
        RowBinaryTableWriter::new(Arc::new(schema))
    }

    #[test]
    fn test_plain_rowbinary_when_no_defaults() {
        let mut writer = writer(vec![
            ("a", "UInt8", DefaultKind::None),
            ("b", "Nullable(String)", DefaultKind::None),
        ]);
        assert_eq!(writer.format(), "RowBinary");

        writer.set("A", 7u8).unwrap();
        writer.commit_row().unwrap();

        // a=7, b 未写入走 null
        let (payload, rows) = writer.take_payload();
        assert_eq!(rows, 1);
        assert_eq!(payload.as_ref(), &[7, 1]);
    }

    #[test]
    fn test_default_marker_for_unset_column() {
        let mut writer = writer(vec![
            ("id", "UInt8", DefaultKind::None),
            ("ts", "UInt32", DefaultKind::Default),
        ]);
        assert_eq!(writer.format(), "RowBinaryWithDefaults");

        writer.set_index(1, 9u8).unwrap();
        writer.commit_row().unwrap();

        let (payload, _) = writer.take_payload();
        // id: marker 0 + 9; ts: marker 1
        assert_eq!(payload.as_ref(), &[0, 9, 1]);
    }

    #[test]
    fn test_missing_required_column() {
        let mut writer = writer(vec![
            ("a", "UInt8", DefaultKind::None),
            ("b", "UInt8", DefaultKind::None),
        ]);
        writer.set("a", 1u8).unwrap();
        let err = writer.commit_row().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Encode(EncodeFault::MissingRequired(column)) if column == "b"
        ));

        // 补上缺的列之后同一行可以重新提交
        writer.set("b", 2u8).unwrap();
        writer.commit_row().unwrap();
        assert_eq!(writer.rows(), 1);
    }

    #[test]
    fn test_row_counter_and_staging_reset() {
        let mut writer = writer(vec![("a", "UInt8", DefaultKind::None)]);
        writer.set("a", 1u8).unwrap();
        assert!(writer.has_pending());

        writer.commit_row().unwrap();
        assert_eq!(writer.rows(), 1);
        assert!(!writer.has_pending());

        // 上一行的值不会残留到下一行
        let err = writer.commit_row().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Encode(EncodeFault::MissingRequired(_))
        ));
    }

    #[test]
    fn test_materialized_column_skipped() {
        let mut writer = writer(vec![
            ("a", "UInt8", DefaultKind::None),
            ("m", "UInt64", DefaultKind::Materialized),
        ]);
        assert!(writer.set("m", 1u64).is_err());

        writer.set("a", 5u8).unwrap();
        writer.commit_row().unwrap();
        let (payload, _) = writer.take_payload();
        // MATERIALIZED 列完全不占字节
        assert_eq!(payload.as_ref(), &[5]);
    }

    #[test]
    fn test_one_based_index() {
        let mut writer = writer(vec![
            ("a", "UInt8", DefaultKind::None),
            ("b", "UInt8", DefaultKind::None),
        ]);
        assert!(writer.set_index(0, 1u8).is_err());
        assert!(writer.set_index(3, 1u8).is_err());

        writer.set_index(2, 9u8).unwrap();
        writer.set_index(1, 8u8).unwrap();
        writer.commit_row().unwrap();
        let (payload, _) = writer.take_payload();
        assert_eq!(payload.as_ref(), &[8, 9]);
    }

    #[test]
    fn test_unset_nullable_with_defaults_format() {
        let mut writer = writer(vec![
            ("a", "Nullable(UInt8)", DefaultKind::None),
            ("d", "UInt8", DefaultKind::Default),
        ]);
        writer.commit_row().unwrap();
        let (payload, _) = writer.take_payload();
        // a: marker 0 + null flag 1; d: marker 1
        assert_eq!(payload.as_ref(), &[0, 1, 1]);
    }
}
