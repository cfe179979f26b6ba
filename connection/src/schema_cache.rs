use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;

use common::err::CResult;
use common::schema::table_schema::TableSchema;

use crate::{ERR_NO_SUCH_COLUMN_IN_TABLE, ERR_UNKNOWN_IDENTIFIER, ERR_UNKNOWN_TABLE};

/// 表结构缓存。
///
/// key 是规范化的 (endpoint, 表名); 同 key 的并发解析只放行一个,
/// 其余在槽位锁上等待首个结果。失败不缓存, 成功驻留直到失效。
pub struct SchemaCache {
    slots: DashMap<String, Arc<SchemaSlot>>,
}

struct SchemaSlot {
    cell: Mutex<Option<Arc<TableSchema>>>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        SchemaCache::new()
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        SchemaCache {
            slots: DashMap::new(),
        }
    }

    /// 表名小写归一, endpoint 原样
    fn key(endpoint: &str, table: &str) -> String {
        format!("{}|{}", endpoint, table.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 取出或解析表结构。fetch 只会被同 key 的一个调用方执行
    pub fn resolve<F>(&self, endpoint: &str, table: &str, fetch: F) -> CResult<Arc<TableSchema>>
    where
        F: FnOnce() -> CResult<TableSchema>,
    {
        let key = SchemaCache::key(endpoint, table);
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(SchemaSlot {
                    cell: Mutex::new(None),
                })
            })
            .clone();

        let mut cell = slot.cell.lock().unwrap();
        if let Some(schema) = cell.as_ref() {
            return Ok(schema.clone());
        }

        match fetch() {
            Ok(schema) => {
                let schema = Arc::new(schema);
                *cell = Some(schema.clone());
                Ok(schema)
            }
            Err(err) => {
                // 负结果不缓存
                drop(cell);
                self.slots.remove(&key);
                Err(err)
            }
        }
    }

    pub fn invalidate(&self, endpoint: &str, table: &str) {
        self.slots.remove(&SchemaCache::key(endpoint, table));
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    /// 识别表结构漂移类错误码并失效对应表项
    pub fn on_server_error(&self, endpoint: &str, table: Option<&str>, code: i32) {
        let drift = matches!(
            code,
            ERR_UNKNOWN_IDENTIFIER | ERR_UNKNOWN_TABLE | ERR_NO_SUCH_COLUMN_IN_TABLE
        );
        if !drift {
            return;
        }
        match table {
            Some(table) => {
                debug!("invalidate cached schema of {} on server code {}", table, code);
                self.invalidate(endpoint, table);
            }
            None => {
                debug!("clear schema cache on server code {}", code);
                self.clear();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use common::column::column::ColumnDescriptor;
    use common::column::column_type::TypeCategory;
    use common::err::client_error::ClientError;
    use common::schema::table_schema::TableSchema;

    use crate::schema_cache::SchemaCache;

    fn schema() -> TableSchema {
        TableSchema::new(vec![ColumnDescriptor::new(TypeCategory::String).with_name("s")])
    }

    #[test]
    fn test_resolve_caches_success() {
        let cache = SchemaCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let resolved = cache.resolve("http://ch:8123", "t", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(schema())
            });
            assert_eq!(resolved.unwrap().len(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failure_not_cached() {
        let cache = SchemaCache::new();

        let result = cache.resolve("e", "t", || {
            Err(ClientError::NoResponse(String::from("boom")))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());

        // 下一次重新尝试
        let result = cache.resolve("e", "t", || Ok(schema()));
        assert!(result.is_ok());
    }

    #[test]
    fn test_key_is_case_insensitive_on_table() {
        let cache = SchemaCache::new();
        cache.resolve("e", "Events", || Ok(schema())).unwrap();
        let resolved = cache.resolve("e", "EVENTS", || {
            panic!("cached entry must be reused")
        });
        assert!(resolved.is_ok());

        cache.invalidate("e", "events");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_single_flight() {
        let cache = Arc::new(SchemaCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(thread::spawn(move || {
                cache
                    .resolve("e", "t", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(20));
                        Ok(schema())
                    })
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drift_code_invalidation() {
        let cache = SchemaCache::new();
        cache.resolve("e", "t", || Ok(schema())).unwrap();

        cache.on_server_error("e", Some("t"), 241);
        assert_eq!(cache.len(), 1);

        cache.on_server_error("e", Some("t"), crate::ERR_UNKNOWN_IDENTIFIER);
        assert!(cache.is_empty());

        cache.resolve("e", "t", || Ok(schema())).unwrap();
        cache.on_server_error("e", None, crate::ERR_UNKNOWN_TABLE);
        assert!(cache.is_empty());
    }
}
