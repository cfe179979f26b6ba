use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use common::column::column_type::DefaultKind;
use common::err::client_error::ClientError;
use common::err::CResult;
use common::schema::table_schema::TableSchema;
use common::value::value::Value;
use rowbinary::decoder::RowBinaryDecoder;
use rowbinary::type_parser::parse_column;

use crate::conn::connection_options::ConnectionOptions;
use crate::conn::http_channel::ResponseHead;
use crate::conn::pool::{ConnectionPool, PooledConnection};
use crate::fault::{classify, poisons_connection};
use crate::insert::RowBinaryTableWriter;
use crate::request::{
    build_headers, build_query_string, new_query_id, percent_encode, render_head, QueryOptions,
};
use crate::response::{server_error, HttpBodyReader, QueryResponse, Summary};
use crate::schema_cache::SchemaCache;
use crate::{HEADER_EXCEPTION_CODE, QUERY_FORMAT};

/// ClickHouse HTTP 客户端。
///
/// 每个入口一个连接池, 调用间轮询; 传输类故障按 retry_on_failures
/// 掩码在 max_retries 预算内消化。Client 可以廉价 clone, 池、表结构
/// 缓存与计数器在副本间共享。
#[derive(Clone)]
pub struct Client {
    options: Arc<ConnectionOptions>,
    pools: Arc<Vec<Arc<ConnectionPool>>>,
    cache: Arc<SchemaCache>,
    next_endpoint: Arc<AtomicUsize>,
    retries_total: Arc<AtomicU64>,
}

/// 客户端级计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub retries_total: u64,
    pub connections_opened: u64,
}

impl Client {
    /// 配置校验在这里做完, 运行期不再出 ConfigError
    pub fn new(options: ConnectionOptions) -> CResult<Client> {
        options.validate()?;
        let options = Arc::new(options);
        let pools: Vec<Arc<ConnectionPool>> = options
            .endpoints
            .iter()
            .cloned()
            .map(|endpoint| Arc::new(ConnectionPool::new(endpoint, options.clone())))
            .collect();
        Ok(Client {
            options,
            pools: Arc::new(pools),
            cache: Arc::new(SchemaCache::new()),
            next_endpoint: Arc::new(AtomicUsize::new(0)),
            retries_total: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            retries_total: self.retries_total.load(Ordering::Relaxed),
            connections_opened: self.pools.iter().map(|p| p.opened_total()).sum(),
        }
    }

    fn pick_pool(&self, pinned: Option<usize>) -> (usize, Arc<ConnectionPool>) {
        let index = match pinned {
            Some(index) => index % self.pools.len(),
            None => self.next_endpoint.fetch_add(1, Ordering::Relaxed) % self.pools.len(),
        };
        (index, self.pools[index].clone())
    }

    /// 故障后的连接处置: NoResponse/ConnectionReset 关闭,
    /// 其余故障 (如超时) 的连接还回池
    fn dispose_faulted(pool: &ConnectionPool, conn: PooledConnection, err: &ClientError) {
        match classify(err) {
            Some(cause) if !poisons_connection(cause) => pool.release(conn, true),
            _ => pool.discard(conn),
        }
    }

    /// 单次请求: 取连接、写请求、读响应头并分类
    fn try_send(
        &self,
        pool: &Arc<ConnectionPool>,
        method: &str,
        path_and_query: &str,
        call: &QueryOptions,
        body: &[u8],
    ) -> CResult<(ResponseHead, HttpBodyReader)> {
        let mut conn = pool.checkout()?;

        let headers = build_headers(&self.options, pool.endpoint(), call);
        let head_text = render_head(method, path_and_query, &headers, body.len());
        if let Err(err) = conn.channel.write_request(&head_text, body) {
            Client::dispose_faulted(pool, conn, &err);
            return Err(err);
        }
        let head = match conn.channel.read_head() {
            Ok(head) => head,
            Err(err) => {
                Client::dispose_faulted(pool, conn, &err);
                return Err(err);
            }
        };

        let mut reader = HttpBodyReader::new(conn, &head);

        // 200 + exception header 同样按失败处理, 错误正文在 body 里
        if head.header(HEADER_EXCEPTION_CODE).is_some() || head.status >= 300 {
            let text = match reader.read_all_text() {
                Ok(text) => text,
                Err(err) => {
                    let (conn, _) = reader.into_conn();
                    pool.discard(conn);
                    return Err(err);
                }
            };
            let (conn, reusable) = reader.into_conn();
            pool.release(conn, reusable);
            let err = server_error(&head, &text).unwrap_or(ClientError::Server {
                code: 0,
                message: text,
            });
            return Err(err);
        }

        Ok((head, reader))
    }

    /// 重试循环。端点在失败后轮转, 预算耗尽后把最后的错误交给调用方
    fn send_with_retry(
        &self,
        pinned: Option<usize>,
        method: &str,
        path_and_query: &str,
        call: &QueryOptions,
        body: &[u8],
    ) -> CResult<(Arc<ConnectionPool>, ResponseHead, HttpBodyReader)> {
        let mut attempt = 0;
        loop {
            let (_, pool) = self.pick_pool(pinned);
            match self.try_send(&pool, method, path_and_query, call, body) {
                Ok((head, reader)) => return Ok((pool, head, reader)),
                Err(err) => {
                    let retryable = match classify(&err) {
                        Some(cause) => self.options.retry_on_failures.contains(cause),
                        None => err
                            .server_code()
                            .map(|code| self.options.retry_server_codes.contains(&code))
                            .unwrap_or(false),
                    };
                    if !retryable || attempt >= self.options.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    self.retries_total.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "retrying request, attempt {}/{}. err:{{{}}}",
                        attempt, self.options.max_retries, err
                    );
                }
            }
        }
    }

    /// 流式查询。结果格式带列名与类型, 由响应头驱动解码
    #[instrument(skip(self))]
    pub fn query(&self, sql: &str) -> CResult<QueryResponse> {
        self.query_with(sql, QueryOptions::default())
    }

    pub fn query_with(&self, sql: &str, call: QueryOptions) -> CResult<QueryResponse> {
        let query_id = call.query_id.clone().unwrap_or_else(new_query_id);
        let query_string =
            build_query_string(&self.options, &call, &query_id, Some(QUERY_FORMAT));
        let path = format!("/?{}", query_string);

        let (pool, head, reader) =
            match self.send_with_retry(None, "POST", &path, &call, sql.as_bytes()) {
                Ok(sent) => sent,
                Err(err) => {
                    self.note_server_error(None, &err);
                    return Err(err);
                }
            };

        let mut decoder = RowBinaryDecoder::new(reader);
        let (names, types) = match decoder.decode_names_and_types() {
            Ok(header) => header,
            Err(err) => {
                let (conn, _) = decoder.into_inner().into_conn();
                pool.discard(conn);
                return Err(err);
            }
        };
        let mut columns = Vec::with_capacity(names.len());
        for (name, type_str) in names.iter().zip(types.iter()) {
            match parse_column(name, type_str, DefaultKind::None) {
                Ok(column) => columns.push(column),
                Err(err) => {
                    let (conn, _) = decoder.into_inner().into_conn();
                    pool.discard(conn);
                    return Err(err);
                }
            }
        }
        let schema = Arc::new(TableSchema::new(columns));

        debug!("query {} started, {} columns", query_id, schema.len());
        Ok(QueryResponse::new(pool, decoder, schema, &head))
    }

    /// 不取行数据的语句执行, 返回服务端计数
    #[instrument(skip(self))]
    pub fn execute(&self, sql: &str) -> CResult<Summary> {
        self.execute_with(sql, QueryOptions::default())
    }

    pub fn execute_with(&self, sql: &str, call: QueryOptions) -> CResult<Summary> {
        let query_id = call.query_id.clone().unwrap_or_else(new_query_id);
        let query_string = build_query_string(&self.options, &call, &query_id, None);
        let path = format!("/?{}", query_string);

        let (pool, head, mut reader) =
            match self.send_with_retry(None, "POST", &path, &call, sql.as_bytes()) {
                Ok(sent) => sent,
                Err(err) => {
                    self.note_server_error(None, &err);
                    return Err(err);
                }
            };
        if let Err(err) = reader.drain() {
            let (conn, _) = reader.into_conn();
            pool.discard(conn);
            return Err(err);
        }
        let (conn, reusable) = reader.into_conn();
        pool.release(conn, reusable);
        Ok(Summary::from_head(&head))
    }

    /// GET /ping 活性探测
    pub fn ping(&self) -> bool {
        let call = QueryOptions::default();
        let (_, pool) = self.pick_pool(None);
        match self.try_send(&pool, "GET", "/ping", &call, &[]) {
            Ok((_, mut reader)) => {
                let ok = reader
                    .read_all_text()
                    .map(|text| text.trim() == "Ok.")
                    .unwrap_or(false);
                let (conn, reusable) = reader.into_conn();
                pool.release(conn, reusable);
                ok
            }
            Err(err) => {
                debug!("ping failed. err:{{{}}}", err);
                false
            }
        }
    }

    /// 表写入入口。表结构经缓存解析, 插入全程钉在同一个入口上
    pub fn insert(&self, table: &str) -> CResult<Insert<'_>> {
        self.insert_with(table, QueryOptions::default())
    }

    pub fn insert_with(&self, table: &str, call: QueryOptions) -> CResult<Insert<'_>> {
        let (endpoint_index, pool) = self.pick_pool(None);
        let endpoint_uri = pool.endpoint().base_uri();
        let schema = self
            .cache
            .resolve(&endpoint_uri, table, || {
                self.fetch_schema(endpoint_index, table)
            })?;
        Ok(Insert {
            client: self,
            table: table.to_string(),
            endpoint_index,
            writer: RowBinaryTableWriter::new(schema),
            call,
        })
    }

    /// 异步提交, 内部仍是阻塞引擎
    pub async fn query_async(&self, sql: &str) -> CResult<QueryResponse> {
        let client = self.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || client.query(&sql))
            .await
            .map_err(|err| ClientError::String(format!("query task failed. err:{{{err}}}")))?
    }

    pub async fn execute_async(&self, sql: &str) -> CResult<Summary> {
        let client = self.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || client.execute(&sql))
            .await
            .map_err(|err| ClientError::String(format!("execute task failed. err:{{{err}}}")))?
    }

    fn fetch_schema(&self, endpoint_index: usize, table: &str) -> CResult<TableSchema> {
        let call = QueryOptions::default();
        let query_id = new_query_id();
        let query_string =
            build_query_string(&self.options, &call, &query_id, Some("TabSeparated"));
        let path = format!("/?{}", query_string);
        let sql = format!("DESCRIBE TABLE {}", table);

        let (pool, _head, mut reader) =
            self.send_with_retry(Some(endpoint_index), "POST", &path, &call, sql.as_bytes())?;
        let text = match reader.read_all_text() {
            Ok(text) => text,
            Err(err) => {
                let (conn, _) = reader.into_conn();
                pool.discard(conn);
                return Err(err);
            }
        };
        let (conn, reusable) = reader.into_conn();
        pool.release(conn, reusable);

        parse_describe(&text)
    }

    /// 表结构漂移类错误码触发缓存失效
    fn note_server_error(&self, table: Option<(&str, &str)>, err: &ClientError) {
        if let Some(code) = err.server_code() {
            match table {
                Some((endpoint_uri, table)) => {
                    self.cache.on_server_error(endpoint_uri, Some(table), code)
                }
                None => {
                    for pool in self.pools.iter() {
                        self.cache
                            .on_server_error(&pool.endpoint().base_uri(), None, code);
                    }
                }
            }
        }
    }
}

/// 绑定在 Client 上的一次批量写入
pub struct Insert<'a> {
    client: &'a Client,
    table: String,
    endpoint_index: usize,
    writer: RowBinaryTableWriter,
    call: QueryOptions,
}

impl Insert<'_> {
    pub fn schema(&self) -> &Arc<TableSchema> {
        self.writer.schema()
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> CResult<()> {
        self.writer.set(name, value)
    }

    /// 1 起始的列下标
    pub fn set_index(&mut self, index: usize, value: impl Into<Value>) -> CResult<()> {
        self.writer.set_index(index, value)
    }

    pub fn commit_row(&mut self) -> CResult<()> {
        self.writer.commit_row()
    }

    pub fn rows(&self) -> u64 {
        self.writer.rows()
    }

    /// 发送整批数据。未提交的残行先行提交
    #[instrument(skip(self), fields(table = %self.table))]
    pub fn end(mut self) -> CResult<Summary> {
        if self.writer.has_pending() {
            self.writer.commit_row()?;
        }
        let format = self.writer.format();
        let (payload, rows) = self.writer.take_payload();

        let statement = format!("INSERT INTO {} FORMAT {}", self.table, format);
        let query_id = self.call.query_id.clone().unwrap_or_else(new_query_id);
        let query_string =
            build_query_string(&self.client.options, &self.call, &query_id, None);
        let path = format!("/?{}&query={}", query_string, percent_encode(&statement));

        let endpoint_uri = self.client.pools[self.endpoint_index]
            .endpoint()
            .base_uri();
        let (pool, head, mut reader) = match self.client.send_with_retry(
            Some(self.endpoint_index),
            "POST",
            &path,
            &self.call,
            &payload,
        ) {
            Ok(sent) => sent,
            Err(err) => {
                self.client
                    .note_server_error(Some((&endpoint_uri, &self.table)), &err);
                return Err(err);
            }
        };
        if let Err(err) = reader.drain() {
            let (conn, _) = reader.into_conn();
            pool.discard(conn);
            return Err(err);
        }
        let (conn, reusable) = reader.into_conn();
        pool.release(conn, reusable);

        let summary = Summary::from_head(&head);
        debug!(
            "insert into {} done. rows:{} written_rows:{}",
            self.table, rows, summary.written_rows
        );
        Ok(summary)
    }
}

/// DESCRIBE TABLE 的 TabSeparated 输出 -> 表结构
pub fn parse_describe(text: &str) -> CResult<TableSchema> {
    let mut columns = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let name = tsv_unescape(fields.next().unwrap_or(""));
        let type_str = match fields.next() {
            Some(type_str) => tsv_unescape(type_str),
            None => {
                return Err(ClientError::SchemaParseError(format!(
                    "bad describe line '{}'",
                    line
                )))
            }
        };
        let default_kind = DefaultKind::parse(fields.next().unwrap_or(""));
        columns.push(parse_column(&name, &type_str, default_kind)?);
    }
    if columns.is_empty() {
        return Err(ClientError::SchemaParseError(String::from(
            "describe returned no columns",
        )));
    }
    Ok(TableSchema::new(columns))
}

/// TabSeparated 的反转义
fn tsv_unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => result.push('\t'),
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some('b') => result.push('\u{8}'),
            Some('\'') => result.push('\''),
            Some('\\') => result.push('\\'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}
