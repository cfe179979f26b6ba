use std::io;
use std::io::Read;
use std::sync::Arc;

use tracing::{debug, warn};

use common::err::client_error::ClientError;
use common::err::CResult;
use common::row::row::Row;
use common::schema::table_schema::TableSchema;
use common::value::value::Value;
use rowbinary::decoder::RowBinaryDecoder;

use crate::conn::http_channel::{BodyFraming, ResponseHead};
use crate::conn::pool::{ConnectionPool, PooledConnection};
use crate::{ERR_AUTHENTICATION_FAILED, HEADER_EXCEPTION_CODE, HEADER_QUERY_ID, HEADER_SUMMARY};

/// X-ClickHouse-Summary / X-ClickHouse-Progress 的计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub read_rows: u64,
    pub read_bytes: u64,
    pub written_rows: u64,
    pub written_bytes: u64,
    pub total_rows_to_read: u64,
}

impl Summary {
    /// 服务端把数值放在 JSON 字符串里, 两种形态都接受
    pub fn parse(json: &str) -> Summary {
        let mut summary = Summary::default();
        let value: serde_json::Value = match serde_json::from_str(json) {
            Ok(value) => value,
            Err(err) => {
                warn!("can not parse summary header. err:{{{err}}}");
                return summary;
            }
        };
        summary.read_rows = json_u64(&value, "read_rows");
        summary.read_bytes = json_u64(&value, "read_bytes");
        summary.written_rows = json_u64(&value, "written_rows");
        summary.written_bytes = json_u64(&value, "written_bytes");
        summary.total_rows_to_read = json_u64(&value, "total_rows_to_read");
        summary
    }

    /// progress 报的是累计值, 逐条覆盖
    pub fn merge_progress(&mut self, json: &str) {
        let update = Summary::parse(json);
        self.read_rows = self.read_rows.max(update.read_rows);
        self.read_bytes = self.read_bytes.max(update.read_bytes);
        self.written_rows = self.written_rows.max(update.written_rows);
        self.written_bytes = self.written_bytes.max(update.written_bytes);
        self.total_rows_to_read = self.total_rows_to_read.max(update.total_rows_to_read);
    }

    /// 从响应头收齐 summary 与 progress
    pub fn from_head(head: &ResponseHead) -> Summary {
        let mut summary = head
            .header(HEADER_SUMMARY)
            .map(Summary::parse)
            .unwrap_or_default();
        for (name, value) in &head.headers {
            if name
                .to_ascii_lowercase()
                .starts_with("x-clickhouse-progress")
            {
                summary.merge_progress(value);
            }
        }
        summary
    }
}

fn json_u64(value: &serde_json::Value, key: &str) -> u64 {
    match value.get(key) {
        Some(serde_json::Value::String(text)) => text.parse::<u64>().unwrap_or(0),
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

/// 多行错误正文折叠成一行, 便于日志
pub fn fold_message(text: &str) -> String {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 服务端错误识别。
///
/// 200 响应带 X-ClickHouse-Exception-Code 同样是失败, 错误正文在 body 里。
/// 无 header 时从 body 前缀 `Code: NNN.` 提取错误码
pub fn server_error(head: &ResponseHead, body_text: &str) -> Option<ClientError> {
    let header_code = head
        .header(HEADER_EXCEPTION_CODE)
        .and_then(|v| v.trim().parse::<i32>().ok());

    let code = match header_code {
        Some(code) => Some(code),
        None if head.status >= 300 => Some(parse_code_prefix(body_text).unwrap_or(0)),
        None => None,
    }?;

    let message = fold_message(body_text);
    if code == ERR_AUTHENTICATION_FAILED {
        Some(ClientError::Auth { code, message })
    } else {
        Some(ClientError::Server { code, message })
    }
}

fn parse_code_prefix(body: &str) -> Option<i32> {
    let rest = body.trim_start().strip_prefix("Code:")?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<i32>().ok()
}

/// 响应体读取器, 持有池连接直到读完或被丢弃。
///
/// Content-Length / chunked / 读到连接关闭三种定界。chunked 的分块头行
/// 与结尾 CRLF 在读取过程中透明消化。
pub struct HttpBodyReader {
    conn: Option<PooledConnection>,
    framing: BodyFraming,
    /// Length: 剩余字节; Chunked: 当前块剩余字节
    remaining: u64,
    finished: bool,
    reusable: bool,
}

impl HttpBodyReader {
    pub fn new(conn: PooledConnection, head: &ResponseHead) -> Self {
        let framing = head.framing();
        let (remaining, finished) = match framing {
            BodyFraming::Length(len) => (len, len == 0),
            BodyFraming::Chunked => (0, false),
            BodyFraming::Eof => (0, false),
        };
        HttpBodyReader {
            conn: Some(conn),
            framing,
            remaining,
            finished,
            // 读到 EOF 定界的连接不可复用
            reusable: !head.connection_close() && framing != BodyFraming::Eof,
        }
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn reusable(&self) -> bool {
        self.reusable && self.finished
    }

    /// 剩余字节全部读掉, 连接才能回池
    pub fn drain(&mut self) -> CResult<u64> {
        let mut sink = [0u8; 4096];
        let mut total = 0u64;
        while !self.finished {
            let n = self
                .read(&mut sink)
                .map_err(|err| crate::fault::map_io(err, "drain response body"))?;
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        Ok(total)
    }

    pub fn read_all_text(&mut self) -> CResult<String> {
        let mut text = String::new();
        self.read_to_string(&mut text)
            .map_err(|err| crate::fault::map_io(err, "read response body"))?;
        Ok(text)
    }

    pub fn into_conn(mut self) -> (PooledConnection, bool) {
        let reusable = self.reusable();
        (self.conn.take().expect("body reader owns connection"), reusable)
    }

    fn channel_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.conn
            .as_mut()
            .expect("body reader owns connection")
            .channel
            .read(buf)
    }

    fn read_chunk_header(&mut self) -> io::Result<u64> {
        let conn = self.conn.as_mut().expect("body reader owns connection");
        let line = conn
            .channel
            .read_line()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        let size_text = line.split(';').next().unwrap_or("").trim();
        u64::from_str_radix(size_text, 16).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad chunk size line '{}'", line),
            )
        })
    }

    fn consume_line(&mut self) -> io::Result<()> {
        let conn = self.conn.as_mut().expect("body reader owns connection");
        conn.channel
            .read_line()
            .map(|_| ())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
    }
}

impl Read for HttpBodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }

        match self.framing {
            BodyFraming::Eof => {
                let n = self.channel_read(buf)?;
                if n == 0 {
                    self.finished = true;
                }
                Ok(n)
            }
            BodyFraming::Length(_) => {
                if self.remaining == 0 {
                    self.finished = true;
                    return Ok(0);
                }
                let want = buf.len().min(self.remaining as usize);
                let n = self.channel_read(&mut buf[..want])?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed inside response body",
                    ));
                }
                self.remaining -= n as u64;
                if self.remaining == 0 {
                    self.finished = true;
                }
                Ok(n)
            }
            BodyFraming::Chunked => {
                if self.remaining == 0 {
                    let size = self.read_chunk_header()?;
                    if size == 0 {
                        // 末块, 消化 trailer 直到空行
                        loop {
                            let conn = self.conn.as_mut().expect("body reader owns connection");
                            let line = conn.channel.read_line().map_err(|err| {
                                io::Error::new(io::ErrorKind::InvalidData, err.to_string())
                            })?;
                            if line.is_empty() {
                                break;
                            }
                        }
                        self.finished = true;
                        return Ok(0);
                    }
                    self.remaining = size;
                }
                let want = buf.len().min(self.remaining as usize);
                let n = self.channel_read(&mut buf[..want])?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed inside chunk",
                    ));
                }
                self.remaining -= n as u64;
                if self.remaining == 0 {
                    // 每个块尾随一个 CRLF
                    self.consume_line()?;
                }
                Ok(n)
            }
        }
    }
}

/// 流式查询结果。
///
/// 响应共享持有池连接: 正常读尽或显式 close 时连接回池; 半途丢弃时
/// socket 中途态无法复用, 直接关闭。产出的 Row 不应在响应关闭后继续使用。
pub struct QueryResponse {
    pool: Arc<ConnectionPool>,
    decoder: Option<RowBinaryDecoder<HttpBodyReader>>,
    schema: Arc<TableSchema>,
    summary: Summary,
    query_id: Option<String>,
}

impl std::fmt::Debug for QueryResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResponse")
            .field("schema", &self.schema)
            .field("summary", &self.summary)
            .field("query_id", &self.query_id)
            .finish()
    }
}

impl QueryResponse {
    pub(crate) fn new(
        pool: Arc<ConnectionPool>,
        decoder: RowBinaryDecoder<HttpBodyReader>,
        schema: Arc<TableSchema>,
        head: &ResponseHead,
    ) -> Self {
        QueryResponse {
            pool,
            decoder: Some(decoder),
            schema,
            summary: Summary::from_head(head),
            query_id: head.header(HEADER_QUERY_ID).map(|s| s.to_string()),
        }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    /// 读下一行, 流尽返回 None 并把连接还回池
    pub fn next_row(&mut self) -> CResult<Option<Row>> {
        let decoder = match self.decoder.as_mut() {
            Some(decoder) => decoder,
            None => return Ok(None),
        };

        match decoder.decode_row_opt(&self.schema) {
            Ok(Some(values)) => Ok(Some(Row::new_row(values, self.schema.clone()))),
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(err) => {
                // 解码失败终止流并关闭 socket
                self.abort();
                Err(err)
            }
        }
    }

    /// 复用模式: 在调用方的槽位上就地改写
    pub fn next_row_into(&mut self, slots: &mut Vec<Value>) -> CResult<bool> {
        let decoder = match self.decoder.as_mut() {
            Some(decoder) => decoder,
            None => return Ok(false),
        };
        match decoder.at_end() {
            Ok(true) => {
                self.finish();
                return Ok(false);
            }
            Ok(false) => {}
            Err(err) => {
                self.abort();
                return Err(err);
            }
        }
        match decoder.decode_row_into(&self.schema, slots) {
            Ok(()) => Ok(true),
            Err(err) => {
                self.abort();
                Err(err)
            }
        }
    }

    /// 读尽剩余数据并归还连接
    pub fn close(mut self) -> CResult<Summary> {
        if let Some(decoder) = self.decoder.take() {
            let mut body = decoder.into_inner();
            match body.drain() {
                Ok(_) => {
                    let (conn, reusable) = body.into_conn();
                    self.pool.release(conn, reusable);
                }
                Err(err) => {
                    let (conn, _) = body.into_conn();
                    self.pool.discard(conn);
                    return Err(err);
                }
            }
        }
        Ok(self.summary.clone())
    }

    fn finish(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            let body = decoder.into_inner();
            let (conn, reusable) = body.into_conn();
            self.pool.release(conn, reusable);
        }
    }

    fn abort(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            let body = decoder.into_inner();
            let (conn, _) = body.into_conn();
            self.pool.discard(conn);
        }
    }
}

impl Iterator for QueryResponse {
    type Item = CResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

/// 中途丢弃的响应不能复用 socket, 直接关闭释放池位
impl Drop for QueryResponse {
    fn drop(&mut self) {
        if self.decoder.is_some() {
            debug!("query response dropped before end of stream");
            self.abort();
        }
    }
}

#[cfg(test)]
mod test {
    use crate::conn::http_channel::ResponseHead;
    use crate::response::{fold_message, server_error, Summary};

    fn head(status: u16, headers: Vec<(&str, &str)>) -> ResponseHead {
        ResponseHead {
            status,
            headers: headers
                .into_iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_summary_parse_string_numbers() {
        let summary =
            Summary::parse(r#"{"read_rows":"42","read_bytes":"1024","written_rows":"7"}"#);
        assert_eq!(summary.read_rows, 42);
        assert_eq!(summary.read_bytes, 1024);
        assert_eq!(summary.written_rows, 7);
        assert_eq!(summary.total_rows_to_read, 0);
    }

    #[test]
    fn test_progress_accumulation() {
        let head = head(
            200,
            vec![
                (
                    "X-ClickHouse-Summary",
                    r#"{"read_rows":"10","read_bytes":"100"}"#,
                ),
                ("X-ClickHouse-Progress", r#"{"read_rows":"50"}"#),
                ("X-ClickHouse-Progress", r#"{"read_rows":"90"}"#),
            ],
        );
        let summary = Summary::from_head(&head);
        assert_eq!(summary.read_rows, 90);
        assert_eq!(summary.read_bytes, 100);
    }

    #[test]
    fn test_exception_code_on_200() {
        let head = head(200, vec![("X-ClickHouse-Exception-Code", "241")]);
        let err = server_error(&head, "Code: 241. DB::Exception: Memory limit").unwrap();
        assert_eq!(err.server_code(), Some(241));
        assert!(err.to_string().contains("Memory limit"));
    }

    #[test]
    fn test_error_code_from_body_prefix() {
        let head = head(500, vec![]);
        let err = server_error(&head, "Code: 60. DB::Exception: Table missing.").unwrap();
        assert_eq!(err.server_code(), Some(60));
    }

    #[test]
    fn test_auth_error_code() {
        let head = head(403, vec![("X-ClickHouse-Exception-Code", "516")]);
        let err = server_error(&head, "Code: 516. DB::Exception: default: Authentication failed")
            .unwrap();
        assert!(matches!(
            err,
            common::err::client_error::ClientError::Auth { code: 516, .. }
        ));
    }

    #[test]
    fn test_plain_200_is_not_error() {
        let head = head(200, vec![("X-ClickHouse-Summary", "{}")]);
        assert!(server_error(&head, "").is_none());
    }

    #[test]
    fn test_fold_message() {
        assert_eq!(fold_message("a\nb\n\n  c  \n"), "a b c");
    }
}
