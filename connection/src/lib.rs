pub mod fault;
pub mod request;
pub mod response;
pub mod schema_cache;
pub mod insert;

pub mod conn;

/// Protocol header constants
pub const HEADER_EXCEPTION_CODE: &str = "X-ClickHouse-Exception-Code";
pub const HEADER_SUMMARY: &str = "X-ClickHouse-Summary";
pub const HEADER_QUERY_ID: &str = "X-ClickHouse-Query-Id";
pub const HEADER_PROGRESS: &str = "X-ClickHouse-Progress";

/// 服务端错误码
pub const ERR_NO_SUCH_COLUMN_IN_TABLE: i32 = 16;
pub const ERR_UNKNOWN_IDENTIFIER: i32 = 47;
pub const ERR_UNKNOWN_TABLE: i32 = 60;
pub const ERR_AUTHENTICATION_FAILED: i32 = 516;

/// User-Agent 的产品段
pub const PRODUCT_NAME: &str = "clickhouse-http-client";

/// 行式查询结果使用的格式
pub const QUERY_FORMAT: &str = "RowBinaryWithNamesAndTypes";
